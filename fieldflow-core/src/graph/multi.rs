//! Multi-valued field operations.
//!
//! Every mutation brings the field up-to-date first, edits it in place and
//! sends one event, exactly like a full `set_value`.

use std::fmt::Debug;

use crate::error::{FieldError, Result};
use crate::field::{FieldHandle, MField};

use super::field_graph::FieldGraph;

impl FieldGraph {
    /// Append a value.
    pub fn push<T>(&mut self, field: MField<T>, value: T) -> Result<()>
    where
        T: Clone + Debug + 'static,
    {
        self.write(field.id(), None, true, true, move |v: &mut Vec<T>| v.push(value))
    }

    /// Remove the first element equal to `value`.
    ///
    /// Returns whether one was found. No event is sent otherwise.
    pub fn erase<T>(&mut self, field: MField<T>, value: &T) -> Result<bool>
    where
        T: Clone + Debug + PartialEq + 'static,
    {
        let Some(index) = self.find(field, |v| v == value)? else {
            return Ok(false);
        };
        self.write(field.id(), None, true, true, move |v: &mut Vec<T>| {
            v.remove(index);
        })?;
        Ok(true)
    }

    /// Remove every element.
    pub fn clear<T>(&mut self, field: MField<T>) -> Result<()>
    where
        T: Clone + Debug + 'static,
    {
        self.write(field.id(), None, true, false, |v: &mut Vec<T>| v.clear())
    }

    /// Overwrite the element at `index`.
    pub fn set_at<T>(&mut self, field: MField<T>, index: usize, value: T) -> Result<()>
    where
        T: Clone + Debug + 'static,
    {
        self.check_index(field, index)?;
        self.write(field.id(), None, true, true, move |v: &mut Vec<T>| {
            v[index] = value;
        })
    }

    /// Element at `index`.
    pub fn get_at<T>(&mut self, field: MField<T>, index: usize) -> Result<T>
    where
        T: Clone + Debug + 'static,
    {
        self.check_index(field, index)?;
        self.with_value(field, |v| v[index].clone())
    }

    pub fn len<T>(&mut self, field: MField<T>) -> Result<usize>
    where
        T: Clone + Debug + 'static,
    {
        self.with_value(field, |v| v.len())
    }

    /// Index of the first element matching `pred`.
    ///
    /// Child lists use this to find a child of a given kind among
    /// heterogeneous entries.
    pub fn find<T>(
        &mut self,
        field: MField<T>,
        pred: impl Fn(&T) -> bool,
    ) -> Result<Option<usize>>
    where
        T: Clone + Debug + 'static,
    {
        self.with_value(field, |v| v.iter().position(|x| pred(x)))
    }

    fn check_index<T>(&mut self, field: MField<T>, index: usize) -> Result<()>
    where
        T: Clone + Debug + 'static,
    {
        let len = self.len(field)?;
        if index >= len {
            return Err(FieldError::IndexOutOfRange {
                field: self.full_name(field),
                index,
                len,
            });
        }
        Ok(())
    }
}
