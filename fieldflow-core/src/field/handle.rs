//! Typed Field Handles
//!
//! Handles are small `Copy` tokens naming a field in a [`FieldGraph`]. The
//! graph owns the value; the handle carries the value type so reads and
//! writes are checked at compile time, while routes between fields are
//! checked when they are made.
//!
//! # Kinds
//!
//! - [`SField<T>`]: one value of `T`.
//! - [`MField<T>`]: an ordered `Vec<T>`, duplicates kept.
//! - [`FanIn<T, A>`]: folds any number of `SField<T>` sources, in
//!   connection order, into one `A`.
//!
//! Fields are created through [`FieldBuilder`], obtained from
//! [`FieldGraph::sfield`], [`FieldGraph::mfield`] or
//! [`FieldGraph::fan_in`].

use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use indexmap::IndexSet;

use crate::error::Result;
use crate::graph::cell::{Cell, ComputeFn, Update};
use crate::graph::FieldGraph;

use super::{AccessType, FieldId, FieldType, FieldValue, InputRule, Inputs, NodeId};

/// Anything that names a field.
pub trait FieldHandle: Copy {
    fn id(&self) -> FieldId;
}

/// A handle that knows the value type of its field.
pub trait TypedField: FieldHandle {
    type Value: Clone + Debug + 'static;
}

impl FieldHandle for FieldId {
    fn id(&self) -> FieldId {
        *self
    }
}

macro_rules! handle_impls {
    ($name:ident < $($p:ident),+ >) => {
        impl<$($p),+> Clone for $name<$($p),+> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<$($p),+> Copy for $name<$($p),+> {}

        impl<$($p),+> PartialEq for $name<$($p),+> {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl<$($p),+> Eq for $name<$($p),+> {}

        impl<$($p),+> Hash for $name<$($p),+> {
            fn hash<S: Hasher>(&self, state: &mut S) {
                self.id.hash(state)
            }
        }

        impl<$($p),+> Debug for $name<$($p),+> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.id)
            }
        }

        impl<$($p),+> FieldHandle for $name<$($p),+> {
            fn id(&self) -> FieldId {
                self.id
            }
        }

        impl<$($p),+> From<$name<$($p),+>> for FieldId {
            fn from(handle: $name<$($p),+>) -> FieldId {
                handle.id
            }
        }
    };
}

/// Handle to a single-valued field.
pub struct SField<T> {
    id: FieldId,
    _value: PhantomData<fn() -> T>,
}

impl<T> SField<T> {
    pub(crate) fn from_id(id: FieldId) -> Self {
        Self {
            id,
            _value: PhantomData,
        }
    }
}

/// Handle to a multi-valued field.
pub struct MField<T> {
    id: FieldId,
    _value: PhantomData<fn() -> T>,
}

impl<T> MField<T> {
    pub(crate) fn from_id(id: FieldId) -> Self {
        Self {
            id,
            _value: PhantomData,
        }
    }
}

/// Handle to a fan-in field folding `T` sources into an `A`.
///
/// The fan-in is itself single-valued: it routes onward like an
/// `SField<A>`, see [`FanIn::as_sfield`].
pub struct FanIn<T, A> {
    id: FieldId,
    _value: PhantomData<fn() -> (T, A)>,
}

impl<T, A> FanIn<T, A> {
    pub(crate) fn from_id(id: FieldId) -> Self {
        Self {
            id,
            _value: PhantomData,
        }
    }

    /// View the aggregate as a plain single-valued field.
    pub fn as_sfield(&self) -> SField<A> {
        SField::from_id(self.id)
    }
}

handle_impls!(SField<T>);
handle_impls!(MField<T>);
handle_impls!(FanIn<T, A>);

impl<T: Clone + Debug + 'static> TypedField for SField<T> {
    type Value = T;
}

impl<T: Clone + Debug + 'static> TypedField for MField<T> {
    type Value = Vec<T>;
}

impl<T, A: Clone + Debug + 'static> TypedField for FanIn<T, A> {
    type Value = A;
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Configures a new field before it is added to the graph.
///
/// ```rust,ignore
/// let x = graph.sfield("x", 0).build()?;
/// let doubled = graph
///     .sfield("doubled", 0)
///     .compute(|inputs| inputs.value::<i32>(0).copied().unwrap_or(0) * 2)
///     .build()?;
/// graph.route(x, doubled)?;
/// ```
#[must_use = "a field is only created by `build()`"]
pub struct FieldBuilder<'g, H> {
    graph: &'g mut FieldGraph,
    make: fn(FieldId) -> H,
    name: String,
    field_type: FieldType,
    value: Box<dyn FieldValue>,
    owner: Option<NodeId>,
    access: AccessType,
    input_rule: Option<InputRule>,
    compute: Option<ComputeFn>,
    auto_update: bool,
    collect_events: bool,
}

impl<'g, H: TypedField> FieldBuilder<'g, H> {
    fn new(
        graph: &'g mut FieldGraph,
        make: fn(FieldId) -> H,
        name: &str,
        field_type: FieldType,
        value: H::Value,
    ) -> Self {
        Self {
            graph,
            make,
            name: name.to_string(),
            field_type,
            value: Box::new(value),
            owner: None,
            access: AccessType::InputOutput,
            input_rule: None,
            compute: None,
            auto_update: false,
            collect_events: false,
        }
    }

    /// Attach the field to a node. The node must already exist.
    pub fn owner(mut self, node: NodeId) -> Self {
        self.owner = Some(node);
        self
    }

    pub fn access(mut self, access: AccessType) -> Self {
        self.access = access;
        self
    }

    /// Replace the default "any number of my own type" input rule.
    pub fn inputs(mut self, rule: InputRule) -> Self {
        self.input_rule = Some(rule);
        self
    }

    /// Recompute from the incoming routes instead of copying the value of
    /// whichever source sent the event.
    ///
    /// The field starts stale, so the first read runs `f`.
    pub fn compute<F>(mut self, f: F) -> Self
    where
        F: Fn(&Inputs<'_>) -> H::Value + 'static,
    {
        let compute: ComputeFn =
            Box::new(move |inputs: &Inputs<'_>| Box::new(f(inputs)) as Box<dyn FieldValue>);
        self.compute = Some(compute);
        self
    }

    /// Recompute as soon as an event arrives.
    pub fn auto_update(mut self) -> Self {
        self.auto_update = true;
        self
    }

    /// Record which fields caused pending events, see
    /// [`FieldGraph::caused_by`].
    pub fn collect_events(mut self) -> Self {
        self.collect_events = true;
        self
    }

    /// Add the field to the graph.
    pub fn build(self) -> Result<H> {
        let id = FieldId::next();
        let mut cell = Cell::new(self.name, self.field_type, self.value);
        cell.owner = self.owner;
        cell.access = self.access;
        if let Some(rule) = self.input_rule {
            cell.input_rule = rule;
        }
        let computes = self.compute.is_some();
        if let Some(compute) = self.compute {
            cell.update = Update::Compute(compute);
            cell.event.source = Some(id);
        }
        cell.auto_update = self.auto_update;
        if self.collect_events {
            cell.causes = Some(IndexSet::new());
        }

        self.graph.insert_cell(id, cell)?;
        if computes && self.auto_update {
            self.graph.refresh(id);
        }
        Ok((self.make)(id))
    }
}

impl FieldGraph {
    /// Start building a single-valued field.
    pub fn sfield<T>(&mut self, name: &str, initial: T) -> FieldBuilder<'_, SField<T>>
    where
        T: Clone + Debug + 'static,
    {
        FieldBuilder::new(self, SField::from_id, name, FieldType::single::<T>(), initial)
    }

    /// Start building a multi-valued field.
    pub fn mfield<T>(&mut self, name: &str, initial: Vec<T>) -> FieldBuilder<'_, MField<T>>
    where
        T: Clone + Debug + 'static,
    {
        FieldBuilder::new(self, MField::from_id, name, FieldType::multi::<T>(), initial)
    }

    /// Start building a fan-in field.
    ///
    /// Accepts any number of `SField<T>` routes. `fold` receives their
    /// values in connection order, so order-sensitive folds ("first true
    /// wins") see a stable order.
    pub fn fan_in<T, A, F>(
        &mut self,
        name: &str,
        initial: A,
        fold: F,
    ) -> FieldBuilder<'_, FanIn<T, A>>
    where
        T: Clone + Debug + 'static,
        A: Clone + Debug + 'static,
        F: Fn(&[&T]) -> A + 'static,
    {
        FieldBuilder::new(self, FanIn::from_id, name, FieldType::single::<A>(), initial)
            .inputs(InputRule::any_number(FieldType::single::<T>()))
            .compute(move |inputs| {
                let values: Vec<&T> = inputs.values::<T>().collect();
                fold(&values)
            })
    }
}
