//! Type-erased values and the type rules checked when routes are made.
//!
//! The engine stores every value as a `Box<dyn FieldValue>`. Typing lives
//! at the container level: each field records a [`FieldType`] (shape plus
//! element type) and an [`InputRule`] saying which field types it accepts
//! at each incoming route position. Mis-wired routes fail at connection
//! time, before any event can flow through them.

use std::any::{type_name, Any, TypeId};
use std::fmt::{self, Debug};

/// A value storable in a field.
///
/// Blanket-implemented for every `Clone + Debug + 'static` type.
pub trait FieldValue: Any {
    /// Clone into a fresh box.
    fn clone_value(&self) -> Box<dyn FieldValue>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Render the value for diagnostics.
    fn describe(&self) -> String;
}

impl<T> FieldValue for T
where
    T: Clone + Debug + 'static,
{
    fn clone_value(&self) -> Box<dyn FieldValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

/// Runtime identity of an element type.
#[derive(Clone, Copy)]
pub struct ValueType {
    id: TypeId,
    name: &'static str,
}

impl ValueType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ValueType {}

impl Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Container shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One value of the element type.
    Single,
    /// An ordered sequence of the element type.
    Multi,
    /// A display cache; holds a command list instead of a value.
    Cache,
    /// Internal fields with no meaningful value (event sink).
    Opaque,
}

/// Shape plus element type: what a route checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldType {
    pub shape: Shape,
    pub element: ValueType,
}

impl FieldType {
    pub fn single<T: 'static>() -> Self {
        Self {
            shape: Shape::Single,
            element: ValueType::of::<T>(),
        }
    }

    pub fn multi<T: 'static>() -> Self {
        Self {
            shape: Shape::Multi,
            element: ValueType::of::<T>(),
        }
    }

    pub(crate) fn cache() -> Self {
        Self {
            shape: Shape::Cache,
            element: ValueType::of::<()>(),
        }
    }

    pub(crate) fn opaque() -> Self {
        Self {
            shape: Shape::Opaque,
            element: ValueType::of::<()>(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            Shape::Single => write!(f, "SField<{}>", self.element.name),
            Shape::Multi => write!(f, "MField<{}>", self.element.name),
            Shape::Cache => f.write_str("DisplayList"),
            Shape::Opaque => f.write_str("Field"),
        }
    }
}

/// Which field types a field accepts as incoming routes.
///
/// Positions are the connection order of the incoming routes, the same
/// indices a recompute function sees through [`Inputs`](super::Inputs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRule {
    /// Accept anything. Used by caches and the event sink.
    Unchecked,
    /// The first `required.len()` routes must match position by position;
    /// any further route must match `rest`, or is refused if `rest` is None.
    Typed {
        required: Vec<FieldType>,
        rest: Option<FieldType>,
    },
}

/// Why a route was refused by an [`InputRule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RuleViolation {
    Mismatch { expected: FieldType },
    Full { max: usize },
}

impl InputRule {
    /// Any number of routes, all of the given type.
    pub fn any_number(of: FieldType) -> Self {
        InputRule::Typed {
            required: Vec::new(),
            rest: Some(of),
        }
    }

    /// Exactly these types, in this order.
    pub fn exact(types: Vec<FieldType>) -> Self {
        InputRule::Typed {
            required: types,
            rest: None,
        }
    }

    pub(crate) fn check(&self, index: usize, found: FieldType) -> Result<(), RuleViolation> {
        match self {
            InputRule::Unchecked => Ok(()),
            InputRule::Typed { required, rest } => {
                let expected = match required.get(index) {
                    Some(t) => *t,
                    None => match rest {
                        Some(t) => *t,
                        None => return Err(RuleViolation::Full { max: required.len() }),
                    },
                };
                if expected == found {
                    Ok(())
                } else {
                    Err(RuleViolation::Mismatch { expected })
                }
            }
        }
    }
}
