//! Fields
//!
//! The vocabulary shared by every other module: identifiers, access
//! kinds, type-erased values with their route-time type rules, typed
//! handles and the positional view a recompute function gets of its
//! incoming routes.

mod access;
mod handle;
mod id;
mod inputs;
mod value;

pub use access::AccessType;
pub use handle::{FanIn, FieldBuilder, FieldHandle, MField, SField, TypedField};
pub use id::{FieldId, NodeId};
pub use inputs::Inputs;
pub use value::{FieldType, FieldValue, InputRule, Shape, ValueType};

pub(crate) use value::RuleViolation;
