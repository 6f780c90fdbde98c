//! Property type system: the typed parameters of actions and event fields.
//!
//! Every configurable parameter is described by a [`PropertyDescriptor`]
//! (name, [`PropertyType`], [`PropertySubType`], [`Constraints`]). Raw input
//! coming from rule files or a UI is turned into a normalised [`Value`] by the
//! [`TypeRegistry`](crate::registry::TypeRegistry); the pair of descriptor and
//! value is a [`PropertyValue`].

mod descriptor;
mod kind;
mod value;

pub use descriptor::{Choice, Constraints, PropertyDescriptor};
pub use kind::{PropertySubType, PropertyType};
pub use value::{PropertyValue, Value, json_kind};
