//! Entity and property model
//!
//! Typed handles that identify entity attributes and navigation links. The
//! query layer only ever sees the untyped [`PropertyDescriptor`] behind them.

pub mod entity;
pub mod property;
pub mod record;
pub mod value;

pub use entity::{EntityId, EntityType, Untyped};
pub use property::{
    Many, Navigable, Property, PropertyDescriptor, PropertyKind, PropertyValue, Ref, Scalar, Selectable, ValueKind,
    filter_name, navigation_name, selectable_name, value_name,
};
pub use record::EntityRecord;
pub use value::Value;
