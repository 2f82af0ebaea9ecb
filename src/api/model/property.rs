//! Typed property and navigation handles
//!
//! Every handle is a thin typed wrapper around one [`PropertyDescriptor`]:
//! a tagged record of `{kind, path, value kind}`. The projections used by the
//! query compiler (`$select` name, `$expand` name, foreign-key value name) are
//! free functions over the descriptor rather than methods on a hierarchy of
//! handle types.
//!
//! Equality between handles is by name only, so a required and an optional
//! handle with the same name compare (and hash) equal.

use super::entity::EntityType;
use super::value::Value;
use crate::error::{DynamicsError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// What a single path segment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Scalar attribute that always carries a value.
    Required,
    /// Scalar attribute that may be null.
    Optional,
    /// Single-valued navigation that always resolves.
    Reference,
    /// Single-valued navigation that may be unset.
    OptionalReference,
    /// Collection-valued navigation.
    Collection,
}

impl PropertyKind {
    pub fn is_reference(self) -> bool {
        matches!(self, Self::Reference | Self::OptionalReference)
    }

    pub fn is_collection(self) -> bool {
        matches!(self, Self::Collection)
    }

    pub fn is_navigation(self) -> bool {
        self.is_reference() || self.is_collection()
    }

    pub fn is_required(self) -> bool {
        matches!(self, Self::Required | Self::Reference)
    }
}

/// Broad category of the value a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Guid,
    Integer,
    Float,
    Boolean,
    DateTime,
    Date,
    Json,
    Reference,
    Collection,
}

#[derive(Debug, Clone)]
struct Segment {
    kind: PropertyKind,
    name: Arc<str>,
}

/// Untyped description of a property or a navigation path.
///
/// A plain property has one segment; chained navigation (see
/// [`Property::navigate`]) appends the segments of the target handle.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    segments: Arc<[Segment]>,
    value_kind: ValueKind,
}

impl PropertyDescriptor {
    pub fn new(kind: PropertyKind, name: impl Into<String>, value_kind: ValueKind) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DynamicsError::InvalidProperty("property name must not be empty".into()));
        }
        if name.contains('/') {
            return Err(DynamicsError::InvalidProperty(format!(
                "property name '{}' must not contain '/'; use navigate() to chain",
                name
            )));
        }

        Ok(Self {
            segments: Arc::from(vec![Segment {
                kind,
                name: Arc::from(name),
            }]),
            value_kind,
        })
    }

    /// Kind of the last segment.
    pub fn kind(&self) -> PropertyKind {
        self.last().kind
    }

    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    /// Raw logical name, `/`-joined across chained segments.
    pub fn name(&self) -> String {
        self.join(|s| s.name.to_string())
    }

    /// Number of hops in the path.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    fn chain(&self, next: &PropertyDescriptor) -> PropertyDescriptor {
        let segments: Vec<Segment> = self.segments.iter().chain(next.segments.iter()).cloned().collect();
        PropertyDescriptor {
            segments: Arc::from(segments),
            value_kind: next.value_kind,
        }
    }

    fn last(&self) -> &Segment {
        // constructors never produce an empty path
        &self.segments[self.segments.len() - 1]
    }

    fn join(&self, render: impl Fn(&Segment) -> String) -> String {
        self.segments.iter().map(render).collect::<Vec<_>>().join("/")
    }
}

impl PartialEq for PropertyDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self.segments.iter().zip(other.segments.iter()).all(|(a, b)| a.name == b.name)
    }
}

impl Eq for PropertyDescriptor {}

impl Hash for PropertyDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for segment in self.segments.iter() {
            segment.name.hash(state);
        }
    }
}

fn segment_value_name(segment: &Segment) -> String {
    if segment.kind.is_reference() {
        format!("_{}_value", segment.name)
    } else {
        segment.name.to_string()
    }
}

/// Name used for `$select`, `$orderby` and filter operands.
///
/// Scalars render their own name, single-valued references their
/// `_name_value` foreign key. Collections are not selectable.
pub fn selectable_name(descriptor: &PropertyDescriptor) -> Option<String> {
    if descriptor.kind().is_collection() {
        return None;
    }
    Some(descriptor.join(segment_value_name))
}

/// Foreign-key projection of a single-valued reference.
pub fn value_name(descriptor: &PropertyDescriptor) -> Option<String> {
    if !descriptor.kind().is_reference() {
        return None;
    }
    selectable_name(descriptor)
}

/// Name used for `$expand` and as the head of a lambda.
pub fn navigation_name(descriptor: &PropertyDescriptor) -> Option<String> {
    if !descriptor.kind().is_navigation() {
        return None;
    }
    Some(descriptor.name())
}

/// How a descriptor renders when it appears inside a filter expression.
pub fn filter_name(descriptor: &PropertyDescriptor) -> String {
    selectable_name(descriptor).unwrap_or_else(|| descriptor.name())
}

/// Value types a property handle can carry.
pub trait PropertyValue: 'static {
    const KIND: ValueKind;
}

/// Values that can appear in `$select` and `$orderby`.
pub trait Selectable: PropertyValue {}

/// Values reachable through `$expand`.
pub trait Navigable: PropertyValue {}

/// Plain attribute values, comparable against constants.
pub trait Scalar: Selectable + Sized {
    fn into_value(self) -> Value;
}

/// Single-valued navigation to `X`.
pub struct Ref<X>(PhantomData<fn() -> X>);

/// Collection-valued navigation to `X`.
pub struct Many<X>(PhantomData<fn() -> X>);

impl<X: EntityType> PropertyValue for Ref<X> {
    const KIND: ValueKind = ValueKind::Reference;
}

impl<X: EntityType> PropertyValue for Many<X> {
    const KIND: ValueKind = ValueKind::Collection;
}

impl<X: EntityType> Selectable for Ref<X> {}
impl<X: EntityType> Navigable for Ref<X> {}
impl<X: EntityType> Navigable for Many<X> {}

macro_rules! scalar_values {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl PropertyValue for $ty {
                const KIND: ValueKind = ValueKind::$kind;
            }
            impl Selectable for $ty {}
            impl Scalar for $ty {
                fn into_value(self) -> Value {
                    Value::from(self)
                }
            }
        )*
    };
}

scalar_values! {
    String => String,
    Uuid => Guid,
    i32 => Integer,
    i64 => Integer,
    u32 => Integer,
    f64 => Float,
    bool => Boolean,
    DateTime<Utc> => DateTime,
    NaiveDate => Date,
    serde_json::Value => Json,
}

/// Typed handle to a property `T` of entity `E`.
pub struct Property<E, T> {
    descriptor: PropertyDescriptor,
    _marker: PhantomData<fn() -> (E, T)>,
}

impl<E: EntityType, T: PropertyValue> Property<E, T> {
    /// Build a handle from a runtime name.
    pub fn parse(kind: PropertyKind, name: impl Into<String>) -> Result<Self> {
        Ok(Self::from_descriptor(PropertyDescriptor::new(kind, name, T::KIND)?))
    }

    fn from_static(kind: PropertyKind, name: &'static str) -> Self {
        match Self::parse(kind, name) {
            Ok(property) => property,
            Err(e) => panic!("invalid property literal {:?}: {}", name, e),
        }
    }

    fn from_descriptor(descriptor: PropertyDescriptor) -> Self {
        Self {
            descriptor,
            _marker: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> PropertyKind {
        self.descriptor.kind()
    }

    pub fn name(&self) -> String {
        self.descriptor.name()
    }
}

impl<E: EntityType, T: Scalar> Property<E, T> {
    /// Required scalar.
    ///
    /// # Panics
    ///
    /// On an empty name; use [`Property::parse`] for names known only at runtime.
    pub fn required(name: &'static str) -> Self {
        Self::from_static(PropertyKind::Required, name)
    }

    /// Optional scalar.
    ///
    /// # Panics
    ///
    /// On an empty name; use [`Property::parse`] for names known only at runtime.
    pub fn optional(name: &'static str) -> Self {
        Self::from_static(PropertyKind::Optional, name)
    }
}

impl<E: EntityType, T: Selectable> Property<E, T> {
    pub fn selectable_name(&self) -> String {
        filter_name(&self.descriptor)
    }
}

impl<E: EntityType, X: EntityType> Property<E, Ref<X>> {
    /// Required single-valued navigation.
    ///
    /// # Panics
    ///
    /// On an empty name.
    pub fn reference(name: &'static str) -> Self {
        Self::from_static(PropertyKind::Reference, name)
    }

    /// Optional single-valued navigation.
    ///
    /// # Panics
    ///
    /// On an empty name.
    pub fn optional_reference(name: &'static str) -> Self {
        Self::from_static(PropertyKind::OptionalReference, name)
    }

    /// Reach a property of the related entity without expanding it.
    ///
    /// `primarycontactid.navigate(&parentcustomerid)` renders as
    /// `_primarycontactid_value/_parentcustomerid_value` in filters and as
    /// `primarycontactid/parentcustomerid` when expanded. Apply repeatedly
    /// for deeper paths.
    pub fn navigate<T: PropertyValue>(&self, other: &Property<X, T>) -> Property<E, T> {
        Property::from_descriptor(self.descriptor.chain(&other.descriptor))
    }

    pub fn value_name(&self) -> String {
        // a single-valued reference always has a value projection
        filter_name(&self.descriptor)
    }
}

impl<E: EntityType, X: EntityType> Property<E, Many<X>> {
    /// Collection-valued navigation.
    ///
    /// # Panics
    ///
    /// On an empty name.
    pub fn collection(name: &'static str) -> Self {
        Self::from_static(PropertyKind::Collection, name)
    }
}

impl<E, T> Clone for Property<E, T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E, T> fmt::Debug for Property<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("kind", &self.descriptor.kind())
            .field("name", &self.descriptor.name())
            .finish()
    }
}

impl<E, T> PartialEq for Property<E, T> {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
    }
}

impl<E, T> Eq for Property<E, T> {}

impl<E, T> Hash for Property<E, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.descriptor.hash(state);
    }
}
