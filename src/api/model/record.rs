//! Typed access to entity documents returned by the Web API

use super::entity::{EntityId, EntityType};
use super::property::{Many, Property, Ref, Scalar, filter_name, navigation_name};
use crate::error::{DynamicsError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

/// One entity document, read through the property handles of `E`.
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct EntityRecord<E> {
    fields: Map<String, Value>,
    #[serde(skip)]
    _entity: PhantomData<fn() -> E>,
}

impl<E: EntityType> EntityRecord<E> {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            _entity: PhantomData,
        }
    }

    /// Primary key of the record, when it was selected.
    pub fn id(&self) -> Option<EntityId> {
        self.fields
            .get(&E::primary_key())
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(EntityId::of::<E>)
    }

    /// Value of a property that must be present.
    pub fn required<T: Scalar + DeserializeOwned>(&self, property: &Property<E, T>) -> Result<T> {
        let name = filter_name(property.descriptor());
        match self.fields.get(&name) {
            None | Some(Value::Null) => Err(DynamicsError::NullReferenceViolation { property: name }),
            Some(value) => Ok(serde_json::from_value(value.clone())?),
        }
    }

    pub fn optional<T: Scalar + DeserializeOwned>(&self, property: &Property<E, T>) -> Result<Option<T>> {
        match self.fields.get(&filter_name(property.descriptor())) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    /// Foreign key of a single-valued navigation that must be set.
    pub fn reference<X: EntityType>(&self, property: &Property<E, Ref<X>>) -> Result<EntityId> {
        self.optional_reference(property)?
            .ok_or_else(|| DynamicsError::NullReferenceViolation {
                property: property.value_name(),
            })
    }

    pub fn optional_reference<X: EntityType>(&self, property: &Property<E, Ref<X>>) -> Result<Option<EntityId>> {
        let name = property.value_name();
        match self.fields.get(&name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Uuid::parse_str(s)
                .map(|id| Some(EntityId::of::<X>(id)))
                .map_err(|e| DynamicsError::malformed(format!("field '{}' is not a guid: {}", name, e))),
            Some(other) => Err(DynamicsError::malformed(format!(
                "field '{}' is not a guid: {}",
                name, other
            ))),
        }
    }

    /// The related record, when the navigation was expanded.
    pub fn expanded<X: EntityType>(&self, property: &Property<E, Ref<X>>) -> Result<Option<EntityRecord<X>>> {
        let Some(name) = navigation_name(property.descriptor()) else {
            return Ok(None);
        };
        match self.fields.get(&name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(EntityRecord::new(map.clone()))),
            Some(_) => Err(DynamicsError::malformed(format!("expanded '{}' is not an object", name))),
        }
    }

    /// The related records of an expanded collection; empty when not expanded.
    pub fn expanded_collection<X: EntityType>(&self, property: &Property<E, Many<X>>) -> Result<Vec<EntityRecord<X>>> {
        let Some(name) = navigation_name(property.descriptor()) else {
            return Ok(Vec::new());
        };
        match self.fields.get(&name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(EntityRecord::new(map.clone())),
                    _ => Err(DynamicsError::malformed(format!("expanded '{}' holds a non-object", name))),
                })
                .collect(),
            Some(_) => Err(DynamicsError::malformed(format!("expanded '{}' is not an array", name))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.fields
    }
}

impl<E> Clone for EntityRecord<E> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for EntityRecord<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter()).finish()
    }
}
