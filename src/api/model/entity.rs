//! Entity type tags and entity identities

use crate::error::{DynamicsError, Result};
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

/// Length of a hyphenated guid (`8-4-4-4-12`).
pub const GUID_LENGTH: usize = 36;

/// Compile-time name tag for a logical entity (table).
///
/// Implemented by zero-sized marker types and used as a type parameter on
/// property handles, filters and requests so that properties of one entity
/// can never end up in a query over another.
///
/// ```rust,ignore
/// pub struct Contact;
///
/// impl EntityType for Contact {
///     const LOGICAL_NAME: &'static str = "contact";
/// }
/// ```
pub trait EntityType: Send + Sync + 'static {
    const LOGICAL_NAME: &'static str;

    /// Primary key attribute of the entity.
    fn primary_key() -> String {
        format!("{}id", Self::LOGICAL_NAME)
    }
}

/// Marker for queries whose entity is only known at runtime.
///
/// Requests over `Untyped` must be dispatched with an explicit entity set
/// name (see [`crate::api::DynamicsClient::find_in`]).
#[derive(Debug, Clone, Copy)]
pub struct Untyped;

impl EntityType for Untyped {
    const LOGICAL_NAME: &'static str = "untyped";
}

/// Identity of a single record: its guid plus the entity it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId {
    id: Uuid,
    entity: Cow<'static, str>,
}

impl EntityId {
    pub fn new(entity: impl Into<Cow<'static, str>>, id: Uuid) -> Self {
        Self {
            id,
            entity: entity.into(),
        }
    }

    pub fn of<E: EntityType>(id: Uuid) -> Self {
        Self::new(E::LOGICAL_NAME, id)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Recover the id from an `OData-EntityId` header value such as
    /// `https://org.crm.dynamics.com/api/data/v9.2/contacts(00000000-0000-0000-0000-000000000001)`.
    ///
    /// Only the trailing guid segment is used; the entity comes from the caller.
    pub fn from_entity_id_header(entity: impl Into<Cow<'static, str>>, header: &str) -> Result<Self> {
        let trimmed = header.trim().trim_end_matches(')');
        if trimmed.len() < GUID_LENGTH {
            return Err(DynamicsError::malformed(format!(
                "entity id header '{}' is too short to carry a guid",
                header
            )));
        }

        let segment = trimmed
            .get(trimmed.len() - GUID_LENGTH..)
            .ok_or_else(|| DynamicsError::malformed(format!("entity id header '{}' is not ASCII", header)))?;
        let id = Uuid::parse_str(segment).map_err(|e| {
            DynamicsError::malformed(format!("entity id header '{}' has no trailing guid: {}", header, e))
        })?;

        Ok(Self::new(entity, id))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}({})", self.entity, self.id.hyphenated())
    }
}
