//! Query result handling
//!
//! Handles the OData collection envelope returned by Dynamics 365:
//!
//! ```json
//! {
//!   "@odata.context": "https://org.crm.dynamics.com/api/data/v9.2/$metadata#contacts(fullname)",
//!   "@odata.nextLink": "https://org.crm.dynamics.com/api/data/v9.2/contacts?$select=fullname&$skiptoken=...",
//!   "value": [ { ... }, { ... } ]
//! }
//! ```

use crate::api::constants::odata;
use crate::error::{DynamicsError, Result};
use serde_json::{Map, Value};

/// One page of a collection response.
#[derive(Debug, Clone)]
pub struct Page {
    pub context: Option<String>,
    pub next_link: Option<String>,
    pub count: Option<u64>,
    pub value: Vec<Map<String, Value>>,
}

impl Page {
    /// Parse OData response JSON into a page
    pub fn from_json(json: Value) -> Result<Self> {
        let Value::Object(mut envelope) = json else {
            return Err(DynamicsError::malformed("collection response is not a JSON object"));
        };

        let value = match envelope.remove(odata::VALUE) {
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(DynamicsError::malformed(format!(
                        "entry {} of 'value' is not an object: {}",
                        index, other
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(DynamicsError::malformed("'value' is not an array")),
            None => return Err(DynamicsError::malformed("missing 'value' array in response")),
        };

        let context = envelope
            .get(odata::CONTEXT)
            .and_then(Value::as_str)
            .map(str::to_string);

        let next_link = envelope
            .get(odata::NEXT_LINK)
            .and_then(Value::as_str)
            .map(str::to_string);

        let count = envelope.get(odata::COUNT).and_then(Value::as_u64);

        Ok(Self {
            context,
            next_link,
            count,
            value,
        })
    }

    /// Entity set the page belongs to, recovered from `@odata.context`
    pub fn entity_set(&self) -> Result<String> {
        let context = self
            .context
            .as_deref()
            .ok_or_else(|| DynamicsError::malformed("missing '@odata.context' in response"))?;
        entity_set_from_context(context)
            .ok_or_else(|| DynamicsError::malformed(format!("cannot read an entity set from context '{}'", context)))
    }

    /// Check if there are more results available
    pub fn has_more(&self) -> bool {
        self.next_link.is_some()
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// `.../$metadata#contacts(fullname)` → `contacts`
pub fn entity_set_from_context(context: &str) -> Option<String> {
    let (_, fragment) = context.split_once("#")?;
    let name: String = fragment
        .chars()
        .take_while(|c| !matches!(c, '(' | '/' | '$'))
        .collect();
    if name.is_empty() { None } else { Some(name) }
}
