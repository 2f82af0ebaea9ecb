//! QueryBuilder for fluent query construction
//!
//! Provides a fluent API that builds [`FindRequest`] snapshots for execution

use super::filters::Filter;
use super::orderby::SortKey;
use super::request::FindRequest;
use crate::api::client::DynamicsClient;
use crate::api::model::{EntityRecord, EntityType, Navigable, Property, PropertyDescriptor, Selectable, filter_name};
use crate::error::Result;
use tokio_util::sync::CancellationToken;

pub struct QueryBuilder<E> {
    request: FindRequest<E>,
}

impl<E: EntityType> QueryBuilder<E> {
    pub fn new() -> Self {
        Self {
            request: FindRequest::all(),
        }
    }

    /// Add filter condition; repeated calls are combined with `and`
    pub fn filter(mut self, filter: Filter<E>) -> Self {
        let current = std::mem::take(&mut self.request.filter);
        self.request.filter = current & filter;
        self
    }

    /// Select a field; selecting the same field twice keeps one entry
    pub fn select<T: Selectable>(mut self, property: &Property<E, T>) -> Self {
        push_unique(&mut self.request.select, property.descriptor());
        self
    }

    /// Expand a related entity or collection
    pub fn expand<T: Navigable>(mut self, property: &Property<E, T>) -> Self {
        push_unique(&mut self.request.expand, property.descriptor());
        self
    }

    /// Sort ascending, discarding any earlier sort keys
    pub fn order_by<T: Selectable>(mut self, property: &Property<E, T>) -> Self {
        self.request.order_by.clear();
        self.request.order_by.push(SortKey::asc(property.selectable_name()));
        self
    }

    /// Sort descending, discarding any earlier sort keys
    pub fn order_by_descending<T: Selectable>(mut self, property: &Property<E, T>) -> Self {
        self.request.order_by.clear();
        self.request.order_by.push(SortKey::desc(property.selectable_name()));
        self
    }

    /// Add a secondary ascending sort key
    pub fn then_by<T: Selectable>(mut self, property: &Property<E, T>) -> Self {
        self.request.order_by.push(SortKey::asc(property.selectable_name()));
        self
    }

    /// Add a secondary descending sort key
    pub fn then_by_descending<T: Selectable>(mut self, property: &Property<E, T>) -> Self {
        self.request.order_by.push(SortKey::desc(property.selectable_name()));
        self
    }

    /// Ask the server for at most `size` records per page
    pub fn max_page_size(mut self, size: u32) -> Self {
        self.request.max_page_size = Some(size);
        self
    }

    /// Stop after `limit` records
    pub fn limit(mut self, limit: usize) -> Self {
        self.request.limit = Some(limit);
        self
    }

    /// Skip the first `offset` records
    pub fn offset(mut self, offset: usize) -> Self {
        self.request.offset = Some(offset);
        self
    }

    /// Build the final request (reusable)
    pub fn build(self) -> FindRequest<E> {
        self.request
    }

    /// Build and collect every matching record
    pub async fn execute(self, client: &DynamicsClient, cancel: &CancellationToken) -> Result<Vec<EntityRecord<E>>> {
        let request = self.build();
        client.find_all(&request, cancel).await
    }
}

impl<E: EntityType> Default for QueryBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn push_unique(list: &mut Vec<PropertyDescriptor>, descriptor: &PropertyDescriptor) {
    let name = filter_name(descriptor);
    if !list.iter().any(|d| filter_name(d) == name) {
        list.push(descriptor.clone());
    }
}
