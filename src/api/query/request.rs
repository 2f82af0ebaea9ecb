//! Immutable query snapshot
//!
//! A [`FindRequest`] is what [`super::QueryBuilder::build`] produces and what
//! the compiler and the pagination cursor consume. It can be dispatched any
//! number of times.

use super::filters::Filter;
use super::orderby::SortKey;
use crate::api::model::{EntityType, PropertyDescriptor};
use std::fmt;

pub struct FindRequest<E> {
    pub(super) filter: Filter<E>,
    pub(super) select: Vec<PropertyDescriptor>,
    pub(super) expand: Vec<PropertyDescriptor>,
    pub(super) order_by: Vec<SortKey>,
    pub(super) max_page_size: Option<u32>,
    pub(super) limit: Option<usize>,
    pub(super) offset: Option<usize>,
}

impl<E: EntityType> FindRequest<E> {
    /// Request every record of `E` with no options.
    pub fn all() -> Self {
        Self {
            filter: Filter::empty(),
            select: Vec::new(),
            expand: Vec::new(),
            order_by: Vec::new(),
            max_page_size: None,
            limit: None,
            offset: None,
        }
    }

    pub fn filter(&self) -> &Filter<E> {
        &self.filter
    }

    /// Selected properties, de-duplicated by rendered name.
    pub fn select(&self) -> &[PropertyDescriptor] {
        &self.select
    }

    /// Expanded navigations, de-duplicated by rendered name.
    pub fn expand(&self) -> &[PropertyDescriptor] {
        &self.expand
    }

    pub fn order_by(&self) -> &[SortKey] {
        &self.order_by
    }

    /// Page size sent as `Prefer: odata.maxpagesize`.
    pub fn max_page_size(&self) -> Option<u32> {
        self.max_page_size
    }

    /// Number of records to yield at most. Applied client-side.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Number of leading records to skip. Applied client-side.
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }
}

impl<E: EntityType> Default for FindRequest<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E> Clone for FindRequest<E> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            select: self.select.clone(),
            expand: self.expand.clone(),
            order_by: self.order_by.clone(),
            max_page_size: self.max_page_size,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

impl<E> fmt::Debug for FindRequest<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindRequest")
            .field("entity", &std::any::type_name::<E>())
            .field("filter", &self.filter)
            .field("select", &self.select)
            .field("expand", &self.expand)
            .field("order_by", &self.order_by)
            .field("max_page_size", &self.max_page_size)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}
