//! Cursor-based pagination
//!
//! Turns a first page URL plus the server's `@odata.nextLink` chain into one
//! lazy stream of records. The next page is only requested once every record
//! of the current page has been pulled from the stream, and never after the
//! client-side limit has been reached.

use super::result::Page;
use crate::error::{DynamicsError, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use log::debug;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

/// Something that can fetch one page of a collection.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` verbatim. Only the page-size preference is sent along.
    async fn fetch_page(&self, url: &str, max_page_size: Option<u32>, cancel: &CancellationToken) -> Result<Page>;
}

/// Stream of raw entity documents.
pub type DocumentStream<'a> = BoxStream<'a, Result<Map<String, Value>>>;

/// Forward-only iteration over the pages of one request.
pub struct PaginationCursor<'a, F: ?Sized> {
    fetcher: &'a F,
    first_url: String,
    max_page_size: Option<u32>,
    offset: usize,
    limit: Option<usize>,
    cancel: CancellationToken,
}

impl<'a, F: PageFetcher + ?Sized> PaginationCursor<'a, F> {
    pub fn new(fetcher: &'a F, first_url: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            fetcher,
            first_url: first_url.into(),
            max_page_size: None,
            offset: 0,
            limit: None,
            cancel,
        }
    }

    pub fn max_page_size(mut self, size: Option<u32>) -> Self {
        self.max_page_size = size;
        self
    }

    /// Skip this many records before yielding.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Yield at most this many records.
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn into_stream(self) -> DocumentStream<'a> {
        let state = CursorState {
            fetcher: self.fetcher,
            next_url: Some(self.first_url),
            max_page_size: self.max_page_size,
            buffer: VecDeque::new(),
            skip: self.offset,
            remaining: self.limit,
            pages: 0,
            cancel: self.cancel,
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            let item = state.advance().await?;
            Some((item, state))
        })
        .boxed()
    }
}

struct CursorState<'a, F: ?Sized> {
    fetcher: &'a F,
    next_url: Option<String>,
    max_page_size: Option<u32>,
    buffer: VecDeque<Map<String, Value>>,
    skip: usize,
    remaining: Option<usize>,
    pages: usize,
    cancel: CancellationToken,
    finished: bool,
}

impl<F: PageFetcher + ?Sized> CursorState<'_, F> {
    async fn advance(&mut self) -> Option<Result<Map<String, Value>>> {
        loop {
            if self.finished || self.remaining == Some(0) {
                return None;
            }

            if let Some(document) = self.buffer.pop_front() {
                if self.skip > 0 {
                    self.skip -= 1;
                    continue;
                }
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Some(Ok(document));
            }

            let url = self.next_url.take()?;

            if self.cancel.is_cancelled() {
                self.finished = true;
                return Some(Err(DynamicsError::Cancelled));
            }

            match self.fetcher.fetch_page(&url, self.max_page_size, &self.cancel).await {
                Ok(page) => {
                    self.pages += 1;
                    debug!(
                        "Fetched page {} with {} records (more: {})",
                        self.pages,
                        page.len(),
                        page.has_more()
                    );
                    self.next_url = page.next_link;
                    self.buffer.extend(page.value);
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
