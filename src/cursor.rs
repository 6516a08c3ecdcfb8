//! Offset-based lazy iteration over list endpoints.
//!
//! The API has no real cursor, only a row offset, so entities added or
//! removed mid-iteration can shift pages under the iterator; callers that
//! need a stable snapshot should collect quickly or filter by
//! `modified_since`.

use std::collections::VecDeque;

use crate::client::{AmocrmClient, GetQuery};
use crate::errors::ApiError;
use crate::models::Model;

pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Pull-based iterator over one list endpoint.
///
/// A page is fetched whenever the buffer runs dry; the endpoint is
/// considered exhausted once it returns fewer rows than requested.
/// Cancellation is simply dropping the iterator.
pub struct CursorFetch<'c, M: Model> {
    client: &'c AmocrmClient,
    query: GetQuery,
    cursor: usize,
    page_size: usize,
    buffer: VecDeque<M>,
    has_more: bool,
}

impl<'c, M: Model> CursorFetch<'c, M> {
    pub(crate) fn new(client: &'c AmocrmClient, query: GetQuery) -> Self {
        let cursor = query.cursor.unwrap_or(0);
        let page_size = if query.cursor_count > 0 {
            query.cursor_count
        } else {
            DEFAULT_PAGE_SIZE
        };
        Self {
            client,
            query,
            cursor,
            page_size,
            buffer: VecDeque::new(),
            has_more: true,
        }
    }

    /// Current row offset; useful for resuming a broken-off iteration.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Next entity, fetching the next page when needed. `None` once the
    /// endpoint is exhausted.
    pub async fn try_next(&mut self) -> Result<Option<M>, ApiError> {
        if self.buffer.is_empty() && self.has_more {
            let mut query = self.query.clone();
            query.cursor = Some(self.cursor);
            query.cursor_count = self.page_size;
            let page: Vec<M> = self.client.get_objects(&query).await?;
            self.has_more = page.len() >= self.page_size;
            self.cursor += page.len();
            self.buffer.extend(page);
        }
        Ok(self.buffer.pop_front())
    }

    /// Drains the remaining pages into one vector.
    pub async fn try_collect(mut self) -> Result<Vec<M>, ApiError> {
        let mut all = Vec::new();
        while let Some(entity) = self.try_next().await? {
            all.push(entity);
        }
        Ok(all)
    }
}
