use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use strata_types::PoolId;
use tracing::debug;

use crate::dispatch::{ClusterControl, ListEntry, ListPosition};
use crate::error::ClientResult;

/// Forward-only listing of the objects in a pool.
///
/// Pages are fetched lazily. Listing is best effort: objects created or
/// removed while the cursor is open may or may not appear.
pub struct ObjectCursor {
    cluster: Arc<dyn ClusterControl>,
    pool: PoolId,
    page_size: usize,
    buffer: VecDeque<ListEntry>,
    /// Start of the next page to fetch; `None` once the pool is exhausted.
    next: Option<ListPosition>,
    /// Resume point just after the last entry yielded.
    position: ListPosition,
}

impl ObjectCursor {
    pub(crate) fn open(
        cluster: Arc<dyn ClusterControl>,
        pool: PoolId,
        from: ListPosition,
        page_size: usize,
    ) -> Self {
        Self {
            cluster,
            pool,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            next: Some(from.clone()),
            position: from,
        }
    }

    pub fn pool(&self) -> PoolId {
        self.pool
    }

    /// Token that resumes listing after the last entry returned.
    pub fn position(&self) -> &ListPosition {
        &self.position
    }

    /// Next entry, or `None` at the end of the pool.
    pub fn next_entry(&mut self) -> ClientResult<Option<ListEntry>> {
        while self.buffer.is_empty() {
            let Some(from) = self.next.take() else {
                return Ok(None);
            };
            let page = self.cluster.list_objects(self.pool, &from, self.page_size)?;
            debug!(pool = %self.pool, entries = page.entries.len(), "listing page");
            self.buffer.extend(page.entries);
            self.next = page.next;
        }
        let entry = self.buffer.pop_front();
        if let Some(entry) = &entry {
            self.position = entry.position();
        }
        Ok(entry)
    }

    /// End the listing.
    pub fn close(self) {}
}

impl Iterator for ObjectCursor {
    type Item = ClientResult<ListEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl std::fmt::Debug for ObjectCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCursor")
            .field("pool", &self.pool)
            .field("buffered", &self.buffer.len())
            .field("position", &self.position)
            .finish()
    }
}

/// Extended attributes returned by a get-xattrs sub-operation.
#[derive(Clone, Debug, Default)]
pub struct XattrIter {
    inner: std::vec::IntoIter<(String, Bytes)>,
}

impl XattrIter {
    pub(crate) fn new(pairs: Vec<(String, Bytes)>) -> Self {
        Self {
            inner: pairs.into_iter(),
        }
    }

    pub fn close(self) {}
}

impl Iterator for XattrIter {
    type Item = (String, Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for XattrIter {}

/// Omap entries returned by an omap get sub-operation.
#[derive(Clone, Debug, Default)]
pub struct OmapIter {
    inner: std::vec::IntoIter<(String, Bytes)>,
    more: bool,
}

impl OmapIter {
    pub(crate) fn new(entries: Vec<(String, Bytes)>, more: bool) -> Self {
        Self {
            inner: entries.into_iter(),
            more,
        }
    }

    /// Whether the request's `max` cut the result short.
    pub fn more(&self) -> bool {
        self.more
    }

    pub fn close(self) {}
}

impl Iterator for OmapIter {
    type Item = (String, Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for OmapIter {}
