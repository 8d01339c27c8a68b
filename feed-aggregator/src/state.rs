use crate::types::{Cursor, Page, SourceParams, SourceType, UnifiedItem};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Stable handle for one activated source instance. Ids are never reused
/// and sort in activation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pagination state and item buffer of one source instance.
///
/// Owned by the aggregator; callers only ever see clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInstance {
    pub id: InstanceId,
    pub source_type: SourceType,
    pub params: SourceParams,
    pub cursor: Option<Cursor>,
    pub items: Vec<UnifiedItem>,
    pub has_more: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
    /// Refresh epoch this instance was last reset in.
    pub epoch: u64,
}

impl SourceInstance {
    pub fn new(
        id: InstanceId,
        source_type: SourceType,
        params: SourceParams,
        paginated: bool,
        epoch: u64,
    ) -> Self {
        Self {
            id,
            source_type,
            params,
            cursor: None,
            items: Vec::new(),
            has_more: paginated,
            is_loading: false,
            last_error: None,
            epoch,
        }
    }

    /// `load_more` is only allowed when there is a next page and nothing
    /// is in flight.
    pub fn can_load_more(&self) -> bool {
        self.has_more && !self.is_loading
    }

    /// Back to the first page: empty buffer, no cursor, no error.
    pub(crate) fn reset(&mut self, paginated: bool, epoch: u64) {
        self.items.clear();
        self.cursor = None;
        self.has_more = paginated;
        self.last_error = None;
        self.epoch = epoch;
    }

    /// Append a page after the existing items and advance the cursor.
    /// Items whose id is already buffered are dropped. Returns how many
    /// items were appended.
    pub(crate) fn append_page(&mut self, page: Page) -> usize {
        let mut seen: HashSet<String> = self.items.iter().map(|item| item.id.clone()).collect();
        let before = self.items.len();
        for item in page.items {
            if seen.insert(item.id.clone()) {
                self.items.push(item);
            }
        }

        self.has_more = page.has_more && page.next_cursor.is_some();
        if page.next_cursor.is_some() {
            self.cursor = page.next_cursor;
        }
        self.items.len() - before
    }
}
