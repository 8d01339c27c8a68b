use crate::types::{Cursor, Page, SourceError, SourceParams, SourceType};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Translates one upstream API into pages of unified items.
///
/// Adapters hold configuration only; every call is independent of the last.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which source this adapter serves
    fn source_type(&self) -> SourceType;

    /// Whether `fetch_page` can return more than one page. Single-shot
    /// sources start with nothing more to load.
    fn is_paginated(&self) -> bool {
        true
    }

    /// Fetch the page at `cursor`, or the first page when `cursor` is `None`.
    ///
    /// Should resolve to [`SourceError::Cancelled`] soon after `cancel` fires.
    async fn fetch_page(
        &self,
        params: &SourceParams,
        cursor: Option<&Cursor>,
        cancel: &CancellationToken,
    ) -> Result<Page, SourceError>;
}
