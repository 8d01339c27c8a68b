//! Caller-facing projection of aggregator state. Pure functions, no I/O.

use crate::state::{InstanceId, SourceInstance};
use crate::types::{AggregatorError, UnifiedItem};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Visible items per instance, keyed in activation order.
pub type ProjectedView = BTreeMap<InstanceId, Vec<UnifiedItem>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// The order adapters appended items in.
    #[default]
    Feed,
    /// Newest first; undated items last.
    Newest,
    Score,
    Comments,
}

impl FromStr for SortKey {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "feed" => Ok(SortKey::Feed),
            "newest" => Ok(SortKey::Newest),
            "score" => Ok(SortKey::Score),
            "comments" => Ok(SortKey::Comments),
            other => Err(AggregatorError::Config(format!(
                "unknown sort key '{}', expected feed|newest|score|comments",
                other
            ))),
        }
    }
}

/// Text the filter is matched against: title, summary, author and tags,
/// lower-cased.
fn searchable_text(item: &UnifiedItem) -> String {
    let mut text = String::with_capacity(item.title.len() + item.summary.len() + item.author.len());
    text.push_str(&item.title);
    text.push('\n');
    text.push_str(&item.summary);
    text.push('\n');
    text.push_str(&item.author);
    for tag in &item.tags {
        text.push('\n');
        text.push_str(tag);
    }
    text.to_lowercase()
}

/// `needle` must already be lower-cased.
pub fn matches_filter(item: &UnifiedItem, needle: &str) -> bool {
    needle.is_empty() || searchable_text(item).contains(needle)
}

/// Items of every instance that contain `filter` (case-insensitive), in
/// buffer order. A blank filter passes every buffer through unchanged.
pub fn project(instances: &[SourceInstance], filter: &str) -> ProjectedView {
    let needle = filter.trim().to_lowercase();

    instances
        .iter()
        .map(|instance| {
            let items = instance
                .items
                .iter()
                .filter(|item| matches_filter(item, &needle))
                .cloned()
                .collect();
            (instance.id, items)
        })
        .collect()
}

/// [`project`] followed by a stable sort of each instance's items.
pub fn project_sorted(instances: &[SourceInstance], filter: &str, sort: SortKey) -> ProjectedView {
    let mut view = project(instances, filter);
    for items in view.values_mut() {
        sort_items(items, sort);
    }
    view
}

pub fn sort_items(items: &mut [UnifiedItem], sort: SortKey) {
    match sort {
        SortKey::Feed => {}
        SortKey::Newest => items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        SortKey::Score => items.sort_by(|a, b| b.score.cmp(&a.score)),
        SortKey::Comments => items.sort_by(|a, b| b.comment_count.cmp(&a.comment_count)),
    }
}
