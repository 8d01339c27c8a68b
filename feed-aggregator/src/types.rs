use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which upstream API an item or instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    News,
    Forum,
    Feature,
    Quote,
}

impl SourceType {
    pub const ALL: [SourceType; 4] = [
        SourceType::News,
        SourceType::Forum,
        SourceType::Feature,
        SourceType::Quote,
    ];

    /// Prefix used for item ids so ids from different sources never collide.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            SourceType::News => "news",
            SourceType::Forum => "forum",
            SourceType::Feature => "feature",
            SourceType::Quote => "quote",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id_prefix())
    }
}

/// The normalized record every adapter maps its payload into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedItem {
    pub id: String,
    pub source: SourceType,
    pub title: String,
    /// Absolute URL or empty.
    pub url: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub summary: String,
    pub score: u64,
    pub comment_count: u64,
    pub author: String,
    /// Absolute URL or empty.
    pub image_url: String,
    pub tags: Vec<String>,
}

/// How far back the news adapter searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecencyWindow {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[default]
    #[serde(rename = "all")]
    All,
}

impl RecencyWindow {
    /// Earliest publication time admitted by this window, `None` for `all`.
    pub fn lower_bound(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            RecencyWindow::Day => Some(now - Duration::hours(24)),
            RecencyWindow::Week => Some(now - Duration::days(7)),
            RecencyWindow::Month => Some(now - Duration::days(30)),
            RecencyWindow::All => None,
        }
    }
}

impl FromStr for RecencyWindow {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "24h" => Ok(RecencyWindow::Day),
            "7d" => Ok(RecencyWindow::Week),
            "30d" => Ok(RecencyWindow::Month),
            "all" => Ok(RecencyWindow::All),
            other => Err(AggregatorError::Config(format!(
                "unknown recency window '{}', expected 24h|7d|30d|all",
                other
            ))),
        }
    }
}

impl fmt::Display for RecencyWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecencyWindow::Day => "24h",
            RecencyWindow::Week => "7d",
            RecencyWindow::Month => "30d",
            RecencyWindow::All => "all",
        };
        f.write_str(s)
    }
}

/// Parameters an instance is activated with. Each adapter reads the fields
/// that mean something to it and ignores the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceParams {
    pub query: Option<String>,
    pub window: RecencyWindow,
    /// Sub-forum for the forum adapter.
    pub group: Option<String>,
}

impl SourceParams {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_window(mut self, window: RecencyWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// The query with surrounding whitespace removed, `None` if blank.
    pub fn trimmed_query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

/// Source-specific pagination position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    Page(u32),
    Token(String),
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Page(page) => write!(f, "page {}", page),
            Cursor::Token(token) => write!(f, "after {}", token),
        }
    }
}

/// One page of normalized items as returned by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<UnifiedItem>,
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}

impl Page {
    /// A page from a source without pagination.
    pub fn single(items: Vec<UnifiedItem>) -> Self {
        Self {
            items,
            next_cursor: None,
            has_more: false,
        }
    }
}

/// What went wrong talking to an upstream API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFailure {
    Status(u16),
    Network(String),
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamFailure::Status(code) => write!(f, "HTTP {}", code),
            UpstreamFailure::Network(message) => write!(f, "network error: {}", message),
        }
    }
}

/// Failure of a single adapter call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("{source_type} upstream failed: {failure}")]
    Upstream {
        source_type: SourceType,
        failure: UpstreamFailure,
    },

    #[error("{source_type} returned a malformed response: {message}")]
    MalformedResponse {
        source_type: SourceType,
        message: String,
    },

    #[error("request cancelled")]
    Cancelled,
}

impl SourceError {
    pub fn status(source_type: SourceType, code: u16) -> Self {
        SourceError::Upstream {
            source_type,
            failure: UpstreamFailure::Status(code),
        }
    }

    pub fn network(source_type: SourceType, message: impl Into<String>) -> Self {
        SourceError::Upstream {
            source_type,
            failure: UpstreamFailure::Network(message.into()),
        }
    }

    pub fn malformed(source_type: SourceType, message: impl Into<String>) -> Self {
        SourceError::MalformedResponse {
            source_type,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SourceError::Cancelled)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Source instance not found: {id}")]
    InstanceNotFound { id: crate::state::InstanceId },

    #[error("No adapter registered for source '{source_type}'")]
    AdapterNotRegistered { source_type: SourceType },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
