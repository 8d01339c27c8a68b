use crate::types::{AggregatorError, Result, SourceType};
use std::env;
use url::Url;

/// Where one upstream lives and how long its summaries may be.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    pub base_url: String,
    pub summary_max_chars: usize,
}

impl EndpointConfig {
    pub fn new(base_url: impl Into<String>, summary_max_chars: usize) -> Self {
        Self {
            base_url: base_url.into(),
            summary_max_chars,
        }
    }

    /// Parse the base URL and append `segments` to its path, keeping any
    /// prefix the base already has. Segments are percent-encoded.
    pub fn url_for(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| AggregatorError::Config(format!("'{}' cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Items requested per page from paginated sources.
    pub page_size: u32,
    pub news: EndpointConfig,
    pub forum: EndpointConfig,
    pub feature: EndpointConfig,
    pub quote: EndpointConfig,
    pub feature_api_key: String,
    pub forum_default_group: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "feed-aggregator/0.1".to_string(),
            timeout_seconds: 30,
            page_size: 20,
            news: EndpointConfig::new("https://hn.algolia.com/api/v1", 300),
            forum: EndpointConfig::new("https://www.reddit.com", 280),
            feature: EndpointConfig::new("https://api.nasa.gov", 500),
            quote: EndpointConfig::new("https://api.quotable.io", 280),
            feature_api_key: "DEMO_KEY".to_string(),
            forum_default_group: "technology".to_string(),
        }
    }
}

impl FetchConfig {
    /// Defaults overridden by `FEED_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`FetchConfig::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(agent) = lookup("FEED_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(raw) = lookup("FEED_TIMEOUT_SECONDS") {
            config.timeout_seconds = parse_number("FEED_TIMEOUT_SECONDS", &raw)?;
        }
        if let Some(raw) = lookup("FEED_PAGE_SIZE") {
            config.page_size = parse_number("FEED_PAGE_SIZE", &raw)?;
        }
        if let Some(url) = lookup("FEED_NEWS_URL") {
            config.news.base_url = url;
        }
        if let Some(url) = lookup("FEED_FORUM_URL") {
            config.forum.base_url = url;
        }
        if let Some(url) = lookup("FEED_FEATURE_URL") {
            config.feature.base_url = url;
        }
        if let Some(url) = lookup("FEED_QUOTE_URL") {
            config.quote.base_url = url;
        }
        if let Some(key) = lookup("FEED_FEATURE_API_KEY") {
            config.feature_api_key = key;
        }
        if let Some(group) = lookup("FEED_FORUM_GROUP") {
            config.forum_default_group = group;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn endpoint(&self, source_type: SourceType) -> &EndpointConfig {
        match source_type {
            SourceType::News => &self.news,
            SourceType::Forum => &self.forum,
            SourceType::Feature => &self.feature,
            SourceType::Quote => &self.quote,
        }
    }

    /// Every base URL must be an absolute http(s) URL and the page size must
    /// be positive.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(AggregatorError::Config("page size must be at least 1".to_string()));
        }
        for source_type in SourceType::ALL {
            let endpoint = self.endpoint(source_type);
            let valid = Url::parse(&endpoint.base_url)
                .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
                .unwrap_or(false);
            if !valid {
                return Err(AggregatorError::Config(format!(
                    "{} base URL '{}' is not an absolute http(s) URL",
                    source_type, endpoint.base_url
                )));
            }
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AggregatorError::Config(format!("{} must be a number, got '{}'", key, raw)))
}
