use crate::config::FetchConfig;
use crate::fetcher::Fetcher;
use crate::normalize::{
    clamp_summary, item_id, non_negative, parse_timestamp, strip_markup, timestamp_from_unix,
    title_or_placeholder, validate_optional_url,
};
use crate::traits::SourceAdapter;
use crate::types::{Cursor, Page, Result, SourceError, SourceParams, SourceType, UnifiedItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Story search API with numbered pages and a recency filter.
pub struct NewsSource {
    fetcher: Fetcher,
    search_url: Url,
    page_size: u32,
    summary_max_chars: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<Hit>,
    #[serde(rename = "nbPages", default)]
    nb_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    story_title: Option<String>,
    url: Option<String>,
    author: Option<String>,
    points: Option<i64>,
    num_comments: Option<i64>,
    created_at: Option<String>,
    created_at_i: Option<i64>,
    story_text: Option<String>,
    #[serde(rename = "_tags", default)]
    tags: Vec<String>,
}

impl NewsSource {
    pub fn new(fetcher: Fetcher, config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            fetcher,
            search_url: config.news.url_for(&["search_by_date"])?,
            page_size: config.page_size,
            summary_max_chars: config.news.summary_max_chars,
        })
    }

    /// Search URL for `page`, with a `created_at_i` lower bound when the
    /// window is not `all`.
    pub fn request_url(&self, params: &SourceParams, page: u32, now: DateTime<Utc>) -> Url {
        let mut url = self.search_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("tags", "story")
                .append_pair("page", &page.to_string())
                .append_pair("hitsPerPage", &self.page_size.to_string());
            if let Some(text) = params.trimmed_query() {
                query.append_pair("query", text);
            }
            if let Some(since) = params.window.lower_bound(now) {
                query.append_pair("numericFilters", &format!("created_at_i>{}", since.timestamp()));
            }
        }
        url
    }

    fn normalize(&self, hit: Hit) -> UnifiedItem {
        let timestamp = hit
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| hit.created_at_i.and_then(|secs| timestamp_from_unix(secs as f64)));

        let tags = hit
            .tags
            .into_iter()
            .filter(|tag| tag != "story" && !tag.starts_with("author_") && !tag.starts_with("story_"))
            .collect();

        UnifiedItem {
            id: item_id(SourceType::News, &hit.object_id),
            source: SourceType::News,
            title: title_or_placeholder(hit.title.as_deref().or(hit.story_title.as_deref())),
            url: validate_optional_url(hit.url.as_deref()),
            timestamp,
            summary: clamp_summary(
                &strip_markup(hit.story_text.as_deref().unwrap_or_default()),
                self.summary_max_chars,
            ),
            score: non_negative(hit.points.unwrap_or(0)),
            comment_count: non_negative(hit.num_comments.unwrap_or(0)),
            author: hit.author.unwrap_or_default(),
            image_url: String::new(),
            tags,
        }
    }
}

#[async_trait]
impl SourceAdapter for NewsSource {
    fn source_type(&self) -> SourceType {
        SourceType::News
    }

    async fn fetch_page(
        &self,
        params: &SourceParams,
        cursor: Option<&Cursor>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Page, SourceError> {
        let page = match cursor {
            None => 0,
            Some(Cursor::Page(page)) => *page,
            Some(other) => {
                return Err(SourceError::malformed(
                    SourceType::News,
                    format!("news pages are numbered, got cursor '{}'", other),
                ))
            }
        };

        let url = self.request_url(params, page, Utc::now());
        let response: SearchResponse = self.fetcher.get_json(SourceType::News, url, cancel).await?;

        let next_page = page
            .checked_add(1)
            .filter(|next| response.nb_pages > *next);
        let items = response.hits.into_iter().map(|hit| self.normalize(hit)).collect();

        Ok(Page {
            items,
            has_more: next_page.is_some(),
            next_cursor: next_page.map(Cursor::Page),
        })
    }
}
