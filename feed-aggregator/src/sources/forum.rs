use crate::config::FetchConfig;
use crate::fetcher::Fetcher;
use crate::normalize::{
    clamp_summary, item_id, non_negative, strip_markup, timestamp_from_unix, title_or_placeholder,
    validate_optional_url, validate_url,
};
use crate::traits::SourceAdapter;
use crate::types::{Cursor, Page, Result, SourceError, SourceParams, SourceType, UnifiedItem};
use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Link-aggregation listing paged by continuation token.
///
/// The upstream listing cannot search, so `params.query` is matched locally
/// against each post's title, body and group name after the page arrives.
pub struct ForumSource {
    fetcher: Fetcher,
    base_url: Url,
    default_group: String,
    page_size: u32,
    summary_max_chars: usize,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    after: Option<String>,
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    title: Option<String>,
    url: Option<String>,
    permalink: Option<String>,
    author: Option<String>,
    score: Option<i64>,
    num_comments: Option<i64>,
    created_utc: Option<f64>,
    selftext: Option<String>,
    subreddit: Option<String>,
    thumbnail: Option<String>,
    link_flair_text: Option<String>,
}

impl ForumSource {
    pub fn new(fetcher: Fetcher, config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            fetcher,
            base_url: config.forum.url_for(&[])?,
            default_group: config.forum_default_group.clone(),
            page_size: config.page_size,
            summary_max_chars: config.forum.summary_max_chars,
        })
    }

    fn group<'a>(&'a self, params: &'a SourceParams) -> &'a str {
        params
            .group
            .as_deref()
            .map(|g| g.trim().trim_start_matches("r/"))
            .filter(|g| !g.is_empty())
            .unwrap_or(&self.default_group)
    }

    pub fn request_url(&self, group: &str, after: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["r", group, "hot.json"]);
        }
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("limit", &self.page_size.to_string())
                .append_pair("raw_json", "1");
            if let Some(after) = after {
                query.append_pair("after", after);
            }
        }
        url
    }

    /// Thread URL under the configured base, keeping any path prefix the
    /// base carries. The trailing slash of the permalink is preserved.
    pub fn permalink_url(&self, permalink: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(permalink.split('/').filter(|segment| !segment.is_empty()));
            if permalink.ends_with('/') {
                segments.push("");
            }
        }
        url
    }

    fn normalize(&self, post: Post) -> UnifiedItem {
        let body = strip_markup(post.selftext.as_deref().unwrap_or_default());

        // Self posts link to their own thread; fall back to the permalink.
        let mut url = validate_optional_url(post.url.as_deref());
        if url.is_empty() {
            if let Some(permalink) = post.permalink.as_deref() {
                url = validate_url(self.permalink_url(permalink).as_str());
            }
        }

        let mut tags = Vec::new();
        if let Some(group) = post.subreddit.filter(|g| !g.is_empty()) {
            tags.push(group);
        }
        if let Some(flair) = post.link_flair_text.filter(|f| !f.trim().is_empty()) {
            tags.push(flair.trim().to_string());
        }

        UnifiedItem {
            id: item_id(SourceType::Forum, &post.id),
            source: SourceType::Forum,
            title: title_or_placeholder(post.title.as_deref()),
            url,
            timestamp: post.created_utc.and_then(timestamp_from_unix),
            summary: clamp_summary(&body, self.summary_max_chars),
            score: non_negative(post.score.unwrap_or(0)),
            comment_count: non_negative(post.num_comments.unwrap_or(0)),
            author: post.author.unwrap_or_default(),
            image_url: validate_optional_url(post.thumbnail.as_deref()),
            tags,
        }
    }
}

/// Case-insensitive match of `query` against title, summary and group name.
fn matches_query(item: &UnifiedItem, group: &str, query: &str) -> bool {
    let haystack = format!("{} {} {}", item.title, item.summary, group).to_lowercase();
    haystack.contains(&query.to_lowercase())
}

#[async_trait]
impl SourceAdapter for ForumSource {
    fn source_type(&self) -> SourceType {
        SourceType::Forum
    }

    async fn fetch_page(
        &self,
        params: &SourceParams,
        cursor: Option<&Cursor>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Page, SourceError> {
        let after = match cursor {
            None => None,
            Some(Cursor::Token(token)) => Some(token.as_str()),
            Some(other) => {
                return Err(SourceError::malformed(
                    SourceType::Forum,
                    format!("forum pages use continuation tokens, got cursor '{}'", other),
                ))
            }
        };

        let group = self.group(params);
        let url = self.request_url(group, after);
        let listing: Listing = self.fetcher.get_json(SourceType::Forum, url, cancel).await?;

        let next_token = listing.data.after.filter(|token| !token.is_empty());
        let fetched = listing.data.children.len();

        let mut items = Vec::with_capacity(fetched);
        for child in listing.data.children {
            let post_group = child.data.subreddit.clone().unwrap_or_else(|| group.to_string());
            let item = self.normalize(child.data);
            let keep = params
                .trimmed_query()
                .map_or(true, |query| matches_query(&item, &post_group, query));
            if keep {
                items.push(item);
            }
        }

        if items.len() < fetched {
            debug!("forum query kept {}/{} posts from r/{}", items.len(), fetched, group);
        }

        Ok(Page {
            items,
            has_more: next_token.is_some(),
            next_cursor: next_token.map(Cursor::Token),
        })
    }
}
