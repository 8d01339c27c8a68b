use crate::config::FetchConfig;
use crate::fetcher::Fetcher;
use crate::normalize::{clamp_summary, collapse_whitespace, item_id, parse_timestamp};
use crate::traits::SourceAdapter;
use crate::types::{Cursor, Page, Result, SourceError, SourceParams, SourceType, UnifiedItem};
use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Random-quote API. Always exactly one item per call.
pub struct QuoteSource {
    fetcher: Fetcher,
    request_url: Url,
    summary_max_chars: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuotePayload {
    One(Quote),
    Many(Vec<Quote>),
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(rename = "_id")]
    id: Option<String>,
    content: Option<String>,
    author: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(rename = "dateAdded")]
    date_added: Option<String>,
}

impl QuoteSource {
    pub fn new(fetcher: Fetcher, config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            fetcher,
            request_url: config.quote.url_for(&["random"])?,
            summary_max_chars: config.quote.summary_max_chars,
        })
    }

    fn normalize(&self, quote: Quote, content: String) -> UnifiedItem {
        let raw_id = quote
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| content_hash(&content));

        let author = quote
            .author
            .as_deref()
            .map(collapse_whitespace)
            .unwrap_or_default();

        UnifiedItem {
            id: item_id(SourceType::Quote, &raw_id),
            source: SourceType::Quote,
            title: quote_title(&author),
            url: String::new(),
            timestamp: quote.date_added.as_deref().and_then(parse_timestamp),
            summary: clamp_summary(&content, self.summary_max_chars),
            score: 0,
            comment_count: 0,
            author,
            image_url: String::new(),
            tags: quote.tags,
        }
    }
}

/// The quote text lives in the summary; the title only names the speaker.
fn quote_title(author: &str) -> String {
    if author.is_empty() {
        "Quote".to_string()
    } else {
        format!("Quote by {}", author)
    }
}

/// FNV-1a, hex encoded. Stable id for quotes served without one.
fn content_hash(content: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in content.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    format!("{:016x}", hash)
}

#[async_trait]
impl SourceAdapter for QuoteSource {
    fn source_type(&self) -> SourceType {
        SourceType::Quote
    }

    fn is_paginated(&self) -> bool {
        false
    }

    async fn fetch_page(
        &self,
        _params: &SourceParams,
        _cursor: Option<&Cursor>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Page, SourceError> {
        let payload: QuotePayload = self
            .fetcher
            .get_json(SourceType::Quote, self.request_url.clone(), cancel)
            .await?;

        let quote = match payload {
            QuotePayload::One(quote) => Some(quote),
            QuotePayload::Many(quotes) => quotes.into_iter().next(),
        }
        .ok_or_else(|| SourceError::malformed(SourceType::Quote, "response contained no quote"))?;

        let content = quote
            .content
            .as_deref()
            .map(collapse_whitespace)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SourceError::malformed(SourceType::Quote, "quote has no text"))?;

        Ok(Page::single(vec![self.normalize(quote, content)]))
    }
}
