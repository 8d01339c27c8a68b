use crate::config::FetchConfig;
use crate::fetcher::Fetcher;
use crate::normalize::{
    clamp_summary, collapse_whitespace, item_id, parse_timestamp, title_or_placeholder,
    validate_optional_url,
};
use crate::traits::SourceAdapter;
use crate::types::{Cursor, Page, Result, SourceError, SourceParams, SourceType, UnifiedItem};
use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Daily image-and-caption API. One item per day, no pagination.
///
/// Upstream failures are returned as errors. This adapter never invents a
/// stand-in item when the service is down.
pub struct FeatureSource {
    fetcher: Fetcher,
    request_url: Url,
    summary_max_chars: usize,
}

#[derive(Debug, Deserialize)]
struct DailyFeature {
    date: Option<String>,
    title: Option<String>,
    explanation: Option<String>,
    url: Option<String>,
    hdurl: Option<String>,
    thumbnail_url: Option<String>,
    media_type: Option<String>,
    copyright: Option<String>,
}

impl FeatureSource {
    pub fn new(fetcher: Fetcher, config: &FetchConfig) -> Result<Self> {
        let mut request_url = config.feature.url_for(&["planetary", "apod"])?;
        request_url
            .query_pairs_mut()
            .append_pair("api_key", &config.feature_api_key)
            .append_pair("thumbs", "true");

        Ok(Self {
            fetcher,
            request_url,
            summary_max_chars: config.feature.summary_max_chars,
        })
    }

    fn normalize(&self, feature: DailyFeature) -> UnifiedItem {
        let is_image = feature.media_type.as_deref() == Some("image");
        let image_url = if is_image {
            validate_optional_url(feature.hdurl.as_deref().or(feature.url.as_deref()))
        } else {
            validate_optional_url(feature.thumbnail_url.as_deref())
        };

        let raw_id = feature
            .date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or("undated");

        UnifiedItem {
            id: item_id(SourceType::Feature, raw_id),
            source: SourceType::Feature,
            title: title_or_placeholder(feature.title.as_deref()),
            url: validate_optional_url(feature.url.as_deref()),
            timestamp: feature.date.as_deref().and_then(parse_timestamp),
            summary: clamp_summary(
                feature.explanation.as_deref().unwrap_or_default(),
                self.summary_max_chars,
            ),
            score: 0,
            comment_count: 0,
            author: feature
                .copyright
                .as_deref()
                .map(collapse_whitespace)
                .unwrap_or_default(),
            image_url,
            tags: feature.media_type.into_iter().collect(),
        }
    }
}

#[async_trait]
impl SourceAdapter for FeatureSource {
    fn source_type(&self) -> SourceType {
        SourceType::Feature
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
        let feature: DailyFeature = self
            .fetcher
            .get_json(SourceType::Feature, self.request_url.clone(), cancel)
            .await?;

        if feature.title.is_none() && feature.url.is_none() && feature.explanation.is_none() {
            return Err(SourceError::malformed(
                SourceType::Feature,
                "response has no title, url or explanation",
            ));
        }

        Ok(Page::single(vec![self.normalize(feature)]))
    }
}
