mod common;

use chrono::{TimeZone, Utc};
use common::{ids, init_tracing};
use feed_aggregator::{
    Cursor, FeatureSource, FeedAggregator, FetchConfig, Fetcher, ForumSource, LoadOutcome,
    NewsSource, QuoteSource, RecencyWindow, SourceAdapter, SourceError, SourceParams, SourceType,
    UpstreamFailure,
};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> FetchConfig {
    let mut config = FetchConfig::default();
    config.news.base_url = server.uri();
    config.forum.base_url = server.uri();
    config.feature.base_url = server.uri();
    config.quote.base_url = server.uri();
    config.page_size = 2;
    config.timeout_seconds = 10;
    config
}

#[tokio::test]
async fn test_news_pages_through_search_results() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search_by_date"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{
                "objectID": "101",
                "title": "AI beats benchmark",
                "url": "https://example.com/ai",
                "author": "pg",
                "points": 120,
                "num_comments": 45,
                "created_at": "2024-05-01T12:00:00.000Z",
                "created_at_i": 1714564800,
                "_tags": ["story", "author_pg", "story_101", "front_page"]
            }],
            "nbPages": 2,
            "page": 0
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search_by_date"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{
                "objectID": "102",
                "title": null,
                "url": "not a url",
                "points": -3,
                "created_at_i": 1714478400,
                "story_text": "<p>Ask HN: where is AI &amp; going?</p>"
            }],
            "nbPages": 2,
            "page": 1
        })))
        .mount(&server)
        .await;

    let aggregator = FeedAggregator::from_config(&config_for(&server)).unwrap();
    let id = aggregator
        .activate_source(
            SourceType::News,
            SourceParams::default()
                .with_query("ai")
                .with_window(RecencyWindow::Week),
        )
        .await
        .unwrap();

    let summary = aggregator.refresh_all().await;
    assert_eq!(summary.loaded, 1);

    let state = aggregator.instance(id).await.unwrap();
    assert_eq!(state.cursor, Some(Cursor::Page(1)));
    assert!(state.has_more);
    let first = &state.items[0];
    assert_eq!(first.id, "news_101");
    assert_eq!(first.url, "https://example.com/ai");
    assert_eq!(first.score, 120);
    assert_eq!(first.comment_count, 45);
    assert_eq!(first.author, "pg");
    assert_eq!(first.tags, vec!["front_page"]);
    assert_eq!(first.timestamp, Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));

    let outcome = aggregator.load_more(id).await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            appended: 1,
            has_more: false
        }
    );

    let state = aggregator.instance(id).await.unwrap();
    assert_eq!(ids(&state.items), vec!["news_101", "news_102"]);
    let second = &state.items[1];
    assert_eq!(second.title, "(untitled)");
    assert_eq!(second.url, "");
    assert_eq!(second.score, 0);
    assert_eq!(second.summary, "Ask HN: where is AI & going?");
    assert!(second.timestamp.is_some());
    assert!(!state.has_more);

    assert_eq!(aggregator.load_more(id).await.unwrap(), LoadOutcome::Skipped);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2, "no request after the last page");
    for request in &requests {
        let pairs: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        info!("news request: {}", request.url);
        assert!(pairs.contains(&("query".to_string(), "ai".to_string())));
        assert!(pairs.contains(&("tags".to_string(), "story".to_string())));
        assert!(pairs.iter().any(|(k, v)| k == "numericFilters" && v.starts_with("created_at_i>")));
    }
}

#[tokio::test]
async fn test_news_last_representable_page_ends_pagination() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search_by_date"))
        .and(query_param("page", u32::MAX.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{ "objectID": "999", "title": "Far away" }],
            "nbPages": u32::MAX
        })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let source = NewsSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();
    let page = source
        .fetch_page(
            &SourceParams::default(),
            Some(&Cursor::Page(u32::MAX)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(ids(&page.items), vec!["news_999"]);
    assert!(!page.has_more);
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn test_news_request_url_reflects_window() {
    let config = FetchConfig::default();
    let source = NewsSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 5, 8, 0, 0, 0).unwrap();

    let all = source.request_url(&SourceParams::default(), 0, now);
    assert!(all.as_str().starts_with("https://hn.algolia.com/api/v1/search_by_date?"));
    assert!(!all.as_str().contains("numericFilters"));
    assert!(!all.as_str().contains("query="));

    let week = source.request_url(
        &SourceParams::default()
            .with_query("  ")
            .with_window(RecencyWindow::Week),
        3,
        now,
    );
    let pairs: Vec<(String, String)> = week.query_pairs().into_owned().collect();
    let since = now.timestamp() - 7 * 24 * 60 * 60;
    assert!(pairs.contains(&("page".to_string(), "3".to_string())));
    assert!(pairs.contains(&("numericFilters".to_string(), format!("created_at_i>{}", since))));
    assert!(!pairs.iter().any(|(k, _)| k == "query"), "blank query is not sent");
}

fn forum_listing(after: Option<&str>, posts: serde_json::Value) -> serde_json::Value {
    json!({
        "kind": "Listing",
        "data": {
            "after": after,
            "children": posts
        }
    })
}

#[tokio::test]
async fn test_forum_follows_continuation_tokens() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .and(query_param("after", "t3_b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forum_listing(
            Some(""),
            json!([{ "kind": "t3", "data": {
                "id": "c",
                "title": "Rust 2024 edition released",
                "url": "https://blog.rust-lang.org/2024",
                "subreddit": "rust",
                "score": 900,
                "num_comments": 200,
                "created_utc": 1714564800.0
            }}]),
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forum_listing(
            Some("t3_b"),
            json!([
                { "kind": "t3", "data": {
                    "id": "a",
                    "title": "Weekly questions thread",
                    "url": null,
                    "permalink": "/r/rust/comments/a/weekly_questions/",
                    "selftext": "Ask **anything**",
                    "author": "mod",
                    "subreddit": "rust",
                    "score": -4,
                    "link_flair_text": " meta ",
                    "thumbnail": "self"
                }},
                { "kind": "t3", "data": {
                    "id": "b",
                    "title": "My cat photo",
                    "url": "https://i.example.com/cat.jpg",
                    "subreddit": "rust",
                    "thumbnail": "https://i.example.com/cat_thumb.jpg"
                }}
            ]),
        )))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let source = ForumSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();
    let params = SourceParams::default().with_group("rust");
    let cancel = CancellationToken::new();

    let first = source.fetch_page(&params, None, &cancel).await.unwrap();
    assert_eq!(first.next_cursor, Some(Cursor::Token("t3_b".to_string())));
    assert!(first.has_more);
    assert_eq!(ids(&first.items), vec!["forum_a", "forum_b"]);

    let thread = &first.items[0];
    assert_eq!(
        thread.url,
        format!("{}/r/rust/comments/a/weekly_questions/", server.uri())
    );
    assert_eq!(thread.score, 0);
    assert_eq!(thread.summary, "Ask **anything**");
    assert_eq!(thread.tags, vec!["rust", "meta"]);
    assert_eq!(thread.image_url, "", "placeholder thumbnails are not URLs");
    assert_eq!(first.items[1].image_url, "https://i.example.com/cat_thumb.jpg");

    let second = source
        .fetch_page(&params, first.next_cursor.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(ids(&second.items), vec!["forum_c"]);
    assert_eq!(second.next_cursor, None, "empty token means no more pages");
    assert!(!second.has_more);
}

#[tokio::test]
async fn test_forum_permalink_keeps_base_path_prefix() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forum/r/rust/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forum_listing(
            None,
            json!([{ "data": {
                "id": "x",
                "title": "Show your project",
                "permalink": "/r/rust/comments/x/show_your_project/",
                "subreddit": "rust"
            }}]),
        )))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.forum.base_url = format!("{}/forum/", server.uri());
    let source = ForumSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();

    let page = source
        .fetch_page(
            &SourceParams::default().with_group("rust"),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(
        page.items[0].url,
        format!("{}/forum/r/rust/comments/x/show_your_project/", server.uri())
    );
    assert_eq!(
        source.request_url("rust", None).path(),
        "/forum/r/rust/hot.json"
    );
}

#[tokio::test]
async fn test_forum_query_is_applied_locally() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/technology/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forum_listing(
            None,
            json!([
                { "data": { "id": "1", "title": "New GPU announced", "subreddit": "technology" } },
                { "data": { "id": "2", "title": "Phone review", "selftext": "battery and gpu tests", "subreddit": "technology" } },
                { "data": { "id": "3", "title": "Court ruling", "subreddit": "technology" } }
            ]),
        )))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let source = ForumSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();

    let page = source
        .fetch_page(
            &SourceParams::default().with_query("GPU"),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&page.items), vec!["forum_1", "forum_2"]);
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_feature_failure_leaves_no_placeholder() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/planetary/apod"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let aggregator = FeedAggregator::from_config(&config_for(&server)).unwrap();
    let id = aggregator
        .activate_source(SourceType::Feature, SourceParams::default())
        .await
        .unwrap();

    let outcome = aggregator.refresh_one(id).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Failed { .. }));

    let state = aggregator.instance(id).await.unwrap();
    assert!(state.items.is_empty());
    assert!(!state.has_more);
    assert!(state.last_error.unwrap().contains("500"));
}

#[tokio::test]
async fn test_feature_normalizes_daily_entry() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/planetary/apod"))
        .and(query_param("api_key", "DEMO_KEY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "date": "2024-05-01",
            "title": "Aurora over Iceland",
            "explanation": "Curtains of light dance above a glacier lagoon.",
            "url": "https://apod.example.com/aurora.jpg",
            "hdurl": "https://apod.example.com/aurora_hd.jpg",
            "media_type": "image",
            "copyright": "\nJane  Doe\n"
        })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let source = FeatureSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();
    assert!(!source.is_paginated());

    let page = source
        .fetch_page(&SourceParams::default(), None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!page.has_more);
    assert_eq!(page.items.len(), 1);

    let item = &page.items[0];
    assert_eq!(item.id, "feature_2024-05-01");
    assert_eq!(item.image_url, "https://apod.example.com/aurora_hd.jpg");
    assert_eq!(item.author, "Jane Doe");
    assert_eq!(item.tags, vec!["image"]);
    assert_eq!(item.timestamp, Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
}

#[tokio::test]
async fn test_quote_accepts_array_payload() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/random"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "_id": "q42",
            "content": "Simplicity is prerequisite for reliability.",
            "author": "Edsger W. Dijkstra",
            "tags": ["technology"]
        }])))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let source = QuoteSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();
    let page = source
        .fetch_page(&SourceParams::default(), None, &CancellationToken::new())
        .await
        .unwrap();

    let item = &page.items[0];
    assert_eq!(item.id, "quote_q42");
    assert_eq!(item.title, "Quote by Edsger W. Dijkstra");
    assert_eq!(item.summary, "Simplicity is prerequisite for reliability.");
    assert_eq!(item.author, "Edsger W. Dijkstra");
    assert_eq!(item.url, "");
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_anonymous_quote_keeps_text_out_of_title() {
    init_tracing();
    let server = MockServer::start().await;

    let text = "A long quotation that goes on and on. ".repeat(12);
    Mock::given(method("GET"))
        .and(path("/random"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "content": text })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let source = QuoteSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();
    let page = source
        .fetch_page(&SourceParams::default(), None, &CancellationToken::new())
        .await
        .unwrap();

    let item = &page.items[0];
    assert_eq!(item.title, "Quote");
    assert_eq!(item.author, "");
    assert_ne!(item.title, item.summary);
    assert!(item.summary.ends_with('…'));
    assert!(item.summary.chars().count() <= config.quote.summary_max_chars);
    assert!(item.id.starts_with("quote_"), "id falls back to a content hash");
}

#[tokio::test]
async fn test_quote_without_text_is_malformed() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/random"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "author": "Nobody" })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let source = QuoteSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();
    let result = source
        .fetch_page(&SourceParams::default(), None, &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(SourceError::MalformedResponse {
            source_type: SourceType::Quote,
            ..
        })
    ));
}

#[tokio::test]
async fn test_undecodable_body_is_malformed() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search_by_date"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let source = NewsSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();
    let result = source
        .fetch_page(&SourceParams::default(), None, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(SourceError::MalformedResponse { .. })));
}

#[tokio::test]
async fn test_http_status_is_reported() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/nosuchgroup/hot.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let source = ForumSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();
    let result = source
        .fetch_page(
            &SourceParams::default().with_group("nosuchgroup"),
            None,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(
        result.unwrap_err(),
        SourceError::status(SourceType::Forum, 404)
    );
}

#[tokio::test]
async fn test_unreachable_host_is_a_network_error() {
    init_tracing();

    let mut config = FetchConfig::default();
    config.quote.base_url = "http://127.0.0.1:1".to_string();
    config.timeout_seconds = 5;
    let source = QuoteSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();

    let result = source
        .fetch_page(&SourceParams::default(), None, &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(SourceError::Upstream {
            source_type: SourceType::Quote,
            failure: UpstreamFailure::Network(_),
        })
    ));
}

#[tokio::test]
async fn test_cancellation_aborts_slow_request() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/random"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "_id": "slow", "content": "Patience." }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = config_for(&server);
    let source = QuoteSource::new(Fetcher::new(&config).unwrap(), &config).unwrap();

    let already = CancellationToken::new();
    already.cancel();
    let result = source
        .fetch_page(&SourceParams::default(), None, &already)
        .await;
    assert_eq!(result.unwrap_err(), SourceError::Cancelled);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let result = source.fetch_page(&SourceParams::default(), None, &cancel).await;
    assert!(result.unwrap_err().is_cancelled());
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_deactivate_during_http_request() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/technology/hot.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(forum_listing(None, json!([])))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let aggregator = std::sync::Arc::new(FeedAggregator::from_config(&config_for(&server)).unwrap());
    let id = aggregator
        .activate_source(SourceType::Forum, SourceParams::default())
        .await
        .unwrap();

    let pending = tokio::spawn({
        let aggregator = aggregator.clone();
        async move { aggregator.load_more(id).await }
    });

    // Wait until the request has reached the server.
    for _ in 0..200 {
        if !server.received_requests().await.unwrap_or_default().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let start = Instant::now();
    aggregator.deactivate_source(id).await.unwrap();
    assert_eq!(pending.await.unwrap().unwrap(), LoadOutcome::Discarded);
    assert!(start.elapsed() < Duration::from_secs(4));
    assert!(aggregator.snapshot().await.is_empty());
}
