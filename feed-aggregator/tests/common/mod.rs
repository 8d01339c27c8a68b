#![allow(dead_code)]

use async_trait::async_trait;
use feed_aggregator::{Cursor, Page, SourceAdapter, SourceError, SourceParams, SourceType, UnifiedItem};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn item(source: SourceType, raw_id: &str, title: &str) -> UnifiedItem {
    UnifiedItem {
        id: format!("{}_{}", source.id_prefix(), raw_id),
        source,
        title: title.to_string(),
        url: String::new(),
        timestamp: None,
        summary: String::new(),
        score: 0,
        comment_count: 0,
        author: String::new(),
        image_url: String::new(),
        tags: Vec::new(),
    }
}

pub fn page(items: Vec<UnifiedItem>, next_cursor: Option<Cursor>, has_more: bool) -> Page {
    Page {
        items,
        next_cursor,
        has_more,
    }
}

pub fn ids(items: &[UnifiedItem]) -> Vec<String> {
    items.iter().map(|item| item.id.clone()).collect()
}

/// Adapter that replays scripted responses in call order.
///
/// A gated adapter parks every call until [`MockAdapter::release`] hands
/// out a permit, which lets tests hold requests in flight. It ignores the
/// cancellation token on purpose, so any discarding is the aggregator's doing.
pub struct MockAdapter {
    source_type: SourceType,
    paginated: bool,
    responses: Mutex<VecDeque<Result<Page, SourceError>>>,
    fallback: Option<Result<Page, SourceError>>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
    cursors: Mutex<Vec<Option<Cursor>>>,
}

impl MockAdapter {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            paginated: !matches!(source_type, SourceType::Feature | SourceType::Quote),
            responses: Mutex::new(VecDeque::new()),
            fallback: None,
            gate: None,
            calls: AtomicUsize::new(0),
            cursors: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(self, response: Result<Page, SourceError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// Response used once the scripted queue is empty.
    pub fn always(mut self, response: Result<Page, SourceError>) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cursors(&self) -> Vec<Option<Cursor>> {
        self.cursors.lock().unwrap().clone()
    }

    /// Yield to other tasks until at least `count` calls have started.
    pub async fn wait_for_calls(&self, count: usize) {
        for _ in 0..10_000 {
            if self.calls() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {} adapter calls, saw {}", count, self.calls());
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn is_paginated(&self) -> bool {
        self.paginated
    }

    async fn fetch_page(
        &self,
        _params: &SourceParams,
        cursor: Option<&Cursor>,
        _cancel: &CancellationToken,
    ) -> Result<Page, SourceError> {
        let response = {
            self.cursors.lock().unwrap().push(cursor.cloned());
            self.responses.lock().unwrap().pop_front()
        };
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        response
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err(SourceError::malformed(self.source_type, "no scripted response left")))
    }
}
