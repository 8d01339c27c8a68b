use crate::config::FetchConfig;
use crate::sources::http_adapters;
use crate::state::{InstanceId, SourceInstance};
use crate::traits::SourceAdapter;
use crate::types::{AggregatorError, Cursor, Page, Result, SourceError, SourceParams, SourceType};
use crate::view::{self, ProjectedView, SortKey};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Adapters available to the aggregator, one per source type.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<SourceType, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` for its source type, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.source_type(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, source_type: SourceType) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source_type).cloned()
    }
}

impl FromIterator<Arc<dyn SourceAdapter>> for AdapterRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn SourceAdapter>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for adapter in iter {
            registry.register(adapter);
        }
        registry
    }
}

/// Identifies one dispatched request. A completion is applied only while
/// its ticket is still the instance's in-flight ticket and its epoch is
/// still the current refresh epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    epoch: u64,
    request: u64,
}

/// What became of a `load_more` / `refresh_one` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { appended: usize, has_more: bool },
    /// The adapter failed; the message is now the instance's `last_error`.
    Failed { error: String },
    /// Nothing more to load, or a request is already in flight.
    Skipped,
    /// Superseded by a refresh or deactivation before it completed.
    Discarded,
}

/// Folded result of a `refresh_all` fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub epoch: u64,
    pub loaded: usize,
    pub failed: usize,
    pub discarded: usize,
}

struct InFlight {
    ticket: Ticket,
    cancel: CancellationToken,
}

struct Slot {
    state: SourceInstance,
    adapter: Arc<dyn SourceAdapter>,
    in_flight: Option<InFlight>,
}

struct Dispatch {
    id: InstanceId,
    ticket: Ticket,
    adapter: Arc<dyn SourceAdapter>,
    params: SourceParams,
    cursor: Option<Cursor>,
    cancel: CancellationToken,
}

struct Inner {
    slots: BTreeMap<InstanceId, Slot>,
    next_instance: u64,
    next_request: u64,
    epoch: u64,
    /// Parent of every request token issued in the current epoch.
    scope: CancellationToken,
}

impl Inner {
    /// Issue a ticket for `id` and mark it loading, cancelling whatever it
    /// had in flight. With `reset`, the instance goes back to its first page.
    fn dispatch(&mut self, id: InstanceId, reset: bool) -> Option<Dispatch> {
        let slot = self.slots.get_mut(&id)?;

        if let Some(previous) = slot.in_flight.take() {
            debug!("Cancelling in-flight request {} of instance {}", previous.ticket.request, id);
            previous.cancel.cancel();
        }
        if reset {
            slot.state.reset(slot.adapter.is_paginated(), self.epoch);
        }

        let ticket = Ticket {
            epoch: self.epoch,
            request: self.next_request,
        };
        self.next_request += 1;

        let cancel = self.scope.child_token();
        slot.state.is_loading = true;
        slot.in_flight = Some(InFlight {
            ticket,
            cancel: cancel.clone(),
        });

        Some(Dispatch {
            id,
            ticket,
            adapter: slot.adapter.clone(),
            params: slot.state.params.clone(),
            cursor: slot.state.cursor.clone(),
            cancel,
        })
    }

    /// Release an instance whose caller stopped waiting for `ticket`.
    fn abandon(&mut self, id: InstanceId, ticket: Ticket) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        if slot.in_flight.as_ref().map(|in_flight| in_flight.ticket) == Some(ticket) {
            slot.in_flight = None;
            slot.state.is_loading = false;
            debug!("Request {} of instance {} abandoned by its caller", ticket.request, id);
        }
    }
}

/// Lives for the duration of one `execute`. Dropped before completion (the
/// caller's future was dropped), it cancels the request and frees the
/// instance so later `load_more` calls are not skipped forever.
struct PendingGuard {
    inner: Arc<RwLock<Inner>>,
    id: InstanceId,
    ticket: Ticket,
    cancel: CancellationToken,
    armed: bool,
}

impl PendingGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.cancel.cancel();

        let (id, ticket) = (self.id, self.ticket);
        match self.inner.try_write() {
            Ok(mut inner) => inner.abandon(id, ticket),
            Err(_) => {
                // Lock is busy; finish the cleanup once it frees up.
                let inner = self.inner.clone();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            inner.write().await.abandon(id, ticket);
                        });
                    }
                    Err(_) => warn!("Instance {} left loading: no runtime to release it", id),
                }
            }
        }
    }
}

/// Owns every source instance and coordinates requests to their adapters.
///
/// Per instance at most one request is in flight. Failures stay on the
/// instance that produced them, and results of superseded requests are
/// dropped without touching state.
pub struct FeedAggregator {
    registry: AdapterRegistry,
    inner: Arc<RwLock<Inner>>,
}

impl FeedAggregator {
    pub fn new(registry: AdapterRegistry) -> Self {
        Self {
            registry,
            inner: Arc::new(RwLock::new(Inner {
                slots: BTreeMap::new(),
                next_instance: 1,
                next_request: 1,
                epoch: 0,
                scope: CancellationToken::new(),
            })),
        }
    }

    /// Aggregator backed by the HTTP adapters for all four sources.
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let registry = http_adapters(config)?.into_iter().collect();
        Ok(Self::new(registry))
    }

    pub async fn activate_source(
        &self,
        source_type: SourceType,
        params: SourceParams,
    ) -> Result<InstanceId> {
        let adapter = self
            .registry
            .get(source_type)
            .ok_or(AggregatorError::AdapterNotRegistered { source_type })?;

        let mut inner = self.inner.write().await;
        let id = InstanceId(inner.next_instance);
        inner.next_instance += 1;

        let state = SourceInstance::new(id, source_type, params, adapter.is_paginated(), inner.epoch);
        inner.slots.insert(
            id,
            Slot {
                state,
                adapter,
                in_flight: None,
            },
        );

        info!("Activated {} source as instance {}", source_type, id);
        Ok(id)
    }

    /// Remove an instance. A request still in flight for it is cancelled and
    /// its result ignored.
    pub async fn deactivate_source(&self, id: InstanceId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let slot = inner
            .slots
            .remove(&id)
            .ok_or(AggregatorError::InstanceNotFound { id })?;

        if let Some(in_flight) = slot.in_flight {
            in_flight.cancel.cancel();
        }

        info!("Deactivated {} instance {}", slot.state.source_type, id);
        Ok(())
    }

    /// Fetch the next page of `id` and append it. Returns `Skipped` at once
    /// when the instance has no more pages or is already loading.
    pub async fn load_more(&self, id: InstanceId) -> Result<LoadOutcome> {
        let dispatch = {
            let mut inner = self.inner.write().await;
            let can_load = inner
                .slots
                .get(&id)
                .map(|slot| slot.state.can_load_more())
                .ok_or(AggregatorError::InstanceNotFound { id })?;

            if !can_load {
                debug!("Skipping load_more for instance {}", id);
                return Ok(LoadOutcome::Skipped);
            }
            inner.dispatch(id, false)
        };

        match dispatch {
            Some(dispatch) => Ok(self.execute(dispatch).await),
            None => Err(AggregatorError::InstanceNotFound { id }),
        }
    }

    /// Reset one instance to its first page and load it. Other instances and
    /// the refresh epoch are left alone.
    pub async fn refresh_one(&self, id: InstanceId) -> Result<LoadOutcome> {
        let dispatch = {
            let mut inner = self.inner.write().await;
            inner
                .dispatch(id, true)
                .ok_or(AggregatorError::InstanceNotFound { id })?
        };

        Ok(self.execute(dispatch).await)
    }

    /// Start a new refresh epoch: cancel everything in flight, reset every
    /// instance, then load all first pages concurrently. Each instance
    /// succeeds or fails on its own.
    pub async fn refresh_all(&self) -> RefreshSummary {
        let (epoch, dispatches) = {
            let mut inner = self.inner.write().await;
            inner.epoch += 1;
            inner.scope.cancel();
            inner.scope = CancellationToken::new();

            let ids: Vec<InstanceId> = inner.slots.keys().copied().collect();
            let dispatches: Vec<Dispatch> = ids
                .into_iter()
                .filter_map(|id| inner.dispatch(id, true))
                .collect();
            (inner.epoch, dispatches)
        };

        info!("Refresh epoch {} started for {} instances", epoch, dispatches.len());

        let outcomes = join_all(dispatches.into_iter().map(|dispatch| self.execute(dispatch))).await;

        let summary = outcomes.into_iter().fold(
            RefreshSummary {
                epoch,
                ..Default::default()
            },
            |mut summary, outcome| {
                match outcome {
                    LoadOutcome::Loaded { .. } => summary.loaded += 1,
                    LoadOutcome::Failed { .. } => summary.failed += 1,
                    LoadOutcome::Discarded | LoadOutcome::Skipped => summary.discarded += 1,
                }
                summary
            },
        );

        info!(
            "Refresh epoch {} finished: {} loaded, {} failed, {} discarded",
            epoch, summary.loaded, summary.failed, summary.discarded
        );
        summary
    }

    /// Clear the error shown for one instance.
    pub async fn dismiss_error(&self, id: InstanceId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let slot = inner
            .slots
            .get_mut(&id)
            .ok_or(AggregatorError::InstanceNotFound { id })?;
        slot.state.last_error = None;
        Ok(())
    }

    /// Copies of every instance, in activation order.
    pub async fn snapshot(&self) -> Vec<SourceInstance> {
        let inner = self.inner.read().await;
        inner.slots.values().map(|slot| slot.state.clone()).collect()
    }

    pub async fn instance(&self, id: InstanceId) -> Option<SourceInstance> {
        let inner = self.inner.read().await;
        inner.slots.get(&id).map(|slot| slot.state.clone())
    }

    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }

    /// Filtered view of the current buffers in insertion order.
    pub async fn view(&self, filter: &str) -> ProjectedView {
        view::project(&self.snapshot().await, filter)
    }

    pub async fn view_sorted(&self, filter: &str, sort: SortKey) -> ProjectedView {
        view::project_sorted(&self.snapshot().await, filter, sort)
    }

    async fn execute(&self, dispatch: Dispatch) -> LoadOutcome {
        let source_type = dispatch.adapter.source_type();
        match &dispatch.cursor {
            Some(cursor) => debug!("Requesting {} for instance {} ({})", cursor, dispatch.id, source_type),
            None => debug!("Requesting first page for instance {} ({})", dispatch.id, source_type),
        }

        let guard = PendingGuard {
            inner: self.inner.clone(),
            id: dispatch.id,
            ticket: dispatch.ticket,
            cancel: dispatch.cancel.clone(),
            armed: true,
        };

        let result = tokio::select! {
            biased;
            _ = dispatch.cancel.cancelled() => Err(SourceError::Cancelled),
            result = dispatch.adapter.fetch_page(&dispatch.params, dispatch.cursor.as_ref(), &dispatch.cancel) => result,
        };

        let outcome = self.complete(dispatch.id, dispatch.ticket, result).await;
        guard.disarm();
        outcome
    }

    async fn complete(
        &self,
        id: InstanceId,
        ticket: Ticket,
        result: std::result::Result<Page, SourceError>,
    ) -> LoadOutcome {
        let mut inner = self.inner.write().await;
        let current_epoch = inner.epoch;

        let Some(slot) = inner.slots.get_mut(&id) else {
            debug!("Dropping result of request {}: instance {} is gone", ticket.request, id);
            return LoadOutcome::Discarded;
        };

        let in_flight_ticket = slot.in_flight.as_ref().map(|in_flight| in_flight.ticket);
        if ticket.epoch != current_epoch || in_flight_ticket != Some(ticket) {
            debug!(
                "Dropping stale result of request {} for instance {} (epoch {}, current {})",
                ticket.request, id, ticket.epoch, current_epoch
            );
            return LoadOutcome::Discarded;
        }

        slot.in_flight = None;
        slot.state.is_loading = false;

        match result {
            Ok(page) => {
                let appended = slot.state.append_page(page);
                slot.state.last_error = None;
                debug!("Instance {} appended {} items", id, appended);
                LoadOutcome::Loaded {
                    appended,
                    has_more: slot.state.has_more,
                }
            }
            Err(e) if e.is_cancelled() => LoadOutcome::Discarded,
            Err(e) => {
                let error = e.to_string();
                warn!("Instance {} failed: {}", id, error);
                slot.state.last_error = Some(error.clone());
                LoadOutcome::Failed { error }
            }
        }
    }
}
