//! The per-item conversion state machine shared by every tool.
//!
//! ```text
//!            run()                    engine Ok
//! Pending ──────────► Converting ─────────────────► Done
//!    ▲                    │
//!    │ set_spec()         │ engine Err
//!    │                    ▼
//!    └──────────────── Error ◄── (eligible again on the next run)
//! ```
//!
//! ## Why a std mutex around the list?
//!
//! The item list is touched in short critical sections only (claim an item,
//! commit its outcome) and the guard is never held across an `.await`. Host
//! code can therefore add, remove, reorder or inspect items while a run is
//! suspended on an engine call. Runs themselves are serialised by a separate
//! async lock.
//!
//! ## Failure isolation
//!
//! One item's failure never aborts the batch. The detailed cause is logged
//! and only its [`ErrorKind`] is stored on the item.

use crate::error::{ConvertError, ErrorKind};
use crate::history::{HistoryRecord, HistorySink};
use crate::input::SourceFile;
use crate::output::{ConversionResult, ResultSink};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use chrono::Utc;
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ── Items ────────────────────────────────────────────────────────────────

/// Opaque, stable identifier of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What is recorded about a failed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
}

/// Lifecycle state. The result and the error only exist in their own state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Converting,
    Done(ConversionResult),
    Error(ErrorInfo),
}

/// Payload-free view of [`ItemState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    Pending,
    Converting,
    Done,
    Error,
}

impl ItemState {
    pub fn status(&self) -> ItemStatus {
        match self {
            ItemState::Pending => ItemStatus::Pending,
            ItemState::Converting => ItemStatus::Converting,
            ItemState::Done(_) => ItemStatus::Done,
            ItemState::Error(_) => ItemStatus::Error,
        }
    }

    /// Whether the next run should attempt this item.
    fn is_eligible(&self) -> bool {
        matches!(self, ItemState::Pending | ItemState::Error(_))
    }
}

/// One user-supplied file plus everything known about its conversion.
#[derive(Debug, Clone)]
pub struct ConversionItem<S> {
    id: ItemId,
    source: SourceFile,
    state: ItemState,
    spec: S,
}

impl<S> ConversionItem<S> {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn state(&self) -> &ItemState {
        &self.state
    }

    pub fn status(&self) -> ItemStatus {
        self.state.status()
    }

    pub fn spec(&self) -> &S {
        &self.spec
    }

    pub fn result(&self) -> Option<&ConversionResult> {
        match &self.state {
            ItemState::Done(r) => Some(r),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<ErrorKind> {
        match &self.state {
            ItemState::Error(info) => Some(info.kind),
            _ => None,
        }
    }
}

// ── Engine seam ──────────────────────────────────────────────────────────

/// Turns one source plus a captured spec into a result.
///
/// Implemented once per tool in [`crate::convert`].
pub trait ItemConverter<S>: Send + Sync {
    /// Readiness gate awaited once before a run touches any item.
    ///
    /// A failure marks every eligible item as failed with the error's kind.
    fn ensure_ready(&self) -> BoxFuture<'_, Result<(), ConvertError>> {
        future::ready(Ok(())).boxed()
    }

    fn convert(
        &self,
        source: SourceFile,
        spec: S,
    ) -> BoxFuture<'_, Result<ConversionResult, ConvertError>>;
}

/// Outcome counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Items moved to `Converting` (or failed by the readiness gate).
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items removed while converting; their results were dropped.
    pub discarded: usize,
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Ordered item list plus the sequential run loop.
///
/// Share it behind an `Arc` when host code must edit the list while a run
/// is in progress.
pub struct Orchestrator<S> {
    items: Mutex<Vec<ConversionItem<S>>>,
    run_lock: tokio::sync::Mutex<()>,
    history: Arc<dyn HistorySink>,
    delivery: Option<Arc<dyn ResultSink>>,
    progress: ProgressCallback,
}

impl<S> std::fmt::Debug for Orchestrator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("items", &self.lock().len())
            .field("delivery", &self.delivery.is_some())
            .finish()
    }
}

impl<S> Orchestrator<S> {
    fn lock(&self) -> MutexGuard<'_, Vec<ConversionItem<S>>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S: Clone + Send> Orchestrator<S> {
    pub fn new(history: Arc<dyn HistorySink>) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            run_lock: tokio::sync::Mutex::new(()),
            history,
            delivery: None,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Hand every produced artifact to `sink` after its item completes.
    pub fn with_delivery(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.delivery = Some(sink);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    // ── List management ──────────────────────────────────────────────────

    /// Append a `Pending` item.
    pub fn add(&self, source: SourceFile, spec: S) -> ItemId {
        let id = ItemId::new();
        debug!("Added {} ({})", source.name(), id);
        self.lock().push(ConversionItem {
            id,
            source,
            state: ItemState::Pending,
            spec,
        });
        id
    }

    pub fn add_many(&self, items: impl IntoIterator<Item = (SourceFile, S)>) -> Vec<ItemId> {
        items.into_iter().map(|(source, spec)| self.add(source, spec)).collect()
    }

    /// Remove an item. A converting item's eventual result is discarded.
    pub fn remove(&self, id: ItemId) -> bool {
        let mut items = self.lock();
        let before = items.len();
        items.retain(|i| i.id != id);
        items.len() != before
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Swap an item with its predecessor.
    pub fn move_up(&self, id: ItemId) -> bool {
        let mut items = self.lock();
        match items.iter().position(|i| i.id == id) {
            Some(pos) if pos > 0 => {
                items.swap(pos, pos - 1);
                true
            }
            _ => false,
        }
    }

    /// Swap an item with its successor.
    pub fn move_down(&self, id: ItemId) -> bool {
        let mut items = self.lock();
        match items.iter().position(|i| i.id == id) {
            Some(pos) if pos + 1 < items.len() => {
                items.swap(pos, pos + 1);
                true
            }
            _ => false,
        }
    }

    /// Replace an item's spec and move it back to `Pending`.
    ///
    /// Refused (returns `false`) while the item is converting; the running
    /// conversion keeps the snapshot it started with either way.
    pub fn set_spec(&self, id: ItemId, spec: S) -> bool {
        let mut items = self.lock();
        match items.iter_mut().find(|i| i.id == id) {
            Some(item) if item.state != ItemState::Converting => {
                item.spec = spec;
                item.state = ItemState::Pending;
                true
            }
            _ => false,
        }
    }

    /// Apply `change` to every item not currently converting and move those
    /// items back to `Pending`. Returns how many items changed.
    pub fn update_all_specs(&self, mut change: impl FnMut(&mut S)) -> usize {
        let mut items = self.lock();
        let mut changed = 0;
        for item in items.iter_mut().filter(|i| i.state != ItemState::Converting) {
            change(&mut item.spec);
            item.state = ItemState::Pending;
            changed += 1;
        }
        changed
    }

    // ── Inspection ───────────────────────────────────────────────────────

    /// Copy of the whole list, in order.
    pub fn snapshot(&self) -> Vec<ConversionItem<S>> {
        self.lock().clone()
    }

    pub fn get(&self, id: ItemId) -> Option<ConversionItem<S>> {
        self.lock().iter().find(|i| i.id == id).cloned()
    }

    pub fn status(&self, id: ItemId) -> Option<ItemStatus> {
        self.lock().iter().find(|i| i.id == id).map(ConversionItem::status)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // ── Run loop ─────────────────────────────────────────────────────────

    /// Convert every eligible item, strictly in list order, one at a time.
    ///
    /// Eligibility is fixed when the run starts: items added meanwhile wait
    /// for the next run. Never fails as a whole; per-item outcomes are
    /// recorded on the items.
    pub async fn run<C>(&self, converter: &C) -> RunSummary
    where
        C: ItemConverter<S> + ?Sized,
    {
        let _run = self.run_lock.lock().await;
        let mut summary = RunSummary::default();

        let eligible: Vec<ItemId> = self
            .lock()
            .iter()
            .filter(|i| i.state.is_eligible())
            .map(|i| i.id)
            .collect();
        info!("Run started: {} eligible item(s)", eligible.len());
        self.progress.on_run_start(eligible.len());

        if eligible.is_empty() {
            self.progress.on_run_complete(0, 0);
            return summary;
        }

        if let Err(e) = converter.ensure_ready().await {
            warn!("Engine not ready, failing {} item(s): {}", eligible.len(), e);
            let kind = e.kind();
            for id in &eligible {
                let failed = {
                    let mut items = self.lock();
                    items
                        .iter_mut()
                        .find(|i| i.id == *id && i.state.is_eligible())
                        .map(|item| {
                            item.state = ItemState::Error(ErrorInfo { kind });
                            item.source.name().to_string()
                        })
                };
                if let Some(name) = failed {
                    summary.attempted += 1;
                    summary.failed += 1;
                    self.progress.on_item_error(*id, &name, kind);
                }
            }
            self.progress.on_run_complete(eligible.len(), 0);
            return summary;
        }

        for id in eligible {
            let claimed = {
                let mut items = self.lock();
                match items.iter_mut().find(|i| i.id == id) {
                    Some(item) if item.state.is_eligible() => {
                        item.state = ItemState::Converting;
                        Some((item.source.clone(), item.spec.clone()))
                    }
                    // Removed or re-specced into a non-eligible state meanwhile.
                    _ => None,
                }
            };
            let Some((source, spec)) = claimed else {
                continue;
            };

            summary.attempted += 1;
            self.progress.on_item_start(id, source.name());
            debug!("Converting {} ({})", source.name(), id);

            let outcome = converter.convert(source.clone(), spec).await;
            self.commit(id, &source, outcome, &mut summary);
        }

        info!(
            "Run complete: {} succeeded, {} failed, {} discarded",
            summary.succeeded, summary.failed, summary.discarded
        );
        self.progress.on_run_complete(summary.attempted, summary.succeeded);
        summary
    }

    fn commit(
        &self,
        id: ItemId,
        source: &SourceFile,
        outcome: Result<ConversionResult, ConvertError>,
        summary: &mut RunSummary,
    ) {
        let kind = outcome.as_ref().err().map(ConvertError::kind);
        if let Err(e) = &outcome {
            warn!("Conversion of {} ({}) failed: {}", source.name(), id, e);
        }

        let mut items = self.lock();
        let Some(item) = items.iter_mut().find(|i| i.id == id) else {
            drop(items);
            debug!("{} was removed while converting; result discarded", id);
            summary.discarded += 1;
            return;
        };

        match outcome {
            Ok(result) => {
                let record = HistoryRecord {
                    id: Uuid::new_v4().to_string(),
                    file_name: source.name().to_string(),
                    source_type: source.media_type().to_string(),
                    result_type: result.media_type().to_string(),
                    size: result.byte_size(),
                    completed_at: Utc::now(),
                };
                let artifacts = self.delivery.as_ref().map(|_| result.artifacts.clone());
                item.state = ItemState::Done(result);
                drop(items);

                summary.succeeded += 1;
                self.progress.on_item_complete(id, source.name(), record.size);
                self.history.append(record);
                if let (Some(sink), Some(artifacts)) = (&self.delivery, artifacts) {
                    for a in &artifacts {
                        sink.deliver(&a.bytes, &a.suggested_name);
                    }
                }
            }
            Err(_) => {
                let kind = kind.unwrap_or(ErrorKind::Unknown);
                item.state = ItemState::Error(ErrorInfo { kind });
                drop(items);

                summary.failed += 1;
                self.progress.on_item_error(id, source.name(), kind);
            }
        }
    }
}
