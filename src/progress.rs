//! Progress-callback trait for per-item conversion events.
//!
//! Attach an [`Arc<dyn ConversionProgressCallback>`] to an
//! [`crate::Orchestrator`] via
//! [`crate::Orchestrator::with_progress`] to receive events as a run works
//! through its items.
//!
//! # Why callbacks instead of channels?
//!
//! The callback is the least-invasive integration point: hosts can forward
//! events to a channel, a UI or a terminal progress bar without the library
//! knowing how the host communicates.
//!
//! # Example
//!
//! ```rust
//! use file_converter::{ConversionProgressCallback, ItemId};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, _id: ItemId, name: &str, size: u64) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: {name} ({size} bytes)");
//!     }
//! }
//! ```

use crate::error::ErrorKind;
use crate::orchestrator::ItemId;
use std::sync::Arc;

/// Called by the orchestrator as it processes each item.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive in run order from a single task.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first item.
    ///
    /// # Arguments
    /// * `eligible` — items this run will attempt
    fn on_run_start(&self, eligible: usize) {
        let _ = eligible;
    }

    /// Called when an item enters `Converting`.
    fn on_item_start(&self, id: ItemId, name: &str) {
        let _ = (id, name);
    }

    /// Called when an item reaches `Done`.
    ///
    /// # Arguments
    /// * `size` — total bytes produced
    fn on_item_complete(&self, id: ItemId, name: &str, size: u64) {
        let _ = (id, name, size);
    }

    /// Called when an item reaches `Error`.
    fn on_item_error(&self, id: ItemId, name: &str, kind: ErrorKind) {
        let _ = (id, name, kind);
    }

    /// Called once after every eligible item has been attempted.
    ///
    /// # Arguments
    /// * `eligible`      — items this run attempted
    /// * `success_count` — items that reached `Done`
    fn on_run_complete(&self, eligible: usize, success_count: usize) {
        let _ = (eligible, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is attached.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback handle.
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        let id = ItemId::new();
        cb.on_run_start(2);
        cb.on_item_start(id, "a.png");
        cb.on_item_complete(id, "a.png", 42);
        cb.on_item_error(id, "b.png", ErrorKind::DecodeError);
        cb.on_run_complete(2, 1);
    }
}
