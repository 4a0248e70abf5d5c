//! # file-converter
//!
//! Batch-convert locally supplied files (still images, audio/video, PDF
//! documents) without any server round-trip.
//!
//! ## Why one orchestrator for three engines?
//!
//! The three engines could hardly be more different: a pure raster
//! compositor, a single stateful transcoding core that must never run two
//! jobs at once, and a page-oriented PDF engine. Users see the same thing
//! for all of them though: a list of files, each pending, converting, done
//! or failed. [`Orchestrator`] owns that list and its state machine once;
//! each tool only supplies an [`ItemConverter`].
//!
//! ## Pipeline Overview
//!
//! ```text
//! SourceFile + spec
//!  │
//!  ├─ 1. Add      item appended as Pending, spec captured
//!  ├─ 2. Run      items taken strictly in list order, one at a time
//!  ├─ 3. Engine   raster (blocking pool) │ transcode (session) │ document
//!  ├─ 4. Commit   Done + result, or Error + kind; the batch continues
//!  └─ 5. Record   history record appended, artifacts delivered
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use file_converter::{
//!     HistoryLog, ImageConverter, ImageSpec, Orchestrator, OutputEncoding, SourceFile,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let history = Arc::new(HistoryLog::default());
//!     let items = Orchestrator::new(history.clone());
//!
//!     let spec = ImageSpec { encoding: OutputEncoding::Webp, ..ImageSpec::default() };
//!     items.add(SourceFile::from_path("photo.png").await?, spec);
//!
//!     let summary = items.run(&ImageConverter::default()).await;
//!     eprintln!("{} done, {} failed", summary.succeeded, summary.failed);
//!     println!("{}", history.to_json()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fileconv` binary (clap, indicatif, tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! file-converter = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Needed for | Tool | Located via |
//! |------------|------|-------------|
//! | audio/video | `ffmpeg` | config, `FFMPEG_PATH`, `PATH` |
//! | PDF → PNG | PDFium | config, `PDFIUM_LIB_PATH`, system library |
//!
//! Everything else (images, merge, extract, compress) is pure Rust.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod history;
pub mod input;
pub mod orchestrator;
pub mod output;
pub mod progress;
pub mod spec;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConverterConfig, ConverterConfigBuilder};
pub use convert::{merge_items, DocumentAction, DocumentConverter, ImageConverter, MediaConverter};
pub use engine::document::DocumentEngine;
pub use engine::ffmpeg::FfmpegLoader;
pub use engine::normalize::{ExternalToolNormalizer, FormatNormalizer};
pub use engine::raster::RasterEngine;
pub use engine::transcode::{EngineState, TranscodeEngine};
pub use error::{ConvertError, ErrorKind};
pub use history::{HistoryLog, HistoryRecord, HistorySink, NoopHistory};
pub use input::SourceFile;
pub use orchestrator::{
    ConversionItem, ItemConverter, ItemId, ItemState, ItemStatus, Orchestrator, RunSummary,
};
pub use output::{Artifact, ConversionResult, DirectoryDelivery, ResultSink};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use spec::{
    CropRect, GeometricTransformSpec, ImageSpec, MediaSpec, MediaTarget, OutputEncoding, PageSet,
    ResizeMode, Rotation, TrimRange,
};
