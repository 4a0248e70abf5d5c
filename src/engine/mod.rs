//! Backend engines, one per category of transform.
//!
//! Each submodule owns exactly one backend and knows nothing about items,
//! statuses or history; that bookkeeping lives in
//! [`crate::orchestrator`]. The engines differ in their concurrency rules:
//!
//! ```text
//! raster     pure function      any number of concurrent calls
//! document   lopdf + PDFium     stateless per call, CPU-bound
//! transcode  one ffmpeg core    exactly one session at a time
//! ```
//!
//! 1. [`raster`]    — crop/resize/flip/rotate and encode a still image
//! 2. [`normalize`] — optional pre-decode step for non-native image containers
//! 3. [`document`]  — page count, merge, extract, compress, rasterise
//! 4. [`transcode`] — the single shared transcoding core and its sessions
//! 5. [`ffmpeg`]    — the ffmpeg-backed core and its argument builder

pub mod document;
pub mod ffmpeg;
pub mod normalize;
pub mod raster;
pub mod transcode;
