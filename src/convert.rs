//! Per-tool converters plugged into the [`crate::Orchestrator`].
//!
//! Each converter adapts one engine to [`ItemConverter`]: it builds the
//! engine request from an item's captured spec, moves CPU-bound work onto
//! the blocking pool, and names the produced artifacts.
//!
//! | Tool     | Spec          | Engine                          | Output name              |
//! |----------|---------------|---------------------------------|--------------------------|
//! | image    | [`ImageSpec`] | [`RasterEngine`]                | `<stem>.<ext>`           |
//! | media    | [`MediaSpec`] | [`TranscodeEngine`] (shared)    | `<stem>.<ext>`           |
//! | extract  | [`PageSet`]   | [`DocumentEngine`]              | `<stem>_edited.pdf`      |
//! | compress | [`PageSet`]   | [`DocumentEngine`]              | `<stem>_compressed.pdf`  |
//! | to-image | [`PageSet`]   | [`DocumentEngine`] + PDFium     | `<stem>_page<NNN>.png`   |
//! | merge    | all items     | [`DocumentEngine`]              | `merged.pdf`             |
//!
//! Merge is not per-item: [`merge_items`] combines the whole list into one
//! document.

use crate::engine::document::{DocumentEngine, MergeInput};
use crate::engine::ffmpeg;
use crate::engine::raster::{self, RasterEngine};
use crate::engine::transcode::TranscodeEngine;
use crate::error::ConvertError;
use crate::history::{HistoryRecord, HistorySink};
use crate::input::SourceFile;
use crate::orchestrator::{ItemConverter, Orchestrator};
use crate::output::{Artifact, ConversionResult};
use crate::spec::{ImageSpec, MediaSpec, OutputEncoding, PageSet};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const PDF: &str = "application/pdf";

/// Run a CPU-bound closure on the blocking pool.
async fn blocking<T, F>(what: &'static str, f: F) -> Result<T, ConvertError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ConvertError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConvertError::Internal(format!("{what} task panicked: {e}")))?
}

// ── Image ────────────────────────────────────────────────────────────────

/// Crop/rotate/flip/resize and re-encode still images.
#[derive(Debug, Clone, Default)]
pub struct ImageConverter {
    engine: RasterEngine,
}

impl ImageConverter {
    pub fn new(engine: RasterEngine) -> Self {
        Self { engine }
    }
}

impl ItemConverter<ImageSpec> for ImageConverter {
    fn convert(
        &self,
        source: SourceFile,
        spec: ImageSpec,
    ) -> BoxFuture<'_, Result<ConversionResult, ConvertError>> {
        let engine = self.engine.clone();
        async move {
            let name = format!("{}.{}", source.stem(), spec.encoding.extension());
            let encoded = blocking("raster", move || engine.convert(&source, &spec)).await?;
            debug!("{} → {}x{}", name, encoded.width, encoded.height);
            Ok(ConversionResult::single(Artifact::new(
                encoded.bytes,
                encoded.encoding.media_type(),
                name,
            )))
        }
        .boxed()
    }
}

// ── Media ────────────────────────────────────────────────────────────────

/// Trim and re-container audio/video through the shared transcoding engine.
#[derive(Debug, Clone)]
pub struct MediaConverter {
    engine: Arc<TranscodeEngine>,
}

impl MediaConverter {
    pub fn new(engine: Arc<TranscodeEngine>) -> Self {
        Self { engine }
    }
}

impl ItemConverter<MediaSpec> for MediaConverter {
    fn ensure_ready(&self) -> BoxFuture<'_, Result<(), ConvertError>> {
        self.engine.ensure_ready().boxed()
    }

    fn convert(
        &self,
        source: SourceFile,
        spec: MediaSpec,
    ) -> BoxFuture<'_, Result<ConversionResult, ConvertError>> {
        async move {
            spec.validate()?;
            let ext = source.extension().unwrap_or_else(|| "bin".into());
            let input_name = format!("input.{ext}");
            let output_name = ffmpeg::output_name(spec.target);

            let session = self.engine.session().await?;
            session.reset().await?;
            session.write_file(&input_name, source.bytes()).await?;
            session
                .exec(&ffmpeg::build_args(&input_name, &spec))
                .await
                .map_err(|e| match e {
                    ConvertError::Decode { detail, .. } => ConvertError::Decode {
                        name: source.name().to_string(),
                        detail,
                    },
                    other => other,
                })?;
            let bytes = session.read_file(&output_name).await?;
            session.remove_file(&input_name).await?;
            session.remove_file(&output_name).await?;
            drop(session);

            Ok(ConversionResult::single(Artifact::new(
                bytes,
                spec.target.media_type(),
                format!("{}.{}", source.stem(), spec.target.extension()),
            )))
        }
        .boxed()
    }
}

// ── Documents ────────────────────────────────────────────────────────────

/// What the document tool does with each item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DocumentAction {
    /// Keep the selected pages (rotated) as a new document.
    ExtractPages,
    /// Strip metadata and recompress.
    Compress,
    /// Rasterise the selected pages to PNG at `scale`.
    ExportImages { scale: f32 },
}

/// Applies one [`DocumentAction`] to every item.
#[derive(Debug, Clone)]
pub struct DocumentConverter {
    engine: DocumentEngine,
    action: DocumentAction,
}

impl DocumentConverter {
    pub fn new(engine: DocumentEngine, action: DocumentAction) -> Self {
        Self { engine, action }
    }

    /// Initial page set for a freshly added document: every page selected.
    pub fn pages_for(&self, source: &SourceFile) -> Result<PageSet, ConvertError> {
        let meta = self.engine.load_metadata(source.bytes())?;
        Ok(PageSet::all(meta.page_count))
    }
}

impl ItemConverter<PageSet> for DocumentConverter {
    fn ensure_ready(&self) -> BoxFuture<'_, Result<(), ConvertError>> {
        let engine = self.engine.clone();
        let needs_renderer = matches!(self.action, DocumentAction::ExportImages { .. });
        async move {
            if needs_renderer {
                blocking("pdfium bind", move || engine.bind_pdfium().map(drop)).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn convert(
        &self,
        source: SourceFile,
        pages: PageSet,
    ) -> BoxFuture<'_, Result<ConversionResult, ConvertError>> {
        let engine = self.engine.clone();
        let action = self.action;
        async move {
            let stem = source.stem().to_string();
            match action {
                DocumentAction::ExtractPages => {
                    if pages.is_empty() {
                        return Err(ConvertError::invalid_spec("no pages selected"));
                    }
                    let bytes = blocking("extract", move || {
                        engine.extract_subset(source.name(), source.bytes(), &pages)
                    })
                    .await?;
                    Ok(ConversionResult::single(Artifact::new(
                        bytes,
                        PDF,
                        format!("{stem}_edited.pdf"),
                    )))
                }
                DocumentAction::Compress => {
                    let bytes =
                        blocking("compress", move || engine.compress(source.bytes())).await?;
                    Ok(ConversionResult::single(Artifact::new(
                        bytes,
                        PDF,
                        format!("{stem}_compressed.pdf"),
                    )))
                }
                DocumentAction::ExportImages { scale } => {
                    if pages.is_empty() {
                        return Err(ConvertError::invalid_spec("no pages selected"));
                    }
                    let artifacts = blocking("rasterise", move || {
                        engine
                            .rasterize_pages(source.bytes(), &pages, scale)?
                            .into_iter()
                            .map(|(idx, img)| -> Result<Artifact, ConvertError> {
                                let png = raster::encode(&img, OutputEncoding::Png, 1.0)?;
                                Ok(Artifact::new(
                                    png,
                                    OutputEncoding::Png.media_type(),
                                    format!("{stem}_page{:03}.png", idx + 1),
                                ))
                            })
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .await?;
                    Ok(ConversionResult { artifacts })
                }
            }
        }
        .boxed()
    }
}

/// Merge every item of a document list, in list order, into `merged.pdf`.
///
/// Item states are left untouched. On success one history record
/// (`"Merged PDF (N files)"`) is appended.
pub async fn merge_items(
    items: &Orchestrator<PageSet>,
    engine: &DocumentEngine,
    history: &dyn HistorySink,
) -> Result<Artifact, ConvertError> {
    let inputs: Vec<(SourceFile, PageSet)> = items
        .snapshot()
        .into_iter()
        .map(|item| (item.source().clone(), item.spec().clone()))
        .collect();
    if inputs.iter().all(|(_, pages)| pages.is_empty()) {
        return Err(ConvertError::invalid_spec("no pages selected in any document"));
    }

    let file_count = inputs.len();
    let engine = engine.clone();
    let bytes = blocking("merge", move || {
        let merge_inputs: Vec<MergeInput<'_>> = inputs
            .iter()
            .map(|(source, pages)| MergeInput {
                name: source.name(),
                bytes: source.bytes(),
                pages,
            })
            .collect();
        engine.build_merged(&merge_inputs)
    })
    .await?;

    info!("Merged {} file(s) into {} bytes", file_count, bytes.len());
    history.append(HistoryRecord {
        id: Uuid::new_v4().to_string(),
        file_name: format!("Merged PDF ({file_count} files)"),
        source_type: PDF.into(),
        result_type: PDF.into(),
        size: bytes.len() as u64,
        completed_at: Utc::now(),
    });
    Ok(Artifact::new(bytes, PDF, "merged.pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::document::testing::{create_test_pdf, describe};
    use crate::engine::transcode::testing::{CopyCore, StubLoader};
    use crate::error::ErrorKind;
    use crate::history::HistoryLog;
    use crate::orchestrator::ItemStatus;
    use crate::spec::{GeometricTransformSpec, MediaTarget, ResizeMode, Rotation};
    use image::{DynamicImage, GenericImageView, RgbaImage};
    use std::sync::atomic::Ordering;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
        raster::encode(&img, OutputEncoding::Png, 1.0).unwrap()
    }

    #[tokio::test]
    async fn image_items_are_named_by_encoding() {
        let orch = Orchestrator::new(Arc::new(HistoryLog::default()));
        let spec = ImageSpec {
            geometry: GeometricTransformSpec {
                resize: ResizeMode::ByPercent(50),
                rotation: Rotation::Deg90,
                ..Default::default()
            },
            encoding: OutputEncoding::Jpeg,
            quality: 0.7,
        };
        let id = orch.add(SourceFile::from_bytes("holiday.photo.png", png(40, 20)), spec);
        orch.run(&ImageConverter::default()).await;

        let item = orch.get(id).unwrap();
        let artifact = &item.result().unwrap().artifacts[0];
        assert_eq!(artifact.suggested_name, "holiday.photo.jpeg");
        assert_eq!(artifact.media_type, "image/jpeg");
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (10, 20));
    }

    #[tokio::test]
    async fn unknown_container_without_normaliser_is_decode_error() {
        let orch = Orchestrator::new(Arc::new(HistoryLog::default()));
        let id = orch.add(
            SourceFile::from_bytes("raw.heic", b"ftypheic".to_vec()),
            ImageSpec::default(),
        );
        orch.run(&ImageConverter::default()).await;
        assert_eq!(orch.get(id).unwrap().error(), Some(ErrorKind::DecodeError));
    }

    #[tokio::test]
    async fn oversized_resize_fails_only_that_item() {
        let history = Arc::new(HistoryLog::default());
        let orch = Orchestrator::new(history.clone());
        let huge = ImageSpec {
            geometry: GeometricTransformSpec {
                resize: ResizeMode::ByPercent(1_000_000),
                ..Default::default()
            },
            ..Default::default()
        };
        let ids = orch.add_many([
            (SourceFile::from_bytes("first.png", png(100, 100)), ImageSpec::default()),
            (SourceFile::from_bytes("huge.png", png(100, 100)), huge),
            (SourceFile::from_bytes("last.png", png(100, 100)), ImageSpec::default()),
        ]);

        let summary = orch.run(&ImageConverter::default()).await;
        assert_eq!((summary.attempted, summary.succeeded, summary.failed), (3, 2, 1));
        assert_eq!(orch.status(ids[0]), Some(ItemStatus::Done));
        assert_eq!(orch.get(ids[1]).unwrap().error(), Some(ErrorKind::InvalidSpec));
        assert_eq!(orch.status(ids[2]), Some(ItemStatus::Done));
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn media_items_go_through_one_session_each() {
        let core = Arc::new(CopyCore::default());
        let engine = Arc::new(TranscodeEngine::new(StubLoader::ok(Arc::clone(&core))));
        let history = Arc::new(HistoryLog::default());
        let orch = Orchestrator::new(history.clone());
        orch.add(SourceFile::from_bytes("clip.mp4", b"video".to_vec()), MediaSpec::default());
        orch.add(
            SourceFile::from_bytes("song.wav", b"audio".to_vec()),
            MediaSpec::for_target(MediaTarget::Mp3),
        );

        let summary = orch.run(&MediaConverter::new(engine)).await;
        assert_eq!(summary.succeeded, 2);
        assert_eq!(core.calls.load(Ordering::SeqCst), 2);

        let items = orch.snapshot();
        let names: Vec<_> = items
            .iter()
            .map(|i| i.result().unwrap().artifacts[0].suggested_name.clone())
            .collect();
        assert_eq!(names, ["clip.gif", "song.mp3"]);
        assert_eq!(items[1].result().unwrap().artifacts[0].bytes, b"audio");
        assert_eq!(history.entries()[0].result_type, "audio/mpeg");
    }

    #[tokio::test]
    async fn failed_engine_never_executes() {
        let engine = Arc::new(TranscodeEngine::new(StubLoader::failing()));
        let orch = Orchestrator::new(Arc::new(HistoryLog::default()));
        let id = orch.add(
            SourceFile::from_bytes("clip.mp4", b"video".to_vec()),
            MediaSpec::default(),
        );

        let converter = MediaConverter::new(engine);
        orch.run(&converter).await;
        assert_eq!(orch.get(id).unwrap().error(), Some(ErrorKind::EngineUnavailable));

        // Still failed on the next run; no retry of the load.
        orch.run(&converter).await;
        assert_eq!(orch.get(id).unwrap().error(), Some(ErrorKind::EngineUnavailable));
    }

    #[tokio::test]
    async fn extract_and_compress_name_outputs() {
        let pdf = SourceFile::from_bytes("report.pdf", create_test_pdf(3, "R", None));
        let engine = DocumentEngine::default();

        let extract = DocumentConverter::new(engine.clone(), DocumentAction::ExtractPages);
        let pages = PageSet::with_pages(3, [2]).unwrap();
        let result = extract.convert(pdf.clone(), pages).await.unwrap();
        assert_eq!(result.artifacts[0].suggested_name, "report_edited.pdf");
        assert_eq!(describe(&result.artifacts[0].bytes), [("R-Page-3".to_string(), 0)]);

        let compress = DocumentConverter::new(engine, DocumentAction::Compress);
        let all = compress.pages_for(&pdf).unwrap();
        let result = compress.convert(pdf, all).await.unwrap();
        assert_eq!(result.artifacts[0].suggested_name, "report_compressed.pdf");
    }

    #[tokio::test]
    async fn corrupt_document_is_isolated() {
        let engine = DocumentEngine::default();
        let orch = Orchestrator::new(Arc::new(HistoryLog::default()));
        let bad = orch.add(
            SourceFile::from_bytes("bad.pdf", b"not a pdf".to_vec()),
            PageSet::all(1),
        );
        let good = orch.add(
            SourceFile::from_bytes("good.pdf", create_test_pdf(1, "G", None)),
            PageSet::all(1),
        );

        orch.run(&DocumentConverter::new(engine, DocumentAction::ExtractPages)).await;
        assert_eq!(orch.get(bad).unwrap().error(), Some(ErrorKind::CorruptDocument));
        assert_eq!(orch.status(good), Some(ItemStatus::Done));
    }

    #[tokio::test]
    async fn merge_follows_list_order_and_records_once() {
        let engine = DocumentEngine::default();
        let history = HistoryLog::default();
        let orch = Orchestrator::new(Arc::new(HistoryLog::default()));
        let a = orch.add(
            SourceFile::from_bytes("a.pdf", create_test_pdf(2, "A", None)),
            PageSet::all(2).with_rotation(Rotation::Deg90),
        );
        orch.add(
            SourceFile::from_bytes("b.pdf", create_test_pdf(1, "B", None)),
            PageSet::all(1),
        );
        orch.move_down(a);

        let merged = merge_items(&orch, &engine, &history).await.unwrap();
        assert_eq!(merged.suggested_name, "merged.pdf");
        assert_eq!(
            describe(&merged.bytes),
            [
                ("B-Page-1".to_string(), 0),
                ("A-Page-1".to_string(), 90),
                ("A-Page-2".to_string(), 90),
            ]
        );

        let records = history.entries();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "Merged PDF (2 files)");
        assert_eq!(records[0].size, merged.bytes.len() as u64);
    }

    #[tokio::test]
    async fn merge_with_nothing_selected_is_rejected() {
        let orch: Orchestrator<PageSet> = Orchestrator::new(Arc::new(HistoryLog::default()));
        let history = HistoryLog::default();
        let err = merge_items(&orch, &DocumentEngine::default(), &history)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidSpec(_)));
        assert!(history.is_empty());
    }
}
