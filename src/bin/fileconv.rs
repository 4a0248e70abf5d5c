//! CLI binary for file-converter.
//!
//! A thin shim over the library crate that maps CLI flags to specs and a
//! `ConverterConfig`, runs the matching tool over every input and writes the
//! results into the output directory.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use file_converter::spec::pages::parse_ranges;
use file_converter::{
    merge_items, ConversionProgressCallback, ConverterConfig, CropRect, DirectoryDelivery,
    DocumentAction, DocumentConverter, DocumentEngine, ErrorKind, ExternalToolNormalizer,
    FfmpegLoader, GeometricTransformSpec, HistoryLog, ImageConverter, ImageSpec, ItemConverter,
    ItemId, MediaConverter, MediaSpec, MediaTarget, Orchestrator, OutputEncoding, PageSet,
    ProgressCallback, RasterEngine, ResizeMode, ResultSink, Rotation, RunSummary, SourceFile,
    TranscodeEngine, TrimRange,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per item.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<ItemId, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} files  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Converting");

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, id: ItemId) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, eligible: usize) {
        self.bar.set_length(eligible as u64);
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {eligible} file(s)…"))
        ));
    }

    fn on_item_start(&self, id: ItemId, name: &str) {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Instant::now());
        self.bar.set_message(name.to_string());
    }

    fn on_item_complete(&self, id: ItemId, name: &str, size: u64) {
        let secs = self.elapsed_secs(id);
        self.bar.println(format!(
            "  {} {:<40}  {:<12}  {}",
            green("✓"),
            name,
            dim(&format!("{size:>9} B")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, id: ItemId, name: &str, kind: ErrorKind) {
        let secs = self.elapsed_secs(id);
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            name,
            red(&kind.to_string()),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, eligible: usize, success_count: usize) {
        let failed = eligible.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} file(s) converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                if failed == eligible { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                eligible,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Re-encode photos as WebP, half size
  fileconv image --to webp --percent 50 *.png -o out/

  # Crop, rotate and flip one image
  fileconv image --crop 100,0,200,300 --rotate 90 --flip-h photo.jpg

  # HEIC input via an external normaliser
  fileconv image --normalize-with "heif-convert {input} {output}" IMG_0001.heic

  # First 3 seconds of a clip as a GIF, starting at 1.5 s
  fileconv media --to gif --start 1.5 --duration 3 clip.mp4

  # Extract the audio track
  fileconv media --to mp3 interview.mov

  # Merge PDFs (in argument order), rotating every page 90°
  fileconv pdf merge --rotate 90 a.pdf b.pdf

  # Keep pages 1-3 and 5
  fileconv pdf extract --pages 1-3,5 report.pdf

  # Render pages to PNG at 3× scale, then print the history
  fileconv --history pdf to-image --scale 3 slides.pdf

ENVIRONMENT VARIABLES:
  FFMPEG_PATH       Path to the ffmpeg binary (default: ffmpeg on PATH)
  PDFIUM_LIB_PATH   Path to libpdfium or its directory (needed for to-image)
  RUST_LOG          Log filter, e.g. file_converter=debug
"#;

/// Batch-convert images, audio/video and PDF documents locally.
#[derive(Parser, Debug)]
#[command(
    name = "fileconv",
    version,
    about = "Batch-convert images, audio/video and PDF documents locally",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory results are written to.
    #[arg(short, long, global = true, env = "FILECONV_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Print the conversion history as JSON on stdout when done.
    #[arg(long, global = true)]
    history: bool,

    /// Explicit ffmpeg binary.
    #[arg(long, global = true, env = "FILECONV_FFMPEG")]
    ffmpeg: Option<PathBuf>,

    /// Explicit PDFium library (file or directory).
    #[arg(long, global = true, env = "FILECONV_PDFIUM")]
    pdfium: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, global = true, env = "FILECONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FILECONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FILECONV_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crop, rotate, flip, resize and re-encode still images.
    Image(ImageArgs),
    /// Trim audio/video and convert to GIF, MP3 or WAV (needs ffmpeg).
    Media(MediaArgs),
    /// Merge, extract, compress or rasterise PDF documents.
    Pdf {
        #[command(subcommand)]
        action: PdfCommand,
    },
}

#[derive(Args, Debug)]
struct ImageArgs {
    /// Input image files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output encoding: png, jpeg, webp, gif, bmp, avif.
    #[arg(long = "to", default_value = "png")]
    to: String,

    /// Quality for lossy encodings (0.1–1.0).
    #[arg(long, default_value_t = 0.9)]
    quality: f32,

    /// Crop rectangle in source pixels: x,y,width,height.
    #[arg(long)]
    crop: Option<String>,

    /// Clockwise rotation in degrees (multiple of 90).
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    rotate: i64,

    /// Mirror horizontally.
    #[arg(long)]
    flip_h: bool,

    /// Mirror vertically.
    #[arg(long)]
    flip_v: bool,

    /// Resize to this width, keeping the aspect ratio.
    #[arg(long, conflicts_with = "percent")]
    width: Option<u32>,

    /// Resize by percentage.
    #[arg(long)]
    percent: Option<u32>,

    /// External command for HEIC/RAW inputs, with {input} and {output} placeholders.
    #[arg(long)]
    normalize_with: Option<String>,
}

#[derive(Args, Debug)]
struct MediaArgs {
    /// Input audio/video files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output format: gif, mp3, wav.
    #[arg(long = "to", default_value = "gif")]
    to: String,

    /// Start offset in seconds.
    #[arg(long, default_value_t = 0.0)]
    start: f64,

    /// Duration in seconds (GIF default: 5; audio default: to the end).
    #[arg(long)]
    duration: Option<f64>,

    /// GIF frame rate.
    #[arg(long, default_value_t = 10)]
    fps: u32,

    /// GIF width in pixels.
    #[arg(long, default_value_t = 480)]
    gif_width: u32,
}

#[derive(Args, Debug)]
struct PdfArgs {
    /// Input PDF files (merge order = argument order).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Pages to keep, 1-based: all, 5, 3-15 or 1,3,5-7.
    #[arg(long, default_value = "all")]
    pages: String,

    /// Extra clockwise rotation applied to every kept page.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    rotate: i64,
}

#[derive(Subcommand, Debug)]
enum PdfCommand {
    /// Combine all inputs into merged.pdf.
    Merge(PdfArgs),
    /// Keep only the selected pages of each input.
    Extract(PdfArgs),
    /// Strip metadata and recompress each input.
    Compress(PdfArgs),
    /// Render the selected pages of each input to PNG (needs PDFium).
    ToImage {
        #[command(flatten)]
        common: PdfArgs,

        /// Render scale (1.0 = 72 DPI).
        #[arg(long)]
        scale: Option<f32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = ConverterConfig::builder();
    if let Some(p) = &cli.ffmpeg {
        builder = builder.ffmpeg_path(p);
    }
    if let Some(p) = &cli.pdfium {
        builder = builder.pdfium_path(p);
    }
    if let Command::Image(args) = &cli.command {
        builder = builder
            .image_encoding(OutputEncoding::parse(&args.to).context("Unsupported --to encoding")?)
            .quality(args.quality);
    }
    if let Command::Pdf {
        action: PdfCommand::ToImage { scale: Some(s), .. },
    } = &cli.command
    {
        builder = builder.render_scale(*s);
    }
    let config = builder.build().context("Invalid configuration")?;

    let history = Arc::new(HistoryLog::with_capacity(config.history_capacity));
    let delivery: Arc<dyn ResultSink> = Arc::new(DirectoryDelivery::new(&cli.output));
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let tool = Tool {
        history: Arc::clone(&history),
        delivery: Arc::clone(&delivery),
        progress,
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let summary = match &cli.command {
        Command::Image(args) => run_images(&tool, &config, args).await?,
        Command::Media(args) => run_media(&tool, &config, args).await?,
        Command::Pdf { action } => run_pdf(&tool, &config, action, delivery.as_ref()).await?,
    };

    if cli.history {
        println!("{}", history.to_json().context("Failed to serialise history")?);
    }

    if summary.failed > 0 {
        bail!("{} of {} file(s) failed", summary.failed, summary.attempted);
    }
    Ok(())
}

/// Collaborators shared by every tool.
struct Tool {
    history: Arc<HistoryLog>,
    delivery: Arc<dyn ResultSink>,
    progress: Option<ProgressCallback>,
}

impl Tool {
    fn orchestrator<S: Clone + Send>(&self) -> Orchestrator<S> {
        let orch =
            Orchestrator::new(self.history.clone()).with_delivery(Arc::clone(&self.delivery));
        match &self.progress {
            Some(p) => orch.with_progress(Arc::clone(p)),
            None => orch,
        }
    }

    /// Run `converter` over `inputs`; skipped inputs count as failures.
    async fn run<S, C>(&self, inputs: Inputs<(SourceFile, S)>, converter: &C) -> RunSummary
    where
        S: Clone + Send,
        C: ItemConverter<S>,
    {
        let orch = self.orchestrator();
        orch.add_many(inputs.items);
        let mut summary = orch.run(converter).await;
        summary.attempted += inputs.skipped;
        summary.failed += inputs.skipped;
        summary
    }
}

/// Inputs that survived loading, plus how many were reported and dropped.
struct Inputs<T> {
    items: Vec<T>,
    skipped: usize,
}

impl<T> Inputs<T> {
    fn map<U>(self, f: impl FnMut(T) -> U) -> Inputs<U> {
        Inputs {
            items: self.items.into_iter().map(f).collect(),
            skipped: self.skipped,
        }
    }
}

/// Read every input; unreadable files are reported and skipped.
async fn read_inputs(paths: &[PathBuf]) -> Inputs<SourceFile> {
    let mut items = Vec::with_capacity(paths.len());
    let mut skipped = 0;
    for path in paths {
        match SourceFile::from_path(path).await {
            Ok(f) => items.push(f),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                eprintln!("{} {}", red("✗"), e);
                skipped += 1;
            }
        }
    }
    Inputs { items, skipped }
}

fn parse_crop(s: &str) -> Result<CropRect> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid --crop '{s}'"))?;
    match parts.as_slice() {
        [x, y, w, h] => Ok(CropRect::new(*x, *y, *w, *h)),
        _ => bail!("--crop expects x,y,width,height"),
    }
}

async fn run_images(tool: &Tool, config: &ConverterConfig, args: &ImageArgs) -> Result<RunSummary> {
    let resize = match (args.width, args.percent) {
        (Some(w), _) => ResizeMode::ByWidth(w),
        (None, Some(p)) => ResizeMode::ByPercent(p),
        (None, None) => ResizeMode::None,
    };
    let spec = ImageSpec {
        geometry: GeometricTransformSpec {
            crop: args.crop.as_deref().map(parse_crop).transpose()?,
            rotation: Rotation::from_degrees(args.rotate)?,
            flip_horizontal: args.flip_h,
            flip_vertical: args.flip_v,
            resize,
        },
        ..config.default_image_spec()
    };
    spec.validate()?;

    let mut engine = RasterEngine::new();
    if let Some(cmd) = &args.normalize_with {
        let mut words = cmd.split_whitespace();
        let program = words.next().context("--normalize-with is empty")?;
        engine = engine.with_normalizer(Arc::new(
            ExternalToolNormalizer::new(program, words.map(String::from)).for_types([
                "image/heic",
                "image/heif",
                "image/x-adobe-dng",
                "image/x-canon-cr2",
                "image/x-nikon-nef",
                "image/x-sony-arw",
            ]),
        ));
    }

    let inputs = read_inputs(&args.inputs).await.map(|f| (f, spec));
    Ok(tool.run(inputs, &ImageConverter::new(engine)).await)
}

async fn run_media(tool: &Tool, config: &ConverterConfig, args: &MediaArgs) -> Result<RunSummary> {
    let target = MediaTarget::parse(&args.to)?;
    let mut spec = MediaSpec::for_target(target);
    spec.trim = TrimRange {
        start_secs: args.start,
        duration_secs: args.duration.or(spec.trim.duration_secs),
    };
    spec.gif.fps = args.fps;
    spec.gif.width = args.gif_width;
    spec.validate()?;

    let engine = Arc::new(TranscodeEngine::new(FfmpegLoader::new(config.ffmpeg_path.clone())));
    let inputs = read_inputs(&args.inputs).await.map(|f| (f, spec));
    Ok(tool.run(inputs, &MediaConverter::new(engine)).await)
}

/// Page sets for each input; unparseable documents are reported and skipped.
fn page_sets(
    engine: &DocumentEngine,
    files: Inputs<SourceFile>,
    args: &PdfArgs,
) -> Result<Inputs<(SourceFile, PageSet)>> {
    let rotation = Rotation::from_degrees(args.rotate)?;
    let ranges = match args.pages.trim() {
        "" | "all" => None,
        ranges => Some(ranges),
    };

    let mut items = Vec::with_capacity(files.items.len());
    let mut skipped = files.skipped;
    for file in files.items {
        let count = match engine.load_metadata(file.bytes()) {
            Ok(meta) => meta.page_count,
            Err(e) => {
                warn!("Skipping {}: {}", file.name(), e);
                eprintln!("{} {}: {}", red("✗"), file.name(), e);
                skipped += 1;
                continue;
            }
        };
        let pages = match ranges {
            None => PageSet::all(count),
            Some(r) => PageSet::with_pages(count, parse_ranges(r, count)?)?,
        };
        items.push((file, pages.with_rotation(rotation)));
    }
    Ok(Inputs { items, skipped })
}

async fn run_pdf(
    tool: &Tool,
    config: &ConverterConfig,
    action: &PdfCommand,
    delivery: &dyn ResultSink,
) -> Result<RunSummary> {
    let engine = DocumentEngine::new(config.pdfium_path.clone());
    let (args, doc_action) = match action {
        PdfCommand::Merge(a) => (a, None),
        PdfCommand::Extract(a) => (a, Some(DocumentAction::ExtractPages)),
        PdfCommand::Compress(a) => (a, Some(DocumentAction::Compress)),
        PdfCommand::ToImage { common, .. } => (
            common,
            Some(DocumentAction::ExportImages {
                scale: config.render_scale,
            }),
        ),
    };
    let inputs = page_sets(&engine, read_inputs(&args.inputs).await, args)?;

    match doc_action {
        Some(a) => Ok(tool.run(inputs, &DocumentConverter::new(engine, a)).await),
        None => {
            let orch = tool.orchestrator::<PageSet>();
            let count = inputs.items.len();
            orch.add_many(inputs.items);
            let merged = merge_items(&orch, &engine, tool.history.as_ref())
                .await
                .context("Merge failed")?;
            delivery.deliver(&merged.bytes, &merged.suggested_name);
            eprintln!(
                "{} {} file(s) merged into {}",
                green("✔"),
                bold(&count.to_string()),
                merged.suggested_name
            );
            Ok(RunSummary {
                attempted: count + inputs.skipped,
                succeeded: count,
                failed: inputs.skipped,
                ..RunSummary::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_tool(out: &std::path::Path) -> Tool {
        Tool {
            history: Arc::new(HistoryLog::default()),
            delivery: Arc::new(DirectoryDelivery::new(out)),
            progress: None,
        }
    }

    #[tokio::test]
    async fn unreadable_inputs_count_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("note.bin");
        std::fs::write(&good, b"not an image").unwrap();
        let paths = vec![dir.path().join("missing.png"), good, dir.path().to_path_buf()];

        let inputs = read_inputs(&paths).await;
        assert_eq!(inputs.items.len(), 1);
        assert_eq!(inputs.skipped, 2);

        let tool = quiet_tool(&dir.path().join("out"));
        let summary = tool
            .run(inputs.map(|f| (f, ImageSpec::default())), &ImageConverter::default())
            .await;
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.succeeded, 0);
    }

    fn three_page_pdf() -> Vec<u8> {
        use lopdf::{Dictionary, Document, Object};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids = (0..3)
            .map(|_| {
                let mut page = Dictionary::new();
                page.set("Type", Object::Name(b"Page".to_vec()));
                page.set("Parent", Object::Reference(pages_id));
                Object::Reference(doc.add_object(page))
            })
            .collect::<Vec<_>>();
        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(3));
        pages.set("Kids", Object::Array(kids));
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn page_sets_clamp_ranges_and_skip_unparseable_documents() {
        let args = PdfArgs {
            inputs: Vec::new(),
            pages: "2-4000000000".into(),
            rotate: 90,
        };
        let files = Inputs {
            items: vec![
                SourceFile::from_bytes("junk.pdf", b"%PDF-1.4 junk".to_vec()),
                SourceFile::from_bytes("deck.pdf", three_page_pdf()),
            ],
            skipped: 1,
        };
        let sets = page_sets(&DocumentEngine::default(), files, &args).unwrap();
        assert_eq!(sets.skipped, 2);
        assert_eq!(sets.items.len(), 1);

        let (file, pages) = &sets.items[0];
        assert_eq!(file.name(), "deck.pdf");
        assert_eq!(pages.ascending(), vec![1, 2]);
        assert_eq!(pages.rotation(), Rotation::Deg90);
    }
}
