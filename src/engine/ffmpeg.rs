//! ffmpeg-backed execution core.
//!
//! The system `ffmpeg` binary is used rather than linking libav*, so no
//! native headers are needed at build time. The binary is located once, when
//! the engine loads:
//!
//! 1. the path given in [`crate::ConverterConfig::ffmpeg_path`]
//! 2. `FFMPEG_PATH`
//! 3. `ffmpeg` on `PATH`
//!
//! and verified by running `ffmpeg -version`.

use crate::engine::transcode::{CoreLoader, ExecutionCore};
use crate::error::ConvertError;
use crate::spec::{MediaSpec, MediaTarget};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

const ENGINE: &str = "ffmpeg";

/// Name of the output file the core writes for `target`.
pub fn output_name(target: MediaTarget) -> String {
    format!("output.{}", target.extension())
}

/// Build the argument list for converting `input_name` according to `spec`.
///
/// Seeking happens before `-i` so ffmpeg skips straight to the start point.
pub fn build_args(input_name: &str, spec: &MediaSpec) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y"]
        .into_iter()
        .map(String::from)
        .collect();

    if spec.trim.start_secs > 0.0 {
        args.push("-ss".into());
        args.push(format_secs(spec.trim.start_secs));
    }
    args.push("-i".into());
    args.push(input_name.into());
    if let Some(d) = spec.trim.duration_secs {
        args.push("-t".into());
        args.push(format_secs(d));
    }

    match spec.target {
        MediaTarget::Gif => {
            args.push("-vf".into());
            args.push(format!(
                "fps={},scale={}:-1:flags=lanczos",
                spec.gif.fps, spec.gif.width
            ));
            args.push("-f".into());
            args.push("gif".into());
        }
        MediaTarget::Mp3 => {
            args.extend(["-vn", "-acodec", "libmp3lame"].map(String::from));
        }
        MediaTarget::Wav => {
            args.push("-vn".into());
        }
    }

    args.push(output_name(spec.target));
    args
}

fn format_secs(secs: f64) -> String {
    let s = format!("{secs:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Locates and verifies the ffmpeg binary.
#[derive(Debug, Clone, Default)]
pub struct FfmpegLoader {
    explicit: Option<PathBuf>,
}

impl FfmpegLoader {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }

    fn candidate(&self) -> PathBuf {
        self.explicit
            .clone()
            .or_else(|| std::env::var_os("FFMPEG_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }
}

impl CoreLoader for FfmpegLoader {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn ExecutionCore>, ConvertError>> {
        async move {
            let binary = self.candidate();
            let status = Command::new(&binary)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|e| {
                    ConvertError::engine_unavailable(
                        ENGINE,
                        format!("cannot run '{}': {e}", binary.display()),
                    )
                })?;

            if !status.success() {
                return Err(ConvertError::engine_unavailable(
                    ENGINE,
                    format!("'{} -version' exited with {status}", binary.display()),
                ));
            }
            debug!("Using ffmpeg at {}", binary.display());
            Ok(Arc::new(FfmpegCore { binary }) as Arc<dyn ExecutionCore>)
        }
        .boxed()
    }
}

/// Runs ffmpeg with the working directory as its current directory.
#[derive(Debug, Clone)]
pub struct FfmpegCore {
    binary: PathBuf,
}

impl ExecutionCore for FfmpegCore {
    fn exec<'a>(
        &'a self,
        workdir: &'a Path,
        args: &'a [String],
    ) -> BoxFuture<'a, Result<(), ConvertError>> {
        async move {
            debug!("ffmpeg {}", args.join(" "));
            let output = Command::new(&self.binary)
                .args(args)
                .current_dir(workdir)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| ConvertError::Transcode(format!("failed to spawn ffmpeg: {e}")))?;

            if output.status.success() {
                return Ok(());
            }
            Err(exit_error(
                args,
                &output.status.to_string(),
                &String::from_utf8_lossy(&output.stderr),
            ))
        }
        .boxed()
    }
}

/// stderr lines ffmpeg prints when it cannot demux its input.
const UNREADABLE_INPUT: &[&str] = &[
    "Invalid data found when processing input",
    "moov atom not found",
    "could not find codec parameters",
];

/// Turn a failed ffmpeg run into an error, keeping the last stderr lines.
///
/// Input that ffmpeg cannot read is a [`ConvertError::Decode`] named after
/// the `-i` argument; any other failure is [`ConvertError::Transcode`].
fn exit_error(args: &[String], status: &str, stderr: &str) -> ConvertError {
    let mut tail: Vec<&str> = stderr.lines().rev().take(5).collect();
    tail.reverse();
    let detail = format!("ffmpeg exited with {status}: {}", tail.join(" | "));

    if UNREADABLE_INPUT.iter().any(|marker| stderr.contains(marker)) {
        let input = args
            .iter()
            .skip_while(|a| *a != "-i")
            .nth(1)
            .map_or("input", String::as_str);
        return ConvertError::Decode {
            name: input.to_string(),
            detail,
        };
    }
    ConvertError::Transcode(detail)
}

/// True when an ffmpeg binary answers `-version` on `PATH` or `FFMPEG_PATH`.
pub fn is_ffmpeg_available() -> bool {
    std::process::Command::new(FfmpegLoader::default().candidate())
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::spec::TrimRange;

    #[test]
    fn unreadable_input_is_decode_error() {
        let args = build_args("input.mp4", &MediaSpec::default());
        let stderr = "[mov,mp4,m4a,3gp,3g2,mj2 @ 0x55d] moov atom not found\n\
                      input.mp4: Invalid data found when processing input\n";
        let err = exit_error(&args, "exit status: 183", stderr);
        assert_eq!(err.kind(), ErrorKind::DecodeError);
        match err {
            ConvertError::Decode { name, detail } => {
                assert_eq!(name, "input.mp4");
                assert!(detail.contains("Invalid data found"), "{detail}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn other_ffmpeg_failures_stay_transcode_errors() {
        let args = build_args("input.wav", &MediaSpec::for_target(MediaTarget::Mp3));
        let stderr = "Unknown encoder 'libmp3lame'\n";
        let err = exit_error(&args, "exit status: 1", stderr);
        assert!(matches!(err, ConvertError::Transcode(_)), "got: {err}");
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn gif_args_match_defaults() {
        let args = build_args("input.mp4", &MediaSpec::default());
        assert_eq!(
            args,
            [
                "-hide_banner", "-loglevel", "error", "-y",
                "-i", "input.mp4", "-t", "5",
                "-vf", "fps=10,scale=480:-1:flags=lanczos",
                "-f", "gif", "output.gif",
            ]
        );
    }

    #[test]
    fn mp3_drops_video_and_seeks_first() {
        let mut spec = MediaSpec::for_target(MediaTarget::Mp3);
        spec.trim = TrimRange {
            start_secs: 1.5,
            duration_secs: Some(10.0),
        };
        let args = build_args("input.mov", &spec);
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i);
        assert_eq!(args[ss + 1], "1.5");
        assert!(args.windows(2).any(|w| w == ["-acodec", "libmp3lame"]));
        assert_eq!(args.last().unwrap(), "output.mp3");
    }

    #[test]
    fn wav_has_no_duration_by_default() {
        let args = build_args("input.ogg", &MediaSpec::for_target(MediaTarget::Wav));
        assert!(!args.contains(&"-t".to_string()));
        assert_eq!(args.last().unwrap(), "output.wav");
    }

    #[tokio::test]
    async fn missing_binary_is_engine_unavailable() {
        let loader = FfmpegLoader::new(Some("/nonexistent/ffmpeg".into()));
        match loader.load().await {
            Err(ConvertError::EngineUnavailable { engine, .. }) => assert_eq!(engine, "ffmpeg"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("loader should fail"),
        }
    }
}
