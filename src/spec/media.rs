//! Trim/format spec for the audio/video tool.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};

/// Output container produced by the transcoding engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MediaTarget {
    /// Animated GIF from a video.
    #[default]
    Gif,
    /// MP3 audio (extracted from video or re-encoded from audio).
    Mp3,
    /// WAV audio.
    Wav,
}

impl MediaTarget {
    pub fn extension(self) -> &'static str {
        match self {
            MediaTarget::Gif => "gif",
            MediaTarget::Mp3 => "mp3",
            MediaTarget::Wav => "wav",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            MediaTarget::Gif => "image/gif",
            MediaTarget::Mp3 => "audio/mpeg",
            MediaTarget::Wav => "audio/wav",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConvertError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gif" => Ok(MediaTarget::Gif),
            "mp3" => Ok(MediaTarget::Mp3),
            "wav" => Ok(MediaTarget::Wav),
            other => Err(ConvertError::EncodeUnsupported {
                encoding: other.to_string(),
            }),
        }
    }
}

/// Portion of the input to convert, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrimRange {
    pub start_secs: f64,
    /// `None` runs to the end of the input.
    pub duration_secs: Option<f64>,
}

/// GIF rendering options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GifOptions {
    pub fps: u32,
    /// Output width; height follows the aspect ratio.
    pub width: u32,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self { fps: 10, width: 480 }
    }
}

/// Full per-item spec for the media tool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaSpec {
    pub target: MediaTarget,
    pub trim: TrimRange,
    pub gif: GifOptions,
}

impl Default for MediaSpec {
    /// Five-second, 10 fps, 480 px GIF.
    fn default() -> Self {
        Self::for_target(MediaTarget::Gif)
    }
}

impl MediaSpec {
    /// Defaults for a target; GIFs are capped at five seconds.
    pub fn for_target(target: MediaTarget) -> Self {
        let duration_secs = match target {
            MediaTarget::Gif => Some(5.0),
            MediaTarget::Mp3 | MediaTarget::Wav => None,
        };
        Self {
            target,
            trim: TrimRange {
                start_secs: 0.0,
                duration_secs,
            },
            gif: GifOptions::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConvertError> {
        if !self.trim.start_secs.is_finite() || self.trim.start_secs < 0.0 {
            return Err(ConvertError::invalid_spec(format!(
                "trim start must be >= 0, got {}",
                self.trim.start_secs
            )));
        }
        if let Some(d) = self.trim.duration_secs {
            if !d.is_finite() || d <= 0.0 {
                return Err(ConvertError::invalid_spec(format!(
                    "trim duration must be > 0, got {d}"
                )));
            }
        }
        if self.target == MediaTarget::Gif {
            if self.gif.fps == 0 || self.gif.fps > 60 {
                return Err(ConvertError::invalid_spec(format!(
                    "gif fps must be 1–60, got {}",
                    self.gif.fps
                )));
            }
            if self.gif.width == 0 {
                return Err(ConvertError::invalid_spec("gif width must be > 0"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gif_defaults_match_tool_defaults() {
        let s = MediaSpec::default();
        assert_eq!(s.target, MediaTarget::Gif);
        assert_eq!(s.trim.duration_secs, Some(5.0));
        assert_eq!(s.gif, GifOptions { fps: 10, width: 480 });
        assert!(s.validate().is_ok());
    }

    #[test]
    fn audio_targets_run_to_end() {
        assert_eq!(MediaSpec::for_target(MediaTarget::Mp3).trim.duration_secs, None);
    }

    #[test]
    fn rejects_bad_trim() {
        let mut s = MediaSpec::for_target(MediaTarget::Wav);
        s.trim.start_secs = -1.0;
        assert!(matches!(s.validate(), Err(ConvertError::InvalidSpec(_))));

        let mut s = MediaSpec::for_target(MediaTarget::Wav);
        s.trim.duration_secs = Some(0.0);
        assert!(matches!(s.validate(), Err(ConvertError::InvalidSpec(_))));
    }

    #[test]
    fn target_parse() {
        assert_eq!(MediaTarget::parse("MP3").unwrap(), MediaTarget::Mp3);
        assert!(MediaTarget::parse("flac").is_err());
    }
}
