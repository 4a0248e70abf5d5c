//! Transform specifications: immutable descriptions of what to do to a source.
//!
//! Each tool has its own spec shape: [`ImageSpec`] for raster images,
//! [`MediaSpec`] for audio/video and [`PageSet`] for documents. All of them
//! are plain data with a `validate` step that runs before any engine call.
//! The orchestrator clones the spec into the item when conversion starts, so
//! later edits never touch an in-flight or completed item.

pub mod geometry;
pub mod media;
pub mod pages;

pub use geometry::{
    CropRect, GeometricTransformSpec, ImageSpec, OutputEncoding, ResizeMode, ResolvedGeometry,
    MAX_OUTPUT_PIXELS, MIN_QUALITY,
};
pub use media::{GifOptions, MediaSpec, MediaTarget, TrimRange};
pub use pages::PageSet;

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};

/// A clockwise quarter-turn rotation.
///
/// Always normalised: constructing from any multiple of 90 (negative or
/// beyond 360) folds it into `{0, 90, 180, 270}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalise an arbitrary multiple of 90 degrees.
    pub fn from_degrees(degrees: i64) -> Result<Self, ConvertError> {
        if degrees % 90 != 0 {
            return Err(ConvertError::invalid_spec(format!(
                "rotation must be a multiple of 90 degrees, got {degrees}"
            )));
        }
        Ok(match degrees.rem_euclid(360) {
            0 => Rotation::Deg0,
            90 => Rotation::Deg90,
            180 => Rotation::Deg180,
            _ => Rotation::Deg270,
        })
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Compose two rotations (mod 360).
    pub fn add(self, other: Rotation) -> Rotation {
        match (self.degrees() + other.degrees()) % 360 {
            0 => Rotation::Deg0,
            90 => Rotation::Deg90,
            180 => Rotation::Deg180,
            _ => Rotation::Deg270,
        }
    }

    pub fn clockwise(self) -> Rotation {
        self.add(Rotation::Deg90)
    }

    pub fn counter_clockwise(self) -> Rotation {
        self.add(Rotation::Deg270)
    }

    /// True for 90 and 270, where the bounding box is transposed.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_normalises() {
        assert_eq!(Rotation::from_degrees(450).unwrap(), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(360).unwrap(), Rotation::Deg0);
        assert!(Rotation::from_degrees(45).is_err());
    }

    #[test]
    fn rotation_composes_mod_360() {
        assert_eq!(Rotation::Deg90.add(Rotation::Deg90), Rotation::Deg180);
        assert_eq!(Rotation::Deg270.add(Rotation::Deg180), Rotation::Deg90);
        assert_eq!(Rotation::Deg0.counter_clockwise(), Rotation::Deg270);

        let mut r = Rotation::Deg0;
        for _ in 0..4 {
            r = r.clockwise();
        }
        assert_eq!(r, Rotation::Deg0);
    }
}
