//! Aspect classification of a video frame.
//!
//! Width/height are reduced by their greatest common divisor and then
//! bucketed into an orientation category. The category doubles as the
//! namespace segment of the stored object key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum distance between the frame ratio and a reference ratio.
pub const RATIO_TOLERANCE: f64 = 0.02;

const LANDSCAPE_RATIO: f64 = 16.0 / 9.0;
const PORTRAIT_RATIO: f64 = 9.0 / 16.0;

/// Orientation bucket for a video. Every geometry resolves to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectClass {
    Landscape,
    Portrait,
    Other,
}

impl AspectClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectClass::Landscape => "landscape",
            AspectClass::Portrait => "portrait",
            AspectClass::Other => "other",
        }
    }
}

impl fmt::Display for AspectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Width/height of the first video stream, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

/// A width:height ratio reduced to lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Reduce a geometry by `gcd(width, height)`.
    ///
    /// Returns `None` when either side is zero, since no orientation can be
    /// derived from a degenerate frame.
    pub fn reduce(geometry: Geometry) -> Option<Self> {
        if geometry.width == 0 || geometry.height == 0 {
            return None;
        }
        let d = gcd(geometry.width, geometry.height);
        Some(Self {
            width: geometry.width / d,
            height: geometry.height / d,
        })
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Euclid's algorithm. `gcd(x, 0) == x`.
pub fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Bucket a reduced ratio into an orientation class.
pub fn classify_ratio(ratio: AspectRatio) -> AspectClass {
    let value = ratio.as_f64();
    if ratio.width > ratio.height && (value - LANDSCAPE_RATIO).abs() < RATIO_TOLERANCE {
        AspectClass::Landscape
    } else if ratio.height > ratio.width && (value - PORTRAIT_RATIO).abs() < RATIO_TOLERANCE {
        AspectClass::Portrait
    } else {
        AspectClass::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(width: u32, height: u32) -> AspectClass {
        classify_ratio(AspectRatio::reduce(Geometry { width, height }).unwrap())
    }

    #[test]
    fn gcd_with_zero_is_identity() {
        for a in [0, 1, 7, 1080, 1920, u32::MAX] {
            assert_eq!(gcd(a, 0), a);
        }
    }

    #[test]
    fn gcd_matches_known_values() {
        assert_eq!(gcd(1920, 1080), 120);
        assert_eq!(gcd(1080, 1920), 120);
        assert_eq!(gcd(17, 5), 1);
        assert_eq!(gcd(0, 9), 9);
    }

    #[test]
    fn reduce_to_lowest_terms() {
        let ratio = AspectRatio::reduce(Geometry {
            width: 1920,
            height: 1080,
        })
        .unwrap();
        assert_eq!(ratio, AspectRatio { width: 16, height: 9 });
        assert_eq!(ratio.to_string(), "16:9");
    }

    #[test]
    fn reduce_rejects_degenerate_frames() {
        assert!(AspectRatio::reduce(Geometry { width: 0, height: 1080 }).is_none());
        assert!(AspectRatio::reduce(Geometry { width: 1920, height: 0 }).is_none());
    }

    #[test]
    fn common_landscape_resolutions() {
        for (w, h) in [(1920, 1080), (1280, 720), (3840, 2160), (854, 480), (1366, 768)] {
            assert_eq!(classify(w, h), AspectClass::Landscape, "{}x{}", w, h);
        }
    }

    #[test]
    fn common_portrait_resolutions() {
        for (w, h) in [(1080, 1920), (720, 1280), (480, 854), (2160, 3840)] {
            assert_eq!(classify(w, h), AspectClass::Portrait, "{}x{}", w, h);
        }
    }

    #[test]
    fn everything_else_is_other() {
        for (w, h) in [(1000, 1000), (640, 480), (480, 640), (2560, 1080), (1920, 1200), (1, 1)] {
            assert_eq!(classify(w, h), AspectClass::Other, "{}x{}", w, h);
        }
    }

    #[test]
    fn class_renders_as_key_segment() {
        assert_eq!(AspectClass::Landscape.to_string(), "landscape");
        assert_eq!(AspectClass::Portrait.as_str(), "portrait");
        assert_eq!(
            serde_json::to_string(&AspectClass::Other).unwrap(),
            "\"other\""
        );
    }
}
