//! Common types for the driver surface

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stream identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// 11-bit depth map
    Depth,
    /// RGB color image
    Video,
}

impl StreamKind {
    /// Both streams, depth first
    pub const ALL: [StreamKind; 2] = [StreamKind::Depth, StreamKind::Video];

    /// Event name used by the emitter front-end
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Depth => "depth",
            StreamKind::Video => "video",
        }
    }

    /// Frame mode the device streams in
    pub fn mode(&self) -> FrameMode {
        match self {
            StreamKind::Depth => FrameMode::DEPTH_11BIT,
            StreamKind::Video => FrameMode::VIDEO_RGB,
        }
    }

    /// Stable array slot for per-stream state
    #[inline]
    pub fn slot(&self) -> usize {
        match self {
            StreamKind::Depth => 0,
            StreamKind::Video => 1,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "depth" => Ok(Self::Depth),
            "video" | "rgb" => Ok(Self::Video),
            _ => Err(format!("Unknown stream: {}", s)),
        }
    }
}

/// Resolution and sample size of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMode {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
}

impl FrameMode {
    /// Medium resolution 11-bit depth, one little-endian u16 per sample
    pub const DEPTH_11BIT: Self = Self {
        width: 640,
        height: 480,
        bytes_per_pixel: 2,
    };

    /// Medium resolution RGB, three bytes per pixel
    pub const VIDEO_RGB: Self = Self {
        width: 640,
        height: 480,
        bytes_per_pixel: 3,
    };

    /// Size of one frame in bytes
    pub const fn bytes(&self) -> usize {
        (self.width * self.height * self.bytes_per_pixel) as usize
    }
}

/// LED indicator state
///
/// Discriminants are the driver's wire codes (code 5 is unused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum LedOption {
    Off = 0,
    Green = 1,
    Red = 2,
    Yellow = 3,
    BlinkGreen = 4,
    BlinkRedYellow = 6,
}

impl LedOption {
    /// All options in code order
    pub const ALL: [LedOption; 6] = [
        LedOption::Off,
        LedOption::Green,
        LedOption::Red,
        LedOption::Yellow,
        LedOption::BlinkGreen,
        LedOption::BlinkRedYellow,
    ];

    /// Driver code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Look up an option by driver code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.code() == code)
    }

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            LedOption::Off => "off",
            LedOption::Green => "green",
            LedOption::Red => "red",
            LedOption::Yellow => "yellow",
            LedOption::BlinkGreen => "blink-green",
            LedOption::BlinkRedYellow => "blink-red-yellow",
        }
    }
}

impl fmt::Display for LedOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LedOption {
    type Err = String;

    /// Accepts "blink red yellow", "blink-red-yellow", "BLINK_RED_YELLOW" or a code
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .split(|c: char| c == ' ' || c == '_' || c == '-')
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        if let Some(option) = Self::ALL.into_iter().find(|o| o.name() == normalized) {
            return Ok(option);
        }

        normalized
            .parse::<u8>()
            .ok()
            .and_then(Self::from_code)
            .ok_or_else(|| format!("Unknown LED option: {}", s))
    }
}

/// Mechanical tilt range in degrees (inclusive)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltRange {
    pub min: f64,
    pub max: f64,
}

impl TiltRange {
    /// Motor range of the Kinect v1 base
    pub const KINECT: Self = Self {
        min: -27.0,
        max: 27.0,
    };

    pub fn contains(&self, degrees: f64) -> bool {
        degrees.is_finite() && degrees >= self.min && degrees <= self.max
    }
}

impl Default for TiltRange {
    fn default() -> Self {
        Self::KINECT
    }
}

/// Device identification information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Index the device was enumerated at
    pub index: usize,
    /// Product name
    pub name: String,
    /// Serial number if available
    pub serial: Option<String>,
    /// Accepted tilt angles
    pub tilt_range: TiltRange,
}
