use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ModelError;

/// Pixel dimensions of a downloaded image, written as `WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ImageSize {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once('x')
            .ok_or_else(|| ModelError::InvalidSize(s.to_string()))?;
        let width = w.parse().map_err(|_| ModelError::InvalidSize(s.to_string()))?;
        let height = h.parse().map_err(|_| ModelError::InvalidSize(s.to_string()))?;
        Ok(ImageSize { width, height })
    }
}

impl TryFrom<String> for ImageSize {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageSize> for String {
    fn from(size: ImageSize) -> Self {
        size.to_string()
    }
}

/// Requested resolution for full-size downloads from the retrieve endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadSize {
    /// 72 dpi (about 461x259).
    Small,
    /// 150 dpi (about 960x540).
    Medium,
    /// 300 dpi (about 1920x1080).
    #[default]
    Large,
}

impl DownloadSize {
    pub fn dpi(&self) -> u32 {
        match self {
            DownloadSize::Small => 72,
            DownloadSize::Medium => 150,
            DownloadSize::Large => 300,
        }
    }
}

impl FromStr for DownloadSize {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "small" => Ok(DownloadSize::Small),
            "medium" => Ok(DownloadSize::Medium),
            "large" => Ok(DownloadSize::Large),
            other => Err(ModelError::UnknownDownloadSize(other.to_string())),
        }
    }
}
