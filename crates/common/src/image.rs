//! Image formats, scale factors and the request/result pair exchanged
//! with the transformation provider

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Accepted image encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    /// Parse a MIME type such as `image/jpeg`
    pub fn from_mime(mime: &str) -> Result<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or(mime)
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Ok(ImageFormat::Jpeg),
            "image/png" => Ok(ImageFormat::Png),
            "image/webp" => Ok(ImageFormat::Webp),
            _ => Err(Error::UnsupportedFormat(mime.to_string())),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Resolution multiplier applied in both axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ScaleFactor {
    #[default]
    X2,
    X3,
    X4,
}

impl ScaleFactor {
    pub fn factor(&self) -> u8 {
        match self {
            ScaleFactor::X2 => 2,
            ScaleFactor::X3 => 3,
            ScaleFactor::X4 => 4,
        }
    }
}

impl TryFrom<u8> for ScaleFactor {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            2 => Ok(ScaleFactor::X2),
            3 => Ok(ScaleFactor::X3),
            4 => Ok(ScaleFactor::X4),
            other => Err(Error::InvalidScale(other.to_string())),
        }
    }
}

impl From<ScaleFactor> for u8 {
    fn from(scale: ScaleFactor) -> Self {
        scale.factor()
    }
}

impl FromStr for ScaleFactor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(ScaleFactor::default());
        }
        let value: u8 = trimmed
            .parse()
            .map_err(|_| Error::InvalidScale(trimmed.to_string()))?;
        ScaleFactor::try_from(value)
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.factor())
    }
}

/// A validated enhancement request; never persisted
#[derive(Debug, Clone)]
pub struct EnhancementRequest {
    /// Raw encoded image
    pub image: Vec<u8>,
    /// Encoding of `image`
    pub format: ImageFormat,
    /// Requested multiplier
    pub scale: ScaleFactor,
    /// Name of the uploaded file, if the client sent one
    pub file_name: Option<String>,
}

impl EnhancementRequest {
    pub fn size(&self) -> usize {
        self.image.len()
    }
}

/// Outcome of a successful transformation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancementResult {
    /// Where the provider serves the enhanced image
    pub result_url: String,
    pub result_width: u32,
    pub result_height: u32,
    /// File name the provider recorded for the source
    pub source_file_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_mime() {
        assert_eq!(ImageFormat::from_mime("image/jpeg").unwrap(), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_mime("IMAGE/PNG").unwrap(), ImageFormat::Png);
        assert_eq!(
            ImageFormat::from_mime("image/webp; charset=binary").unwrap(),
            ImageFormat::Webp
        );
        assert!(matches!(
            ImageFormat::from_mime("image/gif"),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_scale_parsing() {
        assert_eq!("3".parse::<ScaleFactor>().unwrap(), ScaleFactor::X3);
        assert_eq!("".parse::<ScaleFactor>().unwrap(), ScaleFactor::X2);
        assert!("5".parse::<ScaleFactor>().is_err());
        assert!("two".parse::<ScaleFactor>().is_err());
        assert_eq!(ScaleFactor::X4.to_string(), "4x");
    }
}
