//! Training-corpus text encodings.
//!
//! The engine only ever consumes a resolved [`Encoding`]. Guessing one from
//! raw bytes is a capability behind [`EncodingDetector`]; the only detector
//! shipped here is a strict UTF-8 probe.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl Encoding {
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
        }
    }

    /// Decode one line. `None` if the bytes are invalid in this encoding.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            // Every byte is a valid ISO-8859-1 code point.
            Encoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" | "ascii" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" | "l1" => Ok(Encoding::Latin1),
            other => Err(CoreError::Configuration(format!(
                "unsupported encoding '{other}' (supported: utf-8, latin-1)"
            ))),
        }
    }
}

/// Result of probing a byte sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detected {
    Known(Encoding),
    Unknown,
}

pub trait EncodingDetector {
    fn detect_encoding(&self, sample: &[u8]) -> Detected;
}

/// Accepts a sample iff it is valid UTF-8. A multi-byte sequence cut off at
/// the end of the sample still counts as valid.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Probe;

impl EncodingDetector for Utf8Probe {
    fn detect_encoding(&self, sample: &[u8]) -> Detected {
        match std::str::from_utf8(sample) {
            Ok(_) => Detected::Known(Encoding::Utf8),
            Err(e) if e.error_len().is_none() => Detected::Known(Encoding::Utf8),
            Err(_) => Detected::Unknown,
        }
    }
}
