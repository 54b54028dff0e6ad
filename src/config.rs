//! Decoder and stream configuration.

use serde::{Deserialize, Serialize};

use crate::stream::{StreamOptions, DEFAULT_CHUNK_SIZE};
use crate::{Architecture, DecodeError, Endian, Mode};

/// Everything needed to open a decoder and drive a stream over it.
///
/// Only `arch` is required; mode and byte order default per architecture.
///
/// ```
/// use nuclide_iter::{Architecture, DecoderConfig, Endian};
///
/// let config = DecoderConfig::from_json(r#"{ "arch": "ppc", "chunk_size": 64 }"#).unwrap();
/// assert_eq!(config.arch, Architecture::Ppc);
/// assert_eq!(config.endian(), Endian::Big);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub arch: Architecture,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endian: Option<Endian>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub skip_undecodable: bool,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl DecoderConfig {
    /// Defaults for `arch`.
    pub fn new(arch: Architecture) -> Self {
        Self {
            arch,
            mode: None,
            endian: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            skip_undecodable: false,
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DecodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, DecodeError> {
        serde_json::to_string_pretty(self).map_err(|e| DecodeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.arch == Architecture::Unknown {
            return Err(DecodeError::UnsupportedArchitecture(self.arch));
        }
        self.stream_options().validate()
    }

    /// Configured mode, or the architecture's default.
    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or_else(|| self.arch.default_mode())
    }

    /// Configured byte order, or the architecture's default.
    pub fn endian(&self) -> Endian {
        self.endian.unwrap_or_else(|| self.arch.default_endian())
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            chunk_size: self.chunk_size,
            skip_undecodable: self.skip_undecodable,
        }
    }
}
