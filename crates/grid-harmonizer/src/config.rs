//! Settings for persisting composites.

use serde::{Deserialize, Serialize};

/// Chunking and compression of composite arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// Time steps per chunk.
    pub chunk_time: usize,

    /// Chunk edge along lat and lon.
    pub chunk_space: usize,

    /// Compression codec for Zarr arrays.
    pub compression: ZarrCompression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub shuffle: bool,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            chunk_time: 24,
            chunk_space: 256,
            compression: ZarrCompression::BloscZstd,
            compression_level: 1,
            shuffle: true,
        }
    }
}

impl CompositeConfig {
    /// Defaults overridden by `COMPOSITE_CHUNK_TIME`, `COMPOSITE_CHUNK_SPACE`,
    /// `COMPOSITE_COMPRESSION`, `COMPOSITE_COMPRESSION_LEVEL` and `COMPOSITE_SHUFFLE`.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok()?.trim().parse().ok()
        }

        let defaults = Self::default();
        Self {
            chunk_time: var("COMPOSITE_CHUNK_TIME").unwrap_or(defaults.chunk_time),
            chunk_space: var("COMPOSITE_CHUNK_SPACE").unwrap_or(defaults.chunk_space),
            compression: var::<String>("COMPOSITE_COMPRESSION")
                .map(|name| ZarrCompression::from_str(&name))
                .unwrap_or(defaults.compression),
            compression_level: var("COMPOSITE_COMPRESSION_LEVEL")
                .unwrap_or(defaults.compression_level),
            shuffle: var::<String>("COMPOSITE_SHUFFLE")
                .map(|flag| matches!(flag.to_lowercase().as_str(), "true" | "1"))
                .unwrap_or(defaults.shuffle),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_time == 0 {
            return Err("chunk_time must be > 0".to_string());
        }

        if self.chunk_space == 0 {
            return Err("chunk_space must be > 0".to_string());
        }

        if self.compression != ZarrCompression::None
            && (self.compression_level == 0 || self.compression_level > 9)
        {
            return Err("compression_level must be 1-9".to_string());
        }

        Ok(())
    }
}

/// Compression codec for Zarr arrays.
///
/// Every compressed variant goes through Blosc; `Zstd` and `Lz4` pick the
/// inner compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    None,
    Lz4,
    Zstd,
    BloscLz4,
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive); unknown names fall back to blosc_zstd.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "lz4" => Self::Lz4,
            "zstd" => Self::Zstd,
            "blosc_lz4" => Self::BloscLz4,
            _ => Self::BloscZstd,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
