use serde::{Deserialize, Serialize};

/// Compressor applied to the serialized record stream before padding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// gzip member (archive default)
    #[default]
    Gzip,
    /// single zstd frame
    Zstd,
}

impl CompressionKind {
    /// Level used when the config leaves `compression_level` unset.
    pub fn default_level(self) -> i32 {
        match self {
            CompressionKind::Gzip => 6,
            CompressionKind::Zstd => 3,
        }
    }

    /// Inclusive range of accepted levels.
    pub fn level_range(self) -> (i32, i32) {
        match self {
            CompressionKind::Gzip => (0, 9),
            CompressionKind::Zstd => (1, 22),
        }
    }
}

/// Why an archive is being validated. Passed through to the structural comparator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPurpose {
    /// Freshly exported archive checked against its source
    #[default]
    Export,
    /// Test-harness comparison; headers must match exactly
    Internal,
}

impl std::fmt::Display for ValidationPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationPurpose::Export => f.write_str("export"),
            ValidationPurpose::Internal => f.write_str("internal"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
