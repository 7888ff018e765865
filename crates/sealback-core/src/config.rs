use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{SealbackError, SealbackResult};
use crate::types::{CompressionKind, LogFormat, ValidationPurpose};

/// Top-level configuration (loaded from sealback.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealbackConfig {
    pub archive: ArchiveConfig,
    pub validation: ValidationConfig,
    pub logging: LogConfig,
}

/// Archive codec tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Compressor for the record stream: "gzip" or "zstd"
    pub compression: CompressionKind,
    /// Compression level (default depends on compressor)
    pub compression_level: Option<i32>,
    /// Bytes per chunk when batching records on export and reading on import
    pub chunk_size: usize,
    /// Largest run of zero padding emitted in one piece
    pub padding_chunk_size: usize,
    /// Largest single record frame accepted on import
    pub max_frame_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Re-read and verify archives after exporting them to disk
    pub enabled: bool,
    /// "export" or "internal"
    pub purpose: ValidationPurpose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level or EnvFilter directive (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: LogFormat,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression: CompressionKind::Gzip,
            compression_level: None,
            chunk_size: 64 * 1024,
            padding_chunk_size: 64 * 1024,
            max_frame_len: 64 * 1024 * 1024,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            purpose: ValidationPurpose::Export,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

impl ArchiveConfig {
    /// Effective compression level after applying the compressor default.
    pub fn level(&self) -> i32 {
        self.compression_level
            .unwrap_or_else(|| self.compression.default_level())
    }

    /// Reject settings that would make the codec misbehave.
    pub fn validate(&self) -> SealbackResult<()> {
        if self.chunk_size == 0 {
            return Err(SealbackError::Config("archive.chunk_size must be > 0".into()));
        }
        if self.padding_chunk_size == 0 {
            return Err(SealbackError::Config(
                "archive.padding_chunk_size must be > 0".into(),
            ));
        }
        if self.max_frame_len == 0 {
            return Err(SealbackError::Config("archive.max_frame_len must be > 0".into()));
        }
        let (lo, hi) = self.compression.level_range();
        let level = self.level();
        if level < lo || level > hi {
            return Err(SealbackError::Config(format!(
                "archive.compression_level {level} outside {lo}..={hi} for {:?}",
                self.compression
            )));
        }
        Ok(())
    }
}

impl SealbackConfig {
    pub fn from_toml_str(content: &str) -> SealbackResult<Self> {
        let config: SealbackConfig =
            toml::from_str(content).map_err(|e| SealbackError::Config(e.to_string()))?;
        config.archive.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub async fn load(path: &Path) -> SealbackResult<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        Self::from_toml_str(&content)
            .map_err(|e| SealbackError::Config(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[archive]
compression = "zstd"
compression_level = 9
chunk_size = 16384
padding_chunk_size = 4096
max_frame_len = 1048576

[validation]
enabled = false
purpose = "internal"

[logging]
level = "debug"
format = "json"
"#;
        let config = SealbackConfig::from_toml_str(toml_str).unwrap();

        assert_eq!(config.archive.compression, CompressionKind::Zstd);
        assert_eq!(config.archive.level(), 9);
        assert_eq!(config.archive.chunk_size, 16384);
        assert_eq!(config.archive.padding_chunk_size, 4096);
        assert_eq!(config.archive.max_frame_len, 1048576);
        assert!(!config.validation.enabled);
        assert_eq!(config.validation.purpose, ValidationPurpose::Internal);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_defaults() {
        let config = SealbackConfig::from_toml_str("").unwrap();

        assert_eq!(config.archive.compression, CompressionKind::Gzip);
        assert_eq!(config.archive.level(), 6);
        assert_eq!(config.archive.chunk_size, 64 * 1024);
        assert_eq!(config.archive.padding_chunk_size, 64 * 1024);
        assert!(config.validation.enabled);
        assert_eq!(config.validation.purpose, ValidationPurpose::Export);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[archive]
compression = "zstd"
"#;
        let config = SealbackConfig::from_toml_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.archive.compression, CompressionKind::Zstd);
        // Defaults
        assert_eq!(config.archive.level(), 3);
        assert_eq!(config.archive.chunk_size, 64 * 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let err = SealbackConfig::from_toml_str("[archive]\nchunk_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn test_rejects_out_of_range_level() {
        let err = SealbackConfig::from_toml_str(
            "[archive]\ncompression = \"gzip\"\ncompression_level = 12\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("compression_level"));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = SealbackConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = SealbackConfig::from_toml_str(&toml_str).unwrap();

        assert_eq!(config.archive.compression, parsed.archive.compression);
        assert_eq!(config.archive.chunk_size, parsed.archive.chunk_size);
        assert_eq!(config.validation.purpose, parsed.validation.purpose);
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SealbackConfig::load(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config.archive.compression, CompressionKind::Gzip);
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sealback.toml");
        std::fs::write(&path, "[logging]\nlevel = \"trace\"\n").unwrap();

        let config = SealbackConfig::load(&path).await.unwrap();
        assert_eq!(config.logging.level, "trace");
    }
}
