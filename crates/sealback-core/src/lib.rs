//! sealback-core: shared error taxonomy, configuration schema, and logging setup

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{ArchiveConfig, LogConfig, SealbackConfig, ValidationConfig};
pub use error::{ErrorKind, SealbackError, SealbackResult};
pub use logging::init_logging;
pub use types::{CompressionKind, LogFormat, ValidationPurpose};
