//! sealback-archive: export and import orchestration
//!
//! - [`ArchiveBuilder`]: records → sealed container, to any async sink
//! - [`ArchiveReader`]: container → authenticated records (two passes)
//! - [`FileSource`] / [`MemorySource`]: byte sources for comparison
//! - [`validate_pair`] / [`validate_export`]: post-export checks

pub mod builder;
pub mod comparator;
pub mod reader;
pub mod source;
pub mod validator;

pub use builder::{ArchiveBuilder, ExportSummary};
pub use comparator::{ArchiveComparator, Comparison, StructuralComparator};
pub use reader::{ArchiveReader, ImportedArchive};
pub use source::{ByteSource, FileSource, MemorySource};
pub use validator::{validate_export, validate_pair};

pub use sealback_codec::ArchiveHeader;

use sealback_core::{SealbackError, SealbackResult};
use sealback_crypto::{CipherSuite, KeyMaterial};

/// Progress callback type (bytes_done, bytes_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

pub(crate) fn check_key_lengths(suite: &dyn CipherSuite, keys: &KeyMaterial) -> SealbackResult<()> {
    if keys.cipher_key().len() != suite.key_len() {
        return Err(SealbackError::KeyLength {
            what: "cipher key",
            expected: suite.key_len(),
            actual: keys.cipher_key().len(),
        });
    }
    if keys.mac_key().len() != suite.mac_key_len() {
        return Err(SealbackError::KeyLength {
            what: "mac key",
            expected: suite.mac_key_len(),
            actual: keys.mac_key().len(),
        });
    }
    Ok(())
}
