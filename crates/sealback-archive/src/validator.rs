//! Post-export validation
//!
//! Both entry points hold file sources for the duration of the check and
//! close every source they opened on every exit path.

use std::path::Path;

use tracing::{debug, info, warn};

use sealback_core::{SealbackError, SealbackResult, ValidationConfig, ValidationPurpose};

use crate::builder::ExportSummary;
use crate::comparator::{Comparison, StructuralComparator};
use crate::reader::ArchiveReader;
use crate::source::{ByteSource, FileSource};

/// Compare the archive at `candidate` against the one at `reference`.
///
/// Both sources are closed (jointly, so one failing close does not skip the
/// other) before any error is reported. Comparator errors win over close
/// errors, and a mismatch becomes [`SealbackError::Comparison`].
pub async fn validate_pair<C: StructuralComparator>(
    comparator: &C,
    candidate: &Path,
    reference: &Path,
    purpose: ValidationPurpose,
) -> SealbackResult<()> {
    let comparison = compare_and_close(
        comparator,
        purpose,
        FileSource::new(candidate),
        FileSource::new(reference),
    )
    .await?;

    match comparison {
        Comparison::Match => {
            info!(
                %purpose,
                candidate = %candidate.display(),
                reference = %reference.display(),
                "archives match"
            );
            Ok(())
        }
        Comparison::Mismatch(diagnostic) => {
            warn!(%purpose, %diagnostic, "archives differ");
            Err(SealbackError::Comparison {
                purpose: purpose.to_string(),
                diagnostic,
            })
        }
    }
}

/// Run the comparison, then close both sources whatever happened.
async fn compare_and_close<C, S>(
    comparator: &C,
    purpose: ValidationPurpose,
    candidate: S,
    reference: S,
) -> SealbackResult<Comparison>
where
    C: StructuralComparator,
    S: ByteSource,
{
    let outcome = comparator.compare(purpose, &candidate, &reference).await;
    let (closed_candidate, closed_reference) = tokio::join!(candidate.close(), reference.close());

    let comparison = outcome?;
    closed_candidate?;
    closed_reference?;
    Ok(comparison)
}

/// Re-read a freshly exported file: its size must match what the export
/// wrote, and it must import cleanly under the reader's keys.
pub async fn validate_export(
    reader: &ArchiveReader,
    path: &Path,
    summary: &ExportSummary,
    config: &ValidationConfig,
) -> SealbackResult<()> {
    if !config.enabled {
        debug!(path = %path.display(), "export validation disabled");
        return Ok(());
    }

    let source = FileSource::new(path);
    let size = source.size().await;
    source.close().await?;
    let size = size?;

    if size != summary.total_bytes {
        warn!(path = %path.display(), size, expected = summary.total_bytes, "export size mismatch");
        return Err(SealbackError::Comparison {
            purpose: config.purpose.to_string(),
            diagnostic: format!(
                "file holds {size} bytes, export wrote {}",
                summary.total_bytes
            ),
        });
    }

    let imported = reader.import_file(path, None).await?;
    if imported.records.len() as u64 != summary.frames {
        return Err(SealbackError::Comparison {
            purpose: config.purpose.to_string(),
            diagnostic: format!(
                "file decodes to {} records, export wrote {}",
                imported.records.len(),
                summary.frames
            ),
        });
    }

    info!(
        path = %path.display(),
        purpose = %config.purpose,
        bytes = size,
        records = imported.records.len(),
        "export validated"
    );
    Ok(())
}
