//! Structural comparison of two archives pulled through byte sources

use std::future::Future;

use tracing::debug;

use sealback_core::{SealbackResult, ValidationPurpose};

use crate::reader::{ArchiveReader, ImportedArchive};
use crate::source::ByteSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Match,
    /// Human-readable description of the first difference found.
    Mismatch(String),
}

/// Parses two sources into a canonical form and checks them for equality.
pub trait StructuralComparator: Send + Sync {
    fn compare<S: ByteSource>(
        &self,
        purpose: ValidationPurpose,
        candidate: &S,
        reference: &S,
    ) -> impl Future<Output = SealbackResult<Comparison>> + Send;
}

/// Decodes both sides with one reader and compares header and records.
///
/// `Export` ignores the header timestamp, since two exports of the same data
/// are taken at different times. `Internal` compares the header exactly.
#[derive(Debug, Clone)]
pub struct ArchiveComparator {
    reader: ArchiveReader,
    read_size: usize,
}

impl ArchiveComparator {
    pub fn new(reader: ArchiveReader) -> Self {
        Self {
            reader,
            read_size: 64 * 1024,
        }
    }

    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size.max(1);
        self
    }
}

impl StructuralComparator for ArchiveComparator {
    async fn compare<S: ByteSource>(
        &self,
        purpose: ValidationPurpose,
        candidate: &S,
        reference: &S,
    ) -> SealbackResult<Comparison> {
        let (candidate, reference) = tokio::try_join!(
            pull_all(candidate, self.read_size),
            pull_all(reference, self.read_size)
        )?;
        debug!(
            %purpose,
            candidate_bytes = candidate.len(),
            reference_bytes = reference.len(),
            "comparing archives"
        );

        let candidate = self.reader.decode_bytes(&candidate)?;
        let reference = self.reader.decode_bytes(&reference)?;
        Ok(diff(purpose, &candidate, &reference))
    }
}

async fn pull_all<S: ByteSource>(source: &S, read_size: usize) -> SealbackResult<Vec<u8>> {
    let size = source.size().await?;
    let mut out = Vec::with_capacity(size as usize);
    loop {
        let piece = source.read(read_size).await?;
        if piece.is_empty() {
            break;
        }
        out.extend_from_slice(&piece);
    }
    Ok(out)
}

fn diff(purpose: ValidationPurpose, a: &ImportedArchive, b: &ImportedArchive) -> Comparison {
    if a.header.version != b.header.version {
        return Comparison::Mismatch(format!(
            "header version {} vs {}",
            a.header.version, b.header.version
        ));
    }
    if purpose == ValidationPurpose::Internal && a.header.created_at_ms != b.header.created_at_ms {
        return Comparison::Mismatch(format!(
            "header created_at_ms {} vs {}",
            a.header.created_at_ms, b.header.created_at_ms
        ));
    }
    if a.header.media_root_key != b.header.media_root_key {
        return Comparison::Mismatch("header media root keys differ".into());
    }
    if a.records.len() != b.records.len() {
        return Comparison::Mismatch(format!(
            "candidate has {} records, reference has {}",
            a.records.len(),
            b.records.len()
        ));
    }
    if let Some((index, (x, y))) = a
        .records
        .iter()
        .zip(&b.records)
        .enumerate()
        .find(|(_, (x, y))| x != y)
    {
        return Comparison::Mismatch(format!(
            "record {index} differs ({} bytes vs {} bytes)",
            x.len(),
            y.len()
        ));
    }
    Comparison::Match
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use sealback_codec::ArchiveHeader;

    fn archive(created: u64, records: &[&str]) -> ImportedArchive {
        ImportedArchive {
            header: ArchiveHeader::new(created, Vec::new()),
            records: records.iter().map(|r| Bytes::copy_from_slice(r.as_bytes())).collect(),
            total_bytes: 0,
        }
    }

    #[test]
    fn test_export_purpose_ignores_timestamp() {
        let a = archive(1, &["x"]);
        let b = archive(2, &["x"]);
        assert_eq!(diff(ValidationPurpose::Export, &a, &b), Comparison::Match);
        assert!(matches!(
            diff(ValidationPurpose::Internal, &a, &b),
            Comparison::Mismatch(d) if d.contains("created_at_ms")
        ));
    }

    #[test]
    fn test_reports_first_differing_record() {
        let a = archive(1, &["same", "left", "tail"]);
        let b = archive(1, &["same", "right", "tail"]);
        match diff(ValidationPurpose::Internal, &a, &b) {
            Comparison::Mismatch(d) => assert!(d.starts_with("record 1 differs"), "{d}"),
            Comparison::Match => panic!("expected mismatch"),
        }
    }

    #[test]
    fn test_record_count_mismatch() {
        let a = archive(1, &["a"]);
        let b = archive(1, &["a", "b"]);
        assert_eq!(
            diff(ValidationPurpose::Export, &a, &b),
            Comparison::Mismatch("candidate has 1 records, reference has 2".into())
        );
    }
}
