use std::path::PathBuf;

use thiserror::Error;

pub type SealbackResult<T> = Result<T, SealbackError>;

#[derive(Debug, Error)]
pub enum SealbackError {
    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    KeyLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("malformed archive: {0}")]
    Malformed(String),

    #[error("stream fault in {stage}: {reason}")]
    Stage {
        stage: &'static str,
        reason: String,
    },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("archives differ ({purpose}): {diagnostic}")]
    Comparison {
        purpose: String,
        diagnostic: String,
    },

    #[error("opening {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("closing {}: {source}", path.display())]
    Close {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used by callers that only care about the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any byte was processed.
    Construction,
    /// The byte stream does not follow the container framing.
    MalformedInput,
    /// Recomputed tag differs from the claimed one.
    Authentication,
    /// Structural comparison found a difference.
    Mismatch,
    /// File or other resource failure.
    Resource,
}

impl SealbackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SealbackError::KeyLength { .. } | SealbackError::Config(_) => ErrorKind::Construction,
            SealbackError::Malformed(_) | SealbackError::Stage { .. } => ErrorKind::MalformedInput,
            SealbackError::Authentication(_) => ErrorKind::Authentication,
            SealbackError::Comparison { .. } => ErrorKind::Mismatch,
            SealbackError::Open { .. }
            | SealbackError::Close { .. }
            | SealbackError::Io(_)
            | SealbackError::Other(_) => ErrorKind::Resource,
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        SealbackError::Malformed(reason.into())
    }

    pub fn stage(stage: &'static str, reason: impl Into<String>) -> Self {
        SealbackError::Stage {
            stage,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let key = SealbackError::KeyLength {
            what: "cipher key",
            expected: 32,
            actual: 16,
        };
        assert_eq!(key.kind(), ErrorKind::Construction);
        assert_eq!(SealbackError::malformed("short").kind(), ErrorKind::MalformedInput);
        assert_eq!(
            SealbackError::stage("padding", "write after finish").kind(),
            ErrorKind::MalformedInput
        );
        assert_eq!(
            SealbackError::Authentication("bad tag".into()).kind(),
            ErrorKind::Authentication
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(SealbackError::from(io).kind(), ErrorKind::Resource);
        let close = SealbackError::Close {
            path: PathBuf::from("/tmp/a.bin"),
            source: std::io::Error::other("disk gone"),
        };
        assert_eq!(close.kind(), ErrorKind::Resource);
        assert!(close.to_string().starts_with("closing /tmp/a.bin"));
    }

    #[test]
    fn key_length_message_names_sizes() {
        let err = SealbackError::KeyLength {
            what: "mac key",
            expected: 32,
            actual: 31,
        };
        let msg = err.to_string();
        assert!(msg.contains("mac key"));
        assert!(msg.contains("32"));
        assert!(msg.contains("31"));
    }
}
