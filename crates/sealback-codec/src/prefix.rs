//! Emits a fixed prefix (the IV) ahead of the stream it wraps

use sealback_core::SealbackResult;

use crate::stage::{Flush, Stage};

#[derive(Debug)]
pub struct PrefixStage {
    prefix: Option<Vec<u8>>,
}

impl PrefixStage {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn emit_prefix(&mut self, out: &mut Vec<u8>) {
        if let Some(prefix) = self.prefix.take() {
            out.extend_from_slice(&prefix);
        }
    }
}

impl Stage for PrefixStage {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> SealbackResult<()> {
        self.emit_prefix(out);
        out.extend_from_slice(chunk);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> SealbackResult<Flush> {
        // empty input still gets its prefix
        self.emit_prefix(out);
        Ok(Flush::Done)
    }

    fn name(&self) -> &'static str {
        "prefix"
    }
}
