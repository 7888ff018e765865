//! Push/pull streaming transform contract and the pipeline that chains stages

use sealback_core::{SealbackError, SealbackResult};

/// Whether a stage still has trailing output to hand out after end-of-input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Call `finish` again for the next piece.
    More,
    /// Fully drained.
    Done,
}

/// One resumable transform in an archive pipeline.
///
/// `feed` is called once per input chunk, then `finish` repeatedly until it
/// returns [`Flush::Done`]. Each call appends whatever it emits to `out`.
pub trait Stage: Send {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> SealbackResult<()>;

    fn finish(&mut self, out: &mut Vec<u8>) -> SealbackResult<Flush>;

    fn name(&self) -> &'static str;
}

/// Ordered chain of stages. Bytes only ever move from stage `i` to `i + 1`.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    /// Index of the stage being drained, once finishing has started.
    finishing: Option<usize>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn push_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run one input chunk through every stage and return what falls out.
    pub fn push(&mut self, chunk: &[u8]) -> SealbackResult<Vec<u8>> {
        if self.finishing.is_some() {
            return Err(SealbackError::stage("pipeline", "input after end-of-stream"));
        }
        self.run_from(0, chunk)
    }

    /// Pull the next piece of trailing output, or `None` once every stage is
    /// drained.
    ///
    /// Stages are finished in order; the tail of stage `i` is fed through
    /// stages `i + 1..` before stage `i + 1` itself is finished. Each call
    /// does a bounded amount of work, so the caller decides when to resume.
    pub fn finish_next(&mut self) -> SealbackResult<Option<Vec<u8>>> {
        let mut current = *self.finishing.get_or_insert(0);

        while current < self.stages.len() {
            let mut tail = Vec::new();
            let flush = self.stages[current].finish(&mut tail)?;
            let downstream = current + 1;
            if flush == Flush::Done {
                current = downstream;
                self.finishing = Some(current);
            }

            let piece = self.run_from(downstream, &tail)?;
            if !piece.is_empty() {
                return Ok(Some(piece));
            }
        }

        Ok(None)
    }

    /// Drain every remaining piece into one buffer.
    pub fn finish_all(&mut self) -> SealbackResult<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(piece) = self.finish_next()? {
            out.extend_from_slice(&piece);
        }
        Ok(out)
    }

    fn run_from(&mut self, start: usize, chunk: &[u8]) -> SealbackResult<Vec<u8>> {
        let mut data = chunk.to_vec();
        for stage in self.stages.iter_mut().skip(start) {
            if data.is_empty() {
                break;
            }
            let mut out = Vec::with_capacity(data.len());
            stage.feed(&data, &mut out)?;
            data = out;
        }
        Ok(data)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("finishing", &self.finishing)
            .finish()
    }
}
