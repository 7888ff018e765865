//! Size-bucket padding: the oracle that picks a padded length, and the stage
//! that pads a stream up to it
//!
//! Padded lengths follow a geometric schedule so that the container size only
//! reveals which bucket the plaintext fell into:
//!
//! ```text
//! bucket_for(n) = max(541, floor(1.05 ^ ceil(log_1.05(n))))
//! 541, 568, 596, 626, 657, ... 65894832, 69189573, ...
//! ```

use sealback_core::{SealbackError, SealbackResult};

use crate::stage::{Flush, Stage};

/// Smallest padded size. Everything shorter is padded up to this.
pub const PADDING_FLOOR: u64 = 541;

/// Ratio between consecutive bucket exponents.
pub const GROWTH_RATE: f64 = 1.05;

/// Default size of each run of zeros emitted while padding.
pub const DEFAULT_PADDING_CHUNK: usize = 64 * 1024;

fn bucket_at(exponent: i32) -> u64 {
    GROWTH_RATE.powf(f64::from(exponent)).floor() as u64
}

fn exponent_for(size: u64) -> i32 {
    let mut exponent = ((size as f64).ln() / GROWTH_RATE.ln()).ceil() as i32;
    // Keep the answer on the schedule even when the float estimate lands one
    // step off near a boundary.
    while bucket_at(exponent) < size {
        exponent += 1;
    }
    while exponent > 0 && bucket_at(exponent - 1) >= size {
        exponent -= 1;
    }
    exponent
}

/// Smallest bucket that can hold `size` bytes.
pub fn bucket_for(size: u64) -> u64 {
    if size <= PADDING_FLOOR {
        return PADDING_FLOOR;
    }
    bucket_at(exponent_for(size)).max(PADDING_FLOOR)
}

/// The bucket sizes in increasing order, starting at [`PADDING_FLOOR`].
///
/// Ends once the next bucket would no longer fit in a `u64`.
#[derive(Debug, Clone)]
pub struct BucketSchedule {
    exponent: i32,
    last: u64,
}

impl BucketSchedule {
    pub fn new() -> Self {
        Self {
            exponent: exponent_for(PADDING_FLOOR),
            last: 0,
        }
    }
}

impl Default for BucketSchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for BucketSchedule {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let bucket = bucket_at(self.exponent).max(PADDING_FLOOR);
        // the float-to-int cast saturates, so a repeat means we ran off the end
        if bucket <= self.last || bucket == u64::MAX {
            return None;
        }
        self.exponent = self.exponent.checked_add(1)?;
        self.last = bucket;
        Some(bucket)
    }
}

/// Pass-through stage that appends zeros until the stream reaches its bucket.
///
/// Padding goes out in runs of at most `chunk_size` bytes, one run per
/// `finish` call, so a slow consumer can stop pulling between runs.
#[derive(Debug)]
pub struct PaddingStage {
    seen: u64,
    remaining: Option<u64>,
    chunk_size: usize,
}

impl PaddingStage {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            seen: 0,
            remaining: None,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Bytes passed through so far.
    pub fn bytes_seen(&self) -> u64 {
        self.seen
    }

    /// Zeros still owed, once end-of-input has been signalled.
    pub fn remaining_padding(&self) -> Option<u64> {
        self.remaining
    }
}

impl Default for PaddingStage {
    fn default() -> Self {
        Self::new(DEFAULT_PADDING_CHUNK)
    }
}

impl Stage for PaddingStage {
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> SealbackResult<()> {
        if self.remaining.is_some() {
            return Err(SealbackError::stage(
                self.name(),
                "input after end-of-stream",
            ));
        }
        self.seen += chunk.len() as u64;
        out.extend_from_slice(chunk);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> SealbackResult<Flush> {
        let remaining = *self
            .remaining
            .get_or_insert_with(|| bucket_for(self.seen) - self.seen);

        let run = remaining.min(self.chunk_size as u64);
        out.resize(out.len() + run as usize, 0);
        let left = remaining - run;
        self.remaining = Some(left);

        Ok(if left == 0 { Flush::Done } else { Flush::More })
    }

    fn name(&self) -> &'static str {
        "padding"
    }
}
