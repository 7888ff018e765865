//! sealback-codec: the streaming stages an archive passes through
//!
//! Export:
//! ```text
//! frames → CompressStage → PaddingStage → CipherEncodeStage → PrefixStage(IV) → MacAppendStage
//! ```
//!
//! Import runs the mirror image: MacVerifyStage strips the trailing tag,
//! CipherDecodeStage reads the IV off the front and decrypts,
//! DecompressStage stops at the end of the compressed member, and the
//! FrameDecoder splits the records back out.

pub mod cipher;
pub mod compress;
pub mod frame;
pub mod mac;
pub mod padding;
pub mod prefix;
pub mod stage;

pub use cipher::{CipherDecodeStage, CipherEncodeStage};
pub use compress::{CompressStage, DecompressStage};
pub use frame::{encode_frame, ArchiveHeader, FrameDecoder, FORMAT_VERSION, MEDIA_ROOT_KEY_LEN};
pub use mac::{MacAppendStage, MacVerifyStage, TagCheck, TagObserver};
pub use padding::{bucket_for, BucketSchedule, PaddingStage, GROWTH_RATE, PADDING_FLOOR};
pub use prefix::PrefixStage;
pub use stage::{Flush, Pipeline, Stage};
