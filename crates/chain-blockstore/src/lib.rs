//! Chunked block log plus CRC-linked verify chain (spec.md §4.3, §6, §8).

pub mod crc24q;
pub mod log;
pub mod verify;

pub use crate::crc24q::crc24q;
pub use crate::log::{ChunkedLog, MAGIC, MAX_FILE_SIZE};
pub use crate::verify::{VerifyChain, VerifyRecord};
