use std::num::NonZeroU64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FstHeader {
    pub(crate) magic_bytes: [u8; 4],
    pub(crate) version: u8,
    pub(crate) alignment: u32,
    pub(crate) directory_crc: u32,
    pub(crate) directory: Option<NonZeroU64>,
    pub(crate) epoch: u64,
}

// Make some attempt to not accidentally load plain text files,
// and also make it break almost immediately in any UTF-8 compliant text parser.
pub(crate) const MAGIC_BYTES: &[u8; 4] = b"\xffFST";

pub(crate) const VERSION: u8 = 1;

/// Size of the fixed header at the start of every store.
pub(crate) const HEADER_SIZE: u64 = 32;

impl FstHeader {
    pub(crate) fn new(alignment: u32) -> FstHeader {
        FstHeader {
            magic_bytes: *MAGIC_BYTES,
            version: VERSION,
            alignment,
            directory_crc: 0,
            directory: None,
            epoch: 0,
        }
    }
}
