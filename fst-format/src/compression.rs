use std::collections::HashMap;
use std::fmt;
use std::io::{Error, ErrorKind, Read, Result};

pub mod constants {
    pub const COMPRESSION_STORED: u8 = 0x00;
    pub const COMPRESSION_ZSTD: u8 = 0x10;
    pub const COMPRESSION_XZ: u8 = 0x20;

    /// Payloads with fewer raw bytes than this are never compressed.
    pub const MIN_COMPRESSIBLE_SIZE: u64 = 96;

    pub const DEFAULT_XZ_LEVEL: u32 = 6;
}

use self::constants::*;

/// Byte compression applied to each level block of a payload.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum Compression {
    #[default]
    Stored,
    Zstd,
    Xz,
    /// An id written by a newer or foreign writer. Kept so it can be reported.
    Unknown(u8),
}

impl Compression {
    pub const fn id(self) -> u8 {
        match self {
            Compression::Stored => COMPRESSION_STORED,
            Compression::Zstd => COMPRESSION_ZSTD,
            Compression::Xz => COMPRESSION_XZ,
            Compression::Unknown(id) => id,
        }
    }

    pub fn from_id(id: u8) -> Compression {
        match id {
            COMPRESSION_STORED => Compression::Stored,
            COMPRESSION_ZSTD => Compression::Zstd,
            COMPRESSION_XZ => Compression::Xz,
            other => Compression::Unknown(other),
        }
    }

    /// Whether this build can both write and read the variant.
    pub fn is_available(self) -> bool {
        match self {
            Compression::Stored => true,
            Compression::Zstd => cfg!(feature = "zstd"),
            Compression::Xz => cfg!(feature = "xz"),
            Compression::Unknown(_) => false,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Stored => f.write_str("stored"),
            Compression::Zstd => f.write_str("zstd"),
            Compression::Xz => f.write_str("xz"),
            Compression::Unknown(id) => write!(f, "unknown({:#04x})", id),
        }
    }
}

impl fmt::Debug for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A compression choice plus string options. The only option read today is
/// `level`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompressionConfig {
    pub compression: Compression,
    pub options: HashMap<String, String>,
}

impl CompressionConfig {
    pub fn new(compression: Compression) -> Self {
        CompressionConfig {
            compression,
            options: HashMap::new(),
        }
    }

    pub fn with_level(compression: Compression, level: i32) -> Self {
        let mut config = CompressionConfig::new(compression);
        config.set_option("level", level.to_string());
        config
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.options.get(key)?.parse().ok()
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.options.get(key)?.parse().ok()
    }

    /// The config to use for a payload of `raw_size` bytes.
    pub fn for_size(&self, raw_size: u64) -> Self {
        if raw_size < MIN_COMPRESSIBLE_SIZE {
            CompressionConfig::new(Compression::Stored)
        } else {
            self.clone()
        }
    }
}

impl From<Compression> for CompressionConfig {
    fn from(compression: Compression) -> Self {
        CompressionConfig::new(compression)
    }
}

fn not_built(compression: Compression) -> Error {
    Error::new(
        ErrorKind::Unsupported,
        format!("{} support was not compiled in", compression),
    )
}

fn unknown(id: u8) -> Error {
    Error::new(
        ErrorKind::InvalidInput,
        format!("no codec for compression id {:#04x}", id),
    )
}

/// Compress one level block.
pub(crate) fn compress_block(block: &[u8], config: &CompressionConfig) -> Result<Vec<u8>> {
    match config.compression {
        Compression::Stored => Ok(block.to_vec()),
        Compression::Unknown(id) => Err(unknown(id)),
        #[cfg(feature = "zstd")]
        Compression::Zstd => {
            let level = config
                .get_i32("level")
                .unwrap_or(::zstd::DEFAULT_COMPRESSION_LEVEL);
            ::zstd::bulk::compress(block, level)
        }
        #[cfg(feature = "xz")]
        Compression::Xz => {
            let level = config.get_u32("level").unwrap_or(DEFAULT_XZ_LEVEL);
            let mut out = Vec::with_capacity(block.len() / 2);
            xz2::read::XzEncoder::new(block, level).read_to_end(&mut out)?;
            Ok(out)
        }
        #[allow(unreachable_patterns)]
        other => Err(not_built(other)),
    }
}

/// Undo [`compress_block`].
pub(crate) fn decompress_block(stored: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::Stored => Ok(stored.to_vec()),
        Compression::Unknown(id) => Err(unknown(id)),
        #[cfg(feature = "zstd")]
        Compression::Zstd => ::zstd::stream::decode_all(stored),
        #[cfg(feature = "xz")]
        Compression::Xz => {
            let mut out = Vec::new();
            xz2::read::XzDecoder::new(stored).read_to_end(&mut out)?;
            Ok(out)
        }
        #[allow(unreachable_patterns)]
        other => Err(not_built(other)),
    }
}
