//! Payload blobs: self-describing, per-level encoded arrays.
//!
//! ```text
//! magic "FSTP" | packing u8 | nbits u8 | data type u8 | compression u8
//! ni u32 | nj u32 | nk u32
//! nk x (offset u64, length u64, crc32 u32)     offsets relative to the body
//! crc32 u32 of everything above
//! body: level blocks, each compressed on its own
//! ```
//!
//! Levels are independent, so [`decode_levels`] only reads, checks and
//! decompresses the blocks it returns.

use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::array::{Array, ArrayData, DataType, Shape};
use crate::compression::{compress_block, decompress_block, Compression, CompressionConfig};
use crate::error::{Error, Result};

pub mod packing;

pub use self::packing::Packing;

pub(crate) const PAYLOAD_MAGIC: &[u8; 4] = b"FSTP";
const FIXED_HEADER_SIZE: usize = 20;
const LEVEL_ENTRY_SIZE: usize = 20;
/// Elements reserved up front when decoding; larger arrays grow as levels arrive.
const MAX_PREALLOCATED: usize = 1 << 20;

/// How a payload is written: numeric packing plus byte compression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Encoding {
    pub packing: Packing,
    pub compression: CompressionConfig,
}

impl Encoding {
    /// Bit-exact, uncompressed.
    pub fn raw() -> Encoding {
        Encoding::default()
    }

    pub fn quantized(nbits: u8) -> Encoding {
        Encoding {
            packing: Packing::Quantized { nbits },
            compression: CompressionConfig::default(),
        }
    }

    pub fn with_compression(mut self, compression: impl Into<CompressionConfig>) -> Encoding {
        self.compression = compression.into();
        self
    }

    fn validate(&self, data_type: DataType) -> Result<()> {
        if let Packing::Quantized { nbits } = self.packing {
            if !(1..=packing::constants::MAX_QUANTIZED_BITS).contains(&nbits) {
                return Err(Error::invalid_input(format!(
                    "quantized packing needs 1..=32 bits, got {}",
                    nbits
                )));
            }
            if !data_type.is_float() {
                return Err(Error::invalid_input(format!(
                    "quantized packing applies to float data, not {}",
                    data_type
                )));
            }
        }
        if let Compression::Unknown(id) = self.compression.compression {
            return Err(Error::Unsupported(format!("compression id {:#x}", id)));
        }
        Ok(())
    }
}

/// What a payload blob declares about itself, read without touching level data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayloadInfo {
    pub packing: Packing,
    pub data_type: DataType,
    pub compression: Compression,
    pub shape: Shape,
}

impl PayloadInfo {
    /// Bits per stored element before compression.
    pub fn nbits(&self) -> u8 {
        match self.packing {
            Packing::Raw => (self.data_type.size_of() * 8) as u8,
            Packing::Quantized { nbits } => nbits,
        }
    }

    /// The historical `datyp` code: 1 packed float, 2 unsigned, 4 signed,
    /// 5 IEEE float, plus 128 when the bytes are compressed.
    pub fn datyp(&self) -> u8 {
        let base = match (self.packing, self.data_type) {
            (Packing::Quantized { .. }, _) => 1,
            (Packing::Raw, DataType::U32) => 2,
            (Packing::Raw, DataType::I32) => 4,
            (Packing::Raw, DataType::F32 | DataType::F64) => 5,
        };
        if self.compression == Compression::Stored {
            base
        } else {
            base + 128
        }
    }

    /// Bytes one level occupies before compression.
    fn level_block_len(&self) -> Result<usize> {
        let count = self.shape.level_len();
        match self.packing {
            Packing::Raw => count.checked_mul(self.data_type.size_of()),
            Packing::Quantized { nbits } => packing::quantized_len(count, nbits),
        }
        .ok_or_else(|| Error::corrupt(format!("levels of {} cannot be addressed", self.shape)))
    }
}

#[derive(Debug, Clone, Copy)]
struct LevelEntry {
    offset: u64,
    length: u64,
    crc: u32,
}

fn map_compression_err(err: std::io::Error) -> Error {
    match err.kind() {
        std::io::ErrorKind::Unsupported | std::io::ErrorKind::InvalidInput => {
            Error::Unsupported(err.to_string())
        }
        _ => Error::Io(err),
    }
}

pub fn encode(array: &Array, encoding: &Encoding) -> Result<Vec<u8>> {
    encoding.validate(array.data_type())?;

    let shape = array.shape();
    let level_len = shape.level_len();
    let raw_size = (array.len() * array.data_type().size_of()) as u64;
    let compression = encoding.compression.for_size(raw_size);

    let mut entries = Vec::with_capacity(shape.nk() as usize);
    let mut body = Vec::new();
    for k in 0..shape.nk() as usize {
        let range = k * level_len..(k + 1) * level_len;
        let block = match encoding.packing {
            Packing::Raw => array.data().le_bytes(range),
            Packing::Quantized { nbits } => {
                packing::quantize(&array.data().f64_values(range), nbits)?
            }
        };
        let stored = compress_block(&block, &compression).map_err(map_compression_err)?;
        entries.push(LevelEntry {
            offset: body.len() as u64,
            length: stored.len() as u64,
            crc: crc32fast::hash(&stored),
        });
        body.extend_from_slice(&stored);
    }

    let nbits = match encoding.packing {
        Packing::Raw => 0,
        Packing::Quantized { nbits } => nbits,
    };

    let mut out =
        Vec::with_capacity(FIXED_HEADER_SIZE + entries.len() * LEVEL_ENTRY_SIZE + 4 + body.len());
    out.extend_from_slice(PAYLOAD_MAGIC);
    out.write_u8(encoding.packing.id())?;
    out.write_u8(nbits)?;
    out.write_u8(array.data_type().id())?;
    out.write_u8(compression.compression.id())?;
    out.write_u32::<LittleEndian>(shape.ni())?;
    out.write_u32::<LittleEndian>(shape.nj())?;
    out.write_u32::<LittleEndian>(shape.nk())?;
    for entry in &entries {
        out.write_u64::<LittleEndian>(entry.offset)?;
        out.write_u64::<LittleEndian>(entry.length)?;
        out.write_u32::<LittleEndian>(entry.crc)?;
    }
    let header_crc = crc32fast::hash(&out);
    out.write_u32::<LittleEndian>(header_crc)?;
    out.extend_from_slice(&body);

    tracing::debug!(
        shape = %shape,
        data_type = %array.data_type(),
        packing = ?encoding.packing,
        compression = %compression.compression,
        raw = raw_size,
        bytes = out.len(),
        "encoded payload"
    );

    Ok(out)
}

/// Parse the blob header and level table; returns them with the body slice.
fn read_layout(bytes: &[u8]) -> Result<(PayloadInfo, Vec<LevelEntry>, &[u8])> {
    let mut cursor = bytes;
    let mut magic = [0u8; 4];
    std::io::Read::read_exact(&mut cursor, &mut magic).map_err(Error::from_read)?;
    if &magic != PAYLOAD_MAGIC {
        return Err(Error::corrupt("payload magic bytes invalid"));
    }

    let packing_id = cursor.read_u8().map_err(Error::from_read)?;
    let nbits = cursor.read_u8().map_err(Error::from_read)?;
    let type_id = cursor.read_u8().map_err(Error::from_read)?;
    let compression = Compression::from_id(cursor.read_u8().map_err(Error::from_read)?);
    let ni = cursor.read_u32::<LittleEndian>().map_err(Error::from_read)?;
    let nj = cursor.read_u32::<LittleEndian>().map_err(Error::from_read)?;
    let nk = cursor.read_u32::<LittleEndian>().map_err(Error::from_read)?;

    let table_end = FIXED_HEADER_SIZE + nk as usize * LEVEL_ENTRY_SIZE;
    if bytes.len() < table_end + 4 {
        return Err(Error::corrupt(format!(
            "payload of {} bytes cannot hold a {}-level table",
            bytes.len(),
            nk
        )));
    }

    let mut entries = Vec::with_capacity(nk as usize);
    for _ in 0..nk {
        entries.push(LevelEntry {
            offset: cursor.read_u64::<LittleEndian>().map_err(Error::from_read)?,
            length: cursor.read_u64::<LittleEndian>().map_err(Error::from_read)?,
            crc: cursor.read_u32::<LittleEndian>().map_err(Error::from_read)?,
        });
    }
    let header_crc = cursor.read_u32::<LittleEndian>().map_err(Error::from_read)?;
    if crc32fast::hash(&bytes[..table_end]) != header_crc {
        return Err(Error::corrupt("payload header checksum mismatch"));
    }

    let data_type = DataType::from_id(type_id)
        .ok_or_else(|| Error::corrupt(format!("unknown data type id {:#x}", type_id)))?;
    let shape = Shape::new(ni, nj, nk).map_err(|e| Error::corrupt(e.to_string()))?;
    let packing = Packing::from_parts(packing_id, nbits)?;

    let info = PayloadInfo {
        packing,
        data_type,
        compression,
        shape,
    };
    let body = &bytes[table_end + 4..];
    check_level_table(&info, &entries, body.len())?;
    Ok((info, entries, body))
}

/// Every level must lie inside the body, and stored levels must be exactly
/// as long as the declared shape needs.
fn check_level_table(info: &PayloadInfo, entries: &[LevelEntry], body_len: usize) -> Result<()> {
    let expected = info.level_block_len()?;
    for (k, entry) in entries.iter().enumerate() {
        let fits = entry
            .offset
            .checked_add(entry.length)
            .map_or(false, |end| end <= body_len as u64);
        if !fits {
            return Err(Error::corrupt(format!(
                "level {} extends past the end of the payload",
                k
            )));
        }
        if info.compression == Compression::Stored && entry.length != expected as u64 {
            return Err(Error::corrupt(format!(
                "level {} stores {} bytes, shape {} needs {}",
                k, entry.length, info.shape, expected
            )));
        }
    }
    Ok(())
}

pub fn inspect(bytes: &[u8]) -> Result<PayloadInfo> {
    read_layout(bytes).map(|(info, _, _)| info)
}

pub fn decode(bytes: &[u8]) -> Result<Array> {
    let (info, entries, body) = read_layout(bytes)?;
    decode_range(&info, &entries, body, 0..info.shape.nk())
}

/// Decode only levels `levels` (`k0..k1`); the result has shape `(ni, nj, k1 - k0)`.
pub fn decode_levels(bytes: &[u8], levels: Range<u32>) -> Result<Array> {
    let (info, entries, body) = read_layout(bytes)?;
    info.shape.check_levels(&levels)?;
    decode_range(&info, &entries, body, levels)
}

/// Decode `levels` of a blob that must declare `expected` as its shape.
///
/// `levels` of `None` decodes all of them.
pub(crate) fn decode_as(
    bytes: &[u8],
    expected: Shape,
    levels: Option<Range<u32>>,
) -> Result<Array> {
    let (info, entries, body) = read_layout(bytes)?;
    if info.shape != expected {
        return Err(Error::corrupt(format!(
            "payload has shape {}, directory says {}",
            info.shape, expected
        )));
    }
    let levels = match levels {
        Some(levels) => {
            info.shape.check_levels(&levels)?;
            levels
        }
        None => 0..info.shape.nk(),
    };
    decode_range(&info, &entries, body, levels)
}

fn decode_range(
    info: &PayloadInfo,
    entries: &[LevelEntry],
    body: &[u8],
    levels: Range<u32>,
) -> Result<Array> {
    let level_len = info.shape.level_len();
    let expected = info.level_block_len()?;
    let nk = levels.end - levels.start;
    // The declared shape is untrusted until every level has been read.
    let capacity = level_len.saturating_mul(nk as usize).min(MAX_PREALLOCATED);
    let mut data = ArrayData::with_capacity(info.data_type, capacity);

    for k in levels.clone() {
        let entry = entries[k as usize];
        // Bounds were checked with the level table.
        let start = entry.offset as usize;
        let stored = &body[start..start + entry.length as usize];
        if crc32fast::hash(stored) != entry.crc {
            return Err(Error::corrupt(format!("level {} checksum mismatch", k)));
        }

        let block = decompress_block(stored, info.compression).map_err(|e| {
            match e.kind() {
                std::io::ErrorKind::Unsupported | std::io::ErrorKind::InvalidInput => {
                    Error::Unsupported(e.to_string())
                }
                _ => Error::corrupt(format!("level {} failed to decompress: {}", k, e)),
            }
        })?;

        match info.packing {
            Packing::Raw => {
                if block.len() != expected {
                    return Err(Error::corrupt(format!(
                        "level {} holds {} bytes, {} elements need {}",
                        k,
                        block.len(),
                        level_len,
                        expected
                    )));
                }
                data.push_le_bytes(&block)?;
            }
            Packing::Quantized { nbits } => {
                let values = packing::dequantize(&block, level_len, nbits)?;
                data.push_f64_values(values.into_iter())?;
            }
        }
    }

    tracing::debug!(
        shape = %info.shape,
        levels = format_args!("{}..{}", levels.start, levels.end),
        "decoded payload"
    );

    Array::new(info.shape.with_levels(nk), data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ni: u32, nj: u32, nk: u32) -> Array {
        let shape = Shape::new(ni, nj, nk).unwrap();
        let values: Vec<f32> = (0..shape.len())
            .map(|i| (i as f32 * 0.731).cos() * 12.5 - 3.0)
            .collect();
        Array::new(shape, values).unwrap()
    }

    #[test]
    fn raw_is_bit_exact_for_every_type() {
        let shape = Shape::new(3, 2, 2).unwrap();
        let arrays = vec![
            Array::new(shape, vec![f32::MIN_POSITIVE, -0.0, 1e30, 7.0, -1.5, 0.1, 2.0, 3.0, 4.0, 5.0, 6.0, f32::NAN]).unwrap(),
            Array::new(shape, (0..12).map(|i| i as f64 / 7.0).collect::<Vec<f64>>()).unwrap(),
            Array::new(shape, (0..12).map(|i| i32::MIN + i).collect::<Vec<i32>>()).unwrap(),
            Array::new(shape, (0..12).map(|i| u32::MAX - i).collect::<Vec<u32>>()).unwrap(),
        ];
        for array in arrays {
            let bytes = encode(&array, &Encoding::raw()).unwrap();
            let back = decode(&bytes).unwrap();
            assert_eq!(back.shape(), array.shape());
            assert_eq!(
                back.data().le_bytes(0..back.len()),
                array.data().le_bytes(0..array.len())
            );
        }
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn compressed_raw_round_trips() {
        let array = sample(40, 30, 3);
        let encoding = Encoding::raw().with_compression(Compression::Zstd);
        let bytes = encode(&array, &encoding).unwrap();
        assert_eq!(inspect(&bytes).unwrap().compression, Compression::Zstd);
        assert_eq!(decode(&bytes).unwrap(), array);
    }

    #[test]
    fn quantized_respects_bound_and_keeps_type() {
        let array = sample(20, 10, 2);
        let bytes = encode(&array, &Encoding::quantized(16)).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.data_type(), DataType::F32);
        // range is 25.0, so step / 2 is under 2e-4; allow f32 rounding on top.
        for idx in 0..array.len() {
            let a = array.data().get_f64(idx).unwrap();
            let b = back.data().get_f64(idx).unwrap();
            assert!((a - b).abs() < 2e-4 + 1e-5);
        }
    }

    #[test]
    fn quantized_integer_data_is_refused() {
        let shape = Shape::plane(2, 2).unwrap();
        let array = Array::new(shape, vec![1i32, 2, 3, 4]).unwrap();
        let err = encode(&array, &Encoding::quantized(8)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn partial_levels_concatenate() {
        let array = sample(4, 3, 6);
        let bytes = encode(&array, &Encoding::raw()).unwrap();
        for (k0, k1, k2) in [(0, 1, 6), (0, 3, 6), (2, 4, 5), (1, 2, 3)] {
            let first = decode_levels(&bytes, k0..k1).unwrap();
            let second = decode_levels(&bytes, k1..k2).unwrap();
            let whole = decode_levels(&bytes, k0..k2).unwrap();
            assert_eq!(first.stack_levels(&second).unwrap(), whole);
            assert_eq!(whole, array.levels(k0..k2).unwrap());
        }
        assert!(matches!(
            decode_levels(&bytes, 3..3),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            decode_levels(&bytes, 5..7),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn partial_decode_skips_other_levels() {
        let array = sample(4, 4, 3);
        let mut bytes = encode(&array, &Encoding::raw()).unwrap();
        // Damage the last byte, which belongs to the last level.
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(decode_levels(&bytes, 0..2).is_ok());
        assert!(matches!(decode(&bytes), Err(Error::CorruptData(_))));
    }

    #[test]
    fn header_damage_is_detected() {
        let array = sample(4, 4, 1);
        let mut bytes = encode(&array, &Encoding::raw()).unwrap();
        bytes[8] ^= 0x01; // ni
        assert!(matches!(decode(&bytes), Err(Error::CorruptData(_))));
    }

    /// Rewrite the declared shape and reseal the header checksum.
    fn reshape(bytes: &mut [u8], ni: u32, nj: u32) {
        let nk = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
        bytes[8..12].copy_from_slice(&ni.to_le_bytes());
        bytes[12..16].copy_from_slice(&nj.to_le_bytes());
        let table_end = FIXED_HEADER_SIZE + nk as usize * LEVEL_ENTRY_SIZE;
        let crc = crc32fast::hash(&bytes[..table_end]);
        bytes[table_end..table_end + 4].copy_from_slice(&crc.to_le_bytes());
    }

    #[test]
    fn oversized_declared_shape_is_corrupt() {
        let array = sample(2, 2, 1);
        let mut bytes = encode(&array, &Encoding::raw()).unwrap();
        reshape(&mut bytes, 1 << 20, 1 << 20);
        assert!(matches!(inspect(&bytes), Err(Error::CorruptData(_))));
        assert!(matches!(decode(&bytes), Err(Error::CorruptData(_))));
        assert!(matches!(
            decode_levels(&bytes, 0..1),
            Err(Error::CorruptData(_))
        ));

        reshape(&mut bytes, u32::MAX, u32::MAX);
        assert!(matches!(decode(&bytes), Err(Error::CorruptData(_))));
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn oversized_shape_behind_compression_is_corrupt() {
        let array = sample(40, 30, 2);
        let encoding = Encoding::raw().with_compression(Compression::Zstd);
        let mut bytes = encode(&array, &encoding).unwrap();
        reshape(&mut bytes, 1 << 20, 1 << 20);
        assert!(matches!(decode(&bytes), Err(Error::CorruptData(_))));
    }

    #[test]
    fn shape_must_match_when_expected() {
        let array = sample(4, 3, 2);
        let bytes = encode(&array, &Encoding::raw()).unwrap();
        let shape = array.shape();
        assert_eq!(decode_as(&bytes, shape, None).unwrap(), array);
        assert_eq!(
            decode_as(&bytes, shape, Some(1..2)).unwrap(),
            array.levels(1..2).unwrap()
        );
        let other = Shape::new(3, 4, 2).unwrap();
        assert!(matches!(
            decode_as(&bytes, other, None),
            Err(Error::CorruptData(_))
        ));
        assert!(matches!(
            decode_as(&bytes, other, Some(0..1)),
            Err(Error::CorruptData(_))
        ));
    }

    #[test]
    fn truncation_is_detected() {
        let array = sample(4, 4, 2);
        let bytes = encode(&array, &Encoding::raw()).unwrap();
        for cut in [3, 10, 30, bytes.len() - 1] {
            assert!(matches!(decode(&bytes[..cut]), Err(Error::CorruptData(_))));
        }
    }

    #[test]
    fn datyp_follows_packing_and_compression() {
        let info = PayloadInfo {
            packing: Packing::Raw,
            data_type: DataType::F32,
            compression: Compression::Stored,
            shape: Shape::plane(1, 1).unwrap(),
        };
        assert_eq!(info.datyp(), 5);
        assert_eq!(info.nbits(), 32);

        let info = PayloadInfo {
            packing: Packing::Quantized { nbits: 12 },
            compression: Compression::Zstd,
            ..info
        };
        assert_eq!(info.datyp(), 129);
        assert_eq!(info.nbits(), 12);
    }
}
