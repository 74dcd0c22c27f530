//! Linear quantization and bit packing for lossy float levels.
//!
//! A quantized level block is `min: f64`, `step: f64`, then one `nbits`-wide
//! code per element, packed least-significant bit first. Values are rebuilt as
//! `min + code * step`, so the reconstruction error of any element is at most
//! `step / 2`, where `step = (max - min) / (2^nbits - 1)`.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

pub mod constants {
    pub const PACKING_RAW: u8 = 0x00;
    pub const PACKING_QUANTIZED: u8 = 0x01;

    pub const MAX_QUANTIZED_BITS: u8 = 32;

    /// `min` and `step`, both `f64`.
    pub const QUANTIZED_PREFIX_SIZE: usize = 16;
}

use self::constants::*;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum Packing {
    /// Little-endian element bytes; bit-exact.
    #[default]
    Raw,
    /// Per-level linear quantization to `nbits` bits (1..=32), float data only.
    Quantized { nbits: u8 },
}

impl Packing {
    pub const fn id(self) -> u8 {
        match self {
            Packing::Raw => PACKING_RAW,
            Packing::Quantized { .. } => PACKING_QUANTIZED,
        }
    }

    pub fn is_lossless(self) -> bool {
        matches!(self, Packing::Raw)
    }

    pub(crate) fn from_parts(id: u8, nbits: u8) -> Result<Packing> {
        match id {
            PACKING_RAW => Ok(Packing::Raw),
            PACKING_QUANTIZED if (1..=MAX_QUANTIZED_BITS).contains(&nbits) => {
                Ok(Packing::Quantized { nbits })
            }
            PACKING_QUANTIZED => Err(Error::corrupt(format!(
                "quantized payload declares {} bits",
                nbits
            ))),
            id => Err(Error::corrupt(format!("unknown packing id {:#x}", id))),
        }
    }

    /// Largest absolute reconstruction error for a level spanning `range`
    /// (before narrowing to `f32`, if the data is single precision).
    pub fn error_bound(self, range: f64) -> f64 {
        match self {
            Packing::Raw => 0.0,
            Packing::Quantized { nbits } => range / max_code(nbits) as f64 / 2.0,
        }
    }
}

#[inline(always)]
fn max_code(nbits: u8) -> u64 {
    (1u64 << nbits) - 1
}

/// Number of bytes `count` codes of `nbits` bits occupy once packed.
#[inline(always)]
pub(crate) fn packed_len(count: usize, nbits: u8) -> usize {
    (count * nbits as usize + 7) / 8
}

/// Size of a quantized level block, or `None` if it cannot be addressed.
pub(crate) fn quantized_len(count: usize, nbits: u8) -> Option<usize> {
    count
        .checked_mul(nbits as usize)?
        .checked_add(7 + QUANTIZED_PREFIX_SIZE * 8)
        .map(|bits| bits / 8)
}

pub(crate) fn quantize(values: &[f64], nbits: u8) -> Result<Vec<u8>> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        if !v.is_finite() {
            return Err(Error::invalid_input(
                "quantized packing requires finite values",
            ));
        }
        min = min.min(*v);
        max = max.max(*v);
    }

    let range = max - min;
    if !range.is_finite() {
        return Err(Error::invalid_input(format!(
            "level range {} to {} is too wide to quantize",
            min, max
        )));
    }

    let top = max_code(nbits);
    let step = if range > 0.0 { range / top as f64 } else { 0.0 };

    let codes = values.iter().map(|v| {
        if step == 0.0 {
            0
        } else {
            (((v - min) / step).round() as u64).min(top)
        }
    });

    let mut out = vec![0u8; QUANTIZED_PREFIX_SIZE];
    LittleEndian::write_f64(&mut out[0..8], min);
    LittleEndian::write_f64(&mut out[8..16], step);
    out.extend(pack_bits(codes, values.len(), nbits));
    Ok(out)
}

pub(crate) fn dequantize(block: &[u8], count: usize, nbits: u8) -> Result<Vec<f64>> {
    let expected = quantized_len(count, nbits)
        .ok_or_else(|| Error::corrupt(format!("{} quantized elements overflow", count)))?;
    if block.len() != expected {
        return Err(Error::corrupt(format!(
            "quantized level holds {} bytes, {} elements need {}",
            block.len(),
            count,
            expected
        )));
    }
    let min = LittleEndian::read_f64(&block[0..8]);
    let step = LittleEndian::read_f64(&block[8..16]);
    Ok(unpack_bits(&block[QUANTIZED_PREFIX_SIZE..], count, nbits)
        .into_iter()
        .map(|code| min + code as f64 * step)
        .collect())
}

fn pack_bits(codes: impl Iterator<Item = u64>, count: usize, nbits: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(packed_len(count, nbits));
    let mut acc: u64 = 0;
    let mut filled: u32 = 0;
    for code in codes {
        acc |= code << filled;
        filled += nbits as u32;
        while filled >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            filled -= 8;
        }
    }
    if filled > 0 {
        out.push(acc as u8);
    }
    out
}

fn unpack_bits(bytes: &[u8], count: usize, nbits: u8) -> Vec<u64> {
    let mask = max_code(nbits);
    let mut out = Vec::with_capacity(count);
    let mut acc: u64 = 0;
    let mut filled: u32 = 0;
    let mut bytes = bytes.iter();
    while out.len() < count {
        while filled < nbits as u32 {
            // Callers check the block length, so a missing byte only pads the tail.
            let byte = bytes.next().copied().unwrap_or(0);
            acc |= (byte as u64) << filled;
            filled += 8;
        }
        out.push(acc & mask);
        acc >>= nbits;
        filled -= nbits as u32;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_round_trip_at_odd_widths() {
        for nbits in [1u8, 3, 7, 12, 17, 31, 32] {
            let top = max_code(nbits);
            let codes: Vec<u64> = (0..53u64).map(|i| (i * 2_654_435_761) & top).collect();
            let packed = pack_bits(codes.iter().copied(), codes.len(), nbits);
            assert_eq!(packed.len(), packed_len(codes.len(), nbits));
            assert_eq!(unpack_bits(&packed, codes.len(), nbits), codes);
        }
    }

    #[test]
    fn quantization_stays_within_bound() {
        let values: Vec<f64> = (0..500).map(|i| (i as f64 * 0.37).sin() * 40.0 + 273.15).collect();
        let nbits = 12;
        let block = quantize(&values, nbits).unwrap();
        let back = dequantize(&block, values.len(), nbits).unwrap();

        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let bound = Packing::Quantized { nbits }.error_bound(max - min) + 1e-9;
        for (a, b) in values.iter().zip(&back) {
            assert!((a - b).abs() <= bound, "{} vs {} exceeds {}", a, b, bound);
        }
    }

    #[test]
    fn constant_level_is_exact() {
        let values = vec![5.5f64; 17];
        let block = quantize(&values, 4).unwrap();
        assert_eq!(dequantize(&block, 17, 4).unwrap(), values);
    }

    #[test]
    fn non_finite_values_are_refused() {
        assert!(quantize(&[1.0, f64::NAN], 8).is_err());
        assert!(quantize(&[f64::INFINITY], 8).is_err());
    }

    #[test]
    fn overflowing_range_is_refused() {
        let err = quantize(&[-1e308, 1e308], 16).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        let err = quantize(&[f64::MAX, f64::MIN, 0.0], 8).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        // Wide but finite ranges still quantize to finite values.
        let block = quantize(&[-1e307, 1e307], 16).unwrap();
        let back = dequantize(&block, 2, 16).unwrap();
        assert!(back.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn block_sizes_are_checked() {
        assert_eq!(quantized_len(3, 12), Some(QUANTIZED_PREFIX_SIZE + 5));
        assert_eq!(quantized_len(usize::MAX / 4, 32), None);
        assert!(matches!(
            dequantize(&[0u8; 16], usize::MAX / 4, 32),
            Err(Error::CorruptData(_))
        ));
    }

    #[test]
    fn truncated_block_is_corrupt() {
        let block = quantize(&[1.0, 2.0, 3.0], 16).unwrap();
        let err = dequantize(&block[..block.len() - 1], 3, 16).unwrap_err();
        assert!(matches!(err, Error::CorruptData(_)));
    }

    #[test]
    fn packing_ids_are_validated() {
        assert_eq!(Packing::from_parts(0, 0).unwrap(), Packing::Raw);
        assert_eq!(
            Packing::from_parts(1, 16).unwrap(),
            Packing::Quantized { nbits: 16 }
        );
        assert!(Packing::from_parts(1, 0).is_err());
        assert!(Packing::from_parts(1, 33).is_err());
        assert!(Packing::from_parts(9, 8).is_err());
    }
}
