//! In-memory payload arrays.
//!
//! Arrays are column-major with `i` varying fastest, so element `(i, j, k)`
//! lives at `i + ni * (j + nj * k)` and every vertical level is one contiguous
//! run of `ni * nj` elements.

use std::fmt;
use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Shape {
    ni: u32,
    nj: u32,
    nk: u32,
}

impl Shape {
    pub fn new(ni: u32, nj: u32, nk: u32) -> Result<Shape> {
        if ni == 0 || nj == 0 || nk == 0 {
            return Err(Error::invalid_input(format!(
                "dimensions must be at least 1, got ({}, {}, {})",
                ni, nj, nk
            )));
        }
        // Element counts must fit in memory addresses; `len()` relies on it.
        (ni as usize)
            .checked_mul(nj as usize)
            .and_then(|n| n.checked_mul(nk as usize))
            .ok_or_else(|| {
                Error::invalid_input(format!(
                    "({}, {}, {}) holds more elements than can be addressed",
                    ni, nj, nk
                ))
            })?;
        Ok(Shape { ni, nj, nk })
    }

    /// A single-level `(ni, nj)` shape.
    pub fn plane(ni: u32, nj: u32) -> Result<Shape> {
        Shape::new(ni, nj, 1)
    }

    #[inline(always)]
    pub fn ni(&self) -> u32 {
        self.ni
    }

    #[inline(always)]
    pub fn nj(&self) -> u32 {
        self.nj
    }

    #[inline(always)]
    pub fn nk(&self) -> u32 {
        self.nk
    }

    /// Number of elements in one vertical level.
    #[inline(always)]
    pub fn level_len(&self) -> usize {
        self.ni as usize * self.nj as usize
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.level_len() * self.nk as usize
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline(always)]
    pub fn index(&self, i: u32, j: u32, k: u32) -> Option<usize> {
        if i >= self.ni || j >= self.nj || k >= self.nk {
            return None;
        }
        Some(i as usize + self.ni as usize * (j as usize + self.nj as usize * k as usize))
    }

    pub(crate) fn with_levels(&self, nk: u32) -> Shape {
        Shape {
            ni: self.ni,
            nj: self.nj,
            nk,
        }
    }

    pub(crate) fn check_levels(&self, levels: &Range<u32>) -> Result<()> {
        if levels.start >= levels.end || levels.end > self.nk {
            return Err(Error::invalid_input(format!(
                "level range {}..{} is empty or outside 0..{}",
                levels.start, levels.end, self.nk
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.ni, self.nj, self.nk)
    }
}

pub mod constants {
    pub const DATA_TYPE_F32: u8 = 0x01;
    pub const DATA_TYPE_F64: u8 = 0x02;
    pub const DATA_TYPE_I32: u8 = 0x03;
    pub const DATA_TYPE_U32: u8 = 0x04;
}

use self::constants::*;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DataType {
    F32,
    F64,
    I32,
    U32,
}

impl DataType {
    pub const fn id(self) -> u8 {
        match self {
            DataType::F32 => DATA_TYPE_F32,
            DataType::F64 => DATA_TYPE_F64,
            DataType::I32 => DATA_TYPE_I32,
            DataType::U32 => DATA_TYPE_U32,
        }
    }

    pub fn from_id(id: u8) -> Option<DataType> {
        match id {
            DATA_TYPE_F32 => Some(DataType::F32),
            DATA_TYPE_F64 => Some(DataType::F64),
            DATA_TYPE_I32 => Some(DataType::I32),
            DATA_TYPE_U32 => Some(DataType::U32),
            _ => None,
        }
    }

    pub const fn size_of(self) -> usize {
        match self {
            DataType::F64 => 8,
            DataType::F32 | DataType::I32 | DataType::U32 => 4,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::I32 => "i32",
            DataType::U32 => "u32",
        };
        write!(f, "{}", s)
    }
}

/// Flat element storage in column-major order.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    U32(Vec<u32>),
}

impl ArrayData {
    pub fn data_type(&self) -> DataType {
        match self {
            ArrayData::F32(_) => DataType::F32,
            ArrayData::F64(_) => DataType::F64,
            ArrayData::I32(_) => DataType::I32,
            ArrayData::U32(_) => DataType::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::F32(v) => v.len(),
            ArrayData::F64(v) => v.len(),
            ArrayData::I32(v) => v.len(),
            ArrayData::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index` widened to `f64`. Every supported element type fits exactly.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            ArrayData::F32(v) => v.get(index).map(|x| *x as f64),
            ArrayData::F64(v) => v.get(index).copied(),
            ArrayData::I32(v) => v.get(index).map(|x| *x as f64),
            ArrayData::U32(v) => v.get(index).map(|x| *x as f64),
        }
    }

    pub(crate) fn with_capacity(ty: DataType, capacity: usize) -> ArrayData {
        match ty {
            DataType::F32 => ArrayData::F32(Vec::with_capacity(capacity)),
            DataType::F64 => ArrayData::F64(Vec::with_capacity(capacity)),
            DataType::I32 => ArrayData::I32(Vec::with_capacity(capacity)),
            DataType::U32 => ArrayData::U32(Vec::with_capacity(capacity)),
        }
    }

    /// Append the elements of `other`, which must hold the same element type.
    pub fn extend_from(&mut self, other: &ArrayData) -> Result<()> {
        match (self, other) {
            (ArrayData::F32(a), ArrayData::F32(b)) => a.extend_from_slice(b),
            (ArrayData::F64(a), ArrayData::F64(b)) => a.extend_from_slice(b),
            (ArrayData::I32(a), ArrayData::I32(b)) => a.extend_from_slice(b),
            (ArrayData::U32(a), ArrayData::U32(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(Error::invalid_input(format!(
                    "cannot append {} elements to {} data",
                    b.data_type(),
                    a.data_type()
                )))
            }
        }
        Ok(())
    }

    /// Little-endian bytes of the elements in `range`.
    pub(crate) fn le_bytes(&self, range: Range<usize>) -> Vec<u8> {
        let mut out = vec![0u8; range.len() * self.data_type().size_of()];
        match self {
            ArrayData::F32(v) => LittleEndian::write_f32_into(&v[range], &mut out),
            ArrayData::F64(v) => LittleEndian::write_f64_into(&v[range], &mut out),
            ArrayData::I32(v) => LittleEndian::write_i32_into(&v[range], &mut out),
            ArrayData::U32(v) => LittleEndian::write_u32_into(&v[range], &mut out),
        }
        out
    }

    /// Append elements decoded from little-endian `bytes`.
    pub(crate) fn push_le_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let size = self.data_type().size_of();
        if bytes.len() % size != 0 {
            return Err(Error::corrupt(format!(
                "{} bytes is not a whole number of {} elements",
                bytes.len(),
                self.data_type()
            )));
        }
        let count = bytes.len() / size;
        match self {
            ArrayData::F32(v) => {
                let start = v.len();
                v.resize(start + count, 0.0);
                LittleEndian::read_f32_into(bytes, &mut v[start..]);
            }
            ArrayData::F64(v) => {
                let start = v.len();
                v.resize(start + count, 0.0);
                LittleEndian::read_f64_into(bytes, &mut v[start..]);
            }
            ArrayData::I32(v) => {
                let start = v.len();
                v.resize(start + count, 0);
                LittleEndian::read_i32_into(bytes, &mut v[start..]);
            }
            ArrayData::U32(v) => {
                let start = v.len();
                v.resize(start + count, 0);
                LittleEndian::read_u32_into(bytes, &mut v[start..]);
            }
        }
        Ok(())
    }

    /// Elements in `range` widened to `f64`, for quantization.
    pub(crate) fn f64_values(&self, range: Range<usize>) -> Vec<f64> {
        match self {
            ArrayData::F32(v) => v[range].iter().map(|x| *x as f64).collect(),
            ArrayData::F64(v) => v[range].to_vec(),
            ArrayData::I32(v) => v[range].iter().map(|x| *x as f64).collect(),
            ArrayData::U32(v) => v[range].iter().map(|x| *x as f64).collect(),
        }
    }

    /// Append reconstructed float values, narrowing to the storage type.
    pub(crate) fn push_f64_values(&mut self, values: impl Iterator<Item = f64>) -> Result<()> {
        match self {
            ArrayData::F32(v) => v.extend(values.map(|x| x as f32)),
            ArrayData::F64(v) => v.extend(values),
            other => {
                return Err(Error::corrupt(format!(
                    "quantized level cannot hold {} elements",
                    other.data_type()
                )))
            }
        }
        Ok(())
    }

    fn slice(&self, range: Range<usize>) -> ArrayData {
        match self {
            ArrayData::F32(v) => ArrayData::F32(v[range].to_vec()),
            ArrayData::F64(v) => ArrayData::F64(v[range].to_vec()),
            ArrayData::I32(v) => ArrayData::I32(v[range].to_vec()),
            ArrayData::U32(v) => ArrayData::U32(v[range].to_vec()),
        }
    }
}

impl From<Vec<f32>> for ArrayData {
    fn from(v: Vec<f32>) -> Self {
        ArrayData::F32(v)
    }
}

impl From<Vec<f64>> for ArrayData {
    fn from(v: Vec<f64>) -> Self {
        ArrayData::F64(v)
    }
}

impl From<Vec<i32>> for ArrayData {
    fn from(v: Vec<i32>) -> Self {
        ArrayData::I32(v)
    }
}

impl From<Vec<u32>> for ArrayData {
    fn from(v: Vec<u32>) -> Self {
        ArrayData::U32(v)
    }
}

/// A payload: flat element data plus the `(ni, nj, nk)` shape it is viewed through.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    shape: Shape,
    data: ArrayData,
}

impl Array {
    pub fn new(shape: Shape, data: impl Into<ArrayData>) -> Result<Array> {
        let data = data.into();
        if data.len() != shape.len() {
            return Err(Error::invalid_input(format!(
                "{} elements cannot fill shape {} ({} elements)",
                data.len(),
                shape,
                shape.len()
            )));
        }
        Ok(Array { shape, data })
    }

    #[inline(always)]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline(always)]
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    #[inline(always)]
    pub fn into_data(self) -> ArrayData {
        self.data
    }

    #[inline(always)]
    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get_f64(&self, i: u32, j: u32, k: u32) -> Option<f64> {
        self.shape.index(i, j, k).and_then(|idx| self.data.get_f64(idx))
    }

    /// Copy out the levels in `levels` as a new array.
    pub fn levels(&self, levels: Range<u32>) -> Result<Array> {
        self.shape.check_levels(&levels)?;
        let level_len = self.shape.level_len();
        let start = levels.start as usize * level_len;
        let end = levels.end as usize * level_len;
        Ok(Array {
            shape: self.shape.with_levels(levels.end - levels.start),
            data: self.data.slice(start..end),
        })
    }

    /// Stack the levels of `other` below this array's levels.
    pub fn stack_levels(mut self, other: &Array) -> Result<Array> {
        if self.shape.ni != other.shape.ni || self.shape.nj != other.shape.nj {
            return Err(Error::invalid_input(format!(
                "cannot stack {} onto {}: horizontal shapes differ",
                other.shape, self.shape
            )));
        }
        self.data.extend_from(&other.data)?;
        self.shape = self.shape.with_levels(self.shape.nk + other.shape.nk);
        Ok(self)
    }
}
