//! Random-access store for gridded meteorological records in the FST style.
//!
//! Use [FstFile][FstFile] to create, query and modify stores, and
//! [Record][Record] (through the [FstRecord][FstRecord] trait) to read the
//! fields of one record and materialize its payload.

pub mod array;
pub mod codec;
mod compression;
pub mod convert;
mod criteria;
mod de;
mod directory;
mod error;
mod file;
mod header;
mod metadata;
mod record;
mod ser;

pub use array::{Array, ArrayData, DataType, Shape};
pub use codec::{decode, decode_levels, encode, inspect, Encoding, Packing, PayloadInfo};
pub use compression::{Compression, CompressionConfig};
pub use convert::{to_labeled_array, to_table, LabeledArray, Table};
pub use criteria::Criteria;
pub use directory::{RecordHandle, RecordParams};
pub use error::{Error, Result};
pub use file::{CompactStats, FstFile, Matches, OpenMode, Query, StoreOptions};
pub use metadata::{RecordMetadata, ETIKET_LEN, NOMVAR_LEN, TYPVAR_LEN};
pub use record::{FstRecord, Record};
