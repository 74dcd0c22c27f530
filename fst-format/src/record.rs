use std::ops::Range;
use std::sync::OnceLock;

use crate::array::{Array, DataType};
use crate::convert::{self, LabeledArray, Table};
use crate::directory::{DirectoryEntry, RecordHandle, RecordParams};
use crate::error::Result;
use crate::file::FstFile;
use crate::metadata::RecordMetadata;

/// What every FST record exposes: its metadata fields, its payload, and
/// conversions of the two together.
pub trait FstRecord {
    fn metadata(&self) -> &RecordMetadata;

    /// Materialize the payload.
    fn get_data(&self) -> Result<&Array>;

    fn nomvar(&self) -> &str {
        &self.metadata().nomvar
    }

    fn typvar(&self) -> &str {
        &self.metadata().typvar
    }

    fn etiket(&self) -> &str {
        &self.metadata().etiket
    }

    fn dateo(&self) -> i64 {
        self.metadata().dateo
    }

    fn datev(&self) -> i64 {
        self.metadata().datev
    }

    fn deet(&self) -> i32 {
        self.metadata().deet
    }

    fn npas(&self) -> i32 {
        self.metadata().npas
    }

    fn ni(&self) -> u32 {
        self.metadata().ni
    }

    fn nj(&self) -> u32 {
        self.metadata().nj
    }

    fn nk(&self) -> u32 {
        self.metadata().nk
    }

    fn ip1(&self) -> i32 {
        self.metadata().ip1
    }

    fn ip2(&self) -> i32 {
        self.metadata().ip2
    }

    fn ip3(&self) -> i32 {
        self.metadata().ip3
    }

    fn grtyp(&self) -> &str {
        &self.metadata().grtyp
    }

    fn ig1(&self) -> i32 {
        self.metadata().ig1
    }

    fn ig2(&self) -> i32 {
        self.metadata().ig2
    }

    fn ig3(&self) -> i32 {
        self.metadata().ig3
    }

    fn ig4(&self) -> i32 {
        self.metadata().ig4
    }

    fn to_table(&self) -> Result<Table> {
        Ok(convert::to_table(self.metadata(), self.get_data()?))
    }

    fn to_labeled_array(&self) -> Result<LabeledArray> {
        Ok(convert::to_labeled_array(self.metadata(), self.get_data()?))
    }
}

/// A record of an open store.
///
/// Field access reads the in-memory directory. The payload is decoded on the
/// first call to [`get_data`](FstRecord::get_data) and kept afterwards.
#[derive(Debug)]
pub struct Record<'a> {
    file: &'a FstFile,
    handle: RecordHandle,
    entry: &'a DirectoryEntry,
    data: OnceLock<Array>,
}

impl<'a> Record<'a> {
    pub(crate) fn new(file: &'a FstFile, handle: RecordHandle, entry: &'a DirectoryEntry) -> Self {
        Record {
            file,
            handle,
            entry,
            data: OnceLock::new(),
        }
    }

    #[inline(always)]
    pub fn handle(&self) -> RecordHandle {
        self.handle
    }

    #[inline(always)]
    pub fn data_type(&self) -> DataType {
        self.entry.data_type
    }

    pub fn params(&self) -> RecordParams {
        RecordParams::from_entry(self.handle, self.entry)
    }

    /// Whether the payload has been decoded already.
    pub fn is_loaded(&self) -> bool {
        self.data.get().is_some()
    }

    /// Levels `levels` of the payload. Served from the cache when the whole
    /// payload is already decoded, otherwise decoded without caching.
    pub fn get_levels(&self, levels: Range<u32>) -> Result<Array> {
        match self.data.get() {
            Some(array) => array.levels(levels),
            None => self.file.decode_entry(self.entry, Some(levels)),
        }
    }

    /// Take the payload out of the record, decoding it if needed.
    pub fn into_data(self) -> Result<Array> {
        match self.data.into_inner() {
            Some(array) => Ok(array),
            None => self.file.decode_entry(self.entry, None),
        }
    }
}

impl FstRecord for Record<'_> {
    #[inline(always)]
    fn metadata(&self) -> &RecordMetadata {
        &self.entry.metadata
    }

    // Two threads racing here may both decode; only one result is kept.
    fn get_data(&self) -> Result<&Array> {
        if let Some(array) = self.data.get() {
            return Ok(array);
        }
        let array = self.file.decode_entry(self.entry, None)?;
        Ok(self.data.get_or_init(|| array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ArrayData, Shape};
    use crate::error::Error;

    fn store(dir: &tempfile::TempDir) -> (FstFile, Array) {
        let mut store = FstFile::create(dir.path().join("rec.fst")).unwrap();
        let shape = Shape::new(3, 2, 2).unwrap();
        let array = Array::new(shape, (0..12).map(|x| x as f64 * 0.5).collect::<Vec<_>>()).unwrap();
        let meta = RecordMetadata {
            typvar: "A".into(),
            etiket: "GLOBAL".into(),
            ip1: 12_000,
            ip2: 6,
            datev: 42,
            grtyp: "G".into(),
            ig3: 9,
            ..RecordMetadata::new("GZ", shape)
        };
        store.insert(meta, &array).unwrap();
        (store, array)
    }

    #[test]
    fn fields_read_without_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);
        let record = store.record(store.handles()[0]).unwrap();

        assert_eq!(record.nomvar(), "GZ");
        assert_eq!(record.typvar(), "A");
        assert_eq!(record.etiket(), "GLOBAL");
        assert_eq!(record.ip1(), 12_000);
        assert_eq!(record.ip2(), 6);
        assert_eq!(record.datev(), 42);
        assert_eq!((record.ni(), record.nj(), record.nk()), (3, 2, 2));
        assert_eq!(record.grtyp(), "G");
        assert_eq!(record.ig3(), 9);
        assert_eq!(record.data_type(), DataType::F64);
        assert!(!record.is_loaded());
    }

    #[test]
    fn get_data_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (store, array) = store(&dir);
        let record = store.record(store.handles()[0]).unwrap();

        let first = record.get_data().unwrap() as *const Array;
        let second = record.get_data().unwrap() as *const Array;
        assert_eq!(first, second);
        assert!(record.is_loaded());
        assert_eq!(record.get_data().unwrap(), &array);
        assert_eq!(record.into_data().unwrap(), array);
    }

    #[test]
    fn levels_match_with_and_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (store, array) = store(&dir);
        let handle = store.handles()[0];

        let cold = store.record(handle).unwrap();
        let lower = cold.get_levels(1..2).unwrap();
        assert!(!cold.is_loaded());

        let warm = store.record(handle).unwrap();
        warm.get_data().unwrap();
        assert_eq!(warm.get_levels(1..2).unwrap(), lower);
        assert_eq!(lower, array.levels(1..2).unwrap());
        assert!(matches!(cold.get_levels(0..3), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn conversions_use_payload() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);
        let record = store.record(store.handles()[0]).unwrap();

        let table = record.to_table().unwrap();
        assert_eq!(table.num_rows(), 12);
        let labeled = record.to_labeled_array().unwrap();
        assert_eq!(labeled.dims(), &["i", "j", "k"]);
        assert_eq!(labeled.data().data(), &ArrayData::F64((0..12).map(|x| x as f64 * 0.5).collect()));
    }
}
