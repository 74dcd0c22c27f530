use std::fmt;
use std::num::NonZeroU64;

use crate::array::DataType;
use crate::criteria::Criteria;
use crate::metadata::RecordMetadata;

/// Key of a record within one open store.
///
/// A handle is a directory position tagged with the id of the open store that
/// issued it and that store's epoch. Compaction bumps the epoch, so handles
/// taken before it no longer resolve, and no handle resolves in another store.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordHandle {
    store: u64,
    epoch: u64,
    index: u64,
}

impl RecordHandle {
    pub(crate) fn new(store: u64, epoch: u64, index: u64) -> RecordHandle {
        RecordHandle {
            store,
            epoch,
            index,
        }
    }

    /// Position in the directory, in insertion order.
    #[inline(always)]
    pub fn index(self) -> u64 {
        self.index
    }

    #[inline(always)]
    pub fn epoch(self) -> u64 {
        self.epoch
    }

    /// Id of the open store that issued the handle.
    #[inline(always)]
    pub fn store(self) -> u64 {
        self.store
    }
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} (store {}, epoch {})",
            self.index, self.store, self.epoch
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DirectoryEntry {
    pub(crate) metadata: RecordMetadata,
    pub(crate) deleted: bool,
    pub(crate) data_type: DataType,
    pub(crate) datyp: u8,
    pub(crate) nbits: u8,
    /// Position of the payload blob in the file.
    pub(crate) data: NonZeroU64,
    /// Exact length of the payload blob.
    pub(crate) length: u64,
}

impl DirectoryEntry {
    #[inline(always)]
    pub(crate) fn end(&self) -> u64 {
        self.data.get() + self.length
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Directory {
    pub(crate) entries: Vec<DirectoryEntry>,
}

impl Directory {
    /// The live entry at `index`, skipping tombstones.
    #[inline(always)]
    pub(crate) fn live(&self, index: u64) -> Option<&DirectoryEntry> {
        self.entries
            .get(usize::try_from(index).ok()?)
            .filter(|e| !e.deleted)
    }

    /// Index of the first live entry at or after `from` that matches `criteria`.
    pub(crate) fn scan(&self, criteria: &Criteria, from: u64) -> Option<u64> {
        self.scan_entry(criteria, from).map(|(index, _)| index)
    }

    /// Like [`scan`](Self::scan), also returning the entry found.
    pub(crate) fn scan_entry(
        &self,
        criteria: &Criteria,
        from: u64,
    ) -> Option<(u64, &DirectoryEntry)> {
        let from = usize::try_from(from).ok()?;
        self.entries
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, e)| !e.deleted && criteria.matches(&e.metadata))
            .map(|(i, e)| (i as u64, e))
    }

    pub(crate) fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.deleted).count()
    }
}

/// Everything the directory knows about a record, historical `fstprm` style.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordParams {
    pub handle: RecordHandle,
    pub metadata: RecordMetadata,
    pub data_type: DataType,
    /// Historical data type code, see [`PayloadInfo::datyp`](crate::codec::PayloadInfo::datyp).
    pub datyp: u8,
    /// Bits per stored element.
    pub nbits: u8,
    /// Start address of the payload in the file.
    pub swa: u64,
    /// Length of the payload in bytes.
    pub lng: u64,
    /// Delete flag. Always false for records reachable through a live handle.
    pub dltf: bool,
}

impl RecordParams {
    pub(crate) fn from_entry(handle: RecordHandle, entry: &DirectoryEntry) -> RecordParams {
        RecordParams {
            handle,
            metadata: entry.metadata.clone(),
            data_type: entry.data_type,
            datyp: entry.datyp,
            nbits: entry.nbits,
            swa: entry.data.get(),
            lng: entry.length,
            dltf: entry.deleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Shape;

    fn entry(nomvar: &str, data: u64, deleted: bool) -> DirectoryEntry {
        DirectoryEntry {
            metadata: RecordMetadata::new(nomvar, Shape::plane(2, 2).unwrap()),
            deleted,
            data_type: DataType::F32,
            datyp: 5,
            nbits: 32,
            data: NonZeroU64::new(data).unwrap(),
            length: 10,
        }
    }

    #[test]
    fn scan_skips_tombstones_in_order() {
        let dir = Directory {
            entries: vec![
                entry("TT", 32, false),
                entry("TT", 42, true),
                entry("UU", 52, false),
                entry("TT", 62, false),
            ],
        };
        let tt = Criteria::any().nomvar("TT");
        assert_eq!(dir.scan(&tt, 0), Some(0));
        assert_eq!(dir.scan(&tt, 1), Some(3));
        assert_eq!(dir.scan(&tt, 4), None);
        assert_eq!(dir.live_count(), 3);
        assert!(dir.live(1).is_none());
        assert!(dir.live(9).is_none());
    }

    #[test]
    fn handles_order_by_store_epoch_then_index() {
        assert!(RecordHandle::new(1, 0, 9) < RecordHandle::new(1, 1, 0));
        assert!(RecordHandle::new(1, 3, 9) < RecordHandle::new(2, 0, 0));
        assert_eq!(
            RecordHandle::new(4, 2, 5).to_string(),
            "#5 (store 4, epoch 2)"
        );
    }
}
