use std::ops::Range;

use super::FstFile;
use crate::array::Array;
use crate::codec::{self, PayloadInfo};
use crate::criteria::Criteria;
use crate::directory::{RecordHandle, RecordParams};
use crate::error::{Error, Result};
use crate::metadata::RecordMetadata;
use crate::record::Record;

/// A search over one store.
///
/// Nothing is scanned until the query is iterated, and every iteration
/// starts again from the top of the directory.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    file: &'a FstFile,
    criteria: Criteria,
}

impl<'a> Query<'a> {
    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn iter(&self) -> Matches<'_> {
        Matches {
            file: self.file,
            criteria: &self.criteria,
            next: 0,
        }
    }

    /// Matching records as lazily materialized accessors.
    ///
    /// Entries come straight from the scan, so no match is ever skipped.
    pub fn records(&self) -> impl Iterator<Item = Record<'a>> + '_ {
        let file = self.file;
        let mut next = 0;
        std::iter::from_fn(move || {
            let (index, entry) = file.directory.scan_entry(&self.criteria, next)?;
            next = index + 1;
            Some(Record::new(file, file.issue(index), entry))
        })
    }

    pub fn first(&self) -> Option<RecordHandle> {
        self.iter().next()
    }

    pub fn handles(&self) -> Vec<RecordHandle> {
        self.iter().collect()
    }
}

impl<'q> IntoIterator for &'q Query<'_> {
    type Item = RecordHandle;
    type IntoIter = Matches<'q>;

    fn into_iter(self) -> Matches<'q> {
        self.iter()
    }
}

/// One pass over the directory, in insertion order.
#[derive(Debug, Clone)]
pub struct Matches<'q> {
    file: &'q FstFile,
    criteria: &'q Criteria,
    next: u64,
}

impl Iterator for Matches<'_> {
    type Item = RecordHandle;

    fn next(&mut self) -> Option<RecordHandle> {
        let index = self.file.directory.scan(self.criteria, self.next)?;
        self.next = index + 1;
        Some(self.file.issue(index))
    }
}

impl FstFile {
    /// Records matching `criteria`. Unset keys are wildcards.
    pub fn find(&self, criteria: Criteria) -> Query<'_> {
        Query {
            file: self,
            criteria,
        }
    }

    /// First live record matching `criteria`.
    pub fn find_first(&self, criteria: &Criteria) -> Option<RecordHandle> {
        self.directory
            .scan(criteria, 0)
            .map(|index| self.issue(index))
    }

    /// Next live record matching `criteria` strictly after `after`.
    ///
    /// `after` may have been deleted since it was found, but it must have been
    /// issued by this store in the current epoch.
    pub fn find_next(
        &self,
        criteria: &Criteria,
        after: RecordHandle,
    ) -> Result<Option<RecordHandle>> {
        if !self.owns(after) {
            return Err(Error::RecordNotFound(after));
        }
        Ok(self
            .directory
            .scan(criteria, after.index() + 1)
            .map(|index| self.issue(index)))
    }

    /// Every live record, in insertion order.
    pub fn handles(&self) -> Vec<RecordHandle> {
        self.find(Criteria::any()).handles()
    }

    pub fn metadata(&self, handle: RecordHandle) -> Result<&RecordMetadata> {
        self.resolve(handle).map(|entry| &entry.metadata)
    }

    pub fn params(&self, handle: RecordHandle) -> Result<RecordParams> {
        self.resolve(handle)
            .map(|entry| RecordParams::from_entry(handle, entry))
    }

    pub fn record(&self, handle: RecordHandle) -> Result<Record<'_>> {
        let entry = self.resolve(handle)?;
        Ok(Record::new(self, handle, entry))
    }

    /// Decode a record's payload.
    pub fn read(&self, handle: RecordHandle) -> Result<Array> {
        let entry = self.resolve(handle)?;
        self.decode_entry(entry, None)
    }

    /// Decode levels `levels` of a record's payload without touching the others.
    pub fn read_levels(&self, handle: RecordHandle, levels: Range<u32>) -> Result<Array> {
        let entry = self.resolve(handle)?;
        self.decode_entry(entry, Some(levels))
    }

    /// The self-description stored with a record's payload.
    pub fn payload_info(&self, handle: RecordHandle) -> Result<PayloadInfo> {
        let entry = self.resolve(handle)?;
        codec::inspect(self.payload(entry)?)
    }
}
