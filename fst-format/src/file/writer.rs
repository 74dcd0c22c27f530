use std::fs::{File, OpenOptions};
use std::io::{prelude::*, Cursor, SeekFrom};
use std::num::NonZeroU64;
use std::path::PathBuf;

use memmap2::Mmap;

use super::{map_file, FstFile, OpenMode};
use crate::array::Array;
use crate::codec::{self, Encoding};
use crate::directory::{Directory, DirectoryEntry, RecordHandle};
use crate::error::{Error, Result};
use crate::header::{FstHeader, HEADER_SIZE};
use crate::metadata::RecordMetadata;
use crate::ser::Serialize;

/// Outcome of [`FstFile::compact`].
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct CompactStats {
    pub kept: usize,
    pub removed: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl CompactStats {
    pub fn bytes_reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

pub(crate) fn write_header<W: Write + Seek>(file: &mut W, header: &FstHeader) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    header.write(file)?;
    Ok(())
}

#[inline(always)]
fn align(offset: u64, alignment: u32) -> u64 {
    if alignment == 0 {
        return offset;
    }
    let alignment = alignment as u64;
    let diff = offset % alignment;
    if diff == 0 {
        offset
    } else {
        offset + (alignment - diff)
    }
}

/// Write `bytes` at the first aligned address at or after `offset`.
fn write_aligned(file: &mut File, offset: u64, alignment: u32, bytes: &[u8]) -> Result<NonZeroU64> {
    let pos = align(offset.max(HEADER_SIZE), alignment);
    file.seek(SeekFrom::Start(pos))?;
    file.write_all(bytes)?;
    NonZeroU64::new(pos).ok_or_else(|| Error::corrupt("payload address must not be zero"))
}

/// Append `directory` after `offset`, then point a copy of `header` at it.
/// Nothing refers to the new directory until the header is rewritten.
fn write_directory(
    file: &mut File,
    offset: u64,
    header: &FstHeader,
    directory: &Directory,
) -> Result<FstHeader> {
    let mut cursor = Cursor::new(Vec::new());
    directory.write(&mut cursor)?;
    let bytes = cursor.into_inner();

    let pos = write_aligned(file, offset, header.alignment, &bytes)?;
    file.sync_data()?;

    let header = FstHeader {
        directory: Some(pos),
        directory_crc: crc32fast::hash(&bytes),
        ..header.clone()
    };
    write_header(file, &header)?;
    file.sync_data()?;

    tracing::debug!(
        start = format_args!("{:#x}", pos.get()),
        bytes = bytes.len(),
        records = directory.entries.len(),
        "committed directory"
    );
    Ok(header)
}

impl FstFile {
    #[inline(always)]
    fn ensure_writable(&self) -> Result<()> {
        match self.mode {
            OpenMode::ReadWrite => Ok(()),
            OpenMode::ReadOnly => Err(Error::ReadOnly),
        }
    }

    /// Persist the in-memory directory and refresh the mapping.
    fn commit(&mut self) -> Result<()> {
        self.commit_with(map_file)
    }

    /// The header and map are replaced together or not at all. If `remap`
    /// fails, the previous directory pointer is written back.
    fn commit_with(&mut self, remap: impl FnOnce(&File) -> Result<Mmap>) -> Result<()> {
        let end = self.file.metadata()?.len();
        let header = write_directory(&mut self.file, end, &self.header, &self.directory)?;
        let map = match remap(&self.file) {
            Ok(map) => map,
            Err(e) => {
                let restored = write_header(&mut self.file, &self.header)
                    .and_then(|_| Ok(self.file.sync_data()?));
                if let Err(undo) = restored {
                    tracing::warn!(error = %undo, "failed to restore previous directory pointer");
                }
                return Err(e);
            }
        };
        self.header = header;
        self.map = map;
        Ok(())
    }

    /// Insert a record using the store's default encoding.
    pub fn insert(&mut self, metadata: RecordMetadata, payload: &Array) -> Result<RecordHandle> {
        let encoding = self.encoding.clone();
        self.insert_with(metadata, payload, &encoding)
    }

    /// Insert a record. Either the payload and its directory entry are both
    /// committed, or the store is left as it was.
    pub fn insert_with(
        &mut self,
        metadata: RecordMetadata,
        payload: &Array,
        encoding: &Encoding,
    ) -> Result<RecordHandle> {
        self.ensure_writable()?;
        let metadata = metadata.normalized()?;
        let expected = metadata.shape()?;
        if payload.shape() != expected {
            return Err(Error::Shape {
                expected,
                actual: payload.shape(),
            });
        }

        let blob = codec::encode(payload, encoding)?;
        let info = codec::inspect(&blob)?;

        let end = self.file.metadata()?.len();
        let data = write_aligned(&mut self.file, end, self.header.alignment, &blob)?;

        let index = self.directory.entries.len() as u64;
        self.directory.entries.push(DirectoryEntry {
            metadata,
            deleted: false,
            data_type: info.data_type,
            datyp: info.datyp(),
            nbits: info.nbits(),
            data,
            length: blob.len() as u64,
        });

        if let Err(e) = self.commit() {
            self.directory.entries.pop();
            return Err(e);
        }

        let handle = self.issue(index);
        tracing::debug!(
            %handle,
            nomvar = %self.directory.entries[index as usize].metadata.nomvar,
            start = format_args!("{:#x}", data.get()),
            bytes = blob.len(),
            "inserted record"
        );
        Ok(handle)
    }

    /// Tombstone a record. Its bytes stay in the file until [`compact`](Self::compact).
    pub fn delete(&mut self, handle: RecordHandle) -> Result<()> {
        self.ensure_writable()?;
        self.resolve(handle)?;

        let index = handle.index() as usize;
        self.directory.entries[index].deleted = true;
        if let Err(e) = self.commit() {
            self.directory.entries[index].deleted = false;
            return Err(e);
        }

        tracing::debug!(%handle, "deleted record");
        Ok(())
    }

    /// Rewrite the store without tombstoned records or dead space.
    ///
    /// Every handle taken before compaction becomes stale.
    pub fn compact(&mut self) -> Result<CompactStats> {
        self.ensure_writable()?;

        let bytes_before = self.file.metadata()?.len();
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".compact");
        let tmp_path = PathBuf::from(tmp_name);

        let mut out = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        let result = self.write_compacted(&mut out);
        let (header, directory, removed) = match result {
            Ok(v) => v,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        std::fs::rename(&tmp_path, &self.path)?;

        let map = map_file(&out)?;

        let stats = CompactStats {
            kept: directory.entries.len(),
            removed,
            bytes_before,
            bytes_after: out.metadata()?.len(),
        };

        self.file = out;
        self.map = map;
        self.header = header;
        self.directory = directory;

        tracing::info!(
            path = %self.path.display(),
            kept = stats.kept,
            removed = stats.removed,
            reclaimed = stats.bytes_reclaimed(),
            epoch = self.header.epoch,
            "compacted store"
        );
        Ok(stats)
    }

    fn write_compacted(&self, out: &mut File) -> Result<(FstHeader, Directory, usize)> {
        let mut header = FstHeader {
            directory: None,
            directory_crc: 0,
            epoch: self.header.epoch + 1,
            ..self.header.clone()
        };
        write_header(out, &header)?;

        let mut directory = Directory::default();
        let mut removed = 0;
        let mut offset = HEADER_SIZE;
        for entry in &self.directory.entries {
            if entry.deleted {
                removed += 1;
                continue;
            }
            let data = write_aligned(out, offset, header.alignment, self.payload(entry)?)?;
            offset = data.get() + entry.length;
            directory.entries.push(DirectoryEntry {
                data,
                ..entry.clone()
            });
        }

        header = write_directory(out, offset, &header, &directory)?;
        Ok((header, directory, removed))
    }
}
