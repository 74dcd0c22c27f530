use std::fs::{File, OpenOptions};
use std::io::Cursor;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::Mmap;

use crate::array::Array;
use crate::codec::{self, Encoding};
use crate::de::DeserializeOwned;
use crate::directory::{Directory, DirectoryEntry, RecordHandle};
use crate::error::{Error, Result};
use crate::header::{FstHeader, HEADER_SIZE, MAGIC_BYTES, VERSION};

pub mod reader;
pub mod writer;

pub use self::reader::{Matches, Query};
pub use self::writer::CompactStats;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OpenMode {
    /// The historical `"R/O"` mode: queries and reads only.
    ReadOnly,
    /// The historical `"RND"` mode: random-access reads and writes.
    ReadWrite,
}

/// Settings used when creating a store and when inserting without an explicit encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreOptions {
    /// Payload blobs start on multiples of this many bytes. 0 disables alignment.
    pub alignment: u32,
    /// Encoding used by [`FstFile::insert`].
    pub encoding: Encoding,
}

/// Ids handed to open stores, so handles cannot cross between them.
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

fn next_store_id() -> u64 {
    NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed)
}

/// An open store.
///
/// Any number of threads may share `&FstFile` to query and read; mutation
/// needs `&mut FstFile`, which leaves a single writer per open store.
pub struct FstFile {
    pub(crate) id: u64,
    pub(crate) file: File,
    pub(crate) path: PathBuf,
    pub(crate) mode: OpenMode,
    pub(crate) header: FstHeader,
    pub(crate) directory: Directory,
    pub(crate) map: Mmap,
    pub(crate) encoding: Encoding,
}

impl std::fmt::Debug for FstFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FstFile")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("header", &self.header)
            .field("records", &self.directory.entries.len())
            .finish_non_exhaustive()
    }
}

fn open_error(err: std::io::Error, path: &Path) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(err, path.to_path_buf())
    } else {
        Error::Io(err)
    }
}

/// Map the whole store read-only.
pub(crate) fn map_file(file: &File) -> Result<Mmap> {
    // Safety: the map is only read, and the store's writer only appends past
    // committed bytes or rewrites the header, which is re-read after remapping.
    Ok(unsafe { Mmap::map(file)? })
}

pub(crate) fn read_header(bytes: &[u8]) -> Result<FstHeader> {
    if (bytes.len() as u64) < HEADER_SIZE {
        return Err(Error::Format(format!(
            "{} bytes is too short for a store header",
            bytes.len()
        )));
    }
    let header = FstHeader::deserialize_owned(&mut Cursor::new(bytes))?;
    if &header.magic_bytes != MAGIC_BYTES {
        return Err(Error::Format("magic bytes invalid".into()));
    }
    if header.version != VERSION {
        return Err(Error::Format(format!(
            "unsupported version {}",
            header.version
        )));
    }
    Ok(header)
}

pub(crate) fn read_directory(bytes: &[u8], header: &FstHeader) -> Result<Directory> {
    let ptr = match header.directory {
        Some(ptr) => ptr.get(),
        None => return Ok(Directory::default()),
    };
    if ptr < HEADER_SIZE || ptr >= bytes.len() as u64 {
        return Err(Error::corrupt(format!(
            "directory pointer {:#x} outside file of {} bytes",
            ptr,
            bytes.len()
        )));
    }

    let tail = &bytes[ptr as usize..];
    let mut cursor = Cursor::new(tail);
    let directory = Directory::deserialize_owned(&mut cursor).map_err(Error::from_read)?;
    let len = cursor.position() as usize;
    if crc32fast::hash(&tail[..len]) != header.directory_crc {
        return Err(Error::corrupt("directory checksum mismatch"));
    }

    for entry in &directory.entries {
        if entry.data.get() < HEADER_SIZE || entry.end() > ptr {
            return Err(Error::corrupt(format!(
                "payload of {} at {:#x} overlaps the header or directory",
                entry.metadata.nomvar,
                entry.data.get()
            )));
        }
    }

    Ok(directory)
}

impl FstFile {
    /// Open an existing store.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<FstFile> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(mode == OpenMode::ReadWrite)
            .open(path)
            .map_err(|e| open_error(e, path))?;

        // Mapping an empty file fails, so reject short files first.
        if file.metadata()?.len() < HEADER_SIZE {
            return Err(Error::Format(format!(
                "'{}' is too short to be a store",
                path.display()
            )));
        }

        let map = map_file(&file)?;
        let header = read_header(&map)?;
        let directory = read_directory(&map, &header)?;

        tracing::info!(
            path = %path.display(),
            ?mode,
            records = directory.entries.len(),
            live = directory.live_count(),
            epoch = header.epoch,
            "opened store"
        );

        Ok(FstFile {
            id: next_store_id(),
            file,
            path: path.canonicalize()?,
            mode,
            header,
            directory,
            map,
            encoding: Encoding::default(),
        })
    }

    #[inline]
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<FstFile> {
        Self::open(path, OpenMode::ReadOnly)
    }

    #[inline]
    pub fn open_read_write<P: AsRef<Path>>(path: P) -> Result<FstFile> {
        Self::open(path, OpenMode::ReadWrite)
    }

    /// Create a new empty store, and error if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<FstFile> {
        Self::create_with_options(path, StoreOptions::default())
    }

    pub fn create_with_options<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<FstFile> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let header = FstHeader::new(options.alignment);
        writer::write_header(&mut file, &header)?;
        file.sync_all()?;

        tracing::info!(path = %path.display(), alignment = options.alignment, "created store");

        let map = map_file(&file)?;
        Ok(FstFile {
            id: next_store_id(),
            file,
            path: path.canonicalize()?,
            mode: OpenMode::ReadWrite,
            header,
            directory: Directory::default(),
            map,
            encoding: options.encoding,
        })
    }

    #[inline(always)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline(always)]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    #[inline(always)]
    pub fn alignment(&self) -> u32 {
        self.header.alignment
    }

    #[inline(always)]
    pub fn version(&self) -> u8 {
        self.header.version
    }

    /// Bumped by every compaction; handles from an older epoch are stale.
    #[inline(always)]
    pub fn epoch(&self) -> u64 {
        self.header.epoch
    }

    /// Encoding used by [`insert`](Self::insert).
    #[inline(always)]
    pub fn default_encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn set_default_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    /// Number of live (not deleted) records.
    #[inline]
    pub fn len(&self) -> usize {
        self.directory.live_count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the file and mapping, reporting any failure to flush to disk.
    pub fn close(self) -> Result<()> {
        if self.mode == OpenMode::ReadWrite {
            self.file.sync_all()?;
        }
        tracing::debug!(path = %self.path.display(), "closed store");
        Ok(())
    }

    /// Handle for directory position `index` in the current epoch.
    #[inline(always)]
    pub(crate) fn issue(&self, index: u64) -> RecordHandle {
        RecordHandle::new(self.id, self.header.epoch, index)
    }

    /// Whether `handle` was issued by this store in its current epoch.
    #[inline(always)]
    pub(crate) fn owns(&self, handle: RecordHandle) -> bool {
        handle.store() == self.id && handle.epoch() == self.header.epoch
    }

    pub(crate) fn resolve(&self, handle: RecordHandle) -> Result<&DirectoryEntry> {
        if !self.owns(handle) {
            return Err(Error::RecordNotFound(handle));
        }
        self.directory
            .live(handle.index())
            .ok_or(Error::RecordNotFound(handle))
    }

    /// Decode `levels` of an entry's payload (all of them for `None`),
    /// refusing a payload whose shape disagrees with the directory.
    pub(crate) fn decode_entry(
        &self,
        entry: &DirectoryEntry,
        levels: Option<Range<u32>>,
    ) -> Result<Array> {
        let expected = entry.metadata.shape()?;
        let array = codec::decode_as(self.payload(entry)?, expected, levels)?;
        tracing::trace!(nomvar = %entry.metadata.nomvar, elements = array.len(), "decoded record");
        Ok(array)
    }

    pub(crate) fn payload(&self, entry: &DirectoryEntry) -> Result<&[u8]> {
        let start = entry.data.get() as usize;
        let end = entry.end() as usize;
        self.map.get(start..end).ok_or_else(|| {
            Error::corrupt(format!(
                "payload of {} at {:#x} extends past the end of the file",
                entry.metadata.nomvar, start
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{Array, Shape};
    use crate::metadata::RecordMetadata;
    use std::io::Write;

    #[test]
    fn missing_store_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FstFile::open_read_only(dir.path().join("absent.fst")).unwrap_err();
        assert!(matches!(err, Error::NotFound(..)));
        assert!(err.is_not_found());
    }

    #[test]
    fn garbage_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.fst");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"this is plainly a text file and not a store at all")
            .unwrap();
        assert!(matches!(
            FstFile::open_read_only(&path),
            Err(Error::Format(_))
        ));

        let short = dir.path().join("short.fst");
        std::fs::File::create(&short).unwrap();
        assert!(matches!(
            FstFile::open_read_only(&short),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twice.fst");
        FstFile::create(&path).unwrap().close().unwrap();
        assert!(matches!(FstFile::create(&path), Err(Error::Io(_))));
    }

    #[test]
    fn empty_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.fst");
        let options = StoreOptions {
            alignment: 64,
            ..StoreOptions::default()
        };
        FstFile::create_with_options(&path, options)
            .unwrap()
            .close()
            .unwrap();

        let store = FstFile::open_read_only(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.alignment(), 64);
        assert_eq!(store.version(), VERSION);
        assert_eq!(store.epoch(), 0);
    }

    #[test]
    fn damaged_directory_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("damaged.fst");
        {
            let mut store = FstFile::create(&path).unwrap();
            let shape = Shape::plane(2, 2).unwrap();
            let array = Array::new(shape, vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
            store
                .insert(RecordMetadata::new("TT", shape), &array)
                .unwrap();
            store.close().unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            FstFile::open_read_only(&path),
            Err(Error::CorruptData(_))
        ));
    }
}
