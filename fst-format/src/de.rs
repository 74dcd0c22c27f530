use std::io::{Read, Seek};
use std::num::NonZeroU64;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::array::DataType;
use crate::directory::{Directory, DirectoryEntry};
use crate::header::FstHeader;
use crate::metadata::RecordMetadata;
use crate::ser::FLAG_DELETED;

fn invalid_data(msg: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

pub(crate) trait DeserializeOwned {
    fn deserialize_owned<R: Read + Seek>(reader: &mut R) -> std::io::Result<Self>
    where
        Self: Sized;
}

impl<T: DeserializeOwned> DeserializeOwned for Vec<T> {
    fn deserialize_owned<R: Read + Seek>(reader: &mut R) -> std::io::Result<Self> {
        let start = reader.stream_position()?;
        let len = reader.read_u64::<LittleEndian>()?;
        // A corrupt count must not turn into a huge allocation up front.
        let mut buf = Vec::with_capacity(len.min(4096) as usize);
        for _ in 0..len {
            buf.push(T::deserialize_owned(reader)?);
        }
        let end = reader.stream_position()?;
        tracing::debug!(
            start = format_args!("{:#x}", start),
            end = format_args!("{:#x}", end),
            bytes = end - start,
            count = len,
            "deserialized Vec"
        );
        Ok(buf)
    }
}

impl DeserializeOwned for String {
    fn deserialize_owned<R: Read + Seek>(reader: &mut R) -> std::io::Result<Self> {
        let len = reader.read_u16::<LittleEndian>()?;
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl DeserializeOwned for FstHeader {
    fn deserialize_owned<R: Read + Seek>(reader: &mut R) -> std::io::Result<Self> {
        let mut magic_bytes = [0u8; 4];
        reader.read_exact(&mut magic_bytes)?;
        let version = reader.read_u8()?;
        reader.read_exact(&mut [0u8; 3])?; // reserved
        let alignment = reader.read_u32::<LittleEndian>()?;
        let directory_crc = reader.read_u32::<LittleEndian>()?;
        let directory = reader.read_u64::<LittleEndian>()?;
        let epoch = reader.read_u64::<LittleEndian>()?;

        tracing::debug!(
            version,
            alignment,
            directory = format_args!("{:#x}", directory),
            epoch,
            "deserialized FstHeader"
        );

        Ok(FstHeader {
            magic_bytes,
            version,
            alignment,
            directory_crc,
            directory: NonZeroU64::new(directory),
            epoch,
        })
    }
}

impl DeserializeOwned for RecordMetadata {
    fn deserialize_owned<R: Read + Seek>(reader: &mut R) -> std::io::Result<Self> {
        Ok(RecordMetadata {
            nomvar: String::deserialize_owned(reader)?,
            typvar: String::deserialize_owned(reader)?,
            etiket: String::deserialize_owned(reader)?,
            grtyp: String::deserialize_owned(reader)?,
            ip1: reader.read_i32::<LittleEndian>()?,
            ip2: reader.read_i32::<LittleEndian>()?,
            ip3: reader.read_i32::<LittleEndian>()?,
            dateo: reader.read_i64::<LittleEndian>()?,
            datev: reader.read_i64::<LittleEndian>()?,
            deet: reader.read_i32::<LittleEndian>()?,
            npas: reader.read_i32::<LittleEndian>()?,
            ni: reader.read_u32::<LittleEndian>()?,
            nj: reader.read_u32::<LittleEndian>()?,
            nk: reader.read_u32::<LittleEndian>()?,
            ig1: reader.read_i32::<LittleEndian>()?,
            ig2: reader.read_i32::<LittleEndian>()?,
            ig3: reader.read_i32::<LittleEndian>()?,
            ig4: reader.read_i32::<LittleEndian>()?,
        })
    }
}

impl DeserializeOwned for DirectoryEntry {
    fn deserialize_owned<R: Read + Seek>(reader: &mut R) -> std::io::Result<Self> {
        let start = reader.stream_position()?;
        let flags = reader.read_u8()?;
        let metadata = RecordMetadata::deserialize_owned(reader)?;
        let datyp = reader.read_u8()?;
        let nbits = reader.read_u8()?;
        let type_id = reader.read_u8()?;
        let data = reader.read_u64::<LittleEndian>()?;
        let length = reader.read_u64::<LittleEndian>()?;

        let data_type = DataType::from_id(type_id)
            .ok_or_else(|| invalid_data(format!("unknown data type id {:#x}", type_id)))?;
        let data = NonZeroU64::new(data)
            .ok_or_else(|| invalid_data("payload address must not be zero".into()))?;

        let end = reader.stream_position()?;
        tracing::trace!(
            start = format_args!("{:#x}", start),
            end = format_args!("{:#x}", end),
            bytes = end - start,
            nomvar = %metadata.nomvar,
            "deserialized DirectoryEntry"
        );

        Ok(DirectoryEntry {
            metadata,
            deleted: flags & FLAG_DELETED != 0,
            data_type,
            datyp,
            nbits,
            data,
            length,
        })
    }
}

impl DeserializeOwned for Directory {
    fn deserialize_owned<R: Read + Seek>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Directory {
            entries: <Vec<DirectoryEntry>>::deserialize_owned(reader)?,
        })
    }
}
