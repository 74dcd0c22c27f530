use std::io::{Seek, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::directory::{Directory, DirectoryEntry};
use crate::header::FstHeader;
use crate::metadata::RecordMetadata;

pub(crate) const FLAG_DELETED: u8 = 0b0000_0001;

pub(crate) trait Serialize {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()>;
}

impl Serialize for String {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        let len = u16::try_from(self.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "string too long")
        })?;
        writer.write_u16::<LittleEndian>(len)?;
        writer.write_all(self.as_bytes())
    }
}

impl<T: Serialize> Serialize for Vec<T> {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self.len() as u64)?;

        for item in self.iter() {
            item.write(writer)?;
        }
        Ok(())
    }
}

impl Serialize for FstHeader {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.magic_bytes)?;
        writer.write_u8(self.version)?;
        writer.write_all(&[0u8; 3])?; // reserved
        writer.write_u32::<LittleEndian>(self.alignment)?;
        writer.write_u32::<LittleEndian>(self.directory_crc)?;
        writer.write_u64::<LittleEndian>(self.directory.map(|x| x.get()).unwrap_or(0))?;
        writer.write_u64::<LittleEndian>(self.epoch)
    }
}

impl Serialize for RecordMetadata {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        self.nomvar.write(writer)?;
        self.typvar.write(writer)?;
        self.etiket.write(writer)?;
        self.grtyp.write(writer)?;
        writer.write_i32::<LittleEndian>(self.ip1)?;
        writer.write_i32::<LittleEndian>(self.ip2)?;
        writer.write_i32::<LittleEndian>(self.ip3)?;
        writer.write_i64::<LittleEndian>(self.dateo)?;
        writer.write_i64::<LittleEndian>(self.datev)?;
        writer.write_i32::<LittleEndian>(self.deet)?;
        writer.write_i32::<LittleEndian>(self.npas)?;
        writer.write_u32::<LittleEndian>(self.ni)?;
        writer.write_u32::<LittleEndian>(self.nj)?;
        writer.write_u32::<LittleEndian>(self.nk)?;
        writer.write_i32::<LittleEndian>(self.ig1)?;
        writer.write_i32::<LittleEndian>(self.ig2)?;
        writer.write_i32::<LittleEndian>(self.ig3)?;
        writer.write_i32::<LittleEndian>(self.ig4)
    }
}

impl Serialize for DirectoryEntry {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        let flags = if self.deleted { FLAG_DELETED } else { 0 };
        writer.write_u8(flags)?;
        self.metadata.write(writer)?;
        writer.write_u8(self.datyp)?;
        writer.write_u8(self.nbits)?;
        writer.write_u8(self.data_type.id())?;
        writer.write_u64::<LittleEndian>(self.data.get())?;
        writer.write_u64::<LittleEndian>(self.length)
    }
}

impl Serialize for Directory {
    fn write<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        self.entries.write(writer)
    }
}
