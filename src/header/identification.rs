//! Implementation of the `ident` field of the ELF header. This field is
//! located at the beginning of an ELF object file and specifies how the rest
//! of the file is to be decoded.
//!
//! Only the class and data encoding are interpreted; the remaining bytes
//! (version, OS ABI, ABI version, padding) are carried verbatim so that any
//! input, however unusual its ABI bytes, re-emits byte-identically.

use std::io::{Read, Seek, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use crate::{
    base::ElfByte,
    error::{Error, Result},
    FromReader, HasWrittenSize, ToWriter,
};

/// The four magic bytes at the start of every ELF file (0x7F, 'E', 'L', 'F')
pub const ELF_MAGIC: [u8; 4] = [0x7f, 0x45, 0x4c, 0x46];

/// The file's class, i.e. whether its address-sized fields occupy 32 or 64
/// bits. Together with the data encoding this determines how every multi-byte
/// field in the file is decoded.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
pub enum ElfClass {
    /// 32-bit
    Elf32 = 1,
    /// 64-bit
    Elf64 = 2,
}

impl ElfClass {
    /// Constant u8 value for ELFCLASS32
    pub const ELF_CLASS_32: u8 = Self::Elf32 as u8;
    /// Constant u8 value for ELFCLASS64
    pub const ELF_CLASS_64: u8 = Self::Elf64 as u8;
}

impl<R> FromReader<R> for ElfClass
where
    R: Read + Seek,
{
    fn from_reader(reader: &mut R) -> Result<Self> {
        let class = ElfByte::from_reader(reader)?;
        Self::from_u8(class.0).ok_or(Error::InvalidClass { class: class.0 })
    }
}

impl<W> ToWriter<W> for ElfClass
where
    W: Write,
{
    fn to_writer(&self, writer: &mut W) -> Result<()> {
        ElfByte(*self as u8).to_writer(writer)
    }
}

impl HasWrittenSize for ElfClass {
    const SIZE: usize = 1;
}

/// The file's data encoding, i.e. whether multi-byte fields are stored
/// little-endian or big-endian.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
pub enum ElfDataEncoding {
    /// Little-endian
    LittleEndian = 1,
    /// Big-endian
    BigEndian = 2,
}

impl ElfDataEncoding {
    /// Constant u8 value for ELFDATA2LSB
    pub const ELF_DATA_ENCODING_LITTLE_ENDIAN: u8 = Self::LittleEndian as u8;
    /// Constant u8 value for ELFDATA2MSB
    pub const ELF_DATA_ENCODING_BIG_ENDIAN: u8 = Self::BigEndian as u8;
}

impl<R> FromReader<R> for ElfDataEncoding
where
    R: Read + Seek,
{
    fn from_reader(reader: &mut R) -> Result<Self> {
        let encoding = ElfByte::from_reader(reader)?;
        Self::from_u8(encoding.0).ok_or(Error::InvalidDataEncoding {
            encoding: encoding.0,
        })
    }
}

impl<W> ToWriter<W> for ElfDataEncoding
where
    W: Write,
{
    fn to_writer(&self, writer: &mut W) -> Result<()> {
        ElfByte(*self as u8).to_writer(writer)
    }
}

impl HasWrittenSize for ElfDataEncoding {
    const SIZE: usize = 1;
}

/// The identifier field of an ELF header. This structure is decoded the same
/// way for all classes and encodings; it is what tells us which class and
/// encoding to decode the rest of the file with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfHeaderIdentifier {
    /// The magic value indicating that this is an ELF file
    pub magic: [ElfByte; 4],
    /// The file's class. See [`ElfClass`].
    pub class: ElfClass,
    /// The file's data encoding. See [`ElfDataEncoding`].
    pub data_encoding: ElfDataEncoding,
    /// The identifier version byte. Carried verbatim.
    pub version: ElfByte,
    /// The OS/ABI byte. Carried verbatim: the transformation engine has no
    /// ABI-specific behavior, and rejecting uncommon ABI bytes would make
    /// valid inputs untransformable.
    pub os_abi: ElfByte,
    /// The ABI version byte. Carried verbatim.
    pub abi_version: ElfByte,
    /// The reserved padding bytes. Carried verbatim.
    pub pad: [ElfByte; 7],
}

impl ElfHeaderIdentifier {
    /// The raw 16 identification bytes, as they appear at the start of the
    /// file
    pub fn bytes(&self) -> [u8; 16] {
        let mut out = [0; 16];
        out[0] = self.magic[0].0;
        out[1] = self.magic[1].0;
        out[2] = self.magic[2].0;
        out[3] = self.magic[3].0;
        out[4] = self.class as u8;
        out[5] = self.data_encoding as u8;
        out[6] = self.version.0;
        out[7] = self.os_abi.0;
        out[8] = self.abi_version.0;
        for (i, b) in self.pad.iter().enumerate() {
            out[9 + i] = b.0;
        }
        out
    }
}

impl<R> FromReader<R> for ElfHeaderIdentifier
where
    R: Read + Seek,
{
    fn from_reader(reader: &mut R) -> Result<Self> {
        let magic = [
            ElfByte::from_reader(reader)?,
            ElfByte::from_reader(reader)?,
            ElfByte::from_reader(reader)?,
            ElfByte::from_reader(reader)?,
        ];

        if magic.map(|b| b.0) != ELF_MAGIC {
            return Err(Error::InvalidMagic {
                magic: magic.map(|b| b.0),
            });
        }

        let class = ElfClass::from_reader(reader)?;
        let data_encoding = ElfDataEncoding::from_reader(reader)?;
        let version = ElfByte::from_reader(reader)?;
        let os_abi = ElfByte::from_reader(reader)?;
        let abi_version = ElfByte::from_reader(reader)?;
        let mut pad = [ElfByte(0); 7];
        for b in pad.iter_mut() {
            *b = ElfByte::from_reader(reader)?;
        }

        Ok(Self {
            magic,
            class,
            data_encoding,
            version,
            os_abi,
            abi_version,
            pad,
        })
    }
}

impl<W> ToWriter<W> for ElfHeaderIdentifier
where
    W: Write,
{
    fn to_writer(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.bytes())?;
        Ok(())
    }
}

impl HasWrittenSize for ElfHeaderIdentifier {
    const SIZE: usize = 16;
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    // Only need one test for the identifier, it is not class/encoding
    // dependent
    fn test_identifier_round_trip() {
        let mut bytes = &[
            // Magic
            0x7f, 0x45, 0x4c, 0x46, // Class (64)
            0x02, // Data encoding (LE)
            0x01, // Version (Current)
            0x01, // OS ABI (an uncommon value, kept verbatim)
            0x42, // ABI Version
            0x00, // Padding
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ][..];

        let id = ElfHeaderIdentifier::from_reader(&mut std::io::Cursor::new(&mut bytes)).unwrap();
        assert_eq!(id.class, ElfClass::Elf64);
        assert_eq!(id.data_encoding, ElfDataEncoding::LittleEndian);
        assert_eq!(id.os_abi, ElfByte(0x42));

        let mut bytes_out = Vec::new();
        id.to_writer(&mut bytes_out).unwrap();
        assert_eq!(bytes, bytes_out.as_slice());
        assert_eq!(id.bytes(), bytes);
    }

    #[test]
    fn test_identifier_rejects_bad_magic() {
        let mut bytes = &[
            0x7f, 0x45, 0x4c, 0x45, 0x02, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ][..];

        let err =
            ElfHeaderIdentifier::from_reader(&mut std::io::Cursor::new(&mut bytes)).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidMagic {
                magic: [0x7f, 0x45, 0x4c, 0x45]
            }
        );
    }
}
