//! Base types for the on-disk integer fields of ELF object file structures.
//!
//! Every multi-byte field in an ELF image has a width fixed by the file's
//! class and a byte order fixed by the file's data encoding. These newtypes
//! carry both as const parameters so that the model and the emitters can be
//! written once and instantiated for all four class/encoding combinations.

use std::{
    fmt::Display,
    io::{Read, Seek, Write},
};

use crate::{
    error::{Error, Result},
    header::identification::{ElfClass, ElfDataEncoding},
    FromReader, HasWrittenSize, ToWriter,
};

/// A single byte in an ELF file. Identical in all classes and encodings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElfByte(pub u8);

impl<R> FromReader<R> for ElfByte
where
    R: Read + Seek,
{
    fn from_reader(reader: &mut R) -> Result<Self> {
        let mut buf = [0; 1];
        reader.read_exact(&mut buf)?;
        Ok(Self(buf[0]))
    }
}

impl<W> ToWriter<W> for ElfByte
where
    W: Write,
{
    fn to_writer(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[self.0])?;
        Ok(())
    }
}

impl HasWrittenSize for ElfByte {
    const SIZE: usize = 1;
}

impl Display for ElfByte {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A half-word in an ELF file. Represented as 16 bits for both classes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElfHalfWord<const EC: u8, const ED: u8>(pub u16);

impl<R, const EC: u8, const ED: u8> FromReader<R> for ElfHalfWord<EC, ED>
where
    R: Read + Seek,
{
    fn from_reader(reader: &mut R) -> Result<Self> {
        let mut buf = [0; 2];
        reader.read_exact(&mut buf)?;
        match ED {
            ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN => Ok(Self(u16::from_le_bytes(buf))),
            ElfDataEncoding::ELF_DATA_ENCODING_BIG_ENDIAN => Ok(Self(u16::from_be_bytes(buf))),
            _ => Err(Error::InvalidClassEncodingPair {
                class: EC,
                encoding: ED,
            }),
        }
    }
}

impl<W, const EC: u8, const ED: u8> ToWriter<W> for ElfHalfWord<EC, ED>
where
    W: Write,
{
    fn to_writer(&self, writer: &mut W) -> Result<()> {
        match ED {
            ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN => {
                writer.write_all(&self.0.to_le_bytes())?
            }
            ElfDataEncoding::ELF_DATA_ENCODING_BIG_ENDIAN => {
                writer.write_all(&self.0.to_be_bytes())?
            }
            _ => {
                return Err(Error::InvalidClassEncodingPair {
                    class: EC,
                    encoding: ED,
                })
            }
        }
        Ok(())
    }
}

impl<const EC: u8, const ED: u8> HasWrittenSize for ElfHalfWord<EC, ED> {
    const SIZE: usize = 2;
}

impl<const EC: u8, const ED: u8> Display for ElfHalfWord<EC, ED> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A word in an ELF file. Represented as 32 bits for both classes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElfWord<const EC: u8, const ED: u8>(pub u32);

impl<R, const EC: u8, const ED: u8> FromReader<R> for ElfWord<EC, ED>
where
    R: Read + Seek,
{
    fn from_reader(reader: &mut R) -> Result<Self> {
        let mut buf = [0; 4];
        reader.read_exact(&mut buf)?;
        match ED {
            ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN => Ok(Self(u32::from_le_bytes(buf))),
            ElfDataEncoding::ELF_DATA_ENCODING_BIG_ENDIAN => Ok(Self(u32::from_be_bytes(buf))),
            _ => Err(Error::InvalidClassEncodingPair {
                class: EC,
                encoding: ED,
            }),
        }
    }
}

impl<W, const EC: u8, const ED: u8> ToWriter<W> for ElfWord<EC, ED>
where
    W: Write,
{
    fn to_writer(&self, writer: &mut W) -> Result<()> {
        match ED {
            ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN => {
                writer.write_all(&self.0.to_le_bytes())?
            }
            ElfDataEncoding::ELF_DATA_ENCODING_BIG_ENDIAN => {
                writer.write_all(&self.0.to_be_bytes())?
            }
            _ => {
                return Err(Error::InvalidClassEncodingPair {
                    class: EC,
                    encoding: ED,
                })
            }
        }
        Ok(())
    }
}

impl<const EC: u8, const ED: u8> HasWrittenSize for ElfWord<EC, ED> {
    const SIZE: usize = 4;
}

impl<const EC: u8, const ED: u8> Display for ElfWord<EC, ED> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An unsigned word matching the file class's native width: `Elf32_Word` on
/// 32-bit files, `Elf64_Xword` on 64-bit files. Used for `sh_flags`,
/// `sh_size`, `sh_addralign`, `sh_entsize`, `p_filesz`, `p_memsz` and
/// `p_align`, which all track the class width. The value is held widened to
/// 64 bits; encoding to a 32-bit field truncates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElfClassWord<const EC: u8, const ED: u8>(pub u64);

/// An address in an ELF file: 32 bits on 32-bit files, 64 bits on 64-bit
/// files. The value is held widened to 64 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElfAddress<const EC: u8, const ED: u8>(pub u64);

/// A file offset in an ELF file: 32 bits on 32-bit files, 64 bits on 64-bit
/// files. The value is held widened to 64 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElfOffset<const EC: u8, const ED: u8>(pub u64);

macro_rules! class_width_codec {
    ($ty:ident) => {
        impl<R, const EC: u8, const ED: u8> FromReader<R> for $ty<EC, ED>
        where
            R: Read + Seek,
        {
            fn from_reader(reader: &mut R) -> Result<Self> {
                match (EC, ED) {
                    (
                        ElfClass::ELF_CLASS_32,
                        ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN,
                    ) => {
                        let mut buf = [0; 4];
                        reader.read_exact(&mut buf)?;
                        Ok(Self(u32::from_le_bytes(buf) as u64))
                    }
                    (ElfClass::ELF_CLASS_32, ElfDataEncoding::ELF_DATA_ENCODING_BIG_ENDIAN) => {
                        let mut buf = [0; 4];
                        reader.read_exact(&mut buf)?;
                        Ok(Self(u32::from_be_bytes(buf) as u64))
                    }
                    (
                        ElfClass::ELF_CLASS_64,
                        ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN,
                    ) => {
                        let mut buf = [0; 8];
                        reader.read_exact(&mut buf)?;
                        Ok(Self(u64::from_le_bytes(buf)))
                    }
                    (ElfClass::ELF_CLASS_64, ElfDataEncoding::ELF_DATA_ENCODING_BIG_ENDIAN) => {
                        let mut buf = [0; 8];
                        reader.read_exact(&mut buf)?;
                        Ok(Self(u64::from_be_bytes(buf)))
                    }
                    (_, _) => Err(Error::InvalidClassEncodingPair {
                        class: EC,
                        encoding: ED,
                    }),
                }
            }
        }

        impl<W, const EC: u8, const ED: u8> ToWriter<W> for $ty<EC, ED>
        where
            W: Write,
        {
            fn to_writer(&self, writer: &mut W) -> Result<()> {
                match (EC, ED) {
                    (
                        ElfClass::ELF_CLASS_32,
                        ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN,
                    ) => writer.write_all(&(self.0 as u32).to_le_bytes())?,
                    (ElfClass::ELF_CLASS_32, ElfDataEncoding::ELF_DATA_ENCODING_BIG_ENDIAN) => {
                        writer.write_all(&(self.0 as u32).to_be_bytes())?
                    }
                    (
                        ElfClass::ELF_CLASS_64,
                        ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN,
                    ) => writer.write_all(&self.0.to_le_bytes())?,
                    (ElfClass::ELF_CLASS_64, ElfDataEncoding::ELF_DATA_ENCODING_BIG_ENDIAN) => {
                        writer.write_all(&self.0.to_be_bytes())?
                    }
                    (_, _) => {
                        return Err(Error::InvalidClassEncodingPair {
                            class: EC,
                            encoding: ED,
                        })
                    }
                }
                Ok(())
            }
        }

        impl<const EC: u8, const ED: u8> HasWrittenSize for $ty<EC, ED> {
            const SIZE: usize = if EC == ElfClass::ELF_CLASS_32 { 4 } else { 8 };
        }

        impl<const EC: u8, const ED: u8> Display for $ty<EC, ED> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

class_width_codec!(ElfClassWord);
class_width_codec!(ElfAddress);
class_width_codec!(ElfOffset);

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    const LE32: u8 = ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN;
    const BE: u8 = ElfDataEncoding::ELF_DATA_ENCODING_BIG_ENDIAN;
    const C32: u8 = ElfClass::ELF_CLASS_32;
    const C64: u8 = ElfClass::ELF_CLASS_64;

    #[test]
    fn test_half_word() {
        let mut bytes_le = &[0x01, 0x02][..];
        let mut bytes_be = &[0x02, 0x01][..];

        let le = ElfHalfWord::<C32, LE32>::from_reader(&mut Cursor::new(&mut bytes_le)).unwrap();
        let be = ElfHalfWord::<C64, BE>::from_reader(&mut Cursor::new(&mut bytes_be)).unwrap();
        assert_eq!(le.0, 0x0201);
        assert_eq!(be.0, 0x0201);

        let mut out = Vec::new();
        le.to_writer(&mut out).unwrap();
        assert_eq!(out, bytes_le);
        let mut out = Vec::new();
        be.to_writer(&mut out).unwrap();
        assert_eq!(out, bytes_be);
    }

    #[test]
    fn test_word() {
        let mut bytes_le = &[0x01, 0x02, 0x03, 0x04][..];
        let mut bytes_be = &[0x04, 0x03, 0x02, 0x01][..];

        let le = ElfWord::<C64, LE32>::from_reader(&mut Cursor::new(&mut bytes_le)).unwrap();
        let be = ElfWord::<C32, BE>::from_reader(&mut Cursor::new(&mut bytes_be)).unwrap();
        assert_eq!(le.0, 0x04030201);
        assert_eq!(be.0, 0x04030201);

        let mut out = Vec::new();
        le.to_writer(&mut out).unwrap();
        assert_eq!(out, bytes_le);
        let mut out = Vec::new();
        be.to_writer(&mut out).unwrap();
        assert_eq!(out, bytes_be);
    }

    #[test]
    fn test_class_width_types() {
        let mut bytes_le = &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08][..];
        let mut bytes_be = &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01][..];

        let le32 = ElfAddress::<C32, LE32>::from_reader(&mut Cursor::new(&mut bytes_le)).unwrap();
        let be32 = ElfOffset::<C32, BE>::from_reader(&mut Cursor::new(&mut bytes_be)).unwrap();
        let le64 =
            ElfClassWord::<C64, LE32>::from_reader(&mut Cursor::new(&mut bytes_le)).unwrap();
        let be64 = ElfAddress::<C64, BE>::from_reader(&mut Cursor::new(&mut bytes_be)).unwrap();

        assert_eq!(le32.0, 0x04030201);
        assert_eq!(be32.0, 0x08070605);
        assert_eq!(le64.0, 0x0807060504030201);
        assert_eq!(be64.0, 0x0807060504030201);

        assert_eq!(ElfAddress::<C32, LE32>::SIZE, 4);
        assert_eq!(ElfAddress::<C64, LE32>::SIZE, 8);

        let mut out = Vec::new();
        le32.to_writer(&mut out).unwrap();
        assert_eq!(out, bytes_le[..4]);
        let mut out = Vec::new();
        be32.to_writer(&mut out).unwrap();
        assert_eq!(out, bytes_be[..4]);
        let mut out = Vec::new();
        le64.to_writer(&mut out).unwrap();
        assert_eq!(out, bytes_le);
        let mut out = Vec::new();
        be64.to_writer(&mut out).unwrap();
        assert_eq!(out, bytes_be);
    }

    #[test]
    fn test_truncating_write() {
        let wide = ElfClassWord::<C32, LE32>(0x1_0000_0001);
        let mut out = Vec::new();
        wide.to_writer(&mut out).unwrap();
        assert_eq!(out, [0x01, 0x00, 0x00, 0x00]);
    }
}
