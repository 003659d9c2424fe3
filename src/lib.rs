//! An ELF object-file transformation engine.
//!
//! The core pipeline is read → model → layout → emit: [`ObjectKind::parse`]
//! (or [`Object::parse`] for a known class/encoding) decodes an ELF image
//! into a mutable [`object::Object`]; the caller edits the model (strip
//! sections, add sections, drop symbols, retype things); then one of the two
//! emission strategies in [`write`] lays the model out again and serializes
//! it into a caller-provided buffer: [`write::ElfWriter`] for a byte-accurate
//! ELF image, [`write::BinaryWriter`] for a flat binary of the loadable
//! segments.
//!
//! One source serves all four on-disk variants: every codec type carries the
//! ELF class and data encoding as const parameters, and [`ObjectKind`] is the
//! four-way instantiation of the model over them.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]

use std::io::{Cursor, Read, Seek, Write};

use error::Result;
use header::identification::{ElfClass, ElfDataEncoding, ElfHeaderIdentifier};
use object::Object;

pub mod arch;
pub mod base;
pub mod error;
pub mod header;
pub mod object;
pub mod section;
pub mod segment;
pub mod strtab;
pub mod write;

/// Decode an owned instance of a type from a reader
pub trait FromReader<R>
where
    R: Read + Seek,
    Self: Sized,
{
    /// Decode an instance of this type from a reader
    fn from_reader(reader: &mut R) -> Result<Self>;
}

/// Encode an instance of a type to a writer
pub trait ToWriter<W>
where
    W: Write,
    Self: Sized,
{
    /// Encode an instance of this type to a writer
    fn to_writer(&self, writer: &mut W) -> Result<()>;
}

/// A type which always has a known size when written
pub trait HasWrittenSize {
    /// The size when written
    const SIZE: usize;
}

/// An ELF object of any of the four supported class/encoding combinations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    /// A 32-bit, little-endian object
    Elf32Le(Object<{ ElfClass::Elf32 as u8 }, { ElfDataEncoding::LittleEndian as u8 }>),
    /// A 32-bit, big-endian object
    Elf32Be(Object<{ ElfClass::Elf32 as u8 }, { ElfDataEncoding::BigEndian as u8 }>),
    /// A 64-bit, little-endian object
    Elf64Le(Object<{ ElfClass::Elf64 as u8 }, { ElfDataEncoding::LittleEndian as u8 }>),
    /// A 64-bit, big-endian object
    Elf64Be(Object<{ ElfClass::Elf64 as u8 }, { ElfDataEncoding::BigEndian as u8 }>),
}

impl ObjectKind {
    /// Peek the identification bytes of `data` and parse the image with the
    /// class/encoding instantiation they name
    pub fn parse(data: &[u8]) -> Result<Self> {
        let identifier = ElfHeaderIdentifier::from_reader(&mut Cursor::new(data))?;
        match (identifier.class, identifier.data_encoding) {
            (ElfClass::Elf32, ElfDataEncoding::LittleEndian) => {
                Ok(Self::Elf32Le(Object::parse(data)?))
            }
            (ElfClass::Elf32, ElfDataEncoding::BigEndian) => {
                Ok(Self::Elf32Be(Object::parse(data)?))
            }
            (ElfClass::Elf64, ElfDataEncoding::LittleEndian) => {
                Ok(Self::Elf64Le(Object::parse(data)?))
            }
            (ElfClass::Elf64, ElfDataEncoding::BigEndian) => {
                Ok(Self::Elf64Be(Object::parse(data)?))
            }
        }
    }
}
