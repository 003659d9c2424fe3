//! Implementation of the ELF file header. The header is located at the
//! beginning of the ELF object file and holds the "road map" the reader needs:
//! where the program header and section header tables live and how large their
//! entries are.
//!
//! Only the read side lives here. Emission normalizes several header fields
//! (`e_phoff`, `e_shoff`, the entity sizes and counts) from the transformed
//! model rather than copying them through, so it is part of the writer.

use std::io::{Read, Seek};

use crate::{
    base::{ElfAddress, ElfHalfWord, ElfOffset, ElfWord},
    error::Result,
    FromReader, HasWrittenSize,
};

pub mod identification;

use identification::ElfHeaderIdentifier;

/// The header of an ELF object file, decoded for a specific class and data
/// encoding. Type, machine and version are kept raw: the engine transforms
/// objects for any machine, so a closed machine enumeration would only reject
/// inputs it has no reason to reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader<const EC: u8, const ED: u8> {
    /// The file's identification bytes
    pub identifier: ElfHeaderIdentifier,
    /// The object file type (`e_type`): relocatable, executable, shared
    /// object, core
    pub r#type: ElfHalfWord<EC, ED>,
    /// The required architecture (`e_machine`)
    pub machine: ElfHalfWord<EC, ED>,
    /// The object file version (`e_version`)
    pub version: ElfWord<EC, ED>,
    /// The virtual address to which the system first transfers control
    /// (`e_entry`), zero if the file has no entry point
    pub entry: ElfAddress<EC, ED>,
    /// The program header table's file offset (`e_phoff`), zero if absent
    pub program_header_offset: ElfOffset<EC, ED>,
    /// The section header table's file offset (`e_shoff`), zero if absent
    pub section_header_offset: ElfOffset<EC, ED>,
    /// Processor-specific flags (`e_flags`)
    pub flags: ElfWord<EC, ED>,
    /// The ELF header's size in bytes (`e_ehsize`)
    pub header_size: ElfHalfWord<EC, ED>,
    /// The size of one program header table entry (`e_phentsize`)
    pub program_header_entry_size: ElfHalfWord<EC, ED>,
    /// The number of program header table entries (`e_phnum`)
    pub program_header_entry_count: ElfHalfWord<EC, ED>,
    /// The size of one section header table entry (`e_shentsize`)
    pub section_header_entry_size: ElfHalfWord<EC, ED>,
    /// The number of section header table entries (`e_shnum`)
    pub section_header_entry_count: ElfHalfWord<EC, ED>,
    /// The section table index of the section-name string table
    /// (`e_shstrndx`)
    pub section_name_string_table_index: ElfHalfWord<EC, ED>,
}

impl<const EC: u8, const ED: u8> FileHeader<EC, ED> {
    /// The size of the ELF file header in bytes for this class (52 for
    /// 32-bit files, 64 for 64-bit files)
    pub const SIZE: usize = ElfHeaderIdentifier::SIZE
        + ElfHalfWord::<EC, ED>::SIZE * 2
        + ElfWord::<EC, ED>::SIZE
        + ElfAddress::<EC, ED>::SIZE
        + ElfOffset::<EC, ED>::SIZE * 2
        + ElfWord::<EC, ED>::SIZE
        + ElfHalfWord::<EC, ED>::SIZE * 6;

    /// The size of one program header table entry in bytes for this class
    /// (32 for 32-bit files, 56 for 64-bit files)
    pub const PROGRAM_HEADER_SIZE: usize = ElfWord::<EC, ED>::SIZE * 2
        + ElfOffset::<EC, ED>::SIZE
        + ElfAddress::<EC, ED>::SIZE * 2
        + crate::base::ElfClassWord::<EC, ED>::SIZE * 3;

    /// The size of one section header table entry in bytes for this class
    /// (40 for 32-bit files, 64 for 64-bit files)
    pub const SECTION_HEADER_SIZE: usize = ElfWord::<EC, ED>::SIZE * 4
        + crate::base::ElfClassWord::<EC, ED>::SIZE * 4
        + ElfAddress::<EC, ED>::SIZE
        + ElfOffset::<EC, ED>::SIZE;
}

impl<R, const EC: u8, const ED: u8> FromReader<R> for FileHeader<EC, ED>
where
    R: Read + Seek,
{
    fn from_reader(reader: &mut R) -> Result<Self> {
        Ok(Self {
            identifier: ElfHeaderIdentifier::from_reader(reader)?,
            r#type: ElfHalfWord::from_reader(reader)?,
            machine: ElfHalfWord::from_reader(reader)?,
            version: ElfWord::from_reader(reader)?,
            entry: ElfAddress::from_reader(reader)?,
            program_header_offset: ElfOffset::from_reader(reader)?,
            section_header_offset: ElfOffset::from_reader(reader)?,
            flags: ElfWord::from_reader(reader)?,
            header_size: ElfHalfWord::from_reader(reader)?,
            program_header_entry_size: ElfHalfWord::from_reader(reader)?,
            program_header_entry_count: ElfHalfWord::from_reader(reader)?,
            section_header_entry_size: ElfHalfWord::from_reader(reader)?,
            section_header_entry_count: ElfHalfWord::from_reader(reader)?,
            section_name_string_table_index: ElfHalfWord::from_reader(reader)?,
        })
    }
}
