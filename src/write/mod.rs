//! Layout and serialization: the two emission strategies over the object
//! model.
//!
//! [`ElfWriter`] re-emits a complete ELF image. Its `finalize` reconstructs
//! file offsets around one invariant: a section inside a segment keeps its
//! distance from the segment start, so loadable images are preserved
//! byte-for-byte no matter what happened to the sections outside them.
//! [`BinaryWriter`] instead emits only the contents of loadable segments that
//! cover at least one section, concatenated in offset order.
//!
//! Both strategies follow the same protocol: `finalize` once, size an output
//! buffer with `total_size`, then `write` into it.

use std::io::{Cursor, Write};

use crate::{
    base::{ElfAddress, ElfClassWord, ElfHalfWord, ElfOffset, ElfWord},
    error::{Error, Result},
    header::{identification::ElfClass, FileHeader},
    object::Object,
    section::{
        relocation::Relocation, symbol::STB_LOCAL, Section, SectionData, SHT_NOBITS, SHT_NULL,
        SHT_RELA,
    },
    segment::Segment,
    HasWrittenSize, ToWriter,
};

/// Round `value` up to a multiple of `align`. Alignments of 0 and 1 both mean
/// "no constraint".
pub(crate) fn align_to(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        (value + align - 1) / align * align
    }
}

/// A cursor into the output buffer positioned at `offset`
fn cursor_at<'out>(out: &'out mut [u8], offset: u64, context: &str) -> Result<Cursor<&'out mut [u8]>> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|start| *start <= out.len())
        .ok_or_else(|| Error::OutOfBounds {
            context: context.to_owned(),
            value: offset,
        })?;
    Ok(Cursor::new(&mut out[start..]))
}

/// Bounds-checked bulk copy into the output buffer at `offset`
fn copy_at(out: &mut [u8], offset: u64, bytes: &[u8], context: &str) -> Result<()> {
    let start = usize::try_from(offset).map_err(|_| Error::OutOfBounds {
        context: context.to_owned(),
        value: offset,
    })?;
    start
        .checked_add(bytes.len())
        .and_then(|end| out.get_mut(start..end))
        .ok_or_else(|| Error::OutOfBounds {
            context: context.to_owned(),
            value: offset,
        })?
        .copy_from_slice(bytes);
    Ok(())
}

/// Re-anchor each segment that covers sections on its first (lowest original
/// offset) member: a gap may exist between the segment start and its first
/// section, and the new segment offset must keep that gap so the interstitial
/// bytes land where they did in the input.
fn anchor_segments(sections: &[Section], segments: &mut [Segment]) {
    for segment in segments.iter_mut() {
        let first = segment
            .sections
            .iter()
            .map(|&index| {
                let section = &sections[index as usize - 1];
                (section.original_offset, section.index, section.offset)
            })
            .min();
        if let Some((first_original, _, first_offset)) = first {
            segment.offset = first_offset - (first_original - segment.original_offset);
        }
    }
}

/// Refresh a symbol table's derived state: freeze its name table, assign each
/// symbol's name index, and recompute `sh_link`/`sh_info`.
///
/// `sh_info` is one past the index of the last `STB_LOCAL` symbol. Entries
/// are not reordered, so this is only the value the ELF specification
/// requires when locals already precede globals, which holds for any
/// linker-produced input.
fn finalize_symbol_table<const EC: u8, const ED: u8>(
    object: &mut Object<EC, ED>,
    position: usize,
) -> Result<()> {
    let names_index = match &object.sections[position].data {
        SectionData::Symbols { names, .. } => *names,
        _ => return Ok(()),
    };
    object.section(names_index, "symbol table string table")?;
    let names_position = names_index as usize - 1;

    match &mut object.sections[names_position].data {
        SectionData::Strings { table } => table.finalize(),
        _ => {
            return Err(Error::NotStringTable {
                index: names_index,
                context: "symbol table string table".to_owned(),
            })
        }
    }

    let symbol_names: Vec<String> = match &object.sections[position].data {
        SectionData::Symbols { entries, .. } => {
            entries.iter().map(|symbol| symbol.name.clone()).collect()
        }
        _ => Vec::new(),
    };
    let mut offsets = Vec::with_capacity(symbol_names.len());
    if let SectionData::Strings { table } = &object.sections[names_position].data {
        for name in &symbol_names {
            offsets.push(table.offset_of(name)? as u32);
        }
    }

    let section = &mut object.sections[position];
    let mut max_local = 0u32;
    if let SectionData::Symbols { entries, .. } = &mut section.data {
        for (position, symbol) in entries.iter_mut().enumerate() {
            symbol.name_index = offsets[position];
            if symbol.binding == STB_LOCAL {
                max_local = max_local.max(symbol.index);
            }
        }
    }
    section.link = names_index;
    section.info = max_local + 1;
    Ok(())
}

/// Emits the transformed object as a complete ELF image
#[derive(Debug)]
pub struct ElfWriter<const EC: u8, const ED: u8> {
    object: Object<EC, ED>,
    finalized: bool,
}

impl<const EC: u8, const ED: u8> ElfWriter<EC, ED> {
    const EHDR_SIZE: u64 = FileHeader::<EC, ED>::SIZE as u64;
    const PHDR_SIZE: u64 = FileHeader::<EC, ED>::PROGRAM_HEADER_SIZE as u64;
    const SHDR_SIZE: u64 = FileHeader::<EC, ED>::SECTION_HEADER_SIZE as u64;
    const ADDR_SIZE: u64 = ElfAddress::<EC, ED>::SIZE as u64;

    /// Take ownership of a (possibly mutated) object for full-ELF emission
    pub fn new(object: Object<EC, ED>) -> Self {
        Self {
            object,
            finalized: false,
        }
    }

    /// The object being emitted
    pub fn object(&self) -> &Object<EC, ED> {
        &self.object
    }

    /// Give the object back, e.g. to inspect the assigned layout
    pub fn into_object(self) -> Object<EC, ED> {
        self.object
    }

    /// Run layout and cross-reference fix-up. Mutating the object afterwards
    /// is undefined; a second call is a no-op.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        let object = &mut self.object;
        object.section(object.section_names, "e_shstrndx")?;

        // Every section name, then every symbol name, has to reach its string
        // table before layout so the tables reserve enough space.
        let names: Vec<String> = object.sections.iter().map(|sec| sec.name.clone()).collect();
        let names_position = object.section_names as usize - 1;
        for name in &names {
            object.sections[names_position].add_string(name)?;
        }
        if let Some(table) = object.symbol_table {
            let position = table as usize - 1;
            let (strings, symbol_names) = match &object.sections[position].data {
                SectionData::Symbols { entries, names } => (
                    *names,
                    entries
                        .iter()
                        .map(|symbol| symbol.name.clone())
                        .collect::<Vec<_>>(),
                ),
                _ => {
                    return Err(Error::NotSymbolTable {
                        index: table,
                        context: "symbol_table".to_owned(),
                    })
                }
            };
            object.section(strings, "symbol table string table")?;
            let strings_position = strings as usize - 1;
            for name in &symbol_names {
                object.sections[strings_position].add_string(name)?;
            }
        }

        // Put the sections in original-offset order (stable, so input order
        // survives for ties), renumber, and patch every stored reference.
        let count = object.sections.len();
        object.sections.sort_by_key(|sec| sec.original_offset);
        let mut map = vec![0u32; count + 1];
        for (position, section) in object.sections.iter().enumerate() {
            map[section.index as usize] = position as u32 + 1;
        }
        object.apply_section_map(&map)?;

        // Assign segment offsets through an auxiliary order chosen so that a
        // parent is always assigned before its children; children then sit at
        // their original distance from the parent.
        let mut ordered: Vec<usize> = (0..object.segments.len()).collect();
        ordered.sort_by_key(|&position| {
            (
                object.segments[position].original_offset,
                object.segments[position].index,
            )
        });

        // The ELF header and program headers keep their fixed prefix, so the
        // first segment's original offset is a safe place to start. This
        // covers the plain case and the PT_PHDR case alike.
        let mut offset = match ordered.first() {
            Some(&first) => object.segments[first].offset,
            None => Self::EHDR_SIZE,
        };
        for &position in &ordered {
            match object.segments[position].parent_segment {
                Some(parent) => {
                    let base = (
                        object.segments[parent].offset,
                        object.segments[parent].original_offset,
                    );
                    let segment = &mut object.segments[position];
                    segment.offset = base.0 + (segment.original_offset - base.1);
                }
                None => {
                    let segment = &mut object.segments[position];
                    offset = align_to(offset, segment.align);
                    segment.offset = offset;
                    offset += segment.file_size;
                }
            }
        }

        // Sections inside a segment keep their distance from the segment
        // start; the rest pack one after another behind the segments.
        for position in 0..object.sections.len() {
            match object.sections[position].parent_segment {
                Some(parent) => {
                    let base = (
                        object.segments[parent].offset,
                        object.segments[parent].original_offset,
                    );
                    let section = &mut object.sections[position];
                    section.offset = base.0 + (section.original_offset - base.1);
                }
                None => {
                    let section = &mut object.sections[position];
                    offset = align_to(offset, section.align);
                    section.offset = offset;
                    if section.r#type != SHT_NOBITS {
                        offset += section.size;
                    }
                }
            }
        }

        object.section_header_offset = align_to(offset, Self::ADDR_SIZE);

        // With offsets fixed, freeze the section-name table and refresh every
        // derived header field.
        let names_position = object.section_names as usize - 1;
        match &mut object.sections[names_position].data {
            SectionData::Strings { table } => table.finalize(),
            _ => {
                return Err(Error::NotStringTable {
                    index: object.section_names,
                    context: "e_shstrndx".to_owned(),
                })
            }
        }

        for position in 0..object.sections.len() {
            let name = object.sections[position].name.clone();
            let name_index = match &object.sections[names_position].data {
                SectionData::Strings { table } => table.offset_of(&name)? as u32,
                _ => 0,
            };
            let section = &mut object.sections[position];
            section.header_offset =
                object.section_header_offset + section.index as u64 * Self::SHDR_SIZE;
            section.name_index = name_index;
        }

        enum Refresh {
            Nothing,
            Strings,
            Symbols,
            LinkInfo(u32, u32),
            Link(u32),
        }
        for position in 0..object.sections.len() {
            let refresh = match &object.sections[position].data {
                SectionData::Strings { .. } => Refresh::Strings,
                SectionData::Symbols { .. } => Refresh::Symbols,
                SectionData::Relocations {
                    symbols, target, ..
                } => Refresh::LinkInfo(*symbols, target.unwrap_or(0)),
                SectionData::DynamicSymbols { names, .. } | SectionData::Dynamic { names, .. } => {
                    Refresh::Link(*names)
                }
                _ => Refresh::Nothing,
            };
            match refresh {
                Refresh::Strings => {
                    if let SectionData::Strings { table } = &mut object.sections[position].data {
                        table.finalize();
                    }
                }
                Refresh::Symbols => finalize_symbol_table(object, position)?,
                Refresh::LinkInfo(link, info) => {
                    let section = &mut object.sections[position];
                    section.link = link;
                    section.info = info;
                }
                Refresh::Link(link) => object.sections[position].link = link,
                Refresh::Nothing => {}
            }
        }

        anchor_segments(&object.sections, &mut object.segments);

        self.finalized = true;
        Ok(())
    }

    /// The number of bytes `write` needs: the section header array is the
    /// last thing in the file, one null header plus one per section
    pub fn total_size(&self) -> Result<u64> {
        if !self.finalized {
            return Err(Error::NotFinalized);
        }
        Ok(self.object.section_header_offset
            + (self.object.sections.len() as u64 + 1) * Self::SHDR_SIZE)
    }

    /// Serialize the finalized object into `out`, which must hold at least
    /// [`ElfWriter::total_size`] bytes. Segment contents go down first; the
    /// headers and section bodies written over them are authoritative.
    pub fn write(&self, out: &mut [u8]) -> Result<()> {
        let total = self.total_size()?;
        if (out.len() as u64) < total {
            return Err(Error::OutputBufferTooSmall {
                required: total,
                actual: out.len() as u64,
            });
        }
        out[..total as usize].fill(0);

        for segment in &self.object.segments {
            if segment.contents.is_empty() {
                continue;
            }
            copy_at(out, segment.offset, &segment.contents, "segment contents")?;
        }

        self.write_file_header(out)?;
        self.write_program_headers(out)?;
        for section in &self.object.sections {
            self.write_section_body(section, out)?;
        }
        self.write_section_headers(out)
    }

    fn write_file_header(&self, out: &mut [u8]) -> Result<()> {
        let object = &self.object;
        let mut writer = cursor_at(out, 0, "file header")?;
        writer.write_all(&object.ident).map_err(Error::from)?;
        ElfHalfWord::<EC, ED>(object.r#type).to_writer(&mut writer)?;
        ElfHalfWord::<EC, ED>(object.machine).to_writer(&mut writer)?;
        ElfWord::<EC, ED>(object.version).to_writer(&mut writer)?;
        ElfAddress::<EC, ED>(object.entry).to_writer(&mut writer)?;
        // Program headers always immediately follow the file header.
        ElfOffset::<EC, ED>(Self::EHDR_SIZE).to_writer(&mut writer)?;
        ElfOffset::<EC, ED>(object.section_header_offset).to_writer(&mut writer)?;
        ElfWord::<EC, ED>(object.flags).to_writer(&mut writer)?;
        ElfHalfWord::<EC, ED>(Self::EHDR_SIZE as u16).to_writer(&mut writer)?;
        ElfHalfWord::<EC, ED>(Self::PHDR_SIZE as u16).to_writer(&mut writer)?;
        ElfHalfWord::<EC, ED>(object.segments.len() as u16).to_writer(&mut writer)?;
        ElfHalfWord::<EC, ED>(Self::SHDR_SIZE as u16).to_writer(&mut writer)?;
        ElfHalfWord::<EC, ED>(object.sections.len() as u16 + 1).to_writer(&mut writer)?;
        ElfHalfWord::<EC, ED>(object.section_names as u16).to_writer(&mut writer)?;
        Ok(())
    }

    fn write_program_headers(&self, out: &mut [u8]) -> Result<()> {
        for segment in &self.object.segments {
            let offset = Self::EHDR_SIZE + segment.index as u64 * Self::PHDR_SIZE;
            let mut writer = cursor_at(out, offset, "program header")?;
            ElfWord::<EC, ED>(segment.r#type).to_writer(&mut writer)?;
            if EC == ElfClass::ELF_CLASS_32 {
                ElfOffset::<EC, ED>(segment.offset).to_writer(&mut writer)?;
                ElfAddress::<EC, ED>(segment.vaddr).to_writer(&mut writer)?;
                ElfAddress::<EC, ED>(segment.paddr).to_writer(&mut writer)?;
                ElfClassWord::<EC, ED>(segment.file_size).to_writer(&mut writer)?;
                ElfClassWord::<EC, ED>(segment.mem_size).to_writer(&mut writer)?;
                ElfWord::<EC, ED>(segment.flags.bits()).to_writer(&mut writer)?;
                ElfClassWord::<EC, ED>(segment.align).to_writer(&mut writer)?;
            } else {
                ElfWord::<EC, ED>(segment.flags.bits()).to_writer(&mut writer)?;
                ElfOffset::<EC, ED>(segment.offset).to_writer(&mut writer)?;
                ElfAddress::<EC, ED>(segment.vaddr).to_writer(&mut writer)?;
                ElfAddress::<EC, ED>(segment.paddr).to_writer(&mut writer)?;
                ElfClassWord::<EC, ED>(segment.file_size).to_writer(&mut writer)?;
                ElfClassWord::<EC, ED>(segment.mem_size).to_writer(&mut writer)?;
                ElfClassWord::<EC, ED>(segment.align).to_writer(&mut writer)?;
            }
        }
        Ok(())
    }

    fn write_section_body(&self, section: &Section, out: &mut [u8]) -> Result<()> {
        match &section.data {
            SectionData::Bytes { contents } => {
                if section.r#type == SHT_NOBITS {
                    return Ok(());
                }
                copy_at(out, section.offset, contents, &section.name)
            }
            SectionData::Strings { table } => {
                let start = usize::try_from(section.offset)
                    .ok()
                    .filter(|start| *start <= out.len())
                    .ok_or_else(|| Error::OutOfBounds {
                        context: section.name.clone(),
                        value: section.offset,
                    })?;
                table.write(&mut out[start..])
            }
            SectionData::Symbols { entries, .. } => {
                let mut writer = cursor_at(out, section.offset, &section.name)?;
                for symbol in entries {
                    ElfWord::<EC, ED>(symbol.name_index).to_writer(&mut writer)?;
                    if EC == ElfClass::ELF_CLASS_32 {
                        ElfAddress::<EC, ED>(symbol.value).to_writer(&mut writer)?;
                        ElfClassWord::<EC, ED>(symbol.size).to_writer(&mut writer)?;
                        crate::base::ElfByte(symbol.info()).to_writer(&mut writer)?;
                        crate::base::ElfByte(0).to_writer(&mut writer)?;
                        ElfHalfWord::<EC, ED>(symbol.section.encode()).to_writer(&mut writer)?;
                    } else {
                        crate::base::ElfByte(symbol.info()).to_writer(&mut writer)?;
                        crate::base::ElfByte(0).to_writer(&mut writer)?;
                        ElfHalfWord::<EC, ED>(symbol.section.encode()).to_writer(&mut writer)?;
                        ElfAddress::<EC, ED>(symbol.value).to_writer(&mut writer)?;
                        ElfClassWord::<EC, ED>(symbol.size).to_writer(&mut writer)?;
                    }
                }
                Ok(())
            }
            SectionData::Relocations { entries, .. } => {
                let mut writer = cursor_at(out, section.offset, &section.name)?;
                let with_addend = section.r#type == SHT_RELA;
                for relocation in entries {
                    ElfAddress::<EC, ED>(relocation.offset).to_writer(&mut writer)?;
                    ElfClassWord::<EC, ED>(Relocation::encode_info(
                        EC,
                        relocation.symbol,
                        relocation.r#type,
                    ))
                    .to_writer(&mut writer)?;
                    if with_addend {
                        ElfClassWord::<EC, ED>(relocation.addend).to_writer(&mut writer)?;
                    }
                }
                Ok(())
            }
            SectionData::DynamicRelocations { contents }
            | SectionData::DynamicSymbols { contents, .. }
            | SectionData::Dynamic { contents, .. } => {
                copy_at(out, section.offset, contents, &section.name)
            }
        }
    }

    fn write_section_headers(&self, out: &mut [u8]) -> Result<()> {
        // The synthetic null header leads the array.
        let mut writer = cursor_at(out, self.object.section_header_offset, "null section header")?;
        ElfWord::<EC, ED>(0).to_writer(&mut writer)?;
        ElfWord::<EC, ED>(SHT_NULL).to_writer(&mut writer)?;
        ElfClassWord::<EC, ED>(0).to_writer(&mut writer)?;
        ElfAddress::<EC, ED>(0).to_writer(&mut writer)?;
        ElfOffset::<EC, ED>(0).to_writer(&mut writer)?;
        ElfClassWord::<EC, ED>(0).to_writer(&mut writer)?;
        ElfWord::<EC, ED>(0).to_writer(&mut writer)?;
        ElfWord::<EC, ED>(0).to_writer(&mut writer)?;
        ElfClassWord::<EC, ED>(0).to_writer(&mut writer)?;
        ElfClassWord::<EC, ED>(0).to_writer(&mut writer)?;

        for section in &self.object.sections {
            let mut writer = cursor_at(out, section.header_offset, &section.name)?;
            ElfWord::<EC, ED>(section.name_index).to_writer(&mut writer)?;
            ElfWord::<EC, ED>(section.r#type).to_writer(&mut writer)?;
            ElfClassWord::<EC, ED>(section.flags.bits()).to_writer(&mut writer)?;
            ElfAddress::<EC, ED>(section.addr).to_writer(&mut writer)?;
            ElfOffset::<EC, ED>(section.offset).to_writer(&mut writer)?;
            ElfClassWord::<EC, ED>(section.size).to_writer(&mut writer)?;
            ElfWord::<EC, ED>(section.link).to_writer(&mut writer)?;
            ElfWord::<EC, ED>(section.info).to_writer(&mut writer)?;
            ElfClassWord::<EC, ED>(section.align).to_writer(&mut writer)?;
            ElfClassWord::<EC, ED>(section.entry_size).to_writer(&mut writer)?;
        }
        Ok(())
    }
}

/// Emits only the loadable image: the contents of every `PT_LOAD` segment
/// that covers at least one section, in offset order, each aligned to its
/// segment alignment relative to the start of the output
#[derive(Debug)]
pub struct BinaryWriter<const EC: u8, const ED: u8> {
    object: Object<EC, ED>,
    total_size: u64,
    finalized: bool,
}

impl<const EC: u8, const ED: u8> BinaryWriter<EC, ED> {
    /// Take ownership of a (possibly mutated) object for flat-binary emission
    pub fn new(object: Object<EC, ED>) -> Self {
        Self {
            object,
            total_size: 0,
            finalized: false,
        }
    }

    /// The object being emitted
    pub fn object(&self) -> &Object<EC, ED> {
        &self.object
    }

    /// Give the object back
    pub fn into_object(self) -> Object<EC, ED> {
        self.object
    }

    /// Assign consecutive output offsets to the segments that survive the
    /// projection. A second call is a no-op.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        let object = &mut self.object;
        anchor_segments(&object.sections, &mut object.segments);

        let mut ordered: Vec<usize> = (0..object.segments.len()).collect();
        ordered.sort_by_key(|&position| object.segments[position].offset);

        let mut offset = 0u64;
        for &position in &ordered {
            let segment = &mut object.segments[position];
            if segment.is_loadable_with_sections() {
                offset = align_to(offset, segment.align);
                segment.offset = offset;
                offset += segment.file_size;
            }
        }
        self.total_size = offset;
        self.finalized = true;
        Ok(())
    }

    /// The number of bytes `write` needs
    pub fn total_size(&self) -> Result<u64> {
        if !self.finalized {
            return Err(Error::NotFinalized);
        }
        Ok(self.total_size)
    }

    /// Copy each kept segment's bytes into `out` at its assigned offset
    pub fn write(&self, out: &mut [u8]) -> Result<()> {
        let total = self.total_size()?;
        if (out.len() as u64) < total {
            return Err(Error::OutputBufferTooSmall {
                required: total,
                actual: out.len() as u64,
            });
        }
        out[..total as usize].fill(0);

        for segment in &self.object.segments {
            if segment.is_loadable_with_sections() {
                copy_at(out, segment.offset, &segment.contents, "segment contents")?;
            }
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        header::identification::ElfDataEncoding,
        object::testimage,
        section::{symbol::SymbolSectionIndex, SectionSpec},
    };

    const C32: u8 = ElfClass::ELF_CLASS_32;
    const C64: u8 = ElfClass::ELF_CLASS_64;
    const LE: u8 = ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN;

    fn sample() -> Object<C64, LE> {
        Object::parse(&testimage::sample64le()).unwrap()
    }

    fn emit(object: Object<C64, LE>) -> Vec<u8> {
        let mut writer = ElfWriter::new(object);
        writer.finalize().unwrap();
        let mut out = vec![0u8; writer.total_size().unwrap() as usize];
        writer.write(&mut out).unwrap();
        out
    }

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(13, 0), 13);
        assert_eq!(align_to(13, 1), 13);
        assert_eq!(align_to(13, 8), 16);
        assert_eq!(align_to(16, 8), 16);
    }

    #[test]
    fn test_identity_round_trip() {
        let image = testimage::sample64le();
        let out = emit(Object::parse(&image).unwrap());
        assert_eq!(out, image);

        // And the re-read model matches the first structurally.
        let first = Object::<C64, LE>::parse(&image).unwrap();
        let second = Object::<C64, LE>::parse(&out).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_finalize_assigns_phdr_relative_to_parent_load() {
        let mut writer = ElfWriter::new(sample());
        writer.finalize().unwrap();
        let object = writer.into_object();
        // PT_PHDR keeps its distance from the start of its parent LOAD.
        assert_eq!(object.segments[0].parent_segment, Some(1));
        assert_eq!(
            object.segments[0].offset,
            object.segments[1].offset + (object.segments[0].original_offset
                - object.segments[1].original_offset)
        );
    }

    #[test]
    fn test_strip_unallocated_section() {
        let image = testimage::sample64le();
        let mut object = Object::<C64, LE>::parse(&image).unwrap();
        object.remove_sections(|sec| sec.name == ".comment").unwrap();

        let mut writer = ElfWriter::new(object);
        writer.finalize().unwrap();
        // One section header fewer, .comment's name gone from the name
        // table, successors pulled forward past the removed bytes.
        assert_eq!(writer.total_size().unwrap(), 1040);
        let mut out = vec![0u8; 1040];
        writer.write(&mut out).unwrap();

        let reread = Object::<C64, LE>::parse(&out).unwrap();
        assert!(reread.section_by_name(".comment").is_none());
        assert_eq!(reread.sections.len(), 5);
        assert_eq!(reread.section_by_name(".symtab").unwrap().offset, 528);
        assert_eq!(reread.section_names, 5);

        // Segment offsets are untouched, containment is preserved, and every
        // LOAD byte outside the rewritten header prefix is preserved exactly.
        assert_eq!(reread.segments[0].offset, 64);
        assert_eq!(reread.segments[1].offset, 0);
        assert_eq!(reread.segments[2].offset, 0x200);
        assert_eq!(reread.section_by_name(".text").unwrap().parent_segment, Some(1));
        assert_eq!(reread.section_by_name(".data").unwrap().parent_segment, Some(2));
        assert_eq!(out[232..0x210], image[232..0x210]);
    }

    #[test]
    fn test_symbols_survive_round_trip() {
        let out = emit(sample());
        let reread = Object::<C64, LE>::parse(&out).unwrap();
        let symtab = reread.section_by_name(".symtab").unwrap();
        assert_eq!(symtab.link, 5);
        assert_eq!(symtab.info, 2);
        let main = symtab.symbol_by_index(2).unwrap();
        assert_eq!(main.name, "main");
        assert_eq!(main.section, SymbolSectionIndex::Section(1));
        assert_eq!(main.value, 0x401110);
    }

    #[test]
    fn test_added_section_lands_after_input_sections() {
        let mut object = sample();
        object.add_section(
            SectionSpec::builder()
                .name(".note.tag")
                .contents(vec![0xaa; 32])
                .align(4)
                .build(),
        );
        let mut writer = ElfWriter::new(object);
        writer.finalize().unwrap();
        let mut out = vec![0u8; writer.total_size().unwrap() as usize];
        writer.write(&mut out).unwrap();

        let reread = Object::<C64, LE>::parse(&out).unwrap();
        let note = reread.section_by_name(".note.tag").unwrap();
        assert_eq!(note.index, 7);
        assert_eq!(note.data.contents().unwrap(), &[0xaa; 32]);
        // Placed behind everything that came from the input.
        assert!(note.offset >= reread.section_by_name(".shstrtab").unwrap().offset);
    }

    #[test]
    fn test_binary_emit_is_load_projection() {
        let image = testimage::sample64le();
        let mut writer = BinaryWriter::new(Object::<C64, LE>::parse(&image).unwrap());
        writer.finalize().unwrap();

        // align_to(len(LOAD0), LOAD1.align) + len(LOAD1); PT_PHDR covers no
        // sections and is dropped.
        assert_eq!(writer.total_size().unwrap(), 0x210);
        let mut out = vec![0u8; 0x210];
        writer.write(&mut out).unwrap();
        assert_eq!(out[..0x200], image[..0x200]);
        assert_eq!(out[0x200..], image[0x200..0x210]);
    }

    #[test]
    fn test_hexagon_reserved_index_round_trip() {
        let image = testimage::hexagon32(164);
        let mut writer = ElfWriter::new(Object::<C32, LE>::parse(&image).unwrap());
        writer.finalize().unwrap();
        let mut out = vec![0u8; writer.total_size().unwrap() as usize];
        writer.write(&mut out).unwrap();

        let reread = Object::<C32, LE>::parse(&out).unwrap();
        let symtab = reread.section_by_name(".symtab").unwrap();
        assert_eq!(
            symtab.symbol_by_index(1).unwrap().section,
            SymbolSectionIndex::HexagonScommon4
        );
    }

    #[test]
    fn test_write_before_finalize_is_an_error() {
        let writer = ElfWriter::new(sample());
        assert_eq!(writer.total_size().unwrap_err(), Error::NotFinalized);
        let mut out = vec![0u8; 4096];
        assert_eq!(writer.write(&mut out).unwrap_err(), Error::NotFinalized);

        let binary = BinaryWriter::new(sample());
        assert_eq!(binary.total_size().unwrap_err(), Error::NotFinalized);
    }

    #[test]
    fn test_undersized_buffer_is_an_error() {
        let mut writer = ElfWriter::new(sample());
        writer.finalize().unwrap();
        let required = writer.total_size().unwrap();
        let mut out = vec![0u8; required as usize - 1];
        assert_eq!(
            writer.write(&mut out).unwrap_err(),
            Error::OutputBufferTooSmall {
                required,
                actual: required - 1,
            }
        );
    }
}
