//! The object model: the root aggregate owning every section and segment, and
//! the reader that populates it from an ELF image.
//!
//! All cross-references inside the model are non-owning indices resolved
//! through the object: sections refer to each other by 1-based section table
//! index, and sections and segments refer to segments by zero-based program
//! header index. This is how the section↔segment reference cycle is broken.
//! The reader resolves every on-disk `sh_link`/`sh_info`/`st_shndx` into such
//! an index up front, so later mutation and re-layout can renumber the tables
//! and patch every reference in one pass.

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::{
    base::{ElfAddress, ElfByte, ElfClassWord, ElfHalfWord, ElfOffset, ElfWord},
    error::{Error, Result},
    header::{identification::ElfClass, FileHeader},
    section::{
        relocation::Relocation,
        symbol::{Symbol, SymbolSectionIndex, SHN_LORESERVE, SHN_UNDEF},
        Section, SectionData, SectionFlags, SectionSpec, SHT_DYNAMIC, SHT_DYNSYM, SHT_GNU_HASH,
        SHT_HASH, SHT_NOBITS, SHT_REL, SHT_RELA, SHT_STRTAB, SHT_SYMTAB,
    },
    segment::{section_within_segment, segment_overlaps_segment, Segment, SegmentFlags},
    strtab::StringTable,
    FromReader,
};

/// An ELF object held as a mutable in-memory model, decoded for a specific
/// class and data encoding.
///
/// The object exclusively owns its sections, its segments and (through the
/// symbol table section) its symbols. `section_names` and `symbol_table` are
/// non-owning references into the section sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object<const EC: u8, const ED: u8> {
    /// The raw 16 identification bytes, emitted verbatim
    pub ident: [u8; 16],
    /// The object file type (`e_type`)
    pub r#type: u16,
    /// The required architecture (`e_machine`)
    pub machine: u16,
    /// The object file version (`e_version`)
    pub version: u32,
    /// The entry point virtual address (`e_entry`)
    pub entry: u64,
    /// Processor-specific flags (`e_flags`)
    pub flags: u32,
    /// The sections, in table order. A section's 1-based `index` always
    /// equals its position here plus one; the null section at index 0 is
    /// synthesized at emit time only.
    pub sections: Vec<Section>,
    /// The segments, in program header table order
    pub segments: Vec<Segment>,
    /// 1-based index of the section-name string table (from `e_shstrndx`)
    pub section_names: u32,
    /// 1-based index of the symbol table, if the object has one. At most one
    /// per object.
    pub symbol_table: Option<u32>,
    /// Where the section header array will be written. Assigned by layout;
    /// meaningless before `finalize`.
    pub section_header_offset: u64,
}

/// One undecoded section header, used while the section table is being built
/// and for locating raw input ranges that the structured model does not carry
/// (symbol records, the input's string blobs).
struct RawSectionHeader {
    name: u32,
    r#type: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    align: u64,
    entry_size: u64,
}

fn read_section_header<const EC: u8, const ED: u8, R>(reader: &mut R) -> Result<RawSectionHeader>
where
    R: Read + Seek,
{
    Ok(RawSectionHeader {
        name: ElfWord::<EC, ED>::from_reader(reader)?.0,
        r#type: ElfWord::<EC, ED>::from_reader(reader)?.0,
        flags: ElfClassWord::<EC, ED>::from_reader(reader)?.0,
        addr: ElfAddress::<EC, ED>::from_reader(reader)?.0,
        offset: ElfOffset::<EC, ED>::from_reader(reader)?.0,
        size: ElfClassWord::<EC, ED>::from_reader(reader)?.0,
        link: ElfWord::<EC, ED>::from_reader(reader)?.0,
        info: ElfWord::<EC, ED>::from_reader(reader)?.0,
        align: ElfClassWord::<EC, ED>::from_reader(reader)?.0,
        entry_size: ElfClassWord::<EC, ED>::from_reader(reader)?.0,
    })
}

/// A bounds-checked subslice of the input image
fn slice<'data>(data: &'data [u8], offset: u64, size: u64, context: &str) -> Result<&'data [u8]> {
    let start = usize::try_from(offset).map_err(|_| Error::OutOfBounds {
        context: context.to_owned(),
        value: offset,
    })?;
    let len = usize::try_from(size).map_err(|_| Error::OutOfBounds {
        context: context.to_owned(),
        value: size,
    })?;
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| Error::OutOfBounds {
            context: context.to_owned(),
            value: offset,
        })
}

/// Read a null-terminated string out of a string blob
fn read_cstr(blob: &[u8], offset: u32, context: &str) -> Result<String> {
    let tail = blob
        .get(offset as usize..)
        .ok_or_else(|| Error::OutOfBounds {
            context: context.to_owned(),
            value: offset as u64,
        })?;
    let end = tail
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| Error::OutOfBounds {
            context: context.to_owned(),
            value: offset as u64,
        })?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

impl<const EC: u8, const ED: u8> Object<EC, ED> {
    /// Parse an ELF image into a model.
    ///
    /// The identification bytes must name the class and encoding this
    /// instantiation was made for; [`crate::ObjectKind::parse`] dispatches on
    /// them when the combination is not known up front. The input only needs
    /// to outlive this call: the model owns copies of everything it keeps.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let header = FileHeader::<EC, ED>::from_reader(&mut cursor)?;

        if header.identifier.class as u8 != EC || header.identifier.data_encoding as u8 != ED {
            return Err(Error::InvalidClassEncodingPair {
                class: header.identifier.class as u8,
                encoding: header.identifier.data_encoding as u8,
            });
        }

        let mut object = Self {
            ident: header.identifier.bytes(),
            r#type: header.r#type.0,
            machine: header.machine.0,
            version: header.version.0,
            entry: header.entry.0,
            flags: header.flags.0,
            sections: Vec::new(),
            segments: Vec::new(),
            section_names: 0,
            symbol_table: None,
            section_header_offset: 0,
        };

        object.read_sections(data, &header)?;
        object.read_program_headers(data, &header)?;

        let shstrndx = header.section_name_string_table_index.0 as u32;
        let names = object.section(shstrndx, "e_shstrndx")?;
        if !matches!(names.data, SectionData::Strings { .. }) {
            return Err(Error::NotStringTable {
                index: shstrndx,
                context: "e_shstrndx".to_owned(),
            });
        }
        object.section_names = shstrndx;

        Ok(object)
    }

    /// Checked 1-based lookup into the section table. Index 0 (`SHN_UNDEF`)
    /// is never a valid reference.
    pub fn section(&self, index: u32, context: &str) -> Result<&Section> {
        if index == SHN_UNDEF as u32 || index as usize > self.sections.len() {
            return Err(Error::InvalidSectionIndex {
                index,
                context: context.to_owned(),
            });
        }
        Ok(&self.sections[index as usize - 1])
    }

    /// Checked mutable 1-based lookup into the section table
    pub fn section_mut(&mut self, index: u32, context: &str) -> Result<&mut Section> {
        if index == SHN_UNDEF as u32 || index as usize > self.sections.len() {
            return Err(Error::InvalidSectionIndex {
                index,
                context: context.to_owned(),
            });
        }
        Ok(&mut self.sections[index as usize - 1])
    }

    /// The first section with the given name, if any
    pub fn section_by_name(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|sec| sec.name == name)
    }

    /// Walk the section header table once, constructing a section variant per
    /// header according to its type, then resolve the cross-references that
    /// need every section to exist (symbol table first, since relocations
    /// reference its entries).
    fn read_sections(&mut self, data: &[u8], header: &FileHeader<EC, ED>) -> Result<()> {
        let count = header.section_header_entry_count.0 as u64;
        if count == 0 {
            return Ok(());
        }
        if header.section_header_entry_size.0 as usize != FileHeader::<EC, ED>::SECTION_HEADER_SIZE
        {
            return Err(Error::OutOfBounds {
                context: "e_shentsize".to_owned(),
                value: header.section_header_entry_size.0 as u64,
            });
        }

        let mut cursor = Cursor::new(data);
        cursor.seek(SeekFrom::Start(header.section_header_offset.0))?;
        let mut raws = Vec::with_capacity(count as usize);
        for _ in 0..count {
            raws.push(read_section_header::<EC, ED, _>(&mut cursor)?);
        }

        let shstrndx = header.section_name_string_table_index.0 as usize;
        let names_raw = raws.get(shstrndx).ok_or(Error::InvalidSectionIndex {
            index: shstrndx as u32,
            context: "e_shstrndx".to_owned(),
        })?;
        let names_blob = slice(data, names_raw.offset, names_raw.size, "e_shstrndx contents")?;

        for (position, raw) in raws.iter().enumerate().skip(1) {
            let index = position as u32;
            let name = read_cstr(names_blob, raw.name, "sh_name")?;
            let section = self.make_section(data, raw, index, name)?;
            self.sections.push(section);
        }

        if let Some(table) = self.symbol_table {
            self.init_symbol_table(data, &raws, table)?;
        }

        for position in 0..self.sections.len() {
            let index = position as u32 + 1;
            if self.symbol_table == Some(index) {
                continue;
            }
            self.init_section(data, &raws, index)?;
        }

        Ok(())
    }

    /// Construct the right section variant for one header. Allocated string
    /// and relocation tables are part of the loaded image and stay opaque;
    /// hash tables stay opaque because they describe a dynamic symbol table
    /// this engine never alters.
    fn make_section(
        &mut self,
        data: &[u8],
        raw: &RawSectionHeader,
        index: u32,
        name: String,
    ) -> Result<Section> {
        let flags = SectionFlags::from_bits_retain(raw.flags);
        let contents = |context: &str| -> Result<Vec<u8>> {
            Ok(slice(data, raw.offset, raw.size, context)?.to_vec())
        };

        let mut entry_size = raw.entry_size;
        let data = match raw.r#type {
            SHT_REL | SHT_RELA => {
                if flags.contains(SectionFlags::ALLOC) {
                    SectionData::DynamicRelocations {
                        contents: contents(&name)?,
                    }
                } else {
                    entry_size = if raw.r#type == SHT_REL {
                        Relocation::rel_entry_size(EC)
                    } else {
                        Relocation::rela_entry_size(EC)
                    };
                    SectionData::Relocations {
                        entries: Vec::new(),
                        symbols: 0,
                        target: None,
                    }
                }
            }
            SHT_STRTAB => {
                if flags.contains(SectionFlags::ALLOC) {
                    // An allocated string table is part of the memory image
                    // and must not be repacked.
                    SectionData::Bytes {
                        contents: contents(&name)?,
                    }
                } else {
                    SectionData::Strings {
                        table: StringTable::new(),
                    }
                }
            }
            SHT_HASH | SHT_GNU_HASH => SectionData::Bytes {
                contents: contents(&name)?,
            },
            SHT_DYNSYM => SectionData::DynamicSymbols {
                contents: contents(&name)?,
                names: 0,
            },
            SHT_DYNAMIC => SectionData::Dynamic {
                contents: contents(&name)?,
                names: 0,
            },
            SHT_SYMTAB => {
                if self.symbol_table.is_some() {
                    return Err(Error::MultipleSymbolTables);
                }
                self.symbol_table = Some(index);
                entry_size = Symbol::entry_size(EC);
                SectionData::Symbols {
                    entries: Vec::new(),
                    names: 0,
                }
            }
            SHT_NOBITS => SectionData::Bytes {
                contents: Vec::new(),
            },
            _ => SectionData::Bytes {
                contents: contents(&name)?,
            },
        };

        Ok(Section {
            name,
            name_index: raw.name,
            r#type: raw.r#type,
            flags,
            addr: raw.addr,
            offset: raw.offset,
            original_offset: raw.offset,
            size: raw.size,
            link: raw.link,
            info: raw.info,
            align: raw.align,
            entry_size,
            index,
            header_offset: 0,
            parent_segment: None,
            data,
        })
    }

    /// Resolve the symbol table's string table from its link and load its
    /// entries from the input, validating every `st_shndx` on the way
    fn init_symbol_table(
        &mut self,
        data: &[u8],
        raws: &[RawSectionHeader],
        table: u32,
    ) -> Result<()> {
        let position = table as usize - 1;
        let link = self.sections[position].link;
        let table_name = self.sections[position].name.clone();
        let context = format!("sh_link of '{table_name}'");

        let names = self.section(link, &context)?;
        if !matches!(names.data, SectionData::Strings { .. }) {
            return Err(Error::NotStringTable {
                index: link,
                context,
            });
        }
        if let SectionData::Symbols { names, .. } = &mut self.sections[position].data {
            *names = link;
        }

        let names_raw = &raws[link as usize];
        let names_blob = slice(data, names_raw.offset, names_raw.size, &context)?;

        let raw = &raws[table as usize];
        let entry_size = Symbol::entry_size(EC);
        let count = raw.size / entry_size;
        // The advertised size is rebuilt by add_symbol as entries load.
        self.sections[position].size = 0;

        let mut cursor = Cursor::new(data);
        cursor.seek(SeekFrom::Start(raw.offset))?;
        for _ in 0..count {
            // The on-disk field order differs between the classes.
            let (name, value, size, info, shndx) = if EC == ElfClass::ELF_CLASS_32 {
                let name = ElfWord::<EC, ED>::from_reader(&mut cursor)?.0;
                let value = ElfAddress::<EC, ED>::from_reader(&mut cursor)?.0;
                let size = ElfClassWord::<EC, ED>::from_reader(&mut cursor)?.0;
                let info = ElfByte::from_reader(&mut cursor)?.0;
                let _other = ElfByte::from_reader(&mut cursor)?;
                let shndx = ElfHalfWord::<EC, ED>::from_reader(&mut cursor)?.0;
                (name, value, size, info, shndx)
            } else {
                let name = ElfWord::<EC, ED>::from_reader(&mut cursor)?.0;
                let info = ElfByte::from_reader(&mut cursor)?.0;
                let _other = ElfByte::from_reader(&mut cursor)?;
                let shndx = ElfHalfWord::<EC, ED>::from_reader(&mut cursor)?.0;
                let value = ElfAddress::<EC, ED>::from_reader(&mut cursor)?.0;
                let size = ElfClassWord::<EC, ED>::from_reader(&mut cursor)?.0;
                (name, value, size, info, shndx)
            };

            let name = read_cstr(names_blob, name, "st_name")?;
            let section = if shndx >= SHN_LORESERVE {
                SymbolSectionIndex::from_reserved(shndx, self.machine).ok_or(
                    Error::InvalidReservedSectionIndex {
                        name: name.clone(),
                        shndx,
                    },
                )?
            } else if shndx != SHN_UNDEF {
                self.section(shndx as u32, &format!("st_shndx of symbol '{name}'"))?;
                SymbolSectionIndex::Section(shndx as u32)
            } else {
                SymbolSectionIndex::Undefined
            };

            let (binding, r#type) = Symbol::split_info(info);
            self.sections[position].add_symbol(&name, binding, r#type, section, value, size)?;
        }

        Ok(())
    }

    /// Resolve one section's link/info references and, for parsed relocation
    /// sections, load its records from the input
    fn init_section(&mut self, data: &[u8], raws: &[RawSectionHeader], index: u32) -> Result<()> {
        enum Kind {
            Relocations,
            WithStringTable,
            Other,
        }

        let position = index as usize - 1;
        let (link, info, name, kind) = {
            let sec = &self.sections[position];
            let kind = match &sec.data {
                SectionData::Relocations { .. } => Kind::Relocations,
                SectionData::DynamicSymbols { .. } | SectionData::Dynamic { .. } => {
                    Kind::WithStringTable
                }
                _ => Kind::Other,
            };
            (sec.link, sec.info, sec.name.clone(), kind)
        };

        match kind {
            Kind::Relocations => {
                let context = format!("sh_link of '{name}'");
                let symbol_count = match &self.section(link, &context)?.data {
                    SectionData::Symbols { entries, .. } => entries.len() as u32,
                    _ => {
                        return Err(Error::NotSymbolTable {
                            index: link,
                            context,
                        })
                    }
                };
                let target = if info != 0 {
                    self.section(info, &format!("sh_info of '{name}'"))?;
                    Some(info)
                } else {
                    None
                };

                let raw = &raws[index as usize];
                let with_addend = raw.r#type == SHT_RELA;
                let entry_size = if with_addend {
                    Relocation::rela_entry_size(EC)
                } else {
                    Relocation::rel_entry_size(EC)
                };
                let count = raw.size / entry_size;

                let mut entries = Vec::with_capacity(count as usize);
                let mut cursor = Cursor::new(data);
                cursor.seek(SeekFrom::Start(raw.offset))?;
                for _ in 0..count {
                    let offset = ElfAddress::<EC, ED>::from_reader(&mut cursor)?.0;
                    let packed = ElfClassWord::<EC, ED>::from_reader(&mut cursor)?.0;
                    let addend = if with_addend {
                        ElfClassWord::<EC, ED>::from_reader(&mut cursor)?.0
                    } else {
                        0
                    };
                    let (symbol, r#type) = Relocation::split_info(EC, packed);
                    if symbol >= symbol_count {
                        return Err(Error::InvalidSymbolIndex { index: symbol });
                    }
                    entries.push(Relocation {
                        offset,
                        addend,
                        r#type,
                        symbol,
                    });
                }

                if let SectionData::Relocations {
                    entries: stored,
                    symbols,
                    target: stored_target,
                } = &mut self.sections[position].data
                {
                    *stored = entries;
                    *symbols = link;
                    *stored_target = target;
                }
            }
            Kind::WithStringTable => {
                let context = format!("sh_link of '{name}'");
                let linked = self.section(link, &context)?;
                if linked.r#type != SHT_STRTAB {
                    return Err(Error::NotStringTable {
                        index: link,
                        context,
                    });
                }
                match &mut self.sections[position].data {
                    SectionData::DynamicSymbols { names, .. }
                    | SectionData::Dynamic { names, .. } => *names = link,
                    _ => {}
                }
            }
            Kind::Other => {}
        }

        Ok(())
    }

    /// Read the program header table. Each segment copies its whole input
    /// byte range; then sections are matched into segments by containment and
    /// segments into parent segments by start-offset containment.
    fn read_program_headers(&mut self, data: &[u8], header: &FileHeader<EC, ED>) -> Result<()> {
        let count = header.program_header_entry_count.0 as u64;
        if count == 0 {
            return Ok(());
        }
        if header.program_header_entry_size.0 as usize != FileHeader::<EC, ED>::PROGRAM_HEADER_SIZE
        {
            return Err(Error::OutOfBounds {
                context: "e_phentsize".to_owned(),
                value: header.program_header_entry_size.0 as u64,
            });
        }

        let mut cursor = Cursor::new(data);
        cursor.seek(SeekFrom::Start(header.program_header_offset.0))?;
        for index in 0..count {
            // The on-disk field order differs between the classes.
            let (r#type, flags, offset, vaddr, paddr, file_size, mem_size, align) =
                if EC == ElfClass::ELF_CLASS_32 {
                    let r#type = ElfWord::<EC, ED>::from_reader(&mut cursor)?.0;
                    let offset = ElfOffset::<EC, ED>::from_reader(&mut cursor)?.0;
                    let vaddr = ElfAddress::<EC, ED>::from_reader(&mut cursor)?.0;
                    let paddr = ElfAddress::<EC, ED>::from_reader(&mut cursor)?.0;
                    let file_size = ElfClassWord::<EC, ED>::from_reader(&mut cursor)?.0;
                    let mem_size = ElfClassWord::<EC, ED>::from_reader(&mut cursor)?.0;
                    let flags = ElfWord::<EC, ED>::from_reader(&mut cursor)?.0;
                    let align = ElfClassWord::<EC, ED>::from_reader(&mut cursor)?.0;
                    (r#type, flags, offset, vaddr, paddr, file_size, mem_size, align)
                } else {
                    let r#type = ElfWord::<EC, ED>::from_reader(&mut cursor)?.0;
                    let flags = ElfWord::<EC, ED>::from_reader(&mut cursor)?.0;
                    let offset = ElfOffset::<EC, ED>::from_reader(&mut cursor)?.0;
                    let vaddr = ElfAddress::<EC, ED>::from_reader(&mut cursor)?.0;
                    let paddr = ElfAddress::<EC, ED>::from_reader(&mut cursor)?.0;
                    let file_size = ElfClassWord::<EC, ED>::from_reader(&mut cursor)?.0;
                    let mem_size = ElfClassWord::<EC, ED>::from_reader(&mut cursor)?.0;
                    let align = ElfClassWord::<EC, ED>::from_reader(&mut cursor)?.0;
                    (r#type, flags, offset, vaddr, paddr, file_size, mem_size, align)
                };

            let mut segment = Segment {
                r#type,
                flags: SegmentFlags::from_bits_retain(flags),
                offset,
                original_offset: offset,
                vaddr,
                paddr,
                file_size,
                mem_size,
                align,
                index: index as u32,
                contents: slice(data, offset, file_size, "p_offset")?.to_vec(),
                parent_segment: None,
                sections: Vec::new(),
            };

            let segment_position = self.segments.len();
            for section_position in 0..self.sections.len() {
                if section_within_segment(&self.sections[section_position], &segment) {
                    segment.sections.push(section_position as u32 + 1);
                    let replace = match self.sections[section_position].parent_segment {
                        None => true,
                        Some(current) => self.segments[current].offset > segment.offset,
                    };
                    if replace {
                        self.sections[section_position].parent_segment = Some(segment_position);
                    }
                }
            }

            self.segments.push(segment);
        }

        // An O(n^2) pass matching segments to their canonical parent: the
        // containing segment with the lowest original offset, ties broken by
        // the lower program header index.
        for child in 0..self.segments.len() {
            let mut best: Option<usize> = None;
            for parent in 0..self.segments.len() {
                if parent == child
                    || !segment_overlaps_segment(&self.segments[child], &self.segments[parent])
                {
                    continue;
                }
                best = match best {
                    None => Some(parent),
                    Some(current) => {
                        let current_key = (
                            self.segments[current].original_offset,
                            self.segments[current].index,
                        );
                        let candidate_key = (
                            self.segments[parent].original_offset,
                            self.segments[parent].index,
                        );
                        if candidate_key < current_key {
                            Some(parent)
                        } else {
                            Some(current)
                        }
                    }
                };
            }
            self.segments[child].parent_segment = best;
        }

        Ok(())
    }

    /// Append a new opaque-byte section and return its 1-based index.
    ///
    /// Added sections have no original offset, so layout places them after
    /// everything that came from the input. Adding sections after `finalize`
    /// is undefined.
    pub fn add_section(&mut self, spec: SectionSpec) -> u32 {
        let index = self.sections.len() as u32 + 1;
        let size = spec.size.unwrap_or(spec.contents.len() as u64);
        self.sections.push(Section {
            name: spec.name,
            name_index: 0,
            r#type: spec.r#type,
            flags: spec.flags,
            addr: spec.addr,
            offset: 0,
            original_offset: u64::MAX,
            size,
            link: spec.link,
            info: spec.info,
            align: spec.align,
            entry_size: spec.entry_size,
            index,
            header_offset: 0,
            parent_segment: None,
            data: SectionData::Bytes {
                contents: spec.contents,
            },
        });
        index
    }

    /// Remove every section the predicate matches, renumbering the survivors
    /// and patching every stored cross-reference.
    ///
    /// Fails without modifying the object if a removed section is still
    /// referenced: by the ELF header as the section-name table, by a kept
    /// symbol table as its string table, by a kept symbol as its defining
    /// section, or by a kept relocation section as its symbol table or
    /// target.
    pub fn remove_sections<F>(&mut self, mut predicate: F) -> Result<()>
    where
        F: FnMut(&Section) -> bool,
    {
        let mut map = vec![0u32; self.sections.len() + 1];
        let mut next = 1u32;
        for section in &self.sections {
            if !predicate(section) {
                map[section.index as usize] = next;
                next += 1;
            }
        }

        let removed_name = |index: u32| -> String {
            index
                .checked_sub(1)
                .and_then(|position| self.sections.get(position as usize))
                .map(|sec| sec.name.clone())
                .unwrap_or_default()
        };

        if map[self.section_names as usize] == 0 {
            return Err(Error::StillReferenced {
                name: removed_name(self.section_names),
                referrer: "e_shstrndx".to_owned(),
            });
        }

        for section in &self.sections {
            if map[section.index as usize] == 0 {
                continue;
            }
            match &section.data {
                SectionData::Symbols { entries, names } => {
                    if map[*names as usize] == 0 {
                        return Err(Error::StillReferenced {
                            name: removed_name(*names),
                            referrer: section.name.clone(),
                        });
                    }
                    for symbol in entries {
                        if let SymbolSectionIndex::Section(defined_in) = symbol.section {
                            if map[defined_in as usize] == 0 {
                                return Err(Error::StillReferenced {
                                    name: removed_name(defined_in),
                                    referrer: format!("symbol '{}'", symbol.name),
                                });
                            }
                        }
                    }
                }
                SectionData::Relocations {
                    symbols, target, ..
                } => {
                    if map[*symbols as usize] == 0 {
                        return Err(Error::StillReferenced {
                            name: removed_name(*symbols),
                            referrer: section.name.clone(),
                        });
                    }
                    if let Some(target) = target {
                        if map[*target as usize] == 0 {
                            return Err(Error::StillReferenced {
                                name: removed_name(*target),
                                referrer: section.name.clone(),
                            });
                        }
                    }
                }
                SectionData::DynamicSymbols { names, .. } | SectionData::Dynamic { names, .. } => {
                    if map[*names as usize] == 0 {
                        return Err(Error::StillReferenced {
                            name: removed_name(*names),
                            referrer: section.name.clone(),
                        });
                    }
                }
                _ => {}
            }
        }

        if let Some(table) = self.symbol_table {
            if map[table as usize] == 0 {
                self.symbol_table = None;
            }
        }

        self.apply_section_map(&map)
    }

    /// Renumber the section table according to `map` (old 1-based index →
    /// new 1-based index, 0 meaning removed) and patch every stored
    /// reference. Callers must have verified that no kept reference maps to
    /// 0.
    pub(crate) fn apply_section_map(&mut self, map: &[u32]) -> Result<()> {
        fn lookup(map: &[u32], index: u32, context: &str) -> Result<u32> {
            map.get(index as usize)
                .copied()
                .filter(|mapped| *mapped != 0)
                .ok_or_else(|| Error::InvalidSectionIndex {
                    index,
                    context: context.to_owned(),
                })
        }

        self.sections.retain(|sec| map[sec.index as usize] != 0);

        for section in &mut self.sections {
            section.index = lookup(map, section.index, "section index")?;
            match &mut section.data {
                SectionData::Symbols { entries, names } => {
                    *names = lookup(map, *names, "symbol table string table")?;
                    for symbol in entries {
                        if let SymbolSectionIndex::Section(defined_in) = &mut symbol.section {
                            *defined_in = lookup(map, *defined_in, "symbol defining section")?;
                        }
                    }
                }
                SectionData::Relocations {
                    symbols, target, ..
                } => {
                    *symbols = lookup(map, *symbols, "relocation symbol table")?;
                    if let Some(target) = target {
                        *target = lookup(map, *target, "relocation target")?;
                    }
                }
                SectionData::DynamicSymbols { names, .. } | SectionData::Dynamic { names, .. } => {
                    *names = lookup(map, *names, "dynamic string table")?;
                }
                _ => {}
            }
        }

        self.section_names = lookup(map, self.section_names, "e_shstrndx")?;
        if let Some(table) = self.symbol_table {
            self.symbol_table = Some(lookup(map, table, "symbol table")?);
        }

        for segment in &mut self.segments {
            segment.sections.retain(|index| map[*index as usize] != 0);
            for index in &mut segment.sections {
                *index = lookup(map, *index, "segment member")?;
            }
        }

        Ok(())
    }

    /// Remove every symbol the predicate matches, renumbering the survivors
    /// and patching relocation references. The null symbol at index 0 is
    /// never removed; removing a symbol some relocation still names is an
    /// error.
    pub fn remove_symbols<F>(&mut self, mut predicate: F) -> Result<()>
    where
        F: FnMut(&Symbol) -> bool,
    {
        let Some(table) = self.symbol_table else {
            return Ok(());
        };
        let position = table as usize - 1;

        let map = match &self.sections[position].data {
            SectionData::Symbols { entries, .. } => {
                let mut map = vec![u32::MAX; entries.len()];
                let mut next = 0u32;
                for (index, symbol) in entries.iter().enumerate() {
                    if index == 0 || !predicate(symbol) {
                        map[index] = next;
                        next += 1;
                    }
                }
                map
            }
            _ => {
                return Err(Error::NotSymbolTable {
                    index: table,
                    context: "symbol_table".to_owned(),
                })
            }
        };

        for section in &self.sections {
            if let SectionData::Relocations { entries, .. } = &section.data {
                for relocation in entries {
                    if map
                        .get(relocation.symbol as usize)
                        .map(|mapped| *mapped == u32::MAX)
                        .unwrap_or(true)
                    {
                        let name = self.sections[position]
                            .symbol_by_index(relocation.symbol)
                            .map(|symbol| symbol.name.clone())
                            .unwrap_or_default();
                        return Err(Error::StillReferenced {
                            name,
                            referrer: section.name.clone(),
                        });
                    }
                }
            }
        }

        let entry_size = self.sections[position].entry_size;
        if let SectionData::Symbols { entries, .. } = &mut self.sections[position].data {
            let old = std::mem::take(entries);
            for (index, mut symbol) in old.into_iter().enumerate() {
                if map[index] != u32::MAX {
                    symbol.index = map[index];
                    entries.push(symbol);
                }
            }
        }
        // Recompute the advertised size from the surviving entry count.
        let count = match &self.sections[position].data {
            SectionData::Symbols { entries, .. } => entries.len() as u64,
            _ => 0,
        };
        self.sections[position].size = count * entry_size;

        for section in &mut self.sections {
            if let SectionData::Relocations { entries, .. } = &mut section.data {
                for relocation in entries {
                    relocation.symbol = map[relocation.symbol as usize];
                }
            }
        }

        Ok(())
    }
}


#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::testimage;
    use super::*;
    use crate::header::identification::ElfDataEncoding;
    use crate::section::{symbol::STB_GLOBAL, SHT_PROGBITS, SHT_SYMTAB};

    const C64: u8 = ElfClass::ELF_CLASS_64;
    const LE: u8 = ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN;

    fn sample() -> Object<C64, LE> {
        Object::parse(&testimage::sample64le()).unwrap()
    }

    #[test]
    fn test_reads_header_fields() {
        let object = sample();
        assert_eq!(object.r#type, 2);
        assert_eq!(object.machine, 62);
        assert_eq!(object.entry, 0x401100);
        assert_eq!(object.sections.len(), 6);
        assert_eq!(object.segments.len(), 3);
        assert_eq!(object.section_names, 6);
        assert_eq!(object.symbol_table, Some(4));
    }

    #[test]
    fn test_section_descriptors() {
        let object = sample();
        let text = object.section_by_name(".text").unwrap();
        assert_eq!(text.index, 1);
        assert_eq!(text.r#type, SHT_PROGBITS);
        assert!(text
            .flags
            .contains(SectionFlags::ALLOC | SectionFlags::EXECINSTR));
        assert_eq!(text.original_offset, 256);
        assert_eq!(text.size, 128);
        assert_eq!(text.align, 16);
        assert_eq!(
            text.data.contents().unwrap(),
            (0..128u32)
                .map(|i| (i as u8).wrapping_mul(3))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_section_parents_and_members() {
        let object = sample();
        // .text belongs to the text LOAD, .data to the data LOAD, .comment to
        // no segment.
        assert_eq!(object.section_by_name(".text").unwrap().parent_segment, Some(1));
        assert_eq!(object.section_by_name(".data").unwrap().parent_segment, Some(2));
        assert_eq!(object.section_by_name(".comment").unwrap().parent_segment, None);
        assert_eq!(object.segments[0].sections, Vec::<u32>::new());
        assert_eq!(object.segments[1].sections, vec![1]);
        assert_eq!(object.segments[2].sections, vec![2]);
    }

    #[test]
    fn test_segment_parents() {
        let object = sample();
        // PT_PHDR starts inside the first LOAD; the LOADs are disjoint.
        assert_eq!(object.segments[0].parent_segment, Some(1));
        assert_eq!(object.segments[1].parent_segment, None);
        assert_eq!(object.segments[2].parent_segment, None);
    }

    #[test]
    fn test_reads_symbols() {
        let object = sample();
        let symtab = object.section_by_name(".symtab").unwrap();
        let null = symtab.symbol_by_index(0).unwrap();
        assert_eq!(null.name, "");
        assert_eq!(null.section, SymbolSectionIndex::Undefined);

        let local = symtab.symbol_by_index(1).unwrap();
        assert_eq!(local.name, "local_a");
        assert_eq!(local.binding, crate::section::symbol::STB_LOCAL);
        assert_eq!(local.section, SymbolSectionIndex::Section(1));
        assert_eq!(local.value, 0x401100);

        let main = symtab.symbol_by_index(2).unwrap();
        assert_eq!(main.name, "main");
        assert_eq!(main.binding, STB_GLOBAL);
        assert_eq!(main.size, 0x20);
    }

    #[test]
    fn test_segment_contents_cover_whole_range() {
        let object = sample();
        let image = testimage::sample64le();
        assert_eq!(object.segments[1].contents, image[0..0x200]);
        assert_eq!(object.segments[2].contents, image[0x200..0x210]);
    }

    #[test]
    fn test_rejects_second_symbol_table() {
        let mut image = testimage::sample64le();
        // Retype .comment's header to SHT_SYMTAB.
        let comment_shdr = 680 + 3 * 64;
        image[comment_shdr + 4..comment_shdr + 8].copy_from_slice(&SHT_SYMTAB.to_le_bytes());
        assert_eq!(
            Object::<C64, LE>::parse(&image).unwrap_err(),
            Error::MultipleSymbolTables
        );
    }

    #[test]
    fn test_rejects_reserved_index_for_wrong_machine() {
        assert!(Object::<
            { ElfClass::ELF_CLASS_32 },
            { ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN },
        >::parse(&testimage::hexagon32(164))
        .is_ok());

        let err = Object::<
            { ElfClass::ELF_CLASS_32 },
            { ElfDataEncoding::ELF_DATA_ENCODING_LITTLE_ENDIAN },
        >::parse(&testimage::hexagon32(62))
        .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidReservedSectionIndex {
                name: "gp_var".to_owned(),
                shndx: 0xff03,
            }
        );
    }

    #[test]
    fn test_remove_section_renumbers_and_remaps() {
        let mut object = sample();
        object.remove_sections(|sec| sec.name == ".comment").unwrap();

        assert_eq!(object.sections.len(), 5);
        assert!(object.section_by_name(".comment").is_none());
        // Everything after .comment shifted down by one, and the references
        // followed.
        assert_eq!(object.section_by_name(".symtab").unwrap().index, 3);
        assert_eq!(object.symbol_table, Some(3));
        assert_eq!(object.section_names, 5);
        match &object.section_by_name(".symtab").unwrap().data {
            SectionData::Symbols { names, entries } => {
                assert_eq!(*names, 4);
                assert_eq!(entries[2].section, SymbolSectionIndex::Section(1));
            }
            _ => panic!("symtab lost its variant"),
        }
    }

    #[test]
    fn test_remove_referenced_section_fails() {
        let mut object = sample();
        let err = object
            .remove_sections(|sec| sec.name == ".strtab")
            .unwrap_err();
        assert_eq!(
            err,
            Error::StillReferenced {
                name: ".strtab".to_owned(),
                referrer: ".symtab".to_owned(),
            }
        );

        let err = object
            .remove_sections(|sec| sec.name == ".shstrtab")
            .unwrap_err();
        assert_eq!(
            err,
            Error::StillReferenced {
                name: ".shstrtab".to_owned(),
                referrer: "e_shstrndx".to_owned(),
            }
        );

        // .text defines symbols, so it cannot go while they stay.
        let err = object
            .remove_sections(|sec| sec.name == ".text")
            .unwrap_err();
        assert_eq!(
            err,
            Error::StillReferenced {
                name: ".text".to_owned(),
                referrer: "symbol 'local_a'".to_owned(),
            }
        );
    }

    #[test]
    fn test_remove_symbols_keeps_null_and_renumbers() {
        let mut object = sample();
        object.remove_symbols(|sym| sym.name == "local_a").unwrap();

        let symtab = object.section_by_name(".symtab").unwrap();
        assert_eq!(symtab.size, 48);
        match &symtab.data {
            SectionData::Symbols { entries, .. } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[1].name, "main");
                assert_eq!(entries[1].index, 1);
            }
            _ => panic!("symtab lost its variant"),
        }

        // The null symbol survives even a match-everything predicate.
        let mut object = sample();
        object.remove_symbols(|_| true).unwrap();
        match &object.section_by_name(".symtab").unwrap().data {
            SectionData::Symbols { entries, .. } => assert_eq!(entries.len(), 1),
            _ => panic!("symtab lost its variant"),
        }
    }

    #[test]
    fn test_add_section_appends() {
        let mut object = sample();
        let index = object.add_section(
            SectionSpec::builder()
                .name(".note.tag")
                .contents(vec![1, 2, 3, 4, 5])
                .build(),
        );
        assert_eq!(index, 7);
        let added = object.section_by_name(".note.tag").unwrap();
        assert_eq!(added.size, 5);
        assert_eq!(added.original_offset, u64::MAX);
    }
}
