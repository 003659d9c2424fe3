//! The section model: one common header descriptor shared by a family of
//! section variants.
//!
//! Section kinds are a tagged sum ([`SectionData`]) with the descriptor
//! fields hoisted into [`Section`]; serialization for a specific ELF class
//! lives in the writer, so no variant needs to know the class it will be
//! emitted for.

use bitflags::bitflags;
use typed_builder::TypedBuilder;

use crate::{
    error::{Error, Result},
    strtab::StringTable,
};

pub mod relocation;
pub mod symbol;

use relocation::Relocation;
use symbol::{Symbol, SymbolSectionIndex};

/// Section type (`sh_type`) of the inactive null section at index 0
pub const SHT_NULL: u32 = 0;
/// Section type for program-defined contents
pub const SHT_PROGBITS: u32 = 1;
/// Section type for a link-edit symbol table
pub const SHT_SYMTAB: u32 = 2;
/// Section type for a string table
pub const SHT_STRTAB: u32 = 3;
/// Section type for relocations with explicit addends
pub const SHT_RELA: u32 = 4;
/// Section type for a symbol hash table
pub const SHT_HASH: u32 = 5;
/// Section type for dynamic linking information
pub const SHT_DYNAMIC: u32 = 6;
/// Section type for notes
pub const SHT_NOTE: u32 = 7;
/// Section type for zero-initialized data occupying no file space
pub const SHT_NOBITS: u32 = 8;
/// Section type for relocations without explicit addends
pub const SHT_REL: u32 = 9;
/// Section type for the minimal dynamic-linking symbol table
pub const SHT_DYNSYM: u32 = 11;
/// Section type for the GNU-style symbol hash table
pub const SHT_GNU_HASH: u32 = 0x6fff_fff6;

bitflags! {
    /// Section attribute flags (`sh_flags`). Only the bits the engine
    /// interprets are named; all other bits are retained so that OS- and
    /// processor-specific flags round-trip untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u64 {
        /// The section holds data writable during execution
        const WRITE = 0x1;
        /// The section occupies memory during execution
        const ALLOC = 0x2;
        /// The section holds executable machine instructions
        const EXECINSTR = 0x4;
        /// The section's elements may be merged to eliminate duplication
        const MERGE = 0x10;
        /// The section holds null-terminated strings
        const STRINGS = 0x20;
        /// `sh_info` holds a section table index
        const INFO_LINK = 0x40;
        /// The section must keep its order relative to its linked-to section
        const LINK_ORDER = 0x80;
        /// The section holds thread-local storage
        const TLS = 0x400;

        const _ = !0;
    }
}

/// The variant-specific state of a section: parsed variants own structured
/// entries, opaque variants own the input's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionData {
    /// An opaque byte section. `SHT_NOBITS` sections are held here with no
    /// contents; their advertised size lives in the descriptor.
    Bytes {
        /// The section's bytes, copied from the input
        contents: Vec<u8>,
    },
    /// A non-allocated string table, rebuilt from the names registered
    /// against it rather than carried as bytes
    Strings {
        /// The string table builder backing this section
        table: StringTable,
    },
    /// The link-edit symbol table
    Symbols {
        /// The symbols, in input order. A symbol's position equals its
        /// [`Symbol::index`].
        entries: Vec<Symbol>,
        /// 1-based section index of the symbol-name string table, resolved
        /// from `sh_link`
        names: u32,
    },
    /// A parsed (non-allocated) relocation section, REL or RELA according to
    /// the descriptor type
    Relocations {
        /// The relocation records, in input order
        entries: Vec<Relocation>,
        /// 1-based section index of the symbol table the records reference,
        /// resolved from `sh_link`
        symbols: u32,
        /// 1-based section index of the section the relocations apply to,
        /// resolved from `sh_info` when nonzero
        target: Option<u32>,
    },
    /// An allocated REL/RELA section. Part of the loaded image, so it is
    /// carried as opaque bytes and its link/info fields are emitted verbatim.
    DynamicRelocations {
        /// The section's bytes, copied from the input
        contents: Vec<u8>,
    },
    /// The dynamic-linking symbol table. Opaque bytes (the loaded image must
    /// not change), but its string-table link is tracked so the emitted
    /// `sh_link` survives re-indexing.
    DynamicSymbols {
        /// The section's bytes, copied from the input
        contents: Vec<u8>,
        /// 1-based section index of the linked string table
        names: u32,
    },
    /// The dynamic section. Opaque bytes with a tracked string-table link,
    /// like [`SectionData::DynamicSymbols`].
    Dynamic {
        /// The section's bytes, copied from the input
        contents: Vec<u8>,
        /// 1-based section index of the linked string table
        names: u32,
    },
}

impl SectionData {
    /// The owned bytes of an opaque variant, if this is one
    pub fn contents(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes { contents }
            | Self::DynamicRelocations { contents }
            | Self::DynamicSymbols { contents, .. }
            | Self::Dynamic { contents, .. } => Some(contents),
            _ => None,
        }
    }
}

/// A section of the object: the common header descriptor plus the
/// variant-specific state.
///
/// `index` is 1-based and always equals the section's position in the
/// object's section sequence plus one (the synthetic null section at index 0
/// exists only at emit time). `original_offset` is captured at read and never
/// changes; it anchors segment-relative re-layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// The section's name
    pub name: String,
    /// Offset of the name in the section-name string table (`sh_name`).
    /// Assigned at finalization.
    pub name_index: u32,
    /// The section type (`sh_type`)
    pub r#type: u32,
    /// The section attribute flags (`sh_flags`)
    pub flags: SectionFlags,
    /// The virtual address of the section in memory (`sh_addr`)
    pub addr: u64,
    /// The section's current file offset (`sh_offset`); reassigned by layout
    pub offset: u64,
    /// The file offset the section had in the input. Immutable.
    pub original_offset: u64,
    /// The section's size in bytes (`sh_size`). For sections that carry
    /// bytes this equals the length of the owned bytes; `SHT_NOBITS`
    /// sections advertise a size but own none.
    pub size: u64,
    /// The `sh_link` field, refreshed at finalization for variants that
    /// track their link as a reference
    pub link: u32,
    /// The `sh_info` field, refreshed at finalization for variants that
    /// track it as a reference
    pub info: u32,
    /// The address alignment constraint (`sh_addralign`); 0 and 1 mean
    /// unconstrained
    pub align: u64,
    /// The size of one entry for table-like sections (`sh_entsize`)
    pub entry_size: u64,
    /// The section's 1-based table index
    pub index: u32,
    /// Where the section header will be written. Assigned at finalization.
    pub header_offset: u64,
    /// Zero-based index of the lowest-offset segment wholly containing this
    /// section, if any
    pub parent_segment: Option<usize>,
    /// The variant-specific state
    pub data: SectionData,
}

impl Section {
    /// Register a string with this section's string-table builder and grow
    /// the advertised size to the builder's current (upper-bound) size.
    /// Fails unless the section is a parsed string table.
    pub fn add_string(&mut self, string: &str) -> Result<()> {
        match &mut self.data {
            SectionData::Strings { table } => {
                table.add(string);
                self.size = table.size();
                Ok(())
            }
            _ => Err(Error::NotStringTable {
                index: self.index,
                context: format!("add_string on section '{}'", self.name),
            }),
        }
    }

    /// Append a symbol to this symbol table and return its (stable,
    /// zero-based) index. Fails unless the section is a parsed symbol table.
    pub fn add_symbol(
        &mut self,
        name: &str,
        binding: u8,
        r#type: u8,
        section: SymbolSectionIndex,
        value: u64,
        size: u64,
    ) -> Result<u32> {
        let entry_size = self.entry_size;
        match &mut self.data {
            SectionData::Symbols { entries, .. } => {
                let index = entries.len() as u32;
                entries.push(Symbol {
                    name: name.to_owned(),
                    name_index: 0,
                    binding,
                    r#type,
                    value,
                    size,
                    index,
                    section,
                });
                self.size += entry_size;
                Ok(index)
            }
            _ => Err(Error::NotSymbolTable {
                index: self.index,
                context: format!("add_symbol on section '{}'", self.name),
            }),
        }
    }

    /// Look up a symbol of this symbol table by its zero-based index
    pub fn symbol_by_index(&self, index: u32) -> Result<&Symbol> {
        match &self.data {
            SectionData::Symbols { entries, .. } => entries
                .get(index as usize)
                .ok_or(Error::InvalidSymbolIndex { index }),
            _ => Err(Error::NotSymbolTable {
                index: self.index,
                context: format!("symbol_by_index on section '{}'", self.name),
            }),
        }
    }
}

/// Everything needed to add a new section to an object. Most fields default:
/// a spec with only a name and contents describes an unallocated
/// `SHT_PROGBITS` section, which is what injected sections (notes, build
/// metadata, extracted blobs) nearly always are.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SectionSpec {
    /// The section's name
    #[builder(setter(into))]
    pub name: String,
    /// The section type
    #[builder(default = SHT_PROGBITS)]
    pub r#type: u32,
    /// The section attribute flags
    #[builder(default = SectionFlags::empty())]
    pub flags: SectionFlags,
    /// The virtual address, zero for unallocated sections
    #[builder(default)]
    pub addr: u64,
    /// The section's bytes
    #[builder(default)]
    pub contents: Vec<u8>,
    /// The advertised size. Defaults to the length of `contents`; only
    /// `SHT_NOBITS` sections need to say otherwise.
    #[builder(default, setter(strip_option))]
    pub size: Option<u64>,
    /// The address alignment constraint
    #[builder(default = 1)]
    pub align: u64,
    /// The raw `sh_link` value
    #[builder(default)]
    pub link: u32,
    /// The raw `sh_info` value
    #[builder(default)]
    pub info: u32,
    /// The entry size for table-like sections
    #[builder(default)]
    pub entry_size: u64,
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use symbol::{STB_GLOBAL, STT_OBJECT};

    #[test]
    fn test_flags_retain_unknown_bits() {
        // SHF_MASKPROC bits and other unnamed flags survive a round-trip.
        let raw = 0xf000_0000_0000_0042u64;
        let flags = SectionFlags::from_bits_retain(raw);
        assert_eq!(flags.bits(), raw);
        assert!(flags.contains(SectionFlags::ALLOC));
    }

    #[test]
    fn test_spec_defaults() {
        let spec = SectionSpec::builder()
            .name(".note.mine")
            .contents(vec![1, 2, 3, 4])
            .build();
        assert_eq!(spec.r#type, SHT_PROGBITS);
        assert_eq!(spec.flags, SectionFlags::empty());
        assert_eq!(spec.align, 1);
        assert_eq!(spec.size, None);
    }

    #[test]
    fn test_add_symbol_grows_size() {
        let mut section = Section {
            name: ".symtab".into(),
            name_index: 0,
            r#type: SHT_SYMTAB,
            flags: SectionFlags::empty(),
            addr: 0,
            offset: 0,
            original_offset: 0,
            size: 0,
            link: 0,
            info: 0,
            align: 8,
            entry_size: 24,
            index: 1,
            header_offset: 0,
            parent_segment: None,
            data: SectionData::Symbols {
                entries: Vec::new(),
                names: 0,
            },
        };

        let a = section
            .add_symbol("", symbol::STB_LOCAL, symbol::STT_NOTYPE, SymbolSectionIndex::Undefined, 0, 0)
            .unwrap();
        let b = section
            .add_symbol("x", STB_GLOBAL, STT_OBJECT, SymbolSectionIndex::Absolute, 16, 4)
            .unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(section.size, 48);
        assert_eq!(section.symbol_by_index(1).unwrap().name, "x");
        assert_eq!(
            section.symbol_by_index(2).unwrap_err(),
            Error::InvalidSymbolIndex { index: 2 }
        );
    }

    #[test]
    fn test_add_string_on_wrong_variant() {
        let mut section = Section {
            name: ".text".into(),
            name_index: 0,
            r#type: SHT_PROGBITS,
            flags: SectionFlags::ALLOC | SectionFlags::EXECINSTR,
            addr: 0,
            offset: 0,
            original_offset: 0,
            size: 0,
            link: 0,
            info: 0,
            align: 16,
            entry_size: 0,
            index: 1,
            header_offset: 0,
            parent_segment: None,
            data: SectionData::Bytes {
                contents: Vec::new(),
            },
        };
        assert!(section.add_string("nope").is_err());
    }
}
