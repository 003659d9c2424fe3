//! The segment (program header) model.
//!
//! Segments are the loader's view of the file. Each one owns a copy of its
//! entire input byte range, interstitial bytes included, so that re-emission
//! can reproduce the loaded image exactly no matter what happened to sections
//! outside it.

use bitflags::bitflags;

use crate::section::Section;

/// Segment type (`p_type`) of an unused entry
pub const PT_NULL: u32 = 0;
/// Segment type for a loadable segment
pub const PT_LOAD: u32 = 1;
/// Segment type for dynamic linking information
pub const PT_DYNAMIC: u32 = 2;
/// Segment type for the interpreter path
pub const PT_INTERP: u32 = 3;
/// Segment type for auxiliary information
pub const PT_NOTE: u32 = 4;
/// Segment type locating the program header table itself
pub const PT_PHDR: u32 = 6;
/// Segment type for the thread-local storage template
pub const PT_TLS: u32 = 7;

bitflags! {
    /// Segment permission flags (`p_flags`). Unknown bits are retained.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SegmentFlags: u32 {
        /// Execute permission
        const X = 0x1;
        /// Write permission
        const W = 0x2;
        /// Read permission
        const R = 0x4;

        const _ = !0;
    }
}

/// One program header entry and the file range it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// The segment type (`p_type`)
    pub r#type: u32,
    /// The segment permission flags (`p_flags`)
    pub flags: SegmentFlags,
    /// The segment's current file offset (`p_offset`); reassigned by layout
    pub offset: u64,
    /// The file offset the segment had in the input. Immutable.
    pub original_offset: u64,
    /// The virtual address of the segment in memory (`p_vaddr`)
    pub vaddr: u64,
    /// The physical address of the segment (`p_paddr`)
    pub paddr: u64,
    /// The number of bytes the segment occupies in the file (`p_filesz`)
    pub file_size: u64,
    /// The number of bytes the segment occupies in memory (`p_memsz`)
    pub mem_size: u64,
    /// The alignment constraint (`p_align`); 0 and 1 mean unconstrained
    pub align: u64,
    /// Zero-based position of this entry in the program header table
    pub index: u32,
    /// The entire byte range `[original_offset, original_offset + file_size)`
    /// of the input, interstitial bytes included
    pub contents: Vec<u8>,
    /// Zero-based index of the canonical containing segment, if any: the
    /// lowest-offset segment whose file range covers this segment's start,
    /// ties broken by the lower program header index
    pub parent_segment: Option<usize>,
    /// 1-based section table indices of every section wholly inside this
    /// segment
    pub sections: Vec<u32>,
}

impl Segment {
    /// Whether this segment survives binary emission: GNU objcopy only
    /// outputs loadable segments that cover at least one section, and the
    /// binary writer matches that.
    pub fn is_loadable_with_sections(&self) -> bool {
        self.r#type == PT_LOAD && !self.sections.is_empty()
    }
}

/// Whether `section` lies wholly inside `segment`'s file range.
///
/// An empty section is treated as if it had size 1: an empty section sitting
/// exactly on the boundary between two adjacent segments belongs to the
/// second one, not the first.
pub fn section_within_segment(section: &Section, segment: &Segment) -> bool {
    let section_size = section.size.max(1);
    segment.offset <= section.original_offset
        && segment.offset + segment.file_size >= section.original_offset + section_size
}

/// Whether `child`'s original offset falls inside `parent`'s file range.
/// Every segment trivially satisfies this against itself; callers exclude the
/// identity pair.
pub fn segment_overlaps_segment(child: &Segment, parent: &Segment) -> bool {
    parent.original_offset <= child.original_offset
        && parent.original_offset + parent.file_size > child.original_offset
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::section::{SectionData, SectionFlags, SHT_PROGBITS};

    fn section_at(offset: u64, size: u64) -> Section {
        Section {
            name: ".s".into(),
            name_index: 0,
            r#type: SHT_PROGBITS,
            flags: SectionFlags::ALLOC,
            addr: 0,
            offset,
            original_offset: offset,
            size,
            link: 0,
            info: 0,
            align: 1,
            entry_size: 0,
            index: 1,
            header_offset: 0,
            parent_segment: None,
            data: SectionData::Bytes {
                contents: Vec::new(),
            },
        }
    }

    fn segment_at(offset: u64, file_size: u64) -> Segment {
        Segment {
            r#type: PT_LOAD,
            flags: SegmentFlags::R,
            offset,
            original_offset: offset,
            vaddr: offset,
            paddr: offset,
            file_size,
            mem_size: file_size,
            align: 1,
            index: 0,
            contents: vec![0; file_size as usize],
            parent_segment: None,
            sections: Vec::new(),
        }
    }

    #[test]
    fn test_containment() {
        let seg = segment_at(0x1000, 0x100);
        assert!(section_within_segment(&section_at(0x1000, 0x100), &seg));
        assert!(section_within_segment(&section_at(0x1080, 0x80), &seg));
        assert!(!section_within_segment(&section_at(0x1080, 0x81), &seg));
        assert!(!section_within_segment(&section_at(0xfff, 0x10), &seg));
    }

    #[test]
    fn test_empty_section_on_boundary_belongs_to_later_segment() {
        let first = segment_at(0x1000, 0x100);
        let second = segment_at(0x1100, 0x100);
        let empty = section_at(0x1100, 0);
        assert!(!section_within_segment(&empty, &first));
        assert!(section_within_segment(&empty, &second));
    }

    #[test]
    fn test_segment_overlap_is_start_containment() {
        let parent = segment_at(0x0, 0x200);
        let child = segment_at(0x40, 0x400);
        // Only the child's start needs to be inside the parent.
        assert!(segment_overlaps_segment(&child, &parent));
        assert!(!segment_overlaps_segment(&parent, &child));

        let disjoint = segment_at(0x200, 0x100);
        assert!(!segment_overlaps_segment(&disjoint, &parent));
    }
}
