//! Architecture specific definitions for Qualcomm Hexagon

/// Machine value (`e_machine`) for Qualcomm Hexagon
pub const EM_HEXAGON: u16 = 164;

/// Reserved section indices defined by the Hexagon processor supplement.
/// These appear as `st_shndx` values of small-common symbols and tag the
/// symbol rather than naming a section table slot.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ElfSectionIndexHexagon {
    /// Other access sizes
    Scommon = Self::SCOMMON,
    /// Byte-sized access
    Scommon1 = Self::SCOMMON_1,
    /// Half-word-sized access
    Scommon2 = Self::SCOMMON_2,
    /// Word-sized access
    Scommon4 = Self::SCOMMON_4,
    /// Double-word-sized access
    Scommon8 = Self::SCOMMON_8,
}

impl ElfSectionIndexHexagon {
    /// Constant value for [`ElfSectionIndexHexagon::Scommon`]
    pub const SCOMMON: u16 = 0xff00;
    /// Constant value for [`ElfSectionIndexHexagon::Scommon1`]
    pub const SCOMMON_1: u16 = 0xff01;
    /// Constant value for [`ElfSectionIndexHexagon::Scommon2`]
    pub const SCOMMON_2: u16 = 0xff02;
    /// Constant value for [`ElfSectionIndexHexagon::Scommon4`]
    pub const SCOMMON_4: u16 = 0xff03;
    /// Constant value for [`ElfSectionIndexHexagon::Scommon8`]
    pub const SCOMMON_8: u16 = 0xff04;
}
