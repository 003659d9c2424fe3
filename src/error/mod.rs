//! Error types for ELF object transformation

/// Error type for errors during ELF object handling. Every variant is fatal at
/// the point of detection: the model's invariants are too interconnected for
/// partial recovery to be meaningful, so callers wishing to continue must
/// validate before invoking the core.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// An I/O error occurred while decoding or encoding
    #[error("An I/O error occurred: {kind}")]
    Io {
        /// The kind of I/O error which occurred
        kind: std::io::ErrorKind,
    },
    /// The input does not begin with the ELF magic bytes
    #[error("Invalid ELF magic {magic:?}")]
    InvalidMagic {
        /// The bytes found where the magic was expected
        magic: [u8; 4],
    },
    /// The class byte of the identification is not ELFCLASS32 or ELFCLASS64
    #[error("Invalid value {class} for ELF class")]
    InvalidClass {
        /// The value of the class byte
        class: u8,
    },
    /// The data-encoding byte of the identification is not ELFDATA2LSB or
    /// ELFDATA2MSB
    #[error("Invalid value {encoding} for ELF data encoding")]
    InvalidDataEncoding {
        /// The value of the data encoding byte
        encoding: u8,
    },
    /// A const parameter pair does not name one of the four supported
    /// class/encoding combinations
    #[error("Invalid class ({class}) / data encoding ({encoding}) combination")]
    InvalidClassEncodingPair {
        /// The class constant
        class: u8,
        /// The data encoding constant
        encoding: u8,
    },
    /// An on-disk field references a section table slot that does not exist
    #[error("Section index {index} in {context} is not a valid section index")]
    InvalidSectionIndex {
        /// The out-of-range (or SHN_UNDEF) index
        index: u32,
        /// Which field held the index
        context: String,
    },
    /// A link field was expected to name a string table but names a section of
    /// a different type
    #[error("Section index {index} in {context} is not a string table")]
    NotStringTable {
        /// The index of the mistyped section
        index: u32,
        /// Which field held the index
        context: String,
    },
    /// A link field was expected to name a symbol table but names a section of
    /// a different type
    #[error("Section index {index} in {context} is not a symbol table")]
    NotSymbolTable {
        /// The index of the mistyped section
        index: u32,
        /// Which field held the index
        context: String,
    },
    /// A relocation references a symbol index past the end of its symbol table
    #[error("Invalid symbol index {index}")]
    InvalidSymbolIndex {
        /// The out-of-range symbol index
        index: u32,
    },
    /// A symbol's `st_shndx` is in the reserved range but is not a reserved
    /// index the machine defines
    #[error("Symbol '{name}' has unsupported reserved section index {shndx:#06x}")]
    InvalidReservedSectionIndex {
        /// The symbol whose index is invalid
        name: String,
        /// The reserved `st_shndx` value
        shndx: u16,
    },
    /// The input contains more than one SHT_SYMTAB section
    #[error("Multiple symbol tables are not supported")]
    MultipleSymbolTables,
    /// A section or symbol slated for removal is still referenced
    #[error("Cannot remove '{name}': still referenced by '{referrer}'")]
    StillReferenced {
        /// The entity being removed
        name: String,
        /// The entity holding a reference to it
        referrer: String,
    },
    /// An offset lookup was made on a string table that has not been finalized
    #[error("String table offset lookup before finalization")]
    StringTableNotFinalized,
    /// `total_size` or `write` was called on a writer before `finalize`
    #[error("Writer used before finalize")]
    NotFinalized,
    /// An offset lookup was made for a string never added to the table
    #[error("String '{string}' was never added to the string table")]
    BadLookup {
        /// The string that was looked up
        string: String,
    },
    /// A field such as an offset or count points outside the input image or
    /// does not fit in the space the file format gives it
    #[error("Field {context} with value {value:#x} is out of bounds")]
    OutOfBounds {
        /// Which field overflowed
        context: String,
        /// The offending value
        value: u64,
    },
    /// The output buffer handed to `write` is smaller than `total_size`
    #[error("Output buffer of {actual} bytes is smaller than the required {required}")]
    OutputBufferTooSmall {
        /// The size `write` requires, as reported by `total_size`
        required: u64,
        /// The size of the buffer that was provided
        actual: u64,
    },
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io { kind: value.kind() }
    }
}

/// Result type alias for ELF object handling
pub type Result<T> = std::result::Result<T, Error>;
