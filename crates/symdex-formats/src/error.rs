//! Error types for binary format parsing.

use thiserror::Error;

/// Error type for ELF and DWARF parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Ran off the end of a buffer, section or table.
    #[error("unexpected end of data while reading {0}")]
    UnexpectedEof(&'static str),

    /// A ULEB128 value does not fit in 64 bits.
    #[error("ULEB128 value overflowed a 64-bit integer")]
    LebOverflow,

    /// Structurally invalid ELF.
    #[error("invalid ELF: {0}")]
    ElfFormat(String),

    /// Semantically invalid DWARF.
    #[error("invalid DWARF: {0}")]
    DwarfFormat(String),

    /// Valid input that this indexer does not implement.
    #[error("not implemented: {0}")]
    Unsupported(&'static str),

    /// A relocation type other than R_X86_64_{NONE,32,64}.
    #[error("not implemented: relocation type {0}")]
    UnsupportedRelocation(u32),
}

impl ParseError {
    /// Creates a new ElfFormat error.
    pub fn elf(reason: impl Into<String>) -> Self {
        Self::ElfFormat(reason.into())
    }

    /// Creates a new DwarfFormat error.
    pub fn dwarf(reason: impl Into<String>) -> Self {
        Self::DwarfFormat(reason.into())
    }
}
