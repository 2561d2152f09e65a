//! # symdex-formats
//!
//! Binary format parsers for symdex. This crate provides the low-level
//! layer of the DWARF name index:
//!
//! - ELF64 section discovery (`.debug_*`, `.symtab`, `.rela.debug_*`)
//! - Relocation application for relocatable object files
//! - DWARF compilation unit headers
//! - The abbreviation byte-code compiler used by the DIE walker
//! - Line number program headers and source file fingerprints
//!
//! Only little-endian ELF64 with x86-64 relocations and DWARF versions
//! 2 through 4 are supported; everything else is rejected up front.

pub mod dwarf;
pub mod elf;
pub mod error;
pub mod reader;

pub use error::ParseError;
pub use reader::Reader;
