//! DWARF debug information parsing.
//!
//! This module covers the subset of DWARF 2-4 that the name index
//! consumes:
//!
//! - `.debug_info` compilation unit headers ([`unit`])
//! - `.debug_abbrev` tables, compiled to a byte-code program for the
//!   DIE walker ([`abbrev`])
//! - `.debug_line` program headers and the per-unit source file
//!   fingerprint table ([`line`])
//!
//! Attribute values themselves are not materialized anywhere; the
//! abbreviation compiler decides up front which attributes matter and
//! the walker skips the rest without decoding them.

pub mod abbrev;
pub mod constants;
pub mod line;
pub mod unit;

pub use abbrev::AbbrevTable;
pub use line::FileNameTable;
pub use unit::UnitHeader;
