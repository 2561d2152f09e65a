//! DWARF line number program headers (.debug_line).
//!
//! The index only needs one thing from the line number program: a
//! fingerprint for each entry of the file table, so that two DIEs with
//! the same name can be told apart by the source file that declared
//! them. The line number matrix itself is never decoded.
//!
//! A fingerprint is a SipHash of the file's directory and name. The
//! directory path is canonicalized while hashing: components are
//! consumed right to left, each followed by a `/`, so `"a/b/c"` hashes
//! as `"c/b/a/"` and `"/a/b"` as `"b/a//"`. Walking backwards makes
//! `..` resolution a single pass: a `..` simply cancels the next real
//! component to its left.

use siphasher::sip::SipHasher;
use std::hash::Hasher;

use crate::{reader, ParseError, Reader};

/// Source file fingerprints for one compilation unit, in file table
/// order.
#[derive(Debug, Default)]
pub struct FileNameTable {
    hashes: Vec<u64>,
}

impl FileNameTable {
    /// Number of entries in the unit's file table.
    pub fn num_files(&self) -> u64 {
        self.hashes.len() as u64
    }

    /// The fingerprint for a 1-based DW_AT_decl_file index.
    pub fn hash(&self, file_index: u64) -> Option<u64> {
        let index = usize::try_from(file_index.checked_sub(1)?).ok()?;
        self.hashes.get(index).copied()
    }
}

/// Hashes the canonical form of a directory path, with a trailing slash
/// after every component.
///
/// `.` components are dropped, slashes collapse, and a `..` swallows
/// the component to its left. An absolute path gets a final `/`
/// sentinel; a relative path keeps any `..` components that escaped
/// past its start.
pub fn hash_directory(hash: &mut SipHasher, path: &[u8]) {
    let mut len = path.len();
    if len == 0 {
        return;
    }

    let mut dot_dot = 0usize;
    while len > 0 {
        // Collapse slashes.
        if path[len - 1] == b'/' {
            len -= 1;
            continue;
        }

        // Drop "." components.
        if len == 1 && path[0] == b'.' {
            break;
        }
        if len >= 2 && path[len - 2] == b'/' && path[len - 1] == b'.' {
            len -= 2;
            continue;
        }

        // Count ".." components.
        if len == 2 && path[0] == b'.' && path[1] == b'.' {
            dot_dot += 1;
            break;
        }
        if len >= 3 && path[len - 3] == b'/' && path[len - 2] == b'.' && path[len - 1] == b'.' {
            len -= 3;
            dot_dot += 1;
            continue;
        }

        // Hash or cancel a real component.
        let end = len;
        while len > 0 && path[len - 1] != b'/' {
            len -= 1;
        }
        if dot_dot > 0 {
            dot_dot -= 1;
            continue;
        }
        hash.write(&path[len..end]);
        hash.write(b"/");
    }

    if path[0] == b'/' {
        hash.write(b"/");
    } else {
        // Leftover ".." components climb above the compilation
        // directory; that only means something for a relative path.
        for _ in 0..dot_dot {
            hash.write(b"../");
        }
    }
}

/// Skips the fixed part of a line number program header, leaving the
/// reader at the include directories list.
fn skip_header(reader: &mut Reader<'_>) -> Result<(), ParseError> {
    let initial = reader.read_u32("line number program header")?;
    let is_64_bit = initial == 0xffff_ffff;
    if is_64_bit {
        reader.skip(8, "line number program header")?;
    }

    let version = reader.read_u16("line number program header")?;
    if !(2..=4).contains(&version) {
        return Err(ParseError::dwarf(format!("unknown DWARF version {version}")));
    }

    // header_length, minimum_instruction_length,
    // maximum_operations_per_instruction (DWARF 4 only),
    // default_is_stmt, line_base, line_range
    let fixed = if is_64_bit { 8 } else { 4 } + 4 + usize::from(version >= 4);
    reader.skip(fixed, "line number program header")?;

    let opcode_base = reader.read_u8("line number program header")?;
    reader.skip(
        usize::from(opcode_base).saturating_sub(1),
        "standard opcode lengths",
    )?;
    Ok(())
}

/// Reads the file table of the line number program at `stmt_list` and
/// fingerprints every entry.
pub fn read_file_name_table(
    debug_line: &[u8],
    stmt_list: u64,
) -> Result<FileNameTable, ParseError> {
    let start = reader::to_index(stmt_list, "line number program offset")?;
    let mut reader = Reader::new(debug_line);
    reader.seek(start, "line number program offset")?;
    skip_header(&mut reader)?;

    let mut directories = Vec::new();
    loop {
        let path = reader.read_string("include directory")?;
        if path.is_empty() {
            break;
        }
        let mut hash = SipHasher::new();
        hash_directory(&mut hash, path);
        directories.push(hash);
    }

    let mut table = FileNameTable::default();
    loop {
        let path = reader.read_string("file name")?;
        if path.is_empty() {
            break;
        }

        let directory_index = reader.read_uleb128("directory index")?;
        reader.skip_leb128("file modification time")?;
        reader.skip_leb128("file size")?;

        if directory_index > directories.len() as u64 {
            return Err(ParseError::dwarf(format!(
                "directory index {directory_index} is invalid"
            )));
        }

        // Index 0 is the compilation directory, whose prefix state is
        // empty.
        let mut hash = match directory_index.checked_sub(1) {
            Some(i) => directories[i as usize],
            None => SipHasher::new(),
        };
        hash.write(path);
        table.hashes.push(hash.finish());
    }

    Ok(table)
}
