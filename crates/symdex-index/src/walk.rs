//! DIE traversal.
//!
//! Walks every debugging information entry of one compilation unit by
//! interpreting the unit's compiled abbreviation program, and inserts
//! the names of indexed, non-declaration DIEs into the shared hash.
//! Each worker touches only its own scratch state and the hash, so
//! units can be walked concurrently.

use std::ptr;

use symdex_formats::dwarf::abbrev::{
    AbbrevTable, ATTRIB_BLOCK1, ATTRIB_BLOCK2, ATTRIB_BLOCK4, ATTRIB_DECL_FILE_DATA1,
    ATTRIB_DECL_FILE_DATA2, ATTRIB_DECL_FILE_DATA4, ATTRIB_DECL_FILE_DATA8,
    ATTRIB_DECL_FILE_UDATA, ATTRIB_EXPRLOC, ATTRIB_LEB128, ATTRIB_NAME_STRING, ATTRIB_NAME_STRP4,
    ATTRIB_NAME_STRP8, ATTRIB_SIBLING_REF1, ATTRIB_SIBLING_REF2, ATTRIB_SIBLING_REF4,
    ATTRIB_SIBLING_REF8, ATTRIB_SIBLING_REF_UDATA, ATTRIB_SPECIFICATION_REF1,
    ATTRIB_SPECIFICATION_REF2, ATTRIB_SPECIFICATION_REF4, ATTRIB_SPECIFICATION_REF8,
    ATTRIB_SPECIFICATION_REF_UDATA, ATTRIB_STMT_LIST_LINEPTR4, ATTRIB_STMT_LIST_LINEPTR8,
    ATTRIB_STRING, TAG_FLAG_CHILDREN, TAG_FLAG_DECLARATION, TAG_MASK,
};
use symdex_formats::dwarf::constants::{
    DW_TAG_COMPILE_UNIT, DW_TAG_ENUMERATION_TYPE, DW_TAG_ENUMERATOR,
};
use symdex_formats::dwarf::line::{read_file_name_table, FileNameTable};
use symdex_formats::elf::DebugSection;
use symdex_formats::{reader, ParseError, Reader};

use crate::diehash::DieHash;
use crate::error::Result;
use crate::file::FileData;
use crate::Cu;

/// Scratch record for the attributes extracted from one DIE.
struct Die {
    /// Offset of the next sibling within the unit; 0 means no hint.
    sibling: usize,
    /// NUL-terminated name in .debug_str or .debug_info; null if none.
    name: *const u8,
    stmt_list: Option<u64>,
    /// 1-based DW_AT_decl_file; 0 means none.
    decl_file: u64,
    /// Offset of the referenced DIE within the unit; 0 means none.
    specification: usize,
    /// Tag and flag bits from the compiled program.
    flags: u8,
}

impl Die {
    fn new() -> Self {
        Self {
            sibling: 0,
            name: ptr::null(),
            stmt_list: None,
            decl_file: 0,
            specification: 0,
            flags: 0,
        }
    }
}

/// Converts a DIE reference into an offset within the unit.
fn unit_ref(value: u64, unit: &[u8]) -> Result<usize> {
    let offset = reader::to_index(value, "DIE reference")?;
    if offset > unit.len() {
        return Err(ParseError::UnexpectedEof("DIE reference").into());
    }
    Ok(offset)
}

/// Reads one DIE at the reader's position, executing its abbreviation
/// program. Returns `false` for a null entry.
fn read_die(
    cursor: &mut Reader<'_>,
    unit: &[u8],
    abbrev: &AbbrevTable,
    debug_str: &[u8],
    die: &mut Die,
) -> Result<bool> {
    let code = cursor.read_uleb128("abbreviation code")?;
    if code == 0 {
        return Ok(false);
    }
    let Some(program) = abbrev.program(code) else {
        return Err(ParseError::dwarf(format!("unknown abbreviation code {code}")).into());
    };

    let mut pc = 0;
    loop {
        let cmd = program[pc];
        pc += 1;
        if cmd == 0 {
            break;
        }
        match cmd {
            ATTRIB_BLOCK1 => {
                let len = cursor.read_u8("block length")?;
                cursor.skip(usize::from(len), "block")?;
            }
            ATTRIB_BLOCK2 => {
                let len = cursor.read_u16("block length")?;
                cursor.skip(usize::from(len), "block")?;
            }
            ATTRIB_BLOCK4 => {
                let len = cursor.read_u32("block length")?;
                cursor.skip(reader::to_index(u64::from(len), "block")?, "block")?;
            }
            ATTRIB_EXPRLOC => {
                let len = cursor.read_uleb128("expression length")?;
                cursor.skip(reader::to_index(len, "expression")?, "expression")?;
            }
            ATTRIB_LEB128 => cursor.skip_leb128("attribute value")?,
            ATTRIB_NAME_STRING => {
                let offset = cursor.offset();
                cursor.skip_string("DIE name")?;
                die.name = unit[offset..].as_ptr();
            }
            ATTRIB_STRING => cursor.skip_string("string attribute")?,
            ATTRIB_SIBLING_REF1 => {
                die.sibling = unit_ref(u64::from(cursor.read_u8("sibling")?), unit)?;
            }
            ATTRIB_SIBLING_REF2 => {
                die.sibling = unit_ref(u64::from(cursor.read_u16("sibling")?), unit)?;
            }
            ATTRIB_SIBLING_REF4 => {
                die.sibling = unit_ref(u64::from(cursor.read_u32("sibling")?), unit)?;
            }
            ATTRIB_SIBLING_REF8 => {
                die.sibling = unit_ref(cursor.read_u64("sibling")?, unit)?;
            }
            ATTRIB_SIBLING_REF_UDATA => {
                die.sibling = unit_ref(cursor.read_uleb128("sibling")?, unit)?;
            }
            ATTRIB_NAME_STRP4 => {
                let offset = reader::to_index(u64::from(cursor.read_u32("name offset")?), "name offset")?;
                let name = debug_str
                    .get(offset..)
                    .filter(|rest| !rest.is_empty())
                    .ok_or(ParseError::UnexpectedEof("name offset"))?;
                die.name = name.as_ptr();
            }
            ATTRIB_NAME_STRP8 => {
                let offset = reader::to_index(cursor.read_u64("name offset")?, "name offset")?;
                let name = debug_str
                    .get(offset..)
                    .filter(|rest| !rest.is_empty())
                    .ok_or(ParseError::UnexpectedEof("name offset"))?;
                die.name = name.as_ptr();
            }
            ATTRIB_STMT_LIST_LINEPTR4 => {
                die.stmt_list = Some(u64::from(cursor.read_u32("DW_AT_stmt_list")?));
            }
            ATTRIB_STMT_LIST_LINEPTR8 => {
                die.stmt_list = Some(cursor.read_u64("DW_AT_stmt_list")?);
            }
            ATTRIB_DECL_FILE_DATA1 => {
                die.decl_file = u64::from(cursor.read_u8("DW_AT_decl_file")?);
            }
            ATTRIB_DECL_FILE_DATA2 => {
                die.decl_file = u64::from(cursor.read_u16("DW_AT_decl_file")?);
            }
            ATTRIB_DECL_FILE_DATA4 => {
                die.decl_file = u64::from(cursor.read_u32("DW_AT_decl_file")?);
            }
            ATTRIB_DECL_FILE_DATA8 => {
                die.decl_file = cursor.read_u64("DW_AT_decl_file")?;
            }
            ATTRIB_DECL_FILE_UDATA => {
                die.decl_file = cursor.read_uleb128("DW_AT_decl_file")?;
            }
            ATTRIB_SPECIFICATION_REF1 => {
                die.specification = unit_ref(u64::from(cursor.read_u8("specification")?), unit)?;
            }
            ATTRIB_SPECIFICATION_REF2 => {
                die.specification = unit_ref(u64::from(cursor.read_u16("specification")?), unit)?;
            }
            ATTRIB_SPECIFICATION_REF4 => {
                die.specification = unit_ref(u64::from(cursor.read_u32("specification")?), unit)?;
            }
            ATTRIB_SPECIFICATION_REF8 => {
                die.specification = unit_ref(cursor.read_u64("specification")?, unit)?;
            }
            ATTRIB_SPECIFICATION_REF_UDATA => {
                die.specification = unit_ref(cursor.read_uleb128("specification")?, unit)?;
            }
            skip => cursor.skip(usize::from(skip), "attribute")?,
        }
    }
    die.flags = program[pc];
    Ok(true)
}

/// Indexes every DIE of one compilation unit.
pub(crate) fn index_cu(
    files: &[FileData],
    cus: &[Cu],
    hash: &DieHash,
    cu_index: u32,
) -> Result<()> {
    let cu = &cus[cu_index as usize];
    let file = &files[cu.file as usize];

    let debug_abbrev = file.debug(DebugSection::Abbrev);
    let abbrev_offset = reader::to_index(
        cu.header.debug_abbrev_offset,
        "abbreviation table offset",
    )?;
    let abbrev_data = debug_abbrev
        .get(abbrev_offset..)
        .ok_or(ParseError::UnexpectedEof("abbreviation table offset"))?;
    let abbrev = AbbrevTable::parse(abbrev_data, &cu.header)?;

    let debug_info = file.debug(DebugSection::Info);
    let total_len = reader::to_index(cu.header.total_len(), "compilation unit length")?;
    let unit = cu
        .offset
        .checked_add(total_len)
        .and_then(|end| debug_info.get(cu.offset..end))
        .ok_or(ParseError::UnexpectedEof("compilation unit"))?;
    let debug_str = file.debug(DebugSection::Str);
    let debug_line = file.debug(DebugSection::Line);

    let mut cursor = Reader::new(unit);
    cursor.seek(cu.header.header_len(), "compilation unit header")?;

    let mut file_names = FileNameTable::default();
    let mut depth = 0usize;
    // Offset of the enclosing enumeration_type DIE, so that enumerators
    // resolve to the enumeration that defines them.
    let mut enum_die_offset = 0usize;

    loop {
        let die_offset = cu.offset + cursor.offset();
        let mut die = Die::new();
        if !read_die(&mut cursor, unit, &abbrev, debug_str, &mut die)? {
            if depth == 0 {
                break;
            }
            depth -= 1;
            if depth == 1 {
                enum_die_offset = 0;
            } else if depth == 0 {
                break;
            }
            continue;
        }

        let tag = die.flags & TAG_MASK;
        if tag == DW_TAG_COMPILE_UNIT {
            if depth == 0 {
                if let Some(stmt_list) = die.stmt_list {
                    file_names = read_file_name_table(debug_line, stmt_list)?;
                }
            }
        } else if tag != 0 && die.flags & TAG_FLAG_DECLARATION == 0 {
            let insert_offset = if depth == 1 {
                if tag == DW_TAG_ENUMERATION_TYPE {
                    enum_die_offset = die_offset;
                }
                Some(die_offset)
            } else if depth == 2 && tag == DW_TAG_ENUMERATOR && enum_die_offset != 0 {
                Some(enum_die_offset)
            } else {
                None
            };

            if let Some(insert_offset) = insert_offset {
                if die.specification != 0 && (die.name.is_null() || die.decl_file == 0) {
                    // The defining DIE may leave its name and file to
                    // the declaration it completes; read that one DIE.
                    let mut decl_cursor = Reader::new(unit);
                    decl_cursor.seek(die.specification, "specification reference")?;
                    let mut decl = Die::new();
                    read_die(&mut decl_cursor, unit, &abbrev, debug_str, &mut decl)?;
                    if die.name.is_null() {
                        die.name = decl.name;
                    }
                    if die.decl_file == 0 {
                        die.decl_file = decl.decl_file;
                    }
                }

                if !die.name.is_null() {
                    if die.decl_file > file_names.num_files() {
                        return Err(ParseError::dwarf(format!(
                            "invalid DW_AT_decl_file {}",
                            die.decl_file
                        ))
                        .into());
                    }
                    let file_name_hash = file_names.hash(die.decl_file).unwrap_or(0);
                    // SAFETY: the name points into this file's mapping,
                    // which outlives the hash, and .debug_str /
                    // .debug_info are no longer written after the
                    // relocation pass.
                    unsafe {
                        hash.insert(die.name, tag, file_name_hash, cu_index, insert_offset as u64)?;
                    }
                }
            }
        }

        if die.flags & TAG_FLAG_CHILDREN != 0 {
            // A sibling hint lets us skip the whole subtree.
            if die.sibling != 0 {
                cursor.seek(die.sibling, "sibling reference")?;
            } else {
                depth += 1;
            }
        } else if depth == 0 {
            break;
        }
    }
    Ok(())
}
