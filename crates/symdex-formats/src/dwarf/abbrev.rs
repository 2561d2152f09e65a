//! DWARF abbreviation table compilation (.debug_abbrev).
//!
//! The DIE walker visits millions of entries, so dispatching on raw
//! `(DW_AT, DW_FORM)` pairs per attribute is too slow. Instead, each
//! unit's abbreviation table is compiled once into a flat byte-code
//! program, one opcode per action:
//!
//! - `1..=229`: skip that many bytes. Runs of uninteresting fixed-width
//!   attributes are coalesced into a single skip at compile time.
//! - `230..=255` ([`ATTRIB_BLOCK1`] and friends): extract or skip a
//!   variable-width attribute, capturing the values the index needs.
//! - `0`: end of attributes; the following byte holds the DIE's tag in
//!   the low bits and [`TAG_FLAG_DECLARATION`] / [`TAG_FLAG_CHILDREN`]
//!   in the high bits.
//!
//! Tags we do not index compile to tag 0, which tells the walker to
//! traverse the DIE without inserting it.

use crate::dwarf::constants::*;
use crate::dwarf::unit::UnitHeader;
use crate::{ParseError, Reader};

/// Largest plain skip opcode; larger runs spill into a second opcode.
pub const CMD_MAX_SKIP: u8 = 229;

pub const ATTRIB_BLOCK1: u8 = 230;
pub const ATTRIB_BLOCK2: u8 = 231;
pub const ATTRIB_BLOCK4: u8 = 232;
pub const ATTRIB_EXPRLOC: u8 = 233;
pub const ATTRIB_LEB128: u8 = 234;
pub const ATTRIB_STRING: u8 = 235;
pub const ATTRIB_SIBLING_REF1: u8 = 236;
pub const ATTRIB_SIBLING_REF2: u8 = 237;
pub const ATTRIB_SIBLING_REF4: u8 = 238;
pub const ATTRIB_SIBLING_REF8: u8 = 239;
pub const ATTRIB_SIBLING_REF_UDATA: u8 = 240;
pub const ATTRIB_NAME_STRP4: u8 = 241;
pub const ATTRIB_NAME_STRP8: u8 = 242;
pub const ATTRIB_NAME_STRING: u8 = 243;
pub const ATTRIB_STMT_LIST_LINEPTR4: u8 = 244;
pub const ATTRIB_STMT_LIST_LINEPTR8: u8 = 245;
pub const ATTRIB_DECL_FILE_DATA1: u8 = 246;
pub const ATTRIB_DECL_FILE_DATA2: u8 = 247;
pub const ATTRIB_DECL_FILE_DATA4: u8 = 248;
pub const ATTRIB_DECL_FILE_DATA8: u8 = 249;
pub const ATTRIB_DECL_FILE_UDATA: u8 = 250;
pub const ATTRIB_SPECIFICATION_REF1: u8 = 251;
pub const ATTRIB_SPECIFICATION_REF2: u8 = 252;
pub const ATTRIB_SPECIFICATION_REF4: u8 = 253;
pub const ATTRIB_SPECIFICATION_REF8: u8 = 254;
pub const ATTRIB_SPECIFICATION_REF_UDATA: u8 = 255;

// The opcode namespace must cover exactly one byte.
const _: () = assert!(ATTRIB_SPECIFICATION_REF_UDATA == u8::MAX);

/// Mask for the tag bits of the trailing flags byte.
pub const TAG_MASK: u8 = 0x3f;
/// The DIE carries DW_AT_declaration.
pub const TAG_FLAG_DECLARATION: u8 = 0x40;
/// The DIE has children.
pub const TAG_FLAG_CHILDREN: u8 = 0x80;

/// A compiled abbreviation table for one compilation unit.
///
/// Abbreviation codes are 1-based and must be sequential; GCC and Clang
/// always emit them that way, and a flat array depends on it.
#[derive(Debug, Default)]
pub struct AbbrevTable {
    /// `decls[code - 1]` is the offset of that code's program in `cmds`.
    decls: Vec<u32>,
    /// Concatenated byte-code programs.
    cmds: Vec<u8>,
}

impl AbbrevTable {
    /// Compiles the abbreviation table starting at the beginning of
    /// `data`, which extends to the end of .debug_abbrev.
    pub fn parse(data: &[u8], unit: &UnitHeader) -> Result<Self, ParseError> {
        let mut table = AbbrevTable::default();
        let mut reader = Reader::new(data);
        while table.parse_decl(&mut reader, unit)? {}
        Ok(table)
    }

    /// Returns the byte-code program for an abbreviation code.
    pub fn program(&self, code: u64) -> Option<&[u8]> {
        let index = usize::try_from(code.checked_sub(1)?).ok()?;
        let start = *self.decls.get(index)? as usize;
        Some(&self.cmds[start..])
    }

    /// Number of abbreviation declarations.
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    fn parse_decl(&mut self, reader: &mut Reader<'_>, unit: &UnitHeader) -> Result<bool, ParseError> {
        let code = reader.read_uleb128("abbreviation code")?;
        if code == 0 {
            return Ok(false);
        }
        if code != self.decls.len() as u64 + 1 {
            return Err(ParseError::Unsupported("abbreviation table is not sequential"));
        }
        self.decls.push(self.cmds.len() as u32);

        let tag = indexed_tag(reader.read_uleb128("abbreviation tag")?);
        let mut flags = 0u8;
        if reader.read_u8("abbreviation children flag")? != 0 {
            flags |= TAG_FLAG_CHILDREN;
        }

        let mut first = true;
        loop {
            let name = reader.read_uleb128("attribute name")?;
            let form = reader.read_uleb128("attribute form")?;
            if name == 0 && form == 0 {
                break;
            }
            match compile_attribute(name, form, tag, unit, &mut flags)? {
                Compiled::Nothing => {}
                Compiled::Cmd(cmd) => {
                    self.cmds.push(cmd);
                    first = false;
                }
                Compiled::Skip(len) => self.push_skip(len, &mut first),
            }
        }

        self.cmds.push(0);
        self.cmds.push(tag | flags);
        Ok(true)
    }

    /// Appends a fixed-width skip, merging it into a preceding skip
    /// opcode up to the [`CMD_MAX_SKIP`] cap.
    fn push_skip(&mut self, mut len: u8, first: &mut bool) {
        if len == 0 {
            return;
        }
        if !*first {
            if let Some(last) = self.cmds.last_mut() {
                if *last < CMD_MAX_SKIP {
                    let total = u16::from(*last) + u16::from(len);
                    if total <= u16::from(CMD_MAX_SKIP) {
                        *last = total as u8;
                        return;
                    }
                    len = (total - u16::from(CMD_MAX_SKIP)) as u8;
                    *last = CMD_MAX_SKIP;
                }
            }
        }
        self.cmds.push(len);
        *first = false;
    }
}

/// What one attribute specification compiles to.
enum Compiled {
    /// No bytes on the wire (DW_FORM_flag_present).
    Nothing,
    /// A dedicated extract/skip opcode.
    Cmd(u8),
    /// A plain fixed-width skip, eligible for coalescing.
    Skip(u8),
}

/// Maps a tag to itself if the index cares about it, else to 0.
fn indexed_tag(tag: u64) -> u8 {
    const INDEXED: [u8; 9] = [
        DW_TAG_BASE_TYPE,
        DW_TAG_CLASS_TYPE,
        DW_TAG_COMPILE_UNIT,
        DW_TAG_ENUMERATION_TYPE,
        DW_TAG_ENUMERATOR,
        DW_TAG_STRUCTURE_TYPE,
        DW_TAG_TYPEDEF,
        DW_TAG_UNION_TYPE,
        DW_TAG_VARIABLE,
    ];
    match u8::try_from(tag) {
        Ok(tag) if INDEXED.contains(&tag) => tag,
        _ => 0,
    }
}

fn compile_attribute(
    name: u64,
    form: u64,
    tag: u8,
    unit: &UnitHeader,
    flags: &mut u8,
) -> Result<Compiled, ParseError> {
    if name == DW_AT_SIBLING && tag != DW_TAG_ENUMERATION_TYPE {
        // Not on enumeration_type: we must descend into it to reach the
        // enumerator children.
        match form {
            DW_FORM_REF1 => return Ok(Compiled::Cmd(ATTRIB_SIBLING_REF1)),
            DW_FORM_REF2 => return Ok(Compiled::Cmd(ATTRIB_SIBLING_REF2)),
            DW_FORM_REF4 => return Ok(Compiled::Cmd(ATTRIB_SIBLING_REF4)),
            DW_FORM_REF8 => return Ok(Compiled::Cmd(ATTRIB_SIBLING_REF8)),
            DW_FORM_REF_UDATA => return Ok(Compiled::Cmd(ATTRIB_SIBLING_REF_UDATA)),
            _ => {}
        }
    } else if name == DW_AT_NAME && tag != 0 && tag != DW_TAG_COMPILE_UNIT {
        match form {
            DW_FORM_STRP => {
                return Ok(Compiled::Cmd(if unit.is_64_bit {
                    ATTRIB_NAME_STRP8
                } else {
                    ATTRIB_NAME_STRP4
                }));
            }
            DW_FORM_STRING => return Ok(Compiled::Cmd(ATTRIB_NAME_STRING)),
            _ => {}
        }
    } else if name == DW_AT_STMT_LIST && tag == DW_TAG_COMPILE_UNIT {
        match form {
            DW_FORM_DATA4 => return Ok(Compiled::Cmd(ATTRIB_STMT_LIST_LINEPTR4)),
            DW_FORM_DATA8 => return Ok(Compiled::Cmd(ATTRIB_STMT_LIST_LINEPTR8)),
            DW_FORM_SEC_OFFSET => {
                return Ok(Compiled::Cmd(if unit.is_64_bit {
                    ATTRIB_STMT_LIST_LINEPTR8
                } else {
                    ATTRIB_STMT_LIST_LINEPTR4
                }));
            }
            _ => {}
        }
    } else if name == DW_AT_DECL_FILE && tag != 0 && tag != DW_TAG_COMPILE_UNIT {
        match form {
            DW_FORM_DATA1 => return Ok(Compiled::Cmd(ATTRIB_DECL_FILE_DATA1)),
            DW_FORM_DATA2 => return Ok(Compiled::Cmd(ATTRIB_DECL_FILE_DATA2)),
            DW_FORM_DATA4 => return Ok(Compiled::Cmd(ATTRIB_DECL_FILE_DATA4)),
            DW_FORM_DATA8 => return Ok(Compiled::Cmd(ATTRIB_DECL_FILE_DATA8)),
            // decl_file is positive, so sdata decodes the same as udata.
            DW_FORM_SDATA | DW_FORM_UDATA => return Ok(Compiled::Cmd(ATTRIB_DECL_FILE_UDATA)),
            _ => {}
        }
    } else if name == DW_AT_DECLARATION {
        // Usually DW_FORM_flag_present; a DW_FORM_flag payload still has
        // to be skipped below.
        *flags |= TAG_FLAG_DECLARATION;
    } else if name == DW_AT_SPECIFICATION && tag != 0 && tag != DW_TAG_COMPILE_UNIT {
        match form {
            DW_FORM_REF1 => return Ok(Compiled::Cmd(ATTRIB_SPECIFICATION_REF1)),
            DW_FORM_REF2 => return Ok(Compiled::Cmd(ATTRIB_SPECIFICATION_REF2)),
            DW_FORM_REF4 => return Ok(Compiled::Cmd(ATTRIB_SPECIFICATION_REF4)),
            DW_FORM_REF8 => return Ok(Compiled::Cmd(ATTRIB_SPECIFICATION_REF8)),
            DW_FORM_REF_UDATA => return Ok(Compiled::Cmd(ATTRIB_SPECIFICATION_REF_UDATA)),
            _ => {}
        }
    }

    let width: u8 = match form {
        DW_FORM_ADDR => unit.address_size,
        DW_FORM_DATA1 | DW_FORM_REF1 | DW_FORM_FLAG => 1,
        DW_FORM_DATA2 | DW_FORM_REF2 => 2,
        DW_FORM_DATA4 | DW_FORM_REF4 => 4,
        DW_FORM_DATA8 | DW_FORM_REF8 | DW_FORM_REF_SIG8 => 8,
        DW_FORM_BLOCK1 => return Ok(Compiled::Cmd(ATTRIB_BLOCK1)),
        DW_FORM_BLOCK2 => return Ok(Compiled::Cmd(ATTRIB_BLOCK2)),
        DW_FORM_BLOCK4 => return Ok(Compiled::Cmd(ATTRIB_BLOCK4)),
        DW_FORM_BLOCK | DW_FORM_EXPRLOC => return Ok(Compiled::Cmd(ATTRIB_EXPRLOC)),
        DW_FORM_SDATA | DW_FORM_UDATA | DW_FORM_REF_UDATA => {
            return Ok(Compiled::Cmd(ATTRIB_LEB128));
        }
        DW_FORM_REF_ADDR | DW_FORM_SEC_OFFSET | DW_FORM_STRP => {
            if unit.is_64_bit {
                8
            } else {
                4
            }
        }
        DW_FORM_STRING => return Ok(Compiled::Cmd(ATTRIB_STRING)),
        DW_FORM_FLAG_PRESENT => return Ok(Compiled::Nothing),
        DW_FORM_INDIRECT => return Err(ParseError::Unsupported("DW_FORM_indirect")),
        _ => {
            return Err(ParseError::dwarf(format!("unknown attribute form {form}")));
        }
    };
    Ok(Compiled::Skip(width))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit32() -> UnitHeader {
        UnitHeader {
            unit_length: 0,
            version: 4,
            debug_abbrev_offset: 0,
            address_size: 8,
            is_64_bit: false,
        }
    }

    fn unit64() -> UnitHeader {
        UnitHeader {
            is_64_bit: true,
            ..unit32()
        }
    }

    /// Encodes one abbreviation declaration. Attribute and form values
    /// in these tests all fit in a single ULEB128 byte.
    fn decl(code: u8, tag: u8, children: bool, attrs: &[(u64, u64)]) -> Vec<u8> {
        let mut out = vec![code, tag, children as u8];
        for &(name, form) in attrs {
            out.push(name as u8);
            out.push(form as u8);
        }
        out.extend_from_slice(&[0, 0]);
        out
    }

    fn compile(decls: &[Vec<u8>], unit: &UnitHeader) -> AbbrevTable {
        let mut data: Vec<u8> = decls.concat();
        data.push(0);
        AbbrevTable::parse(&data, unit).unwrap()
    }

    #[test]
    fn coalesces_fixed_width_skips() {
        // Three data4 attributes we do not index become one skip of 12.
        let table = compile(
            &[decl(
                1,
                DW_TAG_VARIABLE,
                false,
                &[(0x02, DW_FORM_DATA4), (0x39, DW_FORM_DATA4), (0x3b, DW_FORM_DATA4)],
            )],
            &unit32(),
        );
        assert_eq!(table.program(1).unwrap(), &[12, 0, DW_TAG_VARIABLE]);
    }

    #[test]
    fn skip_runs_spill_at_the_cap() {
        // Thirty data8 attributes total 240 bytes, which does not fit in
        // one skip opcode.
        let attrs: Vec<(u64, u64)> = (0..30).map(|_| (0x02, DW_FORM_DATA8)).collect();
        let table = compile(&[decl(1, DW_TAG_VARIABLE, false, &attrs)], &unit32());
        assert_eq!(
            table.program(1).unwrap(),
            &[CMD_MAX_SKIP, 11, 0, DW_TAG_VARIABLE]
        );
    }

    #[test]
    fn extract_opcode_breaks_a_skip_run() {
        let table = compile(
            &[decl(
                1,
                DW_TAG_VARIABLE,
                false,
                &[
                    (0x02, DW_FORM_DATA4),
                    (DW_AT_NAME, DW_FORM_STRP),
                    (0x39, DW_FORM_DATA4),
                ],
            )],
            &unit32(),
        );
        assert_eq!(
            table.program(1).unwrap(),
            &[4, ATTRIB_NAME_STRP4, 4, 0, DW_TAG_VARIABLE]
        );
    }

    #[test]
    fn name_width_follows_dwarf64() {
        let attrs = [(DW_AT_NAME, DW_FORM_STRP)];
        let table32 = compile(&[decl(1, DW_TAG_TYPEDEF, false, &attrs)], &unit32());
        let table64 = compile(&[decl(1, DW_TAG_TYPEDEF, false, &attrs)], &unit64());
        assert_eq!(table32.program(1).unwrap()[0], ATTRIB_NAME_STRP4);
        assert_eq!(table64.program(1).unwrap()[0], ATTRIB_NAME_STRP8);
    }

    #[test]
    fn inline_name_string_is_captured() {
        let table = compile(
            &[decl(1, DW_TAG_BASE_TYPE, false, &[(DW_AT_NAME, DW_FORM_STRING)])],
            &unit32(),
        );
        assert_eq!(
            table.program(1).unwrap(),
            &[ATTRIB_NAME_STRING, 0, DW_TAG_BASE_TYPE]
        );
    }

    #[test]
    fn name_on_unindexed_tag_is_skipped() {
        // DW_TAG_subprogram is not indexed: its strp name is a plain
        // 4-byte skip and the compiled tag is 0.
        let table = compile(
            &[decl(1, 0x2e, true, &[(DW_AT_NAME, DW_FORM_STRP)])],
            &unit32(),
        );
        assert_eq!(table.program(1).unwrap(), &[4, 0, TAG_FLAG_CHILDREN]);
    }

    #[test]
    fn sibling_is_captured_even_on_unindexed_tags() {
        let table = compile(
            &[decl(1, 0x2e, true, &[(DW_AT_SIBLING, DW_FORM_REF8)])],
            &unit32(),
        );
        assert_eq!(
            table.program(1).unwrap(),
            &[ATTRIB_SIBLING_REF8, 0, TAG_FLAG_CHILDREN]
        );
    }

    #[test]
    fn sibling_on_enumeration_type_is_not_captured() {
        let table = compile(
            &[decl(
                1,
                DW_TAG_ENUMERATION_TYPE,
                true,
                &[(DW_AT_SIBLING, DW_FORM_REF4)],
            )],
            &unit32(),
        );
        assert_eq!(
            table.program(1).unwrap(),
            &[4, 0, DW_TAG_ENUMERATION_TYPE | TAG_FLAG_CHILDREN]
        );
    }

    #[test]
    fn stmt_list_only_matters_on_compile_unit() {
        let table = compile(
            &[
                decl(1, DW_TAG_COMPILE_UNIT, true, &[(DW_AT_STMT_LIST, DW_FORM_SEC_OFFSET)]),
                decl(2, DW_TAG_VARIABLE, false, &[(DW_AT_STMT_LIST, DW_FORM_SEC_OFFSET)]),
            ],
            &unit32(),
        );
        assert_eq!(
            table.program(1).unwrap()[..2],
            [ATTRIB_STMT_LIST_LINEPTR4, 0]
        );
        assert_eq!(table.program(2).unwrap(), &[4, 0, DW_TAG_VARIABLE]);
    }

    #[test]
    fn declaration_sets_the_flag_without_an_opcode() {
        let table = compile(
            &[decl(
                1,
                DW_TAG_STRUCTURE_TYPE,
                false,
                &[(DW_AT_DECLARATION, DW_FORM_FLAG_PRESENT)],
            )],
            &unit32(),
        );
        assert_eq!(
            table.program(1).unwrap(),
            &[0, DW_TAG_STRUCTURE_TYPE | TAG_FLAG_DECLARATION]
        );
    }

    #[test]
    fn declaration_as_flag_still_skips_its_byte() {
        let table = compile(
            &[decl(
                1,
                DW_TAG_STRUCTURE_TYPE,
                false,
                &[(DW_AT_DECLARATION, DW_FORM_FLAG)],
            )],
            &unit32(),
        );
        assert_eq!(
            table.program(1).unwrap(),
            &[1, 0, DW_TAG_STRUCTURE_TYPE | TAG_FLAG_DECLARATION]
        );
    }

    #[test]
    fn decl_file_sdata_reads_as_udata() {
        let table = compile(
            &[decl(1, DW_TAG_VARIABLE, false, &[(DW_AT_DECL_FILE, DW_FORM_SDATA)])],
            &unit32(),
        );
        assert_eq!(
            table.program(1).unwrap(),
            &[ATTRIB_DECL_FILE_UDATA, 0, DW_TAG_VARIABLE]
        );
    }

    #[test]
    fn specification_reference_is_captured() {
        let table = compile(
            &[decl(
                1,
                DW_TAG_STRUCTURE_TYPE,
                false,
                &[(DW_AT_SPECIFICATION, DW_FORM_REF4)],
            )],
            &unit32(),
        );
        assert_eq!(
            table.program(1).unwrap(),
            &[ATTRIB_SPECIFICATION_REF4, 0, DW_TAG_STRUCTURE_TYPE]
        );
    }

    #[test]
    fn rejects_non_sequential_codes() {
        let data = decl(2, DW_TAG_VARIABLE, false, &[]);
        assert!(matches!(
            AbbrevTable::parse(&data, &unit32()),
            Err(ParseError::Unsupported(_))
        ));
    }

    #[test]
    fn rejects_indirect_form() {
        let data: Vec<u8> = [
            decl(1, DW_TAG_VARIABLE, false, &[(0x02, DW_FORM_INDIRECT)]),
            vec![0],
        ]
        .concat();
        assert!(matches!(
            AbbrevTable::parse(&data, &unit32()),
            Err(ParseError::Unsupported("DW_FORM_indirect"))
        ));
    }

    #[test]
    fn rejects_unknown_form() {
        let data: Vec<u8> = [
            decl(1, DW_TAG_VARIABLE, false, &[(0x02, 0x7e)]),
            vec![0],
        ]
        .concat();
        assert!(matches!(
            AbbrevTable::parse(&data, &unit32()),
            Err(ParseError::DwarfFormat(_))
        ));
    }

    #[test]
    fn unknown_code_has_no_program() {
        let table = compile(&[decl(1, DW_TAG_VARIABLE, false, &[])], &unit32());
        assert!(table.program(0).is_none());
        assert!(table.program(2).is_none());
    }
}
