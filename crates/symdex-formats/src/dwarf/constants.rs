//! DWARF constants.
//!
//! Only the tags, attributes and forms the index acts on are named
//! here; everything else is handled generically by form width.

// Tags. These all fit in the low 6 bits of the compiled flags byte.
pub const DW_TAG_CLASS_TYPE: u8 = 0x02;
pub const DW_TAG_ENUMERATION_TYPE: u8 = 0x04;
pub const DW_TAG_COMPILE_UNIT: u8 = 0x11;
pub const DW_TAG_STRUCTURE_TYPE: u8 = 0x13;
pub const DW_TAG_TYPEDEF: u8 = 0x16;
pub const DW_TAG_UNION_TYPE: u8 = 0x17;
pub const DW_TAG_BASE_TYPE: u8 = 0x24;
pub const DW_TAG_ENUMERATOR: u8 = 0x28;
pub const DW_TAG_VARIABLE: u8 = 0x34;

// Attributes
pub const DW_AT_SIBLING: u64 = 0x01;
pub const DW_AT_NAME: u64 = 0x03;
pub const DW_AT_STMT_LIST: u64 = 0x10;
pub const DW_AT_DECL_FILE: u64 = 0x3a;
pub const DW_AT_DECLARATION: u64 = 0x3c;
pub const DW_AT_SPECIFICATION: u64 = 0x47;

// Forms
pub const DW_FORM_ADDR: u64 = 0x01;
pub const DW_FORM_BLOCK2: u64 = 0x03;
pub const DW_FORM_BLOCK4: u64 = 0x04;
pub const DW_FORM_DATA2: u64 = 0x05;
pub const DW_FORM_DATA4: u64 = 0x06;
pub const DW_FORM_DATA8: u64 = 0x07;
pub const DW_FORM_STRING: u64 = 0x08;
pub const DW_FORM_BLOCK: u64 = 0x09;
pub const DW_FORM_BLOCK1: u64 = 0x0a;
pub const DW_FORM_DATA1: u64 = 0x0b;
pub const DW_FORM_FLAG: u64 = 0x0c;
pub const DW_FORM_SDATA: u64 = 0x0d;
pub const DW_FORM_STRP: u64 = 0x0e;
pub const DW_FORM_UDATA: u64 = 0x0f;
pub const DW_FORM_REF_ADDR: u64 = 0x10;
pub const DW_FORM_REF1: u64 = 0x11;
pub const DW_FORM_REF2: u64 = 0x12;
pub const DW_FORM_REF4: u64 = 0x13;
pub const DW_FORM_REF8: u64 = 0x14;
pub const DW_FORM_REF_UDATA: u64 = 0x15;
pub const DW_FORM_INDIRECT: u64 = 0x16;
pub const DW_FORM_SEC_OFFSET: u64 = 0x17;
pub const DW_FORM_EXPRLOC: u64 = 0x18;
pub const DW_FORM_FLAG_PRESENT: u64 = 0x19;
pub const DW_FORM_REF_SIG8: u64 = 0x20;
