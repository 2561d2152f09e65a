//! ELF64 section discovery.
//!
//! The index needs five sections from each object file: the four
//! `.debug_*` sections and `.symtab`, plus the `.rela` companion of each
//! debug section when the file is relocatable. This module validates the
//! ELF header and locates those sections; everything else in the file is
//! ignored.

pub mod relocation;

pub use relocation::{apply_relocations, Rela, SymbolTable};

use crate::ParseError;

/// ELF magic bytes.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Size of the e_ident array.
pub const EI_NIDENT: usize = 16;
/// Size of an Elf64_Ehdr.
pub const EHDR_SIZE: usize = 64;
/// Size of an Elf64_Shdr.
pub const SHDR_SIZE: usize = 64;

// e_ident values
pub const ELFCLASS32: u8 = 1;
pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const EV_CURRENT: u8 = 1;

// Section header types
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_RELA: u32 = 4;

// Special section indices
pub const SHN_UNDEF: u16 = 0;
pub const SHN_XINDEX: u16 = 0xffff;

/// The debug sections the index consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSection {
    Abbrev,
    Info,
    Line,
    Str,
}

/// Number of [`DebugSection`] variants.
pub const NUM_DEBUG_SECTIONS: usize = 4;

impl DebugSection {
    /// All debug sections, in array-index order.
    pub const ALL: [DebugSection; NUM_DEBUG_SECTIONS] = [
        DebugSection::Abbrev,
        DebugSection::Info,
        DebugSection::Line,
        DebugSection::Str,
    ];

    /// The section name in the section header string table.
    pub fn name(self) -> &'static str {
        match self {
            DebugSection::Abbrev => ".debug_abbrev",
            DebugSection::Info => ".debug_info",
            DebugSection::Line => ".debug_line",
            DebugSection::Str => ".debug_str",
        }
    }

    fn from_name(name: &[u8]) -> Option<Self> {
        DebugSection::ALL
            .into_iter()
            .find(|s| s.name().as_bytes() == name)
    }
}

/// A located section: a byte range of the file plus the section header
/// index it came from. The index is needed to match a `.rela` section to
/// its target via `sh_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub shdr_index: u16,
    pub offset: usize,
    pub size: usize,
}

impl Section {
    /// Returns the section's bytes within `data`.
    ///
    /// Discovery validated the range, so this cannot fail for a section
    /// it produced.
    pub fn bytes<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.size]
    }

    fn overlaps(&self, other: &Section) -> bool {
        self.offset < other.offset + other.size && other.offset < self.offset + self.size
    }
}

/// The sections of one object file that the index uses.
#[derive(Debug)]
pub struct SectionMap {
    pub symtab: Section,
    /// Indexed by `DebugSection as usize`.
    pub debug: [Section; NUM_DEBUG_SECTIONS],
    /// `.rela` companion of each debug section, if present.
    pub rela: [Option<Section>; NUM_DEBUG_SECTIONS],
}

impl SectionMap {
    /// The bytes of one debug section.
    pub fn debug_bytes<'a>(&self, data: &'a [u8], kind: DebugSection) -> &'a [u8] {
        self.debug[kind as usize].bytes(data)
    }
}

/// A raw Elf64_Shdr, limited to the fields discovery needs.
#[derive(Debug, Clone, Copy)]
struct Shdr {
    sh_name: u32,
    sh_type: u32,
    sh_offset: u64,
    sh_size: u64,
    sh_link: u32,
    sh_info: u32,
}

impl Shdr {
    /// Parses the section header at `index`. The caller has validated
    /// that the whole table is within `data`.
    fn parse(data: &[u8], shoff: usize, index: usize) -> Self {
        let base = shoff + index * SHDR_SIZE;
        let u32_at = |off: usize| {
            u32::from_le_bytes([
                data[base + off],
                data[base + off + 1],
                data[base + off + 2],
                data[base + off + 3],
            ])
        };
        let u64_at = |off: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[base + off..base + off + 8]);
            u64::from_le_bytes(bytes)
        };
        Self {
            sh_name: u32_at(0),
            sh_type: u32_at(4),
            sh_offset: u64_at(24),
            sh_size: u64_at(32),
            sh_link: u32_at(40),
            sh_info: u32_at(44),
        }
    }

    /// Checks the section's byte range against the file size and turns
    /// it into a [`Section`].
    fn to_section(self, index: u16, file_size: usize) -> Result<Section, ParseError> {
        let offset = usize::try_from(self.sh_offset)
            .map_err(|_| ParseError::elf("section is beyond end of file"))?;
        let size = usize::try_from(self.sh_size)
            .map_err(|_| ParseError::elf("section is beyond end of file"))?;
        if offset.checked_add(size).is_none_or(|end| end > file_size) {
            return Err(ParseError::elf("section is beyond end of file"));
        }
        Ok(Section {
            shdr_index: index,
            offset,
            size,
        })
    }
}

/// Validated pieces of the ELF header that discovery needs.
struct Ehdr {
    shoff: usize,
    shnum: u16,
    shstrndx: u16,
}

fn validate_ehdr(data: &[u8]) -> Result<Ehdr, ParseError> {
    if data.len() < EI_NIDENT || data[..4] != ELF_MAGIC {
        return Err(ParseError::elf("not an ELF file"));
    }
    if data[6] != EV_CURRENT {
        return Err(ParseError::elf(format!(
            "ELF version {} is not EV_CURRENT",
            data[6]
        )));
    }
    if data[5] != ELFDATA2LSB {
        return Err(ParseError::Unsupported("big-endian ELF"));
    }
    match data[4] {
        ELFCLASS64 => {}
        ELFCLASS32 => return Err(ParseError::Unsupported("32-bit ELF")),
        class => {
            return Err(ParseError::elf(format!("unknown ELF class {class}")));
        }
    }
    if data.len() < EHDR_SIZE {
        return Err(ParseError::elf("ELF header is truncated"));
    }

    let shoff = u64::from_le_bytes([
        data[40], data[41], data[42], data[43], data[44], data[45], data[46], data[47],
    ]);
    let shnum = u16::from_le_bytes([data[60], data[61]]);
    let shstrndx = u16::from_le_bytes([data[62], data[63]]);

    if shnum == 0 {
        return Err(ParseError::elf("ELF file has no sections"));
    }
    let table_size = SHDR_SIZE * shnum as usize;
    let shoff = usize::try_from(shoff)
        .ok()
        .filter(|&off| off.checked_add(table_size).is_some_and(|end| end <= data.len()))
        .ok_or_else(|| ParseError::elf("section header table is beyond end of file"))?;

    Ok(Ehdr {
        shoff,
        shnum,
        shstrndx,
    })
}

/// Reads a section name out of the section header string table.
fn section_name<'a>(shstrtab: &'a [u8], sh_name: u32) -> Option<&'a [u8]> {
    let start = usize::try_from(sh_name).ok()?;
    if start == 0 || start >= shstrtab.len() {
        return None;
    }
    let rest = &shstrtab[start..];
    let nul = rest.iter().position(|&b| b == 0)?;
    Some(&rest[..nul])
}

/// Locates the debug sections, `.symtab`, and their `.rela` companions.
///
/// Returns `Ok(None)` when the file is valid ELF but is missing `.symtab`
/// or any of the four debug sections; such a file carries no usable debug
/// information and is skipped. Relocation sections are optional.
pub fn discover(data: &[u8]) -> Result<Option<SectionMap>, ParseError> {
    let ehdr = validate_ehdr(data)?;

    let mut shstrndx = ehdr.shstrndx;
    if shstrndx == SHN_XINDEX {
        let link = Shdr::parse(data, ehdr.shoff, 0).sh_link;
        shstrndx = u16::try_from(link)
            .map_err(|_| ParseError::elf("invalid section header string table index"))?;
    }
    if shstrndx == SHN_UNDEF || shstrndx >= ehdr.shnum {
        return Err(ParseError::elf("invalid section header string table index"));
    }
    let shstrtab = Shdr::parse(data, ehdr.shoff, shstrndx as usize)
        .to_section(shstrndx, data.len())?
        .bytes(data);

    let mut symtab = None;
    let mut debug: [Option<Section>; NUM_DEBUG_SECTIONS] = [None; NUM_DEBUG_SECTIONS];

    for i in 0..ehdr.shnum {
        let shdr = Shdr::parse(data, ehdr.shoff, i as usize);
        let slot = if shdr.sh_type == SHT_PROGBITS {
            let Some(kind) = section_name(shstrtab, shdr.sh_name).and_then(DebugSection::from_name)
            else {
                continue;
            };
            &mut debug[kind as usize]
        } else if shdr.sh_type == SHT_SYMTAB {
            &mut symtab
        } else {
            continue;
        };
        *slot = Some(shdr.to_section(i, data.len())?);
    }

    let Some(symtab) = symtab else {
        return Ok(None);
    };
    let debug = match debug {
        [Some(a), Some(b), Some(c), Some(d)] => [a, b, c, d],
        _ => return Ok(None),
    };

    let mut rela: [Option<Section>; NUM_DEBUG_SECTIONS] = [None; NUM_DEBUG_SECTIONS];
    for i in 0..ehdr.shnum {
        let shdr = Shdr::parse(data, ehdr.shoff, i as usize);
        if shdr.sh_type != SHT_RELA {
            continue;
        }
        let Some(target) = debug
            .iter()
            .position(|s| u32::from(s.shdr_index) == shdr.sh_info)
        else {
            continue;
        };
        if shdr.sh_link != u32::from(symtab.shdr_index) {
            return Err(ParseError::elf(
                "relocation symbol table section is not .symtab",
            ));
        }
        rela[target] = Some(shdr.to_section(i, data.len())?);
    }

    let map = SectionMap {
        symtab,
        debug,
        rela,
    };
    check_disjoint(&map)?;
    Ok(Some(map))
}

/// The relocation pass mutates debug sections while reading `.rela` and
/// `.symtab` from the same mapping, so the recorded sections must not
/// share bytes.
fn check_disjoint(map: &SectionMap) -> Result<(), ParseError> {
    let mut sections = Vec::with_capacity(1 + 2 * NUM_DEBUG_SECTIONS);
    sections.push(map.symtab);
    sections.extend(map.debug);
    sections.extend(map.rela.iter().flatten());
    for (i, a) in sections.iter().enumerate() {
        for b in &sections[i + 1..] {
            if a.overlaps(b) {
                return Err(ParseError::elf("sections overlap"));
            }
        }
    }
    Ok(())
}
