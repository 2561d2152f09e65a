//! ELF relocation application.
//!
//! Relocatable objects leave section-relative offsets in their debug
//! sections; the references only make sense after the `.rela.debug_*`
//! entries are applied. The writes land in the caller's private mapping,
//! so the file on disk is untouched.

use crate::ParseError;

// x86_64 relocation types
pub const R_X86_64_NONE: u32 = 0;
pub const R_X86_64_64: u32 = 1;
pub const R_X86_64_32: u32 = 10;

/// Size of an Elf64_Rela.
pub const RELA_ENTRY_SIZE: usize = 24;
/// Size of an Elf64_Sym.
pub const SYM_ENTRY_SIZE: usize = 24;

/// A parsed Elf64_Rela entry.
#[derive(Debug, Clone, Copy)]
pub struct Rela {
    /// Offset within the target section where the relocation applies.
    pub r_offset: u64,
    /// Symbol table index.
    pub r_sym: u32,
    /// Relocation type.
    pub r_type: u32,
    /// Explicit addend.
    pub r_addend: i64,
}

impl Rela {
    /// Parses one entry. `data` must hold at least [`RELA_ENTRY_SIZE`]
    /// bytes.
    pub fn parse(data: &[u8]) -> Self {
        let u64_at = |off: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[off..off + 8]);
            u64::from_le_bytes(bytes)
        };
        let r_info = u64_at(8);
        Self {
            r_offset: u64_at(0),
            r_sym: (r_info >> 32) as u32,
            r_type: (r_info & 0xffff_ffff) as u32,
            r_addend: u64_at(16) as i64,
        }
    }
}

/// A read-only view over an Elf64 `.symtab` section.
#[derive(Debug, Clone, Copy)]
pub struct SymbolTable<'a> {
    data: &'a [u8],
}

impl<'a> SymbolTable<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of complete symbol entries.
    pub fn len(&self) -> usize {
        self.data.len() / SYM_ENTRY_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `st_value` of the symbol at `index`, or `None` if the index
    /// is out of range.
    pub fn value(&self, index: u32) -> Option<u64> {
        let off = (index as usize).checked_mul(SYM_ENTRY_SIZE)?;
        let bytes = self.data.get(off + 8..off + 16)?;
        let mut value = [0u8; 8];
        value.copy_from_slice(bytes);
        Some(u64::from_le_bytes(value))
    }
}

/// Applies every relocation in `rela` to `target` in place.
///
/// Only `R_X86_64_NONE`, `R_X86_64_32` and `R_X86_64_64` are handled;
/// anything else fails the file. A trailing partial entry in `rela` is
/// ignored.
pub fn apply_relocations(
    target: &mut [u8],
    rela: &[u8],
    symtab: &SymbolTable<'_>,
) -> Result<(), ParseError> {
    for entry in rela.chunks_exact(RELA_ENTRY_SIZE) {
        apply_one(target, Rela::parse(entry), symtab)?;
    }
    Ok(())
}

fn apply_one(target: &mut [u8], reloc: Rela, symtab: &SymbolTable<'_>) -> Result<(), ParseError> {
    let width = match reloc.r_type {
        R_X86_64_NONE => return Ok(()),
        R_X86_64_32 => 4,
        R_X86_64_64 => 8,
        other => return Err(ParseError::UnsupportedRelocation(other)),
    };

    let value = symtab
        .value(reloc.r_sym)
        .ok_or_else(|| ParseError::elf("invalid relocation symbol"))?
        .wrapping_add(reloc.r_addend as u64);

    let offset = usize::try_from(reloc.r_offset)
        .map_err(|_| ParseError::elf("invalid relocation offset"))?;
    let out = offset
        .checked_add(width)
        .and_then(|end| target.get_mut(offset..end))
        .ok_or_else(|| ParseError::elf("invalid relocation offset"))?;
    out.copy_from_slice(&value.to_le_bytes()[..width]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rela_bytes(offset: u64, sym: u32, r_type: u32, addend: i64) -> [u8; RELA_ENTRY_SIZE] {
        let mut out = [0u8; RELA_ENTRY_SIZE];
        out[0..8].copy_from_slice(&offset.to_le_bytes());
        let info = (u64::from(sym) << 32) | u64::from(r_type);
        out[8..16].copy_from_slice(&info.to_le_bytes());
        out[16..24].copy_from_slice(&addend.to_le_bytes());
        out
    }

    fn symtab_bytes(values: &[u64]) -> Vec<u8> {
        let mut out = Vec::new();
        for &value in values {
            let mut sym = [0u8; SYM_ENTRY_SIZE];
            sym[8..16].copy_from_slice(&value.to_le_bytes());
            out.extend_from_slice(&sym);
        }
        out
    }

    #[test]
    fn applies_64_bit_relocation() {
        let symtab = symtab_bytes(&[0, 0x1000]);
        let mut target = vec![0u8; 16];
        let rela = rela_bytes(4, 1, R_X86_64_64, 0x20);
        apply_relocations(&mut target, &rela, &SymbolTable::new(&symtab)).unwrap();
        assert_eq!(
            u64::from_le_bytes(target[4..12].try_into().unwrap()),
            0x1020
        );
    }

    #[test]
    fn applies_32_bit_relocation() {
        let symtab = symtab_bytes(&[0, 0xdead_0000]);
        let mut target = vec![0u8; 8];
        let rela = rela_bytes(0, 1, R_X86_64_32, 0xbeef);
        apply_relocations(&mut target, &rela, &SymbolTable::new(&symtab)).unwrap();
        assert_eq!(
            u32::from_le_bytes(target[0..4].try_into().unwrap()),
            0xdead_beef
        );
        assert_eq!(&target[4..], &[0u8; 4]);
    }

    #[test]
    fn none_relocation_is_a_no_op() {
        let symtab = symtab_bytes(&[0]);
        let mut target = vec![0xaau8; 8];
        let rela = rela_bytes(0, 0, R_X86_64_NONE, 0);
        apply_relocations(&mut target, &rela, &SymbolTable::new(&symtab)).unwrap();
        assert_eq!(target, vec![0xaau8; 8]);
    }

    #[test]
    fn rejects_unknown_relocation_type() {
        let symtab = symtab_bytes(&[0]);
        let mut target = vec![0u8; 8];
        let rela = rela_bytes(0, 0, 2, 0); // R_X86_64_PC32
        assert!(matches!(
            apply_relocations(&mut target, &rela, &SymbolTable::new(&symtab)),
            Err(ParseError::UnsupportedRelocation(2))
        ));
    }

    #[test]
    fn rejects_out_of_range_symbol() {
        let symtab = symtab_bytes(&[0]);
        let mut target = vec![0u8; 8];
        let rela = rela_bytes(0, 5, R_X86_64_64, 0);
        assert!(matches!(
            apply_relocations(&mut target, &rela, &SymbolTable::new(&symtab)),
            Err(ParseError::ElfFormat(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let symtab = symtab_bytes(&[0]);
        let mut target = vec![0u8; 8];
        let rela = rela_bytes(4, 0, R_X86_64_64, 0);
        assert!(matches!(
            apply_relocations(&mut target, &rela, &SymbolTable::new(&symtab)),
            Err(ParseError::ElfFormat(_))
        ));
    }

    #[test]
    fn trailing_partial_entry_is_ignored() {
        let symtab = symtab_bytes(&[0]);
        let mut target = vec![0u8; 8];
        let mut rela = rela_bytes(0, 0, R_X86_64_NONE, 0).to_vec();
        rela.extend_from_slice(&[0u8; 7]);
        apply_relocations(&mut target, &rela, &SymbolTable::new(&symtab)).unwrap();
    }
}
