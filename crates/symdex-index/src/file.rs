//! Memory-mapped object files.
//!
//! Each indexed file is mapped copy-on-write: the relocation pass
//! writes symbol values straight into the mapped debug sections, and a
//! private mapping keeps those writes out of the file on disk. The
//! mapped region is stable for the life of the index, which is what
//! lets hash entries hold name pointers into it.

use std::fs;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use symdex_formats::elf::{self, DebugSection, Section, SectionMap};

use crate::error::{Error, Result};

#[derive(Debug)]
pub(crate) struct FileData {
    pub path: PathBuf,
    map: MmapMut,
    sections: SectionMap,
}

/// One unit of relocation work: a debug section together with its
/// `.rela` entries and the symbol table they reference.
pub(crate) struct RelocBatch<'a> {
    pub target: &'a mut [u8],
    pub rela: &'a [u8],
    pub symtab: &'a [u8],
}

impl FileData {
    /// Maps a file and locates its sections.
    ///
    /// Returns `Ok(None)` if the file is valid ELF without debug
    /// information; such files are skipped, not indexed.
    pub fn open(path: &Path) -> Result<Option<Self>> {
        let os_err = |source| Error::Os {
            path: path.to_path_buf(),
            source,
        };
        let file = fs::File::open(path).map_err(os_err)?;
        // SAFETY: the mapping is private (copy-on-write), so concurrent
        // modification of the underlying file cannot corrupt our view
        // beyond producing garbage bytes, which parsing rejects.
        let map = unsafe { MmapOptions::new().map_copy(&file) }.map_err(os_err)?;

        let Some(sections) = elf::discover(&map)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            path: path.to_path_buf(),
            map,
            sections,
        }))
    }

    /// The whole mapped file.
    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    /// The bytes of one debug section.
    pub fn debug(&self, kind: DebugSection) -> &[u8] {
        self.sections.debug_bytes(&self.map, kind)
    }

    /// Splits the mapping into per-section relocation batches, one per
    /// debug section that has a `.rela` companion. The batches may be
    /// worked on concurrently; section discovery guaranteed the ranges
    /// are disjoint.
    pub fn reloc_batches(&mut self) -> Vec<RelocBatch<'_>> {
        let symtab = self.sections.symtab;
        let mut carve: Vec<Section> = vec![symtab];
        let mut pairs = Vec::new();
        for kind in DebugSection::ALL {
            if let Some(rela) = self.sections.rela[kind as usize] {
                let target = self.sections.debug[kind as usize];
                carve.push(target);
                carve.push(rela);
                pairs.push((target, rela));
            }
        }
        if pairs.is_empty() {
            return Vec::new();
        }

        // Regroup the carved slices by role. Sections are identified by
        // their header index, so the matches are unambiguous.
        let mut symtab_bytes: &[u8] = &[];
        let mut targets: Vec<(Section, &mut [u8])> = Vec::new();
        let mut relas: Vec<(Section, &[u8])> = Vec::new();
        for (section, bytes) in carve_sections(&mut self.map, carve) {
            if section == symtab {
                symtab_bytes = bytes;
            } else if pairs.iter().any(|(target, _)| *target == section) {
                targets.push((section, bytes));
            } else {
                relas.push((section, bytes));
            }
        }

        let mut batches = Vec::with_capacity(pairs.len());
        for (target, rela) in pairs {
            let position = targets
                .iter()
                .position(|(section, _)| *section == target)
                .expect("target was carved");
            let (_, target_bytes) = targets.swap_remove(position);
            let (_, rela_bytes) = *relas
                .iter()
                .find(|(section, _)| *section == rela)
                .expect("rela was carved");
            batches.push(RelocBatch {
                target: target_bytes,
                rela: rela_bytes,
                symtab: symtab_bytes,
            });
        }
        batches
    }
}

/// Splits `map` into one mutable slice per requested section.
///
/// The sections must be in bounds and pairwise disjoint, which section
/// discovery enforced.
fn carve_sections(map: &mut [u8], mut sections: Vec<Section>) -> Vec<(Section, &mut [u8])> {
    sections.sort_by_key(|s| s.offset);
    let mut out = Vec::with_capacity(sections.len());
    let mut rest = map;
    let mut base = 0;
    for section in sections {
        let (_, tail) = rest.split_at_mut(section.offset - base);
        let (bytes, tail) = tail.split_at_mut(section.size);
        out.push((section, bytes));
        rest = tail;
        base = section.offset + section.size;
    }
    out
}
