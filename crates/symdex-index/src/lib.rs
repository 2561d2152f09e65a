//! # symdex-index
//!
//! A build-once, query-many index over the DWARF debugging information
//! of a set of ELF object files. [`DwarfIndex::add`] maps each file,
//! applies its debug relocations, and walks every DIE of every
//! compilation unit in parallel, filling a lock-free name hash.
//! [`DwarfIndex::find`] then answers "which DIEs define this name" by
//! probing the hash and materializing results through a caller-supplied
//! [`DieFactory`].
//!
//! The intended consumer is an interactive debugger resolving type and
//! variable names across very large debug corpora (a kernel's worth of
//! object files); everything in the build path is shaped by that: the
//! abbreviation tables are compiled to byte-code once per unit, units
//! are distributed dynamically over a work-stealing pool, and the hash
//! is a fixed-size open-addressed table that needs no locks.

mod diehash;
mod error;
mod factory;
mod file;
mod walk;

pub use diehash::{name_hash, DIE_HASH_SIZE};
pub use error::{Error, Result};
pub use factory::{CuHandle, DieFactory, DieHandle, FactoryResult, FileHandle, HandleFactory};

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

use rayon::prelude::*;
use symdex_formats::dwarf::UnitHeader;
use symdex_formats::elf::{apply_relocations, DebugSection, SymbolTable};
use symdex_formats::{reader, ParseError, Reader};

use diehash::{DieHash, FoundDie};
use file::FileData;

/// One compilation unit known to the index.
#[derive(Debug)]
pub(crate) struct Cu {
    pub header: UnitHeader,
    /// Offset of the unit within its file's .debug_info section.
    pub offset: usize,
    /// Index of the owning file.
    pub file: u32,
}

/// Lazily built factory objects for one file.
struct ObjectCache<F: DieFactory> {
    file: Option<F::File>,
    cus: HashMap<u64, F::Cu>,
}

impl<F: DieFactory> Default for ObjectCache<F> {
    fn default() -> Self {
        Self {
            file: None,
            cus: HashMap::new(),
        }
    }
}

/// The DWARF name index.
pub struct DwarfIndex<F: DieFactory> {
    factory: F,
    files: Vec<FileData>,
    caches: Vec<ObjectCache<F>>,
    cus: Vec<Cu>,
    hash: DieHash,
    address_size: u8,
}

impl<F: DieFactory> DwarfIndex<F> {
    /// Creates an empty index.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            files: Vec::new(),
            caches: Vec::new(),
            cus: Vec::new(),
            hash: DieHash::new(),
            address_size: 0,
        }
    }

    /// Creates an index and immediately indexes `paths`.
    pub fn with_paths<P>(factory: F, paths: impl IntoIterator<Item = P>) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let mut index = Self::new(factory);
        index.add(paths)?;
        Ok(index)
    }

    /// Indexes the debugging information of the given files. May be
    /// called repeatedly; files accumulate.
    ///
    /// Files without debugging information are skipped silently. On
    /// error, files that had not yet contributed hash entries are
    /// dropped again; once per-CU indexing has started, published
    /// entries may already reference the new units, so the files stay.
    pub fn add<P>(&mut self, paths: impl IntoIterator<Item = P>) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let old_num_files = self.files.len();
        let old_num_cus = self.cus.len();
        if let Err(error) = self.prepare(paths, old_num_files) {
            self.files.truncate(old_num_files);
            self.caches.truncate(old_num_files);
            self.cus.truncate(old_num_cus);
            return Err(error);
        }
        self.index_cus(old_num_cus)
    }

    /// Phases that may be rolled back: mapping and section discovery,
    /// relocation, and CU enumeration.
    fn prepare<P>(&mut self, paths: impl IntoIterator<Item = P>, old_num_files: usize) -> Result<()>
    where
        P: AsRef<Path>,
    {
        for path in paths {
            if let Some(data) = FileData::open(path.as_ref())? {
                self.files.push(data);
                self.caches.push(ObjectCache::default());
            }
        }
        if self.files.len() == old_num_files {
            return Ok(());
        }

        // Relocations are applied in parallel over the flattened list
        // of (file, debug section) batches, so one file's outsized
        // .rela.debug_info does not serialize the whole pass.
        let mut batches = Vec::new();
        for file in &mut self.files[old_num_files..] {
            batches.extend(file.reloc_batches());
        }
        batches.into_par_iter().try_for_each(|batch| {
            apply_relocations(batch.target, batch.rela, &SymbolTable::new(batch.symtab))
        })?;

        for file_index in old_num_files..self.files.len() {
            let file = &self.files[file_index];
            // Name pointers into .debug_str rely on this terminator.
            if file.debug(DebugSection::Str).last() != Some(&0) {
                return Err(ParseError::dwarf(".debug_str is not NUL-terminated").into());
            }
            read_cus(file, file_index as u32, &mut self.cus, &mut self.address_size)?;
        }
        Ok(())
    }

    /// Walks the new compilation units in parallel. Unit sizes vary by
    /// orders of magnitude, so scheduling is dynamic; the first error
    /// wins and the rest of the work is skipped.
    fn index_cus(&mut self, old_num_cus: usize) -> Result<()> {
        let files = &self.files;
        let cus = &self.cus;
        let hash = &self.hash;
        (old_num_cus..cus.len())
            .into_par_iter()
            .try_for_each(|cu_index| walk::index_cu(files, cus, hash, cu_index as u32))
    }

    /// Finds every DIE defining `name`. A non-zero `tag` restricts the
    /// matches to that DWARF tag.
    ///
    /// Queries are single-threaded: the factory object caches are
    /// filled lazily here.
    pub fn find(&mut self, name: &str, tag: u64) -> Result<Vec<F::Die>> {
        let matches = self.hash.find(name.as_bytes(), tag);
        if matches.is_empty() {
            return Err(Error::NotFound(name.to_string()));
        }
        let mut dies = Vec::with_capacity(matches.len());
        for found in matches {
            dies.push(self.die_object(found)?);
        }
        Ok(dies)
    }

    fn die_object(&mut self, found: FoundDie) -> Result<F::Die> {
        let cu = &self.cus[found.cu as usize];
        let file_index = cu.file as usize;
        let cu_offset = cu.offset as u64;

        let cache = &mut self.caches[file_index];
        let cu_obj = match cache.cus.entry(cu_offset) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let file_obj = match &mut cache.file {
                    Some(obj) => obj,
                    None => {
                        let data = &self.files[file_index];
                        let obj = self
                            .factory
                            .open(&data.path, data.bytes())
                            .map_err(Error::Factory)?;
                        cache.file.insert(obj)
                    }
                };
                let cu_obj = self
                    .factory
                    .compilation_unit(file_obj, cu_offset)
                    .map_err(Error::Factory)?;
                entry.insert(cu_obj)
            }
        };
        self.factory
            .die(cu_obj, found.die_offset - cu_offset)
            .map_err(Error::Factory)
    }

    /// Address size in bytes, as reported by the most recently parsed
    /// compilation unit.
    pub fn address_size(&self) -> u8 {
        self.address_size
    }

    /// Paths of the files that were indexed, excluding files that had
    /// no debugging information.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|file| file.path.as_path())
    }
}

impl<F: DieFactory> std::fmt::Debug for DwarfIndex<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DwarfIndex")
            .field("files", &self.files.len())
            .field("cus", &self.cus.len())
            .finish()
    }
}

/// Appends every compilation unit of one file's .debug_info to the CU
/// table.
fn read_cus(
    file: &FileData,
    file_index: u32,
    cus: &mut Vec<Cu>,
    address_size: &mut u8,
) -> Result<()> {
    let debug_info = file.debug(DebugSection::Info);
    let mut cursor = Reader::new(debug_info);
    while !cursor.is_empty() {
        let offset = cursor.offset();
        let header = UnitHeader::parse(&mut cursor)?;
        let total_len = reader::to_index(header.total_len(), "compilation unit length")?;
        let next = offset
            .checked_add(total_len)
            .filter(|&next| next <= debug_info.len())
            .ok_or(ParseError::UnexpectedEof("compilation unit"))?;
        *address_size = header.address_size;
        cus.push(Cu {
            header,
            offset,
            file: file_index,
        });
        cursor.seek(next, "compilation unit")?;
    }
    Ok(())
}
