//! Collaborator interfaces for materializing query results.
//!
//! The index itself only knows CU and DIE offsets. What a caller gets
//! back from `find` is decided by a [`DieFactory`]: a debugger plugs in
//! its own object model here, lazily building per-file and per-CU
//! objects that the index memoizes. [`HandleFactory`] is the built-in
//! implementation that just records the offsets.

use std::path::{Path, PathBuf};

/// Result type for factory constructors.
pub type FactoryResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Builds the opaque objects returned from `find`.
pub trait DieFactory {
    /// Per-file object, built once per file that produces a result.
    type File;
    /// Per-CU object, built once per compilation unit offset.
    type Cu;
    /// The result type handed back to the caller.
    type Die;

    /// Builds the per-file object from the file's path and its mapped
    /// contents.
    fn open(&self, path: &Path, data: &[u8]) -> FactoryResult<Self::File>;

    /// Builds the object for the compilation unit at `cu_offset` within
    /// the file's .debug_info section.
    fn compilation_unit(&self, file: &Self::File, cu_offset: u64) -> FactoryResult<Self::Cu>;

    /// Builds the object for the DIE at `die_offset` within the unit.
    fn die(&self, cu: &Self::Cu, die_offset: u64) -> FactoryResult<Self::Die>;
}

/// A factory whose objects are plain path-and-offset handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandleFactory;

#[derive(Debug, Clone)]
pub struct FileHandle {
    path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CuHandle {
    path: PathBuf,
    cu_offset: u64,
}

/// A resolved DIE: which file and compilation unit it lives in, and
/// where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DieHandle {
    pub path: PathBuf,
    /// Offset of the compilation unit within .debug_info.
    pub cu_offset: u64,
    /// Offset of the DIE within its compilation unit.
    pub die_offset: u64,
}

impl DieFactory for HandleFactory {
    type File = FileHandle;
    type Cu = CuHandle;
    type Die = DieHandle;

    fn open(&self, path: &Path, _data: &[u8]) -> FactoryResult<FileHandle> {
        Ok(FileHandle {
            path: path.to_path_buf(),
        })
    }

    fn compilation_unit(&self, file: &FileHandle, cu_offset: u64) -> FactoryResult<CuHandle> {
        Ok(CuHandle {
            path: file.path.clone(),
            cu_offset,
        })
    }

    fn die(&self, cu: &CuHandle, die_offset: u64) -> FactoryResult<DieHandle> {
        Ok(DieHandle {
            path: cu.path.clone(),
            cu_offset: cu.cu_offset,
            die_offset,
        })
    }
}
