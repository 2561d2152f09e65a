//! The DIE name hash.
//!
//! A fixed-capacity open-addressed table with linear probing, shared by
//! every indexing worker without locks. The layout never changes after
//! construction, which is what makes it trivially shareable; the price
//! is a hard cap of 2^17 distinct entries per index.
//!
//! Publication protocol: a slot is claimed by compare-exchanging its
//! name pointer from null. The winner writes the remaining fields and
//! then stores the tag with release ordering; the tag doubles as the
//! "fully initialized" marker. Anyone who loses the race (or lands on
//! an occupied slot) acquire-loads the tag, spinning while it is still
//! zero, and only then reads the other fields. Entries are never
//! removed.
//!
//! Name pointers reference NUL-terminated strings inside the mapped
//! object files, which the index keeps alive for as long as the hash.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use crate::error::Error;

/// log2 of the table capacity.
pub const DIE_HASH_SHIFT: u32 = 17;
/// Number of slots.
pub const DIE_HASH_SIZE: usize = 1 << DIE_HASH_SHIFT;
const DIE_HASH_MASK: u32 = (DIE_HASH_SIZE - 1) as u32;

/// DJBX33A over the bytes of a name; used only for bucketing.
pub fn name_hash(name: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &byte in name {
        hash = hash.wrapping_mul(33).wrapping_add(u32::from(byte));
    }
    hash
}

/// DJBX33A over a NUL-terminated string.
///
/// # Safety
///
/// `name` must point to a readable NUL-terminated string.
unsafe fn cstr_hash(name: *const u8) -> u32 {
    let mut hash: u32 = 5381;
    let mut i = 0;
    loop {
        let byte = *name.add(i);
        if byte == 0 {
            return hash;
        }
        hash = hash.wrapping_mul(33).wrapping_add(u32::from(byte));
        i += 1;
    }
}

/// # Safety
///
/// Both pointers must reference readable NUL-terminated strings.
unsafe fn cstr_eq(a: *const u8, b: *const u8) -> bool {
    let mut i = 0;
    loop {
        let byte = *a.add(i);
        if byte != *b.add(i) {
            return false;
        }
        if byte == 0 {
            return true;
        }
        i += 1;
    }
}

/// # Safety
///
/// `a` must reference a readable NUL-terminated string.
unsafe fn cstr_eq_bytes(a: *const u8, b: &[u8]) -> bool {
    for (i, &byte) in b.iter().enumerate() {
        // A NUL in `b` cannot match: `a` ends there.
        if byte == 0 || *a.add(i) != byte {
            return false;
        }
    }
    *a.add(b.len()) == 0
}

/// Fields written between claiming a slot and publishing its tag.
#[derive(Debug, Clone, Copy, Default)]
struct EntryData {
    file_name_hash: u64,
    cu: u32,
    die_offset: u64,
}

#[derive(Default)]
struct Entry {
    /// Claim word; null means the slot is empty.
    name: AtomicPtr<u8>,
    /// Published last with release ordering; zero means not yet
    /// initialized.
    tag: AtomicU8,
    data: UnsafeCell<EntryData>,
}

// SAFETY: `data` is written exactly once, by the thread that won the
// `name` compare-exchange, before the release store to `tag`; it is
// only read after an acquire load observes a non-zero `tag`.
unsafe impl Sync for Entry {}

/// A published hash entry, as seen by `find`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundDie {
    /// Index into the CU table.
    pub cu: u32,
    /// Offset of the DIE within its file's .debug_info section.
    pub die_offset: u64,
}

pub struct DieHash {
    entries: Box<[Entry]>,
}

impl DieHash {
    pub fn new() -> Self {
        let entries = (0..DIE_HASH_SIZE).map(|_| Entry::default()).collect();
        Self { entries }
    }

    /// Inserts a DIE, deduplicating against entries with the same name,
    /// tag and file fingerprint. Safe to call from many threads at
    /// once.
    ///
    /// # Safety
    ///
    /// `name` must point to a NUL-terminated string that stays valid
    /// and unmodified for the hash's lifetime.
    pub unsafe fn insert(
        &self,
        name: *const u8,
        tag: u8,
        file_name_hash: u64,
        cu: u32,
        die_offset: u64,
    ) -> Result<(), Error> {
        let orig = cstr_hash(name) & DIE_HASH_MASK;
        let mut i = orig;
        loop {
            let entry = &self.entries[i as usize];
            let mut current = entry.name.load(Ordering::Relaxed);
            if current.is_null() {
                match entry.name.compare_exchange(
                    ptr::null_mut(),
                    name.cast_mut(),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        *entry.data.get() = EntryData {
                            file_name_hash,
                            cu,
                            die_offset,
                        };
                        entry.tag.store(tag, Ordering::Release);
                        return Ok(());
                    }
                    Err(existing) => current = existing,
                }
            }

            // The slot is taken. Wait for its writer to publish, then
            // check whether it is the same DIE.
            let mut entry_tag = entry.tag.load(Ordering::Acquire);
            while entry_tag == 0 {
                std::hint::spin_loop();
                entry_tag = entry.tag.load(Ordering::Acquire);
            }
            let data = *entry.data.get();
            if entry_tag == tag && data.file_name_hash == file_name_hash && cstr_eq(name, current)
            {
                return Ok(());
            }

            i = (i + 1) & DIE_HASH_MASK;
            if i == orig {
                return Err(Error::HashFull);
            }
        }
    }

    /// Collects every entry matching `name`, and `tag` unless it is
    /// zero. Probing stops at the first empty slot.
    pub fn find(&self, name: &[u8], tag: u64) -> Vec<FoundDie> {
        let mut results = Vec::new();
        let orig = name_hash(name) & DIE_HASH_MASK;
        let mut i = orig;
        loop {
            let entry = &self.entries[i as usize];
            let entry_name = entry.name.load(Ordering::Relaxed);
            if entry_name.is_null() {
                break;
            }

            let entry_tag = entry.tag.load(Ordering::Acquire);
            // SAFETY: a non-zero tag was published with release
            // ordering after the entry was fully written, and the name
            // points into a mapping the index still owns.
            if entry_tag != 0
                && (tag == 0 || u64::from(entry_tag) == tag)
                && unsafe { cstr_eq_bytes(entry_name, name) }
            {
                let data = unsafe { *entry.data.get() };
                results.push(FoundDie {
                    cu: data.cu,
                    die_offset: data.die_offset,
                });
            }

            i = (i + 1) & DIE_HASH_MASK;
            if i == orig {
                break;
            }
        }
        results
    }
}

impl Default for DieHash {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DieHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DieHash")
            .field("capacity", &DIE_HASH_SIZE)
            .finish()
    }
}
