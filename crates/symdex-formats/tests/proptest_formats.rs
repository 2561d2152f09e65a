//! Property-based tests for the format parsers.
//!
//! These tests verify that the parsers handle arbitrary input safely
//! and that the directory canonicalization behaves like a path
//! normalizer.

use proptest::prelude::*;
use siphasher::sip::SipHasher;
use std::hash::Hasher;

use symdex_formats::dwarf::line::{hash_directory, read_file_name_table};
use symdex_formats::dwarf::{AbbrevTable, UnitHeader};
use symdex_formats::elf;
use symdex_formats::Reader;

fn dir_hash(path: &[u8]) -> u64 {
    let mut hash = SipHasher::new();
    hash_directory(&mut hash, path);
    hash.finish()
}

fn unit32() -> UnitHeader {
    UnitHeader {
        unit_length: 0,
        version: 4,
        debug_abbrev_offset: 0,
        address_size: 8,
        is_64_bit: false,
    }
}

/// A path component with no slashes and no dots.
fn component() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    /// ELF discovery never panics on arbitrary input.
    #[test]
    fn elf_discover_never_panics(data in prop::collection::vec(any::<u8>(), 0..1024)) {
        let _ = elf::discover(&data);
    }

    /// Abbreviation compilation never panics on arbitrary input.
    #[test]
    fn abbrev_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = AbbrevTable::parse(&data, &unit32());
    }

    /// File table reading never panics on arbitrary input.
    #[test]
    fn file_table_never_panics(
        data in prop::collection::vec(any::<u8>(), 0..512),
        offset in 0u64..600,
    ) {
        let _ = read_file_name_table(&data, offset);
    }

    /// Unit headers parse deterministically.
    #[test]
    fn unit_header_is_deterministic(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let first = UnitHeader::parse(&mut Reader::new(&data));
        let second = UnitHeader::parse(&mut Reader::new(&data));
        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.unit_length, b.unit_length);
                prop_assert_eq!(a.version, b.version);
                prop_assert_eq!(a.is_64_bit, b.is_64_bit);
            }
            (Err(_), Err(_)) => {}
            _ => prop_assert!(false, "results should be consistent"),
        }
    }

    /// A ULEB128 encoding round-trips through the reader.
    #[test]
    fn uleb128_round_trips(value in any::<u64>()) {
        let mut encoded = Vec::new();
        let mut rest = value;
        loop {
            let byte = (rest & 0x7f) as u8;
            rest >>= 7;
            if rest == 0 {
                encoded.push(byte);
                break;
            }
            encoded.push(byte | 0x80);
        }
        let mut reader = Reader::new(&encoded);
        prop_assert_eq!(reader.read_uleb128("value").unwrap(), value);
        prop_assert!(reader.is_empty());
    }

    /// Doubled slashes never change a directory hash.
    #[test]
    fn slashes_collapse(parts in prop::collection::vec(component(), 1..5)) {
        let single = parts.join("/");
        let doubled = parts.join("//");
        prop_assert_eq!(dir_hash(single.as_bytes()), dir_hash(doubled.as_bytes()));
    }

    /// "." components never change a directory hash.
    #[test]
    fn dot_components_drop(parts in prop::collection::vec(component(), 1..5)) {
        let plain = parts.join("/");
        let dotted = parts.join("/./");
        prop_assert_eq!(dir_hash(plain.as_bytes()), dir_hash(dotted.as_bytes()));
    }

    /// Trailing slashes never change a directory hash.
    #[test]
    fn trailing_slash_drops(parts in prop::collection::vec(component(), 1..5)) {
        let plain = parts.join("/");
        let trailing = format!("{plain}/");
        prop_assert_eq!(dir_hash(plain.as_bytes()), dir_hash(trailing.as_bytes()));
    }

    /// Appending "name/.." to a path never changes its hash.
    #[test]
    fn dot_dot_cancels(
        parts in prop::collection::vec(component(), 1..5),
        extra in component(),
    ) {
        let plain = parts.join("/");
        let detour = format!("{plain}/{extra}/..");
        prop_assert_eq!(dir_hash(plain.as_bytes()), dir_hash(detour.as_bytes()));
    }

    /// Absolute and relative forms of the same path hash apart.
    #[test]
    fn absolute_differs_from_relative(parts in prop::collection::vec(component(), 1..5)) {
        let relative = parts.join("/");
        let absolute = format!("/{relative}");
        prop_assert_ne!(dir_hash(relative.as_bytes()), dir_hash(absolute.as_bytes()));
    }

    /// ".." above the root is absorbed; above a relative path it is
    /// significant.
    #[test]
    fn dot_dot_at_the_top(part in component()) {
        let absolute = format!("/../{part}");
        let rooted = format!("/{part}");
        prop_assert_eq!(dir_hash(absolute.as_bytes()), dir_hash(rooted.as_bytes()));

        let escaped = format!("../{part}");
        prop_assert_ne!(dir_hash(escaped.as_bytes()), dir_hash(part.as_bytes()));
    }
}
