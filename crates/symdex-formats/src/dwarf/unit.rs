//! DWARF compilation unit headers (.debug_info).

use crate::{ParseError, Reader};

/// A parsed compilation unit header.
///
/// Both DWARF32 and DWARF64 encodings are accepted; the distinction
/// decides the width of offset-sized fields throughout the unit.
#[derive(Debug, Clone)]
pub struct UnitHeader {
    /// Unit length, excluding the initial length field itself.
    pub unit_length: u64,
    /// DWARF version; 2, 3 and 4 are accepted.
    pub version: u16,
    /// Offset of this unit's abbreviation table in .debug_abbrev.
    pub debug_abbrev_offset: u64,
    /// Address size in bytes.
    pub address_size: u8,
    /// True for the DWARF64 encoding.
    pub is_64_bit: bool,
}

impl UnitHeader {
    /// Parses a unit header at the reader's current position.
    ///
    /// The reader ends up positioned after the header, at the unit's
    /// root DIE.
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self, ParseError> {
        let initial = reader.read_u32("compilation unit header")?;
        let is_64_bit = initial == 0xffff_ffff;
        let unit_length = if is_64_bit {
            reader.read_u64("compilation unit header")?
        } else {
            u64::from(initial)
        };

        let version = reader.read_u16("compilation unit header")?;
        if !(2..=4).contains(&version) {
            return Err(ParseError::dwarf(format!("unknown DWARF version {version}")));
        }

        let debug_abbrev_offset = if is_64_bit {
            reader.read_u64("compilation unit header")?
        } else {
            u64::from(reader.read_u32("compilation unit header")?)
        };
        let address_size = reader.read_u8("compilation unit header")?;

        Ok(Self {
            unit_length,
            version,
            debug_abbrev_offset,
            address_size,
            is_64_bit,
        })
    }

    /// Size of the header in bytes.
    pub fn header_len(&self) -> usize {
        if self.is_64_bit {
            23
        } else {
            11
        }
    }

    /// Total size of the unit, header and initial length field included.
    pub fn total_len(&self) -> u64 {
        let initial_length = if self.is_64_bit { 12 } else { 4 };
        initial_length + self.unit_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dwarf32_header() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x100u32.to_le_bytes());
        data.extend_from_slice(&4u16.to_le_bytes());
        data.extend_from_slice(&0x30u32.to_le_bytes());
        data.push(8);

        let mut reader = Reader::new(&data);
        let header = UnitHeader::parse(&mut reader).unwrap();
        assert!(!header.is_64_bit);
        assert_eq!(header.unit_length, 0x100);
        assert_eq!(header.version, 4);
        assert_eq!(header.debug_abbrev_offset, 0x30);
        assert_eq!(header.address_size, 8);
        assert_eq!(header.header_len(), 11);
        assert_eq!(header.total_len(), 0x104);
        assert_eq!(reader.offset(), 11);
    }

    #[test]
    fn parses_dwarf64_header() {
        let mut data = Vec::new();
        data.extend_from_slice(&0xffff_ffffu32.to_le_bytes());
        data.extend_from_slice(&0x1000u64.to_le_bytes());
        data.extend_from_slice(&3u16.to_le_bytes());
        data.extend_from_slice(&0x40u64.to_le_bytes());
        data.push(8);

        let mut reader = Reader::new(&data);
        let header = UnitHeader::parse(&mut reader).unwrap();
        assert!(header.is_64_bit);
        assert_eq!(header.unit_length, 0x1000);
        assert_eq!(header.debug_abbrev_offset, 0x40);
        assert_eq!(header.header_len(), 23);
        assert_eq!(header.total_len(), 0x100c);
        assert_eq!(reader.offset(), 23);
    }

    #[test]
    fn rejects_unknown_version() {
        for version in [1u16, 5] {
            let mut data = Vec::new();
            data.extend_from_slice(&0x100u32.to_le_bytes());
            data.extend_from_slice(&version.to_le_bytes());
            data.extend_from_slice(&0u32.to_le_bytes());
            data.push(8);
            assert!(matches!(
                UnitHeader::parse(&mut Reader::new(&data)),
                Err(ParseError::DwarfFormat(_))
            ));
        }
    }

    #[test]
    fn truncated_header_is_eof() {
        let data = 0x100u32.to_le_bytes();
        assert!(matches!(
            UnitHeader::parse(&mut Reader::new(&data)),
            Err(ParseError::UnexpectedEof(_))
        ));
    }
}
