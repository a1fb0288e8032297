//! Long file name records: up to twenty 32-byte slots preceding the real
//! entry, each carrying 13 UTF-16 units, an ordinal and the short-name
//! checksum that ties the run together.

use alloc::string::String;
use alloc::vec::Vec;

use crate::dir::entry::{Attributes, DirEntry, ENTRY_SIZE};
use crate::dir::short_name::ShortName;
use crate::endian;
use crate::error::InputError;

pub(crate) const UNITS_PER_SLOT: usize = 13;
pub(crate) const MAX_SLOTS: usize = 20;
/// Structural limit of the ordinal scheme, not the shorter Windows bound.
pub(crate) const MAX_NAME_UNITS: usize = UNITS_PER_SLOT * MAX_SLOTS;

/// Bit marking the highest-ordinal slot, which is physically first on disk.
const LAST_MARKER: u8 = 0x40;

const ATTRIBUTES_OFFSET: usize = 11;
const KIND_OFFSET: usize = 12;
const CHECKSUM_OFFSET: usize = 13;
const CLUSTER_OFFSET: usize = 26;

/// Byte offsets of the 13 UTF-16 units within a slot.
const UNIT_OFFSETS: [usize; UNITS_PER_SLOT] = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];

pub(crate) fn slot_count(units: usize) -> usize {
    (units + UNITS_PER_SLOT - 1) / UNITS_PER_SLOT
}

/// Compose the slot run for `name`, in on-disk order (highest ordinal
/// first). The caller appends the real entry afterwards.
pub(crate) fn encode(name: &str, short_name: &ShortName) -> Result<Vec<DirEntry>, InputError> {
    let units: Vec<u16> = name.encode_utf16().collect();
    if units.is_empty() {
        return Err(InputError::InvalidArgument("empty name"));
    }
    if units.len() > MAX_NAME_UNITS {
        return Err(InputError::NameTooLong(units.len()));
    }
    let checksum = short_name.checksum();
    let count = slot_count(units.len());
    let mut slots = Vec::with_capacity(count);
    for ordinal in (1..=count).rev() {
        let mut data = [0u8; ENTRY_SIZE];
        data[0] = ordinal as u8 | if ordinal == count { LAST_MARKER } else { 0 };
        data[ATTRIBUTES_OFFSET] = Attributes::LFN;
        data[KIND_OFFSET] = 0;
        data[CHECKSUM_OFFSET] = checksum;
        endian::set_u16(&mut data, CLUSTER_OFFSET, 0);
        for (i, &offset) in UNIT_OFFSETS.iter().enumerate() {
            let index = (ordinal - 1) * UNITS_PER_SLOT + i;
            // One 0x0000 terminator when the name does not fill the last
            // slot, 0xFFFF padding after it.
            let value = match index {
                _ if index < units.len() => units[index],
                _ if index == units.len() => 0x0000,
                _ => 0xFFFF,
            };
            endian::set_u16(&mut data, offset, value);
        }
        slots.push(DirEntry::from_bytes(data));
    }
    Ok(slots)
}

/// Decompose a slot run read in on-disk order against the real entry's
/// checksum. `None` means the record is inconsistent and the entry is
/// treated as short-name-only.
pub(crate) fn decode(slots: &[DirEntry], checksum: u8) -> Option<String> {
    if slots.is_empty() || slots.len() > MAX_SLOTS {
        return None;
    }
    let count = slots.len();
    for (i, slot) in slots.iter().enumerate() {
        let data = slot.bytes();
        let expected = (count - i) as u8 | if i == 0 { LAST_MARKER } else { 0 };
        if data[0] != expected
            || data[ATTRIBUTES_OFFSET] & 0x3F != Attributes::LFN
            || data[CHECKSUM_OFFSET] != checksum
        {
            return None;
        }
    }
    let mut units = Vec::with_capacity(count * UNITS_PER_SLOT);
    for slot in slots.iter().rev() {
        for &offset in UNIT_OFFSETS.iter() {
            units.push(endian::get_u16(slot.bytes(), offset));
        }
    }
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16(&units[..end]).ok()
}

#[cfg(test)]
mod test {
    use super::*;

    fn short() -> ShortName {
        ShortName::new("DUMMY", "IFL").unwrap()
    }

    #[test]
    fn round_trip_spans_slots() {
        let name = "Long Name With Unicode — café.txt";
        let slots = encode(name, &short()).unwrap();
        assert_eq!(slots.len(), slot_count(name.encode_utf16().count()));
        assert_eq!(decode(&slots, short().checksum()), Some(name.into()));
    }

    #[test]
    fn ordinals_descend_with_last_marker_first() {
        let slots = encode("exactly thirteen chars here!", &short()).unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].bytes()[0], 3 | 0x40);
        assert_eq!(slots[1].bytes()[0], 2);
        assert_eq!(slots[2].bytes()[0], 1);
        for slot in &slots {
            assert!(slot.is_lfn());
            assert_eq!(slot.bytes()[13], short().checksum());
        }
    }

    #[test]
    fn terminator_and_padding() {
        // 4 units in a 13-unit slot: terminator at index 4, 0xFFFF after.
        let slots = encode("abcd", &short()).unwrap();
        assert_eq!(slots.len(), 1);
        let data = slots[0].bytes();
        assert_eq!(endian::get_u16(data, 9), 0x0000);
        assert_eq!(endian::get_u16(data, 14), 0xFFFF);
        assert_eq!(endian::get_u16(data, 30), 0xFFFF);

        // A name filling its slots exactly carries no terminator.
        let slots = encode("exactly13char", &short()).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(endian::get_u16(slots[0].bytes(), 30), 'r' as u16);
        assert_eq!(decode(&slots, short().checksum()), Some("exactly13char".into()));
    }

    #[test]
    fn checksum_mismatch_invalidates_the_record() {
        let slots = encode("orphaned record.dat", &short()).unwrap();
        assert_eq!(decode(&slots, short().checksum() ^ 0x55), None);
    }

    #[test]
    fn name_length_limits() {
        let long: String = core::iter::repeat('x').take(MAX_NAME_UNITS).collect();
        assert!(encode(&long, &short()).is_ok());
        let over: String = core::iter::repeat('x').take(MAX_NAME_UNITS + 1).collect();
        let err = encode(&over, &short()).map(|_| ()).unwrap_err();
        assert_eq!(err, InputError::NameTooLong(MAX_NAME_UNITS + 1));
    }
}
