//! Differential encoding of compact register maps.
//!
//! Adjacent GC points are usually a few code units apart and differ in zero
//! or one register, so each entry is stored as a change against the one
//! before it. The stream starts with the first address (high bit set if the
//! expanded map uses 16-bit addresses) and the first full bit vector, then
//! one record per remaining entry:
//!
//! ```text
//! key   CCCCBAAA
//!       AAA   address delta - 1, or 7 if a ULEB128 delta follows
//!       B=0   CCCC is the one toggled bit (0-15)
//!       B=1   CCCC is the number of toggled bits, each following as a
//!             ULEB128 index; 0 means unchanged, 15 means the full vector
//!             follows instead
//! [ULEB128 delta] [ULEB128 bit indices | full vector]
//! ```

use log::debug;

use crate::dex::leb::{decode_uleb128, uleb128_size, write_uleb128_into};
use crate::regmap::{MapError, MapFormat, MapResult, RegisterMap};

const ADDR_ESCAPE: u8 = 0x07;
const KEY_COUNT: u8 = 0x08;
const FULL_VECTOR: u8 = 0x0f;
const WIDE_ADDR: u8 = 0x80;

/// How one bit vector is stored relative to the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BitChange {
    Unchanged,
    /// A single toggled bit with an index below 16, inlined in the key.
    LowBit(u8),
    /// Toggled bit indices, written as ULEB128 after the key.
    Indices(Vec<u32>),
    /// The whole new vector.
    Full,
}

impl BitChange {
    /// Picks the cheapest representation of `next` given `prev`.
    fn between(prev: &[u8], next: &[u8]) -> BitChange {
        let changed = changed_bits(prev, next);
        let leb_size: usize = changed.iter().map(|&bit| uleb128_size(bit)).sum();

        if changed.is_empty() {
            BitChange::Unchanged
        } else if changed.len() == 1 && changed[0] < 16 {
            BitChange::LowBit(changed[0] as u8)
        } else if changed.len() < FULL_VECTOR as usize && leb_size < next.len() {
            BitChange::Indices(changed)
        } else {
            BitChange::Full
        }
    }

    /// The `CCCCB` bits of the key byte.
    fn key_bits(&self) -> u8 {
        match self {
            BitChange::Unchanged => KEY_COUNT,
            BitChange::LowBit(bit) => *bit << 4,
            BitChange::Indices(bits) => KEY_COUNT | (bits.len() as u8) << 4,
            BitChange::Full => KEY_COUNT | FULL_VECTOR << 4,
        }
    }

    fn write(&self, next: &[u8], out: &mut Vec<u8>) {
        match self {
            BitChange::Unchanged | BitChange::LowBit(_) => {}
            BitChange::Indices(bits) => {
                for &bit in bits {
                    write_uleb128_into(out, bit);
                }
            }
            BitChange::Full => out.extend_from_slice(next),
        }
    }
}

/// Indices of the bits that differ between two vectors, ascending.
fn changed_bits(prev: &[u8], next: &[u8]) -> Vec<u32> {
    let mut changed = vec![];
    for (byte_num, (&a, &b)) in prev.iter().zip(next).enumerate() {
        let diff = a ^ b;
        if diff == 0 {
            continue;
        }
        for bit_num in 0..8 {
            if diff >> bit_num & 0x01 != 0 {
                changed.push((byte_num as u32) << 3 | bit_num);
            }
        }
    }
    changed
}

/// Encodes a compact map differentially.
///
/// Returns `None` when the map cannot be encoded (fewer than two entries,
/// a first address of 128 or more, not a compact map) or when the encoding
/// would not be smaller than the original.
pub fn compress_map(map: &RegisterMap) -> Option<RegisterMap> {
    let addr_width = map.format().addr_width();
    if addr_width == 0 {
        debug!("Can't compress map with format {:?}", map.format());
        return None;
    }
    if map.num_entries() <= 1 {
        debug!("Can't compress map with 0 or 1 entries");
        return None;
    }

    let orig_size = map.size();
    let mut entries = map.entries();
    let (first_addr, first_bits) = entries.next()?;
    if first_addr >= 128 {
        debug!("Can't compress map with starting address {} >= 128", first_addr);
        return None;
    }

    let mut out = Vec::with_capacity(orig_size);
    out.push(first_addr as u8 | if addr_width > 1 { WIDE_ADDR } else { 0 });
    out.extend_from_slice(first_bits);

    let (mut prev_addr, mut prev_bits) = (first_addr, first_bits);
    for (addr, bits) in entries {
        let delta = match addr.checked_sub(prev_addr) {
            Some(delta) if delta > 0 => delta,
            _ => {
                debug!("Can't compress map with unordered addresses 0x{:04x}, 0x{:04x}", prev_addr, addr);
                return None;
            }
        };

        let change = BitChange::between(prev_bits, bits);
        let addr_key = if delta < 8 { (delta - 1) as u8 } else { ADDR_ESCAPE };
        out.push(addr_key | change.key_bits());
        if addr_key == ADDR_ESCAPE {
            write_uleb128_into(&mut out, delta as u32);
        }
        change.write(bits, &mut out);

        if out.len() >= orig_size {
            debug!("Compressed size >= original ({} vs {})", out.len(), orig_size);
            return None;
        }
        prev_addr = addr;
        prev_bits = bits;
    }

    let compressed = RegisterMap::new(MapFormat::Differential, map.reg_width() as u8, map.num_entries() as u16, out);
    if compressed.size() >= orig_size {
        debug!("Final compressed size >= original ({} vs {})", compressed.size(), orig_size);
        return None;
    }

    debug!(
        "Compression successful ({} -> {}) from aw={} rw={} ne={}",
        orig_size,
        compressed.size(),
        addr_width,
        map.reg_width(),
        map.num_entries()
    );
    Some(compressed)
}

fn next_byte(src: &[u8], ix: &mut usize) -> MapResult<u8> {
    let byte = *src.get(*ix).ok_or(MapError::Truncated)?;
    *ix += 1;
    Ok(byte)
}

fn next_bytes<'a>(src: &'a [u8], ix: &mut usize, len: usize) -> MapResult<&'a [u8]> {
    let bytes = src.get(*ix..*ix + len).ok_or(MapError::Truncated)?;
    *ix += len;
    Ok(bytes)
}

fn next_uleb128(src: &[u8], ix: &mut usize) -> MapResult<u32> {
    let (value, len) = decode_uleb128(&src[(*ix).min(src.len())..]).ok_or(MapError::Truncated)?;
    *ix += len;
    Ok(value)
}

fn toggle_bit(bits: &mut [u8], idx: u32) -> MapResult<()> {
    match bits.get_mut((idx >> 3) as usize) {
        Some(byte) => {
            *byte ^= 1 << (idx & 0x07);
            Ok(())
        }
        None => Err(MapError::Corrupt(format!("bit index {} beyond vector of {} bytes", idx, bits.len()))),
    }
}

/// Expands a differential map back to its compact form.
pub fn uncompress_map(map: &RegisterMap) -> MapResult<RegisterMap> {
    if map.format() != MapFormat::Differential {
        return Err(MapError::BadFormat(map.format().to_byte()));
    }

    let reg_width = map.reg_width();
    let num_entries = map.num_entries();
    let src = map.data();
    let mut ix = 0usize;

    let first = next_byte(src, &mut ix)?;
    let (format, addr_width) = if first & WIDE_ADDR == 0 {
        (MapFormat::Compact8, 1)
    } else {
        (MapFormat::Compact16, 2)
    };
    let max_addr = if addr_width == 1 { u8::MAX as usize } else { u16::MAX as usize };

    let expected_size = (addr_width + reg_width) * num_entries;
    let mut out = Vec::with_capacity(expected_size);
    let push_addr = |out: &mut Vec<u8>, addr: usize| {
        out.push((addr & 0xff) as u8);
        if addr_width > 1 {
            out.push((addr >> 8) as u8);
        }
    };

    let mut addr = (first & !WIDE_ADDR) as usize;
    push_addr(&mut out, addr);
    let mut prev_start = out.len();
    out.extend_from_slice(next_bytes(src, &mut ix, reg_width)?);

    for entry in 1..num_entries {
        let key = next_byte(src, &mut ix)?;
        let delta = if key & ADDR_ESCAPE == ADDR_ESCAPE {
            next_uleb128(src, &mut ix)? as usize
        } else {
            (key & ADDR_ESCAPE) as usize + 1
        };
        addr += delta;
        if addr > max_addr {
            return Err(MapError::Corrupt(format!("entry {} address 0x{:x} exceeds {}-byte addresses", entry, addr, addr_width)));
        }
        push_addr(&mut out, addr);

        let start = out.len();
        let count = key >> 4;
        if key & KEY_COUNT != 0 && count == FULL_VECTOR {
            out.extend_from_slice(next_bytes(src, &mut ix, reg_width)?);
        } else {
            out.extend_from_within(prev_start..prev_start + reg_width);
            if key & KEY_COUNT == 0 {
                toggle_bit(&mut out[start..], count as u32)?;
            } else {
                for _ in 0..count {
                    let bit = next_uleb128(src, &mut ix)?;
                    toggle_bit(&mut out[start..], bit)?;
                }
            }
        }
        prev_start = start;
    }

    if out.len() != expected_size {
        return Err(MapError::Corrupt(format!("output {} bytes, expected {}", out.len(), expected_size)));
    }
    if ix != src.len() {
        return Err(MapError::Corrupt(format!("consumed {} bytes, expected {}", ix, src.len())));
    }

    Ok(RegisterMap::new(format, map.reg_width() as u8, map.num_entries() as u16, out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compact(format: MapFormat, reg_width: usize, entries: &[(usize, Vec<u8>)]) -> RegisterMap {
        let mut data = vec![];
        for (addr, bits) in entries {
            assert_eq!(bits.len(), reg_width);
            data.push((addr & 0xff) as u8);
            if format == MapFormat::Compact16 {
                data.push((addr >> 8) as u8);
            }
            data.extend_from_slice(bits);
        }
        RegisterMap::new(format, reg_width as u8, entries.len() as u16, data)
    }

    #[test]
    fn picks_cheapest_change() {
        assert_eq!(BitChange::between(&[0x0f, 0], &[0x0f, 0]), BitChange::Unchanged);
        assert_eq!(BitChange::between(&[0x0f, 0], &[0x0f, 0x80]), BitChange::LowBit(15));
        assert_eq!(BitChange::between(&[0, 0, 0], &[0, 0, 0x01]), BitChange::Indices(vec![16]));
        assert_eq!(BitChange::between(&[0, 0, 0], &[0x03, 0, 0]), BitChange::Indices(vec![0, 1]));
        assert_eq!(BitChange::between(&[0], &[0xff]), BitChange::Full);
        // two one-byte indices are no smaller than a two-byte vector
        assert_eq!(BitChange::between(&[0, 0], &[0x03, 0]), BitChange::Full);
    }

    #[test]
    fn key_layout() {
        assert_eq!(BitChange::Unchanged.key_bits(), 0x08);
        assert_eq!(BitChange::LowBit(3).key_bits(), 0x30);
        assert_eq!(BitChange::Indices(vec![1, 2]).key_bits(), 0x28);
        assert_eq!(BitChange::Full.key_bits(), 0xf8);
    }

    #[test]
    fn encodes_known_stream() {
        let map = compact(
            MapFormat::Compact8,
            1,
            &[(2, vec![0x01]), (4, vec![0x01]), (6, vec![0x03]), (20, vec![0x03]), (22, vec![0x02])],
        );
        let compressed = compress_map(&map).expect("compress");
        assert_eq!(compressed.format(), MapFormat::Differential);
        assert_eq!(compressed.data(), &[0x02, 0x01, 0x09, 0x11, 0x0f, 0x0e, 0x01][..]);
        assert_eq!(uncompress_map(&compressed).expect("expand"), map);
    }

    #[test]
    fn wide_addresses_survive() {
        let entries: Vec<(usize, Vec<u8>)> =
            (0..6).map(|i| (10 + i * 150, vec![0x01, (i as u8 & 1) << 1])).collect();
        let map = compact(MapFormat::Compact16, 2, &entries);
        let compressed = compress_map(&map).expect("compress");
        assert_eq!(compressed.data()[0], 10 | WIDE_ADDR);
        let expanded = uncompress_map(&compressed).expect("expand");
        assert_eq!(expanded.format(), MapFormat::Compact16);
        assert_eq!(expanded, map);
    }

    #[test]
    fn refuses_what_it_cannot_shrink() {
        let single = compact(MapFormat::Compact8, 1, &[(3, vec![0x01])]);
        assert_eq!(compress_map(&single), None);

        let late_start = compact(MapFormat::Compact8, 1, &[(130, vec![0]), (131, vec![0])]);
        assert_eq!(compress_map(&late_start), None);

        // every entry flips every bit of a one-byte vector
        let noisy: Vec<(usize, Vec<u8>)> =
            (0..10).map(|i| (i * 2, vec![if i % 2 == 0 { 0x00 } else { 0xff }])).collect();
        assert_eq!(compress_map(&compact(MapFormat::Compact8, 1, &noisy)), None);

        assert_eq!(compress_map(&RegisterMap::none()), None);
    }

    #[test]
    fn rejects_damaged_streams() {
        let map = compact(MapFormat::Compact8, 1, &[(0, vec![0]), (1, vec![0]), (2, vec![0]), (3, vec![0])]);
        let good = compress_map(&map).expect("compress");

        let mut data = good.data().to_vec();
        data.push(0x08);
        let long = RegisterMap::new(MapFormat::Differential, 1, 4, data);
        assert!(matches!(uncompress_map(&long), Err(MapError::Corrupt(_))));

        let short = RegisterMap::new(MapFormat::Differential, 1, 4, good.data()[..3].to_vec());
        assert_eq!(uncompress_map(&short), Err(MapError::Truncated));

        // single-bit toggle of bit 12 in a one-byte vector
        let wild = RegisterMap::new(MapFormat::Differential, 1, 2, vec![0x00, 0x00, 0xc0]);
        assert!(matches!(uncompress_map(&wild), Err(MapError::Corrupt(_))));

        assert_eq!(uncompress_map(&map), Err(MapError::BadFormat(1)));
    }
}
