//! LEB128 variable-length integers, as used by dex catch handler lists and
//! the differential register-map encoding.

#[cfg(test)]
pub(crate) fn encode_uleb128(value: u32) -> Vec<u8> {
    let mut result = Vec::with_capacity(uleb128_size(value));
    write_uleb128_into(&mut result, value);
    result
}

/// Appends `value` to `out`, returning the number of bytes written.
pub(crate) fn write_uleb128_into(out: &mut Vec<u8>, value: u32) -> usize {
    let mut remaining = value;
    let mut count = 0;

    loop {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;

        if remaining != 0 {
            byte |= 0x80;
        }

        out.push(byte);
        count += 1;

        if remaining == 0 {
            break;
        }
    }

    count
}

/// Number of bytes the ULEB128 encoding of `value` occupies.
pub(crate) const fn uleb128_size(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

/// Decodes a ULEB128 value from the front of `encoded`.
///
/// Returns the value and the number of bytes consumed, or `None` if the
/// input ends before the final byte.
pub(crate) fn decode_uleb128(encoded: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;
    let mut shift: u32 = 0;

    for (count, &byte) in encoded.iter().enumerate() {
        let low = (byte & 0x7F) as u32;
        if shift < 32 {
            value = value.wrapping_add(low.wrapping_shl(shift));
        }
        shift = shift.saturating_add(7);

        // 32-bit values never need more than five bytes
        if (byte & 0x80) == 0 || count == 4 {
            return Some((value, count + 1));
        }
    }

    None
}

pub(crate) fn encode_sleb128(value: i32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut remaining = value;

    loop {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;

        let is_more =
            !((remaining == 0 && (byte & 0x40) == 0) || (remaining == -1 && (byte & 0x40) != 0));
        if is_more {
            byte |= 0x80;
        }

        result.push(byte);

        if !is_more {
            break;
        }
    }

    result
}

pub(crate) fn decode_sleb128(encoded: &[u8]) -> Option<(i32, usize)> {
    let mut value: i32 = 0;
    let mut shift: u32 = 0;

    for (count, &byte) in encoded.iter().enumerate() {
        let low = (byte & 0x7F) as i32;
        if shift < 32 {
            value |= low.wrapping_shl(shift);
        }
        shift = shift.saturating_add(7);

        if (byte & 0x80) == 0 || count == 4 {
            // sign-extend if we didn't fill all 32 bits
            if (byte & 0x40) != 0 && shift < 32 {
                value |= (-1i32).wrapping_shl(shift);
            }
            return Some((value, count + 1));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16256, vec![0x80, 0x7F]),
            (624485, vec![0xE5, 0x8E, 0x26]),
        ];

        for (value, expected) in cases {
            assert_eq!(uleb128_size(value), expected.len());
            assert_eq!(encode_uleb128(value), expected);
        }
    }

    #[test]
    fn test_decode_uleb128() {
        let cases = vec![
            (vec![0x00], 0, 1),
            (vec![0x7F], 127, 1),
            (vec![0x80, 0x01], 128, 2),
            (vec![0xE5, 0x8E, 0x26, 0xAA], 624485, 3),
            (vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::MAX, 5),
        ];

        for (encoded, expected, used) in cases {
            assert_eq!(decode_uleb128(&encoded), Some((expected, used)));
        }
    }

    #[test]
    fn test_decode_uleb128_truncated() {
        assert_eq!(decode_uleb128(&[]), None);
        assert_eq!(decode_uleb128(&[0x80, 0x80]), None);
    }

    #[test]
    fn test_uleb128_size_boundaries() {
        for value in [0x7f, 0x80, 0x3fff, 0x4000, 0x1f_ffff, 0x20_0000, 0x0fff_ffff, 0x1000_0000] {
            assert_eq!(uleb128_size(value), encode_uleb128(value).len(), "value {:#x}", value);
        }
    }

    #[test]
    fn test_sleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (-1, vec![0x7F]),
            (-2, vec![0x7E]),
            (-123456, vec![0xC0, 0xBB, 0x78]),
            (-128, vec![0x80, 0x7F]),
        ];

        for (value, expected) in cases {
            assert_eq!(encode_sleb128(value), expected);
            assert_eq!(decode_sleb128(&expected), Some((value, expected.len())));
        }
    }
}
