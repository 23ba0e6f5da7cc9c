//! Register maps: for every GC point of a verified method, which registers
//! hold object references.
//!
//! Maps come in three shapes. The two compact formats are a flat table of
//! `(address, bit vector)` entries with 8- or 16-bit addresses; the
//! differential format stores each entry as a change against the previous
//! one and must be expanded before lookups (see [`compress`]).
//!
//! Serialized layout, shared by every format but `None`:
//!
//! ```text
//! +00 1B format (0x80 set while the map lives on the heap)
//! +01 1B regWidth, bytes per bit vector
//! +02 2B numEntries, little-endian
//! +04    compact: numEntries * (addrWidth + regWidth) bytes
//!        differential: ULEB128 length, then the encoded stream
//! ```
//!
//! A `None` map is the single format byte `0`.

use std::fmt;

use log::debug;
use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{le_u16, le_u8};
use nom::IResult;
use serde::{Deserialize, Serialize};

use crate::dex::leb::{decode_uleb128, uleb128_size, write_uleb128_into};
use crate::dex::write_u2;

pub mod compress;
pub mod generate;
pub mod pool;
pub mod types;

/// Set in the format byte of maps built in this process; cleared on disk.
pub const FORMAT_ON_HEAP: u8 = 0x80;

const HEADER_SIZE: usize = 4;

/// Below this many entries `line` scans instead of bisecting.
const SEARCH_THRESHOLD: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapFormat {
    /// No map: native and abstract methods.
    None,
    Compact8,
    Compact16,
    Differential,
}

impl MapFormat {
    pub fn from_byte(byte: u8) -> Option<MapFormat> {
        match byte & !FORMAT_ON_HEAP {
            0 => Some(MapFormat::None),
            1 => Some(MapFormat::Compact8),
            2 => Some(MapFormat::Compact16),
            3 => Some(MapFormat::Differential),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            MapFormat::None => 0,
            MapFormat::Compact8 => 1,
            MapFormat::Compact16 => 2,
            MapFormat::Differential => 3,
        }
    }

    /// Bytes per entry address; 0 for formats without addressable entries.
    pub fn addr_width(self) -> usize {
        match self {
            MapFormat::Compact8 => 1,
            MapFormat::Compact16 => 2,
            MapFormat::None | MapFormat::Differential => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// More registers than the map format can describe.
    TooManyRegisters(usize),
    TooManyGcPoints(usize),
    TooManyMethods(usize),
    BadFormat(u8),
    /// The type-flow pass kept no register line at a GC point.
    MissingLine(usize),
    BadClassIndex { index: usize, count: usize },
    Truncated,
    Corrupt(String),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::TooManyRegisters(n) => write!(f, "register map can't handle {} registers", n),
            MapError::TooManyGcPoints(n) => write!(f, "register map can't handle {} gc points in one method", n),
            MapError::TooManyMethods(n) => write!(f, "too many methods ({}) for one class pool", n),
            MapError::BadFormat(b) => write!(f, "bad register map format {}", b),
            MapError::MissingLine(addr) => write!(f, "no register line at gc point 0x{:04x}", addr),
            MapError::BadClassIndex { index, count } => write!(f, "bad class index ({} vs {})", index, count),
            MapError::Truncated => write!(f, "register map data is truncated"),
            MapError::Corrupt(msg) => write!(f, "corrupt register map: {}", msg),
        }
    }
}

impl std::error::Error for MapError {}

pub type MapResult<T> = Result<T, MapError>;

/// Knobs for map generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMapConfig {
    /// Try the differential encoding and keep it when it is smaller.
    pub compress: bool,
    /// Re-derive each map from the register lines and check the codec
    /// round trip. A mismatch panics.
    pub verify: bool,
}

impl Default for RegisterMapConfig {
    fn default() -> Self {
        RegisterMapConfig { compress: true, verify: cfg!(debug_assertions) }
    }
}

/// The register map of one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMap {
    format: MapFormat,
    on_heap: bool,
    reg_width: u8,
    num_entries: u16,
    /// Compact entries, or the differential stream without its length prefix.
    data: Vec<u8>,
}

impl RegisterMap {
    pub(crate) fn new(format: MapFormat, reg_width: u8, num_entries: u16, data: Vec<u8>) -> Self {
        RegisterMap { format, on_heap: true, reg_width, num_entries, data }
    }

    /// The placeholder for methods that have no map.
    pub fn none() -> Self {
        RegisterMap::new(MapFormat::None, 0, 0, vec![])
    }

    pub fn format(&self) -> MapFormat {
        self.format
    }

    /// Format byte as held in memory, including the on-heap bit.
    pub fn format_byte(&self) -> u8 {
        if self.on_heap {
            self.format.to_byte() | FORMAT_ON_HEAP
        } else {
            self.format.to_byte()
        }
    }

    /// False for maps loaded from a map pool.
    pub fn is_on_heap(&self) -> bool {
        self.on_heap
    }

    pub fn reg_width(&self) -> usize {
        self.reg_width as usize
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries as usize
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        match self.format {
            MapFormat::None => 1,
            MapFormat::Compact8 | MapFormat::Compact16 => HEADER_SIZE + self.data.len(),
            MapFormat::Differential => {
                HEADER_SIZE + uleb128_size(self.data.len() as u32) + self.data.len()
            }
        }
    }

    /// Appends the serialized map, without the on-heap bit, returning the
    /// number of bytes written.
    pub fn write(&self, out: &mut Vec<u8>) -> usize {
        out.push(self.format.to_byte());
        if self.format == MapFormat::None {
            return 1;
        }
        out.push(self.reg_width);
        write_u2(out, self.num_entries);
        if self.format == MapFormat::Differential {
            write_uleb128_into(out, self.data.len() as u32);
        }
        out.extend_from_slice(&self.data);
        self.size()
    }

    /// Parses one serialized map from the front of `bytes`, returning it
    /// with the number of bytes it occupied.
    pub fn from_bytes(bytes: &[u8]) -> MapResult<(RegisterMap, usize)> {
        match parse_map(bytes) {
            Ok((rest, map)) => Ok((map, bytes.len() - rest.len())),
            Err(nom::Err::Failure(_)) => Err(MapError::BadFormat(bytes.first().copied().unwrap_or(0))),
            Err(_) => Err(MapError::Truncated),
        }
    }

    /// `(address, bit vector)` pairs of a compact map, in address order.
    /// Other formats yield nothing.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &[u8])> + '_ {
        let addr_width = self.format.addr_width();
        let data: &[u8] = if addr_width == 0 { &[] } else { &self.data };
        data.chunks_exact((addr_width + self.reg_width as usize).max(1))
            .map(move |entry| (entry_addr(entry, addr_width), &entry[addr_width..]))
    }

    fn entry(&self, i: usize) -> Option<(usize, &[u8])> {
        let addr_width = self.format.addr_width();
        let line_width = addr_width + self.reg_width as usize;
        let entry = self.data.get(i * line_width..(i + 1) * line_width)?;
        Some((entry_addr(entry, addr_width), &entry[addr_width..]))
    }

    /// The bit vector recorded for `addr`, if `addr` is a GC point.
    ///
    /// Only compact maps can be searched; a differential map has to be
    /// expanded first and returns `None` here.
    pub fn line(&self, addr: usize) -> Option<&[u8]> {
        if self.format.addr_width() == 0 {
            return None;
        }

        let count = self.num_entries as usize;
        if count < SEARCH_THRESHOLD {
            return self.entries().find(|&(a, _)| a == addr).map(|(_, bits)| bits);
        }

        let (mut lo, mut hi) = (0usize, count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (mid_addr, bits) = self.entry(mid)?;
            if addr > mid_addr {
                lo = mid + 1;
            } else if addr < mid_addr {
                hi = mid;
            } else {
                return Some(bits);
            }
        }
        None
    }

    /// Logs the map one entry per line as a string of register bits,
    /// register 0 first. `registers` trims the padding bits of the last byte.
    pub fn dump(&self, registers: Option<usize>) {
        debug!(
            "Register map: format={:?} regWidth={} numEntries={} size={}",
            self.format,
            self.reg_width,
            self.num_entries,
            self.size()
        );
        for (addr, bits) in self.entries() {
            let count = registers.map_or(bits.len() * 8, |r| r.min(bits.len() * 8));
            let line: String = (0..count)
                .map(|i| if bits[i >> 3] >> (i & 0x07) & 0x01 != 0 { '1' } else { '0' })
                .collect();
            debug!("  {:04x}: {}", addr, line);
        }
    }
}

fn entry_addr(entry: &[u8], addr_width: usize) -> usize {
    entry[..addr_width].iter().rev().fold(0usize, |acc, &b| (acc << 8) | b as usize)
}

fn uleb128(input: &[u8]) -> IResult<&[u8], u32> {
    match decode_uleb128(input) {
        Some((value, len)) => Ok((&input[len..], value)),
        None => Err(nom::Err::Error(Error::new(input, ErrorKind::Eof))),
    }
}

fn parse_map(input: &[u8]) -> IResult<&[u8], RegisterMap> {
    let (rest, format_byte) = le_u8(input)?;
    let Some(format) = MapFormat::from_byte(format_byte) else {
        return Err(nom::Err::Failure(Error::new(input, ErrorKind::Tag)));
    };
    let on_heap = format_byte & FORMAT_ON_HEAP != 0;

    if format == MapFormat::None {
        return Ok((rest, RegisterMap { on_heap, ..RegisterMap::none() }));
    }

    let (rest, reg_width) = le_u8(rest)?;
    let (rest, num_entries) = le_u16(rest)?;
    let (rest, len) = match format {
        MapFormat::Differential => {
            let (rest, len) = uleb128(rest)?;
            (rest, len as usize)
        }
        _ => (rest, (format.addr_width() + reg_width as usize) * num_entries as usize),
    };
    let (rest, data) = take(len)(rest)?;

    Ok((rest, RegisterMap { format, on_heap, reg_width, num_entries, data: data.to_vec() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compact8(entries: &[(u8, u8)]) -> RegisterMap {
        let data = entries.iter().flat_map(|&(a, b)| [a, b]).collect();
        RegisterMap::new(MapFormat::Compact8, 1, entries.len() as u16, data)
    }

    #[test]
    fn format_bytes() {
        for format in [MapFormat::None, MapFormat::Compact8, MapFormat::Compact16, MapFormat::Differential] {
            assert_eq!(MapFormat::from_byte(format.to_byte()), Some(format));
            assert_eq!(MapFormat::from_byte(format.to_byte() | FORMAT_ON_HEAP), Some(format));
        }
        assert_eq!(MapFormat::from_byte(4), None);
    }

    #[test]
    fn sizes() {
        assert_eq!(RegisterMap::none().size(), 1);
        assert_eq!(compact8(&[(1, 0), (4, 1)]).size(), 4 + 2 * 2);

        let map = RegisterMap::new(MapFormat::Compact16, 3, 2, vec![0; 2 * 5]);
        assert_eq!(map.size(), 4 + 10);

        let map = RegisterMap::new(MapFormat::Differential, 1, 5, vec![0; 200]);
        assert_eq!(map.size(), 4 + 2 + 200);
    }

    #[test]
    fn write_strips_heap_bit() {
        let map = compact8(&[(1, 0x01), (4, 0x03)]);
        assert!(map.is_on_heap());
        assert_eq!(map.format_byte(), 0x81);

        let mut out = vec![];
        assert_eq!(map.write(&mut out), map.size());
        assert_eq!(out, vec![0x01, 0x01, 0x02, 0x00, 1, 0x01, 4, 0x03]);

        let (read, used) = RegisterMap::from_bytes(&out).expect("read");
        assert_eq!(used, out.len());
        assert!(!read.is_on_heap());
        assert_eq!(read.entries().collect::<Vec<_>>(), map.entries().collect::<Vec<_>>());
    }

    #[test]
    fn read_errors() {
        assert_eq!(RegisterMap::from_bytes(&[0x09, 1, 0, 0]), Err(MapError::BadFormat(0x09)));
        assert_eq!(RegisterMap::from_bytes(&[0x01, 1, 2, 0, 1]), Err(MapError::Truncated));
        assert_eq!(RegisterMap::from_bytes(&[]), Err(MapError::Truncated));

        let (map, used) = RegisterMap::from_bytes(&[0x00, 0xff]).expect("none");
        assert_eq!(map.format(), MapFormat::None);
        assert_eq!(used, 1);
    }

    #[test]
    fn line_lookup_small_and_large() {
        let small = compact8(&[(1, 0x01), (4, 0x02), (9, 0x04)]);
        assert_eq!(small.line(4), Some(&[0x02][..]));
        assert_eq!(small.line(5), None);

        let entries: Vec<(u8, u8)> = (0..40).map(|i| (i * 3, i)).collect();
        let large = compact8(&entries);
        for (addr, bits) in &entries {
            assert_eq!(large.line(*addr as usize), Some(&[*bits][..]));
        }
        assert_eq!(large.line(1), None);
        assert_eq!(large.line(200), None);

        let map = RegisterMap::new(MapFormat::Compact16, 1, 1, vec![0x34, 0x12, 0xaa]);
        assert_eq!(map.line(0x1234), Some(&[0xaa][..]));
        assert_eq!(RegisterMap::none().line(0), None);
    }
}
