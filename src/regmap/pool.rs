//! The register map pool stored alongside an optimized dex file.
//!
//! ```text
//! class pool   u4 numClasses
//!              u4 offset[numClasses]   from the start of the class pool, 0 = no maps
//! method pool  u4 methodCount          32-bit aligned
//!              map[methodCount]        direct then virtual, miranda methods left out
//! ```
//!
//! Maps are written back to back, so the reader finds each one by computing
//! the size of the one before it.

use log::{debug, trace, warn};
use nom::number::complete::le_u32;
use nom::IResult;

use crate::dex::code::ClassDef;
use crate::dex::write_u4;
use crate::regmap::compress::uncompress_map;
use crate::regmap::{MapError, MapFormat, MapResult, RegisterMap};

const MAX_METHODS: usize = 65536;

/// A verified class and the maps of its methods, one slot per method in
/// [`ClassDef::methods`] order.
#[derive(Debug, Clone)]
pub struct ClassMaps<'a> {
    pub class: &'a ClassDef,
    pub maps: Vec<Option<RegisterMap>>,
}

fn align32(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

/// Writes the pool for every class def, in dex order. `None` marks a
/// class that did not verify and so has no maps.
pub fn write_map_pool(classes: &[Option<ClassMaps<'_>>]) -> MapResult<Vec<u8>> {
    let mut out = Vec::new();
    write_u4(&mut out, classes.len() as u32);
    let table = out.len();
    out.resize(table + classes.len() * 4, 0);

    for (idx, entry) in classes.iter().enumerate() {
        let Some(class_maps) = entry else {
            trace!("{:4} no maps", idx);
            continue;
        };

        let offset = out.len() as u32;
        out[table + idx * 4..table + idx * 4 + 4].copy_from_slice(&offset.to_le_bytes());
        write_method_maps(class_maps, &mut out)?;
        align32(&mut out);
        trace!("{:4} {} -> offset {}", idx, class_maps.class.descriptor, offset);
    }

    debug!("Total size of register maps: {}", out.len());
    Ok(out)
}

fn write_method_maps(class_maps: &ClassMaps<'_>, out: &mut Vec<u8>) -> MapResult<()> {
    let class = class_maps.class;
    let total = class.direct_methods.len() + class.virtual_methods.len();
    if total >= MAX_METHODS {
        return Err(MapError::TooManyMethods(total));
    }

    let count_at = out.len();
    write_u4(out, 0);
    let mut count = 0u32;

    for (i, method) in class.methods().enumerate() {
        // The class loader does not know about miranda methods yet.
        if method.is_miranda() {
            continue;
        }
        match class_maps.maps.get(i).and_then(Option::as_ref) {
            Some(map) => {
                map.write(out);
            }
            None => {
                if method.has_bytecode() {
                    warn!("Warning: no map available for {}.{}", class.descriptor, method.name);
                }
                out.push(MapFormat::None.to_byte());
            }
        }
        count += 1;
    }

    out[count_at..count_at + 4].copy_from_slice(&count.to_le_bytes());
    Ok(())
}

/// Read-only view over a serialized map pool.
#[derive(Debug, Clone, Copy)]
pub struct MapPool<'a> {
    data: &'a [u8],
    num_classes: usize,
}

fn u4(input: &[u8]) -> IResult<&[u8], u32> {
    le_u32(input)
}

impl<'a> MapPool<'a> {
    pub fn new(data: &'a [u8]) -> MapResult<Self> {
        let (_, num_classes) = u4(data).map_err(|_| MapError::Truncated)?;
        let num_classes = num_classes as usize;
        if data.len() < 4 + num_classes * 4 {
            return Err(MapError::Truncated);
        }
        Ok(MapPool { data, num_classes })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn read_u4_at(&self, offset: usize) -> MapResult<u32> {
        let bytes = self.data.get(offset..).ok_or(MapError::Truncated)?;
        let (_, value) = u4(bytes).map_err(|_| MapError::Truncated)?;
        Ok(value)
    }

    /// The method maps of the class at `class_idx`, or `None` if the class
    /// has no maps.
    pub fn class_maps(&self, class_idx: usize) -> MapResult<Option<MethodMaps<'a>>> {
        if class_idx >= self.num_classes {
            return Err(MapError::BadClassIndex { index: class_idx, count: self.num_classes });
        }

        let offset = self.read_u4_at(4 + class_idx * 4)? as usize;
        if offset == 0 {
            trace!("no map for classIdx={}", class_idx);
            return Ok(None);
        }

        let count = self.read_u4_at(offset)? as usize;
        Ok(Some(MethodMaps { data: &self.data[offset + 4..], remaining: count }))
    }
}

/// Iterator over the maps of one class, in write order. Methods written
/// with the no-map marker come out as `None`.
#[derive(Debug, Clone)]
pub struct MethodMaps<'a> {
    data: &'a [u8],
    remaining: usize,
}

impl<'a> MethodMaps<'a> {
    /// Maps not yet read.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl<'a> Iterator for MethodMaps<'a> {
    type Item = MapResult<Option<RegisterMap>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        match RegisterMap::from_bytes(self.data) {
            Ok((map, used)) => {
                self.data = &self.data[used..];
                Some(Ok(if map.format() == MapFormat::None { None } else { Some(map) }))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// Returns the map in a form `line` can search, expanding a differential
/// map in place first.
///
/// The slot is shared by everything that scans the method's frames, so it
/// is taken by exclusive reference for the duration of the swap.
pub fn expand_register_map(slot: &mut Option<RegisterMap>) -> MapResult<Option<&RegisterMap>> {
    if let Some(map) = slot.as_ref() {
        match map.format() {
            MapFormat::Differential => {
                let expanded = uncompress_map(map).inspect_err(|e| {
                    warn!("Map failed to uncompress: {}", e);
                })?;
                debug!("Expanding map ({} -> {} bytes)", map.size(), expanded.size());
                *slot = Some(expanded);
            }
            MapFormat::Compact8 | MapFormat::Compact16 => {
                if map.is_on_heap() {
                    trace!("Map already expanded");
                } else {
                    trace!("Map stored without compression");
                }
            }
            MapFormat::None => {}
        }
    }
    Ok(slot.as_ref())
}
