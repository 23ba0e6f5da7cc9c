//! Builds a method's register map from its GC points and register lines.

use log::{debug, error};

use crate::regmap::compress::{compress_map, uncompress_map};
use crate::regmap::types::{reference_bits, RegisterLines};
use crate::regmap::{MapError, MapFormat, MapResult, RegisterMap, RegisterMapConfig};
use crate::verify::flags::InsnFlags;

const MAX_REGISTERS: usize = 2048;
const MAX_GC_POINTS: usize = 65536;

/// Generates the register map of a verified method.
///
/// One entry is written for every instruction flagged as a GC point, in
/// address order. Method entry is not a GC point unless the first
/// instruction is one. The result is differentially encoded when that is
/// enabled and turns out smaller.
///
/// # Panics
///
/// With `config.verify` set, panics if the map disagrees with `lines` or
/// the compressed form does not expand back to the same map.
pub fn generate_register_map(
    flags: &InsnFlags,
    registers_size: u16,
    lines: &dyn RegisterLines,
    config: &RegisterMapConfig,
) -> MapResult<RegisterMap> {
    let registers = registers_size as usize;
    if registers >= MAX_REGISTERS {
        error!("register map can't handle {} registers", registers);
        return Err(MapError::TooManyRegisters(registers));
    }
    let reg_width = u8::try_from((registers + 7) / 8).map_err(|_| MapError::TooManyRegisters(registers))?;

    // Addresses are written as a single byte only when every address fits.
    let (format, addr_width) = if flags.len() < 256 {
        (MapFormat::Compact8, 1)
    } else {
        (MapFormat::Compact16, 2)
    };

    let gc_points = flags.count_gc_points();
    if gc_points >= MAX_GC_POINTS {
        error!("register map can't handle {} gc points in one method", gc_points);
        return Err(MapError::TooManyGcPoints(gc_points));
    }

    let mut data = Vec::with_capacity(gc_points * (addr_width + reg_width as usize));
    for addr in flags.gc_points() {
        if addr > u16::MAX as usize {
            return Err(MapError::Corrupt(format!("gc point 0x{:x} beyond 16-bit addresses", addr)));
        }
        let line = lines.line(addr).ok_or(MapError::MissingLine(addr))?;
        data.push((addr & 0xff) as u8);
        if addr_width > 1 {
            data.push((addr >> 8) as u8);
        }
        data.extend(reference_bits(&line[..line.len().min(registers)], reg_width as usize));
    }

    let map = RegisterMap::new(format, reg_width, gc_points as u16, data);
    debug!("+++ grm: adr={} gpc={} rwd={} size={}", addr_width, gc_points, reg_width, map.size());

    if config.verify {
        if let Err(e) = verify_map(&map, registers_size, lines) {
            error!("Generated map does not match register lines: {}", e);
            panic!("register map generation is broken: {}", e);
        }
    }

    if !config.compress {
        return Ok(map);
    }

    match compress_map(&map) {
        Some(compressed) => {
            if config.verify {
                check_round_trip(&map, &compressed);
            }
            Ok(compressed)
        }
        None => {
            debug!(
                "Unable to compress (ent={} rw={})",
                map.num_entries(),
                map.reg_width()
            );
            Ok(map)
        }
    }
}

/// Expands `compressed` and requires it to equal `original` exactly.
fn check_round_trip(original: &RegisterMap, compressed: &RegisterMap) {
    match uncompress_map(compressed) {
        Ok(expanded) if expanded == *original => {}
        Ok(_) => {
            error!("Map comparison failed");
            original.dump(None);
            panic!("register map compression is broken: expanded map differs");
        }
        Err(e) => {
            error!("Map failed to uncompress: {}", e);
            panic!("register map compression is broken: {}", e);
        }
    }
}

/// Re-derives every entry of an uncompressed map from the register lines
/// and checks it bit by bit.
pub fn verify_map(map: &RegisterMap, registers_size: u16, lines: &dyn RegisterLines) -> MapResult<()> {
    let registers = registers_size as usize;
    if (registers + 7) / 8 != map.reg_width() {
        return Err(MapError::Corrupt(format!(
            "registersSize={}, regWidth={}",
            registers,
            map.reg_width()
        )));
    }
    if map.format().addr_width() == 0 {
        return Err(MapError::BadFormat(map.format().to_byte()));
    }

    let mut count = 0usize;
    for (addr, bits) in map.entries() {
        count += 1;
        let line = lines.line(addr).ok_or(MapError::MissingLine(addr))?;
        for reg in 0..registers {
            let bit_is_ref = bits[reg >> 3] >> (reg & 0x07) & 0x01 != 0;
            let reg_is_ref = line.get(reg).is_some_and(|t| t.is_reference());
            if bit_is_ref != reg_is_ref {
                return Err(MapError::Corrupt(format!(
                    "addr {} reg {}: bit={} reg={}",
                    addr, reg, bit_is_ref, reg_is_ref
                )));
            }
        }
    }

    if count != map.num_entries() {
        return Err(MapError::Corrupt(format!("{} entries, header says {}", count, map.num_entries())));
    }
    Ok(())
}
