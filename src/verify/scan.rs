//! The first two verifier passes: instruction widths and try/catch geometry.

use rangemap::RangeMap;

use crate::dex::code::{CodeItem, EncodedCatchHandler};
use crate::dex::error::DexError;
use crate::dex::instruction::instruction_width;
use crate::dex::leb::decode_uleb128;
use crate::dex::opcodes::{opcode_of, OP_MONITOR_ENTER, OP_NEW_INSTANCE};
use crate::verify::flags::InsnFlags;
use crate::verify::OpCounts;

/// Walks the code once, recording every instruction's width.
///
/// Fails on an opcode with no width, or if the last instruction does not
/// end exactly at the end of the code.
pub fn compute_widths(insns: &[u16], flags: &mut InsnFlags) -> Result<OpCounts, DexError> {
    let mut counts = OpCounts::default();
    let mut addr = 0usize;

    while addr < insns.len() {
        let width = instruction_width(insns, addr);
        if width == 0 {
            fail!("Invalid instruction 0x{:04x} at 0x{:04x}", insns[addr], addr);
        }
        if width > insns.len() - addr {
            fail!(
                "Code did not end where expected ({} vs. {})",
                (addr as u64).saturating_add(width as u64),
                insns.len()
            );
        }

        match opcode_of(insns[addr]).value {
            OP_NEW_INSTANCE => counts.new_instance += 1,
            OP_MONITOR_ENTER => counts.monitor_enter += 1,
            _ => {}
        }

        flags.set_width(addr, width as u32);
        addr += width;
    }

    Ok(counts)
}

/// Marks instructions covered by try ranges and flags every handler entry
/// point as a branch target.
///
/// Try ranges must be in ascending address order and must not overlap.
pub fn scan_try_catch(code: &CodeItem, flags: &mut InsnFlags) -> Result<(), DexError> {
    if code.tries.is_empty() {
        return Ok(());
    }

    let insns_size = code.insns_size() as u64;
    let mut ranges: RangeMap<u64, usize> = RangeMap::new();
    let mut prev_end = 0u64;

    for (ti, t) in code.tries.iter().enumerate() {
        let start = t.start_addr as u64;
        let end = t.end_addr();

        if start >= end || start >= insns_size || end > insns_size {
            fail!("Bad exception entry: startAddr={} endAddr={} (size={})", start, end, insns_size);
        }
        if let Some((r, other)) = ranges.overlapping(&(start..end)).next() {
            fail!("Try #{} [{}, {}) overlaps try #{} [{}, {})", ti, start, end, other, r.start, r.end);
        }
        if start < prev_end {
            fail!("Try #{} at {} is out of address order", ti, start);
        }
        if !flags.is_opcode(start as usize) {
            fail!("'try' block starts inside an instruction ({})", start);
        }

        ranges.insert(start..end, ti);
        prev_end = end;

        let mut addr = start as usize;
        while (addr as u64) < end {
            flags.set_in_try(addr, true);
            addr += flags.width(addr);
        }
    }

    // Every entry of the handler list is checked, referenced or not.
    let handler_offsets = handler_entry_offsets(code)?;
    for &offset in &handler_offsets {
        let handler = code.handler_at(offset)?;
        for addr in handler.addresses() {
            if !flags.is_opcode(addr as usize) {
                fail!("Exception handler starts at bad address ({})", addr);
            }
            flags.set_branch_target(addr as usize, true);
        }
    }

    for (ti, t) in code.tries.iter().enumerate() {
        if !handler_offsets.contains(&t.handler_off) {
            fail!("Try #{} handler offset {} is not the start of a handler", ti, t.handler_off);
        }
    }

    Ok(())
}

/// Byte offsets of every entry in the encoded catch handler list.
fn handler_entry_offsets(code: &CodeItem) -> Result<Vec<u16>, DexError> {
    let list = &code.handler_list;
    let Some((count, mut ix)) = decode_uleb128(list) else {
        fail!("Missing catch handler list for {} try items", code.tries.len());
    };

    let mut offsets = Vec::with_capacity(count.min(256) as usize);
    for i in 0..count {
        if ix > u16::MAX as usize {
            fail!("Catch handler #{} lies beyond the addressable handler offset range", i);
        }
        offsets.push(ix as u16);
        EncodedCatchHandler::read(list, &mut ix)
            .map_err(|e| err!(e, "EncodedCatchHandler #{}/{}", i + 1, count))?;
    }
    Ok(offsets)
}
