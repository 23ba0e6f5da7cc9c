//! Static operand checks: register and constant pool bounds, branch and
//! switch targets, inline data tables. Also marks branch targets and GC
//! points.

use crate::dex::code::CodeItem;
use crate::dex::error::DexError;
use crate::dex::instruction::{
    branch_offset, fetch_u32, DecodedInstruction, ARRAY_DATA_SIGNATURE, PACKED_SWITCH_SIGNATURE,
    SPARSE_SWITCH_SIGNATURE,
};
use crate::dex::opcodes::{Operands, PoolKind, Reg, OP_PACKED_SWITCH};
use crate::dex::pool::DexPool;
use crate::verify::flags::InsnFlags;

/// Most array dimensions a `new-array` type may have.
const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Runs the static checks over every instruction of `code`.
///
/// Widths must already be recorded in `flags`. The first failing check
/// rejects the method; its error carries the opcode and address.
pub fn verify_instructions(code: &CodeItem, pool: &dyn DexPool, flags: &mut InsnFlags) -> Result<(), DexError> {
    let mut checker = Checker { insns: &code.insns, registers_size: code.registers_size as u32, pool, flags };

    // the start of the method is a branch target
    checker.flags.set_branch_target(0, true);

    let mut addr = 0usize;
    while addr < checker.insns.len() {
        let width = checker.flags.width(addr);
        if width == 0 {
            fail!("No instruction recorded at 0x{:04x}", addr);
        }

        let decoded = DecodedInstruction::decode(checker.insns, addr)?;
        let opcode = decoded.opcode;
        checker.check(&decoded, addr).map_err(|e| e.at_insn(opcode.value, addr))?;

        if opcode.is_gc_point() {
            checker.flags.set_gc_point(addr, true);
        }
        addr += width;
    }

    if addr != checker.insns.len() {
        fail!("Code did not end when expected (end at {}, count {})", addr, checker.insns.len());
    }
    Ok(())
}

struct Checker<'a> {
    insns: &'a [u16],
    registers_size: u32,
    pool: &'a dyn DexPool,
    flags: &'a mut InsnFlags,
}

impl<'a> Checker<'a> {
    fn check(&mut self, d: &DecodedInstruction, addr: usize) -> Result<(), DexError> {
        use Reg::Single;

        match d.opcode.operands {
            Operands::None => {}
            Operands::A(a) => self.register(a, d.v_a)?,
            Operands::AB(a, b) => {
                self.register(a, d.v_a)?;
                self.register(b, d.v_b)?;
            }
            Operands::ABC(a, b, c) => {
                self.register(a, d.v_a)?;
                self.register(b, d.v_b)?;
                self.register(c, d.v_c)?;
            }
            Operands::APool(a, kind) => {
                self.register(a, d.v_a)?;
                self.pool_index(kind, d.v_b)?;
            }
            Operands::ABPool(a, b, kind) => {
                self.register(a, d.v_a)?;
                self.register(b, d.v_b)?;
                self.pool_index(kind, d.v_c)?;
            }
            Operands::Goto => self.branch_target(addr, false)?,
            Operands::Goto32 => self.branch_target(addr, true)?,
            Operands::IfTest => {
                self.register(Single, d.v_a)?;
                self.register(Single, d.v_b)?;
                self.branch_target(addr, false)?;
            }
            Operands::IfTestZ => {
                self.register(Single, d.v_a)?;
                self.branch_target(addr, false)?;
            }
            Operands::Args(kind) => {
                // the decoder puts the pool reference in vB, not vC
                self.pool_index(kind, d.v_b)?;
                self.vararg_registers(d)?;
            }
            Operands::ArgRange(kind) => {
                self.pool_index(kind, d.v_b)?;
                self.vararg_range(d)?;
            }
            Operands::NewInstance => {
                self.register(Single, d.v_a)?;
                self.new_instance(d.v_b)?;
            }
            Operands::NewArray => {
                self.register(Single, d.v_a)?;
                self.register(Single, d.v_b)?;
                self.new_array(d.v_c)?;
            }
            Operands::FillArrayData => {
                self.register(Single, d.v_a)?;
                self.array_data(addr)?;
            }
            Operands::PackedSwitch | Operands::SparseSwitch => {
                self.register(Single, d.v_a)?;
                self.switch_targets(addr)?;
            }
            Operands::Unexpected => fail!("Unexpected opcode {} (0x{:02x})", d.opcode.name, d.opcode.value),
            Operands::Unused => fail!("Invalid instruction 0x{:02x}", d.opcode.value),
        }
        Ok(())
    }

    fn register(&self, kind: Reg, idx: u32) -> Result<(), DexError> {
        match kind {
            Reg::Single => {
                if idx >= self.registers_size {
                    fail!("Register index out of range ({} >= {})", idx, self.registers_size);
                }
            }
            Reg::Wide => {
                if idx as u64 + 1 >= self.registers_size as u64 {
                    fail!("Wide register index out of range ({}+1 >= {})", idx, self.registers_size);
                }
            }
        }
        Ok(())
    }

    fn pool_index(&self, kind: PoolKind, idx: u32) -> Result<(), DexError> {
        let max = self.pool.pool_size(kind);
        if idx as usize >= max {
            let name = match kind {
                PoolKind::String => "string",
                PoolKind::Type => "type",
                PoolKind::Field => "field",
                PoolKind::Method => "method",
            };
            fail!("Bad {} index {} (max {})", name, idx, max);
        }
        Ok(())
    }

    fn descriptor(&self, idx: u32) -> Result<&'a str, DexError> {
        self.pool_index(PoolKind::Type, idx)?;
        match self.pool.type_descriptor(idx) {
            Some(descriptor) => Ok(descriptor),
            None => fail!("No descriptor for type index {}", idx),
        }
    }

    /// Only plain classes can be instantiated with `new-instance`.
    fn new_instance(&self, idx: u32) -> Result<(), DexError> {
        let descriptor = self.descriptor(idx)?;
        if !descriptor.starts_with('L') {
            fail!("Can't call new-instance on type '{}'", descriptor);
        }
        Ok(())
    }

    fn new_array(&self, idx: u32) -> Result<(), DexError> {
        let descriptor = self.descriptor(idx)?;
        let dimensions = descriptor.bytes().take_while(|&b| b == b'[').count();
        if dimensions == 0 {
            fail!("Can't new-array class '{}' (not an array)", descriptor);
        }
        if dimensions > MAX_ARRAY_DIMENSIONS {
            fail!("Can't new-array class '{}' (exceeds limit)", descriptor);
        }
        Ok(())
    }

    /// vA holds the argument count, the registers are in `args`.
    fn vararg_registers(&self, d: &DecodedInstruction) -> Result<(), DexError> {
        if d.v_a > 5 {
            fail!("Invalid arg count ({}) in non-range invoke", d.v_a);
        }
        for &reg in d.arg_list() {
            if reg >= self.registers_size {
                fail!("Invalid reg index ({}) in non-range invoke (>= {})", reg, self.registers_size);
            }
        }
        Ok(())
    }

    /// vA holds the count, vC the first register.
    fn vararg_range(&self, d: &DecodedInstruction) -> Result<(), DexError> {
        if d.v_a as u64 + d.v_c as u64 > self.registers_size as u64 {
            fail!("Invalid reg index {}+{} in range invoke (> {})", d.v_a, d.v_c, self.registers_size);
        }
        Ok(())
    }

    /// Resolves the 32-bit relative offset of a 31t instruction to the start
    /// of the table it references. The table must start inside the code
    /// with room for its header, on a 32-bit boundary, at an instruction.
    fn table_start(&self, addr: usize, what: &str) -> Result<usize, DexError> {
        let count = self.insns.len() as i64;
        let offset = fetch_u32(self.insns, addr + 1).unwrap_or(0) as i32;
        let table = addr as i64 + offset as i64;

        if table < 0 || table + 2 >= count {
            fail!("Invalid {} start: at {}, data offset {}, count {}", what, addr, offset, count);
        }
        // code units are 32-bit aligned in the dex file, so an even address is too
        if table & 1 != 0 {
            fail!("Unaligned {} table: at {}, data offset {}", what, addr, offset);
        }
        if !self.flags.is_opcode(table as usize) {
            fail!("{} table at {} does not start an instruction", what, table);
        }
        Ok(table as usize)
    }

    fn array_data(&self, addr: usize) -> Result<(), DexError> {
        let table = self.table_start(addr, "array data")?;
        let count = self.insns.len() as u64;

        if self.insns[table] != ARRAY_DATA_SIGNATURE {
            fail!(
                "Wrong signature for array data table (0x{:04x}, wanted 0x{:04x})",
                self.insns[table],
                ARRAY_DATA_SIGNATURE
            );
        }

        let value_width = self.insns[table + 1] as u64;
        let Some(value_count) = fetch_u32(self.insns, table + 2) else {
            fail!("Invalid array data end: at {}, header runs past count {}", addr, count);
        };
        let table_size = 4 + (value_width * value_count as u64 + 1) / 2;
        if table as u64 + table_size > count {
            fail!(
                "Invalid array data end: at {}, data offset {}, end {}, count {}",
                addr,
                table as i64 - addr as i64,
                table as u64 + table_size,
                count
            );
        }
        Ok(())
    }

    fn switch_targets(&mut self, addr: usize) -> Result<(), DexError> {
        let table = self.table_start(addr, "switch")?;
        let count = self.insns.len() as u64;
        let switch_count = self.insns[table + 1] as usize;

        let (expected, keys_off, targets_off) = if (self.insns[addr] & 0xff) as u8 == OP_PACKED_SWITCH {
            // 0=sig, 1=count, 2/3=first key
            (PACKED_SWITCH_SIGNATURE, None, 4)
        } else {
            // 0=sig, 1=count, 2..count*2 = keys
            (SPARSE_SWITCH_SIGNATURE, Some(2usize), 2 + 2 * switch_count)
        };
        let table_size = (targets_off + switch_count * 2) as u64;

        if self.insns[table] != expected {
            fail!(
                "Wrong signature for switch table (0x{:04x}, wanted 0x{:04x})",
                self.insns[table],
                expected
            );
        }
        if table as u64 + table_size > count {
            fail!(
                "Invalid switch end: at {}, switch offset {}, end {}, count {}",
                addr,
                table as i64 - addr as i64,
                table as u64 + table_size,
                count
            );
        }

        let entry = |i: usize| fetch_u32(self.insns, table + i).unwrap_or(0) as i32;

        if let Some(keys_off) = keys_off {
            for targ in 1..switch_count {
                let last = entry(keys_off + (targ - 1) * 2);
                let key = entry(keys_off + targ * 2);
                if key <= last {
                    fail!("Invalid sparse switch: last key={}, this={}", last, key);
                }
            }
        }

        let targets: Vec<i32> = (0..switch_count).map(|targ| entry(targets_off + targ * 2)).collect();
        for (targ, offset) in targets.into_iter().enumerate() {
            let abs = addr as i64 + offset as i64;
            if abs < 0 || abs >= count as i64 || !self.flags.is_opcode(abs as usize) {
                fail!("Invalid switch target {} (-> {:#x}) at {:#x}[{}]", offset, abs, addr, targ);
            }
            self.flags.set_branch_target(abs as usize, true);
        }
        Ok(())
    }

    /// `goto/32` is the only branch allowed to target itself.
    fn branch_target(&mut self, addr: usize, self_ok: bool) -> Result<(), DexError> {
        let Some((offset, _)) = branch_offset(self.insns, addr) else {
            fail!("No branch offset at {:#x}", addr);
        };
        if !self_ok && offset == 0 {
            fail!("Branch offset of zero not allowed at {:#x}", addr);
        }

        let abs = addr as i64 + offset as i64;
        if abs > i32::MAX as i64 {
            fail!("Branch target overflow {:#x} +{}", addr, offset);
        }
        if abs < 0 || abs >= self.insns.len() as i64 || !self.flags.is_opcode(abs as usize) {
            fail!("Invalid branch target {} (-> {:#x}) at {:#x}", offset, abs, addr);
        }
        self.flags.set_branch_target(abs as usize, true);
        Ok(())
    }
}
