//! Decoding of single instructions out of a code unit array.

use crate::dex::error::DexError;
use crate::dex::opcodes::{opcode_of, Format, Opcode, OP_NOP};

pub const PACKED_SWITCH_SIGNATURE: u16 = 0x0100;
pub const SPARSE_SWITCH_SIGNATURE: u16 = 0x0200;
pub const ARRAY_DATA_SIGNATURE: u16 = 0x0300;

/// Embedded data tables, disguised as `nop` with a non-zero high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    PackedSwitch,
    SparseSwitch,
    ArrayData,
}

impl Payload {
    pub fn from_unit(unit: u16) -> Option<Payload> {
        match unit {
            PACKED_SWITCH_SIGNATURE => Some(Payload::PackedSwitch),
            SPARSE_SWITCH_SIGNATURE => Some(Payload::SparseSwitch),
            ARRAY_DATA_SIGNATURE => Some(Payload::ArrayData),
            _ => None,
        }
    }

    pub fn signature(&self) -> u16 {
        match self {
            Payload::PackedSwitch => PACKED_SWITCH_SIGNATURE,
            Payload::SparseSwitch => SPARSE_SWITCH_SIGNATURE,
            Payload::ArrayData => ARRAY_DATA_SIGNATURE,
        }
    }

    /// Width of the whole table in code units, given its header. Computed
    /// wide since element counts come straight from the code.
    pub fn width(&self, insns: &[u16], addr: usize) -> Option<u64> {
        let unit = |k: usize| insns.get(addr + k).map(|&u| u as u64);
        match self {
            Payload::PackedSwitch => Some(4 + unit(1)? * 2),
            Payload::SparseSwitch => Some(2 + unit(1)? * 4),
            Payload::ArrayData => {
                let element_width = unit(1)?;
                let len = unit(2)? | (unit(3)? << 16);
                Some(4 + (element_width * len + 1) / 2)
            }
        }
    }
}

/// Determines if the code unit starts an embedded data table.
pub fn is_payload(unit: u16) -> bool {
    Payload::from_unit(unit).is_some()
}

/// Width in code units of the instruction at `addr`; zero for an unused
/// opcode or a table whose header runs off the end of the code.
pub fn instruction_width(insns: &[u16], addr: usize) -> usize {
    let Some(&unit) = insns.get(addr) else { return 0 };
    if (unit & 0xff) as u8 == OP_NOP {
        if let Some(payload) = Payload::from_unit(unit) {
            return match payload.width(insns, addr) {
                Some(w) => usize::try_from(w).unwrap_or(usize::MAX),
                None => 0,
            };
        }
    }
    opcode_of(unit).width()
}

/// Reads a 32-bit value stored low unit first.
pub fn fetch_u32(insns: &[u16], addr: usize) -> Option<u32> {
    let lo = *insns.get(addr)? as u32;
    let hi = *insns.get(addr + 1)? as u32;
    Some(lo | (hi << 16))
}

/// An instruction with its operands pulled out into the `vA`/`vB`/`vC`
/// slots, following the layout of its format. Signed immediates and branch
/// offsets are stored sign-extended.
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    pub opcode: &'static Opcode,
    pub v_a: u32,
    pub v_b: u32,
    pub v_b_wide: u64,
    pub v_c: u32,
    /// Argument registers of the 35c family; `v_a` holds the count.
    pub args: [u32; 5],
}

impl DecodedInstruction {
    pub fn decode(insns: &[u16], addr: usize) -> Result<DecodedInstruction, DexError> {
        let Some(&inst) = insns.get(addr) else {
            fail!("Instruction address 0x{:04x} past end of code", addr);
        };
        let opcode = opcode_of(inst);
        let width = opcode.width();
        if addr + width > insns.len() {
            fail!("Truncated {} at 0x{:04x}", opcode.name, addr);
        }

        let fetch = |k: usize| insns[addr + k];
        let aa = (inst >> 8) as u32;
        let a = ((inst >> 8) & 0x0f) as u32;
        let b = (inst >> 12) as u32;

        let mut d = DecodedInstruction { opcode, v_a: 0, v_b: 0, v_b_wide: 0, v_c: 0, args: [0; 5] };
        match opcode.format {
            Format::Format00x | Format::Format10x => {}
            Format::Format12x => {
                d.v_a = a;
                d.v_b = b;
            }
            Format::Format11n => {
                d.v_a = a;
                d.v_b = (((inst as i16) >> 12) as i32) as u32;
            }
            Format::Format11x => d.v_a = aa,
            Format::Format10t => d.v_a = ((aa as u8 as i8) as i32) as u32,
            Format::Format20t => d.v_a = ((fetch(1) as i16) as i32) as u32,
            Format::Format20bc | Format::Format21c | Format::Format22x | Format::Format21h => {
                d.v_a = aa;
                d.v_b = fetch(1) as u32;
            }
            Format::Format21s | Format::Format21t => {
                d.v_a = aa;
                d.v_b = ((fetch(1) as i16) as i32) as u32;
            }
            Format::Format23x => {
                d.v_a = aa;
                d.v_b = (fetch(1) & 0xff) as u32;
                d.v_c = (fetch(1) >> 8) as u32;
            }
            Format::Format22b => {
                d.v_a = aa;
                d.v_b = (fetch(1) & 0xff) as u32;
                d.v_c = (((fetch(1) >> 8) as u8 as i8) as i32) as u32;
            }
            Format::Format22s | Format::Format22t => {
                d.v_a = a;
                d.v_b = b;
                d.v_c = ((fetch(1) as i16) as i32) as u32;
            }
            Format::Format22c | Format::Format22cs => {
                d.v_a = a;
                d.v_b = b;
                d.v_c = fetch(1) as u32;
            }
            Format::Format30t => d.v_a = fetch(1) as u32 | ((fetch(2) as u32) << 16),
            Format::Format31t | Format::Format31i | Format::Format31c => {
                d.v_a = aa;
                d.v_b = fetch(1) as u32 | ((fetch(2) as u32) << 16);
            }
            Format::Format32x => {
                d.v_a = fetch(1) as u32;
                d.v_b = fetch(2) as u32;
            }
            Format::Format35c | Format::Format35mi | Format::Format35ms => {
                // Counts above five are left for the verifier to reject.
                d.v_a = b;
                d.v_b = fetch(1) as u32;
                let list = fetch(2);
                let n = (b as usize).min(5);
                for (i, arg) in d.args.iter_mut().enumerate().take(n.min(4)) {
                    *arg = ((list >> (i * 4)) & 0x0f) as u32;
                }
                if n == 5 {
                    d.args[4] = a;
                }
                d.v_c = d.args[0];
            }
            Format::Format3rc | Format::Format3rmi | Format::Format3rms => {
                d.v_a = aa;
                d.v_b = fetch(1) as u32;
                d.v_c = fetch(2) as u32;
            }
            Format::Format51l => {
                d.v_a = aa;
                d.v_b_wide = fetch(1) as u64
                    | (fetch(2) as u64) << 16
                    | (fetch(3) as u64) << 32
                    | (fetch(4) as u64) << 48;
                d.v_b = d.v_b_wide as u32;
            }
        }
        Ok(d)
    }

    /// Argument registers of a 35c instruction.
    pub fn arg_list(&self) -> &[u32] {
        &self.args[..(self.v_a as usize).min(5)]
    }
}

/// Signed branch offset of a `goto`/`if` instruction, with whether the
/// branch is conditional. `None` for anything else.
pub fn branch_offset(insns: &[u16], addr: usize) -> Option<(i32, bool)> {
    let inst = *insns.get(addr)?;
    let opcode = opcode_of(inst);
    if !opcode.can_branch() {
        return None;
    }
    let unit = |k: usize| insns.get(addr + k).copied();
    let offset = match opcode.format {
        Format::Format10t => (inst >> 8) as u8 as i8 as i32,
        Format::Format20t | Format::Format21t | Format::Format22t => unit(1)? as i16 as i32,
        Format::Format30t => fetch_u32(insns, addr + 1)? as i32,
        _ => return None,
    };
    Some((offset, opcode.can_continue()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_widths() {
        // packed-switch with 3 targets
        let packed = [PACKED_SWITCH_SIGNATURE, 3, 0, 0, 1, 0, 2, 0, 3, 0];
        assert_eq!(instruction_width(&packed, 0), 10);
        // sparse-switch with 2 entries
        let sparse = [SPARSE_SWITCH_SIGNATURE, 2, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(instruction_width(&sparse, 0), 10);
        // 3 one-byte elements round up to 2 units
        let array = [ARRAY_DATA_SIGNATURE, 1, 3, 0, 0x0201, 0x0003];
        assert_eq!(instruction_width(&array, 0), 6);
        // header cut short
        assert_eq!(instruction_width(&[ARRAY_DATA_SIGNATURE, 4], 0), 0);
        assert_eq!(instruction_width(&[0x0e00], 0), 1);
        assert_eq!(instruction_width(&[0x003e], 0), 0);
        assert_eq!(instruction_width(&[], 0), 0);
    }

    #[test]
    fn array_data_width_does_not_overflow() {
        let array = [ARRAY_DATA_SIGNATURE, 0xffff, 0xffff, 0xffff];
        let w = instruction_width(&array, 0);
        assert!(w > array.len());
    }

    #[test]
    fn decode_formats() {
        // const/4 v1, #-1
        let d = DecodedInstruction::decode(&[0xf112], 0).expect("const/4");
        assert_eq!((d.v_a, d.v_b as i32), (1, -1));

        // add-int v1, v2, v3
        let d = DecodedInstruction::decode(&[0x0190, 0x0302], 0).expect("add-int");
        assert_eq!((d.v_a, d.v_b, d.v_c), (1, 2, 3));

        // iget v1, v2, field@0x1234
        let d = DecodedInstruction::decode(&[0x2152, 0x1234], 0).expect("iget");
        assert_eq!((d.v_a, d.v_b, d.v_c), (1, 2, 0x1234));

        // invoke-virtual {v1, v2, v3, v4, v5}, method@7
        let d = DecodedInstruction::decode(&[0x556e, 0x0007, 0x4321], 0).expect("invoke");
        assert_eq!(d.v_a, 5);
        assert_eq!(d.v_b, 7);
        assert_eq!(d.arg_list(), &[1, 2, 3, 4, 5]);

        // invoke-static/range {v3 .. v5}, method@2
        let d = DecodedInstruction::decode(&[0x0377, 0x0002, 0x0003], 0).expect("range");
        assert_eq!((d.v_a, d.v_b, d.v_c), (3, 2, 3));

        // const-wide v0, #0x1122334455667788
        let d = DecodedInstruction::decode(&[0x0018, 0x7788, 0x5566, 0x3344, 0x1122], 0).expect("wide");
        assert_eq!(d.v_b_wide, 0x1122334455667788);

        // move/16 v300, v2
        let d = DecodedInstruction::decode(&[0x0003, 300, 2], 0).expect("move/16");
        assert_eq!((d.v_a, d.v_b), (300, 2));

        // add-int/lit8 v0, v1, #-2
        let d = DecodedInstruction::decode(&[0x00d8, 0xfe01], 0).expect("lit8");
        assert_eq!((d.v_a, d.v_b, d.v_c as i32), (0, 1, -2));
    }

    #[test]
    fn decode_truncated() {
        assert!(DecodedInstruction::decode(&[0x0014, 0x0001], 0).is_err());
        assert!(DecodedInstruction::decode(&[0x000e], 1).is_err());
    }

    #[test]
    fn branch_offsets() {
        // goto -2
        assert_eq!(branch_offset(&[0xfe28], 0), Some((-2, false)));
        // if-eqz v0, +3
        assert_eq!(branch_offset(&[0x0038, 0x0003], 0), Some((3, true)));
        // if-ne v0, v1, -1
        assert_eq!(branch_offset(&[0x1033, 0xffff], 0), Some((-1, true)));
        // goto/32 +0x10000
        assert_eq!(branch_offset(&[0x002a, 0x0000, 0x0001], 0), Some((0x10000, false)));
        // return-void does not branch
        assert_eq!(branch_offset(&[0x000e], 0), None);
    }
}
