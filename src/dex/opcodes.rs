//! The Dalvik opcode table.
//!
//! Every one of the 256 opcode values maps to an [`Opcode`] carrying its
//! mnemonic, encoding [`Format`], control-flow [`OpcodeFlags`] and an
//! [`Operands`] shape that tells the static checker which operand slots hold
//! registers (and how wide), which hold constant pool references, and which
//! instructions need bespoke handling.

use bitflags::bitflags;
use once_cell::sync::Lazy;

// Defines the control-flow properties of an opcode.
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpcodeFlags: u8 {
        const CAN_BRANCH = 0x01;
        const CAN_CONTINUE = 0x02;
        const CAN_SWITCH = 0x04;
        const CAN_THROW = 0x08;
        const CAN_RETURN = 0x10;
        const INVOKE = 0x20;
        const ODEX_ONLY = 0x40;

        /// Instructions the garbage collector may observe a thread stopped at.
        const GC_POINT_MASK = Self::CAN_BRANCH.bits()
            | Self::CAN_SWITCH.bits()
            | Self::CAN_THROW.bits()
            | Self::CAN_RETURN.bits();
    }
}

/// Instruction encoding formats. The name gives the width in code units
/// (first digit) and the operand layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Opcode value with no defined instruction.
    Format00x,
    Format10t,
    Format10x,
    Format11n,
    Format11x,
    Format12x,
    Format20bc,
    Format20t,
    Format21c,
    Format21h,
    Format21s,
    Format21t,
    Format22b,
    Format22c,
    Format22cs,
    Format22s,
    Format22t,
    Format22x,
    Format23x,
    Format30t,
    Format31c,
    Format31i,
    Format31t,
    Format32x,
    Format35c,
    Format35mi,
    Format35ms,
    Format3rc,
    Format3rmi,
    Format3rms,
    Format51l,
}

impl Format {
    /// Width of an instruction in this format, in 16-bit code units.
    pub const fn units(&self) -> usize {
        match self {
            Format::Format00x => 0,

            Format::Format10t
            | Format::Format10x
            | Format::Format11n
            | Format::Format11x
            | Format::Format12x => 1,

            Format::Format20bc
            | Format::Format20t
            | Format::Format21c
            | Format::Format21h
            | Format::Format21s
            | Format::Format21t
            | Format::Format22b
            | Format::Format22c
            | Format::Format22cs
            | Format::Format22s
            | Format::Format22t
            | Format::Format22x
            | Format::Format23x => 2,

            Format::Format30t
            | Format::Format31c
            | Format::Format31i
            | Format::Format31t
            | Format::Format32x
            | Format::Format35c
            | Format::Format35mi
            | Format::Format35ms
            | Format::Format3rc
            | Format::Format3rmi
            | Format::Format3rms => 3,

            Format::Format51l => 5,
        }
    }
}

/// Width class of a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    /// One 32-bit register: `v < registers_size`.
    Single,
    /// A register pair holding a long/double: `v + 1 < registers_size`.
    Wide,
}

/// Constant pool section an index operand refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    String,
    Type,
    Field,
    Method,
}

/// Operand shape of an opcode, as seen by the static checker.
///
/// Register slots are listed in `vA, vB, vC` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// Nothing to check.
    None,
    A(Reg),
    AB(Reg, Reg),
    ABC(Reg, Reg, Reg),
    /// Register `vA` and a pool index in `vB`.
    APool(Reg, PoolKind),
    /// Registers `vA`, `vB` and a pool index in `vC`.
    ABPool(Reg, Reg, PoolKind),
    /// `goto` and `goto/16`: a branch that may not target itself.
    Goto,
    /// `goto/32`: a branch that may target itself.
    Goto32,
    /// Two-register conditional branch.
    IfTest,
    /// Compare-with-zero conditional branch.
    IfTestZ,
    /// Up to five argument registers and a pool index.
    Args(PoolKind),
    /// A contiguous register range and a pool index.
    ArgRange(PoolKind),
    NewInstance,
    NewArray,
    FillArrayData,
    PackedSwitch,
    SparseSwitch,
    /// Optimizer output that must never appear in unverified code.
    Unexpected,
    /// Opcode value with no instruction assigned.
    Unused,
}

/// One entry of the opcode table.
#[derive(Debug)]
pub struct Opcode {
    pub value: u8,
    pub name: &'static str,
    pub format: Format,
    pub flags: OpcodeFlags,
    pub operands: Operands,
}

impl Opcode {
    fn new(value: u8, name: &'static str, format: Format, flags: OpcodeFlags, operands: Operands) -> Self {
        Opcode { value, name, format, flags, operands }
    }

    fn unused(value: u8) -> Self {
        Opcode::new(value, "unused", Format::Format00x, OpcodeFlags::empty(), Operands::Unused)
    }

    /// Determines if execution can continue to the next instruction.
    pub fn can_continue(&self) -> bool {
        self.flags.contains(OpcodeFlags::CAN_CONTINUE)
    }

    /// Determines if the opcode can transfer control to a branch target.
    pub fn can_branch(&self) -> bool {
        self.flags.contains(OpcodeFlags::CAN_BRANCH)
    }

    /// Determines if the opcode dispatches through a switch table.
    pub fn can_switch(&self) -> bool {
        self.flags.contains(OpcodeFlags::CAN_SWITCH)
    }

    /// Determines if the opcode can throw an exception.
    pub fn can_throw(&self) -> bool {
        self.flags.contains(OpcodeFlags::CAN_THROW)
    }

    pub fn can_return(&self) -> bool {
        self.flags.contains(OpcodeFlags::CAN_RETURN)
    }

    /// Determines if the opcode is only produced by the optimizer.
    pub fn odex_only(&self) -> bool {
        self.flags.contains(OpcodeFlags::ODEX_ONLY)
    }

    /// Determines if a thread may be suspended for GC at this instruction.
    pub fn is_gc_point(&self) -> bool {
        self.flags.intersects(OpcodeFlags::GC_POINT_MASK)
    }

    /// Width in code units, zero for unused opcode values.
    pub fn width(&self) -> usize {
        self.format.units()
    }
}

pub const OP_NOP: u8 = 0x00;
pub const OP_MONITOR_ENTER: u8 = 0x1d;
pub const OP_NEW_INSTANCE: u8 = 0x22;
pub const OP_PACKED_SWITCH: u8 = 0x2b;
pub const OP_SPARSE_SWITCH: u8 = 0x2c;

/// Looks up the opcode encoded in the low byte of a code unit.
pub fn opcode_of(unit: u16) -> &'static Opcode {
    &OPCODES[(unit & 0xff) as usize]
}

static OPCODES: Lazy<Vec<Opcode>> = Lazy::new(|| {
    use Format::*;
    use Reg::{Single as S, Wide as W};

    let cont = OpcodeFlags::CAN_CONTINUE;
    let throws = OpcodeFlags::CAN_CONTINUE | OpcodeFlags::CAN_THROW;
    let ret = OpcodeFlags::CAN_RETURN;
    let invoke = throws | OpcodeFlags::INVOKE;
    let branch = OpcodeFlags::CAN_BRANCH;
    let cond = OpcodeFlags::CAN_BRANCH | OpcodeFlags::CAN_CONTINUE;
    let switch = OpcodeFlags::CAN_SWITCH | OpcodeFlags::CAN_CONTINUE;
    let odex = throws | OpcodeFlags::ODEX_ONLY;

    let mut defs = vec![
        Opcode::new(0x00, "nop", Format10x, cont, Operands::None),
        Opcode::new(0x01, "move", Format12x, cont, Operands::AB(S, S)),
        Opcode::new(0x02, "move/from16", Format22x, cont, Operands::AB(S, S)),
        Opcode::new(0x03, "move/16", Format32x, cont, Operands::AB(S, S)),
        Opcode::new(0x04, "move-wide", Format12x, cont, Operands::AB(W, W)),
        Opcode::new(0x05, "move-wide/from16", Format22x, cont, Operands::AB(W, W)),
        Opcode::new(0x06, "move-wide/16", Format32x, cont, Operands::AB(W, W)),
        Opcode::new(0x07, "move-object", Format12x, cont, Operands::AB(S, S)),
        Opcode::new(0x08, "move-object/from16", Format22x, cont, Operands::AB(S, S)),
        Opcode::new(0x09, "move-object/16", Format32x, cont, Operands::AB(S, S)),
        Opcode::new(0x0a, "move-result", Format11x, cont, Operands::A(S)),
        Opcode::new(0x0b, "move-result-wide", Format11x, cont, Operands::A(W)),
        Opcode::new(0x0c, "move-result-object", Format11x, cont, Operands::A(S)),
        Opcode::new(0x0d, "move-exception", Format11x, cont, Operands::A(S)),
        Opcode::new(0x0e, "return-void", Format10x, ret, Operands::None),
        Opcode::new(0x0f, "return", Format11x, ret, Operands::A(S)),
        Opcode::new(0x10, "return-wide", Format11x, ret, Operands::A(W)),
        Opcode::new(0x11, "return-object", Format11x, ret, Operands::A(S)),
        Opcode::new(0x12, "const/4", Format11n, cont, Operands::A(S)),
        Opcode::new(0x13, "const/16", Format21s, cont, Operands::A(S)),
        Opcode::new(0x14, "const", Format31i, cont, Operands::A(S)),
        Opcode::new(0x15, "const/high16", Format21h, cont, Operands::A(S)),
        Opcode::new(0x16, "const-wide/16", Format21s, cont, Operands::A(W)),
        Opcode::new(0x17, "const-wide/32", Format31i, cont, Operands::A(W)),
        Opcode::new(0x18, "const-wide", Format51l, cont, Operands::A(W)),
        Opcode::new(0x19, "const-wide/high16", Format21h, cont, Operands::A(W)),
        Opcode::new(0x1a, "const-string", Format21c, throws, Operands::APool(S, PoolKind::String)),
        Opcode::new(0x1b, "const-string/jumbo", Format31c, throws, Operands::APool(S, PoolKind::String)),
        Opcode::new(0x1c, "const-class", Format21c, throws, Operands::APool(S, PoolKind::Type)),
        Opcode::new(0x1d, "monitor-enter", Format11x, throws, Operands::A(S)),
        Opcode::new(0x1e, "monitor-exit", Format11x, throws, Operands::A(S)),
        Opcode::new(0x1f, "check-cast", Format21c, throws, Operands::APool(S, PoolKind::Type)),
        Opcode::new(0x20, "instance-of", Format22c, throws, Operands::ABPool(S, S, PoolKind::Type)),
        Opcode::new(0x21, "array-length", Format12x, throws, Operands::AB(S, S)),
        Opcode::new(0x22, "new-instance", Format21c, throws, Operands::NewInstance),
        Opcode::new(0x23, "new-array", Format22c, throws, Operands::NewArray),
        Opcode::new(0x24, "filled-new-array", Format35c, throws, Operands::Args(PoolKind::Type)),
        Opcode::new(0x25, "filled-new-array/range", Format3rc, throws, Operands::ArgRange(PoolKind::Type)),
        Opcode::new(0x26, "fill-array-data", Format31t, throws, Operands::FillArrayData),
        Opcode::new(0x27, "throw", Format11x, OpcodeFlags::CAN_THROW, Operands::A(S)),
        Opcode::new(0x28, "goto", Format10t, branch, Operands::Goto),
        Opcode::new(0x29, "goto/16", Format20t, branch, Operands::Goto),
        Opcode::new(0x2a, "goto/32", Format30t, branch, Operands::Goto32),
        Opcode::new(0x2b, "packed-switch", Format31t, switch, Operands::PackedSwitch),
        Opcode::new(0x2c, "sparse-switch", Format31t, switch, Operands::SparseSwitch),
        Opcode::new(0x2d, "cmpl-float", Format23x, cont, Operands::ABC(S, S, S)),
        Opcode::new(0x2e, "cmpg-float", Format23x, cont, Operands::ABC(S, S, S)),
        Opcode::new(0x2f, "cmpl-double", Format23x, cont, Operands::ABC(S, W, W)),
        Opcode::new(0x30, "cmpg-double", Format23x, cont, Operands::ABC(S, W, W)),
        Opcode::new(0x31, "cmp-long", Format23x, cont, Operands::ABC(S, W, W)),
    ];

    for (i, name) in ["if-eq", "if-ne", "if-lt", "if-ge", "if-gt", "if-le"].into_iter().enumerate() {
        defs.push(Opcode::new(0x32 + i as u8, name, Format22t, cond, Operands::IfTest));
    }
    for (i, name) in ["if-eqz", "if-nez", "if-ltz", "if-gez", "if-gtz", "if-lez"].into_iter().enumerate() {
        defs.push(Opcode::new(0x38 + i as u8, name, Format21t, cond, Operands::IfTestZ));
    }

    // Array, instance and static field accessors share one suffix order;
    // the second entry of each group moves a register pair.
    let suffixes = ["", "-wide", "-object", "-boolean", "-byte", "-char", "-short"];
    let accessor_groups: [(u8, &[&'static str; 7], Format); 6] = [
        (0x44, &["aget", "aget-wide", "aget-object", "aget-boolean", "aget-byte", "aget-char", "aget-short"], Format23x),
        (0x4b, &["aput", "aput-wide", "aput-object", "aput-boolean", "aput-byte", "aput-char", "aput-short"], Format23x),
        (0x52, &["iget", "iget-wide", "iget-object", "iget-boolean", "iget-byte", "iget-char", "iget-short"], Format22c),
        (0x59, &["iput", "iput-wide", "iput-object", "iput-boolean", "iput-byte", "iput-char", "iput-short"], Format22c),
        (0x60, &["sget", "sget-wide", "sget-object", "sget-boolean", "sget-byte", "sget-char", "sget-short"], Format21c),
        (0x67, &["sput", "sput-wide", "sput-object", "sput-boolean", "sput-byte", "sput-char", "sput-short"], Format21c),
    ];
    for (base, names, format) in accessor_groups {
        for (i, &name) in names.iter().enumerate() {
            debug_assert!(name.ends_with(suffixes[i]));
            let data = if i == 1 { W } else { S };
            let operands = match format {
                Format23x => Operands::ABC(data, S, S),
                Format22c => Operands::ABPool(data, S, PoolKind::Field),
                _ => Operands::APool(data, PoolKind::Field),
            };
            defs.push(Opcode::new(base + i as u8, name, format, throws, operands));
        }
    }

    let invokes = ["invoke-virtual", "invoke-super", "invoke-direct", "invoke-static", "invoke-interface"];
    for (i, name) in invokes.into_iter().enumerate() {
        defs.push(Opcode::new(0x6e + i as u8, name, Format35c, invoke, Operands::Args(PoolKind::Method)));
    }
    let invoke_ranges = [
        "invoke-virtual/range",
        "invoke-super/range",
        "invoke-direct/range",
        "invoke-static/range",
        "invoke-interface/range",
    ];
    for (i, name) in invoke_ranges.into_iter().enumerate() {
        defs.push(Opcode::new(0x74 + i as u8, name, Format3rc, invoke, Operands::ArgRange(PoolKind::Method)));
    }

    let unops: [(&'static str, Reg, Reg); 21] = [
        ("neg-int", S, S),
        ("not-int", S, S),
        ("neg-long", W, W),
        ("not-long", W, W),
        ("neg-float", S, S),
        ("neg-double", W, W),
        ("int-to-long", W, S),
        ("int-to-float", S, S),
        ("int-to-double", W, S),
        ("long-to-int", S, W),
        ("long-to-float", S, W),
        ("long-to-double", W, W),
        ("float-to-int", S, S),
        ("float-to-long", W, S),
        ("float-to-double", W, S),
        ("double-to-int", S, W),
        ("double-to-long", W, W),
        ("double-to-float", S, W),
        ("int-to-byte", S, S),
        ("int-to-char", S, S),
        ("int-to-short", S, S),
    ];
    for (i, (name, a, b)) in unops.into_iter().enumerate() {
        defs.push(Opcode::new(0x7b + i as u8, name, Format12x, cont, Operands::AB(a, b)));
    }

    // (name, vA, vB, vC, throws); the /2addr forms drop vB.
    let binops: [(&'static str, &'static str, Reg, Reg, Reg, bool); 32] = [
        ("add-int", "add-int/2addr", S, S, S, false),
        ("sub-int", "sub-int/2addr", S, S, S, false),
        ("mul-int", "mul-int/2addr", S, S, S, false),
        ("div-int", "div-int/2addr", S, S, S, true),
        ("rem-int", "rem-int/2addr", S, S, S, true),
        ("and-int", "and-int/2addr", S, S, S, false),
        ("or-int", "or-int/2addr", S, S, S, false),
        ("xor-int", "xor-int/2addr", S, S, S, false),
        ("shl-int", "shl-int/2addr", S, S, S, false),
        ("shr-int", "shr-int/2addr", S, S, S, false),
        ("ushr-int", "ushr-int/2addr", S, S, S, false),
        ("add-long", "add-long/2addr", W, W, W, false),
        ("sub-long", "sub-long/2addr", W, W, W, false),
        ("mul-long", "mul-long/2addr", W, W, W, false),
        ("div-long", "div-long/2addr", W, W, W, true),
        ("rem-long", "rem-long/2addr", W, W, W, true),
        ("and-long", "and-long/2addr", W, W, W, false),
        ("or-long", "or-long/2addr", W, W, W, false),
        ("xor-long", "xor-long/2addr", W, W, W, false),
        ("shl-long", "shl-long/2addr", W, W, S, false),
        ("shr-long", "shr-long/2addr", W, W, S, false),
        ("ushr-long", "ushr-long/2addr", W, W, S, false),
        ("add-float", "add-float/2addr", S, S, S, false),
        ("sub-float", "sub-float/2addr", S, S, S, false),
        ("mul-float", "mul-float/2addr", S, S, S, false),
        ("div-float", "div-float/2addr", S, S, S, false),
        ("rem-float", "rem-float/2addr", S, S, S, false),
        ("add-double", "add-double/2addr", W, W, W, false),
        ("sub-double", "sub-double/2addr", W, W, W, false),
        ("mul-double", "mul-double/2addr", W, W, W, false),
        ("div-double", "div-double/2addr", W, W, W, false),
        ("rem-double", "rem-double/2addr", W, W, W, false),
    ];
    for (i, (name, name_2addr, a, b, c, can_throw)) in binops.into_iter().enumerate() {
        let flags = if can_throw { throws } else { cont };
        defs.push(Opcode::new(0x90 + i as u8, name, Format23x, flags, Operands::ABC(a, b, c)));
        defs.push(Opcode::new(0xb0 + i as u8, name_2addr, Format12x, flags, Operands::AB(a, c)));
    }

    let lit16 = ["add-int/lit16", "rsub-int", "mul-int/lit16", "div-int/lit16", "rem-int/lit16", "and-int/lit16", "or-int/lit16", "xor-int/lit16"];
    for (i, name) in lit16.into_iter().enumerate() {
        let flags = if name.starts_with("div") || name.starts_with("rem") { throws } else { cont };
        defs.push(Opcode::new(0xd0 + i as u8, name, Format22s, flags, Operands::AB(S, S)));
    }
    let lit8 = [
        "add-int/lit8", "rsub-int/lit8", "mul-int/lit8", "div-int/lit8", "rem-int/lit8", "and-int/lit8",
        "or-int/lit8", "xor-int/lit8", "shl-int/lit8", "shr-int/lit8", "ushr-int/lit8",
    ];
    for (i, name) in lit8.into_iter().enumerate() {
        let flags = if name.starts_with("div") || name.starts_with("rem") { throws } else { cont };
        defs.push(Opcode::new(0xd8 + i as u8, name, Format22b, flags, Operands::AB(S, S)));
    }

    let optimized: [(u8, &'static str, Format); 27] = [
        (0xe3, "iget-volatile", Format22c),
        (0xe4, "iput-volatile", Format22c),
        (0xe5, "sget-volatile", Format21c),
        (0xe6, "sput-volatile", Format21c),
        (0xe7, "iget-object-volatile", Format22c),
        (0xe8, "iget-wide-volatile", Format22c),
        (0xe9, "iput-wide-volatile", Format22c),
        (0xea, "sget-wide-volatile", Format21c),
        (0xeb, "sput-wide-volatile", Format21c),
        (0xed, "throw-verification-error", Format20bc),
        (0xee, "execute-inline", Format35mi),
        (0xef, "execute-inline/range", Format3rmi),
        (0xf0, "invoke-object-init/range", Format3rc),
        (0xf1, "return-void-barrier", Format10x),
        (0xf2, "iget-quick", Format22cs),
        (0xf3, "iget-wide-quick", Format22cs),
        (0xf4, "iget-object-quick", Format22cs),
        (0xf5, "iput-quick", Format22cs),
        (0xf6, "iput-wide-quick", Format22cs),
        (0xf7, "iput-object-quick", Format22cs),
        (0xf8, "invoke-virtual-quick", Format35ms),
        (0xf9, "invoke-virtual-quick/range", Format3rms),
        (0xfa, "invoke-super-quick", Format35ms),
        (0xfb, "invoke-super-quick/range", Format3rms),
        (0xfc, "iput-object-volatile", Format22c),
        (0xfd, "sget-object-volatile", Format21c),
        (0xfe, "sput-object-volatile", Format21c),
    ];
    for (value, name, format) in optimized {
        let flags = match value {
            0xf1 => ret | OpcodeFlags::ODEX_ONLY,
            0xed => OpcodeFlags::CAN_THROW | OpcodeFlags::ODEX_ONLY,
            _ => odex,
        };
        defs.push(Opcode::new(value, name, format, flags, Operands::Unexpected));
    }

    let mut table: Vec<Opcode> = (0..=255u8).map(Opcode::unused).collect();
    for def in defs {
        let slot = def.value as usize;
        table[slot] = def;
    }
    table
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_value() {
        for v in 0..=255u16 {
            assert_eq!(opcode_of(v).value as u16, v);
        }
    }

    #[test]
    fn widths_match_dalvik() {
        assert_eq!(opcode_of(0x00).width(), 1);
        assert_eq!(opcode_of(0x03).width(), 3);
        assert_eq!(opcode_of(0x18).width(), 5);
        assert_eq!(opcode_of(0x2a).width(), 3);
        assert_eq!(opcode_of(0x38).width(), 2);
        assert_eq!(opcode_of(0xcf).width(), 1);
        assert_eq!(opcode_of(0xe2).width(), 2);
        for unused in [0x3e, 0x3f, 0x40, 0x41, 0x42, 0x43, 0x73, 0x79, 0x7a, 0xec, 0xff] {
            assert_eq!(opcode_of(unused).width(), 0, "opcode {:#x}", unused);
            assert_eq!(opcode_of(unused).operands, Operands::Unused);
        }
    }

    #[test]
    fn families_land_on_the_right_values() {
        assert_eq!(opcode_of(0x45).name, "aget-wide");
        assert_eq!(opcode_of(0x45).operands, Operands::ABC(Reg::Wide, Reg::Single, Reg::Single));
        assert_eq!(opcode_of(0x5a).name, "iput-wide");
        assert_eq!(opcode_of(0x6d).name, "sput-short");
        assert_eq!(opcode_of(0x72).name, "invoke-interface");
        assert_eq!(opcode_of(0x78).name, "invoke-interface/range");
        assert_eq!(opcode_of(0x8f).name, "int-to-short");
        assert_eq!(opcode_of(0xa3).name, "shl-long");
        assert_eq!(opcode_of(0xa3).operands, Operands::ABC(Reg::Wide, Reg::Wide, Reg::Single));
        assert_eq!(opcode_of(0xc3).name, "shl-long/2addr");
        assert_eq!(opcode_of(0xc3).operands, Operands::AB(Reg::Wide, Reg::Single));
        assert_eq!(opcode_of(0xd1).name, "rsub-int");
        assert_eq!(opcode_of(0xe2).name, "ushr-int/lit8");
    }

    #[test]
    fn gc_points_follow_control_flow_flags() {
        // return-void, goto, packed-switch, iget, invoke-static
        for v in [0x0e, 0x28, 0x2b, 0x52, 0x71] {
            assert!(opcode_of(v).is_gc_point(), "opcode {:#x}", v);
        }
        // nop, const/4, add-int, if-eqz is a branch
        assert!(!opcode_of(0x00).is_gc_point());
        assert!(!opcode_of(0x12).is_gc_point());
        assert!(!opcode_of(0x90).is_gc_point());
        assert!(opcode_of(0x38).is_gc_point());
        assert!(opcode_of(0x93).can_throw());
        assert!(!opcode_of(0xa9).can_throw());
    }
}
