//! Per-address instruction flags shared by the verifier passes.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InsnBits: u8 {
        const IN_TRY = 0x01;
        const BRANCH_TARGET = 0x02;
        const GC_POINT = 0x04;
    }
}

/// Width and flag bits for one code unit address. Only instruction starts
/// ever carry a non-zero entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsnFlag {
    pub width: u32,
    pub bits: InsnBits,
}

/// Flags for every code unit address of one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsnFlags {
    flags: Vec<InsnFlag>,
}

impl InsnFlags {
    pub fn new(insns_size: usize) -> Self {
        InsnFlags { flags: vec![InsnFlag::default(); insns_size] }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Width of the instruction at `addr`, or 0 if no instruction starts there.
    pub fn width(&self, addr: usize) -> usize {
        self.flags.get(addr).map_or(0, |f| f.width as usize)
    }

    pub(crate) fn set_width(&mut self, addr: usize, width: u32) {
        self.flags[addr].width = width;
    }

    pub fn is_opcode(&self, addr: usize) -> bool {
        self.width(addr) != 0
    }

    fn has(&self, addr: usize, bit: InsnBits) -> bool {
        self.flags.get(addr).is_some_and(|f| f.bits.contains(bit))
    }

    fn set(&mut self, addr: usize, bit: InsnBits, on: bool) {
        if let Some(f) = self.flags.get_mut(addr) {
            f.bits.set(bit, on);
        }
    }

    pub fn is_in_try(&self, addr: usize) -> bool {
        self.has(addr, InsnBits::IN_TRY)
    }

    pub(crate) fn set_in_try(&mut self, addr: usize, on: bool) {
        self.set(addr, InsnBits::IN_TRY, on)
    }

    pub fn is_branch_target(&self, addr: usize) -> bool {
        self.has(addr, InsnBits::BRANCH_TARGET)
    }

    pub(crate) fn set_branch_target(&mut self, addr: usize, on: bool) {
        self.set(addr, InsnBits::BRANCH_TARGET, on)
    }

    pub fn is_gc_point(&self, addr: usize) -> bool {
        self.has(addr, InsnBits::GC_POINT)
    }

    /// The type-flow pass narrows the set of GC points the structural pass
    /// marked, so this stays public.
    pub fn set_gc_point(&mut self, addr: usize, on: bool) {
        self.set(addr, InsnBits::GC_POINT, on)
    }

    /// Instruction start addresses in ascending order.
    pub fn instruction_starts(&self) -> impl Iterator<Item = usize> + '_ {
        self.flags.iter().enumerate().filter(|(_, f)| f.width != 0).map(|(addr, _)| addr)
    }

    /// Addresses currently flagged as GC points, ascending.
    pub fn gc_points(&self) -> impl Iterator<Item = usize> + '_ {
        self.instruction_starts().filter(|&addr| self.is_gc_point(addr))
    }

    pub fn count_gc_points(&self) -> usize {
        self.gc_points().count()
    }

    /// Checks that no bits are set anywhere but on instruction starts.
    pub fn flags_only_on_instructions(&self) -> bool {
        self.flags.iter().all(|f| f.width != 0 || f.bits.is_empty())
    }
}
