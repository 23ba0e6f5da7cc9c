//! Basic blocks and predecessor edges.
//!
//! Blocks live in an arena and are found through a per-address index that
//! is only populated at block start addresses. Forward edges create the
//! target block before the walk reaches it.

use std::collections::BTreeSet;
use std::fmt::Write;

use log::{debug, error};

use crate::dex::code::CodeItem;
use crate::dex::error::DexError;
use crate::dex::instruction::{branch_offset, fetch_u32, is_payload};
use crate::dex::opcodes::{opcode_of, OpcodeFlags, OP_NOP, OP_PACKED_SWITCH};
use crate::verify::flags::InsnFlags;

/// One bit per register.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiveRegs {
    words: Vec<u64>,
    len: usize,
}

impl LiveRegs {
    pub fn new(len: usize) -> Self {
        LiveRegs { words: vec![0; len.div_ceil(64)], len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_set(&self, reg: usize) -> bool {
        reg < self.len && self.words[reg / 64] & (1 << (reg % 64)) != 0
    }

    pub fn set(&mut self, reg: usize, live: bool) {
        if reg >= self.len {
            return;
        }
        if live {
            self.words[reg / 64] |= 1 << (reg % 64);
        } else {
            self.words[reg / 64] &= !(1 << (reg % 64));
        }
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Registers that are live, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|&r| self.is_set(r))
    }

    /// Merges `other` in, returning whether anything changed.
    pub fn union_with(&mut self, other: &LiveRegs) -> bool {
        let mut changed = false;
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            let merged = *w | *o;
            changed |= merged != *w;
            *w = merged;
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub first_addr: usize,
    /// Address of the last instruction; `None` until the walk closes the block.
    last_addr: Option<usize>,
    /// First addresses of the blocks control can arrive from.
    predecessors: BTreeSet<usize>,
    /// Storage for the liveness pass.
    pub live_regs: LiveRegs,
}

impl BasicBlock {
    fn new(first_addr: usize, registers: usize) -> Self {
        BasicBlock { first_addr, last_addr: None, predecessors: BTreeSet::new(), live_regs: LiveRegs::new(registers) }
    }

    pub fn last_addr(&self) -> usize {
        self.last_addr.unwrap_or(self.first_addr)
    }

    pub fn predecessors(&self) -> impl Iterator<Item = usize> + '_ {
        self.predecessors.iter().copied()
    }

    pub fn has_predecessor(&self, first_addr: usize) -> bool {
        self.predecessors.contains(&first_addr)
    }
}

/// The basic blocks of one method.
#[derive(Debug, Clone, Default)]
pub struct BasicBlocks {
    blocks: Vec<BasicBlock>,
    by_addr: Vec<Option<usize>>,
    registers: usize,
}

impl BasicBlocks {
    fn new(insns_size: usize, registers: usize) -> Self {
        BasicBlocks { blocks: vec![], by_addr: vec![None; insns_size], registers }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The block starting at `addr`. Addresses inside a block have none.
    pub fn block_at(&self, addr: usize) -> Option<&BasicBlock> {
        self.by_addr.get(addr).copied().flatten().map(|i| &self.blocks[i])
    }

    pub fn block_at_mut(&mut self, addr: usize) -> Option<&mut BasicBlock> {
        match self.by_addr.get(addr).copied().flatten() {
            Some(i) => Some(&mut self.blocks[i]),
            None => None,
        }
    }

    /// Blocks in address order.
    pub fn iter(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.by_addr.iter().filter_map(|slot| slot.map(|i| &self.blocks[i]))
    }

    pub fn predecessors(&self, addr: usize) -> Vec<usize> {
        self.block_at(addr).map(|b| b.predecessors().collect()).unwrap_or_default()
    }

    fn get_or_create(&mut self, addr: usize) -> usize {
        if let Some(i) = self.by_addr[addr] {
            return i;
        }
        self.blocks.push(BasicBlock::new(addr, self.registers));
        let i = self.blocks.len() - 1;
        self.by_addr[addr] = Some(i);
        i
    }

    /// Logs every block with its predecessors.
    pub fn dump(&self, method: &str) {
        debug!("Basic blocks for {}", method);
        for block in self.iter() {
            let mut line = format!(" {:04x}-{:04x} ", block.first_addr, block.last_addr());
            if block.predecessors.is_empty() {
                line.push_str("(no preds)");
            } else {
                line.push_str("preds:");
                for p in block.predecessors() {
                    let _ = write!(line, "{:04x},", p);
                }
            }
            debug!("{}", line);
        }
    }
}

/// Try range the walk is currently in or approaching, with its handlers.
struct TryCursor<'a> {
    code: &'a CodeItem,
    index: usize,
    start: usize,
    end: usize,
    handlers: Vec<usize>,
}

impl<'a> TryCursor<'a> {
    fn new(code: &'a CodeItem) -> Self {
        TryCursor { code, index: 0, start: 0, end: 0, handlers: vec![] }
    }

    /// Moves to the try range that covers or follows `addr`. Ranges are
    /// sorted and disjoint, so the cursor only ever moves forward.
    fn advance_to(&mut self, addr: usize) -> Result<(), DexError> {
        while addr >= self.end && self.index < self.code.tries.len() {
            let t = &self.code.tries[self.index];
            self.start = t.start_addr as usize;
            self.end = t.end_addr() as usize;
            self.handlers = self.code.handler_at(t.handler_off)?.addresses().map(|a| a as usize).collect();
            self.index += 1;
        }
        if addr >= self.end {
            self.handlers.clear();
        }
        Ok(())
    }

    fn handlers_for(&self, addr: usize) -> &[usize] {
        if addr >= self.start && addr < self.end {
            &self.handlers
        } else {
            &[]
        }
    }
}

/// Splits a verified method into basic blocks and links each block to the
/// blocks control can reach it from.
///
/// `flags` must hold the widths, try coverage and branch targets computed
/// by the structural passes.
pub fn compute_basic_blocks(code: &CodeItem, flags: &InsnFlags) -> Result<BasicBlocks, DexError> {
    let insns = &code.insns;
    let insns_size = insns.len();
    let mut blocks = BasicBlocks::new(insns_size, code.registers_size as usize);
    let mut tries = TryCursor::new(code);

    let mut block_start = 0usize;
    let mut addr = 0usize;
    while addr < insns_size {
        tries.advance_to(addr)?;

        let width = flags.width(addr);
        if width == 0 {
            fail!("No instruction recorded at 0x{:04x}", addr);
        }
        let unit = insns[addr];
        let opcode = opcode_of(unit);
        let next = addr + width;

        // Decide if this instruction ends the current block. A throwing
        // instruction only does when a local handler may catch it.
        let mut ignore = false;
        let end_block = if is_payload(unit) {
            // data tables are skipped entirely
            ignore = true;
            true
        } else if !opcode.can_continue() || opcode.flags.intersects(OpcodeFlags::CAN_BRANCH | OpcodeFlags::CAN_SWITCH) {
            true
        } else if opcode.can_throw() && flags.is_in_try(addr) {
            true
        } else if next < insns_size && flags.is_branch_target(next) {
            true
        } else if opcode.value == OP_NOP && next < insns_size && is_payload(insns[next]) {
            // padding ahead of a data table
            ignore = true;
            true
        } else {
            false
        };

        if addr != block_start && blocks.block_at(addr).is_some() {
            error!("Basic block at 0x{:04x} lies inside the block starting at 0x{:04x}", addr, block_start);
            panic!("basic block at 0x{:04x} inside block 0x{:04x}", addr, block_start);
        }

        if ignore && addr != block_start {
            fail!("Execution can fall into data table at 0x{:04x}", addr);
        }

        if end_block {
            if !ignore {
                let cur = blocks.get_or_create(block_start);
                blocks.blocks[cur].last_addr = Some(addr);

                let handlers = if opcode.can_throw() { tries.handlers_for(addr).to_vec() } else { vec![] };
                for target in successors(code, addr, next, opcode.flags, &handlers)? {
                    add_edge(&mut blocks, insns, block_start, target)?;
                }
            }
            block_start = next;
        }
        addr = next;
    }

    if block_start < insns_size {
        fail!("Execution can walk off end of code at 0x{:04x}", insns_size - 1);
    }
    if let Some(open) = blocks.blocks.iter().find(|b| b.last_addr.is_none()) {
        fail!("Control reaches 0x{:04x} but no block ends after it", open.first_addr);
    }

    Ok(blocks)
}

/// Every address control can move to from the instruction at `addr`:
/// exception handlers, the next instruction, the branch target and the
/// switch cases.
fn successors(
    code: &CodeItem,
    addr: usize,
    next: usize,
    flags: OpcodeFlags,
    handlers: &[usize],
) -> Result<Vec<usize>, DexError> {
    let insns = &code.insns;
    let mut targets: Vec<usize> = handlers.to_vec();

    if flags.contains(OpcodeFlags::CAN_CONTINUE) {
        if next >= insns.len() {
            fail!("Execution can walk off end of code at 0x{:04x}", addr);
        }
        targets.push(next);
    }

    if flags.contains(OpcodeFlags::CAN_BRANCH) {
        let Some((offset, _)) = branch_offset(insns, addr) else {
            fail!("No branch offset at 0x{:04x}", addr);
        };
        targets.push(relative(insns, addr, offset as i64)?);
    }

    if flags.contains(OpcodeFlags::CAN_SWITCH) {
        let offset = fetch_u32(insns, addr + 1).unwrap_or(0) as i32;
        let table = relative(insns, addr, offset as i64)?;
        let count = insns.get(table + 1).copied().unwrap_or(0) as usize;
        let targets_at = if (insns[addr] & 0xff) as u8 == OP_PACKED_SWITCH {
            table + 4
        } else {
            table + 2 + 2 * count
        };
        for i in 0..count {
            let Some(case) = fetch_u32(insns, targets_at + i * 2) else {
                fail!("Switch table at 0x{:04x} runs past end of code", table);
            };
            targets.push(relative(insns, addr, case as i32 as i64)?);
        }
    }

    Ok(targets)
}

fn relative(insns: &[u16], addr: usize, offset: i64) -> Result<usize, DexError> {
    let abs = addr as i64 + offset;
    if abs < 0 || abs >= insns.len() as i64 {
        fail!("Control flow target {} from 0x{:04x} is outside the code", abs, addr);
    }
    Ok(abs as usize)
}

fn add_edge(blocks: &mut BasicBlocks, insns: &[u16], from: usize, target: usize) -> Result<(), DexError> {
    if is_payload(insns[target]) {
        fail!("Control flow from block 0x{:04x} into data table at 0x{:04x}", from, target);
    }
    let i = blocks.get_or_create(target);
    // Repeated switch cases and branches to the next instruction land here twice.
    blocks.blocks[i].predecessors.insert(from);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::code::{EncodedCatchHandler, EncodedTypeAddrPair};
    use crate::dex::instruction::PACKED_SWITCH_SIGNATURE;
    use crate::dex::pool::ConstantPool;
    use crate::verify::scan::{compute_widths, scan_try_catch};
    use crate::verify::static_checks::verify_instructions;

    fn blocks_of(code: &CodeItem) -> Result<BasicBlocks, DexError> {
        let pool = ConstantPool::new(4, 4, 4).with_types(&["Ljava/lang/Exception;"]);
        let mut flags = InsnFlags::new(code.insns_size());
        compute_widths(&code.insns, &mut flags)?;
        scan_try_catch(code, &mut flags)?;
        verify_instructions(code, &pool, &mut flags)?;
        compute_basic_blocks(code, &flags)
    }

    fn ranges(blocks: &BasicBlocks) -> Vec<(usize, usize)> {
        blocks.iter().map(|b| (b.first_addr, b.last_addr())).collect()
    }

    #[test]
    fn straight_line_is_one_block() {
        // const/4 v0; const/4 v1; return-void
        let code = CodeItem::new(2, 0, vec![0x0012, 0x1112, 0x000e]);
        let blocks = blocks_of(&code).expect("blocks");
        assert_eq!(ranges(&blocks), vec![(0, 2)]);
        assert_eq!(blocks.predecessors(0), Vec::<usize>::new());
    }

    #[test]
    fn conditional_branch_edges() {
        // 0: const/4 v0; 1: if-eqz v0, +3; 3: const/4 v1; 4: return-void
        let code = CodeItem::new(3, 0, vec![0x0012, 0x0038, 0x0003, 0x1112, 0x000e]);
        let blocks = blocks_of(&code).expect("blocks");

        assert_eq!(ranges(&blocks), vec![(0, 1), (3, 3), (4, 4)]);
        assert_eq!(blocks.predecessors(3), vec![0]);
        assert_eq!(blocks.predecessors(4), vec![0, 3]);
        assert!(blocks.block_at(1).is_none());
        assert!(blocks.block_at(2).is_none());
    }

    #[test]
    fn loop_back_edge() {
        // 0: const/4 v0; 1: add-int/lit8 v0, v0, #1; 3: if-nez v0, -2; 5: return-void
        let code = CodeItem::new(1, 0, vec![0x0012, 0x00d8, 0x0100, 0x0039, 0xfffe, 0x000e]);
        let blocks = blocks_of(&code).expect("blocks");
        assert_eq!(ranges(&blocks), vec![(0, 0), (1, 3), (5, 5)]);
        assert_eq!(blocks.predecessors(1), vec![0, 1]);
        assert_eq!(blocks.predecessors(5), vec![1]);
    }

    #[test]
    fn throwing_instruction_ends_block_only_in_try() {
        // 0: const/4 v0; 1: array-length v0, v0; 2: array-length v0, v0; 3: return-void; 4: move-exception v0; 5: return-void
        let insns = vec![0x0012, 0x0021, 0x0021, 0x000e, 0x000d, 0x000e];
        let handler = EncodedCatchHandler {
            handlers: vec![EncodedTypeAddrPair { type_idx: 0, addr: 4 }],
            catch_all_addr: None,
        };
        let code = CodeItem::new(1, 0, insns.clone()).with_try(2, 1, handler);
        let blocks = blocks_of(&code).expect("blocks");

        // only the covered array-length splits
        assert_eq!(ranges(&blocks), vec![(0, 2), (3, 3), (4, 5)]);
        assert_eq!(blocks.predecessors(4), vec![0]);
        assert_eq!(blocks.predecessors(3), vec![0]);

        let plain = CodeItem::new(1, 0, vec![0x0012, 0x0021, 0x0021, 0x000e]);
        assert_eq!(ranges(&blocks_of(&plain).expect("blocks")), vec![(0, 3)]);
    }

    #[test]
    fn switch_fan_out_skips_data() {
        // 0: packed-switch v0, +6; 3: return-void; 4: const/4 v0; 5: return-void;
        // 6: payload [+3, +4, +3]
        let insns = vec![
            0x002b, 0x0006, 0x0000, 0x000e, 0x0012, 0x000e,
            PACKED_SWITCH_SIGNATURE, 3, 0, 0, 3, 0, 4, 0, 3, 0,
        ];
        let code = CodeItem::new(1, 0, insns);
        let blocks = blocks_of(&code).expect("blocks");

        assert_eq!(ranges(&blocks), vec![(0, 0), (3, 3), (4, 5)]);
        assert_eq!(blocks.predecessors(3), vec![0]);
        assert_eq!(blocks.predecessors(4), vec![0]);
        assert!(blocks.block_at(6).is_none());
    }

    #[test]
    fn padding_nop_before_data_is_ignored() {
        // 0: const/4 v0; 1: fill-array-data v0, +5; 4: return-void; 5: nop; 6: payload
        let insns = vec![0x0012, 0x0026, 0x0005, 0x0000, 0x000e, 0x0000, 0x0300, 1, 2, 0, 0x0201];
        let code = CodeItem::new(1, 0, insns);
        let blocks = blocks_of(&code).expect("blocks");
        assert_eq!(ranges(&blocks), vec![(0, 4)]);
        assert!(blocks.block_at(5).is_none());
    }

    #[test]
    fn falling_off_the_end_is_rejected() {
        let code = CodeItem::new(1, 0, vec![0x0012]);
        let e = blocks_of(&code).unwrap_err();
        assert!(e.message().starts_with("Execution can walk off end of code"));
    }

    #[test]
    fn live_regs_storage() {
        let code = CodeItem::new(70, 0, vec![0x000e]);
        let mut blocks = blocks_of(&code).expect("blocks");
        let block = blocks.block_at_mut(0).expect("entry block");
        assert_eq!(block.live_regs.len(), 70);
        block.live_regs.set(65, true);
        block.live_regs.set(3, true);
        assert_eq!(block.live_regs.iter().collect::<Vec<_>>(), vec![3, 65]);

        let mut other = LiveRegs::new(70);
        other.set(3, true);
        assert!(!other.clone().union_with(&LiveRegs::new(70)));
        assert!(other.union_with(&block.live_regs));
        assert!(other.is_set(65));
        other.clear();
        assert_eq!(other.iter().count(), 0);
    }
}
