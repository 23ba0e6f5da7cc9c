//! Method bodies as dex files carry them: the code_item with its try table
//! and encoded catch handler list.

use log::warn;

use crate::dex::error::DexError;
use crate::dex::leb::decode_uleb128;
use crate::dex::{read_sleb128, read_u2, read_u4, read_uleb128, write_sleb128, write_u2, write_u4, write_uleb128};

pub const ACC_NATIVE: u32 = 0x0100;
pub const ACC_ABSTRACT: u32 = 0x0400;
/// Set by the VM on interface methods it copies into a class's vtable.
pub const ACC_MIRANDA: u32 = 0x8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTypeAddrPair {
    pub type_idx: u32,
    pub addr: u32,
}

impl EncodedTypeAddrPair {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedTypeAddrPair, DexError> {
        let type_idx = read_uleb128(bytes, ix)?;
        let addr = read_uleb128(bytes, ix)?;
        Ok(EncodedTypeAddrPair { type_idx, addr })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_uleb128(bytes, self.type_idx);
        c += write_uleb128(bytes, self.addr);
        c
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    pub handler_off: u16, // offset (in bytes) into the encoded_catch_handler_list
}

impl TryItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<TryItem, DexError> {
        Ok(TryItem {
            start_addr: read_u4(bytes, ix)?,
            insn_count: read_u2(bytes, ix)?,
            handler_off: read_u2(bytes, ix)?,
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u4(bytes, self.start_addr);
        c += write_u2(bytes, self.insn_count);
        c += write_u2(bytes, self.handler_off);
        c
    }

    /// One past the last covered address. Computed wide so a corrupt start
    /// address cannot wrap.
    pub fn end_addr(&self) -> u64 {
        self.start_addr as u64 + self.insn_count as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCatchHandler {
    pub handlers: Vec<EncodedTypeAddrPair>,
    pub catch_all_addr: Option<u32>,
}

impl EncodedCatchHandler {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedCatchHandler, DexError> {
        let size = read_sleb128(bytes, ix)?;
        let count = size.unsigned_abs() as usize;
        let mut pairs = Vec::with_capacity(count.min(64));
        for _ in 0..count { pairs.push(EncodedTypeAddrPair::read(bytes, ix)?); }
        let catch_all_addr = if size <= 0 { Some(read_uleb128(bytes, ix)?) } else { None };
        Ok(EncodedCatchHandler { handlers: pairs, catch_all_addr })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        let size: i32 = if self.catch_all_addr.is_some() { -(self.handlers.len() as i32) } else { self.handlers.len() as i32 };
        c += write_sleb128(bytes, size);
        for p in &self.handlers { c += p.write(bytes); }
        if let Some(addr) = self.catch_all_addr { c += write_uleb128(bytes, addr); }
        c
    }

    /// Every address control may enter the handler at, typed handlers first.
    pub fn addresses(&self) -> impl Iterator<Item = u32> + '_ {
        self.handlers.iter().map(|p| p.addr).chain(self.catch_all_addr)
    }
}

/// A method body: register counts, code units and exception table.
///
/// The catch handler list is kept in its encoded form so that
/// [`TryItem::handler_off`] addresses it exactly as in a dex file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeItem
{
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub insns: Vec<u16>,
    pub tries: Vec<TryItem>,
    /// encoded_catch_handler_list, starting with its ULEB128 entry count.
    pub handler_list: Vec<u8>,
}

impl CodeItem
{
    pub fn new(registers_size: u16, ins_size: u16, insns: Vec<u16>) -> Self
    {
        CodeItem { registers_size, ins_size, outs_size: 0, insns, tries: vec![], handler_list: vec![] }
    }

    /// Adds a try range whose handler is appended to the handler list.
    /// Tries must be added in address order.
    pub fn with_try(mut self, start_addr: u32, insn_count: u16, handler: EncodedCatchHandler) -> Self
    {
        let (count, count_size) = decode_uleb128(&self.handler_list).unwrap_or((0, 0));
        let entries = self.handler_list.split_off(count_size);

        let mut list = Vec::with_capacity(entries.len() + 8);
        write_uleb128(&mut list, count + 1);
        let shift = list.len() - count_size;
        list.extend(entries);

        // A longer count prefix moves every existing entry.
        if count_size > 0 && shift > 0
        {
            for t in self.tries.iter_mut() { t.handler_off += shift as u16; }
        }

        let handler_off = list.len() as u16;
        handler.write(&mut list);
        self.handler_list = list;
        self.tries.push(TryItem { start_addr, insn_count, handler_off });
        self
    }

    /// Adds a try range sharing the handler of an earlier one.
    pub fn with_shared_try(mut self, start_addr: u32, insn_count: u16, handler_off: u16) -> Self
    {
        self.tries.push(TryItem { start_addr, insn_count, handler_off });
        self
    }

    /// Decodes the handler entry a try item points at.
    pub fn handler_at(&self, handler_off: u16) -> Result<EncodedCatchHandler, DexError>
    {
        let mut ix = handler_off as usize;
        if ix >= self.handler_list.len()
        {
            fail!("Handler offset {} outside catch handler list of {} bytes", handler_off, self.handler_list.len());
        }
        EncodedCatchHandler::read(&self.handler_list, &mut ix)
            .map_err(|e| err!(e, "catch handler at offset {}", handler_off))
    }

    pub fn insns_size(&self) -> usize
    {
        self.insns.len()
    }

    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<CodeItem, DexError>
    {
        let code_item_start = *ix;
        let registers_size = read_u2(bytes, ix)?;
        let ins_size = read_u2(bytes, ix)?;
        let outs_size = read_u2(bytes, ix)?;
        let tries_size = read_u2(bytes, ix)?;
        let _debug_info_off = read_u4(bytes, ix)?;

        let insns_size = read_u4(bytes, ix)? as usize;
        if bytes.len() < *ix + insns_size * 2
        {
            fail!("insns_size {} runs past end of data (code_item at 0x{:x})", insns_size, code_item_start);
        }
        let mut insns = Vec::with_capacity(insns_size);
        for _ in 0..insns_size { insns.push(read_u2(bytes, ix)?); }

        let mut tries = vec![];
        let mut handler_list = vec![];

        if tries_size > 0
        {
            if (insns_size & 1) != 0
            {
                let padding = read_u2(bytes, ix)?;
                if padding != 0
                {
                    warn!("[codeitem] non-zero padding 0x{:04x} at 0x{:x} (code_item_start=0x{:x})",
                        padding, *ix - 2, code_item_start);
                }
            }
            for _ in 0..tries_size { tries.push(TryItem::read(bytes, ix)?); }

            // Scan the list with a temporary cursor so the raw bytes can be kept.
            let list_start = *ix;
            let mut scan = list_start;
            let handlers_size = read_uleb128(bytes, &mut scan)? as usize;
            for i in 0..handlers_size
            {
                let entry_off = scan;
                EncodedCatchHandler::read(bytes, &mut scan).map_err(|e| {
                    err!(e, "while reading EncodedCatchHandler #{}/{} at 0x{:x} (code_item_start=0x{:x})",
                        i + 1, handlers_size, entry_off, code_item_start)
                })?;
            }
            handler_list = bytes[list_start..scan].to_vec();
            *ix = scan;
        }

        Ok(CodeItem { registers_size, ins_size, outs_size, insns, tries, handler_list })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        let mut c = 0;
        c += write_u2(bytes, self.registers_size);
        c += write_u2(bytes, self.ins_size);
        c += write_u2(bytes, self.outs_size);
        c += write_u2(bytes, self.tries.len() as u16);
        c += write_u4(bytes, 0);

        c += write_u4(bytes, self.insns.len() as u32);
        for i in &self.insns { c += write_u2(bytes, *i); }

        if !self.tries.is_empty()
        {
            if (self.insns.len() & 1) != 0
            {
                c += write_u2(bytes, 0);
            }
            for t in &self.tries { c += t.write(bytes); }
            if self.handler_list.is_empty()
            {
                c += write_uleb128(bytes, 0);
            }
            else
            {
                bytes.extend_from_slice(&self.handler_list);
                c += self.handler_list.len();
            }
        }

        c
    }
}

/// A method as the verifier sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef
{
    pub name: String,
    pub access_flags: u32,
    pub code: Option<CodeItem>,
}

impl MethodDef
{
    pub fn new(name: &str, access_flags: u32, code: Option<CodeItem>) -> Self
    {
        MethodDef { name: name.to_string(), access_flags, code }
    }

    pub fn is_native(&self) -> bool { self.access_flags & ACC_NATIVE != 0 }
    pub fn is_abstract(&self) -> bool { self.access_flags & ACC_ABSTRACT != 0 }
    pub fn is_miranda(&self) -> bool { self.access_flags & ACC_MIRANDA != 0 }

    /// Native and abstract methods have no bytecode to verify or map.
    pub fn has_bytecode(&self) -> bool
    {
        !self.is_native() && !self.is_abstract()
    }
}

/// A class definition: its descriptor and its methods in dex order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassDef
{
    pub descriptor: String,
    pub direct_methods: Vec<MethodDef>,
    pub virtual_methods: Vec<MethodDef>,
}

impl ClassDef
{
    pub fn new(descriptor: &str) -> Self
    {
        ClassDef { descriptor: descriptor.to_string(), ..Default::default() }
    }

    /// Direct methods then virtual methods.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDef>
    {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }
}
