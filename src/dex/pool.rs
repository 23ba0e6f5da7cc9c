//! Constant pool bounds as seen by the structural verifier.
//!
//! Only the section sizes and the type descriptors are needed: indices are
//! range-checked, and `new-instance`/`new-array` look at the shape of the
//! descriptor they reference.

use cesu8::{from_java_cesu8, to_java_cesu8};

use crate::dex::error::DexError;
use crate::dex::opcodes::PoolKind;
use crate::dex::{read_u1, read_uleb128, write_uleb128};

/// Read-only view of the dex file's constant pool.
pub trait DexPool
{
    /// Number of entries in a pool section.
    fn pool_size(&self, kind: PoolKind) -> usize;

    /// Descriptor of the type at `idx`, if it is in range.
    fn type_descriptor(&self, idx: u32) -> Option<&str>;
}

/// Constant pool with explicit string/field/method counts and the list of
/// type descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool
{
    pub string_count: usize,
    pub field_count: usize,
    pub method_count: usize,
    pub types: Vec<String>,
}

impl ConstantPool
{
    pub fn new(string_count: usize, field_count: usize, method_count: usize) -> Self
    {
        ConstantPool { string_count, field_count, method_count, types: vec![] }
    }

    /// Appends a type descriptor, returning its index.
    pub fn add_type(&mut self, descriptor: &str) -> u32
    {
        self.types.push(descriptor.to_string());
        (self.types.len() - 1) as u32
    }

    pub fn with_types(mut self, descriptors: &[&str]) -> Self
    {
        for d in descriptors { self.add_type(d); }
        self
    }

    /// Reads a string_data_item (UTF-16 length then zero-terminated MUTF-8)
    /// and appends it as a type descriptor.
    pub fn read_type(&mut self, bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
    {
        let start = *ix;
        let _utf16_size = read_uleb128(bytes, ix)?;
        let mut v = vec![];
        loop
        {
            let u = read_u1(bytes, ix)?;
            if u != 0 { v.push(u); }
            else { break; }
        }

        match from_java_cesu8(v.as_slice())
        {
            Ok(descriptor) => Ok(self.add_type(&descriptor)),
            Err(_) => fail!("Type descriptor at 0x{:x} is not valid MUTF-8", start),
        }
    }
}

/// Encodes a descriptor as a dex string_data_item.
pub fn write_type(bytes: &mut Vec<u8>, descriptor: &str) -> usize
{
    let mut c = write_uleb128(bytes, descriptor.encode_utf16().count() as u32);
    let encoded = to_java_cesu8(descriptor);
    bytes.extend_from_slice(&encoded);
    bytes.push(0);
    c += encoded.len() + 1;
    c
}

impl DexPool for ConstantPool
{
    fn pool_size(&self, kind: PoolKind) -> usize
    {
        match kind
        {
            PoolKind::String => self.string_count,
            PoolKind::Type => self.types.len(),
            PoolKind::Field => self.field_count,
            PoolKind::Method => self.method_count,
        }
    }

    fn type_descriptor(&self, idx: u32) -> Option<&str>
    {
        self.types.get(idx as usize).map(|s| s.as_str())
    }
}
