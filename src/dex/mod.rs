//! Dex-level plumbing: code items, constant pool bounds, the opcode table and
//! instruction decoding.

#[macro_use]
pub mod error;

pub mod code;
pub mod instruction;
pub(crate) mod leb;
pub mod opcodes;
pub mod pool;

use crate::dex::error::DexError;
use crate::dex::leb::{decode_sleb128, decode_uleb128, encode_sleb128, write_uleb128_into};

// Basic type reading and writing
pub(crate) fn read_u1(bytes: &[u8], ix: &mut usize) -> Result<u8, DexError>
{
    if bytes.len() < *ix + 1
    {
        fail!("Unexpected end of stream reading u1 at index {}", *ix);
    }
    let result = bytes[*ix];
    *ix += 1;
    Ok(result)
}

pub(crate) fn read_u2(bytes: &[u8], ix: &mut usize) -> Result<u16, DexError>
{
    if bytes.len() < *ix + 2
    {
        fail!("Unexpected end of stream reading u2 at index {}", *ix);
    }
    let result = u16::from_le_bytes([bytes[*ix], bytes[*ix + 1]]);
    *ix += 2;
    Ok(result)
}

pub(crate) fn read_u4(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    if bytes.len() < *ix + 4
    {
        fail!("Unexpected end of stream reading u4 at index {}", *ix);
    }
    let result = u32::from_le_bytes([bytes[*ix], bytes[*ix + 1], bytes[*ix + 2], bytes[*ix + 3]]);
    *ix += 4;
    Ok(result)
}

pub(crate) fn read_uleb128(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    let tail = bytes.get(*ix..).unwrap_or(&[]);
    match decode_uleb128(tail)
    {
        Some((val, size)) => {
            *ix += size;
            Ok(val)
        }
        None => fail!("Unexpected end of stream reading uleb128 at index {}", *ix),
    }
}

pub(crate) fn read_sleb128(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    let tail = bytes.get(*ix..).unwrap_or(&[]);
    match decode_sleb128(tail)
    {
        Some((val, size)) => {
            *ix += size;
            Ok(val)
        }
        None => fail!("Unexpected end of stream reading sleb128 at index {}", *ix),
    }
}

pub(crate) fn write_u2(buffer: &mut Vec<u8>, val: u16) -> usize
{
    buffer.extend_from_slice(&val.to_le_bytes());
    2
}

pub(crate) fn write_u4(buffer: &mut Vec<u8>, val: u32) -> usize
{
    buffer.extend_from_slice(&val.to_le_bytes());
    4
}

pub(crate) fn write_uleb128(buffer: &mut Vec<u8>, val: u32) -> usize
{
    write_uleb128_into(buffer, val)
}

pub(crate) fn write_sleb128(buffer: &mut Vec<u8>, val: i32) -> usize
{
    let encoded = encode_sleb128(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}
