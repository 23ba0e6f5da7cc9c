//! Structural verification of method bytecode.
//!
//! A method goes through four passes, each taking the per-address
//! [`InsnFlags`](flags::InsnFlags) by exclusive reference:
//!
//! 1. [`scan::compute_widths`] records every instruction's width.
//! 2. [`scan::scan_try_catch`] marks try coverage and handler entry points.
//! 3. [`static_checks::verify_instructions`] checks operands, branch and
//!    switch targets and inline tables, and marks GC points.
//! 4. [`blocks::compute_basic_blocks`] splits the code into basic blocks.
//!
//! The first failure rejects the whole method.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::dex::code::{ClassDef, MethodDef};
use crate::dex::error::DexError;
use crate::dex::pool::DexPool;

pub mod blocks;
pub mod flags;
pub mod scan;
pub mod static_checks;

use blocks::BasicBlocks;
use flags::InsnFlags;

/// Tally of the opcodes later passes need to size their tables for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpCounts {
    pub new_instance: usize,
    pub monitor_enter: usize,
}

/// Everything the structural passes produce for one method.
#[derive(Debug, Clone, Default)]
pub struct VerifiedMethod {
    pub flags: InsnFlags,
    pub blocks: BasicBlocks,
    pub counts: OpCounts,
}

/// Runs the structural passes over one method.
///
/// Native and abstract methods without code verify trivially, with no flags
/// and no blocks.
pub fn verify_method(method: &MethodDef, pool: &dyn DexPool) -> Result<VerifiedMethod, DexError> {
    verify_method_code(method, pool).map_err(|e| {
        warn!("VFY: rejecting {}: {}", method.name, e);
        err!(e, "method {}", method.name)
    })
}

fn verify_method_code(method: &MethodDef, pool: &dyn DexPool) -> Result<VerifiedMethod, DexError> {
    let code = match &method.code {
        Some(code) if !code.insns.is_empty() => code,
        _ if method.has_bytecode() => fail!("Zero-length code in concrete non-native method"),
        _ => return Ok(VerifiedMethod::default()),
    };

    if code.ins_size > code.registers_size {
        fail!("Bad register counts (ins={} regs={})", code.ins_size, code.registers_size);
    }

    let mut flags = InsnFlags::new(code.insns_size());
    let counts = scan::compute_widths(&code.insns, &mut flags)?;
    scan::scan_try_catch(code, &mut flags)?;
    static_checks::verify_instructions(code, pool, &mut flags)?;
    let blocks = blocks::compute_basic_blocks(code, &flags)?;

    debug!(
        "VFY: {} ok ({} units, {} blocks, {} gc points)",
        method.name,
        code.insns_size(),
        blocks.len(),
        flags.count_gc_points()
    );
    Ok(VerifiedMethod { flags, blocks, counts })
}

/// Verifies every method of a class, direct methods first.
///
/// Stops at the first method that fails; the error names both the method
/// and the class.
pub fn verify_class(class: &ClassDef, pool: &dyn DexPool) -> Result<Vec<VerifiedMethod>, DexError> {
    let mut verified = Vec::with_capacity(class.direct_methods.len() + class.virtual_methods.len());
    for method in class.methods() {
        let result = verify_method(method, pool).map_err(|e| err!(e, "class {}", class.descriptor))?;
        verified.push(result);
    }
    Ok(verified)
}
