//! # dexverify
//!
//! Structural verification of Dalvik method bytecode, and the register maps
//! a garbage collector uses to find object references in interpreted frames.
//!
//! Verification runs a method through a fixed pipeline of passes (see
//! [`verify`]); the flags it leaves behind say which instructions are GC
//! points, and [`regmap`] turns those plus the per-address register types
//! into a compact, optionally compressed, map.
//!
//! # Examples
//!
//! ```
//! use dexverify::dex::code::{CodeItem, MethodDef};
//! use dexverify::dex::pool::ConstantPool;
//! use dexverify::verify_method;
//!
//! // const/4 v0, #0; return-void
//! let code = CodeItem::new(1, 0, vec![0x0012, 0x000e]);
//! let method = MethodDef::new("run", 0, Some(code));
//! let verified = verify_method(&method, &ConstantPool::default()).unwrap();
//! assert_eq!(verified.flags.gc_points().collect::<Vec<_>>(), vec![1]);
//! ```

#[macro_use]
pub mod dex;
pub mod regmap;
pub mod verify;

#[cfg(test)]
mod tests;

pub use dex::error::DexError;
pub use regmap::generate::generate_register_map;
pub use regmap::{MapError, MapFormat, RegisterMap, RegisterMapConfig};
pub use verify::{verify_class, verify_method, VerifiedMethod};
