//! Swiss code generator: lowers a resolved program plus its referenced
//! resources into a cartridge image.
//!
//! # Layout
//!
//! Symbols get addresses in the resolver's canonical order:
//!
//! - constants fold to compile-time words (no storage)
//! - globals and subroutine parameter slots get word addresses from
//!   [`swiss_types::GLOBAL_BASE`]
//! - resources map into memory from [`swiss_types::RESOURCE_BASE`] in
//!   first-reference order
//! - functions emit in symbol order; string literals intern into a pool
//!   appended after the last function
//!
//! Forward references are legal, so generation is two-pass: call sites
//! emit placeholder offsets and are patched once every function has an
//! address. A [`CodegenError`] aborts the whole image — nothing partial
//! is ever returned.

mod error;
mod generator;

pub use error::CodegenError;
pub use generator::generate;
