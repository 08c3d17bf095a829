//! Shared types for the Swiss console toolchain.
//!
//! This crate defines everything more than one pipeline stage needs to
//! agree on: source spans, the per-file AST, the structured diagnostics
//! report, the project and resource model, the virtual machine ISA, and
//! the cartridge image format.

pub mod ast;
pub mod image;
pub mod isa;

mod diag;
mod project;
mod resolved;
mod span;

pub use diag::{CompileReport, Diagnostic, Stage, SyntaxError};
pub use image::{CartridgeImage, ImageError, ResourceEntry, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use isa::{Op, GLOBAL_BASE, MEMORY_SIZE, RESOURCE_BASE};
pub use project::{Project, ProjectError, Resource, ResourceKind, SourceEntry};
pub use resolved::{ResolvedProgram, Symbol, SymbolId, SymbolKind, SymbolLocation};
pub use span::{SourceFile, Span};
