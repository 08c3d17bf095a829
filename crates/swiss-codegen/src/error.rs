//! Codegen error type.

use swiss_types::{Diagnostic, Span, Stage};
use thiserror::Error;

/// A fatal code-generation failure, naming the offending symbol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{symbol}': {reason}")]
pub struct CodegenError {
    pub symbol: String,
    pub reason: String,
    pub file: String,
    pub span: Span,
}

impl CodegenError {
    pub fn new(
        symbol: impl Into<String>,
        reason: impl Into<String>,
        file: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            reason: reason.into(),
            file: file.into(),
            span,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(&self.file, self.span, Stage::Codegen, self.to_string())
    }
}
