use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Syntax,
    Resolve,
    Codegen,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Resolve => write!(f, "resolve"),
            Self::Codegen => write!(f, "codegen"),
        }
    }
}

/// A lexical or syntactic error in one source file.
///
/// These are recoverable: the front end collects them and keeps going so a
/// single compile reports every file's errors at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl SyntaxError {
    pub fn new(file: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: span.line,
            column: span.column,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

impl std::error::Error for SyntaxError {}

/// One entry in the structured multi-file error report.
///
/// The host UI renders these directly — it must never parse free-form
/// strings back apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub stage: Stage,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        file: impl Into<String>,
        span: Span,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line: span.line,
            column: span.column,
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: [{}] {}",
            self.file, self.line, self.column, self.stage, self.message
        )
    }
}

/// The complete error report for one failed compile.
///
/// A compile returns either a cartridge image or one of these — never both,
/// never neither.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn push_syntax(&mut self, err: SyntaxError) {
        self.diagnostics.push(Diagnostic {
            file: err.file,
            line: err.line,
            column: err.column,
            stage: Stage::Syntax,
            message: err.message,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }
}

impl fmt::Display for CompileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.diagnostics {
            writeln!(f, "{d}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileReport {}
