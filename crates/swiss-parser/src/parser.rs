//! Core parser infrastructure: token cursor, error collection, recovery.

use swiss_lexer::token::{Token, TokenKind};
use swiss_lexer::Lexer;
use swiss_types::ast::SourceUnit;
use swiss_types::{SourceFile, Span, SyntaxError};

/// Result of parsing one file.
pub struct ParseResult {
    /// The parsed unit. `None` only when errors were collected.
    pub unit: Option<SourceUnit>,
    pub errors: Vec<SyntaxError>,
}

/// Lex and parse one source file.
///
/// The single front-end entry point: `parse_source(file) → SourceUnit`
/// or the file's collected lexical and syntax errors.
pub fn parse_source(source_file: &SourceFile) -> ParseResult {
    let lexed = Lexer::new(source_file).lex();
    let mut result = Parser::new(lexed.tokens, source_file).parse();
    if !lexed.errors.is_empty() {
        // Lexical errors come first; they explain most downstream noise.
        let mut errors = lexed.errors;
        errors.extend(result.errors);
        result.errors = errors;
        result.unit = None;
    }
    result
}

/// The Swiss parser.
///
/// Consumes the lexer's token stream and builds a [`SourceUnit`].
/// On error it records a diagnostic and skips to the next line, so one
/// pass reports every statement-level problem in the file.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file_name: String,
    pub(crate) errors: Vec<SyntaxError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, source_file: &SourceFile) -> Self {
        Self {
            tokens,
            pos: 0,
            file_name: source_file.name.clone(),
            errors: Vec::new(),
        }
    }

    /// Parse the whole token stream into a source unit.
    pub fn parse(mut self) -> ParseResult {
        let mut decls = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_end() {
                break;
            }
            match self.parse_decl() {
                Some(decl) => decls.push(decl),
                None => self.sync_to_next_line(),
            }
        }

        let unit = if self.errors.is_empty() {
            Some(SourceUnit {
                file: self.file_name,
                decls,
            })
        } else {
            None
        };
        ParseResult {
            unit,
            errors: self.errors,
        }
    }

    // ── Token cursor ─────────────────────────────────────────────────

    pub(crate) fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| {
            self.tokens
                .last()
                .expect("token stream always ends with Eof")
        })
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    /// Consume the current token if it matches.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume a token of the given kind or record an error.
    pub(crate) fn expect(&mut self, kind: TokenKind, context: &str) -> Option<Token> {
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(&kind) {
            Some(self.advance())
        } else {
            self.error_here(format!("expected {kind} {context}, found {}", self.peek_kind()));
            None
        }
    }

    /// Consume an identifier or record an error.
    pub(crate) fn expect_ident(&mut self, context: &str) -> Option<swiss_types::ast::Ident> {
        match self.peek_kind() {
            TokenKind::Ident(_) => {
                let token = self.advance();
                match token.kind {
                    TokenKind::Ident(name) => Some(swiss_types::ast::Ident::new(name, token.span)),
                    _ => unreachable!(),
                }
            }
            other => {
                self.error_here(format!("expected identifier {context}, found {other}"));
                None
            }
        }
    }

    /// A simple statement ends at the end of its line.
    pub(crate) fn expect_end_of_line(&mut self) {
        if !self.eat(&TokenKind::Newline) && !self.at_end() {
            self.error_here(format!(
                "expected end of line, found {}",
                self.peek_kind()
            ));
            self.sync_to_next_line();
        }
    }

    pub(crate) fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    // ── Errors and recovery ──────────────────────────────────────────

    pub(crate) fn error_here(&mut self, message: impl Into<String>) {
        let span = self.current_span();
        self.errors
            .push(SyntaxError::new(&self.file_name, span, message));
    }

    /// Skip tokens until the next line starts (or Eof).
    pub(crate) fn sync_to_next_line(&mut self) {
        while !self.at_end() {
            if matches!(self.advance().kind, TokenKind::Newline) {
                return;
            }
        }
    }
}
