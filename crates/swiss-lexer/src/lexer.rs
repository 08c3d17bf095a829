//! Core Swiss lexer — converts source text to a token stream.
//!
//! - `'` starts a comment running to end of line
//! - keywords are case-insensitive; identifiers keep their spelling
//! - integer literals: decimal or `$`-prefixed hexadecimal
//! - double-quoted string literals, no escapes (matching the console's
//!   charset: a quote cannot appear inside a string)
//! - newlines are significant (statement separators) and collapse into a
//!   single [`TokenKind::Newline`]
//! - errors are collected, not thrown: the lexer skips the offending
//!   character or line and keeps scanning

use swiss_types::{SourceFile, Span, SyntaxError};

use crate::token::{Token, TokenKind};

/// Result of lexing one file: tokens plus any collected errors.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: Vec<SyntaxError>,
}

/// The Swiss lexer. Pure per file — no cross-file state.
pub struct Lexer<'src> {
    source: &'src [u8],
    file_name: &'src str,
    pos: usize,
    line: u32,
    col: u32,
    errors: Vec<SyntaxError>,
}

impl<'src> Lexer<'src> {
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            source: source_file.source.as_bytes(),
            file_name: &source_file.name,
            pos: 0,
            line: 1,
            col: 1,
            errors: Vec::new(),
        }
    }

    /// Lex the entire file.
    pub fn lex(mut self) -> LexResult {
        let mut tokens: Vec<Token> = Vec::new();

        while let Some(ch) = self.peek() {
            let start = self.here();
            match ch {
                b' ' | b'\t' | b'\r' => {
                    self.advance();
                }
                b'\'' => self.skip_comment(),
                b'\n' => {
                    self.advance();
                    // Collapse runs of blank lines into one separator.
                    if !matches!(
                        tokens.last().map(|t| &t.kind),
                        Some(TokenKind::Newline) | None
                    ) {
                        tokens.push(Token::new(TokenKind::Newline, start.at(self.here())));
                    }
                }
                b'"' => {
                    if let Some(token) = self.scan_string(start) {
                        tokens.push(token);
                    }
                }
                b'$' => {
                    if let Some(token) = self.scan_hex(start) {
                        tokens.push(token);
                    }
                }
                b'0'..=b'9' => tokens.push(self.scan_decimal(start)),
                b'A'..=b'Z' | b'a'..=b'z' | b'_' => tokens.push(self.scan_word(start)),
                _ => {
                    if let Some(token) = self.scan_operator(start) {
                        tokens.push(token);
                    }
                }
            }
        }

        // Close the final statement so the parser never needs a special
        // case for a missing trailing newline.
        if !matches!(
            tokens.last().map(|t| &t.kind),
            Some(TokenKind::Newline) | None
        ) {
            tokens.push(Token::new(TokenKind::Newline, self.here().at(self.here())));
        }
        tokens.push(Token::new(TokenKind::Eof, self.here().at(self.here())));

        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ── Character helpers ────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.col,
        }
    }

    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.errors
            .push(SyntaxError::new(self.file_name, span, message));
    }

    // ── Scanners ─────────────────────────────────────────────────────

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                break;
            }
            self.advance();
        }
    }

    fn scan_string(&mut self, start: Pos) -> Option<Token> {
        self.advance(); // opening quote
        let from = self.pos;
        loop {
            match self.peek() {
                Some(b'"') => {
                    let text = String::from_utf8_lossy(&self.source[from..self.pos]).into_owned();
                    self.advance();
                    return Some(Token::new(TokenKind::Str(text), start.at(self.here())));
                }
                Some(b'\n') | None => {
                    self.error(start.at(self.here()), "unterminated string literal");
                    return None;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn scan_hex(&mut self, start: Pos) -> Option<Token> {
        self.advance(); // `$`
        let from = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
            self.advance();
        }
        if self.pos == from {
            self.error(start.at(self.here()), "'$' must be followed by hex digits");
            return None;
        }
        let digits = std::str::from_utf8(&self.source[from..self.pos]).unwrap_or("");
        match i64::from_str_radix(digits, 16) {
            Ok(value) => Some(Token::new(TokenKind::Int(value), start.at(self.here()))),
            Err(_) => {
                self.error(
                    start.at(self.here()),
                    format!("hex literal ${digits} out of range"),
                );
                None
            }
        }
    }

    fn scan_decimal(&mut self, start: Pos) -> Token {
        let from = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let digits = std::str::from_utf8(&self.source[from..self.pos]).unwrap_or("0");
        match digits.parse::<i64>() {
            Ok(value) => Token::new(TokenKind::Int(value), start.at(self.here())),
            Err(_) => {
                self.error(
                    start.at(self.here()),
                    format!("integer literal {digits} out of range"),
                );
                Token::new(TokenKind::Int(0), start.at(self.here()))
            }
        }
    }

    fn scan_word(&mut self, start: Pos) -> Token {
        let from = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.advance();
        }
        let word = std::str::from_utf8(&self.source[from..self.pos]).unwrap_or("");
        let kind = TokenKind::keyword(&word.to_ascii_uppercase())
            .unwrap_or_else(|| TokenKind::Ident(word.to_string()));
        Token::new(kind, start.at(self.here()))
    }

    fn scan_operator(&mut self, start: Pos) -> Option<Token> {
        let ch = self.advance()?;
        let kind = match ch {
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'=' => TokenKind::Equal,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b',' => TokenKind::Comma,
            b'<' => match self.peek() {
                Some(b'>') => {
                    self.advance();
                    TokenKind::NotEqual
                }
                Some(b'=') => {
                    self.advance();
                    TokenKind::LessEqual
                }
                _ => TokenKind::Less,
            },
            b'>' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    TokenKind::GreaterEqual
                }
                _ => TokenKind::Greater,
            },
            other => {
                self.error(
                    start.at(self.here()),
                    format!("unexpected character '{}'", other as char),
                );
                return None;
            }
        };
        Some(Token::new(kind, start.at(self.here())))
    }
}

/// A line/column position; `at` closes it into a span.
#[derive(Debug, Clone, Copy)]
struct Pos {
    line: u32,
    col: u32,
}

impl Pos {
    fn at(self, end: Pos) -> Span {
        Span::new(self.line, self.col, end.line, end.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> LexResult {
        Lexer::new(&SourceFile::new("test.swiss", source)).lex()
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        let result = lex(source);
        assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
        result.tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            kinds("sub Main()"),
            vec![
                TokenKind::Sub,
                TokenKind::Ident("Main".into()),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_hex_and_decimal_literals() {
        assert_eq!(
            kinds("POKE $2006, 63"),
            vec![
                TokenKind::Poke,
                TokenKind::Int(0x2006),
                TokenKind::Comma,
                TokenKind::Int(63),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comment_runs_to_end_of_line() {
        assert_eq!(
            kinds("LET x = 1 ' set palette\nHALT"),
            vec![
                TokenKind::Let,
                TokenKind::Ident("x".into()),
                TokenKind::Equal,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Halt,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_blank_lines_collapse() {
        let stream = kinds("HALT\n\n\nHALT");
        let newlines = stream
            .iter()
            .filter(|k| matches!(k, TokenKind::Newline))
            .count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            kinds("1 <> 2 <= 3 >= 4 < 5 > 6"),
            vec![
                TokenKind::Int(1),
                TokenKind::NotEqual,
                TokenKind::Int(2),
                TokenKind::LessEqual,
                TokenKind::Int(3),
                TokenKind::GreaterEqual,
                TokenKind::Int(4),
                TokenKind::Less,
                TokenKind::Int(5),
                TokenKind::Greater,
                TokenKind::Int(6),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(
            kinds("PRINT \"score:\", 10"),
            vec![
                TokenKind::Print,
                TokenKind::Str("score:".into()),
                TokenKind::Comma,
                TokenKind::Int(10),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_collected() {
        let result = lex("PRINT \"oops\nHALT");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("unterminated"));
        assert_eq!(result.errors[0].line, 1);
        // Scanning continued past the bad line.
        assert!(result.tokens.iter().any(|t| t.kind == TokenKind::Halt));
    }

    #[test]
    fn test_unexpected_character_collected() {
        let result = lex("LET x = 1 ; 2");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("unexpected character"));
        assert_eq!(result.errors[0].file, "test.swiss");
    }

    #[test]
    fn test_spans_are_one_based() {
        let result = lex("HALT");
        assert_eq!(result.tokens[0].span.line, 1);
        assert_eq!(result.tokens[0].span.column, 1);
        assert_eq!(result.tokens[0].span.end_column, 5);
    }

    #[test]
    fn test_empty_source_is_just_eof() {
        let result = lex("");
        assert!(result.errors.is_empty());
        assert_eq!(
            result.tokens.iter().map(|t| &t.kind).collect::<Vec<_>>(),
            vec![&TokenKind::Eof]
        );
    }
}
