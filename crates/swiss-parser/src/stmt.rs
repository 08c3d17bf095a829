//! Statements inside `SUB` bodies.

use swiss_lexer::token::TokenKind;
use swiss_types::ast::{PrintPart, Stmt, StmtKind};

use crate::parser::Parser;

impl Parser {
    /// Parse statements until one of `terminators` starts a line.
    /// Terminator tokens are left for the caller to consume.
    pub(crate) fn parse_block(&mut self, terminators: &[TokenKind]) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_end() {
                return stmts;
            }
            if terminators
                .iter()
                .any(|t| std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(t))
            {
                return stmts;
            }
            match self.parse_stmt() {
                Some(stmt) => stmts.push(stmt),
                None => self.sync_to_next_line(),
            }
        }
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        let kind = match self.peek_kind() {
            TokenKind::Let => {
                self.advance();
                let target = self.expect_ident("after LET")?;
                self.expect(TokenKind::Equal, "after assignment target")?;
                let value = self.parse_expr()?;
                self.expect_end_of_line();
                StmtKind::Let { target, value }
            }
            TokenKind::If => return self.parse_if(start),
            TokenKind::While => return self.parse_while(start),
            TokenKind::Return => {
                self.advance();
                let value = if matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Eof) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_end_of_line();
                StmtKind::Return { value }
            }
            TokenKind::Call => {
                self.advance();
                let target = self.expect_ident("after CALL")?;
                self.expect(TokenKind::LParen, "after subroutine name")?;
                let args = self.parse_args()?;
                self.expect(TokenKind::RParen, "after arguments")?;
                self.expect_end_of_line();
                StmtKind::Call { target, args }
            }
            TokenKind::Print => {
                self.advance();
                let parts = self.parse_print_parts()?;
                self.expect_end_of_line();
                StmtKind::Print { parts }
            }
            TokenKind::Poke => {
                self.advance();
                let addr = self.parse_expr()?;
                self.expect(TokenKind::Comma, "between POKE address and value")?;
                let value = self.parse_expr()?;
                self.expect_end_of_line();
                StmtKind::Poke { addr, value }
            }
            TokenKind::Sleep => {
                self.advance();
                self.expect_end_of_line();
                StmtKind::Sleep
            }
            TokenKind::Halt => {
                self.advance();
                self.expect_end_of_line();
                StmtKind::Halt
            }
            other => {
                self.error_here(format!("expected a statement, found {other}"));
                return None;
            }
        };
        Some(Stmt { kind, span: start })
    }

    fn parse_if(&mut self, start: swiss_types::Span) -> Option<Stmt> {
        self.advance(); // IF
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Then, "after IF condition")?;
        self.expect_end_of_line();

        let then_body = self.parse_block(&[TokenKind::Else, TokenKind::End]);

        let else_body = if self.eat(&TokenKind::Else) {
            self.expect_end_of_line();
            self.parse_block(&[TokenKind::End])
        } else {
            Vec::new()
        };

        let end_span = self.current_span();
        self.expect(TokenKind::End, "to close IF")?;
        self.expect(TokenKind::If, "after END")?;
        self.expect_end_of_line();

        Some(Stmt {
            kind: StmtKind::If {
                cond,
                then_body,
                else_body,
            },
            span: start.to(end_span),
        })
    }

    fn parse_while(&mut self, start: swiss_types::Span) -> Option<Stmt> {
        self.advance(); // WHILE
        let cond = self.parse_expr()?;
        self.expect_end_of_line();

        let body = self.parse_block(&[TokenKind::Wend]);

        let end_span = self.current_span();
        self.expect(TokenKind::Wend, "to close WHILE")?;
        self.expect_end_of_line();

        Some(Stmt {
            kind: StmtKind::While { cond, body },
            span: start.to(end_span),
        })
    }

    fn parse_print_parts(&mut self) -> Option<Vec<PrintPart>> {
        let mut parts = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::Str(_) => {
                    let token = self.advance();
                    match token.kind {
                        TokenKind::Str(text) => parts.push(PrintPart::Text(text)),
                        _ => unreachable!(),
                    }
                }
                _ => parts.push(PrintPart::Value(self.parse_expr()?)),
            }
            if !self.eat(&TokenKind::Comma) {
                return Some(parts);
            }
        }
    }
}
