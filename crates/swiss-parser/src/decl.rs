//! Top-level declarations: `CONST`, `DIM`, `SUB`.

use swiss_lexer::token::TokenKind;
use swiss_types::ast::{Decl, DeclKind, Ident};

use crate::parser::Parser;

impl Parser {
    /// Parse one top-level declaration. Returns `None` after recording an
    /// error (the caller resynchronizes).
    pub(crate) fn parse_decl(&mut self) -> Option<Decl> {
        let start = self.current_span();
        match self.peek_kind() {
            TokenKind::Const => {
                self.advance();
                let name = self.expect_ident("after CONST")?;
                self.expect(TokenKind::Equal, "after constant name")?;
                let value = self.parse_expr()?;
                let span = start.to(value.span);
                self.expect_end_of_line();
                Some(Decl {
                    name,
                    kind: DeclKind::Const { value },
                    span,
                })
            }
            TokenKind::Dim => {
                self.advance();
                let name = self.expect_ident("after DIM")?;
                let span = start.to(name.span);
                self.expect_end_of_line();
                Some(Decl {
                    name,
                    kind: DeclKind::Global,
                    span,
                })
            }
            TokenKind::Sub => self.parse_sub(start),
            other => {
                self.error_here(format!(
                    "expected CONST, DIM or SUB at top level, found {other}"
                ));
                None
            }
        }
    }

    fn parse_sub(&mut self, start: swiss_types::Span) -> Option<Decl> {
        self.advance(); // SUB
        let name = self.expect_ident("after SUB")?;
        self.expect(TokenKind::LParen, "after subroutine name")?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen, "after parameter list")?;
        self.expect_end_of_line();

        let body = self.parse_block(&[TokenKind::End]);

        let end_span = self.current_span();
        self.expect(TokenKind::End, "to close SUB")?;
        self.expect(TokenKind::Sub, "after END")?;
        self.expect_end_of_line();

        Some(Decl {
            name,
            kind: DeclKind::Sub { params, body },
            span: start.to(end_span),
        })
    }

    fn parse_params(&mut self) -> Option<Vec<Ident>> {
        let mut params = Vec::new();
        if matches!(self.peek_kind(), TokenKind::RParen) {
            return Some(params);
        }
        loop {
            params.push(self.expect_ident("in parameter list")?);
            if !self.eat(&TokenKind::Comma) {
                return Some(params);
            }
        }
    }
}
