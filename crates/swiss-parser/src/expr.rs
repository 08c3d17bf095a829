//! Expression parsing — precedence climbing.
//!
//! Precedence, loosest first: `OR`, `AND`, comparison, `+ -`, `* / MOD`,
//! unary `- NOT`, primary.

use swiss_lexer::token::TokenKind;
use swiss_types::ast::{BinOp, Expr, ExprKind, UnOp};

use crate::parser::Parser;

impl Parser {
    pub(crate) fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek_kind(), TokenKind::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_comparison()?;
        while matches!(self.peek_kind(), TokenKind::And) {
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = binary(BinOp::And, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_comparison(&mut self) -> Option<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek_kind() {
            TokenKind::Equal => BinOp::Eq,
            TokenKind::NotEqual => BinOp::Ne,
            TokenKind::Less => BinOp::Lt,
            TokenKind::Greater => BinOp::Gt,
            TokenKind::LessEqual => BinOp::Le,
            TokenKind::GreaterEqual => BinOp::Ge,
            _ => return Some(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Some(binary(op, lhs, rhs))
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Some(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Mod => BinOp::Mod,
                _ => return Some(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let span = self.current_span();
        let op = match self.peek_kind() {
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Not => UnOp::Not,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        let full = span.to(operand.span);
        Some(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span: full,
        })
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let span = self.current_span();
        match self.peek_kind() {
            TokenKind::Int(_) => {
                let token = self.advance();
                match token.kind {
                    TokenKind::Int(value) => Some(Expr::int(value, token.span)),
                    _ => unreachable!(),
                }
            }
            TokenKind::Peek => {
                self.advance();
                self.expect(TokenKind::LParen, "after PEEK")?;
                let addr = self.parse_expr()?;
                let close = self.current_span();
                self.expect(TokenKind::RParen, "after PEEK address")?;
                Some(Expr {
                    kind: ExprKind::Peek(Box::new(addr)),
                    span: span.to(close),
                })
            }
            TokenKind::Resource => {
                self.advance();
                self.expect(TokenKind::LParen, "after RESOURCE")?;
                let name = self.expect_ident("naming a project resource")?;
                let close = self.current_span();
                self.expect(TokenKind::RParen, "after resource name")?;
                Some(Expr {
                    kind: ExprKind::Resource(name),
                    span: span.to(close),
                })
            }
            TokenKind::Ident(_) => {
                let name = self.expect_ident("in expression")?;
                if matches!(self.peek_kind(), TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_args()?;
                    let close = self.current_span();
                    self.expect(TokenKind::RParen, "after call arguments")?;
                    Some(Expr {
                        kind: ExprKind::Call { target: name, args },
                        span: span.to(close),
                    })
                } else {
                    Some(Expr::name(name))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "to close the group")?;
                Some(inner)
            }
            other => {
                self.error_here(format!("expected an expression, found {other}"));
                None
            }
        }
    }

    pub(crate) fn parse_args(&mut self) -> Option<Vec<Expr>> {
        let mut args = Vec::new();
        if matches!(self.peek_kind(), TokenKind::RParen) {
            return Some(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                return Some(args);
            }
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.to(rhs.span);
    Expr {
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    }
}

#[cfg(test)]
mod tests {
    use crate::parse_source;
    use swiss_types::ast::*;
    use swiss_types::SourceFile;

    fn parse_ok(source: &str) -> SourceUnit {
        let result = parse_source(&SourceFile::new("test.swiss", source));
        assert!(
            result.errors.is_empty(),
            "errors: {:#?}",
            result.errors
        );
        result.unit.expect("unit present when no errors")
    }

    fn first_sub_body(unit: &SourceUnit) -> &[Stmt] {
        for decl in &unit.decls {
            if let DeclKind::Sub { body, .. } = &decl.kind {
                return body;
            }
        }
        panic!("no SUB in unit");
    }

    #[test]
    fn test_const_and_dim() {
        let unit = parse_ok("CONST SPEED = 3\nDIM score\n");
        assert_eq!(unit.decls.len(), 2);
        assert!(matches!(unit.decls[0].kind, DeclKind::Const { .. }));
        assert!(matches!(unit.decls[1].kind, DeclKind::Global));
        assert_eq!(unit.decls[0].name.name, "SPEED");
    }

    #[test]
    fn test_precedence() {
        let unit = parse_ok("CONST X = 1 + 2 * 3\n");
        let DeclKind::Const { value } = &unit.decls[0].kind else {
            panic!("expected const");
        };
        // Must parse as 1 + (2 * 3)
        let ExprKind::Binary { op, rhs, .. } = &value.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary { op: BinOp::Mul, .. }
        ));
    }

    #[test]
    fn test_comparison_binds_looser_than_sum() {
        let unit = parse_ok("CONST X = 1 + 2 < 4\n");
        let DeclKind::Const { value } = &unit.decls[0].kind else {
            panic!("expected const");
        };
        assert!(matches!(
            value.kind,
            ExprKind::Binary { op: BinOp::Lt, .. }
        ));
    }

    #[test]
    fn test_sub_with_statements() {
        let unit = parse_ok(
            "SUB Main()\n    LET x = PEEK($2002)\n    POKE $2006, $3F\n    HALT\nEND SUB\n",
        );
        let body = first_sub_body(&unit);
        assert_eq!(body.len(), 3);
        assert!(matches!(body[0].kind, StmtKind::Let { .. }));
        assert!(matches!(body[1].kind, StmtKind::Poke { .. }));
        assert!(matches!(body[2].kind, StmtKind::Halt));
    }

    #[test]
    fn test_if_else_blocks() {
        let unit = parse_ok(
            "SUB Main()\nIF x = 1 THEN\n  HALT\nELSE\n  SLEEP\nEND IF\nEND SUB\nDIM x\n",
        );
        let body = first_sub_body(&unit);
        let StmtKind::If {
            then_body,
            else_body,
            ..
        } = &body[0].kind
        else {
            panic!("expected IF");
        };
        assert_eq!(then_body.len(), 1);
        assert_eq!(else_body.len(), 1);
    }

    #[test]
    fn test_while_wend() {
        let unit = parse_ok("SUB Main()\nWHILE 1\n  SLEEP\nWEND\nEND SUB\n");
        let body = first_sub_body(&unit);
        let StmtKind::While { body: inner, .. } = &body[0].kind else {
            panic!("expected WHILE");
        };
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn test_call_and_expression_call() {
        let unit = parse_ok("SUB Main()\nCALL Draw(1, 2)\nLET x = Score()\nEND SUB\n");
        let body = first_sub_body(&unit);
        let StmtKind::Call { target, args } = &body[0].kind else {
            panic!("expected CALL");
        };
        assert_eq!(target.name, "Draw");
        assert_eq!(args.len(), 2);
        let StmtKind::Let { value, .. } = &body[1].kind else {
            panic!("expected LET");
        };
        assert!(matches!(value.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn test_print_mixed_parts() {
        let unit = parse_ok("SUB Main()\nPRINT \"score:\", x, \"of\", 100\nEND SUB\nDIM x\n");
        let body = first_sub_body(&unit);
        let StmtKind::Print { parts } = &body[0].kind else {
            panic!("expected PRINT");
        };
        assert_eq!(parts.len(), 4);
        assert!(matches!(parts[0], PrintPart::Text(_)));
        assert!(matches!(parts[1], PrintPart::Value(_)));
    }

    #[test]
    fn test_resource_reference() {
        let unit = parse_ok("SUB Main()\nLET x = RESOURCE(hero_tiles)\nEND SUB\nDIM x\n");
        let body = first_sub_body(&unit);
        let StmtKind::Let { value, .. } = &body[0].kind else {
            panic!("expected LET");
        };
        let ExprKind::Resource(name) = &value.kind else {
            panic!("expected RESOURCE");
        };
        assert_eq!(name.name, "hero_tiles");
    }

    #[test]
    fn test_empty_file_parses() {
        let unit = parse_ok("");
        assert!(unit.decls.is_empty());
    }

    #[test]
    fn test_error_reports_line_and_column() {
        let result = parse_source(&SourceFile::new("bad.swiss", "SUB Main()\nLET = 5\nEND SUB\n"));
        assert!(result.unit.is_none());
        assert!(!result.errors.is_empty());
        let err = &result.errors[0];
        assert_eq!(err.file, "bad.swiss");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("identifier"));
    }

    #[test]
    fn test_recovery_reports_multiple_errors() {
        let source = "SUB Main()\nLET = 1\nPOKE 1\nEND SUB\n";
        let result = parse_source(&SourceFile::new("bad.swiss", source));
        assert!(result.errors.len() >= 2, "errors: {:#?}", result.errors);
    }

    #[test]
    fn test_return_with_and_without_value() {
        let unit = parse_ok("SUB F()\nRETURN 5\nEND SUB\nSUB G()\nRETURN\nEND SUB\n");
        let DeclKind::Sub { body: f, .. } = &unit.decls[0].kind else {
            panic!()
        };
        let DeclKind::Sub { body: g, .. } = &unit.decls[1].kind else {
            panic!()
        };
        assert!(matches!(f[0].kind, StmtKind::Return { value: Some(_) }));
        assert!(matches!(g[0].kind, StmtKind::Return { value: None }));
    }
}
