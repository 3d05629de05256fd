// Recursive-descent parser from tokens to the AST.
//
// Precedence, loosest binding first:
//   |-   ||   &&   == !=   < <= > >=   .. ..=   << >>   + -
//   * / /. %   unary - !   postfix call/index/member

use std::rc::Rc;

use crate::ast::*;
use crate::error::{Error, Result};
use crate::lexer::{lex, Token, TokenKind};
use crate::types::weak_slot;


pub fn parse(source: &str) -> Result<Program> {
    Parser::new(lex(source)?).parse_program()
}


struct Parser {
    tokens: Vec<Token>,
    at: usize
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Parser {
        Parser {tokens, at: 0}
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.at).map(|t| &t.kind)
    }

    fn pos(&self) -> Pos {
        match self.tokens.get(self.at) {
            Some(t) => t.pos,
            None => self
                .tokens
                .last()
                .map(|t| t.pos)
                .unwrap_or_else(|| Pos::new(1, 1))
        }
    }

    fn bump(&mut self) -> Option<TokenKind> {
        let t = self.tokens.get(self.at).map(|t| t.kind.clone());
        if t.is_some() {
            self.at += 1;
        }
        t
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.at += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(Error::type_error(
                format!("expected {}", what),
                self.pos()
            ))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.at += 1;
                Ok(name)
            },
            _ => Err(Error::type_error(
                format!("expected {}", what),
                self.pos()
            ))
        }
    }

    // Closing `>` of a generic argument list; a `>>` token is split in
    // place so nested generics like Array<Array<int>> parse.
    fn expect_generic_close(&mut self) -> Result<()> {
        match self.peek() {
            Some(TokenKind::Gt) => {
                self.at += 1;
                Ok(())
            },
            Some(TokenKind::Shr) => {
                self.tokens[self.at].kind = TokenKind::Gt;
                Ok(())
            },
            _ => Err(Error::type_error("expected `>`", self.pos()))
        }
    }

    fn parse_program(&mut self) -> Result<Program> {
        let mut body = Vec::new();
        while self.peek().is_some() {
            if self.eat(&TokenKind::Semi) {
                continue;
            }
            body.push(self.parse_stmt()?);
        }
        Ok(Program {body})
    }

    fn parse_stmt(&mut self) -> Result<Node<Stmt>> {
        let pos = self.pos();
        match self.peek() {
            Some(TokenKind::Let) => self.parse_let(pos),
            Some(TokenKind::Do) => self.parse_function(pos),
            Some(TokenKind::If) => self.parse_if(pos),
            Some(TokenKind::While) => {
                self.at += 1;
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt::new(StmtKind::While {cond, body}, pos))
            },
            Some(TokenKind::Until) => {
                self.at += 1;
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt::new(StmtKind::Until {cond, body}, pos))
            },
            Some(TokenKind::For) => {
                self.at += 1;
                let var = self.expect_ident("loop variable")?;
                self.expect(&TokenKind::In, "`in`")?;
                let iter = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt::new(StmtKind::For {var, iter, body}, pos))
            },
            Some(TokenKind::Return) => {
                self.at += 1;
                let arg = if self.can_start_expr() {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(Stmt::new(StmtKind::Return(arg), pos))
            },
            Some(TokenKind::LBrace) => {
                let body = self.parse_block()?;
                Ok(Stmt::new(StmtKind::Block(body), pos))
            },
            Some(TokenKind::MetaIdent(name))
                if (name == "assert" || name == "invariant") =>
            {
                let name = name.clone();
                self.at += 1;
                self.expect(&TokenKind::LParen, "`(`")?;
                let cond = self.parse_expr()?;
                let message = if self.eat(&TokenKind::Comma) {
                    match self.bump() {
                        Some(TokenKind::Str(s)) => Some(s),
                        _ => {
                            return Err(Error::type_error(
                                "expected a string message",
                                pos
                            ))
                        }
                    }
                } else {
                    None
                };
                self.expect(&TokenKind::RParen, "`)`")?;
                let kind = if name == "assert" {
                    StmtKind::Assert {cond, message}
                } else {
                    StmtKind::Invariant {cond, message}
                };
                Ok(Stmt::new(kind, pos))
            },
            Some(_) => {
                let expr = self.parse_expr()?;
                if self.eat(&TokenKind::Assign) {
                    let target = match &expr.kind {
                        ExprKind::Ident(name) => {
                            AssignTarget::Ident(name.clone())
                        },
                        ExprKind::Index(obj, idx) => {
                            AssignTarget::Index(obj.clone(), idx.clone())
                        },
                        _ => {
                            return Err(Error::type_error(
                                "invalid assignment target",
                                expr.pos
                            ))
                        }
                    };
                    let value = self.parse_expr()?;
                    Ok(Stmt::new(StmtKind::Assign(target, value), pos))
                } else {
                    Ok(Stmt::new(StmtKind::Expr(expr), pos))
                }
            },
            None => Err(Error::type_error("unexpected end of input", pos))
        }
    }

    fn parse_block(&mut self) -> Result<Seq<Stmt>> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut body = Vec::new();
        loop {
            if self.eat(&TokenKind::RBrace) {
                return Ok(body);
            }
            if self.eat(&TokenKind::Semi) {
                continue;
            }
            if self.peek().is_none() {
                return Err(Error::type_error("unclosed block", self.pos()));
            }
            body.push(self.parse_stmt()?);
        }
    }

    fn parse_let(&mut self, pos: Pos) -> Result<Node<Stmt>> {
        self.at += 1;
        let mut decls = Vec::new();
        loop {
            let name = self.expect_ident("variable name")?;
            let annot = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            self.expect(&TokenKind::Assign, "`=`")?;
            let init = self.parse_expr()?;
            decls.push(Declarator {
                name,
                annot,
                ty: weak_slot(),
                init
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Stmt::new(StmtKind::VarDecl(Rc::new(decls)), pos))
    }

    fn parse_function(&mut self, pos: Pos) -> Result<Node<Stmt>> {
        self.at += 1;
        let name = self.expect_ident("function name")?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                let pname = self.expect_ident("parameter name")?;
                let annot = if self.eat(&TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                params.push(Param {
                    name: pname,
                    annot,
                    ty: weak_slot()
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "`)`")?;
        }
        let ret_annot = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        let decl = FunctionDecl {
            name,
            params,
            ret_annot,
            ret: weak_slot(),
            body
        };
        Ok(Stmt::new(StmtKind::Function(Node::new(decl)), pos))
    }

    fn parse_if(&mut self, pos: Pos) -> Result<Node<Stmt>> {
        self.at += 1;
        let cond = self.parse_expr()?;
        let then = self.parse_block()?;
        let alt = if self.eat(&TokenKind::Else) {
            if self.peek() == Some(&TokenKind::If) {
                let nested_pos = self.pos();
                Some(vec![self.parse_if(nested_pos)?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::new(StmtKind::If {cond, then, alt}, pos))
    }

    fn can_start_expr(&self) -> bool {
        match self.peek() {
            Some(TokenKind::Int(_))
            | Some(TokenKind::Float(_))
            | Some(TokenKind::Str(_))
            | Some(TokenKind::Ident(_))
            | Some(TokenKind::MetaIdent(_))
            | Some(TokenKind::True)
            | Some(TokenKind::False)
            | Some(TokenKind::LParen)
            | Some(TokenKind::LBracket)
            | Some(TokenKind::Minus)
            | Some(TokenKind::Bang)
            | Some(TokenKind::TypeOf) => true,
            _ => false
        }
    }

    fn parse_expr(&mut self) -> Result<Node<Expr>> {
        let mut lhs = self.parse_or()?;
        while self.peek() == Some(&TokenKind::Turnstile) {
            let pos = self.pos();
            self.at += 1;
            let name = match self.bump() {
                Some(TokenKind::MetaIdent(name)) => name,
                _ => {
                    return Err(Error::type_error(
                        "expected a predicate after `|-`",
                        pos
                    ))
                }
            };
            let args = if self.eat(&TokenKind::LParen) {
                self.parse_args()?
            } else {
                Vec::new()
            };
            lhs = Expr::new(
                ExprKind::PredicateCheck {subject: lhs, name, args},
                pos
            );
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Node<Expr>> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&TokenKind::OrOr) {
            let pos = self.pos();
            self.at += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::new(ExprKind::Binary(BinOp::Or, lhs, rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node<Expr>> {
        let mut lhs = self.parse_equality()?;
        while self.peek() == Some(&TokenKind::AndAnd) {
            let pos = self.pos();
            self.at += 1;
            let rhs = self.parse_equality()?;
            lhs = Expr::new(ExprKind::Binary(BinOp::And, lhs, rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Node<Expr>> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::EqEq) => BinOp::Eq,
                Some(TokenKind::Neq) => BinOp::Neq,
                _ => return Ok(lhs)
            };
            let pos = self.pos();
            self.at += 1;
            let rhs = self.parse_comparison()?;
            lhs = Expr::new(ExprKind::Binary(op, lhs, rhs), pos);
        }
    }

    fn parse_comparison(&mut self) -> Result<Node<Expr>> {
        let mut lhs = self.parse_range()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Lt) => BinOp::Lt,
                Some(TokenKind::Lte) => BinOp::Lte,
                Some(TokenKind::Gt) => BinOp::Gt,
                Some(TokenKind::Gte) => BinOp::Gte,
                _ => return Ok(lhs)
            };
            let pos = self.pos();
            self.at += 1;
            let rhs = self.parse_range()?;
            lhs = Expr::new(ExprKind::Binary(op, lhs, rhs), pos);
        }
    }

    fn parse_range(&mut self) -> Result<Node<Expr>> {
        let pos = self.pos();

        // Prefix form: ..end
        let inclusive = match self.peek() {
            Some(TokenKind::DotDot) => Some(false),
            Some(TokenKind::DotDotEq) => Some(true),
            _ => None
        };
        if let Some(inclusive) = inclusive {
            self.at += 1;
            let end = self.parse_shift()?;
            return Ok(Expr::new(
                ExprKind::Range {
                    start: None,
                    end: Some(end),
                    inclusive
                },
                pos
            ));
        }

        let lhs = self.parse_shift()?;
        let inclusive = match self.peek() {
            Some(TokenKind::DotDot) => false,
            Some(TokenKind::DotDotEq) => true,
            _ => return Ok(lhs)
        };
        let pos = self.pos();
        self.at += 1;
        // `for i in 0.. { ... }` leaves the end open; `{` starts the
        // loop body, never a range endpoint.
        let end = if self.can_start_expr() {
            Some(self.parse_shift()?)
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::Range {start: Some(lhs), end, inclusive},
            pos
        ))
    }

    fn parse_shift(&mut self) -> Result<Node<Expr>> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Shl) => BinOp::Shl,
                Some(TokenKind::Shr) => BinOp::Shr,
                _ => return Ok(lhs)
            };
            let pos = self.pos();
            self.at += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::new(ExprKind::Binary(op, lhs, rhs), pos);
        }
    }

    fn parse_additive(&mut self) -> Result<Node<Expr>> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => return Ok(lhs)
            };
            let pos = self.pos();
            self.at += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::new(ExprKind::Binary(op, lhs, rhs), pos);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Node<Expr>> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::SlashDot) => BinOp::FloatDiv,
                Some(TokenKind::Percent) => BinOp::Mod,
                _ => return Ok(lhs)
            };
            let pos = self.pos();
            self.at += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::new(ExprKind::Binary(op, lhs, rhs), pos);
        }
    }

    fn parse_unary(&mut self) -> Result<Node<Expr>> {
        let pos = self.pos();
        match self.peek() {
            Some(TokenKind::Minus) => {
                self.at += 1;
                let operand = self.parse_unary()?;
                Ok(Expr::new(ExprKind::Unary(UnOp::Neg, operand), pos))
            },
            Some(TokenKind::Bang) => {
                self.at += 1;
                let operand = self.parse_unary()?;
                Ok(Expr::new(ExprKind::Unary(UnOp::Not, operand), pos))
            },
            Some(TokenKind::TypeOf) => {
                self.at += 1;
                let operand = self.parse_unary()?;
                Ok(Expr::new(ExprKind::TypeOf(operand), pos))
            },
            _ => self.parse_postfix()
        }
    }

    fn parse_args(&mut self) -> Result<Seq<Expr>> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(args)
    }

    fn parse_postfix(&mut self) -> Result<Node<Expr>> {
        let mut expr = self.parse_primary()?;
        loop {
            let pos = self.pos();
            if self.eat(&TokenKind::LParen) {
                let args = self.parse_args()?;
                expr = Expr::new(ExprKind::Call(expr, args), pos);
            } else if self.eat(&TokenKind::Dot) {
                let prop = self.expect_ident("member name")?;
                expr = Expr::new(ExprKind::Member(expr, prop), pos);
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket, "`]`")?;
                expr = Expr::new(ExprKind::Index(expr, index), pos);
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Node<Expr>> {
        let pos = self.pos();
        match self.bump() {
            Some(TokenKind::Int(n)) => {
                Ok(Expr::new(ExprKind::Int(n), pos))
            },
            Some(TokenKind::Float(x)) => {
                Ok(Expr::new(ExprKind::Float(x), pos))
            },
            Some(TokenKind::Str(s)) => {
                Ok(Expr::new(ExprKind::Str(s), pos))
            },
            Some(TokenKind::True) => {
                Ok(Expr::new(ExprKind::Bool(true), pos))
            },
            Some(TokenKind::False) => {
                Ok(Expr::new(ExprKind::Bool(false), pos))
            },
            Some(TokenKind::Ident(name)) => {
                Ok(Expr::new(ExprKind::Ident(name), pos))
            },
            Some(TokenKind::MetaIdent(name)) => {
                Ok(Expr::new(ExprKind::MetaIdent(name), pos))
            },
            Some(TokenKind::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(inner)
            },
            Some(TokenKind::LBracket) => {
                let mut elems = Vec::new();
                if !self.eat(&TokenKind::RBracket) {
                    loop {
                        elems.push(self.parse_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RBracket, "`]`")?;
                }
                Ok(Expr::new(ExprKind::Array(elems), pos))
            },
            Some(TokenKind::LBrace) => self.parse_braced_literal(pos),
            _ => Err(Error::type_error("expected an expression", pos))
        }
    }

    // {} and {k: v, ...} are map literals; {a, b} is a set literal.
    fn parse_braced_literal(&mut self, pos: Pos) -> Result<Node<Expr>> {
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::new(ExprKind::MapLit(Vec::new()), pos));
        }
        let first = self.parse_expr()?;
        if self.eat(&TokenKind::Colon) {
            let value = self.parse_expr()?;
            let mut pairs = vec![(first, value)];
            while self.eat(&TokenKind::Comma) {
                let k = self.parse_expr()?;
                self.expect(&TokenKind::Colon, "`:`")?;
                let v = self.parse_expr()?;
                pairs.push((k, v));
            }
            self.expect(&TokenKind::RBrace, "`}`")?;
            Ok(Expr::new(ExprKind::MapLit(pairs), pos))
        } else {
            let mut elems = vec![first];
            while self.eat(&TokenKind::Comma) {
                elems.push(self.parse_expr()?);
            }
            self.expect(&TokenKind::RBrace, "`}`")?;
            Ok(Expr::new(ExprKind::SetLit(elems), pos))
        }
    }

    fn parse_type(&mut self) -> Result<TypeAnnotation> {
        let mut arms = vec![self.parse_type_intersection()?];
        while self.eat(&TokenKind::Pipe) {
            arms.push(self.parse_type_intersection()?);
        }
        Ok(if arms.len() == 1 {
            arms.pop().expect("nonempty")
        } else {
            TypeAnnotation::Union(arms)
        })
    }

    fn parse_type_intersection(&mut self) -> Result<TypeAnnotation> {
        let mut arms = vec![self.parse_type_primary()?];
        while self.eat(&TokenKind::Amp) {
            arms.push(self.parse_type_primary()?);
        }
        Ok(if arms.len() == 1 {
            arms.pop().expect("nonempty")
        } else {
            TypeAnnotation::Intersection(arms)
        })
    }

    fn parse_type_primary(&mut self) -> Result<TypeAnnotation> {
        let pos = self.pos();
        match self.bump() {
            Some(TokenKind::Ident(name)) => {
                if self.eat(&TokenKind::Lt) {
                    let mut args = vec![self.parse_type()?];
                    while self.eat(&TokenKind::Comma) {
                        args.push(self.parse_type()?);
                    }
                    self.expect_generic_close()?;
                    Ok(TypeAnnotation::Generic(name, args))
                } else {
                    Ok(TypeAnnotation::Simple(name))
                }
            },
            Some(TokenKind::LParen) => {
                let mut items = Vec::new();
                if !self.eat(&TokenKind::RParen) {
                    loop {
                        items.push(self.parse_type()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen, "`)`")?;
                }
                if self.eat(&TokenKind::Arrow) {
                    let ret = self.parse_type()?;
                    Ok(TypeAnnotation::Function(items, Box::new(ret)))
                } else if items.len() == 1 {
                    Ok(items.pop().expect("nonempty"))
                } else {
                    Ok(TypeAnnotation::Tuple(items))
                }
            },
            Some(TokenKind::LBrace) => {
                let mut fields = Vec::new();
                if !self.eat(&TokenKind::RBrace) {
                    loop {
                        let name = self.expect_ident("field name")?;
                        self.expect(&TokenKind::Colon, "`:`")?;
                        fields.push((name, self.parse_type()?));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RBrace, "`}`")?;
                }
                Ok(TypeAnnotation::Record(fields))
            },
            _ => Err(Error::type_error("expected a type", pos))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> Node<Stmt> {
        let program = parse(source).unwrap();
        assert_eq!(program.body.len(), 1);
        program.body[0].clone()
    }

    fn parse_expr_stmt(source: &str) -> Node<Expr> {
        match &parse_one(source).kind {
            StmtKind::Expr(e) => e.clone(),
            other => panic!("not an expression statement: {:?}", other)
        }
    }

    #[test]
    fn test_precedence() {
        // 3 + 4 < 3 * 4 parses as (3 + 4) < (3 * 4)
        let e = parse_expr_stmt("3 + 4 < 3 * 4");
        match &e.kind {
            ExprKind::Binary(BinOp::Lt, l, r) => {
                assert!(matches!(l.kind, ExprKind::Binary(BinOp::Add, ..)));
                assert!(matches!(r.kind, ExprKind::Binary(BinOp::Mul, ..)));
            },
            other => panic!("bad parse: {:?}", other)
        }
    }

    #[test]
    fn test_range_binds_looser_than_additive() {
        let e = parse_expr_stmt("0..n-1");
        match &e.kind {
            ExprKind::Range {start, end, inclusive} => {
                assert!(!inclusive);
                assert!(matches!(
                    start.as_ref().unwrap().kind,
                    ExprKind::Int(0)
                ));
                assert!(matches!(
                    end.as_ref().unwrap().kind,
                    ExprKind::Binary(BinOp::Sub, ..)
                ));
            },
            other => panic!("bad parse: {:?}", other)
        }
    }

    #[test]
    fn test_open_and_prefix_ranges() {
        match &parse_expr_stmt("..5").kind {
            ExprKind::Range {start, end, ..} => {
                assert!(start.is_none());
                assert!(end.is_some());
            },
            other => panic!("bad parse: {:?}", other)
        }
        match &parse_one("for i in 0.. { }").kind {
            StmtKind::For {iter, ..} => match &iter.kind {
                ExprKind::Range {end, ..} => assert!(end.is_none()),
                other => panic!("bad parse: {:?}", other)
            },
            other => panic!("bad parse: {:?}", other)
        }
    }

    #[test]
    fn test_turnstile() {
        let e = parse_expr_stmt("x |- @greater_than(3)");
        match &e.kind {
            ExprKind::PredicateCheck {subject, name, args} => {
                assert!(matches!(&subject.kind, ExprKind::Ident(n) if n == "x"));
                assert_eq!(name, "greater_than");
                assert_eq!(args.len(), 1);
            },
            other => panic!("bad parse: {:?}", other)
        }
    }

    #[test]
    fn test_postfix_chain() {
        let e = parse_expr_stmt("g.getNeighbors(u)[0]");
        match &e.kind {
            ExprKind::Index(obj, _) => match &obj.kind {
                ExprKind::Call(callee, args) => {
                    assert_eq!(args.len(), 1);
                    assert!(matches!(
                        &callee.kind,
                        ExprKind::Member(_, p) if p == "getNeighbors"
                    ));
                },
                other => panic!("bad parse: {:?}", other)
            },
            other => panic!("bad parse: {:?}", other)
        }
    }

    #[test]
    fn test_let_with_generic_annotation() {
        match &parse_one("let a: Array<Array<int>> = []").kind {
            StmtKind::VarDecl(decls) => {
                assert_eq!(decls.len(), 1);
                assert_eq!(
                    decls[0].annot,
                    Some(TypeAnnotation::Generic(
                        String::from("Array"),
                        vec![TypeAnnotation::Generic(
                            String::from("Array"),
                            vec![TypeAnnotation::Simple(String::from("int"))]
                        )]
                    ))
                );
            },
            other => panic!("bad parse: {:?}", other)
        }
    }

    #[test]
    fn test_function_and_if_else() {
        let source = "do f(n) { if n <= 1 { return n } return f(n - 1) }";
        match &parse_one(source).kind {
            StmtKind::Function(f) => {
                assert_eq!(f.name, "f");
                assert_eq!(f.params.len(), 1);
                assert_eq!(f.body.len(), 2);
                assert!(matches!(f.body[0].kind, StmtKind::If {..}));
            },
            other => panic!("bad parse: {:?}", other)
        }
    }

    #[test]
    fn test_braced_literals() {
        assert!(matches!(
            parse_expr_stmt("f({1: 2, 3: 4})").kind,
            ExprKind::Call(..)
        ));
        match &parse_expr_stmt("[{1, 2}]").kind {
            ExprKind::Array(elems) => {
                assert!(matches!(&elems[0].kind, ExprKind::SetLit(e) if e.len() == 2));
            },
            other => panic!("bad parse: {:?}", other)
        }
        // Statement-leading braces are blocks, not literals.
        assert!(matches!(
            parse_one("{ let x = 1 }").kind,
            StmtKind::Block(_)
        ));
    }

    #[test]
    fn test_assignment_targets() {
        assert!(matches!(
            parse_one("x = 1").kind,
            StmtKind::Assign(AssignTarget::Ident(_), _)
        ));
        assert!(matches!(
            parse_one("a[0] = 1").kind,
            StmtKind::Assign(AssignTarget::Index(..), _)
        ));
        assert!(parse("a.b = 1").is_err());
        assert!(parse("1 = 2").is_err());
    }

    #[test]
    fn test_assert_statement() {
        match &parse_one("@assert(arr |- @sorted, \"must be sorted\")").kind {
            StmtKind::Assert {cond, message} => {
                assert!(matches!(
                    cond.kind,
                    ExprKind::PredicateCheck {..}
                ));
                assert_eq!(message.as_deref(), Some("must be sorted"));
            },
            other => panic!("bad parse: {:?}", other)
        }
    }
}
