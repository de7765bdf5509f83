use std::rc::Rc;

use super::lexer::{tokenize, Spanned, Token};
use super::types::{Arg, BinaryOp, Block, Call, Expr, FunctionDef, Param, UnaryOp};
use crate::error::ParseError;
use crate::source::SrcRef;

type Result<T> = std::result::Result<T, ParseError>;

/// Deepest expression nesting the parser accepts.
const MAX_NESTING: usize = 500;
const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 1024 * 1024;

/// Receives the source references the parser hands out while it walks a unit.
pub trait SrcRefAllocator {
    fn alloc(&mut self, first_line: u32) -> SrcRef;
    /// A statement starts on `line`.
    fn mark_statement(&mut self, line: u32, srcref: SrcRef);
    /// A block opens on `line`.
    fn mark_block_head(&mut self, line: u32, srcref: SrcRef);
}

/// Parse a whole unit into its top-level block.
pub fn parse_program(
    text: &str,
    srcrefs: Option<&mut dyn SrcRefAllocator>,
) -> Result<Rc<Block>> {
    let mut parser = Parser::new(tokenize(text)?, srcrefs);
    let head = parser.alloc(1);
    let (stmts, refs) = parser.statements(false)?;

    let mut srcrefs = Vec::with_capacity(refs.len() + 1);
    srcrefs.push(head);
    srcrefs.extend(refs);
    Ok(Rc::new(Block { stmts, srcrefs }))
}

/// Parse free-standing text (breakpoint conditions, log expressions).
pub fn parse_text(text: &str) -> Result<Vec<Expr>> {
    let mut parser = Parser::new(tokenize(text)?, None);
    let (stmts, _) = parser.statements(false)?;
    Ok(stmts)
}

struct Parser<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    last_line: u32,
    // top == true: newlines are insignificant (inside parentheses)
    newline_modes: Vec<bool>,
    srcrefs: Option<&'a mut dyn SrcRefAllocator>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Spanned>, srcrefs: Option<&'a mut dyn SrcRefAllocator>) -> Self {
        Self {
            tokens,
            pos: 0,
            last_line: 1,
            newline_modes: vec![false],
            srcrefs,
            depth: 0,
        }
    }

    fn alloc(&mut self, line: u32) -> Option<SrcRef> {
        self.srcrefs.as_mut().map(|s| s.alloc(line))
    }

    fn ignoring_newlines(&self) -> bool {
        self.newline_modes.last().copied().unwrap_or(false)
    }

    fn peek(&mut self) -> Option<&Token> {
        if self.ignoring_newlines() {
            while matches!(self.tokens.get(self.pos), Some(s) if s.token == Token::Newline) {
                self.pos += 1;
            }
        }
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    /// Like `peek`, but never skips newlines.
    fn peek_raw(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_line(&mut self) -> u32 {
        self.peek();
        self.tokens
            .get(self.pos)
            .map(|s| s.line)
            .unwrap_or(self.last_line)
    }

    fn advance(&mut self) -> Option<Token> {
        self.peek();
        let spanned = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        self.last_line = spanned.line;
        Some(spanned.token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<()> {
        match self.peek().cloned() {
            Some(found) if found == token => {
                self.advance();
                Ok(())
            }
            Some(_) => Err(ParseError::Expected {
                line: self.peek_line(),
                expected,
            }),
            None => Err(ParseError::UnexpectedEof { expected }),
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek_raw() == Some(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek_raw(), Some(Token::Newline | Token::Semicolon)) {
            self.pos += 1;
        }
    }

    fn with_newlines<T>(&mut self, ignore: bool, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.newline_modes.push(ignore);
        let result = f(self);
        self.newline_modes.pop();
        result
    }

    fn unexpected(&mut self) -> ParseError {
        let line = self.peek_line();
        match self.peek() {
            Some(token) => ParseError::Unexpected {
                line,
                found: token.to_string(),
            },
            None => ParseError::UnexpectedEof {
                expected: "expression",
            },
        }
    }

    fn statements(&mut self, closing: bool) -> Result<(Vec<Expr>, Vec<Option<SrcRef>>)> {
        let mut stmts = Vec::new();
        let mut refs = Vec::new();

        loop {
            self.skip_separators();
            match self.peek_raw() {
                None if closing => return Err(ParseError::UnexpectedEof { expected: "'}'" }),
                None => break,
                Some(Token::RBrace) if closing => break,
                _ => {}
            }

            let first_line = self.peek_line();
            let srcref = self.alloc(first_line);
            if let (Some(s), Some(r)) = (self.srcrefs.as_mut(), srcref) {
                s.mark_statement(first_line, r);
            }
            let expr = self.expr()?;
            stmts.push(expr);
            refs.push(srcref);

            match self.peek_raw() {
                None | Some(Token::Newline | Token::Semicolon) => {}
                Some(Token::RBrace) if closing => {}
                Some(_) => return Err(self.unexpected()),
            }
        }

        Ok((stmts, refs))
    }

    fn block(&mut self) -> Result<Expr> {
        let line = self.peek_line();
        self.expect(Token::LBrace, "'{'")?;
        let head = self.alloc(line);
        if let (Some(s), Some(r)) = (self.srcrefs.as_mut(), head) {
            s.mark_block_head(line, r);
        }
        let (stmts, refs) = self.with_newlines(false, |p| p.statements(true))?;
        self.expect(Token::RBrace, "'}'")?;

        let mut srcrefs = Vec::with_capacity(refs.len() + 1);
        srcrefs.push(head);
        srcrefs.extend(refs);
        Ok(Expr::Block(Rc::new(Block { stmts, srcrefs })))
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::TooDeep {
                line: self.peek_line(),
            });
        }
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || f(self));
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<Expr> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> Result<Expr> {
        let line = self.peek_line();
        let lhs = self.or_expr()?;
        if self.eat(&Token::Arrow) {
            self.skip_newlines();
            let value = self.expr()?;
            return match lhs {
                Expr::Ident(target) => Ok(Expr::Assign {
                    target,
                    value: Box::new(value),
                }),
                _ => Err(ParseError::InvalidAssignment { line }),
            };
        }
        Ok(lhs)
    }

    fn binary_level(
        &mut self,
        ops: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    self.skip_newlines();
                    let rhs = next(self)?;
                    lhs = Expr::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn or_expr(&mut self) -> Result<Expr> {
        self.binary_level(&[(Token::OrOr, BinaryOp::Or)], Self::and_expr)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        self.binary_level(&[(Token::AndAnd, BinaryOp::And)], Self::not_expr)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat(&Token::Bang) {
            let operand = self.nested(Self::not_expr)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                (Token::EqEq, BinaryOp::Eq),
                (Token::NotEq, BinaryOp::Ne),
                (Token::Le, BinaryOp::Le),
                (Token::Ge, BinaryOp::Ge),
                (Token::Lt, BinaryOp::Lt),
                (Token::Gt, BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr> {
        self.binary_level(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        self.binary_level(
            &[(Token::Star, BinaryOp::Mul), (Token::Slash, BinaryOp::Div)],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let line = self.peek_line();
        let mut expr = self.primary()?;
        // A call's '(' must sit on the same logical line as its callee.
        while self.peek_raw() == Some(&Token::LParen) {
            let srcref = self.alloc(line);
            let args = self.call_args()?;
            expr = Expr::Call(Rc::new(Call {
                callee: expr,
                args,
                srcref,
            }));
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> Result<Vec<Arg>> {
        self.expect(Token::LParen, "'('")?;
        self.with_newlines(true, |p| {
            let mut args = Vec::new();
            if p.eat(&Token::RParen) {
                return Ok(args);
            }
            loop {
                let name = match (p.peek().cloned(), p.token_after_next()) {
                    (Some(Token::Ident(name)), Some(Token::Equals)) => {
                        p.advance();
                        p.advance();
                        Some(Rc::from(name.as_str()))
                    }
                    _ => None,
                };
                let value = p.expr()?;
                args.push(Arg { name, value });
                if p.eat(&Token::Comma) {
                    continue;
                }
                p.expect(Token::RParen, "')'")?;
                return Ok(args);
            }
        })
    }

    /// The token following the next one, skipping newlines (only used inside
    /// parentheses).
    fn token_after_next(&self) -> Option<Token> {
        self.tokens[self.pos..]
            .iter()
            .filter(|s| s.token != Token::Newline)
            .nth(1)
            .map(|s| s.token.clone())
    }

    fn params(&mut self) -> Result<Vec<Param>> {
        self.expect(Token::LParen, "'('")?;
        self.with_newlines(true, |p| {
            let mut params = Vec::new();
            if p.eat(&Token::RParen) {
                return Ok(params);
            }
            loop {
                let name = match p.advance() {
                    Some(Token::Ident(name)) => Rc::from(name.as_str()),
                    Some(other) => {
                        return Err(ParseError::Unexpected {
                            line: p.last_line,
                            found: other.to_string(),
                        })
                    }
                    None => return Err(ParseError::UnexpectedEof { expected: "parameter" }),
                };
                let default = if p.eat(&Token::Equals) {
                    Some(p.expr()?)
                } else {
                    None
                };
                params.push(Param { name, default });
                if p.eat(&Token::Comma) {
                    continue;
                }
                p.expect(Token::RParen, "')'")?;
                return Ok(params);
            }
        })
    }

    fn condition(&mut self) -> Result<Expr> {
        self.expect(Token::LParen, "'('")?;
        let cond = self.with_newlines(true, |p| p.expr())?;
        self.with_newlines(true, |p| p.expect(Token::RParen, "')'"))?;
        self.skip_newlines();
        Ok(cond)
    }

    fn primary(&mut self) -> Result<Expr> {
        let line = self.peek_line();
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Num(n))
            }
            Some(Token::Str(s)) => {
                self.advance();
                Ok(Expr::Str(s.into()))
            }
            Some(Token::True) => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Some(Token::Null) => {
                self.advance();
                Ok(Expr::Null)
            }
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(Expr::Ident(name.into()))
            }
            Some(Token::Break) => {
                self.advance();
                Ok(Expr::Break)
            }
            Some(Token::Next) => {
                self.advance();
                Ok(Expr::Next)
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.with_newlines(true, |p| {
                    let inner = p.expr()?;
                    p.expect(Token::RParen, "')'")?;
                    Ok(inner)
                })?;
                Ok(inner)
            }
            Some(Token::LBrace) => self.block(),
            Some(Token::Function) => {
                self.advance();
                let srcref = self.alloc(line);
                let params = self.params()?;
                self.skip_newlines();
                let body = self.expr()?;
                Ok(Expr::Function(Rc::new(FunctionDef::new(params, body, srcref))))
            }
            Some(Token::If) => {
                self.advance();
                let cond = self.condition()?;
                let then = self.expr()?;
                let save = self.pos;
                self.skip_newlines();
                let otherwise = if self.eat(&Token::Else) {
                    self.skip_newlines();
                    Some(Box::new(self.expr()?))
                } else {
                    self.pos = save;
                    None
                };
                Ok(Expr::If {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise,
                })
            }
            Some(Token::While) => {
                self.advance();
                let cond = self.condition()?;
                let body = self.expr()?;
                Ok(Expr::While {
                    cond: Box::new(cond),
                    body: Box::new(body),
                })
            }
            _ => Err(self.unexpected()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_split_on_newlines_and_semicolons() {
        let stmts = parse_text("a <- 1; b <- 2\nc").unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0], Expr::Assign { .. }));
        assert!(matches!(stmts[2], Expr::Ident(_)));
    }

    #[test]
    fn test_newlines_inside_parentheses_are_ignored() {
        let stmts = parse_text("f(1,\n  2,\n  x = 3)").unwrap();
        assert_eq!(stmts.len(), 1);
        let Expr::Call(call) = &stmts[0] else {
            panic!("expected a call, got {:?}", stmts[0]);
        };
        assert_eq!(call.args.len(), 3);
        assert_eq!(call.args[2].name.as_deref(), Some("x"));
    }

    #[test]
    fn test_precedence() {
        let stmts = parse_text("1 + 2 * 3 == 7 && !FALSE").unwrap();
        let Expr::Binary { op, lhs, .. } = &stmts[0] else {
            panic!("expected a binary expression");
        };
        assert_eq!(*op, BinaryOp::And);
        assert!(matches!(**lhs, Expr::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_if_else_across_lines_in_block() {
        let stmts = parse_text("{\n  if (x) 1\n  else 2\n}").unwrap();
        let Expr::Block(block) = &stmts[0] else {
            panic!("expected a block");
        };
        assert_eq!(block.stmts.len(), 1);
        assert!(matches!(block.stmts[0], Expr::If { otherwise: Some(_), .. }));
    }

    #[test]
    fn test_function_definition() {
        let stmts = parse_text("f <- function(a, b = 2) {\n  a + b\n}").unwrap();
        let Expr::Assign { target, value } = &stmts[0] else {
            panic!("expected an assignment");
        };
        assert_eq!(&**target, "f");
        let Expr::Function(def) = &**value else {
            panic!("expected a function");
        };
        assert_eq!(def.params.len(), 2);
        assert!(def.params[1].default.is_some());
    }

    #[test]
    fn test_unclosed_block_is_an_error() {
        assert_eq!(
            parse_text("{ a").unwrap_err(),
            ParseError::UnexpectedEof { expected: "'}'" }
        );
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert_eq!(
            parse_text("1 <- 2").unwrap_err(),
            ParseError::InvalidAssignment { line: 1 }
        );
    }

    #[test]
    fn test_trailing_garbage_after_statement() {
        assert!(matches!(
            parse_text("a b").unwrap_err(),
            ParseError::Unexpected { line: 1, .. }
        ));
    }

    #[test]
    fn test_runaway_nesting_is_an_error() {
        let text = format!("{}1{}", "(".repeat(2000), ")".repeat(2000));
        assert_eq!(parse_text(&text).unwrap_err(), ParseError::TooDeep { line: 1 });

        let negations = format!("{}TRUE", "!".repeat(2000));
        assert!(matches!(parse_text(&negations), Err(ParseError::TooDeep { .. })));

        let fine = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(parse_text(&fine).is_ok());
    }
}
