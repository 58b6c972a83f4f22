//! Recursive-descent parser producing the expression AST.
//!
//! Precedence, lowest first: `||`, `&&`, equality, relational, additive,
//! multiplicative, unary, member access.

use serde_json::Value;

use super::ExprError;
use super::lexer::{Token, TokenKind, tokenize};

/// Maximum height of the parsed tree. Nesting, chained operators and
/// member steps all count toward it.
const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Undefined,
    Variable(String),
    Array(Vec<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Parse a full expression; trailing tokens are an error.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    parser.expect(TokenKind::Eof, "end of expression")?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<(), ExprError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ExprError {
        let token = self.peek();
        ExprError::Unexpected {
            found: token.kind.describe(),
            expected: expected.to_string(),
            pos: token.pos,
        }
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        self.descend()?;
        let expr = self.or();
        self.depth -= 1;
        expr
    }

    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let entry = self.depth;
        let mut lhs = next(self)?;
        'outer: loop {
            for (kind, op) in ops {
                if self.eat(kind) {
                    // each fold nests the left-hand side one level deeper
                    self.descend()?;
                    let rhs = next(self)?;
                    lhs = Expr::Binary(*op, Box::new(lhs), Box::new(rhs));
                    continue 'outer;
                }
            }
            self.depth = entry;
            return Ok(lhs);
        }
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(&[(TokenKind::Or, BinaryOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(&[(TokenKind::And, BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                (TokenKind::StrictEq, BinaryOp::StrictEq),
                (TokenKind::StrictNotEq, BinaryOp::StrictNotEq),
                (TokenKind::EqEq, BinaryOp::Eq),
                (TokenKind::NotEq, BinaryOp::NotEq),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::Le, BinaryOp::Le),
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::Ge, BinaryOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            _ => return self.postfix(),
        };
        self.advance();
        self.descend()?;
        let operand = self.unary();
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let entry = self.depth;
        let mut expr = self.primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                self.descend()?;
                let TokenKind::Ident(name) = self.peek().kind.clone() else {
                    return Err(self.unexpected("property name"));
                };
                self.advance();
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat(&TokenKind::LBracket) {
                self.descend()?;
                let index = self.expression()?;
                self.expect(TokenKind::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                self.depth = entry;
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Literal(number_value(n)))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Value::String(s)))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(match name.as_str() {
                    "true" => Expr::Literal(Value::Bool(true)),
                    "false" => Expr::Literal(Value::Bool(false)),
                    "null" => Expr::Literal(Value::Null),
                    "undefined" => Expr::Undefined,
                    _ => Expr::Variable(name),
                })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.eat(&TokenKind::RBracket) {
                    loop {
                        elements.push(self.expression()?);
                        if self.eat(&TokenKind::RBracket) {
                            break;
                        }
                        self.expect(TokenKind::Comma, "',' or ']'")?;
                    }
                }
                Ok(Expr::Array(elements))
            }
            _ => Err(self.unexpected("a value")),
        }
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}
