//! Recursive-descent parser for the expression language.
//!
//! Grammar, roughly:
//!
//! ```text
//! program    := stmt (SEP stmt)*
//! stmt       := IDENT '=' expr | 'throw' expr | expr
//! expr       := additive (('==' | '!=' | '<' | '>' | '<=' | '>=') additive)*
//! additive   := term (('+' | '-') term)*
//! term       := unary (('*' | '/' | '%') unary)*
//! unary      := '-' unary | primary
//! primary    := NUMBER | STRING | 'true' | 'false' | 'null'
//!             | IDENT '(' args ')' | IDENT | '[' args ']' | '(' expr ')'
//! ```

use crate::error::{EvalError, EvalResult};
use crate::lexer::{tokenize, Token};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Var(String),
    Array(Vec<Expr>),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `name = expr`: binds into the shared environment.
    Assign { name: String, expr: Expr },
    /// `throw expr`: fails the block.
    Throw(Expr),
    /// A bare expression; the last one is the block's value.
    Expr(Expr),
}

/// A parsed code block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

impl Program {
    /// Names this block binds, in order of first assignment.
    pub fn assigned_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for stmt in &self.stmts {
            if let Stmt::Assign { name, .. } = stmt
                && !names.contains(name)
            {
                names.push(name.clone());
            }
        }
        names
    }
}

/// Parse a block's source text into a program.
pub fn parse_program(source: &str) -> EvalResult<Program> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut stmts = Vec::new();

    while !parser.at_end() {
        stmts.push(parser.stmt()?);
        if !parser.at_end() {
            parser.expect(&Token::Separator)?;
        }
    }

    Ok(Program { stmts })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_ahead(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> EvalResult<()> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(EvalError::Parse(format!(
                "expected {expected:?}, found {other:?}"
            ))),
        }
    }

    fn stmt(&mut self) -> EvalResult<Stmt> {
        if self.peek() == Some(&Token::Throw) {
            self.advance();
            return Ok(Stmt::Throw(self.expr()?));
        }

        if let (Some(Token::Ident(name)), Some(Token::Assign)) = (self.peek(), self.peek_ahead(1)) {
            let name = name.clone();
            self.advance();
            self.advance();
            return Ok(Stmt::Assign {
                name,
                expr: self.expr()?,
            });
        }

        Ok(Stmt::Expr(self.expr()?))
    }

    fn expr(&mut self) -> EvalResult<Expr> {
        let mut lhs = self.additive()?;
        while let Some(op) = self.peek().and_then(comparison_op) {
            self.advance();
            let rhs = self.additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> EvalResult<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> EvalResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> EvalResult<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> EvalResult<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Null) => Ok(Expr::Null),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let args = self.args(&Token::RParen)?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::LBracket) => {
                let items = self.args(&Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Some(Token::LParen) => {
                let expr = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            other => Err(EvalError::Parse(format!(
                "expected expression, found {other:?}"
            ))),
        }
    }

    /// Comma-separated expressions up to `close`.
    fn args(&mut self, close: &Token) -> EvalResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek() == Some(close) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(ref token) if token == close => return Ok(args),
                other => {
                    return Err(EvalError::Parse(format!(
                        "expected `,` or {close:?}, found {other:?}"
                    )));
                }
            }
        }
    }
}

fn comparison_op(token: &Token) -> Option<BinOp> {
    match token {
        Token::EqEq => Some(BinOp::Eq),
        Token::NotEq => Some(BinOp::NotEq),
        Token::Lt => Some(BinOp::Lt),
        Token::Gt => Some(BinOp::Gt),
        Token::Le => Some(BinOp::Le),
        Token::Ge => Some(BinOp::Ge),
        _ => None,
    }
}
