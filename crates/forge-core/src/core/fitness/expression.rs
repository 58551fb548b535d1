use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Expression is empty")]
    Empty,
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
    #[error("Unexpected token '{token}' at position {pos}")]
    UnexpectedToken { token: String, pos: usize },
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Variable '{0}' is not defined by any descriptor")]
    UnknownVariable(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Ident(s) => f.write_str(s),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Variable(String),
    Negate(Box<Node>),
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => tokens.push((Token::Plus, start)),
            '-' => tokens.push((Token::Minus, start)),
            '*' => tokens.push((Token::Star, start)),
            '/' => tokens.push((Token::Slash, start)),
            '(' => tokens.push((Token::LParen, start)),
            ')' => tokens.push((Token::RParen, start)),
            c if c.is_ascii_digit() || c == '.' => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::InvalidNumber(literal.clone()))?;
                tokens.push((Token::Number(value), start));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push((Token::Ident(chars[start..i].iter().collect()), start));
                continue;
            }
            other => return Err(ExpressionError::UnexpectedChar { ch: other, pos: start }),
        }
        i += 1;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Node, ExpressionError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Node::Negate(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Node, ExpressionError> {
        match self.advance() {
            Some((Token::Number(n), _)) => Ok(Node::Number(n)),
            Some((Token::Ident(name), _)) => Ok(Node::Variable(name)),
            Some((Token::LParen, _)) => {
                let inner = self.expression()?;
                match self.advance() {
                    Some((Token::RParen, _)) => Ok(inner),
                    Some((token, pos)) => Err(ExpressionError::UnexpectedToken {
                        token: token.to_string(),
                        pos,
                    }),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            Some((token, pos)) => Err(ExpressionError::UnexpectedToken {
                token: token.to_string(),
                pos,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

/// An arithmetic formula over named variables, e.g. `${ MW / nHeavyAtoms - 2 }`.
///
/// Supports `+ - * /`, unary signs, parentheses, numeric literals (with
/// exponents) and identifiers. The `${ ... }` wrapper is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    pub fn parse(text: &str) -> Result<Self, ExpressionError> {
        let trimmed = text.trim();
        let body = trimmed
            .strip_prefix("${")
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed);
        let tokens = tokenize(body)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expression()?;
        if let Some((token, pos)) = parser.advance() {
            return Err(ExpressionError::UnexpectedToken {
                token: token.to_string(),
                pos,
            });
        }
        Ok(Self {
            source: trimmed.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of every variable referenced by the expression.
    pub fn variables(&self) -> BTreeSet<String> {
        fn collect(node: &Node, out: &mut BTreeSet<String>) {
            match node {
                Node::Number(_) => {}
                Node::Variable(name) => {
                    out.insert(name.clone());
                }
                Node::Negate(inner) => collect(inner, out),
                Node::Binary { lhs, rhs, .. } => {
                    collect(lhs, out);
                    collect(rhs, out);
                }
            }
        }
        let mut out = BTreeSet::new();
        collect(&self.root, &mut out);
        out
    }

    /// Evaluates the expression, resolving variables through `resolve`.
    pub fn evaluate<F>(&self, resolve: F) -> Result<f64, ExpressionError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        fn eval<F: Fn(&str) -> Option<f64>>(node: &Node, resolve: &F) -> Result<f64, ExpressionError> {
            Ok(match node {
                Node::Number(n) => *n,
                Node::Variable(name) => {
                    resolve(name).ok_or_else(|| ExpressionError::UnknownVariable(name.clone()))?
                }
                Node::Negate(inner) => -eval(inner, resolve)?,
                Node::Binary { op, lhs, rhs } => {
                    let (a, b) = (eval(lhs, resolve)?, eval(rhs, resolve)?);
                    match op {
                        BinaryOp::Add => a + b,
                        BinaryOp::Sub => a - b,
                        BinaryOp::Mul => a * b,
                        BinaryOp::Div => a / b,
                    }
                }
            })
        }
        eval(&self.root, &resolve)
    }

    pub fn evaluate_with(&self, variables: &HashMap<String, f64>) -> Result<f64, ExpressionError> {
        self.evaluate(|name| variables.get(name).copied())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
