//! Where-clause filters for selecting rows during event copy.
//!
//! Supports the subset of SQL used in overlay runs: comparisons against
//! literals, `IS [NOT] NULL`, `[NOT] IN (...)`, `[NOT] LIKE`, and boolean
//! `AND` / `OR` / `NOT` with parentheses. Evaluation is three-valued: a
//! comparison against `NULL` is unknown, and only rows that evaluate to true
//! are selected.
use super::{Table, TableError, Value};
use regex::Regex;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Text(String),
    Number(f64),
    Op(CompareOp),
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        field: String,
        op: CompareOp,
        value: Literal,
    },
    IsNull {
        field: String,
        negated: bool,
    },
    In {
        field: String,
        values: Vec<Literal>,
        negated: bool,
    },
    Like {
        field: String,
        pattern: String,
        negated: bool,
    },
}

/// A parsed where-clause, independent of any table.
#[derive(Debug, Clone)]
pub struct Filter {
    source: String,
    expr: Expr,
}

impl Filter {
    pub fn parse(source: &str) -> Result<Self, TableError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(TableError::Filter("empty expression".to_string()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or_expr()?;
        if let Some(token) = parser.peek() {
            return Err(TableError::Filter(format!(
                "unexpected trailing token {token:?}"
            )));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Resolve field references against `table`.
    pub fn bind(&self, table: &Table) -> Result<BoundFilter, TableError> {
        Ok(BoundFilter {
            expr: bind_expr(&self.expr, table)?,
        })
    }
}

#[derive(Debug)]
enum BoundExpr {
    And(Box<BoundExpr>, Box<BoundExpr>),
    Or(Box<BoundExpr>, Box<BoundExpr>),
    Not(Box<BoundExpr>),
    Compare {
        index: usize,
        op: CompareOp,
        value: Literal,
    },
    IsNull {
        index: usize,
        negated: bool,
    },
    In {
        index: usize,
        values: Vec<Literal>,
        negated: bool,
    },
    Like {
        index: usize,
        pattern: Regex,
        negated: bool,
    },
}

/// A filter whose field references are resolved to column indexes.
#[derive(Debug)]
pub struct BoundFilter {
    expr: BoundExpr,
}

impl BoundFilter {
    pub fn matches(&self, row: &[Value]) -> bool {
        eval(&self.expr, row) == Some(true)
    }
}

fn bind_expr(expr: &Expr, table: &Table) -> Result<BoundExpr, TableError> {
    Ok(match expr {
        Expr::And(left, right) => BoundExpr::And(
            Box::new(bind_expr(left, table)?),
            Box::new(bind_expr(right, table)?),
        ),
        Expr::Or(left, right) => BoundExpr::Or(
            Box::new(bind_expr(left, table)?),
            Box::new(bind_expr(right, table)?),
        ),
        Expr::Not(inner) => BoundExpr::Not(Box::new(bind_expr(inner, table)?)),
        Expr::Compare { field, op, value } => BoundExpr::Compare {
            index: table.require_field(field)?,
            op: *op,
            value: value.clone(),
        },
        Expr::IsNull { field, negated } => BoundExpr::IsNull {
            index: table.require_field(field)?,
            negated: *negated,
        },
        Expr::In {
            field,
            values,
            negated,
        } => BoundExpr::In {
            index: table.require_field(field)?,
            values: values.clone(),
            negated: *negated,
        },
        Expr::Like {
            field,
            pattern,
            negated,
        } => BoundExpr::Like {
            index: table.require_field(field)?,
            pattern: like_regex(pattern)?,
            negated: *negated,
        },
    })
}

fn like_regex(pattern: &str) -> Result<Regex, TableError> {
    let mut expr = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|err| TableError::Filter(format!("bad LIKE pattern: {err}")))
}

fn compare(value: &Value, literal: &Literal) -> Option<Ordering> {
    match (value, literal) {
        (Value::Null, _) => None,
        (Value::Text(text), Literal::Text(other)) => Some(text.as_str().cmp(other.as_str())),
        (value, Literal::Number(number)) => value.as_f64().map(|v| v.total_cmp(number)),
        (value, Literal::Text(text)) => {
            let number: f64 = text.trim().parse().ok()?;
            value.as_f64().map(|v| v.total_cmp(&number))
        }
    }
}

fn negate(result: Option<bool>, negated: bool) -> Option<bool> {
    result.map(|matched| matched != negated)
}

fn eval(expr: &BoundExpr, row: &[Value]) -> Option<bool> {
    match expr {
        BoundExpr::And(left, right) => match (eval(left, row), eval(right, row)) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        BoundExpr::Or(left, right) => match (eval(left, row), eval(right, row)) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        BoundExpr::Not(inner) => eval(inner, row).map(|matched| !matched),
        BoundExpr::Compare { index, op, value } => {
            compare(&row[*index], value).map(|ordering| op.accepts(ordering))
        }
        BoundExpr::IsNull { index, negated } => Some(row[*index].is_null() != *negated),
        BoundExpr::In {
            index,
            values,
            negated,
        } => {
            let cell = &row[*index];
            if cell.is_null() {
                return None;
            }
            let found = values
                .iter()
                .any(|literal| compare(cell, literal) == Some(Ordering::Equal));
            negate(Some(found), *negated)
        }
        BoundExpr::Like {
            index,
            pattern,
            negated,
        } => {
            let cell = &row[*index];
            if cell.is_null() {
                return None;
            }
            negate(Some(pattern.is_match(&cell.to_string())), *negated)
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, TableError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::Ne));
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op(CompareOp::Le));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op(CompareOp::Ne));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(CompareOp::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CompareOp::Gt));
                    i += 1;
                }
            }
            '\'' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            text.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            text.push(*c);
                            i += 1;
                        }
                        None => {
                            return Err(TableError::Filter(
                                "unterminated string literal".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Text(text));
            }
            '"' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|c| *c == '"')
                    .map(|offset| start + offset)
                    .ok_or_else(|| {
                        TableError::Filter("unterminated quoted identifier".to_string())
                    })?;
                tokens.push(Token::Ident(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '.' || (c == '-' && starts_number(&chars, i)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse()
                    .map_err(|_| TableError::Filter(format!("invalid number {text}")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(TableError::Filter(format!(
                    "unexpected character {other:?}"
                )))
            }
        }
    }
    Ok(tokens)
}

fn starts_number(chars: &[char], i: usize) -> bool {
    chars
        .get(i + 1)
        .is_some_and(|next| next.is_ascii_digit() || *next == '.')
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), TableError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(TableError::Filter(format!(
                "expected {keyword}, found {:?}",
                self.peek()
            )))
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), TableError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(TableError::Filter(format!(
                "expected {expected:?}, found {other:?}"
            ))),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, TableError> {
        let mut expr = self.and_expr()?;
        while self.eat_keyword("OR") {
            let right = self.and_expr()?;
            expr = Expr::Or(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> Result<Expr, TableError> {
        let mut expr = self.not_expr()?;
        while self.eat_keyword("AND") {
            let right = self.not_expr()?;
            expr = Expr::And(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn not_expr(&mut self) -> Result<Expr, TableError> {
        if self.eat_keyword("NOT") {
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        if matches!(self.peek(), Some(Token::LParen)) {
            self.pos += 1;
            let expr = self.or_expr()?;
            self.expect(Token::RParen)?;
            return Ok(expr);
        }
        self.predicate()
    }

    fn predicate(&mut self) -> Result<Expr, TableError> {
        let field = match self.next() {
            Some(Token::Ident(name)) => name,
            other => {
                return Err(TableError::Filter(format!(
                    "expected field name, found {other:?}"
                )))
            }
        };

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Expr::IsNull { field, negated });
        }

        let negated = self.eat_keyword("NOT");
        if self.eat_keyword("IN") {
            self.expect(Token::LParen)?;
            let mut values = vec![self.literal()?];
            while matches!(self.peek(), Some(Token::Comma)) {
                self.pos += 1;
                values.push(self.literal()?);
            }
            self.expect(Token::RParen)?;
            return Ok(Expr::In {
                field,
                values,
                negated,
            });
        }
        if self.eat_keyword("LIKE") {
            let pattern = match self.literal()? {
                Literal::Text(text) => text,
                Literal::Number(_) => {
                    return Err(TableError::Filter(
                        "LIKE requires a string pattern".to_string(),
                    ))
                }
            };
            return Ok(Expr::Like {
                field,
                pattern,
                negated,
            });
        }
        if negated {
            return Err(TableError::Filter(
                "NOT after a field must precede IN or LIKE".to_string(),
            ));
        }

        let op = match self.next() {
            Some(Token::Op(op)) => op,
            other => {
                return Err(TableError::Filter(format!(
                    "expected comparison after {field}, found {other:?}"
                )))
            }
        };
        let value = self.literal()?;
        Ok(Expr::Compare { field, op, value })
    }

    fn literal(&mut self) -> Result<Literal, TableError> {
        match self.next() {
            Some(Token::Text(text)) => Ok(Literal::Text(text)),
            Some(Token::Number(number)) => Ok(Literal::Number(number)),
            other => Err(TableError::Filter(format!(
                "expected literal, found {other:?}"
            ))),
        }
    }
}
