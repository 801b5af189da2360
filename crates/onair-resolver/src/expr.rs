//! Timing expressions.
//!
//! Two small grammars are understood:
//!
//! ```text
//! arithmetic := term (('+' | '-') term)*
//! term       := factor (('*' | '/') factor)*
//! factor     := number | ref | '(' arithmetic ')' | '-' factor
//! ref        := '#' id? ('.' ('start' | 'end' | 'duration'))?
//!
//! logical    := '1' | 'true' | ref ('&' ref)* | ref ('|' ref)*
//! ```
//!
//! A reference with no id (`#.start`) points at the object that owns the
//! expression. A reference with no attribute means `.start`.

use std::fmt;

/// Errors produced while parsing an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),
    #[error("number out of range: {0}")]
    NumberOutOfRange(String),
    #[error("cannot mix '&' and '|' in one logical expression")]
    MixedLogical,
    #[error("trailing input at {0}")]
    Trailing(usize),
}

/// Which point of a referenced object an expression reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    Start,
    End,
    Duration,
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Attr::Start => "start",
            Attr::End => "end",
            Attr::Duration => "duration",
        })
    }
}

/// A reference to another object's timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// `None` for a self reference.
    pub id: Option<String>,
    pub attr: Attr,
}

/// Value of an evaluated expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Finite(i64),
    /// An open-ended end or duration.
    Infinite,
}

impl Value {
    pub fn finite(self) -> Option<i64> {
        match self {
            Value::Finite(v) => Some(v),
            Value::Infinite => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parsed arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(i64),
    Ref(Reference),
    Neg(Box<Expr>),
    Binary {
        op: Op,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// Parsed logical trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum Logical {
    /// Always satisfied; starts with its parent.
    Always,
    /// Satisfied once every reference has started.
    All(Vec<Reference>),
    /// Satisfied once any reference has started.
    Any(Vec<Reference>),
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(i64),
    Ref(Reference),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Amp,
    Pipe,
}

/// Characters allowed in an object id inside an expression.
pub fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let pos = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => tokens.push((Token::Plus, pos)),
            '-' => tokens.push((Token::Minus, pos)),
            '*' => tokens.push((Token::Star, pos)),
            '/' => tokens.push((Token::Slash, pos)),
            '(' => tokens.push((Token::LParen, pos)),
            ')' => tokens.push((Token::RParen, pos)),
            '&' => tokens.push((Token::Amp, pos)),
            '|' => tokens.push((Token::Pipe, pos)),
            '#' => {
                i += 1;
                let start = i;
                while i < chars.len() && is_id_char(chars[i]) {
                    i += 1;
                }
                let id: String = chars[start..i].iter().collect();
                let mut attr = Attr::Start;
                if i < chars.len() && chars[i] == '.' {
                    i += 1;
                    let attr_start = i;
                    while i < chars.len() && chars[i].is_ascii_alphabetic() {
                        i += 1;
                    }
                    let name: String = chars[attr_start..i].iter().collect();
                    attr = match name.as_str() {
                        "start" => Attr::Start,
                        "end" => Attr::End,
                        "duration" => Attr::Duration,
                        "" => return Err(ParseError::UnexpectedEnd),
                        _ => return Err(ParseError::UnknownAttribute(name)),
                    };
                }
                let id = if id.is_empty() { None } else { Some(id) };
                tokens.push((Token::Ref(Reference { id, attr }), pos));
                continue;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = match text.parse::<i64>() {
                    Ok(v) => v,
                    Err(_) => text
                        .parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite() && v.abs() < i64::MAX as f64)
                        .map(|v| v.round() as i64)
                        .ok_or(ParseError::NumberOutOfRange(text))?,
                };
                tokens.push((Token::Number(value), pos));
                continue;
            }
            other => return Err(ParseError::UnexpectedChar { ch: other, pos }),
        }
        i += 1;
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(Op::Add),
            Some(Token::Minus) => Some(Op::Sub),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.factor()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(Op::Mul),
            Some(Token::Slash) => Some(Op::Div),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let pos = self.tokens.get(self.pos).map(|(_, p)| *p).unwrap_or(0);
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Ref(r)) => Ok(Expr::Ref(r)),
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(_) => Err(ParseError::Trailing(pos)),
                    None => Err(ParseError::UnexpectedEnd),
                }
            }
            Some(_) => Err(ParseError::Trailing(pos)),
            None => Err(ParseError::UnexpectedEnd),
        }
    }
}

/// Parse an arithmetic expression.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    if let Some((_, pos)) = parser.tokens.get(parser.pos) {
        return Err(ParseError::Trailing(*pos));
    }
    Ok(expr)
}

/// Parse a logical trigger expression.
pub fn parse_logical(input: &str) -> Result<Logical, ParseError> {
    let trimmed = input.trim();
    if trimmed == "1" || trimmed.eq_ignore_ascii_case("true") {
        return Ok(Logical::Always);
    }

    let tokens = tokenize(trimmed)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut refs = Vec::new();
    let mut joiner: Option<Token> = None;
    let mut expect_ref = true;
    for (token, pos) in tokens {
        match (expect_ref, token) {
            (true, Token::Ref(r)) => {
                refs.push(r);
                expect_ref = false;
            }
            (false, t @ (Token::Amp | Token::Pipe)) => {
                match &joiner {
                    Some(j) if *j != t => return Err(ParseError::MixedLogical),
                    _ => joiner = Some(t),
                }
                expect_ref = true;
            }
            (_, _) => return Err(ParseError::Trailing(pos)),
        }
    }
    if expect_ref {
        return Err(ParseError::UnexpectedEnd);
    }

    Ok(match joiner {
        Some(Token::Pipe) => Logical::Any(refs),
        _ => Logical::All(refs),
    })
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn apply(op: Op, lhs: Value, rhs: Value) -> Option<Value> {
    use Value::{Finite, Infinite};
    match (op, lhs, rhs) {
        (Op::Add, Finite(a), Finite(b)) => a.checked_add(b).map(Finite),
        (Op::Add, _, _) => Some(Infinite),
        (Op::Sub, Finite(a), Finite(b)) => a.checked_sub(b).map(Finite),
        (Op::Sub, Infinite, Finite(_)) => Some(Infinite),
        (Op::Sub, _, Infinite) => None,
        (Op::Mul, Finite(a), Finite(b)) => a.checked_mul(b).map(Finite),
        (Op::Mul, Infinite, Finite(b)) | (Op::Mul, Finite(b), Infinite) if b > 0 => {
            Some(Infinite)
        }
        (Op::Mul, Infinite, Infinite) => Some(Infinite),
        (Op::Mul, _, _) => None,
        (Op::Div, Finite(a), Finite(b)) => a.checked_div(b).map(Finite),
        (Op::Div, Infinite, Finite(b)) if b > 0 => Some(Infinite),
        (Op::Div, Finite(_), Infinite) => Some(Finite(0)),
        (Op::Div, _, _) => None,
    }
}

impl Expr {
    /// Evaluate against `lookup`, which returns the timing of a referenced
    /// object or `None` if it is not known.
    pub fn eval<F>(&self, lookup: &F) -> Option<Value>
    where
        F: Fn(&Reference) -> Option<Value>,
    {
        match self {
            Expr::Number(n) => Some(Value::Finite(*n)),
            Expr::Ref(r) => lookup(r),
            Expr::Neg(inner) => match inner.eval(lookup)? {
                Value::Finite(v) => v.checked_neg().map(Value::Finite),
                Value::Infinite => None,
            },
            Expr::Binary { op, lhs, rhs } => apply(*op, lhs.eval(lookup)?, rhs.eval(lookup)?),
        }
    }

    /// All references in the expression, in source order.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Expr::Number(_) => {}
            Expr::Ref(r) => out.push(r),
            Expr::Neg(inner) => inner.collect_refs(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_refs(out);
                rhs.collect_refs(out);
            }
        }
    }
}

impl Logical {
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Logical::Always => Vec::new(),
            Logical::All(refs) | Logical::Any(refs) => refs.iter().collect(),
        }
    }
}

/// Ids referenced by an expression string, without parsing it fully.
///
/// Self references are skipped.
pub fn referenced_ids(input: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '#' {
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while let Some(&(j, n)) = chars.peek() {
            if !is_id_char(n) {
                break;
            }
            end = j + n.len_utf8();
            chars.next();
        }
        if end > start {
            ids.push(input[start..end].to_string());
        }
    }
    ids
}

/// Rewrite the ids referenced by an expression string.
///
/// `rename` returns the replacement id, or `None` to keep the original.
pub fn rename_references<F>(input: &str, rename: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(hash) = rest.find('#') {
        out.push_str(&rest[..=hash]);
        rest = &rest[hash + 1..];
        let len = rest
            .char_indices()
            .find(|(_, c)| !is_id_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let id = &rest[..len];
        match (!id.is_empty()).then(|| rename(id)).flatten() {
            Some(new_id) => out.push_str(&new_id),
            None => out.push_str(id),
        }
        rest = &rest[len..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(r: &Reference) -> Option<Value> {
        match (r.id.as_deref(), r.attr) {
            (Some("a"), Attr::Start) => Some(Value::Finite(1000)),
            (Some("a"), Attr::End) => Some(Value::Finite(4000)),
            (Some("a"), Attr::Duration) => Some(Value::Finite(3000)),
            (Some("open"), Attr::End) => Some(Value::Infinite),
            (None, Attr::Start) => Some(Value::Finite(1500)),
            _ => None,
        }
    }

    #[test]
    fn parses_reference_with_offset() {
        let expr = parse("#a.start + 200").unwrap();
        assert_eq!(expr.eval(&lookup), Some(Value::Finite(1200)));
        let expr = parse("#a.end - 500").unwrap();
        assert_eq!(expr.eval(&lookup), Some(Value::Finite(3500)));
    }

    #[test]
    fn self_reference() {
        let expr = parse("#a.start - #.start").unwrap();
        assert_eq!(expr.eval(&lookup), Some(Value::Finite(-500)));
        let refs = expr.references();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1].id, None);
    }

    #[test]
    fn precedence_and_parens() {
        let expr = parse("2 + 3 * 4").unwrap();
        assert_eq!(expr.eval(&lookup), Some(Value::Finite(14)));
        let expr = parse("(2 + 3) * 4").unwrap();
        assert_eq!(expr.eval(&lookup), Some(Value::Finite(20)));
        let expr = parse("-#a.duration / 3").unwrap();
        assert_eq!(expr.eval(&lookup), Some(Value::Finite(-1000)));
    }

    #[test]
    fn missing_attribute_means_start() {
        let expr = parse("#a + 1").unwrap();
        assert_eq!(expr.eval(&lookup), Some(Value::Finite(1001)));
    }

    #[test]
    fn infinite_propagates() {
        let expr = parse("#open.end - 100").unwrap();
        assert_eq!(expr.eval(&lookup), Some(Value::Infinite));
        let expr = parse("#a.start - #open.end").unwrap();
        assert_eq!(expr.eval(&lookup), None);
    }

    #[test]
    fn unknown_reference_is_none() {
        let expr = parse("#missing.start").unwrap();
        assert_eq!(expr.eval(&lookup), None);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("1 +"), Err(ParseError::UnexpectedEnd));
        assert!(matches!(parse("#a.middle"), Err(ParseError::UnknownAttribute(_))));
        assert!(matches!(parse("1 $ 2"), Err(ParseError::UnexpectedChar { ch: '$', .. })));
        assert!(matches!(parse("1 2"), Err(ParseError::Trailing(_))));
    }

    #[test]
    fn logical_forms() {
        assert_eq!(parse_logical("1").unwrap(), Logical::Always);
        assert_eq!(parse_logical(" true ").unwrap(), Logical::Always);
        let all = parse_logical("#a & #b").unwrap();
        assert!(matches!(all, Logical::All(ref r) if r.len() == 2));
        let any = parse_logical("#a | #b.start").unwrap();
        assert!(matches!(any, Logical::Any(ref r) if r.len() == 2));
        assert_eq!(parse_logical("#a & #b | #c"), Err(ParseError::MixedLogical));
        assert_eq!(parse_logical("#a &"), Err(ParseError::UnexpectedEnd));
    }

    #[test]
    fn referenced_ids_skips_self() {
        assert_eq!(
            referenced_ids("#part_group_p1.start + 500 - #.start"),
            vec!["part_group_p1".to_string()]
        );
    }

    #[test]
    fn rename_rewrites_only_matches() {
        let out = rename_references("#a.start + #b.end - #.start", |id| {
            (id == "a").then(|| "previous_a".to_string())
        });
        assert_eq!(out, "#previous_a.start + #b.end - #.start");
    }
}
