//! Query templates.
//!
//! A template is a JSON document whose string values may reference typed
//! parameters as `%name%`:
//!
//! - a string that is exactly one placeholder is replaced by the parameter
//!   value, keeping its JSON type;
//! - placeholders inside a longer string are interpolated as text;
//! - a string starting with `=` is an arithmetic expression over numeric
//!   literals and numeric parameters, with `+ - * /` and parentheses, and is
//!   replaced by its numeric result.
//!
//! Nothing else is evaluated.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::ReindexError;

/// A typed template parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::Float(f) => json!(f),
            Self::Text(s) => json!(s),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Named parameters of a search request.
pub type Params = BTreeMap<String, ParamValue>;

/// Render `template` with `params`.
pub fn render(template: &Value, params: &Params) -> Result<Value, ReindexError> {
    match template {
        Value::String(s) => render_string(s, params),
        Value::Array(items) => items
            .iter()
            .map(|item| render(item, params))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                rendered.insert(key.clone(), render(value, params)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

fn render_string(s: &str, params: &Params) -> Result<Value, ReindexError> {
    if let Some(expression) = s.strip_prefix('=') {
        return evaluate(expression, params).map(Number::into_json);
    }
    if let Some(name) = whole_placeholder(s) {
        return lookup(name, params).map(ParamValue::to_json);
    }
    interpolate(s, params).map(Value::String)
}

fn is_param_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn whole_placeholder(s: &str) -> Option<&str> {
    let name = s.strip_prefix('%')?.strip_suffix('%')?;
    (!name.is_empty() && name.chars().all(is_param_char)).then_some(name)
}

fn lookup<'a>(name: &str, params: &'a Params) -> Result<&'a ParamValue, ReindexError> {
    params
        .get(name)
        .ok_or_else(|| ReindexError::template(format!("missing parameter '{}'", name)))
}

fn interpolate(s: &str, params: &Params) -> Result<String, ReindexError> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 && after[..end].chars().all(is_param_char) => {
                out.push_str(&lookup(&after[..end], params)?.to_string());
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

// ----------------------------------------------------------------------------
// Arithmetic
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn into_json(self) -> Value {
        match self {
            Self::Int(i) => json!(i),
            Self::Float(f) => json!(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Param(String),
    Plus,
    Minus,
    Star,
    Slash,
    Open,
    Close,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, ReindexError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expression.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '%' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_param_char(chars[end]) {
                    end += 1;
                }
                if end == start || end >= chars.len() || chars[end] != '%' {
                    return Err(ReindexError::template(format!(
                        "malformed parameter in '{}'",
                        expression
                    )));
                }
                tokens.push(Token::Param(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = if literal.contains('.') {
                    literal.parse::<f64>().map(Number::Float).ok()
                } else {
                    literal.parse::<i64>().map(Number::Int).ok()
                };
                let number = number.ok_or_else(|| {
                    ReindexError::template(format!("invalid number '{}'", literal))
                })?;
                tokens.push(Token::Number(number));
            }
            other => {
                return Err(ReindexError::template(format!(
                    "unexpected '{}' in '{}'",
                    other, expression
                )))
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    params: &'a Params,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Number, ReindexError> {
        let mut value = self.term()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Plus | Token::Minus => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    value = apply(&op, value, rhs)?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<Number, ReindexError> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Star | Token::Slash => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    value = apply(&op, value, rhs)?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // factor := '-' factor | number | param | '(' expr ')'
    fn factor(&mut self) -> Result<Number, ReindexError> {
        match self.next() {
            Some(Token::Minus) => match self.factor()? {
                Number::Int(i) => i
                    .checked_neg()
                    .map(Number::Int)
                    .ok_or_else(|| ReindexError::template("integer overflow")),
                Number::Float(f) => Ok(Number::Float(-f)),
            },
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Param(name)) => match lookup(&name, self.params)? {
                ParamValue::Int(i) => Ok(Number::Int(*i)),
                ParamValue::Float(f) => Ok(Number::Float(*f)),
                other => Err(ReindexError::template(format!(
                    "parameter '{}' is not numeric: {}",
                    name, other
                ))),
            },
            Some(Token::Open) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err(ReindexError::template("missing ')'")),
                }
            }
            Some(token) => Err(ReindexError::template(format!(
                "unexpected token {:?}",
                token
            ))),
            None => Err(ReindexError::template("unexpected end of expression")),
        }
    }
}

fn apply(op: &Token, lhs: Number, rhs: Number) -> Result<Number, ReindexError> {
    let overflow = || ReindexError::template("integer overflow");
    match (lhs, rhs) {
        (Number::Int(a), Number::Int(b)) => match op {
            Token::Plus => a.checked_add(b).map(Number::Int).ok_or_else(overflow),
            Token::Minus => a.checked_sub(b).map(Number::Int).ok_or_else(overflow),
            Token::Star => a.checked_mul(b).map(Number::Int).ok_or_else(overflow),
            _ => {
                if b == 0 {
                    return Err(ReindexError::template("division by zero"));
                }
                match a.checked_rem(b).ok_or_else(overflow)? {
                    0 => a.checked_div(b).map(Number::Int).ok_or_else(overflow),
                    _ => Ok(Number::Float(a as f64 / b as f64)),
                }
            }
        },
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            match op {
                Token::Plus => Ok(Number::Float(a + b)),
                Token::Minus => Ok(Number::Float(a - b)),
                Token::Star => Ok(Number::Float(a * b)),
                _ if b == 0.0 => Err(ReindexError::template("division by zero")),
                _ => Ok(Number::Float(a / b)),
            }
        }
    }
}

fn evaluate(expression: &str, params: &Params) -> Result<Number, ReindexError> {
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
        params,
    };
    let value = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(ReindexError::template(format!(
            "trailing input in '{}'",
            expression
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Params {
        Params::from([
            ("q".to_string(), ParamValue::from("route nationale")),
            ("page".to_string(), ParamValue::Int(3)),
            ("size".to_string(), ParamValue::Int(20)),
            ("ratio".to_string(), ParamValue::Float(0.5)),
            ("exact".to_string(), ParamValue::Bool(true)),
        ])
    }

    #[test]
    fn test_whole_placeholders_keep_their_type() {
        let template = json!({
            "query": {"match": {"name": "%q%"}},
            "size": "%size%",
            "exact": "%exact%"
        });

        let rendered = render(&template, &params()).unwrap();

        assert_eq!(
            rendered,
            json!({
                "query": {"match": {"name": "route nationale"}},
                "size": 20,
                "exact": true
            })
        );
    }

    #[test]
    fn test_interpolation_inside_text() {
        let rendered = render(&json!("name:%q% page %page% 100%"), &params()).unwrap();
        assert_eq!(rendered, json!("name:route nationale page 3 100%"));
    }

    #[test]
    fn test_arithmetic() {
        let p = params();
        assert_eq!(render(&json!("=(%page% - 1) * %size%"), &p).unwrap(), json!(40));
        assert_eq!(render(&json!("=%size% * %ratio%"), &p).unwrap(), json!(10.0));
        assert_eq!(render(&json!("=7 / 2"), &p).unwrap(), json!(3.5));
        assert_eq!(render(&json!("=-(2 + 3) * 2"), &p).unwrap(), json!(-10));
        assert_eq!(render(&json!("=1 + 2 * 3"), &p).unwrap(), json!(7));
    }

    #[test]
    fn test_arithmetic_rejects_anything_else() {
        let p = params();
        for bad in ["=%q% + 1", "=1 / 0", "=2 ** 3", "=(1 + 2", "=1 2", "=abs(1)", "=%missing%"] {
            assert!(
                matches!(render(&json!(bad), &p), Err(ReindexError::TemplateError(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_integer_overflow_is_a_template_error() {
        let p = Params::from([("n".to_string(), ParamValue::Int(i64::MIN))]);
        for expression in ["=%n% / -1", "=%n% - 1", "=%n% * 2", "=-%n%"] {
            assert!(
                matches!(render(&json!(expression), &p), Err(ReindexError::TemplateError(_))),
                "{} should overflow",
                expression
            );
        }
        assert_eq!(render(&json!("=%n% / 1"), &p).unwrap(), json!(i64::MIN));
    }

    #[test]
    fn test_missing_parameter() {
        assert!(matches!(
            render(&json!({"size": "%nope%"}), &params()),
            Err(ReindexError::TemplateError(_))
        ));
    }
}
