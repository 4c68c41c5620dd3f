//! Integer constant expressions of `#if` and `#elif`.
//!
//! Expects `defined` to be resolved and macros to be expanded already.
//! Remaining identifiers evaluate to 0 (`true` to 1).

use crate::core::scanner::{Token, TokenKind};

type EvalResult = Result<i64, String>;

struct Parser<'a> {
    tokens: Vec<&'a Token>,
    pos: usize,
}

/// Binary operators by precedence, lowest first.
const BINARY_LEVELS: &[&[&str]] = &[
    &["||"],
    &["&&"],
    &["|"],
    &["^"],
    &["&"],
    &["==", "!="],
    &["<", ">", "<=", ">="],
    &["<<", ">>"],
    &["+", "-"],
    &["*", "/", "%"],
];

pub fn evaluate(tokens: &[Token]) -> EvalResult {
    let mut parser = Parser {
        tokens: tokens.iter().filter(|t| !t.is_whitespace()).collect(),
        pos: 0,
    };
    if parser.tokens.is_empty() {
        return Err("expression expected".to_string());
    }
    let value = parser.conditional()?;
    match parser.peek() {
        None => Ok(value),
        Some(token) => Err(format!("unexpected `{token}` in expression")),
    }
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_is(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.value == text && t.kind != TokenKind::String)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn expect(&mut self, text: &str) -> Result<(), String> {
        if self.peek_is(text) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected `{text}`"))
        }
    }

    fn conditional(&mut self) -> EvalResult {
        let condition = self.binary(0)?;
        if !self.peek_is("?") {
            return Ok(condition);
        }
        self.pos += 1;
        let then = self.conditional()?;
        self.expect(":")?;
        let otherwise = self.conditional()?;
        Ok(if condition != 0 { then } else { otherwise })
    }

    fn binary(&mut self, level: usize) -> EvalResult {
        if level == BINARY_LEVELS.len() {
            return self.unary();
        }
        let mut lhs = self.binary(level + 1)?;
        while let Some(op) = self.peek().filter(|t| BINARY_LEVELS[level].contains(&t.value.as_str())) {
            self.pos += 1;
            let rhs = self.binary(level + 1)?;
            lhs = apply(&op.value, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> EvalResult {
        let Some(token) = self.advance() else {
            return Err("unexpected end of expression".to_string());
        };
        match (token.kind, token.value.as_str()) {
            (_, "!") => Ok(i64::from(self.unary()? == 0)),
            (_, "~") => Ok(!self.unary()?),
            (_, "-") => Ok(self.unary()?.wrapping_neg()),
            (_, "+") => self.unary(),
            (TokenKind::LParen, _) => {
                let value = self.conditional()?;
                self.expect(")")?;
                Ok(value)
            }
            (TokenKind::Number, text) => parse_number(text),
            (TokenKind::Char, text) => parse_char(text),
            (TokenKind::Identifier, "true") => Ok(1),
            (TokenKind::Identifier, _) => Ok(0),
            _ => Err(format!("unexpected `{token}` in expression")),
        }
    }
}

fn apply(op: &str, lhs: i64, rhs: i64) -> EvalResult {
    Ok(match op {
        "||" => i64::from(lhs != 0 || rhs != 0),
        "&&" => i64::from(lhs != 0 && rhs != 0),
        "|" => lhs | rhs,
        "^" => lhs ^ rhs,
        "&" => lhs & rhs,
        "==" => i64::from(lhs == rhs),
        "!=" => i64::from(lhs != rhs),
        "<" => i64::from(lhs < rhs),
        ">" => i64::from(lhs > rhs),
        "<=" => i64::from(lhs <= rhs),
        ">=" => i64::from(lhs >= rhs),
        "<<" => lhs.wrapping_shl(rhs as u32),
        ">>" => lhs.wrapping_shr(rhs as u32),
        "+" => lhs.wrapping_add(rhs),
        "-" => lhs.wrapping_sub(rhs),
        "*" => lhs.wrapping_mul(rhs),
        "/" | "%" if rhs == 0 => return Err("division by zero".to_string()),
        "/" => lhs.wrapping_div(rhs),
        "%" => lhs.wrapping_rem(rhs),
        _ => return Err(format!("unknown operator `{op}`")),
    })
}

fn parse_number(text: &str) -> EvalResult {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2)
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse::<i64>()
    };
    parsed.map_err(|_| format!("invalid integer `{text}`"))
}

fn parse_char(text: &str) -> EvalResult {
    let inner = text
        .find('\'')
        .map(|start| &text[start + 1..])
        .and_then(|rest| rest.strip_suffix('\''))
        .ok_or_else(|| format!("invalid character constant {text}"))?;
    let mut chars = inner.chars();
    let value = match (chars.next(), chars.next()) {
        (Some('\\'), Some(escaped)) => match escaped {
            'n' => '\n' as i64,
            't' => '\t' as i64,
            'r' => '\r' as i64,
            '0' => 0,
            other => other as i64,
        },
        (Some(c), _) => c as i64,
        (None, _) => return Err("empty character constant".to_string()),
    };
    Ok(value)
}
