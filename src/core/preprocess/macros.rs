//! Macro definitions and the table the preprocessor expands from.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::lexer::lex;
use crate::core::scanner::{Token, TokenKind};

/// A `#define`d macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDef {
    pub name: String,
    /// `None` for object-like macros.
    pub params: Option<Vec<String>>,
    /// Last parameter collects the remaining arguments (`...` or `args...`).
    pub is_variadic: bool,
    /// Replacement list with surrounding whitespace removed.
    pub body: Vec<Token>,
}

pub const VA_ARGS: &str = "__VA_ARGS__";

impl MacroDef {
    pub fn object(name: impl Into<String>, body: Vec<Token>) -> Self {
        Self {
            name: name.into(),
            params: None,
            is_variadic: false,
            body: trim_whitespace(body),
        }
    }

    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.as_ref()?.iter().position(|param| param == name)
    }

    /// Parse the tokens following `#define` up to the end of the line.
    pub fn parse(tokens: &[Token]) -> Result<Self, String> {
        let mut iter = tokens.iter().skip_while(|t| t.is_whitespace()).peekable();
        let name = match iter.next() {
            Some(token) if token.kind == TokenKind::Identifier => token.value.clone(),
            Some(token) => return Err(format!("macro name must be an identifier, found `{token}`")),
            None => return Err("macro name missing".to_string()),
        };

        // A function-like macro has `(` directly after the name.
        if !iter.peek().is_some_and(|t| t.kind == TokenKind::LParen) {
            return Ok(Self::object(name, iter.cloned().collect()));
        }
        iter.next();

        let mut params = Vec::new();
        let mut is_variadic = false;
        let mut expect_param = true;
        loop {
            let Some(token) = iter.next() else {
                return Err(format!("missing `)` in parameter list of {name}"));
            };
            match token.kind {
                TokenKind::Whitespace => {}
                TokenKind::RParen => break,
                TokenKind::Comma if !expect_param && !is_variadic => expect_param = true,
                TokenKind::Identifier if expect_param => {
                    params.push(token.value.clone());
                    expect_param = false;
                }
                TokenKind::Punct if token.value == "..." => {
                    // `...` alone or after a named parameter (`args...`)
                    if expect_param {
                        params.push(VA_ARGS.to_string());
                    }
                    is_variadic = true;
                    expect_param = false;
                }
                _ => return Err(format!("unexpected `{token}` in parameter list of {name}")),
            }
        }

        Ok(Self {
            name,
            params: Some(params),
            is_variadic,
            body: trim_whitespace(iter.cloned().collect()),
        })
    }

    /// Parse a definition written as source text: `NAME(args) body`.
    pub fn parse_text(text: &str, source: &Rc<str>) -> Result<Self, String> {
        Self::parse(&lex(text, source))
    }
}

fn trim_whitespace(mut tokens: Vec<Token>) -> Vec<Token> {
    while tokens.last().is_some_and(Token::is_whitespace) {
        tokens.pop();
    }
    let leading = tokens.iter().take_while(|t| t.is_whitespace()).count();
    tokens.drain(..leading);
    tokens
}

#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: FxHashMap<String, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, def: MacroDef) {
        self.macros.insert(def.name.clone(), def);
    }

    pub fn undef(&mut self, name: &str) {
        self.macros.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}
