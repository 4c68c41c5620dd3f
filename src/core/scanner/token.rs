use std::{collections::VecDeque, fmt, rc::Rc};

use crate::core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Number,
    /// String literal, quotes included.
    String,
    Char,
    Comma,
    Colon,
    Semicolon,
    Minus,
    Dot,
    LParen,
    RParen,
    Hash,
    HashHash,
    /// Any other punctuator.
    Punct,
    Whitespace,
    Newline,
}

/// A preprocessed token with the position it is attributed to.
///
/// Tokens produced by macro expansion carry the position of the invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub source: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, source: Rc<str>, line: u32, column: u32) -> Self {
        Self {
            kind,
            value: value.into(),
            source,
            line,
            column,
        }
    }

    pub fn is_whitespace(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Newline)
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.value == name
    }

    /// String literal contents without the surrounding quotes.
    ///
    /// Escape sequences are kept as written.
    pub fn unquoted(&self) -> &str {
        let value = self.value.as_str();
        // Prefixed literals: L"..", u8"..", u"..", U".."
        let start = value.find('"').map_or(0, |pos| pos + 1);
        let end = if value.len() > start && value.ends_with('"') {
            value.len() - 1
        } else {
            value.len()
        };
        &value[start..end]
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Producer of preprocessed tokens.
pub trait TokenSource {
    /// `Ok(None)` at the end of input.
    fn next_token(&mut self) -> Result<Option<Token>>;
}

/// Token source over a prepared token list.
#[derive(Debug, Default)]
pub struct TokenList {
    tokens: VecDeque<Token>,
}

impl TokenList {
    pub fn new(tokens: impl IntoIterator<Item = Token>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

impl TokenSource for TokenList {
    fn next_token(&mut self) -> Result<Option<Token>> {
        Ok(self.tokens.pop_front())
    }
}
