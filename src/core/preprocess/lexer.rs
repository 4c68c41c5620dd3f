//! Tokenizer for C/C++ source as seen by the preprocessor.
//!
//! Comments become a single whitespace token and backslash-newline
//! continuations are removed. Positions refer to the physical line and
//! 1-based column where a token starts.

use std::rc::Rc;

use crate::core::scanner::{Token, TokenKind};

/// Multi-character punctuators, longest first.
const PUNCTUATORS: &[&str] = &[
    "...", "<<=", ">>=", "->*", "##", "::", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", ".*",
];

struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    source: &'a Rc<str>,
}

impl<'a> Cursor<'a> {
    fn new(text: &str, source: &'a Rc<str>) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            source,
        }
    }

    /// Skip any backslash-newline pairs at the cursor.
    fn skip_continuations(&mut self) {
        loop {
            match (self.chars.get(self.pos), self.chars.get(self.pos + 1), self.chars.get(self.pos + 2)) {
                (Some('\\'), Some('\n'), _) => {
                    self.pos += 2;
                    self.line += 1;
                    self.column = 1;
                }
                (Some('\\'), Some('\r'), Some('\n')) => {
                    self.pos += 3;
                    self.line += 1;
                    self.column = 1;
                }
                _ => return,
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_continuations();
        self.chars.get(self.pos).copied()
    }

    /// Character after the next one, looking through continuations.
    fn peek_second(&mut self) -> Option<char> {
        self.skip_continuations();
        let mut ahead = self.pos + 1;
        loop {
            match (self.chars.get(ahead), self.chars.get(ahead + 1)) {
                (Some('\\'), Some('\n')) => ahead += 2,
                (Some(c), _) => return Some(*c),
                (None, _) => return None,
            }
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn starts_with(&mut self, text: &str) -> bool {
        self.skip_continuations();
        let mut ahead = self.pos;
        for expected in text.chars() {
            while self.chars.get(ahead) == Some(&'\\') && self.chars.get(ahead + 1) == Some(&'\n') {
                ahead += 2;
            }
            if self.chars.get(ahead) != Some(&expected) {
                return false;
            }
            ahead += 1;
        }
        true
    }

    fn token(&self, kind: TokenKind, value: String, line: u32, column: u32) -> Token {
        Token::new(kind, value, self.source.clone(), line, column)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Tokenize `text`, attributing every token to `source`.
pub fn lex(text: &str, source: &Rc<str>) -> Vec<Token> {
    let mut cursor = Cursor::new(text, source);
    let mut tokens = Vec::new();

    while let Some(c) = cursor.peek() {
        let (line, column) = (cursor.line, cursor.column);

        if c == '\n' {
            cursor.bump();
            tokens.push(cursor.token(TokenKind::Newline, "\n".to_string(), line, column));
            continue;
        }

        if c.is_whitespace() {
            let mut value = String::new();
            while let Some(c) = cursor.peek() {
                if c == '\n' || !c.is_whitespace() {
                    break;
                }
                value.push(c);
                cursor.bump();
            }
            tokens.push(cursor.token(TokenKind::Whitespace, value, line, column));
            continue;
        }

        if cursor.starts_with("//") {
            while let Some(c) = cursor.peek() {
                if c == '\n' {
                    break;
                }
                cursor.bump();
            }
            tokens.push(cursor.token(TokenKind::Whitespace, " ".to_string(), line, column));
            continue;
        }

        if cursor.starts_with("/*") {
            cursor.bump();
            cursor.bump();
            while cursor.peek().is_some() && !cursor.starts_with("*/") {
                cursor.bump();
            }
            cursor.bump();
            cursor.bump();
            tokens.push(cursor.token(TokenKind::Whitespace, " ".to_string(), line, column));
            continue;
        }

        if is_string_prefix(&mut cursor) || c == '"' {
            let value = lex_quoted(&mut cursor, '"');
            tokens.push(cursor.token(TokenKind::String, value, line, column));
            continue;
        }

        if c == '\'' {
            let value = lex_quoted(&mut cursor, '\'');
            tokens.push(cursor.token(TokenKind::Char, value, line, column));
            continue;
        }

        if is_ident_start(c) {
            let mut value = String::new();
            while let Some(c) = cursor.peek() {
                if !is_ident_continue(c) {
                    break;
                }
                value.push(c);
                cursor.bump();
            }
            tokens.push(cursor.token(TokenKind::Identifier, value, line, column));
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && cursor.peek_second().is_some_and(|n| n.is_ascii_digit())) {
            let value = lex_number(&mut cursor);
            tokens.push(cursor.token(TokenKind::Number, value, line, column));
            continue;
        }

        if let Some(punct) = PUNCTUATORS.iter().find(|p| cursor.starts_with(p)) {
            for _ in 0..punct.chars().count() {
                cursor.bump();
            }
            let kind = if *punct == "##" {
                TokenKind::HashHash
            } else {
                TokenKind::Punct
            };
            tokens.push(cursor.token(kind, punct.to_string(), line, column));
            continue;
        }

        cursor.bump();
        let kind = match c {
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '-' => TokenKind::Minus,
            '.' => TokenKind::Dot,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '#' => TokenKind::Hash,
            _ => TokenKind::Punct,
        };
        tokens.push(cursor.token(kind, c.to_string(), line, column));
    }

    tokens
}

/// Whether the cursor is at `L"`, `u"`, `U"` or `u8"`.
fn is_string_prefix(cursor: &mut Cursor<'_>) -> bool {
    ["u8\"", "L\"", "u\"", "U\""]
        .iter()
        .any(|prefix| cursor.starts_with(prefix))
}

/// Literal including prefix and quotes. Stops at an unescaped newline.
fn lex_quoted(cursor: &mut Cursor<'_>, quote: char) -> String {
    let mut value = String::new();
    while let Some(c) = cursor.peek() {
        value.push(c);
        cursor.bump();
        if c == quote {
            break;
        }
    }
    while let Some(c) = cursor.peek() {
        if c == '\n' {
            break;
        }
        value.push(c);
        cursor.bump();
        if c == '\\' {
            if let Some(escaped) = cursor.peek() {
                if escaped == '\n' {
                    break;
                }
                value.push(escaped);
                cursor.bump();
            }
            continue;
        }
        if c == quote {
            break;
        }
    }
    value
}

/// pp-number: digits, letters, `_`, `.`, and signs after an exponent.
fn lex_number(cursor: &mut Cursor<'_>) -> String {
    let mut value = String::new();
    while let Some(c) = cursor.peek() {
        let after_exponent = matches!(value.chars().last(), Some('e' | 'E' | 'p' | 'P'));
        if is_ident_continue(c) || c == '.' || ((c == '+' || c == '-') && after_exponent) {
            value.push(c);
            cursor.bump();
        } else {
            break;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<(TokenKind, String)> {
        let source: Rc<str> = Rc::from("t.c");
        lex(text, &source)
            .into_iter()
            .filter(|t| !t.is_whitespace())
            .map(|t| (t.kind, t.value))
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds(r#"SPGM(hello, "Hi");"#),
            vec![
                (TokenKind::Identifier, "SPGM".to_string()),
                (TokenKind::LParen, "(".to_string()),
                (TokenKind::Identifier, "hello".to_string()),
                (TokenKind::Comma, ",".to_string()),
                (TokenKind::String, "\"Hi\"".to_string()),
                (TokenKind::RParen, ")".to_string()),
                (TokenKind::Semicolon, ";".to_string()),
            ]
        );
    }

    #[test]
    fn test_positions() {
        let source: Rc<str> = Rc::from("t.c");
        let tokens: Vec<Token> = lex("int a;\n  SPGM(x)", &source)
            .into_iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .collect();
        let spgm = &tokens[2];
        assert_eq!((spgm.value.as_str(), spgm.line, spgm.column), ("SPGM", 2, 3));
    }

    #[test]
    fn test_comments_are_whitespace() {
        assert_eq!(
            kinds("a // SPGM(x)\nb /* c\n d */ e"),
            vec![
                (TokenKind::Identifier, "a".to_string()),
                (TokenKind::Identifier, "b".to_string()),
                (TokenKind::Identifier, "e".to_string()),
            ]
        );
    }

    #[test]
    fn test_line_continuation() {
        let source: Rc<str> = Rc::from("t.c");
        let tokens = lex("#define A \\\n  1\nB", &source);
        let newlines = tokens.iter().filter(|t| t.kind == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
        let b = tokens.iter().find(|t| t.value == "B").unwrap();
        assert_eq!(b.line, 3);
    }

    #[test]
    fn test_escaped_quote_in_string() {
        assert_eq!(
            kinds(r#""say \"hi\"" x"#),
            vec![
                (TokenKind::String, r#""say \"hi\"""#.to_string()),
                (TokenKind::Identifier, "x".to_string()),
            ]
        );
    }

    #[test]
    fn test_prefixed_string_and_char() {
        assert_eq!(
            kinds(r#"L"w" u8"n" 'a' '\''"#),
            vec![
                (TokenKind::String, r#"L"w""#.to_string()),
                (TokenKind::String, r#"u8"n""#.to_string()),
                (TokenKind::Char, "'a'".to_string()),
                (TokenKind::Char, r"'\''".to_string()),
            ]
        );
    }

    #[test]
    fn test_punctuators() {
        assert_eq!(
            kinds("a##b :: x->y - 1.5e-3 >= ..."),
            vec![
                (TokenKind::Identifier, "a".to_string()),
                (TokenKind::HashHash, "##".to_string()),
                (TokenKind::Identifier, "b".to_string()),
                (TokenKind::Punct, "::".to_string()),
                (TokenKind::Identifier, "x".to_string()),
                (TokenKind::Punct, "->".to_string()),
                (TokenKind::Identifier, "y".to_string()),
                (TokenKind::Minus, "-".to_string()),
                (TokenKind::Number, "1.5e-3".to_string()),
                (TokenKind::Punct, ">=".to_string()),
                (TokenKind::Punct, "...".to_string()),
            ]
        );
    }
}
