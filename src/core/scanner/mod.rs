//! Recognizes expanded marker macros in a preprocessed token stream and
//! rebuilds the items they describe.
//!
//! The marker macros expand to
//! `__INTERNAL_<TAG>_FLASH_STRING_START(#name, args..., __INTERNAL_<TAG>_FLASH_STRING_END)`
//! where `<TAG>` is `SPGM`, `DEFINE` or `AUTOINIT`. Everything between the two
//! markers is collected by a [`PendingItem`]. Markers may nest; tokens feed the
//! innermost open item and inner items are emitted first.

pub mod hooks;
pub mod pending;
pub mod token;

pub use hooks::{DirectiveControl, DirectiveKind, PreprocessorHooks, RESERVED_MACROS, ScanHooks};
pub use pending::PendingItem;
pub use token::{Token, TokenKind, TokenList, TokenSource};

use tracing::trace;

use crate::core::{
    error::{Result, SpgmError},
    item::Item,
    location::{DefinitionKind, Location},
};

const MARKER_PREFIX: &str = "__INTERNAL_";
const START_SUFFIX: &str = "_FLASH_STRING_START";
const END_SUFFIX: &str = "_FLASH_STRING_END";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Start(DefinitionKind),
    End(DefinitionKind),
}

fn kind_from_tag(tag: &str) -> Option<DefinitionKind> {
    [DefinitionKind::Spgm, DefinitionKind::Define, DefinitionKind::AutoInit]
        .into_iter()
        .find(|kind| kind.marker_tag() == tag)
}

fn parse_marker(ident: &str) -> Option<Marker> {
    let rest = ident.strip_prefix(MARKER_PREFIX)?;
    if let Some(tag) = rest.strip_suffix(START_SUFFIX) {
        return kind_from_tag(tag).map(Marker::Start);
    }
    if let Some(tag) = rest.strip_suffix(END_SUFFIX) {
        return kind_from_tag(tag).map(Marker::End);
    }
    None
}

/// Tokens of one physical line that contains more than whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    pub source: String,
    pub line: u32,
    pub tokens: Vec<Token>,
}

/// Groups a token stream into [`LogicalLine`]s.
pub struct LineReader<'a, S: TokenSource> {
    source: &'a mut S,
    lookahead: Option<Token>,
}

impl<'a, S: TokenSource> LineReader<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self {
            source,
            lookahead: None,
        }
    }

    pub fn next_line(&mut self) -> Result<Option<LogicalLine>> {
        loop {
            let mut tokens = Vec::new();
            let mut key: Option<(std::rc::Rc<str>, u32)> = None;

            loop {
                let token = match self.lookahead.take() {
                    Some(token) => token,
                    None => match self.source.next_token()? {
                        Some(token) => token,
                        None => break,
                    },
                };
                if token.kind == TokenKind::Newline {
                    if key.is_some() {
                        break;
                    }
                    continue;
                }
                match &key {
                    None => key = Some((token.source.clone(), token.line)),
                    Some((source, line)) if *line != token.line || **source != *token.source => {
                        self.lookahead = Some(token);
                        break;
                    }
                    Some(_) => {}
                }
                tokens.push(token);
            }

            let Some((source, line)) = key else {
                return Ok(None);
            };
            if tokens.iter().all(Token::is_whitespace) {
                continue;
            }
            return Ok(Some(LogicalLine {
                source: source.to_string(),
                line,
                tokens,
            }));
        }
    }
}

/// Marker state machine.
#[derive(Debug, Default)]
pub struct Scanner {
    stack: Vec<PendingItem>,
    items: Vec<Item>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a whole token source.
    pub fn scan<S: TokenSource>(source: &mut S) -> Result<Vec<Item>> {
        let mut scanner = Scanner::new();
        let mut lines = LineReader::new(source);
        while let Some(line) = lines.next_line()? {
            trace!("{}:{}: {} tokens", line.source, line.line, line.tokens.len());
            for token in &line.tokens {
                scanner.feed(token)?;
            }
        }
        scanner.finish()
    }

    pub fn is_idle(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn feed(&mut self, token: &Token) -> Result<()> {
        if token.kind == TokenKind::Identifier {
            match parse_marker(&token.value) {
                Some(Marker::Start(kind)) => {
                    let location = Location::new(&*token.source, token.line, token.column, kind);
                    self.stack.push(PendingItem::new(location));
                    return Ok(());
                }
                Some(Marker::End(kind)) => return self.close(kind, token),
                None => {}
            }
        }

        let Some(pending) = self.stack.last_mut() else {
            return Ok(());
        };
        match token.kind {
            TokenKind::String => pending.append(token.unquoted()),
            TokenKind::Dot if token.value == "," => pending.push_argument()?,
            TokenKind::Identifier | TokenKind::Minus | TokenKind::Dot | TokenKind::Semicolon => {
                pending.append(&token.value)
            }
            TokenKind::Comma => pending.push_argument()?,
            TokenKind::Colon => pending.push_language()?,
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, kind: DefinitionKind, token: &Token) -> Result<()> {
        let location = || Location::new(&*token.source, token.line, token.column, kind);
        let Some(pending) = self.stack.pop() else {
            return Err(SpgmError::MismatchedMarker {
                location: location(),
                message: format!("{} end marker without start marker", kind.marker_tag()),
            });
        };
        if pending.kind() != kind {
            return Err(SpgmError::MismatchedMarker {
                location: location(),
                message: format!(
                    "{} end marker closes {} started at {}",
                    kind.marker_tag(),
                    pending.kind().marker_tag(),
                    pending.location()
                ),
            });
        }
        let item = pending.finalize()?;
        trace!("{}: {} ({})", item.location().map(ToString::to_string).unwrap_or_default(), item.name, kind);
        self.items.push(item);
        Ok(())
    }

    /// Items in the order their end markers were seen.
    pub fn finish(mut self) -> Result<Vec<Item>> {
        if let Some(pending) = self.stack.pop() {
            return Err(SpgmError::MismatchedMarker {
                location: pending.location().clone(),
                message: format!("unterminated {} marker", pending.kind().marker_tag()),
            });
        }
        Ok(self.items)
    }
}
