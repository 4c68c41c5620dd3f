//! A small C preprocessor producing the token stream the scanner consumes.
//!
//! Supported: `#include` over include directories, object-like and
//! function-like macros (`#`, `##`, `__VA_ARGS__`), `#if`/`#ifdef`/`#ifndef`/
//! `#elif`/`#else`/`#endif` and `#pragma once`. Unknown directives are
//! ignored. The marker macros are predefined so that their invocations expand
//! to the internal start/end markers.

pub mod expr;
pub mod lexer;
pub mod macros;

use std::{
    collections::VecDeque,
    fs,
    path::{Component, Path, PathBuf},
    rc::Rc,
};

use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::core::{
    error::{Result, SpgmError},
    location::{DefinitionKind, Location},
    scanner::{DirectiveControl, DirectiveKind, PreprocessorHooks, Token, TokenKind, TokenSource},
};

pub use macros::{MacroDef, MacroTable, VA_ARGS};

/// Definitions every scan starts with.
pub const MARKER_MACROS: &[&str] = &[
    "FLASH_STRINGS_AUTO_INIT 1",
    "AUTO_INIT_SPGM(name, ...) __INTERNAL_AUTOINIT_FLASH_STRING_START(#name,__VA_ARGS__,__INTERNAL_AUTOINIT_FLASH_STRING_END)",
    "SPGM(name, ...) __INTERNAL_SPGM_FLASH_STRING_START(#name,__VA_ARGS__,__INTERNAL_SPGM_FLASH_STRING_END)",
    "FSPGM(name, ...) __INTERNAL_SPGM_FLASH_STRING_START(#name,__VA_ARGS__,__INTERNAL_SPGM_FLASH_STRING_END)",
    "PROGMEM_STRING_DEF(name, value) __INTERNAL_DEFINE_FLASH_STRING_START(#name,value,__INTERNAL_DEFINE_FLASH_STRING_END)",
];

type HideSet = Rc<FxHashSet<String>>;

/// Token plus the macros that may not expand it again.
#[derive(Debug, Clone)]
struct PTok {
    token: Token,
    hide: HideSet,
}

impl PTok {
    fn plain(token: Token) -> Self {
        Self {
            token,
            hide: HideSet::default(),
        }
    }
}

struct CondFrame {
    allow_emit: bool,
    taken: bool,
    saw_else: bool,
}

struct FileState {
    path: PathBuf,
    display: Rc<str>,
    tokens: Vec<Token>,
    pos: usize,
    at_line_start: bool,
    conds: Vec<CondFrame>,
}

impl FileState {
    fn emitting(&self) -> bool {
        self.conds.last().is_none_or(|frame| frame.allow_emit)
    }

    /// Tokens up to the end of the current line; the newline is consumed.
    fn take_line(&mut self) -> Vec<Token> {
        let mut line = Vec::new();
        while let Some(token) = self.tokens.get(self.pos) {
            self.pos += 1;
            if token.kind == TokenKind::Newline {
                self.at_line_start = true;
                break;
            }
            line.push(token.clone());
        }
        line
    }
}

/// Remove `.` and resolve `..` without touching the file system.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn first_significant(tokens: &[Token]) -> Option<(usize, &Token)> {
    tokens.iter().enumerate().find(|(_, t)| !t.is_whitespace())
}

pub struct Preprocessor<H: PreprocessorHooks> {
    macros: MacroTable,
    include_dirs: Vec<PathBuf>,
    hooks: H,
    roots: VecDeque<PathBuf>,
    files: Vec<FileState>,
    pending: VecDeque<PTok>,
    isolation: usize,
    once: FxHashSet<PathBuf>,
}

impl<H: PreprocessorHooks> Preprocessor<H> {
    /// Preprocessor seeded with [`MARKER_MACROS`].
    pub fn new(hooks: H) -> Self {
        let mut preprocessor = Self {
            macros: MacroTable::new(),
            include_dirs: Vec::new(),
            hooks,
            roots: VecDeque::new(),
            files: Vec::new(),
            pending: VecDeque::new(),
            isolation: 0,
            once: FxHashSet::default(),
        };
        let builtin: Rc<str> = Rc::from("<builtin>");
        for definition in MARKER_MACROS {
            // The builtin definitions are well formed.
            if let Ok(def) = MacroDef::parse_text(definition, &builtin) {
                preprocessor.macros.define(def);
            }
        }
        preprocessor
    }

    pub fn add_include_dir(&mut self, dir: impl Into<PathBuf>) {
        self.include_dirs.push(dir.into());
    }

    /// Queue a file as if the virtual root contained `#include "path"`.
    pub fn add_source(&mut self, path: impl AsRef<Path>) {
        self.roots.push_back(normalize_path(path.as_ref()));
    }

    /// Define a macro from `-D NAME` or `-D NAME=value`.
    pub fn define_value(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        let text = format!("{name} {}", value.unwrap_or("1"));
        self.define(&text)
    }

    /// Define a macro from its source text, `NAME(args) body`.
    pub fn define(&mut self, definition: &str) -> Result<()> {
        let source: Rc<str> = Rc::from("<command line>");
        let def = MacroDef::parse_text(definition, &source).map_err(|message| SpgmError::Preprocess {
            location: Location::new("<command line>", 1, 1, DefinitionKind::Spgm),
            message,
        })?;
        if self.hooks.on_directive(DirectiveKind::Define, &def.name) == DirectiveControl::Expand {
            self.macros.define(def);
        }
        Ok(())
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn into_hooks(self) -> H {
        self.hooks
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> SpgmError {
        SpgmError::Preprocess {
            location: Location::new(&*token.source, token.line, token.column, DefinitionKind::Spgm),
            message: message.into(),
        }
    }

    fn enter_file(&mut self, path: PathBuf) -> Result<()> {
        if self.once.contains(&path) {
            return Ok(());
        }
        match self.hooks.on_file_open(&path) {
            DirectiveControl::Expand => {}
            DirectiveControl::PassThrough | DirectiveControl::Ignore => return Ok(()),
        }
        let text = fs::read_to_string(&path).map_err(|err| SpgmError::io(&path, err))?;
        let display: Rc<str> = Rc::from(path.to_string_lossy().as_ref());
        debug!("preprocessing {}", path.display());
        self.files.push(FileState {
            tokens: lexer::lex(&text, &display),
            path,
            display,
            pos: 0,
            at_line_start: true,
            conds: Vec::new(),
        });
        Ok(())
    }

    fn leave_file(&mut self) -> Result<()> {
        if let Some(file) = self.files.pop()
            && !file.conds.is_empty()
        {
            let line = file.tokens.last().map_or(1, |t| t.line);
            return Err(SpgmError::Preprocess {
                location: Location::new(&*file.display, line, 1, DefinitionKind::Spgm),
                message: "unterminated conditional directive".to_string(),
            });
        }
        Ok(())
    }

    /// Next token of the active region, with directives applied.
    fn next_raw(&mut self) -> Result<Option<Token>> {
        loop {
            let Some(file) = self.files.last_mut() else {
                match self.roots.pop_front() {
                    Some(root) => {
                        self.enter_file(root)?;
                        continue;
                    }
                    None => return Ok(None),
                }
            };
            let Some(token) = file.tokens.get(file.pos).cloned() else {
                self.leave_file()?;
                continue;
            };
            file.pos += 1;

            if file.at_line_start && token.kind == TokenKind::Hash {
                let line = file.take_line();
                self.directive(&token, &line)?;
                continue;
            }
            match token.kind {
                TokenKind::Newline => file.at_line_start = true,
                TokenKind::Whitespace => {}
                _ => file.at_line_start = false,
            }
            if file.emitting() {
                return Ok(Some(token));
            }
        }
    }

    fn fetch(&mut self) -> Result<Option<PTok>> {
        if let Some(ptok) = self.pending.pop_front() {
            return Ok(Some(ptok));
        }
        if self.isolation > 0 {
            return Ok(None);
        }
        Ok(self.next_raw()?.map(PTok::plain))
    }

    fn push_front(&mut self, tokens: Vec<PTok>) {
        for ptok in tokens.into_iter().rev() {
            self.pending.push_front(ptok);
        }
    }

    /// Next fully expanded token.
    fn next_expanded(&mut self) -> Result<Option<PTok>> {
        loop {
            let Some(ptok) = self.fetch()? else {
                return Ok(None);
            };
            if ptok.token.kind != TokenKind::Identifier || ptok.hide.contains(&ptok.token.value) {
                return Ok(Some(ptok));
            }
            let Some(def) = self.macros.get(&ptok.token.value).cloned() else {
                return Ok(Some(ptok));
            };

            let args = if def.is_function_like() {
                let mut skipped = Vec::new();
                let mut found = false;
                while let Some(next) = self.fetch()? {
                    if next.token.is_whitespace() {
                        skipped.push(next);
                        continue;
                    }
                    found = next.token.kind == TokenKind::LParen;
                    if !found {
                        skipped.push(next);
                    }
                    break;
                }
                if !found {
                    self.push_front(skipped);
                    return Ok(Some(ptok));
                }
                Some(self.collect_args(&ptok.token)?)
            } else {
                None
            };

            let expansion = self.substitute(&def, args, &ptok)?;
            self.push_front(expansion);
        }
    }

    /// Arguments of a function-like invocation; the `(` is already consumed.
    fn collect_args(&mut self, name: &Token) -> Result<Vec<Vec<PTok>>> {
        let mut args = vec![Vec::new()];
        let mut depth = 0usize;
        loop {
            let Some(ptok) = self.fetch()? else {
                return Err(self.error_at(name, format!("unterminated argument list invoking macro {}", name.value)));
            };
            match ptok.token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => break,
                TokenKind::RParen => depth -= 1,
                TokenKind::Comma if depth == 0 => {
                    args.push(Vec::new());
                    continue;
                }
                _ => {}
            }
            if let Some(current) = args.last_mut() {
                current.push(ptok);
            }
        }
        Ok(args
            .into_iter()
            .map(|arg| {
                let trimmed: Vec<PTok> = arg
                    .into_iter()
                    .skip_while(|p| p.token.is_whitespace())
                    .collect();
                let end = trimmed.iter().rposition(|p| !p.token.is_whitespace()).map_or(0, |i| i + 1);
                trimmed.into_iter().take(end).collect()
            })
            .collect())
    }

    /// Expand `tokens` completely without reading past them.
    fn expand_isolated(&mut self, tokens: Vec<PTok>) -> Result<Vec<PTok>> {
        let saved = std::mem::replace(&mut self.pending, tokens.into());
        self.isolation += 1;
        let mut out = Vec::new();
        let result = loop {
            match self.next_expanded() {
                Ok(Some(ptok)) => out.push(ptok),
                Ok(None) => break Ok(out),
                Err(err) => break Err(err),
            }
        };
        self.isolation -= 1;
        self.pending = saved;
        result
    }

    fn substitute(&mut self, def: &MacroDef, args: Option<Vec<Vec<PTok>>>, invocation: &PTok) -> Result<Vec<PTok>> {
        let site = &invocation.token;
        let mut hide = (*invocation.hide).clone();
        hide.insert(def.name.clone());
        let hide: HideSet = Rc::new(hide);

        let args = match (args, &def.params) {
            (Some(mut args), Some(params)) => {
                if params.is_empty() && args.len() == 1 && args[0].is_empty() {
                    args.clear();
                }
                if def.is_variadic {
                    if args.len() + 1 < params.len() {
                        return Err(self.error_at(site, format!("macro {} requires at least {} arguments", def.name, params.len() - 1)));
                    }
                    // fold surplus arguments into the variadic one
                    if args.len() > params.len() {
                        let rest = args.split_off(params.len() - 1);
                        let mut joined = Vec::new();
                        for (i, arg) in rest.into_iter().enumerate() {
                            if i > 0 {
                                joined.push(PTok::plain(Token::new(TokenKind::Comma, ",", site.source.clone(), site.line, site.column)));
                            }
                            joined.extend(arg);
                        }
                        args.push(joined);
                    }
                    while args.len() < params.len() {
                        args.push(Vec::new());
                    }
                } else if args.len() != params.len() {
                    return Err(self.error_at(
                        site,
                        format!("macro {} expects {} arguments, {} given", def.name, params.len(), args.len()),
                    ));
                }
                args
            }
            _ => Vec::new(),
        };

        let relocate = |token: &Token| {
            let mut token = token.clone();
            token.source = site.source.clone();
            token.line = site.line;
            token.column = site.column;
            token
        };

        let body = &def.body;
        let mut out: Vec<PTok> = Vec::new();
        let mut expanded_cache: Vec<Option<Vec<PTok>>> = vec![None; args.len()];
        let mut i = 0;
        while i < body.len() {
            let token = &body[i];
            let next_significant = body[i + 1..].iter().position(|t| !t.is_whitespace()).map(|p| i + 1 + p);
            let prev_is_paste = out
                .iter()
                .rev()
                .find(|p| !p.token.is_whitespace())
                .is_some_and(|p| p.token.kind == TokenKind::HashHash && p.hide.is_empty());

            // #param
            if token.kind == TokenKind::Hash && def.is_function_like() {
                if let Some(index) = next_significant.and_then(|n| def.param_index(&body[n].value)) {
                    let text = stringify(&args[index]);
                    out.push(PTok::plain(relocate(&Token::new(TokenKind::String, text, site.source.clone(), 0, 0))));
                    i = next_significant.map_or(body.len(), |n| n + 1);
                    continue;
                }
            }

            if token.kind == TokenKind::Identifier
                && let Some(index) = def.param_index(&token.value)
            {
                let next_is_paste = next_significant.is_some_and(|n| body[n].kind == TokenKind::HashHash);
                let replacement = if prev_is_paste || next_is_paste {
                    args[index].clone()
                } else {
                    if expanded_cache[index].is_none() {
                        expanded_cache[index] = Some(self.expand_isolated(args[index].clone())?);
                    }
                    expanded_cache[index].clone().unwrap_or_default()
                };
                if replacement.is_empty() && (prev_is_paste || next_is_paste) {
                    out.push(PTok::plain(Token::new(TokenKind::Whitespace, "", site.source.clone(), site.line, site.column)));
                }
                for ptok in replacement {
                    out.push(PTok {
                        token: relocate(&ptok.token),
                        hide: ptok.hide,
                    });
                }
                i += 1;
                continue;
            }

            if token.kind == TokenKind::HashHash {
                // marker for paste; an empty hide set distinguishes it from an argument `##`
                out.push(PTok::plain(relocate(token)));
                i += 1;
                continue;
            }

            out.push(PTok {
                token: relocate(token),
                hide: hide.clone(),
            });
            i += 1;
        }

        let mut result = paste_tokens(out, site);
        for ptok in &mut result {
            let mut merged = (*ptok.hide).clone();
            merged.extend(hide.iter().cloned());
            ptok.hide = Rc::new(merged);
        }
        Ok(result)
    }

    fn directive(&mut self, hash: &Token, line: &[Token]) -> Result<()> {
        let Some((index, name)) = first_significant(line) else {
            return Ok(());
        };
        let rest = &line[index + 1..];
        let name = name.value.clone();

        let Some(file) = self.files.last_mut() else {
            return Ok(());
        };
        let emitting = file.emitting();

        match name.as_str() {
            "ifdef" | "ifndef" => {
                let predicate = match first_significant(rest) {
                    Some((_, macro_name)) => self.macros.is_defined(&macro_name.value) == (name == "ifdef"),
                    None => return Err(self.error_at(hash, format!("#{name} missing macro name"))),
                };
                self.push_cond(emitting, emitting && predicate);
            }
            "if" => {
                let predicate = emitting && self.evaluate(hash, rest)?;
                self.push_cond(emitting, predicate);
            }
            "elif" => {
                let (taken, saw_else, parent) = self.current_cond(hash, "#elif")?;
                if saw_else {
                    return Err(self.error_at(hash, "#elif after #else"));
                }
                let predicate = !taken && parent && self.evaluate(hash, rest)?;
                if let Some(frame) = self.files.last_mut().and_then(|f| f.conds.last_mut()) {
                    frame.allow_emit = predicate;
                    frame.taken |= predicate;
                }
            }
            "else" => {
                let (taken, saw_else, parent) = self.current_cond(hash, "#else")?;
                if saw_else {
                    return Err(self.error_at(hash, "duplicate #else"));
                }
                if let Some(frame) = self.files.last_mut().and_then(|f| f.conds.last_mut()) {
                    frame.saw_else = true;
                    frame.allow_emit = parent && !taken;
                }
            }
            "endif" => {
                if file.conds.pop().is_none() {
                    return Err(self.error_at(hash, "#endif without #if"));
                }
            }
            _ if !emitting => {}
            "define" => match MacroDef::parse(rest) {
                Ok(def) => match self.hooks.on_directive(DirectiveKind::Define, &def.name) {
                    DirectiveControl::Expand => self.macros.define(def),
                    DirectiveControl::PassThrough | DirectiveControl::Ignore => {}
                },
                Err(message) => return Err(self.error_at(hash, message)),
            },
            "undef" => {
                if let Some((_, macro_name)) = first_significant(rest)
                    && self.hooks.on_directive(DirectiveKind::Undef, &macro_name.value) == DirectiveControl::Expand
                {
                    self.macros.undef(&macro_name.value);
                }
            }
            "include" | "include_next" => self.include(hash, rest)?,
            "pragma" => {
                if first_significant(rest).is_some_and(|(_, t)| t.value == "once") {
                    let path = file.path.clone();
                    self.once.insert(path);
                }
            }
            "error" => warn!("{}:{}: #error ignored", hash.source, hash.line),
            _ => {}
        }
        Ok(())
    }

    fn push_cond(&mut self, parent: bool, allow_emit: bool) {
        if let Some(file) = self.files.last_mut() {
            file.conds.push(CondFrame {
                allow_emit,
                // a skipped parent means no branch may be taken
                taken: allow_emit || !parent,
                saw_else: false,
            });
        }
    }

    /// `(taken, saw_else, parent_emitting)` of the innermost conditional.
    fn current_cond(&self, hash: &Token, directive: &str) -> Result<(bool, bool, bool)> {
        let file = self.files.last();
        let Some((frame, parents)) = file.and_then(|f| f.conds.split_last()) else {
            return Err(self.error_at(hash, format!("{directive} without #if")));
        };
        let parent = parents.last().is_none_or(|p| p.allow_emit);
        Ok((frame.taken, frame.saw_else, parent))
    }

    fn evaluate(&mut self, hash: &Token, tokens: &[Token]) -> Result<bool> {
        let mut resolved = Vec::new();
        let mut iter = tokens.iter();
        while let Some(token) = iter.next() {
            if !token.is_identifier("defined") {
                resolved.push(PTok::plain(token.clone()));
                continue;
            }
            let mut name = None;
            let mut parenthesized = false;
            while let Some(next) = iter.next() {
                match next.kind {
                    TokenKind::Whitespace => {}
                    TokenKind::LParen if !parenthesized && name.is_none() => parenthesized = true,
                    TokenKind::Identifier if name.is_none() => {
                        name = Some(next.value.clone());
                        if !parenthesized {
                            break;
                        }
                    }
                    TokenKind::RParen if parenthesized => break,
                    _ => return Err(self.error_at(hash, "invalid use of defined")),
                }
            }
            let defined = name.is_some_and(|n| self.macros.is_defined(&n));
            resolved.push(PTok::plain(Token::new(
                TokenKind::Number,
                if defined { "1" } else { "0" },
                token.source.clone(),
                token.line,
                token.column,
            )));
        }

        let expanded: Vec<Token> = self
            .expand_isolated(resolved)?
            .into_iter()
            .map(|ptok| ptok.token)
            .collect();
        match expr::evaluate(&expanded) {
            Ok(value) => Ok(value != 0),
            Err(message) => {
                warn!("{}:{}: cannot evaluate #if: {message}", hash.source, hash.line);
                Ok(false)
            }
        }
    }

    fn include(&mut self, hash: &Token, rest: &[Token]) -> Result<()> {
        let mut operand: Vec<Token> = rest.iter().filter(|t| !t.is_whitespace()).cloned().collect();
        if operand.first().is_some_and(|t| t.kind == TokenKind::Identifier) {
            operand = self
                .expand_isolated(operand.into_iter().map(PTok::plain).collect())?
                .into_iter()
                .map(|p| p.token)
                .filter(|t| !t.is_whitespace())
                .collect();
        }

        let (name, quoted) = match operand.first() {
            Some(token) if token.kind == TokenKind::String => (token.unquoted().to_string(), true),
            Some(token) if token.value == "<" => {
                let name: String = operand[1..]
                    .iter()
                    .take_while(|t| t.value != ">")
                    .map(|t| t.value.as_str())
                    .collect();
                (name, false)
            }
            _ => return Err(self.error_at(hash, "#include expects \"FILENAME\" or <FILENAME>")),
        };

        match self.resolve_include(&name, quoted) {
            Some(path) => self.enter_file(path),
            None => {
                debug!("{}:{}: include {name} not found", hash.source, hash.line);
                Ok(())
            }
        }
    }

    fn resolve_include(&self, name: &str, quoted: bool) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| normalize_path(candidate));
        }
        let current_dir = self
            .files
            .last()
            .and_then(|f| f.path.parent().map(Path::to_path_buf));
        let local = if quoted { current_dir } else { None };
        local
            .into_iter()
            .chain(self.include_dirs.iter().cloned())
            .map(|dir| normalize_path(&dir.join(name)))
            .find(|path| path.is_file())
    }
}

impl<H: PreprocessorHooks> TokenSource for Preprocessor<H> {
    fn next_token(&mut self) -> Result<Option<Token>> {
        Ok(self.next_expanded()?.map(|ptok| ptok.token))
    }
}

/// `#arg`: spelling of the argument with whitespace runs collapsed.
fn stringify(arg: &[PTok]) -> String {
    let mut text = String::from("\"");
    let mut pending_space = false;
    for ptok in arg {
        if ptok.token.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && text.len() > 1 {
            text.push(' ');
        }
        pending_space = false;
        match ptok.token.kind {
            TokenKind::String | TokenKind::Char => {
                for c in ptok.token.value.chars() {
                    if c == '"' || c == '\\' {
                        text.push('\\');
                    }
                    text.push(c);
                }
            }
            _ => text.push_str(&ptok.token.value),
        }
    }
    text.push('"');
    text
}

/// Apply `##` operators left in the substituted body.
fn paste_tokens(tokens: Vec<PTok>, site: &Token) -> Vec<PTok> {
    let mut out: Vec<PTok> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(ptok) = iter.next() {
        if !(ptok.token.kind == TokenKind::HashHash && ptok.hide.is_empty()) {
            out.push(ptok);
            continue;
        }
        // left operand: last significant token, or a placemarker
        while out.last().is_some_and(|p| p.token.kind == TokenKind::Whitespace && !p.token.value.is_empty()) {
            out.pop();
        }
        let left = out.pop();
        while iter.peek().is_some_and(|p| p.token.kind == TokenKind::Whitespace && !p.token.value.is_empty()) {
            iter.next();
        }
        let right = iter.next();

        let left_text = left.as_ref().map_or("", |p| p.token.value.as_str());
        let right_text = right.as_ref().map_or("", |p| p.token.value.as_str());
        // `, ## __VA_ARGS__` with empty arguments drops the comma
        if left_text == "," && right_text.is_empty() {
            continue;
        }
        let text = format!("{left_text}{right_text}");
        if text.is_empty() {
            continue;
        }
        let lexed = lexer::lex(&text, &site.source);
        let hide = left.map(|p| p.hide).or(right.map(|p| p.hide)).unwrap_or_default();
        for mut token in lexed {
            token.line = site.line;
            token.column = site.column;
            out.push(PTok {
                token,
                hide: hide.clone(),
            });
        }
    }
    out.retain(|p| !(p.token.kind == TokenKind::Whitespace && p.token.value.is_empty()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::{ScanHooks, Scanner};
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn expand_text(dir: &TempDir, content: &str) -> String {
        let path = write(dir, "main.c", content);
        let mut pp = Preprocessor::new(ScanHooks::default());
        pp.add_source(&path);
        let mut out = Vec::new();
        while let Some(token) = pp.next_token().unwrap() {
            if !token.is_whitespace() {
                out.push(token.value);
            }
        }
        out.join(" ")
    }

    #[test]
    fn test_marker_expansion() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            expand_text(&dir, "SPGM(hello)"),
            r#"__INTERNAL_SPGM_FLASH_STRING_START ( "hello" , , __INTERNAL_SPGM_FLASH_STRING_END )"#
        );
        assert_eq!(
            expand_text(&dir, r#"PROGMEM_STRING_DEF(hello, "Hello World");"#),
            r#"__INTERNAL_DEFINE_FLASH_STRING_START ( "hello" , "Hello World" , __INTERNAL_DEFINE_FLASH_STRING_END ) ;"#
        );
    }

    #[test]
    fn test_variadic_arguments_keep_commas() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            expand_text(&dir, r#"FSPGM(msg, de: "Hallo", fr: "Bonjour")"#),
            r#"__INTERNAL_SPGM_FLASH_STRING_START ( "msg" , de : "Hallo" , fr : "Bonjour" , __INTERNAL_SPGM_FLASH_STRING_END )"#
        );
    }

    #[test]
    fn test_expansion_takes_invocation_position() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "main.c", "int a;\n\n   SPGM(x);\n");
        let mut pp = Preprocessor::new(ScanHooks::default());
        pp.add_source(&path);
        let mut marker = None;
        while let Some(token) = pp.next_token().unwrap() {
            if token.value.starts_with("__INTERNAL_") {
                marker = Some(token);
                break;
            }
        }
        let marker = marker.unwrap();
        assert_eq!((marker.line, marker.column), (3, 4));
    }

    #[test]
    fn test_object_and_function_macros() {
        let dir = TempDir::new().unwrap();
        let text = "#define A 1\n#define ADD(x, y) (x + y)\n#define NAME(n) n ## _id\nADD(A, 2) NAME(foo)";
        assert_eq!(expand_text(&dir, text), "( 1 + 2 ) foo_id");
    }

    #[test]
    fn test_self_reference_does_not_loop() {
        let dir = TempDir::new().unwrap();
        assert_eq!(expand_text(&dir, "#define foo foo + 1\nfoo"), "foo + 1");
    }

    #[test]
    fn test_function_macro_without_parens_is_plain() {
        let dir = TempDir::new().unwrap();
        assert_eq!(expand_text(&dir, "#define F(x) x\nF;"), "F ;");
    }

    #[test]
    fn test_conditionals() {
        let dir = TempDir::new().unwrap();
        let text = "\
#define DEBUG 1
#if DEBUG && defined(DEBUG)
yes
#else
no
#endif
#ifdef MISSING
a
#elif 2 > 1
b
#else
c
#endif
#ifndef MISSING
#if 0
x
#endif
d
#endif
";
        assert_eq!(expand_text(&dir, text), "yes b d");
    }

    #[test]
    fn test_skipped_branch_is_not_scanned() {
        let dir = TempDir::new().unwrap();
        let text = "#if 0\n#if 1\nSPGM(a)\n#else\nSPGM(b)\n#endif\n#endif\n";
        assert_eq!(expand_text(&dir, text), "");
    }

    #[test]
    fn test_unterminated_conditional() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "main.c", "#if 1\nx\n");
        let mut pp = Preprocessor::new(ScanHooks::default());
        pp.add_source(&path);
        let mut result = Ok(None);
        for _ in 0..10 {
            result = pp.next_token();
            if !matches!(result, Ok(Some(_))) {
                break;
            }
        }
        assert!(matches!(result, Err(SpgmError::Preprocess { .. })));
    }

    #[test]
    fn test_marker_macros_cannot_be_shadowed() {
        let dir = TempDir::new().unwrap();
        let text = "#define SPGM(name, ...) PROGMEM_STRING_ID(name)\n#undef FSPGM\nFSPGM(x)";
        assert!(expand_text(&dir, text).starts_with("__INTERNAL_SPGM_FLASH_STRING_START"));
    }

    #[test]
    fn test_includes_are_scanned_once() {
        let dir = TempDir::new().unwrap();
        write(&dir, "include/strings.h", "SPGM(shared)\n");
        let a = write(&dir, "src/a.c", "#include \"strings.h\"\nSPGM(a)\n");
        let b = write(&dir, "src/b.c", "#include <strings.h>\n#include \"missing.h\"\n");

        let mut pp = Preprocessor::new(ScanHooks::default());
        pp.add_include_dir(dir.path().join("include"));
        pp.add_source(&a);
        pp.add_source(&b);
        let items = Scanner::scan(&mut pp).unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["shared", "a"]);

        let opened = pp.into_hooks().into_opened_files();
        assert_eq!(opened.len(), 3);
        let header = items[0].location().unwrap();
        assert!(header.source.ends_with("strings.h"));
        assert_eq!(header.line, 1);
    }

    #[test]
    fn test_pragma_once() {
        let dir = TempDir::new().unwrap();
        write(&dir, "once.h", "#pragma once\nSPGM(once)\n");
        let path = write(&dir, "main.c", "#include \"once.h\"\n#include \"once.h\"\n");
        let mut pp = Preprocessor::new(ScanHooks::default());
        pp.add_source(&path);
        assert_eq!(Scanner::scan(&mut pp).unwrap().len(), 1);
    }

    #[test]
    fn test_command_line_defines() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "main.c", "#if HAVE_WIFI\nSPGM(wifi)\n#endif\nSPGM(VERSION_NAME)\n");
        let mut pp = Preprocessor::new(ScanHooks::default());
        pp.define_value("HAVE_WIFI", None).unwrap();
        pp.define_value("VERSION_NAME", Some("release")).unwrap();
        pp.add_source(&path);
        let names: Vec<String> = Scanner::scan(&mut pp).unwrap().into_iter().map(|i| i.name).collect();
        // `#name` stringifies the argument as written
        assert_eq!(names, vec!["wifi", "VERSION_NAME"]);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("src/./lib/../a.c")), PathBuf::from("src/a.c"));
        assert_eq!(normalize_path(Path::new("../x.h")), PathBuf::from("../x.h"));
    }

    #[test]
    fn test_stringify_escapes_literals() {
        let source: Rc<str> = Rc::from("t.c");
        let arg: Vec<PTok> = lexer::lex(r#"say  "hi""#, &source).into_iter().map(PTok::plain).collect();
        assert_eq!(stringify(&arg), r#""say \"hi\"""#);
    }
}
