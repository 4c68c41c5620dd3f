//! Callbacks the preprocessor consults before applying a directive or
//! descending into an include.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use glob::Pattern;
use tracing::debug;

/// Macro names the scanned code may not redefine.
pub const RESERVED_MACROS: &[&str] = &[
    "SPGM",
    "FSPGM",
    "PROGMEM_STRING_DEF",
    "AUTO_INIT_SPGM",
    "AUTO_STRING_DEF",
    "FLASH_STRING_GENERATOR_AUTO_INIT",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Define,
    Undef,
}

/// Answer of a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveControl {
    /// Leave the directive or include unapplied.
    PassThrough,
    /// Apply it normally.
    Expand,
    /// Drop it silently.
    Ignore,
}

pub trait PreprocessorHooks {
    fn on_directive(&mut self, kind: DirectiveKind, name: &str) -> DirectiveControl;

    fn on_file_open(&mut self, path: &Path) -> DirectiveControl;
}

/// Hooks that keep the marker macros intact and include every file once.
#[derive(Debug, Default)]
pub struct ScanHooks {
    skip_includes: Vec<Pattern>,
    opened: BTreeSet<PathBuf>,
}

impl ScanHooks {
    pub fn new(skip_includes: Vec<Pattern>) -> Self {
        Self {
            skip_includes,
            opened: BTreeSet::new(),
        }
    }

    /// Every file opened so far, sorted.
    pub fn opened_files(&self) -> &BTreeSet<PathBuf> {
        &self.opened
    }

    pub fn into_opened_files(self) -> BTreeSet<PathBuf> {
        self.opened
    }

    fn is_skipped(&self, path: &Path) -> bool {
        let file_name = path.file_name().map(Path::new);
        self.skip_includes.iter().any(|pattern| {
            pattern.matches_path(path) || file_name.is_some_and(|name| pattern.matches_path(name))
        })
    }
}

impl PreprocessorHooks for ScanHooks {
    fn on_directive(&mut self, kind: DirectiveKind, name: &str) -> DirectiveControl {
        if RESERVED_MACROS.contains(&name) {
            debug!("keeping marker macro {name}, ignoring {kind:?}");
            return DirectiveControl::PassThrough;
        }
        DirectiveControl::Expand
    }

    fn on_file_open(&mut self, path: &Path) -> DirectiveControl {
        if self.is_skipped(path) {
            debug!("skipping include {}", path.display());
            return DirectiveControl::PassThrough;
        }
        if !self.opened.insert(path.to_path_buf()) {
            return DirectiveControl::Ignore;
        }
        DirectiveControl::Expand
    }
}
