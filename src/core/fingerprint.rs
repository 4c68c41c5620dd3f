//! File change detection for incremental generation.
//!
//! A target records a fingerprint for every file the preprocessor opened.
//! The next run recomputes them and skips generation when nothing changed.

use std::{
    collections::BTreeMap,
    fs,
    hash::Hasher,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use enum_dispatch::enum_dispatch;
use rayon::prelude::*;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SpgmError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fingerprint {
    Digest(u64),
    SizeMtime { size: u64, secs: u64, nanos: u32 },
}

/// Strategy for fingerprinting a single file.
#[enum_dispatch]
pub trait FileFingerprint {
    fn compute(&self, path: &Path) -> Result<Fingerprint>;
}

/// Hash of the file content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHash;

impl FileFingerprint for ContentHash {
    fn compute(&self, path: &Path) -> Result<Fingerprint> {
        let content = fs::read(path).map_err(|err| SpgmError::io(path, err))?;
        let mut hasher = FxHasher::default();
        hasher.write(&content);
        hasher.write_usize(content.len());
        Ok(Fingerprint::Digest(hasher.finish()))
    }
}

/// File size and modification time; cheaper, but touched files count as changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeMtime;

impl FileFingerprint for SizeMtime {
    fn compute(&self, path: &Path) -> Result<Fingerprint> {
        let metadata = fs::metadata(path).map_err(|err| SpgmError::io(path, err))?;
        let modified = metadata.modified().map_err(|err| SpgmError::io(path, err))?;
        let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
        Ok(Fingerprint::SizeMtime {
            size: metadata.len(),
            secs: since_epoch.as_secs(),
            nanos: since_epoch.subsec_nanos(),
        })
    }
}

#[enum_dispatch(FileFingerprint)]
#[derive(Debug, Clone, Copy)]
pub enum FingerprintStrategy {
    ContentHash,
    SizeMtime,
}

impl FingerprintStrategy {
    /// Strategy for the `fingerprint` config value (`hash` or `mtime`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hash" => Some(ContentHash.into()),
            "mtime" => Some(SizeMtime.into()),
            _ => None,
        }
    }
}

impl Default for FingerprintStrategy {
    fn default() -> Self {
        ContentHash.into()
    }
}

/// Fingerprints of every file that contributed to one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub files: BTreeMap<String, Fingerprint>,
    /// Digest of the options the outputs were generated with.
    #[serde(default)]
    pub inputs: u64,
}

impl TargetRecord {
    /// Fingerprint `files` in parallel.
    pub fn compute(strategy: &FingerprintStrategy, files: &[PathBuf]) -> Result<Self> {
        let results: Vec<Result<(String, Fingerprint)>> = files
            .par_iter()
            .map(|path| {
                let fingerprint = strategy.compute(path)?;
                Ok((path.to_string_lossy().into_owned(), fingerprint))
            })
            .collect();

        let mut record = Self::default();
        for result in results {
            let (path, fingerprint) = result?;
            record.files.insert(path, fingerprint);
        }
        Ok(record)
    }

    pub fn with_inputs(mut self, inputs: u64) -> Self {
        self.inputs = inputs;
        self
    }

    /// Files whose fingerprint changed or that can no longer be read.
    pub fn changed_files(&self, strategy: &FingerprintStrategy) -> Vec<String> {
        let changed: Vec<String> = self
            .files
            .par_iter()
            .filter(|(path, previous)| {
                strategy
                    .compute(Path::new(path))
                    .map_or(true, |current| &current != *previous)
            })
            .map(|(path, _)| path.clone())
            .collect();
        changed
    }

    /// An empty record was never generated and is always stale.
    pub fn is_stale(&self, strategy: &FingerprintStrategy) -> bool {
        self.files.is_empty() || !self.changed_files(strategy).is_empty()
    }
}
