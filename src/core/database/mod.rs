//! Persistent, sharded item database shared by every target of a build.
//!
//! `database.bin` holds one shard per target plus the table of explicitly
//! defined values and the fingerprints of each target's files. A run owns
//! only its own shard: [`Database::write`] re-reads the file under the lock
//! and replaces nothing but the current target's data, so concurrent builds
//! of other targets are never lost.

pub mod build_db;
pub mod lock;

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    hash::Hasher,
    io::Write,
    path::{Path, PathBuf},
};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::{
    error::{Result, SpgmError},
    fingerprint::TargetRecord,
    i18n::Translations,
    item::Item,
    location::{DefinitionKind, Location},
};

pub use build_db::{BUILD_DATABASE_FILE, BuildDatabase};
pub use lock::{DatabaseLock, LockOptions};

pub const DATABASE_FILE: &str = "database.bin";
pub const DEBUG_FILE: &str = "_debug.json";
pub const DATABASE_VERSION: u32 = 2;

/// One scanned occurrence as persisted in a shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    pub name: String,
    pub location: Location,
    pub value: Option<String>,
    /// Tag expression (`de;at`) to translation.
    pub translations: BTreeMap<String, String>,
}

impl StoredItem {
    fn from_item(item: &Item, location: &Location) -> Self {
        Self {
            name: item.name.clone(),
            location: location.clone(),
            value: item.value.clone(),
            translations: item
                .translations
                .entries()
                .into_iter()
                .map(|entry| (entry.tag_expr(), entry.value))
                .collect(),
        }
    }

    /// Shard key: `source:line:column:KIND:name`.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.location.source, self.location.line, self.location.column, self.location.kind, self.name
        )
    }

    pub fn to_item(&self) -> Result<Item> {
        let mut item = Item::from_source(self.name.clone(), self.location.clone());
        item.value = self.value.clone();
        let mut translations = Translations::new();
        for (tag_expr, value) in &self.translations {
            translations.set(tag_expr, value)?;
        }
        item.translations = translations;
        Ok(item)
    }
}

/// An explicit value and the target that contributed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinedEntry {
    pub target: String,
    pub item: StoredItem,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseFile {
    pub version: u32,
    pub targets: BTreeMap<String, TargetRecord>,
    pub defined: BTreeMap<String, DefinedEntry>,
    pub shards: BTreeMap<String, BTreeMap<String, StoredItem>>,
}

impl DatabaseFile {
    fn empty() -> Self {
        Self {
            version: DATABASE_VERSION,
            ..Self::default()
        }
    }
}

/// Target id derived from the sorted list of its source roots.
pub fn target_id<S: AsRef<str>>(sources: &[S]) -> String {
    let mut sorted: Vec<&str> = sources.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    let mut hasher = FxHasher::default();
    for source in sorted {
        hasher.write(source.as_bytes());
        hasher.write_u8(b',');
    }
    format!("{:016x}", hasher.finish())
}

pub struct Database {
    dir: PathBuf,
    target: String,
    lock_options: LockOptions,
    data: DatabaseFile,
}

impl Database {
    pub fn new(dir: impl Into<PathBuf>, target: impl Into<String>, lock_options: LockOptions) -> Self {
        Self {
            dir: dir.into(),
            target: target.into(),
            lock_options,
            data: DatabaseFile::empty(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join(DATABASE_FILE)
    }

    pub fn data(&self) -> &DatabaseFile {
        &self.data
    }

    /// Load the database under the lock.
    pub fn read(&mut self) -> Result<()> {
        let _lock = DatabaseLock::acquire(&self.dir, &self.lock_options)?;
        self.data = load(&self.file_path())?;
        debug!(
            "database has {} targets and {} defined names",
            self.data.targets.len(),
            self.data.defined.len()
        );
        Ok(())
    }

    /// Merge this target's data into the file on disk and replace it atomically.
    pub fn write(&mut self) -> Result<()> {
        let _lock = DatabaseLock::acquire(&self.dir, &self.lock_options)?;
        let path = self.file_path();

        let mut merged = load(&path)?;
        merged.defined.retain(|_, entry| entry.target != self.target);
        for (name, entry) in &self.data.defined {
            if entry.target == self.target {
                merged.defined.entry(name.clone()).or_insert_with(|| entry.clone());
            }
        }
        match self.data.targets.get(&self.target) {
            Some(record) => {
                merged.targets.insert(self.target.clone(), record.clone());
            }
            None => {
                merged.targets.remove(&self.target);
            }
        }
        match self.data.shards.get(&self.target) {
            Some(shard) => {
                merged.shards.insert(self.target.clone(), shard.clone());
            }
            None => {
                merged.shards.remove(&self.target);
            }
        }

        let bytes = bincode::serde::encode_to_vec(&merged, bincode::config::standard())
            .map_err(|source| SpgmError::DatabaseEncode {
                path: path.clone(),
                source,
            })?;
        write_atomic(&path, &bytes)?;
        self.data = merged;
        self.write_debug_json()?;
        Ok(())
    }

    /// Drop everything the current target contributed.
    pub fn flush(&mut self) {
        self.data.shards.remove(&self.target);
        let target = &self.target;
        self.data.defined.retain(|_, entry| &entry.target != target);
    }

    /// Record one scanned occurrence in the current shard.
    ///
    /// Two items at the same location, of the same kind and name are a
    /// [`SpgmError::DuplicateDefinition`].
    pub fn add(&mut self, item: &Item) -> Result<()> {
        for location in item.locations.iter() {
            let stored = StoredItem::from_item(item, location);
            let shard = self.data.shards.entry(self.target.clone()).or_default();
            let key = stored.key();
            if shard.contains_key(&key) {
                return Err(SpgmError::DuplicateDefinition {
                    location: location.clone(),
                    name: item.name.clone(),
                });
            }
            if stored.value.is_some() && !self.data.defined.contains_key(&item.name) {
                self.data.defined.insert(
                    item.name.clone(),
                    DefinedEntry {
                        target: self.target.clone(),
                        item: stored.clone(),
                    },
                );
            }
            shard.insert(key, stored);
        }
        Ok(())
    }

    pub fn add_items(&mut self, items: &[Item]) -> Result<()> {
        items.iter().try_for_each(|item| self.add(item))
    }

    pub fn target_record(&self) -> Option<&TargetRecord> {
        self.data.targets.get(&self.target)
    }

    pub fn set_target_record(&mut self, record: TargetRecord) {
        self.data.targets.insert(self.target.clone(), record);
    }

    /// Stored items of every shard as `FromSource` items, in shard order.
    ///
    /// `defined` entries whose target shard is gone are included as well so
    /// that their value keeps participating in merges.
    pub fn items(&self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for shard in self.data.shards.values() {
            for stored in shard.values() {
                items.push(stored.to_item()?);
            }
        }
        for entry in self.data.defined.values() {
            if !self.data.shards.contains_key(&entry.target) {
                items.push(entry.item.to_item()?);
            }
        }
        Ok(items)
    }

    /// Like [`Database::items`], but other targets' occurrences in
    /// `rescanned` files are dropped: the current shard supersedes them.
    pub fn items_superseding(&self, rescanned: &BTreeSet<String>) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for (target, shard) in &self.data.shards {
            for stored in shard.values() {
                if target != &self.target && rescanned.contains(&stored.location.source) {
                    continue;
                }
                items.push(stored.to_item()?);
            }
        }
        for entry in self.data.defined.values() {
            if !self.data.shards.contains_key(&entry.target) && !rescanned.contains(&entry.item.location.source) {
                items.push(entry.item.to_item()?);
            }
        }
        Ok(items)
    }

    /// Whether any shard uses `name` with `SPGM`.
    pub fn is_used(&self, name: &str) -> bool {
        self.data.shards.values().flat_map(BTreeMap::values).any(|stored| {
            stored.name == name && stored.location.kind == DefinitionKind::Spgm
        })
    }

    /// Whether any shard defines `name` with `PROGMEM_STRING_DEF`.
    pub fn is_static(&self, name: &str) -> bool {
        self.data.shards.values().flat_map(BTreeMap::values).any(|stored| {
            stored.name == name && stored.location.kind == DefinitionKind::Define
        })
    }

    /// Human readable projection, written next to the database; never read.
    fn write_debug_json(&self) -> Result<()> {
        let path = self.dir.join(DEBUG_FILE);
        let mut unique: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for stored in self.data.shards.values().flat_map(BTreeMap::values) {
            unique
                .entry(&stored.name)
                .or_default()
                .push(stored.location.describe());
        }
        let view = DebugView {
            version: self.data.version,
            targets: &self.data.targets,
            defined: &self.data.defined,
            unique,
            shards: &self.data.shards,
        };
        let json = serde_json::to_string_pretty(&view).map_err(|source| SpgmError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json + "\n").map_err(|err| SpgmError::io(&path, err))
    }
}

#[derive(Serialize)]
struct DebugView<'a> {
    version: u32,
    targets: &'a BTreeMap<String, TargetRecord>,
    defined: &'a BTreeMap<String, DefinedEntry>,
    unique: BTreeMap<&'a str, Vec<String>>,
    shards: &'a BTreeMap<String, BTreeMap<String, StoredItem>>,
}

/// Read a database file; missing files and other schema versions are empty.
fn load(path: &Path) -> Result<DatabaseFile> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(DatabaseFile::empty()),
        Err(err) => return Err(SpgmError::io(path, err)),
    };
    if bytes.is_empty() {
        return Ok(DatabaseFile::empty());
    }
    // The version is the leading field, so it decodes even if the rest changed.
    let (version, _): (u32, usize) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
        .map_err(|source| SpgmError::DatabaseDecode {
            path: path.to_path_buf(),
            source,
        })?;
    if version != DATABASE_VERSION {
        warn!(
            "{} has version {}, expected {}; starting with an empty database",
            path.display(),
            version,
            DATABASE_VERSION
        );
        return Ok(DatabaseFile::empty());
    }
    let (data, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(|source| {
        SpgmError::DatabaseDecode {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(data)
}

/// Write through a temporary file in the same directory and rename it into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|err| SpgmError::io(dir, err))?;
    let mut file = NamedTempFile::new_in(dir).map_err(|err| SpgmError::io(dir, err))?;
    file.write_all(bytes).map_err(|err| SpgmError::io(file.path(), err))?;
    file.persist(path).map_err(|err| SpgmError::io(path, err.error))?;
    Ok(())
}
