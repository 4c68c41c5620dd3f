//! Last known locations of every name, across all targets and builds.
//!
//! Stored as `build_database.json`: `name -> [[source, line, kind, column], ...]`.
//! A name whose locations all disappeared from rescanned files is kept with
//! tombstone records so later runs can report it as removed.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use tracing::debug;

use crate::core::{
    error::{Result, SpgmError},
    item::{Item, ItemOrigin},
    location::{DefinitionKind, LocationRecord, live_locations},
};

pub const BUILD_DATABASE_FILE: &str = "build_database.json";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildDatabase {
    entries: BTreeMap<String, Vec<LocationRecord>>,
}

impl BuildDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing or empty file is an empty database.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(err) => return Err(SpgmError::io(path, err)),
        };
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        let entries = serde_json::from_str(&content).map_err(|source| SpgmError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { entries })
    }

    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(&self.entries).map_err(|source| SpgmError::Json {
            path: BUILD_DATABASE_FILE.into(),
            source,
        })?;
        json.push('\n');
        Ok(json)
    }

    pub fn get(&self, name: &str) -> Option<&[LocationRecord]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as items: live locations become `FromBuildDatabase` items,
    /// fully tombstoned names become `Removed` items.
    pub fn items(&self) -> Vec<Item> {
        self.entries
            .iter()
            .map(|(name, records)| {
                let locations = live_locations(records);
                let kind = records.first().map_or(DefinitionKind::Spgm, |record| record.kind);
                let origin = if locations.is_empty() {
                    ItemOrigin::Removed
                } else {
                    ItemOrigin::FromBuildDatabase
                };
                let mut item = Item::new(name.clone(), kind, origin);
                item.locations = locations;
                item
            })
            .collect()
    }

    /// Replace what is known about `rescanned` files with `items`.
    ///
    /// `items` are the source items of every target. Locations in files that
    /// were not rescanned are kept as they are. Tombstones live for one
    /// update; names still gone after that are forgotten.
    pub fn update<'a>(&mut self, items: impl IntoIterator<Item = &'a Item>, rescanned: &BTreeSet<String>) {
        let mut fresh: BTreeMap<String, BTreeSet<LocationRecord>> = BTreeMap::new();
        for item in items {
            let records = fresh.entry(item.name.clone()).or_default();
            records.extend(item.locations.iter().map(|location| location.to_record()));
        }

        self.entries
            .retain(|name, records| fresh.contains_key(name) || !records.iter().all(LocationRecord::is_tombstone));

        for (name, records) in self.entries.iter_mut() {
            if records.iter().all(LocationRecord::is_tombstone) {
                continue;
            }
            let (gone, kept): (Vec<LocationRecord>, Vec<LocationRecord>) = records
                .drain(..)
                .partition(|record| !record.is_tombstone() && rescanned.contains(&record.source));
            *records = kept.into_iter().filter(|record| !record.is_tombstone()).collect();
            if records.is_empty() && !fresh.contains_key(name) {
                debug!("{} no longer exists in source", name);
                *records = gone
                    .iter()
                    .filter_map(LocationRecord::to_location)
                    .map(|location| LocationRecord::tombstone(&location))
                    .collect();
            }
        }

        for (name, records) in fresh {
            let entry = self.entries.entry(name).or_default();
            entry.retain(|record| !record.is_tombstone());
            let mut merged: BTreeSet<LocationRecord> = entry.drain(..).collect();
            merged.extend(records);
            entry.extend(merged);
        }
    }
}
