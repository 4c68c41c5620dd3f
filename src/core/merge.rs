//! Folding scanned, persisted and configured items into one table.
//!
//! ## Phases
//!
//! 1. Source items of the same name are merged into the first occurrence.
//! 2. Config file items absorb the historical locations of the build database.
//! 3. Source items absorb the config file items.
//!
//! Donors are removed from the working list after each phase. Conflicting
//! explicit values between source items are detected before any merging.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::core::{
    error::{Result, SpgmError},
    item::{Item, ItemOrigin},
    location::{DefinitionKind, Location},
};

/// Check source items for names defined with different values or translations.
///
/// Config and build database items are not considered.
pub fn detect_conflicts(items: &[Item]) -> Result<()> {
    let mut values: BTreeMap<&str, &Item> = BTreeMap::new();
    let mut translations: BTreeMap<(&str, String), (&Item, String)> = BTreeMap::new();

    for item in items.iter().filter(|item| item.origin == ItemOrigin::FromSource) {
        if let Some(value) = &item.value {
            match values.get(item.name.as_str()) {
                Some(first) if first.value.as_ref() != Some(value) => {
                    return Err(SpgmError::RedefinitionConflict {
                        name: item.name.clone(),
                        first: location_of(first),
                        second: location_of(item),
                        first_value: first.value.clone().unwrap_or_default(),
                        second_value: value.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    values.insert(&item.name, item);
                }
            }
        }

        for entry in item.translations.entries() {
            for tag in &entry.tags {
                let key = (item.name.as_str(), tag.clone());
                match translations.get(&key) {
                    Some((first, first_value)) if *first_value != entry.value => {
                        return Err(SpgmError::TranslationConflict {
                            name: item.name.clone(),
                            language: tag.clone(),
                            first: location_of(first),
                            second: location_of(item),
                            first_value: first_value.clone(),
                            second_value: entry.value.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        translations.insert(key, (item, entry.value.clone()));
                    }
                }
            }
        }
    }
    Ok(())
}

fn location_of(item: &Item) -> Location {
    item.location()
        .cloned()
        .unwrap_or_else(|| Location::new("<unknown>", 0, 0, item.definition_kind))
}

/// Merge every item of the same name into the first one, in input order.
fn merge_by_name(items: Vec<Item>) -> BTreeMap<String, Item> {
    let mut merged: BTreeMap<String, Item> = BTreeMap::new();
    for mut item in items {
        match merged.get_mut(&item.name) {
            Some(receiver) => receiver.merge(&mut item),
            None => {
                merged.insert(item.name.clone(), item);
            }
        }
    }
    merged
}

/// The merged name table of one generation run.
#[derive(Debug, Clone, Default)]
pub struct MergedTable {
    items: BTreeMap<String, Item>,
}

impl MergedTable {
    /// Run conflict detection and the three merge phases.
    ///
    /// `source` holds the items of every target (the current scan included),
    /// `config` the items read back from the config file and `history` the
    /// build database entries.
    pub fn build(source: Vec<Item>, config: Vec<Item>, history: Vec<Item>) -> Result<Self> {
        detect_conflicts(&source)?;

        let source: Vec<Item> = source.into_iter().filter(|item| !item.is_removed()).collect();
        let mut items = merge_by_name(source);

        // Phase 2: config <- build database
        let mut history: BTreeMap<String, Item> = history
            .into_iter()
            .filter(|item| !item.is_removed())
            .map(|item| (item.name.clone(), item))
            .collect();
        let mut config = merge_by_name(config.into_iter().filter(|item| !item.is_removed()).collect());
        for (name, config_item) in config.iter_mut() {
            if let Some(mut donor) = history.remove(name) {
                config_item.merge(&mut donor);
            }
        }
        debug!("{} build database entries without config counterpart", history.len());

        // Phase 3: source <- config
        for (name, item) in items.iter_mut() {
            if let Some(mut donor) = config.remove(name) {
                item.merge(&mut donor);
            }
        }

        for (name, item) in config {
            info!("{} is defined in the config file but not used", name);
            items.insert(name, item);
        }

        for item in items.values_mut() {
            item.finalize_auto_value();
        }

        Ok(Self { items })
    }

    pub fn get(&self, name: &str) -> Option<&Item> {
        self.items.get(name)
    }

    /// Items sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn is_declared(item: &Item, add_unused: bool) -> bool {
        item.use_counter() > 0
            || item.is_static()
            || item.locations.contains_kind(DefinitionKind::AutoInit)
            || add_unused
    }

    /// Names that get a `PROGMEM_STRING_DECL`.
    pub fn declarations(&self, add_unused: bool) -> Vec<&Item> {
        self.iter().filter(|item| Self::is_declared(item, add_unused)).collect()
    }

    /// Declared names whose storage is generated, i.e. not defined in source.
    pub fn definitions(&self, add_unused: bool) -> Vec<&Item> {
        self.iter()
            .filter(|item| Self::is_declared(item, add_unused))
            .filter(|item| !item.is_static() && !item.locations.contains_kind(DefinitionKind::AutoInit))
            .collect()
    }

    /// Names defined with `PROGMEM_STRING_DEF` in source.
    pub fn statics(&self) -> Vec<&Item> {
        self.iter().filter(|item| item.is_static()).collect()
    }

    /// Generated definitions that fell back to the beautified name.
    pub fn auto_defined(&self, add_unused: bool) -> Vec<&Item> {
        self.definitions(add_unused)
            .into_iter()
            .filter(|item| item.value.is_none())
            .collect()
    }

    /// Names only known from the config file.
    pub fn unused(&self) -> Vec<&Item> {
        self.iter()
            .filter(|item| item.origin == ItemOrigin::FromConfig)
            .collect()
    }
}
