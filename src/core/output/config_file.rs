//! The JSON config/translation file.
//!
//! Every merged name is written with its value, translations and use count.
//! The file is meant to be edited: values entered here are read back as
//! `FromConfig` items on the next run and fill in names that have no value in
//! source.
//!
//! ```json
//! {
//!   "greeting": { "auto": "greeting", "use_counter": 1 },
//!   "msg": { "default": "Message", "i18n": { "at;de": "Nachricht" }, "use_counter": 2 }
//! }
//! ```

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::core::{
    error::{Result, SpgmError},
    i18n::Translations,
    item::{Item, ItemOrigin},
    location::DefinitionKind,
    merge::MergedTable,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<String>,
    #[serde(default, skip_serializing_if = "Translations::is_empty")]
    pub i18n: Translations,
    #[serde(default)]
    pub use_counter: usize,
}

impl ConfigEntry {
    pub fn from_item(item: &Item) -> Self {
        Self {
            default: item.value.clone(),
            auto: if item.value.is_none() {
                item.auto_value.clone()
            } else {
                None
            },
            i18n: item.translations.clone(),
            use_counter: item.use_counter(),
        }
    }

    /// `default` wins over `auto` when a hand-edited file has both.
    pub fn into_item(self, name: &str) -> Item {
        let mut item = Item::new(name, DefinitionKind::Spgm, ItemOrigin::FromConfig);
        if let Some(value) = self.default {
            item.value = Some(value);
        } else {
            item.auto_value = self.auto;
        }
        item.translations = self.i18n;
        item
    }
}

pub type ConfigEntries = BTreeMap<String, ConfigEntry>;

/// Render the merged table.
pub fn render(table: &MergedTable) -> Result<String> {
    let entries: ConfigEntries = table
        .iter()
        .map(|item| (item.name.clone(), ConfigEntry::from_item(item)))
        .collect();
    to_json(&entries)
}

pub fn to_json(entries: &ConfigEntries) -> Result<String> {
    let mut json = serde_json::to_string_pretty(entries).map_err(|source| SpgmError::Json {
        path: "<config file>".into(),
        source,
    })?;
    json.push('\n');
    Ok(json)
}

/// Read the file as `FromConfig` items; a missing or empty file has none.
pub fn load(path: &Path) -> Result<Vec<Item>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(SpgmError::io(path, err)),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: ConfigEntries = serde_json::from_str(&content).map_err(|source| SpgmError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(entries
        .into_iter()
        .map(|(name, entry)| entry.into_item(&name))
        .collect())
}
