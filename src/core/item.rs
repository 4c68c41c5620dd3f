//! The flash string record and the rules for folding two records of the same
//! name into one.

use serde::{Deserialize, Serialize};

use crate::core::{
    i18n::{DEFAULT_LANGUAGE, Translations},
    location::{DefinitionKind, Location, LocationSet},
};

/// Where an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemOrigin {
    /// Scanned from source, in this run or persisted by an earlier run.
    FromSource,
    /// Read back from the JSON config/translation file.
    FromConfig,
    /// Historical locations from the build database.
    FromBuildDatabase,
    /// Tombstoned; ignored by merging and output.
    Removed,
}

/// Replace underscores with spaces: `wifi_ssid` becomes `wifi ssid`.
pub fn beautify(name: &str) -> String {
    name.replace('_', " ")
}

/// Value chosen for output by [`Item::resolve_for_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputValue {
    /// Requested language that matched, or `default`.
    pub requested: String,
    /// Language of the value, or `default` when no translation was used.
    pub language: String,
    pub value: String,
    /// Whether `value` is the beautified name.
    pub is_auto: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub value: Option<String>,
    pub auto_value: Option<String>,
    pub translations: Translations,
    pub locations: LocationSet,
    /// Kind of the occurrence this item was created from.
    pub definition_kind: DefinitionKind,
    pub origin: ItemOrigin,
    /// Set when a static donor without locations was merged in.
    static_flag: bool,
}

impl Item {
    pub fn new(name: impl Into<String>, definition_kind: DefinitionKind, origin: ItemOrigin) -> Self {
        Self {
            name: name.into(),
            value: None,
            auto_value: None,
            translations: Translations::new(),
            locations: LocationSet::new(),
            definition_kind,
            origin,
            static_flag: false,
        }
    }

    /// Item for one scanned occurrence.
    pub fn from_source(name: impl Into<String>, location: Location) -> Self {
        let mut item = Self::new(name, location.kind, ItemOrigin::FromSource);
        item.locations.insert(location);
        item
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self.auto_value = None;
        self
    }

    /// First location, which for an unmerged source item is its occurrence.
    pub fn location(&self) -> Option<&Location> {
        self.locations.first()
    }

    pub fn is_static(&self) -> bool {
        self.static_flag || self.locations.contains_kind(DefinitionKind::Define)
    }

    pub fn use_counter(&self) -> usize {
        self.locations.count_kind(DefinitionKind::Spgm)
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_auto(&self) -> bool {
        self.value.is_none()
    }

    pub fn is_removed(&self) -> bool {
        self.origin == ItemOrigin::Removed
    }

    pub fn remove(&mut self) {
        self.origin = ItemOrigin::Removed;
    }

    /// Explicit value, else auto value, else the beautified name.
    pub fn default_value(&self) -> String {
        self.value
            .clone()
            .or_else(|| self.auto_value.clone())
            .unwrap_or_else(|| beautify(&self.name))
    }

    /// Assign the auto value if nothing supplied a value.
    pub fn finalize_auto_value(&mut self) {
        if self.value.is_none() && self.auto_value.is_none() {
            self.auto_value = Some(beautify(&self.name));
        }
    }

    /// Fold `other` into `self`.
    ///
    /// 1. An explicit value is adopted if `self` has none, replacing an auto value.
    /// 2. Otherwise an auto value is adopted if `self` has neither.
    /// 3. Static is sticky in both directions.
    /// 4. Translations are merged; afterwards both items share one table.
    /// 5. Locations are merged unless `other` came from the config file.
    pub fn merge(&mut self, other: &mut Item) {
        if other.value.is_some() && self.value.is_none() {
            self.value = other.value.clone();
            self.auto_value = None;
        } else if other.auto_value.is_some() && self.value.is_none() && self.auto_value.is_none() {
            self.auto_value = other.auto_value.clone();
        }

        if other.is_static() {
            self.static_flag = true;
        }
        if self.is_static() {
            other.static_flag = true;
        }

        self.translations.merge(&mut other.translations);

        if matches!(other.origin, ItemOrigin::FromSource | ItemOrigin::FromBuildDatabase) {
            self.locations.extend(&other.locations);
        }
    }

    /// Value to emit for the requested language list.
    pub fn resolve_for_output<S: AsRef<str>>(&self, requested: &[S]) -> OutputValue {
        if let Some(resolved) = self.translations.resolve(requested) {
            return OutputValue {
                requested: resolved.requested,
                language: resolved.language,
                value: resolved.value,
                is_auto: false,
            };
        }
        OutputValue {
            requested: DEFAULT_LANGUAGE.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            value: self.default_value(),
            is_auto: self.value.is_none(),
        }
    }
}
