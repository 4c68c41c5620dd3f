//! Per-item translation map.
//!
//! A translation is stored once per alias group: `set("de;at", "Hallo")` binds
//! both tags to the same [`TranslationEntry`]. After [`Translations::merge`] the
//! donor map shares the receiver's table, so a later `set` through either
//! handle is visible through both.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    fmt,
    rc::Rc,
};

use serde::{Deserialize, Serialize};

use crate::core::{
    error::{Result, SpgmError},
    utils::matches_language,
};

/// Display name used when no translation matched.
pub const DEFAULT_LANGUAGE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationEntry {
    pub tags: BTreeSet<String>,
    pub value: String,
}

impl TranslationEntry {
    /// Tags joined the way they are written in source: `de;at`.
    pub fn tag_expr(&self) -> String {
        self.tags.iter().cloned().collect::<Vec<_>>().join(";")
    }
}

type Table = BTreeMap<String, Rc<TranslationEntry>>;

/// Result of [`Translations::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTranslation {
    /// Entry from the requested language list that matched.
    pub requested: String,
    /// Tag of the translation that was used.
    pub language: String,
    pub value: String,
}

#[derive(Default)]
pub struct Translations {
    table: Rc<RefCell<Table>>,
}

/// Split `de; at;` into `{"de", "at"}`.
pub fn split_tags(tag_expr: &str) -> BTreeSet<String> {
    tag_expr
        .split(';')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

impl Translations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every tag in `tag_expr` to `value`.
    ///
    /// Fails if one of the tags already maps to a different value. An
    /// expression without any tag is ignored.
    pub fn set(&mut self, tag_expr: &str, value: &str) -> Result<()> {
        let mut tags = split_tags(tag_expr);
        if tags.is_empty() {
            return Ok(());
        }

        let mut table = self.table.borrow_mut();
        for tag in &tags.clone() {
            if let Some(existing) = table.get(tag) {
                if existing.value != value {
                    return Err(SpgmError::LanguageConflict {
                        language: tag.clone(),
                        value: value.to_string(),
                        previous: existing.value.clone(),
                    });
                }
                tags.extend(existing.tags.iter().cloned());
            }
        }

        let entry = Rc::new(TranslationEntry {
            tags: tags.clone(),
            value: value.to_string(),
        });
        for tag in tags {
            table.insert(tag, Rc::clone(&entry));
        }
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Option<String> {
        self.table.borrow().get(tag).map(|entry| entry.value.clone())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.table.borrow().contains_key(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.table.borrow().is_empty()
    }

    /// Number of tags (aliases count separately).
    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    pub fn tags(&self) -> Vec<String> {
        self.table.borrow().keys().cloned().collect()
    }

    /// Distinct entries, one per alias group, ordered by first tag.
    pub fn entries(&self) -> Vec<TranslationEntry> {
        let table = self.table.borrow();
        let mut seen: Vec<&Rc<TranslationEntry>> = Vec::new();
        for entry in table.values() {
            if !seen.iter().any(|other| Rc::ptr_eq(other, entry)) {
                seen.push(entry);
            }
        }
        seen.into_iter().map(|entry| (**entry).clone()).collect()
    }

    /// `tag → value` for every tag.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.table
            .borrow()
            .iter()
            .map(|(tag, entry)| (tag.clone(), entry.value.clone()))
            .collect()
    }

    /// Whether both handles point at the same table.
    pub fn is_shared_with(&self, other: &Translations) -> bool {
        Rc::ptr_eq(&self.table, &other.table)
    }

    /// Fold `other` into this map. Existing tags win; afterwards `other`
    /// aliases this map's table.
    pub fn merge(&mut self, other: &mut Translations) {
        if self.is_shared_with(other) {
            return;
        }
        {
            let foreign = other.table.borrow();
            let mut table = self.table.borrow_mut();
            for (tag, entry) in foreign.iter() {
                table
                    .entry(tag.clone())
                    .or_insert_with(|| Rc::clone(entry));
            }
        }
        other.table = Rc::clone(&self.table);
    }

    /// First tag-value pair in `other` that disagrees with this map.
    pub fn first_conflict(&self, other: &Translations) -> Option<(String, String, String)> {
        if self.is_shared_with(other) {
            return None;
        }
        let table = self.table.borrow();
        let foreign = other.table.borrow();
        foreign.iter().find_map(|(tag, entry)| {
            table
                .get(tag)
                .filter(|mine| mine.value != entry.value)
                .map(|mine| (tag.clone(), mine.value.clone(), entry.value.clone()))
        })
    }

    /// Pick the translation for the first requested language that has one.
    ///
    /// Requested entries are exact tags or globs (`*`, `?`), compared
    /// case-insensitively. Reaching `default` in the list stops the search.
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> Option<ResolvedTranslation> {
        let table = self.table.borrow();
        for pattern in requested {
            let pattern = pattern.as_ref().trim();
            if pattern.eq_ignore_ascii_case(DEFAULT_LANGUAGE) {
                return None;
            }
            let found = table
                .iter()
                .find(|(tag, _)| matches_language(pattern, tag));
            if let Some((tag, entry)) = found {
                return Some(ResolvedTranslation {
                    requested: pattern.to_string(),
                    language: tag.clone(),
                    value: entry.value.clone(),
                });
            }
        }
        None
    }
}

impl Clone for Translations {
    /// Deep copy; the clone does not share the table.
    fn clone(&self) -> Self {
        let mut copy = Translations::new();
        for entry in self.entries() {
            // Entries of a valid map never conflict with each other.
            let _ = copy.set(&entry.tag_expr(), &entry.value);
        }
        copy
    }
}

impl PartialEq for Translations {
    fn eq(&self, other: &Self) -> bool {
        self.to_map() == other.to_map()
    }
}

impl Eq for Translations {}

impl fmt::Debug for Translations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries().iter().map(|e| (e.tag_expr(), e.value.clone())))
            .finish()
    }
}

impl fmt::Display for Translations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries()
            .iter()
            .map(|entry| format!("[{}]: \"{}\"", entry.tags.iter().cloned().collect::<Vec<_>>().join(","), entry.value))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

impl Serialize for Translations {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let groups: BTreeMap<String, String> = self
            .entries()
            .into_iter()
            .map(|entry| (entry.tag_expr(), entry.value))
            .collect();
        groups.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Translations {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let groups = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut translations = Translations::new();
        for (tag_expr, value) in groups {
            translations
                .set(&tag_expr, &value)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(translations)
    }
}
