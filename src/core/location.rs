use std::{
    cmp::Ordering,
    collections::BTreeSet,
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

/// How a name was referenced at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DefinitionKind {
    /// `PROGMEM_STRING_DEF(name, value)`: statically supplied value.
    #[serde(rename = "DEFINE")]
    Define,
    /// `SPGM(name, ...)` / `FSPGM(name, ...)`: a usage site.
    #[serde(rename = "SPGM")]
    Spgm,
    /// `AUTO_INIT_SPGM(name, value, ...)`.
    #[serde(rename = "AUTO_INIT")]
    AutoInit,
}

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Define => "DEFINE",
            DefinitionKind::Spgm => "SPGM",
            DefinitionKind::AutoInit => "AUTO_INIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEFINE" => Some(DefinitionKind::Define),
            "SPGM" => Some(DefinitionKind::Spgm),
            "AUTO_INIT" | "AUTOINIT" => Some(DefinitionKind::AutoInit),
            _ => None,
        }
    }

    /// Tag embedded in the internal marker identifiers
    /// (`__INTERNAL_<TAG>_FLASH_STRING_START`).
    pub fn marker_tag(&self) -> &'static str {
        match self {
            DefinitionKind::Define => "DEFINE",
            DefinitionKind::Spgm => "SPGM",
            DefinitionKind::AutoInit => "AUTOINIT",
        }
    }

    /// Name of the macro that produces this kind in generated comments.
    pub fn macro_name(&self) -> &'static str {
        match self {
            DefinitionKind::Define => "PROGMEM_STRING_DEF",
            DefinitionKind::Spgm => "SPGM",
            DefinitionKind::AutoInit => "AUTO_STRING_DEF",
        }
    }

    /// Kinds that must carry an explicit value when finalized.
    pub fn requires_value(&self) -> bool {
        matches!(self, DefinitionKind::Define | DefinitionKind::AutoInit)
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A place where a flash string name is referenced.
///
/// Equality and ordering only consider `(source, line, column)`; the kind is
/// carried along but does not make two references at the same spot distinct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub source: String,
    pub line: u32,
    pub column: u32,
    pub kind: DefinitionKind,
}

impl Location {
    pub fn new(source: impl Into<String>, line: u32, column: u32, kind: DefinitionKind) -> Self {
        Self {
            source: source.into(),
            line,
            column,
            kind,
        }
    }

    /// `source:line (MACRO)` as written into generated comments.
    pub fn describe(&self) -> String {
        format!("{}:{} ({})", self.source, self.line, self.kind.macro_name())
    }

    pub fn to_record(&self) -> LocationRecord {
        LocationRecord {
            source: self.source.clone(),
            line: i64::from(self.line),
            kind: self.kind,
            column: self.column,
        }
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.line == other.line && self.column == other.column
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.line.hash(state);
        self.column.hash(state);
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> Ordering {
        self.source
            .cmp(&other.source)
            .then(self.line.cmp(&other.line))
            .then(self.column.cmp(&other.column))
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

/// Sorted, deduplicated set of locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSet(BTreeSet<Location>);

impl LocationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(location: Location) -> Self {
        let mut set = Self::new();
        set.insert(location);
        set
    }

    /// Returns false if an equal location was already present.
    pub fn insert(&mut self, location: Location) -> bool {
        self.0.insert(location)
    }

    pub fn extend(&mut self, other: &LocationSet) {
        for location in other.iter() {
            if !self.0.contains(location) {
                self.0.insert(location.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&Location> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count_kind(&self, kind: DefinitionKind) -> usize {
        self.0.iter().filter(|l| l.kind == kind).count()
    }

    pub fn contains_kind(&self, kind: DefinitionKind) -> bool {
        self.0.iter().any(|l| l.kind == kind)
    }

    pub fn retain(&mut self, f: impl FnMut(&Location) -> bool) {
        self.0.retain(f);
    }
}

impl FromIterator<Location> for LocationSet {
    fn from_iter<T: IntoIterator<Item = Location>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a LocationSet {
    type Item = &'a Location;
    type IntoIter = std::collections::btree_set::Iter<'a, Location>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Union of two location sets, ordered by `(source, line)`.
///
/// When both sides contain the same location the entry from `a` is kept.
pub fn merge_sets(a: &LocationSet, b: &LocationSet) -> LocationSet {
    let mut merged = a.clone();
    merged.extend(b);
    merged
}

/// Flat persisted form of a [`Location`]: `[source, line, kind, column]`.
///
/// A negative line marks a tombstone: the location was known to the database
/// but no longer exists in source. Tombstones never become [`Location`]s.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocationRecord {
    pub source: String,
    pub line: i64,
    pub kind: DefinitionKind,
    pub column: u32,
}

pub const TOMBSTONE_LINE: i64 = -1;

impl LocationRecord {
    pub fn tombstone(location: &Location) -> Self {
        Self {
            line: TOMBSTONE_LINE,
            ..location.to_record()
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.line < 0
    }

    pub fn to_location(&self) -> Option<Location> {
        let line = u32::try_from(self.line).ok()?;
        Some(Location::new(self.source.clone(), line, self.column, self.kind))
    }
}

impl Serialize for LocationRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.source, self.line, self.kind.as_str(), self.column).serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordRepr {
    WithColumn(String, i64, String, u32),
    WithoutColumn(String, i64, String),
}

impl<'de> Deserialize<'de> for LocationRecord {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (source, line, kind, column) = match RecordRepr::deserialize(deserializer)? {
            RecordRepr::WithColumn(source, line, kind, column) => (source, line, kind, column),
            RecordRepr::WithoutColumn(source, line, kind) => (source, line, kind, 0),
        };
        let kind = DefinitionKind::parse(&kind)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid definition kind: {kind}")))?;
        Ok(LocationRecord {
            source,
            line,
            kind,
            column,
        })
    }
}

/// Decode persisted records, dropping tombstones.
pub fn live_locations<'a>(records: impl IntoIterator<Item = &'a LocationRecord>) -> LocationSet {
    records
        .into_iter()
        .filter_map(LocationRecord::to_location)
        .collect()
}
