//! Error taxonomy for scanning, merging and persisting flash strings.
//!
//! Every variant is fatal for the current generation run. The CLI layer wraps
//! these in `anyhow` and maps them to a non-zero exit status.

use std::path::PathBuf;

use crate::core::location::Location;

pub type Result<T> = std::result::Result<T, SpgmError>;

#[derive(Debug, thiserror::Error)]
pub enum SpgmError {
    #[error("{location}: name/id missing in flash string macro")]
    MissingIdentifier { location: Location },

    #[error("{location}: value missing for {name}")]
    MissingValue { location: Location, name: String },

    #[error("{location}: {what} is empty in translation of {name}")]
    EmptyTranslation {
        location: Location,
        name: String,
        what: &'static str,
    },

    #[error("{location}: {message}")]
    MismatchedMarker { location: Location, message: String },

    #[error("{location}: invalid translation of {name}: {message}")]
    InvalidTranslation {
        location: Location,
        name: String,
        message: String,
    },

    #[error(
        "redefinition of {name} with different value \"{second_value}\" in {second}, previous definition \"{first_value}\" in {first}"
    )]
    RedefinitionConflict {
        name: String,
        first: Location,
        second: Location,
        first_value: String,
        second_value: String,
    },

    #[error(
        "redefinition of {name} [{language}] with different translation \"{second_value}\" in {second}, previous translation \"{first_value}\" in {first}"
    )]
    TranslationConflict {
        name: String,
        language: String,
        first: Location,
        second: Location,
        first_value: String,
        second_value: String,
    },

    #[error("cannot redefine [{language}] as \"{value}\": previous value \"{previous}\"")]
    LanguageConflict {
        language: String,
        value: String,
        previous: String,
    },

    #[error("{location}: {name} already exists in the database, only one item per location may exist")]
    DuplicateDefinition { location: Location, name: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: cannot encode database: {source}", path.display())]
    DatabaseEncode {
        path: PathBuf,
        #[source]
        source: bincode::error::EncodeError,
    },

    #[error("{}: cannot decode database: {source}", path.display())]
    DatabaseDecode {
        path: PathBuf,
        #[source]
        source: bincode::error::DecodeError,
    },

    #[error(
        "could not acquire database lock {} within {waited_secs}s (another build may be stuck)",
        path.display()
    )]
    LockTimeout { path: PathBuf, waited_secs: u64 },

    #[error("invalid glob pattern \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("{location}: preprocessor: {message}")]
    Preprocess { location: Location, message: String },
}

impl SpgmError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SpgmError::Io {
            path: path.into(),
            source,
        }
    }

    /// Source location the error points at, if any.
    ///
    /// Used by the reporter to print the offending source line.
    pub fn location(&self) -> Option<&Location> {
        match self {
            SpgmError::MissingIdentifier { location }
            | SpgmError::MissingValue { location, .. }
            | SpgmError::EmptyTranslation { location, .. }
            | SpgmError::MismatchedMarker { location, .. }
            | SpgmError::InvalidTranslation { location, .. }
            | SpgmError::DuplicateDefinition { location, .. }
            | SpgmError::Preprocess { location, .. } => Some(location),
            SpgmError::RedefinitionConflict { second, .. }
            | SpgmError::TranslationConflict { second, .. } => Some(second),
            _ => None,
        }
    }

    /// Location of the earlier, conflicting definition.
    pub fn previous_location(&self) -> Option<&Location> {
        match self {
            SpgmError::RedefinitionConflict { first, .. }
            | SpgmError::TranslationConflict { first, .. } => Some(first),
            _ => None,
        }
    }
}
