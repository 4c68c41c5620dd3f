//! Extraction and merge engine.
//!
//! Pipeline for one target:
//!
//! 1. `file_scanner` finds the translation units
//! 2. `preprocess` turns them into one token stream
//! 3. `scanner` reconstructs an [`Item`] per marker macro
//! 4. `database` persists the items of the target next to all other targets
//! 5. `merge` folds source, config file and build database into one table
//! 6. `output` renders the generated files
//!
//! `context` drives the steps above; everything below it is usable on its own.

pub mod context;
pub mod database;
pub mod error;
pub mod file_scanner;
pub mod fingerprint;
pub mod i18n;
pub mod item;
pub mod location;
pub mod merge;
pub mod output;
pub mod preprocess;
pub mod scanner;
pub mod utils;

pub use error::{Result, SpgmError};
pub use item::{Item, ItemOrigin};
pub use location::{DefinitionKind, Location, LocationSet};
pub use merge::MergedTable;
