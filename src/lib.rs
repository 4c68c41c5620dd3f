//! spgm - flash string generator for PROGMEM C/C++ projects
//!
//! spgm scans C/C++ sources for the `SPGM`, `FSPGM`, `PROGMEM_STRING_DEF` and
//! `AUTO_INIT_SPGM` macros, merges every occurrence into one table of named
//! strings and generates the declarations and definitions the macros refer
//! to. A database in the build directory keeps the results of every target so
//! that partial rebuilds see the full picture.
//!
//! ## Module Structure
//!
//! - `cli`: Command-line interface layer (commands and report printing)
//! - `config`: `.spgmrc.json` loading and parsing
//! - `core`: Extraction, merge and persistence engine

pub mod cli;
pub mod config;
pub mod core;
