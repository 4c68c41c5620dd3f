//! Shared helpers for the core pipeline.
//!
//! - `glob_matcher`: wildcard matching for language tags and names
//! - `escape`: C string literal encoding for generated files

pub mod escape;
pub mod glob_matcher;

pub use escape::*;
pub use glob_matcher::*;
