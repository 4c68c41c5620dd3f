//! Generated C/C++ files.
//!
//! Everything is rendered to strings first; [`write_files`] only runs once
//! the whole generation succeeded.

pub mod config_file;

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::core::{
    database::write_atomic,
    error::Result,
    i18n::DEFAULT_LANGUAGE,
    item::Item,
    merge::MergedTable,
    utils::encode_c_string,
};

pub const GENERATED_BANNER: &str = "// AUTO GENERATED FILE - DO NOT MODIFY";

/// Column the language comment of a definition is aligned to.
const DEFINE_WIDTH: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub locations_one_per_line: bool,
    /// Languages tried in order when choosing the value of a definition.
    pub languages: Vec<String>,
    pub add_unused: bool,
    /// Header included at the top of the declaration file.
    pub declaration_include: Option<String>,
    pub extern_c: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            locations_one_per_line: false,
            languages: vec![DEFAULT_LANGUAGE.to_string()],
            add_unused: false,
            declaration_include: None,
            extern_c: true,
        }
    }
}

/// A rendered file waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub content: String,
}

impl RenderedFile {
    pub fn new(path: impl Into<PathBuf>, content: String) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }
}

fn write_locations(out: &mut String, item: &Item, indent: &str, one_per_line: bool) {
    if item.locations.is_empty() {
        return;
    }
    if one_per_line {
        for location in &item.locations {
            let _ = writeln!(out, "{indent}// {}", location.describe());
        }
    } else {
        let joined: Vec<String> = item.locations.iter().map(|location| location.describe()).collect();
        let _ = writeln!(out, "{indent}// {}", joined.join(", "));
    }
}

/// `(name, "value");` with the value encoded for a C string literal.
fn define_args(name: &str, value: &str) -> String {
    format!("({}, \"{}\");", name, encode_c_string(value))
}

/// Header with one `PROGMEM_STRING_DECL` per declared name.
pub fn render_declarations(table: &MergedTable, options: &OutputOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{GENERATED_BANNER}");
    let _ = writeln!(out, "#pragma once");
    if let Some(include) = &options.declaration_include {
        let _ = writeln!(out, "#include <{include}>");
    }
    if options.extern_c {
        out.push_str("#ifdef __cplusplus\nextern \"C\" {\n#endif\n");
    }
    for item in table.declarations(options.add_unused) {
        write_locations(&mut out, item, "", options.locations_one_per_line);
        let _ = writeln!(out, "PROGMEM_STRING_DECL({});", item.name);
    }
    if options.extern_c {
        out.push_str("#ifdef __cplusplus\n} // extern \"C\"\n#endif\n");
    }
    out
}

/// Source with a `PROGMEM_STRING_DEF` for every declared name not defined in code.
pub fn render_definitions(table: &MergedTable, options: &OutputOptions, declaration_header: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{GENERATED_BANNER}");
    let _ = writeln!(out, "#include \"{declaration_header}\"");
    for item in table.definitions(options.add_unused) {
        let resolved = item.resolve_for_output(&options.languages);
        let language = if resolved.language == DEFAULT_LANGUAGE && resolved.is_auto {
            format!("{DEFAULT_LANGUAGE} (auto)")
        } else {
            resolved.language
        };
        write_locations(&mut out, item, "", options.locations_one_per_line);
        let definition = format!("PROGMEM_STRING_DEF{}", define_args(&item.name, &resolved.value));
        let _ = writeln!(out, "{definition:<DEFINE_WIDTH$} // {language}");
    }
    out
}

/// `PROGMEM_STRING_DEF`s for the names defined in code, as a compilable header.
pub fn render_statics(table: &MergedTable, options: &OutputOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{GENERATED_BANNER}");
    let _ = writeln!(out, "#pragma once");
    for item in table.statics() {
        write_locations(&mut out, item, "", options.locations_one_per_line);
        let _ = writeln!(out, "PROGMEM_STRING_DEF{}", define_args(&item.name, &item.default_value()));
    }
    out
}

/// `AUTO_STRING_DEF` lines for `items`, wrapped in `FLASH_STRING_GENERATOR_AUTO_INIT(...)`.
///
/// Translations are appended as `tags: "value"` arguments so the block can be
/// pasted back into source.
pub fn render_auto_init<'a>(items: impl IntoIterator<Item = &'a Item>, one_per_line: bool) -> String {
    let indent = "    ";
    let mut out = String::from("FLASH_STRING_GENERATOR_AUTO_INIT(\n");
    for item in items {
        let mut args = vec![item.name.clone(), format!("\"{}\"", encode_c_string(&item.default_value()))];
        for entry in item.translations.entries() {
            args.push(format!("{}: \"{}\"", entry.tag_expr(), encode_c_string(&entry.value)));
        }
        write_locations(&mut out, item, indent, one_per_line);
        let _ = writeln!(out, "{indent}AUTO_STRING_DEF({})", args.join(", "));
    }
    out.push_str(");\n");
    out
}

/// Auto-defined names, ready to be given real values.
pub fn render_auto_defined(table: &MergedTable, options: &OutputOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{GENERATED_BANNER}");
    let _ = writeln!(out, "#pragma once");
    out.push_str(&render_auto_init(
        table.auto_defined(options.add_unused),
        options.locations_one_per_line,
    ));
    out
}

/// Write every file, leaving files with identical content untouched.
///
/// Returns the number of files written.
pub fn write_files(files: &[RenderedFile]) -> Result<usize> {
    let mut written = 0;
    for file in files {
        if is_unchanged(&file.path, &file.content) {
            debug!("{} is up to date", file.path.display());
            continue;
        }
        write_atomic(&file.path, file.content.as_bytes())?;
        debug!("wrote {}", file.path.display());
        written += 1;
    }
    Ok(written)
}

fn is_unchanged(path: &Path, content: &str) -> bool {
    fs::read_to_string(path).is_ok_and(|existing| existing == content)
}
