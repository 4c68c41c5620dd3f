//! Report formatting and printing utilities.
//!
//! Command summaries go to stdout, diagnostics to stderr, in cargo style.
//! Separate from core logic to allow spgm to be used as a library.

use std::{
    fs,
    io::{self, Write},
};

use colored::Colorize;
use unicode_width::UnicodeWidthStr;

use super::commands::{CommandResult, CommandSummary, ExportSummary, InitSummary, QuerySummary};
use crate::config::CONFIG_FILE_NAME;
use crate::core::{Location, SpgmError, context::GenerateSummary};

/// Success mark for consistent output formatting.
pub const SUCCESS_MARK: &str = "\u{2713}"; // ✓

/// Failure mark for consistent output formatting.
pub const FAILURE_MARK: &str = "\u{2718}"; // ✘

/// Maximum number of locations to display per query match.
const MAX_LOCATIONS_DISPLAY: usize = 5;

pub fn print(result: &CommandResult, verbose: bool) {
    print_to(result, verbose, &mut io::stdout().lock(), &mut io::stderr().lock());
}

pub fn print_to<W: Write, E: Write>(result: &CommandResult, verbose: bool, out: &mut W, err: &mut E) {
    match &result.summary {
        CommandSummary::Generate(summary) => print_generate(summary, verbose, out),
        CommandSummary::Export(summary) => print_export(summary, out),
        CommandSummary::Query(summary) => print_query(summary, out, err),
        CommandSummary::Init(summary) => print_init(summary, out, err),
    }
}

/// Print a fatal error with its source location, if it has one.
pub fn print_error(error: &anyhow::Error) {
    print_error_to(error, &mut io::stderr().lock());
}

pub fn print_error_to<W: Write>(error: &anyhow::Error, writer: &mut W) {
    let _ = writeln!(writer, "{}: {:#}", "error".bold().red(), error);

    let Some(spgm_error) = error.chain().find_map(|cause| cause.downcast_ref::<SpgmError>()) else {
        return;
    };
    let Some(location) = spgm_error.location() else {
        return;
    };
    let width = location.line.to_string().len();
    print_location(location, writer, width);

    if let Some(previous) = spgm_error.previous_location() {
        let _ = writeln!(
            writer,
            "{:>width$} {} {} previous definition in {}",
            "",
            "=".blue(),
            "note:".bold(),
            previous,
            width = width
        );
    }
}

// ============================================================
// Internal Functions
// ============================================================

fn print_location<W: Write>(location: &Location, writer: &mut W, width: usize) {
    // Print clickable location: --> path:line:col
    let _ = writeln!(writer, "{:>width$}{} {}", "", "-->".blue(), location, width = width);

    let Some(raw_line) = read_line(&location.source, location.line) else {
        return;
    };
    let source_line = expand_tabs(&raw_line);
    let _ = writeln!(writer, "{:>width$} {}", "", "|".blue(), width = width);
    let _ = writeln!(
        writer,
        "{:>width$} {} {}",
        location.line.to_string().blue(),
        "|".blue(),
        source_line,
        width = width
    );

    // Caret pointing to the column (column is 1-based)
    let col = location.column as usize;
    let prefix = if col > 1 {
        expand_tabs(&raw_line.chars().take(col - 1).collect::<String>())
    } else {
        String::new()
    };
    let caret_padding = UnicodeWidthStr::width(prefix.as_str());
    let _ = writeln!(
        writer,
        "{:>width$} {} {:>padding$}{}",
        "",
        "|".blue(),
        "",
        "^".red(),
        width = width,
        padding = caret_padding
    );
}

fn read_line(path: &str, line: u32) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let index = usize::try_from(line).ok()?.checked_sub(1)?;
    content.lines().nth(index).map(str::to_string)
}

fn expand_tabs(text: &str) -> String {
    text.replace('\t', "    ")
}

fn plural(count: usize, singular: &'static str, plural: &'static str) -> &'static str {
    if count == 1 { singular } else { plural }
}

fn print_generate<W: Write>(summary: &GenerateSummary, verbose: bool, writer: &mut W) {
    if summary.up_to_date {
        let _ = writeln!(
            writer,
            "{} {} (use {} to regenerate)",
            SUCCESS_MARK.green(),
            "No changes detected".green(),
            "--force".cyan()
        );
        return;
    }

    let _ = writeln!(
        writer,
        "{} {}",
        SUCCESS_MARK.green(),
        format!(
            "Generated {} {} from {} source {}",
            summary.names,
            plural(summary.names, "string", "strings"),
            summary.source_files,
            plural(summary.source_files, "file", "files")
        )
        .green()
    );
    let _ = writeln!(
        writer,
        "  {}",
        format!(
            "{} declared, {} defined, {} static, {} auto",
            summary.declared, summary.defined, summary.statics, summary.auto_defined
        )
        .dimmed()
    );

    if !summary.unused.is_empty() {
        let _ = writeln!(
            writer,
            "  {} {} only in the config file: {}",
            "note:".bold(),
            plural(summary.unused.len(), "string is", "strings are"),
            summary.unused.join(", ")
        );
    }

    if verbose {
        let _ = writeln!(writer, "  target {}, {} files scanned", summary.target, summary.scanned_files);
        for path in &summary.written {
            let _ = writeln!(writer, "  wrote {}", path.display());
        }
    }
}

fn print_export<W: Write>(summary: &ExportSummary, writer: &mut W) {
    let _ = write!(writer, "{}", summary.block);
}

fn print_query<W: Write, E: Write>(summary: &QuerySummary, out: &mut W, err: &mut E) {
    if summary.matches.is_empty() {
        let _ = writeln!(
            err,
            "{} {}",
            FAILURE_MARK.red(),
            format!("No strings match '{}'", summary.pattern).red()
        );
        return;
    }

    for found in &summary.matches {
        let mut flags = Vec::new();
        if found.is_auto {
            flags.push("auto".to_string());
        }
        if found.is_static {
            flags.push("static".to_string());
        }
        flags.push(format!("used {}x", found.use_counter));
        let _ = writeln!(
            out,
            "{} = \"{}\"  {}",
            found.name.bold(),
            found.value,
            format!("({})", flags.join(", ")).dimmed()
        );
        for (tags, value) in &found.translations {
            let _ = writeln!(out, "  {}: \"{}\"", tags.cyan(), value);
        }

        let total = found.locations.len();
        for location in found.locations.iter().take(MAX_LOCATIONS_DISPLAY) {
            let _ = writeln!(out, "  {} {}", "-->".blue(), location);
        }
        if total > MAX_LOCATIONS_DISPLAY {
            let _ = writeln!(out, "  (and {} more)", total - MAX_LOCATIONS_DISPLAY);
        }
    }
}

fn print_init<W: Write, E: Write>(summary: &InitSummary, out: &mut W, err: &mut E) {
    if summary.created {
        let _ = writeln!(
            out,
            "{} {}",
            SUCCESS_MARK.green(),
            format!("Created {}", CONFIG_FILE_NAME).green()
        );
    }
    if let Some(ref error) = summary.error {
        let _ = writeln!(err, "{}: {}", "error".bold().red(), error);
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cli::commands::{CommandKind, QueryMatch};
    use crate::core::DefinitionKind;
    use tempfile::tempdir;

    fn strip_ansi(s: &str) -> String {
        // Simple ANSI escape code stripper for testing
        let mut result = String::new();
        let mut chars = s.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                // Skip until 'm'
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next == 'm' {
                        break;
                    }
                }
            } else {
                result.push(c);
            }
        }
        result
    }

    fn render(result: &CommandResult, verbose: bool) -> (String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        print_to(result, verbose, &mut out, &mut err);
        (
            strip_ansi(&String::from_utf8(out).unwrap()),
            strip_ansi(&String::from_utf8(err).unwrap()),
        )
    }

    #[test]
    fn test_print_generate() {
        let summary = GenerateSummary {
            source_files: 1,
            names: 3,
            declared: 3,
            defined: 2,
            statics: 1,
            auto_defined: 2,
            unused: vec!["old_name".to_string()],
            written: vec![PathBuf::from("include/spgm_auto_strings.h")],
            target: "abc".to_string(),
            ..GenerateSummary::default()
        };
        let result = CommandResult::new(CommandKind::Generate, CommandSummary::Generate(summary));

        let (out, _) = render(&result, false);
        assert!(out.contains("Generated 3 strings from 1 source file"));
        assert!(out.contains("3 declared, 2 defined, 1 static, 2 auto"));
        assert!(out.contains("string is only in the config file: old_name"));
        assert!(!out.contains("wrote"));

        let (out, _) = render(&result, true);
        assert!(out.contains("wrote include/spgm_auto_strings.h"));
    }

    #[test]
    fn test_print_up_to_date() {
        let summary = GenerateSummary {
            up_to_date: true,
            ..GenerateSummary::default()
        };
        let result = CommandResult::new(CommandKind::Generate, CommandSummary::Generate(summary));
        let (out, _) = render(&result, false);
        assert!(out.contains("No changes detected (use --force to regenerate)"));
    }

    #[test]
    fn test_print_query() {
        let summary = QuerySummary {
            pattern: "he*".to_string(),
            matches: vec![QueryMatch {
                name: "hello".to_string(),
                value: "Hello World".to_string(),
                is_auto: false,
                is_static: true,
                use_counter: 1,
                translations: vec![("de".to_string(), "Hallo".to_string())],
                locations: vec!["a.c:10 (SPGM)".to_string(), "b.c:5 (PROGMEM_STRING_DEF)".to_string()],
            }],
        };
        let result = CommandResult::new(CommandKind::Query, CommandSummary::Query(summary));
        assert_eq!(result.error_count, 0);

        let (out, err) = render(&result, false);
        assert!(out.contains("hello = \"Hello World\"  (static, used 1x)"));
        assert!(out.contains("  de: \"Hallo\""));
        assert!(out.contains("  --> b.c:5 (PROGMEM_STRING_DEF)"));
        assert!(err.is_empty());
    }

    #[test]
    fn test_print_query_without_matches() {
        let summary = QuerySummary {
            pattern: "nope".to_string(),
            matches: Vec::new(),
        };
        let result = CommandResult::new(CommandKind::Query, CommandSummary::Query(summary));
        assert_eq!(result.error_count, 1);

        let (out, err) = render(&result, false);
        assert!(out.is_empty());
        assert!(err.contains("No strings match 'nope'"));
    }

    #[test]
    fn test_print_error_with_source_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.c");
        fs::write(&path, "// x\n\tPROGMEM_STRING_DEF(hello, \"Hi\");\n").unwrap();
        let source = path.to_string_lossy().into_owned();

        let error = SpgmError::RedefinitionConflict {
            name: "hello".to_string(),
            first: Location::new("a.c", 1, 1, DefinitionKind::Define),
            second: Location::new(source.clone(), 2, 2, DefinitionKind::Define),
            first_value: "Hello".to_string(),
            second_value: "Hi".to_string(),
        };
        let error = anyhow::Error::new(error).context("Failed to merge");

        let mut output = Vec::new();
        print_error_to(&error, &mut output);
        let stripped = strip_ansi(&String::from_utf8(output).unwrap());

        assert!(stripped.starts_with("error: Failed to merge: redefinition of hello"));
        assert!(stripped.contains(&format!("--> {}:2:2", source)));
        assert!(stripped.contains("2 |     PROGMEM_STRING_DEF(hello, \"Hi\");"));
        assert!(stripped.contains("  |     ^"));
        assert!(stripped.contains("= note: previous definition in a.c:1:1"));
    }

    #[test]
    fn test_print_error_without_location() {
        let error = anyhow::anyhow!("something failed");
        let mut output = Vec::new();
        print_error_to(&error, &mut output);
        let stripped = strip_ansi(&String::from_utf8(output).unwrap());
        assert_eq!(stripped, "error: something failed\n");
    }
}
