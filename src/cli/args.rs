//! CLI argument definitions using clap.
//!
//! ## Commands
//!
//! - `generate`: Scan sources and write the generated files
//! - `export`: Print an `AUTO_STRING_DEF` block of known strings
//! - `query`: Look up names in the database
//! - `init`: Initialize spgm configuration file

use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Arguments {
    /// Check if a command was provided, otherwise print help and return None.
    pub fn with_command_or_help(self) -> Option<Self> {
        if self.command.is_none() {
            Self::command().print_help().ok();
            None
        } else {
            Some(self)
        }
    }

    /// Get the verbose flag from the command's common args.
    pub fn verbose(&self) -> bool {
        match &self.command {
            Some(Command::Generate(cmd)) => cmd.args.common.verbose,
            Some(Command::Export(cmd)) => cmd.args.common.verbose,
            Some(Command::Query(cmd)) => cmd.args.common.verbose,
            Some(Command::Init) | None => false,
        }
    }
}

/// Common arguments shared by all commands.
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Project directory; `.spgmrc.json` is searched from here upwards
    #[arg(short = 'C', long)]
    pub project_dir: Option<PathBuf>,

    /// Source directory to scan (overrides config file, repeatable)
    #[arg(short = 'd', long = "source-dir")]
    pub source_dirs: Vec<String>,

    /// Additional source file (repeatable)
    #[arg(short = 'f', long = "source-file")]
    pub source_files: Vec<String>,

    /// Source file extensions (overrides config file)
    #[arg(short = 'e', long = "extension", value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Additional include directory (repeatable)
    #[arg(short = 'i', long = "include-dir")]
    pub include_dirs: Vec<String>,

    /// Define a macro, NAME or NAME=value (repeatable)
    #[arg(short = 'D', long = "define", allow_hyphen_values = true)]
    pub defines: Vec<String>,

    /// Database directory (overrides config file)
    #[arg(long)]
    pub database_dir: Option<String>,

    /// JSON config/translation file (overrides config file)
    #[arg(long)]
    pub config_file: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Apply the overrides to `config` (CLI > config file > defaults).
    pub fn apply(&self, config: &mut Config) {
        if !self.source_dirs.is_empty() {
            config.source_dirs = self.source_dirs.clone();
        }
        if !self.extensions.is_empty() {
            config.extensions = self.extensions.clone();
        }
        config.include_dirs.extend(self.include_dirs.iter().cloned());
        config.defines.extend(self.defines.iter().cloned());
        if let Some(ref database_dir) = self.database_dir {
            config.database_dir = database_dir.clone();
        }
        if let Some(ref config_file) = self.config_file {
            config.config_file = config_file.clone();
        }
    }
}

/// Overrides for the generated files.
#[derive(Debug, Clone, Default, Args)]
pub struct OutputArgs {
    /// Generated header with the declarations
    #[arg(long)]
    pub declaration_file: Option<String>,

    /// Generated source with the definitions
    #[arg(long)]
    pub definition_file: Option<String>,

    /// Generated listing of statically defined strings
    #[arg(long)]
    pub statics_file: Option<String>,

    /// Generated AUTO_INIT block of auto-defined strings
    #[arg(long)]
    pub auto_defined_file: Option<String>,

    /// Languages to emit, tried in order (overrides config file)
    #[arg(long = "output-language", value_delimiter = ',')]
    pub output_languages: Vec<String>,

    /// Also emit strings that are only known from the config file
    #[arg(long)]
    pub add_unused: bool,

    /// Write each location comment on its own line
    #[arg(long)]
    pub locations_one_per_line: bool,
}

impl OutputArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref path) = self.declaration_file {
            config.declaration_file = path.clone();
        }
        if let Some(ref path) = self.definition_file {
            config.definition_file = path.clone();
        }
        if let Some(ref path) = self.statics_file {
            config.statics_file = path.clone();
        }
        if let Some(ref path) = self.auto_defined_file {
            config.auto_defined_file = path.clone();
        }
        if !self.output_languages.is_empty() {
            config.output_language = self.output_languages.clone();
        }
        config.add_unused |= self.add_unused;
        config.locations_one_per_line |= self.locations_one_per_line;
    }
}

#[derive(Debug, Parser)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Regenerate even if no source changed
    #[arg(long)]
    pub force: bool,

    /// Target id (default: derived from the source list)
    #[arg(long)]
    pub target: Option<String>,
}

#[derive(Debug, Args)]
pub struct GenerateCommand {
    #[command(flatten)]
    pub args: GenerateArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum ExportKind {
    /// Strings without a value anywhere
    Auto,
    /// Strings found in source
    Source,
    /// Strings of the config file
    Config,
    /// Every known string
    #[default]
    All,
}

#[derive(Debug, Parser)]
pub struct ExportArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Write each location comment on its own line
    #[arg(long)]
    pub locations_one_per_line: bool,
}

#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Which strings to export
    #[arg(value_enum, default_value_t = ExportKind::All)]
    pub kind: ExportKind,
    #[command(flatten)]
    pub args: ExportArgs,
}

#[derive(Debug, Parser)]
pub struct QueryArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct QueryCommand {
    /// Name or wildcard pattern (`*`, `?`)
    pub pattern: String,
    #[command(flatten)]
    pub args: QueryArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan sources and write the generated declaration and definition files
    Generate(GenerateCommand),
    /// Print known strings as a FLASH_STRING_GENERATOR_AUTO_INIT block
    Export(ExportCommand),
    /// Show value, translations and locations of matching names
    Query(QueryCommand),
    /// Initialize a new .spgmrc.json configuration file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_args() {
        let args = Arguments::try_parse_from([
            "spgm",
            "generate",
            "-d",
            "src",
            "-d",
            "lib",
            "-e",
            "c,cpp",
            "-D",
            "DEBUG",
            "-D",
            "NAME=\\\"x\\\"",
            "--output-language",
            "de,default",
            "--force",
        ])
        .unwrap();
        let Some(Command::Generate(cmd)) = args.command else {
            panic!("expected generate");
        };
        let mut config = Config::default();
        cmd.args.common.apply(&mut config);
        cmd.args.output.apply(&mut config);

        assert_eq!(config.source_dirs, vec!["src", "lib"]);
        assert_eq!(config.extensions, vec!["c", "cpp"]);
        assert_eq!(config.defines, vec!["DEBUG", "NAME=\\\"x\\\""]);
        assert_eq!(config.output_language, vec!["de", "default"]);
        assert!(cmd.args.force);
    }

    #[test]
    fn test_export_kind_defaults_to_all() {
        let args = Arguments::try_parse_from(["spgm", "export"]).unwrap();
        let Some(Command::Export(cmd)) = args.command else {
            panic!("expected export");
        };
        assert_eq!(cmd.kind, ExportKind::All);

        let args = Arguments::try_parse_from(["spgm", "export", "auto", "-v"]).unwrap();
        assert!(args.verbose());
    }

    #[test]
    fn test_query_requires_pattern() {
        assert!(Arguments::try_parse_from(["spgm", "query"]).is_err());
    }
}
