use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Ok, Result, bail};
use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::core::fingerprint::FingerprintStrategy;

pub const CONFIG_FILE_NAME: &str = ".spgmrc.json";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_source_dirs")]
    pub source_dirs: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub source_excludes: Vec<String>,
    #[serde(default)]
    pub skip_includes: Vec<String>,
    #[serde(default = "default_include_dirs")]
    pub include_dirs: Vec<String>,
    /// `NAME` or `NAME=value`, as passed with `-D`.
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub locations_one_per_line: bool,
    #[serde(default = "default_output_language")]
    pub output_language: Vec<String>,
    #[serde(default)]
    pub add_unused: bool,
    #[serde(default = "default_declaration_file")]
    pub declaration_file: String,
    #[serde(default = "default_definition_file")]
    pub definition_file: String,
    #[serde(default = "default_statics_file")]
    pub statics_file: String,
    #[serde(default = "default_auto_defined_file")]
    pub auto_defined_file: String,
    #[serde(default = "default_config_file")]
    pub config_file: String,
    #[serde(default = "default_database_dir")]
    pub database_dir: String,
    #[serde(default = "default_declaration_include")]
    pub declaration_include: Option<String>,
    #[serde(default = "default_extern_c")]
    pub extern_c: bool,
    #[serde(default = "default_fingerprint")]
    pub fingerprint: String,
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
}

fn default_source_dirs() -> Vec<String> {
    vec!["src".to_string()]
}

fn default_extensions() -> Vec<String> {
    ["c", "cc", "cpp", "cxx", "ino"].map(String::from).to_vec()
}

fn default_include_dirs() -> Vec<String> {
    vec!["include".to_string()]
}

fn default_output_language() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_declaration_file() -> String {
    "include/spgm_auto_strings.h".to_string()
}

fn default_definition_file() -> String {
    "src/spgm_auto_strings.cpp".to_string()
}

fn default_statics_file() -> String {
    "include/spgm_static_strings.h".to_string()
}

fn default_auto_defined_file() -> String {
    "include/spgm_auto_defined.h".to_string()
}

fn default_config_file() -> String {
    "spgm_strings.json".to_string()
}

fn default_database_dir() -> String {
    ".spgm".to_string()
}

fn default_declaration_include() -> Option<String> {
    Some("spgm_string_generator.h".to_string())
}

fn default_extern_c() -> bool {
    true
}

fn default_fingerprint() -> String {
    "hash".to_string()
}

fn default_lock_timeout_secs() -> u64 {
    60
}

fn default_stale_lock_secs() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dirs: default_source_dirs(),
            extensions: default_extensions(),
            source_excludes: Vec::new(),
            skip_includes: Vec::new(),
            include_dirs: default_include_dirs(),
            defines: Vec::new(),
            locations_one_per_line: false,
            output_language: default_output_language(),
            add_unused: false,
            declaration_file: default_declaration_file(),
            definition_file: default_definition_file(),
            statics_file: default_statics_file(),
            auto_defined_file: default_auto_defined_file(),
            config_file: default_config_file(),
            database_dir: default_database_dir(),
            declaration_include: default_declaration_include(),
            extern_c: default_extern_c(),
            fingerprint: default_fingerprint(),
            lock_timeout_secs: default_lock_timeout_secs(),
            stale_lock_secs: default_stale_lock_secs(),
        }
    }
}

impl Config {
    /// Validate configuration values.
    ///
    /// Returns an error for invalid glob patterns, defines or an unknown
    /// fingerprint strategy.
    pub fn validate(&self) -> Result<()> {
        for pattern in &self.source_excludes {
            Pattern::new(pattern)
                .with_context(|| format!("Invalid glob pattern in 'sourceExcludes': \"{}\"", pattern))?;
        }
        for pattern in &self.skip_includes {
            Pattern::new(pattern)
                .with_context(|| format!("Invalid glob pattern in 'skipIncludes': \"{}\"", pattern))?;
        }
        for define in &self.defines {
            parse_define(define).with_context(|| format!("Invalid entry in 'defines': \"{}\"", define))?;
        }
        self.fingerprint_strategy()?;
        if self.output_language.is_empty() {
            bail!("'outputLanguage' must name at least one language");
        }
        Ok(())
    }

    pub fn fingerprint_strategy(&self) -> Result<FingerprintStrategy> {
        match FingerprintStrategy::from_name(&self.fingerprint) {
            Some(strategy) => Ok(strategy),
            None => bail!(
                "Invalid value in 'fingerprint': \"{}\" (expected \"hash\" or \"mtime\")",
                self.fingerprint
            ),
        }
    }
}

/// Split `NAME[=value]` into name and value.
///
/// A missing or empty value is `1`. A value wrapped in `\"...\"` (the way
/// build flags quote string defines) becomes `"..."`.
pub fn parse_define(define: &str) -> Result<(String, String)> {
    let define = define.trim();
    let (name, value) = match define.split_once('=') {
        Some((name, value)) => (name.trim(), value.trim()),
        None => (define, ""),
    };
    if name.is_empty() {
        bail!("missing macro name");
    }
    if name.contains('"') || name.contains('\'') {
        bail!("macro name contains quotes: {}", name);
    }
    let mut value = if value.is_empty() { "1".to_string() } else { value.to_string() };
    if value.len() >= 4 && value.starts_with("\\\"") && value.ends_with("\\\"") {
        value = format!("\"{}\"", &value[2..value.len() - 2]);
    }
    if value.starts_with('"') && value.ends_with('"') {
        value = value.replace("\\ ", " ");
    }
    Ok((name.to_string(), value))
}

pub fn default_config_json() -> Result<String> {
    let config = Config::default();
    serde_json::to_string_pretty(&config).context("Failed to generate default config.")
}

pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }
        if current.join(".git").exists() {
            return None;
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Result of loading configuration.
pub struct ConfigLoadResult {
    pub config: Config,
    /// True if config was loaded from a file, false if using defaults.
    pub from_file: bool,
    /// Directory relative paths in the config are resolved against.
    pub root: PathBuf,
}

pub fn load_config(start_dir: &Path) -> Result<ConfigLoadResult> {
    match find_config_file(start_dir) {
        Some(path) => {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            config.validate()?;
            let root = path
                .parent()
                .map_or_else(|| start_dir.to_path_buf(), Path::to_path_buf);
            Ok(ConfigLoadResult {
                config,
                from_file: true,
                root,
            })
        }
        None => Ok(ConfigLoadResult {
            config: Config::default(),
            from_file: false,
            root: start_dir.to_path_buf(),
        }),
    }
}
