use std::{
    collections::BTreeSet,
    hash::Hasher,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use glob::Pattern;
use rustc_hash::FxHasher;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    cli::args::{CommonArgs, OutputArgs},
    config::{CONFIG_FILE_NAME, Config, load_config, parse_define},
    core::{
        database::{BUILD_DATABASE_FILE, BuildDatabase, Database, LockOptions, target_id, write_atomic},
        file_scanner::{Excludes, display_path, scan_sources},
        fingerprint::{FingerprintStrategy, TargetRecord},
        item::Item,
        merge::MergedTable,
        output::{self, OutputOptions, RenderedFile, config_file},
        preprocess::{Preprocessor, normalize_path},
        scanner::{ScanHooks, Scanner},
    },
};

/// Paths of every generated file, resolved against the project root.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub declaration: PathBuf,
    pub definition: PathBuf,
    pub statics: PathBuf,
    pub auto_defined: PathBuf,
    pub config: PathBuf,
}

impl OutputPaths {
    fn generated(&self) -> [&Path; 4] {
        [&self.declaration, &self.definition, &self.statics, &self.auto_defined]
    }

    /// Generated files plus the JSON config file.
    fn all(&self) -> [&Path; 5] {
        [
            &self.declaration,
            &self.definition,
            &self.statics,
            &self.auto_defined,
            &self.config,
        ]
    }
}

/// Everything besides file contents that changes the generated files.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunInputs<'a> {
    sources: &'a [String],
    skip_includes: &'a [String],
    include_dirs: &'a [String],
    defines: &'a [String],
    locations_one_per_line: bool,
    output_language: &'a [String],
    add_unused: bool,
    declaration_file: &'a str,
    definition_file: &'a str,
    statics_file: &'a str,
    auto_defined_file: &'a str,
    config_file: &'a str,
    declaration_include: Option<&'a str>,
    extern_c: bool,
}

fn inputs_digest(config: &Config, sources: &[String]) -> Result<u64> {
    let inputs = RunInputs {
        sources,
        skip_includes: &config.skip_includes,
        include_dirs: &config.include_dirs,
        defines: &config.defines,
        locations_one_per_line: config.locations_one_per_line,
        output_language: &config.output_language,
        add_unused: config.add_unused,
        declaration_file: &config.declaration_file,
        definition_file: &config.definition_file,
        statics_file: &config.statics_file,
        auto_defined_file: &config.auto_defined_file,
        config_file: &config.config_file,
        declaration_include: config.declaration_include.as_deref(),
        extern_c: config.extern_c,
    };
    let mut hasher = FxHasher::default();
    hasher.write(&serde_json::to_vec(&inputs)?);
    Ok(hasher.finish())
}

/// Result of scanning the target's sources.
#[derive(Debug, Default)]
pub struct ScanOutput {
    pub items: Vec<Item>,
    /// Sources and every header they pulled in.
    pub opened_files: Vec<PathBuf>,
}

/// What one `generate` run did.
#[derive(Debug, Clone, Default)]
pub struct GenerateSummary {
    /// Nothing changed since the last run; no files were touched.
    pub up_to_date: bool,
    pub source_files: usize,
    pub scanned_files: usize,
    pub names: usize,
    pub declared: usize,
    pub defined: usize,
    pub statics: usize,
    pub auto_defined: usize,
    /// Names that are only known from the config file.
    pub unused: Vec<String>,
    pub written: Vec<PathBuf>,
    pub target: String,
}

/// Orchestrates one run for one target.
///
/// Owns the merged configuration (CLI arguments > `.spgmrc.json` > defaults)
/// and the database handle. Nothing is written before every file has been
/// rendered.
pub struct GenerateContext {
    pub config: Config,

    /// Project root; relative paths in the config are resolved against it.
    pub root_dir: PathBuf,

    /// Translation units of the target, sorted.
    pub sources: Vec<PathBuf>,

    pub outputs: OutputPaths,

    pub verbose: bool,

    database: Database,
    strategy: FingerprintStrategy,

    /// Digest of the sources and options that shape the outputs.
    inputs: u64,
}

impl GenerateContext {
    /// Create a context from command line arguments.
    ///
    /// Loads the configuration, applies CLI overrides and discovers the
    /// sources of the target. `target` overrides the id derived from the
    /// source list.
    pub fn new(common: &CommonArgs, output: &OutputArgs, target: Option<&str>) -> Result<Self> {
        let verbose = common.verbose;
        let start_dir = common.project_dir.clone().unwrap_or_else(|| PathBuf::from("."));

        let config_result = load_config(&start_dir)?;
        if !config_result.from_file {
            debug!("no {} found, using default configuration", CONFIG_FILE_NAME);
        }
        let root_dir = normalize_path(&config_result.root);
        let mut config = config_result.config;
        common.apply(&mut config);
        output.apply(&mut config);
        config.validate()?;

        let resolve = |path: &str| normalize_path(&root_dir.join(path));
        let outputs = OutputPaths {
            declaration: resolve(&config.declaration_file),
            definition: resolve(&config.definition_file),
            statics: resolve(&config.statics_file),
            auto_defined: resolve(&config.auto_defined_file),
            config: resolve(&config.config_file),
        };

        // Generated files are never sources, even when listed explicitly.
        let mut excludes = Excludes::new(&root_dir, &config.source_excludes)?;
        for path in outputs.all() {
            excludes.add_path(path);
        }
        let scan = scan_sources(
            &root_dir,
            &config.source_dirs,
            &common.source_files,
            &config.extensions,
            &excludes,
        );
        if scan.skipped_count > 0 {
            warn!("{} path(s) skipped", scan.skipped_count);
        }
        let sources: Vec<PathBuf> = scan.files.iter().map(|path| normalize_path(path)).collect();
        let names: Vec<String> = sources.iter().map(|path| display_path(&root_dir, path)).collect();

        // Derived from the configured roots, so adding or removing a file
        // keeps the target and its shard.
        let target = match target {
            Some(target) => target.to_string(),
            None => {
                let roots: Vec<&String> = config.source_dirs.iter().chain(&common.source_files).collect();
                target_id(&roots)
            }
        };
        debug!("target {} with {} sources", target, sources.len());
        let inputs = inputs_digest(&config, &names)?;

        let database = Database::new(
            resolve(&config.database_dir),
            target,
            LockOptions::from_secs(config.lock_timeout_secs, config.stale_lock_secs),
        );
        let strategy = config.fingerprint_strategy()?;

        Ok(Self {
            config,
            root_dir,
            sources,
            outputs,
            verbose,
            database,
            strategy,
            inputs,
        })
    }

    pub fn target(&self) -> &str {
        self.database.target()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn output_options(&self) -> OutputOptions {
        OutputOptions {
            locations_one_per_line: self.config.locations_one_per_line,
            languages: self.config.output_language.clone(),
            add_unused: self.config.add_unused,
            declaration_include: self.config.declaration_include.clone(),
            extern_c: self.config.extern_c,
        }
    }

    fn build_database_path(&self) -> PathBuf {
        self.database.dir().join(BUILD_DATABASE_FILE)
    }

    /// Whether the last run of this target saw exactly these sources and
    /// options with unchanged content and every generated file still exists.
    pub fn is_up_to_date(&self) -> bool {
        let Some(record) = self.database.target_record() else {
            return false;
        };
        if record.inputs != self.inputs || record.is_stale(&self.strategy) {
            return false;
        }
        let known = self
            .sources
            .iter()
            .all(|path| record.files.contains_key(path.to_string_lossy().as_ref()));
        known && self.outputs.generated().iter().all(|path| path.is_file())
    }

    /// Preprocess and scan every source of the target.
    pub fn scan(&self) -> Result<ScanOutput> {
        let mut skip_includes = Vec::with_capacity(self.config.skip_includes.len() + 4);
        for pattern in &self.config.skip_includes {
            skip_includes.push(Pattern::new(pattern).with_context(|| format!("Invalid skip include \"{}\"", pattern))?);
        }
        // Generated files may be included by sources but are never scanned.
        for path in self.outputs.generated() {
            if let Some(name) = path.file_name() {
                skip_includes.push(Pattern::new(&Pattern::escape(&name.to_string_lossy()))?);
            }
        }

        let mut preprocessor = Preprocessor::new(ScanHooks::new(skip_includes));
        for dir in &self.config.include_dirs {
            preprocessor.add_include_dir(self.root_dir.join(dir));
        }
        for define in &self.config.defines {
            let (name, value) = parse_define(define)?;
            preprocessor.define_value(&name, Some(value.as_str()))?;
        }
        for source in &self.sources {
            preprocessor.add_source(source);
        }

        let mut items = Scanner::scan(&mut preprocessor)?;
        for item in &mut items {
            item.locations = item
                .locations
                .iter()
                .map(|location| {
                    let mut location = location.clone();
                    location.source = display_path(&self.root_dir, Path::new(&location.source));
                    location
                })
                .collect();
        }
        // A macro expanding the same marker twice reports it at one site.
        let mut seen = BTreeSet::new();
        items.retain(|item| {
            let sites: Vec<_> = item.locations.iter().map(|location| location.to_record()).collect();
            seen.insert((
                item.name.clone(),
                sites,
                item.value.clone(),
                item.auto_value.clone(),
                item.translations.to_map(),
            ))
        });
        let opened_files = preprocessor.into_hooks().into_opened_files().into_iter().collect();
        Ok(ScanOutput { items, opened_files })
    }

    /// Merge the persisted items of every target with the config file and
    /// the build database.
    pub fn merged_table(&self) -> Result<MergedTable> {
        let source = self.database.items()?;
        let config = self.config_items()?;
        let history = BuildDatabase::load(&self.build_database_path())?.items();
        Ok(MergedTable::build(source, config, history)?)
    }

    /// Items of the JSON config/translation file.
    pub fn config_items(&self) -> Result<Vec<Item>> {
        Ok(config_file::load(&self.outputs.config)?)
    }

    /// Load the database without scanning.
    pub fn read_database(&mut self) -> Result<()> {
        self.database
            .read()
            .with_context(|| format!("Failed to read database in {}", self.database.dir().display()))
    }

    /// Scan, merge and write every output of the target.
    ///
    /// Skipped when nothing changed since the last run unless `force` is set.
    pub fn generate(&mut self, force: bool) -> Result<GenerateSummary> {
        self.read_database()?;

        let mut summary = GenerateSummary {
            source_files: self.sources.len(),
            target: self.target().to_string(),
            ..GenerateSummary::default()
        };
        if !force && self.is_up_to_date() {
            info!("no changes detected for target {}", self.target());
            summary.up_to_date = true;
            return Ok(summary);
        }

        let scan = self.scan()?;
        summary.scanned_files = scan.opened_files.len();
        let rescanned: BTreeSet<String> = scan
            .opened_files
            .iter()
            .map(|path| display_path(&self.root_dir, path))
            .collect();
        // Files of the previous run that are no longer part of the target.
        let dropped: BTreeSet<String> = self
            .database
            .target_record()
            .map(|record| {
                record
                    .files
                    .keys()
                    .map(|path| display_path(&self.root_dir, Path::new(path)))
                    .filter(|path| !rescanned.contains(path))
                    .collect()
            })
            .unwrap_or_default();

        self.database.flush();
        self.database.add_items(&scan.items)?;

        let source = self.database.items_superseding(&rescanned)?;
        let config = self.config_items()?;
        // History sees this run first, so locations in dropped files are
        // tombstoned before they could flow back through the config file.
        let mut build_database = BuildDatabase::load(&self.build_database_path())?;
        let mut history_scope = rescanned;
        history_scope.extend(dropped);
        build_database.update(&source, &history_scope);
        let table = MergedTable::build(source, config, build_database.items())?;

        let files = self.render(&table)?;
        let options = self.output_options();
        summary.names = table.len();
        summary.declared = table.declarations(options.add_unused).len();
        summary.defined = table.definitions(options.add_unused).len();
        summary.statics = table.statics().len();
        summary.auto_defined = table.auto_defined(options.add_unused).len();
        summary.unused = table.unused().iter().map(|item| item.name.clone()).collect();

        for file in &files {
            if output::write_files(std::slice::from_ref(file))? > 0 {
                summary.written.push(file.path.clone());
            }
        }

        write_atomic(&self.build_database_path(), build_database.to_json()?.as_bytes())?;

        let mut fingerprinted = scan.opened_files;
        if self.outputs.config.is_file() {
            fingerprinted.push(self.outputs.config.clone());
        }
        let record = TargetRecord::compute(&self.strategy, &fingerprinted)?.with_inputs(self.inputs);
        self.database.set_target_record(record);
        self.database
            .write()
            .with_context(|| format!("Failed to write database in {}", self.database.dir().display()))?;

        Ok(summary)
    }

    /// Every generated file, rendered from `table`.
    pub fn render(&self, table: &MergedTable) -> Result<Vec<RenderedFile>> {
        let options = self.output_options();
        let header = self
            .outputs
            .declaration
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(vec![
            RenderedFile::new(&self.outputs.declaration, output::render_declarations(table, &options)),
            RenderedFile::new(
                &self.outputs.definition,
                output::render_definitions(table, &options, &header),
            ),
            RenderedFile::new(&self.outputs.statics, output::render_statics(table, &options)),
            RenderedFile::new(&self.outputs.auto_defined, output::render_auto_defined(table, &options)),
            RenderedFile::new(&self.outputs.config, config_file::render(table)?),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("include")).unwrap();
        fs::write(
            dir.path().join("src/a.c"),
            "#include \"spgm_auto_strings.h\"\nvoid f() {\n    print(SPGM(hello));\n    print(SPGM(greeting));\n}\n",
        )
        .unwrap();
        fs::write(dir.path().join("src/b.c"), "PROGMEM_STRING_DEF(hello, \"Hello World\");\n").unwrap();
        dir
    }

    fn common(dir: &TempDir) -> CommonArgs {
        CommonArgs {
            project_dir: Some(dir.path().to_path_buf()),
            ..CommonArgs::default()
        }
    }

    fn context(dir: &TempDir) -> GenerateContext {
        GenerateContext::new(&common(dir), &OutputArgs::default(), None).unwrap()
    }

    #[test]
    fn test_sources_and_target() {
        let dir = project();
        let ctx = context(&dir);
        assert_eq!(ctx.sources.len(), 2);
        assert_eq!(ctx.target().len(), 16);

        let named = GenerateContext::new(&common(&dir), &OutputArgs::default(), Some("esp8266")).unwrap();
        assert_eq!(named.target(), "esp8266");
    }

    #[test]
    fn test_scan_uses_project_relative_locations() {
        let dir = project();
        let ctx = context(&dir);
        let scan = ctx.scan().unwrap();

        let mut found: Vec<String> = scan
            .items
            .iter()
            .flat_map(|item| item.locations.iter().map(|location| location.describe()))
            .collect();
        found.sort();
        assert_eq!(
            found,
            vec!["src/a.c:3 (SPGM)", "src/a.c:4 (SPGM)", "src/b.c:1 (PROGMEM_STRING_DEF)"]
        );
        assert_eq!(scan.opened_files.len(), 2);
    }

    #[test]
    fn test_generate_writes_outputs_and_then_skips() {
        let dir = project();
        let mut ctx = context(&dir);
        let summary = ctx.generate(false).unwrap();
        assert!(!summary.up_to_date);
        assert_eq!(summary.names, 2);
        assert_eq!(summary.statics, 1);
        assert_eq!(summary.written.len(), 5);

        let header = fs::read_to_string(dir.path().join("include/spgm_auto_strings.h")).unwrap();
        assert!(header.contains("PROGMEM_STRING_DECL(hello);"));
        let definitions = fs::read_to_string(dir.path().join("src/spgm_auto_strings.cpp")).unwrap();
        assert!(definitions.contains("PROGMEM_STRING_DEF(greeting, \"greeting\");"));
        assert!(!definitions.contains("PROGMEM_STRING_DEF(hello"));
        assert!(dir.path().join(".spgm/database.bin").is_file());
        assert!(dir.path().join(".spgm/build_database.json").is_file());

        let mut again = context(&dir);
        assert!(again.generate(false).unwrap().up_to_date);
        let forced = again.generate(true).unwrap();
        assert!(!forced.up_to_date);
        assert!(forced.written.is_empty());
    }

    #[test]
    fn test_changed_source_is_regenerated() {
        let dir = project();
        context(&dir).generate(false).unwrap();

        fs::write(dir.path().join("src/b.c"), "PROGMEM_STRING_DEF(hello, \"Hi\");\nSPGM(bye);\n").unwrap();
        let summary = context(&dir).generate(false).unwrap();
        assert!(!summary.up_to_date);
        assert_eq!(summary.names, 3);
    }

    #[test]
    fn test_config_values_are_used() {
        let dir = project();
        context(&dir).generate(false).unwrap();

        let config_path = dir.path().join("spgm_strings.json");
        let edited = fs::read_to_string(&config_path)
            .unwrap()
            .replace("\"auto\": \"greeting\"", "\"default\": \"Good morning\"");
        fs::write(&config_path, edited).unwrap();

        let summary = context(&dir).generate(false).unwrap();
        assert!(!summary.up_to_date);
        let definitions = fs::read_to_string(dir.path().join("src/spgm_auto_strings.cpp")).unwrap();
        assert!(definitions.contains("PROGMEM_STRING_DEF(greeting, \"Good morning\");"));
    }

    fn read_outputs(dir: &TempDir) -> Vec<String> {
        [
            "include/spgm_auto_strings.h",
            "src/spgm_auto_strings.cpp",
            "include/spgm_static_strings.h",
            "include/spgm_auto_defined.h",
            "spgm_strings.json",
        ]
        .iter()
        .map(|path| fs::read_to_string(dir.path().join(path)).unwrap())
        .collect()
    }

    #[test]
    fn test_generated_files_are_never_scanned() {
        let dir = project();
        context(&dir).generate(false).unwrap();
        let first = read_outputs(&dir);

        let mut again = context(&dir);
        assert!(again.generate(false).unwrap().up_to_date);
        let forced = again.generate(true).unwrap();
        assert!(forced.written.is_empty());
        assert_eq!(forced.source_files, 2);
        assert_eq!(read_outputs(&dir), first);

        let listed = CommonArgs {
            source_files: vec!["src/spgm_auto_strings.cpp".to_string()],
            ..common(&dir)
        };
        let ctx = GenerateContext::new(&listed, &OutputArgs::default(), None).unwrap();
        assert!(ctx.sources.iter().all(|path| !path.ends_with("spgm_auto_strings.cpp")));
    }

    #[test]
    fn test_target_is_kept_when_sources_change() {
        let dir = project();
        let target = context(&dir).target().to_string();
        fs::write(dir.path().join("src/c.c"), "void g() { SPGM(bye); }\n").unwrap();
        assert_eq!(context(&dir).target(), target);
    }

    #[test]
    fn test_removed_source_drops_its_strings() {
        let dir = project();
        fs::write(dir.path().join("src/c.c"), "void g() { SPGM(bye); }\n").unwrap();
        context(&dir).generate(false).unwrap();
        let header = fs::read_to_string(dir.path().join("include/spgm_auto_strings.h")).unwrap();
        assert!(header.contains("PROGMEM_STRING_DECL(bye);"));

        fs::remove_file(dir.path().join("src/c.c")).unwrap();
        let mut ctx = context(&dir);
        let summary = ctx.generate(false).unwrap();
        assert!(!summary.up_to_date);
        let header = fs::read_to_string(dir.path().join("include/spgm_auto_strings.h")).unwrap();
        assert!(!header.contains("PROGMEM_STRING_DECL(bye);"));
        assert!(header.contains("PROGMEM_STRING_DECL(greeting);"));
        let table = ctx.merged_table().unwrap();
        assert!(table.declarations(false).iter().all(|item| item.name != "bye"));
    }

    #[test]
    fn test_changed_options_regenerate() {
        let dir = project();
        fs::write(
            dir.path().join("src/c.c"),
            "#if HAVE_WIFI\nvoid w() { SPGM(wifi); }\n#endif\n",
        )
        .unwrap();
        context(&dir).generate(false).unwrap();
        let mut unchanged = context(&dir);
        unchanged.read_database().unwrap();
        assert!(unchanged.is_up_to_date());

        let with_wifi = CommonArgs {
            defines: vec!["HAVE_WIFI".to_string()],
            ..common(&dir)
        };
        let mut ctx = GenerateContext::new(&with_wifi, &OutputArgs::default(), None).unwrap();
        ctx.read_database().unwrap();
        assert!(!ctx.is_up_to_date());
        let summary = ctx.generate(false).unwrap();
        assert!(!summary.up_to_date);
        let header = fs::read_to_string(dir.path().join("include/spgm_auto_strings.h")).unwrap();
        assert!(header.contains("PROGMEM_STRING_DECL(wifi);"));
    }

    #[test]
    fn test_repeated_expansion_is_one_occurrence() {
        let dir = project();
        fs::write(
            dir.path().join("src/c.c"),
            "#define TWICE SPGM(twice) SPGM(twice)\nvoid g() { TWICE; }\n",
        )
        .unwrap();
        let mut ctx = context(&dir);
        let scan = ctx.scan().unwrap();
        let sites: BTreeSet<String> = scan
            .items
            .iter()
            .filter(|item| item.name == "twice")
            .flat_map(|item| item.locations.iter().map(|location| location.describe()))
            .collect();
        let count = scan.items.iter().filter(|item| item.name == "twice").count();
        assert_eq!(count, sites.len());

        ctx.generate(false).unwrap();
        let header = fs::read_to_string(dir.path().join("include/spgm_auto_strings.h")).unwrap();
        assert!(header.contains("PROGMEM_STRING_DECL(twice);"));
    }
}
