//! Discovery of the translation units of a target.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use glob::Pattern;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::{
    error::{Result, SpgmError},
    preprocess::normalize_path,
    utils::is_glob_pattern,
};

/// Exclude list split the way it is matched.
#[derive(Debug, Default)]
pub struct Excludes {
    literal: Vec<PathBuf>,
    patterns: Vec<Pattern>,
}

impl Excludes {
    /// Patterns without wildcards are path prefixes relative to `base_dir`.
    pub fn new(base_dir: &Path, excludes: &[String]) -> Result<Self> {
        let mut result = Self::default();
        for exclude in excludes {
            if is_glob_pattern(exclude) {
                let pattern = Pattern::new(exclude).map_err(|source| SpgmError::InvalidPattern {
                    pattern: exclude.clone(),
                    source,
                })?;
                result.patterns.push(pattern);
            } else {
                result.add_path(base_dir.join(exclude));
            }
        }
        Ok(result)
    }

    /// Exclude `path` and everything below it.
    pub fn add_path(&mut self, path: impl AsRef<Path>) {
        self.literal.push(normalize_path(path.as_ref()));
    }

    /// Glob patterns are tried against the path relative to `base_dir` and
    /// against the full path.
    pub fn is_excluded(&self, base_dir: &Path, path: &Path) -> bool {
        let normalized = normalize_path(path);
        if self.literal.iter().any(|prefix| normalized.starts_with(prefix)) {
            return true;
        }
        let full = path.to_string_lossy();
        let relative = path.strip_prefix(base_dir).unwrap_or(path).to_string_lossy();
        self.patterns
            .iter()
            .any(|pattern| pattern.matches(&relative) || pattern.matches(&full))
    }
}

/// Result of scanning for sources.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Sorted and deduplicated.
    pub files: Vec<PathBuf>,
    pub skipped_count: usize,
}

/// Collect the sources in `dirs` (recursively, by extension) plus the
/// explicitly listed `files`, minus `excludes`.
///
/// Listed files are taken regardless of their extension.
pub fn scan_sources(
    base_dir: &Path,
    dirs: &[String],
    files: &[String],
    extensions: &[String],
    excludes: &Excludes,
) -> ScanResult {
    let mut found: BTreeSet<PathBuf> = BTreeSet::new();
    let mut skipped_count = 0;

    for dir in dirs {
        let dir = base_dir.join(dir);
        if !dir.exists() {
            warn!("source directory does not exist: {}", dir.display());
            continue;
        }
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    skipped_count += 1;
                    warn!("cannot access path: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if excludes.is_excluded(base_dir, path) {
                continue;
            }
            if entry.file_type().is_file() && has_extension(path, extensions) {
                found.insert(path.to_path_buf());
            }
        }
    }

    for file in files {
        let path = base_dir.join(file);
        if excludes.is_excluded(base_dir, &path) {
            debug!("{} is excluded", path.display());
            continue;
        }
        if path.is_file() {
            found.insert(path);
        } else {
            skipped_count += 1;
            warn!("source file does not exist: {}", path.display());
        }
    }

    ScanResult {
        files: found.into_iter().collect(),
        skipped_count,
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
}

/// `path` relative to `root` with `/` separators, as written into locations.
pub fn display_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let text = relative.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        text.into_owned()
    } else {
        text.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, path: &str) {
        let path = dir.path().join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn extensions() -> Vec<String> {
        vec!["c".to_string(), "cpp".to_string(), "ino".to_string()]
    }

    fn names(dir: &TempDir, result: &ScanResult) -> Vec<String> {
        result
            .files
            .iter()
            .map(|path| display_path(dir.path(), path))
            .collect()
    }

    #[test]
    fn test_scan_by_extension() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "src/main.cpp");
        touch(&dir, "src/net/wifi.c");
        touch(&dir, "src/net/wifi.h");
        touch(&dir, "src/sketch.INO");
        touch(&dir, "lib/other.c");

        let result = scan_sources(
            dir.path(),
            &["src".to_string()],
            &[],
            &extensions(),
            &Excludes::default(),
        );
        assert_eq!(names(&dir, &result), vec!["src/main.cpp", "src/net/wifi.c", "src/sketch.INO"]);
        assert_eq!(result.skipped_count, 0);
    }

    #[test]
    fn test_excludes() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "src/main.cpp");
        touch(&dir, "src/test/test_main.cpp");
        touch(&dir, "src/vendor/lib.c");

        let excludes = Excludes::new(dir.path(), &["src/vendor".to_string(), "**/test/*".to_string()]).unwrap();
        let result = scan_sources(dir.path(), &["src".to_string()], &[], &extensions(), &excludes);
        assert_eq!(names(&dir, &result), vec!["src/main.cpp"]);
    }

    #[test]
    fn test_explicit_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "extra/strings.txt");

        let result = scan_sources(
            dir.path(),
            &["missing".to_string()],
            &["extra/strings.txt".to_string(), "nope.c".to_string()],
            &extensions(),
            &Excludes::default(),
        );
        assert_eq!(names(&dir, &result), vec!["extra/strings.txt"]);
        assert_eq!(result.skipped_count, 1);
    }

    #[test]
    fn test_excluded_files_are_skipped_even_when_listed() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "src/main.cpp");
        touch(&dir, "src/spgm_auto_strings.cpp");

        let mut excludes = Excludes::default();
        excludes.add_path(dir.path().join("./src/spgm_auto_strings.cpp"));
        let result = scan_sources(
            dir.path(),
            &["src".to_string()],
            &["src/spgm_auto_strings.cpp".to_string()],
            &extensions(),
            &excludes,
        );
        assert_eq!(names(&dir, &result), vec!["src/main.cpp"]);
    }

    #[test]
    fn test_invalid_exclude() {
        let dir = TempDir::new().unwrap();
        let err = Excludes::new(dir.path(), &["[oops*".to_string()]).unwrap_err();
        assert!(matches!(err, SpgmError::InvalidPattern { .. }));
    }
}
