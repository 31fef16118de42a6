//! Input discovery for spreadsheet files.
//!
//! Resolves explicit file arguments against the input directory, or
//! collects every spreadsheet in that directory when none are given.

use crate::loader::is_spreadsheet;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Configuration for input scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory searched when no files are given (and for bare file names).
    pub input_dir: PathBuf,
    /// File-name suffixes (before the extension) that mark generated outputs.
    pub excluded_suffixes: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            excluded_suffixes: vec!["_with_responses".to_string()],
        }
    }
}

impl From<&crate::config::GeneralConfig> for ScanConfig {
    fn from(config: &crate::config::GeneralConfig) -> Self {
        Self {
            input_dir: PathBuf::from(&config.input_dir),
            ..Self::default()
        }
    }
}

/// Spreadsheet discovery.
pub struct InputScanner {
    config: ScanConfig,
}

impl InputScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Resolve the files to evaluate.
    ///
    /// Explicit paths are used as given, or looked up under the input
    /// directory; paths found in neither place are skipped with a warning.
    pub fn resolve(&self, requested: &[PathBuf]) -> Result<Vec<PathBuf>> {
        if requested.is_empty() {
            return self.scan();
        }

        let mut files = Vec::new();
        for path in requested {
            if path.is_file() {
                files.push(path.clone());
                continue;
            }
            let fallback = self.config.input_dir.join(path);
            if fallback.is_file() {
                debug!("Resolved {} to {}", path.display(), fallback.display());
                files.push(fallback);
            } else {
                warn!("File not found, skipping: {}", path.display());
            }
        }
        Ok(files)
    }

    /// Every spreadsheet directly inside the input directory, sorted by name.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.config.input_dir;
        if !dir.is_dir() {
            debug!("Input directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
            let path = entry.path();
            if entry.file_type().is_file() && self.matches(path) {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }

    /// Check if a file is an evaluable spreadsheet.
    pub fn matches(&self, path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };

        // Hidden files and Excel lock files
        if name.starts_with('.') || name.starts_with("~$") {
            return false;
        }

        if !is_spreadsheet(path) {
            return false;
        }

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        !self
            .config
            .excluded_suffixes
            .iter()
            .any(|suffix| stem.ends_with(suffix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scanner_for(dir: &Path) -> InputScanner {
        InputScanner::new(ScanConfig {
            input_dir: dir.to_path_buf(),
            ..ScanConfig::default()
        })
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "b.xlsx",
            "a.ods",
            "notes.txt",
            ".hidden.xlsx",
            "~$lock.xlsx",
            "a_with_responses.xlsx",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.xlsx"), b"").unwrap();

        let files = scanner_for(dir.path()).scan().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.ods", "b.xlsx"]);
    }

    #[test]
    fn test_resolve_falls_back_to_input_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.xlsx"), b"").unwrap();

        let scanner = scanner_for(dir.path());
        let files = scanner
            .resolve(&[PathBuf::from("test.xlsx"), PathBuf::from("missing.xlsx")])
            .unwrap();
        assert_eq!(files, vec![dir.path().join("test.xlsx")]);
    }

    #[test]
    fn test_scan_missing_dir() {
        let scanner = scanner_for(Path::new("/nonexistent/input"));
        assert!(scanner.scan().unwrap().is_empty());
    }
}
