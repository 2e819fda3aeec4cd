//! Document ingestion: directory scan and page extraction.
//!
//! Scans the data directory for eligible files and extracts page-level
//! text from each one. A missing directory is created and yields no
//! documents. A file that cannot be read or extracted is recorded as a
//! failure and skipped; the rest of the directory is still processed.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use medinteract_core::models::Document;

use crate::config::IngestConfig;
use crate::extract::extract_file_pages;

/// A file that was enumerated but produced no documents.
#[derive(Debug, Clone)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Extracted pages, in file order then page order.
    pub documents: Vec<Document>,
    pub failures: Vec<IngestFailure>,
    /// Eligible files found, successful or not.
    pub files_seen: usize,
}

/// Load every eligible document under `dir`.
///
/// Errors only when the directory itself cannot be created or walked.
pub fn load_documents(dir: &Path, config: &IngestConfig) -> Result<IngestReport> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        info!(dir = %dir.display(), "created missing data directory");
        return Ok(IngestReport::default());
    }

    let files = scan_directory(dir, config)?;
    let mut report = IngestReport {
        files_seen: files.len(),
        ..Default::default()
    };

    for path in files {
        match load_file(&path, config.max_file_bytes) {
            Ok(docs) => {
                info!(file = %path.display(), pages = docs.len(), "loaded document");
                report.documents.extend(docs);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %format!("{:#}", e), "skipping document");
                report.failures.push(IngestFailure {
                    path,
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    Ok(report)
}

/// Enumerate eligible files under `dir`, sorted by relative path.
///
/// Only the top level is scanned unless `config.recursive` is set. Hidden
/// files and directories are skipped, as are entries the walk cannot read.
pub fn scan_directory(dir: &Path, config: &IngestConfig) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&config.include_globs)?;

    let mut walker = WalkDir::new(dir).min_depth(1);
    if !config.recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker.into_iter().filter_entry(|e| !is_hidden(e.file_name())) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        if include_set.is_match(relative) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn load_file(path: &Path, max_file_bytes: u64) -> Result<Vec<Document>> {
    let size = std::fs::metadata(path)?.len();
    if size > max_file_bytes {
        anyhow::bail!("file is {} bytes, limit is {}", size, max_file_bytes);
    }

    let bytes = std::fs::read(path)?;
    let pages = extract_file_pages(path, &bytes)?;
    let source = path.display().to_string();

    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(page, text)| Document {
            source: source.clone(),
            page: page as u32,
            text,
        })
        .collect())
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("Invalid include glob: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_directory_is_created() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("data");
        let report = load_documents(&dir, &IngestConfig::default()).unwrap();
        assert!(dir.is_dir());
        assert!(report.documents.is_empty());
        assert_eq!(report.files_seen, 0);
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::write(tmp.path().join("A.PDF"), "x").unwrap();
        fs::write(tmp.path().join("image.png"), "x").unwrap();
        fs::write(tmp.path().join(".hidden.txt"), "x").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("c.md"), "c").unwrap();

        let files = scan_directory(tmp.path(), &IngestConfig::default()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["A.PDF", "b.txt"]);

        let recursive = IngestConfig {
            recursive: true,
            ..Default::default()
        };
        let files = scan_directory(tmp.path(), &recursive).unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_bad_file_is_isolated() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("broken.pdf"), b"not a pdf").unwrap();
        fs::write(tmp.path().join("good.txt"), "Grapefruit inhibits CYP3A4.").unwrap();
        fs::write(tmp.path().join("empty.txt"), "   \n").unwrap();

        let report = load_documents(tmp.path(), &IngestConfig::default()).unwrap();
        assert_eq!(report.files_seen, 3);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("broken.pdf"));
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].page, 0);
        assert!(report.documents[0].source.ends_with("good.txt"));
    }

    #[test]
    fn test_oversized_file_is_a_failure() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("big.txt"), "x".repeat(64)).unwrap();
        let config = IngestConfig {
            max_file_bytes: 16,
            ..Default::default()
        };
        let report = load_documents(tmp.path(), &config).unwrap();
        assert!(report.documents.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].reason.contains("limit"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_does_not_abort_scan() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("top.txt"), "top").unwrap();
        let locked = tmp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("inner.txt"), "inner").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not bind a privileged user.
        let readable = fs::read_dir(&locked).is_ok();

        let config = IngestConfig {
            recursive: true,
            ..IngestConfig::default()
        };
        let result = scan_directory(tmp.path(), &config);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let files = result.unwrap();
        assert!(files.contains(&tmp.path().join("top.txt")));
        if !readable {
            assert_eq!(files.len(), 1);
        }
    }
}
