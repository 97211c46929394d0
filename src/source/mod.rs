//! Work-item retrieval.
//!
//! Each source turns a user-supplied reference (pull request, local paths,
//! branch range) into a [`WorkItem`]: the files to review plus the metadata
//! shown in reports. Every failure here happens before dispatch.

pub mod git;
pub mod github;
pub mod local;

use crate::config::ScannerConfig;
use crate::models::{JobMetadata, ReviewJob, SourceFile, ThresholdConfig};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Why a work item could not be resolved.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("no eligible source files in {0}")]
    NoEligibleFiles(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("GitHub request failed: {0}")]
    Http(String),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Files to review plus where they came from.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub metadata: JobMetadata,
    pub files: Vec<SourceFile>,
}

impl WorkItem {
    /// Freeze into a job with the given thresholds.
    pub fn into_job(self, thresholds: ThresholdConfig) -> ReviewJob {
        ReviewJob::new(self.metadata, self.files, thresholds)
    }
}

/// Which files are eligible for review.
#[derive(Debug, Clone)]
pub struct FileFilter {
    /// Extensions without the dot.
    pub extensions: Vec<String>,
    /// Path components that exclude a file (`node_modules`, `target`).
    pub excludes: Vec<String>,
    pub max_file_size: usize,
    pub max_files: usize,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::from(&ScannerConfig::default())
    }
}

impl From<&ScannerConfig> for FileFilter {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excludes: config.excludes.clone(),
            max_file_size: config.max_file_size,
            max_files: config.max_files,
        }
    }
}

impl FileFilter {
    /// True when the file's extension is one of the wanted ones.
    pub fn accepts_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|wanted| wanted == ext))
    }

    /// Extension check plus exclusion of every component of a
    /// repository-relative path.
    pub fn accepts_path(&self, path: &str) -> bool {
        let path = Path::new(path);
        self.accepts_extension(path)
            && !path
                .components()
                .any(|c| self.is_excluded(&c.as_os_str().to_string_lossy()))
    }

    /// True for excluded directory or file names.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excludes.iter().any(|pattern| name == pattern)
    }

    pub fn accepts_size(&self, size: usize) -> bool {
        size <= self.max_file_size
    }
}

/// Collects files in order, dropping duplicates and stopping at the limit.
pub(crate) struct FileSet {
    files: Vec<SourceFile>,
    seen: BTreeSet<String>,
    limit: usize,
    skipped: usize,
}

impl FileSet {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            files: Vec::new(),
            seen: BTreeSet::new(),
            limit,
            skipped: 0,
        }
    }

    pub(crate) fn push(&mut self, file: SourceFile) {
        if self.seen.contains(&file.path) {
            return;
        }
        if self.files.len() >= self.limit {
            self.skipped += 1;
            return;
        }
        self.seen.insert(file.path.clone());
        self.files.push(file);
    }

    pub(crate) fn finish(self, origin: &str) -> Result<Vec<SourceFile>, ResolveError> {
        if self.skipped > 0 {
            warn!(
                "File limit of {} reached; {} more file(s) not reviewed",
                self.limit, self.skipped
            );
        }
        if self.files.is_empty() {
            return Err(ResolveError::NoEligibleFiles(origin.to_string()));
        }
        Ok(self.files)
    }
}

/// Parse a GitHub URL into owner and repository name.
pub fn parse_repo_url(url: &str) -> Option<(String, String)> {
    let url = url.trim_end_matches('/').trim_end_matches(".git");

    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))
        .or_else(|| url.strip_prefix("git@github.com:"))?;

    let mut parts = rest.split('/');
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => {
            Some((owner.to_string(), repo.to_string()))
        }
        _ => None,
    }
}

const DEMO_PATH: &str = "order_processor.py";
const DEMO_SOURCE: &str = include_str!("../../fixtures/order_processor.py");

/// The bundled sample file used by `demo`.
pub fn demo_work_item() -> WorkItem {
    WorkItem {
        metadata: JobMetadata {
            reference: "demo".to_string(),
            title: "Demo: order processing module".to_string(),
            author: "reviewgate".to_string(),
            head_branch: "demo".to_string(),
            base_branch: "main".to_string(),
        },
        files: vec![SourceFile::new(DEMO_PATH, DEMO_SOURCE)],
    }
}
