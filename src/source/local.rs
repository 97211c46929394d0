//! Local files and directories.

use super::{FileFilter, FileSet, ResolveError, WorkItem};
use crate::models::{JobMetadata, SourceFile};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Collect reviewable files from the given paths.
///
/// Files named explicitly still go through the extension filter.
/// Directories are walked recursively, skipping excluded and hidden names.
pub fn collect(paths: &[PathBuf], filter: &FileFilter) -> Result<WorkItem, ResolveError> {
    let mut set = FileSet::new(filter.max_files);

    for path in paths {
        if !path.exists() {
            return Err(ResolveError::NotFound(path.display().to_string()));
        }

        if path.is_file() {
            if let Some(file) = read_if_eligible(path, filter) {
                set.push(file);
            }
            continue;
        }

        let walker = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || {
                    let name = entry.file_name().to_string_lossy();
                    !name.starts_with('.') && !filter.is_excluded(&name)
                }
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_file() {
                if let Some(file) = read_if_eligible(entry.path(), filter) {
                    set.push(file);
                }
            }
        }
    }

    let origin = describe(paths);
    let files = set.finish(&origin)?;

    Ok(WorkItem {
        metadata: JobMetadata {
            reference: origin,
            title: format!("Local review of {} file(s)", files.len()),
            ..JobMetadata::default()
        },
        files,
    })
}

fn describe(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_if_eligible(path: &Path, filter: &FileFilter) -> Option<SourceFile> {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let shown = normalized.strip_prefix("./").unwrap_or(&normalized).to_string();

    if !filter.accepts_extension(path) {
        return None;
    }

    let size = fs::metadata(path).map(|m| m.len() as usize).unwrap_or(usize::MAX);
    if !filter.accepts_size(size) {
        debug!("Skipping {} ({} bytes over limit)", shown, size);
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => Some(SourceFile::new(shown, content)),
        Err(e) => {
            warn!("Failed to read {}: {}", shown, e);
            None
        }
    }
}
