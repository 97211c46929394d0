//! Branch diff of a git repository.
//!
//! Reviews the files changed on `head` since it diverged from `base`
//! (`git diff base...head`). Remote repositories are cloned into a
//! temporary directory that is removed once the files have been read.

use super::{FileFilter, FileSet, ResolveError, WorkItem};
use crate::models::{JobMetadata, SourceFile};
use git2::{Commit, Delta, FetchOptions, Progress, RemoteCallbacks, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};

/// Which two branches to compare.
#[derive(Debug, Clone)]
pub struct BranchRange {
    pub base: String,
    pub head: String,
}

/// Open a local repository or clone a remote one.
///
/// The returned `TempDir` owns the clone; drop it after reading.
pub fn open_or_clone(spec: &str, show_progress: bool) -> Result<(Repository, Option<TempDir>), ResolveError> {
    let path = Path::new(spec);
    if path.exists() {
        debug!("Opening local repository: {}", path.display());
        return Ok((Repository::open(path)?, None));
    }

    if !looks_remote(spec) {
        return Err(ResolveError::NotFound(spec.to_string()));
    }

    let temp = TempDir::new()?;
    let repo = clone(spec, temp.path(), show_progress)?;
    Ok((repo, Some(temp)))
}

fn looks_remote(spec: &str) -> bool {
    spec.starts_with("https://") || spec.starts_with("http://") || spec.starts_with("git@")
}

fn clone(url: &str, into: &Path, show_progress: bool) -> Result<Repository, ResolveError> {
    info!("Cloning repository: {}", url);

    let progress = if show_progress {
        let pb = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} objects")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    } else {
        ProgressBar::hidden()
    };

    let bar = progress.clone();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |stats: Progress<'_>| {
        bar.set_length(stats.total_objects() as u64);
        bar.set_position(stats.received_objects() as u64);
        true
    });

    // Full history: the merge base may be arbitrarily far back.
    let mut fetch_opts = FetchOptions::new();
    fetch_opts.remote_callbacks(callbacks);

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_opts);
    let repo = builder.clone(url, into)?;

    progress.finish_and_clear();
    info!("Cloned into {}", into.display());
    Ok(repo)
}

/// Resolve a branch name, falling back to the `origin/` remote branch.
fn branch_commit<'r>(repo: &'r Repository, name: &str) -> Result<Commit<'r>, ResolveError> {
    let object = repo
        .revparse_single(name)
        .or_else(|_| repo.revparse_single(&format!("origin/{}", name)))
        .map_err(|_| ResolveError::NotFound(format!("branch '{}'", name)))?;
    Ok(object.peel_to_commit()?)
}

/// Files added or modified on `head` since its merge base with `base`.
pub fn diff_branches(
    repo: &Repository,
    range: &BranchRange,
    filter: &FileFilter,
) -> Result<Vec<SourceFile>, ResolveError> {
    let base = branch_commit(repo, &range.base)?;
    let head = branch_commit(repo, &range.head)?;
    let merge_base = repo.merge_base(base.id(), head.id())?;
    let base_tree = repo.find_commit(merge_base)?.tree()?;
    let head_tree = head.tree()?;

    let diff = repo.diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)?;
    let mut set = FileSet::new(filter.max_files);

    for delta in diff.deltas() {
        if matches!(delta.status(), Delta::Deleted) {
            continue;
        }
        let new_file = delta.new_file();
        let Some(path) = new_file.path().map(|p| p.to_string_lossy().replace('\\', "/")) else {
            continue;
        };
        if !filter.accepts_path(&path) {
            continue;
        }

        let blob = repo.find_blob(new_file.id())?;
        if blob.is_binary() || !filter.accepts_size(blob.size()) {
            debug!("Skipping {} (binary or too large)", path);
            continue;
        }
        match std::str::from_utf8(blob.content()) {
            Ok(text) => set.push(SourceFile::new(path, text)),
            Err(_) => debug!("Skipping {} (not UTF-8)", path),
        }
    }

    set.finish(&format!("{}...{}", range.base, range.head))
}

/// Resolve a branch range of a local path or remote URL into a work item.
pub fn resolve(
    spec: &str,
    range: &BranchRange,
    filter: &FileFilter,
    show_progress: bool,
) -> Result<WorkItem, ResolveError> {
    let (repo, _clone_dir) = open_or_clone(spec, show_progress)?;
    let files = diff_branches(&repo, range, filter)?;
    info!(
        "{} changed file(s) between {} and {}",
        files.len(),
        range.base,
        range.head
    );

    Ok(WorkItem {
        metadata: JobMetadata {
            reference: format!("{} {}...{}", spec, range.base, range.head),
            title: format!("Changes on {} against {}", range.head, range.base),
            author: head_author(&repo, &range.head).unwrap_or_default(),
            head_branch: range.head.clone(),
            base_branch: range.base.clone(),
        },
        files,
    })
}

fn head_author(repo: &Repository, head: &str) -> Option<String> {
    let commit = branch_commit(repo, head).ok()?;
    let author = commit.author();
    author.name().map(String::from)
}
