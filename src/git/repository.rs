//! Read-only adapter over a git repository.
//!
//! Wraps `git2::Repository` behind a mutex so the handle can be shared
//! across the worker pool; all access goes through `with_repo` and no
//! operation mutates the repository.

use std::path::Path;
use std::sync::Mutex;

use git2::{ErrorCode, Oid, Repository};

use crate::error::{Result, TraceError};
use crate::models::Revision;

pub struct GitRepository {
    repo: Mutex<Repository>,
    pub path: String,
}

impl GitRepository {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let repo = Repository::discover(&path)?;

        Ok(Self {
            repo: Mutex::new(repo),
            path: path_str,
        })
    }

    pub fn with_repo<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Repository) -> Result<T>,
    {
        let repo = self
            .repo
            .lock()
            .map_err(|_| TraceError::Internal("Lock poisoned".to_string()))?;
        f(&repo)
    }

    /// Resolve a revision string to a commit OID.
    ///
    /// A string matching more than one object is `AmbiguousRevision`, an
    /// unresolvable one is `NotFound`.
    pub fn resolve_revision(&self, revision: &str) -> Result<Oid> {
        self.with_repo(|repo| {
            let obj = repo.revparse_single(revision).map_err(|e| match e.code() {
                ErrorCode::Ambiguous => TraceError::AmbiguousRevision(revision.to_string()),
                _ => TraceError::NotFound {
                    path: String::new(),
                    revision: revision.to_string(),
                },
            })?;
            let commit = obj.peel_to_commit().map_err(|_| TraceError::NotFound {
                path: String::new(),
                revision: revision.to_string(),
            })?;
            Ok(commit.id())
        })
    }

    /// Snapshot commit metadata for a revision.
    pub fn revision_info(&self, revision: &str) -> Result<Revision> {
        let oid = self.resolve_revision(revision)?;
        self.with_repo(|repo| {
            let commit = repo.find_commit(oid)?;
            Ok(revision_from_commit(&commit))
        })
    }

    /// First parent OID of a revision, `None` for a root commit.
    pub fn first_parent(&self, revision: &str) -> Result<Option<String>> {
        let oid = self.resolve_revision(revision)?;
        self.with_repo(|repo| {
            let commit = repo.find_commit(oid)?;
            Ok(commit.parent_id(0).ok().map(|id| id.to_string()))
        })
    }

    /// Full file content at a revision.
    ///
    /// `NotFound` when the path is absent from the revision's tree.
    pub fn file_content_at(&self, file_path: &str, revision: &str) -> Result<String> {
        let oid = self.resolve_revision(revision)?;
        self.with_repo(|repo| {
            let commit = repo.find_commit(oid)?;
            let tree = commit.tree()?;

            let entry = tree
                .get_path(Path::new(file_path))
                .map_err(|_| TraceError::NotFound {
                    path: file_path.to_string(),
                    revision: revision.to_string(),
                })?;

            let obj = entry.to_object(repo)?;
            let blob = obj.as_blob().ok_or_else(|| TraceError::NotFound {
                path: file_path.to_string(),
                revision: revision.to_string(),
            })?;

            Ok(String::from_utf8_lossy(blob.content()).to_string())
        })
    }
}

pub fn revision_from_commit(commit: &git2::Commit) -> Revision {
    let author = commit.author();
    Revision {
        oid: commit.id().to_string(),
        parents: commit.parent_ids().map(|id| id.to_string()).collect(),
        author_name: author.name().unwrap_or("Unknown").to_string(),
        author_email: author.email().unwrap_or("").to_string(),
        summary: commit.summary().unwrap_or("").to_string(),
        timestamp: commit.time().seconds(),
    }
}
