//! Per-line attribution at a revision.
//!
//! `BlameProvider` answers "who last touched this line, at this revision"
//! on top of git2's blame. Read-only, no side effects. A file absent at
//! the revision is `NotFound` and an unresolvable revision string is
//! `AmbiguousRevision`; any other git fault propagates as `Git` so callers
//! can tell a broken lookup from a history boundary.

use std::path::Path;

use git2::{Oid, Repository};
use tracing::debug;

use crate::error::{Result, TraceError};
use crate::git::repository::{revision_from_commit, GitRepository};
use crate::models::{is_comment_line, BlameOptions, BlamedLine};

pub struct BlameProvider<'r> {
    repo: &'r GitRepository,
}

impl<'r> BlameProvider<'r> {
    pub fn new(repo: &'r GitRepository) -> Self {
        Self { repo }
    }

    /// Blame `target_lines` of `file_path` as of `revision`.
    ///
    /// Lines beyond the end of the file at that revision are silently
    /// absent from the result; an absent file is `NotFound`. With
    /// `skip_comments` set, comment-only lines are excluded.
    pub fn blame(
        &self,
        revision: &str,
        file_path: &str,
        target_lines: &[u32],
        options: &BlameOptions,
    ) -> Result<Vec<BlamedLine>> {
        let newest = self.repo.resolve_revision(revision)?;

        self.repo.with_repo(|repo| {
            let mut result = Vec::with_capacity(target_lines.len());

            for &line in target_lines {
                match blame_one_line(repo, newest, file_path, line, options)? {
                    Some(blamed) => {
                        if options.skip_comments && blamed.is_comment {
                            debug!(
                                line = blamed.line_number,
                                commit = %blamed.revision.oid,
                                "skipping comment-only line"
                            );
                            continue;
                        }
                        result.push(blamed);
                    }
                    None => continue,
                }
            }

            Ok(result)
        })
    }
}

/// Attribute a single line, hopping over ignored revisions.
///
/// libgit2 has no ignore-revs support, so when attribution lands on an
/// ignored commit we re-blame from that commit's first parent at the
/// line's position there. Bounded by the ignore set size.
fn blame_one_line(
    repo: &Repository,
    newest: Oid,
    file_path: &str,
    line: u32,
    options: &BlameOptions,
) -> Result<Option<BlamedLine>> {
    let mut newest = newest;
    let mut line = line;

    for _ in 0..=options.ignore_revisions.len() {
        let mut blame_opts = git2::BlameOptions::new();
        blame_opts.newest_commit(newest);
        if options.ignore_whitespace {
            blame_opts.ignore_whitespace(true);
        }

        // Only a missing path is a history boundary; any other blame
        // failure (object store faults included) must reach the walker's
        // retry/abort path.
        let blame = repo
            .blame_file(Path::new(file_path), Some(&mut blame_opts))
            .map_err(|e| match e.code() {
                git2::ErrorCode::NotFound => TraceError::NotFound {
                    path: file_path.to_string(),
                    revision: newest.to_string(),
                },
                _ => TraceError::Git(e),
            })?;

        let Some(hunk) = blame.get_line(line as usize) else {
            // Line out of bounds at this revision.
            return Ok(None);
        };

        let blamed_oid = hunk.final_commit_id();
        let orig_line =
            hunk.orig_start_line() as u32 + (line - hunk.final_start_line() as u32);
        let orig_path = hunk
            .path()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| file_path.to_string());

        if options.ignore_revisions.contains(&blamed_oid.to_string()) {
            let ignored = repo.find_commit(blamed_oid)?;
            match ignored.parent_id(0) {
                Ok(parent) => {
                    debug!(ignored = %blamed_oid, "hopping over ignored revision");
                    newest = parent;
                    line = orig_line;
                    continue;
                }
                // Ignored root commit: nothing older to attribute to.
                Err(_) => return Ok(None),
            }
        }

        let commit = repo.find_commit(blamed_oid)?;
        let content = line_content_at(repo, &commit, &orig_path, orig_line)?;

        return Ok(Some(BlamedLine {
            revision: revision_from_commit(&commit),
            file_path: orig_path,
            line_number: orig_line,
            is_comment: is_comment_line(&content),
            line_content: content,
        }));
    }

    Ok(None)
}

fn line_content_at(
    repo: &Repository,
    commit: &git2::Commit,
    file_path: &str,
    line: u32,
) -> Result<String> {
    let tree = commit.tree()?;
    let entry = tree
        .get_path(Path::new(file_path))
        .map_err(|_| TraceError::NotFound {
            path: file_path.to_string(),
            revision: commit.id().to_string(),
        })?;
    let obj = entry.to_object(repo)?;
    let blob = obj.as_blob().ok_or_else(|| TraceError::NotFound {
        path: file_path.to_string(),
        revision: commit.id().to_string(),
    })?;

    let content = String::from_utf8_lossy(blob.content());
    Ok(content
        .lines()
        .nth(line as usize - 1)
        .unwrap_or("")
        .to_string())
}
