//! Blame data types.
//!
//! Per-line attribution of the commit that most recently touched a line at
//! a given revision. One `BlamedLine` is created per blame hit and never
//! mutated afterwards.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Read-only snapshot of a commit, owned by the repository.
#[derive(Debug, Clone, Serialize)]
pub struct Revision {
    /// Full commit OID.
    pub oid: String,
    /// Parent OIDs, first parent first. Empty for a root commit.
    pub parents: Vec<String>,
    /// Name of the commit author.
    pub author_name: String,
    /// Email of the commit author.
    pub author_email: String,
    /// First line of the commit message.
    pub summary: String,
    /// Unix timestamp of the commit.
    pub timestamp: i64,
}

impl Revision {
    /// First parent OID, if any.
    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(|p| p.as_str())
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Commit time as a UTC datetime. Out-of-range timestamps collapse to
    /// the epoch.
    pub fn authored_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default()
    }
}

/// Attribution for a single line at a single revision.
#[derive(Debug, Clone, Serialize)]
pub struct BlamedLine {
    /// Commit that most recently touched the line.
    pub revision: Revision,
    pub file_path: String,
    /// 1-based line number at the blamed revision.
    pub line_number: u32,
    pub line_content: String,
    /// Whether the line is comment-only at this revision.
    pub is_comment: bool,
}

/// Options for a blame call.
#[derive(Debug, Clone, Default)]
pub struct BlameOptions {
    /// Ignore whitespace-only changes when attributing lines.
    pub ignore_whitespace: bool,
    /// Exclude comment-only lines from the result.
    pub skip_comments: bool,
    /// Commits attribution must hop over (e.g. bulk reformat commits).
    pub ignore_revisions: HashSet<String>,
}

/// Comment-only detection used by blame filtering and the textual mapper.
///
/// Deliberately cheap: prefix checks cover the line comment styles of the
/// languages the tracer targets plus block-comment continuation lines.
pub fn is_comment_line(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.starts_with("//")
        || trimmed.starts_with("/*")
        || trimmed.starts_with("*")
        || trimmed.starts_with("#")
}
