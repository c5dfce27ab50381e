//! Line-mapping strategies.
//!
//! One interface, two implementations: `StructuralMapper` when a
//! structural-diff tool is registered for the file's language,
//! `TextualMapper` as the language-agnostic fallback. The registry does
//! the selection so the chain walker never branches on file type.

pub mod structural;
pub mod textual;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::MappingCache;
use crate::error::{Result, TraceError};
use crate::git::repository::GitRepository;
use crate::models::MappingResult;

pub use structural::{StructuralMapper, StructuralTool};
pub use textual::TextualMapper;

/// Classifies what happened to a line relative to the commit's first
/// parent.
pub trait LineMapper {
    fn map(
        &self,
        commit: &str,
        file_path: &str,
        line_number: u32,
        line_content: &str,
    ) -> Result<MappingResult>;
}

/// Per-language strategy selection with the failure policy applied:
/// an unavailable tool downgrades the file's language to textual for the
/// rest of the run, a timed-out or failed invocation degrades that one
/// step to `Unknown`.
pub struct MapperRegistry<'r> {
    structural: Vec<StructuralMapper>,
    textual: TextualMapper<'r>,
}

impl<'r> MapperRegistry<'r> {
    pub fn new(repo: &'r GitRepository) -> Self {
        Self {
            structural: Vec::new(),
            textual: TextualMapper::new(repo),
        }
    }

    /// Register a structural tool for the extensions it covers.
    pub fn register_tool(
        mut self,
        tool: StructuralTool,
        cache: Arc<MappingCache>,
        project: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        self.structural
            .push(StructuralMapper::new(tool, cache, project, timeout));
        self
    }
}

impl LineMapper for MapperRegistry<'_> {
    fn map(
        &self,
        commit: &str,
        file_path: &str,
        line_number: u32,
        line_content: &str,
    ) -> Result<MappingResult> {
        if let Some(mapper) = self.structural.iter().find(|m| m.handles(file_path)) {
            match mapper.map(commit, file_path, line_number, line_content) {
                Ok(result) => return Ok(result),
                Err(TraceError::ToolUnavailable(name)) => {
                    warn!(tool = %name, file = file_path, "structural tool unavailable, using textual mapper");
                    mapper.mark_disabled();
                }
                Err(e @ (TraceError::ToolTimeout(_) | TraceError::ToolInvocationFailure(_))) => {
                    warn!(error = %e, file = file_path, "structural mapping failed for this step");
                    return Ok(MappingResult::unknown(e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        self.textual.map(commit, file_path, line_number, line_content)
    }
}
