//! Line mapping through an external structural-diff tool.
//!
//! The tool is invoked once per (commit, file) and reports statement-level
//! correspondences between the commit's tree and its first parent's. The
//! raw output is persisted in the `MappingCache`, so repeated traces over
//! the same history are one lookup per previously-seen pair.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::MappingCache;
use crate::error::{Result, TraceError};
use crate::mapper::LineMapper;
use crate::models::{ChangeClassification, MappingEvidence, MappingResult};

/// Description of a registered structural-diff tool.
///
/// The calling convention is fixed: the tool receives the project id, the
/// commit hash, an output path, and the file path, and writes a JSON array
/// of per-file statement mappings to the output path.
#[derive(Debug, Clone)]
pub struct StructuralTool {
    /// Short name for logs and errors.
    pub name: String,
    /// Program to run (e.g. `java`).
    pub program: String,
    /// Arguments placed before the generated ones (e.g. `-jar Tool.jar`).
    pub prefix_args: Vec<String>,
    /// Directory the tool runs in; also holds its scratch output.
    pub working_dir: PathBuf,
    /// File extensions (without dot, lowercase) the tool understands.
    pub extensions: Vec<String>,
}

impl StructuralTool {
    pub fn handles(&self, file_path: &str) -> bool {
        Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }

    /// Missing runtime/binary is not fatal to a run; the registry
    /// downgrades to the textual mapper instead.
    pub fn is_available(&self) -> bool {
        if !self.working_dir.is_dir() {
            return false;
        }
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.exists();
        }
        // Bare program name: resolve against PATH.
        std::env::var_os("PATH")
            .map(|paths| {
                std::env::split_paths(&paths).any(|dir| dir.join(&self.program).is_file())
            })
            .unwrap_or(false)
    }
}

pub struct StructuralMapper {
    tool: StructuralTool,
    cache: Arc<MappingCache>,
    project: String,
    timeout: Duration,
    /// Set after the first unavailability so the run probes only once.
    disabled: AtomicBool,
}

impl StructuralMapper {
    pub fn new(
        tool: StructuralTool,
        cache: Arc<MappingCache>,
        project: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            tool,
            cache,
            project: project.into(),
            timeout,
            disabled: AtomicBool::new(false),
        }
    }

    pub fn handles(&self, file_path: &str) -> bool {
        !self.disabled.load(Ordering::Relaxed) && self.tool.handles(file_path)
    }

    pub fn mark_disabled(&self) {
        self.disabled.store(true, Ordering::Relaxed);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    /// Raw tool output for (commit, file), from the cache or a fresh
    /// invocation.
    fn mapping_output(&self, commit: &str, file_path: &str) -> Result<Arc<Value>> {
        if let Some(cached) = self.cache.get(&self.project, commit, file_path) {
            debug!(commit, file = file_path, "structural mapping cache hit");
            return Ok(cached);
        }

        if !self.tool.is_available() {
            return Err(TraceError::ToolUnavailable(self.tool.name.clone()));
        }

        let output = self.invoke_tool(commit, file_path)?;
        self.cache
            .put(&self.project, commit, file_path, output.clone())?;
        Ok(Arc::new(output))
    }

    fn invoke_tool(&self, commit: &str, file_path: &str) -> Result<Value> {
        // Unique per invocation: concurrent walks may hit the tool at once.
        static INVOCATION: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let serial = INVOCATION.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let out_path = self
            .tool
            .working_dir
            .join(format!("mapping-{}-{serial}.json", std::process::id()));

        let mut child = Command::new(&self.tool.program)
            .args(&self.tool.prefix_args)
            .arg("-p")
            .arg(&self.project)
            .arg("-c")
            .arg(commit)
            .arg("-o")
            .arg(&out_path)
            .arg("-f")
            .arg(file_path)
            .current_dir(&self.tool.working_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| TraceError::ToolInvocationFailure(e.to_string()))?;

        let status = self.wait_with_timeout(&mut child)?;
        if !status.success() {
            return Err(TraceError::ToolInvocationFailure(format!(
                "{} exited with {status}",
                self.tool.name
            )));
        }

        let raw = std::fs::read_to_string(&out_path)
            .map_err(|e| TraceError::ToolInvocationFailure(e.to_string()))?;
        let _ = std::fs::remove_file(&out_path);

        serde_json::from_str(&raw).map_err(|e| TraceError::ToolInvocationFailure(e.to_string()))
    }

    /// Poll the child until it exits or the hard timeout expires; on
    /// expiry the child is killed and the step (not the run) fails.
    fn wait_with_timeout(&self, child: &mut std::process::Child) -> Result<std::process::ExitStatus> {
        let start = Instant::now();
        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| TraceError::ToolInvocationFailure(e.to_string()))?
            {
                return Ok(status);
            }
            if start.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                warn!(tool = %self.tool.name, "structural tool timed out");
                return Err(TraceError::ToolTimeout(self.timeout.as_secs()));
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl LineMapper for StructuralMapper {
    fn map(
        &self,
        commit: &str,
        file_path: &str,
        line_number: u32,
        _line_content: &str,
    ) -> Result<MappingResult> {
        let output = self.mapping_output(commit, file_path)?;
        Ok(classify_from_output(&output, file_path, line_number))
    }
}

/// Select the statement entry for (file, line) and classify from it.
fn classify_from_output(output: &Value, file_path: &str, line_number: u32) -> MappingResult {
    let entries = output.as_array().map(|v| v.as_slice()).unwrap_or(&[]);

    let statement = entries
        .iter()
        .filter(|entry| {
            entry
                .get("dst")
                .or_else(|| entry.get("targetFile"))
                .and_then(Value::as_str)
                == Some(file_path)
        })
        .flat_map(|entry| {
            entry
                .get("stmt")
                .and_then(Value::as_array)
                .map(|v| v.as_slice())
                .unwrap_or(&[])
        })
        .find(|stmt| {
            stmt.get("srcStmtStartLine").and_then(Value::as_u64) == Some(u64::from(line_number))
        });

    let Some(statement) = statement else {
        // The tool saw the file but reported nothing for this line:
        // absence of evidence is weak but directional evidence of novelty.
        return MappingResult::insert(0.8, MappingEvidence::StructuralSilent);
    };

    let change_type = statement
        .get("stmtChangeType")
        .and_then(Value::as_str)
        .unwrap_or("Unknown");

    match parse_change_type(change_type) {
        ChangeClassification::Insert => MappingResult::insert(
            0.9,
            MappingEvidence::Structural {
                change_type: change_type.to_string(),
            },
        ),
        ChangeClassification::Unknown => MappingResult::unknown(format!(
            "unrecognized statement change type: {change_type}"
        )),
        classification => {
            let source_line = statement
                .get("srcStmtStartLine")
                .and_then(Value::as_u64)
                .map(|n| n as u32);
            MappingResult::new(
                classification,
                source_line,
                0.85,
                MappingEvidence::Structural {
                    change_type: change_type.to_string(),
                },
            )
        }
    }
}

fn parse_change_type(raw: &str) -> ChangeClassification {
    match raw {
        "Insert" => ChangeClassification::Insert,
        "Delete" => ChangeClassification::Delete,
        "Update" => ChangeClassification::Update,
        "Move" => ChangeClassification::Move,
        "Unchanged" => ChangeClassification::Unchanged,
        _ => ChangeClassification::Unknown,
    }
}
