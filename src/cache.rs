//! Persistent cache for structural-diff tool output.
//!
//! One JSON file per project (`<project>.json`, commit → file → raw tool
//! output) so repeated traces over the same history never re-invoke the
//! tool for a previously-seen (commit, file) pair. Entries are immutable
//! once written: reads take only a read lock, file writes are serialized
//! per project. The cache has an explicit open/flush lifetime owned by the
//! run; it is injected into the structural mapper, never ambient state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, TraceError};

pub struct MappingCache {
    dir: PathBuf,
    projects: RwLock<HashMap<String, Arc<ProjectCache>>>,
}

struct ProjectCache {
    name: String,
    entries: RwLock<HashMap<(String, String), Arc<Value>>>,
    /// Serializes file writes for this project.
    write_lock: Mutex<()>,
}

impl MappingCache {
    /// Open the cache rooted at `dir`, creating it if needed. Project
    /// files are loaded lazily on first access.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            projects: RwLock::new(HashMap::new()),
        })
    }

    pub fn get(&self, project: &str, commit: &str, file: &str) -> Option<Arc<Value>> {
        let project = self.project(project).ok()?;
        let entries = project.entries.read().ok()?;
        entries
            .get(&(commit.to_string(), file.to_string()))
            .cloned()
    }

    pub fn put(&self, project: &str, commit: &str, file: &str, value: Value) -> Result<()> {
        let project = self.project(project)?;

        {
            let mut entries = project
                .entries
                .write()
                .map_err(|_| TraceError::Internal("Lock poisoned".to_string()))?;
            entries.insert((commit.to_string(), file.to_string()), Arc::new(value));
        }

        self.persist(&project)
    }

    /// Drop every entry for a project, on disk included. The only way a
    /// cache entry is ever invalidated.
    pub fn clear(&self, project: &str) -> Result<()> {
        let mut projects = self
            .projects
            .write()
            .map_err(|_| TraceError::Internal("Lock poisoned".to_string()))?;
        projects.remove(project);

        let path = self.project_file(project);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        info!(project, "mapping cache cleared");
        Ok(())
    }

    /// Rewrite every loaded project file. `put` already persists, so this
    /// exists for the explicit end-of-run lifecycle.
    pub fn flush(&self) -> Result<()> {
        let projects: Vec<Arc<ProjectCache>> = {
            let guard = self
                .projects
                .read()
                .map_err(|_| TraceError::Internal("Lock poisoned".to_string()))?;
            guard.values().cloned().collect()
        };

        for project in projects {
            self.persist(&project)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let projects = self.projects.read().ok();
        let (loaded, entries) = projects
            .map(|map| {
                let entries = map
                    .values()
                    .filter_map(|p| p.entries.read().ok().map(|e| e.len()))
                    .sum();
                (map.len(), entries)
            })
            .unwrap_or((0, 0));

        CacheStats {
            loaded_projects: loaded,
            total_entries: entries,
        }
    }

    fn project(&self, name: &str) -> Result<Arc<ProjectCache>> {
        {
            let projects = self
                .projects
                .read()
                .map_err(|_| TraceError::Internal("Lock poisoned".to_string()))?;
            if let Some(project) = projects.get(name) {
                return Ok(project.clone());
            }
        }

        let mut projects = self
            .projects
            .write()
            .map_err(|_| TraceError::Internal("Lock poisoned".to_string()))?;
        // Another thread may have loaded it between the locks.
        if let Some(project) = projects.get(name) {
            return Ok(project.clone());
        }

        let entries = self.load_project_file(name);
        debug!(project = name, entries = entries.len(), "project cache loaded");

        let project = Arc::new(ProjectCache {
            name: name.to_string(),
            entries: RwLock::new(entries),
            write_lock: Mutex::new(()),
        });
        projects.insert(name.to_string(), project.clone());
        Ok(project)
    }

    fn load_project_file(&self, name: &str) -> HashMap<(String, String), Arc<Value>> {
        let path = self.project_file(name);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return HashMap::new();
        };

        let parsed: HashMap<String, HashMap<String, Value>> = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(project = name, error = %e, "corrupt cache file ignored");
                return HashMap::new();
            }
        };

        let mut entries = HashMap::new();
        for (commit, files) in parsed {
            for (file, value) in files {
                entries.insert((commit.clone(), file), Arc::new(value));
            }
        }
        entries
    }

    fn persist(&self, project: &ProjectCache) -> Result<()> {
        let _guard = project
            .write_lock
            .lock()
            .map_err(|_| TraceError::Internal("Lock poisoned".to_string()))?;

        let nested: HashMap<String, HashMap<String, Value>> = {
            let entries = project
                .entries
                .read()
                .map_err(|_| TraceError::Internal("Lock poisoned".to_string()))?;

            let mut nested: HashMap<String, HashMap<String, Value>> = HashMap::new();
            for ((commit, file), value) in entries.iter() {
                nested
                    .entry(commit.clone())
                    .or_default()
                    .insert(file.clone(), (**value).clone());
            }
            nested
        };

        let path = self.project_file(&project.name);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&nested)
            .map_err(|e| TraceError::Internal(e.to_string()))?;

        // Write-then-rename keeps readers away from partial files; one
        // retry covers a concurrent writer racing on the temp path.
        if let Err(first) = write_and_rename(&tmp, &path, &body) {
            warn!(project = %project.name, error = %first, "cache write failed, retrying");
            write_and_rename(&tmp, &path, &body)
                .map_err(|e| TraceError::CacheWriteConflict(e.to_string()))?;
        }
        Ok(())
    }

    fn project_file(&self, name: &str) -> PathBuf {
        // Project ids may contain path separators (owner/repo).
        let sanitized = name.replace(['/', '\\'], "_");
        self.dir.join(format!("{sanitized}.json"))
    }
}

fn write_and_rename(tmp: &Path, path: &Path, body: &str) -> std::io::Result<()> {
    std::fs::write(tmp, body)?;
    std::fs::rename(tmp, path)
}

#[derive(Debug)]
pub struct CacheStats {
    pub loaded_projects: usize,
    pub total_entries: usize,
}
