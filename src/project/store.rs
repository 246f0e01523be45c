use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::Project;

/// How a save was triggered. Controls the save-state label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Manual,
    Auto,
}

/// Result of a save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written(SaveKind),
    /// The project is submitted; nothing was written.
    Frozen,
}

impl SaveOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SaveOutcome::Written(SaveKind::Manual) => "Saved",
            SaveOutcome::Written(SaveKind::Auto) => "Auto-saved",
            SaveOutcome::Frozen => "Submitted (read-only)",
        }
    }
}

/// Shared save-state indicator ("Saved", "Auto-saved", "Unsaved changes"...).
///
/// The debounced auto-save task updates it from the background, so it is
/// a cheap clonable handle rather than a field on the session.
#[derive(Clone)]
pub struct SaveStateHandle(Arc<StdMutex<String>>);

impl SaveStateHandle {
    pub fn new(initial: &str) -> Self {
        Self(Arc::new(StdMutex::new(initial.to_string())))
    }

    pub fn set(&self, text: &str) {
        if let Ok(mut state) = self.0.lock() {
            *state = text.to_string();
        }
    }

    pub fn get(&self) -> String {
        self.0
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }
}

/// Per-user, per-project snapshot store.
///
/// Layout:
///   {base_path}/{user_id}/{project_name}.json   — one snapshot per project
///   {base_path}/exec_log.json                   — bounded execution log
///
/// Snapshots are JSON documents {files, activeFileId, lastEdited, submitted}.
pub struct ProjectStore {
    base_path: PathBuf,
}

impl ProjectStore {
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;
        info!("Project store opened at {}", path.display());
        Ok(Self {
            base_path: path.to_path_buf(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns the per-user directory, creating it if needed
    fn user_dir(&self, user_id: &str) -> Result<PathBuf> {
        let dir = self.base_path.join(sanitize_component(user_id));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn snapshot_path(&self, user_id: &str, project_name: &str) -> Result<PathBuf> {
        Ok(self
            .user_dir(user_id)?
            .join(format!("{}.json", sanitize_component(project_name))))
    }

    /// Loads a project snapshot, or synthesizes a starter project.
    ///
    /// A corrupt/unreadable snapshot is logged and treated the same as a
    /// missing one (silent recovery, no user-facing error).
    pub fn load(&self, user_id: &str, project_name: &str) -> Result<Project> {
        let path = self.snapshot_path(user_id, project_name)?;
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<Project>(&raw) {
                    Ok(mut project) => {
                        project.restore_active_invariant();
                        return Ok(project);
                    }
                    Err(e) => {
                        warn!(
                            "Failed to parse saved project {}, resetting: {e}",
                            path.display()
                        );
                    }
                },
                Err(e) => {
                    warn!("Failed to read saved project {}: {e}", path.display());
                }
            }
        }
        Ok(Project::starter())
    }

    /// Writes the snapshot and stamps `last_edited`.
    ///
    /// No-op once the project is submitted — stored content never changes
    /// post-submission, even if the in-memory buffer was altered.
    pub fn save(
        &self,
        user_id: &str,
        project_name: &str,
        project: &mut Project,
        kind: SaveKind,
    ) -> Result<SaveOutcome> {
        if project.submitted {
            return Ok(SaveOutcome::Frozen);
        }
        project.last_edited = chrono::Utc::now().timestamp_millis();
        let path = self.snapshot_path(user_id, project_name)?;
        fs::write(&path, serde_json::to_string(project)?)?;
        Ok(SaveOutcome::Written(kind))
    }

    /// Freezes the project: flips the flag and persists it exactly once.
    /// All subsequent `save` calls are no-ops.
    pub fn submit(&self, user_id: &str, project_name: &str, project: &mut Project) -> Result<()> {
        if project.submitted {
            return Ok(());
        }
        project.last_edited = chrono::Utc::now().timestamp_millis();
        project.submitted = true;
        let path = self.snapshot_path(user_id, project_name)?;
        fs::write(&path, serde_json::to_string(project)?)?;
        info!("Project '{project_name}' submitted by {user_id}");
        Ok(())
    }
}

/// Sanitizes a user id or project name for safe use as a path component.
fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Debounced auto-save: each edit reschedules a save after a quiet
/// period, coalescing rapid keystrokes into a single write. A pending
/// save is replaced, not queued.
pub struct Autosaver {
    quiet: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Autosaver {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    /// Schedules a save after the quiet period, replacing any pending one.
    pub fn schedule(
        &mut self,
        store: Arc<ProjectStore>,
        project: Arc<Mutex<Project>>,
        user_id: String,
        project_name: String,
        save_state: SaveStateHandle,
    ) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        let quiet = self.quiet;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let mut project = project.lock().await;
            match store.save(&user_id, &project_name, &mut project, SaveKind::Auto) {
                Ok(outcome) => save_state.set(outcome.label()),
                Err(e) => warn!("Auto-save of '{project_name}' failed: {e}"),
            }
        }));
    }

    /// Drops any pending save without writing.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        self.cancel();
    }
}
