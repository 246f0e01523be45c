use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{Local, TimeZone};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::context::UserContext;
use crate::editor::{EditOutcome, EditorSurface, PlainBuffer};
use crate::project::store::{Autosaver, ProjectStore, SaveKind, SaveStateHandle};
use crate::project::Project;
use crate::runner::preview::FilePreview;
use crate::runner::{ExecutionRouter, OutputMode};

const DEFAULT_PROJECT_NAME: &str = "My Vertex Project";

/// What the session wants done with one handled input line.
pub enum Reply {
    Text(String),
    Silent,
    Quit,
}

enum InputMode {
    Command,
    /// Collecting buffer lines for /edit until a lone "." line.
    Editing(Vec<String>),
}

/// Interactive playground session for one user.
///
/// Owns the project, editor surface, router, and the debounced
/// auto-saver. All failures are converted to user-visible status text
/// here — nothing propagates to the caller as an error.
pub struct Session {
    ctx: UserContext,
    store: Arc<ProjectStore>,
    project: Arc<Mutex<Project>>,
    project_name: String,
    editor: EditorSurface<PlainBuffer>,
    router: ExecutionRouter,
    preview: FilePreview,
    autosaver: Autosaver,
    save_state: SaveStateHandle,
    mode: OutputMode,
    last_console: Option<String>,
    input: InputMode,
    start_time: Instant,
}

impl Session {
    pub fn new(
        ctx: UserContext,
        store: Arc<ProjectStore>,
        router: ExecutionRouter,
        config: &Config,
    ) -> Result<Self> {
        let project = store.load(&ctx.id, DEFAULT_PROJECT_NAME)?;
        let mut editor = EditorSurface::new(PlainBuffer::default());
        editor.open_active(&project);
        let preview = FilePreview::new(store.base_path().join("preview.html"));
        Ok(Self {
            ctx,
            store,
            project: Arc::new(Mutex::new(project)),
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            editor,
            router,
            preview,
            autosaver: Autosaver::new(config.editor.quiet_period()),
            save_state: SaveStateHandle::new("Ready"),
            mode: OutputMode::Live,
            last_console: None,
            input: InputMode::Command,
            start_time: Instant::now(),
        })
    }

    pub fn user(&self) -> &UserContext {
        &self.ctx
    }

    /// Handles one input line — a slash command, or buffer content while
    /// an /edit capture is open.
    pub async fn handle_line(&mut self, line: &str) -> Reply {
        if let InputMode::Editing(ref mut lines) = self.input {
            if line.trim() == "." {
                let text = lines.join("\n");
                self.input = InputMode::Command;
                return Reply::Text(self.finish_edit(&text).await);
            }
            lines.push(line.to_string());
            return Reply::Silent;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Reply::Silent;
        }
        if !trimmed.starts_with('/') {
            return Reply::Text("Commands start with '/'. Type /help for a list.".to_string());
        }

        let (command, arg) = match trimmed.split_once(' ') {
            Some((c, a)) => (c.to_lowercase(), a.trim()),
            None => (trimmed.to_lowercase(), ""),
        };

        match command.as_str() {
            "/help" => Reply::Text(self.cmd_help()),
            "/quit" | "/exit" => Reply::Quit,
            "/open" => Reply::Text(self.cmd_open(arg).await),
            "/files" => Reply::Text(self.cmd_files().await),
            "/file" => Reply::Text(self.cmd_switch_file(arg).await),
            "/add" => Reply::Text(self.cmd_add_file(arg).await),
            "/edit" => self.cmd_begin_edit().await,
            "/run" => Reply::Text(self.cmd_run().await),
            "/save" => Reply::Text(self.cmd_save().await),
            "/submit" => Reply::Text(self.cmd_submit().await),
            "/mode" => Reply::Text(self.cmd_mode(arg)),
            "/log" => Reply::Text(self.cmd_log()),
            "/status" => Reply::Text(self.cmd_status().await),
            _ => Reply::Text(format!(
                "Unknown command: {command}\nType /help for available commands."
            )),
        }
    }

    // ── Commands ──────────────────────────────────────────

    fn cmd_help(&self) -> String {
        "\
Commands:\n\
  /open <name>          — Load (or create) a named project\n\
  /files                — List project files\n\
  /file <name>          — Switch the active file\n\
  /add <name>           — Add a new file (language from extension)\n\
  /edit                 — Replace the active buffer; end with a lone '.'\n\
  /run                  — Run the active file\n\
  /save                 — Save immediately\n\
  /submit               — Freeze the project (read-only, permanent)\n\
  /mode <live|console>  — Switch the visible output panel\n\
  /log                  — Show recent run attempts\n\
  /status               — Session overview\n\
  /quit                 — Exit"
            .to_string()
    }

    async fn cmd_open(&mut self, name: &str) -> String {
        let name = if name.is_empty() {
            DEFAULT_PROJECT_NAME
        } else {
            name
        };
        // A pending auto-save of the previous project may still fire;
        // it holds its own name, so cancel rather than let it race.
        self.autosaver.cancel();
        match self.store.load(&self.ctx.id, name) {
            Ok(loaded) => {
                self.project_name = name.to_string();
                let mut project = self.project.lock().await;
                *project = loaded;
                self.editor.open_active(&project);
                self.save_state.set("Ready");
                format!(
                    "Opened '{name}' — {} files{}",
                    project.files.len(),
                    if project.submitted {
                        " (submitted, read-only)"
                    } else {
                        ""
                    }
                )
            }
            Err(e) => format!("Could not open '{name}': {e}"),
        }
    }

    async fn cmd_files(&self) -> String {
        let project = self.project.lock().await;
        let mut out = String::new();
        for file in &project.files {
            let marker = if file.id == project.active_file_id {
                "*"
            } else {
                " "
            };
            out.push_str(&format!(
                "{marker} {:<20} {}\n",
                file.name,
                file.language.as_str().to_uppercase()
            ));
        }
        if project.submitted {
            out.push_str("(submitted, read-only)\n");
        }
        out.trim_end().to_string()
    }

    async fn cmd_switch_file(&mut self, name: &str) -> String {
        let mut project = self.project.lock().await;
        let Some(id) = project.file_by_name(name).map(|f| f.id) else {
            return format!("No file named '{name}'. Try /files.");
        };
        match project.set_active(id) {
            Ok(()) => {
                self.editor.open_active(&project);
                let file = match project.active_file() {
                    Some(f) => f,
                    None => return "No active file.".to_string(),
                };
                format!("Active file: {} ({})", file.name, file.language)
            }
            Err(e) => format!("Could not switch file: {e}"),
        }
    }

    async fn cmd_add_file(&mut self, name: &str) -> String {
        if name.is_empty() {
            return "Usage: /add <name> (e.g. /add helper.py)".to_string();
        }
        let mut project = self.project.lock().await;
        match project.add_file(name) {
            Ok(_) => {
                self.editor.open_active(&project);
                // New files are persisted right away, like a manual save
                match self
                    .store
                    .save(&self.ctx.id, &self.project_name, &mut project, SaveKind::Manual)
                {
                    Ok(outcome) => {
                        self.save_state.set(outcome.label());
                        let file = match project.active_file() {
                            Some(f) => f,
                            None => return "No active file.".to_string(),
                        };
                        format!("Added {} ({})", file.name, file.language)
                    }
                    Err(e) => format!("File added but save failed: {e}"),
                }
            }
            Err(e) => format!("Could not add file: {e}"),
        }
    }

    async fn cmd_begin_edit(&mut self) -> Reply {
        let project = self.project.lock().await;
        let Some(file) = project.active_file() else {
            return Reply::Text("No active file.".to_string());
        };
        let name = file.name.clone();
        drop(project);
        self.input = InputMode::Editing(Vec::new());
        Reply::Text(format!(
            "Enter new content for {name}; finish with a single '.' line."
        ))
    }

    async fn finish_edit(&mut self, text: &str) -> String {
        let mut project = self.project.lock().await;
        match self.editor.apply_edit(&mut project, text) {
            EditOutcome::Accepted => {
                self.save_state.set("Unsaved changes");
                self.autosaver.schedule(
                    self.store.clone(),
                    self.project.clone(),
                    self.ctx.id.clone(),
                    self.project_name.clone(),
                    self.save_state.clone(),
                );
                "Buffer updated.".to_string()
            }
            EditOutcome::Rejected => {
                "Project is submitted — edit discarded, buffer restored.".to_string()
            }
        }
    }

    async fn cmd_run(&mut self) -> String {
        let project = self.project.lock().await;
        match self
            .router
            .run_active(&project, &self.ctx, &mut self.preview)
            .await
        {
            Ok(report) => {
                let mut out = report.status_line.to_string();
                match report.console {
                    Some(console) => {
                        self.mode = OutputMode::Console;
                        out.push_str("\n── console ──\n");
                        out.push_str(&console);
                        self.last_console = Some(console);
                    }
                    None => {
                        self.mode = OutputMode::Live;
                        out.push_str(&format!("\nPreview: {}", self.preview.path().display()));
                    }
                }
                out
            }
            Err(e) => format!("Run failed: {e}"),
        }
    }

    async fn cmd_save(&mut self) -> String {
        let mut project = self.project.lock().await;
        match self
            .store
            .save(&self.ctx.id, &self.project_name, &mut project, SaveKind::Manual)
        {
            Ok(outcome) => {
                self.save_state.set(outcome.label());
                outcome.label().to_string()
            }
            Err(e) => format!("Save failed: {e}"),
        }
    }

    async fn cmd_submit(&mut self) -> String {
        let mut project = self.project.lock().await;
        if project.submitted {
            return "Already submitted.".to_string();
        }
        match self.store.submit(&self.ctx.id, &self.project_name, &mut project) {
            Ok(()) => {
                // Nothing left to auto-save, and the editor goes read-only
                self.autosaver.cancel();
                self.editor.open_active(&project);
                self.save_state.set("Submitted (read-only)");
                "Submitted (read-only). The project can no longer be edited.".to_string()
            }
            Err(e) => format!("Submit failed: {e}"),
        }
    }

    fn cmd_mode(&mut self, arg: &str) -> String {
        let Some(mode) = OutputMode::parse(arg) else {
            return "Usage: /mode <live|console>".to_string();
        };
        self.mode = mode;
        match mode {
            OutputMode::Live => format!("Preview: {}", self.preview.path().display()),
            OutputMode::Console => self
                .last_console
                .clone()
                .unwrap_or_else(|| "(console is empty)".to_string()),
        }
    }

    fn cmd_log(&self) -> String {
        match self.router.log().records() {
            Ok(records) if records.is_empty() => "No runs recorded yet.".to_string(),
            Ok(records) => {
                let mut out = String::new();
                for record in records.iter().rev() {
                    out.push_str(&format!(
                        "{}  {:<7} {:<10} {:<5} {}\n",
                        format_timestamp(record.at),
                        record.channel,
                        record.language,
                        record.status,
                        record.user
                    ));
                }
                out.trim_end().to_string()
            }
            Err(e) => format!("Could not read execution log: {e}"),
        }
    }

    async fn cmd_status(&self) -> String {
        let project = self.project.lock().await;
        let uptime = self.start_time.elapsed();
        let hours = uptime.as_secs() / 3600;
        let minutes = (uptime.as_secs() % 3600) / 60;
        let run_count = self.router.log().len().unwrap_or(0);

        format!(
            "Vertex — status\n\
             User: {} ({})\n\
             Project: {} — {} files{}\n\
             Last edited: {}\n\
             Save state: {}\n\
             Runs recorded: {run_count}\n\
             Uptime: {hours}h {minutes}m",
            self.ctx.id,
            self.ctx.role.label(),
            self.project_name,
            project.files.len(),
            if project.submitted { " (submitted)" } else { "" },
            if project.last_edited > 0 {
                format_timestamp(project.last_edited)
            } else {
                "never".to_string()
            },
            self.save_state.get(),
        )
    }
}

/// Formats an epoch-ms timestamp for display, e.g. "14:03:07 12 Mar 2026".
fn format_timestamp(epoch_ms: i64) -> String {
    match Local.timestamp_millis_opt(epoch_ms).single() {
        Some(dt) => dt.format("%H:%M:%S %d %b %Y").to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result as AnyResult;
    use async_trait::async_trait;

    use crate::context::Role;
    use crate::exec_log::ExecutionLog;
    use crate::runner::sandbox::{ExecOutput, PythonEngine, PythonSandbox};

    struct EchoEngine;

    #[async_trait]
    impl PythonEngine for EchoEngine {
        async fn execute(&self, _source: &str) -> AnyResult<ExecOutput> {
            Ok(ExecOutput {
                stdout: "ran\n".to_string(),
                stderr: String::new(),
            })
        }
    }

    fn session_in(dir: &tempfile::TempDir, role: Role) -> Session {
        let store = Arc::new(ProjectStore::open(dir.path()).unwrap());
        let sandbox = PythonSandbox::new(Arc::new(EchoEngine), Duration::from_secs(5));
        let log = ExecutionLog::open(dir.path().join("exec_log.json"));
        let router = ExecutionRouter::new(sandbox, log);
        let config = Config::default();
        Session::new(UserContext::new("tester", role), store, router, &config).unwrap()
    }

    async fn text(session: &mut Session, line: &str) -> String {
        match session.handle_line(line).await {
            Reply::Text(t) => t,
            Reply::Silent => String::new(),
            Reply::Quit => panic!("unexpected quit"),
        }
    }

    #[tokio::test]
    async fn test_files_lists_starters_with_active_marker() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, Role::Student);
        let out = text(&mut session, "/files").await;
        assert!(out.contains("* index.html"));
        assert!(out.contains("main.py"));
        assert!(out.contains("PYTHON"));
    }

    #[tokio::test]
    async fn test_switch_run_and_log_flow() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, Role::Student);

        let out = text(&mut session, "/file main.py").await;
        assert_eq!(out, "Active file: main.py (python)");

        let out = text(&mut session, "/run").await;
        assert!(out.contains("Python run completed."));
        assert!(out.contains("ran"));

        let out = text(&mut session, "/log").await;
        assert!(out.contains("sandbox"));
        assert!(out.contains("python"));
        assert!(out.contains("ok"));
        assert!(out.contains("tester"));
    }

    #[tokio::test]
    async fn test_html_run_reports_preview_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, Role::Student);
        let out = text(&mut session, "/run").await;
        assert!(out.contains("Rendered HTML/CSS/JS in preview."));
        assert!(out.contains("preview.html"));
    }

    #[tokio::test]
    async fn test_edit_capture_and_autosave_labels() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, Role::Student);

        let out = text(&mut session, "/edit").await;
        assert!(out.contains("index.html"));
        assert!(matches!(
            session.handle_line("<h1>New</h1>").await,
            Reply::Silent
        ));
        let out = text(&mut session, ".").await;
        assert_eq!(out, "Buffer updated.");
        assert_eq!(session.save_state.get(), "Unsaved changes");

        let project = session.project.lock().await;
        assert_eq!(project.active_file().unwrap().content, "<h1>New</h1>");
    }

    #[tokio::test]
    async fn test_manual_save_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, Role::Student);
        text(&mut session, "/edit").await;
        session.handle_line("print('persisted')").await;
        text(&mut session, ".").await;
        let out = text(&mut session, "/save").await;
        assert_eq!(out, "Saved");

        let out = text(&mut session, "/open").await;
        assert!(out.starts_with("Opened 'My Vertex Project'"));
        let project = session.project.lock().await;
        assert_eq!(project.active_file().unwrap().content, "print('persisted')");
    }

    #[tokio::test]
    async fn test_submit_freezes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, Role::Student);
        let out = text(&mut session, "/submit").await;
        assert!(out.contains("Submitted (read-only)"));

        // Edits bounce off the frozen project
        text(&mut session, "/edit").await;
        session.handle_line("tampered").await;
        let out = text(&mut session, ".").await;
        assert!(out.contains("edit discarded"));

        // Adding files is rejected too
        let out = text(&mut session, "/add late.js").await;
        assert!(out.contains("read-only"));

        // Saving reports the frozen state
        let out = text(&mut session, "/save").await;
        assert_eq!(out, "Submitted (read-only)");

        // Reload confirms the flag was persisted
        let out = text(&mut session, "/open").await;
        assert!(out.contains("(submitted, read-only)"));
    }

    #[tokio::test]
    async fn test_mode_toggle_without_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, Role::Student);
        text(&mut session, "/file main.py").await;
        text(&mut session, "/run").await;

        let out = text(&mut session, "/mode live").await;
        assert!(out.contains("preview.html"));
        let out = text(&mut session, "/mode console").await;
        assert!(out.contains("ran"));
        let out = text(&mut session, "/mode sideways").await;
        assert!(out.contains("Usage"));
    }

    #[tokio::test]
    async fn test_unknown_command_and_quit() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, Role::Student);
        let out = text(&mut session, "/frobnicate").await;
        assert!(out.contains("Unknown command"));
        assert!(matches!(session.handle_line("/quit").await, Reply::Quit));
    }

    #[tokio::test]
    async fn test_status_overview() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir, Role::Staff);
        let out = text(&mut session, "/status").await;
        assert!(out.contains("tester (Staff)"));
        assert!(out.contains("My Vertex Project — 4 files"));
        assert!(out.contains("Save state: Ready"));
        assert!(out.contains("Last edited: never"));
    }
}
