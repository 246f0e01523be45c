pub mod preview;
pub mod sandbox;
pub mod screen;

use anyhow::{anyhow, Result};
use tracing::info;

use crate::context::{Role, UserContext};
use crate::exec_log::{Channel, ExecutionLog, RunStatus};
use crate::project::{Language, Project};

use self::preview::{compose_document, PreviewSurface};
use self::sandbox::{ExecOutput, PythonSandbox, SandboxError};

/// Which output panel is visible. The user can flip between panels
/// without re-running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// The rendered HTML preview.
    Live,
    /// The text console.
    Console,
}

impl OutputMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "live" => Some(OutputMode::Live),
            "console" => Some(OutputMode::Console),
            _ => None,
        }
    }
}

/// Generic failure text shown to students in place of raw errors.
pub const STUDENT_FALLBACK: &str = "Your code did not run successfully. Review your logic.";

/// Outcome of one Run action.
#[derive(Debug, PartialEq)]
pub struct RunReport {
    pub channel: Channel,
    pub language: Language,
    pub status: RunStatus,
    /// Console text for sandbox runs; None for preview renders.
    pub console: Option<String>,
    /// One-line status for the execution-log display area.
    pub status_line: &'static str,
}

/// Renders captured output for a role.
///
/// Pure: verbosity rules are independent of where the role came from.
/// Non-empty stderr means the run failed pedagogically — students get
/// the generic fallback, staff and admins see stdout and stderr verbatim.
pub fn render_output(result: &ExecOutput, role: Role) -> String {
    let out = result.stdout.trim();
    let err = result.stderr.trim();
    if !err.is_empty() {
        if role.sees_raw_errors() {
            format!("{out}\n{err}").trim().to_string()
        } else {
            STUDENT_FALLBACK.to_string()
        }
    } else if out.is_empty() {
        "Execution finished with no output.".to_string()
    } else {
        out.to_string()
    }
}

/// Renders a sandbox failure for a role.
///
/// Denylist rejections read the same for every role; timeouts and
/// engine failures are role-gated like runtime errors.
pub fn render_failure(error: &SandboxError, role: Role) -> String {
    match error {
        SandboxError::Rejected(_) => error.to_string(),
        _ if role.sees_raw_errors() => error.to_string(),
        _ => STUDENT_FALLBACK.to_string(),
    }
}

/// Dispatches Run on the active file: python goes to the sandbox
/// worker, anything else becomes a composed HTML document on the
/// preview surface. Every run appends one execution-log record.
pub struct ExecutionRouter {
    sandbox: PythonSandbox,
    log: ExecutionLog,
}

impl ExecutionRouter {
    pub fn new(sandbox: PythonSandbox, log: ExecutionLog) -> Self {
        Self { sandbox, log }
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    pub async fn run_active(
        &self,
        project: &Project,
        ctx: &UserContext,
        preview: &mut dyn PreviewSurface,
    ) -> Result<RunReport> {
        let file = project
            .active_file()
            .ok_or_else(|| anyhow!("project has no active file"))?;
        if file.language == Language::Python {
            let source = file.content.clone();
            self.run_python(&source, ctx).await
        } else {
            self.run_preview(project, ctx, preview)
        }
    }

    fn run_preview(
        &self,
        project: &Project,
        ctx: &UserContext,
        preview: &mut dyn PreviewSurface,
    ) -> Result<RunReport> {
        preview.render(&compose_document(project))?;
        self.log
            .append(Channel::Client, Language::Html, RunStatus::Ok, &ctx.id)?;
        Ok(RunReport {
            channel: Channel::Client,
            language: Language::Html,
            status: RunStatus::Ok,
            console: None,
            status_line: "Rendered HTML/CSS/JS in preview.",
        })
    }

    async fn run_python(&self, source: &str, ctx: &UserContext) -> Result<RunReport> {
        info!("Running Python securely...");
        let (status, console, status_line) = match self.sandbox.run(source).await {
            Ok(output) => {
                let status = if output.stderr.trim().is_empty() {
                    RunStatus::Ok
                } else {
                    RunStatus::Error
                };
                (status, render_output(&output, ctx.role), "Python run completed.")
            }
            Err(e) => (
                RunStatus::Error,
                render_failure(&e, ctx.role),
                "Python run failed.",
            ),
        };
        self.log
            .append(Channel::Sandbox, Language::Python, status, &ctx.id)?;
        Ok(RunReport {
            channel: Channel::Sandbox,
            language: Language::Python,
            status,
            console: Some(console),
            status_line,
        })
    }
}
