//! The `lock`, `verify` and `apply` commands.

mod apply;
mod snapshot;
mod time;
mod verify;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::json;

use devbox_domain::{default_lock_path, load_lockfile_optional, LockError, LockSnapshot};

use crate::core::config::context::CommandContext;
use crate::core::sandbox::sandbox_error;
use crate::core::tooling::diagnostics::commands as diag_commands;
use crate::core::tooling::outcome::{ExecutionOutcome, UserError};

pub use apply::{apply_project, ApplyRequest};
pub use snapshot::{lock_project, LockRequest};
pub use verify::{verify_project, VerifyRequest};

/// A registered project resolved to its sandbox and workspace.
#[derive(Clone, Debug)]
pub(crate) struct LockTarget {
    pub(crate) project: String,
    pub(crate) sandbox: String,
    pub(crate) base_image: String,
    pub(crate) workspace: PathBuf,
}

impl LockTarget {
    pub(crate) fn resolve(ctx: &CommandContext, project: &str) -> Result<Self> {
        let entry = ctx.resolve_project(project)?;
        let workspace = ctx.workspace_path(&entry);
        Ok(Self {
            project: if entry.name.is_empty() {
                project.to_string()
            } else {
                entry.name.clone()
            },
            sandbox: entry.box_name.clone(),
            base_image: entry.base_image.clone(),
            workspace,
        })
    }

    /// `explicit`, or the conventional lock path inside the workspace.
    pub(crate) fn lock_path(&self, explicit: Option<&Path>) -> PathBuf {
        explicit.map_or_else(|| default_lock_path(&self.workspace), Path::to_path_buf)
    }
}

/// Starts the sandbox when it is not already running.
pub(crate) fn ensure_running(ctx: &CommandContext, sandbox: &str) -> Result<()> {
    let executor = ctx.sandbox();
    if executor.is_running(sandbox)? {
        return Ok(());
    }
    tracing::info!(sandbox, "starting sandbox");
    executor.start(sandbox)?;
    if !executor.is_running(sandbox)? {
        return Err(sandbox_error(
            diag_commands::SANDBOX,
            &format!("sandbox '{sandbox}' is not running after start"),
            json!({
                "reason": "sandbox_not_running",
                "sandbox": sandbox,
                "hint": "inspect the sandbox logs with your container backend",
            }),
        )
        .into());
    }
    Ok(())
}

/// Reads the lock at `path`. A missing or invalid lock is a user error.
pub(crate) fn read_lock(code: &str, path: &Path) -> Result<LockSnapshot> {
    match load_lockfile_optional(path) {
        Ok(Some(lock)) => Ok(lock),
        Ok(None) => Err(UserError::new(
            format!("no lock file at {}", path.display()),
            json!({
                "code": code,
                "reason": "missing_lock",
                "lockfile": path.display().to_string(),
                "hint": "run `devbox lock <project>` first or pass --lock",
            }),
        )
        .into()),
        Err(err @ LockError::Read { .. }) => Err(err.into()),
        Err(err) => Err(lock_error(code, path, &err).into()),
    }
}

fn lock_error(code: &str, path: &Path, err: &LockError) -> UserError {
    UserError::new(
        err.to_string(),
        json!({
            "code": code,
            "reason": err.reason(),
            "lockfile": path.display().to_string(),
        }),
    )
}

/// Turns a [`UserError`] raised anywhere below a command into its outcome;
/// other errors propagate.
pub(crate) fn user_outcome(result: Result<ExecutionOutcome>) -> Result<ExecutionOutcome> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(err) => match err.downcast::<UserError>() {
            Ok(user) => Ok(user.into_outcome()),
            Err(err) => Err(err),
        },
    }
}
