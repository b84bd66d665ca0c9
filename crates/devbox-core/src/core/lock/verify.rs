use std::path::PathBuf;

use anyhow::Result;
use serde_json::json;

use devbox_domain::detect_drift;

use super::{ensure_running, read_lock, user_outcome, LockTarget};
use crate::core::collect::collect_observed;
use crate::core::config::context::CommandContext;
use crate::core::tooling::diagnostics::commands as diag_commands;
use crate::core::tooling::outcome::ExecutionOutcome;

#[derive(Clone, Debug)]
pub struct VerifyRequest {
    pub project: String,
    pub lock: Option<PathBuf>,
}

/// Compares the live sandbox against its lock. Any drift is a user error.
///
/// # Errors
/// Returns an error if the sandbox cannot be reached or the lock cannot be
/// read.
pub fn verify_project(ctx: &CommandContext, request: &VerifyRequest) -> Result<ExecutionOutcome> {
    user_outcome(verify_project_outcome(ctx, request))
}

fn verify_project_outcome(
    ctx: &CommandContext,
    request: &VerifyRequest,
) -> Result<ExecutionOutcome> {
    let target = LockTarget::resolve(ctx, &request.project)?;
    let path = target.lock_path(request.lock.as_deref());
    let lock = read_lock(diag_commands::VERIFY, &path)?;
    ensure_running(ctx, &target.sandbox)?;

    let observed = collect_observed(ctx, &target.sandbox);
    let drift = detect_drift(&lock, &observed);
    let lockfile = path.display().to_string();
    if drift.is_empty() {
        tracing::info!(sandbox = %target.sandbox, "sandbox matches lock");
        return Ok(ExecutionOutcome::success(
            format!("{} matches {}", target.project, lockfile),
            json!({
                "project": target.project,
                "sandbox": target.sandbox,
                "lockfile": lockfile,
                "drift": [],
            }),
        ));
    }

    for finding in &drift {
        tracing::debug!(field = %finding.field, "{finding}");
    }
    Ok(ExecutionOutcome::user_error(
        format!(
            "{} drift finding{} against {}",
            drift.len(),
            if drift.len() == 1 { "" } else { "s" },
            lockfile
        ),
        json!({
            "code": diag_commands::VERIFY,
            "reason": "drift",
            "project": target.project,
            "sandbox": target.sandbox,
            "lockfile": lockfile,
            "drift": drift,
            "hint": format!("run `devbox apply {}` to converge, or `devbox lock {}` to accept", target.project, target.project),
        }),
    ))
}
