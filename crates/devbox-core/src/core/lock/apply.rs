use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use devbox_domain::{
    plan_reconcile, source_configuration_commands, Manager, ManagerPlan, ReconcileAction,
};

use super::{ensure_running, read_lock, user_outcome, LockTarget};
use crate::core::collect::{collect_packages, query_pool};
use crate::core::config::context::CommandContext;
use crate::core::runtime::effects::SandboxExecutor;
use crate::core::runtime::pool::{Task, TaskError, WorkerPool};
use crate::core::tooling::diagnostics::commands as diag_commands;
use crate::core::tooling::outcome::ExecutionOutcome;

#[derive(Clone, Debug)]
pub struct ApplyRequest {
    pub project: String,
    pub lock: Option<PathBuf>,
    pub dry_run: bool,
}

/// The action that stopped a manager's group.
#[derive(Clone, Debug, Serialize)]
struct FailedAction {
    command: String,
    packages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    error: String,
}

#[derive(Clone, Debug, Serialize)]
struct GroupReport {
    manager: Manager,
    completed: Vec<String>,
    skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed: Option<FailedAction>,
}

impl GroupReport {
    fn not_run(plan: &ManagerPlan, err: &TaskError) -> Self {
        let first = plan.actions.first();
        Self {
            manager: plan.manager,
            completed: Vec::new(),
            skipped: plan.actions.len().saturating_sub(1),
            failed: Some(FailedAction {
                command: first.map(|action| action.command.clone()).unwrap_or_default(),
                packages: first.map(|action| action.packages.clone()).unwrap_or_default(),
                exit_code: None,
                error: err.to_string(),
            }),
        }
    }
}

/// Points the sandbox at the locked sources and registries, then installs
/// and removes packages until every manager matches the lock.
///
/// # Errors
/// Returns an error if the sandbox cannot be reached or the lock cannot be
/// read.
pub fn apply_project(ctx: &CommandContext, request: &ApplyRequest) -> Result<ExecutionOutcome> {
    user_outcome(apply_project_outcome(ctx, request))
}

fn apply_project_outcome(ctx: &CommandContext, request: &ApplyRequest) -> Result<ExecutionOutcome> {
    let target = LockTarget::resolve(ctx, &request.project)?;
    let path = target.lock_path(request.lock.as_deref());
    let lock = read_lock(diag_commands::APPLY, &path)?;
    ensure_running(ctx, &target.sandbox)?;
    let executor = ctx.sandbox();
    let lockfile = path.display().to_string();

    let configuration = source_configuration_commands(&lock);
    if !request.dry_run {
        for command in &configuration {
            tracing::info!(sandbox = %target.sandbox, command = %command, "configuring sources");
            let output = executor.execute(&target.sandbox, command)?;
            if !output.success() {
                return Ok(ExecutionOutcome::failure(
                    format!("source configuration failed: {command}"),
                    json!({
                        "code": diag_commands::APPLY,
                        "reason": "configuration_failed",
                        "project": target.project,
                        "sandbox": target.sandbox,
                        "lockfile": lockfile,
                        "command": command,
                        "exit_code": output.code,
                        "stderr": output.stderr.trim(),
                    }),
                ));
            }
        }
    }

    let current = collect_packages(executor, &target.sandbox, &query_pool(ctx));
    let plan = plan_reconcile(&lock.packages, &current);

    if request.dry_run {
        return Ok(ExecutionOutcome::success(
            format!(
                "would run {} configuration command{} and {} package action{} (dry-run)",
                configuration.len(),
                plural(configuration.len()),
                plan.action_count(),
                plural(plan.action_count())
            ),
            json!({
                "project": target.project,
                "sandbox": target.sandbox,
                "lockfile": lockfile,
                "dry_run": true,
                "configuration": configuration,
                "plan": plan.managers,
            }),
        ));
    }

    if plan.is_empty() {
        return Ok(ExecutionOutcome::success(
            format!("{} already matches {}", target.project, lockfile),
            json!({
                "project": target.project,
                "sandbox": target.sandbox,
                "lockfile": lockfile,
                "configuration": configuration,
                "plan": [],
                "results": [],
            }),
        ));
    }

    let pool = WorkerPool::new(ctx.pool().setup_width(), ctx.pool().apply_timeout);
    let sandbox = target.sandbox.as_str();
    let tasks: Vec<Task<'_, GroupReport>> = plan
        .managers
        .iter()
        .map(|group| {
            Box::new(move || -> Result<GroupReport> { Ok(run_group(executor, sandbox, group)) })
                as Task<'_, GroupReport>
        })
        .collect();
    let reports: Vec<GroupReport> = pool
        .execute(tasks)
        .into_iter()
        .zip(&plan.managers)
        .map(|(result, group)| result.unwrap_or_else(|err| GroupReport::not_run(group, &err)))
        .collect();

    let failed: Vec<&GroupReport> = reports.iter().filter(|report| report.failed.is_some()).collect();
    let mut details = json!({
        "project": target.project,
        "sandbox": target.sandbox,
        "lockfile": lockfile,
        "configuration": configuration,
        "plan": plan.managers,
        "results": reports,
    });
    if failed.is_empty() {
        return Ok(ExecutionOutcome::success(
            format!(
                "applied {} package action{} across {} manager{}",
                plan.action_count(),
                plural(plan.action_count()),
                reports.len(),
                plural(reports.len())
            ),
            details,
        ));
    }

    let summary: Vec<String> = failed
        .iter()
        .filter_map(|report| {
            report
                .failed
                .as_ref()
                .map(|action| format!("{}: {}", report.manager, action.command))
        })
        .collect();
    if let Some(map) = details.as_object_mut() {
        map.insert("code".into(), json!(diag_commands::APPLY));
        map.insert("reason".into(), json!("reconcile_failed"));
        map.insert(
            "hint".into(),
            json!(format!("run `devbox verify {}` to see what is left", target.project)),
        );
    }
    Ok(ExecutionOutcome::failure(
        format!(
            "{} of {} manager group{} failed ({})",
            failed.len(),
            reports.len(),
            plural(reports.len()),
            summary.join("; ")
        ),
        details,
    ))
}

/// Runs one manager's actions in order and stops at the first failure.
fn run_group(executor: &dyn SandboxExecutor, sandbox: &str, group: &ManagerPlan) -> GroupReport {
    let mut report = GroupReport {
        manager: group.manager,
        completed: Vec::new(),
        skipped: 0,
        failed: None,
    };
    for (idx, action) in group.actions.iter().enumerate() {
        tracing::info!(sandbox, manager = %group.manager, command = %action.command, "reconciling");
        if let Some(failed) = run_action(executor, sandbox, action) {
            tracing::warn!(
                sandbox,
                manager = %group.manager,
                command = %action.command,
                error = %failed.error,
                "reconcile action failed; skipping the rest of this manager"
            );
            report.skipped = group.actions.len() - idx - 1;
            report.failed = Some(failed);
            break;
        }
        report.completed.push(action.command.clone());
    }
    report
}

fn run_action(
    executor: &dyn SandboxExecutor,
    sandbox: &str,
    action: &ReconcileAction,
) -> Option<FailedAction> {
    match executor.execute(sandbox, &action.command) {
        Ok(output) if output.success() => None,
        Ok(output) => Some(FailedAction {
            command: action.command.clone(),
            packages: action.packages.clone(),
            exit_code: Some(output.code),
            error: output.stderr.trim().to_string(),
        }),
        Err(err) => Some(FailedAction {
            command: action.command.clone(),
            packages: action.packages.clone(),
            exit_code: None,
            error: format!("{err:#}"),
        }),
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
