use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;

use devbox_domain::{
    load_project_config, write_lockfile, BaseImage, LockSnapshot, Manager, SandboxMeta,
    LOCK_VERSION,
};

use super::time::lock_timestamp_string;
use super::{ensure_running, user_outcome, LockTarget};
use crate::core::collect::collect_observed;
use crate::core::config::context::CommandContext;
use crate::core::runtime::effects::{ImageIdentity, SandboxInspector};
use crate::core::tooling::outcome::ExecutionOutcome;

#[derive(Clone, Debug)]
pub struct LockRequest {
    pub project: String,
    /// Destination of the lock; defaults to `devbox.lock.json` in the
    /// project workspace.
    pub output: Option<PathBuf>,
}

/// Records the sandbox's packages, registries and sources into a lock file.
///
/// # Errors
/// Returns an error if the sandbox cannot be reached or the lock cannot be
/// written.
pub fn lock_project(ctx: &CommandContext, request: &LockRequest) -> Result<ExecutionOutcome> {
    user_outcome(lock_project_outcome(ctx, request))
}

fn lock_project_outcome(ctx: &CommandContext, request: &LockRequest) -> Result<ExecutionOutcome> {
    let mut target = LockTarget::resolve(ctx, &request.project)?;
    let project_config = load_project_config(&target.workspace)
        .unwrap_or_else(|err| {
            tracing::warn!(workspace = %target.workspace.display(), error = %err, "project config unreadable; no setup commands recorded");
            None
        })
        .unwrap_or_default();
    if target.base_image.is_empty() {
        target.base_image = project_config.base_image.clone().unwrap_or_default();
    }
    ensure_running(ctx, &target.sandbox)?;

    let base_image = resolve_base_image(ctx.inspector(), &target);
    let sandbox_meta = ctx
        .inspector()
        .sandbox_meta(&target.sandbox)
        .unwrap_or_else(|err| {
            tracing::warn!(sandbox = %target.sandbox, error = %err, "sandbox inspect failed; metadata left empty");
            SandboxMeta::default()
        });
    let observed = collect_observed(ctx, &target.sandbox);

    let snapshot = LockSnapshot {
        version: LOCK_VERSION,
        project: target.project.clone(),
        sandbox_name: target.sandbox.clone(),
        created_at: lock_timestamp_string(),
        base_image,
        sandbox_meta,
        packages: observed.packages,
        registries: observed.registries,
        apt_sources: observed.apt_sources,
        setup_commands: project_config.setup_commands,
    };

    let path = target.lock_path(request.output.as_deref());
    write_lockfile(&path, &snapshot)
        .with_context(|| format!("failed to write lock for project '{}'", target.project))?;
    tracing::info!(path = %path.display(), packages = snapshot.packages.total(), "lock written");

    let counts: serde_json::Map<String, serde_json::Value> = Manager::ALL
        .into_iter()
        .map(|manager| {
            (
                manager.as_str().to_string(),
                json!(snapshot.packages.get(manager).len()),
            )
        })
        .collect();
    Ok(ExecutionOutcome::success(
        format!(
            "locked {} packages for {}",
            snapshot.packages.total(),
            target.project
        ),
        json!({
            "project": target.project,
            "sandbox": target.sandbox,
            "lockfile": path.display().to_string(),
            "created_at": snapshot.created_at,
            "base_image": snapshot.base_image,
            "packages": counts,
            "registries": snapshot.registries,
            "apt_sources": snapshot.apt_sources.source_lines.len(),
        }),
    ))
}

/// Base image identity, falling back to the image the sandbox actually runs
/// when the configured reference has no digest.
fn resolve_base_image(inspector: &dyn SandboxInspector, target: &LockTarget) -> BaseImage {
    let mut identity = if target.base_image.is_empty() {
        ImageIdentity::default()
    } else {
        inspector
            .image_identity(&target.base_image)
            .unwrap_or_else(|err| {
                tracing::debug!(image = %target.base_image, error = %err, "base image inspect failed");
                ImageIdentity::default()
            })
    };
    if identity.digest.is_none() {
        if let Some(fallback) = sandbox_image_identity(inspector, &target.sandbox) {
            identity = fallback;
        }
    }
    BaseImage {
        name: target.base_image.clone(),
        digest: identity.digest,
        id: identity.id,
    }
}

fn sandbox_image_identity(inspector: &dyn SandboxInspector, sandbox: &str) -> Option<ImageIdentity> {
    let image = match inspector.sandbox_image(sandbox) {
        Ok(Some(image)) => image,
        Ok(None) => return None,
        Err(err) => {
            tracing::debug!(sandbox, error = %err, "sandbox image lookup failed");
            return None;
        }
    };
    inspector
        .image_identity(&image)
        .ok()
        .filter(ImageIdentity::is_known)
}
