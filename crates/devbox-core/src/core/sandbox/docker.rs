use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Result;
use serde_json::json;

use devbox_domain::SandboxMeta;

use super::errors::sandbox_error;
use super::inspect::{meta_from_inspect, parse_image_identity, IMAGE_IDENTITY_FORMAT};
use crate::core::runtime::effects::{ImageIdentity, SandboxExecutor, SandboxInspector};
use crate::core::runtime::process::{run_command, RunOutput};
use crate::core::tooling::diagnostics::commands as diag_commands;
use crate::core::tooling::outcome::UserError;

/// Prefix applied to every command run inside a sandbox: load the root
/// profile quietly and make pipelines fail on any stage.
pub(crate) const EXEC_PRELUDE: &str = ". /root/.bashrc >/dev/null 2>&1 || true; set -o pipefail; ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BackendKind {
    Docker,
    Podman,
    Custom,
}

#[derive(Clone, Debug)]
pub(crate) struct ContainerBackend {
    pub(crate) program: PathBuf,
    pub(crate) kind: BackendKind,
}

impl ContainerBackend {
    fn name(&self) -> &'static str {
        match self.kind {
            BackendKind::Docker => "docker",
            BackendKind::Podman => "podman",
            BackendKind::Custom => "custom",
        }
    }
}

pub(crate) fn detect_container_backend(
    requested: Option<&str>,
) -> Result<ContainerBackend, UserError> {
    if let Some(raw) = requested {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("podman") {
            return Ok(ContainerBackend {
                program: resolve_program("podman", None)?,
                kind: BackendKind::Podman,
            });
        }
        if trimmed.eq_ignore_ascii_case("docker") {
            return Ok(ContainerBackend {
                program: resolve_program("docker", None)?,
                kind: BackendKind::Docker,
            });
        }
        let path = resolve_program(trimmed, Some(trimmed))?;
        return Ok(ContainerBackend {
            program: path,
            kind: BackendKind::Custom,
        });
    }

    for (name, kind) in [
        ("docker", BackendKind::Docker),
        ("podman", BackendKind::Podman),
    ] {
        if let Ok(path) = resolve_program(name, None) {
            return Ok(ContainerBackend {
                program: path,
                kind,
            });
        }
    }

    Err(sandbox_error(
        diag_commands::BACKEND,
        "container backend unavailable",
        json!({
            "reason": "backend_unavailable",
            "candidates": ["docker", "podman"],
            "hint": "install docker or podman, or set DEVBOX_CONTAINER_BACKEND to a compatible binary",
        }),
    ))
}

fn resolve_program(name: &str, raw: Option<&str>) -> Result<PathBuf, UserError> {
    let candidate = if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        PathBuf::from(name)
    } else {
        which::which(name).unwrap_or_else(|_| PathBuf::from(name))
    };
    if candidate.exists() {
        return Ok(candidate);
    }
    Err(sandbox_error(
        diag_commands::BACKEND,
        "container backend unavailable",
        json!({
            "reason": "backend_not_found",
            "backend": raw.unwrap_or(name),
        }),
    ))
}

/// Sandbox access through the `docker` (or compatible) command line.
pub struct ContainerCli {
    requested: Option<String>,
    backend: OnceLock<ContainerBackend>,
}

impl ContainerCli {
    #[must_use]
    pub fn new(requested: Option<String>) -> Self {
        Self {
            requested,
            backend: OnceLock::new(),
        }
    }

    fn backend(&self) -> Result<&ContainerBackend> {
        if let Some(backend) = self.backend.get() {
            return Ok(backend);
        }
        let detected = detect_container_backend(self.requested.as_deref())?;
        tracing::debug!(
            backend = detected.name(),
            program = %detected.program.display(),
            "container backend detected"
        );
        Ok(self.backend.get_or_init(|| detected))
    }

    fn run(&self, args: &[&str]) -> Result<RunOutput> {
        let backend = self.backend()?;
        tracing::trace!(backend = backend.name(), ?args, "container cli");
        run_command(&backend.program, args)
    }

    fn container_status(&self, sandbox: &str) -> Result<Option<String>> {
        let output = self.run(&[
            "inspect",
            "--type=container",
            "--format",
            "{{.State.Status}}",
            sandbox,
        ])?;
        if output.success() {
            Ok(Some(output.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }
}

impl SandboxExecutor for ContainerCli {
    fn execute(&self, sandbox: &str, command: &str) -> Result<RunOutput> {
        let wrapped = format!("{EXEC_PRELUDE}{command}");
        self.run(&["exec", sandbox, "bash", "-lc", &wrapped])
    }

    fn is_running(&self, sandbox: &str) -> Result<bool> {
        match self.container_status(sandbox)? {
            Some(status) => Ok(status == "running"),
            None => Err(sandbox_error(
                diag_commands::SANDBOX,
                &format!("sandbox '{sandbox}' does not exist"),
                json!({
                    "reason": "sandbox_missing",
                    "sandbox": sandbox,
                    "hint": "create the box before locking or applying",
                }),
            )
            .into()),
        }
    }

    fn start(&self, sandbox: &str) -> Result<()> {
        let output = self.run(&["start", sandbox])?;
        if output.success() {
            return Ok(());
        }
        Err(sandbox_error(
            diag_commands::SANDBOX,
            &format!("failed to start sandbox '{sandbox}'"),
            json!({
                "reason": "sandbox_start_failed",
                "sandbox": sandbox,
                "exit_code": output.code,
                "stderr": output.stderr.trim(),
            }),
        )
        .into())
    }
}

impl SandboxInspector for ContainerCli {
    fn image_identity(&self, image: &str) -> Result<ImageIdentity> {
        let output = self.run(&[
            "inspect",
            "--type=image",
            "--format",
            IMAGE_IDENTITY_FORMAT,
            image,
        ])?;
        if !output.success() {
            tracing::debug!(image, stderr = output.stderr.trim(), "image inspect failed");
            return Ok(ImageIdentity::default());
        }
        Ok(parse_image_identity(&output.stdout))
    }

    fn sandbox_image(&self, sandbox: &str) -> Result<Option<String>> {
        let output = self.run(&[
            "inspect",
            "--type=container",
            "--format",
            "{{.Image}}",
            sandbox,
        ])?;
        let image = output.stdout.trim();
        if !output.success() || image.is_empty() {
            return Ok(None);
        }
        Ok(Some(image.to_string()))
    }

    fn sandbox_meta(&self, sandbox: &str) -> Result<SandboxMeta> {
        let output = self.run(&["inspect", "--type=container", sandbox])?;
        if !output.success() {
            anyhow::bail!(
                "inspect of sandbox '{sandbox}' failed: {}",
                output.stderr.trim()
            );
        }
        meta_from_inspect(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_backend_is_a_user_error() {
        let err = detect_container_backend(Some("/nonexistent/devbox-backend")).unwrap_err();
        assert_eq!(err.details()["reason"], "backend_not_found");
        assert_eq!(err.details()["backend"], "/nonexistent/devbox-backend");
        assert_eq!(err.details()["code"], diag_commands::BACKEND);
    }

    #[cfg(unix)]
    #[test]
    fn executes_through_custom_backend_binary() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let script = dir.path().join("fake-cli");
        std::fs::write(&script, "#!/bin/sh\nprintf '%s\\n' \"$@\"\n")?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let cli = ContainerCli::new(Some(script.display().to_string()));
        let output = cli.execute("devbox_web", "echo hi")?;
        assert!(output.success());
        let lines: Vec<&str> = output.stdout.lines().collect();
        assert_eq!(lines[..4], ["exec", "devbox_web", "bash", "-lc"]);
        assert_eq!(lines[4], format!("{EXEC_PRELUDE}echo hi"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn absent_sandbox_reports_sandbox_missing() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let script = dir.path().join("fake-cli");
        std::fs::write(&script, "#!/bin/sh\necho 'no such object' >&2\nexit 1\n")?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let cli = ContainerCli::new(Some(script.display().to_string()));
        let err = cli.is_running("devbox_web").unwrap_err();
        let user = err.downcast_ref::<UserError>().expect("user error");
        assert_eq!(user.details()["reason"], "sandbox_missing");
        assert_eq!(user.details()["sandbox"], "devbox_web");
        assert_eq!(user.details()["code"], diag_commands::SANDBOX);
        Ok(())
    }
}
