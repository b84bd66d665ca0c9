use std::sync::Arc;

use anyhow::Result;
use devbox_domain::SandboxMeta;

use super::process::RunOutput;
use crate::core::sandbox::ContainerCli;

/// Content identity of an image as reported by the container backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageIdentity {
    pub digest: Option<String>,
    pub id: Option<String>,
}

impl ImageIdentity {
    #[must_use]
    pub fn is_known(&self) -> bool {
        self.digest.is_some() || self.id.is_some()
    }
}

/// Runs shell commands inside a named sandbox.
pub trait SandboxExecutor: Send + Sync {
    /// Runs `command` through a login shell in `sandbox`. A non-zero exit is
    /// reported through [`RunOutput::code`], not as an error.
    fn execute(&self, sandbox: &str, command: &str) -> Result<RunOutput>;
    fn is_running(&self, sandbox: &str) -> Result<bool>;
    fn start(&self, sandbox: &str) -> Result<()>;
}

/// Read-only metadata queries against the container backend.
pub trait SandboxInspector: Send + Sync {
    fn image_identity(&self, image: &str) -> Result<ImageIdentity>;
    /// Image id the sandbox was created from.
    fn sandbox_image(&self, sandbox: &str) -> Result<Option<String>>;
    fn sandbox_meta(&self, sandbox: &str) -> Result<SandboxMeta>;
}

pub trait Effects: Send + Sync {
    fn sandbox(&self) -> &dyn SandboxExecutor;
    fn inspector(&self) -> &dyn SandboxInspector;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    cli: Arc<ContainerCli>,
}

impl SystemEffects {
    /// Effects backed by the container CLI. `backend` overrides detection
    /// with `docker`, `podman`, or a path to a compatible binary.
    #[must_use]
    pub fn new(backend: Option<String>) -> Self {
        Self {
            cli: Arc::new(ContainerCli::new(backend)),
        }
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Effects for SystemEffects {
    fn sandbox(&self) -> &dyn SandboxExecutor {
        self.cli.as_ref()
    }

    fn inspector(&self) -> &dyn SandboxInspector {
        self.cli.as_ref()
    }
}
