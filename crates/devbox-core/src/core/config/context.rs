use std::path::PathBuf;

use anyhow::Result;
use serde_json::json;

use devbox_domain::{load_registry, ProjectEntry};

use crate::core::config::{Config, GlobalOptions, PoolConfig};
use crate::core::runtime::effects::{SandboxExecutor, SandboxInspector, SharedEffects};
use crate::core::runtime::CommandGroup;
use crate::core::tooling::diagnostics::commands as diag_commands;
use crate::core::tooling::outcome::UserError;

#[derive(Clone, Copy, Debug)]
pub struct CommandInfo {
    pub group: CommandGroup,
    pub name: &'static str,
}

impl CommandInfo {
    #[must_use]
    pub const fn new(group: CommandGroup, name: &'static str) -> Self {
        Self { group, name }
    }
}

pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    config: Config,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    #[must_use]
    pub fn new(global: &'a GlobalOptions, config: Config, effects: SharedEffects) -> Self {
        Self {
            global,
            config,
            effects,
        }
    }

    pub fn sandbox(&self) -> &dyn SandboxExecutor {
        self.effects.sandbox()
    }

    pub fn inspector(&self) -> &dyn SandboxInspector {
        self.effects.inspector()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &PoolConfig {
        self.config.pool()
    }

    /// Looks up `name` in the project registry under the devbox home.
    ///
    /// # Errors
    /// Returns a [`UserError`] when the home directory is unknown or the
    /// project is not registered, and an error when the registry is unreadable.
    pub fn resolve_project(&self, name: &str) -> Result<ProjectEntry> {
        let Some(home) = self.config.home() else {
            return Err(UserError::new(
                "cannot locate the devbox home directory",
                json!({
                    "code": diag_commands::PROJECT,
                    "reason": "home_unknown",
                    "hint": "set DEVBOX_HOME to the directory holding config.json",
                }),
            )
            .into());
        };
        let registry = load_registry(home)?;
        let Some(entry) = registry.project(name) else {
            return Err(UserError::new(
                format!("project '{name}' not found"),
                json!({
                    "code": diag_commands::PROJECT,
                    "reason": "unknown_project",
                    "project": name,
                    "known": registry.names(),
                    "registry": home.join(devbox_domain::project::REGISTRY_FILE_NAME),
                    "hint": "check the project name or add it to config.json",
                }),
            )
            .into());
        };
        let mut entry = entry.clone();
        if entry.box_name.is_empty() {
            entry.box_name = format!("devbox_{name}");
        }
        Ok(entry)
    }

    /// Workspace directory of a project; relative paths resolve against the
    /// devbox home.
    #[must_use]
    pub fn workspace_path(&self, entry: &ProjectEntry) -> PathBuf {
        if entry.workspace_path.is_absolute() {
            return entry.workspace_path.clone();
        }
        match self.config.home() {
            Some(home) => home.join(&entry.workspace_path),
            None => entry.workspace_path.clone(),
        }
    }
}
