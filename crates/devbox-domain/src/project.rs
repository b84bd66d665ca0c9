use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const REGISTRY_FILE_NAME: &str = "config.json";
pub const PROJECT_CONFIG_FILES: [&str; 3] = ["devbox.json", "devbox.project.json", ".devbox.json"];

/// A project known to the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProjectEntry {
    pub name: String,
    pub box_name: String,
    pub base_image: String,
    pub workspace_path: PathBuf,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Registry {
    pub projects: BTreeMap<String, ProjectEntry>,
}

impl Registry {
    #[must_use]
    pub fn project(&self, name: &str) -> Option<&ProjectEntry> {
        self.projects.get(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.projects.keys().map(String::as_str).collect()
    }
}

/// `~/.devbox`, or `None` when the home directory cannot be determined.
#[must_use]
pub fn default_home() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(".devbox"))
}

/// Reads `<home>/config.json`. A missing file is an empty registry.
pub fn load_registry(home: &Path) -> Result<Registry> {
    let path = home.join(REGISTRY_FILE_NAME);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "project registry not found");
        return Ok(Registry::default());
    }
    let contents =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut registry: Registry = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    for (key, entry) in &mut registry.projects {
        if entry.name.is_empty() {
            entry.name.clone_from(key);
        }
    }
    Ok(registry)
}

/// Declared provisioning for a project workspace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub base_image: Option<String>,
    pub setup_commands: Vec<String>,
}

/// Locates the workspace's project config, first match in
/// [`PROJECT_CONFIG_FILES`] order.
#[must_use]
pub fn find_project_config(workspace: &Path) -> Option<PathBuf> {
    PROJECT_CONFIG_FILES
        .iter()
        .map(|name| workspace.join(name))
        .find(|path| path.is_file())
}

pub fn load_project_config(workspace: &Path) -> Result<Option<ProjectConfig>> {
    let Some(path) = find_project_config(workspace) else {
        return Ok(None);
    };
    let contents =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let config = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(config))
}
