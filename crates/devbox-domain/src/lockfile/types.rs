use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::spec::Manager;

pub const LOCK_VERSION: i64 = 1;
pub const LOCK_FILE_NAME: &str = "devbox.lock.json";

/// The persisted lock document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockSnapshot {
    pub version: i64,
    pub project: String,
    #[serde(alias = "box_name", alias = "boxName")]
    pub sandbox_name: String,
    #[serde(alias = "created_at")]
    pub created_at: String,
    #[serde(alias = "base_image")]
    pub base_image: BaseImage,
    #[serde(default, alias = "container", alias = "sandbox_meta")]
    pub sandbox_meta: SandboxMeta,
    #[serde(default)]
    pub packages: LockPackages,
    #[serde(default, skip_serializing_if = "LockRegistries::is_empty")]
    pub registries: LockRegistries,
    #[serde(default, alias = "apt_sources")]
    pub apt_sources: AptSources,
    #[serde(default, alias = "setup_commands")]
    pub setup_commands: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseImage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Descriptive sandbox settings. Recorded for audit, never reconciled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxMeta {
    #[serde(alias = "working_dir")]
    pub working_dir: String,
    pub user: String,
    #[serde(alias = "restart", alias = "restart_policy")]
    pub restart_policy: String,
    pub network: String,
    pub ports: Vec<String>,
    #[serde(alias = "mounts")]
    pub volumes: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub environment: BTreeMap<String, String>,
    pub capabilities: Vec<String>,
    pub resources: BTreeMap<String, String>,
}

/// `name<sep>version` entries per manager. Every manager is always written,
/// so an empty list reads as "observed, nothing installed".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockPackages {
    pub apt: Vec<String>,
    pub pip: Vec<String>,
    pub npm: Vec<String>,
    pub yarn: Vec<String>,
    pub pnpm: Vec<String>,
}

impl LockPackages {
    #[must_use]
    pub fn get(&self, manager: Manager) -> &[String] {
        match manager {
            Manager::Apt => &self.apt,
            Manager::Pip => &self.pip,
            Manager::Npm => &self.npm,
            Manager::Yarn => &self.yarn,
            Manager::Pnpm => &self.pnpm,
        }
    }

    pub fn set(&mut self, manager: Manager, entries: Vec<String>) {
        let slot = match manager {
            Manager::Apt => &mut self.apt,
            Manager::Pip => &mut self.pip,
            Manager::Npm => &mut self.npm,
            Manager::Yarn => &mut self.yarn,
            Manager::Pnpm => &mut self.pnpm,
        };
        *slot = entries;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Manager, &[String])> + '_ {
        Manager::ALL
            .into_iter()
            .map(move |manager| (manager, self.get(manager)))
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.iter().map(|(_, entries)| entries.len()).sum()
    }
}

/// Registry endpoints. `None` (or a blank string) means "not asserted".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LockRegistries {
    #[serde(alias = "pip_index_url", skip_serializing_if = "Option::is_none")]
    pub pip_index_url: Option<String>,
    #[serde(alias = "pip_extra_index_urls", skip_serializing_if = "Vec::is_empty")]
    pub pip_extra_index_urls: Vec<String>,
    #[serde(alias = "npm_registry", skip_serializing_if = "Option::is_none")]
    pub npm_registry: Option<String>,
    #[serde(alias = "yarn_registry", skip_serializing_if = "Option::is_none")]
    pub yarn_registry: Option<String>,
    #[serde(alias = "pnpm_registry", skip_serializing_if = "Option::is_none")]
    pub pnpm_registry: Option<String>,
}

impl LockRegistries {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        asserted(self.pip_index_url.as_ref()).is_none()
            && self.pip_extra_index_urls.iter().all(|url| url.trim().is_empty())
            && asserted(self.npm_registry.as_ref()).is_none()
            && asserted(self.yarn_registry.as_ref()).is_none()
            && asserted(self.pnpm_registry.as_ref()).is_none()
    }

    /// Registry URL for a node manager; `None` for apt and pip.
    #[must_use]
    pub fn node_registry(&self, manager: Manager) -> Option<&str> {
        let value = match manager {
            Manager::Npm => self.npm_registry.as_ref(),
            Manager::Yarn => self.yarn_registry.as_ref(),
            Manager::Pnpm => self.pnpm_registry.as_ref(),
            Manager::Apt | Manager::Pip => None,
        };
        asserted(value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AptSources {
    #[serde(alias = "snapshot_url", skip_serializing_if = "Option::is_none")]
    pub snapshot_url: Option<String>,
    #[serde(alias = "sources_lists", alias = "source_lines", alias = "sourcesLists")]
    pub source_lines: Vec<String>,
    #[serde(
        alias = "pinned_release",
        alias = "release",
        skip_serializing_if = "Option::is_none"
    )]
    pub pinned_release: Option<String>,
}

/// Live state gathered from a sandbox, in the same shape the lock records it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedState {
    pub packages: LockPackages,
    pub registries: LockRegistries,
    pub apt_sources: AptSources,
}

/// Trimmed value of an optional field, treating blank strings as absent.
#[must_use]
pub fn asserted(value: Option<&String>) -> Option<&str> {
    value.map(|raw| raw.trim()).filter(|raw| !raw.is_empty())
}
