use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::NamedTempFile;

use super::spec::{Manager, PackageRecord};
use super::types::{LockSnapshot, LOCK_FILE_NAME, LOCK_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("failed to read lock file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("lock file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("lock file has no integer `version` field")]
    MissingVersion,
    #[error("unsupported lock version {found} (this build reads version {supported})")]
    UnsupportedVersion { found: i64, supported: i64 },
    #[error("malformed {manager} entry `{entry}` (expected name{sep}version)", sep = .manager.separator())]
    MalformedEntry { manager: Manager, entry: String },
    #[error("{manager} package `{name}` is listed more than once")]
    DuplicateEntry { manager: Manager, name: String },
}

impl LockError {
    /// Stable reason code for structured output.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            LockError::Read { .. } => "lock_unreadable",
            LockError::Parse(_) | LockError::MissingVersion => "lock_invalid",
            LockError::UnsupportedVersion { .. } => "lock_version_unsupported",
            LockError::MalformedEntry { .. } => "lock_entry_malformed",
            LockError::DuplicateEntry { .. } => "lock_entry_duplicate",
        }
    }
}

#[must_use]
pub fn default_lock_path(workspace: &Path) -> PathBuf {
    workspace.join(LOCK_FILE_NAME)
}

pub fn parse_lockfile(contents: &str) -> Result<LockSnapshot, LockError> {
    let raw: Value = serde_json::from_str(contents)?;
    let version = raw
        .get("version")
        .and_then(Value::as_i64)
        .ok_or(LockError::MissingVersion)?;
    if version != LOCK_VERSION {
        return Err(LockError::UnsupportedVersion {
            found: version,
            supported: LOCK_VERSION,
        });
    }
    let snapshot: LockSnapshot = serde_json::from_value(raw)?;
    validate_entries(&snapshot)?;
    Ok(snapshot)
}

/// Every package entry must split back into name and version under its
/// manager's separator, and a case-folded name may appear once per manager.
/// Blank and comment lines are tolerated.
pub fn validate_entries(snapshot: &LockSnapshot) -> Result<(), LockError> {
    for (manager, entries) in snapshot.packages.iter() {
        let mut seen = HashSet::new();
        for entry in entries {
            let trimmed = entry.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some(record) = PackageRecord::parse(manager, trimmed) else {
                return Err(LockError::MalformedEntry {
                    manager,
                    entry: entry.clone(),
                });
            };
            if !seen.insert(record.key()) {
                return Err(LockError::DuplicateEntry {
                    manager,
                    name: record.name,
                });
            }
        }
    }
    Ok(())
}

pub fn load_lockfile(path: &Path) -> Result<LockSnapshot, LockError> {
    let contents = fs::read_to_string(path).map_err(|source| LockError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_lockfile(&contents)
}

pub fn load_lockfile_optional(path: &Path) -> Result<Option<LockSnapshot>, LockError> {
    if path.exists() {
        Ok(Some(load_lockfile(path)?))
    } else {
        Ok(None)
    }
}

pub fn render_lockfile(snapshot: &LockSnapshot) -> Result<String> {
    let mut rendered =
        serde_json::to_string_pretty(snapshot).context("failed to serialize lock snapshot")?;
    rendered.push('\n');
    Ok(rendered)
}

/// Replaces `path` with the rendered snapshot. The document is written to a
/// sibling temp file first so readers never observe a partial lock.
pub fn write_lockfile(path: &Path, snapshot: &LockSnapshot) -> Result<()> {
    let rendered = render_lockfile(snapshot)?;
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    let mut tmp = NamedTempFile::new_in(&parent)
        .with_context(|| format!("failed to stage lock file in {}", parent.display()))?;
    tmp.write_all(rendered.as_bytes())
        .with_context(|| format!("failed to write lock file for {}", path.display()))?;
    if let Some(permissions) = lock_permissions(path) {
        tmp.as_file()
            .set_permissions(permissions)
            .with_context(|| format!("failed to set permissions for {}", path.display()))?;
    }
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Mode for a rewritten lock: the replaced file's, or world-readable for a
/// new one. Temp files start out owner-only.
fn lock_permissions(path: &Path) -> Option<fs::Permissions> {
    match fs::metadata(path) {
        Ok(metadata) => Some(metadata.permissions()),
        Err(_) => new_lock_permissions(),
    }
}

#[cfg(unix)]
fn new_lock_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_lock_permissions() -> Option<fs::Permissions> {
    None
}
