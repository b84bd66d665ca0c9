use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use url::Url;

use super::spec::{package_map, Manager};
use super::types::{asserted, LockSnapshot, ObservedState};

/// Comparable form of a registry or mirror URL: scheme, host and path are
/// case-folded and trailing slashes dropped. Strings that do not parse as a
/// URL are only trimmed and case-folded.
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let rendered = match Url::parse(trimmed) {
        Ok(url) if url.has_host() => url.as_str().to_string(),
        _ => trimmed.to_string(),
    };
    rendered.to_lowercase().trim_end_matches('/').to_string()
}

fn normalized_set<S, F>(values: &[S], normalize: F) -> BTreeSet<String>
where
    S: AsRef<str>,
    F: Fn(&str) -> String,
{
    values
        .iter()
        .map(|value| value.as_ref().trim())
        .filter(|value| !value.is_empty())
        .map(normalize)
        .collect()
}

/// Set equality after trimming and discarding blank entries.
#[must_use]
pub fn string_set_equal<A: AsRef<str>, B: AsRef<str>>(left: &[A], right: &[B]) -> bool {
    normalized_set(left, str::to_string) == normalized_set(right, str::to_string)
}

/// Set equality of URL lists under [`normalize_url`].
#[must_use]
pub fn url_set_equal<A: AsRef<str>, B: AsRef<str>>(left: &[A], right: &[B]) -> bool {
    normalized_set(left, normalize_url) == normalized_set(right, normalize_url)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VersionChange {
    pub name: String,
    pub locked: String,
    pub current: String,
}

/// One mismatch between a lock and the live sandbox.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DriftFinding {
    /// Lock field that drifted, e.g. `packages.apt` or `registries.npmRegistry`.
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<Manager>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unexpected: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<VersionChange>,
}

impl DriftFinding {
    fn scalar(
        field: &str,
        manager: Option<Manager>,
        label: &str,
        locked: &str,
        current: &str,
    ) -> Self {
        let shown = if current.is_empty() { "<unset>" } else { current };
        Self {
            field: field.to_string(),
            manager,
            message: format!("{label} differs: lock={locked} current={shown}"),
            locked: Some(locked.to_string()),
            current: Some(current.to_string()),
            missing: Vec::new(),
            unexpected: Vec::new(),
            changed: Vec::new(),
        }
    }

    fn list(
        field: &str,
        manager: Option<Manager>,
        label: &str,
        locked: &[String],
        current: &[String],
    ) -> Self {
        let locked_set = normalized_set(locked, str::to_string);
        let current_set = normalized_set(current, str::to_string);
        Self {
            field: field.to_string(),
            manager,
            message: format!(
                "{label} differ: lock=[{}] current=[{}]",
                locked_set.iter().cloned().collect::<Vec<_>>().join(", "),
                current_set.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
            locked: None,
            current: None,
            missing: locked_set.difference(&current_set).cloned().collect(),
            unexpected: current_set.difference(&locked_set).cloned().collect(),
            changed: Vec::new(),
        }
    }
}

impl fmt::Display for DriftFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Compares a lock against observed state. An empty result means the
/// sandbox matches.
///
/// Registry, snapshot URL and pinned release fields are compared only when
/// the lock asserts them. Package lists are always compared, so an empty
/// locked list requires an empty live list.
#[must_use]
pub fn detect_drift(lock: &LockSnapshot, observed: &ObservedState) -> Vec<DriftFinding> {
    let mut findings = Vec::new();
    let sources = &lock.apt_sources;
    let live_sources = &observed.apt_sources;

    if let Some(locked) = asserted(sources.snapshot_url.as_ref()) {
        let current = asserted(live_sources.snapshot_url.as_ref()).unwrap_or_default();
        if normalize_url(locked) != normalize_url(current) {
            findings.push(DriftFinding::scalar(
                "aptSources.snapshotUrl",
                Some(Manager::Apt),
                "apt snapshot URL",
                locked,
                current,
            ));
        }
    }
    if let Some(locked) = asserted(sources.pinned_release.as_ref()) {
        let current = asserted(live_sources.pinned_release.as_ref()).unwrap_or_default();
        if locked != current {
            findings.push(DriftFinding::scalar(
                "aptSources.pinnedRelease",
                Some(Manager::Apt),
                "apt pinned release",
                locked,
                current,
            ));
        }
    }
    if !normalized_set(&sources.source_lines, str::to_string).is_empty()
        && !string_set_equal(&sources.source_lines, &live_sources.source_lines)
    {
        findings.push(DriftFinding::list(
            "aptSources.sourceLines",
            Some(Manager::Apt),
            "apt source lines",
            &sources.source_lines,
            &live_sources.source_lines,
        ));
    }

    let registries = &lock.registries;
    let live_registries = &observed.registries;
    if let Some(locked) = asserted(registries.pip_index_url.as_ref()) {
        let current = asserted(live_registries.pip_index_url.as_ref()).unwrap_or_default();
        if normalize_url(locked) != normalize_url(current) {
            findings.push(DriftFinding::scalar(
                "registries.pipIndexUrl",
                Some(Manager::Pip),
                "pip index URL",
                locked,
                current,
            ));
        }
    }
    if !normalized_set(&registries.pip_extra_index_urls, normalize_url).is_empty()
        && !url_set_equal(
            &registries.pip_extra_index_urls,
            &live_registries.pip_extra_index_urls,
        )
    {
        findings.push(DriftFinding::list(
            "registries.pipExtraIndexUrls",
            Some(Manager::Pip),
            "pip extra index URLs",
            &registries.pip_extra_index_urls,
            &live_registries.pip_extra_index_urls,
        ));
    }
    for manager in [Manager::Npm, Manager::Yarn, Manager::Pnpm] {
        if let Some(locked) = registries.node_registry(manager) {
            let current = live_registries.node_registry(manager).unwrap_or_default();
            if normalize_url(locked) != normalize_url(current) {
                findings.push(DriftFinding::scalar(
                    &format!("registries.{manager}Registry"),
                    Some(manager),
                    &format!("{manager} registry"),
                    locked,
                    current,
                ));
            }
        }
    }

    for manager in Manager::ALL {
        if let Some(finding) = package_drift(
            manager,
            lock.packages.get(manager),
            observed.packages.get(manager),
        ) {
            findings.push(finding);
        }
    }
    findings
}

/// Package-set comparison for one manager, keyed by case-folded name.
#[must_use]
pub fn package_drift(
    manager: Manager,
    locked: &[String],
    current: &[String],
) -> Option<DriftFinding> {
    let locked = package_map(manager, locked);
    let current = package_map(manager, current);

    let mut missing = Vec::new();
    let mut changed = Vec::new();
    for (key, record) in &locked {
        match current.get(key) {
            None => missing.push(record.entry()),
            Some(live) if live.version != record.version => changed.push(VersionChange {
                name: record.name.clone(),
                locked: record.version.clone(),
                current: live.version.clone(),
            }),
            Some(_) => {}
        }
    }
    let mut unexpected: Vec<String> = current
        .iter()
        .filter(|(key, _)| !locked.contains_key(*key))
        .map(|(_, record)| record.entry())
        .collect();
    if missing.is_empty() && unexpected.is_empty() && changed.is_empty() {
        return None;
    }
    missing.sort();
    unexpected.sort();
    changed.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing {}", missing.join(", ")));
    }
    if !unexpected.is_empty() {
        parts.push(format!("unexpected {}", unexpected.join(", ")));
    }
    if !changed.is_empty() {
        let rendered: Vec<String> = changed
            .iter()
            .map(|change| {
                format!(
                    "{} (lock={} current={})",
                    change.name, change.locked, change.current
                )
            })
            .collect();
        parts.push(format!("changed {}", rendered.join(", ")));
    }

    Some(DriftFinding {
        field: format!("packages.{manager}"),
        manager: Some(manager),
        message: format!("{manager} packages differ: {}", parts.join("; ")),
        locked: None,
        current: None,
        missing,
        unexpected,
        changed,
    })
}
