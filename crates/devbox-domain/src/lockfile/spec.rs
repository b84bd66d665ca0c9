use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Package ecosystems whose installed state is captured in a lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Manager {
    Apt,
    Pip,
    Npm,
    Yarn,
    Pnpm,
}

impl Manager {
    pub const ALL: [Manager; 5] = [
        Manager::Apt,
        Manager::Pip,
        Manager::Npm,
        Manager::Yarn,
        Manager::Pnpm,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Manager::Apt => "apt",
            Manager::Pip => "pip",
            Manager::Npm => "npm",
            Manager::Yarn => "yarn",
            Manager::Pnpm => "pnpm",
        }
    }

    /// Separator between name and version in a lock entry.
    #[must_use]
    pub const fn separator(self) -> &'static str {
        match self {
            Manager::Apt => "=",
            Manager::Pip => "==",
            Manager::Npm | Manager::Yarn | Manager::Pnpm => "@",
        }
    }

    /// Splits `entry` into `(name, version)` using this manager's separator.
    ///
    /// Node managers split on the last `@` so scoped names such as
    /// `@scope/pkg@1.0.0` keep their leading `@`.
    #[must_use]
    pub fn split_entry(self, entry: &str) -> Option<(&str, &str)> {
        let (name, version) = match self {
            Manager::Apt => entry.split_once('='),
            Manager::Pip => entry.split_once("=="),
            Manager::Npm | Manager::Yarn | Manager::Pnpm => {
                let idx = entry.rfind('@').filter(|idx| *idx > 0)?;
                Some((&entry[..idx], &entry[idx + 1..]))
            }
        }?;
        let name = name.trim();
        let version = version.trim();
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some((name, version))
    }

    #[must_use]
    pub fn format_entry(self, name: &str, version: &str) -> String {
        format!("{name}{}{version}", self.separator())
    }
}

impl fmt::Display for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown package manager `{0}` (expected apt, pip, npm, yarn, or pnpm)")]
pub struct UnknownManager(pub String);

impl FromStr for Manager {
    type Err = UnknownManager;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lowered = raw.trim().to_ascii_lowercase();
        Manager::ALL
            .into_iter()
            .find(|manager| manager.as_str() == lowered)
            .ok_or_else(|| UnknownManager(raw.to_string()))
    }
}

/// One installed package as reported by its manager.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRecord {
    pub manager: Manager,
    pub name: String,
    pub version: String,
}

impl PackageRecord {
    /// Parses a lock entry or a listing line. Blank and `#` comment lines
    /// yield `None`, as do entries without a usable name and version.
    #[must_use]
    pub fn parse(manager: Manager, line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        let (name, version) = manager.split_entry(trimmed)?;
        Some(Self {
            manager,
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Case-folded identity used for uniqueness within one manager.
    #[must_use]
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    #[must_use]
    pub fn entry(&self) -> String {
        self.manager.format_entry(&self.name, &self.version)
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entry())
    }
}

/// Name-keyed view of one manager's entries, in input order.
pub type PackageMap = IndexMap<String, PackageRecord>;

/// Builds the case-folded `name -> record` map for `entries`.
///
/// Unparseable lines are skipped; the first occurrence of a name wins, as in
/// [`canonical_entries`].
#[must_use]
pub fn package_map<S: AsRef<str>>(manager: Manager, entries: &[S]) -> PackageMap {
    let mut map = PackageMap::new();
    for entry in entries {
        if let Some(record) = PackageRecord::parse(manager, entry.as_ref()) {
            map.entry(record.key()).or_insert(record);
        }
    }
    map
}

/// Canonical lock entries for a set of records: unique by case-folded name
/// (first occurrence wins) and sorted by that name.
#[must_use]
pub fn canonical_entries<I>(records: I) -> Vec<String>
where
    I: IntoIterator<Item = PackageRecord>,
{
    let mut unique: IndexMap<String, PackageRecord> = IndexMap::new();
    for record in records {
        unique.entry(record.key()).or_insert(record);
    }
    unique.sort_keys();
    unique.values().map(PackageRecord::entry).collect()
}
