//! Per-manager package listing and parsing.

use serde_json::Value;

use devbox_domain::{canonical_entries, LockPackages, Manager, PackageRecord};

use crate::core::runtime::effects::SandboxExecutor;
use crate::core::runtime::pool::{Task, WorkerPool};

/// Shell command that lists one manager's installed packages.
pub(crate) fn listing_command(manager: Manager) -> &'static str {
    match manager {
        Manager::Apt => {
            "pkgs=$(apt-mark showmanual 2>/dev/null); \
             if [ -n \"$pkgs\" ]; then dpkg-query -W -f='${Package}=${Version}\\n' $pkgs 2>/dev/null | sort; fi"
        }
        Manager::Pip => "python3 -m pip freeze 2>/dev/null || pip3 freeze 2>/dev/null || true",
        Manager::Npm => "npm ls -g --depth=0 --json 2>/dev/null || true",
        Manager::Yarn => "yarn global list --depth=0 2>/dev/null || true",
        Manager::Pnpm => "pnpm ls -g --depth=0 --json 2>/dev/null || true",
    }
}

/// Parses one manager's listing output into canonical lock entries.
pub(crate) fn parse_listing(manager: Manager, output: &str) -> Vec<String> {
    let records = match manager {
        Manager::Apt | Manager::Pip => parse_pinned_lines(manager, output),
        Manager::Npm => parse_npm(output),
        Manager::Yarn => parse_yarn(output),
        Manager::Pnpm => parse_pnpm(output),
    };
    canonical_entries(records)
}

/// `name<sep>version` lines, one package per line. Lines in any other shape
/// (editable installs, direct references) are skipped.
fn parse_pinned_lines(manager: Manager, output: &str) -> Vec<PackageRecord> {
    output
        .lines()
        .filter_map(|line| {
            let record = PackageRecord::parse(manager, line);
            if record.is_none() && !is_ignorable(line) {
                tracing::debug!(%manager, line = line.trim(), "skipping unpinned listing line");
            }
            record
        })
        .collect()
}

fn is_ignorable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// `npm ls --json` output; plain `name@version` lines when the output is not
/// JSON.
fn parse_npm(output: &str) -> Vec<PackageRecord> {
    match serde_json::from_str::<Value>(output.trim()) {
        Ok(document) => dependency_records(Manager::Npm, &document),
        Err(_) => parse_entry_lines(Manager::Npm, output, Prefix::Optional),
    }
}

/// `pnpm ls --json` prints an array of roots; each carries a dependency map.
fn parse_pnpm(output: &str) -> Vec<PackageRecord> {
    match serde_json::from_str::<Value>(output.trim()) {
        Ok(Value::Array(roots)) => roots
            .iter()
            .flat_map(|root| dependency_records(Manager::Pnpm, root))
            .collect(),
        Ok(document) => dependency_records(Manager::Pnpm, &document),
        Err(_) => parse_entry_lines(Manager::Pnpm, output, Prefix::Optional),
    }
}

fn dependency_records(manager: Manager, document: &Value) -> Vec<PackageRecord> {
    let Some(dependencies) = document.get("dependencies").and_then(Value::as_object) else {
        return Vec::new();
    };
    dependencies
        .iter()
        .filter_map(|(name, info)| {
            let version = info.get("version").and_then(Value::as_str)?.trim();
            if name.trim().is_empty() || version.is_empty() {
                return None;
            }
            Some(PackageRecord {
                manager,
                name: name.trim().to_string(),
                version: version.to_string(),
            })
        })
        .collect()
}

/// Yarn prints either a dependency tree or `info "name@version" has
/// binaries:` lines.
fn parse_yarn(output: &str) -> Vec<PackageRecord> {
    let mut records = parse_entry_lines(Manager::Yarn, output, Prefix::Required);
    records.extend(output.lines().filter_map(|line| {
        let rest = line.trim().strip_prefix("info \"")?;
        let (entry, tail) = rest.split_once('"')?;
        if !tail.trim_start().starts_with("has binaries") {
            return None;
        }
        PackageRecord::parse(Manager::Yarn, entry)
    }));
    records
}

/// Whether an entry line must carry a tree-drawing prefix.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Prefix {
    Required,
    Optional,
}

/// Tree-drawing lines such as `├── name@1.0.0 (deduped)`, and plain
/// `name@version` lines where `prefix` allows them.
fn parse_entry_lines(manager: Manager, output: &str, prefix: Prefix) -> Vec<PackageRecord> {
    output
        .lines()
        .filter_map(|line| {
            let (entry, had_prefix) = strip_tree_prefix(line);
            if prefix == Prefix::Required && !had_prefix {
                return None;
            }
            let entry = strip_annotation(entry);
            if entry.split_whitespace().count() != 1 {
                return None;
            }
            PackageRecord::parse(manager, entry)
        })
        .collect()
}

fn strip_tree_prefix(line: &str) -> (&str, bool) {
    let trimmed = line.trim();
    let stripped =
        trimmed.trim_start_matches(|ch: char| matches!(ch, '├' | '└' | '│' | '─' | '┬' | '`' | '|' | '+' | '-'));
    (stripped.trim_start(), stripped.len() != trimmed.len())
}

fn strip_annotation(entry: &str) -> &str {
    match entry.find(" (") {
        Some(idx) if entry.ends_with(')') => entry[..idx].trim_end(),
        _ => entry,
    }
}

/// Lists every manager in parallel. A manager whose listing fails is
/// recorded as empty.
pub(crate) fn collect_packages(
    sandbox: &dyn SandboxExecutor,
    name: &str,
    pool: &WorkerPool,
) -> LockPackages {
    let tasks: Vec<Task<'_, Vec<String>>> = Manager::ALL
        .into_iter()
        .map(|manager| {
            Box::new(move || -> anyhow::Result<Vec<String>> {
                let output = sandbox.execute(name, listing_command(manager))?;
                if !output.success() {
                    anyhow::bail!(
                        "`{}` exited with {}: {}",
                        listing_command(manager),
                        output.code,
                        output.stderr.trim()
                    );
                }
                Ok(parse_listing(manager, &output.stdout))
            }) as Task<'_, Vec<String>>
        })
        .collect();

    let mut packages = LockPackages::default();
    for (manager, result) in Manager::ALL.into_iter().zip(pool.execute(tasks)) {
        match result {
            Ok(entries) => {
                tracing::debug!(sandbox = name, %manager, count = entries.len(), "collected packages");
                packages.set(manager, entries);
            }
            Err(err) => {
                tracing::warn!(sandbox = name, %manager, error = %err, "package listing failed; recording none");
            }
        }
    }
    packages
}
