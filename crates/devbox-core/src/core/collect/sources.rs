//! Registry and apt source configuration readers.

use devbox_domain::{AptSources, LockRegistries};

use crate::core::runtime::effects::SandboxExecutor;
use crate::core::runtime::pool::{Task, WorkerPool};

const APT_SOURCES: &str = "cat /etc/apt/sources.list 2>/dev/null; echo; \
                           cat /etc/apt/sources.list.d/*.list 2>/dev/null || true";
const OS_RELEASE: &str = ". /etc/os-release 2>/dev/null; echo \"$VERSION_CODENAME\"";
const PIP_CONFIG: &str =
    "(python3 -m pip config debug || pip3 config debug || pip config debug) 2>/dev/null || true";
const PIP_CONF_FILES: &str = "cat /etc/pip.conf ~/.pip/pip.conf 2>/dev/null || true";
const NPM_REGISTRY: &str = "npm config get registry 2>/dev/null || true";
const YARN_REGISTRY: &str = "yarn config get npmRegistryServer 2>/dev/null || true";
const PNPM_REGISTRY: &str = "pnpm config get registry 2>/dev/null || true";

const SNAPSHOT_HOSTS: [&str; 2] = ["snapshot.debian.org", "snapshot.ubuntu.com"];

/// Everything read from the sandbox's registry and source configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct SourceState {
    pub(crate) registries: LockRegistries,
    pub(crate) apt_sources: AptSources,
}

/// Reads apt sources, pip indexes and node registries in parallel. A read
/// that fails leaves its field empty.
pub(crate) fn collect_sources(
    sandbox: &dyn SandboxExecutor,
    name: &str,
    pool: &WorkerPool,
) -> SourceState {
    let commands = [
        APT_SOURCES,
        OS_RELEASE,
        PIP_CONFIG,
        PIP_CONF_FILES,
        NPM_REGISTRY,
        YARN_REGISTRY,
        PNPM_REGISTRY,
    ];
    let tasks: Vec<Task<'_, String>> = commands
        .into_iter()
        .map(|command| {
            Box::new(move || read_output(sandbox, name, command)) as Task<'_, String>
        })
        .collect();
    let mut outputs: Vec<String> = pool
        .execute(tasks)
        .into_iter()
        .zip(commands)
        .map(|(result, command)| {
            result.unwrap_or_else(|err| {
                tracing::warn!(sandbox = name, command, error = %err, "source read failed; recording none");
                String::new()
            })
        })
        .collect();
    let mut take = |idx: usize| std::mem::take(&mut outputs[idx]);
    let (apt, release, pip_debug, pip_files) = (take(0), take(1), take(2), take(3));
    let (npm, yarn, pnpm) = (take(4), take(5), take(6));

    let (source_lines, snapshot_url) = parse_apt_sources(&apt);
    let (mut pip_index_url, mut pip_extra_index_urls) = parse_pip_settings(&pip_debug);
    if pip_index_url.is_none() && pip_extra_index_urls.is_empty() {
        (pip_index_url, pip_extra_index_urls) = parse_pip_settings(&pip_files);
    }

    SourceState {
        registries: LockRegistries {
            pip_index_url,
            pip_extra_index_urls,
            npm_registry: parse_registry(&npm),
            yarn_registry: parse_registry(&yarn),
            pnpm_registry: parse_registry(&pnpm),
        },
        apt_sources: AptSources {
            snapshot_url,
            source_lines,
            pinned_release: first_line(&release),
        },
    }
}

fn read_output(sandbox: &dyn SandboxExecutor, name: &str, command: &str) -> anyhow::Result<String> {
    let output = sandbox.execute(name, command)?;
    if !output.success() {
        anyhow::bail!("`{command}` exited with {}: {}", output.code, output.stderr.trim());
    }
    Ok(output.stdout)
}

/// Source lines with comments and blanks dropped, plus the snapshot mirror
/// URL when one of the lines points at a snapshot archive.
pub(crate) fn parse_apt_sources(output: &str) -> (Vec<String>, Option<String>) {
    let lines: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToOwned::to_owned)
        .collect();
    let snapshot_url = lines
        .iter()
        .filter(|line| SNAPSHOT_HOSTS.iter().any(|host| line.contains(host)))
        .find_map(|line| {
            line.split_whitespace()
                .find(|token| token.starts_with("http://") || token.starts_with("https://"))
                .map(ToOwned::to_owned)
        });
    (lines, snapshot_url)
}

/// Index URL and extra index URLs from `pip config debug` output
/// (`global.index-url: X`) or from pip.conf files (`index-url = X`). The
/// first index URL wins.
pub(crate) fn parse_pip_settings(output: &str) -> (Option<String>, Vec<String>) {
    let mut index_url = None;
    let mut extras = Vec::new();
    for line in output.lines() {
        let Some(split) = line.find([':', '=']) else {
            continue;
        };
        let key = line[..split].trim();
        let value = line[split + 1..].trim();
        if value.is_empty() {
            continue;
        }
        if key.ends_with("extra-index-url") {
            for url in value.split_whitespace() {
                if !extras.iter().any(|known| known == url) {
                    extras.push(url.to_string());
                }
            }
        } else if key.ends_with("index-url") && index_url.is_none() {
            index_url = Some(value.to_string());
        }
    }
    (index_url, extras)
}

/// A registry value from `<tool> config get`; tools print `undefined` or
/// `null` when nothing is configured.
pub(crate) fn parse_registry(output: &str) -> Option<String> {
    first_line(output).filter(|value| !matches!(value.as_str(), "undefined" | "null"))
}

fn first_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToOwned::to_owned)
}
