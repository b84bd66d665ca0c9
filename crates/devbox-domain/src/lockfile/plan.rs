use std::borrow::Cow;

use serde::Serialize;

use super::spec::{package_map, Manager, PackageRecord};
use super::types::{asserted, LockPackages, LockSnapshot};

pub const APT_REFRESH: &str = "DEBIAN_FRONTEND=noninteractive apt-get update";
pub const APT_AUTOREMOVE: &str = "DEBIAN_FRONTEND=noninteractive apt-get autoremove -y";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Refresh,
    Install,
    Remove,
    Autoremove,
}

/// One shell command in a manager's ordered action group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconcileAction {
    pub manager: Manager,
    pub kind: ActionKind,
    /// Pinned entries for installs, bare names for removals.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    pub command: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ManagerPlan {
    pub manager: Manager,
    pub installs: Vec<PackageRecord>,
    pub removals: Vec<PackageRecord>,
    pub actions: Vec<ReconcileAction>,
}

impl ManagerPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Per-manager action groups. Managers with nothing to do are left out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    pub managers: Vec<ManagerPlan>,
}

impl ReconcilePlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.managers.iter().all(ManagerPlan::is_empty)
    }

    #[must_use]
    pub fn action_count(&self) -> usize {
        self.managers.iter().map(|plan| plan.actions.len()).sum()
    }

    pub fn actions(&self) -> impl Iterator<Item = &ReconcileAction> + '_ {
        self.managers.iter().flat_map(|plan| plan.actions.iter())
    }
}

/// POSIX single-quoting. Words made only of shell-safe characters pass
/// through untouched.
fn quote(arg: &str) -> Cow<'_, str> {
    let safe = |ch: char| ch.is_ascii_alphanumeric() || "-_=/,.+".contains(ch);
    if !arg.is_empty() && arg.chars().all(safe) {
        return Cow::Borrowed(arg);
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');
    for ch in arg.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

/// Diffs one manager's target entries against its current entries.
///
/// Installs cover every target name that is absent or at another version,
/// pinned to the target version and listed in target order. Removals cover
/// every current name the target lacks, in current order.
#[must_use]
pub fn plan_manager<T: AsRef<str>, C: AsRef<str>>(
    manager: Manager,
    target: &[T],
    current: &[C],
) -> ManagerPlan {
    let target = package_map(manager, target);
    let current = package_map(manager, current);

    let installs: Vec<PackageRecord> = target
        .iter()
        .filter(|(key, record)| {
            current
                .get(*key)
                .map_or(true, |live| live.version != record.version)
        })
        .map(|(_, record)| record.clone())
        .collect();
    let removals: Vec<PackageRecord> = current
        .iter()
        .filter(|(key, _)| !target.contains_key(*key))
        .map(|(_, record)| record.clone())
        .collect();

    let actions = match manager {
        Manager::Apt => apt_actions(&installs, &removals),
        _ => per_package_actions(manager, &installs, &removals),
    };
    ManagerPlan {
        manager,
        installs,
        removals,
        actions,
    }
}

fn apt_actions(installs: &[PackageRecord], removals: &[PackageRecord]) -> Vec<ReconcileAction> {
    let mut actions = Vec::new();
    if installs.is_empty() && removals.is_empty() {
        return actions;
    }
    actions.push(ReconcileAction {
        manager: Manager::Apt,
        kind: ActionKind::Refresh,
        packages: Vec::new(),
        command: APT_REFRESH.to_string(),
    });
    if !installs.is_empty() {
        let entries: Vec<String> = installs.iter().map(PackageRecord::entry).collect();
        let args: Vec<Cow<'_, str>> = entries.iter().map(|entry| quote(entry)).collect();
        actions.push(ReconcileAction {
            manager: Manager::Apt,
            kind: ActionKind::Install,
            command: format!(
                "DEBIAN_FRONTEND=noninteractive apt-get install -y --allow-downgrades {}",
                args.join(" ")
            ),
            packages: entries,
        });
    }
    if !removals.is_empty() {
        let names: Vec<String> = removals.iter().map(|record| record.name.clone()).collect();
        let args: Vec<Cow<'_, str>> = names.iter().map(|name| quote(name)).collect();
        actions.push(ReconcileAction {
            manager: Manager::Apt,
            kind: ActionKind::Remove,
            command: format!(
                "DEBIAN_FRONTEND=noninteractive apt-get remove -y {}",
                args.join(" ")
            ),
            packages: names,
        });
        actions.push(ReconcileAction {
            manager: Manager::Apt,
            kind: ActionKind::Autoremove,
            packages: Vec::new(),
            command: APT_AUTOREMOVE.to_string(),
        });
    }
    actions
}

fn install_prefix(manager: Manager) -> &'static str {
    match manager {
        Manager::Apt => "DEBIAN_FRONTEND=noninteractive apt-get install -y --allow-downgrades",
        Manager::Pip => "python3 -m pip install",
        Manager::Npm => "npm install -g",
        Manager::Yarn => "yarn global add",
        Manager::Pnpm => "pnpm add -g",
    }
}

fn remove_prefix(manager: Manager) -> &'static str {
    match manager {
        Manager::Apt => "DEBIAN_FRONTEND=noninteractive apt-get remove -y",
        Manager::Pip => "python3 -m pip uninstall -y",
        Manager::Npm => "npm uninstall -g",
        Manager::Yarn => "yarn global remove",
        Manager::Pnpm => "pnpm remove -g",
    }
}

fn per_package_actions(
    manager: Manager,
    installs: &[PackageRecord],
    removals: &[PackageRecord],
) -> Vec<ReconcileAction> {
    let install = installs.iter().map(|record| {
        let entry = record.entry();
        ReconcileAction {
            manager,
            kind: ActionKind::Install,
            command: format!("{} {}", install_prefix(manager), quote(&entry)),
            packages: vec![entry],
        }
    });
    let remove = removals.iter().map(|record| ReconcileAction {
        manager,
        kind: ActionKind::Remove,
        command: format!("{} {}", remove_prefix(manager), quote(&record.name)),
        packages: vec![record.name.clone()],
    });
    install.chain(remove).collect()
}

/// Plans every manager. Each manager's group is independent of the others.
#[must_use]
pub fn plan_reconcile(target: &LockPackages, current: &LockPackages) -> ReconcilePlan {
    let managers = Manager::ALL
        .into_iter()
        .map(|manager| plan_manager(manager, target.get(manager), current.get(manager)))
        .filter(|plan| !plan.is_empty())
        .collect();
    ReconcilePlan { managers }
}

/// Commands that point the sandbox's package managers at the sources and
/// registries recorded in `lock`, in execution order.
#[must_use]
pub fn source_configuration_commands(lock: &LockSnapshot) -> Vec<String> {
    let mut commands = Vec::new();
    let sources = &lock.apt_sources;
    let lines: Vec<&str> = sources
        .source_lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect();
    if !lines.is_empty() {
        commands.push(
            "cp /etc/apt/sources.list /etc/apt/sources.list.devbox.bak 2>/dev/null || true"
                .to_string(),
        );
        commands.push("rm -f /etc/apt/sources.list.d/*.list".to_string());
        commands.push(format!(
            "printf '%s\\n' {} > /etc/apt/sources.list",
            quote_all(&lines)
        ));
    }
    if let Some(release) = asserted(sources.pinned_release.as_ref()) {
        let directive = format!("APT::Default-Release \"{release}\";");
        commands.push(format!(
            "printf '%s\\n' {} > /etc/apt/apt.conf.d/99defaultrelease",
            quote(&directive)
        ));
    }
    if !lines.is_empty() {
        commands.push(APT_REFRESH.to_string());
    }

    let registries = &lock.registries;
    let index = asserted(registries.pip_index_url.as_ref());
    let extras: Vec<&str> = registries
        .pip_extra_index_urls
        .iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .collect();
    if index.is_some() || !extras.is_empty() {
        let mut conf = vec!["[global]".to_string()];
        if let Some(index) = index {
            conf.push(format!("index-url = {index}"));
        }
        if !extras.is_empty() {
            conf.push(format!("extra-index-url = {}", extras.join(" ")));
        }
        let conf: Vec<&str> = conf.iter().map(String::as_str).collect();
        commands.push(format!("printf '%s\\n' {} > /etc/pip.conf", quote_all(&conf)));
    }

    if let Some(url) = registries.node_registry(Manager::Npm) {
        commands.push(format!("npm config set registry {} -g", quote(url)));
    }
    if let Some(url) = registries.node_registry(Manager::Yarn) {
        commands.push(format!(
            "yarn config set npmRegistryServer {} -g",
            quote(url)
        ));
    }
    if let Some(url) = registries.node_registry(Manager::Pnpm) {
        commands.push(format!("pnpm config set registry {} -g", quote(url)));
    }
    commands
}

fn quote_all(args: &[&str]) -> String {
    args.iter()
        .map(|arg| quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}
