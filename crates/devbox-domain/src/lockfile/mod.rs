pub(crate) mod analysis;
pub(crate) mod io;
pub(crate) mod plan;
pub(crate) mod spec;
pub(crate) mod types;

pub use analysis::{
    detect_drift, normalize_url, package_drift, string_set_equal, url_set_equal, DriftFinding,
    VersionChange,
};
pub use io::{
    default_lock_path, load_lockfile, load_lockfile_optional, parse_lockfile, render_lockfile,
    validate_entries, write_lockfile, LockError,
};
pub use plan::{
    plan_manager, plan_reconcile, source_configuration_commands, ActionKind, ManagerPlan,
    ReconcileAction, ReconcilePlan, APT_AUTOREMOVE, APT_REFRESH,
};
pub use spec::{canonical_entries, package_map, Manager, PackageMap, PackageRecord, UnknownManager};
pub use types::{
    asserted, AptSources, BaseImage, LockPackages, LockRegistries, LockSnapshot, ObservedState,
    SandboxMeta, LOCK_FILE_NAME, LOCK_VERSION,
};

#[cfg(test)]
mod proptests;
#[cfg(test)]
mod tests;
