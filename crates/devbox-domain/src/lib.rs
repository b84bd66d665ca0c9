#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod lockfile;
pub mod project;

pub use lockfile::{
    asserted, canonical_entries, default_lock_path, detect_drift, load_lockfile,
    load_lockfile_optional, normalize_url, package_drift, package_map, parse_lockfile,
    plan_manager, plan_reconcile, render_lockfile, source_configuration_commands,
    string_set_equal, url_set_equal, validate_entries, write_lockfile, ActionKind, AptSources, BaseImage, DriftFinding,
    LockError, LockPackages, LockRegistries, LockSnapshot, Manager, ManagerPlan, ObservedState,
    PackageMap, PackageRecord, ReconcileAction, ReconcilePlan, SandboxMeta, UnknownManager,
    VersionChange, APT_AUTOREMOVE, APT_REFRESH, LOCK_FILE_NAME, LOCK_VERSION,
};
pub use project::{
    default_home, find_project_config, load_project_config, load_registry, ProjectConfig,
    ProjectEntry, Registry,
};
