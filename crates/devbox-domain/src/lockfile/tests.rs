use tempfile::tempdir;

use super::*;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

fn sample_lock() -> LockSnapshot {
    LockSnapshot {
        version: LOCK_VERSION,
        project: "demo".into(),
        sandbox_name: "devbox_demo".into(),
        created_at: "2024-05-01T12:00:00Z".into(),
        base_image: BaseImage {
            name: "ubuntu:22.04".into(),
            digest: Some("ubuntu@sha256:abc".into()),
            id: Some("sha256:def".into()),
        },
        packages: LockPackages {
            apt: strings(&["curl=7.68.0-1"]),
            pip: strings(&["requests==2.28.0"]),
            npm: strings(&["@scope/pkg@2.0.0"]),
            ..LockPackages::default()
        },
        ..LockSnapshot::default()
    }
}

fn observed(packages: LockPackages) -> ObservedState {
    ObservedState {
        packages,
        ..ObservedState::default()
    }
}

#[test]
fn node_entries_split_on_last_at() {
    let plain = PackageRecord::parse(Manager::Npm, "left-pad@1.3.2").expect("parse");
    assert_eq!(plain.name, "left-pad");
    assert_eq!(plain.version, "1.3.2");

    let scoped = PackageRecord::parse(Manager::Yarn, "@scope/pkg@2.0.0").expect("parse");
    assert_eq!(scoped.name, "@scope/pkg");
    assert_eq!(scoped.version, "2.0.0");

    assert!(PackageRecord::parse(Manager::Pnpm, "@scope/pkg").is_none());
}

#[test]
fn apt_and_pip_use_their_own_separators() {
    let apt = PackageRecord::parse(Manager::Apt, " curl=7.68.0-1 ").expect("parse");
    assert_eq!((apt.name.as_str(), apt.version.as_str()), ("curl", "7.68.0-1"));

    let pip = PackageRecord::parse(Manager::Pip, "requests==2.28.0").expect("parse");
    assert_eq!((pip.name.as_str(), pip.version.as_str()), ("requests", "2.28.0"));

    assert!(PackageRecord::parse(Manager::Pip, "requests=2.28.0").is_none());
    assert!(PackageRecord::parse(Manager::Pip, "# comment==1").is_none());
    assert!(PackageRecord::parse(Manager::Apt, "   ").is_none());
    assert!(PackageRecord::parse(Manager::Apt, "curl=").is_none());
}

#[test]
fn manager_names_round_trip_through_from_str() {
    for manager in Manager::ALL {
        assert_eq!(manager.as_str().parse::<Manager>().ok(), Some(manager));
    }
    assert!("brew".parse::<Manager>().is_err());
}

#[test]
fn canonical_entries_dedupe_and_sort_by_folded_name() {
    let records = ["Zlib=1", "curl=2", "zlib=3"]
        .iter()
        .filter_map(|line| PackageRecord::parse(Manager::Apt, line));
    assert_eq!(canonical_entries(records), strings(&["curl=2", "Zlib=1"]));
}

#[test]
fn url_normalization_folds_case_and_trailing_slash() {
    assert_eq!(
        normalize_url("HTTPS://Example.com/Simple/"),
        normalize_url("https://example.com/simple")
    );
    assert_eq!(normalize_url("  not a url/ "), "not a url");
    assert!(url_set_equal(
        &["https://A.example/x/", ""],
        &["https://a.example/x"]
    ));
    assert!(string_set_equal(&["b", " a "], &["a", "b", ""]));
    assert!(!string_set_equal(&["a"], &["A"]));
}

#[test]
fn lockfile_round_trips_through_disk() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = default_lock_path(dir.path());
    let lock = sample_lock();
    write_lockfile(&path, &lock)?;

    let contents = std::fs::read_to_string(&path)?;
    assert!(contents.ends_with('\n'));
    assert!(contents.contains("\"sandboxName\""));
    assert!(contents.contains("\"yarn\": []"));

    let loaded = load_lockfile(&path)?;
    assert_eq!(loaded, lock);
    Ok(())
}

#[test]
fn write_replaces_previous_lock() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("nested").join("custom.lock.json");
    let mut lock = sample_lock();
    write_lockfile(&path, &lock)?;
    lock.packages.apt.clear();
    write_lockfile(&path, &lock)?;
    assert!(load_lockfile(&path)?.packages.apt.is_empty());
    Ok(())
}

#[cfg(unix)]
#[test]
fn written_lock_is_world_readable_and_keeps_existing_mode() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir()?;
    let path = default_lock_path(dir.path());
    let lock = sample_lock();
    write_lockfile(&path, &lock)?;
    assert_eq!(std::fs::metadata(&path)?.permissions().mode() & 0o777, 0o644);

    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o664))?;
    write_lockfile(&path, &lock)?;
    assert_eq!(std::fs::metadata(&path)?.permissions().mode() & 0o777, 0o664);
    Ok(())
}

#[test]
fn optional_load_returns_none_for_missing_file() -> anyhow::Result<()> {
    let dir = tempdir()?;
    assert!(load_lockfile_optional(&dir.path().join("absent.json"))?.is_none());
    Ok(())
}

#[test]
fn rejects_unknown_lock_version() {
    let err = parse_lockfile(r#"{"version": 2, "project": "demo"}"#).unwrap_err();
    assert!(matches!(
        err,
        LockError::UnsupportedVersion {
            found: 2,
            supported: 1
        }
    ));
    assert_eq!(err.reason(), "lock_version_unsupported");

    let err = parse_lockfile(r#"{"project": "demo"}"#).unwrap_err();
    assert!(matches!(err, LockError::MissingVersion));
}

#[test]
fn rejects_entries_that_do_not_split() {
    let raw = r#"{
        "version": 1,
        "project": "demo",
        "sandboxName": "devbox_demo",
        "createdAt": "2024-05-01T12:00:00Z",
        "baseImage": {"name": "ubuntu:22.04"},
        "packages": {"pip": ["requests=2.28.0"]}
    }"#;
    match parse_lockfile(raw) {
        Err(LockError::MalformedEntry { manager, entry }) => {
            assert_eq!(manager, Manager::Pip);
            assert_eq!(entry, "requests=2.28.0");
        }
        other => panic!("expected malformed entry, got {other:?}"),
    }
}

#[test]
fn rejects_names_repeated_with_other_case() {
    let raw = r#"{
        "version": 1,
        "project": "demo",
        "sandboxName": "devbox_demo",
        "createdAt": "2024-05-01T12:00:00Z",
        "baseImage": {"name": "ubuntu:22.04"},
        "packages": {"pip": ["requests==2.28.0", "Requests==2.31.0"]}
    }"#;
    let err = parse_lockfile(raw).unwrap_err();
    match &err {
        LockError::DuplicateEntry { manager, name } => {
            assert_eq!(*manager, Manager::Pip);
            assert_eq!(name, "Requests");
        }
        other => panic!("expected duplicate entry, got {other:?}"),
    }
    assert_eq!(err.reason(), "lock_entry_duplicate");
}

#[test]
fn package_map_keeps_first_occurrence() {
    let map = package_map(Manager::Npm, &["left-pad@1.3.2", "Left-Pad@1.0.0"]);
    assert_eq!(map.len(), 1);
    assert_eq!(map["left-pad"].version, "1.3.2");
}

#[test]
fn accepts_legacy_snake_case_fields() -> anyhow::Result<()> {
    let raw = r#"{
        "version": 1,
        "project": "demo",
        "box_name": "devbox_demo",
        "created_at": "2024-05-01T12:00:00Z",
        "base_image": {"name": "ubuntu:22.04", "digest": "ubuntu@sha256:abc"},
        "container": {"working_dir": "/workspace", "restart": "no"},
        "packages": {"apt": ["curl=7.68.0-1"]},
        "apt_sources": {"sources_lists": ["deb http://archive.ubuntu.com/ubuntu jammy main"]},
        "setup_commands": ["apt-get install -y curl"]
    }"#;
    let lock = parse_lockfile(raw)?;
    assert_eq!(lock.sandbox_name, "devbox_demo");
    assert_eq!(lock.sandbox_meta.working_dir, "/workspace");
    assert_eq!(lock.sandbox_meta.restart_policy, "no");
    assert_eq!(lock.apt_sources.source_lines.len(), 1);
    assert_eq!(lock.setup_commands, strings(&["apt-get install -y curl"]));
    assert!(lock.packages.npm.is_empty());
    Ok(())
}

#[test]
fn identical_state_has_no_drift() {
    let lock = sample_lock();
    let mut live = lock.packages.clone();
    live.apt = strings(&["CURL=7.68.0-1"]);
    live.npm.reverse();
    assert!(detect_drift(&lock, &observed(live)).is_empty());
}

#[test]
fn version_change_is_one_finding_naming_the_package() {
    let lock = LockSnapshot {
        packages: LockPackages {
            apt: strings(&["curl=7.68.0-1"]),
            ..LockPackages::default()
        },
        ..sample_lock()
    };
    let live = LockPackages {
        apt: strings(&["curl=7.81.0-1ubuntu1"]),
        ..LockPackages::default()
    };
    let findings = detect_drift(&lock, &observed(live));
    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.manager, Some(Manager::Apt));
    assert_eq!(finding.field, "packages.apt");
    assert!(finding.message.contains("curl"));
    assert_eq!(
        finding.changed,
        vec![VersionChange {
            name: "curl".into(),
            locked: "7.68.0-1".into(),
            current: "7.81.0-1ubuntu1".into(),
        }]
    );
    assert!(finding.missing.is_empty() && finding.unexpected.is_empty());
}

#[test]
fn empty_locked_list_flags_unexpected_packages() {
    let lock = LockSnapshot {
        packages: LockPackages::default(),
        ..sample_lock()
    };
    let live = LockPackages {
        npm: strings(&["typescript@5.0.0"]),
        ..LockPackages::default()
    };
    let findings = detect_drift(&lock, &observed(live));
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].unexpected, strings(&["typescript@5.0.0"]));
}

#[test]
fn registries_are_compared_only_when_asserted() {
    let mut lock = LockSnapshot {
        packages: LockPackages::default(),
        ..sample_lock()
    };
    let mut live = observed(LockPackages::default());
    live.registries.npm_registry = Some("https://mirror.example/npm".into());
    assert!(detect_drift(&lock, &live).is_empty());

    lock.registries.npm_registry = Some("HTTPS://Registry.npmjs.org/".into());
    let findings = detect_drift(&lock, &live);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].field, "registries.npmRegistry");

    live.registries.npm_registry = Some("https://registry.npmjs.org".into());
    assert!(detect_drift(&lock, &live).is_empty());

    lock.registries.pnpm_registry = Some("   ".into());
    assert!(detect_drift(&lock, &live).is_empty());
}

#[test]
fn drift_findings_follow_source_then_registry_then_package_order() {
    let mut lock = sample_lock();
    lock.apt_sources = AptSources {
        snapshot_url: Some("https://snapshot.debian.org/archive/debian/20240101T000000Z".into()),
        source_lines: strings(&["deb http://deb.debian.org/debian bookworm main"]),
        pinned_release: Some("bookworm".into()),
    };
    lock.registries.pip_index_url = Some("https://pypi.org/simple".into());
    lock.registries.pip_extra_index_urls = strings(&["https://extra.example/simple"]);

    let live = ObservedState {
        packages: LockPackages::default(),
        registries: LockRegistries::default(),
        apt_sources: AptSources {
            snapshot_url: None,
            source_lines: strings(&["deb http://deb.debian.org/debian trixie main"]),
            pinned_release: Some("trixie".into()),
        },
    };
    let fields: Vec<String> = detect_drift(&lock, &live)
        .into_iter()
        .map(|finding| finding.field)
        .collect();
    assert_eq!(
        fields,
        strings(&[
            "aptSources.snapshotUrl",
            "aptSources.pinnedRelease",
            "aptSources.sourceLines",
            "registries.pipIndexUrl",
            "registries.pipExtraIndexUrls",
            "packages.apt",
            "packages.pip",
            "packages.npm",
        ])
    );
}

#[test]
fn apt_plan_batches_installs_after_refresh() {
    let plan = plan_manager(
        Manager::Apt,
        &["curl=7.68.0-1"],
        &["curl=7.81.0-1ubuntu1"],
    );
    assert_eq!(plan.installs.len(), 1);
    assert!(plan.removals.is_empty());
    let kinds: Vec<ActionKind> = plan.actions.iter().map(|action| action.kind).collect();
    assert_eq!(kinds, vec![ActionKind::Refresh, ActionKind::Install]);
    assert_eq!(plan.actions[0].command, APT_REFRESH);
    assert_eq!(
        plan.actions[1].command,
        "DEBIAN_FRONTEND=noninteractive apt-get install -y --allow-downgrades curl=7.68.0-1"
    );
}

#[test]
fn apt_plan_removes_in_one_batch_then_autoremoves() {
    let plan = plan_manager(Manager::Apt, &["git=1"], &["git=1", "vim=2", "nano=3"]);
    let kinds: Vec<ActionKind> = plan.actions.iter().map(|action| action.kind).collect();
    assert_eq!(
        kinds,
        vec![ActionKind::Refresh, ActionKind::Remove, ActionKind::Autoremove]
    );
    assert_eq!(plan.actions[1].packages, strings(&["vim", "nano"]));
    assert_eq!(
        plan.actions[1].command,
        "DEBIAN_FRONTEND=noninteractive apt-get remove -y vim nano"
    );
}

#[test]
fn pip_plan_installs_pinned_version() {
    let plan = plan_reconcile(
        &LockPackages {
            pip: strings(&["requests==2.28.0"]),
            ..LockPackages::default()
        },
        &LockPackages::default(),
    );
    assert_eq!(plan.action_count(), 1);
    let action = plan.actions().next().expect("one action");
    assert_eq!(action.kind, ActionKind::Install);
    assert_eq!(action.command, "python3 -m pip install requests==2.28.0");
}

#[test]
fn npm_plan_removes_unlisted_global() {
    let plan = plan_reconcile(
        &LockPackages::default(),
        &LockPackages {
            npm: strings(&["typescript@5.0.0"]),
            ..LockPackages::default()
        },
    );
    assert_eq!(plan.managers.len(), 1);
    let npm = &plan.managers[0];
    assert!(npm.installs.is_empty());
    assert_eq!(npm.actions.len(), 1);
    assert_eq!(npm.actions[0].kind, ActionKind::Remove);
    assert_eq!(npm.actions[0].command, "npm uninstall -g typescript");
}

#[test]
fn node_plans_emit_one_command_per_package() {
    let plan = plan_manager(
        Manager::Yarn,
        &["@scope/pkg@2.0.0", "left-pad@1.3.2"],
        &["old@1.0.0"],
    );
    let commands: Vec<String> = plan
        .actions
        .iter()
        .map(|action| action.command.clone())
        .collect();
    assert_eq!(
        commands,
        vec![
            "yarn global add '@scope/pkg@2.0.0'".to_string(),
            "yarn global add 'left-pad@1.3.2'".to_string(),
            "yarn global remove old".to_string(),
        ]
    );
}

#[test]
fn matching_state_plans_nothing() {
    let target = sample_lock().packages;
    let plan = plan_reconcile(&target, &target);
    assert!(plan.is_empty());
    assert!(plan.managers.is_empty());
}

#[test]
fn configuration_commands_cover_sources_and_registries() {
    let mut lock = sample_lock();
    lock.apt_sources = AptSources {
        snapshot_url: None,
        source_lines: strings(&["deb http://archive.ubuntu.com/ubuntu jammy main"]),
        pinned_release: Some("jammy".into()),
    };
    lock.registries = LockRegistries {
        pip_index_url: Some("https://pypi.example/simple".into()),
        pip_extra_index_urls: Vec::new(),
        npm_registry: Some("https://npm.example/".into()),
        yarn_registry: Some("https://yarn.example/".into()),
        pnpm_registry: None,
    };
    let commands = source_configuration_commands(&lock);
    assert_eq!(commands.len(), 8);
    assert!(commands[1].starts_with("rm -f /etc/apt/sources.list.d/"));
    assert!(commands[2].ends_with("> /etc/apt/sources.list"));
    assert!(commands[3].contains("APT::Default-Release"));
    assert!(commands[3].contains("99defaultrelease"));
    assert_eq!(commands[4], APT_REFRESH);
    assert!(commands[5].ends_with("> /etc/pip.conf"));
    assert!(commands[5].contains("index-url = https://pypi.example/simple"));
    assert_eq!(commands[6], "npm config set registry 'https://npm.example/' -g");
    assert!(commands[7].starts_with("yarn config set npmRegistryServer "));
}

#[test]
fn configuration_is_empty_without_recorded_sources() {
    assert!(source_configuration_commands(&sample_lock()).is_empty());
}
