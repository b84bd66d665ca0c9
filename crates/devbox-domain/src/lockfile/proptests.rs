use std::collections::BTreeMap;

use proptest::prelude::*;

use super::*;

fn package_state() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z][a-z0-9-]{0,6}", "[0-9]{1,2}\\.[0-9]{1,2}", 0..8)
}

fn entries(manager: Manager, state: &BTreeMap<String, String>) -> Vec<String> {
    state
        .iter()
        .map(|(name, version)| manager.format_entry(name, version))
        .collect()
}

fn manager_strategy() -> impl Strategy<Value = Manager> {
    prop::sample::select(Manager::ALL.to_vec())
}

/// Applies a plan to an in-memory package state the way the sandbox would.
fn apply(plan: &ManagerPlan, state: &mut BTreeMap<String, String>) {
    for record in &plan.installs {
        state.insert(record.name.clone(), record.version.clone());
    }
    for record in &plan.removals {
        state.remove(&record.name);
    }
}

proptest! {
    #[test]
    fn plan_matches_set_difference(
        manager in manager_strategy(),
        target in package_state(),
        current in package_state(),
    ) {
        let plan = plan_manager(manager, &entries(manager, &target), &entries(manager, &current));

        let installs: BTreeMap<String, String> = plan
            .installs
            .iter()
            .map(|record| (record.name.clone(), record.version.clone()))
            .collect();
        let expected_installs: BTreeMap<String, String> = target
            .iter()
            .filter(|(name, version)| current.get(*name) != Some(*version))
            .map(|(name, version)| (name.clone(), version.clone()))
            .collect();
        prop_assert_eq!(installs, expected_installs);

        let removals: Vec<String> = plan.removals.iter().map(|record| record.name.clone()).collect();
        let expected_removals: Vec<String> = current
            .keys()
            .filter(|name| !target.contains_key(*name))
            .cloned()
            .collect();
        prop_assert_eq!(removals, expected_removals);
    }

    #[test]
    fn second_plan_after_apply_is_empty(
        manager in manager_strategy(),
        target in package_state(),
        mut current in package_state(),
    ) {
        let target_entries = entries(manager, &target);
        let first = plan_manager(manager, &target_entries, &entries(manager, &current));
        apply(&first, &mut current);
        let second = plan_manager(manager, &target_entries, &entries(manager, &current));
        prop_assert!(second.is_empty(), "second plan: {:?}", second.actions);
        prop_assert_eq!(current, target);
    }

    #[test]
    fn no_drift_after_apply(
        target in package_state(),
        mut current in package_state(),
    ) {
        let lock = LockSnapshot {
            packages: LockPackages { pip: entries(Manager::Pip, &target), ..LockPackages::default() },
            ..LockSnapshot::default()
        };
        let plan = plan_manager(Manager::Pip, &lock.packages.pip, &entries(Manager::Pip, &current));
        apply(&plan, &mut current);
        let observed = ObservedState {
            packages: LockPackages { pip: entries(Manager::Pip, &current), ..LockPackages::default() },
            ..ObservedState::default()
        };
        prop_assert!(detect_drift(&lock, &observed).is_empty());
    }
}
