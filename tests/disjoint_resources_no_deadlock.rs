use lockcut::Simulation;
use std::time::Duration;
mod common;
use common::{
    NO_DEADLOCK_TIMEOUT, assert_no_deadlock, fast_config, finish, scripted, start_simulation, write,
};

#[test]
fn test_disjoint_writes_never_deadlock() {
    let config = lockcut::SimulationConfig {
        max_snapshots: Some(3),
        ..fast_config(3, 6)
    };
    let scripts = (0..3)
        .map(|i| vec![write(&[2 * i, 2 * i + 1], 50); 5])
        .collect();
    let simulation = Simulation::new(config).workload(scripted(scripts, Duration::from_millis(50)));
    let harness = start_simulation(simulation);

    assert_no_deadlock(&harness, NO_DEADLOCK_TIMEOUT);

    let report = finish(harness);
    assert!(report.deadlock.is_none());
    assert_eq!(report.snapshots, 3);
}

#[test]
fn test_same_order_contention_never_deadlocks() {
    let config = lockcut::SimulationConfig {
        max_snapshots: Some(3),
        ..fast_config(4, 2)
    };
    // Everybody takes 0 before 1, so waits cannot form a cycle
    let scripts = (0..4).map(|_| vec![write(&[0, 1], 30); 4]).collect();
    let simulation = Simulation::new(config).workload(scripted(scripts, Duration::from_millis(20)));
    let harness = start_simulation(simulation);

    assert_no_deadlock(&harness, NO_DEADLOCK_TIMEOUT);
    assert!(finish(harness).deadlock.is_none());
}
