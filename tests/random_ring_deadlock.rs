use lockcut::Simulation;
use rand::Rng;
use std::time::Duration;
mod common;
use common::{
    DEADLOCK_TIMEOUT, expect_deadlock, fast_config, finish, scripted, start_simulation, write,
};

#[test]
fn test_random_ring_deadlock() {
    // Pick a random ring size between 3 and 8
    let mut rng = rand::rng();
    let n = rng.random_range(3..=8);
    println!("→ testing a ring of {n} processes");

    // Process i takes resource i, then resource i + 1
    let scripts = (0..n)
        .map(|i| vec![write(&[i, (i + 1) % n], 100)])
        .collect();
    let simulation = Simulation::new(fast_config(n, n))
        .workload(scripted(scripts, Duration::from_millis(200)));
    let harness = start_simulation(simulation);

    let info = expect_deadlock(&harness, DEADLOCK_TIMEOUT);
    assert_eq!(
        info.processes().len(),
        n,
        "Expected a cycle of length {n}, got {:?}",
        info.process_cycle
    );
    assert_eq!(info.process_cycle.first(), info.process_cycle.last());
    assert_eq!(info.process_waiting_for_resources.len(), n);
    for &(process, resource) in &info.process_waiting_for_resources {
        assert_eq!(resource, (process + 1) % n);
    }

    println!("✔ detected {n}-cycle deadlock: {:?}", info.process_cycle);
    finish(harness);
}
