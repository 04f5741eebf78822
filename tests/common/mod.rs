use lockcut::{
    Action, DeadlockInfo, ResourceId, ScriptedWorkload, Simulation, SimulationConfig,
    SimulationHandle, SimulationReport, Workload, WorkloadFactory,
};
use std::sync::{Arc, Mutex as StdMutex, mpsc};
use std::time::Duration;

#[allow(dead_code)]
pub const DEADLOCK_TIMEOUT: Duration = Duration::from_secs(5);
#[allow(dead_code)]
pub const NO_DEADLOCK_TIMEOUT: Duration = Duration::from_millis(800);

pub struct SimulationHarness {
    pub rx: mpsc::Receiver<DeadlockInfo>,
    pub detected: Arc<StdMutex<bool>>,
    pub handle: SimulationHandle,
}

/// Timings short enough for tests, with the detector free to run forever
pub fn fast_config(processes: usize, resources: usize) -> SimulationConfig {
    SimulationConfig {
        num_processes: processes,
        num_resources: resources,
        acquire_timeout_ms: 50,
        snapshot_period_ms: 200,
        propagation_window_ms: 300,
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn write(resources: &[ResourceId], duration_ms: u64) -> Action {
    Action::Write {
        resources: resources.to_vec(),
        duration: Duration::from_millis(duration_ms),
    }
}

#[allow(dead_code)]
pub fn read(resource: ResourceId, duration_ms: u64) -> Action {
    Action::Read {
        resource,
        duration: Duration::from_millis(duration_ms),
    }
}

#[allow(dead_code)]
/// Every process replays its own script, in process id order
pub fn scripted(scripts: Vec<Vec<Action>>, deadlock_window: Duration) -> WorkloadFactory {
    let scripts = StdMutex::new(scripts);
    Box::new(move |id| -> Box<dyn Workload> {
        let actions = scripts
            .lock()
            .unwrap()
            .get_mut(id)
            .map(std::mem::take)
            .unwrap_or_default();
        Box::new(
            ScriptedWorkload::new(actions)
                .with_deadlock_window(deadlock_window)
                .with_cooldown(Duration::from_millis(10)),
        )
    })
}

pub fn start_simulation(simulation: Simulation) -> SimulationHarness {
    let (tx, rx) = mpsc::channel::<DeadlockInfo>();
    let detected = Arc::new(StdMutex::new(false));
    let flag = Arc::clone(&detected);

    let handle = simulation
        .callback(move |info| {
            *flag.lock().unwrap() = true;
            let _ = tx.send(info);
        })
        .start()
        .expect("Failed to start simulation");

    SimulationHarness {
        rx,
        detected,
        handle,
    }
}

#[allow(dead_code)]
pub fn expect_deadlock(h: &SimulationHarness, timeout: Duration) -> DeadlockInfo {
    match h.rx.recv_timeout(timeout) {
        Ok(info) => {
            assert!(*h.detected.lock().unwrap(), "Deadlock flag should be set");
            info
        }
        Err(_) => panic!("No deadlock detected within {timeout:?}"),
    }
}

#[allow(dead_code)]
pub fn assert_no_deadlock(h: &SimulationHarness, timeout: Duration) {
    assert!(
        h.rx.recv_timeout(timeout).is_err(),
        "Unexpected deadlock detected"
    );
    assert!(
        !*h.detected.lock().unwrap(),
        "Deadlock flag should not be set"
    );
}

/// Join every thread and check nothing is left locked
#[allow(dead_code)]
pub fn finish(h: SimulationHarness) -> SimulationReport {
    let lock_manager = Arc::clone(h.handle.lock_manager());
    let report = h.handle.join().expect("Simulation failed");
    for resource in lock_manager.resource_ids() {
        assert_eq!(
            lock_manager.owner_of(resource),
            None,
            "Resource {resource} still held after shutdown"
        );
    }
    report
}
