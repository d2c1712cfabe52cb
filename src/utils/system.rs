// src/utils/system.rs: System functions

use std::time::Duration;

use log::{debug, warn};
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tokio::time::sleep;


/// Determines the number of physical cores and the current CPU load.
///
/// # Returns
///
/// (usize, f32) physical cores, current cpu usage in percent
pub async fn detect_cores_and_load() -> (usize, f32) {
    let refresh_kind = RefreshKind::nothing().with_cpu(Default::default());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_cpu_all();
    let physical_cores = System::physical_core_count().unwrap_or(1);
    sleep(Duration::from_millis(100)).await;
    system.refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage());
    let cpu_load = system.global_cpu_usage();
    (physical_cores, cpu_load)
}


/// Compares the requested thread count with the machine. Never rejects; snippy is
/// allowed to oversubscribe, but the operator should know.
///
/// # Arguments
///
/// * `requested` - Threads per snippy call (`--cpus`).
/// * `jobs` - Concurrent snippy calls.
/// * `physical_cores` - From detect_cores_and_load.
///
/// # Returns
/// true if the request fits on the machine.
pub fn check_cpu_request(requested: usize, jobs: usize, physical_cores: usize) -> bool {
    let total = requested.saturating_mul(jobs.max(1));
    if total > physical_cores {
        warn!(
            "Requested {} threads ({} x {} jobs) but only {} physical cores were detected",
            total, requested, jobs, physical_cores
        );
        false
    } else {
        debug!("Using {} of {} physical cores", total, physical_cores);
        true
    }
}
