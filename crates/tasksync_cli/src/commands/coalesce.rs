//! Coalesce command implementation.

use super::Device;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tasksync_core::{Collection, SyncableRecord, Task};
use tasksync_engine::{SchedulerConfig, SchedulerPhase, SyncScheduler, TriggerReason};
use tasksync_protocol::{ChangeNotice, ChangeType};
use tasksync_server::{RemoteService, ServiceConfig, Session};
use tasksync_store::{LocalStore, WriteOrigin};
use uuid::Uuid;

/// Coalescing run result.
#[derive(Debug, Serialize)]
pub struct CoalesceResult {
    /// Notices sent.
    pub notices: u32,
    /// Window the notices were spread over.
    pub window_ms: u64,
    /// Minimum interval between passes.
    pub min_interval_ms: u64,
    /// Passes the scheduler ran.
    pub passes: u64,
    /// Changes pushed by those passes.
    pub pushed: u64,
    /// Wall time until the scheduler went idle.
    pub elapsed_ms: u64,
}

/// Runs the coalesce command.
pub async fn run(
    notices: u32,
    window_ms: u64,
    min_interval_ms: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = Arc::new(RemoteService::new(ServiceConfig::default()));
    let session = Session::new(Uuid::new_v4());
    let scope = session.personal_scope();
    let device = Device::connect(&service, session, 1);

    let config = SchedulerConfig::default().with_min_interval(Duration::from_millis(min_interval_ms));
    let settle = config.debounce + config.min_interval;
    let handle = SyncScheduler::new(Arc::clone(&device.engine), config).spawn(scope);
    let mut state = handle.subscribe_state();

    let started = Instant::now();
    let gap = Duration::from_millis(window_ms) / notices.max(1);
    for i in 0..notices {
        device.store.upsert(
            SyncableRecord::new(scope, Task::new(format!("task {i}"))),
            WriteOrigin::Local,
        )?;
        let notice = ChangeNotice::new(Collection::Tasks, scope, ChangeType::Insert);
        handle.trigger(TriggerReason::Realtime(notice))?;
        tokio::time::sleep(gap).await;
    }

    // Wait for the scheduler to go idle with nothing left to push.
    let deadline = tokio::time::Instant::now() + settle * 4 + Duration::from_secs(1);
    loop {
        let snapshot = *state.borrow_and_update();
        let pending = device.store.pending(Collection::Tasks, scope)?;
        if snapshot.phase == SchedulerPhase::Idle && snapshot.passes > 0 && pending.is_empty() {
            break;
        }
        if tokio::time::timeout_at(deadline, state.changed()).await.is_err() {
            break;
        }
    }
    let elapsed = started.elapsed();

    let result = CoalesceResult {
        notices,
        window_ms,
        min_interval_ms,
        passes: handle.state().passes,
        pushed: device.engine.stats().pushed,
        elapsed_ms: elapsed.as_millis() as u64,
    };
    handle.shutdown().await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Coalescing");
            println!("==========");
            println!(
                "Notices:      {} over {} ms",
                result.notices, result.window_ms
            );
            println!("Min interval: {} ms", result.min_interval_ms);
            println!("Passes:       {}", result.passes);
            println!("Pushed:       {}", result.pushed);
            println!("Elapsed:      {} ms", result.elapsed_ms);
        }
    }

    Ok(())
}
