//! Scenario command implementation.

use super::Device;
use serde::Serialize;
use std::sync::Arc;
use tasksync_core::{Collection, ManualClock, RecordId, SyncableRecord, Task};
use tasksync_server::{RemoteService, ServiceConfig, Session};
use tasksync_store::{LocalStore, WriteOrigin};
use uuid::Uuid;

/// Final state of one replica.
#[derive(Debug, Serialize)]
pub struct ReplicaState {
    /// Replica name.
    pub name: &'static str,
    /// Task title, if the task is live.
    pub title: Option<String>,
    /// Local modification time.
    pub local_updated_at: Option<u64>,
    /// Last agreed time.
    pub synced_at: Option<u64>,
}

/// Scenario result.
#[derive(Debug, Serialize)]
pub struct ScenarioResult {
    /// Task under test.
    pub task_id: String,
    /// Step log.
    pub steps: Vec<String>,
    /// Conflicts resolved across all passes.
    pub conflicts: usize,
    /// Final replica states.
    pub replicas: Vec<ReplicaState>,
}

/// Runs the scenario command.
///
/// Device A creates "Buy food" and pushes it. B pulls it, then edits it
/// offline at 150 while A edits at 140 and pushes first, landing at 160.
/// When B reconnects at 170 its later edit wins and A picks it up.
pub async fn run(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let server_clock = Arc::new(ManualClock::new(101));
    let service = Arc::new(RemoteService::with_clock(
        ServiceConfig::default(),
        server_clock.clone(),
    ));
    let session = Session::new(Uuid::new_v4());
    let scope = session.personal_scope();
    let a = Device::connect(&service, session.clone(), 100);
    let b = Device::connect(&service, session, 100);
    let mut steps = Vec::new();
    let mut conflicts = 0;

    let task = a.store.upsert(
        SyncableRecord::new(scope, Task::new("Buy food")),
        WriteOrigin::Local,
    )?;
    let id = task.id;
    steps.push(format!("A creates \"Buy food\" at {}", task.meta.local_updated_at));

    let summary = a.engine.run_sync_pass(scope).await;
    steps.push(format!("A pushes {} change(s)", summary.pushed));
    let summary = b.engine.run_sync_pass(scope).await;
    steps.push(format!("B pulls {} change(s)", summary.pulled));

    b.clock.set(150);
    rename(&b, id, "Buy dog food")?;
    steps.push("B edits offline: \"Buy dog food\" at 150".into());

    a.clock.set(140);
    rename(&a, id, "Buy cat food")?;
    server_clock.set(160);
    let summary = a.engine.run_sync_pass(scope).await;
    conflicts += summary.conflicts.len();
    steps.push(format!(
        "A edits \"Buy cat food\" at 140 and pushes {} change(s)",
        summary.pushed
    ));

    server_clock.set(170);
    let summary = b.engine.run_sync_pass(scope).await;
    conflicts += summary.conflicts.len();
    for conflict in &summary.conflicts {
        steps.push(format!(
            "B resolves conflict: local edit {} vs remote edit {} (stored at {}) -> {:?}",
            conflict.local_updated_at,
            conflict.remote_edited_at,
            conflict.remote_updated_at,
            conflict.resolution
        ));
    }
    steps.push(format!("B pushes {} change(s)", summary.pushed));

    let summary = a.engine.run_sync_pass(scope).await;
    conflicts += summary.conflicts.len();
    steps.push(format!("A pulls {} change(s)", summary.pulled));

    let remote = service.record(Collection::Tasks, id)?;
    let result = ScenarioResult {
        task_id: id.to_string(),
        steps,
        conflicts,
        replicas: vec![
            replica("device A", a.store.lookup(Collection::Tasks, id)?),
            replica("device B", b.store.lookup(Collection::Tasks, id)?),
            replica("remote", remote),
        ],
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn rename(device: &Device, id: RecordId, title: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut record = device
        .store
        .get(Collection::Tasks, id)?
        .ok_or_else(|| format!("task {id} not found"))?;
    if let Some(task) = record.body.as_task_mut() {
        task.title = title.into();
    }
    device.store.upsert(record, WriteOrigin::Local)?;
    Ok(())
}

fn replica(name: &'static str, record: Option<SyncableRecord>) -> ReplicaState {
    let live = record.as_ref().filter(|r| !r.is_deleted());
    ReplicaState {
        name,
        title: live.and_then(|r| r.as_task()).map(|t| t.title.clone()),
        local_updated_at: record.as_ref().map(|r| r.meta.local_updated_at.0),
        synced_at: record.as_ref().and_then(|r| r.meta.synced_at).map(|t| t.0),
    }
}

fn print_text_output(result: &ScenarioResult) {
    println!("Scenario: last writer wins");
    println!("==========================");
    println!("Task: {}", result.task_id);
    println!();

    for (i, step) in result.steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
    println!();
    println!("Conflicts resolved: {}", result.conflicts);
    println!();

    for replica in &result.replicas {
        println!(
            "  {:<9} {:<16} local={:<5} synced={}",
            replica.name,
            replica.title.as_deref().unwrap_or("<deleted>"),
            replica.local_updated_at.map_or("-".into(), |t| t.to_string()),
            replica.synced_at.map_or("-".into(), |t| t.to_string()),
        );
    }
}
