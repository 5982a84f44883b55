//! Sync scheduling.
//!
//! Triggers arrive from the presentation layer, from local writes and from
//! the realtime change feed. The scheduler coalesces them into as few
//! passes as possible and backs off while passes keep failing.
//!
//! ```text
//!   Idle --trigger--> Scheduled --timer--> Running --clean--> Idle
//!                         ^                  |  \--rerun--> Scheduled
//!                         |                  |
//!                         +--timer-- Backoff <--errors
//!
//!   any --cancel--> Idle
//! ```
//!
//! [`SchedulerCore`] is the pure state machine, driven by explicit
//! instants. [`SyncScheduler`] runs it on a tokio task.

use crate::config::SchedulerConfig;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::state::{SyncStatus, SyncSummary};
use parking_lot::Mutex;
use std::sync::Arc;
use tasksync_core::OwnerScope;
use tasksync_protocol::{ChangeFeed, ChangeNotice, RemoteStore};
use tasksync_store::LocalStore;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Nothing pending.
    Idle,
    /// A pass will start when the timer fires.
    Scheduled,
    /// A pass is in flight.
    Running,
    /// Waiting out a failure before rescheduling.
    Backoff,
}

/// Why a pass was requested. Recorded in logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Explicit request from the user.
    Manual,
    /// The scheduler was just started for a scope.
    Startup,
    /// A local write produced pending changes.
    LocalChange,
    /// The change feed reported an upstream change.
    Realtime(ChangeNotice),
    /// Connectivity or foreground state came back.
    Resumed,
}

/// How a pass ended, from the scheduler's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// No errors.
    Clean,
    /// Some errors; retried after backoff.
    Failed,
    /// Every remote call was unauthorized; not retried.
    Fatal,
}

impl PassOutcome {
    /// Classifies a summary.
    pub fn of(summary: &SyncSummary) -> Self {
        if summary.is_fatal() {
            PassOutcome::Fatal
        } else if summary.has_errors() {
            PassOutcome::Failed
        } else {
            PassOutcome::Clean
        }
    }
}

/// The coalescing and backoff state machine.
///
/// Holds at most one deadline. Triggers that arrive while a pass is
/// already scheduled or backing off are absorbed into it; a trigger that
/// arrives mid-pass asks for exactly one more pass.
#[derive(Debug, Clone)]
pub struct SchedulerCore {
    config: SchedulerConfig,
    phase: SchedulerPhase,
    deadline: Option<Instant>,
    rerun: bool,
    last_completed: Option<Instant>,
    failures: u32,
}

impl SchedulerCore {
    /// Creates an idle scheduler.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            phase: SchedulerPhase::Idle,
            deadline: None,
            rerun: false,
            last_completed: None,
            failures: 0,
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Returns when the pending timer fires.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the number of consecutive failed passes.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Returns true if a trigger arrived during the running pass.
    pub fn rerun_requested(&self) -> bool {
        self.rerun
    }

    fn fire_time(&self, now: Instant) -> Instant {
        let earliest = now + self.config.debounce;
        match self.last_completed {
            Some(done) => earliest.max(done + self.config.min_interval),
            None => earliest,
        }
    }

    /// Handles a trigger.
    pub fn on_trigger(&mut self, now: Instant) {
        match self.phase {
            SchedulerPhase::Idle => {
                self.phase = SchedulerPhase::Scheduled;
                self.deadline = Some(self.fire_time(now));
            }
            SchedulerPhase::Running => self.rerun = true,
            SchedulerPhase::Scheduled | SchedulerPhase::Backoff => {}
        }
    }

    /// Handles the timer. Returns true if a pass should start now.
    pub fn on_timer(&mut self, now: Instant) -> bool {
        if self.deadline.map_or(true, |deadline| now < deadline) {
            return false;
        }
        match self.phase {
            SchedulerPhase::Scheduled => {
                self.phase = SchedulerPhase::Running;
                self.deadline = None;
                true
            }
            SchedulerPhase::Backoff => {
                self.phase = SchedulerPhase::Scheduled;
                self.deadline = Some(self.fire_time(now));
                false
            }
            SchedulerPhase::Idle | SchedulerPhase::Running => false,
        }
    }

    /// Handles the end of a pass.
    ///
    /// A pass that was cancelled while running only updates the
    /// minimum-interval bookkeeping. A timer armed after the cancel was
    /// computed before this pass ended, so it is pushed back to respect the
    /// minimum interval.
    pub fn on_complete(&mut self, now: Instant, outcome: PassOutcome) {
        self.last_completed = Some(now);
        match self.phase {
            SchedulerPhase::Running => {}
            SchedulerPhase::Scheduled => {
                self.deadline = Some(self.fire_time(now));
                return;
            }
            SchedulerPhase::Idle | SchedulerPhase::Backoff => return,
        }

        let rerun = std::mem::take(&mut self.rerun);
        match outcome {
            PassOutcome::Clean => {
                self.failures = 0;
                if rerun {
                    self.phase = SchedulerPhase::Scheduled;
                    self.deadline = Some(self.fire_time(now));
                } else {
                    self.phase = SchedulerPhase::Idle;
                    self.deadline = None;
                }
            }
            PassOutcome::Failed => {
                self.failures = self.failures.saturating_add(1);
                self.phase = SchedulerPhase::Backoff;
                self.deadline = Some(now + self.config.backoff.delay_for_attempt(self.failures));
            }
            PassOutcome::Fatal => {
                self.failures = 0;
                self.phase = SchedulerPhase::Idle;
                self.deadline = None;
            }
        }
    }

    /// Drops pending timers and returns to idle.
    pub fn on_cancel(&mut self) {
        self.phase = SchedulerPhase::Idle;
        self.deadline = None;
        self.rerun = false;
    }
}

/// Snapshot of a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    /// Scope being synced.
    pub scope: OwnerScope,
    /// Current phase.
    pub phase: SchedulerPhase,
    /// Passes completed since the scheduler started.
    pub passes: u64,
    /// Consecutive failed passes.
    pub consecutive_failures: u32,
}

#[derive(Debug)]
enum Command {
    Trigger(TriggerReason),
    Cancel,
    SetScope(OwnerScope),
    Shutdown,
}

/// Builds and starts a scheduler for one engine.
pub struct SyncScheduler<L: ?Sized, R: ?Sized> {
    engine: Arc<SyncEngine<L, R>>,
    feed: Option<Arc<dyn ChangeFeed>>,
    config: SchedulerConfig,
}

impl<L, R> SyncScheduler<L, R>
where
    L: LocalStore + ?Sized + 'static,
    R: RemoteStore + ?Sized + 'static,
{
    /// Creates a scheduler without realtime subscriptions.
    pub fn new(engine: Arc<SyncEngine<L, R>>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            feed: None,
            config,
        }
    }

    /// Subscribes to `feed` for the active scope.
    pub fn with_change_feed(mut self, feed: Arc<dyn ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Starts the scheduler task for `scope`.
    ///
    /// Must be called within a tokio runtime. Nothing runs until the first
    /// trigger.
    pub fn spawn(self, scope: OwnerScope) -> SchedulerHandle {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let initial = SchedulerState {
            scope,
            phase: SchedulerPhase::Idle,
            passes: 0,
            consecutive_failures: 0,
        };
        let (state_tx, state_rx) = watch::channel(initial);
        let (summary_tx, summary_rx) = watch::channel(None);
        let status = self.engine.subscribe_status();

        let driver = Driver {
            engine: self.engine,
            feed: self.feed,
            core: SchedulerCore::new(self.config),
            scope,
            passes: 0,
            commands: command_rx,
            state: state_tx,
            summary: summary_tx,
        };
        let task = tokio::spawn(driver.run());

        SchedulerHandle {
            commands,
            state: state_rx,
            status,
            summary: summary_rx,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

struct Driver<L: ?Sized, R: ?Sized> {
    engine: Arc<SyncEngine<L, R>>,
    feed: Option<Arc<dyn ChangeFeed>>,
    core: SchedulerCore,
    scope: OwnerScope,
    passes: u64,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<SchedulerState>,
    summary: watch::Sender<Option<SyncSummary>>,
}

impl<L, R> Driver<L, R>
where
    L: LocalStore + ?Sized + 'static,
    R: RemoteStore + ?Sized + 'static,
{
    async fn run(mut self) {
        let (notice_tx, mut notices) = mpsc::unbounded_channel();
        let mut forwarders = self.subscribe(&notice_tx);
        let mut running: Option<JoinHandle<SyncSummary>> = None;
        info!(scope = %self.scope, "sync scheduler started");

        loop {
            // A new pass waits for the previous one, even across a scope change.
            let deadline = if running.is_some() {
                None
            } else {
                self.core.deadline()
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Trigger(reason)) => {
                        debug!(scope = %self.scope, ?reason, "sync triggered");
                        self.core.on_trigger(Instant::now());
                    }
                    Some(Command::Cancel) => {
                        debug!(scope = %self.scope, "sync cancelled");
                        self.core.on_cancel();
                    }
                    Some(Command::SetScope(scope)) => {
                        if scope != self.scope {
                            info!(from = %self.scope, to = %scope, "sync scope changed");
                            self.core.on_cancel();
                            self.scope = scope;
                            abort_all(&mut forwarders);
                            forwarders = self.subscribe(&notice_tx);
                            self.core.on_trigger(Instant::now());
                        }
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(notice) = notices.recv() => {
                    trace!(scope = %self.scope, ?notice, "change notice");
                    self.core.on_trigger(Instant::now());
                }
                () = sleep_until(deadline) => {
                    if self.core.on_timer(Instant::now()) {
                        let engine = Arc::clone(&self.engine);
                        let scope = self.scope;
                        running = Some(tokio::spawn(async move { engine.run_sync_pass(scope).await }));
                    }
                }
                joined = wait_pass(&mut running) => {
                    running = None;
                    self.complete(joined);
                }
            }
            self.publish();
        }

        abort_all(&mut forwarders);
        if let Some(pass) = running {
            // In-flight passes finish; every remote call in them is bounded.
            let joined = pass.await;
            self.complete(joined);
        }
        self.core.on_cancel();
        self.publish();
        info!(scope = %self.scope, passes = self.passes, "sync scheduler stopped");
    }

    fn complete(&mut self, joined: Result<SyncSummary, JoinError>) {
        let now = Instant::now();
        match joined {
            Ok(summary) => {
                self.passes += 1;
                let outcome = PassOutcome::of(&summary);
                if outcome == PassOutcome::Fatal {
                    warn!(scope = %self.scope, error = ?summary.first_error(), "sync halted until re-authentication");
                }
                self.core.on_complete(now, outcome);
                self.summary.send_replace(Some(summary));
            }
            Err(e) => {
                warn!(scope = %self.scope, error = %e, "sync pass task failed");
                self.core.on_complete(now, PassOutcome::Failed);
            }
        }
    }

    fn publish(&self) {
        self.state.send_replace(SchedulerState {
            scope: self.scope,
            phase: self.core.phase(),
            passes: self.passes,
            consecutive_failures: self.core.failures(),
        });
    }

    /// Subscribes to every synced collection of the active scope and
    /// forwards notices into the trigger queue.
    fn subscribe(&self, notices: &mpsc::UnboundedSender<ChangeNotice>) -> Vec<JoinHandle<()>> {
        let Some(feed) = &self.feed else {
            return Vec::new();
        };

        let mut forwarders = Vec::new();
        for &collection in &self.engine.config().collections {
            match feed.subscribe(collection, self.scope) {
                Ok(mut subscription) => {
                    let notices = notices.clone();
                    forwarders.push(tokio::spawn(async move {
                        while let Some(notice) = subscription.recv().await {
                            if notices.send(notice).is_err() {
                                break;
                            }
                        }
                    }));
                }
                Err(e) => {
                    warn!(%collection, scope = %self.scope, error = %e, "realtime subscription failed");
                }
            }
        }
        forwarders
    }
}

fn abort_all(tasks: &mut Vec<JoinHandle<()>>) {
    for task in tasks.drain(..) {
        task.abort();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_pass(
    running: &mut Option<JoinHandle<SyncSummary>>,
) -> Result<SyncSummary, JoinError> {
    match running {
        Some(pass) => pass.await,
        None => std::future::pending().await,
    }
}

/// Control handle for a running scheduler. Cheap to clone.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SchedulerState>,
    status: watch::Receiver<SyncStatus>,
    summary: watch::Receiver<Option<SyncSummary>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SchedulerHandle {
    fn send(&self, command: Command) -> SyncResult<()> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::SchedulerStopped)
    }

    /// Requests a sync pass.
    pub fn trigger_sync(&self) -> SyncResult<()> {
        self.trigger(TriggerReason::Manual)
    }

    /// Requests a sync pass for a given reason.
    pub fn trigger(&self, reason: TriggerReason) -> SyncResult<()> {
        self.send(Command::Trigger(reason))
    }

    /// Drops any pending pass. A pass already running completes.
    pub fn cancel(&self) -> SyncResult<()> {
        self.send(Command::Cancel)
    }

    /// Switches the active scope, moving realtime subscriptions with it.
    pub fn set_scope(&self, scope: OwnerScope) -> SyncResult<()> {
        self.send(Command::SetScope(scope))
    }

    /// Returns the latest scheduler snapshot.
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Subscribes to scheduler snapshots.
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Returns the engine's sync status.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Returns the summary of the most recent pass.
    pub fn last_summary(&self) -> Option<SyncSummary> {
        self.summary.borrow().clone()
    }

    /// Stops the scheduler, letting an in-flight pass finish, and waits for
    /// its task to exit.
    pub async fn shutdown(&self) -> SyncResult<()> {
        // Already stopped is fine.
        let _ = self.send(Command::Shutdown);
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.await.map_err(|_| SyncError::SchedulerStopped)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
