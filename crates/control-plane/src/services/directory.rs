//! Run directory.
//!
//! Owns every run of the process: its event channel, gate book, latest
//! snapshot and executor task. Handlers reach runs only through here.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use autopilot_tools::ActionRegistry;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::engine::{
    ChannelOptions, Decision, EventChannel, GateBook, GateDecision, Run, RunEvent, RunSnapshot,
    RunStatus, RunSummary, StepRegistry, StreamItem, WorkflowExecutor,
};
use crate::error::{AppError, AppResult};

/// Directory tuning.
#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    pub channel: ChannelOptions,
    /// How long shutdown waits for executors before aborting them.
    pub shutdown_grace: Duration,
    /// Input fields every run must carry as non-empty strings.
    pub required_inputs: Vec<String>,
}

impl DirectoryOptions {
    pub fn from_config(config: &AppConfig, required_inputs: &[&str]) -> Self {
        Self {
            channel: ChannelOptions {
                buffer: config.event_buffer,
                history: config.event_history,
                keepalive: config.keepalive(),
            },
            shutdown_grace: config.shutdown_grace(),
            required_inputs: required_inputs.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            channel: ChannelOptions::default(),
            shutdown_grace: Duration::from_secs(5),
            required_inputs: Vec::new(),
        }
    }
}

struct RunEntry {
    channel: Arc<EventChannel>,
    gates: Arc<GateBook>,
    snapshot: Arc<watch::Sender<RunSnapshot>>,
}

/// In-memory registry of runs.
pub struct RunDirectory {
    registry: Arc<StepRegistry>,
    actions: ActionRegistry,
    options: DirectoryOptions,
    runs: RwLock<HashMap<String, Arc<RunEntry>>>,
    tasks: Mutex<HashMap<String, JoinHandle<RunStatus>>>,
    closed: AtomicBool,
}

impl RunDirectory {
    pub fn new(registry: StepRegistry, actions: ActionRegistry, options: DirectoryOptions) -> Self {
        Self {
            registry: Arc::new(registry),
            actions,
            options,
            runs: RwLock::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn validate(&self, input: &serde_json::Value) -> AppResult<()> {
        let object = input
            .as_object()
            .ok_or_else(|| AppError::Validation("run input must be a JSON object".to_string()))?;

        let complete = self.options.required_inputs.iter().all(|name| {
            object
                .get(name.as_str())
                .and_then(|v| v.as_str())
                .is_some_and(|s| !s.trim().is_empty())
        });

        if !complete {
            let required = &self.options.required_inputs;
            let verb = if required.len() == 1 { "is" } else { "are" };
            return Err(AppError::Validation(format!(
                "{} {} required",
                required.join(" and "),
                verb
            )));
        }
        Ok(())
    }

    /// Create a run and start its executor. Returns without waiting on it.
    pub async fn create(&self, input: serde_json::Value) -> AppResult<String> {
        self.validate(&input)?;

        // Held until the task is tracked so shutdown sees every run or none.
        let mut runs = self.runs.write().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::Internal("run directory is shutting down".to_string()));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let run = Run::new(run_id.clone(), input, &self.registry);
        let (snapshot, _) = watch::channel(run.snapshot());
        let snapshot = Arc::new(snapshot);
        let channel = Arc::new(EventChannel::new(run_id.clone(), self.options.channel));
        let gates = Arc::new(GateBook::new(run_id.clone()));

        runs.insert(
            run_id.clone(),
            Arc::new(RunEntry {
                channel: channel.clone(),
                gates: gates.clone(),
                snapshot: snapshot.clone(),
            }),
        );

        let executor = WorkflowExecutor::new(
            run,
            self.registry.clone(),
            self.actions.clone(),
            channel,
            gates,
            snapshot,
        );
        let handle = tokio::spawn(executor.execute());

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, task| !task.is_finished());
        tasks.insert(run_id.clone(), handle);
        drop(tasks);
        drop(runs);

        info!(run_id = %run_id, "Run created");
        Ok(run_id)
    }

    async fn entry(&self, run_id: &str) -> AppResult<Arc<RunEntry>> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| AppError::UnknownRun(run_id.to_string()))
    }

    /// Latest snapshot of a run, with its recorded decisions.
    pub async fn get(&self, run_id: &str) -> AppResult<RunSnapshot> {
        let entry = self.entry(run_id).await?;
        let mut snapshot = entry.snapshot.borrow().clone();
        snapshot.decisions = entry.gates.decisions().await;
        Ok(snapshot)
    }

    /// Summaries of every run, oldest first.
    pub async fn list(&self) -> Vec<RunSummary> {
        let runs = self.runs.read().await;
        let mut summaries: Vec<RunSummary> = runs
            .values()
            .map(|entry| RunSummary::from(&*entry.snapshot.borrow()))
            .collect();
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        summaries
    }

    /// Record a gate decision for a run.
    pub async fn decide(
        &self,
        run_id: &str,
        gate: &str,
        decision: GateDecision,
        note: Option<String>,
    ) -> AppResult<Decision> {
        let entry = self.entry(run_id).await?;
        entry.gates.record(gate, decision, note, &entry.channel).await
    }

    /// Subscribe to a run's event stream.
    pub async fn subscribe(&self, run_id: &str) -> AppResult<BoxStream<'static, StreamItem>> {
        let entry = self.entry(run_id).await?;
        Ok(entry.channel.subscribe().boxed())
    }

    /// Number of runs per status.
    pub async fn status_counts(&self) -> BTreeMap<RunStatus, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.runs.read().await.values() {
            let status = entry.snapshot.borrow().status;
            *counts.entry(status).or_insert(0) += 1;
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting runs, release every gate wait as cancelled, and wait
    /// up to the grace period for executors before aborting them.
    pub async fn shutdown(&self) {
        let entries: HashMap<String, Arc<RunEntry>> = {
            let runs = self.runs.write().await;
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            runs.clone()
        };

        let mut released = 0;
        for entry in entries.values() {
            released += entry.gates.close().await;
        }

        let mut tasks: Vec<(String, JoinHandle<RunStatus>)> =
            self.tasks.lock().await.drain().collect();
        let active = tasks.iter().filter(|(_, t)| !t.is_finished()).count();
        info!(runs = entries.len(), active, released, "Shutting down run directory");

        let joined = futures::future::join_all(tasks.iter_mut().map(|(_, task)| task));
        if tokio::time::timeout(self.options.shutdown_grace, joined)
            .await
            .is_ok()
        {
            return;
        }

        warn!(
            grace_secs = self.options.shutdown_grace.as_secs(),
            "Runs still executing after grace period, aborting"
        );
        for (run_id, task) in tasks {
            if task.is_finished() {
                continue;
            }
            task.abort();
            // Wait for the abort to land so the executor can no longer publish.
            let _ = task.await;

            if let Some(entry) = entries.get(&run_id) {
                Self::fail_aborted(&run_id, entry);
            }
        }
    }

    /// Bring the snapshot and stream of a run whose executor was aborted
    /// to a terminal `failed` state.
    fn fail_aborted(run_id: &str, entry: &RunEntry) {
        let mut failed = false;
        entry.snapshot.send_if_modified(|snapshot| {
            if snapshot.status.is_terminal() {
                return false;
            }
            snapshot.abort("run aborted during shutdown");
            failed = true;
            true
        });
        if !failed {
            return;
        }

        warn!(run_id = %run_id, "Run aborted during shutdown");
        let snapshot = entry.snapshot.borrow().clone();
        entry.channel.publish(RunEvent::StateChanged {
            status: snapshot.status,
            steps: snapshot.steps,
        });
        entry.channel.publish(RunEvent::Finished {
            status: snapshot.status,
        });
    }
}

impl std::fmt::Debug for RunDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunDirectory")
            .field("steps", &self.registry.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
