//! Automation loop: turns a goal into a bounded sequence of device actions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use super::history::{TaskHistory, TaskStep, CONTEXT_WINDOW, HISTORY_CAPACITY};
use super::precondition;
use crate::actions::{ActionExecutor, DeviceAction, ACTION_VOCABULARY};
use crate::config::find_app_in_goal;
use crate::device::{DeviceState, DeviceStateProvider};
use crate::model::{ActionDecision, PlanRequest, PlannerClient, PlannerError, DEFAULT_PLANNER_TIMEOUT_SECS};
use crate::wake::WakeHandle;

/// Configuration for the automation loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Planner cycles allowed per task run.
    pub max_attempts: u32,
    /// Consecutive failed steps that abort the run.
    pub max_consecutive_failures: u32,
    /// Pause between cycles so the UI can settle.
    pub step_delay: Duration,
    /// Deadline for one planner call.
    pub planner_timeout: Duration,
    /// History entries shown to the planner.
    pub context_window: usize,
    /// History entries kept per run.
    pub history_capacity: usize,
    /// Launch an app named in the goal before the first cycle.
    pub auto_launch: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            max_consecutive_failures: 3,
            step_delay: Duration::from_millis(500),
            planner_timeout: Duration::from_secs(DEFAULT_PLANNER_TIMEOUT_SECS),
            context_window: CONTEXT_WINDOW,
            history_capacity: HISTORY_CAPACITY,
            auto_launch: true,
        }
    }
}

impl LoopConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max.max(1);
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn with_planner_timeout(mut self, timeout: Duration) -> Self {
        self.planner_timeout = timeout;
        self
    }

    pub fn with_context_window(mut self, window: usize) -> Self {
        self.context_window = window;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_auto_launch(mut self, auto_launch: bool) -> Self {
        self.auto_launch = auto_launch;
        self
    }
}

/// Task run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Running,
    Complete,
    Failed,
}

/// State of one task run, owned by the loop while it is `Running`.
#[derive(Debug)]
pub struct TaskRun {
    pub id: Uuid,
    pub goal: String,
    pub history: TaskHistory,
    pub memory: BTreeMap<String, String>,
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: TaskStatus,
    pub consecutive_failures: u32,
    pub planner_calls: u32,
    pub error: Option<String>,
}

impl TaskRun {
    fn new(goal: &str, config: &LoopConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal: goal.to_string(),
            history: TaskHistory::with_capacity(config.history_capacity),
            memory: BTreeMap::new(),
            attempt: 0,
            max_attempts: config.max_attempts,
            status: TaskStatus::Running,
            consecutive_failures: 0,
            planner_calls: 0,
            error: None,
        }
    }

    fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
    }
}

/// Structured signal emitted once per task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionSignal {
    pub task_completed: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final result of a task run.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub id: Uuid,
    pub goal: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub planner_calls: u32,
    pub error: Option<String>,
    pub history: Vec<TaskStep>,
    pub memory: BTreeMap<String, String>,
}

impl TaskOutcome {
    pub fn success(&self) -> bool {
        self.status == TaskStatus::Complete
    }

    pub fn signal(&self) -> CompletionSignal {
        CompletionSignal {
            task_completed: true,
            success: self.success(),
            error: self.error.clone(),
        }
    }

    fn rejected(goal: &str, error: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal: goal.to_string(),
            status: TaskStatus::Failed,
            attempts: 0,
            planner_calls: 0,
            error: Some(error.to_string()),
            history: Vec::new(),
            memory: BTreeMap::new(),
        }
    }
}

impl From<TaskRun> for TaskOutcome {
    fn from(run: TaskRun) -> Self {
        Self {
            id: run.id,
            goal: run.goal,
            status: run.status,
            attempts: run.attempt,
            planner_calls: run.planner_calls,
            error: run.error,
            history: run.history.into_vec(),
            memory: run.memory,
        }
    }
}

/// Perceive, plan, act.
///
/// One task runs at a time. Each cycle captures device state, asks the
/// planner for one decision, gates it on its precondition and dispatches
/// it. Planner failures end the run instead of retrying it.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_agent::{ActionHandler, AdbInput, AdbStateProvider, AutomationLoop, HttpPlanner, LoopConfig, PlannerConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let planner = HttpPlanner::new(PlannerConfig::default())?;
///     let agent = AutomationLoop::new(
///         Arc::new(planner),
///         Arc::new(AdbStateProvider::new(None)),
///         Arc::new(ActionHandler::new(AdbInput::new(None))),
///         LoopConfig::default(),
///     );
///
///     let done = agent.run("open the calendar app").await;
///     println!("Task result: {}", done);
///     Ok(())
/// }
/// ```
pub struct AutomationLoop {
    planner: Arc<dyn PlannerClient>,
    state: Arc<dyn DeviceStateProvider>,
    executor: Arc<dyn ActionExecutor>,
    config: LoopConfig,
    wake: Option<WakeHandle>,
    run_lock: Mutex<()>,
    stop_requested: AtomicBool,
    completions: broadcast::Sender<CompletionSignal>,
}

impl AutomationLoop {
    pub fn new(
        planner: Arc<dyn PlannerClient>,
        state: Arc<dyn DeviceStateProvider>,
        executor: Arc<dyn ActionExecutor>,
        config: LoopConfig,
    ) -> Self {
        let (completions, _) = broadcast::channel(16);
        Self {
            planner,
            state,
            executor,
            config,
            wake: None,
            run_lock: Mutex::new(()),
            stop_requested: AtomicBool::new(false),
            completions,
        }
    }

    /// Pause this wake engine while a task runs.
    pub fn with_wake(mut self, wake: WakeHandle) -> Self {
        self.wake = Some(wake);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Completion signals of all subsequent runs.
    pub fn subscribe(&self) -> broadcast::Receiver<CompletionSignal> {
        self.completions.subscribe()
    }

    /// Ask the current run to stop; observed before the next cycle.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Run `goal` to completion. True iff the planner signalled completion
    /// within the attempt budget.
    pub async fn run(&self, goal: &str) -> bool {
        self.run_task(goal).await.success()
    }

    /// Run `goal` and return the full outcome.
    pub async fn run_task(&self, goal: &str) -> TaskOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::warn!(goal, "Rejecting task, another task is running");
            return TaskOutcome::rejected(goal, "task already running");
        };
        self.stop_requested.store(false, Ordering::SeqCst);

        let mut run = TaskRun::new(goal, &self.config);
        tracing::info!(task_id = %run.id, goal, "Task started");
        self.pause_wake().await;

        self.drive(&mut run).await;

        self.resume_wake().await;

        let outcome = TaskOutcome::from(run);
        tracing::info!(
            task_id = %outcome.id,
            status = ?outcome.status,
            attempts = outcome.attempts,
            error = ?outcome.error,
            "Task finished"
        );
        let _ = self.completions.send(outcome.signal());
        outcome
    }

    async fn pause_wake(&self) {
        if let Some(wake) = &self.wake {
            if let Err(e) = wake.pause().await {
                tracing::warn!("Could not pause wake engine: {}", e);
            }
        }
    }

    async fn resume_wake(&self) {
        if let Some(wake) = &self.wake {
            if let Err(e) = wake.resume().await {
                tracing::warn!("Could not resume wake engine: {}", e);
            }
        }
    }

    async fn drive(&self, run: &mut TaskRun) {
        if self.config.auto_launch {
            self.launch_goal_app(run).await;
        }

        while run.attempt < run.max_attempts {
            if self.stop_requested.load(Ordering::SeqCst) {
                run.fail("stopped");
                return;
            }
            run.attempt += 1;

            let state = match self.state.capture_state().await {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(attempt = run.attempt, "State capture failed: {}", e);
                    run.history.push(
                        TaskStep::new("capture_state", Map::new(), false)
                            .with_output(Some(e.to_string())),
                    );
                    if self.record_failure(run) {
                        return;
                    }
                    sleep(self.config.step_delay).await;
                    continue;
                }
            };

            let request = PlanRequest {
                goal: run.goal.clone(),
                state,
                history: run.history.recent(self.config.context_window),
                memory: run.memory.clone(),
                actions: ACTION_VOCABULARY,
            };
            run.planner_calls += 1;
            let decision = self.plan(&request).await;
            let state = request.state;

            if let Some(error) = decision.error.clone() {
                run.history.push(
                    TaskStep::new(decision.action.clone(), decision.parameters.clone(), false)
                        .with_output(Some(error.clone())),
                );
                run.fail(error);
                return;
            }

            tracing::info!(
                attempt = run.attempt,
                action = %decision.action,
                pre_condition = ?decision.pre_condition,
                "Planned action"
            );

            let pre_ok = precondition::check(decision.pre_condition.as_deref(), &state);
            let (success, output) = if pre_ok {
                self.dispatch(&decision, &state, &mut run.memory).await
            } else {
                tracing::warn!(
                    attempt = run.attempt,
                    pre_condition = ?decision.pre_condition,
                    "Precondition not met"
                );
                (false, Some("precondition not met".to_string()))
            };

            if !success {
                tracing::warn!(attempt = run.attempt, action = %decision.action, output = ?output, "Step failed");
            }
            run.history.push(
                TaskStep::new(decision.action.clone(), decision.parameters.clone(), success)
                    .with_pre_condition(decision.pre_condition.clone())
                    .with_output(output),
            );

            if pre_ok && decision.completes_task() {
                run.status = TaskStatus::Complete;
                return;
            }

            if success {
                run.consecutive_failures = 0;
            } else if self.record_failure(run) {
                return;
            }

            sleep(self.config.step_delay).await;
        }

        run.fail(format!("attempt budget of {} exhausted", run.max_attempts));
    }

    /// Count a failed step. Returns true when the run has been aborted.
    fn record_failure(&self, run: &mut TaskRun) -> bool {
        run.consecutive_failures += 1;
        if run.consecutive_failures >= self.config.max_consecutive_failures {
            run.fail(format!(
                "{} consecutive failed attempts",
                run.consecutive_failures
            ));
            return true;
        }
        false
    }

    /// Call the planner, failing closed on error or timeout.
    async fn plan(&self, request: &PlanRequest) -> ActionDecision {
        match timeout(self.config.planner_timeout, self.planner.plan(request)).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                tracing::error!("Planner failed: {}", e);
                ActionDecision::planner_failure(e.to_string())
            }
            Err(_) => {
                let e = PlannerError::Timeout(self.config.planner_timeout);
                tracing::error!("Planner failed: {}", e);
                ActionDecision::planner_failure(e.to_string())
            }
        }
    }

    async fn dispatch(
        &self,
        decision: &ActionDecision,
        state: &DeviceState,
        memory: &mut BTreeMap<String, String>,
    ) -> (bool, Option<String>) {
        let action = match DeviceAction::from_decision(decision) {
            Ok(action) => action,
            Err(e) => return (false, Some(e.to_string())),
        };

        match action {
            DeviceAction::Complete => (true, None),
            DeviceAction::Remember { key, value } => {
                memory.insert(key, value);
                (true, None)
            }
            DeviceAction::Recall { key } => match memory.get(&key) {
                Some(value) => (true, Some(value.clone())),
                None => (false, Some(format!("nothing remembered under '{}'", key))),
            },
            action => {
                let result = self.executor.execute(&action, state).await;
                (result.success, result.message)
            }
        }
    }

    async fn launch_goal_app(&self, run: &mut TaskRun) {
        let Some((app_name, package)) = find_app_in_goal(&run.goal) else {
            return;
        };
        let state = match self.state.capture_state().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Skipping app launch, state capture failed: {}", e);
                return;
            }
        };

        tracing::info!(app = app_name, package, "Launching app named in goal");
        let action = DeviceAction::StartApp {
            app_name: app_name.to_string(),
        };
        let result = self.executor.execute(&action, &state).await;

        let mut parameters = Map::new();
        parameters.insert("app_name".to_string(), Value::String(app_name.to_string()));
        run.history.push(
            TaskStep::new(action.name(), parameters, result.success).with_output(result.message),
        );
        sleep(self.config.step_delay).await;
    }
}
