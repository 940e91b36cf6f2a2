//! Agent service: runs a task for every wake trigger.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::agent::{AutomationLoop, TaskOutcome};
use crate::wake::{TranscriptSource, WakeError, WakeHandle, WakeTrigger};

/// Service errors.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Wake engine error: {0}")]
    Wake(#[from] WakeError),
    #[error("Transcript stream ended")]
    TranscriptsClosed,
}

/// Callback invoked with every finished task.
pub type OutcomeCallback = Box<dyn Fn(&TaskOutcome) + Send + Sync>;

/// Wires the wake engine to the automation loop.
///
/// A trigger that carries a command runs it as the goal. A bare trigger
/// waits for the next utterance and uses that instead.
pub struct AgentService {
    agent: AutomationLoop,
    wake: WakeHandle,
    triggers: mpsc::Receiver<WakeTrigger>,
    transcripts: Arc<dyn TranscriptSource>,
    goal_timeout: Duration,
    on_outcome: Option<OutcomeCallback>,
}

impl AgentService {
    pub fn new(
        agent: AutomationLoop,
        wake: WakeHandle,
        triggers: mpsc::Receiver<WakeTrigger>,
        transcripts: Arc<dyn TranscriptSource>,
    ) -> Self {
        Self {
            agent: agent.with_wake(wake.clone()),
            wake,
            triggers,
            transcripts,
            goal_timeout: Duration::from_secs(15),
            on_outcome: None,
        }
    }

    /// How long to wait for a goal after a bare trigger.
    pub fn with_goal_timeout(mut self, goal_timeout: Duration) -> Self {
        self.goal_timeout = goal_timeout;
        self
    }

    pub fn with_outcome_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TaskOutcome) + Send + Sync + 'static,
    {
        self.on_outcome = Some(Box::new(callback));
        self
    }

    pub fn agent(&self) -> &AutomationLoop {
        &self.agent
    }

    pub fn wake(&self) -> &WakeHandle {
        &self.wake
    }

    /// Serve triggers until `shutdown` fires, the trigger stream closes or
    /// the transcript stream ends. Returns the number of tasks run.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<u32, ServiceError> {
        let mut tasks = 0;
        let result = loop {
            let trigger = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(tasks),
                trigger = self.triggers.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => break Ok(tasks),
                },
            };

            match self.handle_trigger(trigger).await {
                Ok(Some(outcome)) => {
                    tasks += 1;
                    if let Some(callback) = &self.on_outcome {
                        callback(&outcome);
                    }
                }
                Ok(None) => {}
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = self.wake.shutdown().await {
            tracing::debug!("Wake engine already stopped: {}", e);
        }
        tracing::info!(tasks, "Agent service stopped");
        result
    }

    async fn handle_trigger(&self, trigger: WakeTrigger) -> Result<Option<TaskOutcome>, ServiceError> {
        tracing::info!(engine = ?trigger.engine, command = ?trigger.command, "Wake trigger");
        // Keep the detector off the transcript stream while we read a goal.
        self.wake.pause().await?;

        let goal = match trigger.command {
            Some(command) => command,
            None => match self.next_goal().await {
                Ok(Some(goal)) => goal,
                Ok(None) => {
                    self.wake.resume().await?;
                    return Ok(None);
                }
                Err(e) => {
                    let _ = self.wake.resume().await;
                    return Err(e);
                }
            },
        };

        Ok(Some(self.agent.run_task(&goal).await))
    }

    async fn next_goal(&self) -> Result<Option<String>, ServiceError> {
        match timeout(self.goal_timeout, self.transcripts.next_transcript()).await {
            Ok(Ok(Some(goal))) => Ok(Some(goal)),
            Ok(Ok(None)) => Err(ServiceError::TranscriptsClosed),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                tracing::info!("No goal heard after wake trigger");
                Ok(None)
            }
        }
    }
}
