//! Wake engine control loop.
//!
//! One task owns the session. Control calls arrive over a command channel
//! and each gets the resulting session snapshot back on a oneshot. The
//! loop multiplexes commands, detector events and the pending start timer,
//! in that priority order.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex, MutexGuard};
use tokio::time::{sleep_until, Instant};

use super::detector::{DetectorEvent, ListenHandle, TriggerConfig, WakeDetector, WakeError};
use super::session::{EngineKind, LadderStep, RetryLadder, WakeSession, WakeState};
use crate::retry::Backoff;

/// Wake engine timing and retry configuration.
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Delay after a detection before listening again.
    pub settle_delay: Duration,
    /// Failed starts allowed per engine before escalating.
    pub retries_per_engine: u32,
    /// Backoff unit; the n-th retry waits `n × backoff_step`.
    pub backoff_step: Duration,
    /// How long a detector gets to acknowledge a stop.
    pub stop_grace: Duration,
    /// Capacity of the trigger channel.
    pub trigger_buffer: usize,
    /// Start the primary engine as soon as the loop is spawned.
    pub auto_start: bool,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(750),
            retries_per_engine: 3,
            backoff_step: Duration::from_secs(1),
            stop_grace: Duration::from_secs(1),
            trigger_buffer: 8,
            auto_start: true,
        }
    }
}

impl WakeConfig {
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_retries_per_engine(mut self, retries: u32) -> Self {
        self.retries_per_engine = retries.max(1);
        self
    }

    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    fn ladder(&self) -> RetryLadder {
        RetryLadder {
            retries_per_engine: self.retries_per_engine,
            backoff: Backoff::linear(self.backoff_step),
        }
    }
}

/// Delivered to the consumer once per detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeTrigger {
    /// Engine that produced the trigger.
    pub engine: EngineKind,
    /// Speech that followed the wake phrase, if any.
    pub command: Option<String>,
}

enum Command {
    Pause,
    Resume,
    Restart,
    SetTrigger(TriggerConfig),
    ManualTrigger,
    Shutdown,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Restart => "restart",
            Command::SetTrigger(_) => "set_trigger",
            Command::ManualTrigger => "manual_trigger",
            Command::Shutdown => "shutdown",
        }
    }
}

struct Envelope {
    command: Command,
    reply: oneshot::Sender<WakeSession>,
}

/// Cloneable control surface of a running wake engine.
#[derive(Clone)]
pub struct WakeHandle {
    commands: mpsc::Sender<Envelope>,
    status: watch::Receiver<WakeSession>,
}

impl WakeHandle {
    async fn send(&self, command: Command) -> Result<WakeSession, WakeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Envelope { command, reply })
            .await
            .map_err(|_| WakeError::ChannelClosed)?;
        rx.await.map_err(|_| WakeError::ChannelClosed)
    }

    /// Stop listening until `resume`. Idempotent.
    pub async fn pause(&self) -> Result<WakeSession, WakeError> {
        self.send(Command::Pause).await
    }

    /// Undo a pause. No-op when not paused.
    pub async fn resume(&self) -> Result<WakeSession, WakeError> {
        self.send(Command::Resume).await
    }

    /// Re-arm the ladder from the primary engine. While paused, the
    /// primary engine starts on `resume`.
    pub async fn restart(&self) -> Result<WakeSession, WakeError> {
        self.send(Command::Restart).await
    }

    /// Replace the trigger configuration and re-arm.
    pub async fn set_trigger(&self, trigger: TriggerConfig) -> Result<WakeSession, WakeError> {
        self.send(Command::SetTrigger(trigger)).await
    }

    /// Fire a trigger by hand. Ignored while paused.
    pub async fn manual_trigger(&self) -> Result<WakeSession, WakeError> {
        self.send(Command::ManualTrigger).await
    }

    /// Tear down the detector and stop the loop.
    pub async fn shutdown(&self) -> Result<WakeSession, WakeError> {
        self.send(Command::Shutdown).await
    }

    /// Latest published session.
    pub fn snapshot(&self) -> WakeSession {
        self.status.borrow().clone()
    }

    /// Watch session changes.
    pub fn subscribe(&self) -> watch::Receiver<WakeSession> {
        self.status.clone()
    }
}

/// The wake engine. Construct with [`WakeEngine::spawn`].
pub struct WakeEngine {
    session: Arc<Mutex<WakeSession>>,
    primary: Arc<dyn WakeDetector>,
    fallback: Arc<dyn WakeDetector>,
    trigger: TriggerConfig,
    config: WakeConfig,
    ladder: RetryLadder,
    active: Option<ListenHandle>,
    pending_start: Option<Instant>,
    commands: mpsc::Receiver<Envelope>,
    triggers: mpsc::Sender<WakeTrigger>,
    status: watch::Sender<WakeSession>,
}

impl WakeEngine {
    /// Spawn the control loop. Returns the control handle and the trigger
    /// stream.
    pub fn spawn(
        primary: Arc<dyn WakeDetector>,
        fallback: Arc<dyn WakeDetector>,
        trigger: TriggerConfig,
        config: WakeConfig,
    ) -> (WakeHandle, mpsc::Receiver<WakeTrigger>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (trigger_tx, trigger_rx) = mpsc::channel(config.trigger_buffer.max(1));
        let (status_tx, status_rx) = watch::channel(WakeSession::default());

        let engine = WakeEngine {
            session: Arc::new(Mutex::new(WakeSession::default())),
            primary,
            fallback,
            trigger,
            ladder: config.ladder(),
            config,
            active: None,
            pending_start: None,
            commands: cmd_rx,
            triggers: trigger_tx,
            status: status_tx,
        };
        tokio::spawn(engine.run());

        (
            WakeHandle {
                commands: cmd_tx,
                status: status_rx,
            },
            trigger_rx,
        )
    }

    async fn run(mut self) {
        tracing::info!("Wake engine started");
        if self.config.auto_start {
            self.start_engine().await;
        }

        loop {
            tokio::select! {
                biased;

                envelope = self.commands.recv() => match envelope {
                    Some(Envelope { command, reply }) => {
                        let keep_running = self.handle_command(command).await;
                        let _ = reply.send(self.snapshot().await);
                        if !keep_running {
                            break;
                        }
                    }
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },

                event = next_event(&mut self.active) => {
                    self.handle_detector_event(event).await;
                }

                _ = sleep_until_opt(self.pending_start) => {
                    self.pending_start = None;
                    self.start_engine().await;
                }
            }
        }
        tracing::info!("Wake engine stopped");
    }

    async fn snapshot(&self) -> WakeSession {
        self.session.lock().await.clone()
    }

    fn publish(&self, session: &WakeSession) {
        self.status.send_replace(session.clone());
    }

    fn set_state(session: &mut WakeSession, to: WakeState) {
        if session.state != to {
            tracing::info!(engine = ?session.engine, from = ?session.state, to = ?to, "Wake state");
            session.state = to;
        }
    }

    fn detector_for(&self, engine: EngineKind) -> Option<Arc<dyn WakeDetector>> {
        match engine {
            EngineKind::Primary => Some(Arc::clone(&self.primary)),
            EngineKind::Fallback => Some(Arc::clone(&self.fallback)),
            EngineKind::Emergency => None,
        }
    }

    /// Stop the active detector, if any. The handle leaves `active` first,
    /// so events it still emits are never read.
    async fn teardown(&mut self, session: &mut MutexGuard<'_, WakeSession>) {
        if let Some(handle) = self.active.take() {
            session.cleaning_up = true;
            self.publish(session);
            handle.stop(self.config.stop_grace).await;
            session.cleaning_up = false;
        }
    }

    /// Start the current engine. Skipped while paused.
    async fn start_engine(&mut self) {
        let session_cell = Arc::clone(&self.session);
        let mut session = session_cell.lock().await;
        if session.is_paused() {
            tracing::debug!("Wake engine paused, skipping start");
            return;
        }

        self.teardown(&mut session).await;

        let engine = session.engine;
        let Some(detector) = self.detector_for(engine) else {
            Self::set_state(&mut session, WakeState::Listening);
            self.publish(&session);
            return;
        };

        Self::set_state(&mut session, WakeState::Starting);
        self.publish(&session);

        match detector.start(&self.trigger).await {
            Ok(handle) => {
                tracing::info!(engine = ?engine, detector = detector.name(), "Listening for wake phrase");
                self.active = Some(handle);
                Self::set_state(&mut session, WakeState::Listening);
                self.publish(&session);
            }
            Err(e) => self.on_failure(&mut session, e.to_string()),
        }
    }

    fn on_failure(&mut self, session: &mut WakeSession, error: String) {
        session.fallback_attempts += 1;
        session.engine_failures += 1;
        session.last_error = Some(error.clone());
        Self::set_state(session, WakeState::Failing);

        let step = self.ladder.on_failure(session.engine, session.engine_failures);
        tracing::warn!(
            engine = ?session.engine,
            attempts = session.engine_failures,
            total = session.fallback_attempts,
            error = %error,
            "Wake engine failed"
        );

        match step {
            LadderStep::Retry { delay } => {
                session.last_backoff = Some(delay);
                self.pending_start = Some(Instant::now() + delay);
            }
            LadderStep::Escalate { to, delay } => {
                tracing::info!(from = ?session.engine, to = ?to, "Switching wake engine");
                session.engine = to;
                session.engine_failures = 0;
                session.last_backoff = Some(delay);
                self.pending_start = Some(Instant::now() + delay);
            }
            LadderStep::Emergency => {
                tracing::error!("Automatic wake engines exhausted, manual trigger only");
                session.engine = EngineKind::Emergency;
                session.engine_failures = 0;
                self.pending_start = None;
                Self::set_state(session, WakeState::Listening);
            }
        }
        self.publish(session);
    }

    async fn on_detected(
        &mut self,
        session: &mut MutexGuard<'_, WakeSession>,
        command: Option<String>,
    ) {
        self.teardown(session).await;
        session.fallback_attempts = 0;
        session.engine_failures = 0;
        session.last_error = None;
        session.detections += 1;
        Self::set_state(session, WakeState::Detected);
        self.publish(session);

        let trigger = WakeTrigger {
            engine: session.engine,
            command,
        };
        tracing::info!(engine = ?trigger.engine, command = ?trigger.command, "Wake phrase detected");
        if let Err(e) = self.triggers.try_send(trigger) {
            tracing::warn!("Dropping wake trigger: {}", e);
        }

        self.pending_start = Some(Instant::now() + self.config.settle_delay);
    }

    async fn handle_detector_event(&mut self, event: DetectorEvent) {
        let session_cell = Arc::clone(&self.session);
        let mut session = session_cell.lock().await;
        if session.is_paused() {
            tracing::debug!(?event, "Dropping detector event");
            return;
        }

        match event {
            DetectorEvent::Detected { command } => self.on_detected(&mut session, command).await,
            DetectorEvent::NoMatch => {
                // Single-shot recognition ended without a match; re-arm.
                tracing::debug!(engine = ?session.engine, "No wake phrase match");
                self.teardown(&mut session).await;
                self.pending_start = Some(Instant::now());
            }
            DetectorEvent::Error(e) => {
                self.teardown(&mut session).await;
                self.on_failure(&mut session, e);
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        tracing::debug!(command = command.name(), "Wake command");
        let session_cell = Arc::clone(&self.session);
        let mut session = session_cell.lock().await;

        match command {
            Command::Pause => {
                if session.is_paused() {
                    return true;
                }
                let prior = session.state;
                self.teardown(&mut session).await;
                self.pending_start = None;
                session.paused_for = Some(prior);
                Self::set_state(&mut session, WakeState::Paused);
                self.publish(&session);
            }
            Command::Resume => {
                let Some(prior) = session.paused_for.take() else {
                    return true;
                };
                if session.is_emergency() {
                    Self::set_state(&mut session, WakeState::Listening);
                } else if prior.is_listening_cycle() {
                    self.pending_start = Some(Instant::now());
                    Self::set_state(&mut session, WakeState::Starting);
                } else {
                    Self::set_state(&mut session, prior);
                }
                self.publish(&session);
            }
            Command::Restart => self.rearm(&mut session).await,
            Command::SetTrigger(trigger) => {
                self.trigger = trigger;
                self.rearm(&mut session).await;
            }
            Command::ManualTrigger => {
                if session.is_paused() {
                    tracing::debug!("Manual trigger ignored while paused");
                } else {
                    self.on_detected(&mut session, None).await;
                }
            }
            Command::Shutdown => {
                drop(session);
                self.shutdown().await;
                return false;
            }
        }
        true
    }

    /// Reset the ladder to the primary engine. A pause held by the agent
    /// stays in place and the primary engine starts on `resume`.
    async fn rearm(&mut self, session: &mut MutexGuard<'_, WakeSession>) {
        self.teardown(session).await;
        session.engine = EngineKind::Primary;
        session.fallback_attempts = 0;
        session.engine_failures = 0;
        session.last_backoff = None;
        session.last_error = None;

        if session.is_paused() {
            session.paused_for = Some(WakeState::Starting);
            tracing::info!("Wake ladder re-armed, primary starts on resume");
            self.publish(session);
            return;
        }

        Self::set_state(session, WakeState::Starting);
        self.publish(session);
        self.pending_start = Some(Instant::now());
    }

    async fn shutdown(&mut self) {
        let session_cell = Arc::clone(&self.session);
        let mut session = session_cell.lock().await;
        self.teardown(&mut session).await;
        self.pending_start = None;
        session.paused_for = None;
        Self::set_state(&mut session, WakeState::Idle);
        self.publish(&session);
    }
}

async fn next_event(active: &mut Option<ListenHandle>) -> DetectorEvent {
    match active {
        Some(handle) => handle.next_event().await,
        None => pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
