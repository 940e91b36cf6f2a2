//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use voice_agent::actions::{ActionExecutor, ActionResult, DeviceAction};
use voice_agent::device::{Bounds, CaptureError, DeviceState, DeviceStateProvider, UiElement, UiTree};
use voice_agent::model::{ActionDecision, PlanRequest, PlannerClient, PlannerError};
use voice_agent::wake::{
    DetectorEvent, ListenHandle, TriggerConfig, WakeDetector, WakeError, WakeHandle, WakeSession,
};

/// Planner that replays decisions, then keeps answering `complete`.
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<ActionDecision>>,
    calls: AtomicU32,
    /// Wake session observed at each call, when a wake handle is attached.
    pub wake_during_calls: Mutex<Vec<WakeSession>>,
    wake: Mutex<Option<WakeHandle>>,
}

impl ScriptedPlanner {
    pub fn new(script: Vec<ActionDecision>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            wake_during_calls: Mutex::new(Vec::new()),
            wake: Mutex::new(None),
        })
    }

    pub fn observe_wake(&self, wake: WakeHandle) {
        *self.wake.lock().unwrap() = Some(wake);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlannerClient for ScriptedPlanner {
    async fn plan(&self, _request: &PlanRequest) -> Result<ActionDecision, PlannerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(wake) = self.wake.lock().unwrap().as_ref() {
            self.wake_during_calls.lock().unwrap().push(wake.snapshot());
        }
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ActionDecision::new("complete").completed()))
    }
}

/// Device that always shows the same screen.
pub struct StaticDevice {
    pub foreground: String,
}

impl StaticDevice {
    pub fn new(foreground: &str) -> Arc<Self> {
        Arc::new(Self {
            foreground: foreground.to_string(),
        })
    }
}

#[async_trait]
impl DeviceStateProvider for StaticDevice {
    async fn capture_state(&self) -> Result<DeviceState, CaptureError> {
        let tree = UiTree::from_elements(vec![UiElement {
            kind: "android.widget.TextView".to_string(),
            text: "Home".to_string(),
            clickable: true,
            bounds: Bounds::new(0, 0, 1080, 200),
            ..Default::default()
        }]);
        Ok(DeviceState::new(tree, self.foreground.clone()).with_screenshot("", 1080, 2400))
    }
}

/// Executor that records every action and answers with a fixed result.
pub struct RecordingExecutor {
    succeed: bool,
    pub actions: Mutex<Vec<DeviceAction>>,
}

impl RecordingExecutor {
    pub fn new(succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            succeed,
            actions: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.actions.lock().unwrap().len()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, action: &DeviceAction, _state: &DeviceState) -> ActionResult {
        self.actions.lock().unwrap().push(action.clone());
        if self.succeed {
            ActionResult::success()
        } else {
            ActionResult::failure("injected failure")
        }
    }
}

/// Detector that fails every start.
pub struct BrokenDetector {
    pub starts: Mutex<Vec<Instant>>,
}

impl BrokenDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            starts: Mutex::new(Vec::new()),
        })
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }
}

#[async_trait]
impl WakeDetector for BrokenDetector {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn start(&self, _trigger: &TriggerConfig) -> Result<ListenHandle, WakeError> {
        self.starts.lock().unwrap().push(Instant::now());
        Err(WakeError::MissingCredential)
    }
}

/// Detector whose events are pushed by the test.
pub struct ManualDetector {
    senders: Mutex<Vec<mpsc::Sender<DetectorEvent>>>,
}

impl ManualDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            senders: Mutex::new(Vec::new()),
        })
    }

    pub fn start_count(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    pub async fn emit(&self, event: DetectorEvent) {
        let tx = self.senders.lock().unwrap().last().cloned().expect("detector started");
        tx.send(event).await.expect("detector listening");
    }
}

#[async_trait]
impl WakeDetector for ManualDetector {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn start(&self, _trigger: &TriggerConfig) -> Result<ListenHandle, WakeError> {
        let (tx, rx) = mpsc::channel(4);
        self.senders.lock().unwrap().push(tx);
        Ok(ListenHandle::new(rx, CancellationToken::new(), None))
    }
}

/// Wait until the published session satisfies `pred`.
pub async fn wait_for(handle: &WakeHandle, pred: impl Fn(&WakeSession) -> bool) -> WakeSession {
    let mut rx = handle.subscribe();
    loop {
        {
            let current = rx.borrow_and_update();
            if pred(&current) {
                return current.clone();
            }
        }
        rx.changed().await.expect("wake engine running");
    }
}
