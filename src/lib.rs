// Copyright 2025 Zhipu AI (Original Python implementation)
// Copyright 2025 ModerRAS (Rust implementation)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Voice Agent
//!
//! Wake-phrase triggered agent that automates Android phone interactions.
//!
//! Two components cooperate. The wake engine keeps the device listening
//! through a ladder of mechanisms (keyword engine, phrase recognizer,
//! manual trigger). The automation loop turns a spoken goal into a bounded
//! sequence of grounded device actions chosen by a language-model planner
//! and injected over ADB.
//!
//! ## Single Task Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_agent::{
//!     ActionHandler, AdbInput, AdbStateProvider, AppSettings, AutomationLoop, HttpPlanner,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = AppSettings::load().with_env_overrides();
//!     let device_id = settings.device_id();
//!
//!     let agent = AutomationLoop::new(
//!         Arc::new(HttpPlanner::new(settings.planner_config())?),
//!         Arc::new(AdbStateProvider::new(device_id.clone())),
//!         Arc::new(ActionHandler::new(AdbInput::new(device_id))),
//!         settings.loop_config(),
//!     );
//!
//!     let outcome = agent.run_task("open the calendar app").await;
//!     println!("Task result: {:?}", outcome.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Wake Service Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use voice_agent::wake::{KeywordDetector, LineTranscripts, PhraseRecognizer, TranscriptSource, WakeEngine};
//! use voice_agent::{
//!     ActionHandler, AdbInput, AdbStateProvider, AgentService, AppSettings, AutomationLoop,
//!     HttpPlanner,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = AppSettings::load().with_env_overrides();
//!     let transcripts: Arc<dyn TranscriptSource> = Arc::new(LineTranscripts::stdin());
//!
//!     let (wake, triggers) = WakeEngine::spawn(
//!         Arc::new(KeywordDetector::new(transcripts.clone())),
//!         Arc::new(PhraseRecognizer::new(transcripts.clone())),
//!         settings.trigger_config(),
//!         settings.wake_config(),
//!     );
//!
//!     let agent = AutomationLoop::new(
//!         Arc::new(HttpPlanner::new(settings.planner_config())?),
//!         Arc::new(AdbStateProvider::new(settings.device_id())),
//!         Arc::new(ActionHandler::new(AdbInput::new(settings.device_id()))),
//!         settings.loop_config(),
//!     );
//!
//!     let service = AgentService::new(agent, wake, triggers, transcripts);
//!     service.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod adb;
pub mod agent;
pub mod config;
pub mod device;
pub mod model;
pub mod retry;
pub mod service;
pub mod settings;
pub mod wake;

pub use actions::{ActionExecutor, ActionHandler, ActionResult, DeviceAction, InputBackend, ACTION_VOCABULARY};
pub use adb::{AdbInput, AdbStateProvider, ADBConnection};
pub use agent::{
    AutomationLoop, CompletionSignal, LoopConfig, TaskOutcome, TaskStatus, TaskStep,
};
pub use device::{DeviceState, DeviceStateProvider, UiElement, UiTree};
pub use model::{ActionDecision, HttpPlanner, PlanRequest, PlannerClient, PlannerConfig, PlannerError};
pub use service::{AgentService, ServiceError};
pub use settings::AppSettings;
pub use wake::{
    EngineKind, TriggerConfig, WakeConfig, WakeEngine, WakeHandle, WakeSession, WakeState,
    WakeTrigger,
};
