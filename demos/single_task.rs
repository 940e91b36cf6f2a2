//! Single task example: run one goal against the connected device.
//!
//! Run with: cargo run --example single_task -- "open the calendar app"

use std::sync::Arc;

use voice_agent::{
    ActionHandler, AdbInput, AdbStateProvider, AppSettings, AutomationLoop, HttpPlanner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let goal = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let goal = if goal.is_empty() {
        "open the calendar app".to_string()
    } else {
        goal
    };

    let settings = AppSettings::load().with_env_overrides();
    let device_id = settings.device_id();

    let agent = AutomationLoop::new(
        Arc::new(HttpPlanner::new(settings.planner_config())?),
        Arc::new(AdbStateProvider::new(device_id.clone())),
        Arc::new(ActionHandler::new(AdbInput::new(device_id))),
        settings.loop_config(),
    );

    let mut signals = agent.subscribe();
    let outcome = agent.run_task(&goal).await;

    println!("Status: {:?} after {} attempts", outcome.status, outcome.attempts);
    for step in &outcome.history {
        println!(
            "  {} {} {}",
            if step.result { "✓" } else { "✗" },
            step.action,
            serde_json::Value::Object(step.parameters.clone())
        );
    }

    if let Ok(signal) = signals.try_recv() {
        println!("Completion signal: {}", serde_json::to_string(&signal)?);
    }

    Ok(())
}
