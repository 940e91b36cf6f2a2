//! Voice Agent - wake-phrase triggered Android automation
//!
//! This is the CLI entry point for the voice-agent tool.
//! Run with: cargo run --bin voice-agent -- <command>

use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use voice_agent::wake::{
    KeywordDetector, LineTranscripts, PhraseRecognizer, TranscriptSource, WakeEngine,
};
use voice_agent::{
    ADBConnection, ActionHandler, AdbInput, AdbStateProvider, AgentService, AppSettings,
    AutomationLoop, HttpPlanner, TaskOutcome,
};

const USAGE: &str = "Usage:
  voice-agent run <goal>       Run one task against the device
  voice-agent listen           Listen for the wake phrase on stdin transcripts
  voice-agent devices          List connected ADB devices
  voice-agent connect <addr>   Connect to a device over TCP/IP
  voice-agent                  Interactive mode";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let settings = AppSettings::load().with_env_overrides();

    match args.first().map(String::as_str) {
        Some("run") if args.len() > 1 => {
            print_banner(&settings);
            let goal = args[1..].join(" ");
            let agent = build_agent(&settings)?;
            run_one(&agent, &goal).await;
        }
        Some("listen") => {
            print_banner(&settings);
            run_listen_mode(&settings).await?;
        }
        Some("devices") => list_devices().await?,
        Some("connect") if args.len() > 1 => {
            let result = ADBConnection::new().connect(&args[1]).await?;
            println!("{}", result);
        }
        Some("-h") | Some("--help") | Some("help") => println!("{}", USAGE),
        Some(other) => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
        None => {
            print_banner(&settings);
            run_interactive_mode(&settings).await?;
        }
    }

    Ok(())
}

fn print_banner(settings: &AppSettings) {
    println!("🤖 Voice Agent - wake-phrase Android Automation");
    println!("================================================");
    println!(
        "Planner: {} @ {}",
        settings.planner_model_name, settings.planner_base_url
    );
    println!(
        "Retry: max {} attempts, {}s delay, {}s timeout",
        settings.max_retries, settings.retry_delay, settings.planner_timeout_secs
    );
    if let Some(id) = settings.device_id() {
        println!("Device: {}", id);
    }
    println!("Wake phrase: {}", settings.wake_phrase);
    println!("================================================\n");
}

fn build_agent(settings: &AppSettings) -> anyhow::Result<AutomationLoop> {
    let device_id = settings.device_id();
    let planner = HttpPlanner::new(settings.planner_config())?;
    Ok(AutomationLoop::new(
        Arc::new(planner),
        Arc::new(AdbStateProvider::new(device_id.clone())),
        Arc::new(ActionHandler::new(AdbInput::new(device_id))),
        settings.loop_config(),
    ))
}

fn print_outcome(outcome: &TaskOutcome) {
    if outcome.success() {
        println!(
            "\n✅ Done: {} ({} attempts)\n",
            outcome.goal, outcome.attempts
        );
    } else {
        println!(
            "\n❌ Failed: {} ({})\n",
            outcome.goal,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
}

async fn run_one(agent: &AutomationLoop, goal: &str) {
    println!("📝 Task: {}\n", goal);
    let outcome = agent.run_task(goal).await;
    print_outcome(&outcome);
}

async fn run_interactive_mode(settings: &AppSettings) -> anyhow::Result<()> {
    let agent = build_agent(settings)?;

    println!("Interactive mode. Type your task and press Enter.");
    println!("Type 'quit' or 'exit' to exit.\n");

    let stdin = io::stdin();
    loop {
        print!("📝 Task: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let task = line.trim();

        if task.is_empty() {
            continue;
        }

        if task == "quit" || task == "exit" {
            println!("Goodbye! 👋");
            break;
        }

        run_one(&agent, task).await;
    }

    Ok(())
}

async fn run_listen_mode(settings: &AppSettings) -> anyhow::Result<()> {
    let device = ADBConnection::new()
        .wait_for_device(settings.device_id().as_deref())
        .await?;
    println!("📱 Using device {}", device.device_id);

    let transcripts: Arc<dyn TranscriptSource> = Arc::new(LineTranscripts::stdin());
    let (wake, triggers) = WakeEngine::spawn(
        Arc::new(KeywordDetector::new(Arc::clone(&transcripts))),
        Arc::new(PhraseRecognizer::new(Arc::clone(&transcripts))),
        settings.trigger_config(),
        settings.wake_config(),
    );

    let mut status = wake.subscribe();
    tokio::spawn(async move {
        let mut last = None;
        while status.changed().await.is_ok() {
            let session = status.borrow_and_update().clone();
            let now = (session.engine, session.state);
            if last != Some(now) {
                println!("🎙️  Wake: {:?} / {:?}", session.engine, session.state);
                last = Some(now);
            }
        }
    });

    println!(
        "Say (type) \"{}\" followed by your task. Ctrl-C to stop.\n",
        settings.wake_phrase
    );

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let service = AgentService::new(build_agent(settings)?, wake, triggers, transcripts)
        .with_outcome_callback(print_outcome);
    let tasks = service.run(shutdown).await?;
    println!("Goodbye! 👋 ({} tasks)", tasks);

    Ok(())
}

async fn list_devices() -> anyhow::Result<()> {
    let devices = ADBConnection::new().list_devices().await?;
    if devices.is_empty() {
        println!("No devices connected.");
        return Ok(());
    }
    for device in devices {
        println!(
            "{}\t{}\t{:?}\t{}",
            device.device_id,
            device.status,
            device.connection_type,
            device.model.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
