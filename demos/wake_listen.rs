//! Wake engine example: watch the engine walk its ladder on typed input.
//!
//! Without WAKE_ACCESS_KEY the keyword engine cannot start, so the engine
//! falls back to the phrase recognizer after three attempts. Type
//! "hey agent ..." to trigger, or "manual" to press the emergency button.
//!
//! Run with: cargo run --example wake_listen

use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use voice_agent::wake::{
    KeywordDetector, LineTranscripts, PhraseRecognizer, TranscriptSource, WakeEngine,
};
use voice_agent::AppSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let settings = AppSettings::load().with_env_overrides();

    let (reader, mut writer) = tokio::io::duplex(1024);
    let transcripts: Arc<dyn TranscriptSource> =
        Arc::new(LineTranscripts::new(tokio::io::BufReader::new(reader)));

    let (wake, mut triggers) = WakeEngine::spawn(
        Arc::new(KeywordDetector::new(Arc::clone(&transcripts))),
        Arc::new(PhraseRecognizer::new(Arc::clone(&transcripts))),
        settings.trigger_config(),
        settings.wake_config(),
    );

    let printer = tokio::spawn(async move {
        while let Some(trigger) = triggers.recv().await {
            println!("🔔 Triggered by {:?}: {:?}", trigger.engine, trigger.command);
        }
    });

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        match line.trim() {
            "manual" => {
                let session = wake.manual_trigger().await?;
                println!("Session: {:?}", session);
            }
            "status" => println!("Session: {:?}", wake.snapshot()),
            "restart" => {
                wake.restart().await?;
            }
            _ => {
                use tokio::io::AsyncWriteExt;
                writer.write_all(format!("{}\n", line).as_bytes()).await?;
            }
        }
    }

    wake.shutdown().await?;
    drop(writer);
    printer.await?;
    Ok(())
}
