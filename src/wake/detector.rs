//! Wake detectors: the keyword engine, the phrase recognizer, and the
//! transcript sources they listen to.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of a detector's event channel.
const EVENT_BUFFER: usize = 8;

/// Errors raised while starting or running a detector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WakeError {
    #[error("Keyword engine requires an access key")]
    MissingCredential,

    #[error("Keyword model not found: {0}")]
    MissingModel(PathBuf),

    #[error("Detector construction failed: {0}")]
    Construction(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Recognizer error: {0}")]
    Recognizer(String),

    #[error("Wake engine is not running")]
    ChannelClosed,
}

/// Trigger configuration: phrases, credentials and model location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Phrase the keyword engine listens for.
    pub wake_phrase: String,
    /// Phrase set the fallback recognizer matches against.
    pub fallback_phrases: Vec<String>,
    pub access_key: Option<String>,
    pub model_path: Option<PathBuf>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            wake_phrase: "hey agent".to_string(),
            fallback_phrases: vec![
                "hey agent".to_string(),
                "ok agent".to_string(),
                "hello agent".to_string(),
            ],
            access_key: None,
            model_path: None,
        }
    }
}

impl TriggerConfig {
    pub fn with_wake_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.wake_phrase = phrase.into();
        self
    }

    pub fn with_fallback_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_phrases = phrases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }
}

/// Event reported by a running detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEvent {
    /// The wake phrase was heard. `command` is any speech that followed it.
    Detected { command: Option<String> },
    /// A single-shot recognition finished without a phrase match.
    NoMatch,
    /// The detector stopped on an error.
    Error(String),
}

/// A running detector: its event stream and the means to stop it.
#[derive(Debug)]
pub struct ListenHandle {
    events: mpsc::Receiver<DetectorEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ListenHandle {
    pub fn new(
        events: mpsc::Receiver<DetectorEvent>,
        cancel: CancellationToken,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            events,
            cancel,
            task,
        }
    }

    /// Spawn `body` as a detector task wired to a fresh channel and token.
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(mpsc::Sender<DetectorEvent>, CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(body(tx, cancel.clone()));
        Self::new(rx, cancel, Some(task))
    }

    /// Next event. A closed channel is reported as an error.
    pub async fn next_event(&mut self) -> DetectorEvent {
        self.events
            .recv()
            .await
            .unwrap_or_else(|| DetectorEvent::Error("detector stopped unexpectedly".to_string()))
    }

    /// Cancel the detector and wait up to `grace` for it to acknowledge.
    pub async fn stop(mut self, grace: std::time::Duration) {
        self.cancel.cancel();
        self.events.close();
        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(grace, task).await.is_err() {
                tracing::warn!("Detector did not stop within {:?}, aborting", grace);
                abort.abort();
            }
        }
    }
}

/// A wake acquisition mechanism.
#[async_trait]
pub trait WakeDetector: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Construct and start listening. Failing here counts as an engine
    /// failure.
    async fn start(&self, trigger: &TriggerConfig) -> Result<ListenHandle, WakeError>;
}

/// Source of recognized utterances.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Next utterance, or `Ok(None)` when the stream has ended.
    async fn next_transcript(&self) -> Result<Option<String>, WakeError>;
}

/// Transcripts read line by line from any async reader.
pub struct LineTranscripts<R> {
    lines: Mutex<Lines<R>>,
}

impl<R: AsyncBufRead + Unpin + Send> LineTranscripts<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
        }
    }
}

impl LineTranscripts<BufReader<Stdin>> {
    /// Typed utterances from standard input.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TranscriptSource for LineTranscripts<R> {
    async fn next_transcript(&self) -> Result<Option<String>, WakeError> {
        let mut lines = self.lines.lock().await;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Ok(Some(line.trim().to_string())),
                Ok(None) => return Ok(None),
                Err(e) => return Err(WakeError::Recognizer(e.to_string())),
            }
        }
    }
}

/// Find the first phrase in `transcript` and return the speech after it.
///
/// Matching is case-insensitive. The returned command is trimmed of
/// leading punctuation and may be empty.
pub fn match_wake_phrase<S: AsRef<str>>(transcript: &str, phrases: &[S]) -> Option<String> {
    let lower = transcript.to_lowercase();
    phrases
        .iter()
        .map(|p| p.as_ref().trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .filter_map(|p| lower.find(&p).map(|pos| pos + p.len()))
        .min()
        .map(|end| {
            // Lowercasing can change byte lengths outside ASCII.
            let rest = if lower.len() == transcript.len() {
                transcript.get(end..).unwrap_or(&lower[end..])
            } else {
                &lower[end..]
            };
            rest.trim_start_matches(|c: char| c == ',' || c == '.' || c == '!' || c.is_whitespace())
                .trim()
                .to_string()
        })
}

fn command_from(rest: String) -> Option<String> {
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Keyword-model engine. Listens continuously for the configured phrase
/// and needs an access key plus, when configured, a model file.
pub struct KeywordDetector {
    source: Arc<dyn TranscriptSource>,
}

impl KeywordDetector {
    pub fn new(source: Arc<dyn TranscriptSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl WakeDetector for KeywordDetector {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn start(&self, trigger: &TriggerConfig) -> Result<ListenHandle, WakeError> {
        match trigger.access_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {}
            _ => return Err(WakeError::MissingCredential),
        }
        if let Some(path) = &trigger.model_path {
            if !path.exists() {
                return Err(WakeError::MissingModel(path.clone()));
            }
        }
        let phrase = trigger.wake_phrase.trim().to_string();
        if phrase.is_empty() {
            return Err(WakeError::Construction("empty wake phrase".to_string()));
        }

        let source = Arc::clone(&self.source);
        Ok(ListenHandle::spawn(move |events, cancel| async move {
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = source.next_transcript() => next,
                };
                let event = match next {
                    Ok(Some(text)) => match match_wake_phrase(&text, &[phrase.as_str()]) {
                        Some(rest) => DetectorEvent::Detected {
                            command: command_from(rest),
                        },
                        None => continue,
                    },
                    Ok(None) => DetectorEvent::Error("transcript stream ended".to_string()),
                    Err(e) => DetectorEvent::Error(e.to_string()),
                };
                let fatal = matches!(event, DetectorEvent::Error(_));
                if events.send(event).await.is_err() || fatal {
                    break;
                }
            }
        }))
    }
}

/// Fallback recognizer. Each start performs one recognition and reports
/// either a match or `NoMatch`.
pub struct PhraseRecognizer {
    source: Arc<dyn TranscriptSource>,
}

impl PhraseRecognizer {
    pub fn new(source: Arc<dyn TranscriptSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl WakeDetector for PhraseRecognizer {
    fn name(&self) -> &'static str {
        "phrase"
    }

    async fn start(&self, trigger: &TriggerConfig) -> Result<ListenHandle, WakeError> {
        let phrases: Vec<String> = trigger
            .fallback_phrases
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if phrases.is_empty() {
            return Err(WakeError::Construction("no fallback phrases".to_string()));
        }

        let source = Arc::clone(&self.source);
        Ok(ListenHandle::spawn(move |events, cancel| async move {
            let next = tokio::select! {
                _ = cancel.cancelled() => return,
                next = source.next_transcript() => next,
            };
            let event = match next {
                Ok(Some(text)) => match match_wake_phrase(&text, phrases.as_slice()) {
                    Some(rest) => DetectorEvent::Detected {
                        command: command_from(rest),
                    },
                    None => DetectorEvent::NoMatch,
                },
                Ok(None) => DetectorEvent::Error("transcript stream ended".to_string()),
                Err(e) => DetectorEvent::Error(e.to_string()),
            };
            let _ = events.send(event).await;
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn transcripts(text: &'static str) -> Arc<dyn TranscriptSource> {
        Arc::new(LineTranscripts::new(text.as_bytes()))
    }

    #[test]
    fn test_match_wake_phrase_extracts_command() {
        assert_eq!(
            match_wake_phrase("Hey Agent, open the calendar", &["hey agent"]),
            Some("open the calendar".to_string())
        );
        assert_eq!(
            match_wake_phrase("hey agent", &["hey agent"]),
            Some(String::new())
        );
        assert_eq!(match_wake_phrase("good morning", &["hey agent"]), None);
    }

    #[test]
    fn test_match_wake_phrase_picks_earliest_phrase() {
        let phrases = ["ok agent", "hey agent"];
        assert_eq!(
            match_wake_phrase("hey agent ok agent call mom", &phrases),
            Some("ok agent call mom".to_string())
        );
    }

    #[tokio::test]
    async fn test_keyword_detector_requires_access_key() {
        let detector = KeywordDetector::new(transcripts("hey agent\n"));
        let err = detector.start(&TriggerConfig::default()).await.unwrap_err();
        assert_eq!(err, WakeError::MissingCredential);
    }

    #[tokio::test]
    async fn test_keyword_detector_requires_existing_model() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ppn");
        let trigger = TriggerConfig::default()
            .with_access_key("key")
            .with_model_path(&missing);

        let detector = KeywordDetector::new(transcripts("hey agent\n"));
        let err = detector.start(&trigger).await.unwrap_err();
        assert_eq!(err, WakeError::MissingModel(missing));
    }

    #[tokio::test]
    async fn test_keyword_detector_skips_unrelated_speech() {
        let detector = KeywordDetector::new(transcripts("hello there\nhey agent call mom\n"));
        let trigger = TriggerConfig::default().with_access_key("key");

        let mut handle = detector.start(&trigger).await.unwrap();
        assert_eq!(
            handle.next_event().await,
            DetectorEvent::Detected {
                command: Some("call mom".to_string())
            }
        );
        handle.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_phrase_recognizer_is_single_shot() {
        let detector = PhraseRecognizer::new(transcripts("what time is it\nok agent\n"));
        let trigger = TriggerConfig::default();

        let mut first = detector.start(&trigger).await.unwrap();
        assert_eq!(first.next_event().await, DetectorEvent::NoMatch);
        first.stop(Duration::from_secs(1)).await;

        let mut second = detector.start(&trigger).await.unwrap();
        assert_eq!(
            second.next_event().await,
            DetectorEvent::Detected { command: None }
        );
        second.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_end_of_stream_is_an_error() {
        let detector = PhraseRecognizer::new(transcripts(""));
        let mut handle = detector.start(&TriggerConfig::default()).await.unwrap();
        assert!(matches!(handle.next_event().await, DetectorEvent::Error(_)));
    }
}
