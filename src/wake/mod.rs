//! Wake engine: acquires a wake trigger through a ladder of mechanisms.
//!
//! The primary keyword engine is tried first, then a single-shot phrase
//! recognizer, and finally a manual trigger once both automatic paths
//! are exhausted.

mod detector;
mod engine;
mod session;

pub use detector::{
    match_wake_phrase, DetectorEvent, KeywordDetector, LineTranscripts, ListenHandle,
    PhraseRecognizer, TranscriptSource, TriggerConfig, WakeDetector, WakeError,
};
pub use engine::{WakeConfig, WakeEngine, WakeHandle, WakeTrigger};
pub use session::{EngineKind, LadderStep, RetryLadder, WakeSession, WakeState};
