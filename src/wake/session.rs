//! Wake session data model and the engine retry ladder.

use std::time::Duration;

use serde::Serialize;

use crate::retry::Backoff;

/// Which acquisition mechanism is in charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngineKind {
    /// Keyword-model detector, listening continuously.
    Primary,
    /// Single-shot speech recognizer matched against a phrase set.
    Fallback,
    /// Manual trigger only; terminal until re-armed.
    Emergency,
}

impl EngineKind {
    /// The engine that takes over when this one exhausts its retries.
    pub fn next(self) -> EngineKind {
        match self {
            EngineKind::Primary => EngineKind::Fallback,
            EngineKind::Fallback | EngineKind::Emergency => EngineKind::Emergency,
        }
    }
}

/// Lifecycle state of the current engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WakeState {
    Idle,
    Starting,
    Listening,
    Detected,
    Failing,
    Paused,
}

impl WakeState {
    /// States that belong to an active listening cycle; resuming from one
    /// of them restarts the engine.
    pub fn is_listening_cycle(self) -> bool {
        matches!(
            self,
            WakeState::Starting | WakeState::Listening | WakeState::Detected | WakeState::Failing
        )
    }
}

/// The one wake session of the process. Mutated only by the engine loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WakeSession {
    pub engine: EngineKind,
    pub state: WakeState,
    /// Consecutive acquisition failures across engines; reset by a
    /// detection or an explicit re-arm.
    pub fallback_attempts: u32,
    /// Consecutive failures of the current engine; drives the ladder and
    /// starts over whenever a different engine takes over.
    pub engine_failures: u32,
    /// State that a pause interrupted.
    pub paused_for: Option<WakeState>,
    /// True while the active detector is being stopped. Its handle is taken
    /// before the stop, so nothing it emits afterwards reaches the engine.
    pub cleaning_up: bool,
    /// Delay scheduled before the most recent retry.
    pub last_backoff: Option<Duration>,
    pub last_error: Option<String>,
    pub detections: u64,
}

impl Default for WakeSession {
    fn default() -> Self {
        Self {
            engine: EngineKind::Primary,
            state: WakeState::Idle,
            fallback_attempts: 0,
            engine_failures: 0,
            paused_for: None,
            cleaning_up: false,
            last_backoff: None,
            last_error: None,
            detections: 0,
        }
    }
}

impl WakeSession {
    pub fn is_paused(&self) -> bool {
        self.paused_for.is_some()
    }

    /// True once the automatic paths are exhausted.
    pub fn is_emergency(&self) -> bool {
        self.engine == EngineKind::Emergency
    }
}

/// What to do after an engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderStep {
    /// Start the same engine again after the delay.
    Retry { delay: Duration },
    /// Switch to the next engine after the delay.
    Escalate { to: EngineKind, delay: Duration },
    /// No automatic path left.
    Emergency,
}

/// Retry ladder: each automatic engine gets `retries_per_engine` failed
/// starts with linearly increasing backoff before the next engine takes
/// over. Fallback exhaustion ends in Emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryLadder {
    pub retries_per_engine: u32,
    pub backoff: Backoff,
}

impl Default for RetryLadder {
    fn default() -> Self {
        Self {
            retries_per_engine: 3,
            backoff: Backoff::linear(Duration::from_secs(1)),
        }
    }
}

impl RetryLadder {
    /// Decide the next step after `engine` has failed `engine_failures`
    /// times in a row.
    pub fn on_failure(&self, engine: EngineKind, engine_failures: u32) -> LadderStep {
        if engine == EngineKind::Emergency {
            return LadderStep::Emergency;
        }

        let attempt = engine_failures.max(1);
        if attempt < self.retries_per_engine {
            return LadderStep::Retry {
                delay: self.backoff.delay_for(attempt),
            };
        }

        match engine.next() {
            EngineKind::Emergency => LadderStep::Emergency,
            to => LadderStep::Escalate {
                to,
                delay: self.backoff.delay_for(attempt),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_backoff_strictly_increases_before_fallback() {
        let ladder = RetryLadder::default();
        let delays: Vec<Duration> = (1..=3)
            .map(|n| match ladder.on_failure(EngineKind::Primary, n) {
                LadderStep::Retry { delay } => delay,
                LadderStep::Escalate { to, delay } => {
                    assert_eq!(to, EngineKind::Fallback);
                    delay
                }
                LadderStep::Emergency => panic!("primary never goes straight to emergency"),
            })
            .collect();

        assert!(delays.windows(2).all(|w| w[0] < w[1]), "{:?}", delays);
        assert_eq!(
            ladder.on_failure(EngineKind::Primary, 3),
            LadderStep::Escalate {
                to: EngineKind::Fallback,
                delay: Duration::from_secs(3)
            }
        );
    }

    #[test]
    fn test_fallback_ladder_ends_in_emergency() {
        let ladder = RetryLadder::default();
        assert_eq!(
            ladder.on_failure(EngineKind::Fallback, 1),
            LadderStep::Retry {
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            ladder.on_failure(EngineKind::Fallback, 2),
            LadderStep::Retry {
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(ladder.on_failure(EngineKind::Fallback, 3), LadderStep::Emergency);
        assert_eq!(ladder.on_failure(EngineKind::Emergency, 1), LadderStep::Emergency);
    }

    #[test]
    fn test_each_engine_starts_its_own_ladder() {
        let ladder = RetryLadder::default();
        // Only the current engine's own streak counts.
        for engine in [EngineKind::Primary, EngineKind::Fallback] {
            assert_eq!(
                ladder.on_failure(engine, 1),
                LadderStep::Retry {
                    delay: Duration::from_secs(1)
                }
            );
        }
    }

    #[test]
    fn test_resume_relevant_states() {
        assert!(WakeState::Listening.is_listening_cycle());
        assert!(WakeState::Failing.is_listening_cycle());
        assert!(!WakeState::Idle.is_listening_cycle());
        assert!(!WakeState::Paused.is_listening_cycle());
    }
}
