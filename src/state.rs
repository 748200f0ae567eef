//! State machine for a practice session
//!
//! Idle → Ready → Recording → Recorded → Analyzing → Result
//!
//! Any failed step lands in `Failed`, which remembers the last stable state
//! (`Ready` or `Recorded`) so the user can retry without losing work.

use std::time::Instant;

/// States a failure can fall back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StableState {
    /// Exercise loaded, nothing recorded
    Ready,
    /// Recording kept, ready to submit again
    Recorded,
}

impl StableState {
    pub fn into_state(self) -> SessionState {
        match self {
            StableState::Ready => SessionState::Ready,
            StableState::Recorded => SessionState::Recorded,
        }
    }
}

/// Session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No exercise loaded
    Idle,

    /// Exercise loaded, no recording
    Ready,

    /// Microphone open
    Recording {
        /// When recording started
        started_at: Instant,
    },

    /// Recording finished, not yet submitted
    Recorded,

    /// Submission in flight
    Analyzing {
        /// When the upload started
        started_at: Instant,
    },

    /// Analysis available
    Result,

    /// Last operation failed
    Failed {
        /// Where dismissing the error returns to
        resume_to: StableState,
    },
}

impl SessionState {
    /// Create a new idle state
    pub fn new() -> Self {
        SessionState::Idle
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording { .. })
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self, SessionState::Analyzing { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionState::Failed { .. })
    }

    /// True when a kept recording can be submitted
    pub fn can_submit(&self) -> bool {
        matches!(
            self,
            SessionState::Recorded
                | SessionState::Failed {
                    resume_to: StableState::Recorded
                }
        )
    }

    /// Time spent in the current recording or upload
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        match self {
            SessionState::Recording { started_at } | SessionState::Analyzing { started_at } => {
                Some(started_at.elapsed())
            }
            _ => None,
        }
    }

    /// Short lowercase name, used in transition errors
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Ready => "ready",
            SessionState::Recording { .. } => "recording",
            SessionState::Recorded => "recorded",
            SessionState::Analyzing { .. } => "analyzing",
            SessionState::Result => "showing a result",
            SessionState::Failed { .. } => "failed",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Ready => write!(f, "Ready"),
            SessionState::Recording { started_at } => {
                write!(f, "Recording ({:.1}s)", started_at.elapsed().as_secs_f32())
            }
            SessionState::Recorded => write!(f, "Recorded"),
            SessionState::Analyzing { started_at } => {
                write!(f, "Analyzing ({:.1}s)", started_at.elapsed().as_secs_f32())
            }
            SessionState::Result => write!(f, "Result"),
            SessionState::Failed { resume_to } => write!(f, "Failed (resume to {:?})", resume_to),
        }
    }
}
