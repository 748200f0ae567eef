//! Speechcoach: speech-practice sessions against a coaching backend
//!
//! This library provides the core functionality for:
//! - Choosing the next exercise through a personalized → recommended → built-in fallback chain
//! - Capturing microphone audio via cpal (supports PipeWire, PulseAudio, ALSA)
//! - Submitting recordings as multipart uploads and parsing the scored analysis
//! - Driving the practice state machine and discarding stale analysis results
//!
//! # Architecture
//!
//! ```text
//!                            ┌─────────────────────────────────────┐
//!                            │          PracticeSession            │
//!                            │  Idle → Ready → Recording →         │
//!                            │  Recorded → Analyzing → Result      │
//!                            └─────────────────────────────────────┘
//!                                            │
//!                   ┌────────────────────────┼────────────────────────┐
//!                   │                        │                        │
//!                   ▼                        ▼                        ▼
//!          ┌──────────────┐         ┌──────────────┐         ┌──────────────┐
//!          │   Exercise   │         │   Capture    │         │  Submission  │
//!          │   Provider   │         │  Controller  │         │    Client    │
//!          └──────────────┘         └──────────────┘         └──────────────┘
//!                   │                        │                        │
//!                   │ GET exercises          │ acquire / events       │ POST multipart
//!                   │                        ▼                        │
//!                   │                ┌──────────────┐                 │
//!                   │                │ MediaDevices │                 │
//!                   │                │    (cpal)    │                 │
//!                   │                └──────────────┘                 │
//!                   ▼                                                 ▼
//!          ┌─────────────────────────────────────────────────────────────────┐
//!          │                ApiClient (bearer token, error taxonomy)         │
//!          │     2xx ok · 401/403 login redirect · else server message       │
//!          └─────────────────────────────────────────────────────────────────┘
//!                                            │
//!                                            ▼
//!                                   ┌──────────────┐
//!                                   │ HttpTransport│
//!                                   │    (ureq)    │
//!                                   └──────────────┘
//! ```

pub mod api;
pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod exercise;
pub mod playback;
pub mod provider;
pub mod session;
pub mod state;
pub mod submission;
pub mod view;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{ApiError, CaptureError, Result, SessionError, SpeechCoachError};
pub use session::PracticeSession;
