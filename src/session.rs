//! Practice session
//!
//! Ties the exercise provider, the capture controller and the submission
//! client together behind [`SessionState`]. The session is the single owner
//! of the current exercise, the analysis result and the last error; the
//! recording itself stays with the capture controller.
//!
//! Analysis can run detached from the session: [`PracticeSession::begin_analysis`]
//! hands out an [`AnalysisRequest`] stamped with the current epoch and
//! [`PracticeSession::finish_analysis`] applies the outcome only if nothing
//! has moved on since (new recording, reset, next exercise).

use crate::api::ApiClient;
use crate::capture::{CaptureController, Recording};
use crate::error::{ApiError, SessionError};
use crate::exercise::{Exercise, ExerciseId, ExerciseType};
use crate::provider::{ExerciseProvider, ExerciseSource};
use crate::state::{SessionState, StableState};
use crate::submission::{AnalysisResult, SubmissionClient};
use std::sync::Arc;
use std::time::Instant;

/// Identifies the submission an analysis outcome belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisTicket {
    epoch: u64,
}

/// Everything needed to run one analysis outside the session
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub ticket: AnalysisTicket,
    pub recording: Arc<Recording>,
    pub exercise_id: ExerciseId,
    pub user_id: String,
}

/// One live practice session
pub struct PracticeSession {
    provider: ExerciseProvider,
    capture: CaptureController,
    submission: SubmissionClient,
    user_id: String,
    state: SessionState,
    exercise: Option<Exercise>,
    source: Option<ExerciseSource>,
    analysis: Option<AnalysisResult>,
    last_error: Option<SessionError>,
    fallback_reasons: Vec<ApiError>,
    epoch: u64,
}

impl PracticeSession {
    pub fn new(api: ApiClient, capture: CaptureController) -> Self {
        Self {
            user_id: api.auth().user_id().to_string(),
            provider: ExerciseProvider::new(api.clone()),
            submission: SubmissionClient::new(api),
            capture,
            state: SessionState::new(),
            exercise: None,
            source: None,
            analysis: None,
            last_error: None,
            fallback_reasons: Vec::new(),
            epoch: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn exercise(&self) -> Option<&Exercise> {
        self.exercise.as_ref()
    }

    pub fn exercise_source(&self) -> Option<ExerciseSource> {
        self.source
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn recording(&self) -> Option<Arc<Recording>> {
        self.capture.last_recording()
    }

    /// Error to show inline until dismissed
    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    /// Why earlier steps of the exercise fallback chain were skipped
    pub fn fallback_reasons(&self) -> &[ApiError] {
        &self.fallback_reasons
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn submission(&self) -> &SubmissionClient {
        &self.submission
    }

    /// Drop everything and fetch a new exercise
    pub async fn load_next_exercise(&mut self) -> Result<ExerciseSource, SessionError> {
        self.clear_exercise();
        tracing::debug!("Loading next exercise");

        let provided = self.provider.fetch_next_exercise().await?;
        if !provided.skipped.is_empty() {
            tracing::debug!(
                "Skipped {} exercise source(s) before {}",
                provided.skipped.len(),
                provided.source
            );
        }
        let source = provided.source;
        self.fallback_reasons = provided.skipped;
        self.set_exercise(provided.exercise, source);
        Ok(source)
    }

    /// Replace the exercise with a freshly generated one
    ///
    /// On failure the current exercise and state are kept; only the error
    /// is recorded.
    pub async fn generate_exercise(&mut self, kind: ExerciseType) -> Result<(), SessionError> {
        if self.state.is_recording() {
            return Err(self.invalid("generate an exercise"));
        }

        match self.provider.generate_exercise(kind).await {
            Ok(exercise) => {
                self.fallback_reasons.clear();
                self.set_exercise(exercise, ExerciseSource::Generated);
                Ok(())
            }
            Err(e) => Err(self.record_api_error(e)),
        }
    }

    /// Load a specific exercise, discarding any attempt at the previous one
    pub fn set_exercise(&mut self, exercise: Exercise, source: ExerciseSource) {
        self.discard_attempt();
        tracing::info!("Exercise {} ({}, {})", exercise.id, exercise.kind, source);
        self.exercise = Some(exercise);
        self.source = Some(source);
        self.last_error = None;
        self.state = SessionState::Ready;
    }

    /// Open the microphone, discarding any previous recording and result
    pub async fn start_recording(&mut self) -> Result<(), SessionError> {
        if self.exercise.is_none() {
            return Err(SessionError::NoExercise);
        }

        self.discard_attempt();
        self.last_error = None;

        match self.capture.start_recording().await {
            Ok(()) => {
                self.state = SessionState::Recording {
                    started_at: Instant::now(),
                };
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Could not start recording: {}", e);
                Err(self.fail(e.into(), StableState::Ready))
            }
        }
    }

    /// Finish the recording; a no-op unless recording
    pub async fn stop_recording(&mut self) -> Result<(), SessionError> {
        if !self.state.is_recording() {
            tracing::debug!("Stop requested while {}; ignoring", self.state.name());
            return Ok(());
        }

        match self.capture.stop_recording().await {
            Ok(Some(_)) => {
                self.state = SessionState::Recorded;
                Ok(())
            }
            Ok(None) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Recording failed: {}", e);
                Err(self.fail(e.into(), StableState::Ready))
            }
        }
    }

    /// Pick up a stream that ended on its own (device error, duration limit)
    ///
    /// Returns true when the recording was finalized by this call.
    pub async fn check_capture(&mut self) -> Result<bool, SessionError> {
        if self.state.is_recording() && self.capture.stream_finished() {
            self.stop_recording().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Move to `Analyzing` and hand out what the upload needs
    pub fn begin_analysis(&mut self) -> Result<AnalysisRequest, SessionError> {
        if !self.state.can_submit() {
            return Err(match self.state {
                SessionState::Ready | SessionState::Idle => SessionError::NothingToSubmit,
                _ => self.invalid("submit"),
            });
        }

        let recording = self
            .capture
            .last_recording()
            .ok_or(SessionError::NothingToSubmit)?;
        let exercise_id = self
            .exercise
            .as_ref()
            .map(|e| e.id.clone())
            .ok_or(SessionError::NoExercise)?;

        self.epoch += 1;
        self.last_error = None;
        self.state = SessionState::Analyzing {
            started_at: Instant::now(),
        };

        Ok(AnalysisRequest {
            ticket: AnalysisTicket { epoch: self.epoch },
            recording,
            exercise_id,
            user_id: self.user_id.clone(),
        })
    }

    /// Apply an analysis outcome
    ///
    /// Returns `Ok(false)` when the outcome belongs to a superseded
    /// submission and was dropped.
    pub fn finish_analysis(
        &mut self,
        ticket: AnalysisTicket,
        outcome: Result<AnalysisResult, ApiError>,
    ) -> Result<bool, SessionError> {
        if ticket.epoch != self.epoch || !self.state.is_analyzing() {
            tracing::debug!(
                "Discarding stale analysis outcome (ticket {}, now {} while {})",
                ticket.epoch,
                self.epoch,
                self.state.name()
            );
            return Ok(false);
        }

        match outcome {
            Ok(result) => {
                tracing::info!("Analysis result: overall score {}", result.overall_score);
                self.analysis = Some(result);
                self.state = SessionState::Result;
                Ok(true)
            }
            Err(e) if e.is_unauthenticated() => {
                self.state = SessionState::Recorded;
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!("Analysis failed: {}", e);
                Err(self.fail(e.into(), StableState::Recorded))
            }
        }
    }

    /// Submit the kept recording and wait for the result
    pub async fn submit(&mut self) -> Result<&AnalysisResult, SessionError> {
        let request = self.begin_analysis()?;
        let outcome = self
            .submission
            .analyze(&request.recording, &request.exercise_id, &request.user_id)
            .await;
        self.finish_analysis(request.ticket, outcome)?;
        self.analysis.as_ref().ok_or(SessionError::NoResult)
    }

    /// Back to `Ready`, dropping the recording and result but keeping the exercise
    pub fn reset(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Recorded | SessionState::Result | SessionState::Failed { .. } => {
                self.discard_attempt();
                self.last_error = None;
                self.state = SessionState::Ready;
                tracing::debug!("Session reset");
                Ok(())
            }
            SessionState::Idle | SessionState::Recording { .. } | SessionState::Analyzing { .. } => {
                Err(self.invalid("reset"))
            }
        }
    }

    /// Clear the inline error and return to the last stable state
    pub fn dismiss_error(&mut self) {
        self.last_error = None;
        if let SessionState::Failed { resume_to } = self.state {
            self.state = resume_to.into_state();
        }
    }

    /// Tell the backend the current exercise is done, with the score if there is one
    ///
    /// A failure is recorded inline but does not change the state.
    pub async fn complete_exercise(&mut self) -> Result<(), SessionError> {
        let exercise_id = self
            .exercise
            .as_ref()
            .map(|e| e.id.clone())
            .ok_or(SessionError::NoExercise)?;
        let score = self.analysis.as_ref().map(|a| a.overall_score);

        self.provider
            .complete_exercise(&exercise_id, score)
            .await
            .map_err(|e| self.record_api_error(e))
    }

    fn clear_exercise(&mut self) {
        self.discard_attempt();
        self.exercise = None;
        self.source = None;
        self.last_error = None;
        self.fallback_reasons.clear();
        self.state = SessionState::Idle;
    }

    /// Drop the recording and result; any pending analysis becomes stale
    fn discard_attempt(&mut self) {
        self.capture.discard();
        self.analysis = None;
        self.epoch += 1;
    }

    fn fail(&mut self, error: SessionError, resume_to: StableState) -> SessionError {
        self.last_error = Some(error.clone());
        self.state = SessionState::Failed { resume_to };
        error
    }

    /// Store an API error inline unless it is an auth failure
    fn record_api_error(&mut self, error: ApiError) -> SessionError {
        let error = SessionError::from(error);
        if !error.is_unauthenticated() {
            self.last_error = Some(error.clone());
        }
        error
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state.name().to_string(),
            action,
        }
    }
}
