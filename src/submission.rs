//! Speech analysis submission
//!
//! Uploads a finished recording together with the exercise and user ids as
//! multipart form data and parses the scored result. One attempt per call;
//! retrying is the caller's decision.

use crate::api::multipart::MultipartForm;
use crate::api::{endpoints, ApiClient, RequestBody};
use crate::capture::{Recording, RECORDING_FILE_NAME};
use crate::error::ApiError;
use crate::exercise::ExerciseId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shown when the server rejects an analysis without a usable message
pub const ANALYZE_FALLBACK_MESSAGE: &str = "Failed to analyze speech. Please try again.";

/// Scored outcome of one submitted recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    /// 0-100
    pub overall_score: u8,
    /// Per-skill scores, 0-100
    pub detailed_scores: BTreeMap<String, u8>,
    pub feedback: Option<String>,
    /// What went well, in server order
    pub positives: Vec<String>,
    /// What to work on, in server order
    pub suggestions: Vec<String>,
}

/// How an overall score should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Strong,
    Fair,
    NeedsWork,
}

impl ScoreBand {
    pub fn for_score(score: u8) -> Self {
        if score >= 85 {
            ScoreBand::Strong
        } else if score >= 75 {
            ScoreBand::Fair
        } else {
            ScoreBand::NeedsWork
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreBand::Strong => "strong",
            ScoreBand::Fair => "fair",
            ScoreBand::NeedsWork => "needs work",
        }
    }
}

impl AnalysisResult {
    pub fn band(&self) -> ScoreBand {
        ScoreBand::for_score(self.overall_score)
    }

    /// Parse a response body
    ///
    /// `overallScore` wins over the older `score` field. A body without
    /// either is not an analysis.
    pub fn from_json(body: &[u8]) -> Option<Self> {
        let raw: RawAnalysis = serde_json::from_slice(body).ok()?;
        let overall = raw.overall_score.or(raw.score)?;

        let detailed_scores = raw
            .detailed_scores
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(skill, value)| value.as_f64().map(|v| (skill, clamp_score(v))))
            .collect();

        Some(Self {
            overall_score: clamp_score(overall),
            detailed_scores,
            feedback: raw.feedback.filter(|f| !f.trim().is_empty()),
            positives: raw
                .improvements
                .or(raw.positives)
                .or(raw.strengths)
                .unwrap_or_default(),
            suggestions: raw
                .recommendations
                .or(raw.suggestions)
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    overall_score: Option<f64>,
    score: Option<f64>,
    detailed_scores: Option<BTreeMap<String, serde_json::Value>>,
    feedback: Option<String>,
    improvements: Option<Vec<String>>,
    positives: Option<Vec<String>>,
    strengths: Option<Vec<String>>,
    recommendations: Option<Vec<String>>,
    suggestions: Option<Vec<String>>,
}

fn clamp_score(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Sends recordings to the analysis endpoint
#[derive(Clone)]
pub struct SubmissionClient {
    api: ApiClient,
}

impl SubmissionClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Submit a recording for scoring against an exercise
    pub async fn analyze(
        &self,
        recording: &Recording,
        exercise_id: &ExerciseId,
        user_id: &str,
    ) -> Result<AnalysisResult, ApiError> {
        let form = MultipartForm::new()
            .file(
                "audio",
                RECORDING_FILE_NAME,
                recording.mime_type(),
                recording.data().to_vec(),
            )
            .text("exerciseId", exercise_id.to_string())
            .text("userId", user_id);

        tracing::debug!(
            "Submitting {} byte recording for exercise {}",
            recording.len(),
            exercise_id
        );
        let start = std::time::Instant::now();

        let response = self
            .api
            .post(
                endpoints::SPEECH_ANALYZE,
                RequestBody::Multipart(form),
                ANALYZE_FALLBACK_MESSAGE,
            )
            .await?;

        let result = AnalysisResult::from_json(&response.body).ok_or_else(|| {
            tracing::warn!("Analysis response had no score");
            ApiError::rejection(Some(response.status), ANALYZE_FALLBACK_MESSAGE)
        })?;

        tracing::info!(
            "Analysis complete in {:.2}s: overall score {}",
            start.elapsed().as_secs_f32(),
            result.overall_score
        );
        Ok(result)
    }
}
