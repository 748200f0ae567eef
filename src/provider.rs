//! Exercise provider
//!
//! Picks the next exercise with an ordered fallback chain:
//! 1. personalized exercises for the user
//! 2. generic recommendations for the user
//! 3. the built-in default exercise
//!
//! The first step that yields a usable entry wins. An unauthenticated
//! response aborts the chain (the API client has already redirected to the
//! login page); every other failure is recorded and the chain moves on, so
//! the practice view always ends up with something to read.
//!
//! The provider also lists the user's active exercises and asks the backend
//! for a weekly plan; those calls report their failures directly.

use crate::api::{endpoints, ApiClient, HttpResponse, RequestBody};
use crate::error::ApiError;
use crate::exercise::{Exercise, ExerciseId, ExerciseType};

const FETCH_FALLBACK_MESSAGE: &str = "Failed to fetch exercise. Please try again.";
const GENERATE_FALLBACK_MESSAGE: &str = "Failed to generate exercise. Please try again.";
const COMPLETE_FALLBACK_MESSAGE: &str = "Failed to complete exercise. Please try again.";
const ACTIVE_FALLBACK_MESSAGE: &str = "Failed to fetch active exercises. Please try again.";
const WEEKLY_PLAN_FALLBACK_MESSAGE: &str = "Failed to generate weekly plan. Please try again.";
const MALFORMED_MESSAGE: &str = "The server sent an exercise list we could not read.";

/// Where an exercise came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseSource {
    Personalized,
    Recommended,
    Generated,
    BuiltinDefault,
}

impl std::fmt::Display for ExerciseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExerciseSource::Personalized => write!(f, "personalized"),
            ExerciseSource::Recommended => write!(f, "recommended"),
            ExerciseSource::Generated => write!(f, "generated"),
            ExerciseSource::BuiltinDefault => write!(f, "built-in"),
        }
    }
}

/// An exercise plus the failures of the steps that were skipped to reach it
#[derive(Debug, Clone)]
pub struct ProvidedExercise {
    pub exercise: Exercise,
    pub source: ExerciseSource,
    pub skipped: Vec<ApiError>,
}

impl ProvidedExercise {
    /// True when some step failed because the server could not be reached
    pub fn offline(&self) -> bool {
        self.skipped
            .iter()
            .any(|e| matches!(e, ApiError::ConnectivityFailure(_)))
    }
}

/// Supplies exercises from the backend
#[derive(Clone)]
pub struct ExerciseProvider {
    api: ApiClient,
}

impl ExerciseProvider {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Fetch the next exercise for the signed-in user
    ///
    /// Only fails with `ApiError::Unauthenticated`.
    pub async fn fetch_next_exercise(&self) -> Result<ProvidedExercise, ApiError> {
        let user_id = self.api.auth().user_id().to_string();
        let mut skipped = Vec::new();

        match self.personalized(&user_id).await {
            Ok(Some(exercise)) => {
                tracing::info!("Using personalized exercise {}", exercise.id);
                return Ok(ProvidedExercise {
                    exercise,
                    source: ExerciseSource::Personalized,
                    skipped,
                });
            }
            Ok(None) => tracing::debug!("No personalized exercises for user {}", user_id),
            Err(e) if e.is_unauthenticated() => return Err(e),
            Err(e) => {
                tracing::warn!("Personalized exercises unavailable: {}", e);
                skipped.push(e);
            }
        }

        match self.recommended(&user_id).await {
            Ok(Some(exercise)) => {
                tracing::info!("Using recommended exercise {}", exercise.id);
                return Ok(ProvidedExercise {
                    exercise,
                    source: ExerciseSource::Recommended,
                    skipped,
                });
            }
            Ok(None) => tracing::debug!("No recommended exercises for user {}", user_id),
            Err(e) if e.is_unauthenticated() => return Err(e),
            Err(e) => {
                tracing::warn!("Recommended exercises unavailable: {}", e);
                skipped.push(e);
            }
        }

        tracing::info!("Falling back to the built-in exercise");
        Ok(ProvidedExercise {
            exercise: Exercise::builtin_default(),
            source: ExerciseSource::BuiltinDefault,
            skipped,
        })
    }

    /// Ask the backend to generate a fresh exercise of the given type
    pub async fn generate_exercise(&self, kind: ExerciseType) -> Result<Exercise, ApiError> {
        let path = endpoints::generate_exercise(self.api.auth().user_id(), kind.as_str());
        let response = self
            .api
            .post(&path, RequestBody::Empty, GENERATE_FALLBACK_MESSAGE)
            .await?;

        let body: serde_json::Value = response
            .json()
            .map_err(|_| ApiError::rejection(Some(response.status), GENERATE_FALLBACK_MESSAGE))?;
        let entry = body.get("exercise").unwrap_or(&body);

        Exercise::from_personalized(entry)
            .ok_or_else(|| ApiError::rejection(Some(response.status), GENERATE_FALLBACK_MESSAGE))
    }

    /// Mark an exercise completed, optionally with the achieved score
    pub async fn complete_exercise(
        &self,
        exercise_id: &ExerciseId,
        performance_score: Option<u8>,
    ) -> Result<(), ApiError> {
        let path = endpoints::complete_exercise(&exercise_id.to_string(), performance_score);
        self.api
            .post(&path, RequestBody::Empty, COMPLETE_FALLBACK_MESSAGE)
            .await?;
        tracing::info!("Exercise {} marked complete", exercise_id);
        Ok(())
    }

    /// Unexpired exercises assigned to the user
    pub async fn active_exercises(&self) -> Result<Vec<Exercise>, ApiError> {
        let path = endpoints::active_exercises(self.api.auth().user_id());
        let response = self.api.get(&path, ACTIVE_FALLBACK_MESSAGE).await?;
        let active = convert_all(list_in(response, "activeExercises")?);
        tracing::debug!("{} active exercise(s)", active.len());
        Ok(active)
    }

    /// Ask the backend to plan a week of exercises for the user
    pub async fn generate_weekly_plan(&self) -> Result<Vec<Exercise>, ApiError> {
        let path = endpoints::generate_weekly_plan(self.api.auth().user_id());
        let response = self
            .api
            .post(&path, RequestBody::Empty, WEEKLY_PLAN_FALLBACK_MESSAGE)
            .await?;
        let plan = convert_all(list_in(response, "weeklyPlan")?);
        tracing::info!("Weekly plan with {} exercise(s)", plan.len());
        Ok(plan)
    }

    async fn personalized(&self, user_id: &str) -> Result<Option<Exercise>, ApiError> {
        let path = endpoints::personalized_exercises(user_id);
        let entries = self.fetch_list(&path, "exercises").await?;
        first_entry(entries, Exercise::from_personalized)
    }

    async fn recommended(&self, user_id: &str) -> Result<Option<Exercise>, ApiError> {
        let path = endpoints::recommendations(user_id);
        let entries = self.fetch_list(&path, "recommendations").await?;
        first_entry(entries, Exercise::from_recommendation)
    }

    /// GET a list that may be a bare array or wrapped under `key`
    async fn fetch_list(&self, path: &str, key: &str) -> Result<Vec<serde_json::Value>, ApiError> {
        let response = self.api.get(path, FETCH_FALLBACK_MESSAGE).await?;
        list_in(response, key)
    }
}

/// Pull a list out of a body that is either a bare array or wraps it under `key`
fn list_in(response: HttpResponse, key: &str) -> Result<Vec<serde_json::Value>, ApiError> {
    let malformed = || ApiError::rejection(Some(response.status), MALFORMED_MESSAGE);

    let body: serde_json::Value = response.json().map_err(|_| malformed())?;
    match body {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(mut map) => match map.remove(key) {
            Some(serde_json::Value::Array(items)) => Ok(items),
            Some(serde_json::Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(malformed()),
        },
        _ => Err(malformed()),
    }
}

fn convert_all(entries: Vec<serde_json::Value>) -> Vec<Exercise> {
    entries
        .iter()
        .filter_map(|entry| {
            let exercise = Exercise::from_personalized(entry);
            if exercise.is_none() {
                tracing::debug!("Skipping unreadable exercise entry");
            }
            exercise
        })
        .collect()
}

fn first_entry(
    entries: Vec<serde_json::Value>,
    convert: fn(&serde_json::Value) -> Option<Exercise>,
) -> Result<Option<Exercise>, ApiError> {
    match entries.first() {
        None => Ok(None),
        Some(entry) => convert(entry)
            .map(Some)
            .ok_or_else(|| ApiError::rejection(None, MALFORMED_MESSAGE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockTransport, RecordingRedirect};
    use crate::api::{AuthContext, Method};
    use serde_json::json;
    use std::sync::Arc;

    const PERSONALIZED: &str = "/api/ai/exercises/7";
    const RECOMMENDED: &str = "/api/exercises/recommendations/7";

    fn provider(transport: Arc<MockTransport>) -> (ExerciseProvider, Arc<RecordingRedirect>) {
        let redirect = Arc::new(RecordingRedirect::default());
        let auth = AuthContext::new("7", "http://localhost/login", redirect.clone());
        auth.sign_in("token");
        (
            ExerciseProvider::new(ApiClient::new(transport, auth)),
            redirect,
        )
    }

    #[tokio::test]
    async fn test_personalized_first_skips_other_steps() {
        let transport = MockTransport::new();
        transport.respond(
            PERSONALIZED,
            200,
            json!({"exercises": [
                {"id": 1, "exerciseType": "story", "exerciseContent": "Once upon a time"},
                {"id": 2, "exerciseContent": "Second entry"}
            ]}),
        );
        let (provider, _) = provider(transport.clone());

        let provided = provider.fetch_next_exercise().await.unwrap();
        assert_eq!(provided.source, ExerciseSource::Personalized);
        assert_eq!(provided.exercise.id, ExerciseId::Number(1));
        assert_eq!(provided.exercise.kind, ExerciseType::Story);
        assert!(provided.skipped.is_empty());
        assert_eq!(transport.hits(RECOMMENDED), 0);
    }

    #[tokio::test]
    async fn test_empty_personalized_falls_back_to_recommendations() {
        let transport = MockTransport::new();
        transport.respond(PERSONALIZED, 200, json!({"exercises": [], "count": 0}));
        transport.respond(
            RECOMMENDED,
            200,
            json!([{"id": 5, "targetText": "Unique New York", "difficultyLevel": "advanced"}]),
        );
        let (provider, _) = provider(transport.clone());

        let provided = provider.fetch_next_exercise().await.unwrap();
        assert_eq!(provided.source, ExerciseSource::Recommended);
        assert_eq!(provided.exercise.content, "Unique New York");
        assert!(provided.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_all_failures_yield_builtin_default() {
        let transport = MockTransport::new();
        transport.fail(PERSONALIZED, "connection refused");
        transport.respond(RECOMMENDED, 500, json!({"message": "database down"}));
        let (provider, redirect) = provider(transport);

        let provided = provider.fetch_next_exercise().await.unwrap();
        assert_eq!(provided.source, ExerciseSource::BuiltinDefault);
        assert_eq!(provided.exercise, Exercise::builtin_default());
        assert!(provided.offline());
        assert_eq!(provided.skipped.len(), 2);
        assert!(matches!(
            provided.skipped[0],
            ApiError::ConnectivityFailure(_)
        ));
        assert_eq!(
            provided.skipped[1],
            ApiError::rejection(Some(500), "database down")
        );
        assert!(redirect.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unauthenticated_aborts_chain() {
        let transport = MockTransport::new();
        transport.respond(PERSONALIZED, 401, json!({}));
        transport.respond(RECOMMENDED, 200, json!([{"id": 5, "targetText": "unused"}]));
        let (provider, redirect) = provider(transport.clone());

        let err = provider.fetch_next_exercise().await.unwrap_err();
        assert_eq!(err, ApiError::Unauthenticated { status: Some(401) });
        assert_eq!(transport.hits(RECOMMENDED), 0);
        assert_eq!(redirect.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unauthenticated_at_second_step_aborts_chain() {
        let transport = MockTransport::new();
        transport.respond(PERSONALIZED, 404, json!({"message": "User not found"}));
        transport.respond(RECOMMENDED, 403, json!({}));
        let (provider, _) = provider(transport);

        let err = provider.fetch_next_exercise().await.unwrap_err();
        assert!(err.is_unauthenticated());
    }

    #[tokio::test]
    async fn test_malformed_personalized_entry_falls_through() {
        let transport = MockTransport::new();
        transport.respond(PERSONALIZED, 200, json!({"exercises": [{"exerciseType": "story"}]}));
        transport.respond_raw(RECOMMENDED, 200, "not json");
        let (provider, _) = provider(transport);

        let provided = provider.fetch_next_exercise().await.unwrap();
        assert_eq!(provided.source, ExerciseSource::BuiltinDefault);
        assert_eq!(provided.skipped.len(), 2);
        assert!(!provided.offline());
    }

    #[tokio::test]
    async fn test_generate_exercise() {
        let transport = MockTransport::new();
        transport.respond(
            "/api/ai/generate-exercise/7?exerciseType=conversation",
            200,
            json!({"exercise": {"id": 99, "exerciseType": "conversation",
                                "exerciseContent": "Order a coffee"},
                   "message": "Exercise generated successfully"}),
        );
        let (provider, _) = provider(transport.clone());

        let exercise = provider
            .generate_exercise(ExerciseType::Conversation)
            .await
            .unwrap();
        assert_eq!(exercise.id, ExerciseId::Number(99));
        assert_eq!(exercise.kind, ExerciseType::Conversation);
        assert_eq!(transport.requests()[0].method, Method::Post);
    }

    #[tokio::test]
    async fn test_active_exercises_skip_unreadable_entries() {
        let transport = MockTransport::new();
        transport.respond(
            "/api/ai/exercises/7/active",
            200,
            json!({"activeExercises": [
                {"id": 3, "exerciseContent": "Thirty thin thistles"},
                {"exerciseContent": "no id"},
                {"id": 4, "exerciseType": "story", "exerciseContent": "The tortoise"}
            ], "count": 3}),
        );
        let (provider, _) = provider(transport);

        let active = provider.active_exercises().await.unwrap();
        let ids: Vec<_> = active.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![ExerciseId::Number(3), ExerciseId::Number(4)]);
    }

    #[tokio::test]
    async fn test_weekly_plan() {
        let transport = MockTransport::new();
        transport.respond(
            "/api/ai/generate-weekly-plan/7",
            200,
            json!({"weeklyPlan": [
                {"id": 20, "exerciseType": "sentence", "exerciseContent": "Monday"},
                {"id": 21, "exerciseType": "conversation", "exerciseContent": "Tuesday"}
            ], "message": "Weekly plan generated successfully"}),
        );
        let (provider, _) = provider(transport.clone());

        let plan = provider.generate_weekly_plan().await.unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].kind, ExerciseType::Conversation);
        assert_eq!(transport.requests()[0].method, Method::Post);
    }

    #[tokio::test]
    async fn test_weekly_plan_failure_uses_fallback_message() {
        let transport = MockTransport::new();
        transport.respond_raw("/api/ai/generate-weekly-plan/7", 500, "");
        let (provider, _) = provider(transport);

        let err = provider.generate_weekly_plan().await.unwrap_err();
        assert_eq!(
            err,
            ApiError::rejection(Some(500), WEEKLY_PLAN_FALLBACK_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_complete_exercise_reports_rejection() {
        let transport = MockTransport::new();
        transport.respond(
            "/api/ai/exercises/12/complete?performanceScore=88",
            404,
            json!({"message": "Exercise not found with ID: 12"}),
        );
        let (provider, _) = provider(transport);

        let err = provider
            .complete_exercise(&ExerciseId::Number(12), Some(88))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::rejection(Some(404), "Exercise not found with ID: 12")
        );
    }
}
