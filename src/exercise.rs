//! Practice exercise model
//!
//! The backend serves exercises in two shapes: personalized entries
//! (`exerciseType`, `exerciseContent`, `difficultyLevel`, `targetPhonemes`,
//! `targetSkills`) and generic recommendations (`name`, `targetText`,
//! `category`, `instructions`, ...). Both are converted into one canonical
//! [`Exercise`]; an entry without an id or readable content is rejected
//! rather than half-filled.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Exercise identifier; the backend uses numbers, generated content may use strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExerciseId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for ExerciseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExerciseId::Number(n) => write!(f, "{}", n),
            ExerciseId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ExerciseId {
    fn from(s: &str) -> Self {
        match s.parse::<i64>() {
            Ok(n) => ExerciseId::Number(n),
            Err(_) => ExerciseId::Text(s.to_string()),
        }
    }
}

/// Kind of material to read aloud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    #[default]
    Sentence,
    Story,
    Conversation,
    TongueTwister,
}

impl ExerciseType {
    pub const ALL: [ExerciseType; 4] = [
        ExerciseType::Sentence,
        ExerciseType::Story,
        ExerciseType::Conversation,
        ExerciseType::TongueTwister,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseType::Sentence => "sentence",
            ExerciseType::Story => "story",
            ExerciseType::Conversation => "conversation",
            ExerciseType::TongueTwister => "tongue_twister",
        }
    }

    /// Parse, treating anything unrecognized (phoneme, word drills) as a sentence
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for ExerciseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "sentence" => Ok(ExerciseType::Sentence),
            "story" => Ok(ExerciseType::Story),
            "conversation" => Ok(ExerciseType::Conversation),
            "tongue_twister" | "tonguetwister" => Ok(ExerciseType::TongueTwister),
            other => Err(format!(
                "Unknown exercise type '{}'. Use sentence, story, conversation or tongue_twister.",
                other
            )),
        }
    }
}

impl std::fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difficulty level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }

    /// Case-insensitive parse; unknown levels count as beginner
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "intermediate" => Difficulty::Intermediate,
            "advanced" => Difficulty::Advanced,
            _ => Difficulty::Beginner,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One practice exercise
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exercise {
    pub id: ExerciseId,
    pub kind: ExerciseType,
    /// Text to read aloud
    pub content: String,
    pub difficulty: Difficulty,
    pub target_phonemes: Option<Vec<String>>,
    pub target_skills: Option<Vec<String>>,
}

impl Exercise {
    /// Built-in exercise used when the backend has nothing to offer
    pub fn builtin_default() -> Self {
        Self {
            id: ExerciseId::Text("default".to_string()),
            kind: ExerciseType::Sentence,
            content: "She sells seashells by the seashore.".to_string(),
            difficulty: Difficulty::Beginner,
            target_phonemes: Some(vec!["s".to_string(), "sh".to_string()]),
            target_skills: Some(vec!["articulation".to_string()]),
        }
    }

    /// Convert a personalized exercise entry
    pub fn from_personalized(value: &serde_json::Value) -> Option<Self> {
        let raw: RawExercise = serde_json::from_value(value.clone()).ok()?;
        let id = raw.id.clone()?;
        let content = non_empty(&raw.exercise_content)
            .or_else(|| non_empty(&raw.content))
            .or_else(|| non_empty(&raw.target_text))?;

        Some(Self {
            id,
            kind: raw
                .exercise_type
                .as_deref()
                .map(ExerciseType::parse_lenient)
                .unwrap_or_default(),
            content,
            difficulty: raw
                .difficulty_level
                .as_deref()
                .map(Difficulty::parse_lenient)
                .unwrap_or_default(),
            target_phonemes: raw.target_phonemes.as_ref().map(string_list),
            target_skills: raw.target_skills.as_ref().map(string_list),
        })
    }

    /// Convert a generic recommendation entry into the canonical shape
    pub fn from_recommendation(value: &serde_json::Value) -> Option<Self> {
        let raw: RawExercise = serde_json::from_value(value.clone()).ok()?;
        let id = raw.id.clone()?;
        let content = non_empty(&raw.target_text)
            .or_else(|| non_empty(&raw.target_phrase))
            .or_else(|| non_empty(&raw.exercise_content))
            .or_else(|| non_empty(&raw.content))
            .or_else(|| non_empty(&raw.instructions))
            .or_else(|| non_empty(&raw.description))
            .or_else(|| non_empty(&raw.name))
            .or_else(|| non_empty(&raw.title))?;

        let difficulty = raw
            .difficulty_level
            .as_deref()
            .or(raw.category.as_deref())
            .map(Difficulty::parse_lenient)
            .unwrap_or_default();

        Some(Self {
            id,
            kind: raw
                .exercise_type
                .as_deref()
                .map(ExerciseType::parse_lenient)
                .unwrap_or_default(),
            content,
            difficulty,
            target_phonemes: raw.target_phonemes.as_ref().map(string_list),
            target_skills: raw.target_skills.as_ref().map(string_list),
        })
    }
}

/// Every field either backend shape may carry
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExercise {
    id: Option<ExerciseId>,
    exercise_type: Option<String>,
    exercise_content: Option<String>,
    content: Option<String>,
    target_text: Option<String>,
    target_phrase: Option<String>,
    instructions: Option<String>,
    description: Option<String>,
    name: Option<String>,
    title: Option<String>,
    difficulty_level: Option<String>,
    category: Option<String>,
    target_phonemes: Option<serde_json::Value>,
    target_skills: Option<serde_json::Value>,
}

fn non_empty(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accept either a JSON array of strings or a comma-separated string
fn string_list(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        serde_json::Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
