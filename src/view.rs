//! Terminal presentation
//!
//! Every screen that waits on the backend is in one of four shapes, modelled
//! once as [`LoadState`] and rendered by [`render`] for anything that
//! implements [`Present`].

use crate::error::SessionError;
use crate::exercise::Exercise;
use crate::session::PracticeSession;
use crate::state::SessionState;
use crate::submission::{AnalysisResult, ScoreBand};
use std::fmt::Write;

/// Data that may still be loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    Loading,
    Error(String),
    Empty,
    Ready(T),
}

impl<T> LoadState<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => LoadState::Ready(v),
            None => LoadState::Empty,
        }
    }

    pub fn as_ref(&self) -> LoadState<&T> {
        match self {
            LoadState::Loading => LoadState::Loading,
            LoadState::Error(reason) => LoadState::Error(reason.clone()),
            LoadState::Empty => LoadState::Empty,
            LoadState::Ready(v) => LoadState::Ready(v),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready(_))
    }
}

impl<T, E: std::fmt::Display> From<Result<Option<T>, E>> for LoadState<T> {
    fn from(result: Result<Option<T>, E>) -> Self {
        match result {
            Ok(value) => LoadState::from_option(value),
            Err(e) => LoadState::Error(e.to_string()),
        }
    }
}

/// Something that can be shown in the terminal
pub trait Present {
    /// Noun used in loading and empty messages
    const NOUN: &'static str;

    fn present(&self) -> String;
}

impl<T: Present> Present for &T {
    const NOUN: &'static str = T::NOUN;

    fn present(&self) -> String {
        (*self).present()
    }
}

/// Render any load state the same way
pub fn render<T: Present>(state: &LoadState<T>) -> String {
    match state {
        LoadState::Loading => format!("Loading {}...", T::NOUN),
        LoadState::Error(reason) => format!("Error: {}", reason),
        LoadState::Empty => format!("No {} available.", T::NOUN),
        LoadState::Ready(value) => value.present(),
    }
}

impl Present for Exercise {
    const NOUN: &'static str = "exercise";

    fn present(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Exercise {} [{} · {}]",
            self.id,
            self.kind.as_str().replace('_', " "),
            self.difficulty
        );
        let _ = writeln!(out, "\n    \"{}\"\n", self.content);
        if let Some(phonemes) = self.target_phonemes.as_ref().filter(|p| !p.is_empty()) {
            let _ = writeln!(out, "Target sounds: {}", phonemes.join(", "));
        }
        if let Some(skills) = self.target_skills.as_ref().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "Skills: {}", skills.join(", "));
        }
        out
    }
}

impl Present for AnalysisResult {
    const NOUN: &'static str = "analysis";

    fn present(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Overall score: {}/100 ({})",
            self.overall_score,
            self.band().label()
        );
        for (skill, score) in &self.detailed_scores {
            let _ = writeln!(
                out,
                "  {:<16} {:>3}  {}",
                skill,
                score,
                bar(*score, ScoreBand::for_score(*score))
            );
        }
        if let Some(feedback) = &self.feedback {
            let _ = writeln!(out, "\n{}", feedback);
        }
        if !self.positives.is_empty() {
            let _ = writeln!(out, "\nWhat you did well:");
            for item in &self.positives {
                let _ = writeln!(out, "  + {}", item);
            }
        }
        if !self.suggestions.is_empty() {
            let _ = writeln!(out, "\nSuggestions:");
            for item in &self.suggestions {
                let _ = writeln!(out, "  - {}", item);
            }
        }
        out
    }
}

fn bar(score: u8, band: ScoreBand) -> String {
    let filled = ((score as usize + 5) / 10).min(10);
    let fill = match band {
        ScoreBand::Strong => '#',
        ScoreBand::Fair => '=',
        ScoreBand::NeedsWork => '-',
    };
    format!(
        "[{}{}]",
        fill.to_string().repeat(filled),
        " ".repeat(10 - filled)
    )
}

/// The exercise panel of a session
pub fn exercise_state(session: &PracticeSession) -> LoadState<&Exercise> {
    LoadState::from_option(session.exercise())
}

/// One-line summary of what the session is doing and which keys apply
pub fn status_line(session: &PracticeSession) -> String {
    let hint = match session.state() {
        SessionState::Idle => "n: next exercise",
        SessionState::Ready => "r: record, n: next, g <type>: generate",
        SessionState::Recording { .. } => "r: stop",
        SessionState::Recorded => "s: submit, p: play, r: re-record, x: discard",
        SessionState::Analyzing { .. } => "waiting for the analysis (r: re-record)",
        SessionState::Result => "c: mark complete, r: try again, x: reset, n: next",
        SessionState::Failed { .. } => "d: dismiss",
    };
    format!("[{}] {}  (q: quit)", session.state(), hint)
}

/// Inline error banner, if there is one to show
pub fn error_banner(error: Option<&SessionError>) -> Option<String> {
    error.map(|e| format!("! {}", e.user_message()))
}
