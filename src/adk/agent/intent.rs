// SPDX-License-Identifier: MIT

//! Goal intent - resolved once when a goal is submitted
//!
//! The intent decides which capability checklist a run walks through and
//! what "done" means for it. Nothing downstream looks at the goal text again.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::ActionType;
use crate::adk::error::{KineticError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoalIntent {
    /// Validate, fetch metadata, prepare media, transcribe, optionally enhance
    Transcribe {
        #[serde(default)]
        enhance: bool,
    },
    /// Enhance caller-supplied text
    EnhanceText,
    /// Validate and fetch metadata
    MediaInfo,
    /// Validate, fetch metadata and prepare the media file
    DownloadMedia,
}

impl GoalIntent {
    /// Resolve from `context.intent` when given, otherwise classify the goal text.
    /// `context.enhanceText` decides whether a transcription is enhanced.
    pub fn resolve(goal: &str, context: &Map<String, Value>) -> Result<Self> {
        let enhance = context
            .get("enhanceText")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if let Some(explicit) = context.get("intent") {
            let name = explicit.as_str().ok_or_else(|| {
                KineticError::validation("context.intent must be a string")
            })?;
            return Self::from_name(name, enhance).ok_or_else(|| {
                KineticError::validation(format!("unknown goal intent '{}'", name))
            });
        }

        Self::classify(goal, enhance).ok_or_else(|| {
            KineticError::validation(format!(
                "could not determine what to do for goal '{}'",
                goal
            ))
        })
    }

    fn from_name(name: &str, enhance: bool) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "transcribe" | "transcription" => Some(GoalIntent::Transcribe { enhance }),
            "enhance" | "enhance_text" => Some(GoalIntent::EnhanceText),
            "media_info" | "metadata" => Some(GoalIntent::MediaInfo),
            "download" | "download_media" => Some(GoalIntent::DownloadMedia),
            _ => None,
        }
    }

    fn classify(goal: &str, enhance: bool) -> Option<Self> {
        let goal = goal.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| goal.contains(w));

        if mentions(&["transcri", "caption", "subtitle"]) {
            Some(GoalIntent::Transcribe { enhance })
        } else if mentions(&["enhance", "improve", "summari", "polish"]) {
            Some(GoalIntent::EnhanceText)
        } else if mentions(&["download", "extract", "audio"]) {
            Some(GoalIntent::DownloadMedia)
        } else if mentions(&["metadata", "info", "details", "title"]) {
            Some(GoalIntent::MediaInfo)
        } else {
            None
        }
    }

    /// Ordered capability checklist
    pub fn checklist(&self) -> Vec<ActionType> {
        use ActionType::*;
        match self {
            GoalIntent::Transcribe { enhance: false } => {
                vec![Validate, Metadata, PrepareMedia, Transcribe]
            }
            GoalIntent::Transcribe { enhance: true } => {
                vec![Validate, Metadata, PrepareMedia, Transcribe, Enhance]
            }
            GoalIntent::EnhanceText => vec![Enhance],
            GoalIntent::MediaInfo => vec![Validate, Metadata],
            GoalIntent::DownloadMedia => vec![Validate, Metadata, PrepareMedia],
        }
    }

    /// Action types whose success completes the goal
    pub fn required(&self) -> Vec<ActionType> {
        match self {
            GoalIntent::Transcribe { enhance: false } => vec![ActionType::Transcribe],
            GoalIntent::Transcribe { enhance: true } => {
                vec![ActionType::Transcribe, ActionType::Enhance]
            }
            GoalIntent::EnhanceText => vec![ActionType::Enhance],
            GoalIntent::MediaInfo => vec![ActionType::Metadata],
            GoalIntent::DownloadMedia => vec![ActionType::PrepareMedia],
        }
    }

    /// Completion predicate over the set of successfully completed action types
    pub fn is_satisfied(&self, completed: impl Fn(ActionType) -> bool) -> bool {
        self.required().into_iter().all(completed)
    }

    /// Context keys the checklist cannot run without
    pub fn required_context(&self) -> &'static [&'static str] {
        match self {
            GoalIntent::EnhanceText => &["text"],
            _ => &["sourceUrl"],
        }
    }

    pub fn validate_context(&self, context: &Map<String, Value>) -> Result<()> {
        for key in self.required_context() {
            let present = context
                .get(*key)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.trim().is_empty());
            if !present {
                return Err(KineticError::validation(format!(
                    "goal context requires a non-empty '{}'",
                    key
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for GoalIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoalIntent::Transcribe { enhance: true } => write!(f, "transcribe+enhance"),
            GoalIntent::Transcribe { enhance: false } => write!(f, "transcribe"),
            GoalIntent::EnhanceText => write!(f, "enhance_text"),
            GoalIntent::MediaInfo => write!(f, "media_info"),
            GoalIntent::DownloadMedia => write!(f, "download_media"),
        }
    }
}
