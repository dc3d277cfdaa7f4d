use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{AnswerEntry, Candidate};

/// Message families sent to candidates as they move between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    QuizInvite,
    SpeechInvite,
    FinalSelection,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::QuizInvite => "quiz_invite",
            NotificationKind::SpeechInvite => "speech_invite",
            NotificationKind::FinalSelection => "final_selection",
        }
    }
}

/// Outbound message payload; rendering is left to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Candidate,
    pub kind: NotificationKind,
    pub details: BTreeMap<String, String>,
}

/// Outbound delivery hook (SMTP or chat adapters).
pub trait NotificationService: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("recipient rejected: {0}")]
    Rejected(String),
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Transcript, score, and free-form feedback for one recorded introduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechAssessment {
    pub transcript: String,
    pub score: u32,
    pub analysis: String,
}

pub trait SpeechAnalysisService: Send + Sync {
    fn transcribe_and_score(&self, submission_link: &str)
        -> Result<SpeechAssessment, AnalysisError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("submission link not recognised: {0}")]
    InvalidLink(String),
    #[error("speech analysis unavailable: {0}")]
    Unavailable(String),
}

pub trait QuestionGenerationService: Send + Sync {
    fn generate_questions(
        &self,
        topics: &[String],
        count: usize,
    ) -> Result<Vec<AnswerEntry>, GenerationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("question source unreadable: {0}")]
    Source(#[from] std::io::Error),
    #[error("question generation unavailable: {0}")]
    Unavailable(String),
}
