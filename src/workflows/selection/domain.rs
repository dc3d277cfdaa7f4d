use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical join key for a candidate across every stage table.
///
/// Derived from the normalized e-mail address. Rows without an e-mail fall back to a
/// `name:`-prefixed key so they never collide with an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateKey(pub String);

impl CandidateKey {
    pub fn from_identity(name: &str, email: &str) -> Option<Self> {
        let email = email.trim();
        if !email.is_empty() {
            return Some(Self(email.to_lowercase()));
        }

        let name = name.trim();
        if name.is_empty() {
            None
        } else {
            Some(Self(format!("name:{}", name.to_lowercase())))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Participant identity as collected on the intake form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub email: String,
}

impl Candidate {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn key(&self) -> Option<CandidateKey> {
        CandidateKey::from_identity(&self.name, &self.email)
    }
}

/// One of the four multiple-choice positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
}

impl OptionLetter {
    pub const ALL: [OptionLetter; 4] = [Self::A, Self::B, Self::C, Self::D];

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_end_matches(')').trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            OptionLetter::A => "A",
            OptionLetter::B => "B",
            OptionLetter::C => "C",
            OptionLetter::D => "D",
        }
    }
}

/// A generated question with its four options and the designated correct letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question: String,
    pub options: [String; 4],
    pub correct: OptionLetter,
}

impl AnswerEntry {
    /// Entries reaching the quiz table must carry question text and four non-empty options.
    pub fn is_complete(&self) -> bool {
        !self.question.trim().is_empty()
            && self.options.iter().all(|option| !option.trim().is_empty())
    }
}

/// Grading state of a quiz record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuizStatus {
    Pending,
    Passed,
    Failed,
}

impl QuizStatus {
    pub const fn label(self) -> &'static str {
        match self {
            QuizStatus::Pending => "PENDING",
            QuizStatus::Passed => "PASSED",
            QuizStatus::Failed => "FAILED",
        }
    }

    /// Unknown or blank status cells are read back as pending.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PASSED" => QuizStatus::Passed,
            "FAILED" => QuizStatus::Failed,
            _ => QuizStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizRecord {
    pub candidate: Candidate,
    pub score: u32,
    /// Raw responses as submitted, JSON encoded.
    pub responses: String,
    pub status: QuizStatus,
}

impl QuizRecord {
    pub fn key(&self) -> Option<CandidateKey> {
        self.candidate.key()
    }
}

/// Candidate retained for the spoken-introduction stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortlistEntry {
    pub candidate: Candidate,
    pub quiz_score: u32,
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRecord {
    pub candidate: Candidate,
    pub submission_link: String,
    pub transcript: String,
    pub score: u32,
    pub analysis: String,
}

impl SpeechRecord {
    pub fn key(&self) -> Option<CandidateKey> {
        self.candidate.key()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    Selected,
    NotSelected,
}

impl Disposition {
    pub const fn label(self) -> &'static str {
        match self {
            Disposition::Selected => "Selected",
            Disposition::NotSelected => "Not Selected",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("selected") {
            Disposition::Selected
        } else {
            Disposition::NotSelected
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRecord {
    pub candidate: Candidate,
    pub quiz_score: u32,
    pub speech_score: u32,
    pub composite_score: f64,
    pub disposition: Disposition,
}

/// Quiz answers submitted by one candidate, in question order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSubmission {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub responses: Vec<String>,
}

impl QuizSubmission {
    pub fn candidate(&self) -> Candidate {
        Candidate::new(self.name.trim(), self.email.trim())
    }
}

/// Link to a recorded self-introduction awaiting analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechSubmission {
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub link: String,
}

impl SpeechSubmission {
    pub fn candidate(&self) -> Candidate {
        Candidate::new(self.name.trim(), self.email.trim())
    }
}
