//! Text helpers for the speech and question-generation adapters.

use tracing::debug;

use super::domain::{AnswerEntry, OptionLetter};

/// Score assumed when analysis text carries no usable number.
pub const NEUTRAL_SPEECH_SCORE: u32 = 5;
pub const MAX_SPEECH_SCORE: u32 = 10;

pub const TRANSCRIPT_EXCERPT_CHARS: usize = 500;
pub const ANALYSIS_EXCERPT_CHARS: usize = 200;

/// Pull the numeric score out of free-form analysis feedback.
///
/// Uses the first `Score: <n>` marker that carries a number, then the first integer anywhere
/// in the text, and falls back to [`NEUTRAL_SPEECH_SCORE`]. Results are capped at
/// [`MAX_SPEECH_SCORE`].
pub fn extract_score(analysis: &str) -> u32 {
    const MARKER: &str = "score:";
    // ASCII lowercasing keeps byte offsets aligned with `analysis`.
    let lowered = analysis.to_ascii_lowercase();
    let marked = lowered.match_indices(MARKER).find_map(|(index, _)| {
        let rest = analysis[index + MARKER.len()..].trim_start();
        leading_number(rest)
    });

    marked
        .or_else(|| first_number(analysis))
        .map(|score| score.min(MAX_SPEECH_SCORE))
        .unwrap_or(NEUTRAL_SPEECH_SCORE)
}

fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
    parse_saturating(&digits)
}

fn first_number(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    leading_number(&text[start..])
}

fn parse_saturating(digits: &str) -> Option<u32> {
    if digits.is_empty() {
        return None;
    }
    Some(digits.parse::<u32>().unwrap_or(u32::MAX))
}

/// Shorten stored free text, marking the cut with `...`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }

    let mut shortened: String = trimmed.chars().take(max_chars).collect();
    shortened.push_str("...");
    shortened
}

#[derive(Default)]
struct PendingQuestion {
    question: Option<String>,
    options: [Option<String>; 4],
    correct: Option<OptionLetter>,
}

impl PendingQuestion {
    fn finish(self) -> Option<AnswerEntry> {
        let [a, b, c, d] = self.options;
        let entry = AnswerEntry {
            question: self.question?,
            options: [a?, b?, c?, d?],
            correct: self.correct?,
        };
        entry.is_complete().then_some(entry)
    }
}

/// Parse the plain-text question bank format:
///
/// ```text
/// Question: What does SQL stand for?
/// A) Structured Query Language
/// B) Simple Query Language
/// C) Sequential Query Logic
/// D) Standard Question Language
/// Correct Answer: A
/// ```
///
/// Blocks missing an option or a valid answer letter are dropped.
pub fn parse_question_bank(text: &str) -> Vec<AnswerEntry> {
    let mut entries = Vec::new();
    let mut current: Option<PendingQuestion> = None;
    let mut dropped = 0usize;

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("Question") {
            if let Some(pending) = current.take() {
                match pending.finish() {
                    Some(entry) => entries.push(entry),
                    None => dropped += 1,
                }
            }
            let question = match rest.split_once(':') {
                Some((_, text)) => text.trim(),
                None => rest.trim(),
            };
            current = Some(PendingQuestion {
                question: Some(question.to_string()),
                ..PendingQuestion::default()
            });
            continue;
        }

        let Some(pending) = current.as_mut() else {
            continue;
        };

        if let Some(rest) = line
            .strip_prefix("Correct Answer:")
            .or_else(|| line.strip_prefix("Correct Answer"))
        {
            pending.correct = OptionLetter::parse(rest);
            continue;
        }

        for (index, letter) in OptionLetter::ALL.iter().enumerate() {
            if let Some(option) = line.strip_prefix(&format!("{})", letter.label())) {
                pending.options[index] = Some(option.trim().to_string());
            }
        }
    }

    if let Some(pending) = current {
        match pending.finish() {
            Some(entry) => entries.push(entry),
            None => dropped += 1,
        }
    }

    debug!(parsed = entries.len(), dropped, "question bank parsed");
    entries
}
