//! Pure scoring rules shared by the quiz and finalize stages.

use super::domain::AnswerEntry;

/// Count the positions where a response matches the answer key.
///
/// A response list whose length differs from the key scores zero. Matching trims surrounding
/// whitespace and ignores ASCII case.
pub fn score_responses<S: AsRef<str>>(answer_key: &[AnswerEntry], responses: &[S]) -> u32 {
    if responses.len() != answer_key.len() {
        return 0;
    }

    answer_key
        .iter()
        .zip(responses)
        .filter(|(entry, response)| {
            response
                .as_ref()
                .trim()
                .eq_ignore_ascii_case(entry.correct.label())
        })
        .count() as u32
}

/// Inclusive threshold check used for both the quiz and the speech gate.
pub fn is_eligible(score: u32, threshold: u32) -> bool {
    score >= threshold
}

/// Composite of the quiz and speech scores. Both are taken as-is on a 0..10 scale.
pub fn combine(quiz_score: u32, speech_score: u32) -> f64 {
    (f64::from(quiz_score) + f64::from(speech_score)) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::selection::domain::OptionLetter;

    fn key(letters: &[OptionLetter]) -> Vec<AnswerEntry> {
        letters
            .iter()
            .enumerate()
            .map(|(index, letter)| AnswerEntry {
                question: format!("Question {}", index + 1),
                options: [
                    "one".to_string(),
                    "two".to_string(),
                    "three".to_string(),
                    "four".to_string(),
                ],
                correct: *letter,
            })
            .collect()
    }

    #[test]
    fn length_mismatch_scores_zero() {
        let answer_key = key(&[OptionLetter::A, OptionLetter::B, OptionLetter::C]);
        assert_eq!(score_responses(&answer_key, &["A", "B"]), 0);
        assert_eq!(score_responses(&answer_key, &["A", "B", "C", "D"]), 0);
        assert_eq!(score_responses::<&str>(&answer_key, &[]), 0);
    }

    #[test]
    fn matching_ignores_case_and_whitespace() {
        use OptionLetter::*;
        let answer_key = key(&[A, B, C, D, A]);
        let responses = ["a", "B", " c", "D ", "a"];
        assert_eq!(score_responses(&answer_key, &responses), 5);
    }

    #[test]
    fn partial_matches_count_raw_correct_answers() {
        use OptionLetter::*;
        let answer_key = key(&[A, B, C, D]);
        assert_eq!(score_responses(&answer_key, &["A", "C", "C", "x"]), 2);
    }

    #[test]
    fn empty_key_with_empty_responses_scores_zero() {
        assert_eq!(score_responses::<String>(&[], &[]), 0);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(is_eligible(7, 7));
        assert!(is_eligible(8, 7));
        assert!(!is_eligible(6, 7));
        assert!(is_eligible(0, 0));
    }

    #[test]
    fn combine_averages_both_scores() {
        assert_eq!(combine(8, 6), 7.0);
        assert_eq!(combine(10, 10), 10.0);
        assert_eq!(combine(8, 9), 8.5);
        assert_eq!(combine(0, 0), 0.0);
    }
}
