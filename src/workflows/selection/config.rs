use serde::{Deserialize, Serialize};

/// Thresholds and cut-offs applied by the selection stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Minimum correct answers for a quiz to be marked PASSED.
    pub quiz_passing_marks: u32,
    /// Minimum speech score for a candidate to enter the final pool.
    pub speech_passing_marks: u32,
    pub shortlist_size: usize,
    pub final_selection_size: usize,
    pub question_count: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            quiz_passing_marks: 7,
            speech_passing_marks: 7,
            shortlist_size: 10,
            final_selection_size: 5,
            question_count: 10,
        }
    }
}
