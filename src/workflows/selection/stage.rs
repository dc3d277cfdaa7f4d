use serde::{Deserialize, Serialize};

/// Record counts observed in the store at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub questions: usize,
    pub quiz_records: usize,
    pub speech_records: usize,
    pub final_records: usize,
}

/// Phase of the onboarding cohort, derived from which stages already hold data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    QuizGeneration,
    QuizSubmission,
    VoiceSubmission,
    Finalization,
    Completed,
}

impl PipelineStage {
    /// Total over every combination of counts; the first empty stage wins.
    pub fn derive(counts: &StageCounts) -> Self {
        if counts.questions == 0 {
            PipelineStage::QuizGeneration
        } else if counts.quiz_records == 0 {
            PipelineStage::QuizSubmission
        } else if counts.speech_records == 0 {
            PipelineStage::VoiceSubmission
        } else if counts.final_records == 0 {
            PipelineStage::Finalization
        } else {
            PipelineStage::Completed
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            PipelineStage::QuizGeneration => "Quiz Generation",
            PipelineStage::QuizSubmission => "Quiz Submission",
            PipelineStage::VoiceSubmission => "Voice Submission",
            PipelineStage::Finalization => "Finalization",
            PipelineStage::Completed => "Completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(questions: usize, quiz: usize, speech: usize, finals: usize) -> StageCounts {
        StageCounts {
            questions,
            quiz_records: quiz,
            speech_records: speech,
            final_records: finals,
        }
    }

    #[test]
    fn derives_stage_from_first_empty_table() {
        assert_eq!(
            PipelineStage::derive(&counts(0, 0, 0, 0)),
            PipelineStage::QuizGeneration
        );
        assert_eq!(
            PipelineStage::derive(&counts(5, 0, 0, 0)),
            PipelineStage::QuizSubmission
        );
        assert_eq!(
            PipelineStage::derive(&counts(5, 3, 0, 0)),
            PipelineStage::VoiceSubmission
        );
        assert_eq!(
            PipelineStage::derive(&counts(5, 3, 2, 0)),
            PipelineStage::Finalization
        );
        assert_eq!(
            PipelineStage::derive(&counts(5, 3, 2, 2)),
            PipelineStage::Completed
        );
    }

    #[test]
    fn missing_questions_dominate_later_counts() {
        assert_eq!(
            PipelineStage::derive(&counts(0, 4, 4, 4)),
            PipelineStage::QuizGeneration
        );
        assert_eq!(
            PipelineStage::derive(&counts(10, 0, 4, 4)),
            PipelineStage::QuizSubmission
        );
    }
}
