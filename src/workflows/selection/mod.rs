//! Cohort selection: quiz generation and grading, shortlisting, speech scoring, and the
//! final composite ranking.
//!
//! Each stage reads its inputs from a [`TabularStore`] and writes its results back, so a
//! stage can be rerun on its own once the stage before it has data.

pub mod adapters;
pub mod analysis;
pub mod config;
pub mod csv_store;
pub mod domain;
pub mod pipeline;
pub mod ranking;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod services;
pub mod stage;
pub mod store;

#[cfg(test)]
mod tests;

pub use adapters::{quiz_submissions_from_csv, QuestionBank, RecordedAssessments, TracingNotifier};
pub use config::SelectionConfig;
pub use csv_store::CsvTabularStore;
pub use domain::{
    AnswerEntry, Candidate, CandidateKey, Disposition, FinalRecord, OptionLetter, QuizRecord,
    QuizStatus, QuizSubmission, ShortlistEntry, SpeechRecord, SpeechSubmission,
};
pub use pipeline::{
    InvitationReceipt, PipelineError, PipelineStatus, SelectionPipeline, StageFailure,
    StageOutcome,
};
pub use repository::SelectionRepository;
pub use router::selection_router;
pub use services::{
    AnalysisError, GenerationError, Notification, NotificationError, NotificationKind,
    NotificationService, QuestionGenerationService, SpeechAnalysisService, SpeechAssessment,
};
pub use stage::{PipelineStage, StageCounts};
pub use store::{MemoryTabularStore, Row, RowRange, StoreError, Table, TabularStore};
