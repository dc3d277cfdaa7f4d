use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::workflows::selection::domain::{
    AnswerEntry, Candidate, OptionLetter, QuizSubmission, SpeechSubmission,
};
use crate::workflows::selection::services::{
    AnalysisError, GenerationError, Notification, NotificationError, NotificationKind,
    NotificationService, QuestionGenerationService, SpeechAnalysisService, SpeechAssessment,
};
use crate::workflows::selection::store::{
    MemoryTabularStore, Row, RowRange, StoreError, Table, TabularStore,
};
use crate::workflows::selection::{selection_router, SelectionConfig, SelectionPipeline};

pub(super) type TestPipeline =
    SelectionPipeline<MemoryTabularStore, RecordingNotifier, ScriptedAnalyzer, StaticGenerator>;

pub(super) struct Harness {
    pub(super) pipeline: Arc<TestPipeline>,
    pub(super) store: Arc<MemoryTabularStore>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) analyzer: Arc<ScriptedAnalyzer>,
}

pub(super) fn selection_config() -> SelectionConfig {
    SelectionConfig {
        quiz_passing_marks: 7,
        speech_passing_marks: 7,
        shortlist_size: 3,
        final_selection_size: 2,
        question_count: 10,
    }
}

pub(super) fn harness() -> Harness {
    harness_with(selection_config(), StaticGenerator::new(answer_key(10)))
}

pub(super) fn harness_with(config: SelectionConfig, generator: StaticGenerator) -> Harness {
    let store = Arc::new(MemoryTabularStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let pipeline = Arc::new(SelectionPipeline::new(
        store.clone(),
        notifier.clone(),
        analyzer.clone(),
        Arc::new(generator),
        config,
    ));
    Harness {
        pipeline,
        store,
        notifier,
        analyzer,
    }
}

/// Harness with a stored ten-question quiz.
pub(super) fn seeded_harness() -> Harness {
    let harness = harness();
    harness
        .pipeline
        .generate_quiz(&["python".to_string()])
        .expect("quiz generated");
    harness
}

pub(super) fn question(index: usize, correct: OptionLetter) -> AnswerEntry {
    AnswerEntry {
        question: format!("Question {index}?"),
        options: [
            format!("Option {index}a"),
            format!("Option {index}b"),
            format!("Option {index}c"),
            format!("Option {index}d"),
        ],
        correct,
    }
}

/// Questions whose correct letters cycle A, B, C, D.
pub(super) fn answer_key(count: usize) -> Vec<AnswerEntry> {
    (0..count)
        .map(|index| question(index, OptionLetter::ALL[index % 4]))
        .collect()
}

/// Ten responses against [`answer_key`] with exactly `correct` right answers.
pub(super) fn responses(correct: usize) -> Vec<String> {
    answer_key(10)
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let letter = if index < correct {
                entry.correct
            } else {
                OptionLetter::ALL[(index + 1) % 4]
            };
            letter.label().to_string()
        })
        .collect()
}

pub(super) fn quiz_submission(name: &str, email: &str, correct: usize) -> QuizSubmission {
    QuizSubmission {
        name: name.to_string(),
        email: email.to_string(),
        responses: responses(correct),
    }
}

pub(super) fn speech_submission(name: &str, email: &str, link: &str) -> SpeechSubmission {
    SpeechSubmission {
        name: name.to_string(),
        email: email.to_string(),
        link: link.to_string(),
    }
}

pub(super) fn candidate(name: &str, email: &str) -> Candidate {
    Candidate::new(name, email)
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    rejected: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub(super) fn reject(&self, email: &str) {
        self.rejected
            .lock()
            .expect("notifier mutex poisoned")
            .insert(email.to_string());
    }

    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn recipients(&self, kind: NotificationKind) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|notification| notification.kind == kind)
            .map(|notification| notification.recipient.email)
            .collect()
    }
}

impl NotificationService for RecordingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        let rejected = self
            .rejected
            .lock()
            .expect("notifier mutex poisoned")
            .contains(&notification.recipient.email);
        if rejected {
            return Err(NotificationError::Rejected(
                notification.recipient.email.clone(),
            ));
        }
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct ScriptedAnalyzer {
    scores: Mutex<HashMap<String, u32>>,
}

impl ScriptedAnalyzer {
    pub(super) fn score(&self, link: &str, score: u32) {
        self.scores
            .lock()
            .expect("analyzer mutex poisoned")
            .insert(link.to_string(), score);
    }
}

impl SpeechAnalysisService for ScriptedAnalyzer {
    fn transcribe_and_score(
        &self,
        submission_link: &str,
    ) -> Result<SpeechAssessment, AnalysisError> {
        let score = self
            .scores
            .lock()
            .expect("analyzer mutex poisoned")
            .get(submission_link)
            .copied()
            .ok_or_else(|| AnalysisError::InvalidLink(submission_link.to_string()))?;
        Ok(SpeechAssessment {
            transcript: format!("Transcript for {submission_link}"),
            score,
            analysis: format!("Score: {score}"),
        })
    }
}

pub(super) struct StaticGenerator {
    entries: Vec<AnswerEntry>,
}

impl StaticGenerator {
    pub(super) fn new(entries: Vec<AnswerEntry>) -> Self {
        Self { entries }
    }
}

impl QuestionGenerationService for StaticGenerator {
    fn generate_questions(
        &self,
        _topics: &[String],
        count: usize,
    ) -> Result<Vec<AnswerEntry>, GenerationError> {
        Ok(self.entries.iter().take(count).cloned().collect())
    }
}

pub(super) struct UnavailableStore;

impl TabularStore for UnavailableStore {
    fn read_rows(&self, _table: Table, _range: RowRange) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::Unavailable("sheet offline".to_string()))
    }

    fn write_rows(&self, _table: Table, _rows: &[Row], _start: usize) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("sheet offline".to_string()))
    }

    fn append_rows(&self, _table: Table, _rows: &[Row]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("sheet offline".to_string()))
    }

    fn replace_rows(&self, _table: Table, _rows: &[Row]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("sheet offline".to_string()))
    }

    fn clear_table(&self, _table: Table) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("sheet offline".to_string()))
    }
}

/// Memory store whose mutations can be switched to fail while reads keep working.
#[derive(Default)]
pub(super) struct FlakyStore {
    inner: MemoryTabularStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub(super) fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("write quota exceeded".to_string()))
        } else {
            Ok(())
        }
    }
}

impl TabularStore for FlakyStore {
    fn read_rows(&self, table: Table, range: RowRange) -> Result<Vec<Row>, StoreError> {
        self.inner.read_rows(table, range)
    }

    fn write_rows(&self, table: Table, rows: &[Row], start: usize) -> Result<(), StoreError> {
        self.check()?;
        self.inner.write_rows(table, rows, start)
    }

    fn append_rows(&self, table: Table, rows: &[Row]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.append_rows(table, rows)
    }

    fn replace_rows(&self, table: Table, rows: &[Row]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.replace_rows(table, rows)
    }

    fn clear_table(&self, table: Table) -> Result<(), StoreError> {
        self.check()?;
        self.inner.clear_table(table)
    }
}

pub(super) fn flaky_pipeline(
    store: Arc<FlakyStore>,
    notifier: Arc<RecordingNotifier>,
) -> SelectionPipeline<FlakyStore, RecordingNotifier, ScriptedAnalyzer, StaticGenerator> {
    SelectionPipeline::new(
        store,
        notifier,
        Arc::new(ScriptedAnalyzer::default()),
        Arc::new(StaticGenerator::new(answer_key(10))),
        selection_config(),
    )
}

pub(super) fn unavailable_pipeline(
) -> SelectionPipeline<UnavailableStore, RecordingNotifier, ScriptedAnalyzer, StaticGenerator> {
    SelectionPipeline::new(
        Arc::new(UnavailableStore),
        Arc::new(RecordingNotifier::default()),
        Arc::new(ScriptedAnalyzer::default()),
        Arc::new(StaticGenerator::new(answer_key(10))),
        selection_config(),
    )
}

pub(super) fn router_for(harness: &Harness) -> axum::Router {
    selection_router(harness.pipeline.clone())
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
