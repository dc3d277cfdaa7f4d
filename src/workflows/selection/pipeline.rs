use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::analysis::{
    excerpt, ANALYSIS_EXCERPT_CHARS, MAX_SPEECH_SCORE, TRANSCRIPT_EXCERPT_CHARS,
};
use super::config::SelectionConfig;
use super::domain::{
    AnswerEntry, Candidate, CandidateKey, Disposition, FinalRecord, QuizRecord, QuizStatus,
    QuizSubmission, ShortlistEntry, SpeechRecord, SpeechSubmission,
};
use super::ranking::{rank, rank_top};
use super::repository::SelectionRepository;
use super::scoring::{combine, is_eligible, score_responses};
use super::services::{
    GenerationError, Notification, NotificationKind, NotificationService,
    QuestionGenerationService, SpeechAnalysisService,
};
use super::stage::{PipelineStage, StageCounts};
use super::store::{StoreError, Table, TabularStore};

/// Result of one stage run. An empty `items` list is a valid outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutcome<T> {
    pub items: Vec<T>,
    /// Per-candidate problems that did not stop the batch (bad input, failed delivery).
    pub failures: Vec<StageFailure>,
}

impl<T> StageOutcome<T> {
    fn new(items: Vec<T>, failures: Vec<StageFailure>) -> Self {
        Self { items, failures }
    }

    fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl StageOutcome<FinalRecord> {
    pub fn selected(&self) -> impl Iterator<Item = &FinalRecord> {
        self.items
            .iter()
            .filter(|record| record.disposition == Disposition::Selected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub candidate: Candidate,
    pub reason: String,
}

impl StageFailure {
    fn new(candidate: Candidate, reason: impl Into<String>) -> Self {
        Self {
            candidate,
            reason: reason.into(),
        }
    }
}

/// Delivery result for a single invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvitationReceipt {
    pub candidate: Candidate,
    pub kind: NotificationKind,
    pub notified: bool,
}

/// Snapshot returned by [`SelectionPipeline::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub stage: PipelineStage,
    #[serde(flatten)]
    pub counts: StageCounts,
    pub generated_at: DateTime<Utc>,
}

/// Failures that stop a stage run. Rows written before the failure stay; rerunning the stage
/// recomputes from the stored state.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("a previous stage run aborted while holding the pipeline lock")]
    Interrupted,
}

/// Orchestrates quiz grading, shortlisting, speech scoring, and final selection.
pub struct SelectionPipeline<S, N, A, G> {
    repository: SelectionRepository<S>,
    notifier: Arc<N>,
    analyzer: Arc<A>,
    generator: Arc<G>,
    config: SelectionConfig,
    run_lock: Mutex<()>,
}

impl<S, N, A, G> SelectionPipeline<S, N, A, G>
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        analyzer: Arc<A>,
        generator: Arc<G>,
        config: SelectionConfig,
    ) -> Self {
        Self {
            repository: SelectionRepository::new(store),
            notifier,
            analyzer,
            generator,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    pub fn repository(&self) -> &SelectionRepository<S> {
        &self.repository
    }

    /// Create any missing stage tables.
    pub fn initialize(&self) -> Result<Vec<Table>, PipelineError> {
        let _guard = self.exclusive()?;
        Ok(self.repository.ensure_tables()?)
    }

    pub fn reset(&self, table: Table) -> Result<(), PipelineError> {
        let _guard = self.exclusive()?;
        Ok(self.repository.reset(table)?)
    }

    /// Generate the answer key and replace the stored quiz. An empty generation keeps the
    /// current quiz untouched.
    pub fn generate_quiz(
        &self,
        topics: &[String],
    ) -> Result<StageOutcome<AnswerEntry>, PipelineError> {
        let _guard = self.exclusive()?;
        let requested = self.config.question_count;

        let generated = self.generator.generate_questions(topics, requested)?;
        let received = generated.len();
        let entries: Vec<AnswerEntry> = generated
            .into_iter()
            .filter(AnswerEntry::is_complete)
            .take(requested)
            .collect();

        if entries.is_empty() {
            warn!(?topics, received, "question generation produced no usable questions");
            return Ok(StageOutcome::empty());
        }

        self.repository.ensure_tables()?;
        self.repository.replace_questions(&entries)?;
        info!(
            requested,
            stored = entries.len(),
            dropped = received.saturating_sub(entries.len()),
            "quiz questions stored"
        );

        Ok(StageOutcome::new(entries, Vec::new()))
    }

    /// Record candidates that have not attempted the quiz yet as PENDING.
    pub fn register_candidates(
        &self,
        candidates: &[Candidate],
    ) -> Result<StageOutcome<QuizRecord>, PipelineError> {
        let _guard = self.exclusive()?;

        let mut known: HashMap<CandidateKey, QuizStatus> = self
            .repository
            .latest_quiz_records()?
            .into_iter()
            .filter_map(|record| record.key().map(|key| (key, record.status)))
            .collect();

        let mut registered = Vec::new();
        let mut failures = Vec::new();
        for candidate in candidates {
            let Some(key) = candidate.key() else {
                failures.push(StageFailure::new(candidate.clone(), "missing name and email"));
                continue;
            };
            if let Some(status) = known.get(&key) {
                debug!(candidate = %key, status = status.label(), "candidate already registered");
                continue;
            }

            known.insert(key, QuizStatus::Pending);
            registered.push(QuizRecord {
                candidate: candidate.clone(),
                score: 0,
                responses: String::new(),
                status: QuizStatus::Pending,
            });
        }

        self.repository.save_quiz_records(&registered)?;
        info!(
            registered = registered.len(),
            rejected = failures.len(),
            "candidates registered for the quiz"
        );
        Ok(StageOutcome::new(registered, failures))
    }

    /// Invite every PENDING candidate to take the quiz.
    pub fn send_quiz_invitations(
        &self,
        quiz_link: &str,
    ) -> Result<StageOutcome<InvitationReceipt>, PipelineError> {
        let _guard = self.exclusive()?;

        let pending: Vec<QuizRecord> = self
            .repository
            .latest_quiz_records()?
            .into_iter()
            .filter(|record| record.status == QuizStatus::Pending)
            .collect();

        if pending.is_empty() {
            info!("no pending candidates to invite");
            return Ok(StageOutcome::empty());
        }

        let mut receipts = Vec::with_capacity(pending.len());
        let mut failures = Vec::new();
        for record in pending {
            let mut details = BTreeMap::new();
            details.insert("quiz_link".to_string(), quiz_link.to_string());
            let notified = self.deliver(
                &record.candidate,
                NotificationKind::QuizInvite,
                details,
                &mut failures,
            );
            receipts.push(InvitationReceipt {
                candidate: record.candidate,
                kind: NotificationKind::QuizInvite,
                notified,
            });
        }

        info!(
            invited = receipts.len(),
            undelivered = failures.len(),
            "quiz invitations sent"
        );
        Ok(StageOutcome::new(receipts, failures))
    }

    /// Grade submitted answers against the stored quiz and persist a record per candidate.
    pub fn check_quiz_responses(
        &self,
        submissions: &[QuizSubmission],
    ) -> Result<StageOutcome<QuizRecord>, PipelineError> {
        let _guard = self.exclusive()?;

        let answer_key = self.repository.answer_key()?;
        if answer_key.is_empty() {
            warn!(
                submissions = submissions.len(),
                "no quiz questions stored; responses not graded"
            );
            return Ok(StageOutcome::empty());
        }
        if answer_key.len() as u32 != MAX_SPEECH_SCORE {
            warn!(
                questions = answer_key.len(),
                "quiz length differs from the 0..10 speech scale; composite scores are not rescaled"
            );
        }

        let threshold = self.config.quiz_passing_marks;
        let mut graded = Vec::with_capacity(submissions.len());
        let mut failures = Vec::new();
        for submission in submissions {
            let candidate = submission.candidate();
            if candidate.key().is_none() {
                failures.push(StageFailure::new(candidate, "missing name and email"));
                continue;
            }

            let score = score_responses(&answer_key, &submission.responses);
            let status = if is_eligible(score, threshold) {
                QuizStatus::Passed
            } else {
                QuizStatus::Failed
            };
            debug!(
                candidate = %candidate.email,
                score,
                status = status.label(),
                "quiz graded"
            );

            graded.push(QuizRecord {
                candidate,
                score,
                responses: serde_json::to_string(&submission.responses).unwrap_or_default(),
                status,
            });
        }

        self.repository.save_quiz_records(&graded)?;

        let passed = graded
            .iter()
            .filter(|record| record.status == QuizStatus::Passed)
            .count();
        info!(
            graded = graded.len(),
            passed,
            failed = graded.len() - passed,
            threshold,
            "quiz responses checked"
        );
        Ok(StageOutcome::new(graded, failures))
    }

    /// Rank candidates who passed the quiz, keep the top of the list, and invite them to
    /// record an introduction. The stored shortlist is replaced on every run.
    pub fn extract_shortlist(&self) -> Result<StageOutcome<ShortlistEntry>, PipelineError> {
        let _guard = self.exclusive()?;
        let threshold = self.config.quiz_passing_marks;

        let passed: Vec<QuizRecord> = self
            .repository
            .latest_quiz_records()?
            .into_iter()
            .filter(|record| {
                record.status == QuizStatus::Passed && is_eligible(record.score, threshold)
            })
            .collect();
        let eligible = passed.len();

        let ranked = rank_top(
            passed,
            |record| f64::from(record.score),
            self.config.shortlist_size,
        );

        if ranked.is_empty() {
            self.repository.replace_shortlist(&[])?;
            info!(threshold, "no candidates passed the quiz; shortlist is empty");
            return Ok(StageOutcome::empty());
        }

        let mut entries: Vec<ShortlistEntry> = ranked
            .into_iter()
            .map(|record| ShortlistEntry {
                candidate: record.candidate,
                quiz_score: record.score,
                notified: false,
            })
            .collect();
        // Invitations go out only once the shortlist itself is stored.
        self.repository.replace_shortlist(&entries)?;

        let mut failures = Vec::new();
        for entry in &mut entries {
            let mut details = BTreeMap::new();
            details.insert("quiz_score".to_string(), entry.quiz_score.to_string());
            entry.notified = self.deliver(
                &entry.candidate,
                NotificationKind::SpeechInvite,
                details,
                &mut failures,
            );
        }

        self.repository.replace_shortlist(&entries)?;
        info!(
            eligible,
            shortlisted = entries.len(),
            undelivered = failures.len(),
            "shortlist extracted"
        );
        Ok(StageOutcome::new(entries, failures))
    }

    /// Transcribe and score each submission, storing one speech record per candidate.
    pub fn process_speech_submissions(
        &self,
        submissions: &[SpeechSubmission],
    ) -> Result<StageOutcome<SpeechRecord>, PipelineError> {
        let _guard = self.exclusive()?;

        let mut processed = Vec::with_capacity(submissions.len());
        let mut failures = Vec::new();
        for submission in submissions {
            let candidate = submission.candidate();
            let link = submission.link.trim();
            if candidate.key().is_none() || link.is_empty() {
                warn!(name = %candidate.name, "speech submission missing identity or link");
                failures.push(StageFailure::new(candidate, "missing identity or link"));
                continue;
            }

            let assessment = match self.analyzer.transcribe_and_score(link) {
                Ok(assessment) => assessment,
                Err(err) => {
                    warn!(candidate = %candidate.email, error = %err, "speech analysis failed");
                    failures.push(StageFailure::new(candidate, err.to_string()));
                    continue;
                }
            };

            let record = SpeechRecord {
                candidate,
                submission_link: link.to_string(),
                transcript: excerpt(&assessment.transcript, TRANSCRIPT_EXCERPT_CHARS),
                score: assessment.score.min(MAX_SPEECH_SCORE),
                analysis: excerpt(&assessment.analysis, ANALYSIS_EXCERPT_CHARS),
            };
            self.repository.upsert_speech_record(&record)?;
            debug!(candidate = %record.candidate.email, score = record.score, "speech scored");
            processed.push(record);
        }

        info!(
            processed = processed.len(),
            skipped = failures.len(),
            "speech submissions processed"
        );
        Ok(StageOutcome::new(processed, failures))
    }

    /// Join quiz and speech scores, rank the speech-eligible candidates by composite score,
    /// and mark the top of the list as selected. Final results are rebuilt from scratch.
    pub fn finalize(&self) -> Result<StageOutcome<FinalRecord>, PipelineError> {
        let _guard = self.exclusive()?;
        let threshold = self.config.speech_passing_marks;

        let speech: HashMap<CandidateKey, SpeechRecord> = self
            .repository
            .speech_records()?
            .into_iter()
            .filter_map(|record| record.key().map(|key| (key, record)))
            .collect();

        let mut joined = 0usize;
        let mut eligible = Vec::new();
        for quiz in self.repository.latest_quiz_records()? {
            let Some(spoken) = quiz.key().and_then(|key| speech.get(&key)) else {
                continue;
            };
            joined += 1;
            if !is_eligible(spoken.score, threshold) {
                continue;
            }

            eligible.push(FinalRecord {
                composite_score: combine(quiz.score, spoken.score),
                candidate: quiz.candidate,
                quiz_score: quiz.score,
                speech_score: spoken.score,
                disposition: Disposition::NotSelected,
            });
        }

        let mut results = rank(eligible, |record| record.composite_score);
        for record in results.iter_mut().take(self.config.final_selection_size) {
            record.disposition = Disposition::Selected;
        }

        self.repository.replace_final_results(&results)?;

        if results.is_empty() {
            info!(
                joined,
                threshold, "no candidates met the speech threshold; nobody selected"
            );
            return Ok(StageOutcome::empty());
        }

        let mut failures = Vec::new();
        for record in results
            .iter()
            .filter(|record| record.disposition == Disposition::Selected)
        {
            let mut details = BTreeMap::new();
            details.insert(
                "composite_score".to_string(),
                format!("{:.1}", record.composite_score),
            );
            self.deliver(
                &record.candidate,
                NotificationKind::FinalSelection,
                details,
                &mut failures,
            );
        }

        let outcome = StageOutcome::new(results, failures);
        info!(
            joined,
            eligible = outcome.len(),
            selected = outcome.selected().count(),
            undelivered = outcome.failures.len(),
            "final selection complete"
        );
        Ok(outcome)
    }

    /// Derive the current stage from the stored record counts.
    pub fn status(&self) -> Result<PipelineStatus, PipelineError> {
        let counts = self.repository.counts()?;
        Ok(PipelineStatus {
            stage: PipelineStage::derive(&counts),
            counts,
            generated_at: Utc::now(),
        })
    }

    pub fn shortlist(&self) -> Result<Vec<ShortlistEntry>, PipelineError> {
        Ok(self.repository.shortlist()?)
    }

    pub fn final_results(&self) -> Result<Vec<FinalRecord>, PipelineError> {
        Ok(self.repository.final_results()?)
    }

    fn deliver(
        &self,
        candidate: &Candidate,
        kind: NotificationKind,
        mut details: BTreeMap<String, String>,
        failures: &mut Vec<StageFailure>,
    ) -> bool {
        details.insert("name".to_string(), candidate.name.clone());
        let notification = Notification {
            recipient: candidate.clone(),
            kind,
            details,
        };

        match self.notifier.notify(notification) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    candidate = %candidate.email,
                    kind = kind.label(),
                    error = %err,
                    "notification not delivered"
                );
                failures.push(StageFailure::new(
                    candidate.clone(),
                    format!("{} not delivered: {err}", kind.label()),
                ));
                false
            }
        }
    }

    fn exclusive(&self) -> Result<MutexGuard<'_, ()>, PipelineError> {
        self.run_lock.lock().map_err(|_| PipelineError::Interrupted)
    }
}
