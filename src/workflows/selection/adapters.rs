//! Offline collaborators used by the CLI and the default service wiring.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

use serde::Deserialize;
use tracing::{info, warn};

use super::analysis::{extract_score, parse_question_bank};
use super::domain::{AnswerEntry, QuizSubmission, SpeechSubmission};
use super::services::{
    AnalysisError, GenerationError, Notification, NotificationError, NotificationService,
    QuestionGenerationService, SpeechAnalysisService, SpeechAssessment,
};

/// Question source backed by a plain-text bank (see [`parse_question_bank`]).
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    entries: Vec<AnswerEntry>,
}

impl QuestionBank {
    pub fn new(entries: Vec<AnswerEntry>) -> Self {
        Self { entries }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, GenerationError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        Self::new(parse_question_bank(text))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl QuestionGenerationService for QuestionBank {
    /// Questions mentioning one of the topics come first; the rest of the bank fills the gap.
    fn generate_questions(
        &self,
        topics: &[String],
        count: usize,
    ) -> Result<Vec<AnswerEntry>, GenerationError> {
        let topics: Vec<String> = topics
            .iter()
            .map(|topic| topic.trim().to_lowercase())
            .filter(|topic| !topic.is_empty())
            .collect();

        let (matching, others): (Vec<&AnswerEntry>, Vec<&AnswerEntry>) =
            self.entries.iter().partition(|entry| {
                let question = entry.question.to_lowercase();
                topics.iter().any(|topic| question.contains(topic.as_str()))
            });

        let selected: Vec<AnswerEntry> = matching
            .into_iter()
            .chain(others)
            .take(count)
            .cloned()
            .collect();

        if selected.len() < count {
            warn!(
                requested = count,
                available = selected.len(),
                "question bank smaller than requested quiz"
            );
        }

        Ok(selected)
    }
}

/// Transcripts and analyses produced ahead of time, keyed by submission link.
#[derive(Debug, Default)]
pub struct RecordedAssessments {
    by_link: HashMap<String, (String, String)>,
}

/// One row of a recorded-submissions CSV: `name,email,link,transcript,analysis`.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordedSubmission {
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub link: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub analysis: String,
}

impl RecordedAssessments {
    pub fn insert(
        &mut self,
        link: impl Into<String>,
        transcript: impl Into<String>,
        analysis: impl Into<String>,
    ) {
        self.by_link
            .insert(link.into().trim().to_string(), (transcript.into(), analysis.into()));
    }

    /// Load recorded submissions, returning the analyzer together with the submissions to run.
    pub fn from_csv<R: Read>(reader: R) -> Result<(Self, Vec<SpeechSubmission>), csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut assessments = Self::default();
        let mut submissions = Vec::new();
        for row in csv_reader.deserialize::<RecordedSubmission>() {
            let row = row?;
            assessments.insert(row.link.clone(), row.transcript, row.analysis);
            submissions.push(SpeechSubmission {
                name: row.name,
                email: row.email,
                link: row.link,
            });
        }

        Ok((assessments, submissions))
    }
}

impl SpeechAnalysisService for RecordedAssessments {
    fn transcribe_and_score(
        &self,
        submission_link: &str,
    ) -> Result<SpeechAssessment, AnalysisError> {
        let (transcript, analysis) = self
            .by_link
            .get(submission_link.trim())
            .ok_or_else(|| AnalysisError::InvalidLink(submission_link.to_string()))?;

        Ok(SpeechAssessment {
            transcript: transcript.clone(),
            score: extract_score(analysis),
            analysis: analysis.clone(),
        })
    }
}

/// Read a quiz export: a header row, then `name,email` followed by one answer per question.
pub fn quiz_submissions_from_csv<R: Read>(reader: R) -> Result<Vec<QuizSubmission>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut submissions = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        submissions.push(QuizSubmission {
            name: record.get(0).unwrap_or_default().to_string(),
            email: record.get(1).unwrap_or_default().to_string(),
            responses: record.iter().skip(2).map(str::to_string).collect(),
        });
    }

    Ok(submissions)
}

/// Notifier that only emits a log line per message and keeps a delivery count.
#[derive(Debug, Default)]
pub struct TracingNotifier {
    delivered: Mutex<usize>,
}

impl TracingNotifier {
    pub fn delivered(&self) -> usize {
        self.delivered.lock().map(|count| *count).unwrap_or(0)
    }
}

impl NotificationService for TracingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            kind = notification.kind.label(),
            recipient = %notification.recipient.email,
            name = %notification.recipient.name,
            details = ?notification.details,
            "notification dispatched"
        );
        let mut delivered = self
            .delivered
            .lock()
            .map_err(|_| NotificationError::Transport("notifier lock poisoned".to_string()))?;
        *delivered += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::selection::domain::Candidate;
    use crate::workflows::selection::services::NotificationKind;
    use std::collections::BTreeMap;

    const BANK: &str = "\
Question: What is gradient descent?
A) An optimiser
B) A dataset
C) A metric
D) A language
Correct Answer: A
Question: Which SQL clause filters rows?
A) ORDER BY
B) WHERE
C) GROUP BY
D) LIMIT
Correct Answer: B
Question: What does a confusion matrix summarise?
A) Latency
B) Memory
C) Classification results
D) Storage
Correct Answer: C
";

    #[test]
    fn question_bank_prefers_topic_matches() {
        let bank = QuestionBank::parse(BANK);
        assert_eq!(bank.len(), 3);

        let questions = bank
            .generate_questions(&["sql".to_string()], 2)
            .expect("questions");
        assert_eq!(questions.len(), 2);
        assert!(questions[0].question.contains("SQL"));
        assert!(questions[1].question.contains("gradient"));
    }

    #[test]
    fn question_bank_returns_what_it_has() {
        let bank = QuestionBank::parse(BANK);
        let questions = bank.generate_questions(&[], 10).expect("questions");
        assert_eq!(questions.len(), 3);
    }

    #[test]
    fn recorded_assessments_score_from_analysis() {
        let csv = "name,email,link,transcript,analysis\n\
Ada,ada@example.com,https://drive.example/ada,Hello there,\"Score: 8\nStrengths: clear\"\n\
Bob,bob@example.com,https://drive.example/bob,Hi,No numeric verdict\n";

        let (analyzer, submissions) =
            RecordedAssessments::from_csv(csv.as_bytes()).expect("csv parses");
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].email, "ada@example.com");

        let ada = analyzer
            .transcribe_and_score("https://drive.example/ada")
            .expect("ada assessed");
        assert_eq!(ada.score, 8);
        assert_eq!(ada.transcript, "Hello there");

        let bob = analyzer
            .transcribe_and_score("https://drive.example/bob")
            .expect("bob assessed");
        assert_eq!(bob.score, 5);

        assert!(matches!(
            analyzer.transcribe_and_score("https://drive.example/unknown"),
            Err(AnalysisError::InvalidLink(_))
        ));
    }

    #[test]
    fn quiz_export_rows_become_submissions() {
        let csv = "Name,Email,Q1,Q2,Q3\nAda,ada@example.com,A, b ,C\nBob,bob@example.com,D\n";

        let submissions = quiz_submissions_from_csv(csv.as_bytes()).expect("csv parses");

        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].responses, vec!["A", "b", "C"]);
        assert_eq!(submissions[1].name, "Bob");
        assert_eq!(submissions[1].responses, vec!["D"]);
    }

    #[test]
    fn tracing_notifier_counts_deliveries() {
        let notifier = TracingNotifier::default();
        notifier
            .notify(Notification {
                recipient: Candidate::new("Ada", "ada@example.com"),
                kind: NotificationKind::SpeechInvite,
                details: BTreeMap::new(),
            })
            .expect("delivered");
        assert_eq!(notifier.delivered(), 1);
    }
}
