//! Typed access to the stage tables.
//!
//! Rows are decoded once on read and encoded once on write; nothing above this module handles
//! raw cells. Malformed numeric cells decode as zero and short rows are skipped.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::domain::{
    AnswerEntry, Candidate, CandidateKey, Disposition, FinalRecord, OptionLetter, QuizRecord,
    QuizStatus, ShortlistEntry, SpeechRecord,
};
use super::stage::StageCounts;
use super::store::{Row, RowRange, StoreError, Table, TabularStore};

pub struct SelectionRepository<S> {
    store: Arc<S>,
}

impl<S> Clone for SelectionRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> SelectionRepository<S>
where
    S: TabularStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Write the header row into every table that is still empty, returning those tables.
    pub fn ensure_tables(&self) -> Result<Vec<Table>, StoreError> {
        let mut created = Vec::new();
        for table in Table::ALL {
            if self.ensure_header(table)? {
                created.push(table);
            }
        }
        if !created.is_empty() {
            info!(tables = ?created, "initialised stage tables");
        }
        Ok(created)
    }

    /// Drop every row of `table` and restore its header.
    pub fn reset(&self, table: Table) -> Result<(), StoreError> {
        self.replace(table, Vec::new())?;
        info!(table = table.slug(), "table reset");
        Ok(())
    }

    pub fn answer_key(&self) -> Result<Vec<AnswerEntry>, StoreError> {
        Ok(self
            .data_rows(Table::QuizQuestions)?
            .iter()
            .filter_map(|row| decode_question(row))
            .collect())
    }

    pub fn replace_questions(&self, entries: &[AnswerEntry]) -> Result<(), StoreError> {
        self.replace(Table::QuizQuestions, entries.iter().map(encode_question).collect())
    }

    /// Every stored quiz row in insertion order, duplicates included.
    pub fn quiz_records(&self) -> Result<Vec<QuizRecord>, StoreError> {
        Ok(self
            .data_rows(Table::StudentData)?
            .iter()
            .filter_map(|row| decode_quiz_record(row))
            .collect())
    }

    /// One quiz record per candidate: the most recent write wins, first appearance keeps order.
    pub fn latest_quiz_records(&self) -> Result<Vec<QuizRecord>, StoreError> {
        Ok(latest_by_key(self.quiz_records()?, QuizRecord::key))
    }

    /// Persist graded records. A record for a candidate whose stored row is still PENDING
    /// replaces that row; every other record is appended.
    pub fn save_quiz_records(&self, records: &[QuizRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let (offset, stored) = self.load(Table::StudentData)?;
        let pending_rows: HashMap<CandidateKey, usize> = stored
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                let record = decode_quiz_record(row)?;
                if record.status != QuizStatus::Pending {
                    return None;
                }
                record.key().map(|key| (key, index + offset))
            })
            .collect();

        let mut appended = Vec::new();
        let mut replaced = 0usize;
        for record in records {
            let target = record.key().and_then(|key| pending_rows.get(&key).copied());
            match target {
                Some(index) => {
                    self.store
                        .write_rows(Table::StudentData, &[encode_quiz_record(record)], index)?;
                    replaced += 1;
                }
                None => appended.push(encode_quiz_record(record)),
            }
        }

        if !appended.is_empty() {
            self.ensure_header(Table::StudentData)?;
            self.store.append_rows(Table::StudentData, &appended)?;
        }

        debug!(replaced, appended = appended.len(), "quiz records saved");
        Ok(())
    }

    pub fn shortlist(&self) -> Result<Vec<ShortlistEntry>, StoreError> {
        Ok(self
            .data_rows(Table::Shortlist)?
            .iter()
            .filter_map(|row| decode_shortlist_entry(row))
            .collect())
    }

    pub fn replace_shortlist(&self, entries: &[ShortlistEntry]) -> Result<(), StoreError> {
        self.replace(Table::Shortlist, entries.iter().map(encode_shortlist_entry).collect())
    }

    /// One speech record per candidate, latest write wins.
    pub fn speech_records(&self) -> Result<Vec<SpeechRecord>, StoreError> {
        let records = self
            .data_rows(Table::SpeechSubmissions)?
            .iter()
            .filter_map(|row| decode_speech_record(row))
            .collect();
        Ok(latest_by_key(records, SpeechRecord::key))
    }

    /// Overwrite the candidate's existing speech row or append a new one.
    pub fn upsert_speech_record(&self, record: &SpeechRecord) -> Result<(), StoreError> {
        let key = record.key();
        let (offset, stored) = self.load(Table::SpeechSubmissions)?;
        let existing = stored.iter().position(|row| {
            key.is_some() && decode_speech_record(row).and_then(|stored| stored.key()) == key
        });

        let row = encode_speech_record(record);
        match existing {
            Some(index) => self
                .store
                .write_rows(Table::SpeechSubmissions, &[row], index + offset),
            None => {
                self.ensure_header(Table::SpeechSubmissions)?;
                self.store.append_rows(Table::SpeechSubmissions, &[row])
            }
        }
    }

    pub fn final_results(&self) -> Result<Vec<FinalRecord>, StoreError> {
        Ok(self
            .data_rows(Table::FinalResults)?
            .iter()
            .filter_map(|row| decode_final_record(row))
            .collect())
    }

    pub fn replace_final_results(&self, records: &[FinalRecord]) -> Result<(), StoreError> {
        self.replace(Table::FinalResults, records.iter().map(encode_final_record).collect())
    }

    pub fn counts(&self) -> Result<StageCounts, StoreError> {
        Ok(StageCounts {
            questions: self.answer_key()?.len(),
            quiz_records: self.quiz_records()?.len(),
            speech_records: self.speech_records()?.len(),
            final_records: self.final_results()?.len(),
        })
    }

    fn data_rows(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        self.load(table).map(|(_, rows)| rows)
    }

    /// Data rows plus the store index of the first one (1 when a header row is present).
    fn load(&self, table: Table) -> Result<(usize, Vec<Row>), StoreError> {
        let mut rows = self.store.read_rows(table, RowRange::all())?;
        if rows.first().is_some_and(|row| is_header(table, row)) {
            rows.remove(0);
            Ok((1, rows))
        } else {
            Ok((0, rows))
        }
    }

    fn ensure_header(&self, table: Table) -> Result<bool, StoreError> {
        let first = self.store.read_rows(table, RowRange::span(0, 1))?;
        if first.is_empty() {
            self.store.write_rows(table, &[table.header_row()], 0)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn replace(&self, table: Table, rows: Vec<Row>) -> Result<(), StoreError> {
        let mut contents = Vec::with_capacity(rows.len() + 1);
        contents.push(table.header_row());
        contents.extend(rows);

        self.store.replace_rows(table, &contents)
    }
}

fn is_header(table: Table, row: &Row) -> bool {
    match (row.first(), table.headers().first()) {
        (Some(cell), Some(header)) => cell.trim().eq_ignore_ascii_case(header),
        _ => false,
    }
}

fn latest_by_key<T>(records: Vec<T>, key: impl Fn(&T) -> Option<CandidateKey>) -> Vec<T> {
    let mut positions: HashMap<CandidateKey, usize> = HashMap::new();
    let mut latest: Vec<T> = Vec::new();

    for record in records {
        let Some(candidate_key) = key(&record) else {
            continue;
        };
        match positions.get(&candidate_key) {
            Some(&index) => latest[index] = record,
            None => {
                positions.insert(candidate_key, latest.len());
                latest.push(record);
            }
        }
    }

    latest
}

fn cell(row: &Row, index: usize) -> &str {
    row.get(index).map(|value| value.trim()).unwrap_or("")
}

fn parse_count(raw: &str) -> u32 {
    raw.trim().parse().unwrap_or(0)
}

fn encode_question(entry: &AnswerEntry) -> Row {
    let mut row = vec![entry.question.clone()];
    row.extend(entry.options.iter().cloned());
    row.push(entry.correct.label().to_string());
    row
}

fn decode_question(row: &Row) -> Option<AnswerEntry> {
    if row.len() < 6 {
        return None;
    }
    Some(AnswerEntry {
        question: cell(row, 0).to_string(),
        options: [
            cell(row, 1).to_string(),
            cell(row, 2).to_string(),
            cell(row, 3).to_string(),
            cell(row, 4).to_string(),
        ],
        correct: OptionLetter::parse(cell(row, 5))?,
    })
}

fn encode_quiz_record(record: &QuizRecord) -> Row {
    vec![
        record.candidate.name.clone(),
        record.candidate.email.clone(),
        record.score.to_string(),
        record.responses.clone(),
        record.status.label().to_string(),
    ]
}

fn decode_quiz_record(row: &Row) -> Option<QuizRecord> {
    if row.len() < 3 {
        return None;
    }
    Some(QuizRecord {
        candidate: Candidate::new(cell(row, 0), cell(row, 1)),
        score: parse_count(cell(row, 2)),
        responses: cell(row, 3).to_string(),
        status: QuizStatus::parse(cell(row, 4)),
    })
}

fn encode_shortlist_entry(entry: &ShortlistEntry) -> Row {
    vec![
        entry.candidate.name.clone(),
        entry.candidate.email.clone(),
        entry.quiz_score.to_string(),
        entry.notified.to_string(),
    ]
}

fn decode_shortlist_entry(row: &Row) -> Option<ShortlistEntry> {
    if row.len() < 3 {
        return None;
    }
    Some(ShortlistEntry {
        candidate: Candidate::new(cell(row, 0), cell(row, 1)),
        quiz_score: parse_count(cell(row, 2)),
        notified: cell(row, 3).eq_ignore_ascii_case("true"),
    })
}

fn encode_speech_record(record: &SpeechRecord) -> Row {
    vec![
        record.candidate.name.clone(),
        record.candidate.email.clone(),
        record.submission_link.clone(),
        record.transcript.clone(),
        record.score.to_string(),
        record.analysis.clone(),
    ]
}

fn decode_speech_record(row: &Row) -> Option<SpeechRecord> {
    // Rows without a link are placeholders, not processed submissions.
    if row.len() < 5 || cell(row, 2).is_empty() {
        return None;
    }
    Some(SpeechRecord {
        candidate: Candidate::new(cell(row, 0), cell(row, 1)),
        submission_link: cell(row, 2).to_string(),
        transcript: cell(row, 3).to_string(),
        score: parse_count(cell(row, 4)),
        analysis: cell(row, 5).to_string(),
    })
}

fn encode_final_record(record: &FinalRecord) -> Row {
    vec![
        record.candidate.name.clone(),
        record.candidate.email.clone(),
        record.quiz_score.to_string(),
        record.speech_score.to_string(),
        format!("{:.1}", record.composite_score),
        record.disposition.label().to_string(),
    ]
}

fn decode_final_record(row: &Row) -> Option<FinalRecord> {
    if row.len() < 6 {
        return None;
    }
    Some(FinalRecord {
        candidate: Candidate::new(cell(row, 0), cell(row, 1)),
        quiz_score: parse_count(cell(row, 2)),
        speech_score: parse_count(cell(row, 3)),
        composite_score: cell(row, 4).parse().unwrap_or(0.0),
        disposition: Disposition::parse(cell(row, 5)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::selection::store::MemoryTabularStore;

    fn repository() -> (SelectionRepository<MemoryTabularStore>, Arc<MemoryTabularStore>) {
        let store = Arc::new(MemoryTabularStore::default());
        (SelectionRepository::new(store.clone()), store)
    }

    fn quiz(name: &str, email: &str, score: u32, status: QuizStatus) -> QuizRecord {
        QuizRecord {
            candidate: Candidate::new(name, email),
            score,
            responses: String::new(),
            status,
        }
    }

    fn cells(values: &[&str]) -> Row {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn ensure_tables_writes_headers_once() {
        let (repository, store) = repository();
        let created = repository.ensure_tables().expect("tables created");
        assert_eq!(created.len(), Table::ALL.len());
        assert!(repository.ensure_tables().expect("idempotent").is_empty());

        let rows = store
            .read_rows(Table::FinalResults, RowRange::all())
            .expect("read");
        assert_eq!(rows, vec![Table::FinalResults.header_row()]);
        assert_eq!(repository.counts().expect("counts"), StageCounts::default());
    }

    #[test]
    fn malformed_rows_decode_to_defaults() {
        let (repository, store) = repository();
        store
            .append_rows(
                Table::StudentData,
                &[
                    Table::StudentData.header_row(),
                    cells(&["Ada", "ada@example.com", "seven", "", "PASSED"]),
                    cells(&["short"]),
                    cells(&["Bob", "bob@example.com", "4"]),
                ],
            )
            .expect("seed");

        let records = repository.quiz_records().expect("decode");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].score, 0);
        assert_eq!(records[0].status, QuizStatus::Passed);
        assert_eq!(records[1].status, QuizStatus::Pending);
    }

    #[test]
    fn rows_without_header_are_still_read() {
        let (repository, store) = repository();
        store
            .append_rows(
                Table::QuizQuestions,
                &[cells(&["Q1", "a", "b", "c", "d", "b"])],
            )
            .expect("seed");
        let key = repository.answer_key().expect("decode");
        assert_eq!(key.len(), 1);
        assert_eq!(key[0].correct, OptionLetter::B);
    }

    #[test]
    fn grading_pending_candidate_rewrites_row_in_place() {
        let (repository, _) = repository();
        repository
            .save_quiz_records(&[
                quiz("Ada", "ada@example.com", 0, QuizStatus::Pending),
                quiz("Bob", "bob@example.com", 0, QuizStatus::Pending),
            ])
            .expect("pending saved");

        repository
            .save_quiz_records(&[quiz("Bob", "BOB@example.com", 8, QuizStatus::Passed)])
            .expect("graded saved");

        let records = repository.quiz_records().expect("read");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].status, QuizStatus::Passed);
        assert_eq!(records[1].score, 8);
        assert_eq!(records[0].status, QuizStatus::Pending);
    }

    #[test]
    fn regrading_appends_and_latest_record_wins() {
        let (repository, _) = repository();
        repository
            .save_quiz_records(&[
                quiz("Ada", "ada@example.com", 5, QuizStatus::Failed),
                quiz("Bob", "bob@example.com", 9, QuizStatus::Passed),
            ])
            .expect("saved");
        repository
            .save_quiz_records(&[quiz("Ada", "ada@example.com", 8, QuizStatus::Passed)])
            .expect("regraded");

        assert_eq!(repository.quiz_records().expect("all").len(), 3);
        let latest = repository.latest_quiz_records().expect("latest");
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].candidate.name, "Ada");
        assert_eq!(latest[0].score, 8);
        assert_eq!(latest[1].candidate.name, "Bob");
    }

    #[test]
    fn speech_upsert_overwrites_existing_candidate() {
        let (repository, store) = repository();
        let mut record = SpeechRecord {
            candidate: Candidate::new("Ada", "ada@example.com"),
            submission_link: "https://drive.example/ada-1".to_string(),
            transcript: "Hello".to_string(),
            score: 6,
            analysis: "Score: 6".to_string(),
        };
        repository.upsert_speech_record(&record).expect("insert");

        record.submission_link = "https://drive.example/ada-2".to_string();
        record.score = 9;
        repository.upsert_speech_record(&record).expect("overwrite");

        let records = repository.speech_records().expect("read");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].score, 9);
        assert_eq!(
            store
                .read_rows(Table::SpeechSubmissions, RowRange::all())
                .expect("raw")
                .len(),
            2,
            "header plus a single data row"
        );
    }

    #[test]
    fn placeholder_speech_rows_are_not_counted() {
        let (repository, store) = repository();
        store
            .append_rows(
                Table::SpeechSubmissions,
                &[
                    Table::SpeechSubmissions.header_row(),
                    cells(&["Ada", "ada@example.com", "", "", ""]),
                ],
            )
            .expect("seed");
        assert!(repository.speech_records().expect("read").is_empty());
    }

    #[test]
    fn replace_final_results_drops_previous_run() {
        let (repository, _) = repository();
        let record = |name: &str, disposition| FinalRecord {
            candidate: Candidate::new(name, format!("{}@example.com", name.to_lowercase())),
            quiz_score: 8,
            speech_score: 9,
            composite_score: 8.5,
            disposition,
        };
        repository
            .replace_final_results(&[
                record("Ada", Disposition::Selected),
                record("Bob", Disposition::NotSelected),
            ])
            .expect("first run");
        repository
            .replace_final_results(&[record("Cy", Disposition::Selected)])
            .expect("second run");

        let results = repository.final_results().expect("read");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].candidate.name, "Cy");
        assert_eq!(results[0].composite_score, 8.5);
        assert_eq!(results[0].disposition, Disposition::Selected);
    }
}
