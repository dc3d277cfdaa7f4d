use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A single tabular row; column meaning is owned by the repository codecs.
pub type Row = Vec<String>;

/// Tables backing each pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    QuizQuestions,
    StudentData,
    Shortlist,
    SpeechSubmissions,
    FinalResults,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::QuizQuestions,
        Table::StudentData,
        Table::Shortlist,
        Table::SpeechSubmissions,
        Table::FinalResults,
    ];

    pub const fn title(self) -> &'static str {
        match self {
            Table::QuizQuestions => "Quiz Questions",
            Table::StudentData => "Student Data",
            Table::Shortlist => "Shortlist",
            Table::SpeechSubmissions => "Voice Submissions",
            Table::FinalResults => "Final Results",
        }
    }

    /// File-system friendly identifier, also accepted by [`Table::parse`].
    pub const fn slug(self) -> &'static str {
        match self {
            Table::QuizQuestions => "quiz_questions",
            Table::StudentData => "student_data",
            Table::Shortlist => "shortlist",
            Table::SpeechSubmissions => "speech_submissions",
            Table::FinalResults => "final_results",
        }
    }

    pub const fn headers(self) -> &'static [&'static str] {
        match self {
            Table::QuizQuestions => &[
                "Question",
                "Option 1",
                "Option 2",
                "Option 3",
                "Option 4",
                "Correct Answer",
            ],
            Table::StudentData => &["Name", "Email", "Quiz Marks", "Quiz Responses", "Status"],
            Table::Shortlist => &["Name", "Email", "Quiz Marks", "Invitation Sent"],
            Table::SpeechSubmissions => &[
                "Name",
                "Email",
                "Voice Link",
                "Transcript",
                "Voice Score",
                "Analysis",
            ],
            Table::FinalResults => &[
                "Name",
                "Email",
                "Quiz Score",
                "Voice Score",
                "Total Score",
                "Final Status",
            ],
        }
    }

    pub fn header_row(self) -> Row {
        self.headers().iter().map(|cell| cell.to_string()).collect()
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Table::ALL.into_iter().find(|table| {
            table.slug() == normalized
                || table.title().to_ascii_lowercase().replace(' ', "_") == normalized
        })
    }
}

/// Zero-based, end-exclusive row window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl RowRange {
    pub const fn all() -> Self {
        Self {
            start: 0,
            end: None,
        }
    }

    pub const fn from(start: usize) -> Self {
        Self { start, end: None }
    }

    pub const fn span(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn slice<'a>(&self, rows: &'a [Row]) -> &'a [Row] {
        let end = self.end.unwrap_or(rows.len()).min(rows.len());
        let start = self.start.min(end);
        &rows[start..end]
    }
}

/// Storage seam for the stage tables (spreadsheet, database, or files).
pub trait TabularStore: Send + Sync {
    fn read_rows(&self, table: Table, range: RowRange) -> Result<Vec<Row>, StoreError>;

    /// Overwrite rows starting at `start`, growing the table when needed.
    fn write_rows(&self, table: Table, rows: &[Row], start: usize) -> Result<(), StoreError>;

    fn append_rows(&self, table: Table, rows: &[Row]) -> Result<(), StoreError>;

    /// Swap the whole table for `rows` in one step; a failure leaves the old rows in place.
    fn replace_rows(&self, table: Table, rows: &[Row]) -> Result<(), StoreError>;

    fn clear_table(&self, table: Table) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid table data: {0}")]
    Csv(#[from] csv::Error),
}

/// Process-local store, used by the HTTP service default wiring and by tests.
#[derive(Debug, Default)]
pub struct MemoryTabularStore {
    tables: Mutex<BTreeMap<Table, Vec<Row>>>,
}

impl MemoryTabularStore {
    fn with_tables<T>(
        &self,
        apply: impl FnOnce(&mut BTreeMap<Table, Vec<Row>>) -> T,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(apply(&mut guard))
    }
}

impl TabularStore for MemoryTabularStore {
    fn read_rows(&self, table: Table, range: RowRange) -> Result<Vec<Row>, StoreError> {
        self.with_tables(|tables| {
            tables
                .get(&table)
                .map(|rows| range.slice(rows).to_vec())
                .unwrap_or_default()
        })
    }

    fn write_rows(&self, table: Table, rows: &[Row], start: usize) -> Result<(), StoreError> {
        self.with_tables(|tables| overwrite_rows(tables.entry(table).or_default(), rows, start))
    }

    fn append_rows(&self, table: Table, rows: &[Row]) -> Result<(), StoreError> {
        self.with_tables(|tables| tables.entry(table).or_default().extend_from_slice(rows))
    }

    fn replace_rows(&self, table: Table, rows: &[Row]) -> Result<(), StoreError> {
        self.with_tables(|tables| {
            tables.insert(table, rows.to_vec());
        })
    }

    fn clear_table(&self, table: Table) -> Result<(), StoreError> {
        self.with_tables(|tables| {
            tables.remove(&table);
        })
    }
}

pub(crate) fn overwrite_rows(existing: &mut Vec<Row>, rows: &[Row], start: usize) {
    if existing.len() < start {
        existing.resize_with(start, Vec::new);
    }

    for (offset, row) in rows.iter().enumerate() {
        let index = start + offset;
        if index < existing.len() {
            existing[index] = row.clone();
        } else {
            existing.push(row.clone());
        }
    }
}
