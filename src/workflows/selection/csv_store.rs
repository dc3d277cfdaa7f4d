use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tempfile::NamedTempFile;
use tracing::debug;

use super::store::{overwrite_rows, Row, RowRange, StoreError, Table, TabularStore};

/// Directory-backed store keeping one CSV file per table.
///
/// Files are rewritten whole on every mutation through a rename, so a failed write leaves the
/// previous file intact. A missing file reads as an empty table.
#[derive(Debug)]
pub struct CsvTabularStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvTabularStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, table: Table) -> PathBuf {
        self.root.join(format!("{}.csv", table.slug()))
    }

    fn load(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        let path = self.path_for(table);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    /// Write `rows` to a temp file beside the table and rename it into place, so readers see
    /// either the old file or the new one.
    fn persist(&self, table: Table, rows: &[Row]) -> Result<(), StoreError> {
        let path = self.path_for(table);
        let mut staged = NamedTempFile::new_in(&self.root)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_writer(staged.as_file_mut());
            for row in rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        staged.persist(&path).map_err(|err| err.error)?;

        debug!(table = table.slug(), rows = rows.len(), path = %path.display(), "table persisted");
        Ok(())
    }

    fn locked(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("csv store lock poisoned".to_string()))
    }

    fn mutate(&self, table: Table, apply: impl FnOnce(&mut Vec<Row>)) -> Result<(), StoreError> {
        let _guard = self.locked()?;
        let mut rows = self.load(table)?;
        apply(&mut rows);
        self.persist(table, &rows)
    }
}

impl TabularStore for CsvTabularStore {
    fn read_rows(&self, table: Table, range: RowRange) -> Result<Vec<Row>, StoreError> {
        let rows = self.load(table)?;
        Ok(range.slice(&rows).to_vec())
    }

    fn write_rows(&self, table: Table, rows: &[Row], start: usize) -> Result<(), StoreError> {
        self.mutate(table, |existing| overwrite_rows(existing, rows, start))
    }

    fn append_rows(&self, table: Table, rows: &[Row]) -> Result<(), StoreError> {
        self.mutate(table, |existing| existing.extend_from_slice(rows))
    }

    fn replace_rows(&self, table: Table, rows: &[Row]) -> Result<(), StoreError> {
        let _guard = self.locked()?;
        self.persist(table, rows)
    }

    fn clear_table(&self, table: Table) -> Result<(), StoreError> {
        self.mutate(table, Vec::clear)
    }
}
