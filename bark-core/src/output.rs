//! Streaming CSV output for decoded particle data.
//!
//! [`CsvCollector`] is a [`Collector`] that writes every particle as one CSV
//! line while the file is being read, so nothing is accumulated in memory.

use crate::collector::{Collector, ScanOutcome};
use crate::plan::ProjectionPlan;
use crate::types::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output writing.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Parses a comma-separated quantity list such as `"pdg, p0,pz"`.
///
/// Names are trimmed and kept in the given order. Empty entries and
/// duplicates are rejected.
pub fn parse_quantity_list(s: &str) -> Result<Vec<String>, OutputError> {
    let mut names: Vec<String> = Vec::new();
    for part in s.split(',') {
        let name = part.trim();
        if name.is_empty() {
            return Err(OutputError::InvalidFormat(format!(
                "Empty quantity name in {:?}",
                s
            )));
        }
        if names.iter().any(|n| n == name) {
            return Err(OutputError::InvalidFormat(format!(
                "Duplicate quantity: {}",
                name
            )));
        }
        names.push(name.to_string());
    }
    Ok(names)
}

/// Writes one CSV line per particle: `event,<quantities...>`.
///
/// Columns follow the order given at construction, regardless of the order
/// the members have on disk. Write errors cannot surface through the
/// [`Collector`] methods; the first one is kept and returned by
/// [`CsvCollector::finish_writing`]. Lines already written for an event that
/// is cut off by a truncated file stay in the output.
///
/// Every column must be decoded by the scan; otherwise no row could ever be
/// completed and `finish_writing` reports the missing names.
pub struct CsvCollector<W: Write> {
    writer: BufWriter<W>,
    names: Vec<String>,
    positions: HashMap<String, usize>,
    row: Vec<Option<Value>>,
    filled: usize,
    event: u64,
    rows: u64,
    error: Option<io::Error>,
    undecoded: Vec<String>,
}

impl<W: Write> CsvCollector<W> {
    /// Creates a CSV collector for the given columns.
    pub fn new<S: AsRef<str>>(writer: W, names: &[S]) -> Self {
        let mut ordered: Vec<String> = Vec::with_capacity(names.len());
        let mut positions = HashMap::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if !positions.contains_key(name) {
                positions.insert(name.to_string(), ordered.len());
                ordered.push(name.to_string());
            }
        }

        Self {
            writer: BufWriter::new(writer),
            row: vec![None; ordered.len()],
            names: ordered,
            positions,
            filled: 0,
            event: 0,
            rows: 0,
            error: None,
            undecoded: Vec::new(),
        }
    }

    /// Writes the column header line.
    pub fn write_header(&mut self) -> Result<(), OutputError> {
        write!(self.writer, "event")?;
        for name in &self.names {
            write!(self.writer, ",{}", name)?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    /// Number of particle lines written so far.
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Flushes the output and returns the inner writer, or the first error hit
    /// while writing.
    pub fn finish_writing(mut self) -> Result<W, OutputError> {
        if !self.undecoded.is_empty() {
            return Err(OutputError::InvalidFormat(format!(
                "Columns not decoded by the scan: {}",
                self.undecoded.join(", ")
            )));
        }
        if let Some(err) = self.error.take() {
            return Err(err.into());
        }
        self.writer
            .into_inner()
            .map_err(|e| OutputError::Io(e.into_error()))
    }

    #[inline]
    fn store(&mut self, name: &str, value: Value) {
        let Some(&pos) = self.positions.get(name) else {
            return;
        };
        if self.row[pos].replace(value).is_none() {
            self.filled += 1;
        }
        if self.filled == self.row.len() {
            if let Err(err) = self.write_row() {
                self.error.get_or_insert(err);
            }
            self.row.iter_mut().for_each(|v| *v = None);
            self.filled = 0;
        }
    }

    fn write_row(&mut self) -> io::Result<()> {
        if self.error.is_some() {
            return Ok(());
        }
        write!(self.writer, "{}", self.event)?;
        for value in self.row.iter().flatten() {
            write!(self.writer, ",{}", value)?;
        }
        writeln!(self.writer)?;
        self.rows += 1;
        Ok(())
    }
}

impl<W: Write> Collector for CsvCollector<W> {
    fn begin(&mut self, plan: &ProjectionPlan) {
        let decoded: Vec<&str> = plan.decoded_names().collect();
        self.undecoded = self
            .names
            .iter()
            .filter(|name| !decoded.contains(&name.as_str()))
            .cloned()
            .collect();
        if !self.undecoded.is_empty() {
            log::warn!(
                "CSV columns {:?} are not decoded, no rows will be written",
                self.undecoded
            );
        }
    }

    fn receive_int(&mut self, name: &str, value: i64) {
        self.store(name, Value::Int(value));
    }

    fn receive_double(&mut self, name: &str, value: f64) {
        self.store(name, Value::Double(value));
    }

    fn end_event(&mut self, _particles: u64) {
        self.event += 1;
    }

    fn finish(&mut self, _outcome: ScanOutcome) {
        self.row.iter_mut().for_each(|v| *v = None);
        self.filled = 0;
        if let Err(err) = self.writer.flush() {
            self.error.get_or_insert(err);
        }
    }
}

/// Creates a CSV collector writing to a new file at `path`, header included.
pub fn csv_file<P: AsRef<Path>, S: AsRef<str>>(
    path: P,
    names: &[S],
) -> Result<CsvCollector<File>, OutputError> {
    let file = File::create(path)?;
    let mut collector = CsvCollector::new(file, names);
    collector.write_header()?;
    Ok(collector)
}
