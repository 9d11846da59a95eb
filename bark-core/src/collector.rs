//! Sinks for decoded particle data.
//!
//! The reader only ever pushes into a [`Collector`]: decoded values, event
//! boundaries and, at the end, whether the scan completed. What happens to the
//! data (accumulation, streaming to disk, filtering) is up to the implementation.

use crate::plan::ProjectionPlan;
use crate::types::{Value, ValueKind};
use std::collections::HashMap;
use thiserror::Error;

/// How a scan ended, as reported to [`Collector::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The whole file was read
    Complete,
    /// The scan stopped early (truncated file, I/O failure or cancellation).
    /// Everything received before the last `end_event` is valid.
    Incomplete,
}

/// Push-only receiver of decoded values.
///
/// Within one record, values arrive in on-disk order. `end_event` is called
/// once per event, after all of that event's records.
pub trait Collector {
    /// Called once before the first event with the plan the scan decodes by.
    fn begin(&mut self, _plan: &ProjectionPlan) {}

    /// Receives one integer member of the current record.
    fn receive_int(&mut self, name: &str, value: i64);

    /// Receives one floating-point member of the current record.
    fn receive_double(&mut self, name: &str, value: f64);

    /// Closes the current event, which held `particles` records.
    fn end_event(&mut self, particles: u64);

    /// Called once when the scan stops, after the last `end_event`.
    fn finish(&mut self, _outcome: ScanOutcome) {}

    /// Receives a value of either kind.
    fn receive(&mut self, name: &str, value: Value) {
        match value {
            Value::Int(v) => self.receive_int(name, v),
            Value::Double(v) => self.receive_double(name, v),
        }
    }
}

impl<C: Collector + ?Sized> Collector for Box<C> {
    fn begin(&mut self, plan: &ProjectionPlan) {
        (**self).begin(plan)
    }

    fn receive_int(&mut self, name: &str, value: i64) {
        (**self).receive_int(name, value)
    }

    fn receive_double(&mut self, name: &str, value: f64) {
        (**self).receive_double(name, value)
    }

    fn end_event(&mut self, particles: u64) {
        (**self).end_event(particles)
    }

    fn finish(&mut self, outcome: ScanOutcome) {
        (**self).finish(outcome)
    }
}

/// Errors returned when reading back collected columns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    #[error("Columns are not ready: no scan has finished")]
    NotReady,

    #[error("Quantity {0} was not collected")]
    UnknownQuantity(String),

    #[error("Quantity {name} holds {actual} values, not {requested}")]
    TypeMismatch {
        name: String,
        requested: ValueKind,
        actual: ValueKind,
    },
}

/// Values of one quantity across all particles of a file.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Named up front but never bound to a decoded member
    Empty,
    Int(Vec<i64>),
    Double(Vec<f64>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Int(v) => v.len(),
            Self::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kind of the stored values, `None` while the column is still empty.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Empty => None,
            Self::Int(_) => Some(ValueKind::Int),
            Self::Double(_) => Some(ValueKind::Double),
        }
    }

    fn empty_of(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int => Self::Int(Vec::new()),
            ValueKind::Double => Self::Double(Vec::new()),
        }
    }

    fn truncate(&mut self, len: usize) {
        match self {
            Self::Empty => {}
            Self::Int(v) => v.truncate(len),
            Self::Double(v) => v.truncate(len),
        }
    }
}

#[derive(Debug)]
struct Column {
    name: String,
    data: ColumnData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Collecting,
    Finished(ScanOutcome),
}

/// Accumulates every received quantity into its own contiguous buffer.
///
/// Values land in append-only vectors indexed by the global particle index,
/// and the particle count of every event is kept in a separate ledger. The
/// buffers can be read back once the scan has finished, completely or not.
///
/// When driven by a [`Reader`](crate::Reader), every decoded quantity gets a
/// typed column before the first event, so requested quantities are present
/// even if the file holds no particles.
///
/// # Example
///
/// ```no_run
/// use bark_core::{ColumnarCollector, Reader};
///
/// let mut columns = ColumnarCollector::with_quantities(&["pdg", "pz"]);
/// Reader::open("particles.bin")?.read(&["pdg", "pz"], &mut columns)?;
///
/// let pdg = columns.int_column("pdg")?;
/// let pz = columns.double_column("pz")?;
/// assert_eq!(pdg.len(), pz.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct ColumnarCollector {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    // Values arrive in the same cyclic order for every record, so the next
    // column is almost always the one after the last.
    cursor: usize,
    event_sizes: Vec<u64>,
    state: State,
}

impl Default for ColumnarCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnarCollector {
    /// Creates a collector whose columns follow the scan's projection plan.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            index: HashMap::new(),
            cursor: 0,
            event_sizes: Vec::new(),
            state: State::Collecting,
        }
    }

    /// Creates a collector with one (empty) column per name up front, in the
    /// given order.
    ///
    /// Quantities that never receive a value still read back as empty columns.
    pub fn with_quantities<S: AsRef<str>>(names: &[S]) -> Self {
        let mut collector = Self::new();
        for name in names {
            collector.column_index(name.as_ref());
        }
        collector
    }

    fn column_index(&mut self, name: &str) -> usize {
        if let Some(column) = self.columns.get(self.cursor) {
            if column.name == name {
                return self.cursor;
            }
        }
        match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                let idx = self.columns.len();
                self.columns.push(Column {
                    name: name.to_string(),
                    data: ColumnData::Empty,
                });
                self.index.insert(name.to_string(), idx);
                idx
            }
        }
    }

    fn advance(&mut self, idx: usize) {
        self.cursor = if idx + 1 == self.columns.len() { 0 } else { idx + 1 };
    }

    fn check_ready(&self) -> Result<(), CollectorError> {
        match self.state {
            State::Collecting => Err(CollectorError::NotReady),
            State::Finished(_) => Ok(()),
        }
    }

    fn column(&self, name: &str) -> Result<&ColumnData, CollectorError> {
        self.check_ready()?;
        self.index
            .get(name)
            .map(|&idx| &self.columns[idx].data)
            .ok_or_else(|| CollectorError::UnknownQuantity(name.to_string()))
    }

    /// Integer values of `name`, one per particle in file order.
    pub fn int_column(&self, name: &str) -> Result<&[i64], CollectorError> {
        match self.column(name)? {
            ColumnData::Empty => Ok(&[]),
            ColumnData::Int(values) => Ok(values),
            ColumnData::Double(_) => Err(CollectorError::TypeMismatch {
                name: name.to_string(),
                requested: ValueKind::Int,
                actual: ValueKind::Double,
            }),
        }
    }

    /// Floating-point values of `name`, one per particle in file order.
    pub fn double_column(&self, name: &str) -> Result<&[f64], CollectorError> {
        match self.column(name)? {
            ColumnData::Empty => Ok(&[]),
            ColumnData::Double(values) => Ok(values),
            ColumnData::Int(_) => Err(CollectorError::TypeMismatch {
                name: name.to_string(),
                requested: ValueKind::Double,
                actual: ValueKind::Int,
            }),
        }
    }

    /// Number of particles in each event, in file order.
    pub fn event_sizes(&self) -> Result<&[u64], CollectorError> {
        self.check_ready()?;
        Ok(&self.event_sizes)
    }

    /// Total particles over all closed events.
    pub fn particle_count(&self) -> u64 {
        self.event_sizes
            .iter()
            .fold(0u64, |total, &n| total.saturating_add(n))
    }

    /// Names of the collected quantities, in the order the columns were created.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Whether the last scan reached the end of the file.
    pub fn is_complete(&self) -> bool {
        self.state == State::Finished(ScanOutcome::Complete)
    }

    /// Hands over the buffers as `(name -> column, event sizes)`.
    pub fn into_columns(self) -> Result<(HashMap<String, ColumnData>, Vec<u64>), CollectorError> {
        self.check_ready()?;
        let columns = self
            .columns
            .into_iter()
            .map(|column| (column.name, column.data))
            .collect();
        Ok((columns, self.event_sizes))
    }
}

impl Collector for ColumnarCollector {
    fn begin(&mut self, plan: &ProjectionPlan) {
        for field in plan.decoded_fields() {
            let idx = self.column_index(&field.name);
            let data = &mut self.columns[idx].data;
            if matches!(data, ColumnData::Empty) {
                *data = ColumnData::empty_of(field.encoding.kind());
            }
        }
        self.cursor = 0;
        self.state = State::Collecting;
    }

    #[inline]
    fn receive_int(&mut self, name: &str, value: i64) {
        let idx = self.column_index(name);
        let data = &mut self.columns[idx].data;
        match data {
            ColumnData::Int(values) => values.push(value),
            ColumnData::Empty => *data = ColumnData::Int(vec![value]),
            ColumnData::Double(_) => {
                log::warn!("Dropping integer value for double column {}", name);
            }
        }
        self.advance(idx);
    }

    #[inline]
    fn receive_double(&mut self, name: &str, value: f64) {
        let idx = self.column_index(name);
        let data = &mut self.columns[idx].data;
        match data {
            ColumnData::Double(values) => values.push(value),
            ColumnData::Empty => *data = ColumnData::Double(vec![value]),
            ColumnData::Int(_) => {
                log::warn!("Dropping double value for integer column {}", name);
            }
        }
        self.advance(idx);
    }

    fn end_event(&mut self, particles: u64) {
        self.event_sizes.push(particles);
    }

    fn finish(&mut self, outcome: ScanOutcome) {
        if outcome == ScanOutcome::Incomplete {
            // Drop the records of an event that never closed.
            let complete = usize::try_from(self.particle_count()).unwrap_or(usize::MAX);
            for column in &mut self.columns {
                column.data.truncate(complete);
            }
        }
        self.cursor = 0;
        self.state = State::Finished(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Encoding, QuantityDef, Schema};

    fn push_particle(collector: &mut ColumnarCollector, pdg: i64, pz: f64) {
        collector.receive_int("pdg", pdg);
        collector.receive_double("pz", pz);
    }

    #[test]
    fn test_not_ready_before_finish() {
        let mut collector = ColumnarCollector::with_quantities(&["pdg"]);
        collector.receive_int("pdg", 211);
        collector.end_event(1);

        assert_eq!(collector.int_column("pdg"), Err(CollectorError::NotReady));
        assert_eq!(collector.event_sizes(), Err(CollectorError::NotReady));
        assert!(!collector.is_complete());
    }

    #[test]
    fn test_collects_columns_and_event_sizes() {
        let mut collector = ColumnarCollector::new();
        push_particle(&mut collector, 211, 0.5);
        push_particle(&mut collector, -211, -0.5);
        collector.end_event(2);
        collector.end_event(0);
        push_particle(&mut collector, 2212, 1.25);
        collector.end_event(1);
        collector.finish(ScanOutcome::Complete);

        assert!(collector.is_complete());
        assert_eq!(collector.int_column("pdg").unwrap(), &[211, -211, 2212]);
        assert_eq!(collector.double_column("pz").unwrap(), &[0.5, -0.5, 1.25]);
        assert_eq!(collector.event_sizes().unwrap(), &[2, 0, 1]);
        assert_eq!(collector.particle_count(), 3);
    }

    #[test]
    fn test_requested_but_unseen_is_empty() {
        let mut collector = ColumnarCollector::with_quantities(&["pdg", "mass"]);
        collector.finish(ScanOutcome::Complete);

        assert_eq!(collector.int_column("pdg").unwrap(), &[] as &[i64]);
        assert_eq!(collector.double_column("mass").unwrap(), &[] as &[f64]);
        assert_eq!(collector.event_sizes().unwrap(), &[] as &[u64]);
    }

    #[test]
    fn test_begin_creates_typed_columns() {
        let schema = Schema::new(vec![
            QuantityDef::new("pz", Encoding::F64),
            QuantityDef::new("mass", Encoding::F64),
            QuantityDef::new("pdg", Encoding::I32),
        ])
        .unwrap();
        let plan = ProjectionPlan::build(&schema, &["pdg", "pz"]).unwrap();

        let mut collector = ColumnarCollector::new();
        collector.begin(&plan);
        collector.finish(ScanOutcome::Complete);

        let names: Vec<&str> = collector.names().collect();
        assert_eq!(names, vec!["pz", "pdg"]);
        assert_eq!(collector.int_column("pdg").unwrap(), &[] as &[i64]);
        assert_eq!(collector.double_column("pz").unwrap(), &[] as &[f64]);
        assert!(matches!(
            collector.double_column("pdg"),
            Err(CollectorError::TypeMismatch { .. })
        ));
        assert!(matches!(
            collector.int_column("pz"),
            Err(CollectorError::TypeMismatch { .. })
        ));
        assert_eq!(
            collector.int_column("mass"),
            Err(CollectorError::UnknownQuantity("mass".to_string()))
        );
    }

    #[test]
    fn test_particle_count_saturates() {
        let mut collector = ColumnarCollector::new();
        collector.end_event(u64::MAX);
        collector.end_event(u64::MAX);
        collector.finish(ScanOutcome::Incomplete);

        assert_eq!(collector.particle_count(), u64::MAX);
        assert_eq!(collector.event_sizes().unwrap(), &[u64::MAX, u64::MAX]);
    }

    #[test]
    fn test_unknown_and_mismatched_names() {
        let mut collector = ColumnarCollector::new();
        push_particle(&mut collector, 22, 3.0);
        collector.end_event(1);
        collector.finish(ScanOutcome::Complete);

        assert_eq!(
            collector.int_column("ncoll"),
            Err(CollectorError::UnknownQuantity("ncoll".to_string()))
        );
        assert!(matches!(
            collector.double_column("pdg"),
            Err(CollectorError::TypeMismatch { .. })
        ));
        assert!(matches!(
            collector.int_column("pz"),
            Err(CollectorError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_incomplete_drops_open_event() {
        let mut collector = ColumnarCollector::with_quantities(&["pdg", "pz"]);
        push_particle(&mut collector, 1, 1.0);
        collector.end_event(1);
        push_particle(&mut collector, 2, 2.0);
        collector.receive_int("pdg", 3);
        collector.finish(ScanOutcome::Incomplete);

        assert!(!collector.is_complete());
        assert_eq!(collector.int_column("pdg").unwrap(), &[1]);
        assert_eq!(collector.double_column("pz").unwrap(), &[1.0]);
        assert_eq!(collector.event_sizes().unwrap(), &[1]);
    }

    #[test]
    fn test_out_of_order_names() {
        let mut collector = ColumnarCollector::with_quantities(&["c", "b", "a"]);
        for i in 0..3 {
            collector.receive_int("a", i);
            collector.receive_int("b", i * 10);
            collector.receive_int("c", i * 100);
        }
        collector.end_event(3);
        collector.finish(ScanOutcome::Complete);

        assert_eq!(collector.int_column("a").unwrap(), &[0, 1, 2]);
        assert_eq!(collector.int_column("b").unwrap(), &[0, 10, 20]);
        assert_eq!(collector.int_column("c").unwrap(), &[0, 100, 200]);
        let names: Vec<&str> = collector.names().collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_into_columns() {
        let mut collector = ColumnarCollector::new();
        push_particle(&mut collector, 130, 0.0);
        collector.end_event(1);
        assert_eq!(
            ColumnarCollector::new().into_columns().unwrap_err(),
            CollectorError::NotReady
        );
        collector.finish(ScanOutcome::Complete);

        let (columns, sizes) = collector.into_columns().unwrap();
        assert_eq!(sizes, vec![1]);
        assert_eq!(columns["pdg"], ColumnData::Int(vec![130]));
        assert_eq!(columns["pz"], ColumnData::Double(vec![0.0]));
    }

    #[test]
    fn test_boxed_dyn_collector() {
        let mut boxed: Box<dyn Collector> = Box::new(ColumnarCollector::new());
        boxed.receive("pdg", Value::Int(11));
        boxed.receive("pz", Value::Double(-1.0));
        boxed.end_event(1);
        boxed.finish(ScanOutcome::Complete);
    }
}
