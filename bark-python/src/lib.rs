//! Python bindings for the particle file reader with numpy column access.
//!
//! Reading happens entirely in Rust. By default the decoded columns are handed
//! to Python as numpy arrays; a Python collector object can receive the values
//! one by one instead.

use bark_core::{ColumnData, ColumnarCollector, ReadError, Reader, ScanOutcome};
use numpy::{IntoPyArray, PyArray1};
use pyo3::exceptions::{PyIOError, PyKeyError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyTuple};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

fn to_py_err(err: ReadError) -> PyErr {
    match &err {
        ReadError::Io(_) | ReadError::Truncated { .. } => {
            PyIOError::new_err(format!("Failed to read file: {}", err))
        }
        _ => PyValueError::new_err(err.to_string()),
    }
}

/// Decoded quantities of one particle file, stored column by column.
#[pyclass]
pub struct Columns {
    columns: HashMap<String, ColumnData>,
    event_sizes: Vec<u64>,
    complete: bool,
}

impl Columns {
    fn column(&self, name: &str) -> PyResult<&ColumnData> {
        self.columns
            .get(name)
            .ok_or_else(|| PyKeyError::new_err(format!("Quantity {} was not read", name)))
    }
}

#[pymethods]
impl Columns {
    /// Returns the number of particles.
    fn __len__(&self) -> usize {
        self.event_sizes.iter().sum::<u64>() as usize
    }

    /// Returns a string representation.
    fn __repr__(&self) -> String {
        let mut names: Vec<&str> = self.columns.keys().map(String::as_str).collect();
        names.sort_unstable();
        format!(
            "Columns(events={}, particles={}, quantities=[{}])",
            self.event_sizes.len(),
            self.__len__(),
            names.join(", ")
        )
    }

    /// Returns an integer quantity as a numpy int64 array.
    fn get_int_array<'py>(&self, py: Python<'py>, name: &str) -> PyResult<&'py PyArray1<i64>> {
        match self.column(name)? {
            ColumnData::Int(values) => Ok(values.clone().into_pyarray(py)),
            ColumnData::Empty => Ok(Vec::<i64>::new().into_pyarray(py)),
            ColumnData::Double(_) => Err(PyValueError::new_err(format!(
                "Quantity {} holds doubles, use get_double_array",
                name
            ))),
        }
    }

    /// Returns a floating-point quantity as a numpy float64 array.
    fn get_double_array<'py>(
        &self,
        py: Python<'py>,
        name: &str,
    ) -> PyResult<&'py PyArray1<f64>> {
        match self.column(name)? {
            ColumnData::Double(values) => Ok(values.clone().into_pyarray(py)),
            ColumnData::Empty => Ok(Vec::<f64>::new().into_pyarray(py)),
            ColumnData::Int(_) => Err(PyValueError::new_err(format!(
                "Quantity {} holds integers, use get_int_array",
                name
            ))),
        }
    }

    /// Returns the number of particles in each event.
    fn get_event_sizes<'py>(&self, py: Python<'py>) -> &'py PyArray1<u64> {
        self.event_sizes.clone().into_pyarray(py)
    }

    /// Whether the whole file was read. False for truncated files read with
    /// `allow_partial=True`.
    #[getter]
    fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns all columns as a dictionary of numpy arrays.
    ///
    /// This is useful for creating a pandas DataFrame.
    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<PyObject> {
        let dict = PyDict::new(py);
        for (name, data) in &self.columns {
            match data {
                ColumnData::Int(values) => dict.set_item(name, values.clone().into_pyarray(py))?,
                ColumnData::Double(values) => {
                    dict.set_item(name, values.clone().into_pyarray(py))?
                }
                ColumnData::Empty => dict.set_item(name, Vec::<f64>::new().into_pyarray(py))?,
            }
        }
        Ok(dict.into())
    }
}

/// Base class for collectors written in Python.
///
/// Subclasses override any of `receive_int(name, value)`,
/// `receive_double(name, value)`, `end_event(particles)` and
/// `finish(complete)`. Any object with the first three methods works too.
#[pyclass(subclass, name = "Collector")]
pub struct PyCollectorBase;

#[pymethods]
impl PyCollectorBase {
    #[new]
    #[pyo3(signature = (*_args, **_kwargs))]
    fn new(_args: &PyTuple, _kwargs: Option<&PyDict>) -> Self {
        Self
    }

    fn receive_int(&self, _name: &str, _value: i64) {}

    fn receive_double(&self, _name: &str, _value: f64) {}

    fn end_event(&self, _particles: u64) {}

    fn finish(&self, _complete: bool) {}
}

/// Forwards decoded values to the methods of a Python object.
///
/// The first exception raised by a callback is kept and stops the scan at the
/// next event.
struct PyCollector<'py, 'a> {
    on_int: &'py PyAny,
    on_double: &'py PyAny,
    on_end_event: &'py PyAny,
    on_finish: Option<&'py PyAny>,
    error: Option<PyErr>,
    cancel: &'a AtomicBool,
}

impl<'py, 'a> PyCollector<'py, 'a> {
    fn new(target: &'py PyAny, cancel: &'a AtomicBool) -> PyResult<Self> {
        Ok(Self {
            on_int: target.getattr("receive_int")?,
            on_double: target.getattr("receive_double")?,
            on_end_event: target.getattr("end_event")?,
            on_finish: target.getattr("finish").ok(),
            error: None,
            cancel,
        })
    }

    fn record(&mut self, result: PyResult<&PyAny>) {
        if let Err(err) = result {
            if self.error.is_none() {
                self.error = Some(err);
                self.cancel.store(true, Ordering::Relaxed);
            }
        }
    }
}

impl bark_core::Collector for PyCollector<'_, '_> {
    fn receive_int(&mut self, name: &str, value: i64) {
        if self.error.is_none() {
            let result = self.on_int.call1((name, value));
            self.record(result);
        }
    }

    fn receive_double(&mut self, name: &str, value: f64) {
        if self.error.is_none() {
            let result = self.on_double.call1((name, value));
            self.record(result);
        }
    }

    fn end_event(&mut self, particles: u64) {
        if self.error.is_none() {
            let result = self.on_end_event.call1((particles,));
            self.record(result);
        }
    }

    fn finish(&mut self, outcome: ScanOutcome) {
        if let Some(on_finish) = self.on_finish {
            let result = on_finish.call1((outcome == ScanOutcome::Complete,));
            self.record(result);
        }
    }
}

fn stream_into(
    path: &str,
    quantities: &[String],
    target: &PyAny,
    allow_partial: bool,
) -> PyResult<()> {
    let cancel = AtomicBool::new(false);
    let mut collector = PyCollector::new(target, &cancel)?;

    let result = Reader::open(path)
        .and_then(|reader| reader.read_with_cancel(quantities, &mut collector, &cancel));
    if let Some(err) = collector.error.take() {
        return Err(err);
    }
    match result {
        Ok(_) => Ok(()),
        Err(ReadError::Truncated { .. }) if allow_partial => Ok(()),
        Err(err) => Err(to_py_err(err)),
    }
}

/// Reads the requested quantities of a particle file.
///
/// Args:
///     path: Path to the binary particle file
///     quantities: Names of the quantities to extract
///     collector: Optional object receiving every value as it is decoded,
///         usually a subclass of `bark.Collector`
///     allow_partial: Accept a truncated file and keep its complete events
///         instead of raising
///
/// Returns:
///     Columns with per-quantity arrays and per-event particle counts, or the
///     given collector
///
/// Example:
///     >>> import bark
///     >>> cols = bark.read("particles_binary.bin", ["pdg", "p0", "pz"])
///     >>> pdg = cols.get_int_array("pdg")
///     >>> sizes = cols.get_event_sizes()
#[pyfunction]
#[pyo3(signature = (path, quantities, collector=None, allow_partial=false))]
fn read(
    py: Python<'_>,
    path: &str,
    quantities: Vec<String>,
    collector: Option<&PyAny>,
    allow_partial: bool,
) -> PyResult<PyObject> {
    match collector {
        Some(target) => {
            stream_into(path, &quantities, target, allow_partial)?;
            Ok(target.into_py(py))
        }
        None => Ok(read_columns(py, path, quantities, allow_partial)?.into_py(py)),
    }
}

fn read_columns(
    py: Python<'_>,
    path: &str,
    quantities: Vec<String>,
    allow_partial: bool,
) -> PyResult<Py<Columns>> {
    let mut collector = ColumnarCollector::with_quantities(&quantities);

    let result = py.allow_threads(|| {
        Reader::open(path).and_then(|reader| reader.read(&quantities, &mut collector))
    });
    match result {
        Ok(_) => {}
        Err(ReadError::Truncated { .. }) if allow_partial => {}
        Err(err) => return Err(to_py_err(err)),
    }

    let complete = collector.is_complete();
    let (columns, event_sizes) = collector
        .into_columns()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    Py::new(
        py,
        Columns {
            columns,
            event_sizes,
            complete,
        },
    )
}

/// Reads only the header of a particle file.
///
/// Returns:
///     dict: version, variant, generator and the record layout as a list of
///     (name, type, offset) tuples
#[pyfunction]
fn read_header(py: Python<'_>, path: &str) -> PyResult<PyObject> {
    let mut reader = Reader::open(path).map_err(to_py_err)?;
    let header = reader.header().map_err(to_py_err)?;

    let layout: Vec<(String, String, usize)> = header
        .schema
        .quantities()
        .iter()
        .map(|q| (q.name.clone(), q.encoding.to_string(), q.offset))
        .collect();

    let dict = PyDict::new(py);
    dict.set_item("version", header.version)?;
    dict.set_item("variant", header.variant)?;
    dict.set_item("generator", &header.generator)?;
    dict.set_item("record_size", header.schema.record_size())?;
    dict.set_item("quantities", layout)?;
    Ok(dict.into())
}

/// Particle file reader module for Python.
#[pymodule]
fn bark(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(read, m)?)?;
    m.add_function(wrap_pyfunction!(read_header, m)?)?;
    m.add_class::<Columns>()?;
    m.add_class::<PyCollectorBase>()?;
    Ok(())
}
