//! Streaming reader for particle event files.
//!
//! The reader walks a file once: header first, then one event block after
//! another. Every event block is a particle count followed by that many
//! fixed-size records. Only the requested members of each record are decoded;
//! everything else is stepped over using the projection plan.

use crate::collector::{Collector, ScanOutcome};
use crate::header::{CountWidth, FileHeader};
use crate::parser;
use crate::plan::ProjectionPlan;
use crate::registry::{SchemaError, SchemaRegistry};
use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Errors that can occur while reading a particle file.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u16),

    #[error("Unexpected end of file in {context}")]
    Truncated { context: String },

    #[error("Scan cancelled")]
    Cancelled,
}

/// Default size of the record buffer in bytes.
pub const DEFAULT_BUFFER_BYTES: usize = 1 << 22;

/// Tuning knobs for a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Upper bound on the bytes of records read from the file in one call.
    /// At least one record is always read at a time.
    pub buffer_bytes: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            buffer_bytes: DEFAULT_BUFFER_BYTES,
        }
    }
}

/// Totals of a finished scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Number of events read
    pub events: u64,
    /// Number of particle records read
    pub particles: u64,
}

/// Single-pass reader over one particle file.
///
/// A reader is consumed by [`Reader::read`], so the underlying file is closed
/// however the scan ends.
///
/// # Example
///
/// ```no_run
/// use bark_core::{ColumnarCollector, Reader};
///
/// let quantities = ["p0", "pz", "pdg"];
/// let mut columns = ColumnarCollector::with_quantities(&quantities);
/// let summary = Reader::open("particles.bin")?.read(&quantities, &mut columns)?;
///
/// println!("{} events, {} particles", summary.events, summary.particles);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Reader<R> {
    source: R,
    registry: SchemaRegistry,
    options: ReadOptions,
    header: Option<FileHeader>,
}

impl Reader<BufReader<File>> {
    /// Opens a particle file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReadError> {
        let file = File::open(path.as_ref())?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: Read> Reader<R> {
    /// Wraps any byte stream positioned at the start of a particle file.
    pub fn from_reader(source: R) -> Self {
        Self {
            source,
            registry: SchemaRegistry::default(),
            options: ReadOptions::default(),
            header: None,
        }
    }

    /// Replaces the quantity catalogue used to validate requests and schemas.
    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Reads the file header if that has not happened yet and returns it.
    pub fn header(&mut self) -> Result<&FileHeader, ReadError> {
        let header = match self.header.take() {
            Some(header) => header,
            None => FileHeader::read_from(&mut self.source)?,
        };
        Ok(self.header.insert(header))
    }

    /// Reads the whole file, pushing the `requested` quantities into `collector`.
    ///
    /// Requested names are checked against the registry before the first byte
    /// is read. Once scanning has started, the collector is always told how it
    /// ended through [`Collector::finish`].
    pub fn read<S, C>(self, requested: &[S], collector: &mut C) -> Result<ScanSummary, ReadError>
    where
        S: AsRef<str>,
        C: Collector + ?Sized,
    {
        self.scan(requested, collector, None)
    }

    /// Like [`Reader::read`], but stops with [`ReadError::Cancelled`] once
    /// `cancel` is set. The flag is checked before every event.
    pub fn read_with_cancel<S, C>(
        self,
        requested: &[S],
        collector: &mut C,
        cancel: &AtomicBool,
    ) -> Result<ScanSummary, ReadError>
    where
        S: AsRef<str>,
        C: Collector + ?Sized,
    {
        self.scan(requested, collector, Some(cancel))
    }

    fn scan<S, C>(
        mut self,
        requested: &[S],
        collector: &mut C,
        cancel: Option<&AtomicBool>,
    ) -> Result<ScanSummary, ReadError>
    where
        S: AsRef<str>,
        C: Collector + ?Sized,
    {
        for name in requested {
            self.registry.resolve(name.as_ref())?;
        }

        let header = match self.header.take() {
            Some(header) => header,
            None => FileHeader::read_from(&mut self.source)?,
        };
        self.registry.validate(&header.schema)?;
        let plan = ProjectionPlan::build(&header.schema, requested)?;

        let mut scanner = Scanner {
            source: self.source,
            plan: &plan,
            count_width: header.count_width(),
            batch_records: batch_records(self.options.buffer_bytes, plan.record_size()),
            buffer: Vec::new(),
            summary: ScanSummary::default(),
        };

        collector.begin(&plan);
        match scanner.run(collector, cancel) {
            Ok(summary) => {
                collector.finish(ScanOutcome::Complete);
                log::info!(
                    "Read {} events with {} particles",
                    summary.events,
                    summary.particles
                );
                Ok(summary)
            }
            Err(err) => {
                collector.finish(ScanOutcome::Incomplete);
                log::warn!(
                    "Scan stopped after {} complete events: {}",
                    scanner.summary.events,
                    err
                );
                Err(err)
            }
        }
    }
}

fn batch_records(buffer_bytes: usize, record_size: usize) -> usize {
    if record_size == 0 {
        return 1;
    }
    (buffer_bytes / record_size).max(1)
}

#[derive(Debug, Clone, Copy)]
enum ScanState {
    AwaitingEvent,
    ReadingRecords { particles: u64, remaining: u64 },
    Done,
}

struct Scanner<'a, R> {
    source: R,
    plan: &'a ProjectionPlan,
    count_width: CountWidth,
    batch_records: usize,
    buffer: Vec<u8>,
    summary: ScanSummary,
}

impl<R: Read> Scanner<'_, R> {
    fn run<C: Collector + ?Sized>(
        &mut self,
        collector: &mut C,
        cancel: Option<&AtomicBool>,
    ) -> Result<ScanSummary, ReadError> {
        let mut state = ScanState::AwaitingEvent;

        loop {
            state = match state {
                ScanState::AwaitingEvent => {
                    if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                        return Err(ReadError::Cancelled);
                    }
                    match self.read_count()? {
                        Some(particles) => ScanState::ReadingRecords {
                            particles,
                            remaining: particles,
                        },
                        None => ScanState::Done,
                    }
                }

                ScanState::ReadingRecords {
                    particles,
                    remaining: 0,
                } => {
                    let total = self
                        .summary
                        .particles
                        .checked_add(particles)
                        .ok_or_else(|| {
                            ReadError::InvalidFormat(format!(
                                "particle total overflows at event {}",
                                self.summary.events
                            ))
                        })?;
                    collector.end_event(particles);
                    self.summary.events += 1;
                    self.summary.particles = total;
                    ScanState::AwaitingEvent
                }

                ScanState::ReadingRecords {
                    particles,
                    remaining,
                } => {
                    let read = self.read_records(remaining, collector)?;
                    ScanState::ReadingRecords {
                        particles,
                        remaining: remaining - read,
                    }
                }

                ScanState::Done => return Ok(self.summary),
            };
        }
    }

    /// Reads one event's particle count. `None` on a clean end of file.
    fn read_count(&mut self) -> Result<Option<u64>, ReadError> {
        let width = self.count_width.bytes();
        let mut buf = [0u8; 8];
        let mut filled = 0;

        while filled < width {
            match self.source.read(&mut buf[filled..width]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ReadError::Io(e)),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < width {
            return Err(ReadError::Truncated {
                context: format!("particle count of event {}", self.summary.events),
            });
        }

        let count = match self.count_width {
            CountWidth::U32 => LittleEndian::read_u32(&buf) as u64,
            CountWidth::U64 => LittleEndian::read_u64(&buf),
        };
        Ok(Some(count))
    }

    /// Reads and decodes up to one buffer of records, returning how many.
    fn read_records<C: Collector + ?Sized>(
        &mut self,
        remaining: u64,
        collector: &mut C,
    ) -> Result<u64, ReadError> {
        let record_size = self.plan.record_size();
        if record_size == 0 {
            // Records without members take no space; the whole event is read.
            return Ok(remaining);
        }

        let batch = remaining.min(self.batch_records as u64) as usize;
        let bytes = batch * record_size;
        if self.buffer.len() < bytes {
            self.buffer.resize(bytes, 0);
        }

        let buf = &mut self.buffer[..bytes];
        if let Err(err) = self.source.read_exact(buf) {
            return Err(if err.kind() == io::ErrorKind::UnexpectedEof {
                ReadError::Truncated {
                    context: format!("particle records of event {}", self.summary.events),
                }
            } else {
                ReadError::Io(err)
            });
        }

        if self.plan.decoded_count() > 0 {
            for record in buf.chunks_exact(record_size) {
                parser::decode_record(record, self.plan, collector);
            }
        }
        Ok(batch as u64)
    }
}
