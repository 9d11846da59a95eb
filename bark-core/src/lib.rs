//! Block-based reader for binary particle event files.
//!
//! A particle file holds a header describing one fixed-size particle record,
//! followed by events, each a particle count and that many records. This crate
//! streams such a file once and extracts only the requested quantities,
//! stepping over the bytes of everything else.
//!
//! # Example
//!
//! ```no_run
//! use bark_core::{ColumnarCollector, Reader};
//!
//! let quantities = ["pdg", "p0", "pz"];
//! let mut columns = ColumnarCollector::with_quantities(&quantities);
//! Reader::open("particles_binary.bin")?.read(&quantities, &mut columns)?;
//!
//! let pdg = columns.int_column("pdg")?;
//! let pz = columns.double_column("pz")?;
//! println!("{} particles in {} events", pdg.len(), columns.event_sizes()?.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Features
//!
//! - Projection plan built once per file: unrequested members are skipped in
//!   coalesced runs, never decoded
//! - Fixed little-endian decoding, independent of the host
//! - Push-only [`Collector`] interface with columnar and streaming CSV sinks
//! - Truncated files keep everything decoded up to the last complete event
//! - Cooperative cancellation between events

pub mod collector;
pub mod header;
pub mod output;
pub mod parser;
pub mod plan;
pub mod reader;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use collector::{ColumnData, ColumnarCollector, Collector, CollectorError, ScanOutcome};
pub use header::FileHeader;
pub use output::{CsvCollector, OutputError};
pub use plan::{DecodeField, ProjectionPlan, Span};
pub use reader::{ReadError, ReadOptions, Reader, ScanSummary};
pub use registry::{SchemaError, SchemaRegistry};
pub use types::{Encoding, Quantity, QuantityDef, Schema, Value, ValueKind};
