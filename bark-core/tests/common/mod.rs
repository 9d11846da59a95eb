//! Test-only writer for synthetic particle files.
//!
//! The library never writes particle files; this builder exists so tests and
//! benchmarks can produce inputs with known contents.

#![allow(dead_code)]

use bark_core::{Encoding, Value};
use std::io::{self, Read};

/// The extended particle record used by most tests, in on-disk order.
pub const PARTICLE_SCHEMA: &[(&str, Encoding)] = &[
    ("t", Encoding::F64),
    ("x", Encoding::F64),
    ("y", Encoding::F64),
    ("z", Encoding::F64),
    ("mass", Encoding::F64),
    ("p0", Encoding::F64),
    ("px", Encoding::F64),
    ("py", Encoding::F64),
    ("pz", Encoding::F64),
    ("pdg", Encoding::I32),
    ("id", Encoding::I32),
    ("charge", Encoding::I32),
    ("ncoll", Encoding::I32),
];

const PDG_CODES: &[i32] = &[211, -211, 111, 2212, -2112, 321, 3122];

/// Builds a particle file in memory.
pub struct FileBuilder {
    version: u16,
    variant: u16,
    generator: String,
    schema: Vec<(String, Encoding)>,
    body: Vec<u8>,
}

impl FileBuilder {
    pub fn new(version: u16) -> Self {
        Self {
            version,
            variant: 0,
            generator: "SMASH-3.1".to_string(),
            schema: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A builder with [`PARTICLE_SCHEMA`].
    pub fn particles(version: u16) -> Self {
        let mut builder = Self::new(version);
        for &(name, encoding) in PARTICLE_SCHEMA {
            builder = builder.quantity(name, encoding);
        }
        builder
    }

    pub fn quantity(mut self, name: &str, encoding: Encoding) -> Self {
        self.schema.push((name.to_string(), encoding));
        self
    }

    pub fn variant(mut self, variant: u16) -> Self {
        self.variant = variant;
        self
    }

    /// Writes an event count header without any records.
    pub fn count(&mut self, particles: u64) -> &mut Self {
        if self.version == 1 {
            self.body
                .extend_from_slice(&(particles as u32).to_le_bytes());
        } else {
            self.body.extend_from_slice(&particles.to_le_bytes());
        }
        self
    }

    /// Writes one record; `values` follow the schema order.
    pub fn record(&mut self, values: &[Value]) -> &mut Self {
        assert_eq!(values.len(), self.schema.len());
        for (&(_, encoding), value) in self.schema.iter().zip(values) {
            match (encoding, *value) {
                (Encoding::I8, Value::Int(v)) => self.body.push(v as i8 as u8),
                (Encoding::I16, Value::Int(v)) => {
                    self.body.extend_from_slice(&(v as i16).to_le_bytes())
                }
                (Encoding::I32, Value::Int(v)) => {
                    self.body.extend_from_slice(&(v as i32).to_le_bytes())
                }
                (Encoding::I64, Value::Int(v)) => self.body.extend_from_slice(&v.to_le_bytes()),
                (Encoding::F32, Value::Double(v)) => {
                    self.body.extend_from_slice(&(v as f32).to_le_bytes())
                }
                (Encoding::F64, Value::Double(v)) => {
                    self.body.extend_from_slice(&v.to_le_bytes())
                }
                (encoding, value) => panic!("{:?} cannot hold {:?}", encoding, value),
            }
        }
        self
    }

    /// Writes a complete event.
    pub fn event(&mut self, records: &[Vec<Value>]) -> &mut Self {
        self.count(records.len() as u64);
        for record in records {
            self.record(record);
        }
        self
    }

    /// Appends raw bytes after the current content.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.body.extend_from_slice(bytes);
        self
    }

    pub fn header_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"BARK");
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.variant.to_le_bytes());
        out.extend_from_slice(&(self.generator.len() as u32).to_le_bytes());
        out.extend_from_slice(self.generator.as_bytes());
        out.extend_from_slice(&(self.schema.len() as u16).to_le_bytes());
        for (name, encoding) in &self.schema {
            out.push(name.len() as u8);
            out.extend_from_slice(name.as_bytes());
            out.push(match encoding.kind() {
                bark_core::ValueKind::Int => 0,
                bark_core::ValueKind::Double => 1,
            });
            out.push(encoding.width() as u8);
        }
        out
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = self.header_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Deterministic particle `index` of event `event`, in [`PARTICLE_SCHEMA`] order.
pub fn particle(event: usize, index: usize) -> Vec<Value> {
    let e = event as f64;
    let i = index as f64;
    vec![
        Value::Double(e + 0.25 * i),
        Value::Double(-1.5 * i),
        Value::Double(0.125 * i + e),
        Value::Double(i * i * 0.01),
        Value::Double(0.138 + 0.001 * (index % 7) as f64),
        Value::Double(1.0 + i),
        Value::Double(0.5 * i - e),
        Value::Double(-0.25 * i),
        Value::Double(if index % 2 == 0 { i } else { -i }),
        Value::Int(PDG_CODES[(event + index) % PDG_CODES.len()] as i64),
        Value::Int((event * 1_000_000 + index) as i64),
        Value::Int(index as i64 % 3 - 1),
        Value::Int((index % 5) as i64),
    ]
}

/// Records for an event with `n` particles.
pub fn event_records(event: usize, n: usize) -> Vec<Vec<Value>> {
    (0..n).map(|i| particle(event, i)).collect()
}

/// Builds a version 1 file with [`PARTICLE_SCHEMA`] and the given event sizes.
pub fn particle_file(sizes: &[usize]) -> Vec<u8> {
    let mut builder = FileBuilder::particles(1);
    for (event, &n) in sizes.iter().enumerate() {
        builder.event(&event_records(event, n));
    }
    builder.build()
}

/// Expected column for quantity `name` over events with the given sizes.
pub fn expected_column(name: &str, sizes: &[usize]) -> Vec<Value> {
    let pos = PARTICLE_SCHEMA
        .iter()
        .position(|&(n, _)| n == name)
        .expect("quantity in schema");
    let mut out = Vec::new();
    for (event, &n) in sizes.iter().enumerate() {
        for i in 0..n {
            out.push(particle(event, i)[pos]);
        }
    }
    out
}

/// Reader wrapper counting how many bytes were pulled from the inner stream.
pub struct CountingReader<R> {
    inner: R,
    pub bytes: usize,
    pub calls: usize,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes: 0,
            calls: 0,
        }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.calls += 1;
        let n = self.inner.read(buf)?;
        self.bytes += n;
        Ok(n)
    }
}

/// Reader that fails with a non-EOF error once `fail_at` bytes were served.
pub struct FailingReader<R> {
    inner: R,
    position: usize,
    fail_at: usize,
}

impl<R> FailingReader<R> {
    pub fn new(inner: R, fail_at: usize) -> Self {
        Self {
            inner,
            position: 0,
            fail_at,
        }
    }
}

impl<R: Read> Read for FailingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.fail_at {
            return Err(io::Error::new(io::ErrorKind::Other, "device went away"));
        }
        let limit = buf.len().min(self.fail_at - self.position);
        let n = self.inner.read(&mut buf[..limit])?;
        self.position += n;
        Ok(n)
    }
}
