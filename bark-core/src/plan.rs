//! Projection of a record layout onto the requested quantities.
//!
//! A [`ProjectionPlan`] is a flat list of spans that tiles one record exactly.
//! Requested members become [`Span::Decode`]; runs of everything else collapse
//! into a single [`Span::Skip`].

use crate::registry::SchemaError;
use crate::types::{Encoding, Schema};
use std::collections::HashSet;

/// A member to decode, copied out of the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeField {
    pub name: String,
    pub encoding: Encoding,
}

/// One span of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    /// Advance over `n` bytes without looking at them
    Skip(usize),
    /// Decode one member
    Decode(DecodeField),
}

impl Span {
    /// Number of record bytes covered by this span.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Skip(n) => *n,
            Self::Decode(field) => field.encoding.width(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable per-scan decode plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionPlan {
    spans: Vec<Span>,
    record_size: usize,
    decoded: usize,
}

impl ProjectionPlan {
    /// Builds the plan for `requested` over `schema`.
    ///
    /// Every requested name must be a member of the schema. Duplicates in the
    /// request are decoded once. Decoded members come out in on-disk order,
    /// not request order.
    pub fn build<S: AsRef<str>>(schema: &Schema, requested: &[S]) -> Result<Self, SchemaError> {
        let mut wanted = HashSet::with_capacity(requested.len());
        for name in requested {
            let name = name.as_ref();
            if !schema.contains(name) {
                return Err(SchemaError::UnknownQuantity(name.to_string()));
            }
            wanted.insert(name);
        }

        let mut spans = Vec::new();
        let mut pending_skip = 0usize;

        for quantity in schema.quantities() {
            if wanted.contains(quantity.name.as_str()) {
                if pending_skip > 0 {
                    spans.push(Span::Skip(pending_skip));
                    pending_skip = 0;
                }
                spans.push(Span::Decode(DecodeField {
                    name: quantity.name.clone(),
                    encoding: quantity.encoding,
                }));
            } else {
                pending_skip += quantity.width();
            }
        }
        if pending_skip > 0 {
            spans.push(Span::Skip(pending_skip));
        }

        log::debug!(
            "Projection plan: {} of {} quantities, {} spans over {} bytes",
            wanted.len(),
            schema.len(),
            spans.len(),
            schema.record_size()
        );

        Ok(Self {
            spans,
            record_size: schema.record_size(),
            decoded: wanted.len(),
        })
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Size of the record the plan tiles.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Number of members decoded per record.
    pub fn decoded_count(&self) -> usize {
        self.decoded
    }

    /// Members decoded per record, in on-disk order.
    pub fn decoded_fields(&self) -> impl Iterator<Item = &DecodeField> {
        self.spans.iter().filter_map(|span| match span {
            Span::Decode(field) => Some(field),
            Span::Skip(_) => None,
        })
    }

    /// Names decoded per record, in on-disk order.
    pub fn decoded_names(&self) -> impl Iterator<Item = &str> {
        self.decoded_fields().map(|field| field.name.as_str())
    }
}
