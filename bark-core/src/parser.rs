//! Fixed byte-order decoding of record members.
//!
//! Every multi-byte value in a particle file is little-endian: integers are
//! two's complement, floats are IEEE-754. This never depends on the host.

use crate::collector::Collector;
use crate::plan::{ProjectionPlan, Span};
use crate::types::{Encoding, Value};
use byteorder::{ByteOrder, LittleEndian};

/// Decodes one member from exactly `encoding.width()` bytes.
#[inline]
pub fn decode_value(encoding: Encoding, bytes: &[u8]) -> Value {
    match encoding {
        Encoding::I8 => Value::Int(bytes[0] as i8 as i64),
        Encoding::I16 => Value::Int(LittleEndian::read_i16(bytes) as i64),
        Encoding::I32 => Value::Int(LittleEndian::read_i32(bytes) as i64),
        Encoding::I64 => Value::Int(LittleEndian::read_i64(bytes)),
        Encoding::F32 => Value::Double(LittleEndian::read_f32(bytes) as f64),
        Encoding::F64 => Value::Double(LittleEndian::read_f64(bytes)),
    }
}

/// Applies `plan` to one record and pushes the decoded members.
///
/// `record` must be exactly `plan.record_size()` bytes long.
#[inline]
pub fn decode_record<C: Collector + ?Sized>(
    record: &[u8],
    plan: &ProjectionPlan,
    collector: &mut C,
) {
    debug_assert_eq!(record.len(), plan.record_size());

    let mut cursor = 0usize;
    for span in plan.spans() {
        match span {
            Span::Skip(n) => cursor += n,
            Span::Decode(field) => {
                let width = field.encoding.width();
                let bytes = &record[cursor..cursor + width];
                match decode_value(field.encoding, bytes) {
                    Value::Int(v) => collector.receive_int(&field.name, v),
                    Value::Double(v) => collector.receive_double(&field.name, v),
                }
                cursor += width;
            }
        }
    }
}
