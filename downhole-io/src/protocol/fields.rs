//! Field layout primitives
//!
//! Every packet payload is a fixed, ordered list of integer fields. A field is
//! described by its wire width/signedness ([`WireType`]) and the pure scale
//! that turns the wire integer into a physical value ([`Transfer`]). Layouts
//! are `const` tables, so a packet's size is known at compile time.

use crate::error::{Error, Result};

/// Fixed-width integer representation of a field on the wire (little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
}

impl WireType {
    /// Width in bytes
    pub const fn size(self) -> usize {
        match self {
            WireType::U8 | WireType::I8 => 1,
            WireType::U16 | WireType::I16 => 2,
            WireType::U32 | WireType::I32 => 4,
        }
    }

    /// Smallest representable value
    pub const fn min(self) -> i64 {
        match self {
            WireType::U8 | WireType::U16 | WireType::U32 => 0,
            WireType::I8 => i8::MIN as i64,
            WireType::I16 => i16::MIN as i64,
            WireType::I32 => i32::MIN as i64,
        }
    }

    /// Largest representable value
    pub const fn max(self) -> i64 {
        match self {
            WireType::U8 => u8::MAX as i64,
            WireType::I8 => i8::MAX as i64,
            WireType::U16 => u16::MAX as i64,
            WireType::I16 => i16::MAX as i64,
            WireType::U32 => u32::MAX as i64,
            WireType::I32 => i32::MAX as i64,
        }
    }

    /// Decode from exactly `self.size()` bytes
    #[inline]
    fn decode(self, b: &[u8]) -> i64 {
        match self {
            WireType::U8 => b[0] as i64,
            WireType::I8 => b[0] as i8 as i64,
            WireType::U16 => u16::from_le_bytes([b[0], b[1]]) as i64,
            WireType::I16 => i16::from_le_bytes([b[0], b[1]]) as i64,
            WireType::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
            WireType::I32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
        }
    }

    /// Append `value` saturated to this type's range
    #[inline]
    pub fn write(self, value: i64, out: &mut Vec<u8>) {
        let v = value.clamp(self.min(), self.max());
        match self {
            WireType::U8 => out.push(v as u8),
            WireType::I8 => out.push(v as i8 as u8),
            WireType::U16 => out.extend_from_slice(&(v as u16).to_le_bytes()),
            WireType::I16 => out.extend_from_slice(&(v as i16).to_le_bytes()),
            WireType::U32 => out.extend_from_slice(&(v as u32).to_le_bytes()),
            WireType::I32 => out.extend_from_slice(&(v as i32).to_le_bytes()),
        }
    }
}

/// Pure scale-and-offset conversion: `physical = raw / divisor + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transfer {
    pub divisor: f64,
    pub offset: f64,
}

impl Transfer {
    pub const IDENTITY: Transfer = Transfer::divide_by(1.0);
    pub const DECI: Transfer = Transfer::divide_by(10.0);
    pub const CENTI: Transfer = Transfer::divide_by(100.0);
    pub const MILLI: Transfer = Transfer::divide_by(1000.0);

    pub const fn divide_by(divisor: f64) -> Self {
        Self {
            divisor,
            offset: 0.0,
        }
    }

    /// Wire integer to physical value
    #[inline]
    pub fn apply(self, raw: i64) -> f64 {
        raw as f64 / self.divisor + self.offset
    }

    /// Physical value back to the nearest wire integer
    ///
    /// Non-finite values map to 0.
    #[inline]
    pub fn invert(self, value: f64) -> i64 {
        let raw = ((value - self.offset) * self.divisor).round();
        if raw.is_finite() {
            raw as i64
        } else {
            0
        }
    }
}

/// One entry of a packet layout table
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub wire: WireType,
    pub transfer: Transfer,
}

impl FieldSpec {
    pub const fn new(name: &'static str, wire: WireType, transfer: Transfer) -> Self {
        Self {
            name,
            wire,
            transfer,
        }
    }

    /// Unscaled integer field
    pub const fn raw(name: &'static str, wire: WireType) -> Self {
        Self::new(name, wire, Transfer::IDENTITY)
    }
}

/// Total payload size of a layout
pub const fn payload_size(fields: &[FieldSpec]) -> usize {
    let mut size = 0;
    let mut i = 0;
    while i < fields.len() {
        size += fields[i].wire.size();
        i += 1;
    }
    size
}

/// Sequential little-endian field reader over a payload
pub struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Read the next field of the given width
    pub fn read(&mut self, wire: WireType) -> Result<i64> {
        let end = self.pos + wire.size();
        let Some(chunk) = self.bytes.get(self.pos..end) else {
            return Err(Error::Truncated {
                expected: end,
                actual: self.bytes.len(),
            });
        };
        self.pos = end;
        Ok(wire.decode(chunk))
    }

    /// Read the next field as described by a layout entry
    #[inline]
    pub fn read_field(&mut self, spec: &FieldSpec) -> Result<i64> {
        self.read(spec.wire)
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }
}
