//! Tagged numbers
//!
//! Managed callers hand numbers across as doubles. The boundary narrows them
//! to either a tagged 32-bit integer or a tagged 32-bit float: integral values
//! inside the `i32` range keep full precision, anything else is rounded to the
//! nearest `f32`. Decoding always dispatches on the tag.

use crate::convert::{FromWire, IntoWire};
use crate::env::{ManagedEnv, NativeEnv};
use crate::error::InteropResult;

/// Tag of an absent number
pub const TAG_UNDEFINED: i8 = 101;
/// Tag of a 32-bit integer payload
pub const TAG_INT32: i8 = 102;
/// Tag of a 32-bit float payload
pub const TAG_FLOAT32: i8 = 103;

/// Size of the serialized form: tag byte plus 4 payload bytes
pub const SERIALIZED_NUMBER_SIZE: usize = 5;

/// A number as it crosses the boundary
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InteropNumber {
    /// No value
    #[default]
    Undefined,
    /// Integral value inside the `i32` range
    Int32(i32),
    /// Everything else, narrowed to `f32`
    Float32(f32),
}

/// C layout of a tagged number in the native flavor
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawNumber {
    /// One of the `TAG_*` constants
    pub tag: i8,
    /// `i32` or `f32` bits, depending on `tag`
    pub bits: u32,
}

impl InteropNumber {
    /// Narrow a double
    pub fn from_f64(value: f64) -> Self {
        if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
            InteropNumber::Int32(value as i32)
        } else {
            InteropNumber::Float32(value as f32)
        }
    }

    /// Widen back to a double (`NaN` for undefined)
    pub fn to_f64(self) -> f64 {
        match self {
            InteropNumber::Undefined => f64::NAN,
            InteropNumber::Int32(i) => i as f64,
            InteropNumber::Float32(f) => f as f64,
        }
    }

    /// Wire tag
    pub fn tag(self) -> i8 {
        match self {
            InteropNumber::Undefined => TAG_UNDEFINED,
            InteropNumber::Int32(_) => TAG_INT32,
            InteropNumber::Float32(_) => TAG_FLOAT32,
        }
    }

    /// C layout
    pub fn to_raw(self) -> RawNumber {
        let bits = match self {
            InteropNumber::Undefined => 0,
            InteropNumber::Int32(i) => i as u32,
            InteropNumber::Float32(f) => f.to_bits(),
        };
        RawNumber { tag: self.tag(), bits }
    }

    /// Read the C layout; unknown tags read as undefined
    pub fn from_raw(raw: RawNumber) -> Self {
        match raw.tag {
            TAG_INT32 => InteropNumber::Int32(raw.bits as i32),
            TAG_FLOAT32 => InteropNumber::Float32(f32::from_bits(raw.bits)),
            _ => InteropNumber::Undefined,
        }
    }

    /// Serialized form: tag byte followed by the little-endian payload
    pub fn serialize(self) -> [u8; SERIALIZED_NUMBER_SIZE] {
        let raw = self.to_raw();
        let mut out = [0u8; SERIALIZED_NUMBER_SIZE];
        out[0] = raw.tag as u8;
        out[1..].copy_from_slice(&raw.bits.to_le_bytes());
        out
    }

    /// Parse the serialized form; `None` if fewer than 5 bytes are given
    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SERIALIZED_NUMBER_SIZE {
            return None;
        }
        let bits = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        Some(Self::from_raw(RawNumber { tag: bytes[0] as i8, bits }))
    }
}

impl From<f64> for InteropNumber {
    fn from(value: f64) -> Self {
        Self::from_f64(value)
    }
}

impl From<i32> for InteropNumber {
    fn from(value: i32) -> Self {
        InteropNumber::Int32(value)
    }
}

impl FromWire<NativeEnv> for InteropNumber {
    type Wire = RawNumber;

    unsafe fn decode(_env: &NativeEnv, wire: RawNumber) -> InteropResult<Self> {
        Ok(Self::from_raw(wire))
    }
}

impl IntoWire<NativeEnv> for InteropNumber {
    type Wire = RawNumber;

    unsafe fn encode(self, _env: &NativeEnv) -> RawNumber {
        self.to_raw()
    }

    fn null_wire() -> RawNumber {
        InteropNumber::Undefined.to_raw()
    }
}

impl FromWire<ManagedEnv> for InteropNumber {
    type Wire = f64;

    unsafe fn decode(_env: &ManagedEnv, wire: f64) -> InteropResult<Self> {
        Ok(Self::from_f64(wire))
    }
}

impl IntoWire<ManagedEnv> for InteropNumber {
    type Wire = f64;

    unsafe fn encode(self, _env: &ManagedEnv) -> f64 {
        self.to_f64()
    }

    fn null_wire() -> f64 {
        0.0
    }
}
