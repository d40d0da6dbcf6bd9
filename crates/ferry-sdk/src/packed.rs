//! Packed string and pointer arrays
//!
//! String arrays cross the boundary as one flat buffer:
//!
//! ```text
//! +-----------+-----------+---------+-----------+---------+-----
//! | count u32 | len0 u32  | bytes0  | len1 u32  | bytes1  | ...
//! +-----------+-----------+---------+-----------+---------+-----
//! ```
//!
//! All integers are little-endian; there is no terminator and no padding.
//! Pointer arrays are a flat run of native-word pointers whose count is
//! passed separately.
//!
//! Decoded strings are independent copies and may outlive the buffer.

use std::ffi::{c_char, c_void, CStr};
use std::ops::Deref;

use crate::convert::FromWire;
use crate::env::{ManagedEnv, NativeEnv, ObjectRef};
use crate::error::{InteropResult, PackedError};
use crate::handle::NativePointer;
use crate::string::InteropString;

const HEADER: usize = 4;

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(HEADER)?;
    let slice = bytes.get(offset..end)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Decode a packed string array, trusting its embedded lengths.
///
/// A null pointer decodes to an empty array.
///
/// # Safety
/// `ptr` must be null or point to a well-formed packed buffer.
pub unsafe fn decode_string_array(ptr: *const u8) -> Vec<InteropString> {
    if ptr.is_null() {
        return Vec::new();
    }
    let count = u32::from_le_bytes(*(ptr as *const [u8; 4])) as usize;
    let mut out = Vec::with_capacity(count);
    let mut offset = HEADER;
    for _ in 0..count {
        let len = u32::from_le_bytes(*(ptr.add(offset) as *const [u8; 4])) as usize;
        let body = std::slice::from_raw_parts(ptr.add(offset + HEADER), len);
        out.push(InteropString::from_bytes(body.to_vec()));
        offset += HEADER + len;
    }
    out
}

/// Decode a packed string array, checking every length against the buffer.
pub fn decode_string_array_checked(bytes: &[u8]) -> Result<Vec<InteropString>, PackedError> {
    let count = read_u32(bytes, 0).ok_or(PackedError::MissingHeader { len: bytes.len() })? as usize;
    // Each entry needs at least its length prefix; cap the reservation by that.
    let mut out = Vec::with_capacity(count.min(bytes.len() / HEADER));
    let mut offset = HEADER;
    for index in 0..count {
        let truncated = PackedError::Truncated {
            index,
            offset,
            len: bytes.len(),
        };
        let len = read_u32(bytes, offset).ok_or(truncated.clone())? as usize;
        let start = offset + HEADER;
        let body = start
            .checked_add(len)
            .and_then(|end| bytes.get(start..end))
            .ok_or(truncated)?;
        out.push(InteropString::from_bytes(body.to_vec()));
        offset = start + len;
    }
    Ok(out)
}

/// Encode strings into the packed layout
pub fn encode_string_array<S: AsRef<[u8]>>(strings: &[S]) -> Vec<u8> {
    let body: usize = strings.iter().map(|s| HEADER + s.as_ref().len()).sum();
    let mut out = Vec::with_capacity(HEADER + body);
    out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    for s in strings {
        let s = s.as_ref();
        out.extend_from_slice(&(s.len() as u32).to_le_bytes());
        out.extend_from_slice(s);
    }
    out
}

/// Read `count` pointers from a flat array.
///
/// # Safety
/// `ptr` must be null or point to at least `count` pointers.
pub unsafe fn decode_pointer_array(ptr: *const *mut c_void, count: usize) -> Vec<NativePointer> {
    if ptr.is_null() {
        return Vec::new();
    }
    std::slice::from_raw_parts(ptr, count)
        .iter()
        .map(|p| NativePointer::from_ptr(*p))
        .collect()
}

// ============================================================================
// StringArray
// ============================================================================

/// Decoded packed string array
#[derive(Debug, Default)]
pub struct StringArray(Vec<InteropString>);

impl StringArray {
    /// Owned strings, with invalid UTF-8 replaced
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|s| s.to_str_lossy().into_owned()).collect()
    }

    /// Take the decoded entries
    pub fn into_vec(self) -> Vec<InteropString> {
        self.0
    }
}

impl From<Vec<InteropString>> for StringArray {
    fn from(strings: Vec<InteropString>) -> Self {
        StringArray(strings)
    }
}

impl Deref for StringArray {
    type Target = [InteropString];

    fn deref(&self) -> &[InteropString] {
        &self.0
    }
}

impl FromWire<NativeEnv> for StringArray {
    type Wire = *const u8;

    unsafe fn decode(_env: &NativeEnv, wire: *const u8) -> InteropResult<Self> {
        Ok(StringArray(decode_string_array(wire)))
    }
}

impl FromWire<ManagedEnv> for StringArray {
    type Wire = ObjectRef;

    unsafe fn decode(env: &ManagedEnv, wire: ObjectRef) -> InteropResult<Self> {
        if wire.is_null() {
            return Ok(StringArray::default());
        }
        let len = env.array_length(wire);
        let data = env.pin_bytes(wire);
        if data.is_null() {
            return Ok(StringArray::default());
        }
        let bytes = std::slice::from_raw_parts(data as *const u8, len);
        Ok(StringArray(decode_string_array_checked(bytes)?))
    }

    unsafe fn release(env: &ManagedEnv, wire: ObjectRef) {
        if !wire.is_null() {
            env.unpin_bytes(wire);
        }
    }
}

// ============================================================================
// PointerArray
// ============================================================================

/// Flat pointer array; the count travels as a separate argument
#[derive(Debug, Clone, Copy)]
pub struct PointerArray(*const *mut c_void);

impl PointerArray {
    /// Wrap the array start
    pub fn from_ptr(ptr: *const *mut c_void) -> Self {
        PointerArray(ptr)
    }

    /// Array start
    pub fn as_ptr(self) -> *const *mut c_void {
        self.0
    }

    /// Read `count` pointers.
    ///
    /// # Safety
    /// The array must hold at least `count` pointers.
    pub unsafe fn to_vec(self, count: usize) -> Vec<NativePointer> {
        decode_pointer_array(self.0, count)
    }

    /// Read `count` NUL-terminated C strings the entries point to.
    ///
    /// # Safety
    /// The array must hold at least `count` valid C string pointers.
    pub unsafe fn to_strings(self, count: usize) -> Vec<InteropString> {
        decode_pointer_array(self.0, count)
            .into_iter()
            .map(|p| {
                if p.is_null() {
                    InteropString::default()
                } else {
                    InteropString::from_bytes(CStr::from_ptr(p.as_ptr() as *const c_char).to_bytes().to_vec())
                }
            })
            .collect()
    }
}

impl FromWire<NativeEnv> for PointerArray {
    type Wire = *const *mut c_void;

    unsafe fn decode(_env: &NativeEnv, wire: *const *mut c_void) -> InteropResult<Self> {
        Ok(PointerArray(wire))
    }
}

impl FromWire<ManagedEnv> for PointerArray {
    type Wire = i64;

    unsafe fn decode(_env: &ManagedEnv, wire: i64) -> InteropResult<Self> {
        Ok(PointerArray(wire as usize as *const *mut c_void))
    }
}
