//! String conversions
//!
//! Two logical string types cross the boundary:
//!
//! - `String`: always an owned copy on decode.
//! - [`InteropString`]: length-aware bytes. In the native flavor decode
//!   borrows the caller's NUL-terminated buffer for the duration of the call;
//!   in the managed flavor the runtime string has to be copied out.
//!
//! Returning either type to a native-flavor caller hands over a
//! `malloc`-allocated NUL-terminated copy; the caller frees it with
//! [`free_c_string`].

use std::borrow::Cow;
use std::ffi::{c_char, CStr};
use std::fmt;

use crate::convert::{FromWire, IntoWire};
use crate::env::{ManagedEnv, NativeEnv, ObjectRef};
use crate::error::InteropResult;

// ============================================================================
// malloc helpers
// ============================================================================

/// Copy `bytes` into a fresh `malloc` allocation with a trailing NUL.
///
/// Allocation failure is fatal.
pub fn alloc_c_string(bytes: &[u8]) -> *mut c_char {
    unsafe {
        let ptr = libc::malloc(bytes.len() + 1) as *mut u8;
        if ptr.is_null() {
            crate::fatal!("Cannot allocate {} bytes for a returned string", bytes.len() + 1);
        }
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        *ptr.add(bytes.len()) = 0;
        ptr as *mut c_char
    }
}

/// Free a string returned by a native-flavor export.
///
/// # Safety
/// `ptr` must come from [`alloc_c_string`] (or be null) and not be freed twice.
pub unsafe fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        libc::free(ptr as *mut libc::c_void);
    }
}

// ============================================================================
// String
// ============================================================================

impl FromWire<NativeEnv> for String {
    type Wire = *const c_char;

    unsafe fn decode(_env: &NativeEnv, wire: *const c_char) -> InteropResult<Self> {
        if wire.is_null() {
            return Ok(String::new());
        }
        Ok(CStr::from_ptr(wire).to_string_lossy().into_owned())
    }
}

impl IntoWire<NativeEnv> for String {
    type Wire = *mut c_char;

    unsafe fn encode(self, _env: &NativeEnv) -> *mut c_char {
        alloc_c_string(self.as_bytes())
    }

    fn null_wire() -> *mut c_char {
        std::ptr::null_mut()
    }
}

impl FromWire<ManagedEnv> for String {
    type Wire = ObjectRef;

    unsafe fn decode(env: &ManagedEnv, wire: ObjectRef) -> InteropResult<Self> {
        let bytes = env.read_string(wire);
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

impl IntoWire<ManagedEnv> for String {
    type Wire = ObjectRef;

    unsafe fn encode(self, env: &ManagedEnv) -> ObjectRef {
        env.new_string(self.as_bytes())
    }

    fn null_wire() -> ObjectRef {
        std::ptr::null_mut()
    }
}

// ============================================================================
// InteropString
// ============================================================================

enum Repr {
    /// Caller-owned bytes, valid until the call returns
    Borrowed { ptr: *const u8, len: usize },
    Owned(Vec<u8>),
}

/// Length-aware string crossing the boundary.
///
/// Bytes are not required to be valid UTF-8 and may contain NULs when built
/// from a length (managed flavor, [`InteropString::from_bytes`]).
pub struct InteropString {
    repr: Repr,
}

impl InteropString {
    /// Borrow `len` bytes at `ptr` without copying.
    ///
    /// # Safety
    /// The bytes must stay valid and unchanged while this value is alive.
    pub unsafe fn borrowed(ptr: *const u8, len: usize) -> Self {
        if ptr.is_null() {
            return Self::default();
        }
        InteropString {
            repr: Repr::Borrowed { ptr, len },
        }
    }

    /// Take ownership of raw bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        InteropString {
            repr: Repr::Owned(bytes),
        }
    }

    /// Byte length, without any terminator
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Borrowed { len, .. } => *len,
            Repr::Owned(v) => v.len(),
        }
    }

    /// Check for the empty string
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        match &self.repr {
            Repr::Borrowed { ptr, len } => unsafe { std::slice::from_raw_parts(*ptr, *len) },
            Repr::Owned(v) => v,
        }
    }

    /// UTF-8 view, replacing invalid sequences
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Check whether decode avoided a copy
    pub fn is_borrowed(&self) -> bool {
        matches!(self.repr, Repr::Borrowed { .. })
    }

    /// Owned copy of the bytes
    pub fn into_bytes(self) -> Vec<u8> {
        match self.repr {
            Repr::Borrowed { ptr, len } => unsafe { std::slice::from_raw_parts(ptr, len).to_vec() },
            Repr::Owned(v) => v,
        }
    }
}

impl Default for InteropString {
    fn default() -> Self {
        InteropString::from_bytes(Vec::new())
    }
}

impl From<String> for InteropString {
    fn from(s: String) -> Self {
        InteropString::from_bytes(s.into_bytes())
    }
}

impl From<&str> for InteropString {
    fn from(s: &str) -> Self {
        InteropString::from_bytes(s.as_bytes().to_vec())
    }
}

impl PartialEq<str> for InteropString {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for InteropString {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl fmt::Display for InteropString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str_lossy())
    }
}

impl fmt::Debug for InteropString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InteropString({:?})", self.to_str_lossy())
    }
}

impl FromWire<NativeEnv> for InteropString {
    type Wire = *const c_char;

    unsafe fn decode(_env: &NativeEnv, wire: *const c_char) -> InteropResult<Self> {
        if wire.is_null() {
            return Ok(InteropString::default());
        }
        let len = libc::strlen(wire);
        Ok(InteropString::borrowed(wire as *const u8, len))
    }
}

impl IntoWire<NativeEnv> for InteropString {
    type Wire = *mut c_char;

    unsafe fn encode(self, _env: &NativeEnv) -> *mut c_char {
        alloc_c_string(self.as_bytes())
    }

    fn null_wire() -> *mut c_char {
        std::ptr::null_mut()
    }
}

impl FromWire<ManagedEnv> for InteropString {
    type Wire = ObjectRef;

    unsafe fn decode(env: &ManagedEnv, wire: ObjectRef) -> InteropResult<Self> {
        Ok(InteropString::from_bytes(env.read_string(wire)))
    }
}

impl IntoWire<ManagedEnv> for InteropString {
    type Wire = ObjectRef;

    unsafe fn encode(self, env: &ManagedEnv) -> ObjectRef {
        env.new_string(self.as_bytes())
    }

    fn null_wire() -> ObjectRef {
        std::ptr::null_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeObject};

    #[test]
    fn test_native_string_is_copied() {
        let source = b"hello\0".to_vec();
        let s = unsafe { String::decode(&NativeEnv, source.as_ptr() as *const c_char).unwrap() };
        drop(source);
        assert_eq!(s, "hello");
    }

    #[test]
    fn test_native_interop_string_borrows() {
        let source = b"panda\0";
        let s = unsafe {
            <InteropString as FromWire<NativeEnv>>::decode(&NativeEnv, source.as_ptr() as *const c_char)
                .unwrap()
        };
        assert!(s.is_borrowed());
        assert_eq!(s.len(), 5);
        assert_eq!(s.as_bytes().as_ptr(), source.as_ptr());
        assert_eq!(s, "panda");
    }

    #[test]
    fn test_native_null_is_empty() {
        let s = unsafe { String::decode(&NativeEnv, std::ptr::null()).unwrap() };
        assert!(s.is_empty());
        let s = unsafe {
            <InteropString as FromWire<NativeEnv>>::decode(&NativeEnv, std::ptr::null()).unwrap()
        };
        assert!(s.is_empty());
    }

    #[test]
    fn test_native_encode_mallocs_terminated_copy() {
        let ptr = unsafe { "ets".to_string().encode(&NativeEnv) };
        let back = unsafe { CStr::from_ptr(ptr) };
        assert_eq!(back.to_bytes(), b"ets");
        unsafe { free_c_string(ptr) };
    }

    #[test]
    fn test_managed_string_round_trip() {
        let env = testing::fake_env();
        let obj = testing::object(FakeObject::Str("καλημέρα".as_bytes().to_vec()));
        let s = unsafe { <String as FromWire<ManagedEnv>>::decode(&env, obj).unwrap() };
        assert_eq!(s, "καλημέρα");

        let back = unsafe { s.encode(&env) };
        match unsafe { testing::get(back) } {
            FakeObject::Str(bytes) => assert_eq!(bytes.as_slice(), "καλημέρα".as_bytes()),
            _ => panic!("expected a string object"),
        }
        assert_eq!(testing::calls(), ["new_string"]);
    }

    #[test]
    fn test_managed_interop_string_owns_copy_with_nuls() {
        let env = testing::fake_env();
        let obj = testing::object(FakeObject::Str(b"a\0b".to_vec()));
        let s = unsafe { <InteropString as FromWire<ManagedEnv>>::decode(&env, obj).unwrap() };
        assert!(!s.is_borrowed());
        assert_eq!(s.len(), 3);
        assert_eq!(s.as_bytes(), b"a\0b");
    }
}
