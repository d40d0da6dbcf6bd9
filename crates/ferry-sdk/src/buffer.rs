//! Raw byte buffers
//!
//! Native-flavor callers see the C structs directly. Managed-flavor callers
//! get a runtime byte array holding a copy; the native storage is disposed as
//! soon as the copy exists.

use std::ffi::c_void;

use crate::convert::{FromWire, IntoWire};
use crate::env::{ManagedEnv, NativeEnv, ObjectRef};
use crate::error::{InteropError, InteropResult};

/// Disposer of an [`InteropBuffer`], called with the owning resource id
pub type BufferDisposer = unsafe extern "C" fn(resource_id: i32);

/// Disposer of a [`ReturnBuffer`], called with the data pointer and length
pub type ReturnDisposer = unsafe extern "C" fn(data: *mut c_void, length: i32);

// ============================================================================
// SerializerBuffer
// ============================================================================

/// Start of a caller-managed serialization buffer.
///
/// Managed callers pass the address as a 64-bit integer.
#[derive(Debug, Clone, Copy)]
pub struct SerializerBuffer(*mut u8);

impl SerializerBuffer {
    /// Wrap a buffer address
    pub fn from_ptr(ptr: *mut u8) -> Self {
        SerializerBuffer(ptr)
    }

    /// Buffer address
    pub fn as_ptr(self) -> *mut u8 {
        self.0
    }
}

impl FromWire<NativeEnv> for SerializerBuffer {
    type Wire = *mut u8;

    unsafe fn decode(_env: &NativeEnv, wire: *mut u8) -> InteropResult<Self> {
        Ok(SerializerBuffer(wire))
    }
}

impl FromWire<ManagedEnv> for SerializerBuffer {
    type Wire = i64;

    unsafe fn decode(_env: &ManagedEnv, wire: i64) -> InteropResult<Self> {
        Ok(SerializerBuffer(wire as usize as *mut u8))
    }
}

// ============================================================================
// InteropBuffer
// ============================================================================

/// Bytes kept alive by a managed-side resource.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InteropBuffer {
    /// Byte length
    pub length: i64,
    /// Start of the bytes
    pub data: *mut c_void,
    /// Resource that owns `data`
    pub resource_id: i32,
    /// Releases `resource_id`; `None` for borrowed buffers
    pub dispose: Option<BufferDisposer>,
}

impl InteropBuffer {
    /// Buffer without an owner
    pub fn borrowed(data: *mut c_void, length: i64) -> Self {
        InteropBuffer {
            length,
            data,
            resource_id: 0,
            dispose: None,
        }
    }

    /// View the bytes.
    ///
    /// # Safety
    /// `data` must point to `length` readable bytes.
    pub unsafe fn as_slice(&self) -> &[u8] {
        if self.data.is_null() || self.length <= 0 {
            return &[];
        }
        std::slice::from_raw_parts(self.data as *const u8, self.length as usize)
    }

    /// Run the disposer, if any.
    ///
    /// # Safety
    /// Must be called at most once per buffer.
    pub unsafe fn dispose(self) {
        if let Some(dispose) = self.dispose {
            dispose(self.resource_id);
        }
    }
}

impl Default for InteropBuffer {
    fn default() -> Self {
        InteropBuffer::borrowed(std::ptr::null_mut(), 0)
    }
}

impl FromWire<NativeEnv> for InteropBuffer {
    type Wire = InteropBuffer;

    unsafe fn decode(_env: &NativeEnv, wire: InteropBuffer) -> InteropResult<Self> {
        Ok(wire)
    }
}

impl IntoWire<NativeEnv> for InteropBuffer {
    type Wire = InteropBuffer;

    unsafe fn encode(self, _env: &NativeEnv) -> InteropBuffer {
        self
    }

    fn null_wire() -> InteropBuffer {
        InteropBuffer::default()
    }
}

impl FromWire<ManagedEnv> for InteropBuffer {
    type Wire = ObjectRef;

    unsafe fn decode(env: &ManagedEnv, wire: ObjectRef) -> InteropResult<Self> {
        if wire.is_null() {
            return Ok(InteropBuffer::default());
        }
        let length = env.array_length(wire) as i64;
        Ok(InteropBuffer::borrowed(env.pin_bytes(wire) as *mut c_void, length))
    }

    unsafe fn release(env: &ManagedEnv, wire: ObjectRef) {
        if !wire.is_null() {
            env.unpin_bytes(wire);
        }
    }
}

impl IntoWire<ManagedEnv> for InteropBuffer {
    type Wire = ObjectRef;

    unsafe fn encode(self, env: &ManagedEnv) -> ObjectRef {
        let array = env.new_byte_array(self.as_slice());
        self.dispose();
        array
    }

    fn null_wire() -> ObjectRef {
        std::ptr::null_mut()
    }
}

// ============================================================================
// ReturnBuffer
// ============================================================================

/// Freshly allocated bytes handed to the caller together with their disposer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ReturnBuffer {
    /// Byte length
    pub length: i32,
    /// Start of the bytes
    pub data: *mut c_void,
    /// Frees `data`
    pub dispose: Option<ReturnDisposer>,
}

impl ReturnBuffer {
    /// Move `bytes` into a buffer freed by [`ReturnBuffer::dispose`].
    ///
    /// Fails with `TooLarge` when the length does not fit the i32 length field.
    pub fn from_vec(bytes: Vec<u8>) -> InteropResult<Self> {
        let length = wire_length(bytes.len())?;
        let data = Box::into_raw(bytes.into_boxed_slice()) as *mut u8 as *mut c_void;
        Ok(ReturnBuffer {
            length,
            data,
            dispose: Some(free_boxed_bytes),
        })
    }

    /// View the bytes.
    ///
    /// # Safety
    /// `data` must point to `length` readable bytes.
    pub unsafe fn as_slice(&self) -> &[u8] {
        if self.data.is_null() || self.length <= 0 {
            return &[];
        }
        std::slice::from_raw_parts(self.data as *const u8, self.length as usize)
    }

    /// Free the bytes.
    ///
    /// # Safety
    /// Must be called at most once per buffer.
    pub unsafe fn dispose(self) {
        if let Some(dispose) = self.dispose {
            dispose(self.data, self.length);
        }
    }
}

impl Default for ReturnBuffer {
    fn default() -> Self {
        ReturnBuffer {
            length: 0,
            data: std::ptr::null_mut(),
            dispose: None,
        }
    }
}

fn wire_length(length: usize) -> InteropResult<i32> {
    i32::try_from(length).map_err(|_| InteropError::TooLarge {
        length,
        limit: i32::MAX as usize,
    })
}

unsafe extern "C" fn free_boxed_bytes(data: *mut c_void, length: i32) {
    if !data.is_null() {
        let slice = std::ptr::slice_from_raw_parts_mut(data as *mut u8, length as usize);
        drop(Box::from_raw(slice));
    }
}

impl IntoWire<NativeEnv> for ReturnBuffer {
    type Wire = ReturnBuffer;

    unsafe fn encode(self, _env: &NativeEnv) -> ReturnBuffer {
        self
    }

    fn null_wire() -> ReturnBuffer {
        ReturnBuffer::default()
    }
}

impl IntoWire<ManagedEnv> for ReturnBuffer {
    type Wire = ObjectRef;

    unsafe fn encode(self, env: &ManagedEnv) -> ObjectRef {
        let array = env.new_byte_array(self.as_slice());
        self.dispose();
        array
    }

    fn null_wire() -> ObjectRef {
        std::ptr::null_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeObject};
    use std::sync::atomic::{AtomicI32, Ordering};

    static DISPOSED: AtomicI32 = AtomicI32::new(0);

    unsafe extern "C" fn record_dispose(resource_id: i32) {
        DISPOSED.store(resource_id, Ordering::SeqCst);
    }

    #[test]
    fn test_return_buffer_from_vec() {
        let buf = ReturnBuffer::from_vec(vec![7; 16]).unwrap();
        assert_eq!(buf.length, 16);
        assert_eq!(unsafe { buf.as_slice() }, &[7; 16]);
        unsafe { buf.dispose() };
    }

    #[test]
    fn test_wire_length_limit() {
        assert_eq!(wire_length(0).unwrap(), 0);
        assert_eq!(wire_length(i32::MAX as usize).unwrap(), i32::MAX);
        let err = wire_length(1 << 31).unwrap_err();
        assert!(matches!(
            err,
            InteropError::TooLarge { length, limit } if length == 1 << 31 && limit == i32::MAX as usize
        ));
    }

    #[test]
    fn test_managed_return_buffer_is_copied() {
        let env = testing::fake_env();
        let buf = ReturnBuffer::from_vec(b"xyz".to_vec()).unwrap();
        let array = unsafe { buf.encode(&env) };
        match unsafe { testing::get(array) } {
            FakeObject::Bytes(v) => assert_eq!(v.as_slice(), b"xyz"),
            _ => panic!("expected a byte array"),
        }
    }

    #[test]
    fn test_managed_interop_buffer_disposes_owner() {
        let env = testing::fake_env();
        let mut bytes = *b"data";
        let buf = InteropBuffer {
            length: 4,
            data: bytes.as_mut_ptr() as *mut c_void,
            resource_id: 42,
            dispose: Some(record_dispose),
        };
        let array = unsafe { buf.encode(&env) };
        assert!(!array.is_null());
        assert_eq!(DISPOSED.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_serializer_buffer_address() {
        let env = testing::fake_env();
        let mut storage = [0u8; 8];
        let addr = storage.as_mut_ptr() as usize as i64;
        let buf = unsafe { <SerializerBuffer as FromWire<ManagedEnv>>::decode(&env, addr).unwrap() };
        assert_eq!(buf.as_ptr(), storage.as_mut_ptr());
    }
}
