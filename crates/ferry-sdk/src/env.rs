//! Calling environments: what a thunk knows about the runtime that called it
//!
//! Two flavors exist:
//!
//! - [`NativeEnv`]: a natively compiled managed language calling through the
//!   plain C ABI. Values arrive as raw C values, there is nothing to pin, and
//!   there is no exception channel.
//! - [`ManagedEnv`]: a managed runtime with its own native interface (and the
//!   JNI-style runtime, which has the same shape). Every thunk receives a
//!   pointer to a [`RawEnv`], whose function table provides string access,
//!   array pinning and error throwing.

use std::ffi::{c_char, c_void, CString};

/// Opaque reference to a managed-runtime object (string, array, class)
pub type ObjectRef = *mut c_void;

// ============================================================================
// VmContext
// ============================================================================

/// Handle back into the calling runtime, passed to `ctx` exports.
///
/// In the managed flavor this is the env pointer; in the native flavor it is
/// null.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmContext(*mut c_void);

unsafe impl Send for VmContext {}
unsafe impl Sync for VmContext {}

impl VmContext {
    /// The context native-flavor thunks pass
    #[inline]
    pub const fn null() -> Self {
        VmContext(std::ptr::null_mut())
    }

    /// Wrap a raw runtime pointer
    #[inline]
    pub const fn from_ptr(ptr: *mut c_void) -> Self {
        VmContext(ptr)
    }

    /// Raw runtime pointer
    #[inline]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }

    /// Check whether this context carries a runtime
    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

// ============================================================================
// Env trait
// ============================================================================

/// Operations every calling environment provides to the conversion layer.
pub trait Env {
    /// Context value handed to `ctx` exports
    fn context(&self) -> VmContext;

    /// Raise an error in the calling runtime.
    ///
    /// After this returns the thunk must return its zero wire value without
    /// touching further runtime state.
    fn throw_error(&self, message: &str);
}

// ============================================================================
// Native flavor
// ============================================================================

/// Environment of native-flavor thunks (plain C ABI, no runtime handle).
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEnv;

impl Env for NativeEnv {
    #[inline]
    fn context(&self) -> VmContext {
        VmContext::null()
    }

    fn throw_error(&self, message: &str) {
        crate::fatal!("Interop error with no exception channel: {}", message)
    }
}

// ============================================================================
// Managed flavor
// ============================================================================

/// Function table a managed runtime supplies with every native call.
///
/// The layout is part of the ABI: runtimes embed a pointer to a table with
/// exactly these entries, in this order.
#[repr(C)]
pub struct ManagedInterface {
    /// UTF-8 byte length of a runtime string
    pub string_utf8_length: unsafe extern "C" fn(env: *mut RawEnv, string: ObjectRef) -> i32,
    /// Copy a runtime string's UTF-8 bytes into `buffer` (no terminator)
    pub string_utf8_region:
        unsafe extern "C" fn(env: *mut RawEnv, string: ObjectRef, buffer: *mut u8, capacity: i32),
    /// Create a runtime string from UTF-8 bytes
    pub new_string_utf8: unsafe extern "C" fn(env: *mut RawEnv, data: *const u8, length: i32) -> ObjectRef,
    /// Element count of a runtime array
    pub array_length: unsafe extern "C" fn(env: *mut RawEnv, array: ObjectRef) -> i32,
    /// Pin an int array and return its element storage
    pub pin_int_array: unsafe extern "C" fn(env: *mut RawEnv, array: ObjectRef) -> *mut i32,
    /// Release a pin taken by `pin_int_array`
    pub unpin_int_array: unsafe extern "C" fn(env: *mut RawEnv, array: ObjectRef),
    /// Pin a float array and return its element storage
    pub pin_float_array: unsafe extern "C" fn(env: *mut RawEnv, array: ObjectRef) -> *mut f32,
    /// Release a pin taken by `pin_float_array`
    pub unpin_float_array: unsafe extern "C" fn(env: *mut RawEnv, array: ObjectRef),
    /// Pin a byte array and return its element storage
    pub pin_byte_array: unsafe extern "C" fn(env: *mut RawEnv, array: ObjectRef) -> *mut u8,
    /// Release a pin taken by `pin_byte_array`
    pub unpin_byte_array: unsafe extern "C" fn(env: *mut RawEnv, array: ObjectRef),
    /// Create a runtime byte array holding a copy of `data`
    pub new_byte_array: unsafe extern "C" fn(env: *mut RawEnv, data: *const u8, length: i32) -> ObjectRef,
    /// Throw a runtime error carrying a NUL-terminated message
    pub throw_error: unsafe extern "C" fn(env: *mut RawEnv, message: *const c_char),
}

/// The env pointer's target: a pointer to the runtime's function table,
/// followed by runtime-private state this layer never reads.
#[repr(C)]
pub struct RawEnv {
    /// Runtime function table
    pub functions: *const ManagedInterface,
}

/// Environment of managed-flavor thunks.
#[derive(Debug, Clone, Copy)]
pub struct ManagedEnv {
    raw: *mut RawEnv,
}

impl ManagedEnv {
    /// Wrap the env pointer a thunk received.
    ///
    /// # Safety
    /// `raw` must point to a live [`RawEnv`] with a valid function table for
    /// the duration of the call.
    #[inline]
    pub unsafe fn from_raw(raw: *mut RawEnv) -> Self {
        ManagedEnv { raw }
    }

    /// The env pointer
    #[inline]
    pub fn as_raw(&self) -> *mut RawEnv {
        self.raw
    }

    #[inline]
    fn table(&self) -> &ManagedInterface {
        unsafe { &*(*self.raw).functions }
    }

    /// Copy a runtime string's UTF-8 bytes
    pub fn read_string(&self, string: ObjectRef) -> Vec<u8> {
        if string.is_null() {
            return Vec::new();
        }
        let table = self.table();
        unsafe {
            let len = (table.string_utf8_length)(self.raw, string).max(0);
            let mut bytes = vec![0u8; len as usize];
            (table.string_utf8_region)(self.raw, string, bytes.as_mut_ptr(), len);
            bytes
        }
    }

    /// Create a runtime string from UTF-8 bytes
    pub fn new_string(&self, bytes: &[u8]) -> ObjectRef {
        unsafe { (self.table().new_string_utf8)(self.raw, bytes.as_ptr(), bytes.len() as i32) }
    }

    /// Element count of a runtime array (0 for null)
    pub fn array_length(&self, array: ObjectRef) -> usize {
        if array.is_null() {
            return 0;
        }
        unsafe { (self.table().array_length)(self.raw, array).max(0) as usize }
    }

    /// Create a runtime byte array holding a copy of `data`
    pub fn new_byte_array(&self, data: &[u8]) -> ObjectRef {
        unsafe { (self.table().new_byte_array)(self.raw, data.as_ptr(), data.len() as i32) }
    }

    /// Pin an int array.
    ///
    /// # Safety
    /// `array` must be a live runtime int array; the pin must be released
    /// with [`unpin_ints`](Self::unpin_ints) exactly once.
    pub unsafe fn pin_ints(&self, array: ObjectRef) -> *mut i32 {
        (self.table().pin_int_array)(self.raw, array)
    }

    /// Release an int array pin.
    ///
    /// # Safety
    /// `array` must currently be pinned by this layer.
    pub unsafe fn unpin_ints(&self, array: ObjectRef) {
        (self.table().unpin_int_array)(self.raw, array)
    }

    /// Pin a float array.
    ///
    /// # Safety
    /// Same contract as [`pin_ints`](Self::pin_ints).
    pub unsafe fn pin_floats(&self, array: ObjectRef) -> *mut f32 {
        (self.table().pin_float_array)(self.raw, array)
    }

    /// Release a float array pin.
    ///
    /// # Safety
    /// `array` must currently be pinned by this layer.
    pub unsafe fn unpin_floats(&self, array: ObjectRef) {
        (self.table().unpin_float_array)(self.raw, array)
    }

    /// Pin a byte array.
    ///
    /// # Safety
    /// Same contract as [`pin_ints`](Self::pin_ints).
    pub unsafe fn pin_bytes(&self, array: ObjectRef) -> *mut u8 {
        (self.table().pin_byte_array)(self.raw, array)
    }

    /// Release a byte array pin.
    ///
    /// # Safety
    /// `array` must currently be pinned by this layer.
    pub unsafe fn unpin_bytes(&self, array: ObjectRef) {
        (self.table().unpin_byte_array)(self.raw, array)
    }
}

impl Env for ManagedEnv {
    #[inline]
    fn context(&self) -> VmContext {
        VmContext::from_ptr(self.raw as *mut c_void)
    }

    fn throw_error(&self, message: &str) {
        // Interior NULs would truncate the message on the runtime side anyway.
        let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
        unsafe { (self.table().throw_error)(self.raw, message.as_ptr()) }
    }
}
