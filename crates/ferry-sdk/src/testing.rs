//! In-process stand-ins for the calling runtimes, shared by unit tests.

use std::cell::RefCell;
use std::ffi::{c_char, CStr};

use crate::env::{Env, ManagedEnv, ManagedInterface, ObjectRef, RawEnv, VmContext};

thread_local! {
    static CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static THROWN: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Environment that records thrown messages instead of aborting
#[derive(Default)]
pub struct RecordingEnv {
    pub thrown: RefCell<Vec<String>>,
}

impl Env for RecordingEnv {
    fn context(&self) -> VmContext {
        VmContext::null()
    }

    fn throw_error(&self, message: &str) {
        self.thrown.borrow_mut().push(message.to_string());
    }
}

/// Objects the fake managed runtime hands out
pub enum FakeObject {
    Str(Vec<u8>),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Bytes(Vec<u8>),
}

pub fn object(obj: FakeObject) -> ObjectRef {
    Box::into_raw(Box::new(obj)) as ObjectRef
}

pub unsafe fn get<'a>(obj: ObjectRef) -> &'a mut FakeObject {
    &mut *(obj as *mut FakeObject)
}

/// Pin/unpin/new-object calls seen since the last `fake_env()`
pub fn calls() -> Vec<String> {
    CALLS.with(|c| c.borrow().clone())
}

/// Messages thrown since the last `fake_env()`
pub fn thrown() -> Vec<String> {
    THROWN.with(|t| t.borrow().clone())
}

fn record(call: &str) {
    CALLS.with(|c| c.borrow_mut().push(call.to_string()));
}

unsafe extern "C" fn string_utf8_length(_env: *mut RawEnv, s: ObjectRef) -> i32 {
    match get(s) {
        FakeObject::Str(b) => b.len() as i32,
        _ => 0,
    }
}

unsafe extern "C" fn string_utf8_region(_env: *mut RawEnv, s: ObjectRef, buf: *mut u8, cap: i32) {
    if let FakeObject::Str(b) = get(s) {
        let n = b.len().min(cap as usize);
        std::ptr::copy_nonoverlapping(b.as_ptr(), buf, n);
    }
}

unsafe extern "C" fn new_string_utf8(_env: *mut RawEnv, data: *const u8, len: i32) -> ObjectRef {
    record("new_string");
    let bytes = std::slice::from_raw_parts(data, len as usize).to_vec();
    object(FakeObject::Str(bytes))
}

unsafe extern "C" fn array_length(_env: *mut RawEnv, a: ObjectRef) -> i32 {
    match get(a) {
        FakeObject::Ints(v) => v.len() as i32,
        FakeObject::Floats(v) => v.len() as i32,
        FakeObject::Bytes(v) => v.len() as i32,
        FakeObject::Str(_) => 0,
    }
}

unsafe extern "C" fn pin_int_array(_env: *mut RawEnv, a: ObjectRef) -> *mut i32 {
    record("pin_ints");
    match get(a) {
        FakeObject::Ints(v) => v.as_mut_ptr(),
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn unpin_int_array(_env: *mut RawEnv, _a: ObjectRef) {
    record("unpin_ints");
}

unsafe extern "C" fn pin_float_array(_env: *mut RawEnv, a: ObjectRef) -> *mut f32 {
    record("pin_floats");
    match get(a) {
        FakeObject::Floats(v) => v.as_mut_ptr(),
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn unpin_float_array(_env: *mut RawEnv, _a: ObjectRef) {
    record("unpin_floats");
}

unsafe extern "C" fn pin_byte_array(_env: *mut RawEnv, a: ObjectRef) -> *mut u8 {
    record("pin_bytes");
    match get(a) {
        FakeObject::Bytes(v) => v.as_mut_ptr(),
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn unpin_byte_array(_env: *mut RawEnv, _a: ObjectRef) {
    record("unpin_bytes");
}

unsafe extern "C" fn new_byte_array(_env: *mut RawEnv, data: *const u8, len: i32) -> ObjectRef {
    record("new_bytes");
    let bytes = std::slice::from_raw_parts(data, len as usize).to_vec();
    object(FakeObject::Bytes(bytes))
}

unsafe extern "C" fn throw_error(_env: *mut RawEnv, message: *const c_char) {
    let message = CStr::from_ptr(message).to_string_lossy().into_owned();
    THROWN.with(|t| t.borrow_mut().push(message));
}

static TABLE: ManagedInterface = ManagedInterface {
    string_utf8_length,
    string_utf8_region,
    new_string_utf8,
    array_length,
    pin_int_array,
    unpin_int_array,
    pin_float_array,
    unpin_float_array,
    pin_byte_array,
    unpin_byte_array,
    new_byte_array,
    throw_error,
};

/// Fresh managed environment; clears the recorded calls of this thread
pub fn fake_env() -> ManagedEnv {
    CALLS.with(|c| c.borrow_mut().clear());
    THROWN.with(|t| t.borrow_mut().clear());
    let raw = Box::leak(Box::new(RawEnv { functions: &TABLE }));
    unsafe { ManagedEnv::from_raw(raw) }
}
