//! A minimal managed runtime for driving generated thunks in tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::ffi::{c_char, CStr};

use ferry_sdk::{ManagedInterface, ObjectRef, RawEnv};

thread_local! {
    static CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static THROWN: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

pub enum Obj {
    Str(Vec<u8>),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Bytes(Vec<u8>),
}

pub fn new_obj(obj: Obj) -> ObjectRef {
    Box::into_raw(Box::new(obj)) as ObjectRef
}

pub fn string(s: &str) -> ObjectRef {
    new_obj(Obj::Str(s.as_bytes().to_vec()))
}

pub unsafe fn obj<'a>(r: ObjectRef) -> &'a mut Obj {
    &mut *(r as *mut Obj)
}

pub unsafe fn read_string(r: ObjectRef) -> String {
    match obj(r) {
        Obj::Str(b) => String::from_utf8(b.clone()).unwrap(),
        _ => panic!("not a string"),
    }
}

pub fn calls() -> Vec<String> {
    CALLS.with(|c| c.borrow().clone())
}

pub fn thrown() -> Vec<String> {
    THROWN.with(|t| t.borrow().clone())
}

fn record(call: String) {
    CALLS.with(|c| c.borrow_mut().push(call));
}

fn id(r: ObjectRef) -> usize {
    r as usize
}

unsafe extern "C" fn string_utf8_length(_: *mut RawEnv, s: ObjectRef) -> i32 {
    match obj(s) {
        Obj::Str(b) => b.len() as i32,
        _ => 0,
    }
}

unsafe extern "C" fn string_utf8_region(_: *mut RawEnv, s: ObjectRef, buf: *mut u8, cap: i32) {
    if let Obj::Str(b) = obj(s) {
        std::ptr::copy_nonoverlapping(b.as_ptr(), buf, b.len().min(cap as usize));
    }
}

unsafe extern "C" fn new_string_utf8(_: *mut RawEnv, data: *const u8, len: i32) -> ObjectRef {
    new_obj(Obj::Str(std::slice::from_raw_parts(data, len as usize).to_vec()))
}

unsafe extern "C" fn array_length(_: *mut RawEnv, a: ObjectRef) -> i32 {
    match obj(a) {
        Obj::Ints(v) => v.len() as i32,
        Obj::Floats(v) => v.len() as i32,
        Obj::Bytes(v) => v.len() as i32,
        Obj::Str(_) => 0,
    }
}

unsafe extern "C" fn pin_int_array(_: *mut RawEnv, a: ObjectRef) -> *mut i32 {
    record(format!("pin {:x}", id(a)));
    match obj(a) {
        Obj::Ints(v) => v.as_mut_ptr(),
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn pin_float_array(_: *mut RawEnv, a: ObjectRef) -> *mut f32 {
    record(format!("pin {:x}", id(a)));
    match obj(a) {
        Obj::Floats(v) => v.as_mut_ptr(),
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn pin_byte_array(_: *mut RawEnv, a: ObjectRef) -> *mut u8 {
    record(format!("pin {:x}", id(a)));
    match obj(a) {
        Obj::Bytes(v) => v.as_mut_ptr(),
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn unpin(_: *mut RawEnv, a: ObjectRef) {
    record(format!("unpin {:x}", id(a)));
}

unsafe extern "C" fn new_byte_array(_: *mut RawEnv, data: *const u8, len: i32) -> ObjectRef {
    new_obj(Obj::Bytes(std::slice::from_raw_parts(data, len as usize).to_vec()))
}

unsafe extern "C" fn throw_error(_: *mut RawEnv, message: *const c_char) {
    let message = CStr::from_ptr(message).to_string_lossy().into_owned();
    THROWN.with(|t| t.borrow_mut().push(message));
}

static TABLE: ManagedInterface = ManagedInterface {
    string_utf8_length,
    string_utf8_region,
    new_string_utf8,
    array_length,
    pin_int_array,
    unpin_int_array: unpin,
    pin_float_array,
    unpin_float_array: unpin,
    pin_byte_array,
    unpin_byte_array: unpin,
    new_byte_array,
    throw_error,
};

/// Fresh env pointer; clears this thread's recorded calls and errors
pub fn env() -> *mut RawEnv {
    CALLS.with(|c| c.borrow_mut().clear());
    THROWN.with(|t| t.borrow_mut().clear());
    Box::leak(Box::new(RawEnv { functions: &TABLE }))
}

/// Expected call log entry for `r`
pub fn pin(r: ObjectRef) -> String {
    format!("pin {:x}", id(r))
}

/// Expected call log entry for `r`
pub fn unpin_of(r: ObjectRef) -> String {
    format!("unpin {:x}", id(r))
}
