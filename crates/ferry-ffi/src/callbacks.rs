//! Callback exports
//!
//! Two ways for native code to reach managed callbacks:
//!
//! - the event queue, polled by the managed side through `CheckCallbackEvent`
//! - direct dispatch through a caller the managed side installs with
//!   [`ferry_SetCallbackCaller`] / [`ferry_SetCallbackCallerSync`]

use std::ffi::c_void;

use parking_lot::RwLock;

use ferry_native::interop;
use ferry_sdk::{ByteArray, CallbackQueue, InteropError, NativePointer, ResourceHolder, VmContext};

use crate::context::interop_context;

/// Asynchronous callback caller installed by the managed side
pub type CallbackCaller = unsafe extern "C" fn(kind: i32, args: *mut u8, length: i32);

/// Synchronous callback caller; runs on the caller's thread with its context
pub type CallbackCallerSync = unsafe extern "C" fn(ctx: *mut c_void, kind: i32, args: *mut u8, length: i32) -> i32;

type ResourceFn = unsafe extern "C" fn(resource_id: i32);

/// Process-wide direct callback callers
#[derive(Debug, Default)]
pub struct CallbackCallers {
    caller: RwLock<Option<CallbackCaller>>,
    caller_sync: RwLock<Option<CallbackCallerSync>>,
}

impl CallbackCallers {
    /// No callers installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or clear the asynchronous caller
    pub fn set_caller(&self, caller: Option<CallbackCaller>) {
        *self.caller.write() = caller;
    }

    /// Install or clear the synchronous caller
    pub fn set_caller_sync(&self, caller: Option<CallbackCallerSync>) {
        *self.caller_sync.write() = caller;
    }

    /// Dispatch through the asynchronous caller; false when none is installed
    pub fn call(&self, kind: i32, args: &mut [u8]) -> bool {
        let Some(caller) = *self.caller.read() else {
            log::debug!("No callback caller installed, dropping callback {}", kind);
            return false;
        };
        unsafe { caller(kind, args.as_mut_ptr(), args.len() as i32) };
        true
    }

    /// Dispatch through the synchronous caller; `None` when none is installed
    pub fn call_sync(&self, ctx: VmContext, kind: i32, args: &mut [u8]) -> Option<i32> {
        let Some(caller) = *self.caller_sync.read() else {
            log::debug!("No sync callback caller installed, dropping callback {}", kind);
            return None;
        };
        Some(unsafe { caller(ctx.as_ptr(), kind, args.as_mut_ptr(), args.len() as i32) })
    }
}

/// Queue a callback invocation for the managed side
pub fn enqueue_callback(args: &[u8], holder: ResourceHolder) -> Result<(), InteropError> {
    interop_context().callbacks().enqueue_callback(args, holder)
}

/// The process-wide callback queue
pub fn callback_queue() -> &'static CallbackQueue {
    interop_context().callbacks()
}

/// Synchronous entry handed to foreign VMs; returns 0 when no caller is installed.
pub unsafe extern "C" fn foreign_call_sync(ctx: *mut c_void, kind: i32, data: *mut u8, length: i32) -> i32 {
    let args: &mut [u8] = if data.is_null() || length <= 0 {
        &mut []
    } else {
        std::slice::from_raw_parts_mut(data, length as usize)
    };
    interop_context()
        .callers()
        .call_sync(VmContext::from_ptr(ctx), kind, args)
        .unwrap_or(0)
}

/// Install the asynchronous callback caller (null clears it)
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn ferry_SetCallbackCaller(caller: Option<CallbackCaller>) {
    interop_context().callers().set_caller(caller);
}

/// Install the synchronous callback caller (null clears it)
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn ferry_SetCallbackCallerSync(caller: Option<CallbackCallerSync>) {
    interop_context().callers().set_caller_sync(caller);
}

fn resource_fn(ptr: NativePointer) -> Result<ResourceFn, String> {
    if ptr.is_null() {
        return Err("null resource function".to_string());
    }
    Ok(unsafe { std::mem::transmute::<*mut c_void, ResourceFn>(ptr.as_ptr()) })
}

pub(crate) fn args_slice(args: &mut ByteArray, length: i32) -> &mut [u8] {
    let mut length = usize::try_from(length).unwrap_or(0);
    if let Some(len) = args.known_len() {
        length = length.min(len);
    }
    unsafe { args.slice_mut(length) }
}

/// Poll one event into `buffer`: 1 written, 0 queue empty, -1 buffer too small.
#[interop]
fn check_callback_event(mut buffer: ByteArray, size: i32) -> i32 {
    let out = args_slice(&mut buffer, size);
    match interop_context().callbacks().poll(out) {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(e) => {
            log::warn!("CheckCallbackEvent: {}", e);
            -1
        }
    }
}

#[interop]
fn hold_callback_resource(resource_id: i32) {
    interop_context().callbacks().hold_managed_resource(resource_id);
}

#[interop]
fn release_callback_resource(resource_id: i32) {
    interop_context().callbacks().release_managed_resource(resource_id);
}

#[interop]
fn call_callback_resource_holder(holder: NativePointer, resource_id: i32) -> Result<(), String> {
    let holder = resource_fn(holder)?;
    unsafe { holder(resource_id) };
    Ok(())
}

#[interop]
fn call_callback_resource_releaser(releaser: NativePointer, resource_id: i32) -> Result<(), String> {
    let releaser = resource_fn(releaser)?;
    unsafe { releaser(resource_id) };
    Ok(())
}

#[interop]
fn call_callback(kind: i32, mut args: ByteArray, length: i32) {
    let args = args_slice(&mut args, length);
    interop_context().callers().call(kind, args);
}

#[interop(ctx)]
fn call_callback_sync(ctx: VmContext, kind: i32, mut args: ByteArray, length: i32) {
    let args = args_slice(&mut args, length);
    interop_context().callers().call_sync(ctx, kind, args);
}
