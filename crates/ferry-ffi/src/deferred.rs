//! C entry points for deferred promises
//!
//! Native code creates a deferred with [`ferry_CreateDeferred`], hands the
//! promise id to the managed caller, and later settles the deferred from any
//! thread. Settling frees the deferred. Unless another promise runtime was
//! installed, the managed side collects settlements by polling
//! `CheckSettlement`.

use std::ffi::{c_char, c_void, CStr};

use ferry_native::interop;
use ferry_sdk::{ByteArray, Deferred, InteropError, VmContext};

use crate::callbacks::args_slice;
use crate::context::interop_context;

/// Create a deferred; writes the promise id to `promise_out` and returns the
/// deferred, or null if the runtime could not create a promise.
///
/// # Safety
/// `promise_out` must be null or writable.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn ferry_CreateDeferred(ctx: *mut c_void, promise_out: *mut u64) -> *mut Deferred {
    let runtime = interop_context().promise_runtime();
    match Deferred::create(runtime.as_ref(), VmContext::from_ptr(ctx)) {
        Ok((deferred, promise)) => {
            if !promise_out.is_null() {
                *promise_out = promise.0;
            }
            Box::into_raw(Box::new(deferred))
        }
        Err(e) => {
            log::error!("Cannot create deferred: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// Resolve and free `deferred` with `len` bytes of `data`.
///
/// # Safety
/// `deferred` must come from [`ferry_CreateDeferred`] and not be settled yet;
/// `data` must be null or hold `len` bytes.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn ferry_ResolveDeferred(deferred: *mut Deferred, data: *const u8, len: i32) {
    if deferred.is_null() {
        return;
    }
    let deferred = Box::from_raw(deferred);
    let data: &[u8] = if data.is_null() || len <= 0 {
        &[]
    } else {
        std::slice::from_raw_parts(data, len as usize)
    };
    deferred.resolve(data);
}

/// Reject and free `deferred` with a NUL-terminated `message`.
///
/// # Safety
/// `deferred` must come from [`ferry_CreateDeferred`] and not be settled yet;
/// `message` must be null or NUL-terminated.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn ferry_RejectDeferred(deferred: *mut Deferred, message: *const c_char) {
    if deferred.is_null() {
        return;
    }
    let deferred = Box::from_raw(deferred);
    let message = if message.is_null() {
        String::new()
    } else {
        CStr::from_ptr(message).to_string_lossy().into_owned()
    };
    deferred.reject(&message);
}

/// Poll one settlement record into `buffer`.
///
/// Returns the record length, 0 when nothing has settled, or the negated
/// record length when `buffer` is too small; the settlement then stays
/// pending.
#[interop]
fn check_settlement(mut buffer: ByteArray, size: i32) -> i32 {
    let out = args_slice(&mut buffer, size);
    match interop_context().channel_runtime().poll_settlement(out) {
        Ok(Some(written)) => i32::try_from(written).unwrap_or(i32::MAX),
        Ok(None) => 0,
        Err(InteropError::BufferTooSmall { needed, .. }) => -i32::try_from(needed).unwrap_or(i32::MAX),
        Err(e) => {
            log::warn!("CheckSettlement: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_settlement() -> Option<(u64, i32, Vec<u8>)> {
        let mut record = vec![0u8; 64];
        let written = unsafe { ferry_CheckSettlement(record.as_mut_ptr(), record.len() as i32) };
        if written == 0 {
            return None;
        }
        assert!(written > 0, "record needs {} bytes", -written);
        let promise = u64::from_ne_bytes(record[..8].try_into().unwrap());
        let status = i32::from_ne_bytes(record[8..12].try_into().unwrap());
        let length = i32::from_ne_bytes(record[12..16].try_into().unwrap()) as usize;
        Some((promise, status, record[16..16 + length].to_vec()))
    }

    #[test]
    fn test_settle_through_c_entries() {
        let mut resolved_id = 0u64;
        let resolved = unsafe { ferry_CreateDeferred(std::ptr::null_mut(), &mut resolved_id) };
        assert!(!resolved.is_null());
        let mut rejected_id = 0u64;
        let rejected = unsafe { ferry_CreateDeferred(std::ptr::null_mut(), &mut rejected_id) };
        assert_ne!(resolved_id, rejected_id);

        let payload = b"ast".to_vec();
        let handle = resolved as usize;
        std::thread::spawn(move || unsafe {
            ferry_ResolveDeferred(handle as *mut Deferred, payload.as_ptr(), payload.len() as i32)
        })
        .join()
        .unwrap();
        unsafe { ferry_RejectDeferred(rejected, b"parse error\0".as_ptr() as *const c_char) };

        let mut settlements = Vec::new();
        while let Some(settlement) = next_settlement() {
            if settlement.0 == resolved_id || settlement.0 == rejected_id {
                settlements.push(settlement);
            }
        }
        settlements.sort_by_key(|(id, _, _)| *id);
        assert_eq!(settlements[0], (resolved_id, 0, b"ast".to_vec()));
        assert_eq!(settlements[1], (rejected_id, 1, b"parse error".to_vec()));
    }

    #[test]
    fn test_null_deferred_is_ignored() {
        unsafe {
            ferry_ResolveDeferred(std::ptr::null_mut(), std::ptr::null(), 0);
            ferry_RejectDeferred(std::ptr::null_mut(), std::ptr::null());
        }
    }
}
