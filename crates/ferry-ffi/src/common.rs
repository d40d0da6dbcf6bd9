//! Common interop exports
//!
//! Native strings and pointer vectors handed to the managed side are boxed
//! Rust values behind a [`NativePointer`]. The managed side reads them back
//! through these exports and frees them with the matching finalizer:
//!
//! - `Box<String>`: `StringLength`, `StringData`, `StdStringToString`,
//!   freed by the function returned from `GetStringFinalizer`
//! - `Box<Vec<NativePointer>>`: `GetPtrVectorSize`, `GetPtrVectorElement`,
//!   freed by the function returned from `GetPtrVectorFinalizer`

use std::ffi::c_void;
use std::io::Write;

use ferry_native::interop;
use ferry_sdk::{ByteArray, InteropBuffer, InteropString, NativePointer, ReturnBuffer, VmContext};

use crate::context::interop_context;

/// Prefix of lines written by `NativeLog`
pub const LOG_PREFIX: &str = "ferry";

/// Finalizer signature returned by the `Get*Finalizer` exports
pub type Finalizer = unsafe extern "C" fn(ptr: *mut c_void);

/// Box a string for the managed side
pub fn string_pointer(value: String) -> NativePointer {
    NativePointer::from_box(Box::new(value))
}

/// Box a pointer vector for the managed side
pub fn ptr_vector(values: Vec<NativePointer>) -> NativePointer {
    NativePointer::from_box(Box::new(values))
}

/// Finalizer for pointers made by [`string_pointer`]
pub unsafe extern "C" fn dispose_string(ptr: *mut c_void) {
    if !ptr.is_null() {
        drop(NativePointer::from_ptr(ptr).into_box::<String>());
    }
}

/// Finalizer for pointers made by [`ptr_vector`]
pub unsafe extern "C" fn dispose_ptr_vector(ptr: *mut c_void) {
    if !ptr.is_null() {
        drop(NativePointer::from_ptr(ptr).into_box::<Vec<NativePointer>>());
    }
}

fn finalizer_pointer(finalizer: Finalizer) -> NativePointer {
    NativePointer::from_ptr(finalizer as *mut c_void)
}

// ============================================================================
// Native strings
// ============================================================================

#[interop]
fn string_length(ptr: NativePointer) -> i32 {
    unsafe { ptr.as_ref::<String>() }.map_or(0, |s| s.len() as i32)
}

/// Copies at most `size` bytes; a terminator is written when there is room.
#[interop]
fn string_data(ptr: NativePointer, mut bytes: ByteArray, size: u32) {
    let Some(s) = (unsafe { ptr.as_ref::<String>() }) else {
        return;
    };
    let size = match bytes.known_len() {
        Some(len) => (size as usize).min(len),
        None => size as usize,
    };
    let dst = unsafe { bytes.slice_mut(size) };
    let src = s.as_bytes();
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    if let Some(terminator) = dst.get_mut(n) {
        *terminator = 0;
    }
}

/// Borrowed view of a native string's bytes, valid until it is finalized.
#[interop(ctx)]
fn string_data_bytes(_ctx: VmContext, ptr: NativePointer) -> InteropBuffer {
    match unsafe { ptr.as_ref::<String>() } {
        Some(s) => InteropBuffer::borrowed(s.as_ptr() as *mut c_void, s.len() as i64),
        None => InteropBuffer::default(),
    }
}

#[interop]
fn string_make(value: String) -> NativePointer {
    string_pointer(value)
}

#[interop]
fn get_string_finalizer() -> NativePointer {
    finalizer_pointer(dispose_string)
}

#[interop]
fn invoke_finalizer(obj: NativePointer, finalizer: NativePointer) -> Result<(), String> {
    if finalizer.is_null() {
        return Err("null finalizer".to_string());
    }
    let finalizer: Finalizer = unsafe { std::mem::transmute::<*mut c_void, Finalizer>(finalizer.as_ptr()) };
    unsafe { finalizer(obj.as_ptr()) };
    Ok(())
}

#[interop(ctx)]
fn std_string_to_string(_ctx: VmContext, ptr: NativePointer) -> String {
    unsafe { ptr.as_ref::<String>() }.cloned().unwrap_or_default()
}

// ============================================================================
// Pointer vectors
// ============================================================================

#[interop]
fn get_ptr_vector_size(ptr: NativePointer) -> i32 {
    unsafe { ptr.as_ref::<Vec<NativePointer>>() }.map_or(0, |v| v.len() as i32)
}

#[interop]
fn get_ptr_vector_element(ptr: NativePointer, index: i32) -> Result<NativePointer, String> {
    let vector = unsafe { ptr.as_ref::<Vec<NativePointer>>() }.ok_or("null pointer vector")?;
    usize::try_from(index)
        .ok()
        .and_then(|i| vector.get(i).copied())
        .ok_or_else(|| format!("index {} out of range for vector of {}", index, vector.len()))
}

#[interop]
fn get_ptr_vector_finalizer() -> NativePointer {
    finalizer_pointer(dispose_ptr_vector)
}

// ============================================================================
// Managed strings and byte buffers
// ============================================================================

/// Writes the string plus a terminator at `offset`; returns the bytes written.
#[interop]
fn managed_string_write(value: InteropString, mut buffer: ByteArray, offset: i32) -> Result<i32, String> {
    let offset = usize::try_from(offset).map_err(|_| format!("negative offset {}", offset))?;
    let needed = offset + value.len() + 1;
    if let Some(len) = buffer.known_len() {
        if needed > len {
            return Err(format!("string of {} bytes does not fit at {} in {}", value.len(), offset, len));
        }
    }
    let dst = unsafe { buffer.slice_mut(needed) };
    if dst.is_empty() {
        return Err("null buffer".to_string());
    }
    dst[offset..needed - 1].copy_from_slice(value.as_bytes());
    dst[needed - 1] = 0;
    Ok((value.len() + 1) as i32)
}

#[interop(ctx)]
fn utf8_to_string(_ctx: VmContext, data: ByteArray, offset: i32, length: i32) -> Result<InteropString, String> {
    let (offset, length) = match (usize::try_from(offset), usize::try_from(length)) {
        (Ok(o), Ok(l)) => (o, l),
        _ => return Err(format!("invalid range {}+{}", offset, length)),
    };
    if let Some(len) = data.known_len() {
        if offset + length > len {
            return Err(format!("range {}+{} exceeds {} bytes", offset, length, len));
        }
    }
    let bytes = unsafe { data.slice(offset + length) };
    match bytes.get(offset..) {
        Some(slice) => Ok(InteropString::from_bytes(slice.to_vec())),
        None => Ok(InteropString::default()),
    }
}

#[interop(ctx)]
fn raw_return_data(_ctx: VmContext, length: i32, fill: i32) -> Result<ReturnBuffer, String> {
    let length = usize::try_from(length).map_err(|_| format!("negative length {}", length))?;
    ReturnBuffer::from_vec(vec![fill as u8; length]).map_err(|e| e.to_string())
}

/// Holds `resource_id` and returns a buffer that releases it when disposed.
#[interop]
fn materialize_buffer(
    data: NativePointer,
    length: i64,
    resource_id: i32,
    hold: NativePointer,
    release: NativePointer,
) -> Result<InteropBuffer, String> {
    if hold.is_null() || release.is_null() {
        return Err("hold and release functions are required".to_string());
    }
    type ResourceFn = unsafe extern "C" fn(i32);
    let hold = unsafe { std::mem::transmute::<*mut c_void, ResourceFn>(hold.as_ptr()) };
    let release = unsafe { std::mem::transmute::<*mut c_void, ResourceFn>(release.as_ptr()) };
    unsafe { hold(resource_id) };
    Ok(InteropBuffer {
        length,
        data: data.as_ptr(),
        resource_id,
        dispose: Some(release),
    })
}

#[interop]
fn get_native_buffer_pointer(buffer: InteropBuffer) -> NativePointer {
    NativePointer::from_ptr(buffer.data)
}

#[interop]
fn native_log(message: InteropString) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let _ = writeln!(out, "{}: {}", LOG_PREFIX, message);
    let _ = out.flush();
}

// ============================================================================
// Grouped logs
// ============================================================================

fn group_index(index: i32) -> Result<usize, String> {
    usize::try_from(index).map_err(|_| format!("negative log group {}", index))
}

#[interop]
fn get_grouped_log(index: i32) -> Result<NativePointer, String> {
    Ok(string_pointer(interop_context().grouped_logs().text(group_index(index)?)))
}

#[interop]
fn start_grouped_log(index: i32) -> Result<(), String> {
    interop_context().grouped_logs().start(group_index(index)?);
    Ok(())
}

#[interop]
fn stop_grouped_log(index: i32) -> Result<(), String> {
    interop_context().grouped_logs().stop(group_index(index)?);
    Ok(())
}

#[interop]
fn append_grouped_log(index: i32, message: InteropString) -> Result<(), String> {
    interop_context().grouped_logs().append(group_index(index)?, &message.to_str_lossy());
    Ok(())
}

#[interop]
fn print_grouped_log(index: i32) -> Result<(), String> {
    let text = interop_context().grouped_logs().text(group_index(index)?);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let _ = writeln!(out, "{}", text);
    let _ = out.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_pointer_roundtrip() {
        let ptr = string_pointer("hello".to_string());
        assert_eq!(string_length(ptr), 5);

        let mut out = [0xffu8; 8];
        string_data(ptr, ByteArray::from_raw(out.as_mut_ptr()), 8);
        assert_eq!(&out[..6], b"hello\0");

        let mut short = [0xffu8; 3];
        string_data(ptr, ByteArray::from_raw(short.as_mut_ptr()), 3);
        assert_eq!(&short, b"hel");

        unsafe { dispose_string(ptr.as_ptr()) };
    }

    #[test]
    fn test_string_data_bytes_borrows() {
        let ptr = string_pointer("borrowed".to_string());
        let view = string_data_bytes(VmContext::null(), ptr);
        assert_eq!(view.length, 8);
        assert_eq!(unsafe { view.as_slice() }, b"borrowed");
        assert!(view.dispose.is_none());
        unsafe { dispose_string(ptr.as_ptr()) };
        assert_eq!(string_data_bytes(VmContext::null(), NativePointer::null()).length, 0);
    }

    #[test]
    fn test_grouped_log_exports() {
        assert!(start_grouped_log(-1).is_err());
        start_grouped_log(7).unwrap();
        append_grouped_log(7, "first ".into()).unwrap();
        append_grouped_log(7, "second".into()).unwrap();
        stop_grouped_log(7).unwrap();
        append_grouped_log(7, " ignored".into()).unwrap();
        print_grouped_log(7).unwrap();

        let text = get_grouped_log(7).unwrap();
        assert_eq!(unsafe { text.as_ref::<String>() }.unwrap(), "first second");
        unsafe { dispose_string(text.as_ptr()) };
    }

    #[test]
    fn test_null_string_pointer() {
        assert_eq!(string_length(NativePointer::null()), 0);
        assert_eq!(std_string_to_string(VmContext::null(), NativePointer::null()), "");
    }

    #[test]
    fn test_invoke_string_finalizer() {
        let ptr = string_make("gone".to_string());
        assert!(invoke_finalizer(ptr, get_string_finalizer()).is_ok());
        assert!(invoke_finalizer(ptr, NativePointer::null()).is_err());
    }

    #[test]
    fn test_ptr_vector() {
        let a = NativePointer::from_addr(0x10);
        let b = NativePointer::from_addr(0x20);
        let vector = ptr_vector(vec![a, b]);
        assert_eq!(get_ptr_vector_size(vector), 2);
        assert_eq!(get_ptr_vector_element(vector, 1), Ok(b));
        assert!(get_ptr_vector_element(vector, 2).is_err());
        assert!(get_ptr_vector_element(vector, -1).is_err());
        assert!(invoke_finalizer(vector, get_ptr_vector_finalizer()).is_ok());
    }

    #[test]
    fn test_managed_string_write() {
        let mut buffer = [0xaau8; 8];
        let n = managed_string_write("abc".into(), ByteArray::from_raw(buffer.as_mut_ptr()), 2).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buffer[..7], &[0xaa, 0xaa, b'a', b'b', b'c', 0, 0xaa]);
        assert!(managed_string_write("x".into(), ByteArray::from_raw(buffer.as_mut_ptr()), -1).is_err());
    }

    #[test]
    fn test_utf8_to_string() {
        let mut bytes = *b"..text..";
        let s = utf8_to_string(VmContext::null(), ByteArray::from_raw(bytes.as_mut_ptr()), 2, 4).unwrap();
        assert_eq!(s, "text");
        assert!(utf8_to_string(VmContext::null(), ByteArray::from_raw(bytes.as_mut_ptr()), 0, -4).is_err());
    }

    #[test]
    fn test_raw_return_data() {
        let buffer = raw_return_data(VmContext::null(), 4, 7).unwrap();
        assert_eq!(buffer.length, 4);
        assert_eq!(unsafe { buffer.as_slice() }, &[7, 7, 7, 7]);
        unsafe { buffer.dispose() };
        assert!(raw_return_data(VmContext::null(), -1, 0).is_err());
    }

    use std::sync::atomic::{AtomicI32, Ordering};

    static HELD: AtomicI32 = AtomicI32::new(0);
    static RELEASED: AtomicI32 = AtomicI32::new(0);

    unsafe extern "C" fn hold(id: i32) {
        HELD.store(id, Ordering::SeqCst);
    }

    unsafe extern "C" fn release(id: i32) {
        RELEASED.store(id, Ordering::SeqCst);
    }

    #[test]
    fn test_materialize_buffer_holds_then_releases() {
        let mut data = [1u8, 2, 3];
        let buffer = materialize_buffer(
            NativePointer::from_ptr(data.as_mut_ptr() as *mut c_void),
            3,
            42,
            NativePointer::from_ptr(hold as *mut c_void),
            NativePointer::from_ptr(release as *mut c_void),
        )
        .unwrap();
        assert_eq!(HELD.load(Ordering::SeqCst), 42);
        assert_eq!(RELEASED.load(Ordering::SeqCst), 0);
        assert_eq!(get_native_buffer_pointer(buffer).as_ptr(), data.as_mut_ptr() as *mut c_void);
        assert_eq!(unsafe { buffer.as_slice() }, &[1, 2, 3]);
        unsafe { buffer.dispose() };
        assert_eq!(RELEASED.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_materialize_requires_functions() {
        let err = materialize_buffer(NativePointer::null(), 0, 1, NativePointer::null(), NativePointer::null());
        assert!(err.is_err());
    }
}
