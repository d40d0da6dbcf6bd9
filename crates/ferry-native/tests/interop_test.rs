//! Tests for #[interop]: generated thunks in both calling flavors

mod common;

use std::ffi::{c_char, CStr};
use std::ptr;

use ferry_native::interop;
use ferry_sdk::number::{RawNumber, TAG_FLOAT32, TAG_INT32};
use ferry_sdk::string::free_c_string;
use ferry_sdk::{
    ByteArray, FloatArray, IntArray, InteropNumber, MethodRegistry, NativePointer, VmContext,
    FLAG_SLOW_NATIVE,
};

use common::Obj;

const MODULE: &str = "TestModule";

// ============================================================================
// Exports under test, arity 0 through 5
// ============================================================================

#[interop(module = "TestModule")]
fn answer() -> i32 {
    42
}

#[interop(module = "TestModule")]
fn negate(value: i32) -> i32 {
    -value
}

#[interop(module = "TestModule", name = "ScaleIf")]
fn scale_if(flag: bool, value: f64) -> f64 {
    if flag {
        value * 2.0
    } else {
        value
    }
}

#[interop(module = "TestModule")]
fn sum_ints(values: IntArray, count: i32, bias: i64) -> i64 {
    let values = unsafe { values.slice(count as usize) };
    values.iter().map(|v| *v as i64).sum::<i64>() + bias
}

#[interop(module = "TestModule")]
fn copy_scaled(src: FloatArray, mut dst: FloatArray, count: i32, scale: f32) {
    let n = count as usize;
    let src = unsafe { src.slice(n) };
    let dst = unsafe { dst.slice_mut(n) };
    for (d, s) in dst.iter_mut().zip(src) {
        *d = s * scale;
    }
}

#[interop(module = "TestModule", ctx)]
fn describe(
    ctx: VmContext,
    label: String,
    bytes: ByteArray,
    len: u32,
    number: InteropNumber,
    tag: u8,
) -> String {
    let bytes = unsafe { bytes.slice(len as usize) };
    format!(
        "{}:{}:{:?}:{}:{}",
        label,
        String::from_utf8_lossy(bytes),
        number,
        tag,
        ctx.is_null()
    )
}

#[interop(module = "TestModule")]
fn checked_div(a: i32, b: i32) -> Result<i32, String> {
    if b == 0 {
        Err("division by zero".to_string())
    } else {
        Ok(a / b)
    }
}

#[interop(module = "TestModule")]
fn explode(_values: IntArray) -> i32 {
    panic!("boom")
}

#[interop(module = "TestModule")]
fn wrap_pointer(ptr: NativePointer) -> NativePointer {
    ptr
}

// ============================================================================
// Native flavor
// ============================================================================

#[test]
fn test_native_arity_0_to_2() {
    unsafe {
        assert_eq!(ferry_Answer(), 42);
        assert_eq!(ferry_Negate(5), -5);
        assert_eq!(ferry_ScaleIf(1, 1.25), 2.5);
        assert_eq!(ferry_ScaleIf(0, 1.25), 1.25);
    }
}

#[test]
fn test_native_arrays_are_raw_pointers() {
    let mut ints = [1, 2, 3, 4];
    assert_eq!(unsafe { ferry_SumInts(ints.as_mut_ptr(), 4, 10) }, 20);

    let mut src = [1.0f32, 2.0];
    let mut dst = [0.0f32; 2];
    unsafe { ferry_CopyScaled(src.as_mut_ptr(), dst.as_mut_ptr(), 2, 0.5) };
    assert_eq!(dst, [0.5, 1.0]);
}

#[test]
fn test_native_arity_5_with_context() {
    let label = b"node\0";
    let mut bytes = *b"abc";
    let number = InteropNumber::Int32(7).to_raw();
    let out = unsafe {
        ferry_Describe(
            label.as_ptr() as *const c_char,
            bytes.as_mut_ptr(),
            3,
            number,
            9,
        )
    };
    let text = unsafe { CStr::from_ptr(out) }.to_str().unwrap().to_string();
    unsafe { free_c_string(out) };
    assert_eq!(text, "node:abc:Int32(7):9:true");
}

#[test]
fn test_native_pointer_passthrough() {
    let mut slot = 0u64;
    let raw = &mut slot as *mut u64 as *mut std::ffi::c_void;
    assert_eq!(unsafe { ferry_WrapPointer(raw) }, raw);
}

// ============================================================================
// Managed flavor
// ============================================================================

#[test]
fn test_managed_arity_0_to_2() {
    let env = common::env();
    unsafe {
        assert_eq!(__ferry_managed_Answer(env, ptr::null_mut()), 42);
        assert_eq!(__ferry_managed_Negate(env, ptr::null_mut(), i32::MIN + 1), i32::MAX);
        assert_eq!(__ferry_managed_ScaleIf(env, ptr::null_mut(), 1, -3.0), -6.0);
    }
    assert!(common::thrown().is_empty());
}

#[test]
fn test_managed_pin_once_each_in_order() {
    let env = common::env();
    let src = common::new_obj(Obj::Floats(vec![2.0, 4.0, 6.0]));
    let dst = common::new_obj(Obj::Floats(vec![0.0; 3]));
    unsafe { __ferry_managed_CopyScaled(env, ptr::null_mut(), src, dst, 3, 0.5) };

    assert_eq!(
        common::calls(),
        [
            common::pin(src),
            common::pin(dst),
            common::unpin_of(src),
            common::unpin_of(dst),
        ]
    );
    match unsafe { common::obj(dst) } {
        Obj::Floats(v) => assert_eq!(v.as_slice(), [1.0, 2.0, 3.0]),
        _ => panic!("expected floats"),
    }
}

#[test]
fn test_managed_arity_3_int_array() {
    let env = common::env();
    let ints = common::new_obj(Obj::Ints(vec![5, 6, 7]));
    let total = unsafe { __ferry_managed_SumInts(env, ptr::null_mut(), ints, 3, -1) };
    assert_eq!(total, 17);
    assert_eq!(common::calls(), [common::pin(ints), common::unpin_of(ints)]);
}

#[test]
fn test_managed_arity_5_with_context() {
    let env = common::env();
    let label = common::string("ctx");
    let bytes = common::new_obj(Obj::Bytes(b"xy".to_vec()));
    let out = unsafe { __ferry_managed_Describe(env, ptr::null_mut(), label, bytes, 2, 2.5, 200) };
    let text = unsafe { common::read_string(out) };
    assert_eq!(text, "ctx:xy:Float32(2.5):200:false");
    assert_eq!(common::calls(), [common::pin(bytes), common::unpin_of(bytes)]);
}

#[test]
fn test_managed_error_throws_and_returns_zero() {
    let env = common::env();
    assert_eq!(unsafe { __ferry_managed_CheckedDiv(env, ptr::null_mut(), 9, 3) }, 3);
    assert!(common::thrown().is_empty());

    assert_eq!(unsafe { __ferry_managed_CheckedDiv(env, ptr::null_mut(), 9, 0) }, 0);
    assert_eq!(common::thrown(), ["division by zero"]);
}

#[test]
fn test_managed_panic_still_unpins() {
    let env = common::env();
    let ints = common::new_obj(Obj::Ints(vec![1]));
    let out = unsafe { __ferry_managed_Explode(env, ptr::null_mut(), ints) };
    assert_eq!(out, 0);
    assert_eq!(common::calls(), [common::pin(ints), common::unpin_of(ints)]);
    let thrown = common::thrown();
    assert_eq!(thrown.len(), 1);
    assert!(thrown[0].contains("Explode"));
    assert!(thrown[0].contains("boom"));
}

#[test]
fn test_managed_pointer_is_integer_address() {
    let env = common::env();
    assert_eq!(unsafe { __ferry_managed_WrapPointer(env, ptr::null_mut(), 0x1234) }, 0x1234);
}

#[test]
fn test_number_wire_layouts() {
    let raw: RawNumber = InteropNumber::from_f64(3.0).to_raw();
    assert_eq!(raw.tag, TAG_INT32);
    let raw: RawNumber = InteropNumber::from_f64(3.5).to_raw();
    assert_eq!(raw.tag, TAG_FLOAT32);
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_exports_are_registered() {
    let registry = MethodRegistry::from_exports();
    let rows = registry.methods(MODULE);
    assert_eq!(rows.len(), 9);

    let find = |name: &str| {
        rows.iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("{} not registered", name))
    };

    assert_eq!(find("_Answer").signature, "i32");
    assert_eq!(find("_Negate").signature, "i32|i32");
    assert_eq!(find("_ScaleIf").signature, "f64|bool|f64");
    assert_eq!(find("_SumInts").signature, "i64|IntArray|i32|i64");
    assert_eq!(find("_CopyScaled").signature, "void|FloatArray|FloatArray|i32|f32");
    assert_eq!(find("_CheckedDiv").signature, "i32|i32|i32");

    let describe = find("_Describe");
    assert_eq!(describe.signature, "String|String|ByteArray|u32|InteropNumber|u8");
    assert_eq!(describe.flags, FLAG_SLOW_NATIVE);
    assert!(describe.is_slow_native());
    assert_eq!(
        describe.parsed_signature().unwrap().jni_descriptor(),
        "(Ljava/lang/String;[BIDB)Ljava/lang/String;"
    );

    assert_eq!(find("_Answer").flags, 0);
    assert_eq!(
        find("_Negate").func.as_ptr(),
        __ferry_managed_Negate as *const std::ffi::c_void
    );
}
