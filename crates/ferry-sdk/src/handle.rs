//! Opaque pointers and typed handles
//!
//! Handles are reinterpretation only: no ownership moves and nothing checks
//! that the address is live. Native-flavor callers pass the address itself;
//! managed-flavor callers pass it as a 64-bit integer.

use std::ffi::c_void;

use crate::convert::{FromWire, IntoWire};
use crate::env::{ManagedEnv, NativeEnv};
use crate::error::InteropResult;

/// Untyped opaque address
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativePointer(*mut c_void);

unsafe impl Send for NativePointer {}
unsafe impl Sync for NativePointer {}

impl NativePointer {
    /// The null pointer
    #[inline]
    pub const fn null() -> Self {
        NativePointer(std::ptr::null_mut())
    }

    /// Wrap an address
    #[inline]
    pub const fn from_ptr(ptr: *mut c_void) -> Self {
        NativePointer(ptr)
    }

    /// Wrap an address received as an integer
    #[inline]
    pub fn from_addr(addr: i64) -> Self {
        NativePointer(addr as usize as *mut c_void)
    }

    /// The address
    #[inline]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }

    /// The address as an integer
    #[inline]
    pub fn addr(self) -> i64 {
        self.0 as usize as i64
    }

    /// Check for null
    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Leak a box and hand out its address
    pub fn from_box<T>(value: Box<T>) -> Self {
        NativePointer(Box::into_raw(value) as *mut c_void)
    }

    /// Reclaim a box leaked with [`from_box`](Self::from_box).
    ///
    /// # Safety
    /// The pointer must come from `from_box::<T>` and not be reclaimed twice.
    pub unsafe fn into_box<T>(self) -> Box<T> {
        Box::from_raw(self.0 as *mut T)
    }

    /// Borrow the pointee.
    ///
    /// # Safety
    /// The pointer must be null or point to a live `T`.
    pub unsafe fn as_ref<'a, T>(self) -> Option<&'a T> {
        (self.0 as *const T).as_ref()
    }
}

impl Default for NativePointer {
    fn default() -> Self {
        NativePointer::null()
    }
}

impl FromWire<NativeEnv> for NativePointer {
    type Wire = *mut c_void;

    #[inline]
    unsafe fn decode(_env: &NativeEnv, wire: *mut c_void) -> InteropResult<Self> {
        Ok(NativePointer(wire))
    }
}

impl IntoWire<NativeEnv> for NativePointer {
    type Wire = *mut c_void;

    #[inline]
    unsafe fn encode(self, _env: &NativeEnv) -> *mut c_void {
        self.0
    }

    #[inline]
    fn null_wire() -> *mut c_void {
        std::ptr::null_mut()
    }
}

impl FromWire<ManagedEnv> for NativePointer {
    type Wire = i64;

    #[inline]
    unsafe fn decode(_env: &ManagedEnv, wire: i64) -> InteropResult<Self> {
        Ok(NativePointer::from_addr(wire))
    }
}

impl IntoWire<ManagedEnv> for NativePointer {
    type Wire = i64;

    #[inline]
    unsafe fn encode(self, _env: &ManagedEnv) -> i64 {
        self.addr()
    }

    #[inline]
    fn null_wire() -> i64 {
        0
    }
}

/// Declare a typed handle over [`NativePointer`].
///
/// The handle has the same wire form as `NativePointer` in every flavor but
/// does not convert implicitly into other handle kinds.
///
/// ```ignore
/// ferry_sdk::define_handle! {
///     /// Compiler context
///     pub struct Context;
/// }
/// ```
#[macro_export]
macro_rules! define_handle {
    ($($(#[$meta:meta])* $vis:vis struct $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[repr(transparent)]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
            $vis struct $name($crate::NativePointer);

            impl $name {
                /// Wrap an untyped pointer
                #[inline]
                pub const fn from_pointer(ptr: $crate::NativePointer) -> Self {
                    $name(ptr)
                }

                /// Wrap a raw address
                #[inline]
                pub const fn from_ptr(ptr: *mut ::std::ffi::c_void) -> Self {
                    $name($crate::NativePointer::from_ptr(ptr))
                }

                /// The untyped pointer
                #[inline]
                pub const fn pointer(self) -> $crate::NativePointer {
                    self.0
                }

                /// The raw address
                #[inline]
                pub const fn as_ptr(self) -> *mut ::std::ffi::c_void {
                    self.0.as_ptr()
                }

                /// Check for null
                #[inline]
                pub fn is_null(self) -> bool {
                    self.0.is_null()
                }
            }

            impl<E> $crate::FromWire<E> for $name
            where
                E: $crate::Env,
                $crate::NativePointer: $crate::FromWire<E>,
            {
                type Wire = <$crate::NativePointer as $crate::FromWire<E>>::Wire;

                #[inline]
                unsafe fn decode(env: &E, wire: Self::Wire) -> $crate::InteropResult<Self> {
                    <$crate::NativePointer as $crate::FromWire<E>>::decode(env, wire).map($name)
                }
            }

            impl<E> $crate::IntoWire<E> for $name
            where
                E: $crate::Env,
                $crate::NativePointer: $crate::IntoWire<E>,
            {
                type Wire = <$crate::NativePointer as $crate::IntoWire<E>>::Wire;

                #[inline]
                unsafe fn encode(self, env: &E) -> Self::Wire {
                    $crate::IntoWire::<E>::encode(self.0, env)
                }

                #[inline]
                fn null_wire() -> Self::Wire {
                    <$crate::NativePointer as $crate::IntoWire<E>>::null_wire()
                }
            }
        )*
    };
}
