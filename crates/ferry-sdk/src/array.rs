//! Pinned primitive arrays
//!
//! In the managed flavor an array argument is a runtime object: decode pins
//! it and release unpins it, so the storage stays put for exactly the span of
//! the implementation call. A null array is neither pinned nor unpinned.
//!
//! In the native flavor the argument is already a raw element pointer and
//! nothing is pinned. The element count is not part of that wire value;
//! exports take it as a separate parameter.

use crate::convert::FromWire;
use crate::env::{ManagedEnv, NativeEnv, ObjectRef};
use crate::error::InteropResult;

macro_rules! define_array {
    ($(#[$meta:meta])* $name:ident, $elem:ty, $pin:ident, $unpin:ident) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            data: *mut $elem,
            len: Option<usize>,
        }

        impl $name {
            /// Wrap raw element storage of unknown length
            #[inline]
            pub fn from_raw(data: *mut $elem) -> Self {
                $name { data, len: None }
            }

            /// Element storage
            #[inline]
            pub fn as_ptr(&self) -> *mut $elem {
                self.data
            }

            /// Check for a null array
            #[inline]
            pub fn is_null(&self) -> bool {
                self.data.is_null()
            }

            /// Element count, when the calling runtime reported one
            #[inline]
            pub fn known_len(&self) -> Option<usize> {
                self.len
            }

            /// View `len` elements.
            ///
            /// # Safety
            /// The storage must hold at least `len` elements. A null array
            /// yields an empty slice.
            pub unsafe fn slice(&self, len: usize) -> &[$elem] {
                if self.data.is_null() {
                    return &[];
                }
                std::slice::from_raw_parts(self.data, len)
            }

            /// Mutable view of `len` elements.
            ///
            /// # Safety
            /// Same contract as [`slice`](Self::slice).
            pub unsafe fn slice_mut(&mut self, len: usize) -> &mut [$elem] {
                if self.data.is_null() {
                    return &mut [];
                }
                std::slice::from_raw_parts_mut(self.data, len)
            }
        }

        impl FromWire<NativeEnv> for $name {
            type Wire = *mut $elem;

            #[inline]
            unsafe fn decode(_env: &NativeEnv, wire: *mut $elem) -> InteropResult<Self> {
                Ok($name::from_raw(wire))
            }
        }

        impl FromWire<ManagedEnv> for $name {
            type Wire = ObjectRef;

            unsafe fn decode(env: &ManagedEnv, wire: ObjectRef) -> InteropResult<Self> {
                if wire.is_null() {
                    return Ok($name { data: std::ptr::null_mut(), len: Some(0) });
                }
                let len = env.array_length(wire);
                Ok($name { data: env.$pin(wire), len: Some(len) })
            }

            unsafe fn release(env: &ManagedEnv, wire: ObjectRef) {
                if !wire.is_null() {
                    env.$unpin(wire);
                }
            }
        }
    };
}

define_array!(
    /// Array of `i32`
    IntArray, i32, pin_ints, unpin_ints
);
define_array!(
    /// Array of `f32`
    FloatArray, f32, pin_floats, unpin_floats
);
define_array!(
    /// Array of bytes
    ByteArray, u8, pin_bytes, unpin_bytes
);
