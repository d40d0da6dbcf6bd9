//! Conversion traits between logical Rust values and wire values.
//!
//! Every parameter type of an exported function implements [`FromWire`] for
//! each environment it can be called from, and every return type implements
//! [`IntoWire`]. The generated thunk drives them in a fixed order:
//!
//! 1. `decode` each parameter, left to right
//! 2. call the implementation
//! 3. `release` each parameter, left to right, whether or not the call
//!    succeeded
//! 4. `encode` the return value (ownership moves to the caller)
//!
//! Scalars are identity conversions in every environment. Types that pin
//! runtime memory (arrays) or allocate (owned strings) have per-environment
//! impls in their own modules.

use std::fmt::Display;

use crate::env::Env;
use crate::error::InteropResult;

/// Decode a parameter from its wire representation.
pub trait FromWire<E: Env>: Sized {
    /// Bit-level type crossing the boundary
    type Wire: Copy;

    /// Build the logical value.
    ///
    /// # Safety
    /// `wire` must be a value the calling runtime produced for this type; raw
    /// pointers inside it are trusted and must stay valid for the call.
    unsafe fn decode(env: &E, wire: Self::Wire) -> InteropResult<Self>;

    /// Undo whatever `decode` acquired (pins, transient buffers).
    ///
    /// Runs exactly once per argument after the implementation returns, even
    /// if decoding this or another argument failed.
    ///
    /// # Safety
    /// `wire` must be the same value that was passed to `decode`.
    #[inline]
    unsafe fn release(env: &E, wire: Self::Wire) {
        let _ = (env, wire);
    }
}

/// Encode a return value into its wire representation.
pub trait IntoWire<E: Env> {
    /// Bit-level type crossing the boundary
    type Wire: Copy;

    /// Produce the wire value, transferring ownership to the caller.
    ///
    /// # Safety
    /// Must only be called with the environment of the current call.
    unsafe fn encode(self, env: &E) -> Self::Wire;

    /// Value returned after an error was thrown
    fn null_wire() -> Self::Wire;
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl<E: Env> FromWire<E> for $ty {
                type Wire = $ty;

                #[inline]
                unsafe fn decode(_env: &E, wire: $ty) -> InteropResult<Self> {
                    Ok(wire)
                }
            }

            impl<E: Env> IntoWire<E> for $ty {
                type Wire = $ty;

                #[inline]
                unsafe fn encode(self, _env: &E) -> $ty {
                    self
                }

                #[inline]
                fn null_wire() -> $ty {
                    <$ty>::default()
                }
            }
        )*
    };
}

impl_scalar!(u8, i32, u32, i64, f32, f64);

// Booleans cross as a signed byte: any nonzero value is true.

impl<E: Env> FromWire<E> for bool {
    type Wire = i8;

    #[inline]
    unsafe fn decode(_env: &E, wire: i8) -> InteropResult<Self> {
        Ok(wire != 0)
    }
}

impl<E: Env> IntoWire<E> for bool {
    type Wire = i8;

    #[inline]
    unsafe fn encode(self, _env: &E) -> i8 {
        self as i8
    }

    #[inline]
    fn null_wire() -> i8 {
        0
    }
}

impl<E: Env> IntoWire<E> for () {
    type Wire = ();

    #[inline]
    unsafe fn encode(self, _env: &E) {}

    #[inline]
    fn null_wire() {}
}

/// `Err` is raised through the environment's throw primitive.
impl<E, T, Er> IntoWire<E> for Result<T, Er>
where
    E: Env,
    T: IntoWire<E>,
    Er: Display,
{
    type Wire = T::Wire;

    unsafe fn encode(self, env: &E) -> Self::Wire {
        match self {
            Ok(value) => value.encode(env),
            Err(e) => {
                env.throw_error(&e.to_string());
                T::null_wire()
            }
        }
    }

    #[inline]
    fn null_wire() -> Self::Wire {
        T::null_wire()
    }
}
