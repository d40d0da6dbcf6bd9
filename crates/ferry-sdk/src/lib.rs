//! Ferry SDK - wire types and runtime plumbing for interop exports
//!
//! This crate holds everything a generated export thunk touches at runtime:
//!
//! - [`env`]: the two calling flavors (plain C ABI and managed-runtime ABI)
//! - [`convert`]: `FromWire`/`IntoWire`, the per-type conversion rules
//! - wire types: strings, tagged numbers, pinned arrays, buffers, handles
//! - [`packed`]: the count-prefixed string/pointer array codec
//! - [`callback`]: the callback event queue polled by the managed side
//! - [`deferred`]: promises handed to managed callers and settled later
//! - [`registry`] and [`signature`]: the module/method table used to bind
//!   managed method slots to generated thunks
//!
//! # Example
//!
//! ```ignore
//! use ferry_native::interop;
//! use ferry_sdk::{InteropString, NativePointer};
//!
//! #[interop(name = "StringMake")]
//! fn string_make(value: InteropString) -> NativePointer {
//!     NativePointer::from_box(Box::new(value.to_string()))
//! }
//! ```

#![warn(missing_docs)]

pub mod array;
pub mod buffer;
pub mod callback;
pub mod convert;
pub mod deferred;
pub mod env;
pub mod error;
pub mod handle;
pub mod number;
pub mod packed;
pub mod registry;
pub mod signature;
pub mod string;

#[cfg(test)]
mod testing;

pub use array::{ByteArray, FloatArray, IntArray};
pub use buffer::{InteropBuffer, ReturnBuffer, SerializerBuffer};
pub use callback::{
    CallbackEvent, CallbackEventKind, CallbackQueue, CallbackResource, ResourceHolder,
    CALLBACK_BUFFER_SIZE, MAX_EVENT_RECORD_SIZE,
};
pub use convert::{FromWire, IntoWire};
pub use deferred::{
    ChannelRuntime, CompletionChannel, Deferred, PromiseHandle, PromiseRuntime, Settlement, SETTLEMENT_HEADER_SIZE,
};
pub use env::{Env, ManagedEnv, ManagedInterface, NativeEnv, ObjectRef, RawEnv, VmContext};
pub use error::{InteropError, InteropResult, PackedError, RegistryError};
pub use handle::NativePointer;
pub use number::InteropNumber;
pub use packed::{PointerArray, StringArray};
pub use registry::{
    bind_methods, bind_module, ClasspathEntry, ExportEntry, ExportFn, MethodBinder, MethodEntry, MethodRegistry,
    FLAG_SLOW_NATIVE,
};
pub use signature::{Signature, TypeTag};
pub use string::InteropString;

/// Paths used by macro-generated code. Not part of the public API.
#[doc(hidden)]
pub mod __private {
    pub use inventory;
    pub use log;

    /// Render a caught panic payload
    pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
        if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        }
    }
}
