//! C ABI exports binding managed runtimes to the es2panda compiler service
//!
//! Loaded by a managed runtime as a shared library. Every export exists in
//! two flavors generated by `#[interop]`: a plain C symbol `ferry_<Name>`
//! and a managed thunk registered under `_<Name>` in its module.
//!
//! - [`common`]: strings, pointer vectors, buffers and logging
//!   (`InteropNativeModule`)
//! - [`callbacks`]: the callback queue and direct callback callers
//! - [`deferred`]: promises settled from native threads
//! - [`vm_loader`]: starting a foreign VM through the `vmloader` library
//! - [`es2panda`]: the compiler-service bridge (`Es2pandaNativeModule`)
//!
//! The managed side binds its method slots with [`ferry_BindModule`]:
//!
//! ```c
//! int32_t bound = ferry_BindModule("Es2pandaNativeModule", register_native, env);
//! ```
//!
//! Process configuration is read once, on first use; see [`config`].

pub mod callbacks;
pub mod common;
pub mod config;
pub mod context;
pub mod deferred;
pub mod es2panda;
pub mod loader;
pub mod logging;
pub mod struct_info;
pub mod vm_loader;

pub use callbacks::{callback_queue, enqueue_callback, CallbackCallers};
pub use config::{ConfigError, FailurePolicy, FerryConfig};
pub use context::{ferry_BindModule, ferry_SetClasspath, interop_context, InteropContext};
pub use loader::{Library, LoadError};
