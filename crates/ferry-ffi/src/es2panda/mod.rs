//! Compiler-service bridge
//!
//! The compiler library is located on first use:
//!
//! 1. `<sdk_path>/<host tools>/lib/<library>` when an SDK path is configured
//!    (`PANDA_SDK_PATH`)
//! 2. `<dir>/lib/<library>` for the directory set through `SetUpSoPath`,
//!    falling back to the configured `library_path`
//! 3. the bare library name, resolved by the platform loader
//!
//! A failed load is not cached, so a later `SetUpSoPath` can fix it. What a
//! failure does to the calling export depends on [`FailurePolicy`].

pub mod api;
pub mod bridges;

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

pub use api::{
    AstNode, Compiler, CompilerApi, CompilerError, Config, Context, Declaration, FunctionSignature, GlobalContext, NodeVisitor,
    Program, Scope, Variable,
};

use crate::config::{FailurePolicy, FerryConfig};

/// File name of the compiler library
#[cfg(windows)]
pub const COMPILER_LIBRARY: &str = "libes2panda_public.dll";

/// File name of the compiler library
#[cfg(not(windows))]
pub const COMPILER_LIBRARY: &str = "libes2panda_public.so";

/// SDK directory holding host-side tools for this platform
pub fn host_tools_dir() -> &'static str {
    if cfg!(windows) {
        "windows_host_tools"
    } else if cfg!(target_arch = "aarch64") {
        "linux_arm64_host_tools"
    } else {
        "linux_host_tools"
    }
}

/// Lazily loaded compiler service plus its discovery settings
#[derive(Debug)]
pub struct CompilerService {
    sdk_path: Option<PathBuf>,
    library_path: Option<PathBuf>,
    so_path: RwLock<Option<PathBuf>>,
    policy: FailurePolicy,
    compiler: OnceCell<Compiler>,
}

impl CompilerService {
    /// Service configured from `config`; nothing is loaded yet
    pub fn new(config: &FerryConfig) -> Self {
        CompilerService {
            sdk_path: config.sdk_path.clone(),
            library_path: config.library_path.clone(),
            so_path: RwLock::new(None),
            policy: config.failure_policy,
            compiler: OnceCell::new(),
        }
    }

    /// Directory searched when no SDK path is configured
    pub fn set_so_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        log::debug!("Compiler library directory set to {}", path.display());
        *self.so_path.write() = Some(path);
    }

    /// Where the compiler library is looked up
    pub fn library_location(&self) -> PathBuf {
        if let Some(sdk) = &self.sdk_path {
            return sdk.join(host_tools_dir()).join("lib").join(COMPILER_LIBRARY);
        }
        let dir = self.so_path.read().clone().or_else(|| self.library_path.clone());
        match dir {
            Some(dir) => dir.join("lib").join(COMPILER_LIBRARY),
            None => PathBuf::from(COMPILER_LIBRARY),
        }
    }

    /// Use `compiler` instead of loading the library; false if one is already loaded
    pub fn install(&self, compiler: Compiler) -> bool {
        self.compiler.set(compiler).is_ok()
    }

    /// Check whether the compiler is loaded
    pub fn is_loaded(&self) -> bool {
        self.compiler.get().is_some()
    }

    /// The loaded compiler, loading it on first use.
    ///
    /// Under [`FailurePolicy::Abort`] a load failure terminates the process.
    pub fn get(&self) -> Result<&Compiler, CompilerError> {
        self.compiler
            .get_or_try_init(|| self.load())
            .map_err(|e| match self.policy {
                FailurePolicy::Abort => ferry_sdk::fatal!("Cannot load compiler service: {}", e),
                FailurePolicy::Propagate => e,
            })
    }

    fn load(&self) -> Result<Compiler, CompilerError> {
        let location = self.library_location();
        log::debug!("Loading compiler service from {}", location.display());
        Compiler::load(Path::new(&location))
    }
}
