//! Shared libraries this crate binds at run time
//!
//! Two libraries are opened lazily: the compiler service, which hands out a
//! versioned function table from a single entry symbol, and the optional
//! `vmloader`, whose entry points are looked up one by one. [`Library`]
//! covers both: plain symbol lookup for the VM loader and
//! [`Library::entry_table`] for the compiler.
//!
//! Unix libraries are opened with `dlopen(RTLD_NOW | RTLD_LOCAL)`, Windows
//! libraries with `LoadLibraryW`.

use std::ffi::{c_void, CString};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failure to open a library or resolve one of its entry points
#[derive(Debug, Error)]
pub enum LoadError {
    /// The platform loader could not open the library
    #[error("Cannot open {path}: {reason}")]
    Open {
        /// Path handed to the platform loader
        path: String,
        /// Loader diagnostic
        reason: String,
    },

    /// A required symbol is not exported
    #[error("Symbol {symbol} not found in {library}: {reason}")]
    MissingSymbol {
        /// Symbol name
        symbol: String,
        /// Library path
        library: String,
        /// Loader diagnostic
        reason: String,
    },

    /// An entry symbol returned no function table
    #[error("{symbol} in {library} returned no table for version {version}")]
    NoTable {
        /// Entry symbol
        symbol: String,
        /// Library path
        library: String,
        /// Version requested
        version: i32,
    },

    /// Path or symbol name the platform loader cannot take
    #[error("Invalid library name: {0}")]
    InvalidName(String),
}

/// An open shared library; closed when dropped.
pub struct Library {
    handle: *mut c_void,
    path: String,
}

// The handle is only passed back to the platform loader, which is thread-safe.
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl Library {
    /// Open the library at `path`; a bare file name goes through the
    /// platform search path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let path = path
            .to_str()
            .ok_or_else(|| LoadError::InvalidName(path.display().to_string()))?;
        let handle = sys::open(path).map_err(|reason| LoadError::Open {
            path: path.to_string(),
            reason,
        })?;
        log::debug!("Opened {}", path);
        Ok(Library {
            handle,
            path: path.to_string(),
        })
    }

    /// Open the platform library named `stem` inside `dir`
    pub fn open_in(dir: &Path, stem: &str) -> Result<Self, LoadError> {
        Library::open(library_path(dir, stem))
    }

    /// Resolve `symbol` as a `T`.
    ///
    /// # Safety
    /// `T` must be the symbol's function pointer type, and the value must
    /// not be used after this library is dropped.
    pub unsafe fn get<T: Copy>(&self, symbol: &str) -> Result<T, LoadError> {
        let name = CString::new(symbol).map_err(|_| LoadError::InvalidName(symbol.to_string()))?;
        let address = sys::symbol(self.handle, &name).map_err(|reason| LoadError::MissingSymbol {
            symbol: symbol.to_string(),
            library: self.path.clone(),
            reason,
        })?;
        Ok(std::mem::transmute_copy(&address))
    }

    /// Resolve an entry point the library may leave out
    ///
    /// # Safety
    /// Same contract as [`get`](Self::get).
    pub unsafe fn get_optional<T: Copy>(&self, symbol: &str) -> Option<T> {
        match self.get(symbol) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("{}", e);
                None
            }
        }
    }

    /// Call the `fn(version) -> *const T` entry `symbol` and return its table.
    ///
    /// # Safety
    /// `symbol` must have that signature, and the table must not be used
    /// after this library is dropped.
    pub unsafe fn entry_table<T>(&self, symbol: &str, version: i32) -> Result<*const T, LoadError> {
        let entry: unsafe extern "C" fn(i32) -> *const T = self.get(symbol)?;
        let table = entry(version);
        if table.is_null() {
            return Err(LoadError::NoTable {
                symbol: symbol.to_string(),
                library: self.path.clone(),
                version,
            });
        }
        Ok(table)
    }

    /// Path the library was opened from
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe { sys::close(self.handle) };
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("path", &self.path).finish()
    }
}

/// Platform file name of a shared library: `libname.so`, `libname.dylib`, `name.dll`
pub fn shared_library_name(stem: &str) -> String {
    if cfg!(windows) {
        format!("{}.dll", stem)
    } else if cfg!(target_os = "macos") {
        format!("lib{}.dylib", stem)
    } else {
        format!("lib{}.so", stem)
    }
}

/// `<dir>/<platform name of stem>`
pub fn library_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(shared_library_name(stem))
}

#[cfg(unix)]
mod sys {
    use std::ffi::{c_void, CStr, CString};

    unsafe fn last_error() -> String {
        let message = libc::dlerror();
        if message.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(message).to_string_lossy().into_owned()
        }
    }

    pub fn open(path: &str) -> Result<*mut c_void, String> {
        let path = CString::new(path).map_err(|_| "path contains NUL".to_string())?;
        let handle = unsafe { libc::dlopen(path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(unsafe { last_error() });
        }
        Ok(handle)
    }

    pub unsafe fn symbol(handle: *mut c_void, name: &CStr) -> Result<*mut c_void, String> {
        libc::dlerror();
        let address = libc::dlsym(handle, name.as_ptr());
        if address.is_null() {
            return Err(last_error());
        }
        Ok(address)
    }

    pub unsafe fn close(handle: *mut c_void) {
        libc::dlclose(handle);
    }
}

#[cfg(windows)]
mod sys {
    use std::ffi::{c_char, c_void, CStr, OsStr};
    use std::os::windows::ffi::OsStrExt;

    extern "system" {
        fn LoadLibraryW(filename: *const u16) -> *mut c_void;
        fn GetProcAddress(module: *mut c_void, name: *const c_char) -> *mut c_void;
        fn FreeLibrary(module: *mut c_void) -> i32;
        fn GetLastError() -> u32;
    }

    pub fn open(path: &str) -> Result<*mut c_void, String> {
        let wide: Vec<u16> = OsStr::new(path).encode_wide().chain(Some(0)).collect();
        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };
        if handle.is_null() {
            return Err(format!("error code {}", unsafe { GetLastError() }));
        }
        Ok(handle)
    }

    pub unsafe fn symbol(handle: *mut c_void, name: &CStr) -> Result<*mut c_void, String> {
        let address = GetProcAddress(handle, name.as_ptr());
        if address.is_null() {
            return Err(format!("error code {}", GetLastError()));
        }
        Ok(address)
    }

    pub unsafe fn close(handle: *mut c_void) {
        FreeLibrary(handle);
    }
}
