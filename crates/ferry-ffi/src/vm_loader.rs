//! Foreign VM loader
//!
//! `LoadVirtualMachine` opens the `vmloader` library from the given library
//! directory and hands it a [`ForeignVmContext`] through which the started VM
//! can call back into the caller's runtime synchronously. The remaining
//! exports forward to the same library and fail until it is loaded.

use std::ffi::{c_char, c_void, CStr, CString};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use ferry_native::interop;
use ferry_sdk::{ByteArray, NativePointer, VmContext};

use crate::callbacks::foreign_call_sync;
use crate::context::interop_context;
use crate::loader::{Library, LoadError};

/// Stem of the VM loader library
pub const VM_LOADER_LIBRARY: &str = "vmloader";

/// Synchronous call into the runtime that loaded the VM
pub type ForeignCallSync = unsafe extern "C" fn(ctx: *mut c_void, kind: i32, data: *mut u8, length: i32) -> i32;

/// Context handed to the loaded VM
#[repr(C)]
#[derive(Debug)]
pub struct ForeignVmContext {
    /// Runtime of the `LoadVirtualMachine` caller
    pub vm_context: *mut c_void,
    /// Entry to call back into that runtime
    pub call_sync: ForeignCallSync,
}

/// `LoadVirtualMachine(kind, class_path, library_path, foreign)`
pub type LoadVirtualMachineFn =
    unsafe extern "C" fn(i32, *const c_char, *const c_char, *const ForeignVmContext) -> i32;
/// `StartApplication(url, params)`
pub type StartApplicationFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut c_void;
/// `RunApplication(arg0, arg1)`
pub type RunApplicationFn = unsafe extern "C" fn(i32, i32) -> i8;
/// `EmitEvent(type, target, arg0, arg1)`
pub type EmitEventFn = unsafe extern "C" fn(i32, i32, i32, i32) -> *const c_char;
/// `RestartWith(page)`
pub type RestartWithFn = unsafe extern "C" fn(*const c_char);

/// Entry points resolved from the vmloader library
#[derive(Debug, Clone, Copy)]
pub struct VmEntries {
    pub load_virtual_machine: LoadVirtualMachineFn,
    pub start_application: Option<StartApplicationFn>,
    pub run_application: Option<RunApplicationFn>,
    pub emit_event: Option<EmitEventFn>,
    pub restart_with: Option<RestartWithFn>,
}

impl VmEntries {
    unsafe fn resolve(library: &Library) -> Result<Self, LoadError> {
        Ok(VmEntries {
            load_virtual_machine: library.get("LoadVirtualMachine")?,
            start_application: library.get_optional("StartApplication"),
            run_application: library.get_optional("RunApplication"),
            emit_event: library.get_optional("EmitEvent"),
            restart_with: library.get_optional("RestartWith"),
        })
    }
}

struct LoadedVm {
    entries: VmEntries,
    // The loaded VM may keep these pointers for its whole lifetime.
    contexts: Vec<Box<ForeignVmContext>>,
    _library: Option<Library>,
}

unsafe impl Send for LoadedVm {}

/// Directory and class path actually used by `LoadVirtualMachine`.
///
/// A configured class path replaces both the class path and the library
/// directory; an empty library directory falls back to `fallback_dir`.
pub fn resolve_vm_paths(
    configured: Option<&str>,
    class_path: &str,
    library_path: &str,
    fallback_dir: Option<&Path>,
) -> (String, PathBuf) {
    if let Some(configured) = configured {
        log::info!("Class path taken from configuration: {}", configured);
        return (configured.to_string(), PathBuf::from(configured));
    }
    let dir = match (library_path.is_empty(), fallback_dir) {
        (true, Some(dir)) => dir.to_path_buf(),
        _ => PathBuf::from(library_path),
    };
    (class_path.to_string(), dir)
}

fn c_string(value: &str) -> Result<CString, String> {
    CString::new(value).map_err(|_| format!("Interior NUL in '{}'", value))
}

/// Process-wide vmloader state
#[derive(Default)]
pub struct VmLoader {
    state: Mutex<Option<LoadedVm>>,
}

impl VmLoader {
    /// Nothing loaded
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the vmloader library is loaded
    pub fn is_loaded(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Use `entries` instead of opening a library; false if already loaded
    pub fn install(&self, entries: VmEntries) -> bool {
        let mut state = self.state.lock();
        if state.is_some() {
            return false;
        }
        *state = Some(LoadedVm {
            entries,
            contexts: Vec::new(),
            _library: None,
        });
        true
    }

    /// Open `<dir>/<vmloader>` unless a library is already loaded
    pub fn load(&self, dir: &Path) -> Result<(), LoadError> {
        let mut state = self.state.lock();
        if state.is_some() {
            return Ok(());
        }
        let library = Library::open_in(dir, VM_LOADER_LIBRARY).map_err(|e| {
            log::error!("Ensure the vmloader library in {} was built", dir.display());
            e
        })?;
        let entries = unsafe { VmEntries::resolve(&library)? };
        *state = Some(LoadedVm {
            entries,
            contexts: Vec::new(),
            _library: Some(library),
        });
        Ok(())
    }

    // The lock is released before calling into the VM, which may reenter.
    fn with_entries<T>(&self, f: impl FnOnce(&VmEntries) -> Result<T, String>) -> Result<T, String> {
        let entries = self.state.lock().as_ref().map(|loaded| loaded.entries);
        f(&entries.ok_or("VM loader is not loaded")?)
    }

    /// Load the library from `dir` if needed and start a VM of `vm_kind`
    pub fn load_virtual_machine(
        &self,
        ctx: VmContext,
        vm_kind: i32,
        class_path: &str,
        dir: &Path,
    ) -> Result<i32, String> {
        if let Err(e) = self.load(dir) {
            log::error!("{}", e);
            return Err("Cannot load VM".to_string());
        }
        let class_path = c_string(class_path)?;
        let library_path = c_string(&dir.to_string_lossy())?;

        let (load, foreign) = {
            let mut state = self.state.lock();
            let loaded = state.as_mut().ok_or("Cannot load VM")?;
            let foreign = Box::new(ForeignVmContext {
                vm_context: ctx.as_ptr(),
                call_sync: foreign_call_sync,
            });
            let foreign_ptr: *const ForeignVmContext = &*foreign;
            loaded.contexts.push(foreign);
            (loaded.entries.load_virtual_machine, foreign_ptr)
        };
        Ok(unsafe { load(vm_kind, class_path.as_ptr(), library_path.as_ptr(), foreign) })
    }

    /// Start the application at `url`
    pub fn start_application(&self, url: &str, params: &str) -> Result<NativePointer, String> {
        let (url, params) = (c_string(url)?, c_string(params)?);
        self.with_entries(|entries| {
            let start = entries.start_application.ok_or("StartApplication is not exported")?;
            Ok(NativePointer::from_ptr(unsafe { start(url.as_ptr(), params.as_ptr()) }))
        })
    }

    /// Run one application step; true while the application keeps running
    pub fn run_application(&self, arg0: i32, arg1: i32) -> Result<bool, String> {
        self.with_entries(|entries| {
            let run = entries.run_application.ok_or("RunApplication is not exported")?;
            Ok(unsafe { run(arg0, arg1) } != 0)
        })
    }

    /// Deliver an event; returns the VM's reply
    pub fn emit_event(&self, event: i32, target: i32, arg0: i32, arg1: i32) -> Result<String, String> {
        self.with_entries(|entries| {
            let emit = entries.emit_event.ok_or("EmitEvent is not exported")?;
            let reply = unsafe { emit(event, target, arg0, arg1) };
            if reply.is_null() {
                return Ok(String::new());
            }
            Ok(unsafe { CStr::from_ptr(reply) }.to_string_lossy().into_owned())
        })
    }

    /// Restart the application on `page`
    pub fn restart_with(&self, page: &str) -> Result<(), String> {
        let page = c_string(page)?;
        self.with_entries(|entries| {
            let restart = entries.restart_with.ok_or("RestartWith is not exported")?;
            unsafe { restart(page.as_ptr()) };
            Ok(())
        })
    }
}

// ============================================================================
// Exports
// ============================================================================

#[interop(ctx)]
fn load_virtual_machine(ctx: VmContext, vm_kind: i32, class_path: String, library_path: String) -> Result<i32, String> {
    let context = interop_context();
    let config = context.config();
    let (class_path, dir) = resolve_vm_paths(
        config.class_path.as_deref(),
        &class_path,
        &library_path,
        config.vm_loader_dir.as_deref(),
    );
    context.vm().load_virtual_machine(ctx, vm_kind, &class_path, &dir)
}

#[interop]
fn start_application(app_url: String, app_params: String) -> Result<NativePointer, String> {
    interop_context().vm().start_application(&app_url, &app_params)
}

#[interop]
fn run_application(arg0: i32, arg1: i32) -> Result<bool, String> {
    interop_context().vm().run_application(arg0, arg1)
}

#[interop(ctx)]
fn emit_event(_ctx: VmContext, event: i32, target: i32, arg0: i32, arg1: i32) -> Result<String, String> {
    interop_context().vm().emit_event(event, target, arg0, arg1)
}

#[interop]
fn restart_with(page: String) -> Result<(), String> {
    interop_context().vm().restart_with(&page)
}

/// Call the runtime behind a [`ForeignVmContext`] synchronously
#[interop(name = "CallForeignVM")]
fn call_foreign_vm(foreign: NativePointer, function: i32, mut data: ByteArray, length: i32) -> Result<i32, String> {
    let foreign = unsafe { foreign.as_ref::<ForeignVmContext>() }.ok_or("null foreign VM context")?;
    let mut length = usize::try_from(length).map_err(|_| format!("negative length {}", length))?;
    if let Some(len) = data.known_len() {
        length = length.min(len);
    }
    let bytes = unsafe { data.slice_mut(length) };
    Ok(unsafe { (foreign.call_sync)(foreign.vm_context, function, bytes.as_mut_ptr(), bytes.len() as i32) })
}
