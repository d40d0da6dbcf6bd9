//! Process-wide interop state
//!
//! Everything the C exports share lives in one [`InteropContext`], created on
//! first use from [`FerryConfig::load`]. Rust embedders reach it through
//! [`interop_context`]; the managed side binds its method slots through
//! [`ferry_BindModule`].

use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use ferry_sdk::{
    bind_methods, CallbackQueue, ChannelRuntime, InteropError, InteropResult, MethodBinder, MethodEntry,
    MethodRegistry, PromiseRuntime, RegistryError,
};

use crate::callbacks::CallbackCallers;
use crate::config::{FerryConfig, DEFAULT_LOG_FILTER};
use crate::es2panda::CompilerService;
use crate::logging::{self, GroupedLogs};
use crate::struct_info::StructInfoSet;
use crate::vm_loader::VmLoader;

static CONTEXT: Lazy<InteropContext> = Lazy::new(InteropContext::from_env);

/// The process-wide context
pub fn interop_context() -> &'static InteropContext {
    &CONTEXT
}

/// Shared state behind every export
pub struct InteropContext {
    config: FerryConfig,
    registry: RwLock<MethodRegistry>,
    callbacks: CallbackQueue,
    callers: CallbackCallers,
    channel: Arc<ChannelRuntime>,
    promises: RwLock<Arc<dyn PromiseRuntime>>,
    struct_infos: StructInfoSet,
    grouped_logs: GroupedLogs,
    vm: VmLoader,
    compiler: CompilerService,
}

impl InteropContext {
    fn from_env() -> Self {
        let config = match FerryConfig::load() {
            Ok(config) => config,
            Err(e) => {
                logging::init(DEFAULT_LOG_FILTER);
                ferry_sdk::fatal!("{}", e)
            }
        };
        logging::init(&config.log_filter);
        Self::new(config)
    }

    /// Context over `config` holding every link-time export
    pub fn new(config: FerryConfig) -> Self {
        let channel = Arc::new(ChannelRuntime::new());
        let promises: Arc<dyn PromiseRuntime> = channel.clone();
        InteropContext {
            registry: RwLock::new(MethodRegistry::from_exports()),
            callbacks: CallbackQueue::new(),
            callers: CallbackCallers::new(),
            channel,
            promises: RwLock::new(promises),
            struct_infos: StructInfoSet::new(),
            grouped_logs: GroupedLogs::new(),
            vm: VmLoader::new(),
            compiler: CompilerService::new(&config),
            config,
        }
    }

    /// Effective configuration
    pub fn config(&self) -> &FerryConfig {
        &self.config
    }

    /// Module/method registry
    pub fn registry(&self) -> &RwLock<MethodRegistry> {
        &self.registry
    }

    /// Queue polled by `CheckCallbackEvent`
    pub fn callbacks(&self) -> &CallbackQueue {
        &self.callbacks
    }

    /// Direct callback callers
    pub fn callers(&self) -> &CallbackCallers {
        &self.callers
    }

    /// Runtime used by `ferry_CreateDeferred`
    pub fn promise_runtime(&self) -> Arc<dyn PromiseRuntime> {
        self.promises.read().clone()
    }

    /// Replace the promise runtime; deferreds already created keep theirs
    pub fn set_promise_runtime(&self, runtime: Arc<dyn PromiseRuntime>) {
        *self.promises.write() = runtime;
    }

    /// The built-in channel runtime, whose receiver yields settlements
    pub fn channel_runtime(&self) -> &ChannelRuntime {
        &self.channel
    }

    /// Struct names recorded by `InsertGlobalStructInfo`
    pub fn struct_infos(&self) -> &StructInfoSet {
        &self.struct_infos
    }

    /// Logs collected by the `*GroupedLog` exports
    pub fn grouped_logs(&self) -> &GroupedLogs {
        &self.grouped_logs
    }

    /// VM loader library state
    pub fn vm(&self) -> &VmLoader {
        &self.vm
    }

    /// Compiler service
    pub fn compiler(&self) -> &CompilerService {
        &self.compiler
    }

    /// Bind every row of `module`, aborting if the module has no classpath
    ///
    /// The registry is not locked while `binder` runs, so the binder may
    /// itself change classpaths.
    pub fn bind(&self, module: &str, binder: &mut dyn MethodBinder) -> InteropResult<usize> {
        let (classpath, rows) = {
            let registry = self.registry.read();
            let classpath = registry.classpath_or_abort(module).to_string();
            (classpath, registry.methods(module).to_vec())
        };
        if rows.is_empty() {
            return Err(RegistryError::UnknownModule(module.to_string()).into());
        }
        log::debug!("Binding module {} to {}", module, classpath);
        bind_methods(&classpath, &rows, binder)
    }
}

// ============================================================================
// C entry points
// ============================================================================

/// Binder callback: returns nonzero when the runtime accepted the method
pub type BindMethodFn = unsafe extern "C" fn(
    user: *mut c_void,
    classpath: *const c_char,
    name: *const c_char,
    signature: *const c_char,
    func: *const c_void,
    flags: u32,
) -> i32;

/// [`MethodBinder`] forwarding rows to a C callback
pub struct ForeignBinder {
    bind: BindMethodFn,
    user: *mut c_void,
}

impl ForeignBinder {
    /// Forward to `bind`, passing `user` through
    pub fn new(bind: BindMethodFn, user: *mut c_void) -> Self {
        ForeignBinder { bind, user }
    }
}

fn c_arg(value: &str) -> InteropResult<CString> {
    CString::new(value).map_err(|_| InteropError::Message(format!("Interior NUL in '{}'", value)))
}

impl MethodBinder for ForeignBinder {
    fn bind(&mut self, classpath: &str, method: &MethodEntry) -> InteropResult<bool> {
        let classpath = c_arg(classpath)?;
        let name = c_arg(&method.name)?;
        let signature = c_arg(&method.signature)?;
        let accepted = unsafe {
            (self.bind)(
                self.user,
                classpath.as_ptr(),
                name.as_ptr(),
                signature.as_ptr(),
                method.func.as_ptr(),
                method.flags,
            )
        };
        Ok(accepted != 0)
    }
}

unsafe fn read_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Bind `module` through `bind`; returns the accepted count or -1.
///
/// A module without a classpath terminates the process.
///
/// # Safety
/// `module` must be a NUL-terminated string; `bind` must be safe to call
/// with `user` for every row.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn ferry_BindModule(
    module: *const c_char,
    bind: Option<BindMethodFn>,
    user: *mut c_void,
) -> i32 {
    let (Some(module), Some(bind)) = (read_arg(module), bind) else {
        log::error!("ferry_BindModule: module name and binder are required");
        return -1;
    };
    let mut binder = ForeignBinder::new(bind, user);
    match interop_context().bind(module, &mut binder) {
        Ok(bound) => bound as i32,
        Err(e) => {
            log::error!("Binding {} failed: {}", module, e);
            -1
        }
    }
}

/// Override the classpath of `module`; returns 0 on success, -1 on bad input.
///
/// # Safety
/// Both arguments must be NUL-terminated strings.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn ferry_SetClasspath(module: *const c_char, classpath: *const c_char) -> i32 {
    match (read_arg(module), read_arg(classpath)) {
        (Some(module), Some(classpath)) => {
            interop_context().registry().write().set_classpath(module, classpath);
            0
        }
        _ => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_sdk::{bind_module, ExportFn};

    struct Rows(Vec<String>);

    unsafe extern "C" fn collect(
        user: *mut c_void,
        classpath: *const c_char,
        name: *const c_char,
        signature: *const c_char,
        _func: *const c_void,
        flags: u32,
    ) -> i32 {
        let rows = &mut *(user as *mut Rows);
        let row = format!(
            "{}.{}({}) {}",
            CStr::from_ptr(classpath).to_str().unwrap(),
            CStr::from_ptr(name).to_str().unwrap(),
            CStr::from_ptr(signature).to_str().unwrap(),
            flags
        );
        let accept = !row.contains("_Rejected");
        rows.0.push(row);
        accept as i32
    }

    #[test]
    fn test_foreign_binder_forwards_rows() {
        let mut registry = MethodRegistry::new();
        registry.set_classpath("M", "app/M");
        registry.add_method("M", "_Plain", "i32|i32", ExportFn(std::ptr::null()), 0);
        registry.add_method("M", "_Rejected", "void", ExportFn(std::ptr::null()), 1);

        let mut rows = Rows(Vec::new());
        let mut binder = ForeignBinder::new(collect, &mut rows as *mut Rows as *mut c_void);
        let bound = bind_module(&registry, "M", &mut binder).unwrap();
        assert_eq!(bound, 1);
        assert_eq!(rows.0, ["app/M._Plain(i32|i32) 0", "app/M._Rejected(void) 1"]);
    }

    #[test]
    fn test_context_collects_link_time_exports() {
        let context = InteropContext::new(FerryConfig::default());
        let registry = context.registry().read();
        let common = registry.methods(ferry_sdk::registry::INTEROP_MODULE);
        assert!(common.iter().any(|m| m.name == "_StringLength" && m.signature == "i32|NativePointer"));
        assert!(common.iter().any(|m| m.name == "_CheckCallbackEvent"));
        let compiler = registry.methods(ferry_sdk::registry::ES2PANDA_MODULE);
        assert!(compiler.iter().any(|m| m.name == "_ContextState" && m.signature == "i32|Context"));
        assert!(compiler.iter().any(|m| m.name == "_AstNodeDumpJSONConst"));
    }
}
