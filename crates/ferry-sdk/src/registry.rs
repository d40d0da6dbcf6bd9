//! Module/method registry
//!
//! Generated exports submit an [`ExportEntry`] at link time; modules may also
//! submit a [`ClasspathEntry`]. At load time the integration layer builds a
//! [`MethodRegistry`] from those submissions and runs [`bind_module`] once per
//! module to hand each row to the runtime's binder.
//!
//! Registration does not deduplicate: submitting the same name twice yields
//! two rows, and the binder decides what that means.

use std::collections::HashMap;
use std::ffi::c_void;

use crate::error::{InteropResult, RegistryError};
use crate::signature::Signature;

/// Flag bit of exports that take the calling context
pub const FLAG_SLOW_NATIVE: u32 = 1;

/// Module of the common interop exports
pub const INTEROP_MODULE: &str = "InteropNativeModule";

/// Module of the compiler-service exports
pub const ES2PANDA_MODULE: &str = "Es2pandaNativeModule";

/// Classpaths used when no override is registered
pub const DEFAULT_CLASSPATHS: &[(&str, &str)] = &[
    (
        INTEROP_MODULE,
        "@koalaui/interop/InteropNativeModule/InteropNativeModule",
    ),
    (
        ES2PANDA_MODULE,
        "@es2panda/generated/Es2pandaNativeModule/Es2pandaNativeModule",
    ),
];

/// Address of a generated thunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFn(pub *const c_void);

unsafe impl Send for ExportFn {}
unsafe impl Sync for ExportFn {}

impl ExportFn {
    /// The thunk address
    pub fn as_ptr(self) -> *const c_void {
        self.0
    }
}

/// Link-time record of one generated managed-flavor thunk
#[derive(Debug)]
pub struct ExportEntry {
    /// Module the export belongs to
    pub module: &'static str,
    /// Registered name (`_` followed by the export name)
    pub name: &'static str,
    /// Signature string, see [`Signature`]
    pub signature: &'static str,
    /// Thunk address
    pub func: ExportFn,
    /// Flag bits, see [`FLAG_SLOW_NATIVE`]
    pub flags: u32,
}

inventory::collect!(ExportEntry);

/// Link-time classpath declaration for a module
#[derive(Debug)]
pub struct ClasspathEntry {
    /// Module name
    pub module: &'static str,
    /// Fully qualified managed class path
    pub classpath: &'static str,
}

inventory::collect!(ClasspathEntry);

/// Declare a module's classpath at link time.
///
/// ```ignore
/// ferry_sdk::declare_classpath!("Es2pandaNativeModule", "my/app/Es2pandaNativeModule");
/// ```
#[macro_export]
macro_rules! declare_classpath {
    ($module:expr, $classpath:expr $(,)?) => {
        $crate::__private::inventory::submit! {
            $crate::ClasspathEntry {
                module: $module,
                classpath: $classpath,
            }
        }
    };
}

/// One registered method row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEntry {
    /// Registered name
    pub name: String,
    /// Signature string
    pub signature: String,
    /// Thunk address
    pub func: ExportFn,
    /// Flag bits
    pub flags: u32,
}

impl MethodEntry {
    /// Check whether the thunk needs the calling context
    pub fn is_slow_native(&self) -> bool {
        self.flags & FLAG_SLOW_NATIVE != 0
    }

    /// Parse the signature string
    pub fn parsed_signature(&self) -> InteropResult<Signature> {
        Signature::parse(&self.signature)
    }
}

/// Module → methods and module → classpath tables.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    order: Vec<String>,
    methods: HashMap<String, Vec<MethodEntry>>,
    classpaths: HashMap<String, String>,
}

impl MethodRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every link-time submission
    pub fn from_exports() -> Self {
        let mut registry = Self::new();
        for entry in inventory::iter::<ExportEntry> {
            registry.add_method(entry.module, entry.name, entry.signature, entry.func, entry.flags);
        }
        for entry in inventory::iter::<ClasspathEntry> {
            registry.set_classpath(entry.module, entry.classpath);
        }
        log::debug!(
            "Collected {} exports across {} modules",
            registry.methods.values().map(Vec::len).sum::<usize>(),
            registry.order.len()
        );
        registry
    }

    /// Append a row to a module's method list
    pub fn add_method(&mut self, module: &str, name: &str, signature: &str, func: ExportFn, flags: u32) {
        if !self.methods.contains_key(module) {
            self.order.push(module.to_string());
        }
        self.methods.entry(module.to_string()).or_default().push(MethodEntry {
            name: name.to_string(),
            signature: signature.to_string(),
            func,
            flags,
        });
    }

    /// Rows of a module in registration order (empty for unknown modules)
    pub fn methods(&self, module: &str) -> &[MethodEntry] {
        self.methods.get(module).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Modules with at least one row, in first-registration order
    pub fn modules(&self) -> &[String] {
        &self.order
    }

    /// Register a classpath override
    pub fn set_classpath(&mut self, module: &str, classpath: &str) {
        self.classpaths.insert(module.to_string(), classpath.to_string());
    }

    /// Resolve a module's classpath: override first, then the default table
    pub fn classpath(&self, module: &str) -> Result<&str, RegistryError> {
        if let Some(path) = self.classpaths.get(module) {
            return Ok(path.as_str());
        }
        DEFAULT_CLASSPATHS
            .iter()
            .find(|(name, _)| *name == module)
            .map(|(_, path)| *path)
            .ok_or_else(|| RegistryError::ClasspathNotFound {
                module: module.to_string(),
            })
    }

    /// Resolve a module's classpath, aborting the process if there is none
    pub fn classpath_or_abort(&self, module: &str) -> &str {
        match self.classpath(module) {
            Ok(path) => path,
            Err(e) => crate::fatal!("{}", e),
        }
    }
}

/// Receives method rows during the binding pass.
pub trait MethodBinder {
    /// Bind one row to the managed class at `classpath`.
    ///
    /// Returns whether the runtime accepted the binding.
    fn bind(&mut self, classpath: &str, method: &MethodEntry) -> InteropResult<bool>;
}

/// Hand every row of `module` to `binder`; returns how many were accepted
pub fn bind_module(
    registry: &MethodRegistry,
    module: &str,
    binder: &mut dyn MethodBinder,
) -> InteropResult<usize> {
    let rows = registry.methods(module);
    if rows.is_empty() {
        return Err(RegistryError::UnknownModule(module.to_string()).into());
    }
    let classpath = registry.classpath(module)?;
    bind_methods(classpath, rows, binder)
}

/// Hand `rows` to `binder` under `classpath`; returns how many were accepted
pub fn bind_methods(classpath: &str, rows: &[MethodEntry], binder: &mut dyn MethodBinder) -> InteropResult<usize> {
    let mut bound = 0;
    for row in rows {
        if binder.bind(classpath, row)? {
            bound += 1;
        } else {
            log::warn!("Runtime rejected {}.{} ({})", classpath, row.name, row.signature);
        }
    }
    log::debug!("Bound {}/{} methods to {}", bound, rows.len(), classpath);
    Ok(bound)
}
