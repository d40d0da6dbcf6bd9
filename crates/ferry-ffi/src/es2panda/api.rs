//! The compiler-service function table and typed handles over it

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::path::Path;

use parking_lot::Mutex;
use thiserror::Error;

use crate::loader::{Library, LoadError};

/// Entry symbol exported by the compiler library
pub const ENTRY_SYMBOL: &str = "es2panda_GetImpl";

/// ABI version requested from the entry symbol
pub const ABI_VERSION: i32 = 1;

ferry_sdk::define_handle! {
    /// Compiler configuration
    pub struct Config;
    /// Per-file compilation context
    pub struct Context;
    /// Context shared across files of one compilation
    pub struct GlobalContext;
    /// Parsed program
    pub struct Program;
    /// AST node
    pub struct AstNode;
    /// Checked function signature
    pub struct FunctionSignature;
    /// Lexical scope
    pub struct Scope;
    /// Bound variable
    pub struct Variable;
    /// Variable declaration
    pub struct Declaration;
}

/// Errors raised by the compiler bridge
#[derive(Debug, Error)]
pub enum CompilerError {
    /// The compiler library could not be loaded
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The function table is for another ABI version
    #[error("Compiler table has version {found}, expected {expected}")]
    VersionMismatch {
        /// Version stored in the table
        found: i32,
        /// Version this crate binds
        expected: i32,
    },

    /// An argument cannot be passed to the compiler
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

type Raw = *mut c_void;

/// Visitor passed to `ast_node_iterate_const`
pub type NodeVisitor = unsafe extern "C" fn(node: Raw, arg: Raw);

/// Function table returned by [`ENTRY_SYMBOL`].
///
/// Starts with the table's ABI version, which is checked before any entry is
/// read. The entries that follow are the ones this crate binds, in the order
/// a table of [`ABI_VERSION`] lays them out.
#[repr(C)]
pub struct CompilerApi {
    pub version: i32,
    pub mem_initialize: unsafe extern "C" fn(),
    pub mem_finalize: unsafe extern "C" fn(),
    pub create_config: unsafe extern "C" fn(argc: i32, argv: *const *const c_char) -> Raw,
    pub destroy_config: unsafe extern "C" fn(config: Raw),
    pub create_context_from_string:
        unsafe extern "C" fn(config: Raw, source: *const c_char, file_name: *const c_char) -> Raw,
    pub create_context_from_file: unsafe extern "C" fn(config: Raw, file_name: *const c_char) -> Raw,
    pub create_global_context:
        unsafe extern "C" fn(config: Raw, files: *const *const c_char, count: u32, lsp_usage: bool) -> Raw,
    pub destroy_global_context: unsafe extern "C" fn(global: Raw),
    pub proceed_to_state: unsafe extern "C" fn(context: Raw, state: i32) -> Raw,
    pub destroy_context: unsafe extern "C" fn(context: Raw),
    pub context_state: unsafe extern "C" fn(context: Raw) -> i32,
    pub context_error_message: unsafe extern "C" fn(context: Raw) -> *const c_char,
    pub get_all_error_messages: unsafe extern "C" fn(context: Raw) -> *const c_char,
    pub context_program: unsafe extern "C" fn(context: Raw) -> Raw,
    pub program_ast: unsafe extern "C" fn(context: Raw, program: Raw) -> Raw,
    pub ast_node_is_program_const: unsafe extern "C" fn(context: Raw, node: Raw) -> bool,
    pub ast_node_dump_json_const: unsafe extern "C" fn(context: Raw, node: Raw) -> *const c_char,
    pub ast_node_dump_ets_src_const: unsafe extern "C" fn(context: Raw, node: Raw) -> *const c_char,
    pub ast_node_iterate_const: unsafe extern "C" fn(context: Raw, node: Raw, visit: NodeVisitor, arg: Raw),
    pub ast_node_variable_const: unsafe extern "C" fn(context: Raw, node: Raw) -> Raw,
    pub ast_node_scope_const: unsafe extern "C" fn(context: Raw, node: Raw) -> Raw,
    pub variable_declaration: unsafe extern "C" fn(context: Raw, variable: Raw) -> Raw,
    pub decl_node: unsafe extern "C" fn(context: Raw, declaration: Raw) -> Raw,
    pub scope_set_parent: unsafe extern "C" fn(context: Raw, scope: Raw, parent: Raw),
    pub call_expression_signature: unsafe extern "C" fn(context: Raw, node: Raw) -> Raw,
    pub signature_function: unsafe extern "C" fn(context: Raw, signature: Raw) -> Raw,
    pub create_number_literal: unsafe extern "C" fn(context: Raw, value: f64) -> Raw,
}

/// Strings whose pointers the compiler may keep until an owner is destroyed
#[derive(Debug, Default)]
struct RetainedStrings {
    by_owner: Mutex<HashMap<usize, Vec<CString>>>,
}

impl RetainedStrings {
    fn retain(&self, owner: Raw, strings: Vec<CString>) {
        if !owner.is_null() && !strings.is_empty() {
            self.by_owner.lock().entry(owner as usize).or_default().extend(strings);
        }
    }

    fn release(&self, owner: Raw) {
        self.by_owner.lock().remove(&(owner as usize));
    }

    fn len(&self) -> usize {
        self.by_owner.lock().len()
    }
}

fn c_string(value: &str) -> Result<CString, CompilerError> {
    CString::new(value).map_err(|e| CompilerError::InvalidArgument(e.to_string()))
}

fn c_strings<S: AsRef<str>>(values: &[S]) -> Result<Vec<CString>, CompilerError> {
    values.iter().map(|v| c_string(v.as_ref())).collect()
}

unsafe fn copy_c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

unsafe extern "C" fn collect_child(node: Raw, arg: Raw) {
    let children = &mut *(arg as *mut Vec<AstNode>);
    children.push(AstNode::from_ptr(node));
}

fn check_version(api: &CompilerApi) -> Result<(), CompilerError> {
    if api.version != ABI_VERSION {
        return Err(CompilerError::VersionMismatch {
            found: api.version,
            expected: ABI_VERSION,
        });
    }
    Ok(())
}

/// A loaded compiler service.
pub struct Compiler {
    api: &'static CompilerApi,
    retained: RetainedStrings,
    _library: Option<Library>,
}

// The table is immutable and the compiler is thread-agnostic at this layer.
unsafe impl Send for Compiler {}
unsafe impl Sync for Compiler {}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("library", &self._library.as_ref().map(Library::path))
            .finish()
    }
}

impl Compiler {
    /// Open the compiler library at `path` and fetch its function table
    pub fn load(path: &Path) -> Result<Self, CompilerError> {
        let library = Library::open(path)?;
        // The library is kept alongside the table for as long as the compiler lives.
        let table = unsafe { library.entry_table::<CompilerApi>(ENTRY_SYMBOL, ABI_VERSION)? };
        let api: &'static CompilerApi = unsafe { &*table };
        check_version(api)?;
        log::info!("Compiler service loaded from {}", library.path());
        Ok(Compiler {
            api,
            retained: RetainedStrings::default(),
            _library: Some(library),
        })
    }

    /// Use a function table that is already in this process
    pub fn from_table(api: &'static CompilerApi) -> Result<Self, CompilerError> {
        check_version(api)?;
        Ok(Compiler {
            api,
            retained: RetainedStrings::default(),
            _library: None,
        })
    }

    /// Number of handles that still own retained argument strings
    pub fn retained_owners(&self) -> usize {
        self.retained.len()
    }

    pub fn mem_initialize(&self) {
        unsafe { (self.api.mem_initialize)() }
    }

    pub fn mem_finalize(&self) {
        unsafe { (self.api.mem_finalize)() }
    }

    /// The argument strings live until [`destroy_config`](Self::destroy_config).
    pub fn create_config<S: AsRef<str>>(&self, args: &[S]) -> Result<Config, CompilerError> {
        let args = c_strings(args)?;
        let argv: Vec<*const c_char> = args.iter().map(|a| a.as_ptr()).collect();
        let config = unsafe { (self.api.create_config)(argv.len() as i32, argv.as_ptr()) };
        self.retained.retain(config, args);
        Ok(Config::from_ptr(config))
    }

    pub fn destroy_config(&self, config: Config) {
        unsafe { (self.api.destroy_config)(config.as_ptr()) };
        self.retained.release(config.as_ptr());
    }

    pub fn create_context_from_string(
        &self,
        config: Config,
        source: &str,
        file_name: &str,
    ) -> Result<Context, CompilerError> {
        let source = c_string(source)?;
        let file_name = c_string(file_name)?;
        let context = unsafe {
            (self.api.create_context_from_string)(config.as_ptr(), source.as_ptr(), file_name.as_ptr())
        };
        self.retained.retain(context, vec![source, file_name]);
        Ok(Context::from_ptr(context))
    }

    pub fn create_context_from_file(&self, config: Config, file_name: &str) -> Result<Context, CompilerError> {
        let file_name = c_string(file_name)?;
        let context = unsafe { (self.api.create_context_from_file)(config.as_ptr(), file_name.as_ptr()) };
        self.retained.retain(context, vec![file_name]);
        Ok(Context::from_ptr(context))
    }

    pub fn create_global_context<S: AsRef<str>>(
        &self,
        config: Config,
        files: &[S],
        lsp_usage: bool,
    ) -> Result<GlobalContext, CompilerError> {
        let files = c_strings(files)?;
        let list: Vec<*const c_char> = files.iter().map(|f| f.as_ptr()).collect();
        let global = unsafe {
            (self.api.create_global_context)(config.as_ptr(), list.as_ptr(), list.len() as u32, lsp_usage)
        };
        self.retained.retain(global, files);
        Ok(GlobalContext::from_ptr(global))
    }

    pub fn destroy_global_context(&self, global: GlobalContext) {
        unsafe { (self.api.destroy_global_context)(global.as_ptr()) };
        self.retained.release(global.as_ptr());
    }

    pub fn proceed_to_state(&self, context: Context, state: i32) -> Context {
        Context::from_ptr(unsafe { (self.api.proceed_to_state)(context.as_ptr(), state) })
    }

    pub fn destroy_context(&self, context: Context) {
        unsafe { (self.api.destroy_context)(context.as_ptr()) };
        self.retained.release(context.as_ptr());
    }

    pub fn context_state(&self, context: Context) -> i32 {
        unsafe { (self.api.context_state)(context.as_ptr()) }
    }

    pub fn context_error_message(&self, context: Context) -> String {
        unsafe { copy_c_str((self.api.context_error_message)(context.as_ptr())) }
    }

    pub fn all_error_messages(&self, context: Context) -> String {
        unsafe { copy_c_str((self.api.get_all_error_messages)(context.as_ptr())) }
    }

    pub fn context_program(&self, context: Context) -> Program {
        Program::from_ptr(unsafe { (self.api.context_program)(context.as_ptr()) })
    }

    pub fn program_ast(&self, context: Context, program: Program) -> AstNode {
        AstNode::from_ptr(unsafe { (self.api.program_ast)(context.as_ptr(), program.as_ptr()) })
    }

    pub fn is_program(&self, context: Context, node: AstNode) -> bool {
        unsafe { (self.api.ast_node_is_program_const)(context.as_ptr(), node.as_ptr()) }
    }

    pub fn dump_json(&self, context: Context, node: AstNode) -> String {
        unsafe { copy_c_str((self.api.ast_node_dump_json_const)(context.as_ptr(), node.as_ptr())) }
    }

    pub fn dump_ets_src(&self, context: Context, node: AstNode) -> String {
        unsafe { copy_c_str((self.api.ast_node_dump_ets_src_const)(context.as_ptr(), node.as_ptr())) }
    }

    /// Direct children of `node`, in visit order
    pub fn children(&self, context: Context, node: AstNode) -> Vec<AstNode> {
        let mut children: Vec<AstNode> = Vec::new();
        unsafe {
            (self.api.ast_node_iterate_const)(
                context.as_ptr(),
                node.as_ptr(),
                collect_child,
                &mut children as *mut Vec<AstNode> as Raw,
            )
        };
        children
    }

    pub fn variable(&self, context: Context, node: AstNode) -> Variable {
        Variable::from_ptr(unsafe { (self.api.ast_node_variable_const)(context.as_ptr(), node.as_ptr()) })
    }

    pub fn scope(&self, context: Context, node: AstNode) -> Scope {
        Scope::from_ptr(unsafe { (self.api.ast_node_scope_const)(context.as_ptr(), node.as_ptr()) })
    }

    pub fn variable_declaration(&self, context: Context, variable: Variable) -> Declaration {
        Declaration::from_ptr(unsafe { (self.api.variable_declaration)(context.as_ptr(), variable.as_ptr()) })
    }

    pub fn declaration_node(&self, context: Context, declaration: Declaration) -> AstNode {
        AstNode::from_ptr(unsafe { (self.api.decl_node)(context.as_ptr(), declaration.as_ptr()) })
    }

    pub fn scope_set_parent(&self, context: Context, scope: Scope, parent: Scope) {
        unsafe { (self.api.scope_set_parent)(context.as_ptr(), scope.as_ptr(), parent.as_ptr()) }
    }

    pub fn call_expression_signature(&self, context: Context, node: AstNode) -> FunctionSignature {
        FunctionSignature::from_ptr(unsafe {
            (self.api.call_expression_signature)(context.as_ptr(), node.as_ptr())
        })
    }

    pub fn signature_function(&self, context: Context, signature: FunctionSignature) -> AstNode {
        AstNode::from_ptr(unsafe { (self.api.signature_function)(context.as_ptr(), signature.as_ptr()) })
    }

    pub fn create_number_literal(&self, context: Context, value: f64) -> AstNode {
        AstNode::from_ptr(unsafe { (self.api.create_number_literal)(context.as_ptr(), value) })
    }
}
