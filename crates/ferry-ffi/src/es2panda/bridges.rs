//! Es2pandaNativeModule exports
//!
//! Thin wrappers over [`Compiler`]. Strings the compiler returns are copied
//! into boxed native strings (see `crate::common`); child lists into boxed
//! pointer vectors.

use ferry_native::interop;
use ferry_sdk::{NativePointer, StringArray};

use super::api::{
    AstNode, Compiler, CompilerError, Config, Context, Declaration, FunctionSignature, GlobalContext, Program, Scope, Variable,
};
use crate::common::{ptr_vector, string_pointer};
use crate::context::interop_context;

fn compiler() -> Result<&'static Compiler, CompilerError> {
    interop_context().compiler().get()
}

fn first_strings(array: &StringArray, count: i64) -> Result<Vec<String>, CompilerError> {
    let count = usize::try_from(count)
        .map_err(|_| CompilerError::InvalidArgument(format!("Negative string count {}", count)))?;
    if count > array.len() {
        return Err(CompilerError::InvalidArgument(format!(
            "Expected {} strings, got {}",
            count,
            array.len()
        )));
    }
    Ok(array[..count].iter().map(|s| s.to_str_lossy().into_owned()).collect())
}

// ============================================================================
// Library and memory
// ============================================================================

#[interop(module = "Es2pandaNativeModule")]
fn set_up_so_path(path: String) {
    interop_context().compiler().set_so_path(path);
}

#[interop(module = "Es2pandaNativeModule")]
fn mem_initialize() -> Result<(), CompilerError> {
    compiler()?.mem_initialize();
    Ok(())
}

#[interop(module = "Es2pandaNativeModule")]
fn mem_finalize() -> Result<(), CompilerError> {
    compiler()?.mem_finalize();
    Ok(())
}

// ============================================================================
// Configs and contexts
// ============================================================================

#[interop(module = "Es2pandaNativeModule")]
fn create_config(argc: i32, argv: StringArray) -> Result<Config, CompilerError> {
    let args = first_strings(&argv, argc as i64)?;
    compiler()?.create_config(&args)
}

#[interop(module = "Es2pandaNativeModule")]
fn destroy_config(config: Config) -> Result<(), CompilerError> {
    compiler()?.destroy_config(config);
    Ok(())
}

#[interop(module = "Es2pandaNativeModule")]
fn create_context_from_string(config: Config, source: String, file_name: String) -> Result<Context, CompilerError> {
    compiler()?.create_context_from_string(config, &source, &file_name)
}

#[interop(module = "Es2pandaNativeModule")]
fn create_context_from_file(config: Config, file_name: String) -> Result<Context, CompilerError> {
    compiler()?.create_context_from_file(config, &file_name)
}

#[interop(module = "Es2pandaNativeModule")]
fn create_global_context(
    config: Config,
    files: StringArray,
    count: u32,
    lsp_usage: bool,
) -> Result<GlobalContext, CompilerError> {
    let files = first_strings(&files, count as i64)?;
    compiler()?.create_global_context(config, &files, lsp_usage)
}

#[interop(module = "Es2pandaNativeModule")]
fn destroy_global_context(global: GlobalContext) -> Result<(), CompilerError> {
    compiler()?.destroy_global_context(global);
    Ok(())
}

#[interop(module = "Es2pandaNativeModule")]
fn proceed_to_state(context: Context, state: i32) -> Result<Context, CompilerError> {
    Ok(compiler()?.proceed_to_state(context, state))
}

#[interop(module = "Es2pandaNativeModule")]
fn context_state(context: Context) -> Result<i32, CompilerError> {
    Ok(compiler()?.context_state(context))
}

#[interop(module = "Es2pandaNativeModule")]
fn context_error_message(context: Context) -> Result<NativePointer, CompilerError> {
    Ok(string_pointer(compiler()?.context_error_message(context)))
}

#[interop(module = "Es2pandaNativeModule")]
fn get_all_error_messages(context: Context) -> Result<NativePointer, CompilerError> {
    Ok(string_pointer(compiler()?.all_error_messages(context)))
}

#[interop(module = "Es2pandaNativeModule")]
fn context_program(context: Context) -> Result<Program, CompilerError> {
    Ok(compiler()?.context_program(context))
}

#[interop(module = "Es2pandaNativeModule")]
fn program_ast(context: Context, program: Program) -> Result<AstNode, CompilerError> {
    Ok(compiler()?.program_ast(context, program))
}

#[interop(module = "Es2pandaNativeModule")]
fn destroy_context(context: Context) -> Result<(), CompilerError> {
    compiler()?.destroy_context(context);
    Ok(())
}

// ============================================================================
// AST
// ============================================================================

#[interop(module = "Es2pandaNativeModule")]
fn is_program(context: Context, node: AstNode) -> Result<bool, CompilerError> {
    Ok(compiler()?.is_program(context, node))
}

#[interop(module = "Es2pandaNativeModule", name = "AstNodeDumpJSONConst")]
fn ast_node_dump_json_const(context: Context, node: AstNode) -> Result<NativePointer, CompilerError> {
    Ok(string_pointer(compiler()?.dump_json(context, node)))
}

#[interop(module = "Es2pandaNativeModule")]
fn ast_node_dump_ets_src_const(context: Context, node: AstNode) -> Result<NativePointer, CompilerError> {
    Ok(string_pointer(compiler()?.dump_ets_src(context, node)))
}

#[interop(module = "Es2pandaNativeModule")]
fn ast_node_children(context: Context, node: AstNode) -> Result<NativePointer, CompilerError> {
    let children = compiler()?.children(context, node);
    Ok(ptr_vector(children.into_iter().map(AstNode::pointer).collect()))
}

#[interop(module = "Es2pandaNativeModule")]
fn ast_node_variable_const(context: Context, node: AstNode) -> Result<Variable, CompilerError> {
    Ok(compiler()?.variable(context, node))
}

#[interop(module = "Es2pandaNativeModule")]
fn ast_node_scope_const(context: Context, node: AstNode) -> Result<Scope, CompilerError> {
    Ok(compiler()?.scope(context, node))
}

#[interop(module = "Es2pandaNativeModule")]
fn variable_declaration(context: Context, variable: Variable) -> Result<Declaration, CompilerError> {
    Ok(compiler()?.variable_declaration(context, variable))
}

#[interop(module = "Es2pandaNativeModule")]
fn decl_node(context: Context, declaration: Declaration) -> Result<AstNode, CompilerError> {
    Ok(compiler()?.declaration_node(context, declaration))
}

/// Returns `scope` for chaining.
#[interop(module = "Es2pandaNativeModule")]
fn scope_set_parent(context: Context, scope: Scope, parent: Scope) -> Result<Scope, CompilerError> {
    compiler()?.scope_set_parent(context, scope, parent);
    Ok(scope)
}

#[interop(module = "Es2pandaNativeModule")]
fn call_expression_signature(context: Context, node: AstNode) -> Result<FunctionSignature, CompilerError> {
    Ok(compiler()?.call_expression_signature(context, node))
}

#[interop(module = "Es2pandaNativeModule")]
fn signature_function(context: Context, signature: FunctionSignature) -> Result<AstNode, CompilerError> {
    Ok(compiler()?.signature_function(context, signature))
}

#[interop(module = "Es2pandaNativeModule")]
fn create_number_literal(context: Context, value: f64) -> Result<AstNode, CompilerError> {
    Ok(compiler()?.create_number_literal(context, value))
}

// ============================================================================
// Struct info
// ============================================================================

#[interop(module = "Es2pandaNativeModule")]
fn insert_global_struct_info(_context: Context, name: String) {
    interop_context().struct_infos().insert(name);
}

#[interop(module = "Es2pandaNativeModule")]
fn has_global_struct_info(_context: Context, name: String) -> bool {
    interop_context().struct_infos().contains(&name)
}
