// ferry-native: the #[interop] attribute
//
// Turns a plain Rust function into a family of C-ABI export thunks:
// - `ferry_<Name>` for callers using the plain C ABI
// - a managed-runtime thunk `(env, class, p0, ...)` registered with the
//   module/method registry under `_<Name>`
//
// Example:
// ```
// use ferry_native::interop;
//
// #[interop(module = "Es2pandaNativeModule", name = "ContextState")]
// fn context_state(context: Context) -> i32 {
//     api().context_state(context)
// }
// ```

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemFn};

mod attrs;
mod export;

/// Exports a Rust function across the interop boundary.
///
/// Arguments:
/// - `module = "..."`: registry module (default `InteropNativeModule`)
/// - `name = "..."`: export name (default: the function name in UpperCamelCase)
/// - `ctx`: the first parameter is a `VmContext` supplied by the caller's
///   runtime; the export is registered with the slow-native flag
///
/// Every parameter type must implement `FromWire` and the return type
/// `IntoWire` for both calling environments. Up to 15 parameters are
/// supported, not counting the context.
///
/// Generated thunks:
/// - decode parameters left to right
/// - call the function, catching panics
/// - release parameters left to right, on every path
/// - encode the result, or raise the error through the caller's runtime
///
/// # Example
///
/// ```ignore
/// #[interop(name = "StringLength")]
/// fn string_length(ptr: NativePointer) -> i32 {
///     unsafe { ptr.as_ref::<String>() }.map_or(0, |s| s.len() as i32)
/// }
/// ```
#[proc_macro_attribute]
pub fn interop(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match attrs::InteropArgs::parse(attr.into()) {
        Ok(args) => args,
        Err(e) => return e.to_compile_error().into(),
    };
    let input = parse_macro_input!(item as ItemFn);
    export::expand_interop(args, input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
