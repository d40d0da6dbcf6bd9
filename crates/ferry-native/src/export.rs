// #[interop] expansion
//
// For an implementation function
//
//     #[interop(module = "M", name = "Add")]
//     fn add(a: i32, b: i32) -> i32 { a + b }
//
// the expansion keeps `add` and emits:
//
//     #[no_mangle]
//     pub unsafe extern "C" fn ferry_Add(p0: Wire<i32>, p1: Wire<i32>) -> Wire<i32>
//
//     pub unsafe extern "C" fn __ferry_managed_Add(
//         env: *mut RawEnv, class: ObjectRef, p0: Wire<i32>, p1: Wire<i32>,
//     ) -> Wire<i32>
//
//     inventory::submit! { ExportEntry { module: "M", name: "_Add", signature: "i32|i32|i32", .. } }
//
// Both thunks share one body: decode every parameter left to right, call the
// implementation under catch_unwind, release every parameter left to right,
// then encode the result or throw.

use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::{FnArg, GenericArgument, Ident, ItemFn, PathArguments, Result, ReturnType, Type};

use crate::attrs::{export_name, InteropArgs};

/// Largest supported parameter count, excluding the context parameter
pub const MAX_ARITY: usize = 15;

/// Slow-native registry flag (mirrors `ferry_sdk::FLAG_SLOW_NATIVE`)
const FLAG_SLOW_NATIVE: u32 = 1;

pub fn expand_interop(args: InteropArgs, func: ItemFn) -> Result<TokenStream> {
    validate_signature(&func)?;

    let impl_name = &func.sig.ident;
    let name = args
        .name
        .as_ref()
        .map(|lit| lit.value())
        .unwrap_or_else(|| export_name(&impl_name.to_string()));
    let module = args.module();

    let mut params: Vec<&Type> = Vec::new();
    for arg in &func.sig.inputs {
        match arg {
            FnArg::Typed(pat_type) => params.push(&pat_type.ty),
            FnArg::Receiver(_) => {
                return Err(syn::Error::new_spanned(
                    arg,
                    "methods (self) are not supported in #[interop]",
                ))
            }
        }
    }

    if args.ctx {
        let takes_context = params
            .first()
            .is_some_and(|ty| last_ident(ty).as_deref() == Some("VmContext"));
        if !takes_context {
            return Err(syn::Error::new_spanned(
                &func.sig,
                "`ctx` exports take a `VmContext` as their first parameter",
            ));
        }
        params.remove(0);
    }

    if params.len() > MAX_ARITY {
        return Err(syn::Error::new_spanned(
            &func.sig.inputs,
            format!(
                "#[interop] supports at most {} parameters, found {}",
                MAX_ARITY,
                params.len()
            ),
        ));
    }

    let ret: Type = match &func.sig.output {
        ReturnType::Default => syn::parse_quote!(()),
        ReturnType::Type(_, ty) => (**ty).clone(),
    };

    let signature = signature_string(&ret, &params)?;
    let flags = if args.ctx { FLAG_SLOW_NATIVE } else { 0 };

    let native_ident = format_ident!("ferry_{}", name);
    let managed_ident = format_ident!("__ferry_managed_{}", name);
    let registered_name = format!("_{}", name);

    let native_env: Type = syn::parse_quote!(::ferry_sdk::NativeEnv);
    let managed_env: Type = syn::parse_quote!(::ferry_sdk::ManagedEnv);

    let wires: Vec<Ident> = (0..params.len()).map(|i| format_ident!("p{}", i)).collect();

    let native_params = wire_params(&wires, &params, &native_env);
    let managed_params = wire_params(&wires, &params, &managed_env);
    let native_body = thunk_body(&name, impl_name, args.ctx, &wires, &params, &ret, &native_env);
    let managed_body = thunk_body(&name, impl_name, args.ctx, &wires, &params, &ret, &managed_env);

    Ok(quote! {
        #func

        #[doc(hidden)]
        #[no_mangle]
        #[allow(non_snake_case, clippy::too_many_arguments, clippy::missing_safety_doc)]
        pub unsafe extern "C" fn #native_ident(
            #(#native_params),*
        ) -> <#ret as ::ferry_sdk::IntoWire<#native_env>>::Wire {
            let __env = #native_env;
            #native_body
        }

        #[doc(hidden)]
        #[allow(non_snake_case, clippy::too_many_arguments, clippy::missing_safety_doc)]
        pub unsafe extern "C" fn #managed_ident(
            __raw_env: *mut ::ferry_sdk::RawEnv,
            _class: ::ferry_sdk::ObjectRef,
            #(#managed_params),*
        ) -> <#ret as ::ferry_sdk::IntoWire<#managed_env>>::Wire {
            let __env = ::ferry_sdk::ManagedEnv::from_raw(__raw_env);
            #managed_body
        }

        ::ferry_sdk::__private::inventory::submit! {
            ::ferry_sdk::ExportEntry {
                module: #module,
                name: #registered_name,
                signature: #signature,
                func: ::ferry_sdk::ExportFn(#managed_ident as *const ::std::ffi::c_void),
                flags: #flags,
            }
        }
    })
}

fn validate_signature(func: &ItemFn) -> Result<()> {
    let sig = &func.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new_spanned(
            asyncness,
            "async functions cannot be exported; return a Deferred's promise instead",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "generic functions cannot be exported",
        ));
    }
    if let Some(variadic) = &sig.variadic {
        return Err(syn::Error::new_spanned(variadic, "variadic functions cannot be exported"));
    }
    Ok(())
}

fn wire_params(wires: &[Ident], params: &[&Type], env: &Type) -> Vec<TokenStream> {
    wires
        .iter()
        .zip(params)
        .map(|(wire, ty)| quote!(#wire: <#ty as ::ferry_sdk::FromWire<#env>>::Wire))
        .collect()
}

fn thunk_body(
    name: &str,
    impl_name: &Ident,
    ctx: bool,
    wires: &[Ident],
    params: &[&Type],
    ret: &Type,
    env: &Type,
) -> TokenStream {
    let decoded: Vec<Ident> = (0..wires.len()).map(|i| format_ident!("__d{}", i)).collect();

    let decodes = wires.iter().zip(params).zip(&decoded).map(|((wire, ty), d)| {
        quote! {
            let #d = <#ty as ::ferry_sdk::FromWire<#env>>::decode(&__env, #wire);
        }
    });

    let releases = wires.iter().zip(params).map(|(wire, ty)| {
        quote! {
            <#ty as ::ferry_sdk::FromWire<#env>>::release(&__env, #wire);
        }
    });

    let ctx_arg = if ctx {
        quote!(::ferry_sdk::Env::context(&__env),)
    } else {
        quote!()
    };

    quote! {
        ::ferry_sdk::__private::log::trace!(target: "ferry::exports", "{}", #name);
        #(#decodes)*
        let __result = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(
            move || -> ::ferry_sdk::InteropResult<#ret> {
                ::std::result::Result::Ok(#impl_name(#ctx_arg #(#decoded?),*))
            },
        ));
        #(#releases)*
        match __result {
            ::std::result::Result::Ok(::std::result::Result::Ok(__value)) => {
                <#ret as ::ferry_sdk::IntoWire<#env>>::encode(__value, &__env)
            }
            ::std::result::Result::Ok(::std::result::Result::Err(__error)) => {
                ::ferry_sdk::Env::throw_error(&__env, &::std::format!("{}: {}", #name, __error));
                <#ret as ::ferry_sdk::IntoWire<#env>>::null_wire()
            }
            ::std::result::Result::Err(__payload) => {
                let __error = ::ferry_sdk::InteropError::Panic {
                    name: #name,
                    message: ::ferry_sdk::__private::panic_message(&*__payload),
                };
                ::ferry_sdk::__private::log::error!("{}", __error);
                ::ferry_sdk::Env::throw_error(&__env, &::std::string::ToString::to_string(&__error));
                <#ret as ::ferry_sdk::IntoWire<#env>>::null_wire()
            }
        }
    }
}

/// `ret|p0|p1...` built from the last path segment of each type
pub fn signature_string(ret: &Type, params: &[&Type]) -> Result<String> {
    let mut tags = vec![type_tag(ret)?];
    for ty in params {
        let tag = type_tag(ty)?;
        if tag == "void" {
            return Err(syn::Error::new_spanned(ty, "`()` is not a valid parameter type"));
        }
        tags.push(tag);
    }
    Ok(tags.join("|"))
}

fn type_tag(ty: &Type) -> Result<String> {
    match ty {
        Type::Tuple(tuple) if tuple.elems.is_empty() => Ok("void".to_string()),
        Type::Paren(inner) => type_tag(&inner.elem),
        Type::Group(inner) => type_tag(&inner.elem),
        Type::Path(path) => {
            let Some(segment) = path.path.segments.last() else {
                return Err(syn::Error::new_spanned(ty, "empty type path"));
            };
            if segment.ident == "Result" {
                if let PathArguments::AngleBracketed(generics) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = generics.args.first() {
                        return type_tag(inner);
                    }
                }
            }
            Ok(segment.ident.to_string())
        }
        Type::Reference(_) => Err(syn::Error::new_spanned(
            ty,
            "reference types cannot cross the boundary; take the value by ownership",
        )),
        _ => Err(syn::Error::new(
            Span::call_site(),
            "unsupported parameter or return type in #[interop] export",
        )),
    }
}

fn last_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn tags(ret: Type, params: Vec<Type>) -> String {
        let refs: Vec<&Type> = params.iter().collect();
        signature_string(&ret, &refs).unwrap()
    }

    #[test]
    fn test_signature_scalars() {
        assert_eq!(tags(parse_quote!(i32), vec![parse_quote!(NativePointer), parse_quote!(i32)]), "i32|NativePointer|i32");
    }

    #[test]
    fn test_signature_void_and_paths() {
        assert_eq!(tags(parse_quote!(()), vec![]), "void");
        assert_eq!(
            tags(parse_quote!(::ferry_sdk::InteropString), vec![parse_quote!(ferry_sdk::StringArray)]),
            "InteropString|StringArray"
        );
    }

    #[test]
    fn test_signature_unwraps_result() {
        assert_eq!(
            tags(parse_quote!(Result<Context, LoadError>), vec![parse_quote!(Config)]),
            "Context|Config"
        );
    }

    #[test]
    fn test_signature_rejects_references() {
        let ty: Type = parse_quote!(&str);
        assert!(signature_string(&parse_quote!(()), &[&ty]).is_err());
    }

    #[test]
    fn test_too_many_parameters() {
        let func: ItemFn = parse_quote! {
            fn wide(a0: i32, a1: i32, a2: i32, a3: i32, a4: i32, a5: i32, a6: i32, a7: i32,
                    a8: i32, a9: i32, a10: i32, a11: i32, a12: i32, a13: i32, a14: i32, a15: i32) {}
        };
        let err = expand_interop(InteropArgs::default(), func).err().unwrap();
        assert!(err.to_string().contains("at most 15"));
    }

    #[test]
    fn test_fifteen_parameters_plus_ctx() {
        let func: ItemFn = parse_quote! {
            fn wide(ctx: VmContext, a0: i32, a1: i32, a2: i32, a3: i32, a4: i32, a5: i32, a6: i32, a7: i32,
                    a8: i32, a9: i32, a10: i32, a11: i32, a12: i32, a13: i32, a14: i32) {}
        };
        let args = InteropArgs {
            ctx: true,
            ..Default::default()
        };
        assert!(expand_interop(args, func).is_ok());
    }

    #[test]
    fn test_ctx_requires_context_parameter() {
        let func: ItemFn = parse_quote!(fn f(a: i32) {});
        let args = InteropArgs {
            ctx: true,
            ..Default::default()
        };
        assert!(expand_interop(args, func).is_err());
    }

    #[test]
    fn test_async_rejected() {
        let func: ItemFn = parse_quote!(async fn f() {});
        assert!(expand_interop(InteropArgs::default(), func).is_err());
    }
}
