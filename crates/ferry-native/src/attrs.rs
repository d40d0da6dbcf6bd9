// #[interop(...)] argument parsing

use proc_macro2::TokenStream;
use syn::parse::Parser;
use syn::{LitStr, Result};

/// Module used when the attribute does not name one
pub const DEFAULT_MODULE: &str = "InteropNativeModule";

/// Parsed `#[interop(module = "...", name = "...", ctx)]`
#[derive(Default)]
pub struct InteropArgs {
    pub module: Option<LitStr>,
    pub name: Option<LitStr>,
    pub ctx: bool,
}

impl InteropArgs {
    pub fn parse(attr: TokenStream) -> Result<Self> {
        let mut args = InteropArgs::default();
        let parser = syn::meta::parser(|meta| {
            if meta.path.is_ident("module") {
                args.module = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("name") {
                args.name = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("ctx") {
                args.ctx = true;
                Ok(())
            } else {
                Err(meta.error("expected `module = \"...\"`, `name = \"...\"` or `ctx`"))
            }
        });
        parser.parse2(attr)?;
        Ok(args)
    }

    pub fn module(&self) -> String {
        self.module
            .as_ref()
            .map(LitStr::value)
            .unwrap_or_else(|| DEFAULT_MODULE.to_string())
    }
}

/// `string_length` -> `StringLength`
pub fn export_name(ident: &str) -> String {
    ident
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
