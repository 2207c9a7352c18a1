use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Ident, ItemFn, LitStr, parse_macro_input};

/// Implementation of the `#[register_module(name = "...", path = "...")]`
/// attribute macro.
///
/// Leaves the decorated function unchanged and appends a
/// `#[::keel_core::linkme::distributed_slice]` static that adds it to
/// `MODULE_REGISTRY`.
pub fn register_module(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut name: Option<LitStr> = None;
    let mut path: Option<LitStr> = None;

    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("name") {
            name = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("path") {
            path = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unknown register_module argument, expected `name` or `path`"))
        }
    });
    parse_macro_input!(attr with parser);

    let func = parse_macro_input!(item as ItemFn);

    if let Some(asyncness) = &func.sig.asyncness {
        return syn::Error::new_spanned(asyncness, "module functions must not be async")
            .into_compile_error()
            .into();
    }
    if !func.sig.inputs.is_empty() {
        return syn::Error::new_spanned(&func.sig.inputs, "module functions take no arguments")
            .into_compile_error()
            .into();
    }

    let fn_name = &func.sig.ident;
    let name = name.unwrap_or_else(|| LitStr::new(&fn_name.to_string(), fn_name.span()));
    if name.value().is_empty() {
        return syn::Error::new(name.span(), "module name must not be empty")
            .into_compile_error()
            .into();
    }

    let path = match path {
        Some(path) => quote!(::core::option::Option::Some(#path)),
        None => quote!(::core::option::Option::None),
    };

    let static_name = Ident::new(
        &format!("_MODULE_REGISTER_{}", fn_name.to_string().to_uppercase()),
        Span::call_site(),
    );

    quote! {
        #func

        #[::keel_core::linkme::distributed_slice(::keel_core::MODULE_REGISTRY)]
        #[linkme(crate = ::keel_core::linkme)]
        static #static_name: ::keel_core::ModuleEntry = ::keel_core::ModuleEntry {
            name: #name,
            path: #path,
            load: #fn_name,
        };
    }
    .into()
}
