//! Procedural macros for the Keel server bootstrapper.
//!
//! - `#[register_module]` - Adds a module-producing function to the
//!   link-time module registry in `keel-core`

mod module;

use proc_macro::TokenStream;

/// Registers a `fn() -> Module` as an ambient module.
///
/// # Attributes
///
/// - `name = "..."` - Module name plugins refer to (default: the function name)
/// - `path = "..."` - Also register the module under this filesystem path,
///   relative to the working directory unless absolute
///
/// # Example
///
/// ```rust,ignore
/// use keel::prelude::*;
///
/// #[register_module(name = "keel-health")]
/// fn health() -> Module {
///     Module::namespace().export(
///         "plugin",
///         Module::plugin(Plugin::new("health").register(|server, _options| async move {
///             server.app().set("health", true.into());
///             Ok(())
///         })),
///     )
/// }
/// ```
#[proc_macro_attribute]
pub fn register_module(attr: TokenStream, item: TokenStream) -> TokenStream {
    module::register_module(attr, item)
}
