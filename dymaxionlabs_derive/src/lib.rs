// `proc_macro` is built into the compiler.
extern crate proc_macro;
// `proc_macro2` wraps `proc_macro` so that we can build token streams outside
// of an actual macro invocation.
extern crate proc_macro2;
#[macro_use]
extern crate quote;
extern crate syn;

mod resource;
mod updatable;

/// Derive boilerplate code for `Resource`.
///
/// The struct needs an `#[api_name = "..."]` attribute naming its collection
/// endpoint, and exactly one field marked `#[resource_id]`.
#[proc_macro_derive(Resource, attributes(api_name, resource_id))]
pub fn resource_derive(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    // We can only report errors via a panic, which the compiler turns into
    // an error message pointing at the derive.
    let input = syn::parse(input).unwrap();
    let gen = resource::derive(&input);
    gen.into()
}

/// Derive a `*Update` type containing the `#[updatable]` fields of a struct.
#[proc_macro_derive(Updatable, attributes(updatable))]
pub fn updatable_derive(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = syn::parse(input).unwrap();
    let gen = updatable::derive(&input);
    gen.into()
}
