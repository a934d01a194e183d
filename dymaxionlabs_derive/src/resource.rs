//! Implementation of `#[derive(Resource)]`.

use proc_macro2::TokenStream;
use syn::{Attribute, Data, DeriveInput, Ident, Lit, Meta, MetaNameValue};

/// Do the actual code generation for a `Resource`.
pub(crate) fn derive(ast: &DeriveInput) -> TokenStream {
    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let api_name = get_api_name(&ast.attrs);
    let id_field = get_id_field(ast);
    quote! {
        impl #impl_generics Resource for #name #ty_generics #where_clause {
            fn base_path() -> &'static str {
                concat!("/", #api_name)
            }

            fn id(&self) -> &Id<Self> {
                &self.#id_field
            }
        }
    }
}

/// Search for an `#[api_name = "my_resources"]` attribute and return
/// `"my_resources"` as a `Lit` value.
fn get_api_name(attrs: &[Attribute]) -> Lit {
    for attr in attrs {
        if !attr.path.is_ident("api_name") {
            continue;
        }
        let meta = attr
            .parse_meta()
            .expect("Invalid `api_name`, try #[api_name = \"my_resources\"]");
        match meta {
            Meta::NameValue(MetaNameValue { lit, .. }) => return lit,
            _ => panic!("Invalid `api_name`, try #[api_name = \"my_resources\"]"),
        }
    }
    panic!("Missing attribute `api_name`, try `#[api_name = \"...\"]`");
}

/// Find the single field marked with `#[resource_id]`.
fn get_id_field(ast: &DeriveInput) -> Ident {
    let data_struct = match ast.data {
        Data::Struct(ref data_struct) => data_struct,
        _ => panic!("`#[derive(Resource)]` may only be used on structs"),
    };
    let mut found = None;
    for field in &data_struct.fields {
        if field.attrs.iter().any(|a| a.path.is_ident("resource_id")) {
            if found.is_some() {
                panic!("only one field may be marked `#[resource_id]`");
            }
            found = Some(
                field
                    .ident
                    .clone()
                    .expect("Cannot `#[derive(Resource)]` for tuple struct"),
            );
        }
    }
    found.expect("Missing `#[resource_id]` on the field holding the resource ID")
}
