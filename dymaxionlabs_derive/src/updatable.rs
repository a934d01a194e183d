//! Implementation of `#[derive(Updatable)]`.

use proc_macro2::{Ident, Span, TokenStream};
use syn::{Data, DeriveInput, Field, Meta};

/// Generate `impl Updatable` plus the matching `*Update` struct.
pub(crate) fn derive(ast: &DeriveInput) -> TokenStream {
    let name = &ast.ident;
    let vis = &ast.vis;
    let update_name = Ident::new(&format!("{}Update", name), Span::call_site());
    let update_comment = format!("A partial update to `{}`, sent as a PATCH body.", name);
    let update_fields = fields_for_update_type(ast);
    quote! {
        impl Updatable for #name {
            type Update = #update_name;
        }

        #[doc = #update_comment]
        #[derive(Clone, Debug, Default, PartialEq, Serialize)]
        #[non_exhaustive]
        #vis struct #update_name {
            #( #update_fields )*
        }
    }
}

/// Find all `#[updatable]` fields in the original struct, and return a list of
/// fields for our `*Update` struct.
fn fields_for_update_type(ast: &DeriveInput) -> Vec<TokenStream> {
    let mut new_fields = vec![];

    if let Data::Struct(ref data_struct) = ast.data {
        for field in &data_struct.fields {
            if is_updatable(field) {
                let vis = &field.vis;
                let name = field
                    .ident
                    .as_ref()
                    .expect("Cannot `#[derive(Updatable)]` for tuple struct");
                let ty = &field.ty;
                let comment = format!("New value for `{}` (optional).", name);
                new_fields.push(quote! {
                    #[doc = #comment]
                    #[serde(skip_serializing_if = "Option::is_none")]
                    #vis #name: Option<<#ty as Updatable>::Update>,
                });
            }
        }
    } else {
        panic!("`#[derive(Updatable)]` may only be used on structs");
    }

    new_fields
}

/// Is this field marked with a bare `#[updatable]`?
fn is_updatable(field: &Field) -> bool {
    let mut updatable = false;
    for attr in &field.attrs {
        if !attr.path.is_ident("updatable") {
            continue;
        }
        match attr.parse_meta().expect("unparseable attribute") {
            Meta::Path(_) => updatable = true,
            _ => panic!("expected `#[updatable]` without arguments"),
        }
    }
    updatable
}
