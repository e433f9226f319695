extern crate proc_macro;
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput};

/// Derives `all_variants()`, returning the upper-cased names of every unit variant. Command
/// grammars use the list as the accepted term set of an enumerated argument, e.g.
/// `AGGREGATE <SUM | MIN | MAX>`.
#[proc_macro_derive(VariantNames)]
pub fn enum_variant_names_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = &input.ident;
    let variants = match input.data {
        Data::Enum(ref data_enum) => data_enum
            .variants
            .iter()
            .map(|v| v.ident.to_string().to_uppercase())
            .collect::<Vec<_>>(),
        _ => {
            return syn::Error::new_spanned(name, "VariantNames can only be derived for enums")
                .to_compile_error()
                .into()
        }
    };

    let generated = quote! {
        impl #name {
            pub fn all_variants() -> &'static [&'static str] {
                &[
                    #(#variants),*
                ]
            }
        }
    };

    TokenStream::from(generated)
}
