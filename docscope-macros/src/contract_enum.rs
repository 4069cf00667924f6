use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Expr, Fields, Variant};

use crate::attr::{crate_path, default_crate_path, rename_case, serde_string, string_value};

pub fn derive_contract_enum(input: TokenStream) -> TokenStream {
    let input: DeriveInput = match syn::parse2(input) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    expand(&input).unwrap_or_else(|err| err.to_compile_error())
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data) = &input.data else {
        return Err(Error::new_spanned(
            ident,
            "ContractEnum can only be derived for enums",
        ));
    };

    let mut krate = default_crate_path();
    let mut rename_all = None;
    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("contract")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                krate = crate_path(&meta)?;
            } else if meta.path.is_ident("rename_all") {
                rename_all = Some(meta.value()?.parse::<syn::LitStr>()?);
            } else {
                return Err(meta.error("unsupported contract attribute"));
            }
            Ok(())
        })?;
    }

    let rule = match rename_all {
        Some(lit) => Some((lit.value(), lit.span())),
        None => serde_string(&input.attrs, "rename_all").map(|rule| (rule, ident.span())),
    };

    let value = quote!(#krate::__private::serde_json::Value);
    let values = data
        .variants
        .iter()
        .map(|variant| variant_value(variant, rule.as_ref()))
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics #krate::schema::ContractEnum for #ident #ty_generics #where_clause {
            fn variants() -> ::std::vec::Vec<#value> {
                ::std::vec![#(#value::from(#values)),*]
            }
        }
    })
}

fn variant_value(
    variant: &Variant,
    rule: Option<&(String, proc_macro2::Span)>,
) -> syn::Result<TokenStream> {
    if !matches!(variant.fields, Fields::Unit) {
        return Err(Error::new_spanned(
            variant,
            "ContractEnum variants cannot carry data",
        ));
    }

    let mut explicit: Option<Expr> = None;
    let mut rename = None;
    for attr in variant.attrs.iter().filter(|attr| attr.path().is_ident("contract")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                rename = Some(string_value(&meta)?);
            } else if meta.path.is_ident("value") {
                explicit = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unsupported contract variant attribute"));
            }
            Ok(())
        })?;
    }

    if let Some(expr) = explicit {
        return Ok(quote!(#expr));
    }

    let name = variant.ident.to_string();
    let serialized = match rename.or_else(|| serde_string(&variant.attrs, "rename")) {
        Some(renamed) => renamed,
        None => match rule {
            Some((rule, span)) => rename_case(&name, rule)
                .ok_or_else(|| Error::new(*span, format!("unknown rename_all rule {rule:?}")))?,
            None => name,
        },
    };

    Ok(quote!(#serialized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_variants_by_rule_and_override() {
        let output = derive_contract_enum(quote! {
            #[serde(rename_all = "snake_case")]
            enum Status {
                InProgress,
                #[contract(rename = "closed-for-good")]
                Closed,
                #[contract(value = 3)]
                Other,
            }
        })
        .to_string();

        assert!(output.contains("\"in_progress\""));
        assert!(output.contains("\"closed-for-good\""));
        assert!(output.contains("(3)"));
    }

    #[test]
    fn rejects_data_carrying_variants() {
        let output = derive_contract_enum(quote! {
            enum Shape { Circle(f64) }
        })
        .to_string();
        assert!(output.contains("cannot carry data"));
    }
}
