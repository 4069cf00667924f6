use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Error, Expr, ExprArray, Field, Fields, GenericArgument, LitStr, Path,
    PathArguments, Type, punctuated::Punctuated, token::Comma,
};

use crate::attr::{crate_path, default_crate_path, doc_text, serde_string, string_value};

/// How the innermost (non-wrapper) type of a field is declared.
enum Leaf {
    /// Mapped from the Rust type name.
    Natural,
    /// The type implements `ContractEnum`.
    Enumeration,
    /// Forced by `#[contract(kind = "...")]`.
    Kind(TokenStream),
}

#[derive(Default)]
struct FieldAttrs {
    rename: Option<String>,
    skip: bool,
    readonly: bool,
    enumeration: bool,
    kind: Option<LitStr>,
    bounds: Vec<(&'static str, Expr)>,
    counts: Vec<(&'static str, Expr)>,
    pattern: Option<LitStr>,
    example: Option<Expr>,
    default: Option<Expr>,
    one_of: Option<Punctuated<Expr, Comma>>,
}

const BOUNDS: [&str; 4] = ["min", "max", "exclusive_min", "exclusive_max"];
const COUNTS: [&str; 4] = ["min_length", "max_length", "min_items", "max_items"];

impl FieldAttrs {
    fn parse(field: &Field) -> syn::Result<Self> {
        let mut attrs = FieldAttrs::default();

        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("contract")) {
            attr.parse_nested_meta(|meta| {
                if let Some(name) = BOUNDS.into_iter().find(|name| meta.path.is_ident(name)) {
                    attrs.bounds.push((name, meta.value()?.parse()?));
                } else if let Some(name) = COUNTS.into_iter().find(|name| meta.path.is_ident(name)) {
                    attrs.counts.push((name, meta.value()?.parse()?));
                } else if meta.path.is_ident("rename") {
                    attrs.rename = Some(string_value(&meta)?);
                } else if meta.path.is_ident("skip") {
                    attrs.skip = true;
                } else if meta.path.is_ident("readonly") {
                    attrs.readonly = true;
                } else if meta.path.is_ident("enumeration") {
                    attrs.enumeration = true;
                } else if meta.path.is_ident("kind") {
                    attrs.kind = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("pattern") {
                    attrs.pattern = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("example") {
                    attrs.example = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("default") {
                    attrs.default = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("one_of") {
                    let values: ExprArray = meta.value()?.parse()?;
                    attrs.one_of = Some(values.elems);
                } else {
                    return Err(meta.error("unsupported contract field attribute"));
                }
                Ok(())
            })?;
        }

        if attrs.enumeration && attrs.kind.is_some() {
            return Err(Error::new_spanned(
                field,
                "`enumeration` and `kind` cannot be combined",
            ));
        }

        Ok(attrs)
    }

    fn leaf(&self, declared: &TokenStream) -> syn::Result<Leaf> {
        if self.enumeration {
            return Ok(Leaf::Enumeration);
        }
        let Some(kind) = &self.kind else {
            return Ok(Leaf::Natural);
        };

        let variant = match kind.value().as_str() {
            "text" => quote!(Text),
            "integer" => quote!(WholeNumber),
            "float" => quote!(RealNumber),
            "boolean" => quote!(Flag),
            "object" => quote!(Record(None)),
            "identifier" => quote!(Identifier),
            "datetime" => quote!(Timestamp),
            "decimal" => quote!(ExactDecimal),
            "any" => quote!(Any),
            _ => {
                return Err(Error::new_spanned(
                    kind,
                    "kind must be one of text, integer, float, boolean, object, identifier, datetime, decimal, any",
                ));
            }
        };
        Ok(Leaf::Kind(quote!(#declared::#variant)))
    }
}

pub fn derive_contract(input: TokenStream) -> TokenStream {
    let input: DeriveInput = match syn::parse2(input) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    expand(&input).unwrap_or_else(|err| err.to_compile_error())
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut model_name = ident.to_string();
    let mut krate = default_crate_path();
    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("contract")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                model_name = string_value(&meta)?;
            } else if meta.path.is_ident("crate") {
                krate = crate_path(&meta)?;
            } else {
                return Err(meta.error("unsupported contract attribute"));
            }
            Ok(())
        })?;
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            other => {
                return Err(Error::new_spanned(
                    other,
                    "Contract can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(Error::new_spanned(
                ident,
                "Contract can only be derived for structs with named fields",
            ));
        }
    };

    let mut declarations = Vec::with_capacity(fields.len());
    for field in fields {
        if let Some(declaration) = field_declaration(field, &krate)? {
            declarations.push(declaration);
        }
    }

    Ok(quote! {
        impl #impl_generics #krate::schema::Contract for #ident #ty_generics #where_clause {
            fn contract() -> #krate::schema::ContractModel {
                #krate::schema::ContractModel::builder(#model_name)
                    #(.field(#declarations))*
                    .build()
            }
        }
    })
}

fn field_declaration(field: &Field, krate: &Path) -> syn::Result<Option<TokenStream>> {
    let attrs = FieldAttrs::parse(field)?;
    if attrs.skip {
        return Ok(None);
    }

    let Some(field_ident) = field.ident.as_ref() else {
        return Err(Error::new_spanned(field, "expected a named field"));
    };
    let raw_name = field_ident.to_string();
    let name = attrs
        .rename
        .clone()
        .or_else(|| serde_string(&field.attrs, "rename"))
        .unwrap_or_else(|| raw_name.trim_start_matches("r#").to_owned());

    let declared_path = quote!(#krate::schema::DeclaredType);
    let leaf = attrs.leaf(&declared_path)?;
    let declared = declared_type(&field.ty, &leaf, &declared_path, krate);
    let value = quote!(#krate::__private::serde_json::Value);

    let bounds = attrs.bounds.iter().map(|(method, expr)| {
        let method = syn::Ident::new(method, proc_macro2::Span::call_site());
        quote!(.#method((#expr) as f64))
    });
    let counts = attrs.counts.iter().map(|(method, expr)| {
        let method = syn::Ident::new(method, proc_macro2::Span::call_site());
        quote!(.#method((#expr) as u64))
    });
    let pattern = attrs.pattern.as_ref().map(|pattern| quote!(.pattern(#pattern)));
    let readonly = attrs.readonly.then(|| quote!(.readonly()));
    let example = attrs.example.as_ref().map(|example| quote!(.example(#example)));
    let default = attrs
        .default
        .as_ref()
        .map(|default| quote!(.default_value(#default)));
    let description = doc_text(&field.attrs).map(|text| quote!(.description(#text)));
    let one_of = attrs.one_of.as_ref().map(|values| {
        let values = values.iter();
        quote!(.one_of(::std::vec![#(#value::from(#values)),*]))
    });

    Ok(Some(quote! {
        #krate::schema::ContractField::new(#name, #declared)
            #(#bounds)*
            #(#counts)*
            #pattern
            #readonly
            #example
            #default
            #description
            #one_of
    }))
}

fn declared_type(ty: &Type, leaf: &Leaf, declared: &TokenStream, krate: &Path) -> TokenStream {
    match ty {
        Type::Reference(reference) => declared_type(&reference.elem, leaf, declared, krate),
        Type::Paren(paren) => declared_type(&paren.elem, leaf, declared, krate),
        Type::Group(group) => declared_type(&group.elem, leaf, declared, krate),
        Type::Array(array) => {
            let inner = declared_type(&array.elem, leaf, declared, krate);
            quote!(#declared::sequence(#inner))
        }
        Type::Slice(slice) => {
            let inner = declared_type(&slice.elem, leaf, declared, krate);
            quote!(#declared::sequence(#inner))
        }
        Type::Path(path) if path.qself.is_none() => {
            let Some(segment) = path.path.segments.last() else {
                return quote!(#declared::Any);
            };
            let name = segment.ident.to_string();

            match (name.as_str(), first_type_argument(&segment.arguments)) {
                ("Option", Some(inner)) => {
                    let inner = declared_type(inner, leaf, declared, krate);
                    quote!(#declared::optional(#inner))
                }
                (
                    "Vec" | "VecDeque" | "LinkedList" | "HashSet" | "BTreeSet" | "IndexSet",
                    Some(inner),
                ) => {
                    let inner = declared_type(inner, leaf, declared, krate);
                    quote!(#declared::sequence(#inner))
                }
                ("Box" | "Arc" | "Rc" | "Cow", Some(inner)) => {
                    declared_type(inner, leaf, declared, krate)
                }
                _ => leaf_type(ty, &name, leaf, declared, krate),
            }
        }
        _ => match leaf {
            Leaf::Kind(forced) => forced.clone(),
            _ => quote!(#declared::Any),
        },
    }
}

fn leaf_type(ty: &Type, name: &str, leaf: &Leaf, declared: &TokenStream, krate: &Path) -> TokenStream {
    match leaf {
        Leaf::Kind(forced) => return forced.clone(),
        Leaf::Enumeration => {
            return quote!(#declared::Enumeration(<#ty as #krate::schema::ContractEnum>::variants()));
        }
        Leaf::Natural => {}
    }

    match name {
        "String" | "str" | "char" | "Uuid" => quote!(#declared::Text),
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "u128" | "usize" => quote!(#declared::WholeNumber),
        "f32" | "f64" => quote!(#declared::RealNumber),
        "bool" => quote!(#declared::Flag),
        "ObjectId" => quote!(#declared::Identifier),
        "DateTime" | "NaiveDateTime" | "NaiveDate" | "SystemTime" | "Timestamp" => {
            quote!(#declared::Timestamp)
        }
        "Decimal" | "Decimal128" => quote!(#declared::ExactDecimal),
        "HashMap" | "BTreeMap" | "IndexMap" | "Map" | "Document" => {
            quote!(#declared::Record(None))
        }
        "Value" | "Bson" => quote!(#declared::Any),
        other => quote!(#declared::Record(Some(::std::string::String::from(#other)))),
    }
}

fn first_type_argument(arguments: &PathArguments) -> Option<&Type> {
    let PathArguments::AngleBracketed(arguments) = arguments else {
        return None;
    };

    arguments.args.iter().find_map(|argument| match argument {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}
