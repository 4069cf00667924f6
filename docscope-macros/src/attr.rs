use syn::{Attribute, Expr, ExprLit, Lit, LitStr, Meta, Path, meta::ParseNestedMeta};

pub fn default_crate_path() -> Path {
    syn::parse_quote!(::docscope)
}

/// Parses `crate = "path"` into a path.
pub fn crate_path(meta: &ParseNestedMeta<'_>) -> syn::Result<Path> {
    let lit: LitStr = meta.value()?.parse()?;
    lit.parse()
}

pub fn string_value(meta: &ParseNestedMeta<'_>) -> syn::Result<String> {
    let lit: LitStr = meta.value()?.parse()?;
    Ok(lit.value())
}

/// Joined `///` comments, if any.
pub fn doc_text(attrs: &[Attribute]) -> Option<String> {
    let lines = attrs
        .iter()
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(pair) if pair.path.is_ident("doc") => match &pair.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(text),
                    ..
                }) => Some(text.value().trim().to_owned()),
                _ => None,
            },
            _ => None,
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();

    (!lines.is_empty()).then(|| lines.join(" "))
}

/// Reads `#[serde(<key> = "...")]` leniently; serde validates its own attributes.
pub fn serde_string(attrs: &[Attribute], key: &str) -> Option<String> {
    let mut found = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(key) {
                if let Ok(value) = string_value(&meta) {
                    found = Some(value);
                }
            } else if let Ok(value) = meta.value() {
                value.parse::<Expr>()?;
            }
            Ok(())
        });
    }

    found
}

/// Applies a serde-style `rename_all` rule to a Rust identifier.
pub fn rename_case(ident: &str, rule: &str) -> Option<String> {
    let words = split_words(ident);
    let lower = || words.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>();

    Some(match rule {
        "lowercase" => ident.to_lowercase(),
        "UPPERCASE" => ident.to_uppercase(),
        "PascalCase" => ident.to_owned(),
        "camelCase" => {
            let mut out = String::new();
            for (index, word) in lower().into_iter().enumerate() {
                if index == 0 {
                    out.push_str(&word);
                } else {
                    out.push_str(&capitalize(&word));
                }
            }
            out
        }
        "snake_case" => lower().join("_"),
        "SCREAMING_SNAKE_CASE" => lower().join("_").to_uppercase(),
        "kebab-case" => lower().join("-"),
        "SCREAMING-KEBAB-CASE" => lower().join("-").to_uppercase(),
        _ => return None,
    })
}

fn split_words(ident: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for ch in ident.chars() {
        match words.last_mut() {
            Some(word) if !ch.is_uppercase() && ch != '_' => word.push(ch),
            _ if ch == '_' => words.push(String::new()),
            _ => words.push(ch.to_string()),
        }
    }
    words.retain(|word| !word.is_empty());
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_like_serde() {
        assert_eq!(rename_case("InProgress", "snake_case").as_deref(), Some("in_progress"));
        assert_eq!(rename_case("InProgress", "kebab-case").as_deref(), Some("in-progress"));
        assert_eq!(rename_case("InProgress", "camelCase").as_deref(), Some("inProgress"));
        assert_eq!(
            rename_case("InProgress", "SCREAMING_SNAKE_CASE").as_deref(),
            Some("IN_PROGRESS")
        );
        assert_eq!(rename_case("Open", "lowercase").as_deref(), Some("open"));
        assert_eq!(rename_case("Open", "Title Case"), None);
    }

    #[test]
    fn reads_doc_comments() {
        let item: syn::ItemStruct = syn::parse_quote! {
            /// First line.
            ///
            /// Second line.
            struct Thing;
        };
        assert_eq!(doc_text(&item.attrs).as_deref(), Some("First line. Second line."));
    }

    #[test]
    fn reads_serde_rename_among_other_keys() {
        let item: syn::ItemStruct = syn::parse_quote! {
            #[serde(default, rename = "created", skip_serializing_if = "Option::is_none")]
            struct Thing;
        };
        assert_eq!(serde_string(&item.attrs, "rename").as_deref(), Some("created"));
        assert_eq!(serde_string(&item.attrs, "rename_all"), None);
    }
}
