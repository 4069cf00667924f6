//! Identifier normalization for loosely-typed filters.
//!
//! Filters usually arrive as JSON, where a document identifier can only be spelled
//! as a 24-character hex string. MongoDB compares that string against an
//! `ObjectId` and finds nothing, so before a filter reaches the store every
//! identifier-candidate string in identifier position is rewritten into a native
//! [`ObjectId`].
//!
//! Rewriting is best-effort: a candidate that does not parse stays the original
//! string, and nothing here ever fails. Because the rewritten values are typed
//! identifiers rather than strings, a second pass finds no candidates and
//! normalization is idempotent.

use bson::{Bson, Document, oid::ObjectId};

/// The identifier field of every document.
pub const ID_FIELD: &str = "_id";

const CANDIDATE_LEN: usize = 24;

/// Returns `true` for strings that look like a serialized identifier (24 hex characters).
pub fn is_identifier_candidate(value: &str) -> bool {
    value.len() == CANDIDATE_LEN && value.bytes().all(|byte| byte.is_ascii_hexdigit())
}

/// Rewrites identifier-candidate strings in identifier position into native identifiers.
///
/// The normalizer never mutates its input; every call produces a new tree.
#[derive(Debug, Clone)]
pub struct IdentifierNormalizer {
    id_field: String,
}

impl Default for IdentifierNormalizer {
    fn default() -> Self {
        Self::new(ID_FIELD)
    }
}

impl IdentifierNormalizer {
    /// Creates a normalizer for the given identifier field.
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
        }
    }

    /// The identifier field this normalizer rewrites.
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Produces a normalized copy of `filter`.
    ///
    /// Walks the filter recursively:
    ///
    /// - a candidate string under the identifier field becomes an [`ObjectId`];
    /// - an operator document under the identifier field rewrites the operands of
    ///   `$in`/`$nin` element-wise and the operand of `$eq`, passing every other
    ///   operator through;
    /// - a list under the identifier field converts candidates element-wise;
    /// - lists of documents (`$and`, `$or`, `$nor`, ...) and nested documents are
    ///   walked as sub-filters.
    ///
    /// Values under any other field are left untouched.
    pub fn normalize(&self, filter: &Document) -> Document {
        filter
            .iter()
            .map(|(key, value)| {
                let normalized = if key == &self.id_field {
                    self.normalize_identifier_value(value)
                } else {
                    self.normalize_nested(value)
                };
                (key.clone(), normalized)
            })
            .collect()
    }

    /// Converts a single value if it is an identifier candidate, otherwise returns it unchanged.
    pub fn convert_candidate(&self, value: &Bson) -> Bson {
        match value {
            Bson::String(text) if is_identifier_candidate(text) => ObjectId::parse_str(text)
                .map(Bson::ObjectId)
                .unwrap_or_else(|_| value.clone()),
            _ => value.clone(),
        }
    }

    fn normalize_identifier_value(&self, value: &Bson) -> Bson {
        match value {
            Bson::String(_) => self.convert_candidate(value),
            Bson::Document(operators) => Bson::Document(
                operators
                    .iter()
                    .map(|(op, operand)| {
                        let normalized = match op.as_str() {
                            "$in" | "$nin" => self.convert_list(operand),
                            "$eq" => self.convert_candidate(operand),
                            _ => operand.clone(),
                        };
                        (op.clone(), normalized)
                    })
                    .collect(),
            ),
            Bson::Array(_) => self.convert_list(value),
            _ => value.clone(),
        }
    }

    fn convert_list(&self, value: &Bson) -> Bson {
        match value {
            Bson::Array(items) => Bson::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Bson::Document(document) => Bson::Document(self.normalize(document)),
                        _ => self.convert_candidate(item),
                    })
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    fn normalize_nested(&self, value: &Bson) -> Bson {
        match value {
            Bson::Document(document) => Bson::Document(self.normalize(document)),
            Bson::Array(items) => Bson::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Bson::Document(document) => Bson::Document(self.normalize(document)),
                        _ => item.clone(),
                    })
                    .collect(),
            ),
            _ => value.clone(),
        }
    }
}

/// Normalizes `filter` for the default identifier field.
pub fn normalize_filter(filter: &Document) -> Document {
    IdentifierNormalizer::default().normalize(filter)
}
