//! Schema inference from sampled documents.
//!
//! Only top-level fields are described and the identifier field is skipped.
//! Each field's reported type is picked from the set of runtime types observed
//! across the sample by [`FieldType::precedence`]; nulls never mask a real type.

use std::collections::BTreeSet;

use bson::{Bson, Document};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde_json::Value;

use super::{FieldSchema, FieldType, SchemaReport, SchemaSource};
use crate::{document::to_display_json, normalize::ID_FIELD};

/// Runtime type of a sampled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObservedType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    List,
    Identifier,
    Datetime,
    Decimal,
    Null,
}

impl ObservedType {
    pub fn of(value: &Bson) -> Self {
        match value {
            Bson::String(_)
            | Bson::Symbol(_)
            | Bson::RegularExpression(_)
            | Bson::JavaScriptCode(_)
            | Bson::JavaScriptCodeWithScope(_)
            | Bson::Binary(_) => ObservedType::String,
            Bson::Int32(_) | Bson::Int64(_) => ObservedType::Integer,
            Bson::Double(_) => ObservedType::Float,
            Bson::Boolean(_) => ObservedType::Boolean,
            Bson::Document(_) => ObservedType::Object,
            Bson::Array(_) => ObservedType::List,
            Bson::ObjectId(_) | Bson::DbPointer(_) => ObservedType::Identifier,
            Bson::DateTime(_) | Bson::Timestamp(_) => ObservedType::Datetime,
            Bson::Decimal128(_) => ObservedType::Decimal,
            Bson::Null | Bson::Undefined | Bson::MinKey | Bson::MaxKey => ObservedType::Null,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.field_type() {
            Some(field_type) => field_type.as_str(),
            None => "null",
        }
    }

    /// The reportable type; `None` for null.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            ObservedType::String => Some(FieldType::String),
            ObservedType::Integer => Some(FieldType::Integer),
            ObservedType::Float => Some(FieldType::Float),
            ObservedType::Boolean => Some(FieldType::Boolean),
            ObservedType::Object => Some(FieldType::Object),
            ObservedType::List => Some(FieldType::List),
            ObservedType::Identifier => Some(FieldType::Identifier),
            ObservedType::Datetime => Some(FieldType::Datetime),
            ObservedType::Decimal => Some(FieldType::Decimal),
            ObservedType::Null => None,
        }
    }
}

#[derive(Default)]
struct Observation {
    types: BTreeSet<ObservedType>,
    example: Option<Value>,
    seen_in: usize,
}

/// Describes the top-level fields of `documents`.
///
/// A field is nullable when a sampled value was null or when some sampled
/// documents lack it. An empty sample yields an empty report.
pub fn infer_from_documents(documents: &[Document]) -> SchemaReport {
    let mut observations: IndexMap<&str, Observation> = IndexMap::new();

    for document in documents {
        for (key, value) in document {
            if key == ID_FIELD {
                continue;
            }

            let observation = observations.entry(key.as_str()).or_default();
            let observed = ObservedType::of(value);
            observation.types.insert(observed);
            observation.seen_in += 1;
            if observation.example.is_none() && observed != ObservedType::Null {
                observation.example = Some(to_display_json(value));
            }
        }
    }

    let fields = observations.into_iter().map(|(name, observation)| {
        let field_type = FieldType::resolve(
            observation
                .types
                .iter()
                .filter_map(ObservedType::field_type),
        )
        .unwrap_or(FieldType::String);
        let nullable =
            observation.types.contains(&ObservedType::Null) || observation.seen_in < documents.len();

        let mut names = observation
            .types
            .iter()
            .map(|observed| observed.name().to_owned())
            .collect::<Vec<_>>();
        names.sort();

        FieldSchema::new(name, field_type)
            .nullable(nullable)
            .with_example(observation.example)
            .with_types(names)
    });

    SchemaReport {
        sample_count: documents.len(),
        ..SchemaReport::from_fields(SchemaSource::Sampling, fields)
    }
}

/// Top-level fields holding free text in any of `documents`, in first-seen order.
///
/// Strings shaped like ISO dates (`2024-01-01`, `2024-01-01T12:00:00Z`) are not
/// free text; a field holding only such strings is left out.
pub fn string_fields(documents: &[Document]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for document in documents {
        for (key, value) in document {
            let is_text = matches!(value, Bson::String(text) if !is_date_like(text));
            if key != ID_FIELD && is_text && !fields.iter().any(|field| field == key) {
                fields.push(key.clone());
            }
        }
    }
    fields
}

fn is_date_like(text: &str) -> bool {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").is_ok()
}

#[cfg(test)]
mod tests {
    use bson::{doc, oid::ObjectId};
    use serde_json::json;

    use super::*;

    #[test]
    fn unions_types_and_resolves_by_precedence() {
        let documents = vec![
            doc! { "_id": 1, "code": 7, "price": 1.5, "owner": ObjectId::new() },
            doc! { "_id": 2, "code": "A7", "price": 2, "owner": Bson::Null },
            doc! { "_id": 3, "code": 9, "price": 3.0, "owner": ObjectId::new() },
        ];
        let report = infer_from_documents(&documents);

        assert_eq!(report.source, SchemaSource::Sampling);
        assert_eq!(report.sample_count, 3);
        assert!(report.field("_id").is_none());

        let code = report.field("code").unwrap();
        assert_eq!(code.field_type, FieldType::String);
        assert_eq!(code.types, Some(vec!["integer".to_owned(), "string".to_owned()]));
        assert_eq!(code.example, json!(7));

        assert_eq!(report.field("price").unwrap().field_type, FieldType::Integer);

        let owner = report.field("owner").unwrap();
        assert_eq!(owner.field_type, FieldType::Identifier);
        assert!(owner.nullable);
        assert_eq!(owner.types, Some(vec!["identifier".to_owned(), "null".to_owned()]));
    }

    #[test]
    fn missing_fields_are_nullable_and_null_never_masks() {
        let documents = vec![
            doc! { "name": "a", "seen": bson::DateTime::from_millis(0), "note": Bson::Null },
            doc! { "name": "b" },
        ];
        let report = infer_from_documents(&documents);

        assert!(!report.field("name").unwrap().nullable);

        let seen = report.field("seen").unwrap();
        assert_eq!(seen.field_type, FieldType::Datetime);
        assert!(seen.nullable);
        assert_eq!(seen.example, json!("1970-01-01T00:00:00.000Z"));

        let note = report.field("note").unwrap();
        assert_eq!(note.field_type, FieldType::String);
        assert!(note.nullable);
        assert_eq!(note.example, json!("example"));
    }

    #[test]
    fn empty_sample_is_an_empty_report() {
        let report = infer_from_documents(&[]);
        assert!(report.is_empty());
        assert_eq!(report.sample_count, 0);
    }

    #[test]
    fn discovers_string_fields() {
        let documents = vec![
            doc! { "_id": "x", "name": "a", "age": 3 },
            doc! { "title": "t", "name": "b", "age": "old", "created_at": "2024-01-01T12:00:00" },
            doc! { "date": "2024-02-01", "created_at": "2024-01-02" },
        ];
        assert_eq!(string_fields(&documents), ["name", "title", "age"]);
    }
}
