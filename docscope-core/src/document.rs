//! Conversions between stored documents and the JSON shapes callers speak.
//!
//! Rows travel through the core as `bson::Document`. Callers on the far side of an
//! HTTP layer want plain JSON, so [`to_display_json`] flattens the BSON-only
//! scalars (identifiers, datetimes, decimals) into strings, and [`json_to_bson`]
//! goes the other way for filters, accepting the extended-JSON wrappers
//! `{"$oid": ..}`, `{"$date": ..}` and `{"$numberDecimal": ..}`.

use base64::{Engine, engine::general_purpose::STANDARD};
use bson::{Bson, DateTime, Decimal128, Document, de::deserialize_from_document, oid::ObjectId};
use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::error::{BrowseError, BrowseResult};

/// Renders a BSON value as display JSON.
///
/// Identifiers become their 24-character hex form, datetimes RFC 3339 strings with
/// millisecond precision and decimals their canonical string form. Binary payloads
/// are base64 encoded.
pub fn to_display_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(flag) => Value::Bool(*flag),
        Bson::Int32(number) => Value::from(*number),
        Bson::Int64(number) => Value::from(*number),
        Bson::Double(number) => Number::from_f64(*number)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(number.to_string())),
        Bson::String(text) => Value::String(text.clone()),
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::DateTime(datetime) => Value::String(format_datetime(datetime)),
        Bson::Decimal128(decimal) => Value::String(decimal.to_string()),
        Bson::Binary(binary) => Value::String(STANDARD.encode(&binary.bytes)),
        Bson::Array(items) => Value::Array(items.iter().map(to_display_json).collect()),
        Bson::Document(document) => document_to_display_json(document),
        other => Value::String(other.to_string()),
    }
}

/// Renders a whole document as a display JSON object.
pub fn document_to_display_json(document: &Document) -> Value {
    Value::Object(
        document
            .iter()
            .map(|(key, value)| (key.clone(), to_display_json(value)))
            .collect::<Map<String, Value>>(),
    )
}

/// Converts caller JSON into BSON.
///
/// Integers that fit 32 bits become `Int32`, larger ones `Int64`; other numbers
/// become `Double`.
///
/// # Errors
///
/// Returns [`BrowseError::Serialization`] when an extended-JSON wrapper carries a
/// value that does not parse.
pub fn json_to_bson(value: &Value) -> BrowseResult<Bson> {
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Bool(flag) => Bson::Boolean(*flag),
        Value::Number(number) => number_to_bson(number),
        Value::String(text) => Bson::String(text.clone()),
        Value::Array(items) => Bson::Array(
            items
                .iter()
                .map(json_to_bson)
                .collect::<BrowseResult<Vec<_>>>()?,
        ),
        Value::Object(map) => match extended_scalar(map)? {
            Some(scalar) => scalar,
            None => Bson::Document(json_object_to_document(map)?),
        },
    })
}

/// Converts a JSON object into a BSON document.
pub fn json_object_to_document(map: &Map<String, Value>) -> BrowseResult<Document> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), json_to_bson(value)?)))
        .collect()
}

/// Deserializes a row into a caller type.
pub fn from_document<T: DeserializeOwned>(document: Document) -> BrowseResult<T> {
    Ok(deserialize_from_document(document)?)
}

/// Looks up a possibly dotted path (`address.city`) inside a document.
///
/// Only nested documents are traversed; a path through an array resolves to `None`.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(nested) => nested.get(segment)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Keeps only the listed (possibly dotted) fields of a document.
///
/// Fields missing from the document are skipped; the result preserves the
/// document's own field order for top-level keys.
pub fn project(document: &Document, fields: &[String]) -> Document {
    let mut projected = Document::new();

    for (key, value) in document {
        let nested_paths = fields
            .iter()
            .filter_map(|field| field.strip_prefix(key.as_str())?.strip_prefix('.'))
            .map(str::to_owned)
            .collect::<Vec<_>>();

        if fields.iter().any(|field| field == key) {
            projected.insert(key.clone(), value.clone());
        } else if let (Bson::Document(nested), false) = (value, nested_paths.is_empty()) {
            let inner = project(nested, &nested_paths);
            if !inner.is_empty() {
                projected.insert(key.clone(), inner);
            }
        }
    }

    projected
}

pub(crate) fn format_datetime(datetime: &DateTime) -> String {
    datetime
        .to_chrono()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_datetime(text: &str) -> Option<DateTime> {
    chrono::DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|parsed| DateTime::from_chrono(parsed.with_timezone(&chrono::Utc)))
}

fn number_to_bson(number: &Number) -> Bson {
    if let Some(integer) = number.as_i64() {
        i32::try_from(integer)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(integer))
    } else {
        Bson::Double(number.as_f64().unwrap_or(f64::NAN))
    }
}

fn extended_scalar(map: &Map<String, Value>) -> BrowseResult<Option<Bson>> {
    if map.len() != 1 {
        return Ok(None);
    }

    let scalar = match map.iter().next() {
        Some((key, Value::String(hex))) if key == "$oid" => ObjectId::parse_str(hex)
            .map(Bson::ObjectId)
            .map_err(|e| BrowseError::Serialization(format!("invalid $oid {hex:?}: {e}")))?,
        Some((key, Value::String(text))) if key == "$date" => parse_datetime(text)
            .map(Bson::DateTime)
            .ok_or_else(|| BrowseError::Serialization(format!("invalid $date {text:?}")))?,
        Some((key, Value::Number(millis))) if key == "$date" => millis
            .as_i64()
            .map(|millis| Bson::DateTime(DateTime::from_millis(millis)))
            .ok_or_else(|| BrowseError::Serialization(format!("invalid $date {millis}")))?,
        Some((key, Value::String(text))) if key == "$numberDecimal" => text
            .parse::<Decimal128>()
            .map(Bson::Decimal128)
            .map_err(|e| {
                BrowseError::Serialization(format!("invalid $numberDecimal {text:?}: {e}"))
            })?,
        _ => return Ok(None),
    };

    Ok(Some(scalar))
}
