//! Opaque continuation tokens for cursor pagination.
//!
//! A token is the URL-safe base64 encoding of a JSON object holding the last row's
//! identifier and, when the sort field is not the identifier, its sort value:
//!
//! ```text
//! {"_id": {"$oid": "65f1c0ffee0123456789abcd"}, "created_at": {"$date": 1709287200000}}
//! ```
//!
//! Scalars plain JSON cannot carry travel in their extended-JSON wrappers
//! (`$oid`, `$date`, `$numberDecimal`) so the decoded value has the stored type.
//! A bare JSON string is always a string.
//!
//! This JSON shape is the only wire format the crate defines. Changing it breaks
//! every token a client still holds.
//!
//! Decoding never fails loudly: anything that is not a well-formed token is
//! reported as `None`, which callers treat exactly like an absent cursor.

use base64::{
    Engine,
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
};
use bson::{Bson, Document};
use serde_json::{Map, Value, json};

use crate::{
    document::{get_path, json_to_bson, to_display_json},
    normalize::ID_FIELD,
};

// Upper bound on accepted token length; longer input is not a token we issued.
const MAX_TOKEN_LEN: usize = 8 * 1024;

/// The sort position a token points at.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPosition {
    /// Identifier of the last row of the previous page.
    pub id: Bson,
    /// Sort value of that row. `None` when the token was issued for an identifier sort.
    pub sort_value: Option<Bson>,
    raw: Map<String, Value>,
}

impl CursorPosition {
    /// The decoded JSON object, before values were revived into BSON.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }
}

/// Encodes and decodes continuation tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorCodec;

impl CursorCodec {
    /// Builds a token from the last row of a page.
    ///
    /// Identifiers, datetimes and decimals are written as extended-JSON wrappers.
    /// A missing sort value is written as `null`.
    pub fn encode(&self, record: &Document, sort_field: &str) -> String {
        let mut token = Map::new();
        token.insert(
            ID_FIELD.to_owned(),
            record.get(ID_FIELD).map(token_value).unwrap_or(Value::Null),
        );

        if sort_field != ID_FIELD {
            token.insert(
                sort_field.to_owned(),
                get_path(record, sort_field)
                    .map(token_value)
                    .unwrap_or(Value::Null),
            );
        }

        URL_SAFE.encode(Value::Object(token).to_string())
    }

    /// Decodes a token issued for `sort_field`.
    ///
    /// Returns `None` for anything that is not valid base64, not a JSON object, has
    /// no identifier, lacks the sort field it is supposed to carry, or holds a
    /// malformed extended-JSON wrapper.
    pub fn decode(&self, token: &str, sort_field: &str) -> Option<CursorPosition> {
        let raw = Self::decode_raw(token)?;

        let id = match raw.get(ID_FIELD)? {
            Value::Null => return None,
            value => json_to_bson(value).ok()?,
        };

        let sort_value = if sort_field == ID_FIELD {
            None
        } else {
            Some(json_to_bson(raw.get(sort_field)?).ok()?)
        };

        Some(CursorPosition {
            id,
            sort_value,
            raw,
        })
    }

    /// Decodes a token into its raw JSON object without interpreting it.
    pub fn decode_raw(token: &str) -> Option<Map<String, Value>> {
        let token = token.trim();
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return None;
        }

        let bytes = URL_SAFE
            .decode(token)
            .or_else(|_| URL_SAFE_NO_PAD.decode(token.trim_end_matches('=')))
            .ok()?;

        match serde_json::from_slice::<Value>(&bytes).ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

fn token_value(value: &Bson) -> Value {
    match value {
        Bson::ObjectId(id) => json!({ "$oid": id.to_hex() }),
        Bson::DateTime(datetime) => json!({ "$date": datetime.timestamp_millis() }),
        Bson::Decimal128(decimal) => json!({ "$numberDecimal": decimal.to_string() }),
        other => to_display_json(other),
    }
}

#[cfg(test)]
mod tests {
    use bson::{DateTime, Decimal128, doc, oid::ObjectId};

    use super::*;

    const CODEC: CursorCodec = CursorCodec;

    #[test]
    fn round_trips_identifier_and_sort_value() {
        let id = ObjectId::parse_str("65f1c0ffee0123456789abcd").unwrap();
        let record = doc! { "_id": id, "name": "b", "value": 10 };

        let token = CODEC.encode(&record, "value");
        let position = CODEC.decode(&token, "value").unwrap();

        assert_eq!(position.id, Bson::ObjectId(id));
        assert_eq!(position.sort_value, Some(Bson::Int32(10)));
        assert_eq!(position.raw().get("_id"), Some(&json!({ "$oid": id.to_hex() })));
    }

    #[test]
    fn identifier_sort_omits_the_sort_value() {
        let token = CODEC.encode(&doc! { "_id": 7, "value": 1 }, "_id");
        let raw = CursorCodec::decode_raw(&token).unwrap();

        assert_eq!(raw.len(), 1);
        assert_eq!(
            CODEC.decode(&token, "_id").unwrap().sort_value,
            None
        );
        assert_eq!(CODEC.decode(&token, "_id").unwrap().id, Bson::Int32(7));
    }

    #[test]
    fn datetimes_and_decimals_keep_their_type() {
        let at = DateTime::from_millis(1_700_000_000_123);
        let token = CODEC.encode(&doc! { "_id": 1, "at": at }, "at");

        let raw = CursorCodec::decode_raw(&token).unwrap();
        assert_eq!(raw.get("at"), Some(&json!({ "$date": 1_700_000_000_123_i64 })));
        assert_eq!(CODEC.decode(&token, "at").unwrap().sort_value, Some(Bson::DateTime(at)));

        let price: Decimal128 = "2.50".parse().unwrap();
        let token = CODEC.encode(&doc! { "_id": 1, "price": price }, "price");
        let Some(Bson::Decimal128(decoded)) = CODEC.decode(&token, "price").unwrap().sort_value
        else {
            panic!("expected a decimal");
        };
        assert_eq!(decoded.to_string(), price.to_string());
    }

    #[test]
    fn strings_stay_strings_whatever_they_look_like() {
        let hex = "65f1c0ffee0123456789abcd";
        let stamp = "2024-03-01T10:00:00Z";
        let token = CODEC.encode(&doc! { "_id": hex, "label": stamp }, "label");
        let position = CODEC.decode(&token, "label").unwrap();

        assert_eq!(position.id, Bson::String(hex.into()));
        assert_eq!(position.sort_value, Some(Bson::String(stamp.into())));
    }

    #[test]
    fn malformed_wrappers_are_no_cursor() {
        let bad_oid = URL_SAFE.encode(r#"{"_id": {"$oid": "zz"}}"#);
        let bad_decimal = URL_SAFE.encode(r#"{"_id": 1, "price": {"$numberDecimal": "x"}}"#);

        assert_eq!(CODEC.decode(&bad_oid, "_id"), None);
        assert_eq!(CODEC.decode(&bad_decimal, "price"), None);
    }

    #[test]
    fn missing_sort_value_round_trips_as_null() {
        let token = CODEC.encode(&doc! { "_id": 1 }, "value");
        assert_eq!(CODEC.decode(&token, "value").unwrap().sort_value, Some(Bson::Null));
    }

    #[test]
    fn garbage_is_no_cursor() {
        let not_an_object = URL_SAFE.encode("[1,2,3]");
        let no_id = URL_SAFE.encode(r#"{"value": 1}"#);
        let wrong_field = CODEC.encode(&doc! { "_id": 1, "value": 2 }, "value");
        let oversized = "A".repeat(MAX_TOKEN_LEN + 4);

        for token in ["", "   ", "!!!not base64!!!", "e30", not_an_object.as_str(), no_id.as_str(), oversized.as_str()] {
            assert_eq!(CODEC.decode(token, "value"), None, "token {token:?}");
        }
        assert_eq!(CODEC.decode(&wrong_field, "name"), None);
    }

    #[test]
    fn tampered_tokens_are_no_cursor() {
        let mut token = CODEC.encode(&doc! { "_id": 1, "value": 2 }, "value");
        token.insert(3, '*');
        assert_eq!(CODEC.decode(&token, "value"), None);

        let truncated = &CODEC.encode(&doc! { "_id": 1, "value": 2 }, "value")[..6];
        assert_eq!(CODEC.decode(truncated, "value"), None);
    }

    #[test]
    fn unpadded_tokens_are_accepted() {
        let token = CODEC.encode(&doc! { "_id": "abc", "value": "x" }, "value");
        let unpadded = token.trim_end_matches('=');

        let position = CODEC.decode(unpadded, "value").unwrap();
        assert_eq!(position.id, Bson::String("abc".into()));
        assert_eq!(position.sort_value, Some(Bson::String("x".into())));
    }
}
