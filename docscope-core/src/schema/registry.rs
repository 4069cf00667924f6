//! Registry schemas: OpenAPI component schemas matched by name.
//!
//! A web application that already publishes an OpenAPI description usually has
//! a component schema per stored model. [`SchemaRegistry`] keeps those
//! components, finds the one belonging to a collection with a forgiving name
//! match and translates its properties into a [`SchemaReport`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{Constraints, FieldSchema, FieldType, SchemaReport, SchemaSource};
use crate::error::SchemaSourceError;

const REF_PREFIX: &str = "#/components/schemas/";

/// Name-keyed catalog of component schemas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Value>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `components.schemas` from an OpenAPI document.
    ///
    /// A document without components yields an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaSourceError::Malformed`] when `components` or
    /// `components.schemas` is present but not an object.
    pub fn from_openapi(document: &Value) -> Result<Self, SchemaSourceError> {
        let schemas = match document.get("components") {
            None => return Ok(Self::default()),
            Some(Value::Object(components)) => match components.get("schemas") {
                None => return Ok(Self::default()),
                Some(Value::Object(schemas)) => schemas,
                Some(_) => return Err(malformed("components.schemas is not an object")),
            },
            Some(_) => return Err(malformed("components is not an object")),
        };

        Ok(Self {
            schemas: schemas
                .iter()
                .map(|(name, schema)| (name.clone(), schema.clone()))
                .collect(),
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: Value) {
        self.schemas.insert(name.into(), schema);
    }

    pub fn with_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.insert(name, schema);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Finds the entry for `name`.
    ///
    /// Tries, in order: the exact name; a case-insensitive match; singular and
    /// plural variants (a trailing `s` stripped or added), each as given,
    /// lower-cased and capitalized; finally any entry whose name contains, or is
    /// contained in, `name` ignoring case. Ties go to the alphabetically first entry.
    pub fn lookup(&self, name: &str) -> Option<(&str, &Value)> {
        if name.is_empty() {
            return None;
        }
        if let Some(found) = self.get(name) {
            return Some(found);
        }

        let lowered = name.to_lowercase();
        if let Some(found) = self.find(|key| key.to_lowercase() == lowered) {
            return Some(found);
        }

        let variant = match name.strip_suffix('s') {
            Some(singular) if !singular.is_empty() => singular.to_owned(),
            _ => format!("{name}s"),
        };
        for candidate in [variant.clone(), variant.to_lowercase(), capitalize(&variant)] {
            if let Some(found) = self.get(&candidate) {
                return Some(found);
            }
        }

        self.find(|key| {
            let key = key.to_lowercase();
            !key.is_empty() && (key.contains(&lowered) || lowered.contains(&key))
        })
    }

    /// Looks up each name in turn and returns the first hit.
    pub fn lookup_any<'n>(&self, names: impl IntoIterator<Item = &'n str>) -> Option<(&str, &Value)> {
        names.into_iter().find_map(|name| self.lookup(name))
    }

    /// Translates one component schema.
    ///
    /// Properties outside `required` are nullable. `$ref` properties are resolved
    /// one level deep.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaSourceError::Malformed`] when the schema, its `properties`,
    /// its `required` list or any property definition has the wrong shape.
    pub fn translate(&self, name: &str, schema: &Value) -> Result<SchemaReport, SchemaSourceError> {
        let schema = schema
            .as_object()
            .ok_or_else(|| malformed(format!("{name} is not an object")))?;

        let properties = match schema.get("properties") {
            None => return Ok(SchemaReport::from_fields(SchemaSource::Registry, [])),
            Some(Value::Object(properties)) => properties,
            Some(_) => return Err(malformed(format!("{name}.properties is not an object"))),
        };

        let required = match schema.get("required") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| malformed(format!("{name}.required holds a non-string")))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(malformed(format!("{name}.required is not an array"))),
        };

        let fields = properties
            .iter()
            .map(|(field, definition)| {
                self.translate_property(field, definition, required.contains(&field.as_str()))
                    .map_err(|reason| malformed(format!("{name}.{field}: {reason}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SchemaReport::from_fields(SchemaSource::Registry, fields))
    }

    fn translate_property(
        &self,
        name: &str,
        definition: &Value,
        required: bool,
    ) -> Result<FieldSchema, String> {
        let definition = definition
            .as_object()
            .ok_or_else(|| "definition is not an object".to_owned())?;
        let shape = self.shape(definition, true)?;

        let constraints = constraints(definition);
        if let Some(reason) = constraints.contradiction() {
            return Err(reason);
        }

        let example = definition
            .get("example")
            .or_else(|| definition.get("examples").and_then(|examples| examples.get(0)));

        Ok(FieldSchema::new(name, shape.field_type)
            .nullable(!required || shape.nullable)
            .with_enum(shape.enum_values)
            .with_constraints(constraints)
            .with_readonly(definition.get("readOnly").and_then(Value::as_bool).unwrap_or(false))
            .with_declared_example(example, definition.get("default")))
    }

    fn shape(&self, definition: &Map<String, Value>, follow_refs: bool) -> Result<Shape, String> {
        let explicit_null = definition.get("nullable").and_then(Value::as_bool) == Some(true);

        if let Some(reference) = definition.get("$ref") {
            let reference = reference
                .as_str()
                .ok_or_else(|| "$ref is not a string".to_owned())?;
            return Ok(self.shape_of_ref(reference, follow_refs).or_null(explicit_null));
        }

        for combinator in ["anyOf", "oneOf", "allOf"] {
            if let Some(members) = definition.get(combinator) {
                let members = members
                    .as_array()
                    .ok_or_else(|| format!("{combinator} is not an array"))?;
                return Ok(self.shape_of_members(members, follow_refs)?.or_null(explicit_null));
            }
        }

        let enum_values = match definition.get("enum") {
            None => None,
            Some(Value::Array(values)) if !values.is_empty() => Some(values.clone()),
            Some(_) => return Err("enum is not a non-empty array".into()),
        };

        let (type_name, null_in_type) = match definition.get("type") {
            None => (None, false),
            Some(Value::String(name)) => (Some(name.as_str()), false),
            Some(Value::Array(names)) => {
                let names = names.iter().filter_map(Value::as_str).collect::<Vec<_>>();
                (
                    names.iter().copied().find(|name| *name != "null"),
                    names.contains(&"null"),
                )
            }
            Some(_) => return Err("type is neither a string nor an array".into()),
        };

        let format = definition.get("format").and_then(Value::as_str);
        let field_type = match (type_name, format) {
            (Some("string"), Some("date-time" | "date")) => FieldType::Datetime,
            (Some("string" | "number"), Some("decimal")) => FieldType::Decimal,
            (Some("string"), Some("objectid" | "object-id")) => FieldType::Identifier,
            (Some("string"), _) => FieldType::String,
            (Some("integer"), _) => FieldType::Integer,
            (Some("number"), _) => FieldType::Float,
            (Some("boolean"), _) => FieldType::Boolean,
            (Some("array"), _) => FieldType::List,
            (Some("object"), _) => FieldType::Object,
            (Some("null"), _) | (None, _) => match &enum_values {
                Some(values) => enum_type(values),
                None => FieldType::String,
            },
            (Some(other), _) => return Err(format!("unknown type {other:?}")),
        };

        Ok(Shape {
            field_type,
            nullable: explicit_null || null_in_type || type_name == Some("null"),
            enum_values,
        })
    }

    fn shape_of_ref(&self, reference: &str, follow: bool) -> Shape {
        let target = reference
            .strip_prefix(REF_PREFIX)
            .and_then(|name| self.schemas.get(name))
            .and_then(Value::as_object);

        match target {
            Some(target) if follow => {
                if target.get("type").and_then(Value::as_str) == Some("array") {
                    Shape::plain(FieldType::List)
                } else if target.contains_key("enum") {
                    // Enumeration components translate like inline enums.
                    self.shape(target, false)
                        .unwrap_or_else(|_| Shape::plain(FieldType::String))
                } else {
                    Shape::plain(FieldType::Object)
                }
            }
            _ => Shape::plain(FieldType::Object),
        }
    }

    fn shape_of_members(&self, members: &[Value], follow_refs: bool) -> Result<Shape, String> {
        let mut nullable = false;
        let mut shapes = Vec::new();
        for member in members {
            let member = member
                .as_object()
                .ok_or_else(|| "combinator member is not an object".to_owned())?;
            if member.get("type").and_then(Value::as_str) == Some("null") {
                nullable = true;
                continue;
            }
            shapes.push(self.shape(member, follow_refs)?);
        }

        match shapes.len() {
            0 => Ok(Shape {
                field_type: FieldType::String,
                nullable: true,
                enum_values: None,
            }),
            1 => {
                let only = shapes.remove(0);
                Ok(only.or_null(nullable))
            }
            _ => Ok(Shape {
                field_type: FieldType::resolve(shapes.iter().map(|shape| shape.field_type))
                    .unwrap_or(FieldType::String),
                nullable: nullable || shapes.iter().any(|shape| shape.nullable),
                enum_values: None,
            }),
        }
    }

    fn get(&self, name: &str) -> Option<(&str, &Value)> {
        self.schemas
            .get_key_value(name)
            .map(|(key, value)| (key.as_str(), value))
    }

    fn find(&self, predicate: impl Fn(&str) -> bool) -> Option<(&str, &Value)> {
        self.schemas
            .iter()
            .find(|(key, _)| predicate(key))
            .map(|(key, value)| (key.as_str(), value))
    }
}

#[derive(Debug)]
struct Shape {
    field_type: FieldType,
    nullable: bool,
    enum_values: Option<Vec<Value>>,
}

impl Shape {
    fn plain(field_type: FieldType) -> Self {
        Self {
            field_type,
            nullable: false,
            enum_values: None,
        }
    }

    fn or_null(mut self, nullable: bool) -> Self {
        self.nullable |= nullable;
        self
    }
}

fn constraints(definition: &Map<String, Value>) -> Constraints {
    let number = |key: &str| definition.get(key).and_then(Value::as_f64);
    let count = |key: &str| definition.get(key).and_then(Value::as_u64);

    let mut constraints = Constraints {
        minimum: number("minimum"),
        maximum: number("maximum"),
        exclusive_minimum: number("exclusiveMinimum"),
        exclusive_maximum: number("exclusiveMaximum"),
        min_length: count("minLength"),
        max_length: count("maxLength"),
        pattern: definition
            .get("pattern")
            .and_then(Value::as_str)
            .map(str::to_owned),
        min_items: count("minItems"),
        max_items: count("maxItems"),
    };

    // OpenAPI 3.0 spells exclusivity as a flag on the inclusive bound.
    if definition.get("exclusiveMinimum").and_then(Value::as_bool) == Some(true) {
        constraints.exclusive_minimum = constraints.minimum.take();
    }
    if definition.get("exclusiveMaximum").and_then(Value::as_bool) == Some(true) {
        constraints.exclusive_maximum = constraints.maximum.take();
    }

    constraints
}

fn enum_type(values: &[Value]) -> FieldType {
    let concrete = values.iter().filter(|value| !value.is_null());
    let kinds = concrete
        .map(|value| match value {
            Value::Bool(_) => FieldType::Boolean,
            Value::Number(number) if number.is_f64() => FieldType::Float,
            Value::Number(_) => FieldType::Integer,
            _ => FieldType::String,
        })
        .collect::<Vec<_>>();

    match kinds.as_slice() {
        [] => FieldType::String,
        [first, rest @ ..] if rest.iter().all(|kind| kind == first) => *first,
        _ if kinds
            .iter()
            .all(|kind| matches!(kind, FieldType::Integer | FieldType::Float)) =>
        {
            FieldType::Float
        }
        _ => FieldType::String,
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn malformed(reason: impl Into<String>) -> SchemaSourceError {
    SchemaSourceError::malformed(SchemaSource::Registry, reason)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn openapi() -> Value {
        json!({
            "openapi": "3.1.0",
            "components": {
                "schemas": {
                    "Product": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "minLength": 1 },
                            "price": { "type": "number", "exclusiveMinimum": 0 },
                            "description": {
                                "anyOf": [{ "type": "string" }, { "type": "null" }],
                            },
                            "in_stock": { "type": "boolean", "default": true },
                            "created_at": { "type": "string", "format": "date-time", "readOnly": true },
                            "category": { "$ref": "#/components/schemas/Category" },
                            "variants": { "$ref": "#/components/schemas/VariantList" },
                            "status": { "$ref": "#/components/schemas/Status" },
                        },
                        "required": ["name", "price", "category", "variants", "status"],
                    },
                    "Category": { "type": "object", "properties": { "title": { "type": "string" } } },
                    "VariantList": { "type": "array", "items": { "type": "string" } },
                    "Status": { "type": "string", "enum": ["draft", "live"] },
                    "OrderItem": { "type": "object", "properties": { "qty": { "type": "integer" } } },
                },
            },
        })
    }

    #[test]
    fn name_matching_falls_back_through_heuristics() {
        let registry = SchemaRegistry::from_openapi(&openapi()).unwrap();

        assert_eq!(registry.lookup("Product").map(|(name, _)| name), Some("Product"));
        assert_eq!(registry.lookup("product").map(|(name, _)| name), Some("Product"));
        assert_eq!(registry.lookup("products").map(|(name, _)| name), Some("Product"));
        assert_eq!(registry.lookup("categorys").map(|(name, _)| name), Some("Category"));
        assert_eq!(registry.lookup("order").map(|(name, _)| name), Some("OrderItem"));
        assert_eq!(registry.lookup("invoices"), None);
        assert_eq!(registry.lookup(""), None);
    }

    #[test]
    fn empty_component_names_never_match() {
        let registry = SchemaRegistry::new()
            .with_schema("", json!({ "type": "object" }))
            .with_schema("Invoice", json!({ "type": "object" }));

        assert_eq!(registry.lookup("orders"), None);
        assert_eq!(registry.lookup("invoices").map(|(name, _)| name), Some("Invoice"));
    }

    #[test]
    fn translates_properties_and_required_list() {
        let registry = SchemaRegistry::from_openapi(&openapi()).unwrap();
        let (name, schema) = registry.lookup("products").unwrap();
        let report = registry.translate(name, schema).unwrap();

        assert_eq!(report.source, SchemaSource::Registry);
        assert_eq!(report.fields["name"].field_type, FieldType::String);
        assert!(!report.fields["name"].nullable);
        assert_eq!(report.fields["price"].field_type, FieldType::Float);
        assert_eq!(
            report.fields["price"].constraints.as_ref().unwrap().exclusive_minimum,
            Some(0.0)
        );
        assert_eq!(report.fields["description"].field_type, FieldType::String);
        assert!(report.fields["description"].nullable);
        assert_eq!(report.fields["in_stock"].example, json!(true));
        assert!(report.fields["in_stock"].nullable);
        assert_eq!(report.fields["created_at"].field_type, FieldType::Datetime);
        assert_eq!(report.fields["created_at"].readonly, Some(true));
    }

    #[test]
    fn references_resolve_one_level() {
        let registry = SchemaRegistry::from_openapi(&openapi()).unwrap();
        let (name, schema) = registry.lookup("Product").unwrap();
        let report = registry.translate(name, schema).unwrap();

        assert_eq!(report.fields["category"].field_type, FieldType::Object);
        assert_eq!(report.fields["variants"].field_type, FieldType::List);
        assert_eq!(report.fields["status"].field_type, FieldType::String);
        assert_eq!(
            report.fields["status"].enum_values,
            Some(vec![json!("draft"), json!("live")])
        );
        assert_eq!(report.fields["status"].example, json!("draft"));
    }

    #[test]
    fn openapi_30_exclusive_flags_and_nullable() {
        let registry = SchemaRegistry::new().with_schema(
            "Reading",
            json!({
                "properties": {
                    "value": { "type": "number", "minimum": 0, "exclusiveMinimum": true },
                    "note": { "type": "string", "nullable": true },
                    "id": { "type": "string", "format": "objectid" },
                },
                "required": ["value", "note", "id"],
            }),
        );
        let (name, schema) = registry.lookup("readings").unwrap();
        let report = registry.translate(name, schema).unwrap();

        let value = report.fields["value"].constraints.as_ref().unwrap();
        assert_eq!(value.exclusive_minimum, Some(0.0));
        assert_eq!(value.minimum, None);
        assert!(report.fields["note"].nullable);
        assert_eq!(report.fields["id"].field_type, FieldType::Identifier);
    }

    #[test]
    fn malformed_entries_are_reported() {
        let registry = SchemaRegistry::new()
            .with_schema("Bad", json!({ "properties": ["not", "an", "object"] }))
            .with_schema("Worse", json!({ "properties": { "x": { "type": "tuple" } } }))
            .with_schema("Required", json!({ "properties": {}, "required": "x" }));

        for name in ["Bad", "Worse", "Required"] {
            let (name, schema) = registry.lookup(name).unwrap();
            assert!(matches!(
                registry.translate(name, schema),
                Err(SchemaSourceError::Malformed { origin: SchemaSource::Registry, .. })
            ));
        }

        assert!(SchemaRegistry::from_openapi(&json!({ "components": [] })).is_err());
        assert!(SchemaRegistry::from_openapi(&json!({})).unwrap().is_empty());
    }
}
