//! Field-level schema inference.
//!
//! A [`SchemaReport`] describes the fields of a collection: one primitive
//! [`FieldType`] per field, nullability, an example value and optional
//! enumeration and validation constraints. Three independent sources can
//! produce one, tried in priority order:
//!
//! 1. a [`ContractModel`] declared by the caller;
//! 2. a [`SchemaRegistry`] entry (an OpenAPI component schema) matched by name;
//! 3. sampling live documents, when enabled.
//!
//! The first source yielding a non-empty report wins. A source whose description
//! is malformed is logged and skipped. Only a failing store round trip aborts
//! inference; when every source comes up empty the report is empty with
//! [`SchemaSource::None`].

mod contract;
mod registry;
mod sampling;

use std::fmt;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

pub use contract::{
    Contract, ContractEnum, ContractField, ContractModel, ContractModelBuilder, DeclaredType,
};
pub use registry::SchemaRegistry;
pub use sampling::{ObservedType, infer_from_documents, string_fields};

use crate::{
    backend::StoreBackend,
    collection::Collection,
    config::BrowseConfig,
    context::CallContext,
    error::{BrowseResult, SchemaSourceError},
};

/// The primitive type vocabulary of a report.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Object,
    Identifier,
    Datetime,
    Decimal,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
            FieldType::Object => "object",
            FieldType::Identifier => "identifier",
            FieldType::Datetime => "datetime",
            FieldType::Decimal => "decimal",
        }
    }

    /// Rank used to pick one type when several were observed or declared.
    ///
    /// The order (string first, then integer, float, boolean, object, list,
    /// identifier, datetime, decimal) is a fixed compatibility tie-break, not a
    /// statement about which type is more specific.
    pub fn precedence(&self) -> u8 {
        match self {
            FieldType::String => 0,
            FieldType::Integer => 1,
            FieldType::Float => 2,
            FieldType::Boolean => 3,
            FieldType::Object => 4,
            FieldType::List => 5,
            FieldType::Identifier => 6,
            FieldType::Datetime => 7,
            FieldType::Decimal => 8,
        }
    }

    /// Picks the winning type of a set by [`FieldType::precedence`].
    pub fn resolve(types: impl IntoIterator<Item = FieldType>) -> Option<FieldType> {
        types.into_iter().min_by_key(FieldType::precedence)
    }

    /// A stand-in example for fields that declare none. Never `null`.
    pub fn synthetic_example(&self) -> Value {
        match self {
            FieldType::String => json!("example"),
            FieldType::Integer => json!(0),
            FieldType::Float => json!(0.0),
            FieldType::Boolean => json!(true),
            FieldType::List => json!([]),
            FieldType::Object => json!({}),
            FieldType::Identifier => json!("000000000000000000000000"),
            FieldType::Decimal => json!("0.00"),
            FieldType::Datetime => json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation rules attached to a field.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Constraints::default()
    }

    /// Describes the first contradiction between bounds, if any.
    pub fn contradiction(&self) -> Option<String> {
        let lower = self.minimum.or(self.exclusive_minimum);
        let upper = self.maximum.or(self.exclusive_maximum);
        match (lower, upper) {
            (Some(lower), Some(upper)) if lower > upper => {
                return Some(format!("lower bound {lower} exceeds upper bound {upper}"));
            }
            _ => {}
        }
        match (self.min_length, self.max_length) {
            (Some(min), Some(max)) if min > max => {
                return Some(format!("min_length {min} exceeds max_length {max}"));
            }
            _ => {}
        }
        match (self.min_items, self.max_items) {
            (Some(min), Some(max)) if min > max => {
                return Some(format!("min_items {min} exceeds max_items {max}"));
            }
            _ => {}
        }

        self.pattern.as_ref().and_then(|pattern| {
            regex::Regex::new(pattern)
                .err()
                .map(|e| format!("invalid pattern {pattern:?}: {e}"))
        })
    }

    fn into_option(self) -> Option<Constraints> {
        (!self.is_empty()).then_some(self)
    }
}

/// Metadata for one field of a report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub nullable: bool,
    pub example: Value,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readonly: Option<bool>,
    /// Runtime type names observed while sampling, sorted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
}

impl FieldSchema {
    /// Creates an entry with a synthetic example and no extras.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            example: field_type.synthetic_example(),
            enum_values: None,
            constraints: None,
            readonly: None,
            types: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Sets the example; `None` and `null` keep the synthetic one.
    pub fn with_example(mut self, example: Option<Value>) -> Self {
        if let Some(example) = example.filter(|value| !value.is_null()) {
            self.example = example;
        }
        self
    }

    /// Sets the allowed values.
    pub fn with_enum(mut self, values: Option<Vec<Value>>) -> Self {
        self.enum_values = values;
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints.into_option();
        self
    }

    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly.then_some(true);
        self
    }

    pub fn with_types(mut self, types: Vec<String>) -> Self {
        self.types = Some(types);
        self
    }

    /// Picks the example: declared, else default, else the first enumeration value,
    /// else synthetic.
    fn with_declared_example(self, example: Option<&Value>, default: Option<&Value>) -> Self {
        let first_enum = self
            .enum_values
            .as_ref()
            .and_then(|values| values.first())
            .cloned();
        let chosen = example
            .filter(|value| !value.is_null())
            .or(default.filter(|value| !value.is_null()))
            .cloned()
            .or(first_enum);

        self.with_example(chosen)
    }
}

/// Which source produced a report.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaSource {
    Contract,
    Registry,
    Sampling,
    #[default]
    None,
}

impl fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchemaSource::Contract => "contract",
            SchemaSource::Registry => "registry",
            SchemaSource::Sampling => "sampling",
            SchemaSource::None => "none",
        })
    }
}

/// The inferred description of a collection's fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SchemaReport {
    /// Fields in declaration (or first-observed) order.
    pub fields: IndexMap<String, FieldSchema>,
    pub sample_count: usize,
    pub source: SchemaSource,
}

impl SchemaReport {
    /// The report of last resort: no fields, [`SchemaSource::None`].
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_fields(source: SchemaSource, fields: impl IntoIterator<Item = FieldSchema>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|field| (field.name.clone(), field))
                .collect(),
            sample_count: 0,
            source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }
}

/// One link of the inference chain.
///
/// `Ok(None)` and an empty report both mean "nothing to offer here" and pass
/// control to the next provider.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    fn source(&self) -> SchemaSource;

    async fn provide(&self) -> Result<Option<SchemaReport>, SchemaSourceError>;
}

struct ContractProvider<'a> {
    model: &'a ContractModel,
}

#[async_trait]
impl SchemaProvider for ContractProvider<'_> {
    fn source(&self) -> SchemaSource {
        SchemaSource::Contract
    }

    async fn provide(&self) -> Result<Option<SchemaReport>, SchemaSourceError> {
        self.model.to_report().map(Some)
    }
}

struct RegistryProvider<'a> {
    registry: &'a SchemaRegistry,
    names: Vec<&'a str>,
}

#[async_trait]
impl SchemaProvider for RegistryProvider<'_> {
    fn source(&self) -> SchemaSource {
        SchemaSource::Registry
    }

    async fn provide(&self) -> Result<Option<SchemaReport>, SchemaSourceError> {
        match self.registry.lookup_any(self.names.iter().copied()) {
            Some((name, schema)) => {
                debug!(schema = name, "registry entry matched");
                self.registry.translate(name, schema).map(Some)
            }
            None => Ok(None),
        }
    }
}

struct SamplingProvider<'a, 'c, B: StoreBackend> {
    collection: &'a Collection<'c, B>,
    size: usize,
    context: &'a CallContext,
}

#[async_trait]
impl<B: StoreBackend> SchemaProvider for SamplingProvider<'_, '_, B> {
    fn source(&self) -> SchemaSource {
        SchemaSource::Sampling
    }

    async fn provide(&self) -> Result<Option<SchemaReport>, SchemaSourceError> {
        let documents = self.collection.sample(self.size, self.context).await?;
        Ok(Some(infer_from_documents(&documents)))
    }
}

/// Optional schema sources for one inference call.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferRequest<'a> {
    pub contract: Option<&'a ContractModel>,
    pub registry: Option<&'a SchemaRegistry>,
    /// Registry entry to try before the collection name.
    pub schema_name: Option<&'a str>,
}

/// Runs the provider chain. Holds no state beyond its settings.
#[derive(Debug, Clone)]
pub struct SchemaInferencer {
    allow_sampling: bool,
    sample_size: usize,
}

impl Default for SchemaInferencer {
    fn default() -> Self {
        Self::new(&BrowseConfig::default())
    }
}

impl SchemaInferencer {
    pub fn new(config: &BrowseConfig) -> Self {
        Self {
            allow_sampling: config.allow_sampling,
            sample_size: config.clamp_sample_size(config.sample_size),
        }
    }

    pub fn with_sampling(mut self, allow: bool) -> Self {
        self.allow_sampling = allow;
        self
    }

    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size.clamp(1, crate::config::MAX_SAMPLE_SIZE);
        self
    }

    /// Produces a report for `collection` from the first source that has one.
    ///
    /// # Errors
    ///
    /// Fails only when the sampling source's store round trip fails (including
    /// timeout and cancellation). Malformed contracts and registry entries are
    /// skipped.
    pub async fn infer<B: StoreBackend>(
        &self,
        collection: &Collection<'_, B>,
        request: InferRequest<'_>,
        context: &CallContext,
    ) -> BrowseResult<SchemaReport> {
        let mut providers: Vec<Box<dyn SchemaProvider + '_>> = Vec::new();

        if let Some(model) = request.contract {
            providers.push(Box::new(ContractProvider { model }));
        }
        if let Some(registry) = request.registry {
            providers.push(Box::new(RegistryProvider {
                registry,
                names: request
                    .schema_name
                    .into_iter()
                    .chain([collection.name()])
                    .collect(),
            }));
        }
        if self.allow_sampling {
            providers.push(Box::new(SamplingProvider {
                collection,
                size: self.sample_size,
                context,
            }));
        }

        for provider in &providers {
            match provider.provide().await {
                Ok(Some(report)) if !report.is_empty() => {
                    debug!(
                        collection = collection.name(),
                        source = %provider.source(),
                        fields = report.fields.len(),
                        "schema inferred"
                    );
                    return Ok(report);
                }
                Ok(_) => debug!(source = %provider.source(), "schema source empty"),
                Err(SchemaSourceError::Store(e)) => return Err(e),
                Err(e @ SchemaSourceError::Malformed { .. }) => {
                    warn!(collection = collection.name(), error = %e, "skipping schema source");
                }
            }
        }

        Ok(SchemaReport::empty())
    }
}
