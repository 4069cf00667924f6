//! Contract models: caller-declared field descriptions.
//!
//! A [`ContractModel`] is built once, either by hand through
//! [`ContractModel::builder`] or by `#[derive(Contract)]`, and describes each
//! field with a [`DeclaredType`] plus validation rules. Translating it into a
//! [`SchemaReport`] is a pure table lookup; nothing is discovered at call time.

use serde_json::Value;

use super::{Constraints, FieldSchema, FieldType, SchemaReport, SchemaSource};
use crate::error::SchemaSourceError;

/// Types implementing this describe their own contract model.
///
/// Usually derived:
///
/// ```ignore
/// use docscope::Contract;
///
/// #[derive(Contract)]
/// #[contract(name = "Product")]
/// struct Product {
///     #[contract(min_length = 1)]
///     name: String,
///     #[contract(exclusive_min = 0.0)]
///     price: f64,
///     description: Option<String>,
/// }
/// ```
pub trait Contract {
    fn contract() -> ContractModel;
}

/// Enumerations usable as contract field types.
pub trait ContractEnum {
    /// The serialized values, in declaration order.
    fn variants() -> Vec<Value>;
}

/// A field type as declared by the contract, before mapping to [`FieldType`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    Text,
    WholeNumber,
    RealNumber,
    Flag,
    Sequence(Box<DeclaredType>),
    /// A nested record, optionally naming its model.
    Record(Option<String>),
    Timestamp,
    ExactDecimal,
    Identifier,
    /// Values of an enumeration type.
    Enumeration(Vec<Value>),
    /// An inline set of literal values.
    Literal(Vec<Value>),
    Optional(Box<DeclaredType>),
    Union(Vec<DeclaredType>),
    /// The absent type; only meaningful inside a union.
    Absent,
    Any,
}

#[derive(Debug, Clone, PartialEq)]
struct Resolution {
    field_type: FieldType,
    nullable: bool,
    enum_values: Option<Vec<Value>>,
}

impl Resolution {
    fn plain(field_type: FieldType) -> Self {
        Self {
            field_type,
            nullable: false,
            enum_values: None,
        }
    }
}

impl DeclaredType {
    pub fn optional(inner: DeclaredType) -> Self {
        DeclaredType::Optional(Box::new(inner))
    }

    pub fn sequence(inner: DeclaredType) -> Self {
        DeclaredType::Sequence(Box::new(inner))
    }

    /// The primitive type this declaration maps to, or why it cannot be mapped.
    pub fn field_type(&self) -> Result<FieldType, String> {
        self.resolve().map(|resolution| resolution.field_type)
    }

    /// Whether the declaration admits an absent value.
    pub fn is_nullable(&self) -> bool {
        self.resolve().is_ok_and(|resolution| resolution.nullable)
    }

    fn resolve(&self) -> Result<Resolution, String> {
        Ok(match self {
            DeclaredType::Text => Resolution::plain(FieldType::String),
            DeclaredType::WholeNumber => Resolution::plain(FieldType::Integer),
            DeclaredType::RealNumber => Resolution::plain(FieldType::Float),
            DeclaredType::Flag => Resolution::plain(FieldType::Boolean),
            DeclaredType::Sequence(_) => Resolution::plain(FieldType::List),
            DeclaredType::Record(_) => Resolution::plain(FieldType::Object),
            DeclaredType::Timestamp => Resolution::plain(FieldType::Datetime),
            DeclaredType::ExactDecimal => Resolution::plain(FieldType::Decimal),
            DeclaredType::Identifier => Resolution::plain(FieldType::Identifier),
            DeclaredType::Enumeration(values) | DeclaredType::Literal(values) => {
                let concrete = values
                    .iter()
                    .filter(|value| !value.is_null())
                    .cloned()
                    .collect::<Vec<_>>();
                if concrete.is_empty() {
                    return Err("enumeration declares no values".into());
                }

                Resolution {
                    field_type: enumeration_type(&concrete),
                    nullable: concrete.len() != values.len(),
                    enum_values: Some(concrete),
                }
            }
            DeclaredType::Optional(inner) => Resolution {
                nullable: true,
                ..inner.resolve()?
            },
            DeclaredType::Union(members) => {
                let absent = members
                    .iter()
                    .any(|member| matches!(member, DeclaredType::Absent));
                let mut resolved = members
                    .iter()
                    .filter(|member| !matches!(member, DeclaredType::Absent))
                    .map(DeclaredType::resolve)
                    .collect::<Result<Vec<_>, _>>()?;

                match resolved.len() {
                    0 => return Err("union has no concrete member".into()),
                    1 => {
                        let mut only = resolved.remove(0);
                        only.nullable |= absent;
                        only
                    }
                    _ => {
                        let nullable = absent || resolved.iter().any(|r| r.nullable);
                        let field_type =
                            FieldType::resolve(resolved.iter().map(|r| r.field_type))
                                .unwrap_or(FieldType::String);
                        Resolution {
                            field_type,
                            nullable,
                            enum_values: None,
                        }
                    }
                }
            }
            DeclaredType::Absent | DeclaredType::Any => Resolution {
                field_type: FieldType::String,
                nullable: true,
                enum_values: None,
            },
        })
    }
}

fn enumeration_type(values: &[Value]) -> FieldType {
    if values.iter().all(Value::is_string) {
        FieldType::String
    } else if values.iter().all(Value::is_boolean) {
        FieldType::Boolean
    } else if values.iter().all(|value| value.is_i64() || value.is_u64()) {
        FieldType::Integer
    } else if values.iter().all(Value::is_number) {
        FieldType::Float
    } else {
        FieldType::String
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractField {
    pub name: String,
    pub declared: DeclaredType,
    pub constraints: Constraints,
    pub readonly: bool,
    pub example: Option<Value>,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl ContractField {
    pub fn new(name: impl Into<String>, declared: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared,
            constraints: Constraints::default(),
            readonly: false,
            example: None,
            default: None,
            description: None,
        }
    }

    pub fn min(mut self, minimum: f64) -> Self {
        self.constraints.minimum = Some(minimum);
        self
    }

    pub fn max(mut self, maximum: f64) -> Self {
        self.constraints.maximum = Some(maximum);
        self
    }

    pub fn exclusive_min(mut self, minimum: f64) -> Self {
        self.constraints.exclusive_minimum = Some(minimum);
        self
    }

    pub fn exclusive_max(mut self, maximum: f64) -> Self {
        self.constraints.exclusive_maximum = Some(maximum);
        self
    }

    pub fn min_length(mut self, length: u64) -> Self {
        self.constraints.min_length = Some(length);
        self
    }

    pub fn max_length(mut self, length: u64) -> Self {
        self.constraints.max_length = Some(length);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.constraints.pattern = Some(pattern.into());
        self
    }

    pub fn min_items(mut self, count: u64) -> Self {
        self.constraints.min_items = Some(count);
        self
    }

    pub fn max_items(mut self, count: u64) -> Self {
        self.constraints.max_items = Some(count);
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn example(mut self, example: impl Into<Value>) -> Self {
        self.example = Some(example.into());
        self
    }

    pub fn default_value(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Restricts the field to a literal value set, keeping optionality.
    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.declared = match self.declared {
            DeclaredType::Optional(_) => DeclaredType::optional(DeclaredType::Literal(values)),
            _ => DeclaredType::Literal(values),
        };
        self
    }

    fn to_schema(&self) -> Result<FieldSchema, String> {
        if self.name.is_empty() {
            return Err("field with an empty name".into());
        }
        if let Some(reason) = self.constraints.contradiction() {
            return Err(format!("field {}: {reason}", self.name));
        }
        let resolution = self
            .declared
            .resolve()
            .map_err(|reason| format!("field {}: {reason}", self.name))?;

        Ok(FieldSchema::new(self.name.clone(), resolution.field_type)
            .nullable(resolution.nullable)
            .with_enum(resolution.enum_values)
            .with_constraints(self.constraints.clone())
            .with_readonly(self.readonly)
            .with_declared_example(self.example.as_ref(), self.default.as_ref()))
    }
}

/// A caller-declared description of a collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContractModel {
    pub name: String,
    pub fields: Vec<ContractField>,
}

impl ContractModel {
    pub fn builder(name: impl Into<String>) -> ContractModelBuilder {
        ContractModelBuilder::new(name)
    }

    /// The model of a [`Contract`] type.
    pub fn of<T: Contract>() -> Self {
        T::contract()
    }

    pub fn field(&self, name: &str) -> Option<&ContractField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Translates every declared field.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaSourceError::Malformed`] for duplicate or empty field names,
    /// empty enumerations, unions without a concrete member, contradictory bounds
    /// and patterns that do not compile.
    pub fn to_report(&self) -> Result<SchemaReport, SchemaSourceError> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if fields
                .iter()
                .any(|existing: &FieldSchema| existing.name == field.name)
            {
                return Err(SchemaSourceError::malformed(
                    SchemaSource::Contract,
                    format!("{}: duplicate field {}", self.name, field.name),
                ));
            }

            let schema = field.to_schema().map_err(|reason| {
                SchemaSourceError::malformed(SchemaSource::Contract, format!("{}: {reason}", self.name))
            })?;
            fields.push(schema);
        }

        Ok(SchemaReport::from_fields(SchemaSource::Contract, fields))
    }
}

pub struct ContractModelBuilder {
    name: String,
    fields: Vec<ContractField>,
}

impl ContractModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: ContractField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> ContractModel {
        ContractModel {
            name: self.name,
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn product() -> ContractModel {
        ContractModel::builder("Product")
            .field(ContractField::new("name", DeclaredType::Text).min_length(1).max_length(80))
            .field(ContractField::new("price", DeclaredType::RealNumber).exclusive_min(0.0))
            .field(ContractField::new(
                "description",
                DeclaredType::optional(DeclaredType::Text),
            ))
            .field(ContractField::new("in_stock", DeclaredType::Flag).default_value(true))
            .field(ContractField::new(
                "tags",
                DeclaredType::sequence(DeclaredType::Text),
            ))
            .field(ContractField::new("sku", DeclaredType::Identifier).readonly())
            .build()
    }

    #[test]
    fn maps_declared_types_to_the_vocabulary() {
        let report = product().to_report().unwrap();

        assert_eq!(report.source, SchemaSource::Contract);
        assert_eq!(
            report.fields.keys().collect::<Vec<_>>(),
            ["name", "price", "description", "in_stock", "tags", "sku"]
        );
        assert_eq!(report.fields["name"].field_type, FieldType::String);
        assert_eq!(report.fields["price"].field_type, FieldType::Float);
        assert_eq!(report.fields["tags"].field_type, FieldType::List);
        assert_eq!(report.fields["sku"].field_type, FieldType::Identifier);
        assert_eq!(report.fields["sku"].readonly, Some(true));
    }

    #[test]
    fn optional_text_is_nullable_string() {
        let report = product().to_report().unwrap();
        let description = &report.fields["description"];

        assert_eq!(description.field_type, FieldType::String);
        assert!(description.nullable);
        assert!(!report.fields["name"].nullable);
    }

    #[test]
    fn examples_prefer_declared_then_default_then_synthetic() {
        let report = product().to_report().unwrap();

        assert_eq!(report.fields["in_stock"].example, json!(true));
        assert_eq!(report.fields["name"].example, json!("example"));
        assert_eq!(report.fields["price"].example, json!(0.0));
        assert_eq!(
            report.fields["price"].constraints.as_ref().unwrap().exclusive_minimum,
            Some(0.0)
        );
    }

    #[test]
    fn enumerations_carry_their_values() {
        let model = ContractModel::builder("Ticket")
            .field(ContractField::new(
                "status",
                DeclaredType::Enumeration(vec![json!("open"), json!("closed")]),
            ))
            .field(ContractField::new("priority", DeclaredType::WholeNumber).one_of(vec![json!(1), json!(2)]))
            .field(
                ContractField::new("kind", DeclaredType::optional(DeclaredType::Text))
                    .one_of(vec![json!("bug")]),
            )
            .build();
        let report = model.to_report().unwrap();

        let status = &report.fields["status"];
        assert_eq!(status.field_type, FieldType::String);
        assert_eq!(status.enum_values, Some(vec![json!("open"), json!("closed")]));
        assert_eq!(status.example, json!("open"));

        assert_eq!(report.fields["priority"].field_type, FieldType::Integer);
        assert!(report.fields["kind"].nullable);
    }

    #[test]
    fn unions_resolve_by_precedence_and_absent_members() {
        let either = DeclaredType::Union(vec![DeclaredType::WholeNumber, DeclaredType::Text]);
        assert_eq!(either.field_type(), Ok(FieldType::String));
        assert!(!either.is_nullable());

        let maybe = DeclaredType::Union(vec![DeclaredType::Timestamp, DeclaredType::Absent]);
        assert_eq!(maybe.field_type(), Ok(FieldType::Datetime));
        assert!(maybe.is_nullable());

        assert!(DeclaredType::Union(vec![DeclaredType::Absent]).field_type().is_err());
    }

    #[test]
    fn malformed_models_are_rejected() {
        let duplicate = ContractModel::builder("Dup")
            .field(ContractField::new("a", DeclaredType::Text))
            .field(ContractField::new("a", DeclaredType::Flag))
            .build();
        assert!(matches!(
            duplicate.to_report(),
            Err(SchemaSourceError::Malformed { origin: SchemaSource::Contract, .. })
        ));

        let inverted = ContractModel::builder("Bounds")
            .field(ContractField::new("n", DeclaredType::WholeNumber).min(10.0).max(1.0))
            .build();
        assert!(inverted.to_report().is_err());

        let empty_enum = ContractModel::builder("Enum")
            .field(ContractField::new("e", DeclaredType::Enumeration(vec![])))
            .build();
        assert!(empty_enum.to_report().is_err());
    }
}
