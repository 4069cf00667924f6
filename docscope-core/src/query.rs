//! Filter documents, find specifications and the typed filter expression tree.
//!
//! Filters travel through the core as `bson::Document` trees in the MongoDB
//! dialect, which is what callers send and what the pagination engine extends with
//! its tie-break predicates. Backends that cannot hand such a document to a native
//! query engine translate it into an [`Expr`] tree with [`Expr::from_filter`] and
//! evaluate it through a [`QueryVisitor`].
//!
//! # Building a find
//!
//! ```ignore
//! use docscope::query::{FindSpec, Filter, SortDirection};
//!
//! let spec = FindSpec::builder()
//!     .filter(Filter::gt("age", 18))
//!     .sort("created_at", SortDirection::Desc)
//!     .skip(20)
//!     .limit(10)
//!     .build();
//! ```

use std::{fmt, str::FromStr};

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::error::{BrowseError, BrowseResult};

/// Operators that execute server-side code and are never accepted from callers.
pub const FORBIDDEN_OPERATORS: [&str; 4] = ["$where", "$eval", "$function", "$js"];

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    #[default]
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The MongoDB sort specifier (`1` or `-1`).
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }

    /// The strict comparison operator that moves past a position in this direction.
    pub fn beyond_operator(&self) -> &'static str {
        match self {
            SortDirection::Asc => "$gt",
            SortDirection::Desc => "$lt",
        }
    }
}

impl FromStr for SortDirection {
    type Err = BrowseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "asc" | "1" => Ok(SortDirection::Asc),
            "desc" | "-1" => Ok(SortDirection::Desc),
            other => Err(BrowseError::InvalidInput(format!(
                "sort order must be 'asc' or 'desc', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("asc"),
            SortDirection::Desc => f.write_str("desc"),
        }
    }
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Everything a backend needs to run one `find`.
///
/// `sort` is ordered by significance; the pagination engine always appends the
/// identifier as the final key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    /// Filter document in the MongoDB dialect. An empty document matches everything.
    pub filter: Document,
    /// Sort keys, most significant first.
    pub sort: Vec<Sort>,
    /// Number of documents to skip.
    pub skip: usize,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Field names to keep. `None` returns whole documents.
    pub projection: Option<Vec<String>>,
}

impl FindSpec {
    /// Creates a spec that matches every document in store order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new builder for fluent construction.
    pub fn builder() -> FindSpecBuilder {
        FindSpecBuilder::new()
    }

    /// The sort keys as a MongoDB sort document.
    pub fn sort_document(&self) -> Document {
        self.sort
            .iter()
            .map(|sort| (sort.field.clone(), Bson::Int32(sort.direction.as_i32())))
            .collect()
    }

    /// The projection as a MongoDB projection document, if any.
    pub fn projection_document(&self) -> Option<Document> {
        self.projection.as_ref().map(|fields| {
            fields
                .iter()
                .map(|field| (field.clone(), Bson::Int32(1)))
                .collect()
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindSpecBuilder {
    spec: FindSpec,
}

impl FindSpecBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        FindSpecBuilder {
            spec: FindSpec::default(),
        }
    }

    /// Sets the filter document.
    pub fn filter(mut self, filter: Document) -> Self {
        self.spec.filter = filter;
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.spec.sort.push(Sort::new(field, direction));
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.spec.skip = skip;
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    /// Restricts the returned fields.
    pub fn projection(mut self, fields: Vec<String>) -> Self {
        self.spec.projection = Some(fields);
        self
    }

    /// Builds and returns the final spec.
    pub fn build(self) -> FindSpec {
        self.spec
    }
}

/// Helper for building MongoDB-dialect filter documents.
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        Self::op(field, "$eq", value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        Self::op(field, "$ne", value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        Self::op(field, "$gt", value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        Self::op(field, "$gte", value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        Self::op(field, "$lt", value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Document {
        Self::op(field, "$lte", value)
    }

    /// Matches documents whose field equals any of `values`.
    pub fn any_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Document {
        Self::op(field, "$in", Bson::Array(values.into_iter().map(Into::into).collect()))
    }

    /// Matches documents whose field equals none of `values`.
    pub fn none_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Document {
        Self::op(field, "$nin", Bson::Array(values.into_iter().map(Into::into).collect()))
    }

    /// Case-insensitive regular expression match.
    pub fn matches(field: impl Into<String>, pattern: impl Into<String>) -> Document {
        let mut document = Document::new();
        document.insert(
            field.into(),
            doc! { "$regex": pattern.into(), "$options": "i" },
        );
        document
    }

    /// Strict "beyond" comparison in the given direction.
    pub fn beyond(field: impl Into<String>, direction: SortDirection, value: impl Into<Bson>) -> Document {
        Self::op(field, direction.beyond_operator(), value)
    }

    /// Conjunction of filters, flattening away empty members.
    pub fn and(filters: impl IntoIterator<Item = Document>) -> Document {
        let mut members = filters
            .into_iter()
            .filter(|filter| !filter.is_empty())
            .collect::<Vec<_>>();

        match members.len() {
            0 => Document::new(),
            1 => members.remove(0),
            _ => doc! { "$and": members },
        }
    }

    /// Disjunction of filters.
    pub fn or(filters: impl IntoIterator<Item = Document>) -> Document {
        doc! { "$or": filters.into_iter().collect::<Vec<_>>() }
    }

    fn op(field: impl Into<String>, op: &str, value: impl Into<Bson>) -> Document {
        let mut predicate = Document::new();
        predicate.insert(op, value.into());

        let mut document = Document::new();
        document.insert(field.into(), predicate);
        document
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match, or array membership for array fields).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Field equals any value of the array operand.
    In,
    /// Field equals none of the values of the array operand.
    Nin,
}

impl FieldOp {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" => FieldOp::In,
            "$nin" => FieldOp::Nin,
            _ => return None,
        })
    }
}

/// A typed filter expression parsed from a filter document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match). Empty matches everything.
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOR of multiple expressions (none may match).
    Nor(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Regular expression match on a string field.
    Regex {
        field: String,
        pattern: String,
        options: String,
    },
    /// Field comparison expression.
    Field {
        /// The field name (dotted paths address nested documents).
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: impl Into<String>, op: FieldOp, value: Bson) -> Self {
        Expr::Field {
            field: field.into(),
            op,
            value,
        }
    }

    /// Parses a MongoDB-dialect filter document.
    ///
    /// # Errors
    ///
    /// Returns [`BrowseError::InvalidInput`] for unknown or forbidden operators and
    /// for operator operands of the wrong shape.
    pub fn from_filter(filter: &Document) -> BrowseResult<Expr> {
        let mut exprs = Vec::with_capacity(filter.len());

        for (key, value) in filter {
            exprs.push(match key.as_str() {
                "$and" => Expr::And(Self::parse_members(key, value)?),
                "$or" => Expr::Or(Self::parse_members(key, value)?),
                "$nor" => Expr::Nor(Self::parse_members(key, value)?),
                op if op.starts_with('$') => {
                    return Err(BrowseError::InvalidInput(format!(
                        "unsupported top-level operator '{op}'"
                    )));
                }
                field => Self::parse_predicate(field, value)?,
            });
        }

        Ok(match exprs.len() {
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        })
    }

    fn parse_members(op: &str, value: &Bson) -> BrowseResult<Vec<Expr>> {
        let members = value
            .as_array()
            .ok_or_else(|| BrowseError::InvalidInput(format!("'{op}' expects an array")))?;

        members
            .iter()
            .map(|member| match member {
                Bson::Document(document) => Self::from_filter(document),
                _ => Err(BrowseError::InvalidInput(format!(
                    "'{op}' members must be documents"
                ))),
            })
            .collect()
    }

    fn parse_predicate(field: &str, value: &Bson) -> BrowseResult<Expr> {
        let operators = match value {
            Bson::Document(document) if Self::is_operator_document(document) => document,
            _ => return Ok(Expr::field(field, FieldOp::Eq, value.clone())),
        };

        let mut exprs = Vec::with_capacity(operators.len());

        for (op, operand) in operators {
            exprs.push(match op.as_str() {
                "$exists" => Expr::Exists(field.to_string(), Self::truthy(operand)),
                "$not" => match operand {
                    Bson::Document(inner) => Expr::Not(Box::new(Self::parse_predicate(
                        field,
                        &Bson::Document(inner.clone()),
                    )?)),
                    _ => {
                        return Err(BrowseError::InvalidInput(
                            "'$not' expects an operator document".to_string(),
                        ));
                    }
                },
                "$regex" => Expr::Regex {
                    field: field.to_string(),
                    pattern: operand
                        .as_str()
                        .ok_or_else(|| {
                            BrowseError::InvalidInput("'$regex' expects a string".to_string())
                        })?
                        .to_string(),
                    options: operators
                        .get("$options")
                        .and_then(Bson::as_str)
                        .unwrap_or_default()
                        .to_string(),
                },
                "$options" => continue,
                "$in" | "$nin" if operand.as_array().is_none() => {
                    return Err(BrowseError::InvalidInput(format!("'{op}' expects an array")));
                }
                other => match FieldOp::parse(other) {
                    Some(field_op) => Expr::field(field, field_op, operand.clone()),
                    None => {
                        return Err(BrowseError::InvalidInput(format!(
                            "unsupported operator '{other}' on field '{field}'"
                        )));
                    }
                },
            });
        }

        Ok(match exprs.len() {
            1 => exprs.remove(0),
            _ => Expr::And(exprs),
        })
    }

    fn is_operator_document(document: &Document) -> bool {
        document
            .keys()
            .next()
            .is_some_and(|key| key.starts_with('$'))
    }

    fn truthy(value: &Bson) -> bool {
        match value {
            Bson::Boolean(flag) => *flag,
            Bson::Int32(n) => *n != 0,
            Bson::Int64(n) => *n != 0,
            Bson::Double(n) => *n != 0.0,
            Bson::Null => false,
            _ => true,
        }
    }
}

/// Rejects filters that contain server-side code operators anywhere in the tree.
pub fn reject_server_side_code(filter: &Document) -> BrowseResult<()> {
    for (key, value) in filter {
        if let Some(op) = forbidden_operator(key) {
            return Err(forbidden(op));
        }
        reject_in_value(value)?;
    }

    Ok(())
}

/// Rejects raw query text mentioning a server-side code operator.
pub fn reject_server_side_code_text(query: &str) -> BrowseResult<()> {
    let lowered = query.to_ascii_lowercase();

    match FORBIDDEN_OPERATORS.iter().find(|op| lowered.contains(*op)) {
        Some(op) => Err(forbidden(op)),
        None => Ok(()),
    }
}

fn reject_in_value(value: &Bson) -> BrowseResult<()> {
    match value {
        Bson::Document(document) => reject_server_side_code(document),
        Bson::Array(items) => items.iter().try_for_each(reject_in_value),
        _ => Ok(()),
    }
}

fn forbidden_operator(key: &str) -> Option<&'static str> {
    FORBIDDEN_OPERATORS
        .iter()
        .find(|op| key.eq_ignore_ascii_case(op))
        .copied()
}

fn forbidden(op: &str) -> BrowseError {
    BrowseError::InvalidInput(format!(
        "operator {op} is not allowed for security reasons"
    ))
}

/// Visitor over [`Expr`] trees, implemented by backends that evaluate filters themselves.
pub trait QueryVisitor {
    type Output;
    type Error: Into<BrowseError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_nor(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_regex(
        &mut self,
        field: &str,
        pattern: &str,
        options: &str,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Nor(exprs) => self.visit_nor(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Regex {
                field,
                pattern,
                options,
            } => self.visit_regex(field, pattern, options),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
