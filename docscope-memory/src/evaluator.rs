//! Filter evaluation for in-memory documents.
//!
//! Filters are parsed into the core [`Expr`] tree and walked with a
//! [`QueryVisitor`]. Values are ordered the way MongoDB orders them: first by a
//! type bracket (null, numbers, strings, documents, arrays, identifiers,
//! booleans, dates), then by value within the bracket. Range operators only match
//! values in the same bracket as the operand.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document};
use regex::{Regex, RegexBuilder};

use docscope_core::{
    document::get_path,
    error::{BrowseError, BrowseResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Type bracket of a value in the cross-type sort order.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) | Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 12,
        Bson::MaxKey => 255,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        Bson::Decimal128(d) => d.to_string().parse().ok(),
        _ => None,
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

/// Total order over BSON values; a missing value sorts as null.
pub fn compare(left: &Bson, right: &Bson) -> Ordering {
    let rank = type_rank(left).cmp(&type_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }

    match (left, right) {
        (Bson::String(a) | Bson::Symbol(a), Bson::String(b) | Bson::Symbol(b)) => a.cmp(b),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
        (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
        (Bson::DateTime(a), Bson::DateTime(b)) => a.cmp(b),
        (Bson::Timestamp(a), Bson::Timestamp(b)) => {
            (a.time, a.increment).cmp(&(b.time, b.increment))
        }
        (Bson::Document(a), Bson::Document(b)) => compare_pairs(a.iter(), b.iter()),
        (Bson::Array(a), Bson::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| compare(x, y))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Bson::Binary(a), Bson::Binary(b)) => a.bytes.cmp(&b.bytes),
        _ => match (as_i64(left), as_i64(right)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => match (as_f64(left), as_f64(right)) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => Ordering::Equal,
            },
        },
    }
}

fn compare_pairs<'a>(
    left: impl Iterator<Item = (&'a String, &'a Bson)>,
    right: impl Iterator<Item = (&'a String, &'a Bson)>,
) -> Ordering {
    let mut left = left;
    let mut right = right;
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((ka, va)), Some((kb, vb))) => {
                let ordering = compare(va, vb).then_with(|| ka.cmp(kb));
                if ordering.is_ne() {
                    return ordering;
                }
            }
        }
    }
}

fn values_equal(left: &Bson, right: &Bson) -> bool {
    compare(left, right).is_eq()
}

/// Evaluates parsed filters against documents, caching compiled patterns.
#[derive(Debug, Default)]
pub struct DocumentEvaluator {
    patterns: HashMap<(String, String), Regex>,
}

impl DocumentEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `document` satisfies `expr`.
    pub fn matches(&mut self, expr: &Expr, document: &Document) -> BrowseResult<bool> {
        Visit {
            document,
            patterns: &mut self.patterns,
        }
        .visit_expr(expr)
    }

    /// Keeps the documents satisfying `expr`, in their original order.
    pub fn filter<'d>(
        &mut self,
        expr: &Expr,
        documents: impl IntoIterator<Item = &'d Document>,
    ) -> BrowseResult<Vec<&'d Document>> {
        let mut kept = Vec::new();
        for document in documents {
            if self.matches(expr, document)? {
                kept.push(document);
            }
        }
        Ok(kept)
    }
}

struct Visit<'a> {
    document: &'a Document,
    patterns: &'a mut HashMap<(String, String), Regex>,
}

impl Visit<'_> {
    fn pattern(&mut self, pattern: &str, options: &str) -> BrowseResult<&Regex> {
        let key = (pattern.to_owned(), options.to_owned());
        if !self.patterns.contains_key(&key) {
            let compiled = RegexBuilder::new(pattern)
                .case_insensitive(options.contains('i'))
                .multi_line(options.contains('m'))
                .dot_matches_new_line(options.contains('s'))
                .ignore_whitespace(options.contains('x'))
                .build()
                .map_err(|e| BrowseError::InvalidInput(format!("invalid regex {pattern:?}: {e}")))?;
            self.patterns.insert(key.clone(), compiled);
        }

        self.patterns
            .get(&key)
            .ok_or_else(|| BrowseError::Backend("regex cache miss".to_owned()))
    }

    /// Equality with array membership: `tags: "a"` matches `tags: ["a", "b"]`.
    fn equals(stored: Option<&Bson>, operand: &Bson) -> bool {
        match stored {
            None => matches!(operand, Bson::Null),
            Some(Bson::Array(items)) if !matches!(operand, Bson::Array(_)) => {
                items.iter().any(|item| values_equal(item, operand))
            }
            Some(value) => values_equal(value, operand),
        }
    }

    fn in_range(stored: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
        let check = |value: &Bson| {
            type_rank(value) == type_rank(operand) && accept(compare(value, operand))
        };

        match stored {
            None => false,
            Some(Bson::Array(items)) if !matches!(operand, Bson::Array(_)) => {
                items.iter().any(check)
            }
            Some(value) => check(value),
        }
    }

    fn any_of(stored: Option<&Bson>, operand: &Bson) -> bool {
        operand
            .as_array()
            .is_some_and(|values| values.iter().any(|value| Self::equals(stored, value)))
    }
}

impl QueryVisitor for Visit<'_> {
    type Output = bool;
    type Error = BrowseError;

    fn visit_and(&mut self, exprs: &[Expr]) -> BrowseResult<bool> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> BrowseResult<bool> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn visit_nor(&mut self, exprs: &[Expr]) -> BrowseResult<bool> {
        Ok(!self.visit_or(exprs)?)
    }

    fn visit_not(&mut self, expr: &Expr) -> BrowseResult<bool> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> BrowseResult<bool> {
        Ok(get_path(self.document, field).is_some() == should_exist)
    }

    fn visit_regex(&mut self, field: &str, pattern: &str, options: &str) -> BrowseResult<bool> {
        let document = self.document;
        let regex = self.pattern(pattern, options)?;

        Ok(match get_path(document, field) {
            Some(Bson::String(text)) => regex.is_match(text),
            Some(Bson::Array(items)) => items
                .iter()
                .any(|item| item.as_str().is_some_and(|text| regex.is_match(text))),
            _ => false,
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> BrowseResult<bool> {
        let stored = get_path(self.document, field);

        Ok(match op {
            FieldOp::Eq => Self::equals(stored, value),
            FieldOp::Ne => !Self::equals(stored, value),
            FieldOp::Gt => Self::in_range(stored, value, Ordering::is_gt),
            FieldOp::Gte => Self::in_range(stored, value, Ordering::is_ge),
            FieldOp::Lt => Self::in_range(stored, value, Ordering::is_lt),
            FieldOp::Lte => Self::in_range(stored, value, Ordering::is_le),
            FieldOp::In => Self::any_of(stored, value),
            FieldOp::Nin => !Self::any_of(stored, value),
        })
    }
}

#[cfg(test)]
mod tests {
    use bson::{doc, oid::ObjectId};

    use super::*;

    fn check(filter: Document, document: &Document) -> bool {
        let expr = Expr::from_filter(&filter).unwrap();
        DocumentEvaluator::new().matches(&expr, document).unwrap()
    }

    #[test]
    fn numbers_compare_across_widths() {
        assert_eq!(compare(&Bson::Int32(2), &Bson::Int64(2)), Ordering::Equal);
        assert_eq!(compare(&Bson::Int32(2), &Bson::Double(2.5)), Ordering::Less);
        assert!(check(doc! { "n": { "$gt": 1_i64 } }, &doc! { "n": 2 }));
        assert!(check(doc! { "n": 2.0 }, &doc! { "n": 2 }));
    }

    #[test]
    fn ranges_stay_within_a_type_bracket() {
        let document = doc! { "n": "10" };
        assert!(!check(doc! { "n": { "$gt": 1 } }, &document));
        assert!(!check(doc! { "n": { "$lt": 1 } }, &document));
        assert!(!check(doc! { "missing": { "$lt": 1 } }, &document));
    }

    #[test]
    fn cross_type_order_is_total() {
        let id = ObjectId::new();
        let mut values = vec![
            Bson::Boolean(true),
            Bson::ObjectId(id),
            Bson::String("a".into()),
            Bson::Int32(3),
            Bson::Null,
        ];
        values.sort_by(compare);
        assert_eq!(
            values,
            vec![
                Bson::Null,
                Bson::Int32(3),
                Bson::String("a".into()),
                Bson::ObjectId(id),
                Bson::Boolean(true),
            ]
        );
    }

    #[test]
    fn identifiers_order_by_bytes() {
        let first = ObjectId::from_bytes([0; 12]);
        let second = ObjectId::from_bytes([1; 12]);
        assert!(check(doc! { "_id": { "$gt": first } }, &doc! { "_id": second }));
        assert!(!check(doc! { "_id": { "$gt": second } }, &doc! { "_id": first }));
    }

    #[test]
    fn equality_matches_array_members_and_missing_as_null() {
        let document = doc! { "tags": ["red", "blue"], "nested": { "city": "Oslo" } };
        assert!(check(doc! { "tags": "blue" }, &document));
        assert!(check(doc! { "nested.city": "Oslo" }, &document));
        assert!(check(doc! { "absent": Bson::Null }, &document));
        assert!(check(doc! { "absent": { "$ne": 1 } }, &document));
        assert!(check(doc! { "tags": { "$in": ["green", "red"] } }, &document));
        assert!(check(doc! { "tags": { "$nin": ["green"] } }, &document));
    }

    #[test]
    fn regex_honours_case_insensitive_option() {
        let document = doc! { "name": "Alice" };
        assert!(check(doc! { "name": { "$regex": "^ali", "$options": "i" } }, &document));
        assert!(!check(doc! { "name": { "$regex": "^ali" } }, &document));
    }

    #[test]
    fn logical_operators_compose() {
        let document = doc! { "a": 1, "b": 2 };
        assert!(check(doc! { "$or": [ { "a": 5 }, { "b": 2 } ] }, &document));
        assert!(check(doc! { "$nor": [ { "a": 5 }, { "b": 5 } ] }, &document));
        assert!(check(doc! { "a": { "$not": { "$gt": 3 } } }, &document));
        assert!(check(doc! { "c": { "$exists": false } }, &document));
        assert!(check(doc! {}, &document));
    }

    #[test]
    fn invalid_patterns_are_input_errors() {
        let expr = Expr::from_filter(&doc! { "name": { "$regex": "([" } }).unwrap();
        let err = DocumentEvaluator::new()
            .matches(&expr, &doc! { "name": "x" })
            .unwrap_err();
        assert!(err.is_input_error());
    }
}
