// Query matcher - typed predicates evaluated against a single document

mod parser;

pub use parser::{equality_query, parse_query, parse_query_map};

use crate::document::{as_number, render, Document};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

/// A validated query: a conjunction of per-field conditions.
/// Build one with [`parse_query`] or [`equality_query`].
#[derive(Debug, Clone, Default)]
pub struct Query {
    conditions: Vec<FieldCondition>,
}

/// The condition applied to one field of a document.
#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub condition: Condition,
}

#[derive(Debug, Clone)]
pub enum Condition {
    /// Plain literal: equal when both sides render to the same text
    Equals(Value),
    /// Operator object, every operator must hold
    Operators(Vec<Operator>),
}

/// A single comparison operator with its already-validated operand.
#[derive(Debug, Clone)]
pub enum Operator {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
}

impl Query {
    /// The empty query, which matches every document.
    pub fn all() -> Self {
        Query::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[FieldCondition] {
        &self.conditions
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

impl FieldCondition {
    pub fn matches(&self, doc: &Document) -> bool {
        match (&self.condition, doc.get(&self.field)) {
            (Condition::Equals(expected), Some(actual)) => render(actual) == render(expected),
            (Condition::Equals(_), None) => false,
            (Condition::Operators(ops), Some(actual)) => ops.iter().all(|op| op.matches(actual)),
            // Only `$exists: false` can hold for a missing field
            (Condition::Operators(ops), None) => {
                !ops.is_empty() && ops.iter().all(Operator::matches_absent)
            }
        }
    }
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq(_) => "$eq",
            Operator::Ne(_) => "$ne",
            Operator::Gt(_) => "$gt",
            Operator::Gte(_) => "$gte",
            Operator::Lt(_) => "$lt",
            Operator::Lte(_) => "$lte",
            Operator::In(_) => "$in",
            Operator::Nin(_) => "$nin",
            Operator::Exists(_) => "$exists",
            Operator::Regex(_) => "$regex",
        }
    }

    /// Evaluate against a field value that is present in the document.
    pub fn matches(&self, actual: &Value) -> bool {
        match self {
            Operator::Eq(expected) => render(actual) == render(expected),
            Operator::Ne(expected) => render(actual) != render(expected),
            Operator::Gt(bound) => compare(actual, bound).map_or(false, Ordering::is_gt),
            Operator::Gte(bound) => compare(actual, bound).map_or(false, Ordering::is_ge),
            Operator::Lt(bound) => compare(actual, bound).map_or(false, Ordering::is_lt),
            Operator::Lte(bound) => compare(actual, bound).map_or(false, Ordering::is_le),
            Operator::In(values) => contains_rendered(values, actual),
            Operator::Nin(values) => !contains_rendered(values, actual),
            Operator::Exists(expected) => *expected,
            Operator::Regex(re) => re.is_match(&render(actual)),
        }
    }

    fn matches_absent(&self) -> bool {
        matches!(self, Operator::Exists(false))
    }
}

/// Numeric ordering when both sides parse as numbers, text ordering otherwise.
/// `None` only for incomparable numbers (NaN).
fn compare(actual: &Value, operand: &Value) -> Option<Ordering> {
    match (as_number(actual), as_number(operand)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(render(actual).cmp(&render(operand))),
    }
}

fn contains_rendered(values: &[Value], actual: &Value) -> bool {
    let needle = render(actual);
    values.iter().any(|v| render(v) == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn q(value: Value) -> Query {
        parse_query(&value).unwrap()
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(Query::all().matches(&doc(json!({}))));
        assert!(q(json!({})).matches(&doc(json!({ "a": 1 }))));
    }

    #[test]
    fn test_literal_equality_is_type_insensitive() {
        let query = q(json!({ "age": "5" }));
        assert!(query.matches(&doc(json!({ "age": 5 }))));
        assert!(query.matches(&doc(json!({ "age": "5" }))));
        assert!(!query.matches(&doc(json!({ "age": 6 }))));
        assert!(!query.matches(&doc(json!({ "name": "x" }))));
    }

    #[test]
    fn test_fields_are_conjunctive() {
        let query = q(json!({ "role": "admin", "active": true }));
        assert!(query.matches(&doc(json!({ "role": "admin", "active": true }))));
        assert!(!query.matches(&doc(json!({ "role": "admin", "active": false }))));
    }

    #[test]
    fn test_eq_and_ne_are_conventional() {
        let eq = q(json!({ "name": { "$eq": "Alice" } }));
        let ne = q(json!({ "name": { "$ne": "Alice" } }));
        let alice = doc(json!({ "name": "Alice" }));
        let bob = doc(json!({ "name": "Bob" }));

        assert!(eq.matches(&alice));
        assert!(!eq.matches(&bob));
        assert!(!ne.matches(&alice));
        assert!(ne.matches(&bob));
    }

    #[test]
    fn test_numeric_range() {
        let query = q(json!({ "age": { "$gte": 18, "$lte": 65 } }));
        assert!(query.matches(&doc(json!({ "age": 18 }))));
        assert!(query.matches(&doc(json!({ "age": 40.5 }))));
        assert!(query.matches(&doc(json!({ "age": "65" }))));
        assert!(!query.matches(&doc(json!({ "age": 17 }))));
        assert!(!query.matches(&doc(json!({ "age": 66 }))));
        assert!(!query.matches(&doc(json!({ "name": "no age" }))));
    }

    #[test]
    fn test_numeric_comparison_is_not_lexicographic() {
        let query = q(json!({ "count": { "$gt": 9 } }));
        assert!(query.matches(&doc(json!({ "count": 10 }))));
    }

    #[test]
    fn test_text_comparison_fallback() {
        let query = q(json!({ "name": { "$gt": "m" } }));
        assert!(query.matches(&doc(json!({ "name": "zoe" }))));
        assert!(!query.matches(&doc(json!({ "name": "adam" }))));

        let query = q(json!({ "name": { "$lte": "bob" } }));
        assert!(query.matches(&doc(json!({ "name": "bob" }))));
    }

    #[test]
    fn test_in_and_nin() {
        let query = q(json!({ "status": { "$in": ["draft", "published"] } }));
        assert!(query.matches(&doc(json!({ "status": "draft" }))));
        assert!(!query.matches(&doc(json!({ "status": "archived" }))));

        let query = q(json!({ "code": { "$nin": [1, 2] } }));
        assert!(query.matches(&doc(json!({ "code": 3 }))));
        assert!(!query.matches(&doc(json!({ "code": "2" }))));
        assert!(!query.matches(&doc(json!({}))));
    }

    #[test]
    fn test_exists() {
        let present = q(json!({ "email": { "$exists": true } }));
        let absent = q(json!({ "email": { "$exists": false } }));
        let with_email = doc(json!({ "email": "a@b.c" }));
        let without = doc(json!({ "name": "x" }));

        assert!(present.matches(&with_email));
        assert!(!present.matches(&without));
        assert!(!absent.matches(&with_email));
        assert!(absent.matches(&without));
    }

    #[test]
    fn test_absent_field_fails_other_operators() {
        let query = q(json!({ "age": { "$exists": false, "$gt": 1 } }));
        assert!(!query.matches(&doc(json!({}))));

        let query = q(json!({ "age": { "$ne": 1 } }));
        assert!(!query.matches(&doc(json!({}))));
    }

    #[test]
    fn test_regex_matches_substring() {
        let query = q(json!({ "email": { "$regex": "@example\\.com" } }));
        assert!(query.matches(&doc(json!({ "email": "alice@example.com" }))));
        assert!(!query.matches(&doc(json!({ "email": "alice@test.com" }))));

        let query = q(json!({ "zip": { "$regex": "^0\\d+" } }));
        assert!(!query.matches(&doc(json!({ "zip": 12345 }))));
    }

    #[test]
    fn test_nested_mapping_literal() {
        let query = q(json!({ "address": { "city": "Oslo" } }));
        assert!(query.matches(&doc(json!({ "address": { "city": "Oslo" } }))));
        assert!(!query.matches(&doc(json!({ "address": { "city": "Bergen" } }))));
    }

    #[test]
    fn test_equality_query_from_params() {
        let query = equality_query([("role", "admin"), ("age", "30")]);
        assert!(query.matches(&doc(json!({ "role": "admin", "age": 30 }))));
        assert!(!query.matches(&doc(json!({ "role": "admin" }))));
    }
}
