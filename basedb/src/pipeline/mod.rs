// Result pipeline - filter a snapshot, then sort and paginate

pub mod time;

use crate::document::{render, Document};
use crate::query::Query;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Request parameters that control the pipeline rather than filter documents.
pub const CONTROL_PARAMS: &[&str] = &["command", "sort", "order", "limit", "skip"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// `desc` sorts descending; anything else, including no value, ascending.
    pub fn parse(order: Option<&str>) -> Self {
        match order {
            Some("desc") => SortOrder::Descending,
            _ => SortOrder::Ascending,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

/// Sorting and pagination applied after filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<SortSpec>,
    pub skip: usize,
    /// `None` returns everything after `skip`
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Read `sort`, `order`, `skip` and `limit` from request parameters.
    /// Unparsable or negative `skip` is 0; unparsable or non-positive `limit` is unlimited.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let sort = params
            .get("sort")
            .filter(|field| !field.is_empty())
            .map(|field| SortSpec {
                field: field.clone(),
                order: SortOrder::parse(params.get("order").map(String::as_str)),
            });

        let skip = params
            .get("skip")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map_or(0, |n| n.max(0) as usize);

        let limit = params
            .get("limit")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|n| *n > 0)
            .map(|n| n as usize);

        FindOptions { sort, skip, limit }
    }

    pub fn sorted_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(SortSpec {
            field: field.into(),
            order,
        });
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Parameters left over once the control parameters are removed; these form
/// an implicit equality query.
pub fn filter_params(params: &HashMap<String, String>) -> impl Iterator<Item = (&str, &str)> {
    params
        .iter()
        .filter(|(k, _)| !CONTROL_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| (k.as_str(), v.as_str()))
}

/// Filter, sort and paginate a snapshot.
pub fn run(docs: Vec<Document>, query: &Query, options: &FindOptions) -> Vec<Document> {
    let mut matched: Vec<Document> = docs.into_iter().filter(|d| query.matches(d)).collect();
    if let Some(spec) = &options.sort {
        matched = sort_documents(matched, &spec.field, spec.order);
    }
    paginate(matched, options.skip, options.limit)
}

/// Apply `skip` then `limit`. Skipping past the end yields an empty result.
pub fn paginate(docs: Vec<Document>, skip: usize, limit: Option<usize>) -> Vec<Document> {
    docs.into_iter()
        .skip(skip)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Stable sort by one field. Documents missing the field go last in either
/// direction.
///
/// Time mode is decided once for the whole sort: the field name is a time
/// name, or some value looks like a time. In time mode, values that parse as
/// instants order chronologically ahead of every other value. Everything else
/// orders by type (booleans, numbers, text, then other values by their text
/// rendering) and within a type by value.
pub fn sort_documents(docs: Vec<Document>, field: &str, order: SortOrder) -> Vec<Document> {
    let time_mode = time::is_time_field(field)
        || docs
            .iter()
            .filter_map(|d| d.get(field))
            .any(time::looks_like_time);

    let mut keyed: Vec<(Option<SortKey>, Document)> = docs
        .into_iter()
        .map(|doc| (doc.get(field).map(|v| SortKey::of(v, time_mode)), doc))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match order {
            SortOrder::Ascending => a.cmp(b),
            SortOrder::Descending => b.cmp(a),
        },
    });

    keyed.into_iter().map(|(_, doc)| doc).collect()
}

/// A present sort value reduced to a totally ordered key.
/// Variant order is the order between classes.
#[derive(Debug, Clone)]
enum SortKey {
    Instant(DateTime<Utc>),
    Bool(bool),
    Number(f64),
    Text(String),
    Other(String),
}

impl SortKey {
    fn of(value: &Value, time_mode: bool) -> Self {
        if time_mode {
            if let Some(instant) = time::parse_time(value) {
                return SortKey::Instant(instant);
            }
        }
        match value {
            Value::Bool(b) => SortKey::Bool(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => SortKey::Number(f),
                None => SortKey::Other(render(value)),
            },
            Value::String(s) => SortKey::Text(s.clone()),
            other => SortKey::Other(render(other)),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Instant(_) => 0,
            SortKey::Bool(_) => 1,
            SortKey::Number(_) => 2,
            SortKey::Text(_) => 3,
            SortKey::Other(_) => 4,
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Instant(a), SortKey::Instant(b)) => a.cmp(b),
            (SortKey::Bool(a), SortKey::Bool(b)) => a.cmp(b),
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) | (SortKey::Other(a), SortKey::Other(b)) => {
                a.cmp(b)
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}
