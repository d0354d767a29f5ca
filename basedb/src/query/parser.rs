use super::{Condition, FieldCondition, Operator, Query};
use crate::document::{as_number, render, type_name};
use crate::error::{BaseDbError, Result};
use regex::Regex;
use serde_json::{Map, Value};

/// Parse and validate a query value. `null` is the empty query; anything
/// other than an object is rejected.
pub fn parse_query(value: &Value) -> Result<Query> {
    match value {
        Value::Null => Ok(Query::all()),
        Value::Object(map) => parse_query_map(map),
        other => Err(BaseDbError::InvalidQuery(format!(
            "query must be an object, got {}",
            type_name(other)
        ))),
    }
}

/// Parse and validate a query object. All operator checks happen here, so
/// a returned [`Query`] can be evaluated without further errors.
pub fn parse_query_map(map: &Map<String, Value>) -> Result<Query> {
    let mut conditions = Vec::with_capacity(map.len());
    for (field, value) in map {
        conditions.push(FieldCondition {
            field: field.clone(),
            condition: parse_condition(field, value)?,
        });
    }
    Ok(Query { conditions })
}

/// Build a literal equality query from key/value pairs, e.g. request parameters.
pub fn equality_query<'a, I>(pairs: I) -> Query
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let conditions = pairs
        .into_iter()
        .map(|(field, value)| FieldCondition {
            field: field.to_string(),
            condition: Condition::Equals(Value::String(value.to_string())),
        })
        .collect();
    Query { conditions }
}

fn parse_condition(field: &str, value: &Value) -> Result<Condition> {
    let map = match value {
        Value::Object(map) => map,
        literal => return Ok(Condition::Equals(literal.clone())),
    };

    let operator_keys = map.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys == 0 && !map.is_empty() {
        return Ok(Condition::Equals(value.clone()));
    }
    if operator_keys != map.len() {
        return Err(BaseDbError::InvalidQuery(format!(
            "field '{field}' mixes operators with plain keys"
        )));
    }

    let mut operators = Vec::with_capacity(map.len());
    for (name, operand) in map {
        operators.push(parse_operator(field, name, operand)?);
    }
    check_bounds(field, &operators)?;
    Ok(Condition::Operators(operators))
}

fn parse_operator(field: &str, name: &str, operand: &Value) -> Result<Operator> {
    let op = match name {
        "$eq" => Operator::Eq(operand.clone()),
        "$ne" => Operator::Ne(operand.clone()),
        "$gt" => Operator::Gt(scalar_operand(field, name, operand)?),
        "$gte" => Operator::Gte(scalar_operand(field, name, operand)?),
        "$lt" => Operator::Lt(scalar_operand(field, name, operand)?),
        "$lte" => Operator::Lte(scalar_operand(field, name, operand)?),
        "$in" => Operator::In(list_operand(field, name, operand)?),
        "$nin" => Operator::Nin(list_operand(field, name, operand)?),
        "$exists" => match operand {
            Value::Bool(b) => Operator::Exists(*b),
            other => {
                return Err(BaseDbError::InvalidQuery(format!(
                    "operator $exists on field '{field}' requires a boolean, got {}",
                    type_name(other)
                )))
            }
        },
        "$regex" => {
            let pattern = operand.as_str().ok_or_else(|| {
                BaseDbError::InvalidQuery(format!(
                    "operator $regex on field '{field}' requires a string, got {}",
                    type_name(operand)
                ))
            })?;
            let re = Regex::new(pattern).map_err(|e| {
                BaseDbError::InvalidQuery(format!(
                    "invalid pattern for $regex on field '{field}': {e}"
                ))
            })?;
            Operator::Regex(re)
        }
        unknown => {
            return Err(BaseDbError::InvalidQuery(format!(
                "unknown operator '{unknown}' for field '{field}'"
            )))
        }
    };
    Ok(op)
}

fn scalar_operand(field: &str, name: &str, operand: &Value) -> Result<Value> {
    match operand {
        Value::Array(_) | Value::Object(_) => Err(BaseDbError::InvalidQuery(format!(
            "operator {name} on field '{field}' does not accept {} values",
            type_name(operand)
        ))),
        scalar => Ok(scalar.clone()),
    }
}

fn list_operand(field: &str, name: &str, operand: &Value) -> Result<Vec<Value>> {
    match operand {
        Value::Array(values) => Ok(values.clone()),
        other => Err(BaseDbError::InvalidQuery(format!(
            "operator {name} on field '{field}' requires an array, got {}",
            type_name(other)
        ))),
    }
}

/// Reject a lower bound that is not below an upper bound on the same field.
/// Only numeric bounds are checked; `$gte` with `$lte` may be equal.
fn check_bounds(field: &str, operators: &[Operator]) -> Result<()> {
    for lower in operators {
        let (lo, inclusive_lo) = match lower {
            Operator::Gt(v) => (v, false),
            Operator::Gte(v) => (v, true),
            _ => continue,
        };
        for upper in operators {
            let (hi, inclusive_hi) = match upper {
                Operator::Lt(v) => (v, false),
                Operator::Lte(v) => (v, true),
                _ => continue,
            };
            let (Some(lo_num), Some(hi_num)) = (as_number(lo), as_number(hi)) else {
                continue;
            };
            let valid = if inclusive_lo && inclusive_hi {
                lo_num <= hi_num
            } else {
                lo_num < hi_num
            };
            if !valid {
                return Err(BaseDbError::InvalidQuery(format!(
                    "conflicting bounds for field '{field}': {} {} must be less than {} {}",
                    lower.name(),
                    render(lo),
                    upper.name(),
                    render(hi)
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn err(value: Value) -> String {
        match parse_query(&value) {
            Err(BaseDbError::InvalidQuery(msg)) => msg,
            other => panic!("expected InvalidQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_operator() {
        assert!(err(json!({ "age": { "$between": [1, 2] } })).contains("$between"));
    }

    #[test]
    fn test_in_requires_array() {
        assert!(err(json!({ "tag": { "$in": "a" } })).contains("requires an array"));
        assert!(err(json!({ "tag": { "$nin": 3 } })).contains("$nin"));
    }

    #[test]
    fn test_exists_requires_bool() {
        assert!(err(json!({ "tag": { "$exists": "yes" } })).contains("boolean"));
    }

    #[test]
    fn test_regex_must_compile() {
        assert!(err(json!({ "name": { "$regex": "(" } })).contains("invalid pattern"));
        assert!(err(json!({ "name": { "$regex": 5 } })).contains("requires a string"));
    }

    #[test]
    fn test_range_rejects_composite_operands() {
        assert!(err(json!({ "age": { "$gt": [1] } })).contains("does not accept"));
        assert!(err(json!({ "age": { "$lte": { "x": 1 } } })).contains("does not accept"));
    }

    #[test]
    fn test_contradictory_bounds() {
        assert!(err(json!({ "age": { "$gt": 65, "$lt": 18 } })).contains("conflicting bounds"));
        assert!(err(json!({ "age": { "$gt": 5, "$lt": 5 } })).contains("conflicting bounds"));
        assert!(err(json!({ "age": { "$gte": 6, "$lte": 5 } })).contains("conflicting bounds"));
        assert!(err(json!({ "age": { "$gt": "10", "$lte": 10 } })).contains("conflicting bounds"));
    }

    #[test]
    fn test_valid_bounds() {
        assert!(parse_query(&json!({ "age": { "$gte": 5, "$lte": 5 } })).is_ok());
        assert!(parse_query(&json!({ "age": { "$gt": 1, "$lt": 2 } })).is_ok());
        // Non-numeric bounds are not cross-checked
        assert!(parse_query(&json!({ "name": { "$gt": "z", "$lt": "a" } })).is_ok());
    }

    #[test]
    fn test_mixed_operator_and_plain_keys() {
        assert!(err(json!({ "a": { "$gt": 1, "b": 2 } })).contains("mixes"));
    }

    #[test]
    fn test_query_must_be_object() {
        assert!(err(json!([1, 2])).contains("must be an object"));
        assert!(parse_query(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_parsed_conditions() {
        let query = parse_query(&json!({ "age": { "$gte": 18 }, "name": "Alice" })).unwrap();
        assert_eq!(query.conditions().len(), 2);
        let age = query.conditions().iter().find(|c| c.field == "age").unwrap();
        match &age.condition {
            Condition::Operators(ops) => assert_eq!(ops[0].name(), "$gte"),
            other => panic!("unexpected condition {other:?}"),
        }
    }
}
