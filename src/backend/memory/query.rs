//! Query evaluation over a JSON tree.
//!
//! Children are ordered the way the hosted backend orders them: by key
//! (integer-like keys first, numerically) or by the value of a child field
//! (null < false < true < numbers < strings < objects, ties broken by key).

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::{Map, Value};

/// How children are ordered
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryOrder {
    #[default]
    Key,
    Child(String),
}

/// Limit applied after ordering and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryLimit {
    First(u32),
    Last(u32),
}

/// Refinements accumulated on a reference
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryParams {
    pub order: QueryOrder,
    pub equal_to: Option<Value>,
    pub limit: Option<QueryLimit>,
}

impl QueryParams {
    /// True when the reference is a plain location
    pub fn is_default(&self) -> bool {
        *self == QueryParams::default()
    }

    /// Ordered, filtered, limited children of `value`
    pub fn children(&self, value: &Value) -> Vec<(String, Value)> {
        let Some(object) = value.as_object() else {
            return Vec::new();
        };

        let mut children: Vec<(String, Value)> = object
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        match &self.order {
            QueryOrder::Key => children.sort_by(|(a, _), (b, _)| compare_keys(a, b)),
            QueryOrder::Child(field) => children.sort_by(|(ka, va), (kb, vb)| {
                compare_values(field_of(va, field), field_of(vb, field))
                    .then_with(|| compare_keys(ka, kb))
            }),
        }

        if let Some(target) = &self.equal_to {
            children.retain(|(key, child)| match &self.order {
                QueryOrder::Key => target.as_str() == Some(key.as_str()),
                QueryOrder::Child(field) => {
                    compare_values(field_of(child, field), target) == Ordering::Equal
                }
            });
        }

        match self.limit {
            Some(QueryLimit::First(n)) => children.truncate(n as usize),
            Some(QueryLimit::Last(n)) => {
                let n = n as usize;
                if children.len() > n {
                    children.drain(..children.len() - n);
                }
            }
            None => {}
        }

        children
    }

    /// Value of a location as seen through this query
    pub fn view(&self, value: &Value) -> Value {
        if self.is_default() || !value.is_object() {
            return value.clone();
        }

        let children = self.children(value);
        if children.is_empty() {
            return Value::Null;
        }
        Value::Object(children.into_iter().collect::<Map<String, Value>>())
    }
}

static NULL: Value = Value::Null;

fn field_of<'a>(value: &'a Value, field: &str) -> &'a Value {
    value.get(field).unwrap_or(&NULL)
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) | Value::Object(_) => 5,
    }
}

/// Backend value ordering
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Backend key ordering: 32-bit integer keys first, numerically
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<i32>(), b.parse::<i32>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
