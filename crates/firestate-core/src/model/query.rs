// ── Database queries ──
//
// A query is a location plus optional ordering, bounds and limit. Two
// queries on the same location stringify identically; `identifier()`
// tells them apart.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How children of a location are ordered before bounds and limits apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderBy {
    Key,
    Value,
    Priority,
    Child(String),
}

impl OrderBy {
    fn index_name(&self) -> &str {
        match self {
            Self::Key => ".key",
            Self::Value => ".value",
            Self::Priority => ".priority",
            Self::Child(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Limit {
    First(u32),
    Last(u32),
}

/// A database location with query constraints.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    path: String,
    order_by: Option<OrderBy>,
    limit: Option<Limit>,
    start_at: Option<Value>,
    end_at: Option<Value>,
    equal_to: Option<Value>,
}

impl Query {
    /// Query on `path`. Leading, trailing and repeated slashes are dropped.
    pub fn new(path: &str) -> Self {
        Self {
            path: normalize_path(path),
            ..Self::default()
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment, `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.path.rsplit('/').next().filter(|s| !s.is_empty())
    }

    pub fn order_by(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn limit(&self) -> Option<Limit> {
        self.limit
    }

    // ── Builders ─────────────────────────────────────────────────────

    pub fn child(&self, segment: &str) -> Self {
        Self::new(&format!("{}/{segment}", self.path))
    }

    pub fn order_by_key(mut self) -> Self {
        self.order_by = Some(OrderBy::Key);
        self
    }

    pub fn order_by_value(mut self) -> Self {
        self.order_by = Some(OrderBy::Value);
        self
    }

    pub fn order_by_priority(mut self) -> Self {
        self.order_by = Some(OrderBy::Priority);
        self
    }

    pub fn order_by_child(mut self, name: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy::Child(name.into()));
        self
    }

    pub fn limit_to_first(mut self, n: u32) -> Self {
        self.limit = Some(Limit::First(n));
        self
    }

    pub fn limit_to_last(mut self, n: u32) -> Self {
        self.limit = Some(Limit::Last(n));
        self
    }

    pub fn start_at(mut self, value: impl Into<Value>) -> Self {
        self.start_at = Some(value.into());
        self
    }

    pub fn end_at(mut self, value: impl Into<Value>) -> Self {
        self.end_at = Some(value.into());
        self
    }

    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    // ── Identity ─────────────────────────────────────────────────────

    /// Absolute URL of the queried location under `base`.
    pub fn reference_url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.path)
    }

    /// Serialized query parameters, `"default"` when there are none.
    pub fn identifier(&self) -> String {
        if !self.has_constraints() {
            return "default".into();
        }
        // serde_json's default map is ordered by key, so the output is stable.
        let mut params = Map::new();
        if let Some(order) = &self.order_by {
            params.insert("index".into(), Value::from(order.index_name()));
        }
        match self.limit {
            Some(Limit::First(n)) => {
                params.insert("limitToFirst".into(), Value::from(n));
            }
            Some(Limit::Last(n)) => {
                params.insert("limitToLast".into(), Value::from(n));
            }
            None => {}
        }
        if let Some(v) = &self.start_at {
            params.insert("startAt".into(), v.clone());
        }
        if let Some(v) = &self.end_at {
            params.insert("endAt".into(), v.clone());
        }
        if let Some(v) = &self.equal_to {
            params.insert("equalTo".into(), v.clone());
        }
        Value::Object(params).to_string()
    }

    pub fn has_constraints(&self) -> bool {
        self.order_by.is_some()
            || self.limit.is_some()
            || self.start_at.is_some()
            || self.end_at.is_some()
            || self.equal_to.is_some()
    }

    // ── Evaluation ───────────────────────────────────────────────────

    /// Apply ordering, bounds and limit to the raw value at the location.
    ///
    /// Only objects are filtered; scalars pass through. An empty result is
    /// `null`, matching how an absent location reads.
    pub fn apply(&self, value: &Value) -> Value {
        let Value::Object(children) = value else {
            return value.clone();
        };
        if !self.has_constraints() {
            return value.clone();
        }

        let order = self.order_by.clone().unwrap_or(OrderBy::Key);
        let mut entries: Vec<(&String, &Value)> = children.iter().collect();
        entries.sort_by(|a, b| {
            compare_values(&sort_value(&order, a.0, a.1), &sort_value(&order, b.0, b.1))
                .then_with(|| a.0.cmp(b.0))
        });

        entries.retain(|(key, child)| {
            let v = sort_value(&order, key, child);
            self.start_at
                .as_ref()
                .is_none_or(|s| compare_values(&v, s) != Ordering::Less)
                && self
                    .end_at
                    .as_ref()
                    .is_none_or(|e| compare_values(&v, e) != Ordering::Greater)
                && self
                    .equal_to
                    .as_ref()
                    .is_none_or(|eq| compare_values(&v, eq) == Ordering::Equal)
        });

        let selected: Vec<(&String, &Value)> = match self.limit {
            Some(Limit::First(n)) => entries.into_iter().take(limit_len(n)).collect(),
            Some(Limit::Last(n)) => {
                let skip = entries.len().saturating_sub(limit_len(n));
                entries.into_iter().skip(skip).collect()
            }
            None => entries,
        };

        if selected.is_empty() {
            return Value::Null;
        }
        Value::Object(
            selected
                .into_iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path)
    }
}

fn limit_len(n: u32) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn sort_value(order: &OrderBy, key: &str, child: &Value) -> Value {
    match order {
        OrderBy::Key | OrderBy::Priority => Value::from(key),
        OrderBy::Value => child.clone(),
        OrderBy::Child(name) => child.get(name).cloned().unwrap_or(Value::Null),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) | Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null, false, true, numbers, strings,
/// then containers.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
