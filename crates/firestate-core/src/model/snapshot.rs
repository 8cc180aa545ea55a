// ── Database snapshot ──

use serde_json::Value;

/// Value of a database location at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSnapshot {
    /// Last path segment, `None` for the root.
    pub key: Option<String>,
    pub value: Value,
}

impl DataSnapshot {
    pub fn new(key: Option<String>, value: Value) -> Self {
        Self { key, value }
    }

    /// The JSON value at this location.
    pub fn val(&self) -> &Value {
        &self.value
    }

    pub fn into_val(self) -> Value {
        self.value
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }
}
