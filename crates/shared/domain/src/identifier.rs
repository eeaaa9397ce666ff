//! Record identifiers.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::constants::ID_FIELD;
use crate::Record;

/// Identifier of a record within its resource.
///
/// Stored ids may be JSON numbers or strings; both are coerced to their
/// string form so `1` and `"1"` identify the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Create an identifier from its string form
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Coerce a JSON value to an identifier. Only strings and numbers qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Read the `id` field of a record
    pub fn of(record: &Record) -> Option<Self> {
        record.get(ID_FIELD).and_then(Self::from_value)
    }

    /// String form of the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form, when the identifier is an unsigned integer
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// Check whether a JSON value identifies the same record
    pub fn matches(&self, value: &Value) -> bool {
        Self::from_value(value).is_some_and(|other| other == *self)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for Identifier {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for Identifier {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Identifier::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom("identifier must be a string or a number"))
    }
}
