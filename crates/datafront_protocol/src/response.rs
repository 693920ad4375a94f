//! Response envelopes returned to the dispatcher.

use crate::ids::EntityKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Entities returned by a table or query read, keyed by entity key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableResponse {
    /// Encoded entities.
    pub values: BTreeMap<EntityKey, Value>,
}

impl TableResponse {
    /// Creates a table response.
    pub fn new(values: BTreeMap<EntityKey, Value>) -> Self {
        Self { values }
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no entities were returned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Value returned by a singleton read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingletonResponse {
    /// The encoded singleton value.
    pub value: Value,
}

impl SingletonResponse {
    /// Creates a singleton response.
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

/// Body of a successful response to one dispatcher command.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Entities from a table or query read.
    Table(TableResponse),
    /// Value from a singleton read.
    Singleton(SingletonResponse),
    /// Result returned by an action handler.
    Action(Value),
    /// Acknowledgement with no body (unsubscribe requests).
    Ack,
}

impl ResponseBody {
    /// Converts the body to its JSON wire form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            ResponseBody::Table(response) => {
                serde_json::to_value(response).unwrap_or(Value::Null)
            }
            ResponseBody::Singleton(response) => {
                serde_json::to_value(response).unwrap_or(Value::Null)
            }
            ResponseBody::Action(value) => value.clone(),
            ResponseBody::Ack => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_response_serializes_values_by_key() {
        let mut values = BTreeMap::new();
        values.insert(EntityKey::new("12"), json!({"name": "North Keep"}));
        let body = ResponseBody::Table(TableResponse::new(values));
        assert_eq!(
            body.to_value(),
            json!({"values": {"12": {"name": "North Keep"}}})
        );
    }

    #[test]
    fn empty_table_response_is_empty_object() {
        let body = ResponseBody::Table(TableResponse::default());
        assert_eq!(body.to_value(), json!({"values": {}}));
    }

    #[test]
    fn singleton_response_wraps_value() {
        let body = ResponseBody::Singleton(SingletonResponse::new(json!(42)));
        assert_eq!(body.to_value(), json!({"value": 42}));
    }

    #[test]
    fn action_response_passes_value_through() {
        let body = ResponseBody::Action(json!({"renamed": true}));
        assert_eq!(body.to_value(), json!({"renamed": true}));
    }

    #[test]
    fn ack_is_null() {
        assert_eq!(ResponseBody::Ack.to_value(), Value::Null);
    }
}
