//! Trigger payloads.
//!
//! A `TR` message carries a JSON object with exactly one entry mapping the
//! event name to its data:
//!
//! ```text
//! {"chat/message": {"text": "hello"}}
//! ```

use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};

/// A named event with arbitrary JSON data.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub data: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Parse a trigger payload.
    pub fn parse(payload: &str) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_str(payload)?;
        let Value::Object(map) = value else {
            return Err(ProtocolError::InvalidEvent(
                "payload is not a JSON object".to_string(),
            ));
        };

        if map.len() != 1 {
            return Err(ProtocolError::InvalidEvent(format!(
                "expected exactly one event, found {}",
                map.len()
            )));
        }

        let Some((name, data)) = map.into_iter().next() else {
            return Err(ProtocolError::InvalidEvent("no event".to_string()));
        };

        Ok(Self { name, data })
    }

    /// Serialize back into a trigger payload.
    pub fn to_payload(&self) -> String {
        let mut map = Map::with_capacity(1);
        map.insert(self.name.clone(), self.data.clone());
        Value::Object(map).to_string()
    }

    /// The `<backend>/<method>` split of the event name, if it has one.
    pub fn route(&self) -> Option<(&str, &str)> {
        self.name
            .split_once('/')
            .filter(|(backend, method)| !backend.is_empty() && !method.is_empty())
    }
}
