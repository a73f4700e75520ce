//! Wire messages of the QMP protocol (newline-delimited JSON).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command sent by the client.
#[derive(Debug, Serialize)]
pub(super) struct QmpCommand<'a> {
    pub execute: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Anything the server may send.
///
/// Variant order matters: serde tries them top to bottom.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum ServerMessage {
    Greeting {
        #[serde(rename = "QMP")]
        banner: Value,
    },
    Error {
        error: Value,
    },
    Return {
        #[serde(rename = "return")]
        value: Value,
    },
    Event {
        event: String,
        #[serde(default)]
        data: Option<Value>,
    },
}

/// Error object of a failed command, kept verbatim as far as possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ErrorPayload {
    pub class: String,
    pub desc: String,
}

impl ErrorPayload {
    /// `None` when the error field is empty.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            Value::String(s) if s.is_empty() => None,
            Value::Object(map) => {
                let class = map
                    .get("class")
                    .and_then(Value::as_str)
                    .unwrap_or("GenericError")
                    .to_string();
                let desc = map
                    .get("desc")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                Some(Self { class, desc })
            }
            Value::String(s) => Some(Self {
                class: "GenericError".to_string(),
                desc: s.clone(),
            }),
            other => Some(Self {
                class: "GenericError".to_string(),
                desc: other.to_string(),
            }),
        }
    }
}

impl ErrorPayload {
    /// Payload for an `error` field of a command reply. An empty field still
    /// denotes failure and is reported verbatim as a generic error.
    pub fn from_error_field(value: &Value) -> Self {
        Self::from_value(value).unwrap_or_else(|| Self {
            class: "GenericError".to_string(),
            desc: value.to_string(),
        })
    }
}

/// Guest run state as reported by `query-status`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunState {
    pub running: bool,
    pub status: String,
}
