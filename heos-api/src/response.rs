//! Parsed responses
//!
//! [`HeosMessage`] is the untyped envelope of one protocol line. A
//! [`HeosResponse`] is what a command caller receives: the result, the flat
//! attribute map and, for commands that return one, a typed payload.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ApiError;

/// Error id used when the failure was produced locally because the line
/// could not be understood, rather than reported by the device.
pub const PROTOCOL_ERROR_EID: i32 = -1;

/// Message text the device sends before the real answer of a slow command
pub const UNDER_PROCESS_MESSAGE: &str = "command under process";

/// Outcome reported in the `result` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeosResult {
    Success,
    Fail,
}

impl HeosResult {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "success" => Some(HeosResult::Success),
            "fail" => Some(HeosResult::Fail),
            _ => None,
        }
    }
}

/// Error details of a failed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    /// Vendor error id, or [`PROTOCOL_ERROR_EID`] for local protocol errors
    pub eid: i32,
    pub text: String,
    /// Additional system error number some firmware attaches
    pub syserrno: Option<i32>,
}

impl CommandError {
    pub fn protocol(text: impl Into<String>) -> Self {
        Self {
            eid: PROTOCOL_ERROR_EID,
            text: text.into(),
            syserrno: None,
        }
    }

    pub fn is_protocol_error(&self) -> bool {
        self.eid == PROTOCOL_ERROR_EID
    }

    fn from_attributes(attributes: &HashMap<String, String>) -> Self {
        Self {
            eid: attributes
                .get("eid")
                .and_then(|v| v.parse().ok())
                .unwrap_or(PROTOCOL_ERROR_EID),
            text: attributes.get("text").cloned().unwrap_or_default(),
            syserrno: attributes.get("syserrno").and_then(|v| v.parse().ok()),
        }
    }
}

/// The untyped envelope of a single protocol line
#[derive(Debug, Clone, PartialEq)]
pub struct HeosMessage {
    /// `group/command` path, e.g. `player/get_volume` or `event/groups_changed`
    pub command: String,
    /// `None` for unsolicited events, which carry no result
    pub result: Option<HeosResult>,
    pub attributes: HashMap<String, String>,
    pub payload: Option<Value>,
    pub options: Option<Value>,
}

impl HeosMessage {
    pub fn is_event(&self) -> bool {
        self.command.starts_with("event/")
    }

    /// True for the interim answer sent before a slow command completes
    pub fn is_under_process(&self) -> bool {
        self.attributes.contains_key(UNDER_PROCESS_MESSAGE)
    }

    /// Convert into a response, deserializing the payload as `T`
    ///
    /// A payload that does not match `T` turns the response into a protocol
    /// failure instead of an error, so callers always get a response back.
    pub fn into_response<T>(self) -> HeosResponse<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let HeosMessage {
            command,
            result,
            attributes,
            payload,
            ..
        } = self;

        let payload = match payload.map(serde_json::from_value::<T>) {
            None => None,
            Some(Ok(value)) => Some(value),
            Some(Err(e)) => {
                return HeosResponse::protocol_failure(
                    command,
                    format!("unexpected payload shape: {e}"),
                );
            }
        };

        HeosResponse::from_parts(command, result, attributes, payload)
    }

    /// Convert into a response and drop whatever payload was attached
    pub fn into_untyped_response(self) -> HeosResponse<()> {
        HeosResponse::from_parts(self.command, self.result, self.attributes, None)
    }
}

/// A response to one command (the ResponseObject of the protocol)
#[derive(Debug, Clone, PartialEq)]
pub struct HeosResponse<T> {
    pub result: HeosResult,
    pub command: String,
    pub attributes: HashMap<String, String>,
    /// Present iff `result` is [`HeosResult::Fail`]
    pub error: Option<CommandError>,
    pub payload: Option<T>,
}

impl<T> HeosResponse<T> {
    fn from_parts(
        command: String,
        result: Option<HeosResult>,
        attributes: HashMap<String, String>,
        payload: Option<T>,
    ) -> Self {
        match result {
            Some(HeosResult::Success) => Self {
                result: HeosResult::Success,
                command,
                attributes,
                error: None,
                payload,
            },
            Some(HeosResult::Fail) => Self {
                result: HeosResult::Fail,
                command,
                error: Some(CommandError::from_attributes(&attributes)),
                attributes,
                payload: None,
            },
            None => Self::protocol_failure(command, "line carries no result"),
        }
    }

    /// A locally generated failure for a line that could not be understood
    pub fn protocol_failure(command: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            result: HeosResult::Fail,
            command: command.into(),
            attributes: HashMap::new(),
            error: Some(CommandError::protocol(text)),
            payload: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == HeosResult::Success
    }

    pub fn is_under_process(&self) -> bool {
        self.attributes.contains_key(UNDER_PROCESS_MESSAGE)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Parse a single attribute into a typed value
    pub fn parsed_attribute<V>(&self, key: &str) -> Result<V, ApiError>
    where
        V: std::str::FromStr,
        V::Err: std::fmt::Display,
    {
        let raw = self.attribute(key).ok_or_else(|| {
            ApiError::Protocol(format!("{} response has no '{key}' attribute", self.command))
        })?;
        raw.parse::<V>().map_err(|e| {
            ApiError::Protocol(format!("{} attribute '{key}={raw}': {e}", self.command))
        })
    }

    /// Turn a failed response into an error
    pub fn into_result(self) -> Result<Self, ApiError> {
        match self.error {
            Some(error) if error.is_protocol_error() => Err(ApiError::Protocol(format!(
                "{}: {}",
                self.command, error.text
            ))),
            Some(error) => Err(ApiError::CommandFailed {
                command: self.command,
                eid: error.eid,
                text: error.text,
            }),
            None => Ok(self),
        }
    }

    /// Extract the payload of a successful response
    pub fn into_payload(self) -> Result<T, ApiError> {
        let command = self.command.clone();
        self.into_result()?
            .payload
            .ok_or_else(|| ApiError::Protocol(format!("{command} response has no payload")))
    }

    /// Forget the payload type, keeping result and attributes
    pub fn without_payload(self) -> HeosResponse<()> {
        HeosResponse {
            result: self.result,
            command: self.command,
            attributes: self.attributes,
            error: self.error,
            payload: None,
        }
    }
}
