//! Response parser: one raw protocol line in, one typed object out
//!
//! Every line the device sends is a JSON envelope:
//!
//! ```text
//! {"heos": {"command": "player/get_volume", "result": "success", "message": "pid=1&level=20"}}
//! {"heos": {"command": "player/get_players", "result": "success", "message": ""}, "payload": [...]}
//! {"heos": {"command": "event/player_state_changed", "message": "pid=1&state=play"}}
//! ```
//!
//! The functions here are pure. Garbage in never panics: [`parse_response`]
//! turns it into a protocol failure and [`parse_event`] into `None`.

use std::borrow::Cow;
use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::event::{EventKind, HeosEvent};
use crate::response::{HeosMessage, HeosResponse, HeosResult};

const EVENT_PREFIX: &str = "event/";

#[derive(Deserialize)]
struct Envelope {
    heos: Header,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    options: Option<Value>,
}

#[derive(Deserialize)]
struct Header {
    command: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    message: String,
}

/// Parse the envelope of a line without interpreting its payload
pub fn parse_message(line: &str) -> Result<HeosMessage> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ApiError::Protocol("empty line".to_string()));
    }

    let envelope: Envelope = serde_json::from_str(line)
        .map_err(|e| ApiError::Protocol(format!("not a HEOS envelope: {e}")))?;

    let result = match envelope.heos.result.as_deref() {
        None => None,
        Some(raw) => Some(HeosResult::from_wire(raw).ok_or_else(|| {
            ApiError::Protocol(format!(
                "{}: unknown result '{raw}'",
                envelope.heos.command
            ))
        })?),
    };

    Ok(HeosMessage {
        command: envelope.heos.command,
        result,
        attributes: parse_attributes(&envelope.heos.message),
        payload: envelope.payload,
        options: envelope.options,
    })
}

/// Parse a command response, deserializing its payload as `T`
pub fn parse_response<T>(line: &str) -> HeosResponse<T>
where
    T: serde::de::DeserializeOwned,
{
    match parse_message(line) {
        Ok(message) if message.is_event() => HeosResponse::protocol_failure(
            message.command,
            "received an event where a response was expected",
        ),
        Ok(message) => message.into_response(),
        Err(e) => HeosResponse::protocol_failure(String::new(), e.to_string()),
    }
}

/// Parse a command response whose payload, if any, is not needed
pub fn parse_untyped_response(line: &str) -> HeosResponse<()> {
    match parse_message(line) {
        Ok(message) if message.is_event() => HeosResponse::protocol_failure(
            message.command,
            "received an event where a response was expected",
        ),
        Ok(message) => message.into_untyped_response(),
        Err(e) => HeosResponse::protocol_failure(String::new(), e.to_string()),
    }
}

/// Parse an unsolicited change event
///
/// Returns `None` for anything that is not an `event/...` line, including
/// acknowledgements of commands written on the event connection.
pub fn parse_event(line: &str) -> Option<HeosEvent> {
    let message = parse_message(line).ok()?;
    let name = message.command.strip_prefix(EVENT_PREFIX)?;
    Some(HeosEvent {
        kind: EventKind::from_name(name),
        command: message.command.clone(),
        attributes: message.attributes,
        now_playing: None,
    })
}

/// Split a `k=v&k=v` message into a map, percent-decoding keys and values
///
/// Fragments without `=` become keys with an empty value, which is how the
/// `command under process` marker is represented.
pub fn parse_attributes(message: &str) -> HashMap<String, String> {
    message
        .split('&')
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| match fragment.split_once('=') {
            Some((key, value)) => (decode(key), decode(value)),
            None => (decode(fragment), String::new()),
        })
        .collect()
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .unwrap_or(Cow::Borrowed(raw))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventCategory;
    use crate::types::Player;
    use rstest::rstest;

    #[test]
    fn test_parse_success_with_attributes() {
        let line = r#"{"heos": {"command": "player/get_volume", "result": "success", "message": "pid=1&level=20"}}"#;
        let response = parse_untyped_response(line);
        assert!(response.is_success());
        assert_eq!(response.command, "player/get_volume");
        assert_eq!(response.attribute("level"), Some("20"));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_parse_fail_populates_error() {
        let line = r#"{"heos": {"command": "player/set_volume", "result": "fail", "message": "eid=9&text=Parameter out of range"}}"#;
        let response = parse_untyped_response(line);
        assert_eq!(response.result, HeosResult::Fail);
        let error = response.error.as_ref().unwrap();
        assert_eq!(error.eid, 9);
        assert_eq!(error.text, "Parameter out of range");
        assert!(!error.is_protocol_error());
    }

    #[test]
    fn test_parse_typed_payload() {
        let line = r#"{"heos": {"command": "player/get_players", "result": "success", "message": ""}, "payload": [{"name": "Kitchen", "pid": 7, "model": "HEOS 1", "version": "1.0"}]}"#;
        let response = parse_response::<Vec<Player>>(line);
        let players = response.into_payload().unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].pid, 7);
    }

    #[test]
    fn test_payload_shape_mismatch_is_protocol_failure() {
        let line = r#"{"heos": {"command": "player/get_players", "result": "success", "message": ""}, "payload": {"unexpected": true}}"#;
        let response = parse_response::<Vec<Player>>(line);
        assert!(!response.is_success());
        assert!(response.error.unwrap().is_protocol_error());
        assert_eq!(response.command, "player/get_players");
    }

    #[rstest]
    #[case::empty("")]
    #[case::not_json("heos://system/heart_beat")]
    #[case::truncated(r#"{"heos": {"command": "system/heart"#)]
    #[case::no_envelope(r#"{"payload": []}"#)]
    #[case::bad_result(r#"{"heos": {"command": "system/heart_beat", "result": "maybe", "message": ""}}"#)]
    fn test_malformed_lines_become_protocol_failures(#[case] line: &str) {
        let response = parse_untyped_response(line);
        assert!(!response.is_success());
        assert!(response.error.unwrap().is_protocol_error());
        assert!(parse_event(line).is_none());
    }

    #[test]
    fn test_event_where_response_expected() {
        let line = r#"{"heos": {"command": "event/players_changed", "message": ""}}"#;
        let response = parse_untyped_response(line);
        assert!(!response.is_success());
    }

    #[test]
    fn test_parse_event() {
        let line = r#"{"heos": {"command": "event/player_state_changed", "message": "pid=-42&state=play"}}"#;
        let event = parse_event(line).unwrap();
        assert_eq!(event.kind, EventKind::PlayerStateChanged);
        assert_eq!(event.category(), EventCategory::PlayerState);
        assert_eq!(event.player_id(), Some(-42));
        assert_eq!(event.attribute("state"), Some("play"));
    }

    #[test]
    fn test_response_is_not_an_event() {
        let line = r#"{"heos": {"command": "system/register_for_change_events", "result": "success", "message": "enable=on"}}"#;
        assert!(parse_event(line).is_none());
    }

    #[test]
    fn test_under_process_marker() {
        let line = r#"{"heos": {"command": "browse/browse", "result": "success", "message": "command under process&sid=1025"}}"#;
        let message = parse_message(line).unwrap();
        assert!(message.is_under_process());
        assert_eq!(message.attributes.get("sid").map(String::as_str), Some("1025"));
    }

    #[rstest]
    #[case("", 0)]
    #[case("pid=1", 1)]
    #[case("pid=1&&level=5", 2)]
    #[case("text=Hello%20World%26more", 1)]
    fn test_parse_attributes(#[case] message: &str, #[case] expected_len: usize) {
        assert_eq!(parse_attributes(message).len(), expected_len);
    }

    #[test]
    fn test_attribute_values_are_decoded() {
        let attributes = parse_attributes("un=me%40example.com&text=a%26b");
        assert_eq!(attributes["un"], "me@example.com");
        assert_eq!(attributes["text"], "a&b");
    }
}
