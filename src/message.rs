// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Client/relay wire frames (spec §6)
//!
//! Every frame is a UTF-8 JSON array whose first element is a leading tag.
//! Parsed by hand against a generic `Vec<serde_json::Value>` rather than a
//! `#[serde(tag = ...)]` enum because REQ/COUNT carry a variable number of
//! trailing filter objects, which `serde`'s tagged-enum support can't express
//! directly.

use serde_json::Value;

use crate::event::{Event, Filter};

/// Inbound (client → relay) message, dispatched by the router (spec §4.6)
#[derive(Debug)]
pub enum ClientMessage {
    Event(Event),
    Req {
        sub_id: String,
        filters: Vec<Filter>,
    },
    Count {
        sub_id: String,
        filters: Vec<Filter>,
    },
    Auth(Event),
    Close {
        sub_id: String,
    },
    NegOpen {
        sub_id: String,
        filter: Filter,
        initial_message: String,
    },
    NegMsg {
        sub_id: String,
        message: String,
    },
    NegClose {
        sub_id: String,
    },
}

impl ClientMessage {
    /// Parse and validate against the client-message schema (spec §6). A
    /// schema violation is a silent drop at the router (no reply, logged);
    /// the error string here is for that log line only.
    pub fn from_json(text: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| format!("invalid json: {e}"))?;
        let array = value
            .as_array()
            .ok_or_else(|| "message is not a JSON array".to_string())?;

        let tag = array
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| "missing leading tag".to_string())?;

        match tag {
            "EVENT" => {
                let event = array
                    .get(1)
                    .ok_or_else(|| "EVENT: missing event object".to_string())?;
                let event: Event = serde_json::from_value(event.clone())
                    .map_err(|e| format!("EVENT: {e}"))?;
                Ok(Self::Event(event))
            }
            "AUTH" => {
                let event = array
                    .get(1)
                    .ok_or_else(|| "AUTH: missing event object".to_string())?;
                let event: Event = serde_json::from_value(event.clone())
                    .map_err(|e| format!("AUTH: {e}"))?;
                Ok(Self::Auth(event))
            }
            "REQ" => {
                let sub_id = string_at(array, 1, "REQ")?;
                let filters = parse_filters(array, 2, "REQ")?;
                Ok(Self::Req { sub_id, filters })
            }
            "COUNT" => {
                let sub_id = string_at(array, 1, "COUNT")?;
                let filters = parse_filters(array, 2, "COUNT")?;
                Ok(Self::Count { sub_id, filters })
            }
            "CLOSE" => Ok(Self::Close {
                sub_id: string_at(array, 1, "CLOSE")?,
            }),
            "NEG-OPEN" => {
                let sub_id = string_at(array, 1, "NEG-OPEN")?;
                let filter: Filter = array
                    .get(2)
                    .ok_or_else(|| "NEG-OPEN: missing filter".to_string())
                    .and_then(|v| {
                        serde_json::from_value(v.clone()).map_err(|e| format!("NEG-OPEN: {e}"))
                    })?;
                let initial_message = string_at(array, 3, "NEG-OPEN")?;
                Ok(Self::NegOpen {
                    sub_id,
                    filter,
                    initial_message,
                })
            }
            "NEG-MSG" => Ok(Self::NegMsg {
                sub_id: string_at(array, 1, "NEG-MSG")?,
                message: string_at(array, 2, "NEG-MSG")?,
            }),
            "NEG-CLOSE" => Ok(Self::NegClose {
                sub_id: string_at(array, 1, "NEG-CLOSE")?,
            }),
            other => Err(format!("unrecognized message tag {other:?}")),
        }
    }
}

fn string_at(array: &[Value], index: usize, tag: &str) -> Result<String, String> {
    array
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("{tag}: missing or non-string element at index {index}"))
}

fn parse_filters(array: &[Value], from: usize, tag: &str) -> Result<Vec<Filter>, String> {
    if array.len() <= from {
        return Err(format!("{tag}: at least one filter is required"));
    }
    array[from..]
        .iter()
        .map(|v| serde_json::from_value(v.clone()).map_err(|e| format!("{tag}: {e}")))
        .collect()
}

/// Outbound (relay → client) message (spec §6)
pub enum RelayMessage<'a> {
    Event {
        sub_id: &'a str,
        event: &'a Event,
    },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Eose {
        sub_id: &'a str,
    },
    Closed {
        sub_id: &'a str,
        message: String,
    },
    Notice(String),
    Auth {
        challenge: &'a str,
    },
    Count {
        sub_id: &'a str,
        count: u64,
    },
    NegMsg {
        sub_id: &'a str,
        message: String,
    },
    NegErr {
        sub_id: &'a str,
        message: String,
    },
}

impl RelayMessage<'_> {
    pub fn to_json(&self) -> String {
        match self {
            Self::Event { sub_id, event } => serde_json::json!(["EVENT", sub_id, event]).to_string(),
            Self::Ok {
                event_id,
                accepted,
                message,
            } => serde_json::json!(["OK", event_id, accepted, message]).to_string(),
            Self::Eose { sub_id } => serde_json::json!(["EOSE", sub_id]).to_string(),
            Self::Closed { sub_id, message } => {
                serde_json::json!(["CLOSED", sub_id, message]).to_string()
            }
            Self::Notice(message) => serde_json::json!(["NOTICE", message]).to_string(),
            Self::Auth { challenge } => serde_json::json!(["AUTH", challenge]).to_string(),
            Self::Count { sub_id, count } => {
                serde_json::json!(["COUNT", sub_id, {"count": count}]).to_string()
            }
            Self::NegMsg { sub_id, message } => {
                serde_json::json!(["NEG-MSG", sub_id, message]).to_string()
            }
            Self::NegErr { sub_id, message } => {
                serde_json::json!(["NEG-ERR", sub_id, message]).to_string()
            }
        }
    }
}

/// Build an `["EVENT", subId, event]` frame using a pre-serialized,
/// JSON-quoted subscription id and a pre-serialized event (spec §4.7, "the
/// event may be serialized once per broadcast and the subscription id
/// cached in quoted form").
pub fn cached_event_frame(subid_json: &str, event_json: &str) -> String {
    format!("[\"EVENT\",{subid_json},{event_json}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_close() {
        let msg = ClientMessage::from_json(r#"["CLOSE","sub1"]"#).unwrap();
        assert!(matches!(msg, ClientMessage::Close { sub_id } if sub_id == "sub1"));
    }

    #[test]
    fn parses_req_with_multiple_filters() {
        let msg = ClientMessage::from_json(r#"["REQ","s",{"kinds":[1]},{"kinds":[2]}]"#).unwrap();
        match msg {
            ClientMessage::Req { sub_id, filters } => {
                assert_eq!(sub_id, "s");
                assert_eq!(filters.len(), 2);
            }
            _ => panic!("expected REQ"),
        }
    }

    #[test]
    fn rejects_req_with_no_filters() {
        assert!(ClientMessage::from_json(r#"["REQ","s"]"#).is_err());
    }

    #[test]
    fn rejects_unrecognized_tag() {
        assert!(ClientMessage::from_json(r#"["BOGUS","s"]"#).is_err());
    }

    #[test]
    fn rejects_non_array() {
        assert!(ClientMessage::from_json(r#"{"a":1}"#).is_err());
    }

    #[test]
    fn cached_event_frame_concatenates_without_reparsing() {
        let frame = cached_event_frame("\"sub1\"", "{\"id\":\"abc\"}");
        assert_eq!(frame, "[\"EVENT\",\"sub1\",{\"id\":\"abc\"}]");
    }
}
