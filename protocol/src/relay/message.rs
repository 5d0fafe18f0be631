//! NIP-01 wire messages.
//!
//! ```text
//! client -> relay   ["EVENT", <event>]
//!                   ["REQ", <sub_id>, <filter>]
//!                   ["CLOSE", <sub_id>]
//! relay -> client   ["EVENT", <sub_id>, <event>]
//!                   ["OK", <event_id>, <accepted>, <message>]
//!                   ["EOSE", <sub_id>]
//!                   ["CLOSED", <sub_id>, <message>]
//!                   ["NOTICE", <message>]
//! ```

use serde_json::{json, Value};

use super::endpoint::RelayError;
use super::filter::Filter;
use crate::event::Event;

/// Messages we send.
#[derive(Debug, Clone)]
pub enum ClientMessage<'a> {
    Event(&'a Event),
    Req { sub_id: &'a str, filter: &'a Filter },
    Close { sub_id: &'a str },
}

impl ClientMessage<'_> {
    pub fn to_json(&self) -> String {
        match self {
            Self::Event(event) => json!(["EVENT", event]),
            Self::Req { sub_id, filter } => json!(["REQ", sub_id, filter]),
            Self::Close { sub_id } => json!(["CLOSE", sub_id]),
        }
        .to_string()
    }
}

/// Messages relays send. Events stay as raw JSON until the caller decides
/// whether one bad event should poison the whole response (it shouldn't).
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event { sub_id: String, event: Value },
    Ok { event_id: String, accepted: bool, message: String },
    Eose { sub_id: String },
    Closed { sub_id: String, message: String },
    Notice { message: String },
    Auth,
}

impl RelayMessage {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| RelayError::Protocol(e.to_string()))?;
        let items = value
            .as_array()
            .ok_or_else(|| RelayError::Protocol("relay message is not an array".into()))?;

        let str_at = |i: usize| -> Result<String, RelayError> {
            items
                .get(i)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| RelayError::Protocol(format!("expected string at position {i}")))
        };

        match str_at(0)?.as_str() {
            "EVENT" => Ok(Self::Event {
                sub_id: str_at(1)?,
                event: items.get(2).cloned().unwrap_or(Value::Null),
            }),
            "OK" => Ok(Self::Ok {
                event_id: str_at(1)?,
                accepted: items.get(2).and_then(Value::as_bool).unwrap_or(false),
                message: str_at(3).unwrap_or_default(),
            }),
            "EOSE" => Ok(Self::Eose { sub_id: str_at(1)? }),
            "CLOSED" => Ok(Self::Closed {
                sub_id: str_at(1)?,
                message: str_at(2).unwrap_or_default(),
            }),
            "NOTICE" => Ok(Self::Notice {
                message: str_at(1).unwrap_or_default(),
            }),
            "AUTH" => Ok(Self::Auth),
            other => Err(RelayError::Protocol(format!("unknown message type '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn req_message_shape() {
        let filter = Filter::new().kind(EventKind::Transfer).since(10);
        let json = ClientMessage::Req {
            sub_id: "vvc-1",
            filter: &filter,
        }
        .to_json();
        assert_eq!(json, r#"["REQ","vvc-1",{"kinds":[2940],"since":10}]"#);
    }

    #[test]
    fn close_message_shape() {
        assert_eq!(
            ClientMessage::Close { sub_id: "vvc-1" }.to_json(),
            r#"["CLOSE","vvc-1"]"#
        );
    }

    #[test]
    fn parses_ok_and_eose() {
        assert_eq!(
            RelayMessage::parse(r#"["OK","abc",true,""]"#).unwrap(),
            RelayMessage::Ok {
                event_id: "abc".into(),
                accepted: true,
                message: String::new()
            }
        );
        assert_eq!(
            RelayMessage::parse(r#"["EOSE","vvc-1"]"#).unwrap(),
            RelayMessage::Eose {
                sub_id: "vvc-1".into()
            }
        );
    }

    #[test]
    fn parses_closed_with_reason() {
        assert_eq!(
            RelayMessage::parse(r#"["CLOSED","vvc-2","error: too many filters"]"#).unwrap(),
            RelayMessage::Closed {
                sub_id: "vvc-2".into(),
                message: "error: too many filters".into()
            }
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(RelayMessage::parse("{}").is_err());
        assert!(RelayMessage::parse(r#"["WHAT"]"#).is_err());
        assert!(RelayMessage::parse("nope").is_err());
    }
}
