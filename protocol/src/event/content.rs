//! Ledger payloads carried in an event's `content` field.
//!
//! Two shapes, discriminated by `type`:
//!
//! ```text
//! {"type":"send","amount":30,"memo":"lunch"}   -- transfer, memo optional
//! {"type":"fix","balance":70}                  -- checkpoint
//! ```
//!
//! Amounts and balances are `u64`. serde refuses negative numbers, floats
//! and strings for them, which is exactly the fail-closed behaviour we want:
//! a balance of `-5` or `12.5` is malformed, not rounded.

use serde::{Deserialize, Serialize};

/// The decoded `content` of a ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerContent {
    /// Value moving from the event author to the `p`-tagged recipient.
    #[serde(rename = "send")]
    Send {
        amount: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
    },

    /// The author's balance as of the event's `created_at`.
    #[serde(rename = "fix")]
    Fix { balance: u64 },
}

impl LedgerContent {
    /// The wire name of this payload's `type`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Send { .. } => crate::config::CONTENT_TYPE_SEND,
            Self::Fix { .. } => crate::config::CONTENT_TYPE_FIX,
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a plain enum of integers and strings can't fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_existing_wire_format() {
        // Field order as written by the first generation of wallets.
        let send = LedgerContent::from_json(r#"{"amount":30,"memo":"lunch","type":"send"}"#).unwrap();
        assert_eq!(
            send,
            LedgerContent::Send {
                amount: 30,
                memo: Some("lunch".into())
            }
        );

        let fix = LedgerContent::from_json(r#"{"balance":70,"type":"fix"}"#).unwrap();
        assert_eq!(fix, LedgerContent::Fix { balance: 70 });
    }

    #[test]
    fn memo_is_omitted_when_absent() {
        let json = LedgerContent::Send {
            amount: 1,
            memo: None,
        }
        .to_json();
        assert!(!json.contains("memo"));
        assert!(json.contains(r#""type":"send""#));
    }

    #[test]
    fn rejects_non_integer_balances() {
        for body in [
            r#"{"type":"fix","balance":-5}"#,
            r#"{"type":"fix","balance":12.5}"#,
            r#"{"type":"fix","balance":"70"}"#,
            r#"{"type":"fix"}"#,
        ] {
            assert!(LedgerContent::from_json(body).is_err(), "accepted {}", body);
        }
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(LedgerContent::from_json(r#"{"type":"burn","amount":1}"#).is_err());
        assert!(LedgerContent::from_json(r#"{"amount":1}"#).is_err());
        assert!(LedgerContent::from_json("not json").is_err());
    }
}
