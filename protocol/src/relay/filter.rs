//! NIP-01 subscription filters.
//!
//! Serialized as-is into `REQ` messages, and evaluated locally by
//! [`Filter::matches`] so the gateway can drop anything a misbehaving relay
//! returns that we never asked for.

use serde::{Deserialize, Serialize};

use crate::config::{TAG_EVENT, TAG_PUBKEY};
use crate::event::{Event, EventKind};
use crate::identity::PublicKey;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,

    #[serde(rename = "#p", default, skip_serializing_if = "Option::is_none")]
    pub p_tags: Option<Vec<String>>,

    #[serde(rename = "#e", default, skip_serializing_if = "Option::is_none")]
    pub e_tags: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind.as_u32());
        self
    }

    pub fn author(mut self, author: &PublicKey) -> Self {
        self.authors
            .get_or_insert_with(Vec::new)
            .push(author.to_hex());
        self
    }

    /// Events tagged with `["p", <account>]`.
    pub fn addressed_to(mut self, account: &PublicKey) -> Self {
        self.p_tags.get_or_insert_with(Vec::new).push(account.to_hex());
        self
    }

    /// Events tagged with `["e", <id>]`.
    pub fn referencing(mut self, event_id: &str) -> Self {
        self.e_tags
            .get_or_insert_with(Vec::new)
            .push(event_id.to_string());
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Does `event` satisfy every condition? `limit` is a result-set bound,
    /// not a property of an individual event, so it is ignored here.
    pub fn matches(&self, event: &Event) -> bool {
        fn contains(list: &Option<Vec<String>>, value: &str) -> bool {
            list.as_ref().map_or(true, |l| l.iter().any(|v| v == value))
        }
        fn tag_matches(list: &Option<Vec<String>>, event: &Event, key: &str) -> bool {
            list.as_ref()
                .map_or(true, |l| event.tag_values(key).any(|v| l.iter().any(|x| x == v)))
        }

        contains(&self.ids, &event.id)
            && contains(&self.authors, &event.pubkey)
            && self.kinds.as_ref().map_or(true, |k| k.contains(&event.kind))
            && tag_matches(&self.p_tags, event, TAG_PUBKEY)
            && tag_matches(&self.e_tags, event, TAG_EVENT)
            && self.since.map_or(true, |s| event.created_at >= s)
            && self.until.map_or(true, |u| event.created_at <= u)
    }
}
