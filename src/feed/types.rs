use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Opaque item identifier. Pure-digit ids (tweet ids) compare numerically
/// and sort before every other id; the rest compare as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_numeric(), other.is_numeric()) {
            (true, true) => {
                let a = self.0.trim_start_matches('0');
                let b = other.0.trim_start_matches('0');
                a.len().cmp(&b.len()).then_with(|| a.cmp(b)).then_with(|| self.0.cmp(&other.0))
            }
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub retweet: bool,
}

impl Item {
    /// Sort key: creation time, then id as tiebreak.
    pub fn position(&self) -> (DateTime<Utc>, &ItemId) {
        (self.created_at, &self.id)
    }
}

/// Last successfully processed position for one route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(default)]
    pub last_seen_id: Option<ItemId>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Cursor {
    pub fn at(item: &Item) -> Self {
        Self {
            last_seen_id: Some(item.id.clone()),
            last_seen_at: Some(item.created_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen_at.is_none() && self.last_seen_id.is_none()
    }

    /// True when `item` sorts strictly after this cursor.
    pub fn is_before(&self, item: &Item) -> bool {
        match self.last_seen_at {
            None => true,
            Some(at) => match item.created_at.cmp(&at) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => self
                    .last_seen_id
                    .as_ref()
                    .is_none_or(|id| &item.id > id),
            },
        }
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        // None sorts first for both fields.
        self.last_seen_at
            .cmp(&other.last_seen_at)
            .then_with(|| self.last_seen_id.cmp(&other.last_seen_id))
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
pub(crate) fn item(id: &str, secs: i64) -> Item {
    Item {
        id: ItemId::new(id),
        author: "newsdesk".to_string(),
        created_at: DateTime::from_timestamp(secs, 0).unwrap(),
        text: format!("tweet {}", id),
        retweet: false,
    }
}
