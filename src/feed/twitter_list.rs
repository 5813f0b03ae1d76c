use super::types::*;
use super::ItemSource;
use crate::error::SourceError;
use crate::twitter::rest::{TwitterRest, MAX_PAGE_SIZE};
use crate::twitter::types::Status;
use async_trait::async_trait;
use std::sync::Arc;

/// Timeline of one Twitter list.
pub struct TwitterListFeed {
    rest: Arc<TwitterRest>,
    list_id: String,
    backfill_count: u32,
}

impl TwitterListFeed {
    pub fn new(rest: Arc<TwitterRest>, list_id: &str, backfill_count: u32) -> Self {
        Self {
            rest,
            list_id: list_id.to_string(),
            backfill_count,
        }
    }
}

/// Convert an API status into an item. Statuses with an unparseable
/// timestamp are dropped (they could never be ordered).
fn to_item(status: Status) -> Option<Item> {
    let Some(created_at) = status.created_at_utc() else {
        tracing::warn!(id = %status.id_str, created_at = %status.created_at, "dropping status with unparseable timestamp");
        return None;
    };
    Some(Item {
        id: ItemId::new(status.id_str.clone()),
        author: status.user.screen_name.clone(),
        created_at,
        text: status.body().to_string(),
        retweet: status.retweeted_status.is_some(),
    })
}

/// `since_id` and `count` for a timeline request. First run: backfill the
/// most recent statuses. After that, a full page newer than the cursor.
fn request_window(since: &Cursor, backfill_count: u32) -> (Option<&str>, u32) {
    match since.last_seen_id.as_ref() {
        Some(id) => (Some(id.as_str()), MAX_PAGE_SIZE),
        None => (None, backfill_count),
    }
}

#[async_trait]
impl ItemSource for TwitterListFeed {
    async fn list_items(&mut self, since: &Cursor) -> Result<Vec<Item>, SourceError> {
        let (since_id, count) = request_window(since, self.backfill_count);
        let statuses = self.rest.list_statuses(&self.list_id, since_id, count).await?;
        tracing::debug!(list_id = %self.list_id, fetched = statuses.len(), "list timeline fetched");
        Ok(statuses.into_iter().filter_map(to_item).collect())
    }

    fn name(&self) -> String {
        format!("twitter-list:{}", self.list_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(json: &str) -> Status {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_to_item_maps_fields() {
        let s = status(
            r#"{"id_str":"55","created_at":"Wed Oct 10 20:19:24 +0000 2018","full_text":"hello",
                "user":{"screen_name":"newsdesk"},"retweeted_status":{"id_str":"1"}}"#,
        );
        let item = to_item(s).unwrap();
        assert_eq!(item.id, ItemId::new("55"));
        assert_eq!(item.author, "newsdesk");
        assert_eq!(item.text, "hello");
        assert!(item.retweet);
    }

    #[test]
    fn test_to_item_drops_bad_timestamp() {
        let s = status(r#"{"id_str":"55","created_at":"garbage","user":{"screen_name":"x"}}"#);
        assert!(to_item(s).is_none());
    }

    #[test]
    fn test_first_run_requests_backfill() {
        assert_eq!(request_window(&Cursor::default(), 100), (None, 100));
    }

    #[test]
    fn test_known_cursor_requests_newer_page() {
        let cursor = Cursor {
            last_seen_id: Some(ItemId::new("1050118621198921728")),
            last_seen_at: None,
        };
        assert_eq!(
            request_window(&cursor, 100),
            (Some("1050118621198921728"), 200)
        );
    }
}
