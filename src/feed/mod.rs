pub mod twitter_list;
pub mod types;

use crate::error::SourceError;
use async_trait::async_trait;
use types::{Cursor, Item};

/// A polled source of items. Calls must be idempotent so a failed fetch can
/// simply be repeated.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Latest items after `since`, in any order.
    async fn list_items(&mut self, since: &Cursor) -> Result<Vec<Item>, SourceError>;

    /// Short label for logs.
    fn name(&self) -> String;
}
