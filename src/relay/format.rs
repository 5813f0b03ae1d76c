use crate::feed::types::{Cursor, Item, ItemId};
use chrono::{DateTime, Utc};

const DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";
const URL_PREFIX: &str = "URL: ";
const DATE_PREFIX: &str = "Date: ";

/// Renders an item as the chat message posted to the sink. Discord unfurls
/// the status URL, so the text itself is optional.
#[derive(Debug, Clone, Default)]
pub struct MessageFormat {
    pub include_text: bool,
}

impl MessageFormat {
    pub fn new(include_text: bool) -> Self {
        Self { include_text }
    }

    pub fn render(&self, item: &Item) -> String {
        let mut out = format!(
            "{}https://twitter.com/{}/status/{}\n{}{}",
            URL_PREFIX,
            item.author,
            item.id,
            DATE_PREFIX,
            item.created_at.format(DATE_FORMAT),
        );
        if item.retweet {
            out.push_str("\n<Retweet>");
        }
        if self.include_text && !item.text.is_empty() {
            out.push_str("\n\n");
            out.push_str(&item.text);
        }
        out
    }
}

/// Recover the position encoded in a message produced by `render`: the
/// status id at the end of the `URL:` line and the `Date:` line after it.
/// Anything else (a message somebody typed by hand) yields `None`.
pub fn parse_cursor(message: &str) -> Option<Cursor> {
    let mut lines = message.lines();
    let url = lines.next()?.trim_end().strip_prefix(URL_PREFIX)?;
    let (_, id) = url.rsplit_once("/status/")?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let date = lines.next()?.trim_end().strip_prefix(DATE_PREFIX)?;
    let at = DateTime::parse_from_str(date, DATE_FORMAT).ok()?;
    Some(Cursor {
        last_seen_id: Some(ItemId::new(id)),
        last_seen_at: Some(at.with_timezone(&Utc)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::item;

    #[test]
    fn test_render_plain() {
        let it = item("1050118621198921728", 1_539_202_764);
        assert_eq!(
            MessageFormat::default().render(&it),
            "URL: https://twitter.com/newsdesk/status/1050118621198921728\n\
             Date: Wed Oct 10 20:19:24 +0000 2018"
        );
    }

    #[test]
    fn test_render_retweet_with_text() {
        let mut it = item("5", 0);
        it.retweet = true;
        let msg = MessageFormat::new(true).render(&it);
        assert!(msg.ends_with("\n<Retweet>\n\ntweet 5"));
    }

    #[test]
    fn test_parse_cursor_from_rendered_message() {
        let mut it = item("1050118621198921728", 1_539_202_764);
        it.retweet = true;
        let msg = MessageFormat::new(true).render(&it);
        assert_eq!(parse_cursor(&msg), Some(Cursor::at(&it)));
    }

    #[test]
    fn test_parse_cursor_ignores_foreign_messages() {
        assert_eq!(parse_cursor(""), None);
        assert_eq!(parse_cursor("hello everyone"), None);
        assert_eq!(
            parse_cursor("URL: https://twitter.com/a/status/12x\nDate: Wed Oct 10 20:19:24 +0000 2018"),
            None
        );
        assert_eq!(parse_cursor("URL: https://twitter.com/a/status/12"), None);
        assert_eq!(parse_cursor("URL: https://twitter.com/a/status/12\nDate: yesterday"), None);
    }
}
