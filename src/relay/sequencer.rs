use crate::feed::types::{Cursor, Item};
use std::collections::HashSet;

/// Filter a raw batch against the cursor and put it in delivery order.
///
/// Drops everything at or before the cursor, keeps the first occurrence of
/// each id, and sorts by `(created_at, id)`. The source's `created_at` is
/// taken as-is.
pub fn sequence(batch: Vec<Item>, cursor: &Cursor) -> Vec<Item> {
    let mut seen = HashSet::new();
    let mut fresh: Vec<Item> = batch
        .into_iter()
        .filter(|item| cursor.is_before(item))
        .filter(|item| seen.insert(item.id.clone()))
        .collect();
    fresh.sort_by(|a, b| a.position().cmp(&b.position()));
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::item;

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_empty_batch() {
        assert!(sequence(Vec::new(), &Cursor::default()).is_empty());
    }

    #[test]
    fn test_sorts_by_creation_then_id() {
        let batch = vec![item("2", 10), item("1", 5), item("4", 7), item("3", 7)];
        let out = sequence(batch, &Cursor::default());
        assert_eq!(ids(&out), vec!["1", "3", "4", "2"]);
    }

    #[test]
    fn test_drops_items_at_or_before_cursor() {
        let cursor = Cursor::at(&item("2", 10));
        let batch = vec![item("2", 10), item("3", 11), item("1", 10), item("0", 4)];
        let out = sequence(batch, &cursor);
        assert_eq!(ids(&out), vec!["3"]);
    }

    #[test]
    fn test_same_timestamp_newer_id_survives() {
        let cursor = Cursor::at(&item("2", 10));
        let out = sequence(vec![item("5", 10)], &cursor);
        assert_eq!(ids(&out), vec!["5"]);
    }

    #[test]
    fn test_duplicate_ids_collapse() {
        let batch = vec![item("7", 3), item("7", 3), item("8", 4), item("7", 3)];
        let out = sequence(batch, &Cursor::default());
        assert_eq!(ids(&out), vec!["7", "8"]);
    }

    #[test]
    fn test_mixed_ids_resequence_to_nothing() {
        let batch = vec![item("10", 5), item("9", 5), item("1a", 5)];
        let out = sequence(batch.clone(), &Cursor::default());
        assert_eq!(ids(&out), vec!["9", "10", "1a"]);
        let after = Cursor::at(out.last().unwrap());
        assert!(sequence(batch, &after).is_empty());
    }

    #[test]
    fn test_resequencing_after_delivery_is_empty() {
        let batch = vec![item("9", 1), item("11", 2), item("10", 2)];
        let out = sequence(batch.clone(), &Cursor::default());
        let last = out.last().unwrap();
        let after = Cursor::at(last);
        assert!(sequence(batch, &after).is_empty());
    }

    #[test]
    fn test_output_never_precedes_cursor() {
        let cursor = Cursor::at(&item("50", 100));
        let batch: Vec<Item> = (0..200)
            .map(|n| item(&(n % 120).to_string(), (n % 7) as i64 * 30))
            .collect();
        let out = sequence(batch, &cursor);
        let mut unique = HashSet::new();
        for i in &out {
            assert!(cursor.is_before(i));
            assert!(i.created_at >= cursor.last_seen_at.unwrap());
            assert!(unique.insert(i.id.clone()), "duplicate id {}", i.id);
        }
        assert!(out.windows(2).all(|w| w[0].position() <= w[1].position()));
    }
}
