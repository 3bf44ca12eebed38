//! Specialized collection types

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Stable handle to an entry in a [`PriorityList`]
    pub struct PriorityKey;
}

#[derive(Debug)]
struct PriorityEntry<T> {
    value: T,
    prev: Option<PriorityKey>,
    next: Option<PriorityKey>,
}

/// Recency-ordered list with O(1) promotion and removal
///
/// The front holds the most recently used entry, the back the least
/// recently used. Entries are addressed by the [`PriorityKey`] returned from
/// [`PriorityList::push_front`], which stays valid until the entry is removed.
#[derive(Debug)]
pub struct PriorityList<T> {
    entries: SlotMap<PriorityKey, PriorityEntry<T>>,
    head: Option<PriorityKey>,
    tail: Option<PriorityKey>,
}

impl<T> PriorityList<T> {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            head: None,
            tail: None,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a value as the most recently used entry
    pub fn push_front(&mut self, value: T) -> PriorityKey {
        let key = self.entries.insert(PriorityEntry {
            value,
            prev: None,
            next: self.head,
        });
        self.link_front(key);
        key
    }

    /// Promote an entry to most recently used. Returns false for stale keys.
    pub fn move_to_front(&mut self, key: PriorityKey) -> bool {
        if !self.entries.contains_key(key) {
            return false;
        }
        if self.head == Some(key) {
            return true;
        }
        self.unlink(key);
        if let Some(entry) = self.entries.get_mut(key) {
            entry.prev = None;
            entry.next = self.head;
        }
        self.link_front(key);
        true
    }

    /// Remove an entry and return its value
    pub fn remove(&mut self, key: PriorityKey) -> Option<T> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.unlink(key);
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Borrow the value behind a key
    pub fn get(&self, key: PriorityKey) -> Option<&T> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Key of the least recently used entry
    pub fn back(&self) -> Option<PriorityKey> {
        self.tail
    }

    /// Key of the most recently used entry
    pub fn front(&self) -> Option<PriorityKey> {
        self.head
    }

    /// Key of the entry one step closer to the front
    pub fn prev(&self, key: PriorityKey) -> Option<PriorityKey> {
        self.entries.get(key).and_then(|entry| entry.prev)
    }

    /// Iterate from least to most recently used
    pub fn iter_lru(&self) -> impl Iterator<Item = (PriorityKey, &T)> + '_ {
        let mut cursor = self.tail;
        std::iter::from_fn(move || {
            let key = cursor?;
            let entry = self.entries.get(key)?;
            cursor = entry.prev;
            Some((key, &entry.value))
        })
    }

    /// Iterate from most to least recently used
    pub fn iter_mru(&self) -> impl Iterator<Item = (PriorityKey, &T)> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let key = cursor?;
            let entry = self.entries.get(key)?;
            cursor = entry.next;
            Some((key, &entry.value))
        })
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.head = None;
        self.tail = None;
    }

    fn link_front(&mut self, key: PriorityKey) {
        if let Some(old_head) = self.head {
            if let Some(entry) = self.entries.get_mut(old_head) {
                entry.prev = Some(key);
            }
        }
        self.head = Some(key);
        if self.tail.is_none() {
            self.tail = Some(key);
        }
    }

    fn unlink(&mut self, key: PriorityKey) {
        let Some((prev, next)) = self.entries.get(key).map(|e| (e.prev, e.next)) else {
            return;
        };
        match prev {
            Some(prev_key) => {
                if let Some(entry) = self.entries.get_mut(prev_key) {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next_key) => {
                if let Some(entry) = self.entries.get_mut(next_key) {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }
}

impl<T> Default for PriorityList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lru_order(list: &PriorityList<&'static str>) -> Vec<&'static str> {
        list.iter_lru().map(|(_, v)| *v).collect()
    }

    #[test]
    fn test_push_front_orders_by_recency() {
        let mut list = PriorityList::new();
        list.push_front("a");
        list.push_front("b");
        list.push_front("c");
        assert_eq!(lru_order(&list), vec!["a", "b", "c"]);
        assert_eq!(list.iter_mru().map(|(_, v)| *v).collect::<Vec<_>>(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_move_to_front_promotes_entry() {
        let mut list = PriorityList::new();
        let a = list.push_front("a");
        list.push_front("b");
        list.push_front("c");

        assert!(list.move_to_front(a));
        assert_eq!(lru_order(&list), vec!["b", "c", "a"]);
        assert_eq!(list.front(), Some(a));
    }

    #[test]
    fn test_remove_relinks_neighbours() {
        let mut list = PriorityList::new();
        let a = list.push_front("a");
        let b = list.push_front("b");
        let c = list.push_front("c");

        assert_eq!(list.remove(b), Some("b"));
        assert_eq!(lru_order(&list), vec!["a", "c"]);
        assert_eq!(list.remove(a), Some("a"));
        assert_eq!(list.back(), Some(c));
        assert_eq!(list.remove(c), Some("c"));
        assert!(list.is_empty());
        assert_eq!(list.front(), None);
        assert_eq!(list.back(), None);
    }

    #[test]
    fn test_stale_key_is_ignored() {
        let mut list = PriorityList::new();
        let a = list.push_front("a");
        list.remove(a);
        assert!(!list.move_to_front(a));
        assert_eq!(list.remove(a), None);
    }
}
