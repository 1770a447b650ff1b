//! Slot table of live connections

/// Slots reused lowest-first; a slot index stays valid until removed.
///
/// The table grows to the peak number of live connections and never shrinks.
#[derive(Debug)]
pub struct ConnectionTable<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for ConnectionTable<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> ConnectionTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` in the lowest vacant slot, growing the table if full
    pub fn insert(&mut self, value: T) -> usize {
        match self.slots.iter().position(Option::is_none) {
            Some(slot) => {
                self.slots[slot] = Some(value);
                slot
            }
            None => {
                self.slots.push(Some(value));
                self.slots.len() - 1
            }
        }
    }

    /// Vacate `slot`; its storage stays allocated for the next insert
    pub fn remove(&mut self, slot: usize) -> Option<T> {
        self.slots.get_mut(slot)?.take()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Occupied slots in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, value)| value.as_ref().map(|v| (slot, v)))
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_lowest_vacant_slot() {
        let mut table = ConnectionTable::new();
        assert_eq!(table.insert("a"), 0);
        assert_eq!(table.insert("b"), 1);
        assert_eq!(table.insert("c"), 2);

        assert_eq!(table.remove(0), Some("a"));
        assert_eq!(table.remove(1), Some("b"));
        assert_eq!(table.insert("d"), 0);
        assert_eq!(table.insert("e"), 1);
        assert_eq!(table.insert("f"), 3);
    }

    #[test]
    fn test_iter_skips_vacancies() {
        let mut table = ConnectionTable::new();
        for v in 0..4 {
            table.insert(v);
        }
        table.remove(1);
        table.remove(3);
        let live: Vec<_> = table.iter().map(|(slot, v)| (slot, *v)).collect();
        assert_eq!(live, vec![(0, 0), (2, 2)]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_never_shrinks() {
        let mut table = ConnectionTable::new();
        table.insert("a");
        table.insert("b");

        assert_eq!(table.remove(1), Some("b"));
        assert_eq!(table.slots.len(), 2);
        assert_eq!(table.remove(0), Some("a"));
        assert_eq!(table.slots.len(), 2);

        assert_eq!(table.insert("c"), 0);
        assert_eq!(table.insert("d"), 1);
        assert_eq!(table.slots.len(), 2);
    }

    #[test]
    fn test_remove_vacant_or_out_of_range() {
        let mut table: ConnectionTable<u8> = ConnectionTable::new();
        assert_eq!(table.remove(5), None);
        table.insert(1);
        assert_eq!(table.remove(0), Some(1));
        assert_eq!(table.remove(0), None);
        assert_eq!(table.len(), 0);
        assert!(table.get_mut(0).is_none());
    }
}
