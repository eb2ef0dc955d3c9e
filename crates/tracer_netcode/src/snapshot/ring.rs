//! Fixed-capacity ring indexed by `tick % capacity`.
//!
//! The ring only ever holds the `capacity` most recent ticks. Writing a
//! newer tick evicts whatever older tick shared its slot, and clears the
//! slots of any ticks that were skipped, so a lookup can never return a
//! value from outside the window.

/// One occupied slot.
#[derive(Clone, Debug)]
struct Slot<T> {
    tick: u32,
    value: T,
}

/// Tick-indexed ring buffer with FIFO eviction.
#[derive(Clone, Debug)]
pub struct TickRing<T> {
    slots: Vec<Option<Slot<T>>>,
    newest: Option<u32>,
    len: usize,
}

impl<T> TickRing<T> {
    /// Creates an empty ring. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            newest: None,
            len: 0,
        }
    }

    /// Maximum number of ticks held.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of ticks held. Never exceeds [`Self::capacity`].
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is stored.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Newest tick written.
    #[inline]
    #[must_use]
    pub const fn newest_tick(&self) -> Option<u32> {
        self.newest
    }

    /// Oldest tick still held.
    #[must_use]
    pub fn oldest_tick(&self) -> Option<u32> {
        self.slots.iter().flatten().map(|slot| slot.tick).min()
    }

    #[inline]
    fn index(&self, tick: u32) -> usize {
        tick as usize % self.slots.len()
    }

    /// Returns true if `tick` is inside the window ending at the newest tick.
    fn in_window(&self, tick: u32) -> bool {
        match self.newest {
            None => true,
            Some(newest) => tick <= newest && u64::from(tick) + self.slots.len() as u64 > u64::from(newest),
        }
    }

    /// Stores `value` for `tick`.
    ///
    /// Returns false (and drops the value) if `tick` is already older than
    /// the window.
    pub fn insert(&mut self, tick: u32, value: T) -> bool {
        if let Some(newest) = self.newest {
            if tick > newest {
                let gap = (tick - newest) as usize;
                if gap >= self.slots.len() {
                    self.clear();
                } else {
                    for skipped in newest + 1..tick {
                        let idx = self.index(skipped);
                        if self.slots[idx].take().is_some() {
                            self.len -= 1;
                        }
                    }
                }
                self.newest = Some(tick);
            } else if !self.in_window(tick) {
                return false;
            }
        } else {
            self.newest = Some(tick);
        }

        let idx = self.index(tick);
        let slot = &mut self.slots[idx];
        if slot.is_none() {
            self.len += 1;
        }
        *slot = Some(Slot { tick, value });
        true
    }

    /// Value stored for exactly `tick`.
    #[must_use]
    pub fn get(&self, tick: u32) -> Option<&T> {
        if !self.in_window(tick) {
            return None;
        }
        match &self.slots[self.index(tick)] {
            Some(slot) if slot.tick == tick => Some(&slot.value),
            _ => None,
        }
    }

    /// Mutable access to the value stored for exactly `tick`.
    pub fn get_mut(&mut self, tick: u32) -> Option<&mut T> {
        if !self.in_window(tick) {
            return None;
        }
        let idx = self.index(tick);
        match &mut self.slots[idx] {
            Some(slot) if slot.tick == tick => Some(&mut slot.value),
            _ => None,
        }
    }

    /// Value stored for the newest tick.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.newest.and_then(|tick| self.get(tick))
    }

    /// Drops every entry older than `tick`.
    pub fn remove_before(&mut self, tick: u32) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|s| s.tick < tick) {
                *slot = None;
                self.len -= 1;
            }
        }
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.len = 0;
    }

    /// Entries in ascending tick order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        let newest = self.newest.unwrap_or(0);
        let span = if self.newest.is_some() { self.slots.len() as u32 } else { 0 };
        (0..span)
            .rev()
            .filter_map(move |offset| newest.checked_sub(offset))
            .filter_map(move |tick| self.get(tick).map(|value| (tick, value)))
    }

    /// Entries with a tick strictly after `tick`, ascending.
    pub fn iter_after(&self, tick: u32) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.iter().filter(move |(t, _)| *t > tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut ring = TickRing::new(4);
        for tick in 0..100 {
            ring.insert(tick, tick * 10);
            assert!(ring.len() <= 4);
        }
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.oldest_tick(), Some(96));
        assert_eq!(ring.latest(), Some(&990));
    }

    #[test]
    fn test_evicted_tick_is_gone() {
        let mut ring = TickRing::new(4);
        for tick in 1..=5 {
            ring.insert(tick, tick);
        }
        assert!(ring.get(1).is_none());
        assert_eq!(ring.get(2), Some(&2));
        assert_eq!(ring.get(5), Some(&5));
    }

    #[test]
    fn test_gap_clears_skipped_slots() {
        let mut ring = TickRing::new(4);
        for tick in 0..4 {
            ring.insert(tick, tick);
        }
        // Jump ahead by two: ticks 4 and 5 occupy slots of 0 and 1,
        // tick 4 was skipped so slot 0 must not keep tick 0.
        ring.insert(5, 5);
        assert!(ring.get(0).is_none());
        assert!(ring.get(1).is_none());
        assert_eq!(ring.get(2), Some(&2));
        assert_eq!(ring.len(), 3);

        ring.insert(100, 100);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.oldest_tick(), Some(100));
    }

    #[test]
    fn test_rejects_ticks_older_than_window() {
        let mut ring = TickRing::new(4);
        ring.insert(10, 10);
        assert!(!ring.insert(6, 6));
        assert!(ring.insert(7, 7));
        assert_eq!(ring.get(7), Some(&7));
        assert_eq!(ring.latest(), Some(&10));
    }

    #[test]
    fn test_iteration_is_ascending() {
        let mut ring = TickRing::new(8);
        for tick in [3, 4, 6, 7] {
            ring.insert(tick, ());
        }
        let ticks: Vec<u32> = ring.iter().map(|(t, _)| t).collect();
        assert_eq!(ticks, vec![3, 4, 6, 7]);

        let after: Vec<u32> = ring.iter_after(4).map(|(t, _)| t).collect();
        assert_eq!(after, vec![6, 7]);
    }

    #[test]
    fn test_remove_before() {
        let mut ring = TickRing::new(8);
        for tick in 0..8 {
            ring.insert(tick, tick);
        }
        ring.remove_before(5);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.oldest_tick(), Some(5));
    }
}
