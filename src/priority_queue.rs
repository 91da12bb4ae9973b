// Lazily sorted ranking queue. Elements are kept ascending by metric so the
// best one sits at the tail and can be popped without shifting.

use crate::error::{PlacementError, Result};

/// Anything that can be ranked; larger metrics are better.
pub trait Ranked {
    fn metric(&self) -> f64;
}

impl Ranked for f64 {
    fn metric(&self) -> f64 {
        *self
    }
}

impl<T: Ranked> Ranked for (T, usize) {
    fn metric(&self) -> f64 {
        self.0.metric()
    }
}

const MIN_GROWTH: usize = 8;

#[derive(Debug)]
pub struct PriorityQueue<T> {
    items: Vec<T>,
    sorted: bool,
}

impl<T: Ranked> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            sorted: true,
        }
    }
}

impl<T: Ranked> PriorityQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut items = Vec::new();
        items
            .try_reserve_exact(capacity)
            .map_err(PlacementError::exhausted("priority queue"))?;
        Ok(Self { items, sorted: true })
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Makes room for `additional` more elements, at least doubling.
    fn grow_for(&mut self, additional: usize) -> Result<()> {
        let needed = self.items.len() + additional;
        if needed <= self.items.capacity() {
            return Ok(());
        }
        let target = needed.max(self.items.capacity() * 2).max(MIN_GROWTH);
        self.items
            .try_reserve_exact(target - self.items.len())
            .map_err(PlacementError::exhausted("priority queue"))
    }

    pub fn enqueue(&mut self, item: T) -> Result<()> {
        self.grow_for(1)?;
        self.items.push(item);
        self.sorted = false;
        Ok(())
    }

    /// Moves every element out of `source`, leaving it empty. On allocation
    /// failure both containers are unchanged.
    pub fn absorb_all_elements(&mut self, source: &mut Vec<T>) -> Result<()> {
        if source.is_empty() {
            return Ok(());
        }
        self.grow_for(source.len())?;
        self.items.append(source);
        self.sorted = false;
        Ok(())
    }

    fn ensure_sorted(&mut self) {
        if !self.sorted {
            self.items.sort_by(|a, b| a.metric().total_cmp(&b.metric()));
            self.sorted = true;
        }
    }

    pub fn dequeue_best_element(&mut self) -> Option<T> {
        self.ensure_sorted();
        self.items.pop()
    }

    /// The `n`th best element (0 is best) without removing it.
    pub fn get_nth_element(&mut self, n: usize) -> Option<&T> {
        self.ensure_sorted();
        let index = self.items.len().checked_sub(n + 1)?;
        self.items.get(index)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.sorted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeues_best_first() {
        let mut queue = PriorityQueue::new();
        for metric in [3.0, 1.0, 4.0, 1.5] {
            queue.enqueue(metric).expect("enqueue");
        }
        let order: Vec<f64> = std::iter::from_fn(|| queue.dequeue_best_element()).collect();
        assert_eq!(order, vec![4.0, 3.0, 1.5, 1.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn nth_element_peeks_without_removing() {
        let mut queue = PriorityQueue::new();
        for metric in [2.0, 9.0, 5.0] {
            queue.enqueue(metric).expect("enqueue");
        }
        assert_eq!(queue.get_nth_element(0), Some(&9.0));
        assert_eq!(queue.get_nth_element(2), Some(&2.0));
        assert_eq!(queue.get_nth_element(3), None);
        assert_eq!(queue.count(), 3);
        assert_eq!(queue.dequeue_best_element(), Some(9.0));
    }

    #[test]
    fn absorb_empties_source() {
        let mut queue = PriorityQueue::with_capacity(1).expect("queue");
        let mut source = vec![1.0, 5.0, 2.0, 4.0, 3.0];
        queue.absorb_all_elements(&mut source).expect("absorb");
        assert!(source.is_empty());
        assert_eq!(queue.count(), 5);
        assert_eq!(queue.dequeue_best_element(), Some(5.0));
    }

    #[test]
    fn growth_at_least_doubles() {
        let mut queue = PriorityQueue::with_capacity(8).expect("queue");
        for i in 0..9 {
            queue.enqueue(f64::from(i)).expect("enqueue");
        }
        assert!(queue.capacity() >= 16);
    }

    #[test]
    fn enqueue_after_partial_drain_resorts() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(1.0).expect("enqueue");
        queue.enqueue(3.0).expect("enqueue");
        assert_eq!(queue.dequeue_best_element(), Some(3.0));
        queue.enqueue(2.0).expect("enqueue");
        assert_eq!(queue.dequeue_best_element(), Some(2.0));
        assert_eq!(queue.dequeue_best_element(), Some(1.0));
    }

    #[test]
    fn capacity_overflow_is_reported() {
        let err = PriorityQueue::<f64>::with_capacity(usize::MAX).unwrap_err();
        assert!(matches!(err, PlacementError::ResourceExhaustion { .. }));
    }
}
