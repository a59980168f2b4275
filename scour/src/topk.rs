//! Bounded top-K selection over `(seq_id, score)` pairs.
//!
//! Backed by a min-heap with lazy invalidation: when an id's score improves a
//! fresh heap entry is pushed and the stale one is skipped once it surfaces.
//! The `live` map is the retained set and never grows past the capacity.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

#[derive(Debug, Clone, Copy)]
struct Entry<S> {
    score: S,
    /// Insertion order of the id; smaller means offered earlier.
    order: u64,
    id: u32,
}

impl<S: Ord> PartialEq for Entry<S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<S: Ord> Eq for Entry<S> {}

impl<S: Ord> PartialOrd for Entry<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: Ord> Ord for Entry<S> {
    /// Higher score is better; among equal scores the earlier insertion is better.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.order.cmp(&self.order))
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Fixed-capacity selector keeping the K best distinct ids.
#[derive(Debug, Clone)]
pub struct TopK<S> {
    capacity: usize,
    heap: BinaryHeap<Reverse<Entry<S>>>,
    live: HashMap<u32, (S, u64)>,
    next_order: u64,
}

impl<S: Ord + Copy> TopK<S> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity + 1),
            live: HashMap::with_capacity(capacity),
            next_order: 0,
        }
    }

    /// Number of retained ids.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    #[cfg(test)]
    fn contains(&self, id: u32) -> bool {
        self.live.contains_key(&id)
    }

    #[cfg(test)]
    fn score_of(&self, id: u32) -> Option<S> {
        self.live.get(&id).map(|&(score, _)| score)
    }

    /// Offer a scored id. Returns true when the retained set changed.
    ///
    /// An id already present keeps its best score. When full, the lowest entry
    /// is evicted only if the newcomer ranks strictly above it.
    pub fn offer(&mut self, id: u32, score: S) -> bool {
        if self.capacity == 0 {
            return false;
        }

        if let Some(&(current, order)) = self.live.get(&id) {
            if score <= current {
                return false;
            }
            self.live.insert(id, (score, order));
            self.heap.push(Reverse(Entry { score, order, id }));
            self.compact_if_bloated();
            return true;
        }

        let candidate = Entry {
            score,
            order: self.next_order,
            id,
        };

        if self.live.len() >= self.capacity {
            match self.peek_min() {
                Some(min) if candidate > min => {
                    self.heap.pop();
                    self.live.remove(&min.id);
                }
                _ => return false,
            }
        }

        self.next_order += 1;
        self.live.insert(id, (score, candidate.order));
        self.heap.push(Reverse(candidate));
        true
    }

    /// Retained entries, best first.
    pub fn sorted_desc(&self) -> Vec<(u32, S)> {
        let mut entries = self.live_entries();
        entries.sort_unstable_by(|a, b| b.cmp(a));
        entries.into_iter().map(|e| (e.id, e.score)).collect()
    }

    /// Retained entries, worst first.
    pub fn sorted_asc(&self) -> Vec<(u32, S)> {
        let mut entries = self.live_entries();
        entries.sort_unstable();
        entries.into_iter().map(|e| (e.id, e.score)).collect()
    }

    /// Empty the selector, returning its entries best first.
    pub fn drain(&mut self) -> Vec<(u32, S)> {
        let sorted = self.sorted_desc();
        self.heap.clear();
        self.live.clear();
        sorted
    }

    fn live_entries(&self) -> Vec<Entry<S>> {
        self.live
            .iter()
            .map(|(&id, &(score, order))| Entry { score, order, id })
            .collect()
    }

    fn is_current(&self, entry: &Entry<S>) -> bool {
        matches!(self.live.get(&entry.id), Some(&(score, order)) if score == entry.score && order == entry.order)
    }

    /// Lowest live entry, discarding stale heap entries on the way.
    fn peek_min(&mut self) -> Option<Entry<S>> {
        while let Some(Reverse(top)) = self.heap.peek() {
            let top = *top;
            if self.is_current(&top) {
                return Some(top);
            }
            self.heap.pop();
        }
        None
    }

    fn compact_if_bloated(&mut self) {
        if self.heap.len() > self.capacity * 2 + 16 {
            let entries = self.live_entries();
            self.heap = entries.into_iter().map(Reverse).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_keeps_highest_scores() {
        let mut topk = TopK::new(3);
        for (id, score) in [(1, 10), (2, 50), (3, 20), (4, 40), (5, 30)] {
            topk.offer(id, score);
        }
        assert_eq!(topk.len(), 3);
        assert_eq!(topk.sorted_desc(), vec![(2, 50), (4, 40), (5, 30)]);
        assert_eq!(topk.sorted_asc(), vec![(5, 30), (4, 40), (2, 50)]);
    }

    #[test]
    fn test_equal_score_does_not_evict() {
        let mut topk = TopK::new(2);
        assert!(topk.offer(1, 5));
        assert!(topk.offer(2, 5));
        assert!(!topk.offer(3, 5), "a tie must not displace an earlier entry");
        assert_eq!(topk.sorted_desc(), vec![(1, 5), (2, 5)]);
    }

    #[test]
    fn test_ties_evict_latest_insertion_first() {
        let mut topk = TopK::new(2);
        topk.offer(1, 5);
        topk.offer(2, 5);
        assert!(topk.offer(3, 6));
        assert_eq!(topk.sorted_desc(), vec![(3, 6), (1, 5)]);
    }

    #[test]
    fn test_best_score_wins_per_id() {
        let mut topk = TopK::new(4);
        assert!(topk.offer(7, 10));
        assert!(!topk.offer(7, 3), "a worse score must not replace a better one");
        assert_eq!(topk.score_of(7), Some(10));
        assert!(topk.offer(7, 12));
        assert_eq!(topk.score_of(7), Some(12));
        assert_eq!(topk.len(), 1);
    }

    #[test]
    fn test_updated_entry_is_not_evicted_by_stale_heap_entry() {
        let mut topk = TopK::new(2);
        topk.offer(1, 1);
        topk.offer(2, 5);
        topk.offer(1, 9);
        // The stale (1, 1) entry must be skipped: the real minimum is (2, 5).
        assert!(topk.offer(3, 6));
        assert_eq!(topk.sorted_desc(), vec![(1, 9), (3, 6)]);
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut topk = TopK::new(0);
        assert!(!topk.offer(1, 100));
        assert!(topk.is_empty());
    }

    #[test]
    fn test_drain_empties() {
        let mut topk = TopK::new(3);
        topk.offer(1, 1);
        topk.offer(2, 2);
        assert_eq!(topk.drain(), vec![(2, 2), (1, 1)]);
        assert!(topk.is_empty());
        assert!(topk.offer(3, 0));
    }

    #[test]
    fn test_matches_naive_sort() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for round in 0..50 {
            let capacity = rng.gen_range(1..20);
            let offers = rng.gen_range(0..300);
            // Distinct scores keep the expected set unambiguous.
            let mut scores: Vec<u64> = (0..offers as u64).map(|s| s * 7 + round).collect();
            scores.shuffle(&mut rng);

            let mut topk = TopK::new(capacity);
            let mut best: HashMap<u32, u64> = HashMap::new();
            for score in scores {
                let id = rng.gen_range(0..60u32);
                topk.offer(id, score);
                let slot = best.entry(id).or_insert(score);
                *slot = (*slot).max(score);
                assert!(topk.len() <= capacity);
            }

            let mut expected: Vec<(u32, u64)> = best.into_iter().collect();
            expected.sort_unstable_by(|a, b| b.1.cmp(&a.1));
            expected.truncate(capacity);
            assert_eq!(topk.sorted_desc(), expected, "round {round}");
        }
    }
}
