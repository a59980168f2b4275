//! Lexicographic match scoring.
//!
//! Signals are compared strictly in order, so a better earlier signal always
//! dominates: fewer typos always beat more, even against higher rank scores.

use crate::topk::TopK;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

/// Composite match score. Derived `Ord` is lexicographic; higher = better.
///
/// Field order (most to least important):
/// 1. typo_score: `u16::MAX - total edit distance`
/// 2. tokens_matched: query tokens the combination covered
/// 3. primary_rank: first rank field
/// 4. secondary_rank: second rank field
/// 5. seq_order: lower seq_id wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchScore {
    pub typo_score: u16,
    pub tokens_matched: u8,
    pub primary_rank: i64,
    pub secondary_rank: i64,
    pub seq_order: Reverse<u32>,
}

impl MatchScore {
    pub fn new(total_cost: u32, tokens_matched: usize, primary_rank: i64, secondary_rank: i64, seq_id: u32) -> Self {
        Self {
            typo_score: u16::MAX.saturating_sub(total_cost.min(u16::MAX as u32) as u16),
            tokens_matched: tokens_matched.min(u8::MAX as usize) as u8,
            primary_rank,
            secondary_rank,
            seq_order: Reverse(seq_id),
        }
    }

    pub fn total_cost(&self) -> u32 {
        (u16::MAX - self.typo_score) as u32
    }

    pub fn seq_id(&self) -> u32 {
        self.seq_order.0
    }
}

/// Precomputed rank signals, by seq_id.
#[derive(Debug, Clone, Default)]
pub struct RankScores {
    primary: HashMap<u32, i64>,
    secondary: HashMap<u32, i64>,
}

impl RankScores {
    pub fn insert(&mut self, seq_id: u32, primary: i64, secondary: i64) {
        self.primary.insert(seq_id, primary);
        self.secondary.insert(seq_id, secondary);
    }

    pub fn remove(&mut self, seq_id: u32) {
        self.primary.remove(&seq_id);
        self.secondary.remove(&seq_id);
    }

    pub fn primary(&self, seq_id: u32) -> i64 {
        self.primary.get(&seq_id).copied().unwrap_or(0)
    }

    pub fn secondary(&self, seq_id: u32) -> i64 {
        self.secondary.get(&seq_id).copied().unwrap_or(0)
    }

}

/// Scores candidate documents into a bounded Top-K.
pub(crate) struct Scorer<'a> {
    topk: TopK<MatchScore>,
    ranks: &'a RankScores,
    found: HashSet<u32>,
}

impl<'a> Scorer<'a> {
    pub fn new(capacity: usize, ranks: &'a RankScores) -> Self {
        Self {
            topk: TopK::new(capacity),
            ranks,
            found: HashSet::new(),
        }
    }

    /// Offer every document in `seq_ids` as matched by a combination of
    /// `tokens_matched` tokens at `total_cost`. Returns the distinct documents
    /// found so far.
    pub fn score(&mut self, seq_ids: &[u32], total_cost: u32, tokens_matched: usize) -> usize {
        for &seq_id in seq_ids {
            self.found.insert(seq_id);
            let score = MatchScore::new(
                total_cost,
                tokens_matched,
                self.ranks.primary(seq_id),
                self.ranks.secondary(seq_id),
                seq_id,
            );
            self.topk.offer(seq_id, score);
        }
        self.found.len()
    }

    pub fn num_found(&self) -> usize {
        self.found.len()
    }

    /// Best-first hits and the full set of matched documents.
    pub fn finish(mut self) -> (Vec<(u32, MatchScore)>, HashSet<u32>) {
        (self.topk.drain(), self.found)
    }
}
