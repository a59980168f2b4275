//! Candidate generation across query tokens.
//!
//! Every token brings its matching leaves grouped by edit-distance cost. The
//! combiner walks cost vectors (one cost per token) in ascending total cost,
//! and for each vector every way of picking one leaf per token. The documents
//! in all picked leaves' posting lists are the candidates for that pick.

use crate::art::Leaf;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A query token's matching leaves. `groups[c]` holds the leaves at cost `c`.
#[derive(Debug, Clone)]
pub(crate) struct TokenCandidates<'a> {
    pub token: String,
    pub groups: Vec<Vec<&'a Leaf>>,
}

impl<'a> TokenCandidates<'a> {
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(Vec::is_empty)
    }

    /// Costs with at least one leaf, ascending.
    fn costs(&self) -> Vec<u8> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, leaves)| !leaves.is_empty())
            .map(|(cost, _)| cost as u8)
            .collect()
    }
}

/// One leaf per token plus the documents they share.
pub(crate) struct Combination<'c, 'a> {
    pub leaves: &'c [&'a Leaf],
    pub costs: &'c [u8],
    pub seq_ids: &'c [u32],
}

impl Combination<'_, '_> {
    pub fn total_cost(&self) -> u32 {
        self.costs.iter().map(|&c| c as u32).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Termination {
    /// Every cost vector was explored.
    Exhausted,
    /// Enough documents were found before moving to a costlier level.
    Satisfied,
    /// The combination budget ran out.
    Ceiling,
}

/// Pending cost vector: (total cost, costs, index into each token's cost list,
/// first position allowed to advance).
type Pending = Reverse<(u32, Vec<u8>, Vec<usize>, usize)>;

pub(crate) struct CandidateCombiner<'t, 'a> {
    tokens: &'t [TokenCandidates<'a>],
    costs: Vec<Vec<u8>>,
    budget: usize,
    examined: usize,
}

impl<'t, 'a> CandidateCombiner<'t, 'a> {
    /// `tokens` must all be non-empty; `budget` caps examined combinations.
    pub fn new(tokens: &'t [TokenCandidates<'a>], budget: usize) -> Self {
        let costs = tokens.iter().map(TokenCandidates::costs).collect();
        Self {
            tokens,
            costs,
            budget,
            examined: 0,
        }
    }

    pub fn examined(&self) -> usize {
        self.examined
    }

    /// Feed combinations to `visit` in ascending cost order. `visit` returns
    /// how many distinct documents have been found so far; once that reaches
    /// `target` the walk ends at the next cost boundary.
    pub fn run<F>(&mut self, target: usize, mut visit: F) -> Termination
    where
        F: FnMut(&Combination<'_, 'a>) -> usize,
    {
        if self.tokens.is_empty() || self.costs.iter().any(Vec::is_empty) {
            return Termination::Exhausted;
        }

        let mut heap: BinaryHeap<Pending> = BinaryHeap::new();
        let start = vec![0usize; self.tokens.len()];
        let start_costs: Vec<u8> = self.costs.iter().map(|c| c[0]).collect();
        let start_total = start_costs.iter().map(|&c| c as u32).sum();
        heap.push(Reverse((start_total, start_costs, start, 0)));

        let mut found = 0;
        let mut level: Option<u32> = None;
        let mut leaves: Vec<&'a Leaf> = Vec::with_capacity(self.tokens.len());
        let mut scratch: Vec<u32> = Vec::new();

        while let Some(Reverse((total, costs, positions, first))) = heap.pop() {
            if level.is_some_and(|current| total > current) && found >= target {
                return Termination::Satisfied;
            }
            level = Some(total);

            for p in first..positions.len() {
                if positions[p] + 1 < self.costs[p].len() {
                    let mut next = positions.clone();
                    next[p] += 1;
                    let mut next_costs = costs.clone();
                    next_costs[p] = self.costs[p][next[p]];
                    let next_total = next_costs.iter().map(|&c| c as u32).sum();
                    heap.push(Reverse((next_total, next_costs, next, p)));
                }
            }

            let groups: Vec<&Vec<&'a Leaf>> = self
                .tokens
                .iter()
                .zip(&costs)
                .map(|(token, &cost)| &token.groups[cost as usize])
                .collect();
            let count = groups
                .iter()
                .try_fold(1usize, |acc, g| acc.checked_mul(g.len()))
                .unwrap_or(usize::MAX);

            for n in 0..count {
                if self.examined >= self.budget {
                    return Termination::Ceiling;
                }
                self.examined += 1;

                // Mixed radix: the first token varies fastest.
                leaves.clear();
                let mut rest = n;
                for group in &groups {
                    leaves.push(group[rest % group.len()]);
                    rest /= group.len();
                }

                intersect(&leaves, &mut scratch);
                if scratch.is_empty() {
                    continue;
                }
                found = visit(&Combination {
                    leaves: &leaves,
                    costs: &costs,
                    seq_ids: &scratch,
                });
            }
        }
        Termination::Exhausted
    }
}

/// Documents present in every leaf's posting list, ascending.
fn intersect(leaves: &[&Leaf], out: &mut Vec<u32>) {
    out.clear();
    let Some(smallest) = leaves.iter().min_by_key(|leaf| leaf.len()) else {
        return;
    };
    out.extend(
        smallest
            .ids()
            .iter()
            .copied()
            .filter(|&id| leaves.iter().all(|leaf| leaf.contains(id))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::art::ArtTree;

    /// Tree mapping each key to the given ids.
    fn tree(entries: &[(&str, &[u32])]) -> ArtTree {
        let mut tree = ArtTree::new();
        for (key, ids) in entries {
            for &id in *ids {
                tree.insert(key.as_bytes(), id, 0);
            }
        }
        tree
    }

    fn token<'a>(tree: &'a ArtTree, groups: &[&[&str]]) -> TokenCandidates<'a> {
        TokenCandidates {
            token: String::new(),
            groups: groups
                .iter()
                .map(|keys| keys.iter().filter_map(|k| tree.get(k.as_bytes())).collect())
                .collect(),
        }
    }

    #[test]
    fn test_cost_vectors_ascend_with_lexicographic_ties() {
        let t = tree(&[("a0", &[1]), ("a1", &[1]), ("a2", &[1]), ("b0", &[1]), ("b1", &[1]), ("b2", &[1])]);
        let tokens = vec![
            token(&t, &[&["a0"], &["a1"], &["a2"]]),
            token(&t, &[&["b0"], &["b1"], &["b2"]]),
        ];
        let mut seen = Vec::new();
        let mut combiner = CandidateCombiner::new(&tokens, 100);
        let stop = combiner.run(usize::MAX, |c| {
            seen.push(c.costs.to_vec());
            0
        });
        assert_eq!(stop, Termination::Exhausted);
        assert_eq!(
            seen,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![1, 0],
                vec![0, 2],
                vec![1, 1],
                vec![2, 0],
                vec![1, 2],
                vec![2, 1],
                vec![2, 2],
            ]
        );
        assert_eq!(combiner.examined(), 9);
    }

    #[test]
    fn test_skips_empty_cost_levels() {
        let t = tree(&[("x", &[1]), ("y", &[1])]);
        let tokens = vec![token(&t, &[&[], &[], &["x"]]), token(&t, &[&["y"]])];
        let mut seen = Vec::new();
        CandidateCombiner::new(&tokens, 10).run(10, |c| {
            seen.push((c.costs.to_vec(), c.total_cost()));
            1
        });
        assert_eq!(seen, vec![(vec![2, 0], 2)]);
    }

    #[test]
    fn test_mixed_radix_first_token_fastest() {
        let t = tree(&[("a", &[1]), ("b", &[1]), ("c", &[1]), ("d", &[1])]);
        let tokens = vec![token(&t, &[&["a", "b"]]), token(&t, &[&["c", "d"]])];
        let mut seen = Vec::new();
        CandidateCombiner::new(&tokens, 10).run(usize::MAX, |c| {
            let keys: Vec<String> = c.leaves.iter().map(|l| String::from_utf8_lossy(l.key()).into_owned()).collect();
            seen.push(keys.join(""));
            0
        });
        assert_eq!(seen, vec!["ac", "bc", "ad", "bd"]);
    }

    #[test]
    fn test_intersection_filters_documents() {
        let t = tree(&[("quick", &[1, 2, 3]), ("fox", &[2, 3, 4]), ("foxes", &[5])]);
        let tokens = vec![token(&t, &[&["quick"]]), token(&t, &[&["fox"], &["foxes"]])];
        let mut seen = Vec::new();
        CandidateCombiner::new(&tokens, 10).run(usize::MAX, |c| {
            seen.push((c.total_cost(), c.seq_ids.to_vec()));
            0
        });
        assert_eq!(seen, vec![(0, vec![2, 3])], "quick+foxes shares no document");
    }

    #[test]
    fn test_stops_at_cost_boundary_once_satisfied() {
        let t = tree(&[("a", &[1]), ("b", &[2]), ("c", &[3])]);
        let tokens = vec![token(&t, &[&["a", "b"], &["c"]])];
        let mut visited = Vec::new();
        let stop = CandidateCombiner::new(&tokens, 10).run(1, |c| {
            visited.extend_from_slice(c.seq_ids);
            visited.len()
        });
        assert_eq!(stop, Termination::Satisfied);
        assert_eq!(visited, vec![1, 2], "the whole cost-0 level is explored");
    }

    #[test]
    fn test_ceiling_bounds_work() {
        let keys: Vec<String> = (0..10).map(|i| format!("k{i}")).collect();
        let entries: Vec<(&str, &[u32])> = keys.iter().map(|k| (k.as_str(), &[1u32][..])).collect();
        let t = tree(&entries);
        let all: Vec<&str> = keys.iter().map(String::as_str).collect();
        let tokens: Vec<TokenCandidates> = (0..20).map(|_| token(&t, &[&all[..], &all[..], &all[..]])).collect();

        let mut calls = 0;
        let mut combiner = CandidateCombiner::new(&tokens, 500);
        let stop = combiner.run(usize::MAX, |_| {
            calls += 1;
            0
        });
        assert_eq!(stop, Termination::Ceiling);
        assert_eq!(combiner.examined(), 500);
        assert_eq!(calls, 500);
    }

    #[test]
    fn test_no_tokens() {
        let tokens: Vec<TokenCandidates> = Vec::new();
        let stop = CandidateCombiner::new(&tokens, 10).run(1, |_| 0);
        assert_eq!(stop, Termination::Exhausted);
    }
}
