//! Per-field query execution: typo-tolerant token resolution, candidate
//! combination and scoring.

use crate::art::Leaf;
use crate::candidate::{CandidateCombiner, TokenCandidates};
use crate::config::SearchLimits;
use crate::indexer::{decode_int32, encode_int32, FieldIndex};
use crate::interface::{SearchOptions, TokenOrdering};
use crate::ranking::{MatchScore, RankScores, Scorer};
use std::collections::HashSet;

/// Ranked hits for one field plus every document the field matched.
#[derive(Debug, Default)]
pub(crate) struct FieldMatches {
    pub hits: Vec<(u32, MatchScore)>,
    pub found: HashSet<u32>,
}

/// Matching leaves of `token`, grouped by their lowest edit-distance cost.
pub(crate) fn resolve_token<'a>(
    index: &'a FieldIndex,
    token: &str,
    options: &SearchOptions,
    max_leaves_per_cost: usize,
) -> TokenCandidates<'a> {
    let mut groups: Vec<Vec<&'a Leaf>> = vec![Vec::new(); options.num_typos as usize + 1];

    match index {
        FieldIndex::Int32 { tree } => {
            if let Ok(value) = token.parse::<i32>() {
                if let Some(leaf) = tree.get(&encode_int32(value)) {
                    groups[0].push(leaf);
                }
            }
        }
        FieldIndex::String { tree, .. } => {
            for m in tree.fuzzy_search(token.as_bytes(), options.num_typos, options.prefix) {
                groups[m.cost as usize].push(m.leaf);
            }
        }
    }

    for group in &mut groups {
        match options.token_order {
            TokenOrdering::Frequency => {
                group.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.key().cmp(b.key())))
            }
            TokenOrdering::Rank => group.sort_by(|a, b| {
                b.max_score()
                    .cmp(&a.max_score())
                    .then_with(|| a.key().cmp(b.key()))
            }),
        }
        group.truncate(max_leaves_per_cost);
    }

    tracing::debug!(
        token,
        leaves = ?groups
            .iter()
            .map(|g| g.iter().map(|l| key_label(index, l.key())).collect::<Vec<_>>())
            .collect::<Vec<_>>(),
        "resolved token"
    );

    TokenCandidates {
        token: token.to_string(),
        groups,
    }
}

/// Printable form of an index key.
fn key_label(index: &FieldIndex, key: &[u8]) -> String {
    match index {
        FieldIndex::Int32 { .. } => decode_int32(key).map_or_else(|| format!("{key:?}"), |n| n.to_string()),
        FieldIndex::String { .. } => String::from_utf8_lossy(key).into_owned(),
    }
}

/// Run `tokens` against one field, keeping the `capacity` best documents.
///
/// When the full token list finds fewer than `target` documents, the last
/// token is dropped and the search repeats with the rest. All rounds share the
/// combination budget.
pub(crate) fn search_field(
    index: &FieldIndex,
    tokens: &[String],
    options: &SearchOptions,
    limits: &SearchLimits,
    ranks: &RankScores,
    target: usize,
    capacity: usize,
) -> FieldMatches {
    let resolved: Vec<TokenCandidates> = tokens
        .iter()
        .map(|token| resolve_token(index, token, options, limits.max_leaves_per_cost as usize))
        .filter(|candidates| {
            if candidates.is_empty() {
                tracing::debug!(token = %candidates.token, "token matched nothing, dropping");
            }
            !candidates.is_empty()
        })
        .collect();

    if resolved.is_empty() {
        return FieldMatches::default();
    }

    let mut scorer = Scorer::new(capacity, ranks);
    let mut budget = limits.max_combinations as usize;
    let mut active = resolved.len();

    loop {
        let mut combiner = CandidateCombiner::new(&resolved[..active], budget);
        let stop = combiner.run(target, |combination| {
            scorer.score(combination.seq_ids, combination.total_cost(), combination.leaves.len())
        });
        budget = budget.saturating_sub(combiner.examined());

        tracing::debug!(
            tokens = active,
            examined = combiner.examined(),
            found = scorer.num_found(),
            ?stop,
            "combiner finished"
        );

        if active == 1 || budget == 0 || scorer.num_found() >= target {
            break;
        }
        active -= 1;
    }

    let (hits, found) = scorer.finish();
    FieldMatches { hits, found }
}

/// Documents whose int32 key lies in `[min, max]`, best-first.
pub(crate) fn search_range(
    index: &FieldIndex,
    min: i32,
    max: i32,
    ranks: &RankScores,
    capacity: usize,
) -> FieldMatches {
    let mut scorer = Scorer::new(capacity, ranks);
    if min <= max {
        for leaf in index.tree().range(&encode_int32(min), &encode_int32(max)) {
            scorer.score(leaf.ids(), 0, 1);
        }
    }
    let (hits, found) = scorer.finish();
    FieldMatches { hits, found }
}

/// Merge per-field results in field order: earlier fields first, each
/// document at its first position.
pub(crate) fn merge_fields(fields: Vec<FieldMatches>, limit: usize) -> (Vec<u32>, usize) {
    let mut seen = HashSet::new();
    let mut found = HashSet::new();
    let mut ordered = Vec::new();

    for field in fields {
        found.extend(field.found);
        for (seq_id, _) in field.hits {
            if seen.insert(seq_id) {
                ordered.push(seq_id);
            }
        }
    }
    ordered.truncate(limit);
    (ordered, found.len())
}
