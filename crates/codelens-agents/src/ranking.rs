//! Fusion and ranking of matches coming from several agents.

use codelens_core::{EntityId, EntityMatch, OrchestratorConfig, QueryContext};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;

/// Total order used for every ranked list: confidence desc, match-type
/// priority asc, name asc, then entity id for a stable tie-break.
pub fn rank_order(a: &EntityMatch, b: &EntityMatch) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.match_type.priority().cmp(&b.match_type.priority()))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

fn beats(candidate: &EntityMatch, current: &EntityMatch) -> bool {
    match candidate.confidence.total_cmp(&current.confidence) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.match_type.priority() < current.match_type.priority(),
    }
}

/// One match per entity id, keeping the strongest. First-seen order is preserved.
pub fn keep_best_per_entity(matches: impl IntoIterator<Item = EntityMatch>) -> Vec<EntityMatch> {
    let mut slots: FxHashMap<EntityId, usize> = FxHashMap::default();
    let mut kept: Vec<EntityMatch> = Vec::new();

    for candidate in matches {
        match slots.get(&candidate.entity_id) {
            Some(&slot) => {
                if beats(&candidate, &kept[slot]) {
                    kept[slot] = candidate;
                }
            }
            None => {
                slots.insert(candidate.entity_id.clone(), kept.len());
                kept.push(candidate);
            }
        }
    }
    kept
}

/// Merge agent outputs by entity id. The stronger match wins and the weaker
/// match's reason is appended as `"<winner>; <loser>"`.
pub fn merge_matches(batches: impl IntoIterator<Item = Vec<EntityMatch>>) -> Vec<EntityMatch> {
    let mut slots: FxHashMap<EntityId, usize> = FxHashMap::default();
    let mut merged: Vec<EntityMatch> = Vec::new();

    for candidate in batches.into_iter().flatten() {
        let Some(&slot) = slots.get(&candidate.entity_id) else {
            slots.insert(candidate.entity_id.clone(), merged.len());
            merged.push(candidate);
            continue;
        };

        let current = &merged[slot];
        let (winner, loser) = if beats(&candidate, current) {
            (candidate, current.clone())
        } else {
            (current.clone(), candidate)
        };

        let reason = if loser.match_reason.is_empty() || winner.match_reason == loser.match_reason {
            winner.match_reason.clone()
        } else {
            format!("{}; {}", winner.match_reason, loser.match_reason)
        };
        merged[slot] = winner.with_reason(reason);
    }
    merged
}

/// Confidence floor, boosts and result cap applied after merging.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingPolicy {
    pub min_confidence: f32,
    pub max_results: usize,
    pub intent_boost: f32,
    pub constraint_boost: f32,
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

impl RankingPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            max_results: config.max_results,
            intent_boost: config.intent_boost,
            constraint_boost: config.constraint_boost,
        }
    }

    /// Drop weak matches, boost the ones that fit the query, sort and truncate.
    pub fn apply(&self, matches: Vec<EntityMatch>, context: &QueryContext) -> Vec<EntityMatch> {
        let preferred = context.intent.preferred_entity_type();
        let constraints = &context.constraints;

        let mut ranked: Vec<EntityMatch> = matches
            .into_iter()
            .filter(|m| m.confidence >= self.min_confidence)
            .map(|m| {
                let mut boost = 0.0;
                if preferred == Some(m.entity_type) {
                    boost += self.intent_boost;
                }
                if !constraints.is_empty() && satisfies_constraints(&m, context) {
                    boost += self.constraint_boost;
                }
                if boost > 0.0 {
                    let boosted = m.confidence + boost;
                    m.with_confidence(boosted)
                } else {
                    m
                }
            })
            .collect();

        ranked.sort_by(rank_order);
        ranked.truncate(self.max_results);
        ranked
    }
}

fn satisfies_constraints(candidate: &EntityMatch, context: &QueryContext) -> bool {
    let constraints = &context.constraints;
    let type_ok = constraints.required_types.is_empty()
        || constraints.required_types.contains(&candidate.entity_type);
    let modifiers_ok = constraints
        .required_modifiers
        .iter()
        .all(|required| candidate.modifiers.iter().any(|m| m.eq_ignore_ascii_case(required)));
    type_ok && modifiers_ok
}
