//! Confidence formulas shared by the registry queries.

use codelens_core::clamp_confidence;

pub const EXACT_CONFIDENCE: f32 = 1.0;
pub const COMPOUND_NAME_CONFIDENCE: f32 = 0.9;
pub const COMPOUND_INDEX_CONFIDENCE: f32 = 0.8;
pub const ABBREVIATION_CONFIDENCE: f32 = 0.6;
pub const PHONETIC_CONFIDENCE: f32 = 0.55;

/// `0.7 + 0.3 * (affix_len / name_len)`: longer, more specific affixes score higher.
pub fn affix_confidence(affix_len: usize, name_len: usize) -> f32 {
    if name_len == 0 {
        return 0.0;
    }
    let ratio = (affix_len as f32 / name_len as f32).min(1.0);
    clamp_confidence(0.7 + 0.3 * ratio)
}

/// Confidence for a BK-tree hit at `distance` between `query` and `candidate`.
///
/// Base score is `1 - distance / max_len`, floored to 0.8 at distance 1 and 0.6 at
/// distance 2. Pairs whose lengths differ by more than half the longer length take
/// a 30% penalty.
pub fn edit_distance_confidence(query: &str, candidate: &str, distance: usize) -> f32 {
    let query_len = query.chars().count();
    let candidate_len = candidate.chars().count();
    let max_len = query_len.max(candidate_len);
    if max_len == 0 {
        return 1.0;
    }

    let base = 1.0 - distance as f32 / max_len as f32;
    let floored = match distance {
        0 => 1.0,
        1 => base.max(0.8),
        2 => base.max(0.6),
        _ => base,
    };

    let length_gap = query_len.abs_diff(candidate_len) as f32;
    let score = if length_gap > max_len as f32 / 2.0 {
        floored * 0.7
    } else {
        floored
    };
    clamp_confidence(score)
}
