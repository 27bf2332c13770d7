//! Relevance scoring and highlight spans.
//!
//! Each field yields a sub-score in [0, 1]: exact (case-insensitive) 1.0,
//! prefix 0.8, substring up to 0.6 favoring early and long matches, else 0.
//! Field scores are weighted, then usage and recency bonuses are added and
//! the total is clamped to [0, 1].

use serde::Serialize;

use crate::record::TranslationRecord;

pub const WEIGHT_ORIGINAL: f64 = 0.4;
pub const WEIGHT_TRANSLATED: f64 = 0.4;
pub const WEIGHT_SOURCE_LANGUAGE: f64 = 0.05;
pub const WEIGHT_TARGET_LANGUAGE: f64 = 0.05;
pub const WEIGHT_TAG: f64 = 0.1;

const EXACT_MATCH: f64 = 1.0;
const PREFIX_MATCH: f64 = 0.8;
const SUBSTRING_MAX: f64 = 0.6;

const USAGE_BONUS_PER_USE: f64 = 0.02;
const USAGE_BONUS_MAX: f64 = 0.2;
const RECENCY_BONUS_MAX: f64 = 0.1;
const RECENCY_DECAY_PER_DAY: f64 = 0.001;

/// Byte range of a match inside the original (not lowercased) string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HighlightSpan {
    pub start: usize,
    pub end: usize,
}

/// First case-insensitive occurrence of `needle` in `haystack`.
/// Comparison folds per character, so offsets stay valid for `haystack`
/// even when lowercasing would change byte lengths.
pub fn find_ignore_case(haystack: &str, needle: &str) -> Option<HighlightSpan> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }
    haystack.char_indices().find_map(|(start, _)| {
        match_len(&haystack[start..], &needle).map(|len| HighlightSpan {
            start,
            end: start + len,
        })
    })
}

/// Byte length of the prefix of `rest` that matches `needle`, if any.
fn match_len(rest: &str, needle: &[char]) -> Option<usize> {
    let mut matched = 0;
    for (offset, c) in rest.char_indices() {
        for lower in c.to_lowercase() {
            if needle.get(matched) != Some(&lower) {
                return None;
            }
            matched += 1;
        }
        if matched == needle.len() {
            return Some(offset + c.len_utf8());
        }
    }
    None
}

/// Sub-score of one field against the query.
pub fn field_score(field: &str, query: &str) -> f64 {
    let Some(span) = find_ignore_case(field, query) else {
        return 0.0;
    };
    if span.start == 0 && span.end == field.len() {
        return EXACT_MATCH;
    }
    if span.start == 0 {
        return PREFIX_MATCH;
    }
    let field_len = field.chars().count() as f64;
    let index = field[..span.start].chars().count() as f64;
    let query_len = field[span.start..span.end].chars().count() as f64;
    ((1.0 - index / field_len * 0.3) * (query_len / field_len) + 0.3).min(SUBSTRING_MAX)
}

pub fn usage_bonus(usage_count: u32) -> f64 {
    (f64::from(usage_count) * USAGE_BONUS_PER_USE).min(USAGE_BONUS_MAX)
}

pub fn recency_bonus(days_since_creation: f64) -> f64 {
    (RECENCY_BONUS_MAX - days_since_creation * RECENCY_DECAY_PER_DAY).max(0.0)
}

/// Final relevance of `record` for `query` at time `now_ms`, in [0, 1].
pub fn score_record(record: &TranslationRecord, query: &str, now_ms: i64) -> f64 {
    let best_tag = record
        .tags
        .iter()
        .map(|tag| field_score(tag, query))
        .fold(0.0, f64::max);

    let weighted = WEIGHT_ORIGINAL * field_score(&record.original_text, query)
        + WEIGHT_TRANSLATED * field_score(&record.translated_text, query)
        + WEIGHT_SOURCE_LANGUAGE * field_score(&record.source_language_name, query)
        + WEIGHT_TARGET_LANGUAGE * field_score(&record.target_language_name, query)
        + WEIGHT_TAG * best_tag;

    let total = weighted
        + usage_bonus(record.usage_count)
        + recency_bonus(record.days_since_creation(now_ms));
    total.clamp(0.0, 1.0)
}
