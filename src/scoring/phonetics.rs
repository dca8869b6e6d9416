//! Pronunciation-tolerant word similarity.
//!
//! Combines a normalized edit-distance ratio, a folded phonetic spelling
//! distance (with a Soundex floor), and syllable-count proximity. The weights
//! live in [`ScoringConfig`](super::ScoringConfig) and are tunable.

use natural::phonetics::soundex;
use strsim::levenshtein;

use super::ScoringConfig;

/// Spelling substitutions that collapse common pronunciation variants before
/// measuring distance. Order matters: multi-letter patterns first.
const FOLD_PATTERNS: &[(&str, &str)] = &[
    ("ph", "f"),
    ("ck", "k"),
    ("qu", "kw"),
    ("x", "ks"),
    ("c", "k"),
    ("s", "z"),
    ("ed", "d"),
    ("ing", "in"),
];

/// Similarity floor applied to the phonetic component when the Soundex codes
/// of both words agree.
const SOUNDEX_FLOOR: f64 = 0.85;

pub(crate) fn fold_pronunciation(word: &str) -> String {
    let mut folded = word.to_string();
    for (pattern, replacement) in FOLD_PATTERNS {
        folded = folded.replace(pattern, replacement);
    }
    folded
}

pub(crate) fn edit_ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

pub(crate) fn phonetic_ratio(a: &str, b: &str) -> f64 {
    let ratio = edit_ratio(&fold_pronunciation(a), &fold_pronunciation(b));
    if !a.is_empty() && !b.is_empty() && soundex(a, b) {
        ratio.max(SOUNDEX_FLOOR)
    } else {
        ratio
    }
}

/// Vowel-group estimate of syllable count; a silent trailing 'e' is not
/// counted on its own.
pub(crate) fn syllable_count(word: &str) -> usize {
    let lower = word.to_ascii_lowercase();
    let mut count = 0;
    let mut in_group = false;
    for ch in lower.chars() {
        let is_vowel = matches!(ch, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if is_vowel && !in_group {
            count += 1;
        }
        in_group = is_vowel;
    }
    if count > 1 && lower.ends_with('e') && !lower.ends_with("le") {
        count -= 1;
    }
    count.max(1)
}

pub(crate) fn syllable_proximity(a: &str, b: &str) -> f64 {
    let sa = syllable_count(a) as f64;
    let sb = syllable_count(b) as f64;
    1.0 - (sa - sb).abs() / sa.max(sb)
}

/// Weighted similarity in 0..1 between an expected word and a spoken word.
pub fn word_similarity(expected: &str, spoken: &str, config: &ScoringConfig) -> f64 {
    if expected == spoken {
        return 1.0;
    }
    if expected.is_empty() || spoken.is_empty() {
        return 0.0;
    }

    let score = config.edit_weight * edit_ratio(expected, spoken)
        + config.phonetic_weight * phonetic_ratio(expected, spoken)
        + config.syllable_weight * syllable_proximity(expected, spoken);
    score.clamp(0.0, 1.0)
}
