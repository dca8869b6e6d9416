//! Spoken-attempt scoring against an expected phrase.
//!
//! Tokenizes both sides, aligns them word by word, classifies every expected
//! word, and rolls the outcome up into an accuracy percentage and a mean
//! similarity score.

mod align;
mod phonetics;

pub use align::{DiffKind, WordDiffEntry};
pub use phonetics::word_similarity;

use serde::{Deserialize, Serialize};

use self::align::{align, AlignedPair};

/// Tunable scoring parameters. The acceptance threshold and component
/// weights are behavioral configuration, not a fixed contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Minimum similarity for a non-exact word to count as correct.
    pub accept_threshold: f64,
    pub edit_weight: f64,
    pub phonetic_weight: f64,
    pub syllable_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.82,
            edit_weight: 0.50,
            phonetic_weight: 0.35,
            syllable_weight: 0.15,
        }
    }
}

/// Outcome of scoring one attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptScore {
    /// Percentage of expected words spoken correctly, 0..100.
    pub accuracy: f64,
    /// Mean per-word similarity over expected words, 0..1.
    pub similarity: f64,
    /// Differences only; exact matches produce no entry.
    pub diff: Vec<WordDiffEntry>,
    pub correct_words: usize,
    pub expected_words: usize,
    /// Substituted plus missing words.
    pub error_count: usize,
}

pub struct MatchScorer {
    config: ScoringConfig,
}

impl MatchScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Lowercases, strips punctuation (apostrophes inside words survive) and
    /// splits on whitespace.
    pub fn tokenize(text: &str) -> Vec<String> {
        text.split_whitespace()
            .filter_map(|raw| {
                let token: String = raw
                    .to_lowercase()
                    .chars()
                    .filter(|ch| ch.is_alphanumeric() || *ch == '\'')
                    .collect();
                let token = token.trim_matches('\'').to_string();
                if token.is_empty() {
                    None
                } else {
                    Some(token)
                }
            })
            .collect()
    }

    /// Scores a spoken transcript against the expected text.
    ///
    /// Degenerate inputs (empty phrase or empty transcript) score zero
    /// accuracy instead of failing; the caller records the attempt either
    /// way.
    pub fn score(&self, expected_text: &str, spoken_text: &str) -> AttemptScore {
        let expected = Self::tokenize(expected_text);
        let spoken = Self::tokenize(spoken_text);

        if expected.is_empty() {
            return AttemptScore {
                accuracy: 0.0,
                similarity: 0.0,
                diff: Vec::new(),
                correct_words: 0,
                expected_words: 0,
                error_count: 0,
            };
        }

        let mut diff = Vec::new();
        let mut correct_words = 0_usize;
        let mut error_count = 0_usize;
        let mut similarity_sum = 0.0_f64;

        for pair in align(&expected, &spoken, &self.config) {
            match pair {
                AlignedPair::Match(_, _) => {
                    correct_words += 1;
                    similarity_sum += 1.0;
                }
                AlignedPair::Sub(ei, si) => {
                    let similarity = word_similarity(&expected[ei], &spoken[si], &self.config);
                    similarity_sum += similarity;
                    if similarity >= self.config.accept_threshold {
                        correct_words += 1;
                        diff.push(WordDiffEntry {
                            expected: Some(expected[ei].clone()),
                            spoken: Some(spoken[si].clone()),
                            kind: DiffKind::Correct,
                            similarity,
                        });
                    } else {
                        error_count += 1;
                        diff.push(WordDiffEntry {
                            expected: Some(expected[ei].clone()),
                            spoken: Some(spoken[si].clone()),
                            kind: DiffKind::Substituted,
                            similarity,
                        });
                    }
                }
                AlignedPair::Del(ei) => {
                    error_count += 1;
                    diff.push(WordDiffEntry {
                        expected: Some(expected[ei].clone()),
                        spoken: None,
                        kind: DiffKind::Missing,
                        similarity: 0.0,
                    });
                }
                AlignedPair::Ins(si) => {
                    diff.push(WordDiffEntry {
                        expected: None,
                        spoken: Some(spoken[si].clone()),
                        kind: DiffKind::Extra,
                        similarity: 0.0,
                    });
                }
            }
        }

        let expected_words = expected.len();
        AttemptScore {
            accuracy: correct_words as f64 / expected_words as f64 * 100.0,
            similarity: similarity_sum / expected_words as f64,
            diff,
            correct_words,
            expected_words,
            error_count,
        }
    }
}
