//! Word-level alignment between expected and spoken token sequences.
//!
//! Classic edit-distance dynamic program with a backtrace. Substitution
//! cost discounts similar-sounding pairs so the backtrace prefers pairing a
//! mispronounced word with its target over treating it as delete+insert.

use serde::Serialize;

use super::phonetics::word_similarity;
use super::ScoringConfig;

/// Classification of one aligned position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// Non-exact match accepted by phonetic similarity.
    Correct,
    Substituted,
    Missing,
    Extra,
}

impl DiffKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffKind::Correct => "correct",
            DiffKind::Substituted => "substituted",
            DiffKind::Missing => "missing",
            DiffKind::Extra => "extra",
        }
    }
}

/// One expected-vs-spoken difference. Exact matches produce no entry.
#[derive(Debug, Clone, Serialize)]
pub struct WordDiffEntry {
    pub expected: Option<String>,
    pub spoken: Option<String>,
    pub kind: DiffKind,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AlignedPair {
    /// Exact token match (expected index, spoken index).
    Match(usize, usize),
    /// Aligned but different tokens.
    Sub(usize, usize),
    /// Expected token with no spoken counterpart.
    Del(usize),
    /// Spoken token with no expected counterpart.
    Ins(usize),
}

pub(crate) fn align(
    expected: &[String],
    spoken: &[String],
    config: &ScoringConfig,
) -> Vec<AlignedPair> {
    let n = expected.len();
    let m = spoken.len();

    let mut cost = vec![vec![0.0_f64; m + 1]; n + 1];
    for (i, row) in cost.iter_mut().enumerate() {
        row[0] = i as f64;
    }
    for j in 0..=m {
        cost[0][j] = j as f64;
    }

    for i in 1..=n {
        for j in 1..=m {
            let sub_cost = if expected[i - 1] == spoken[j - 1] {
                0.0
            } else {
                // Discounted by similarity so near-misses stay aligned.
                2.0 - word_similarity(&expected[i - 1], &spoken[j - 1], config)
            };
            let substitute = cost[i - 1][j - 1] + sub_cost.min(1.999);
            let delete = cost[i - 1][j] + 1.0;
            let insert = cost[i][j - 1] + 1.0;
            cost[i][j] = substitute.min(delete).min(insert);
        }
    }

    let mut pairs = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 {
            let sub_cost = if expected[i - 1] == spoken[j - 1] {
                0.0
            } else {
                (2.0 - word_similarity(&expected[i - 1], &spoken[j - 1], config)).min(1.999)
            };
            if (cost[i][j] - (cost[i - 1][j - 1] + sub_cost)).abs() < f64::EPSILON {
                if expected[i - 1] == spoken[j - 1] {
                    pairs.push(AlignedPair::Match(i - 1, j - 1));
                } else {
                    pairs.push(AlignedPair::Sub(i - 1, j - 1));
                }
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if i > 0 && (j == 0 || (cost[i][j] - (cost[i - 1][j] + 1.0)).abs() < f64::EPSILON) {
            pairs.push(AlignedPair::Del(i - 1));
            i -= 1;
            continue;
        }
        pairs.push(AlignedPair::Ins(j - 1));
        j -= 1;
    }

    pairs.reverse();
    pairs
}
