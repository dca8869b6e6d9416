//! 推进策略：把一次尝试的准确率与错误数映射为进度决策。

use serde::Serialize;

use crate::scoring::{DiffKind, WordDiffEntry};

use super::phrase::Phrase;

/// 一次尝试之后的进度决策。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceDecision {
    Advance,
    AdvanceWithReview,
    Hint,
    Retry,
}

impl AdvanceDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvanceDecision::Advance => "advance",
            AdvanceDecision::AdvanceWithReview => "advance_with_review",
            AdvanceDecision::Hint => "hint",
            AdvanceDecision::Retry => "retry",
        }
    }

    /// 是否推进到下一条短语。
    pub fn advances(&self) -> bool {
        matches!(
            self,
            AdvanceDecision::Advance | AdvanceDecision::AdvanceWithReview
        )
    }
}

/// 规则表按序求值，命中即返回。
pub fn evaluate(accuracy: f64, error_count: usize) -> AdvanceDecision {
    if accuracy >= 95.0 {
        return AdvanceDecision::Advance;
    }
    if accuracy >= 80.0 {
        return AdvanceDecision::Advance;
    }
    if accuracy >= 60.0 && error_count <= 2 {
        return AdvanceDecision::AdvanceWithReview;
    }
    if accuracy >= 40.0 {
        return AdvanceDecision::Hint;
    }
    AdvanceDecision::Retry
}

/// 提示强度：先给首字母，重复卡住再露出前半。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HintLevel {
    FirstLetter,
    HalfWord,
}

impl HintLevel {
    pub fn escalate(self) -> HintLevel {
        HintLevel::HalfWord
    }
}

fn mask_word(word: &str, level: HintLevel) -> String {
    let chars: Vec<char> = word.chars().collect();
    let visible = match level {
        HintLevel::FirstLetter => 1,
        HintLevel::HalfWord => (chars.len() / 2).max(1),
    };
    chars
        .iter()
        .enumerate()
        .map(|(position, ch)| {
            if position < visible || !ch.is_alphanumeric() {
                *ch
            } else {
                '_'
            }
        })
        .collect()
}

/// 生成当前短语的提示文本：漏掉或说错的词按提示强度遮蔽，其余原样保留。
pub fn hint_text(phrase: &Phrase, diff: &[WordDiffEntry], level: HintLevel) -> String {
    let problem_words: Vec<&str> = diff
        .iter()
        .filter(|entry| matches!(entry.kind, DiffKind::Missing | DiffKind::Substituted))
        .filter_map(|entry| entry.expected.as_deref())
        .collect();

    phrase
        .words
        .iter()
        .map(|word| {
            let normalized: String = word
                .to_lowercase()
                .chars()
                .filter(|ch| ch.is_alphanumeric() || *ch == '\'')
                .collect();
            if problem_words.iter().any(|problem| *problem == normalized) {
                mask_word(word, level)
            } else {
                word.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_table_matches_in_order() {
        assert_eq!(evaluate(96.0, 0), AdvanceDecision::Advance);
        assert_eq!(evaluate(85.0, 5), AdvanceDecision::Advance);
        assert_eq!(evaluate(65.0, 2), AdvanceDecision::AdvanceWithReview);
        assert_eq!(evaluate(65.0, 3), AdvanceDecision::Hint);
        assert_eq!(evaluate(45.0, 0), AdvanceDecision::Hint);
        assert_eq!(evaluate(30.0, 1), AdvanceDecision::Retry);
        assert_eq!(evaluate(0.0, 0), AdvanceDecision::Retry);
    }

    #[test]
    fn boundary_values_are_inclusive() {
        assert_eq!(evaluate(95.0, 9), AdvanceDecision::Advance);
        assert_eq!(evaluate(80.0, 9), AdvanceDecision::Advance);
        assert_eq!(evaluate(60.0, 2), AdvanceDecision::AdvanceWithReview);
        assert_eq!(evaluate(40.0, 9), AdvanceDecision::Hint);
    }

    #[test]
    fn first_letter_mask_keeps_initial() {
        assert_eq!(mask_word("dinner", HintLevel::FirstLetter), "d_____");
        assert_eq!(mask_word("go", HintLevel::FirstLetter), "g_");
    }

    #[test]
    fn half_word_mask_reveals_front_half() {
        assert_eq!(mask_word("dinner", HintLevel::HalfWord), "din___");
    }

    #[test]
    fn punctuation_survives_masking() {
        assert_eq!(mask_word("home.", HintLevel::FirstLetter), "h___.");
    }

    #[test]
    fn hint_masks_only_problem_words() {
        let phrase = Phrase {
            index: 0,
            words: vec!["we".into(), "ate".into(), "dinner.".into()],
            span: (0, 14),
        };
        let diff = vec![WordDiffEntry {
            expected: Some("dinner".into()),
            spoken: None,
            kind: DiffKind::Missing,
            similarity: 0.0,
        }];
        assert_eq!(
            hint_text(&phrase, &diff, HintLevel::FirstLetter),
            "we ate d_____."
        );
    }
}
