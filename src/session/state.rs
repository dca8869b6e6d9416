//! 会话内部状态与尝试历史。

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};

use crate::scoring::WordDiffEntry;

use super::ledger::{MissedWordLedger, MissedWordRecord};
use super::phrase::Phrase;
use super::policy::{AdvanceDecision, HintLevel};

/// 建立会话时的可选参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// 每条短语的目标词数。
    pub phrase_length: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { phrase_length: 8 }
    }
}

/// 一次已评分的尝试，入史后不再变更。
#[derive(Debug, Clone, Serialize)]
pub struct PhraseAttempt {
    pub phrase_index: usize,
    pub transcript: String,
    pub diff: Vec<WordDiffEntry>,
    pub accuracy: f64,
    pub similarity: f64,
    pub decision: AdvanceDecision,
    #[serde(skip)]
    pub scored_at: SystemTime,
}

/// 面向宿主的会话摘要。
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub phrases_completed: usize,
    pub total_phrases: usize,
    pub total_attempts: usize,
    /// 各已尝试短语最佳准确率的平均值。
    pub overall_accuracy: f64,
    #[serde(with = "elapsed_ms")]
    pub elapsed: Duration,
    pub missed_words: Vec<MissedWordRecord>,
}

mod elapsed_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }
}

/// 活跃会话。仅由会话协调器变更。
pub(crate) struct PracticeSession {
    pub(crate) source_text: String,
    pub(crate) phrases: Vec<Phrase>,
    pub(crate) current_index: usize,
    pub(crate) attempts: Vec<PhraseAttempt>,
    pub(crate) ledger: MissedWordLedger,
    /// 当前短语上已升级到的提示强度。推进后清零。
    pub(crate) hint_level: Option<HintLevel>,
    pub(crate) started_at: Instant,
    pub(crate) completed_at: Option<Instant>,
}

impl PracticeSession {
    pub(crate) fn new(source_text: String, phrases: Vec<Phrase>) -> Self {
        Self {
            source_text,
            phrases,
            current_index: 0,
            attempts: Vec::new(),
            ledger: MissedWordLedger::default(),
            hint_level: None,
            started_at: Instant::now(),
            completed_at: None,
        }
    }

    pub(crate) fn current_phrase(&self) -> Option<&Phrase> {
        self.phrases.get(self.current_index)
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.current_index >= self.phrases.len()
    }

    /// 推进短语下标；越过最后一条时记录完成时刻并返回 true。
    pub(crate) fn advance(&mut self) -> bool {
        self.current_index += 1;
        self.hint_level = None;
        if self.is_complete() {
            if self.completed_at.is_none() {
                self.completed_at = Some(Instant::now());
            }
            true
        } else {
            false
        }
    }

    pub(crate) fn record_attempt(&mut self, attempt: PhraseAttempt) {
        self.attempts.push(attempt);
    }

    pub(crate) fn summary(&self) -> SessionSummary {
        let mut best_by_phrase: HashMap<usize, f64> = HashMap::new();
        for attempt in &self.attempts {
            let best = best_by_phrase.entry(attempt.phrase_index).or_insert(0.0);
            if attempt.accuracy > *best {
                *best = attempt.accuracy;
            }
        }
        let overall_accuracy = if best_by_phrase.is_empty() {
            0.0
        } else {
            best_by_phrase.values().sum::<f64>() / best_by_phrase.len() as f64
        };

        let elapsed = match self.completed_at {
            Some(completed) => completed.saturating_duration_since(self.started_at),
            None => self.started_at.elapsed(),
        };

        SessionSummary {
            phrases_completed: self.current_index.min(self.phrases.len()),
            total_phrases: self.phrases.len(),
            total_attempts: self.attempts.len(),
            overall_accuracy,
            elapsed,
            missed_words: self.ledger.sorted_records(),
        }
    }
}
