//! 练习反馈生成。
//!
//! 教练是尽力而为的外部协作者：任何失败都由协调器吞掉并降级为
//! 无评语推进，绝不影响决策。

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::scoring::{DiffKind, WordDiffEntry};

use super::phrase::Phrase;

#[async_trait]
pub trait CoachingGenerator: Send + Sync {
    async fn coach(&self, phrase: &Phrase, diff: &[WordDiffEntry]) -> Result<String>;
}

/// 规则教练：根据差异构成给出简短建议，永不失败。
#[derive(Debug, Default)]
pub struct RuleBasedCoach;

impl RuleBasedCoach {
    fn suggestions(phrase: &Phrase, diff: &[WordDiffEntry]) -> Vec<&'static str> {
        let missing = diff
            .iter()
            .filter(|entry| entry.kind == DiffKind::Missing)
            .count();
        let extra = diff
            .iter()
            .filter(|entry| entry.kind == DiffKind::Extra)
            .count();
        let errors = missing
            + diff
                .iter()
                .filter(|entry| entry.kind == DiffKind::Substituted)
                .count();

        let mut suggestions = Vec::new();
        if missing > 0 {
            suggestions
                .push("Try to include all words from the text. Some words might be missing.");
        } else if extra > 0 {
            suggestions.push("Focus on the exact text. You might be adding extra words.");
        }

        let total = phrase.word_count().max(1);
        let ratio = 1.0 - errors as f64 / total as f64;
        if ratio < 0.5 {
            suggestions
                .push("This section needs more practice. Try breaking it into smaller chunks.");
        } else if ratio < 0.8 {
            suggestions.push("Good effort! Focus on the specific words that are different.");
        } else {
            suggestions.push("Great job! Just a few minor adjustments needed.");
        }

        suggestions
    }
}

#[async_trait]
impl CoachingGenerator for RuleBasedCoach {
    async fn coach(&self, phrase: &Phrase, diff: &[WordDiffEntry]) -> Result<String> {
        Ok(Self::suggestions(phrase, diff).join(" "))
    }
}

const COACH_SYSTEM_PROMPT: &str = "You are a helpful speech coach providing constructive \
feedback for speech memorization practice. Keep feedback encouraging and constructive. \
Limit to 2-3 sentences.";

/// 通过 OpenAI 兼容的对话接口生成个性化评语。
pub struct ChatCompletionCoach {
    endpoint: String,
    api_key: String,
    model: String,
    agent: ureq::Agent,
}

impl ChatCompletionCoach {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(15))
                .build(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn describe_diff(diff: &[WordDiffEntry]) -> String {
        diff.iter()
            .map(|entry| match entry.kind {
                DiffKind::Missing => {
                    format!("missing \"{}\"", entry.expected.as_deref().unwrap_or("?"))
                }
                DiffKind::Substituted => format!(
                    "said \"{}\" instead of \"{}\"",
                    entry.spoken.as_deref().unwrap_or("?"),
                    entry.expected.as_deref().unwrap_or("?")
                ),
                DiffKind::Extra => {
                    format!("added \"{}\"", entry.spoken.as_deref().unwrap_or("?"))
                }
                DiffKind::Correct => format!(
                    "pronounced \"{}\" loosely",
                    entry.expected.as_deref().unwrap_or("?")
                ),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl CoachingGenerator for ChatCompletionCoach {
    async fn coach(&self, phrase: &Phrase, diff: &[WordDiffEntry]) -> Result<String> {
        let prompt = format!(
            "Expected text: \"{}\"\nObserved issues: {}\n\nProvide brief coaching for this \
             memorization attempt.",
            phrase.text(),
            if diff.is_empty() {
                "none".to_string()
            } else {
                Self::describe_diff(diff)
            }
        );

        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let auth = format!("Bearer {}", self.api_key);
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": COACH_SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": 150,
            "temperature": 0.7,
        });

        let body: Value = tokio::task::spawn_blocking(move || -> Result<Value> {
            let response = agent
                .post(&endpoint)
                .set("Authorization", &auth)
                .set("Content-Type", "application/json")
                .send_string(&payload.to_string())
                .map_err(|err| anyhow!("coach request failed: {err}"))?;
            response
                .into_json()
                .map_err(|err| anyhow!("coach response unreadable: {err}"))
        })
        .await
        .map_err(|err| anyhow!("coach task failed: {err}"))??;

        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| anyhow!("coach response missing content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::phrase::segment_phrases;

    fn phrase() -> Phrase {
        segment_phrases("we ate dinner together quietly", 5)
            .into_iter()
            .next()
            .expect("one phrase")
    }

    fn missing(word: &str) -> WordDiffEntry {
        WordDiffEntry {
            expected: Some(word.to_string()),
            spoken: None,
            kind: DiffKind::Missing,
            similarity: 0.0,
        }
    }

    #[tokio::test]
    async fn clean_attempt_gets_praise() {
        let coach = RuleBasedCoach;
        let feedback = coach.coach(&phrase(), &[]).await.expect("coach succeeds");
        assert!(feedback.contains("Great job"));
    }

    #[tokio::test]
    async fn missing_words_are_called_out() {
        let coach = RuleBasedCoach;
        let diff = vec![missing("dinner")];
        let feedback = coach.coach(&phrase(), &diff).await.expect("coach succeeds");
        assert!(feedback.contains("might be missing"));
    }

    #[tokio::test]
    async fn heavy_misses_suggest_smaller_chunks() {
        let coach = RuleBasedCoach;
        let diff = vec![missing("we"), missing("ate"), missing("dinner")];
        let feedback = coach.coach(&phrase(), &diff).await.expect("coach succeeds");
        assert!(feedback.contains("smaller chunks"));
    }

    #[test]
    fn diff_description_reads_naturally() {
        let diff = vec![
            missing("dinner"),
            WordDiffEntry {
                expected: Some("quietly".to_string()),
                spoken: Some("quickly".to_string()),
                kind: DiffKind::Substituted,
                similarity: 0.6,
            },
        ];
        let description = ChatCompletionCoach::describe_diff(&diff);
        assert_eq!(
            description,
            "missing \"dinner\", said \"quickly\" instead of \"quietly\""
        );
    }
}
