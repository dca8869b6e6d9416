//! 会话事件广播负载定义。

use crate::scoring::WordDiffEntry;

use super::policy::AdvanceDecision;
use super::state::SessionSummary;

/// 一次尝试的对外结果。
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub phrase_index: usize,
    pub transcript: String,
    pub accuracy: f64,
    pub similarity: f64,
    pub decision: AdvanceDecision,
    pub diff: Vec<WordDiffEntry>,
    /// 教练反馈；生成失败时缺省，不阻塞推进。
    pub feedback: Option<String>,
    /// 决策为 Hint 时的提示文本。
    pub hint: Option<String>,
    /// 本次尝试之后会话是否已全部完成。
    pub session_complete: bool,
}

/// 协调器对宿主广播的事件。
#[derive(Debug, Clone)]
pub enum PracticeEvent {
    /// 透传音量采样，供宿主渲染电平。
    VolumeUpdate { level: f32 },
    /// 活跃发音期间的增量转写（已去重）。
    InterimResult { transcript: String },
    /// 一次完整尝试的评分结果。
    FinalResult { outcome: AttemptOutcome },
    /// 故障转移导致的主用提供方切换。
    ProviderSwitched {
        from: Option<String>,
        to: String,
    },
    /// 所有短语完成。
    SessionComplete { summary: SessionSummary },
}
