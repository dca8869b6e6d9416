use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// 适配器返回的原始转写结果。
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub transcript: String,
    /// 提供方给出的置信度；缺失时由适配器按启发式补齐。
    pub confidence: Option<f32>,
}

/// 路由层汇总后的识别结果。
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    pub transcript: String,
    pub confidence: f32,
    pub provider: String,
    pub latency: Duration,
    pub success: bool,
    pub error: Option<ProviderErrorKind>,
}

/// 提供方错误的归类，进入快照与遥测。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Network,
    Timeout,
    RateLimited,
    InvalidResponse,
    Unavailable,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::Network => "network",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::InvalidResponse => "invalid_response",
            ProviderErrorKind::Unavailable => "unavailable",
        }
    }
}

/// 单个提供方调用的失败。
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("failed to parse provider response: {0}")]
    InvalidResponse(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Network(_) => ProviderErrorKind::Network,
            ProviderError::Timeout { .. } => ProviderErrorKind::Timeout,
            ProviderError::RateLimited => ProviderErrorKind::RateLimited,
            ProviderError::InvalidResponse(_) => ProviderErrorKind::InvalidResponse,
            ProviderError::Unavailable(_) => ProviderErrorKind::Unavailable,
        }
    }
}

/// 路由层面的终态错误：仅在所有候选耗尽后对外暴露。
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("no transcription provider available")]
    NoProviderAvailable,
    #[error("all providers failed; last error from {provider}: {source}")]
    AllProvidersFailed {
        provider: String,
        #[source]
        source: ProviderError,
    },
}

/// 主用提供方发生切换时的通知负载。
#[derive(Debug, Clone)]
pub struct ProviderSwitch {
    pub from: Option<String>,
    pub to: String,
}

/// 对外只读的提供方状态快照，仅由路由器变更底层状态。
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSnapshot {
    pub name: String,
    pub priority: u32,
    pub enabled: bool,
    pub healthy: bool,
    pub supports_streaming: bool,
    pub consecutive_errors: u32,
    pub requests_last_minute: u32,
    pub rate_limit_per_minute: Option<u32>,
    pub last_used_epoch_ms: Option<u64>,
}
