use async_trait::async_trait;

use crate::audio::AudioChunk;

use super::types::{ProviderError, ProviderResponse};

/// 一个外部语音识别服务的统一接口。
///
/// 显式注册、按 trait 对象调用；流式能力是每个提供方自己声明的标志，
/// 不做统一保证。
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// 是否支持对进行中的发音片段做增量转写。
    fn supports_streaming(&self) -> bool;

    async fn transcribe(&self, audio: &AudioChunk) -> Result<ProviderResponse, ProviderError>;
}
