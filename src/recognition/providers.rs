//! 云端识别服务适配器。
//!
//! 所有适配器都通过 `ureq` 发起阻塞 HTTP 请求，并包在
//! `spawn_blocking` 里融入异步运行时；整体超时由路由层控制。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::audio::{AudioChunk, AudioFormat};

use super::config::ProviderConfig;
use super::router::FailoverRouter;
use super::traits::TranscriptionProvider;
use super::types::{ProviderError, ProviderResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);
const MULTIPART_BOUNDARY: &str = "memovoice-multipart-7f3c9a41";

const DEFAULT_WHISPER_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEFAULT_GOOGLE_ENDPOINT: &str = "https://speech.googleapis.com/v1/speech:recognize";

fn http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout(TRANSFER_TIMEOUT)
        .build()
}

fn map_ureq_error(err: ureq::Error) -> ProviderError {
    match err {
        ureq::Error::Status(429, _) => ProviderError::RateLimited,
        ureq::Error::Status(status, response) => ProviderError::Unavailable(format!(
            "http status {status}: {}",
            response.status_text()
        )),
        ureq::Error::Transport(transport) => ProviderError::Network(transport.to_string()),
    }
}

/// 提供方未返回置信度时的长度启发式。
fn length_confidence(transcript: &str) -> f32 {
    let len = transcript.trim().len();
    if len == 0 {
        0.0
    } else if len < 5 {
        0.6
    } else {
        0.8
    }
}

/// OpenAI 兼容的 Whisper 批量转写适配器。
pub struct WhisperApiProvider {
    name: String,
    endpoint: String,
    api_key: String,
    model: String,
    language: String,
    agent: ureq::Agent,
}

impl WhisperApiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "whisper".to_string(),
            endpoint: DEFAULT_WHISPER_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: "whisper-1".to_string(),
            language: "en".to_string(),
            agent: http_agent(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn multipart_body(&self, audio: &AudioChunk) -> Vec<u8> {
        let boundary = MULTIPART_BOUNDARY;
        let mut body = Vec::with_capacity(audio.data.len() + 512);
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"audio.{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                audio.format.as_str()
            )
            .as_bytes(),
        );
        body.extend_from_slice(&audio.data);
        body.extend_from_slice(b"\r\n");
        for (field, value) in [
            ("model", self.model.as_str()),
            ("response_format", "verbose_json"),
            ("language", self.language.as_str()),
        ] {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; \
                     name=\"{field}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    avg_logprob: f32,
}

impl WhisperResponse {
    /// 分段对数概率的粗略置信度换算；没有分段时退回长度启发式。
    fn confidence(&self) -> f32 {
        if self.segments.is_empty() {
            return length_confidence(&self.text);
        }
        let sum: f32 = self
            .segments
            .iter()
            .map(|segment| (segment.avg_logprob + 1.0).clamp(0.0, 1.0))
            .sum();
        sum / self.segments.len() as f32
    }
}

#[async_trait]
impl TranscriptionProvider for WhisperApiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    async fn transcribe(&self, audio: &AudioChunk) -> Result<ProviderResponse, ProviderError> {
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let auth = format!("Bearer {}", self.api_key);
        let body = self.multipart_body(audio);

        let raw = tokio::task::spawn_blocking(move || {
            agent
                .post(&endpoint)
                .set("Authorization", &auth)
                .set(
                    "Content-Type",
                    &format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
                )
                .send_bytes(&body)
                .map_err(map_ureq_error)?
                .into_string()
                .map_err(|err| ProviderError::InvalidResponse(err.to_string()))
        })
        .await
        .map_err(|err| ProviderError::Unavailable(format!("blocking task failed: {err}")))??;

        let parsed: WhisperResponse = serde_json::from_str(&raw)
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;
        let confidence = parsed.confidence();
        Ok(ProviderResponse {
            transcript: parsed.text.trim().to_string(),
            confidence: Some(confidence),
        })
    }
}

/// Google Cloud Speech `speech:recognize` 批量适配器。
pub struct GoogleSpeechProvider {
    name: String,
    endpoint: String,
    api_key: String,
    language_code: String,
    sample_rate_hz: u32,
    agent: ureq::Agent,
}

impl GoogleSpeechProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "google".to_string(),
            endpoint: DEFAULT_GOOGLE_ENDPOINT.to_string(),
            api_key: api_key.into(),
            language_code: "en-US".to_string(),
            sample_rate_hz: 16_000,
            agent: http_agent(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_language(mut self, language_code: impl Into<String>) -> Self {
        self.language_code = language_code.into();
        self
    }

    fn encoding_for(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::Wav => "LINEAR16",
            AudioFormat::Webm => "WEBM_OPUS",
            _ => "ENCODING_UNSPECIFIED",
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleRecognizeResponse {
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Debug, Deserialize)]
struct GoogleResult {
    #[serde(default)]
    alternatives: Vec<GoogleAlternative>,
}

#[derive(Debug, Deserialize)]
struct GoogleAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
}

#[async_trait]
impl TranscriptionProvider for GoogleSpeechProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn transcribe(&self, audio: &AudioChunk) -> Result<ProviderResponse, ProviderError> {
        let agent = self.agent.clone();
        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let payload = json!({
            "config": {
                "encoding": Self::encoding_for(audio.format),
                "sampleRateHertz": self.sample_rate_hz,
                "languageCode": self.language_code,
                "enableAutomaticPunctuation": true,
                "useEnhanced": true,
                "maxAlternatives": 1,
            },
            "audio": {
                "content": general_purpose::STANDARD.encode(&audio.data),
            },
        });

        let raw = tokio::task::spawn_blocking(move || {
            agent
                .post(&url)
                .set("Content-Type", "application/json")
                .send_string(&payload.to_string())
                .map_err(map_ureq_error)?
                .into_string()
                .map_err(|err| ProviderError::InvalidResponse(err.to_string()))
        })
        .await
        .map_err(|err| ProviderError::Unavailable(format!("blocking task failed: {err}")))??;

        let parsed: GoogleRecognizeResponse = serde_json::from_str(&raw)
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;

        // 无结果按空转写处理，与上游的静音响应语义一致。
        let Some(alternative) = parsed
            .results
            .into_iter()
            .next()
            .and_then(|result| result.alternatives.into_iter().next())
        else {
            return Ok(ProviderResponse {
                transcript: String::new(),
                confidence: Some(0.0),
            });
        };

        let confidence = alternative
            .confidence
            .unwrap_or_else(|| length_confidence(&alternative.transcript));
        Ok(ProviderResponse {
            transcript: alternative.transcript.trim().to_string(),
            confidence: Some(confidence),
        })
    }
}

/// 根据环境变量注册可用的提供方，返回注册数量。
pub fn register_env_providers(router: &mut FailoverRouter) -> usize {
    let mut registered = 0;

    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        let mut provider = WhisperApiProvider::new(api_key);
        if let Ok(endpoint) = std::env::var("MEMOVOICE_WHISPER_ENDPOINT") {
            provider = provider.with_endpoint(endpoint);
        }
        router.register(
            ProviderConfig::new("whisper", 1),
            Arc::new(provider) as Arc<dyn TranscriptionProvider>,
        );
        registered += 1;
    }

    if let Ok(api_key) = std::env::var("GOOGLE_SPEECH_API_KEY") {
        let mut provider = GoogleSpeechProvider::new(api_key);
        if let Ok(endpoint) = std::env::var("MEMOVOICE_GOOGLE_ENDPOINT") {
            provider = provider.with_endpoint(endpoint);
        }
        router.register(
            ProviderConfig::new("google", 2),
            Arc::new(provider) as Arc<dyn TranscriptionProvider>,
        );
        registered += 1;
    }

    info!(
        target: "failover_router",
        registered,
        "environment provider registration finished"
    );
    registered
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn length_confidence_bands() {
        assert_eq!(length_confidence(""), 0.0);
        assert_eq!(length_confidence("hi"), 0.6);
        assert_eq!(length_confidence("hello there"), 0.8);
    }

    #[test]
    fn whisper_confidence_averages_segments() {
        let response = WhisperResponse {
            text: "hello".to_string(),
            segments: vec![
                WhisperSegment { avg_logprob: -0.2 },
                WhisperSegment { avg_logprob: -0.6 },
            ],
        };
        let confidence = response.confidence();
        assert!((confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn whisper_confidence_falls_back_to_length() {
        let response = WhisperResponse {
            text: "hello there".to_string(),
            segments: Vec::new(),
        };
        assert_eq!(response.confidence(), 0.8);
    }

    #[test]
    fn multipart_body_contains_fields_and_payload() {
        let provider = WhisperApiProvider::new("key");
        let chunk = AudioChunk::new(Bytes::from_static(b"PCMDATA"), AudioFormat::Wav);
        let body = provider.multipart_body(&chunk);
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("name=\"model\""));
        assert!(text.contains("whisper-1"));
        assert!(text.contains("filename=\"audio.wav\""));
        assert!(text.contains("PCMDATA"));
        assert!(text.ends_with(&format!("--{MULTIPART_BOUNDARY}--\r\n")));
    }

    #[test]
    fn google_encoding_mapping() {
        assert_eq!(GoogleSpeechProvider::encoding_for(AudioFormat::Wav), "LINEAR16");
        assert_eq!(
            GoogleSpeechProvider::encoding_for(AudioFormat::Webm),
            "WEBM_OPUS"
        );
        assert_eq!(
            GoogleSpeechProvider::encoding_for(AudioFormat::Mp3),
            "ENCODING_UNSPECIFIED"
        );
    }
}
