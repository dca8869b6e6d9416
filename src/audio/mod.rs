//! 音频分块定义与提交前校验。

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod boundary;

/// 可提交给识别服务的音频封装格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Webm,
    Mp3,
    Mp4,
    Mpeg,
    Mpga,
    M4a,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Webm => "webm",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Mp4 => "mp4",
            AudioFormat::Mpeg => "mpeg",
            AudioFormat::Mpga => "mpga",
            AudioFormat::M4a => "m4a",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AudioError> {
        match value.to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "webm" => Ok(AudioFormat::Webm),
            "mp3" => Ok(AudioFormat::Mp3),
            "mp4" => Ok(AudioFormat::Mp4),
            "mpeg" => Ok(AudioFormat::Mpeg),
            "mpga" => Ok(AudioFormat::Mpga),
            "m4a" => Ok(AudioFormat::M4a),
            other => Err(AudioError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// 最短可识别负载，约 0.25 秒的 16kHz 单声道 PCM。
pub const MIN_PAYLOAD_BYTES: usize = 8_000;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio payload is empty")]
    Empty,
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("audio payload too short: {actual} bytes, minimum {minimum}")]
    TooShort { actual: usize, minimum: usize },
}

/// 一段待识别的音频。
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub data: Bytes,
    pub format: AudioFormat,
}

impl AudioChunk {
    pub fn new(data: Bytes, format: AudioFormat) -> Self {
        Self { data, format }
    }

    /// 提交前校验：空载荷和过短载荷直接拒绝，不进入故障转移。
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.data.is_empty() {
            return Err(AudioError::Empty);
        }
        if self.data.len() < MIN_PAYLOAD_BYTES {
            return Err(AudioError::TooShort {
                actual: self.data.len(),
                minimum: MIN_PAYLOAD_BYTES,
            });
        }
        Ok(())
    }
}
