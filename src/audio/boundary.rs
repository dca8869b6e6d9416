//! 语音/静音边界检测状态机。
//!
//! 消费宿主按周期推送的 (音量, 时间戳) 样本，将连续音频流切分为离散的
//! 发音片段。单线程、按样本驱动，不持有任何任务或定时器。

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

/// 进入活跃态之前保留的静音前滚字节数，避免截掉发音起始。
const PREROLL_BYTES: usize = 16_000;

/// 边界检测参数。
#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    /// 判定为语音的音量阈值（0..1 归一化电平）。
    pub speech_threshold: f32,
    /// 连续超阈样本数，低于该数量的尖峰视为瞬态噪声。
    pub activation_samples: u32,
    /// 判定发音结束所需的连续静音时长（墙钟时间，而非样本数）。
    pub silence_window: Duration,
    /// 活跃期间发起中间转写请求的最小间隔。
    pub interim_interval: Duration,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            speech_threshold: 0.05,
            activation_samples: 3,
            silence_window: Duration::from_millis(1_200),
            interim_interval: Duration::from_millis(600),
        }
    }
}

/// 当前检测相位。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    Silent,
    Active,
}

/// 一段完整的发音片段。
#[derive(Debug, Clone)]
pub struct Utterance {
    pub audio: Bytes,
    pub started_at: Instant,
    pub ended_at: Instant,
}

impl Utterance {
    pub fn duration(&self) -> Duration {
        self.ended_at.saturating_duration_since(self.started_at)
    }
}

/// 相位迁移产生的事件。
#[derive(Debug)]
pub enum BoundaryEvent {
    SpeechStarted,
    UtteranceEnded(Utterance),
}

pub struct UtteranceDetector {
    config: BoundaryConfig,
    phase: DetectorPhase,
    consecutive_loud: u32,
    silence_since: Option<Instant>,
    speech_started: Option<Instant>,
    buffer: BytesMut,
    last_interim_at: Option<Instant>,
    last_interim_text: Option<String>,
}

impl UtteranceDetector {
    pub fn new(config: BoundaryConfig) -> Self {
        Self {
            config,
            phase: DetectorPhase::Silent,
            consecutive_loud: 0,
            silence_since: None,
            speech_started: None,
            buffer: BytesMut::new(),
            last_interim_at: None,
            last_interim_text: None,
        }
    }

    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    /// 处理一个音量样本，返回由它触发的相位迁移事件。
    ///
    /// 静音期样本到达节奏可以不规则：结束判定只看墙钟时间差，
    /// 发音结束时恰好发出一个边界事件，后续静音不再重复。
    pub fn handle_volume(&mut self, level: f32, at: Instant) -> Option<BoundaryEvent> {
        if level >= self.config.speech_threshold {
            self.silence_since = None;
            match self.phase {
                DetectorPhase::Silent => {
                    self.consecutive_loud += 1;
                    if self.consecutive_loud >= self.config.activation_samples {
                        self.phase = DetectorPhase::Active;
                        self.speech_started = Some(at);
                        self.last_interim_at = Some(at);
                        return Some(BoundaryEvent::SpeechStarted);
                    }
                }
                DetectorPhase::Active => {}
            }
            return None;
        }

        match self.phase {
            DetectorPhase::Silent => {
                self.consecutive_loud = 0;
                None
            }
            DetectorPhase::Active => {
                let since = *self.silence_since.get_or_insert(at);
                if at.saturating_duration_since(since) >= self.config.silence_window {
                    let audio = self.buffer.split().freeze();
                    let started_at = self.speech_started.unwrap_or(since);
                    let utterance = Utterance {
                        audio,
                        started_at,
                        ended_at: at,
                    };
                    self.reset();
                    return Some(BoundaryEvent::UtteranceEnded(utterance));
                }
                None
            }
        }
    }

    /// 追加一段原始音频。静音期只保留固定长度的前滚尾部。
    pub fn push_audio(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        if self.phase == DetectorPhase::Silent && self.buffer.len() > PREROLL_BYTES {
            let excess = self.buffer.len() - PREROLL_BYTES;
            let _ = self.buffer.split_to(excess);
        }
    }

    /// 活跃期内按节流间隔判断是否应发起一次中间转写请求。
    pub fn interim_due(&mut self, at: Instant) -> bool {
        if self.phase != DetectorPhase::Active || self.buffer.is_empty() {
            return false;
        }
        match self.last_interim_at {
            Some(last) if at.saturating_duration_since(last) < self.config.interim_interval => {
                false
            }
            _ => {
                self.last_interim_at = Some(at);
                true
            }
        }
    }

    /// 当前累积音频的快照，用于中间转写。
    pub fn interim_snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buffer)
    }

    /// 去重中间转写文本：与上一条相同时返回 false。
    pub fn accept_interim_text(&mut self, text: &str) -> bool {
        if self.last_interim_text.as_deref() == Some(text) {
            return false;
        }
        self.last_interim_text = Some(text.to_string());
        true
    }

    fn reset(&mut self) {
        self.phase = DetectorPhase::Silent;
        self.consecutive_loud = 0;
        self.silence_since = None;
        self.speech_started = None;
        self.buffer.clear();
        self.last_interim_at = None;
        self.last_interim_text = None;
    }
}
