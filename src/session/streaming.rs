//! 流式练习的工作协程。
//!
//! 宿主推送的音量样本与音频块经由单一 mpsc 队列进入本协程，
//! 所有会话变更按到达顺序串行执行；中间转写在子任务里发起，
//! 其结果同样回注队列，保持单写者语义。

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::boundary::{BoundaryEvent, DetectorPhase, UtteranceDetector};
use crate::audio::AudioChunk;
use crate::telemetry::events::record_utterance_boundary;

use super::events::PracticeEvent;
use super::{CoordinatorInner, SessionError};

pub(crate) enum StreamInput {
    Volume { level: f32, at: Instant },
    Audio(Bytes),
    InterimTranscript(String),
}

/// 宿主侧的流式输入句柄。克隆共享同一条输入队列。
#[derive(Clone)]
pub struct StreamingSessionHandle {
    input_tx: mpsc::Sender<StreamInput>,
}

impl StreamingSessionHandle {
    pub(crate) fn new(input_tx: mpsc::Sender<StreamInput>) -> Self {
        Self { input_tx }
    }

    /// 推送一个音量采样，时间戳取当前墙钟。
    pub async fn push_volume(&self, level: f32) -> Result<(), SessionError> {
        self.input_tx
            .send(StreamInput::Volume {
                level,
                at: Instant::now(),
            })
            .await
            .map_err(|_| SessionError::StreamingInactive)
    }

    /// 推送一段原始音频。
    pub async fn push_audio(&self, chunk: Bytes) -> Result<(), SessionError> {
        self.input_tx
            .send(StreamInput::Audio(chunk))
            .await
            .map_err(|_| SessionError::StreamingInactive)
    }
}

pub(crate) fn spawn_stream_worker(
    inner: Arc<CoordinatorInner>,
    input_tx: mpsc::Sender<StreamInput>,
    mut input_rx: mpsc::Receiver<StreamInput>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut detector = UtteranceDetector::new(inner.config.boundary.clone());

        while let Some(input) = input_rx.recv().await {
            match input {
                StreamInput::Volume { level, at } => {
                    inner.emit(PracticeEvent::VolumeUpdate { level });
                    match detector.handle_volume(level, at) {
                        Some(BoundaryEvent::SpeechStarted) => {
                            debug!(target: "stream_detector", "speech started");
                        }
                        Some(BoundaryEvent::UtteranceEnded(utterance)) => {
                            record_utterance_boundary(utterance.duration(), utterance.audio.len());
                            if handle_utterance(&inner, utterance.audio).await {
                                info!(
                                    target: "stream_detector",
                                    "session completed, stopping stream worker"
                                );
                                break;
                            }
                        }
                        None => {
                            if detector.interim_due(at) && inner.router.streaming_supported() {
                                spawn_interim_request(
                                    &inner,
                                    detector.interim_snapshot(),
                                    input_tx.clone(),
                                );
                            }
                        }
                    }
                }
                StreamInput::Audio(chunk) => {
                    detector.push_audio(&chunk);
                }
                StreamInput::InterimTranscript(transcript) => {
                    // 迟到的中间结果（发音已结束）直接丢弃。
                    if detector.phase() == DetectorPhase::Active
                        && detector.accept_interim_text(&transcript)
                    {
                        inner.emit(PracticeEvent::InterimResult { transcript });
                    }
                }
            }
        }
    })
}

/// 返回 true 表示会话在本次发音后完成。
async fn handle_utterance(inner: &Arc<CoordinatorInner>, audio: Bytes) -> bool {
    let chunk = AudioChunk::new(audio, inner.config.audio_format);
    if let Err(err) = chunk.validate() {
        warn!(
            target: "stream_detector",
            %err,
            "discarding malformed utterance audio"
        );
        return false;
    }

    let result = match inner.router.transcribe(&chunk).await {
        Ok(result) => result,
        Err(err) => {
            warn!(
                target: "stream_detector",
                %err,
                "utterance transcription failed"
            );
            return false;
        }
    };

    match inner.run_attempt_serialized(result.transcript).await {
        Ok(outcome) => outcome.session_complete,
        Err(err) => {
            warn!(
                target: "stream_detector",
                %err,
                "failed to score streamed attempt"
            );
            false
        }
    }
}

fn spawn_interim_request(
    inner: &Arc<CoordinatorInner>,
    snapshot: Bytes,
    input_tx: mpsc::Sender<StreamInput>,
) {
    let chunk = AudioChunk::new(snapshot, inner.config.audio_format);
    if chunk.validate().is_err() {
        return;
    }
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        match inner.router.transcribe(&chunk).await {
            Ok(result) if !result.transcript.trim().is_empty() => {
                let _ = input_tx
                    .send(StreamInput::InterimTranscript(result.transcript))
                    .await;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(
                    target: "stream_detector",
                    %err,
                    "interim transcription failed"
                );
            }
        }
    });
}
