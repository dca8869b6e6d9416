//! 练习会话协调器脚手架。

pub mod events;
pub mod feedback;
pub mod ledger;
pub mod phrase;
pub mod policy;
pub mod state;

mod streaming;


use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Instant, SystemTime};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audio::boundary::BoundaryConfig;
use crate::audio::{AudioChunk, AudioError, AudioFormat};
use crate::recognition::{FailoverRouter, ProviderSnapshot, RecognitionError};
use crate::scoring::{DiffKind, MatchScorer, ScoringConfig};
use crate::telemetry::events::{record_attempt_scored, record_session_completed};

pub use events::{AttemptOutcome, PracticeEvent};
pub use feedback::{ChatCompletionCoach, CoachingGenerator, RuleBasedCoach};
pub use ledger::{MissedWordLedger, MissedWordRecord};
pub use phrase::{segment_phrases, Phrase};
pub use policy::{AdvanceDecision, HintLevel};
pub use state::{PhraseAttempt, SessionOptions, SessionSummary};
pub use streaming::StreamingSessionHandle;

use state::PracticeSession;
use streaming::spawn_stream_worker;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const STREAM_CHANNEL_CAPACITY: usize = 128;

/// 会话层错误。
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no active practice session")]
    NoActiveSession,
    #[error("source text contains no practicable words")]
    EmptyText,
    #[error("practice session already finished")]
    SessionFinished,
    #[error("another attempt is still being scored")]
    AttemptInFlight,
    #[error("streaming session already active")]
    StreamingActive,
    #[error("streaming session is not active")]
    StreamingInactive,
    #[error(transparent)]
    MalformedAudio(#[from] AudioError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

/// 协调器构造参数。
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub scoring: ScoringConfig,
    pub boundary: BoundaryConfig,
    /// 发音片段提交识别时声明的封装格式。
    pub audio_format: AudioFormat,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            boundary: BoundaryConfig::default(),
            audio_format: AudioFormat::Wav,
        }
    }
}

pub(crate) struct CoordinatorInner {
    pub(crate) router: Arc<FailoverRouter>,
    pub(crate) config: CoordinatorConfig,
    scorer: MatchScorer,
    coach: Arc<dyn CoachingGenerator>,
    session: StdMutex<Option<PracticeSession>>,
    /// 串行化所有尝试处理；宿主直连调用用 try_lock 立即拒绝并发。
    attempt_gate: AsyncMutex<()>,
    events_tx: broadcast::Sender<PracticeEvent>,
}

struct ActiveStream {
    handle: StreamingSessionHandle,
    worker: JoinHandle<()>,
}

/// 组合路由、评分、推进策略与边界检测的会话协调器。
///
/// 单实例同一时间只承载一个活跃会话；所有会话变更串行执行。
pub struct PracticeCoordinator {
    inner: Arc<CoordinatorInner>,
    switch_forwarder: JoinHandle<()>,
    streaming: StdMutex<Option<ActiveStream>>,
}

impl PracticeCoordinator {
    pub fn new(router: Arc<FailoverRouter>, config: CoordinatorConfig) -> Self {
        Self::with_coach(router, config, Arc::new(RuleBasedCoach))
    }

    pub fn with_coach(
        router: Arc<FailoverRouter>,
        config: CoordinatorConfig,
        coach: Arc<dyn CoachingGenerator>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let scorer = MatchScorer::new(config.scoring.clone());
        let inner = Arc::new(CoordinatorInner {
            router,
            config,
            scorer,
            coach,
            session: StdMutex::new(None),
            attempt_gate: AsyncMutex::new(()),
            events_tx,
        });

        let switch_forwarder = spawn_switch_forwarder(Arc::clone(&inner));

        Self {
            inner,
            switch_forwarder,
            streaming: StdMutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PracticeEvent> {
        self.inner.events_tx.subscribe()
    }

    /// 切分源文本并建立新会话，返回短语数。已有会话被替换。
    pub fn initialize_session(
        &self,
        text: &str,
        options: SessionOptions,
    ) -> Result<usize, SessionError> {
        let _gate = self
            .inner
            .attempt_gate
            .try_lock()
            .map_err(|_| SessionError::AttemptInFlight)?;
        let phrases = segment_phrases(text, options.phrase_length);
        if phrases.is_empty() {
            return Err(SessionError::EmptyText);
        }
        let count = phrases.len();
        info!(
            target: "practice_session",
            phrases = count,
            phrase_length = options.phrase_length,
            "initializing practice session"
        );
        let mut guard = self.inner.lock_session();
        *guard = Some(PracticeSession::new(text.to_string(), phrases));
        Ok(count)
    }

    /// 丢弃当前会话与其台账。
    pub fn reset_session(&self) -> Result<(), SessionError> {
        let _gate = self
            .inner
            .attempt_gate
            .try_lock()
            .map_err(|_| SessionError::AttemptInFlight)?;
        let mut guard = self.inner.lock_session();
        if guard.take().is_some() {
            info!(target: "practice_session", "practice session reset");
        }
        Ok(())
    }

    pub fn current_phrase(&self) -> Option<Phrase> {
        self.inner
            .lock_session()
            .as_ref()
            .and_then(|session| session.current_phrase().cloned())
    }

    /// 对当前短语评分一条转写文本。
    ///
    /// 上一次尝试仍在评分时立即拒绝，不排队。
    pub async fn process_attempt(&self, transcript: &str) -> Result<AttemptOutcome, SessionError> {
        let _gate = self
            .inner
            .attempt_gate
            .try_lock()
            .map_err(|_| SessionError::AttemptInFlight)?;
        self.inner.run_attempt(transcript.to_string()).await
    }

    /// 提交一段音频：校验、路由识别、评分一气呵成。
    ///
    /// 校验失败立即上抛，不触发故障转移。
    pub async fn process_audio_attempt(
        &self,
        chunk: AudioChunk,
    ) -> Result<AttemptOutcome, SessionError> {
        chunk.validate()?;
        let _gate = self
            .inner
            .attempt_gate
            .try_lock()
            .map_err(|_| SessionError::AttemptInFlight)?;
        let result = self.inner.router.transcribe(&chunk).await?;
        self.inner.run_attempt(result.transcript).await
    }

    /// 手动跳到下一条短语，返回新的当前短语。
    pub async fn advance_to_next_phrase(&self) -> Result<Option<Phrase>, SessionError> {
        let _gate = self
            .inner
            .attempt_gate
            .try_lock()
            .map_err(|_| SessionError::AttemptInFlight)?;

        let (next, summary) = {
            let mut guard = self.inner.lock_session();
            let session = guard.as_mut().ok_or(SessionError::NoActiveSession)?;
            if session.is_complete() {
                return Err(SessionError::SessionFinished);
            }
            let completed = session.advance();
            let summary = completed.then(|| session.summary());
            (session.current_phrase().cloned(), summary)
        };

        if let Some(summary) = summary {
            record_session_completed(
                summary.phrases_completed,
                summary.total_attempts,
                summary.overall_accuracy,
                summary.elapsed,
            );
            self.inner.emit(PracticeEvent::SessionComplete { summary });
        }
        Ok(next)
    }

    /// 会话摘要。只读，不推进任何状态。
    pub fn session_summary(&self) -> Result<SessionSummary, SessionError> {
        self.inner
            .lock_session()
            .as_ref()
            .map(|session| session.summary())
            .ok_or(SessionError::NoActiveSession)
    }

    /// 提供方状态的只读快照。
    pub fn provider_status(&self) -> Vec<ProviderSnapshot> {
        self.inner.router.provider_status()
    }

    /// 启动流式会话，返回可供宿主推送样本的句柄。
    pub fn start_streaming_session(&self) -> Result<StreamingSessionHandle, SessionError> {
        {
            let guard = self.inner.lock_session();
            if guard.is_none() {
                return Err(SessionError::NoActiveSession);
            }
        }
        let mut streaming = self.lock_streaming();
        if streaming.is_some() {
            return Err(SessionError::StreamingActive);
        }

        let (input_tx, input_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let handle = StreamingSessionHandle::new(input_tx.clone());
        let worker = spawn_stream_worker(Arc::clone(&self.inner), input_tx, input_rx);
        info!(target: "practice_session", "streaming session started");
        *streaming = Some(ActiveStream {
            handle: handle.clone(),
            worker,
        });
        Ok(handle)
    }

    /// 停止流式会话：中止工作协程，取消在途识别请求，丢弃流式状态。
    pub fn stop_streaming_session(&self) {
        let mut streaming = self.lock_streaming();
        if let Some(active) = streaming.take() {
            active.worker.abort();
            drop(active.handle);
            info!(target: "practice_session", "streaming session stopped");
        }
    }

    pub fn streaming_handle(&self) -> Option<StreamingSessionHandle> {
        self.lock_streaming()
            .as_ref()
            .map(|active| active.handle.clone())
    }

    fn lock_streaming(&self) -> std::sync::MutexGuard<'_, Option<ActiveStream>> {
        self.streaming.lock().expect("streaming lock poisoned")
    }
}

impl Drop for PracticeCoordinator {
    fn drop(&mut self) {
        self.switch_forwarder.abort();
        if let Ok(mut streaming) = self.streaming.lock() {
            if let Some(active) = streaming.take() {
                active.worker.abort();
            }
        }
    }
}

impl CoordinatorInner {
    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<PracticeSession>> {
        self.session.lock().expect("session lock poisoned")
    }

    pub(crate) fn emit(&self, event: PracticeEvent) {
        let _ = self.events_tx.send(event);
    }

    /// 流式路径的入口：排队等待而不是拒绝，维持单一有序事件队列。
    pub(crate) async fn run_attempt_serialized(
        &self,
        transcript: String,
    ) -> Result<AttemptOutcome, SessionError> {
        let _gate = self.attempt_gate.lock().await;
        self.run_attempt(transcript).await
    }

    /// 评分一次尝试并应用推进决策。调用方必须已持有 attempt_gate。
    async fn run_attempt(&self, transcript: String) -> Result<AttemptOutcome, SessionError> {
        let started = Instant::now();
        let phrase = {
            let guard = self.lock_session();
            let session = guard.as_ref().ok_or(SessionError::NoActiveSession)?;
            session
                .current_phrase()
                .cloned()
                .ok_or(SessionError::SessionFinished)?
        };

        let score = self.scorer.score(&phrase.text(), &transcript);
        let decision = policy::evaluate(score.accuracy, score.error_count);

        // 教练失败只降级，不阻塞推进。
        let feedback = match self.coach.coach(&phrase, &score.diff).await {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(
                    target: "practice_session",
                    %err,
                    "feedback generation failed, continuing without commentary"
                );
                None
            }
        };

        let (outcome, summary) = {
            let mut guard = self.lock_session();
            let session = guard.as_mut().ok_or(SessionError::NoActiveSession)?;

            for entry in &score.diff {
                if matches!(entry.kind, DiffKind::Missing | DiffKind::Substituted) {
                    if let Some(expected) = entry.expected.as_deref() {
                        session.ledger.record(expected);
                    }
                }
            }

            let hint = if decision == AdvanceDecision::Hint {
                let level = match session.hint_level {
                    None => HintLevel::FirstLetter,
                    Some(level) => level.escalate(),
                };
                session.hint_level = Some(level);
                Some(policy::hint_text(&phrase, &score.diff, level))
            } else {
                None
            };

            session.record_attempt(PhraseAttempt {
                phrase_index: phrase.index,
                transcript: transcript.clone(),
                diff: score.diff.clone(),
                accuracy: score.accuracy,
                similarity: score.similarity,
                decision,
                scored_at: SystemTime::now(),
            });

            let session_complete = decision.advances() && session.advance();

            record_attempt_scored(
                phrase.index,
                score.accuracy,
                score.error_count,
                decision.as_str(),
                started.elapsed(),
            );

            let summary = if session_complete {
                let summary = session.summary();
                record_session_completed(
                    summary.phrases_completed,
                    summary.total_attempts,
                    summary.overall_accuracy,
                    summary.elapsed,
                );
                Some(summary)
            } else {
                None
            };

            (
                AttemptOutcome {
                    phrase_index: phrase.index,
                    transcript,
                    accuracy: score.accuracy,
                    similarity: score.similarity,
                    decision,
                    diff: score.diff,
                    feedback,
                    hint,
                    session_complete,
                },
                summary,
            )
        };

        self.emit(PracticeEvent::FinalResult {
            outcome: outcome.clone(),
        });
        if let Some(summary) = summary {
            self.emit(PracticeEvent::SessionComplete { summary });
        }
        Ok(outcome)
    }
}

fn spawn_switch_forwarder(inner: Arc<CoordinatorInner>) -> JoinHandle<()> {
    let mut switches = inner.router.subscribe_switches();
    tokio::spawn(async move {
        loop {
            match switches.recv().await {
                Ok(switch) => {
                    inner.emit(PracticeEvent::ProviderSwitched {
                        from: switch.from,
                        to: switch.to,
                    });
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        target: "practice_session",
                        skipped,
                        "provider switch notifications lagged"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
