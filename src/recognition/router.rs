//! 多提供方故障转移路由。
//!
//! 进程级共享：所有会话只读消费识别结果，提供方健康状态、限流窗口与
//! 主用标记仅由本路由器变更。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::audio::AudioChunk;
use crate::telemetry::events::record_provider_switch;

use super::config::{ProviderConfig, RouterConfig};
use super::traits::TranscriptionProvider;
use super::types::{
    ProviderError, ProviderSnapshot, ProviderSwitch, RecognitionError, RecognitionResult,
};

const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Default)]
struct ProviderState {
    consecutive_errors: u32,
    unhealthy_since: Option<Instant>,
    window: VecDeque<Instant>,
    last_used: Option<SystemTime>,
}

struct RegisteredProvider {
    config: ProviderConfig,
    adapter: Arc<dyn TranscriptionProvider>,
    state: Mutex<ProviderState>,
}

pub struct FailoverRouter {
    config: RouterConfig,
    providers: Vec<RegisteredProvider>,
    last_primary: Mutex<Option<String>>,
    switch_tx: broadcast::Sender<ProviderSwitch>,
}

impl FailoverRouter {
    pub fn new(config: RouterConfig) -> Self {
        let (switch_tx, _) = broadcast::channel(16);
        Self {
            config,
            providers: Vec::new(),
            last_primary: Mutex::new(None),
            switch_tx,
        }
    }

    /// 显式注册一个提供方。注册顺序之外按优先级稳定排序。
    pub fn register(&mut self, config: ProviderConfig, adapter: Arc<dyn TranscriptionProvider>) {
        info!(
            target: "failover_router",
            provider = %config.name,
            priority = config.priority,
            enabled = config.enabled,
            "registering transcription provider"
        );
        self.providers.push(RegisteredProvider {
            config,
            adapter,
            state: Mutex::new(ProviderState::default()),
        });
        self.providers.sort_by_key(|provider| provider.config.priority);
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn subscribe_switches(&self) -> broadcast::Receiver<ProviderSwitch> {
        self.switch_tx.subscribe()
    }

    /// 当前会被选中的最高优先级提供方。
    pub fn select_provider(&self) -> Result<String, RecognitionError> {
        let now = Instant::now();
        self.providers
            .iter()
            .find(|provider| self.is_eligible(provider, now))
            .map(|provider| provider.config.name.clone())
            .ok_or(RecognitionError::NoProviderAvailable)
    }

    /// 当前主用提供方是否支持增量转写。
    pub fn streaming_supported(&self) -> bool {
        let now = Instant::now();
        self.providers
            .iter()
            .find(|provider| self.is_eligible(provider, now))
            .map(|provider| provider.adapter.supports_streaming())
            .unwrap_or(false)
    }

    /// 按优先级尝试所有合格提供方，每个至多一次。
    ///
    /// 限流中的提供方直接跳过，不排队等待；单提供方的失败只记录并
    /// 转移到下一候选，仅在全部耗尽时上抛。
    pub async fn transcribe(
        &self,
        audio: &AudioChunk,
    ) -> Result<RecognitionResult, RecognitionError> {
        let mut last_failure: Option<(String, ProviderError)> = None;

        for provider in &self.providers {
            let name = provider.config.name.clone();
            let now = Instant::now();
            if !provider.config.enabled || !self.is_healthy(provider, now) {
                continue;
            }
            if self.is_rate_limited(provider, now) {
                debug!(
                    target: "failover_router",
                    provider = %name,
                    "skipping rate-limited provider"
                );
                continue;
            }

            self.note_request(provider, now);
            let started = Instant::now();
            let outcome = match timeout(
                self.config.request_timeout,
                provider.adapter.transcribe(audio),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    timeout_ms: self.config.request_timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(response) => {
                    self.mark_success(provider);
                    self.note_primary(&name);
                    return Ok(RecognitionResult {
                        transcript: response.transcript,
                        confidence: response.confidence.unwrap_or(0.0),
                        provider: name,
                        latency: started.elapsed(),
                        success: true,
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(
                        target: "failover_router",
                        provider = %name,
                        %err,
                        "provider call failed, trying next candidate"
                    );
                    self.mark_failure(provider);
                    last_failure = Some((name, err));
                }
            }
        }

        match last_failure {
            Some((provider, source)) => {
                Err(RecognitionError::AllProvidersFailed { provider, source })
            }
            None => Err(RecognitionError::NoProviderAvailable),
        }
    }

    /// 对外只读的状态快照。
    pub fn provider_status(&self) -> Vec<ProviderSnapshot> {
        let now = Instant::now();
        self.providers
            .iter()
            .map(|provider| {
                let mut state = self.lock_state(provider);
                prune_window(&mut state.window, now);
                ProviderSnapshot {
                    name: provider.config.name.clone(),
                    priority: provider.config.priority,
                    enabled: provider.config.enabled,
                    healthy: healthy_at(&state, &self.config, now),
                    supports_streaming: provider.adapter.supports_streaming(),
                    consecutive_errors: state.consecutive_errors,
                    requests_last_minute: state.window.len() as u32,
                    rate_limit_per_minute: provider.config.rate_limit_per_minute,
                    last_used_epoch_ms: state.last_used.and_then(|used| {
                        used.duration_since(UNIX_EPOCH)
                            .ok()
                            .map(|elapsed| elapsed.as_millis() as u64)
                    }),
                }
            })
            .collect()
    }

    fn is_eligible(&self, provider: &RegisteredProvider, now: Instant) -> bool {
        provider.config.enabled
            && self.is_healthy(provider, now)
            && !self.is_rate_limited(provider, now)
    }

    fn is_healthy(&self, provider: &RegisteredProvider, now: Instant) -> bool {
        let state = self.lock_state(provider);
        healthy_at(&state, &self.config, now)
    }

    fn is_rate_limited(&self, provider: &RegisteredProvider, now: Instant) -> bool {
        let Some(limit) = provider.config.rate_limit_per_minute else {
            return false;
        };
        let mut state = self.lock_state(provider);
        prune_window(&mut state.window, now);
        state.window.len() as u32 >= limit
    }

    fn note_request(&self, provider: &RegisteredProvider, now: Instant) {
        let mut state = self.lock_state(provider);
        prune_window(&mut state.window, now);
        state.window.push_back(now);
    }

    fn mark_success(&self, provider: &RegisteredProvider) {
        let mut state = self.lock_state(provider);
        state.consecutive_errors = 0;
        state.unhealthy_since = None;
        state.last_used = Some(SystemTime::now());
    }

    fn mark_failure(&self, provider: &RegisteredProvider) {
        let mut state = self.lock_state(provider);
        state.consecutive_errors = state.consecutive_errors.saturating_add(1);
        if state.consecutive_errors >= self.config.error_threshold {
            // 半开重试失败也会重置冷却起点。
            state.unhealthy_since = Some(Instant::now());
            warn!(
                target: "failover_router",
                provider = %provider.config.name,
                consecutive_errors = state.consecutive_errors,
                cooldown_ms = self.config.cooldown.as_millis() as u64,
                "provider marked unhealthy"
            );
        }
    }

    fn note_primary(&self, name: &str) {
        let mut primary = self
            .last_primary
            .lock()
            .expect("primary lock poisoned");
        if primary.as_deref() == Some(name) {
            return;
        }
        let previous = primary.replace(name.to_string());
        let reason = if previous.is_some() {
            "failover"
        } else {
            "initial_selection"
        };
        info!(
            target: "failover_router",
            from = previous.as_deref().unwrap_or("-"),
            to = %name,
            reason,
            "primary provider switched"
        );
        record_provider_switch(previous.as_deref(), name, reason);
        let _ = self.switch_tx.send(ProviderSwitch {
            from: previous,
            to: name.to_string(),
        });
    }

    fn lock_state<'a>(&self, provider: &'a RegisteredProvider) -> std::sync::MutexGuard<'a, ProviderState> {
        provider.state.lock().expect("provider state lock poisoned")
    }
}

fn healthy_at(state: &ProviderState, config: &RouterConfig, now: Instant) -> bool {
    if state.consecutive_errors < config.error_threshold {
        return true;
    }
    match state.unhealthy_since {
        Some(since) => now.saturating_duration_since(since) >= config.cooldown,
        None => true,
    }
}

fn prune_window(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = window.front() {
        if now.saturating_duration_since(*front) >= RATE_WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}
