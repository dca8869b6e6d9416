use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) const TARGET: &str = "telemetry::practice";
pub(crate) const EVENT_PROVIDER_SWITCH: &str = "provider_switch";
pub(crate) const EVENT_ATTEMPT_SCORED: &str = "attempt_scored";
pub(crate) const EVENT_UTTERANCE: &str = "utterance_boundary";
pub(crate) const EVENT_SESSION_COMPLETED: &str = "session_completed";

#[derive(Debug, Serialize)]
pub struct ProviderSwitchEvent {
    pub from: Option<String>,
    pub to: String,
    pub reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AttemptScoredEvent {
    pub phrase_index: usize,
    pub accuracy: f64,
    pub error_count: usize,
    pub decision: &'static str,
    pub latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct UtteranceBoundaryEvent {
    pub duration_ms: u64,
    pub audio_bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionCompletedEvent {
    pub phrases_completed: usize,
    pub total_attempts: usize,
    pub overall_accuracy: f64,
    pub duration_ms: u64,
}

pub fn record_provider_switch(from: Option<&str>, to: &str, reason: &'static str) {
    let event = ProviderSwitchEvent {
        from: from.map(str::to_string),
        to: to.to_string(),
        reason,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_PROVIDER_SWITCH,
            to = event.to,
            reason = event.reason,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_PROVIDER_SWITCH,
            %err,
            "failed to encode provider switch event"
        ),
    }
}

pub fn record_attempt_scored(
    phrase_index: usize,
    accuracy: f64,
    error_count: usize,
    decision: &'static str,
    latency: Duration,
) {
    let event = AttemptScoredEvent {
        phrase_index,
        accuracy,
        error_count,
        decision,
        latency_ms: duration_to_ms(latency),
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_ATTEMPT_SCORED,
            phrase_index = event.phrase_index,
            accuracy = event.accuracy,
            error_count = event.error_count,
            decision = event.decision,
            latency_ms = event.latency_ms,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_ATTEMPT_SCORED,
            %err,
            "failed to encode attempt event"
        ),
    }
}

pub fn record_utterance_boundary(duration: Duration, audio_bytes: usize) {
    let event = UtteranceBoundaryEvent {
        duration_ms: duration_to_ms(duration),
        audio_bytes,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_UTTERANCE,
            duration_ms = event.duration_ms,
            audio_bytes = event.audio_bytes,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_UTTERANCE,
            %err,
            "failed to encode utterance event"
        ),
    }
}

pub fn record_session_completed(
    phrases_completed: usize,
    total_attempts: usize,
    overall_accuracy: f64,
    duration: Duration,
) {
    let event = SessionCompletedEvent {
        phrases_completed,
        total_attempts,
        overall_accuracy,
        duration_ms: duration_to_ms(duration),
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_SESSION_COMPLETED,
            phrases_completed = event.phrases_completed,
            total_attempts = event.total_attempts,
            overall_accuracy = event.overall_accuracy,
            duration_ms = event.duration_ms,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_SESSION_COMPLETED,
            %err,
            "failed to encode session completed event"
        ),
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
