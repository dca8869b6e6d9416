use crate::audio::{AudioChunk, AudioFormat};
use crate::recognition::types::ProviderError;
use crate::recognition::*;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Clone, Copy)]
enum Scripted {
    Ok(&'static str),
    Fail,
}

struct ScriptedProvider {
    name: &'static str,
    streaming: bool,
    delay: Duration,
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(name: &'static str, script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            name,
            streaming: false,
            delay: Duration::ZERO,
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(name: &'static str, delay: Duration, script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            name,
            streaming: false,
            delay,
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn transcribe(&self, _audio: &AudioChunk) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let next = self
            .script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or(Scripted::Ok(""));
        match next {
            Scripted::Ok(text) => Ok(ProviderResponse {
                transcript: text.to_string(),
                confidence: Some(0.9),
            }),
            Scripted::Fail => Err(ProviderError::Network("scripted failure".to_string())),
        }
    }
}

fn audio() -> AudioChunk {
    AudioChunk::new(Bytes::from(vec![0_u8; 8_000]), AudioFormat::Wav)
}

fn router_with(
    config: RouterConfig,
    providers: Vec<(ProviderConfig, Arc<ScriptedProvider>)>,
) -> FailoverRouter {
    let mut router = FailoverRouter::new(config);
    for (provider_config, adapter) in providers {
        router.register(provider_config, adapter as Arc<dyn TranscriptionProvider>);
    }
    router
}

#[tokio::test]
async fn highest_priority_provider_is_selected() {
    let primary = ScriptedProvider::new("p1", vec![]);
    let secondary = ScriptedProvider::new("p2", vec![]);
    let router = router_with(
        RouterConfig::default(),
        vec![
            (ProviderConfig::new("p2", 2), secondary),
            (ProviderConfig::new("p1", 1), primary),
        ],
    );

    for _ in 0..3 {
        assert_eq!(router.select_provider().expect("provider available"), "p1");
    }
}

#[tokio::test]
async fn disabled_providers_are_never_selected() {
    let primary = ScriptedProvider::new("p1", vec![]);
    let secondary = ScriptedProvider::new("p2", vec![Scripted::Ok("from p2")]);
    let router = router_with(
        RouterConfig::default(),
        vec![
            (ProviderConfig::new("p1", 1).disabled(), primary.clone()),
            (ProviderConfig::new("p2", 2), secondary),
        ],
    );

    assert_eq!(router.select_provider().expect("provider available"), "p2");
    let result = router.transcribe(&audio()).await.expect("transcription");
    assert_eq!(result.provider, "p2");
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn failure_triggers_failover_to_next_priority() {
    let primary = ScriptedProvider::new("p1", vec![Scripted::Fail]);
    let secondary = ScriptedProvider::new("p2", vec![Scripted::Ok("rescued")]);
    let router = router_with(
        RouterConfig::default(),
        vec![
            (ProviderConfig::new("p1", 1), primary.clone()),
            (ProviderConfig::new("p2", 2), secondary.clone()),
        ],
    );

    let result = router.transcribe(&audio()).await.expect("failover succeeds");
    assert_eq!(result.transcript, "rescued");
    assert_eq!(result.provider, "p2");
    assert!(result.success);
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
}

#[tokio::test]
async fn three_consecutive_failures_mark_provider_unhealthy() {
    let primary = ScriptedProvider::new(
        "p1",
        vec![Scripted::Fail, Scripted::Fail, Scripted::Fail],
    );
    let secondary = ScriptedProvider::new(
        "p2",
        vec![
            Scripted::Ok("one"),
            Scripted::Ok("two"),
            Scripted::Ok("three"),
            Scripted::Ok("four"),
        ],
    );
    let router = router_with(
        RouterConfig::default(),
        vec![
            (ProviderConfig::new("p1", 1), primary.clone()),
            (ProviderConfig::new("p2", 2), secondary),
        ],
    );

    for _ in 0..3 {
        let result = router.transcribe(&audio()).await.expect("failover succeeds");
        assert_eq!(result.provider, "p2");
    }
    assert_eq!(primary.calls(), 3);

    // Unhealthy primary is skipped without another attempt.
    assert_eq!(router.select_provider().expect("provider available"), "p2");
    let result = router.transcribe(&audio()).await.expect("secondary serves");
    assert_eq!(result.provider, "p2");
    assert_eq!(primary.calls(), 3);

    let snapshot = router.provider_status();
    let p1 = snapshot
        .iter()
        .find(|provider| provider.name == "p1")
        .expect("p1 snapshot");
    assert!(!p1.healthy);
    assert_eq!(p1.consecutive_errors, 3);
}

#[tokio::test]
async fn unhealthy_provider_recovers_after_cooldown() {
    let config = RouterConfig {
        cooldown: Duration::from_millis(50),
        ..RouterConfig::default()
    };
    let primary = ScriptedProvider::new(
        "p1",
        vec![
            Scripted::Fail,
            Scripted::Fail,
            Scripted::Fail,
            Scripted::Ok("recovered"),
        ],
    );
    let secondary = ScriptedProvider::new("p2", vec![Scripted::Ok("one"), Scripted::Ok("two")]);
    let router = router_with(
        config,
        vec![
            (ProviderConfig::new("p1", 1), primary.clone()),
            (ProviderConfig::new("p2", 2), secondary),
        ],
    );

    for _ in 0..3 {
        router.transcribe(&audio()).await.expect("failover succeeds");
    }
    assert_eq!(router.select_provider().expect("provider available"), "p2");

    sleep(Duration::from_millis(80)).await;

    assert_eq!(router.select_provider().expect("provider available"), "p1");
    let result = router.transcribe(&audio()).await.expect("primary recovers");
    assert_eq!(result.transcript, "recovered");
    assert_eq!(result.provider, "p1");

    let snapshot = router.provider_status();
    let p1 = snapshot
        .iter()
        .find(|provider| provider.name == "p1")
        .expect("p1 snapshot");
    assert!(p1.healthy);
    assert_eq!(p1.consecutive_errors, 0);
}

#[tokio::test]
async fn success_resets_consecutive_errors() {
    let primary = ScriptedProvider::new(
        "p1",
        vec![
            Scripted::Fail,
            Scripted::Fail,
            Scripted::Ok("back"),
            Scripted::Fail,
        ],
    );
    let secondary = ScriptedProvider::new("p2", vec![Scripted::Ok("one"), Scripted::Ok("two")]);
    let router = router_with(
        RouterConfig::default(),
        vec![
            (ProviderConfig::new("p1", 1), primary.clone()),
            (ProviderConfig::new("p2", 2), secondary),
        ],
    );

    router.transcribe(&audio()).await.expect("first attempt");
    router.transcribe(&audio()).await.expect("second attempt");
    let result = router.transcribe(&audio()).await.expect("third attempt");
    assert_eq!(result.provider, "p1");

    // Two earlier failures no longer count: one more failure does not trip
    // the threshold.
    let result = router.transcribe(&audio()).await.expect("fourth attempt");
    assert_eq!(result.provider, "p2");
    assert_eq!(router.select_provider().expect("provider available"), "p1");
}

#[tokio::test]
async fn rate_limited_provider_is_skipped_without_penalty() {
    let primary = ScriptedProvider::new("p1", vec![Scripted::Ok("first")]);
    let secondary = ScriptedProvider::new("p2", vec![Scripted::Ok("second")]);
    let router = router_with(
        RouterConfig::default(),
        vec![
            (
                ProviderConfig::new("p1", 1).with_rate_limit(1),
                primary.clone(),
            ),
            (ProviderConfig::new("p2", 2), secondary.clone()),
        ],
    );

    let first = router.transcribe(&audio()).await.expect("first request");
    assert_eq!(first.provider, "p1");

    let second = router.transcribe(&audio()).await.expect("second request");
    assert_eq!(second.provider, "p2");
    assert_eq!(primary.calls(), 1);

    let snapshot = router.provider_status();
    let p1 = snapshot
        .iter()
        .find(|provider| provider.name == "p1")
        .expect("p1 snapshot");
    assert!(p1.healthy);
    assert_eq!(p1.consecutive_errors, 0);
    assert_eq!(p1.requests_last_minute, 1);
}

#[tokio::test]
async fn timeout_counts_as_transport_failure() {
    let config = RouterConfig {
        request_timeout: Duration::from_millis(50),
        ..RouterConfig::default()
    };
    let primary = ScriptedProvider::slow(
        "p1",
        Duration::from_millis(200),
        vec![Scripted::Ok("too late")],
    );
    let secondary = ScriptedProvider::new("p2", vec![Scripted::Ok("in time")]);
    let router = router_with(
        config,
        vec![
            (ProviderConfig::new("p1", 1), primary),
            (ProviderConfig::new("p2", 2), secondary),
        ],
    );

    let result = router.transcribe(&audio()).await.expect("failover succeeds");
    assert_eq!(result.transcript, "in time");
    assert_eq!(result.provider, "p2");

    let snapshot = router.provider_status();
    let p1 = snapshot
        .iter()
        .find(|provider| provider.name == "p1")
        .expect("p1 snapshot");
    assert_eq!(p1.consecutive_errors, 1);
}

#[tokio::test]
async fn empty_router_reports_no_provider() {
    let router = FailoverRouter::new(RouterConfig::default());
    assert!(matches!(
        router.select_provider(),
        Err(RecognitionError::NoProviderAvailable)
    ));
    assert!(matches!(
        router.transcribe(&audio()).await,
        Err(RecognitionError::NoProviderAvailable)
    ));
}

#[tokio::test]
async fn exhausted_candidates_surface_last_failure() {
    let only = ScriptedProvider::new("p1", vec![Scripted::Fail]);
    let router = router_with(
        RouterConfig::default(),
        vec![(ProviderConfig::new("p1", 1), only)],
    );

    match router.transcribe(&audio()).await {
        Err(RecognitionError::AllProvidersFailed { provider, source }) => {
            assert_eq!(provider, "p1");
            assert!(matches!(source, ProviderError::Network(_)));
        }
        other => panic!("expected AllProvidersFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn primary_change_emits_switch_notification() {
    let primary = ScriptedProvider::new(
        "p1",
        vec![
            Scripted::Ok("one"),
            Scripted::Fail,
            Scripted::Fail,
            Scripted::Fail,
        ],
    );
    let secondary = ScriptedProvider::new(
        "p2",
        vec![Scripted::Ok("two"), Scripted::Ok("three"), Scripted::Ok("four")],
    );
    let router = router_with(
        RouterConfig::default(),
        vec![
            (ProviderConfig::new("p1", 1), primary),
            (ProviderConfig::new("p2", 2), secondary),
        ],
    );
    let mut switches = router.subscribe_switches();

    router.transcribe(&audio()).await.expect("first request");
    let initial = switches.recv().await.expect("initial switch");
    assert_eq!(initial.from, None);
    assert_eq!(initial.to, "p1");

    for _ in 0..3 {
        router.transcribe(&audio()).await.expect("failover request");
    }
    let failover = switches.recv().await.expect("failover switch");
    assert_eq!(failover.from.as_deref(), Some("p1"));
    assert_eq!(failover.to, "p2");

    // Staying on the same provider produces no further notifications.
    assert!(switches.try_recv().is_err());
}

#[tokio::test]
async fn snapshot_reflects_streaming_capability() {
    let streaming = Arc::new(ScriptedProvider {
        name: "stream",
        streaming: true,
        delay: Duration::ZERO,
        script: Mutex::new(VecDeque::new()),
        calls: AtomicUsize::new(0),
    });
    let batch = ScriptedProvider::new("batch", vec![]);
    let router = router_with(
        RouterConfig::default(),
        vec![
            (ProviderConfig::new("stream", 1), streaming),
            (ProviderConfig::new("batch", 2), batch),
        ],
    );

    assert!(router.streaming_supported());
    let snapshot = router.provider_status();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot[0].supports_streaming);
    assert!(!snapshot[1].supports_streaming);
}
