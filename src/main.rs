mod audio;
mod recognition;
mod scoring;
mod session;
mod telemetry;

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::info;

use recognition::{register_env_providers, FailoverRouter, RouterConfig};
use session::{CoordinatorConfig, PracticeCoordinator};
use telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut router = FailoverRouter::new(RouterConfig::default());
    if register_env_providers(&mut router) == 0 {
        bail!("no transcription provider configured; set OPENAI_API_KEY or GOOGLE_SPEECH_API_KEY");
    }

    let coordinator = PracticeCoordinator::new(Arc::new(router), CoordinatorConfig::default());
    info!(
        target: "practice_session",
        providers = coordinator.provider_status().len(),
        "memovoice core ready"
    );

    tokio::signal::ctrl_c().await?;
    info!(target: "practice_session", "shutdown signal received");
    Ok(())
}
