//! 识别路由与提供方适配脚手架。

mod providers;
mod router;

pub mod config;
pub mod traits;
pub mod types;

pub use config::{ProviderConfig, RouterConfig};
pub use providers::{register_env_providers, GoogleSpeechProvider, WhisperApiProvider};
pub use router::FailoverRouter;
pub use traits::TranscriptionProvider;
pub use types::{
    ProviderError, ProviderErrorKind, ProviderResponse, ProviderSnapshot, ProviderSwitch,
    RecognitionError, RecognitionResult,
};

#[cfg(test)]
mod tests;
