use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 单个提供方的注册参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// 数值越小优先级越高。
    pub priority: u32,
    pub enabled: bool,
    /// 滚动一分钟窗口内允许的请求数，None 表示不限。
    pub rate_limit_per_minute: Option<u32>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            enabled: true,
            rate_limit_per_minute: None,
        }
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit_per_minute = Some(per_minute);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 故障转移路由的全局参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// 连续失败多少次后标记为不健康。
    pub error_threshold: u32,
    /// 不健康的提供方经过该冷却期后重新参与选择。
    #[serde(with = "duration_ms")]
    pub cooldown: Duration,
    /// 单次转写请求的超时，超时按传输失败处理。
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            error_threshold: 3,
            cooldown: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
