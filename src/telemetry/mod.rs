//! 观测性初始化脚手架。

use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

pub mod events;

const LOG_FILE_PREFIX: &str = "memovoice-core.log";

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false);
    let subscriber = Registry::default().with(env_filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber).expect("failed to set global subscriber");
}

/// 在控制台输出之外追加按天滚动的 JSON 日志文件。
///
/// 返回的 guard 维持后台刷盘线程，调用方需持有至进程退出。
pub fn init_tracing_with_file(log_dir: &Path) -> WorkerGuard {
    let (subscriber, guard) = file_subscriber(log_dir);
    tracing::subscriber::set_global_default(subscriber).expect("failed to set global subscriber");
    guard
}

fn file_subscriber(log_dir: &Path) -> (impl Subscriber + Send + Sync, WorkerGuard) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let fmt_layer = fmt::layer().with_target(false);
    let file_layer = fmt::layer().json().with_ansi(false).with_writer(file_writer);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer);
    (subscriber, guard)
}
