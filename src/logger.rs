use std::{future::Future, path::Path, time::Instant};

use anyhow::Context;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

pub const LOG_FILE: &str = "flowstudio.log";
pub const EVENT_FILE: &str = "requests.json";

/// Install the global subscriber:
///
/// - stdout, filtered by `log_level` (an `EnvFilter` directive such as `"info"`)
/// - a daily rolling plain-text log in `log_dir`
/// - a daily rolling JSON log in `log_dir` holding only `target = "request"` events
pub fn init_tracing(log_dir: &Path, log_level: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(log_level));

    let txt_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE);
    let txt_layer = fmt::layer()
        .with_writer(txt_appender)
        .with_ansi(false)
        .with_filter(EnvFilter::new(log_level));

    let json_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, EVENT_FILE);
    let json_layer = fmt::layer()
        .json()
        .with_writer(json_appender)
        .with_target(true)
        .with_filter(EnvFilter::new("request=info"));

    Registry::default()
        .with(stdout_layer)
        .with(txt_layer)
        .with(json_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

/// Run `handler` and report its outcome and latency, both as a regular log
/// line and as one `request` event.
pub async fn instrument_request<F, Fut, T, E>(name: &str, handler: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let result = handler().await;
    let elapsed = start.elapsed().as_secs_f64() * 1_000.0;

    match &result {
        Ok(_) => info!("request `{}` succeeded in {:.1} ms", name, elapsed),
        Err(err) => error!(error = %err, "request `{}` failed in {:.1} ms", name, elapsed),
    }
    tracing::event!(
        target: "request",
        tracing::Level::INFO,
        request = name,
        latency_ms = elapsed,
        status = if result.is_ok() { "ok" } else { "error" },
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn instrument_request_passes_the_result_through() {
        let ok: Result<u8, String> = instrument_request("ok", || async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        let err: Result<u8, String> = instrument_request("err", || async { Err("no".to_string()) }).await;
        assert_eq!(err, Err("no".to_string()));
    }
}
