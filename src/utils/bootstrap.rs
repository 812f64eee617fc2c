//! Bootstrap utilities for the relay binaries.
//!
//! Shared initialization code for the producer and both consumers.

use std::future::Future;
use std::time::Duration;

use backon::BackoffBuilder;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::retry::fixed_interval;
use crate::config::{LOG_ENV_VAR, LOG_FORMAT_ENV_VAR};

/// Initialize tracing with the RELAY_LOG environment variable.
///
/// Defaults to "info" level if RELAY_LOG is not set. Set RELAY_LOG_FORMAT=json
/// for structured output.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var(LOG_FORMAT_ENV_VAR)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Config file path from `--config <path>` or `--config=<path>`, if given.
pub fn parse_config_path() -> Option<String> {
    config_path_from_args(std::env::args().skip(1))
}

fn config_path_from_args(args: impl IntoIterator<Item = String>) -> Option<String> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

/// Connect to a dependency, retrying at a fixed interval until it succeeds.
///
/// # Arguments
/// * `service_name` - Human-readable name for logging (e.g., "database")
/// * `address` - Target address for logging, without credentials
/// * `interval` - Delay between attempts
/// * `connect` - Async function that attempts to establish a connection
pub async fn connect_with_retry<T, E, F, Fut>(
    service_name: &str,
    address: &str,
    interval: Duration,
    connect: F,
) -> T
where
    E: std::fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delays = fixed_interval(interval).build();
    let mut attempt: u64 = 0;

    loop {
        attempt += 1;
        match connect().await {
            Ok(client) => {
                info!("Connected to {} at {}", service_name, address);
                return client;
            }
            Err(e) => {
                let delay = delays.next().unwrap_or(interval);
                warn!(
                    "Failed to connect to {} (attempt {}): {}. Retrying in {:?}...",
                    service_name, attempt, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_config_path_from_args() {
        assert_eq!(
            config_path_from_args(args(&["--config", "relay.prod.yaml"])),
            Some("relay.prod.yaml".to_string())
        );
        assert_eq!(
            config_path_from_args(args(&["--config=/etc/relay.yaml"])),
            Some("/etc/relay.yaml".to_string())
        );
        assert_eq!(config_path_from_args(args(&["--verbose"])), None);
        assert_eq!(config_path_from_args(args(&["--config"])), None);
    }

    #[tokio::test]
    async fn test_connect_with_retry_until_success() {
        let attempts = AtomicUsize::new(0);

        let value = connect_with_retry("test", "localhost", Duration::from_millis(1), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err("refused")
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(value, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }
}
