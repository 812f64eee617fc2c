//! Retry utilities: the fixed-interval policy and the session supervisor.
//!
//! Every reconnect in the relay waits the same fixed interval and never gives
//! up. Uses `backon` for the delay schedule.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use tracing::{error, info};

use crate::error::RelayError;

/// Fixed delay, unlimited attempts.
pub fn fixed_interval(interval: Duration) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(interval)
        .with_max_times(usize::MAX)
}

/// Run `session` forever, waiting `interval` after each exit.
///
/// A session normally only returns on failure (lost connection, store error
/// while handling a message). The error is logged and a new session started.
pub async fn supervise<F, Fut>(task: &str, interval: Duration, mut session: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), RelayError>>,
{
    let mut delays = fixed_interval(interval).build();

    loop {
        match session().await {
            Ok(()) => info!(task, "Session ended"),
            Err(e) => error!(task, error = %e, "Session failed"),
        }

        let delay = delays.next().unwrap_or(interval);
        info!(task, delay_secs = delay.as_secs_f64(), "Restarting after delay");
        tokio::time::sleep(delay).await;
    }
}
