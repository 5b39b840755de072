use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How a polling loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    /// The deadline passed; carries the time actually spent waiting.
    TimedOut(Duration),
    Cancelled,
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            PollOutcome::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Sleep for one poll interval. A zero interval yields the thread instead.
#[inline]
pub fn pause(interval: Duration) {
    if interval.is_zero() {
        std::thread::yield_now();
    } else {
        std::thread::sleep(interval);
    }
}

/// Call `probe` until it returns `Some`, the optional `timeout` elapses or
/// `cancel` is raised.
///
/// The probe always runs at least once, so a condition that already holds
/// is reported as ready even with a zero timeout. `timeout: None` waits
/// forever (cancellation still applies).
pub fn poll_until<T, F>(
    mut probe: F,
    interval: Duration,
    timeout: Option<Duration>,
    cancel: &AtomicBool,
) -> PollOutcome<T>
where
    F: FnMut() -> Option<T>,
{
    let start = Instant::now();

    loop {
        if let Some(value) = probe() {
            return PollOutcome::Ready(value);
        }

        if cancel.load(Ordering::Relaxed) {
            return PollOutcome::Cancelled;
        }

        let elapsed = start.elapsed();
        if let Some(limit) = timeout
            && elapsed >= limit
        {
            return PollOutcome::TimedOut(elapsed);
        }

        match timeout {
            // Never oversleep the deadline by a full interval.
            Some(limit) => pause(interval.min(limit - elapsed)),
            None => pause(interval),
        }
    }
}

/// Retry `connect` until it succeeds, logging each failed attempt at debug level.
pub fn wait_for_resource<F, T, E>(
    mut connect: F,
    interval: Duration,
    timeout: Option<Duration>,
    cancel: &AtomicBool,
    resource_name: &str,
) -> PollOutcome<T>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    let outcome = poll_until(
        || match connect() {
            Ok(resource) => Some(resource),
            Err(e) => {
                tracing::debug!("Waiting for {} ({})", resource_name, e);
                None
            }
        },
        interval,
        timeout,
        cancel,
    );

    match &outcome {
        PollOutcome::Ready(_) => tracing::info!("{} connected", resource_name),
        PollOutcome::TimedOut(waited) => {
            tracing::warn!("{} not available after {:?}", resource_name, waited)
        }
        PollOutcome::Cancelled => tracing::info!("Stopped waiting for {}", resource_name),
    }

    outcome
}
