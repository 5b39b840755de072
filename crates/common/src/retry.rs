use std::time::Duration;

/// Retry a fallible operation with exponential backoff.
///
/// Only errors accepted by `is_retryable` are retried; anything else is
/// returned straight away.
///
/// # Arguments
/// * `f` - The operation; receives the 1-based attempt number
/// * `max_attempts` - Total number of attempts (at least one is made)
/// * `base_delay` - Delay after the first failure, doubled after each following one
/// * `is_retryable` - Decides whether an error is worth another attempt
/// * `operation_name` - Human-readable name for logging
pub fn retry_with_backoff<F, T, E, R>(
    mut f: F,
    max_attempts: u32,
    base_delay: Duration,
    is_retryable: R,
    operation_name: &str,
) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f(attempt) {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name,
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    "{} failed after {} attempt(s): {}",
                    operation_name,
                    attempt,
                    e
                );
                return Err(e);
            }
        }
    }
}
