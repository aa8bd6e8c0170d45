use super::ChatError;
use std::time::Duration;

pub const MAX_ATTEMPTS: u32 = 5;
const MIN_RATE_LIMIT_SLEEP_MS: u64 = 250;
const BACKOFF_STEP_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 8_000;

#[derive(Debug)]
pub enum HttpFailure {
    RateLimited { retry_after_ms: Option<u64> },
    Status { status: u16, body: String },
    Transport(String),
}

/// The sleep before retrying a 429: the server-provided value clamped to at
/// least 250ms, or a linear backoff capped at 8s when no value was sent.
pub fn rate_limit_delay(attempt: u32, retry_after_ms: Option<u64>) -> Duration {
    match retry_after_ms {
        Some(parsed) => Duration::from_millis(parsed.max(MIN_RATE_LIMIT_SLEEP_MS)),
        None => Duration::from_millis((BACKOFF_STEP_MS * u64::from(attempt)).min(BACKOFF_CAP_MS)),
    }
}

/// Runs `call` up to `MAX_ATTEMPTS` times, sleeping between rate-limited
/// attempts. Any other failure is fatal for the call.
pub fn execute_with_retry<T>(
    mut call: impl FnMut() -> Result<T, HttpFailure>,
    mut sleep: impl FnMut(Duration),
) -> Result<T, ChatError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match call() {
            Ok(value) => return Ok(value),
            Err(HttpFailure::RateLimited { retry_after_ms }) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(ChatError::RateLimitExhausted {
                        attempts: MAX_ATTEMPTS,
                    });
                }
                sleep(rate_limit_delay(attempt, retry_after_ms));
            }
            Err(HttpFailure::Status { status, body }) => {
                return Err(ChatError::Status { status, body });
            }
            Err(HttpFailure::Transport(reason)) => return Err(ChatError::Request(reason)),
        }
    }
}
