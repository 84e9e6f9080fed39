//! Bounded fixed-interval polling
//!
//! Drives a state-returning async check until it reports a terminal state.
//! The first check runs immediately, every later check waits the configured
//! interval first, and no more than `max_attempts` checks are made. There is
//! no backoff and no retry: an `Err` from the check ends polling at once.
//!
//! # Example
//!
//! ```no_run
//! use bim_acquire::config::PollConfig;
//! use bim_acquire::poll::{PollOutcome, poll_until};
//!
//! # async fn example() -> Result<(), std::io::Error> {
//! let config = PollConfig::default();
//! let outcome = poll_until(&config, |attempt| async move {
//!     Ok::<_, std::io::Error>(attempt >= 3)
//! }, |done| *done).await?;
//!
//! match outcome {
//!     PollOutcome::Ready { attempts, .. } => println!("ready after {attempts} polls"),
//!     PollOutcome::Exhausted { attempts, .. } => println!("gave up after {attempts} polls"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::PollConfig;
use std::future::Future;

/// How a polling loop ended without an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The check produced a terminal state
    Ready {
        /// The terminal state
        state: T,
        /// Number of checks performed, including the terminal one
        attempts: u32,
    },
    /// The attempt budget ran out; `last` is the final non-terminal state
    Exhausted {
        /// The last state observed
        last: T,
        /// Number of checks performed
        attempts: u32,
    },
}

/// Poll `check` until `is_terminal` accepts its state or the budget runs out
///
/// `check` receives the 1-based attempt number. An error from `check` is
/// returned immediately.
pub async fn poll_until<F, Fut, T, E, P>(
    config: &PollConfig,
    mut check: F,
    is_terminal: P,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let state = match check(attempt).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, attempt, "Poll check failed");
                return Err(e);
            }
        };

        if is_terminal(&state) {
            tracing::debug!(attempts = attempt, "Poll reached terminal state");
            return Ok(PollOutcome::Ready {
                state,
                attempts: attempt,
            });
        }

        if attempt >= max_attempts {
            tracing::warn!(
                attempts = attempt,
                max_attempts,
                "Poll budget exhausted before terminal state"
            );
            return Ok(PollOutcome::Exhausted {
                last: state,
                attempts: attempt,
            });
        }

        tracing::trace!(
            attempt,
            delay_ms = config.interval.as_millis(),
            "Not terminal yet, waiting"
        );
        tokio::time::sleep(config.interval).await;
    }
}
