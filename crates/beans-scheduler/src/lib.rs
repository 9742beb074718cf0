//! Bounded execution for document population.
//!
//! Population hands its parse-and-register step to a [`Watchdog`], which runs it on a
//! worker thread and gives up waiting after a deadline. The worker is told to stop through a
//! [`CancellationToken`]; it cannot be killed.

mod watchdog;

use std::time::Duration;

pub use tokio_util::sync::CancellationToken;
pub use watchdog::{run_with_timeout, Watchdog};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,
    #[error("task exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
    #[error("task panicked")]
    Panicked,
}
