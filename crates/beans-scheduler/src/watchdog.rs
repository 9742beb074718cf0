use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use crate::{CancellationToken, TaskError};

const WORKER_THREAD_NAME: &str = "beans-load";
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Runs loading work with a wall-clock bound.
///
/// The work executes on a dedicated worker thread. If it exceeds the deadline the caller gets
/// [`TaskError::DeadlineExceeded`] and carries on; the worker keeps running in the background
/// until it notices the cancelled token.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    deadline: Duration,
}

impl Watchdog {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn run<F, T>(&self, cancel: CancellationToken, func: F) -> Result<T, TaskError>
    where
        F: FnOnce(CancellationToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        run_with_timeout(self.deadline, cancel, func)
    }
}

/// Runs `f` on a worker thread and waits up to `timeout` for it to finish.
///
/// On timeout `cancel_token` is cancelled before returning. A panic inside `f` is reported as
/// [`TaskError::Panicked`], as is a failure to spawn the worker thread.
pub fn run_with_timeout<T, F>(
    timeout: Duration,
    cancel_token: CancellationToken,
    f: F,
) -> Result<T, TaskError>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> T + Send + 'static,
{
    if cancel_token.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    let (tx, rx) = crossbeam_channel::bounded::<Result<T, TaskError>>(1);
    let token_for_task = cancel_token.clone();
    let spawned = thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(token_for_task)))
                .map_err(|_| TaskError::Panicked);
            let _ = tx.send(result);
        });
    if let Err(err) = spawned {
        tracing::warn!(
            target: "beans.scheduler",
            error = %err,
            "failed to spawn worker thread"
        );
        return Err(TaskError::Panicked);
    }

    let deadline = Instant::now() + timeout;
    loop {
        if cancel_token.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            cancel_token.cancel();
            tracing::warn!(
                target: "beans.scheduler",
                timeout_ms = timeout.as_millis() as u64,
                "task exceeded its deadline"
            );
            return Err(TaskError::DeadlineExceeded(timeout));
        }

        match rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
            Ok(result) => return result,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Err(TaskError::Panicked),
        }
    }
}
