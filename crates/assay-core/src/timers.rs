//! Cancellable per-session scheduled tasks.
//!
//! Replaces loose interval timers with a registry keyed by session id.
//! Cancelling a session releases every task it owns; cancelling twice is a
//! no-op, so double-ending a session never errors.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct TimerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry of recurring tasks, keyed by session id.
#[derive(Default)]
pub struct TimerRegistry {
    timers: Mutex<HashMap<String, Vec<TimerHandle>>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a recurring task for a session. The first tick fires after
    /// one full period.
    pub fn schedule_repeating<F>(&self, session_id: &str, period: Duration, mut tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // interval fires immediately on the first tick; skip it.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = interval.tick() => tick(),
                }
            }
        });

        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.to_string())
            .or_default()
            .push(TimerHandle { token, task });
    }

    /// Number of live tasks registered for a session.
    pub fn active_count(&self, session_id: &str) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map_or(0, Vec::len)
    }

    /// Cancel and release all tasks for a session. Idempotent.
    pub fn cancel(&self, session_id: &str) {
        let removed = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        if let Some(handles) = removed {
            debug!(session = session_id, count = handles.len(), "Cancelling session timers");
            for handle in handles {
                handle.token.cancel();
                handle.task.abort();
            }
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        if let Ok(mut timers) = self.timers.lock() {
            for handles in timers.values_mut() {
                for handle in handles {
                    handle.token.cancel();
                    handle.task.abort();
                }
            }
        }
    }
}
