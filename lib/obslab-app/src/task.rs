//! Helpers for spawning asynchronous tasks.

use std::future::Future;

use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug_span, Instrument as _, Span};

fn named_task_span(name: String) -> Span {
    debug_span!("task", task_name = %name)
}

/// Spawns a new named asynchronous task, returning a [`JoinHandle`] for it.
///
/// This is a thin wrapper over [`tokio::spawn`] that runs the future inside a `task` span parented to the current
/// span, so events emitted by the task keep the caller's span context (including any trace identifier).
pub fn spawn_traced_named<S, F, T>(name: S, f: F) -> JoinHandle<T>
where
    S: Into<String>,
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn(f.instrument(named_task_span(name.into())))
}

/// Traced spawning for [`JoinSet`].
pub trait JoinSetExt<T> {
    /// Spawns a new named asynchronous task into the set, returning an [`AbortHandle`] for it.
    ///
    /// As with [`spawn_traced_named`], the task runs inside a `task` span parented to the current span.
    fn spawn_traced_named<S, F>(&mut self, name: S, f: F) -> AbortHandle
    where
        S: Into<String>,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static;
}

impl<T> JoinSetExt<T> for JoinSet<T> {
    fn spawn_traced_named<S, F>(&mut self, name: S, f: F) -> AbortHandle
    where
        S: Into<String>,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn(f.instrument(named_task_span(name.into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_set_collects_every_spawned_task() {
        let mut tasks = JoinSet::new();
        for i in 0..5u32 {
            tasks.spawn_traced_named(format!("worker-{}", i), async move { i * 2 });
        }

        let mut results = tasks.join_all().await;
        results.sort_unstable();
        assert_eq!(results, vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn spawned_task_output_is_returned() {
        let handle = spawn_traced_named("answer", async { 42 });
        assert_eq!(handle.await.unwrap(), 42);
    }
}
