//! Bounded fan-out for independent sub-tasks
//!
//! Provider pipelines, hoster resolutions and playlist expansions all fan out
//! through [`run_bounded`]: at most `limit` futures in flight, an optional
//! per-task timeout, failures swallowed into empty results.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::error::Result;

/// Runs labelled tasks with at most `limit` in flight
///
/// Returns one entry per task, in task order regardless of completion
/// order. A task that errors or exceeds `timeout` contributes an empty
/// vector; it never blocks the others.
pub async fn run_bounded<T, F>(
    tasks: impl IntoIterator<Item = (String, F)>,
    limit: usize,
    timeout: Option<Duration>,
) -> Vec<Vec<T>>
where
    F: Future<Output = Result<Vec<T>>>,
{
    let pending: Vec<_> = tasks
        .into_iter()
        .enumerate()
        .map(|(index, (label, task))| async move {
            let outcome = match timeout {
                Some(budget) => match tokio::time::timeout(budget, task).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(task = %label, timeout_ms = budget.as_millis() as u64, "task timed out");
                        return (index, Vec::new());
                    }
                },
                None => task.await,
            };

            match outcome {
                Ok(items) => {
                    debug!(task = %label, count = items.len(), "task finished");
                    (index, items)
                }
                Err(e) => {
                    warn!(task = %label, error = %e, "task failed");
                    (index, Vec::new())
                }
            }
        })
        .collect();

    let mut results: Vec<(usize, Vec<T>)> = stream::iter(pending)
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, items)| items).collect()
}

/// [`run_bounded`] flattened into a single list
pub async fn run_bounded_flat<T, F>(
    tasks: impl IntoIterator<Item = (String, F)>,
    limit: usize,
    timeout: Option<Duration>,
) -> Vec<T>
where
    F: Future<Output = Result<Vec<T>>>,
{
    run_bounded(tasks, limit, timeout)
        .await
        .into_iter()
        .flatten()
        .collect()
}
