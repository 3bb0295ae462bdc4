// ABOUTME: Structured task group for per-table fan-out
// ABOUTME: Spawns keyed tasks, joins all of them, and reports one result per key

use std::collections::HashMap;
use std::future::Future;
use tokio::task::JoinSet;

/// A set of keyed tasks that are always joined together.
///
/// Every spawned key appears exactly once in [`TaskGroup::join_all`]'s output, in
/// spawn order. A key maps to `None` if its task panicked. Dropping the group
/// aborts any tasks still running.
pub struct TaskGroup<T> {
    tasks: JoinSet<(String, T)>,
    order: Vec<String>,
}

impl<T> TaskGroup<T>
where
    T: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            order: Vec::new(),
        }
    }

    pub fn spawn<F>(&mut self, key: String, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.order.push(key.clone());
        self.tasks.spawn(async move { (key, task.await) });
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Wait for every task to finish.
    pub async fn join_all(mut self) -> Vec<(String, Option<T>)> {
        let mut finished: HashMap<String, T> = HashMap::with_capacity(self.order.len());

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((key, value)) => {
                    finished.insert(key, value);
                }
                Err(e) => {
                    tracing::error!("Sync task terminated abnormally: {}", e);
                }
            }
        }

        self.order
            .into_iter()
            .map(|key| {
                let value = finished.remove(&key);
                (key, value)
            })
            .collect()
    }
}

impl<T> Default for TaskGroup<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
