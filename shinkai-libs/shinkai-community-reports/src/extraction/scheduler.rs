use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::community_reports_logging::{report_log, ReportLogLevel, ReportLogOption};

/// Runs work in fixed-size groups. Every task of a group is started at once and the group is
/// joined before the next one starts, with a fixed pause in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchScheduler {
    batch_size: usize,
    pause: Duration,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, pause: Duration) -> Self {
        BatchScheduler {
            batch_size: batch_size.max(1),
            pause,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Splits `items` into consecutive groups of at most `batch_size`, keeping order.
    pub fn split<T>(&self, items: Vec<T>) -> Vec<Vec<T>> {
        let mut batches = Vec::with_capacity(items.len().div_ceil(self.batch_size));
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            batches.push(items.by_ref().take(self.batch_size).collect());
        }
        batches
    }

    /// Runs `task` once per item and returns the outputs of each group in completion order.
    /// A task that panics is logged and contributes no output; it never stops the run.
    pub async fn run<T, O, F, Fut>(&self, items: Vec<T>, task: F) -> Vec<Vec<O>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = O> + Send + 'static,
        O: Send + 'static,
    {
        let batches = self.split(items);
        let total_batches = batches.len();
        let mut outputs = Vec::with_capacity(total_batches);

        for (index, batch) in batches.into_iter().enumerate() {
            report_log(
                ReportLogOption::Scheduler,
                ReportLogLevel::Info,
                &format!(
                    "Processing community batch {}/{} ({} communities)",
                    index + 1,
                    total_batches,
                    batch.len()
                ),
            );

            let mut join_set = JoinSet::new();
            for item in batch {
                join_set.spawn(task(item));
            }

            let mut batch_outputs = Vec::new();
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(output) => batch_outputs.push(output),
                    Err(e) => report_log(
                        ReportLogOption::Scheduler,
                        ReportLogLevel::Error,
                        &format!("Community task in batch {} did not finish: {}", index + 1, e),
                    ),
                }
            }
            outputs.push(batch_outputs);

            if index + 1 < total_batches {
                tokio::time::sleep(self.pause).await;
            }
        }

        outputs
    }
}
