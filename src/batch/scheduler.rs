//! Task execution.
//!
//! Tasks run either sequentially on the calling thread or on a rayon pool
//! built for this call. The pool is dropped when [`run_tasks`] returns, after
//! every task has finished. A failing or panicking task never stops the
//! others.

use super::discovery::ConversionTask;
use crate::dataset::{self, ConversionOptions};
use crate::error::{ConvertError, Result};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// How a single task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub status: TaskStatus,
    pub duration: Duration,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

/// Result of a whole batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One entry per task, in task order
    pub outcomes: Vec<FileOutcome>,
    /// Pool size used; `None` when tasks ran sequentially
    pub workers: Option<usize>,
    pub duration: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> Vec<&FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success()).collect()
    }

    /// Create a summary message
    pub fn summary(&self) -> String {
        let mode = match self.workers {
            Some(n) => format!("{n} worker(s)"),
            None => "sequential".to_owned(),
        };
        format!(
            "Batch completed: {} file(s), {} succeeded, {} failed, {}, {:.2}s",
            self.outcomes.len(),
            self.succeeded(),
            self.failed().len(),
            mode,
            self.duration.as_secs_f64()
        )
    }
}

/// Pool size for `requested` workers over `task_count` tasks.
///
/// `None` (sequential) when no positive count was requested; otherwise
/// `max(1, min(requested, task_count))`.
pub fn effective_workers(requested: Option<i64>, task_count: usize) -> Option<usize> {
    let requested = usize::try_from(requested?).ok().filter(|&n| n > 0)?;
    Some(requested.min(task_count).max(1))
}

/// Runs every task exactly once and waits for all of them.
pub fn run_tasks(
    tasks: &[ConversionTask],
    workers: Option<i64>,
    options: &ConversionOptions,
) -> Result<BatchReport> {
    let start = Instant::now();
    let workers = effective_workers(workers, tasks.len());

    let outcomes: Vec<FileOutcome> = match workers {
        None => tasks.iter().map(|task| run_task(task, options)).collect(),
        Some(n) => {
            tracing::debug!("Running {} task(s) on {n} worker(s)", tasks.len());
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .thread_name(|i| format!("convert-{i}"))
                .build()
                .map_err(|e| ConvertError::Other(format!("Failed to build worker pool: {e}")))?;
            pool.install(|| {
                tasks
                    .par_iter()
                    .map(|task| run_task(task, options))
                    .collect()
            })
        }
    };

    Ok(BatchReport {
        outcomes,
        workers,
        duration: start.elapsed(),
    })
}

fn run_task(task: &ConversionTask, options: &ConversionOptions) -> FileOutcome {
    let start = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        dataset::convert_file(&task.input, &task.output, task.format, options)
    }));

    let status = match result {
        Ok(Ok(_)) => TaskStatus::Succeeded,
        Ok(Err(e)) => TaskStatus::Failed(e.to_string()),
        Err(payload) => TaskStatus::Failed(panic_message(payload.as_ref())),
    };
    if let TaskStatus::Failed(reason) = &status {
        tracing::error!("Failed to convert {}: {reason}", task.input.display());
    }

    FileOutcome {
        input: task.input.clone(),
        output: task.output.clone(),
        status,
        duration: start.elapsed(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    format!("conversion panicked: {detail}")
}
