// runner.rs - Parallel walk over directory work items.
//
// Each directory item runs on the blocking pool. At most `workers` items are
// in flight; subdirectories coming back from a finished item are queued.
// Ctrl-C stops new items from starting and lets in-flight ones finish.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinSet;
use tracing::Instrument;

use aclman_fs::{Enforcer, Start, WorkItem};
use aclman_policy::ObjectReport;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Interrupted,
}

/// Walk `paths`, handing every report to `on_report` as it is produced.
pub async fn run<F>(
    enforcer: Arc<Enforcer>,
    paths: Vec<PathBuf>,
    workers: usize,
    mut on_report: F,
) -> anyhow::Result<RunStatus>
where
    F: FnMut(ObjectReport) -> anyhow::Result<()>,
{
    let cancel = enforcer.cancel_flag();
    let interrupt = tokio::spawn(
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing objects in progress");
                cancel.store(true, Ordering::SeqCst);
            }
        }
        .in_current_span(),
    );

    let result = walk(&enforcer, paths, workers.max(1), &mut on_report).await;
    interrupt.abort();
    result?;

    Ok(if enforcer.is_cancelled() {
        RunStatus::Interrupted
    } else {
        RunStatus::Completed
    })
}

async fn walk<F>(
    enforcer: &Arc<Enforcer>,
    paths: Vec<PathBuf>,
    workers: usize,
    on_report: &mut F,
) -> anyhow::Result<()>
where
    F: FnMut(ObjectReport) -> anyhow::Result<()>,
{
    let mut queue: VecDeque<WorkItem> = VecDeque::new();
    for path in paths {
        let task_enforcer = Arc::clone(enforcer);
        let start = tokio::task::spawn_blocking(move || task_enforcer.start(&path))
            .await
            .context("start path task failed")?;
        match start {
            Start::Walk(item) => queue.push_back(item),
            Start::Done(report) => on_report(report)?,
            Start::Skipped => {}
        }
    }

    let mut tasks = JoinSet::new();
    let mut spawned = 0usize;
    loop {
        while tasks.len() < workers && !enforcer.is_cancelled() {
            let Some(item) = queue.pop_front() else {
                break;
            };
            let task_enforcer = Arc::clone(enforcer);
            let span = item_span(spawned);
            spawned += 1;
            tasks.spawn_blocking(move || span.in_scope(|| task_enforcer.process_dir(item)));
        }

        let Some(joined) = tasks.join_next().await else {
            break;
        };
        let outcome = joined.context("directory worker failed")?;
        for report in outcome.reports {
            on_report(report)?;
        }
        queue.extend(outcome.subdirs);
    }

    if !queue.is_empty() {
        tracing::debug!("{} directories left unvisited", queue.len());
    }
    Ok(())
}

/// Span for the `n`th directory item handed to the blocking pool.
fn item_span(n: usize) -> tracing::Span {
    tracing::debug_span!("dir", item = n)
}
