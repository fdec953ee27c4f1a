//! Single-worker FIFO queue of enhancement tasks.
//!
//! At most one task runs at a time. Tasks for a module that is already queued
//! or running are rejected. Enrichment is written to the [`ModuleStore`] only
//! after the whole pipeline succeeds; a failed task leaves the stored module
//! untouched and the worker moves on to the next one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use enhancer_shared::{
    EnhancementTask, EnhancerError, ModuleId, ModuleStore, QueueSnapshot, QueuedEntry, Result,
    TaskOutcome, TaskStatus,
};

use crate::pipeline::{EnhancementPipeline, ProgressReporter};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<EnhancementTask>,
    running: Option<EnhancementTask>,
    /// Newest first.
    history: VecDeque<TaskOutcome>,
    stopped: bool,
}

impl QueueState {
    fn holds(&self, module_id: &ModuleId) -> bool {
        self.running.as_ref().is_some_and(|t| &t.module_id == module_id)
            || self.pending.iter().any(|t| &t.module_id == module_id)
    }

    fn is_idle(&self) -> bool {
        self.running.is_none() && self.pending.is_empty()
    }
}

struct Shared {
    state: Mutex<QueueState>,
    work: Notify,
    idle: Notify,
    /// Set while a worker loop is attached.
    worker_active: AtomicBool,
    history_limit: usize,
}

/// Cloneable handle to the queue. All clones see the same tasks.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

/// Running worker. Dropping it without [`shutdown`](Self::shutdown) also
/// stops the worker at its next stage boundary.
pub struct WorkerHandle {
    join: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl WorkerHandle {
    /// Ask the worker to stop. The running task is abandoned at its next
    /// stage boundary; queued tasks stay queued.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Request shutdown and wait for the worker to exit.
    pub async fn shutdown(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            error!(error = %e, "queue worker panicked");
        }
    }

    /// Wait for the worker to exit without requesting shutdown.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            error!(error = %e, "queue worker panicked");
        }
    }
}

impl TaskQueue {
    /// `history_limit` bounds how many finished outcomes are kept.
    pub fn new(history_limit: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                work: Notify::new(),
                idle: Notify::new(),
                worker_active: AtomicBool::new(false),
                history_limit,
            }),
        }
    }

    /// Append a task. Returns its 1-based position among waiting tasks.
    pub async fn enqueue(&self, mut task: EnhancementTask) -> Result<usize> {
        let position = {
            let mut state = self.shared.state.lock().await;
            if state.stopped {
                return Err(EnhancerError::QueueStopped);
            }
            if state.holds(&task.module_id) {
                warn!(module_id = %task.module_id, "rejected duplicate task");
                return Err(EnhancerError::DuplicateTask(task.module_id));
            }
            task.status = TaskStatus::Queued;
            info!(module_id = %task.module_id, task_id = %task.id, "task queued");
            state.pending.push_back(task);
            state.pending.len()
        };
        self.shared.work.notify_one();
        Ok(position)
    }

    /// Build and append a task from module fields.
    pub async fn enqueue_module(
        &self,
        module_id: ModuleId,
        title: impl Into<String>,
        raw_content: impl Into<String>,
        subject_context: Option<String>,
        profession_context: Option<String>,
    ) -> Result<usize> {
        self.enqueue(EnhancementTask::new(
            module_id,
            title,
            raw_content,
            subject_context,
            profession_context,
        ))
        .await
    }

    /// Load a module from `store` and append a task for it.
    pub async fn enqueue_from_store(&self, store: &dyn ModuleStore, id: &ModuleId) -> Result<usize> {
        let record = store.get_module(id).await?;
        self.enqueue(EnhancementTask::from(record)).await
    }

    /// Current running task and waiting tasks in order.
    pub async fn status(&self) -> QueueSnapshot {
        let state = self.shared.state.lock().await;
        QueueSnapshot {
            running_task_id: state.running.as_ref().map(|t| t.id),
            running_module_id: state.running.as_ref().map(|t| t.module_id.clone()),
            queued_count: state.pending.len(),
            queue: state
                .pending
                .iter()
                .enumerate()
                .map(|(i, t)| QueuedEntry {
                    module_id: t.module_id.clone(),
                    position: i + 1,
                })
                .collect(),
        }
    }

    /// Finished outcomes, newest first.
    pub async fn recent_outcomes(&self) -> Vec<TaskOutcome> {
        self.shared.state.lock().await.history.iter().cloned().collect()
    }

    /// Resolve once nothing is running or waiting, or the worker has stopped.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            let done = {
                let state = self.shared.state.lock().await;
                state.is_idle() || state.stopped
            };
            if done {
                return;
            }
            notified.await;
        }
    }

    /// Start the single worker. Fails with [`EnhancerError::WorkerRunning`]
    /// while another worker is still attached to this queue.
    pub fn spawn(
        &self,
        pipeline: Arc<EnhancementPipeline>,
        store: Arc<dyn ModuleStore>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<WorkerHandle> {
        if self
            .shared
            .worker_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("refused to start a second queue worker");
            return Err(EnhancerError::WorkerRunning);
        }
        let (tx, rx) = watch::channel(false);
        let queue = self.clone();
        let join = tokio::spawn(async move {
            queue.work_loop(pipeline, store, progress, rx).await;
        });
        Ok(WorkerHandle { join, shutdown: tx })
    }

    async fn work_loop(
        &self,
        pipeline: Arc<EnhancementPipeline>,
        store: Arc<dyn ModuleStore>,
        progress: Arc<dyn ProgressReporter>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        self.shared.state.lock().await.stopped = false;
        info!("queue worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = {
                let mut state = self.shared.state.lock().await;
                match state.pending.pop_front() {
                    Some(mut task) => {
                        task.status = TaskStatus::Running;
                        task.started_at = Some(Utc::now());
                        state.running = Some(task.clone());
                        Some(task)
                    }
                    None => None,
                }
            };

            let Some(task) = next else {
                self.shared.idle.notify_waiters();
                tokio::select! {
                    _ = self.shared.work.notified() => continue,
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }
            };

            progress.task_started(&task);
            let outcome = self
                .execute(&task, &pipeline, store.as_ref(), progress.as_ref(), &shutdown)
                .await;
            progress.task_finished(&outcome);
            self.finish(outcome).await;
        }

        let mut state = self.shared.state.lock().await;
        state.stopped = true;
        drop(state);
        self.shared.worker_active.store(false, Ordering::Release);
        self.shared.idle.notify_waiters();
        info!("queue worker stopped");
    }

    #[instrument(skip_all, fields(module_id = %task.module_id, task_id = %task.id))]
    async fn execute(
        &self,
        task: &EnhancementTask,
        pipeline: &EnhancementPipeline,
        store: &dyn ModuleStore,
        progress: &dyn ProgressReporter,
        shutdown: &watch::Receiver<bool>,
    ) -> TaskOutcome {
        let start = Instant::now();
        let finished = pipeline.run_with(task, progress, shutdown).await;

        let (status, error, degraded_stages) = match finished {
            Ok(result) => match store
                .update_module_enrichment(&task.module_id, &task.raw_content, &result)
                .await
            {
                Ok(()) => (TaskStatus::Succeeded, None, result.degraded_stages),
                Err(e) => {
                    error!(error = %e, "failed to persist enrichment");
                    (TaskStatus::Failed, Some(e.summary()), result.degraded_stages)
                }
            },
            Err(e) => {
                warn!(error = %e, "task failed");
                (TaskStatus::Failed, Some(e.summary()), Vec::new())
            }
        };

        info!(
            status = %status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "task finished"
        );

        TaskOutcome {
            task_id: task.id,
            module_id: task.module_id.clone(),
            status,
            error,
            degraded_stages,
            finished_at: Utc::now(),
        }
    }

    async fn finish(&self, outcome: TaskOutcome) {
        let mut state = self.shared.state.lock().await;
        state.running = None;
        state.history.push_front(outcome);
        state.history.truncate(self.shared.history_limit);
        let idle = state.is_idle();
        drop(state);
        if idle {
            self.shared.idle.notify_waiters();
        }
    }
}
