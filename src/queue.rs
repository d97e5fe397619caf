//! Mutation Queue
//!
//! Strictly sequential task runner. Each task pairs an async action with a
//! synchronous compensation captured at enqueue time; a failed action is
//! compensated and dropped, never retried. When the queue runs dry the drain
//! callback runs before the cycle ends.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::error::{SyncError, SyncResult};

type Action = Box<dyn FnOnce() -> BoxFuture<'static, SyncResult<()>> + Send>;
type Compensate = Box<dyn FnOnce() + Send>;

/// Invoked every time the queue becomes empty
pub type DrainCallback = Arc<dyn Fn() -> BoxFuture<'static, SyncResult<()>> + Send + Sync>;

/// Invoked once per failed task, after its compensation ran
pub type FailureNotice = Arc<dyn Fn(&TaskFailure) + Send + Sync>;

/// One unit of queued work
pub struct Task {
    label: String,
    action: Action,
    compensate: Compensate,
}

impl Task {
    /// `action` is not started until the queue reaches this task.
    pub fn new<A, F, C>(label: impl Into<String>, action: A, compensate: C) -> Self
    where
        A: FnOnce() -> F + Send + 'static,
        F: Future<Output = SyncResult<()>> + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self {
            label: label.into(),
            action: Box::new(move || action().boxed()),
            compensate: Box::new(compensate),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish_non_exhaustive()
    }
}

/// Report handed to the failure notice
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub queue: String,
    pub task: String,
    pub error: SyncError,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Task>,
    draining: bool,
}

struct QueueInner {
    name: String,
    state: Mutex<QueueState>,
    busy: watch::Sender<bool>,
    on_drain: Option<DrainCallback>,
    on_failure: Option<FailureNotice>,
}

/// Serializes every mutation of one collection view
#[derive(Clone)]
pub struct MutationQueue {
    inner: Arc<QueueInner>,
}

/// Builder for [`MutationQueue`]
pub struct MutationQueueBuilder {
    name: String,
    on_drain: Option<DrainCallback>,
    on_failure: Option<FailureNotice>,
}

impl MutationQueueBuilder {
    pub fn on_drain(mut self, callback: DrainCallback) -> Self {
        self.on_drain = Some(callback);
        self
    }

    pub fn on_failure(mut self, notice: FailureNotice) -> Self {
        self.on_failure = Some(notice);
        self
    }

    pub fn build(self) -> MutationQueue {
        let (busy, _) = watch::channel(false);
        MutationQueue {
            inner: Arc::new(QueueInner {
                name: self.name,
                state: Mutex::new(QueueState::default()),
                busy,
                on_drain: self.on_drain,
                on_failure: self.on_failure,
            }),
        }
    }
}

impl MutationQueue {
    /// Queue with no drain callback and no failure notice
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> MutationQueueBuilder {
        MutationQueueBuilder {
            name: name.into(),
            on_drain: None,
            on_failure: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Append `task`; starts a drain cycle on the Tokio runtime if idle.
    ///
    /// Safe to call from inside a running action or drain callback: the
    /// current cycle simply picks the task up.
    pub fn enqueue(&self, task: Task) {
        debug!(queue = %self.inner.name, task = %task.label, "enqueue");
        let start = {
            let mut state = self.inner.lock();
            state.pending.push_back(task);
            if state.draining {
                false
            } else {
                state.draining = true;
                self.inner.busy.send_replace(true);
                true
            }
        };

        if start {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.drain());
        }
    }

    /// True from the first enqueue until the drain callback has returned
    pub fn busy(&self) -> bool {
        *self.inner.busy.borrow()
    }

    /// Syncing indicator
    pub fn watch_busy(&self) -> watch::Receiver<bool> {
        self.inner.busy.subscribe()
    }

    /// Tasks queued behind the one currently running
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Resolves once the current drain cycle (if any) has finished
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.busy.subscribe();
        let _ = rx.wait_for(|busy| !*busy).await;
    }
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_task(&self) -> Option<Task> {
        self.lock().pending.pop_front()
    }

    async fn drain(self: Arc<Self>) {
        loop {
            while let Some(task) = self.next_task() {
                self.run(task).await;
            }

            if let Some(on_drain) = &self.on_drain {
                let outcome = AssertUnwindSafe(on_drain()).catch_unwind().await;
                match outcome {
                    Ok(Ok(())) => debug!(queue = %self.name, "drain hooks finished"),
                    Ok(Err(err)) => warn!(queue = %self.name, error = %err, "drain hook failed"),
                    Err(panic) => error!(
                        queue = %self.name,
                        panic = %panic_message(panic.as_ref()),
                        "drain hook panicked"
                    ),
                }
            }

            let finished = {
                let mut state = self.lock();
                if state.pending.is_empty() {
                    state.draining = false;
                    self.busy.send_replace(false);
                    true
                } else {
                    false
                }
            };
            if finished {
                return;
            }
        }
    }

    async fn run(&self, task: Task) {
        let Task {
            label,
            action,
            compensate,
        } = task;
        debug!(queue = %self.name, task = %label, "task started");

        let outcome = AssertUnwindSafe(async move { action().await })
            .catch_unwind()
            .await;
        let err = match outcome {
            Ok(Ok(())) => {
                debug!(queue = %self.name, task = %label, "task finished");
                return;
            }
            Ok(Err(err)) => err,
            Err(panic) => SyncError::TaskPanicked(panic_message(panic.as_ref())),
        };

        if std::panic::catch_unwind(AssertUnwindSafe(compensate)).is_err() {
            error!(queue = %self.name, task = %label, "compensation panicked");
        }
        warn!(queue = %self.name, task = %label, error = %err, "task failed, change reverted");

        if let Some(notice) = &self.on_failure {
            notice(&TaskFailure {
                queue: self.name.clone(),
                task: label,
                error: err,
            });
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
