//! Repeating tasks with pluggable waits
//!
//! A [`Task`] runs its body, waits with its [`Waiter`], feeds the wait result
//! into the next run, and repeats until stopped. Body errors are logged and
//! passed to the optional exception handler; they never stop the loop.
//! Stopping cancels the in-flight wait or body without reporting anything to
//! the handler.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{SchedulerError, SchedulerResult};
use super::waiter::{ArmedWait, WaitOutcome, Waiter};

/// Future returned by a task body
pub type TaskFuture = BoxFuture<'static, anyhow::Result<()>>;

type TaskFn = Arc<dyn Fn(Option<WaitOutcome>) -> TaskFuture + Send + Sync>;
type HandlerFn = Arc<dyn Fn(anyhow::Error) -> BoxFuture<'static, ()> + Send + Sync>;

tokio::task_local! {
    static CURRENT_TASK: usize;
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Task`]
pub struct TaskBuilder {
    name: String,
    waiter: Option<Waiter>,
    exception_handler: Option<HandlerFn>,
}

impl TaskBuilder {
    /// Set the waiter used between runs
    pub fn waiter(mut self, waiter: Waiter) -> Self {
        self.waiter = Some(waiter);
        self
    }

    /// Set the handler receiving body errors
    pub fn exception_handler<H, Fut>(mut self, handler: H) -> Self
    where
        H: Fn(anyhow::Error) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.exception_handler = Some(Arc::new(move |err| -> BoxFuture<'static, ()> {
            Box::pin(handler(err))
        }));
        self
    }

    /// Finish with the task body
    pub fn build<F, Fut>(self, func: F) -> Task
    where
        F: Fn(Option<WaitOutcome>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Task {
            inner: Arc::new(TaskInner {
                name: self.name,
                func: Arc::new(move |arg| -> TaskFuture { Box::pin(func(arg)) }),
                waiter: self.waiter,
                exception_handler: self.exception_handler,
                run: Mutex::new(None),
            }),
        }
    }
}

// ============================================================================
// Task
// ============================================================================

/// A named, restartable repeating job. Clones share state.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

struct TaskInner {
    name: String,
    func: TaskFn,
    waiter: Option<Waiter>,
    exception_handler: Option<HandlerFn>,
    run: Mutex<Option<RunHandle>>,
}

struct RunHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Task {
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder {
            name: name.into(),
            waiter: None,
            exception_handler: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn waiter(&self) -> Option<&Waiter> {
        self.inner.waiter.as_ref()
    }

    /// Whether the task loop is currently running
    pub fn running(&self) -> bool {
        lock(&self.inner.run)
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Start the loop in a background task.
    ///
    /// With a `run_first` waiter the first wait is registered before this
    /// returns, so an event published right after `start()` is not missed.
    pub fn start(&self) -> SchedulerResult<()> {
        let waiter = self
            .inner
            .waiter
            .clone()
            .ok_or_else(|| SchedulerError::waiter_required(&self.inner.name))?;

        let mut run = lock(&self.inner.run);
        if run.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(SchedulerError::already_running(&self.inner.name));
        }

        tracing::info!(task = %self.inner.name, "Starting up task");

        let first_wait = waiter.runs_first().then(|| waiter.arm());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let inner = self.inner.clone();

        let handle = tokio::spawn(CURRENT_TASK.scope(self.id(), async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(task = %inner.name, "Task cancelled");
                }
                _ = inner.run_loop(waiter, first_wait) => {}
            }
        }));

        *run = Some(RunHandle { cancel, handle });
        Ok(())
    }

    /// Stop the loop, interrupting any in-flight wait or body.
    ///
    /// Returns once the loop has exited. Called from inside the task's own
    /// body it only requests cancellation, which takes effect at the body's
    /// next suspension point.
    pub async fn stop(&self) {
        let run = lock(&self.inner.run).take();
        let Some(run) = run else {
            return;
        };
        if run.handle.is_finished() {
            return;
        }

        tracing::info!(task = %self.inner.name, "Stopping task");
        run.cancel.cancel();

        let own_task = CURRENT_TASK
            .try_with(|id| *id == self.id())
            .unwrap_or(false);
        if own_task {
            return;
        }

        if let Err(e) = run.handle.await {
            if e.is_panic() {
                tracing::error!(task = %self.inner.name, "Task panicked before stopping");
            }
        }
    }

    /// Run the body once in the caller's context, independent of the loop.
    ///
    /// Errors take the same path as in the loop: logged, then handed to the
    /// exception handler.
    pub async fn manual_trigger(&self, arg: Option<WaitOutcome>) {
        tracing::info!(task = %self.inner.name, "Manually triggering task");
        self.inner.execute(arg).await;
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("waiter", &self.inner.waiter)
            .field("running", &self.running())
            .finish()
    }
}

impl TaskInner {
    async fn run_loop(&self, waiter: Waiter, first_wait: Option<ArmedWait>) {
        let mut arg = match first_wait {
            Some(armed) => match armed.wait().await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::error!(task = %self.name, error = %e, "Initial wait failed, task exiting");
                    return;
                }
            },
            None => None,
        };

        loop {
            self.execute(arg).await;

            arg = match waiter.arm().wait().await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::error!(task = %self.name, error = %e, "Wait failed, task exiting");
                    return;
                }
            };
        }
    }

    async fn execute(&self, arg: Option<WaitOutcome>) {
        if let Err(e) = (self.func)(arg).await {
            tracing::warn!(task = %self.name, error = %e, "Exception in task, ignoring");
            if let Some(handler) = &self.exception_handler {
                handler(e).await;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
