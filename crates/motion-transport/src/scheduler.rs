/// Task scheduling on top of a tokio runtime handle.
/// Delayed tasks run once; repeating tasks run with a fixed delay between the
/// end of one run and the start of the next. Dropping the returned handle
/// detaches the task, `abort()` cancels it.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime the caller is running in.
    /// Panics outside a tokio runtime, like `tokio::spawn`.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(task)
    }

    pub fn schedule_delayed<F>(&self, delay: Duration, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await
        })
    }

    pub fn schedule_repeating<F, Fut>(
        &self,
        initial_delay: Duration,
        period: Duration,
        mut task: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                task().await;
                tokio::time::sleep(period).await;
            }
        })
    }
}
