//! Running monitor-producing work on another dispatcher.

use std::sync::Arc;

use log::debug;

use crate::{
  dispatching::{DispatchFlags, Dispatching, TransferMode},
  monitor::{Feed, Monitor, Payload},
  ops::safety_valve::{DirectPass, LitteredStrategy, SafetyValve},
};

type Task<E, T> = Arc<dyn Fn() -> Monitor<E, T> + Send + Sync>;

/// A task started on an `execute` dispatcher whose monitor is delivered on
/// the dispatcher that runs it.
pub struct BackgroundTask<E, T> {
  task: Task<E, T>,
  execute: Arc<dyn Dispatching>,
}

impl<E, T> Clone for BackgroundTask<E, T> {
  fn clone(&self) -> Self { BackgroundTask { task: self.task.clone(), execute: self.execute.clone() } }
}

impl<E: Payload, T: Payload> BackgroundTask<E, T> {
  pub fn new(task: impl Fn() -> Monitor<E, T> + Send + Sync + 'static, execute: Arc<dyn Dispatching>) -> Self {
    BackgroundTask { task: Arc::new(task), execute }
  }

  /// A task that drives a fresh feed instead of returning a monitor.
  pub fn with_feed(task: impl Fn(Feed<E, T>) + Send + Sync + 'static, execute: Arc<dyn Dispatching>) -> Self {
    Self::new(
      move || {
        let (monitor, feed) = Monitor::make();
        task(feed);
        monitor
      },
      execute,
    )
  }

  /// Starts the task. The result is bound to `resolve` and receives the
  /// task's values there.
  ///
  /// # Panics
  ///
  /// Must be called from `resolve` as barrier work.
  pub fn run(&self, resolve: Arc<dyn Dispatching>, mode: TransferMode) -> Monitor<E, T> {
    self.run_with(resolve, mode, Arc::new(DirectPass), None)
  }

  /// [`BackgroundTask::run`] with backpressure on the way back.
  pub fn run_with(
    &self,
    resolve: Arc<dyn Dispatching>,
    mode: TransferMode,
    valve: Arc<dyn SafetyValve>,
    littered: Option<Arc<dyn LitteredStrategy<E>>>,
  ) -> Monitor<E, T> {
    resolve.assert_is_current(DispatchFlags::BARRIER);
    let (result, feed) = Monitor::make();
    feed.bind_context(resolve.clone());

    let (task, execute) = (self.task.clone(), self.execute.clone());
    debug!("background task scheduled");
    let _start = self.execute.run(
      DispatchFlags::BARRIER,
      Box::new(move || task().forward_with(execute, resolve, feed, mode, valve, littered)),
    );
    result
  }
}
