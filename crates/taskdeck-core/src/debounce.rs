use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// One pending delayed action. Arming
/// again replaces whatever was pending;
/// dropping the timer cancels it.
#[derive(Debug, Default)]
pub struct CancellableTimer {
  pending: Option<JoinHandle<()>>
}

impl CancellableTimer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Must be called from inside a tokio
  /// runtime.
  pub fn arm<F>(
    &mut self,
    delay: Duration,
    fire: F
  ) where
    F: FnOnce() + Send + 'static
  {
    self.cancel();
    self.pending =
      Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        fire();
      }));
  }

  pub fn cancel(&mut self) {
    if let Some(handle) =
      self.pending.take()
    {
      handle.abort();
      trace!("cancelled pending timer");
    }
  }

  pub fn is_armed(&self) -> bool {
    self
      .pending
      .as_ref()
      .is_some_and(|h| !h.is_finished())
  }
}

impl Drop for CancellableTimer {
  fn drop(&mut self) {
    self.cancel();
  }
}

/// Emits only the last value pushed
/// within a quiet window.
#[derive(Debug)]
pub struct Debouncer<T> {
  window: Duration,
  timer:  CancellableTimer,
  tx:     mpsc::UnboundedSender<T>
}

impl<T> Debouncer<T>
where
  T: Send + 'static
{
  pub fn new(
    window: Duration
  ) -> (Self, mpsc::UnboundedReceiver<T>)
  {
    let (tx, rx) =
      mpsc::unbounded_channel();
    (
      Self {
        window,
        timer: CancellableTimer::new(),
        tx
      },
      rx
    )
  }

  pub fn window(&self) -> Duration {
    self.window
  }

  pub fn push(&mut self, value: T) {
    let tx = self.tx.clone();
    self.timer.arm(self.window, move || {
      let _ = tx.send(value);
    });
  }

  pub fn cancel(&mut self) {
    self.timer.cancel();
  }

  pub fn is_pending(&self) -> bool {
    self.timer.is_armed()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::sync::atomic::{
    AtomicUsize,
    Ordering
  };

  use tokio::time::{
    Instant,
    sleep
  };

  use super::*;

  #[tokio::test(start_paused = true)]
  async fn rapid_pushes_emit_only_the_last()
   {
    let (mut debouncer, mut rx) =
      Debouncer::new(
        Duration::from_millis(500)
      );
    let start = Instant::now();

    debouncer.push("r");
    sleep(Duration::from_millis(100)).await;
    debouncer.push("re");
    sleep(Duration::from_millis(100)).await;
    debouncer.push("rep");

    assert_eq!(rx.recv().await, Some("rep"));
    assert!(
      start.elapsed()
        >= Duration::from_millis(700)
    );

    let extra = tokio::time::timeout(
      Duration::from_secs(5),
      rx.recv()
    )
    .await;
    assert!(extra.is_err());
  }

  #[tokio::test(start_paused = true)]
  async fn spaced_pushes_each_fire() {
    let (mut debouncer, mut rx) =
      Debouncer::new(
        Duration::from_millis(500)
      );
    debouncer.push(1);
    sleep(Duration::from_millis(600)).await;
    debouncer.push(2);
    assert_eq!(rx.recv().await, Some(1));
    assert_eq!(rx.recv().await, Some(2));
  }

  #[tokio::test(start_paused = true)]
  async fn cancel_discards_pending_value() {
    let fired = Arc::new(AtomicUsize::new(0));
    let mut timer = CancellableTimer::new();
    let counter = fired.clone();
    timer.arm(
      Duration::from_millis(50),
      move || {
        counter.fetch_add(1, Ordering::SeqCst);
      }
    );
    assert!(timer.is_armed());
    timer.cancel();
    assert!(!timer.is_armed());

    sleep(Duration::from_millis(200)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn dropping_the_timer_cancels() {
    let fired = Arc::new(AtomicUsize::new(0));
    {
      let mut timer = CancellableTimer::new();
      let counter = fired.clone();
      timer.arm(
        Duration::from_millis(10),
        move || {
          counter
            .fetch_add(1, Ordering::SeqCst);
        }
      );
    }
    sleep(Duration::from_millis(100)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
  }
}
