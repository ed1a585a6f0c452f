//! Debounced "submitting" indicator.
//!
//! A spinner is only shown when a submission has been running for the whole
//! delay, so fast writes never flash it. Settling hides it at once and cancels
//! the pending timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_SPINNER_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitPhase {
  #[default]
  Idle,
  /// Started, spinner still hidden
  Submitting,
  /// Running for at least the delay
  SubmittingVisible,
}

/// Submission gating state for one view.
pub struct SubmitGate {
  delay: Duration,
  phase: Arc<watch::Sender<SubmitPhase>>,
  /// Incremented by every `start` and `settle`; a timer only fires for the
  /// epoch it was created in
  epoch: Arc<AtomicU64>,
  timer: Option<JoinHandle<()>>,
}

impl SubmitGate {
  pub fn new(delay: Duration) -> Self {
    let (phase, _) = watch::channel(SubmitPhase::Idle);
    Self {
      delay,
      phase: Arc::new(phase),
      epoch: Arc::new(AtomicU64::new(0)),
      timer: None,
    }
  }

  /// Enter `Submitting` and arm the debounce timer.
  ///
  /// No-op while a submission is already running.
  pub fn start(&mut self) {
    if self.is_submitting() {
      return;
    }

    let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
    self.phase.send_replace(SubmitPhase::Submitting);

    let phase = Arc::clone(&self.phase);
    let current = Arc::clone(&self.epoch);
    let delay = self.delay;

    self.timer = Some(tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      phase.send_if_modified(|p| {
        if current.load(Ordering::SeqCst) == epoch && *p == SubmitPhase::Submitting {
          *p = SubmitPhase::SubmittingVisible;
          true
        } else {
          false
        }
      });
    }));
  }

  /// Back to `Idle` right away, whatever the timer is doing.
  pub fn settle(&mut self) {
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
    self.epoch.fetch_add(1, Ordering::SeqCst);
    self.phase.send_replace(SubmitPhase::Idle);
  }

  pub fn phase(&self) -> SubmitPhase {
    *self.phase.borrow()
  }

  pub fn is_submitting(&self) -> bool {
    self.phase() != SubmitPhase::Idle
  }

  pub fn is_submitting_debounced(&self) -> bool {
    self.phase() == SubmitPhase::SubmittingVisible
  }

  /// Watch phase changes, including the timer's.
  pub fn subscribe(&self) -> watch::Receiver<SubmitPhase> {
    self.phase.subscribe()
  }
}

impl Default for SubmitGate {
  fn default() -> Self {
    Self::new(DEFAULT_SPINNER_DELAY)
  }
}

impl Drop for SubmitGate {
  fn drop(&mut self) {
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
  }
}

impl std::fmt::Debug for SubmitGate {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SubmitGate")
      .field("delay", &self.delay)
      .field("phase", &self.phase())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::time::sleep;

  fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
  }

  #[tokio::test(start_paused = true)]
  async fn test_fast_submission_never_shows_spinner() {
    let mut gate = SubmitGate::default();

    gate.start();
    for _ in 0..3 {
      sleep(ms(500)).await;
      assert!(gate.is_submitting());
      assert!(!gate.is_submitting_debounced());
    }

    // t = 1500
    gate.settle();
    assert!(!gate.is_submitting());

    sleep(ms(1000)).await;
    assert_eq!(gate.phase(), SubmitPhase::Idle);
  }

  #[tokio::test(start_paused = true)]
  async fn test_slow_submission_shows_spinner_at_delay() {
    let mut gate = SubmitGate::default();
    gate.start();

    sleep(ms(1999)).await;
    assert!(!gate.is_submitting_debounced());

    sleep(ms(2)).await;
    assert!(gate.is_submitting_debounced());
    assert_eq!(gate.phase(), SubmitPhase::SubmittingVisible);

    // t = 2500
    sleep(ms(499)).await;
    gate.settle();
    assert!(!gate.is_submitting());
    assert!(!gate.is_submitting_debounced());
  }

  #[tokio::test(start_paused = true)]
  async fn test_restart_gets_a_full_delay() {
    let mut gate = SubmitGate::default();

    gate.start();
    sleep(ms(1500)).await;
    gate.settle();

    sleep(ms(100)).await;
    gate.start();

    // First timer would have fired at t = 2000
    sleep(ms(1400)).await;
    assert!(gate.is_submitting());
    assert!(!gate.is_submitting_debounced());

    sleep(ms(601)).await;
    assert!(gate.is_submitting_debounced());
  }

  #[tokio::test(start_paused = true)]
  async fn test_start_while_submitting_keeps_original_timer() {
    let mut gate = SubmitGate::new(ms(1000));

    gate.start();
    sleep(ms(600)).await;
    gate.start();
    sleep(ms(401)).await;

    assert!(gate.is_submitting_debounced());
  }

  #[tokio::test(start_paused = true)]
  async fn test_subscribers_see_phase_changes() {
    let mut gate = SubmitGate::new(ms(100));
    let mut rx = gate.subscribe();

    gate.start();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), SubmitPhase::Submitting);

    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), SubmitPhase::SubmittingVisible);

    gate.settle();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), SubmitPhase::Idle);
  }
}
