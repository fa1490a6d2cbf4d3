//! Cancellable countdown before an automatic save

use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveOutcome {
    Fired,
    Cancelled,
}

/// A spawned countdown. Once `cancel` is observed the timer never fires.
pub struct AutosaveTimer {
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<AutosaveOutcome>,
    outcome: Option<AutosaveOutcome>,
}

impl AutosaveTimer {
    /// Starts counting down from `countdown`, calling `on_tick` with the time
    /// left before every `tick`.
    pub fn start<F>(countdown: Duration, tick: Duration, on_tick: F) -> Self
    where
        F: Fn(Duration) + Send + 'static,
    {
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let tick = if tick.is_zero() { countdown } else { tick };

        let handle = tokio::spawn(async move {
            let mut remaining = countdown;
            while !remaining.is_zero() {
                on_tick(remaining);
                let step = tick.min(remaining);
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => {
                        debug!("Autosave cancelled with {:?} left", remaining);
                        return AutosaveOutcome::Cancelled;
                    }
                    _ = tokio::time::sleep(step) => {}
                }
                remaining = remaining.saturating_sub(step);
            }
            // a cancel racing the last tick still wins
            if cancel_rx.try_recv().is_ok() {
                return AutosaveOutcome::Cancelled;
            }
            AutosaveOutcome::Fired
        });

        Self {
            cancel: Some(cancel_tx),
            handle,
            outcome: None,
        }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Waits for the countdown to end. Safe to call again after a dropped
    /// wait.
    pub async fn wait(&mut self) -> AutosaveOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        let outcome = (&mut self.handle)
            .await
            .unwrap_or(AutosaveOutcome::Cancelled);
        self.outcome = Some(outcome);
        outcome
    }
}

impl Drop for AutosaveTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
