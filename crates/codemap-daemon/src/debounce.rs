use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};

/// A single optional timer. Rescheduling always replaces the pending
/// deadline; there is never more than one.
#[derive(Default)]
pub struct DebounceTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any pending deadline and arms a new one `after` from now.
    pub fn reset(&mut self, after: Duration) {
        match self.sleep.as_mut() {
            Some(existing) => existing.as_mut().reset(Instant::now() + after),
            None => self.sleep = Some(Box::pin(sleep(after))),
        }
    }

    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    pub fn is_pending(&self) -> bool {
        self.sleep.is_some()
    }

    /// Resolves when the pending deadline passes and disarms the timer.
    /// Never resolves while disarmed. Cancel safe.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(timer) => {
                timer.as_mut().await;
                self.sleep = None;
            }
            None => pending::<()>().await,
        }
    }
}
