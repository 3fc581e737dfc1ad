//! One-shot timer slot used for the connect guard and the reconnect timer.

use std::{pin::Pin, time::Duration};

use tokio::time::{Sleep, sleep};

/// A single re-armable deadline.
///
/// Arming replaces any previous deadline. [`TimerSlot::fired`] pends forever
/// while the slot is empty, so it can sit in a `select!` arm unconditionally.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TimerSlot {
    pub(crate) fn arm(&mut self, after: Duration) {
        self.sleep = Some(Box::pin(sleep(after)));
    }

    pub(crate) fn cancel(&mut self) {
        self.sleep = None;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Completes when the armed deadline passes, disarming the slot.
    pub(crate) async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => std::future::pending().await,
        }
    }
}
