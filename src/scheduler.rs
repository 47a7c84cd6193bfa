//! Delayed dispatch work: expiring unanswered offers and retrying orders
//! nobody was free to take.
//!
//! A timer is a sleeping task that posts a [`DispatchTimer`] back to the
//! worker started by [`run`], which then re-enters the order flow.

use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::AppState;
use crate::handlers::orders;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTimer {
    /// `driver_id` has not answered the offer for `order_id`.
    OfferExpired { order_id: Uuid, driver_id: Uuid },
    /// Look for a driver again; `attempt` counts retries so far.
    Retry { order_id: Uuid, attempt: u32 },
}

#[derive(Clone)]
pub struct DispatchTimers {
    sender: mpsc::UnboundedSender<DispatchTimer>,
}

impl DispatchTimers {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchTimer>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Deliver `timer` to the worker after `after` has elapsed.
    pub fn schedule(&self, timer: DispatchTimer, after: Duration) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if sender.send(timer).is_err() {
                tracing::debug!(?timer, "Dispatch worker stopped, timer dropped");
            }
        });
    }
}

/// Handle fired timers until every sender is gone.
pub async fn run(state: AppState, mut timers: mpsc::UnboundedReceiver<DispatchTimer>) {
    while let Some(timer) = timers.recv().await {
        let state = state.clone();
        tokio::spawn(async move {
            let result = match timer {
                DispatchTimer::OfferExpired {
                    order_id,
                    driver_id,
                } => orders::expire_offer(&state, order_id, driver_id).await,
                DispatchTimer::Retry { order_id, attempt } => {
                    orders::retry_dispatch(&state, order_id, attempt).await
                }
            };

            if let Err(e) = result {
                tracing::warn!(?timer, error = %e, "Timed dispatch step failed");
            }
        });
    }
}
