//! Operator notifications.
//!
//! Delivery is best-effort and fire-and-forget: [`Notifier::notify`] never
//! reports failure to its caller, so a dead channel can never stall or
//! break reconciliation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

pub mod discord;
pub mod messages;

pub use discord::DiscordNotifier;

/// A human-facing message sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message`. Failures are logged by the implementation and
    /// swallowed.
    async fn notify(&self, message: &str);
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        info!(notification = %message, "notification (not delivered)");
    }
}

/// Deliver `message`, abandoning the attempt after `deadline`.
///
/// Guards consumers against sinks that do not bound their own calls.
pub async fn notify_within(notifier: &dyn Notifier, message: &str, deadline: Duration) {
    if tokio::time::timeout(deadline, notifier.notify(message))
        .await
        .is_err()
    {
        warn!(
            deadline_secs = deadline.as_secs_f64(),
            "notification abandoned after deadline"
        );
    }
}
