//! Error relay: forwards error-severity records to the notifier verbatim.
//!
//! Stateless. Records are expected to arrive already filtered by severity.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ingest::RawRecord;
use crate::notifier::{messages, notify_within, Notifier};
use crate::pipeline::PipelineExit;

/// Consumer for error-severity records.
pub struct ErrorRelay {
    notifier: Arc<dyn Notifier>,
    source_label: String,
    notify_deadline: Duration,
    forwarded: u64,
    dropped: u64,
}

impl ErrorRelay {
    /// Create a relay reading node identity from `source_label`.
    pub fn new(notifier: Arc<dyn Notifier>, source_label: &str, notify_deadline: Duration) -> Self {
        Self {
            notifier,
            source_label: source_label.to_owned(),
            notify_deadline,
            forwarded: 0,
            dropped: 0,
        }
    }

    /// Forward one record. Returns whether it was forwarded.
    pub async fn handle(&mut self, record: &RawRecord) -> bool {
        let Some(source_id) = record.label(&self.source_label) else {
            warn!(label = %self.source_label, "source label not found on error record, dropping");
            self.dropped = self.dropped.saturating_add(1);
            return false;
        };

        let message = messages::error_forward(source_id, &record.payload);
        notify_within(self.notifier.as_ref(), &message, self.notify_deadline).await;
        self.forwarded = self.forwarded.saturating_add(1);
        true
    }

    /// Records forwarded so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Records dropped for lack of a source label.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Drain `rx` until the channel closes or `cancel` fires.
    pub async fn run(mut self, mut rx: mpsc::Receiver<RawRecord>, cancel: CancellationToken) -> PipelineExit {
        info!("error relay started");
        loop {
            let record = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("error relay cancelled");
                    return PipelineExit::Cancelled;
                }
                record = rx.recv() => record,
            };

            match record {
                Some(record) => {
                    self.handle(&record).await;
                }
                None => {
                    info!(
                        forwarded = self.forwarded,
                        dropped = self.dropped,
                        "error relay exiting"
                    );
                    return PipelineExit::Exhausted;
                }
            }
        }
    }
}
