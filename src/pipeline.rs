//! Producer and consumer halves of the ingestion pipelines.
//!
//! Each pipeline is one [`LogSource`] feeding one bounded channel drained by
//! one consumer. The commit consumer owns the [`ReconciliationEngine`]
//! outright, so its state never crosses a task boundary.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::extractor;
use crate::ingest::{LogSource, RawRecord, SubscriptionFilter};
use crate::notifier::{messages, notify_within, Notifier};
use crate::reconcile::{Divergence, Observation, ReconcileError, ReconciliationEngine};

/// How a consumer loop ended without a divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    /// The source finished and the channel drained.
    Exhausted,
    /// A sibling pipeline requested shutdown.
    Cancelled,
}

/// Drive `source` into `out` until it ends or `cancel` fires.
///
/// Transport errors end the pipeline and are logged here; they are never
/// retried. Dropping `out` on return closes the consumer's channel.
pub async fn run_producer(
    mut source: Box<dyn LogSource>,
    filter: SubscriptionFilter,
    out: mpsc::Sender<RawRecord>,
    cancel: CancellationToken,
) {
    let name = source.name().to_owned();
    info!(source = %name, filter = %filter, "starting log subscription");

    tokio::select! {
        () = cancel.cancelled() => {
            debug!(source = %name, "log subscription cancelled");
        }
        result = source.run(&filter, out) => match result {
            Ok(()) => info!(source = %name, "log subscription ended"),
            Err(e) => error!(source = %name, error = %e, "log subscription failed"),
        },
    }
}

/// Consumer for consensus commit records.
pub struct CommitPipeline {
    engine: ReconciliationEngine,
    notifier: Arc<dyn Notifier>,
    source_label: String,
    alert_mention: String,
    notify_deadline: Duration,
}

impl CommitPipeline {
    /// Create a consumer around `engine`.
    ///
    /// `source_label` names the resource label carrying the node identity.
    pub fn new(
        engine: ReconciliationEngine,
        notifier: Arc<dyn Notifier>,
        source_label: &str,
        alert_mention: &str,
        notify_deadline: Duration,
    ) -> Self {
        Self {
            engine,
            notifier,
            source_label: source_label.to_owned(),
            alert_mention: alert_mention.to_owned(),
            notify_deadline,
        }
    }

    /// The engine this consumer drives.
    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Process one raw record.
    ///
    /// Records without a node identity or that are not commit lines are
    /// skipped. Accepted commits are logged, with a progress notice on
    /// interval heights.
    ///
    /// # Errors
    ///
    /// Returns the [`Divergence`] after the alert has been sent. The engine
    /// is halted at that point.
    pub async fn handle(&mut self, record: &RawRecord) -> Result<(), Divergence> {
        let Some(source_id) = record.label(&self.source_label) else {
            debug!(label = %self.source_label, "commit record without source label, skipping");
            return Ok(());
        };

        let event = match extractor::extract(source_id, &record.payload) {
            Ok(event) => event,
            Err(e) => {
                trace!(source = %source_id, error = %e, "not a commit line");
                return Ok(());
            }
        };

        match self.engine.observe(&event) {
            Ok(Observation::Accepted {
                reports_at_height,
                duplicate,
                progress,
            }) => {
                info!(
                    source = %event.source_id,
                    height = event.height,
                    root = %event.root,
                    num_txs = event.tx_count,
                    reports = reports_at_height,
                    duplicate,
                    "{}",
                    messages::status_line(&event)
                );
                if progress {
                    let notice = messages::progress_notice(&event);
                    notify_within(self.notifier.as_ref(), &notice, self.notify_deadline).await;
                }
                Ok(())
            }
            Ok(Observation::Unverifiable { floor }) => {
                warn!(
                    source = %event.source_id,
                    height = event.height,
                    floor,
                    "commit below retention window, not verified"
                );
                Ok(())
            }
            Err(ReconcileError::Divergence(divergence)) => {
                let alert = messages::divergence_alert(&self.alert_mention, &divergence);
                error!(
                    height = divergence.height,
                    reports = ?divergence.reports,
                    "{}",
                    messages::divergence_headline(divergence.height)
                );
                notify_within(self.notifier.as_ref(), &alert, self.notify_deadline).await;
                Err(divergence)
            }
            Err(ReconcileError::Halted { height }) => {
                debug!(halted_at = height, "engine halted, dropping commit");
                Ok(())
            }
        }
    }

    /// Drain `rx` until the channel closes, `cancel` fires, or a divergence
    /// halts the engine. A divergence cancels `cancel` so sibling tasks stop.
    ///
    /// # Errors
    ///
    /// Returns the [`Divergence`] that halted the engine.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<RawRecord>,
        cancel: CancellationToken,
    ) -> Result<PipelineExit, Divergence> {
        info!("commit consumer started");
        loop {
            let record = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("commit consumer cancelled");
                    return Ok(PipelineExit::Cancelled);
                }
                record = rx.recv() => record,
            };

            let Some(record) = record else {
                info!(heights = self.engine.height_count(), "commit consumer exiting");
                return Ok(PipelineExit::Exhausted);
            };

            if let Err(divergence) = self.handle(&record).await {
                cancel.cancel();
                return Err(divergence);
            }
        }
    }
}
