//! Process supervision: wires sources, consumers, and the liveness endpoint.
//!
//! Both pipelines run concurrently and share nothing but the notifier and a
//! [`CancellationToken`]. A divergence cancels the token so every sibling
//! task stops and no further events are processed.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::health;
use crate::ingest::{LogSource, SubscriptionFilter};
use crate::notifier::Notifier;
use crate::pipeline::{run_producer, CommitPipeline};
use crate::reconcile::{Divergence, EngineOptions, ReconciliationEngine};
use crate::relay::ErrorRelay;

/// Fatal supervisor outcomes.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The fleet disagreed on a state root.
    #[error("fatal divergence: {0}")]
    Divergence(Divergence),

    /// The liveness endpoint could not bind.
    #[error("failed to bind health endpoint on port {port}: {source}")]
    Health {
        /// Configured port.
        port: u16,
        /// Bind error.
        source: std::io::Error,
    },

    /// A pipeline task panicked.
    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Starts and awaits both monitoring pipelines.
pub struct Supervisor {
    config: RelayConfig,
    network: String,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Create a supervisor for `network`.
    pub fn new(config: RelayConfig, network: &str, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            network: network.to_owned(),
            notifier,
            cancel: CancellationToken::new(),
        }
    }

    /// Token cancelled when the supervisor stops; cancel it to stop early.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Filter for the commit pipeline.
    pub fn commit_filter(&self) -> SubscriptionFilter {
        SubscriptionFilter::commits(&self.config.filter, &self.network)
    }

    /// Filter for the error pipeline.
    pub fn error_filter(&self) -> SubscriptionFilter {
        SubscriptionFilter::errors(&self.config.filter, &self.network)
    }

    /// Run both pipelines to completion.
    ///
    /// Returns `Ok(())` once both sources are exhausted or the token is
    /// cancelled from outside.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Divergence`] when the commit pipeline
    /// halts, [`SupervisorError::Health`] if the liveness port cannot be
    /// bound, and [`SupervisorError::Join`] if a consumer task panics.
    pub async fn run(
        self,
        commit_source: Box<dyn LogSource>,
        error_source: Box<dyn LogSource>,
    ) -> Result<(), SupervisorError> {
        let cancel = self.cancel.clone();
        info!(network = %self.network, "starting apphash relay");

        let health_task = match self.config.health.port {
            0 => None,
            port => {
                let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|source| SupervisorError::Health { port, source })?;
                Some(tokio::spawn(health::serve(listener, cancel.clone())))
            }
        };

        let capacity = self.config.source.channel_capacity.max(1);
        let deadline = self.config.notifier.timeout();
        let label = self.config.filter.source_label.as_str();

        let (commit_tx, commit_rx) = mpsc::channel(capacity);
        let commit_producer = tokio::spawn(run_producer(
            commit_source,
            self.commit_filter(),
            commit_tx,
            cancel.clone(),
        ));
        let engine = ReconciliationEngine::new(EngineOptions::from(&self.config.reconcile));
        let commit_consumer = tokio::spawn(
            CommitPipeline::new(
                engine,
                Arc::clone(&self.notifier),
                label,
                &self.config.notifier.alert_mention,
                deadline,
            )
            .run(commit_rx, cancel.clone()),
        );

        let (error_tx, error_rx) = mpsc::channel(capacity);
        let error_producer = tokio::spawn(run_producer(
            error_source,
            self.error_filter(),
            error_tx,
            cancel.clone(),
        ));
        let error_consumer = tokio::spawn(
            ErrorRelay::new(Arc::clone(&self.notifier), label, deadline).run(error_rx, cancel.clone()),
        );

        let (commit_exit, error_exit) = tokio::join!(commit_consumer, error_consumer);

        cancel.cancel();
        for producer in [commit_producer, error_producer] {
            if let Err(e) = producer.await {
                warn!(error = %e, "log producer task failed");
            }
        }
        if let Some(task) = health_task {
            if let Err(e) = task.await {
                warn!(error = %e, "health task failed");
            }
        }

        let commit_exit = match commit_exit? {
            Ok(exit) => exit,
            Err(divergence) => return Err(SupervisorError::Divergence(divergence)),
        };
        let error_exit = error_exit?;
        info!(commit = ?commit_exit, errors = ?error_exit, "pipelines finished");
        Ok(())
    }
}
