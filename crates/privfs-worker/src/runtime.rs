//! Worker lifecycle: declare the queue, start every loop, stop them all.

use std::sync::Arc;
use std::time::Duration;

use privfs_bus::{Broker, StreamSpec, Subjects};
use privfs_core::Verb;
use privfs_ops::UploadTracker;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::error::WorkerResult;
use crate::sweeper::spawn_sweeper;
use crate::sync::{self, SyncHandler};
use crate::tasks::TaskLoop;

/// Runtime settings, usually built with
/// [`to_worker_options`](crate::bridge::to_worker_options).
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Subject layout.
    pub subjects: Subjects,
    /// Work-queue declaration.
    pub stream: StreamSpec,
    /// Longest wait for one queue fetch.
    pub fetch_wait: Duration,
    /// Pause after a failed fetch.
    pub fetch_backoff: Duration,
    /// Time between upload sweeps.
    pub sweep_interval: Duration,
}

/// A running worker.
pub struct Worker {
    broker: Arc<dyn Broker>,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Worker {
    /// Ensure the work queue, subscribe to every sync subject and start the
    /// handlers, the task loop and the upload sweeper.
    ///
    /// Nothing is spawned unless every subscription succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkerError::Bus`](crate::WorkerError::Bus) if stream setup
    /// or a subscription fails.
    pub async fn start(
        broker: Arc<dyn Broker>,
        options: WorkerOptions,
        tracker: Arc<UploadTracker>,
    ) -> WorkerResult<Self> {
        broker.ensure_stream(&options.stream).await?;

        let mut subscriptions = Vec::new();
        for verb in Verb::sync_verbs() {
            let subscription = broker.subscribe(&options.subjects.verb(verb)).await?;
            subscriptions.push((verb, subscription));
        }

        let dispatcher = Arc::new(Dispatcher::new(tracker));
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(subscriptions.len().saturating_add(2));

        let handler = Arc::new(SyncHandler::new(
            Arc::clone(&broker),
            Arc::clone(&dispatcher),
        ));
        for (verb, subscription) in subscriptions {
            handles.push(tokio::spawn(sync::serve(
                subscription,
                verb,
                Arc::clone(&handler),
                cancel.clone(),
            )));
        }

        let tasks = TaskLoop::new(
            Arc::clone(&broker),
            Arc::clone(&dispatcher),
            options.subjects.clone(),
            options.fetch_wait,
            options.fetch_backoff,
            options.stream.max_deliver,
        );
        handles.push(tokio::spawn(tasks.run(cancel.clone())));

        handles.push(spawn_sweeper(
            Arc::clone(dispatcher.tracker()),
            dispatcher.executor(),
            options.sweep_interval,
            cancel.clone(),
        ));

        info!(
            root = options.subjects.root(),
            stream = %options.stream.stream,
            "worker started"
        );
        Ok(Self {
            broker,
            dispatcher,
            cancel,
            handles,
        })
    }

    /// The upload tracker shared by every handler.
    #[must_use]
    pub fn tracker(&self) -> &Arc<UploadTracker> {
        self.dispatcher.tracker()
    }

    /// Stop pulling and serving, close the broker and wait for every loop.
    ///
    /// A job already pulled off the queue runs to completion first.
    ///
    /// # Errors
    ///
    /// Returns the broker's close error, after all loops have stopped.
    pub async fn shutdown(self) -> WorkerResult<()> {
        self.cancel.cancel();
        let closed = self.broker.close().await;
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker loop ended abnormally");
            }
        }
        closed?;
        info!("worker stopped");
        Ok(())
    }
}
