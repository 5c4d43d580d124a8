//! Controller Handle - lifecycle of the device reader
//!
//! gilrs is not `Send`, so the collector is created, initialized and run
//! entirely inside one blocking task. The handle only reports whether
//! initialization worked and lets the caller wait for the reader to end.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::event_collector::{CollectorError, CollectorSettings, EventCollector};
use super::input_router::InputRouter;

/// Errors that can occur during controller initialization or operation
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Gamepad detection, driver problems or a rejected binding
    #[error("Collector error: {0}")]
    CollectorError(#[from] CollectorError),

    /// The reader task ended without reporting back
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The blocking reader task panicked or was aborted
    #[error("Reader task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}

/// Handle for the running device reader
pub struct ControllerHandle {
    task: JoinHandle<Result<(), CollectorError>>,
}

impl ControllerHandle {
    /// Starts the reader and returns once the device is selected and synced
    ///
    /// # Errors
    ///
    /// * [`ControllerError::CollectorError`] - no matching device or gilrs failed
    /// * [`ControllerError::ChannelError`] - the reader died before reporting
    pub async fn spawn(
        settings: CollectorSettings,
        router: InputRouter,
        cancel: CancellationToken,
    ) -> Result<Self, ControllerError> {
        info!("Initializing Controller system with settings: {:?}", settings);

        let (ready_tx, ready_rx) = oneshot::channel();

        let task = tokio::task::spawn_blocking(move || {
            let initialized = EventCollector::create(Some(settings), router)
                .and_then(|collector| collector.initialize());

            let mut collector = match initialized {
                Ok(collector) => {
                    let _ = ready_tx.send(Ok(()));
                    collector
                }
                Err(e) => {
                    error!("Failed to initialize Event Collector: {}", e);
                    let _ = ready_tx.send(Err(e));
                    return Ok(());
                }
            };

            collector.run_collection_loop(&cancel)
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                debug!("Event Collector reported ready");
                info!("Controller system initialized successfully");
                Ok(Self { task })
            }
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(ControllerError::ChannelError(e.to_string())),
        }
    }

    /// Waits until the reader stops, either cancelled or failed
    pub async fn wait(self) -> Result<(), ControllerError> {
        self.task.await??;
        info!("Controller system stopped");
        Ok(())
    }
}
