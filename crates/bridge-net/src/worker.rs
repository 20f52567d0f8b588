//! Receive loop for one connection's lifetime.
//!
//! A [`SessionWorker`] reads from the socket, feeds the [`LineDecoder`] and
//! applies each decoded message to the shared state. It exits on a
//! zero-length read, a reset or any other read error, flipping the
//! connection status to `Disconnected` exactly once, or when the controller
//! signals a local stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::codec::{LineDecoder, ServerMessage};
use crate::error::SessionFault;
use crate::state::SessionShared;

/// Read-side settings for a worker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerConfig {
    pub(crate) read_buffer_size: usize,
    pub(crate) max_line_length: usize,
}

/// Handle to a running receive loop.
pub(crate) struct SessionWorker {
    epoch: u64,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<SessionFault>,
}

impl SessionWorker {
    /// Spawn the receive loop for generation `epoch`.
    pub(crate) fn spawn<R>(
        reader: R,
        shared: Arc<SessionShared>,
        epoch: u64,
        config: WorkerConfig,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let fault = read_loop(reader, &shared, config, shutdown_rx).await;
            if fault != SessionFault::Stopped {
                if shared.worker_disconnected(epoch) {
                    tracing::info!("Session worker {epoch} exiting: {fault}");
                } else {
                    tracing::debug!("Stale session worker {epoch} exiting: {fault}");
                }
            }
            fault
        });
        Self {
            epoch,
            shutdown_tx,
            handle,
        }
    }

    /// Whether the receive loop has already returned.
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the loop to stop and wait at most `grace` for it to exit.
    ///
    /// A worker that overstays is aborted and the anomaly logged; the caller
    /// proceeds either way.
    pub(crate) async fn stop(self, grace: Duration) -> Option<SessionFault> {
        let _ = self.shutdown_tx.send(true);
        let mut handle = self.handle;
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(fault)) => Some(fault),
            Ok(Err(e)) => {
                tracing::warn!("Session worker {} failed: {e}", self.epoch);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "Session worker {} did not exit within {grace:?}, abandoning it",
                    self.epoch
                );
                handle.abort();
                None
            }
        }
    }
}

async fn read_loop<R>(
    mut reader: R,
    shared: &SessionShared,
    config: WorkerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> SessionFault
where
    R: AsyncRead + Unpin,
{
    let mut decoder = LineDecoder::new(config.max_line_length);
    let mut buf = vec![0u8; config.read_buffer_size.max(1)];

    loop {
        tokio::select! {
            result = reader.read(&mut buf) => {
                match result {
                    Ok(0) => return SessionFault::PeerClosed,
                    Ok(n) => {
                        shared.retry().reset();
                        for decoded in decoder.feed(&buf[..n]) {
                            match decoded {
                                Ok(message) => apply(shared, message),
                                Err(e) => tracing::warn!("Dropping inbound line: {e}"),
                            }
                        }
                    }
                    Err(e) => return SessionFault::from_io(&e),
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return SessionFault::Stopped;
                }
            }
        }
    }
}

/// Apply one inbound message to the shared state.
pub(crate) fn apply(shared: &SessionShared, message: ServerMessage) {
    match message {
        ServerMessage::Connected { client_id } => {
            if client_id.is_empty() {
                tracing::warn!("CONNECTED without a client id");
            } else if shared.adopt_identity(&client_id) {
                tracing::info!("Session established, client id {client_id}");
            } else {
                tracing::warn!(
                    "Authority announced client id {client_id} but session {} is held, keeping it",
                    shared.identity()
                );
            }
        }
        ServerMessage::CarStatus(status) => {
            if status.client_id.is_empty() {
                tracing::debug!("Ignoring CAR_STATUS without a client id");
            } else {
                tracing::trace!(
                    "CAR_STATUS {} at {} ({:?})",
                    status.client_id,
                    status.position,
                    status.state
                );
                shared.store.upsert(status.into());
            }
        }
        // Start notices only mark the active entity; CAR_END is the sole
        // removal trigger.
        ServerMessage::CarStart { client_id } => {
            tracing::info!("{client_id} started crossing");
            if !client_id.is_empty() {
                shared.store.set_active(&client_id);
            }
        }
        ServerMessage::CarEnd { client_id } => {
            tracing::info!("{client_id} finished crossing");
            shared.store.remove(&client_id);
        }
        ServerMessage::ChangeCarPropertiesAck => {
            tracing::info!("Property change acknowledged");
        }
        ServerMessage::Unknown => {
            tracing::warn!("Ignoring unrecognized message kind");
        }
    }
}
