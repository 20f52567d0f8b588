//! Session controller: the connect / reconnect state machine and the command
//! entry points consumers call.
//!
//! ```text
//! Disconnected --connect--> Connecting --handshake sent--> Connected
//!      ^                        |                              |
//!      +------- failure --------+                              |
//!      +---- peer closed / reset / I/O error / drop / end -----+
//! ```
//!
//! While `Disconnected` with a held session identity, [`SessionClient::tick`]
//! retries the handshake with that identity every
//! [`ReconnectConfig::delay`](crate::ReconnectConfig) until the attempt
//! budget runs out, at which point identity and entity store are cleared.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::codec::{self, ClientMessage, Direction};
use crate::config::SessionConfig;
use crate::dispatch::{ConnectParams, Properties};
use crate::error::{ConnectError, SessionError};
use crate::state::{ConnectionState, SessionShared};
use crate::store::{EntityStatus, TrackedEntity};
use crate::worker::{SessionWorker, WorkerConfig};

/// What a call to [`SessionClient::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Connecting or connected; nothing to do.
    Busy,
    /// Disconnected with no session to resume, or retries already exhausted.
    Idle,
    /// An attempt is pending; `remaining` until it is due.
    Waiting {
        /// Time left on the delay.
        remaining: Duration,
    },
    /// Attempt number `attempt` resumed the session.
    Reconnected {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Attempt number `attempt` failed; more remain.
    AttemptFailed {
        /// 1-based attempt number.
        attempt: u32,
    },
}

/// The live connection: writer half plus the worker reading the other half.
struct Link {
    writer: OwnedWriteHalf,
    worker: SessionWorker,
}

impl Link {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), SessionError> {
        let bytes = codec::encode(message)?;
        self.writer
            .write_all(&bytes)
            .await
            .map_err(SessionError::Send)?;
        tracing::debug!("Sent {}", message.kind());
        Ok(())
    }

    /// Stop the worker (bounded) and close the socket.
    async fn close(self, grace: Duration) {
        let Link { mut writer, worker } = self;
        if let Some(fault) = worker.stop(grace).await {
            tracing::debug!("Session worker ended: {fault}");
        }
        let _ = writer.shutdown().await;
    }
}

struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    config: SessionConfig,
    shared: Arc<SessionShared>,
    link: tokio::sync::Mutex<Option<Link>>,
    /// Held for the whole of a user connect or an automatic retry.
    attempt_lock: tokio::sync::Mutex<()>,
    params: Mutex<Option<ConnectParams>>,
    supervisor: Mutex<Option<Supervisor>>,
}

/// Handle to one logical session with the remote authority.
///
/// Cheap to clone; all clones drive the same session. Accessors never block
/// on the network. Commands are async and perform at most one socket write.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl SessionClient {
    /// Create a disconnected client.
    pub fn new(config: SessionConfig) -> Self {
        let shared = Arc::new(SessionShared::new(config.reconnect.clone()));
        Self {
            inner: Arc::new(Inner {
                config,
                shared,
                link: tokio::sync::Mutex::new(None),
                attempt_lock: tokio::sync::Mutex::new(()),
                params: Mutex::new(None),
                supervisor: Mutex::new(None),
            }),
        }
    }

    // --- Accessors -------------------------------------------------------

    /// Settings this client was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Current connection status.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.shared.state.current()
    }

    /// Subscribe to connection status transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    /// Session identity assigned by the authority; empty before the first
    /// `CONNECTED` and after the session is dropped.
    pub fn session_id(&self) -> String {
        self.inner.shared.identity()
    }

    /// Point-in-time copy of every mirrored entity, ordered by id.
    pub fn snapshot(&self) -> Vec<TrackedEntity> {
        self.inner.shared.store.snapshot()
    }

    /// Last-known status of one entity.
    pub fn entity(&self, id: &str) -> Option<EntityStatus> {
        self.inner.shared.store.get(id)
    }

    /// Entity currently holding the path, if announced.
    pub fn active_entity(&self) -> Option<String> {
        self.inner.shared.store.active_entity()
    }

    /// Human-readable status line for display.
    pub fn status_message(&self) -> String {
        self.inner.shared.status_message()
    }

    /// Failed automatic attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.retry().attempts()
    }

    /// Parameters the next handshake will carry.
    pub fn connect_params(&self) -> Option<ConnectParams> {
        *self.params()
    }

    fn params(&self) -> MutexGuard<'_, Option<ConnectParams>> {
        self.inner.params.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Commands --------------------------------------------------------

    /// Open a fresh session.
    ///
    /// Clears any held identity and mirrored entities, then connects and
    /// sends the handshake. A no-op while connected. An automatic retry in
    /// flight is waited for and its session ended before the fresh connect.
    pub async fn request_connect(
        &self,
        direction: Direction,
        velocity: i64,
        wait_time: i64,
    ) -> Result<(), SessionError> {
        let shared = &self.inner.shared;
        let params = ConnectParams::new(direction, velocity, wait_time).inspect_err(|e| {
            tracing::warn!("Rejected connect request: {e}");
            shared.set_status_message(e.to_string());
        })?;

        if shared.state.current() == ConnectionState::Connected {
            tracing::info!("Already connected");
            return Ok(());
        }

        let _attempt = self.inner.attempt_lock.lock().await;
        let previous = self.inner.link.lock().await.take();
        if let Some(mut link) = previous {
            if shared.state.current() == ConnectionState::Connected {
                tracing::info!("Ending resumed session {} for a fresh connect", shared.identity());
                if let Err(e) = link.send(&ClientMessage::EndConnection).await {
                    tracing::warn!("Could not send END_CONNECTION ({e}), forcing close");
                }
            }
            link.close(self.inner.config.worker_join_grace).await;
            shared.state.set(ConnectionState::Disconnected);
        }

        shared.clear_session();
        shared.retry().reset();
        *self.params() = Some(params);
        shared.set_status_message("Connecting...");

        match self.attempt(params, false).await {
            Ok(()) => {
                shared.set_status_message("Connected.");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Connection failed: {e}");
                shared.set_status_message(format!("Connection failed: {e}"));
                Err(e.into())
            }
        }
    }

    /// Ask the authority to change velocity and wait time.
    pub async fn request_property_change(
        &self,
        velocity: i64,
        wait_time: i64,
    ) -> Result<(), SessionError> {
        let properties = Properties::new(velocity, wait_time)?;
        if self.connection_state() != ConnectionState::Connected {
            tracing::info!("Property change ignored: not connected");
            return Err(SessionError::NotConnected);
        }

        let mut link = self.inner.link.lock().await;
        let link = link.as_mut().ok_or(SessionError::NotConnected)?;
        link.send(&properties.to_message()).await?;

        if let Some(params) = self.params().as_mut() {
            params.properties = properties;
        }
        tracing::info!(
            "Requested velocity {} and wait time {}",
            properties.velocity,
            properties.wait_time
        );
        Ok(())
    }

    /// End the session: notify the authority, close the socket, and forget
    /// the session identity and mirrored entities.
    pub async fn request_end_session(&self) -> Result<(), SessionError> {
        if self.connection_state() != ConnectionState::Connected {
            tracing::info!("End session ignored: not connected");
            return Err(SessionError::NotConnected);
        }

        let shared = &self.inner.shared;
        let mut guard = self.inner.link.lock().await;
        if let Some(mut link) = guard.take() {
            if let Err(e) = link.send(&ClientMessage::EndConnection).await {
                tracing::warn!("Could not send END_CONNECTION ({e}), forcing close");
            }
            link.close(self.inner.config.worker_join_grace).await;
        }
        shared.state.set(ConnectionState::Disconnected);
        shared.clear_session();
        shared.retry().reset();
        shared.set_status_message("Disconnected.");
        tracing::info!("Session ended");
        Ok(())
    }

    /// Fault injection: close the socket abruptly without an end-of-session
    /// notice. The identity is kept, so the reconnection policy takes over.
    pub async fn request_simulated_drop(&self) -> Result<(), SessionError> {
        if self.connection_state() != ConnectionState::Connected {
            tracing::info!("Simulated drop ignored: not connected");
            return Err(SessionError::NotConnected);
        }

        let shared = &self.inner.shared;
        let mut guard = self.inner.link.lock().await;
        if let Some(link) = guard.take() {
            link.close(self.inner.config.worker_join_grace).await;
        }
        shared.state.set(ConnectionState::Disconnected);
        shared.retry().restart_timer();
        shared.set_status_message("Disconnected.");
        tracing::warn!("Simulated connection drop");
        Ok(())
    }

    // --- Reconnection ----------------------------------------------------

    /// Advance the reconnection policy by `elapsed` and attempt a resume if
    /// one is due.
    ///
    /// Returns [`SessionError::RetryExhausted`] exactly once, on the failure
    /// that uses up the budget (or on the first tick with a zero budget).
    pub async fn tick(&self, elapsed: Duration) -> Result<TickOutcome, SessionError> {
        let shared = &self.inner.shared;
        let _attempt = self.inner.attempt_lock.lock().await;
        if shared.state.current() != ConnectionState::Disconnected {
            return Ok(TickOutcome::Busy);
        }
        let identity = shared.identity();
        if identity.is_empty() {
            return Ok(TickOutcome::Idle);
        }

        let attempt = {
            let mut retry = shared.retry();
            if retry.is_exhausted() {
                drop(retry);
                // Only reachable with a zero attempt budget.
                return Err(self.give_up(&identity));
            }
            match retry.poll(elapsed) {
                Some(attempt) => attempt,
                None => {
                    return Ok(TickOutcome::Waiting {
                        remaining: retry.remaining(),
                    });
                }
            }
        };
        let Some(params) = *self.params() else {
            return Ok(TickOutcome::Idle);
        };

        let max = self.inner.config.reconnect.max_attempts;
        tracing::info!("Reconnection attempt {attempt}/{max} for {identity}");
        shared.set_status_message(format!("Reconnecting ({attempt}/{max})..."));

        match self.attempt(params, true).await {
            Ok(()) => {
                tracing::info!("Reconnected after {attempt} attempt(s)");
                shared.set_status_message("Connected.");
                Ok(TickOutcome::Reconnected { attempt })
            }
            Err(e) => {
                tracing::warn!("Reconnection attempt {attempt}/{max} failed: {e}");
                if shared.retry().record_failure() {
                    return Err(self.give_up(&identity));
                }
                Ok(TickOutcome::AttemptFailed { attempt })
            }
        }
    }

    /// Run [`tick`](Self::tick) on a fixed interval in a background task
    /// until [`shutdown`](Self::shutdown) or the last handle is dropped.
    pub fn spawn_supervisor(&self) {
        let mut slot = self
            .inner
            .supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.reconnect.tick;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let client = SessionClient { inner };
                        let elapsed = last.elapsed();
                        if let Err(e) = client.tick(elapsed).await {
                            tracing::warn!("{e}");
                        }
                        last = Instant::now();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Reconnection supervisor stopped");
        });

        *slot = Some(Supervisor {
            shutdown_tx,
            handle,
        });
    }

    /// Tear down: stop the supervisor, send a best-effort END_CONNECTION if
    /// connected, close the socket and wait briefly for the worker.
    pub async fn shutdown(&self) {
        let grace = self.inner.config.worker_join_grace;
        let supervisor = self
            .inner
            .supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(Supervisor {
            shutdown_tx,
            mut handle,
        }) = supervisor
        {
            let _ = shutdown_tx.send(true);
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                tracing::warn!("Reconnection supervisor did not stop within {grace:?}");
                handle.abort();
            }
        }

        let connected = self.connection_state() == ConnectionState::Connected;
        let mut guard = self.inner.link.lock().await;
        if let Some(mut link) = guard.take() {
            if connected && let Err(e) = link.send(&ClientMessage::EndConnection).await {
                tracing::warn!("Could not send END_CONNECTION on shutdown: {e}");
            }
            link.close(grace).await;
        }
        self.inner.shared.state.set(ConnectionState::Disconnected);
        tracing::info!("Session client shut down");
    }

    // --- Internals -------------------------------------------------------

    /// Drop the session after the retry budget is spent.
    fn give_up(&self, identity: &str) -> SessionError {
        let shared = &self.inner.shared;
        let max = self.inner.config.reconnect.max_attempts;
        shared.clear_session();
        shared.set_status_message("Disconnected. Reconnection failed.");
        tracing::warn!("Giving up on session {identity} after {max} attempts");
        SessionError::RetryExhausted { attempts: max }
    }

    /// One connect + handshake. Replaces any previous link, stopping its
    /// worker first.
    async fn attempt(&self, params: ConnectParams, automatic: bool) -> Result<(), ConnectError> {
        let inner = &self.inner;
        let shared = &inner.shared;

        let mut link = inner.link.lock().await;
        if let Some(previous) = link.take() {
            previous.close(inner.config.worker_join_grace).await;
        }

        shared.state.set(ConnectionState::Connecting);
        let (reader, writer) = match self.open(params, automatic).await {
            Ok(halves) => halves,
            Err(e) => {
                shared.state.set(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let epoch = shared.next_epoch();
        shared.state.set(ConnectionState::Connected);
        shared.retry().reset();
        let worker = SessionWorker::spawn(
            reader,
            Arc::clone(shared),
            epoch,
            WorkerConfig {
                read_buffer_size: inner.config.read_buffer_size,
                max_line_length: inner.config.max_line_length,
            },
        );
        *link = Some(Link { writer, worker });
        Ok(())
    }

    async fn open(
        &self,
        params: ConnectParams,
        automatic: bool,
    ) -> Result<(OwnedReadHalf, OwnedWriteHalf), ConnectError> {
        let config = &self.inner.config;
        let addr = config.server_addr();

        let stream = match tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(addr.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ConnectError::Connect { addr, source }),
            Err(_) => {
                return Err(ConnectError::Timeout {
                    addr,
                    timeout: config.connect_timeout,
                });
            }
        };
        stream
            .set_nodelay(true)
            .map_err(|source| ConnectError::Connect {
                addr: addr.clone(),
                source,
            })?;
        tracing::info!("Connected to {addr}");

        let (reader, mut writer) = stream.into_split();
        let client_id = self.inner.shared.identity();
        send_handshake(&mut writer, &params, client_id.clone()).await?;

        if automatic {
            tracing::info!(
                "Resume handshake sent for {client_id}: {} velocity {} wait {}",
                params.direction,
                params.properties.velocity,
                params.properties.wait_time
            );
        } else {
            tracing::info!(
                "Handshake sent: {} velocity {} wait {}",
                params.direction,
                params.properties.velocity,
                params.properties.wait_time
            );
        }
        Ok((reader, writer))
    }
}

async fn send_handshake<W>(
    writer: &mut W,
    params: &ConnectParams,
    client_id: String,
) -> Result<(), ConnectError>
where
    W: AsyncWrite + Unpin,
{
    let handshake = codec::encode(&params.handshake(client_id))?;
    writer
        .write_all(&handshake)
        .await
        .map_err(ConnectError::Handshake)
}
