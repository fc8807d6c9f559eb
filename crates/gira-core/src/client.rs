//! Active command delivery.
//!
//! [`CoverClient`] owns the connection to one cover and turns each
//! [`Command`] into a single GATT write. Sends are serialized per device: a
//! second caller waits until the first has connected, written and released
//! the link.
//!
//! Each send takes one of two paths:
//!
//! 1. **Reuse**: a retained connection that still reports connected is
//!    written without acknowledgment. If that write fails the connection is
//!    closed and the send falls through to the fresh path.
//! 2. **Fresh**: the device is resolved through the transport, connected
//!    with bounded retry, written with acknowledgment, and disconnected.
//!
//! Connections are only retained when [`ClientConfig::keep_alive`] is set.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use gira_types::uuids::COMMAND_CHARACTERISTIC;
use gira_types::{Command, DeviceIdentity, codec};

use crate::error::{Error, Result};
use crate::events::{CoverEvent, DeviceId, EventDispatcher};
use crate::guard::ConnectionGuard;
use crate::retry::{RetryConfig, gave_up, with_retry_notify};
use crate::transport::{Connection, Transport};

/// Configuration for a [`CoverClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound for a single connection attempt.
    pub connect_timeout: Duration,
    /// Upper bound for a single command write.
    pub write_timeout: Duration,
    /// Retry policy for connection attempts.
    pub retry: RetryConfig,
    /// Keep the connection open after a successful send.
    pub keep_alive: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            retry: RetryConfig::for_connect(),
            keep_alive: false,
        }
    }
}

impl ClientConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-attempt connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the retry policy for connecting.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the total number of connection attempts.
    #[must_use]
    pub fn connect_attempts(mut self, attempts: u32) -> Self {
        self.retry = self.retry.max_attempts(attempts);
        self
    }

    /// Retain connections between sends.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }
}

/// Serialized command sender for a single cover.
pub struct CoverClient<T: Transport> {
    identity: DeviceIdentity,
    transport: Arc<T>,
    config: ClientConfig,
    connection: Mutex<Option<Arc<T::Connection>>>,
    events: Option<EventDispatcher>,
}

impl<T: Transport> std::fmt::Debug for CoverClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverClient")
            .field("identity", &self.identity)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> CoverClient<T> {
    /// Create a client. No connection is made until the first send.
    pub fn new(identity: DeviceIdentity, transport: Arc<T>, config: ClientConfig) -> Self {
        Self {
            identity,
            transport,
            config,
            connection: Mutex::new(None),
            events: None,
        }
    }

    /// Publish send outcomes to `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = Some(events);
        self
    }

    /// The cover this client talks to.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Move the cover up.
    pub async fn move_up(&self) -> Result<()> {
        self.send(Command::MoveUp).await
    }

    /// Move the cover down.
    pub async fn move_down(&self) -> Result<()> {
        self.send(Command::MoveDown).await
    }

    /// Stop any movement.
    pub async fn stop(&self) -> Result<()> {
        self.send(Command::Stop).await
    }

    /// Move up by one step.
    pub async fn step_up(&self) -> Result<()> {
        self.send(Command::StepUp).await
    }

    /// Move down by one step.
    pub async fn step_down(&self) -> Result<()> {
        self.send(Command::StepDown).await
    }

    /// Move to an absolute position (0 = closed, 100 = open).
    ///
    /// Out-of-range values fail with [`Error::InvalidArgument`] before any
    /// I/O or locking.
    pub async fn set_position(&self, percent: i32) -> Result<()> {
        self.send(Command::SetPosition(percent)).await
    }

    /// Deliver one command.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the command cannot be encoded.
    /// - [`Error::DeviceNotFound`] if the transport has no path to the
    ///   device. No connection is attempted.
    /// - [`Error::CommandFailed`] for every other failure, wrapping
    ///   `ConnectionFailed`, `WriteFailed` or a raw transport error.
    #[tracing::instrument(level = "debug", skip(self), fields(device = %self.identity))]
    pub async fn send(&self, command: Command) -> Result<()> {
        let payload = codec::encode(&command)?;

        let mut slot = self.connection.lock().await;
        let outcome = self.send_locked(&mut slot, &payload).await;
        drop(slot);

        match outcome {
            Ok(reused) => {
                info!("Sent {} to {}", command, self.identity);
                self.publish(CoverEvent::CommandSent {
                    device: DeviceId::from(&self.identity),
                    command,
                    reused_connection: reused,
                });
                Ok(())
            }
            Err(e) => {
                error!("Failed to send {} to {}: {}", command, self.identity, e);
                self.publish(CoverEvent::CommandFailed {
                    device: DeviceId::from(&self.identity),
                    command,
                    error: e.to_string(),
                });
                if matches!(e, Error::DeviceNotFound(_)) {
                    Err(e)
                } else {
                    Err(Error::command_failed(self.identity.to_string(), e))
                }
            }
        }
    }

    /// Body of [`send`](Self::send), run with the connection lock held.
    ///
    /// Returns whether the retained connection was used.
    async fn send_locked(
        &self,
        slot: &mut Option<Arc<T::Connection>>,
        payload: &[u8],
    ) -> Result<bool> {
        if let Some(existing) = slot.take() {
            let guard = ConnectionGuard::new(Arc::clone(&existing));
            if existing.is_connected().await {
                match self.write(&existing, payload, false).await {
                    Ok(()) => {
                        debug!("Reused connection to {}", self.identity);
                        if self.config.keep_alive {
                            *slot = guard.into_inner();
                        } else {
                            guard.close().await;
                        }
                        return Ok(true);
                    }
                    Err(e) => {
                        warn!(
                            "Write on retained connection to {} failed: {}; reconnecting",
                            self.identity, e
                        );
                    }
                }
            } else {
                debug!("Retained connection to {} was lost", self.identity);
            }
            guard.close().await;
        }

        let descriptor = self
            .transport
            .resolve_device(&self.identity.address)
            .await?
            .ok_or_else(|| Error::device_not_found(&self.identity.address))?;

        let connection = Arc::new(self.connect(&descriptor).await?);
        let guard = ConnectionGuard::new(Arc::clone(&connection));
        info!("Connected to {}", self.identity);

        let written = self.write(&connection, payload, true).await;
        match written {
            Ok(()) if self.config.keep_alive => *slot = guard.into_inner(),
            _ => {
                guard.close().await;
                debug!("Disconnected from {}", self.identity);
            }
        }
        written.map(|()| false)
    }

    async fn connect(&self, descriptor: &T::Descriptor) -> Result<T::Connection> {
        let transport = &self.transport;
        let connect_timeout = self.config.connect_timeout;
        let retry = &self.config.retry;

        let result = with_retry_notify(
            retry,
            "connect",
            move || async move {
                match timeout(connect_timeout, transport.connect(descriptor)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::timeout("connect", connect_timeout)),
                }
            },
            |attempt, _| {
                self.publish(CoverEvent::ConnectRetry {
                    device: DeviceId::from(&self.identity),
                    attempt,
                })
            },
        )
        .await;

        result.map_err(|e| {
            if e.is_retryable() {
                gave_up(Some(self.identity.address.clone()), retry.attempts(), &e)
            } else {
                e
            }
        })
    }

    async fn write(
        &self,
        connection: &T::Connection,
        payload: &[u8],
        require_ack: bool,
    ) -> Result<()> {
        let write_timeout = self.config.write_timeout;
        let write = connection.write_characteristic(COMMAND_CHARACTERISTIC, payload, require_ack);
        match timeout(write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ Error::WriteFailed { .. })) => Err(e),
            Ok(Err(e)) => Err(Error::write_failed(COMMAND_CHARACTERISTIC, e.to_string())),
            Err(_) => Err(Error::write_failed(
                COMMAND_CHARACTERISTIC,
                format!("timed out after {:?}", write_timeout),
            )),
        }
    }

    /// Close a retained connection, if any.
    pub async fn disconnect(&self) {
        let retained = self.connection.lock().await.take();
        if let Some(connection) = retained {
            ConnectionGuard::new(connection).close().await;
            info!("Disconnected from {}", self.identity);
        }
    }

    /// Whether a connection is currently retained.
    pub async fn has_connection(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    fn publish(&self, event: CoverEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }
}

impl<T: Transport> Drop for CoverClient<T> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            drop(ConnectionGuard::new(connection));
        }
    }
}
