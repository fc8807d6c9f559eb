//! Connection guard for automatic disconnect on drop.
//!
//! A command send can be cancelled at any await point by dropping its
//! future. The guard makes sure a connection opened for that send is still
//! closed.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::warn;

use crate::transport::Connection;

/// A guard that disconnects the wrapped connection when dropped.
///
/// Call [`ConnectionGuard::into_inner`] to keep the connection open.
pub struct ConnectionGuard<C: Connection + 'static> {
    connection: Option<Arc<C>>,
}

impl<C: Connection + 'static> ConnectionGuard<C> {
    /// Create a new connection guard.
    pub fn new(connection: Arc<C>) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    /// Take ownership of the connection, preventing automatic disconnect.
    pub fn into_inner(mut self) -> Option<Arc<C>> {
        self.connection.take()
    }

    /// Disconnect now and wait for it to finish.
    pub async fn close(mut self) {
        if let Some(connection) = self.connection.take()
            && let Err(e) = connection.disconnect().await
        {
            warn!("Failed to disconnect: {}", e);
        }
    }
}

impl<C: Connection + 'static> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Ok(handle) = Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = connection.disconnect().await {
                        warn!("Failed to disconnect in guard drop: {}", e);
                    }
                });
            } else {
                warn!("No tokio runtime available for disconnect in guard drop");
            }
        }
    }
}
