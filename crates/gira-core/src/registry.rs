//! Multi-cover management.
//!
//! This module provides a registry owning every cover in a process. Each
//! cover's broadcast listener runs under a child of the registry's
//! cancellation token, so [`CoverRegistry::shutdown`] stops all of them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gira_types::DeviceIdentity;

use crate::client::ClientConfig;
use crate::cover::Cover;
use crate::error::Result;
use crate::passive::PassiveListenerOptions;
use crate::transport::{AdvertisementSource, Transport};

struct RegisteredCover<T: Transport> {
    cover: Arc<Cover<T>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry of covers keyed by lower-case address.
pub struct CoverRegistry<T>
where
    T: Transport + AdvertisementSource + 'static,
{
    transport: Arc<T>,
    client_config: ClientConfig,
    listener_options: PassiveListenerOptions,
    covers: RwLock<HashMap<String, RegisteredCover<T>>>,
    cancel: CancellationToken,
}

impl<T> CoverRegistry<T>
where
    T: Transport + AdvertisementSource + 'static,
{
    /// Create an empty registry sharing one transport.
    pub fn new(
        transport: Arc<T>,
        client_config: ClientConfig,
        listener_options: PassiveListenerOptions,
    ) -> Self {
        Self {
            transport,
            client_config,
            listener_options,
            covers: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a cover and start its broadcast listener.
    ///
    /// Adding an address that is already registered returns the existing
    /// cover.
    pub async fn add(&self, identity: DeviceIdentity) -> Result<Arc<Cover<T>>> {
        let key = identity.normalized_address();
        if let Some(existing) = self.covers.read().await.get(&key) {
            debug!("{} already registered", identity);
            return Ok(Arc::clone(&existing.cover));
        }

        let cover = Arc::new(Cover::new(
            identity,
            Arc::clone(&self.transport),
            self.client_config.clone(),
            self.listener_options.clone(),
        ));
        let cancel = self.cancel.child_token();
        let task = cover
            .listener()
            .start(Arc::clone(&self.transport), cancel.clone())
            .await?;

        let mut covers = self.covers.write().await;
        if let Some(existing) = covers.get(&key) {
            // lost a race with a concurrent add
            cancel.cancel();
            return Ok(Arc::clone(&existing.cover));
        }
        info!("Registered {}", cover.identity());
        covers.insert(
            key,
            RegisteredCover {
                cover: Arc::clone(&cover),
                cancel,
                task,
            },
        );
        Ok(cover)
    }

    /// Look up a cover by address (case-insensitive).
    pub async fn get(&self, address: &str) -> Option<Arc<Cover<T>>> {
        self.covers
            .read()
            .await
            .get(&address.to_lowercase())
            .map(|entry| Arc::clone(&entry.cover))
    }

    /// Addresses of all registered covers, lower-case.
    pub async fn addresses(&self) -> Vec<String> {
        self.covers.read().await.keys().cloned().collect()
    }

    /// Number of registered covers.
    pub async fn len(&self) -> usize {
        self.covers.read().await.len()
    }

    /// Whether no covers are registered.
    pub async fn is_empty(&self) -> bool {
        self.covers.read().await.is_empty()
    }

    /// Unregister a cover, stop its listener and drop any retained connection.
    pub async fn remove(&self, address: &str) -> Option<Arc<Cover<T>>> {
        let entry = self.covers.write().await.remove(&address.to_lowercase())?;
        Some(Self::release(entry).await)
    }

    /// Unregister every cover.
    pub async fn shutdown(&self) {
        let entries: Vec<_> = self.covers.write().await.drain().map(|(_, e)| e).collect();
        self.cancel.cancel();
        for entry in entries {
            Self::release(entry).await;
        }
        info!("Registry shut down");
    }

    async fn release(entry: RegisteredCover<T>) -> Arc<Cover<T>> {
        entry.cancel.cancel();
        if let Err(e) = entry.task.await {
            warn!("Listener task for {} failed: {}", entry.cover.identity(), e);
        }
        entry.cover.disconnect().await;
        info!("Unregistered {}", entry.cover.identity());
        entry.cover
    }
}
