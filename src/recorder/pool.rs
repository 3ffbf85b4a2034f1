use crate::config::RtpEngineConfig;
use crate::rtpengine::{MediaRelay, NgClient};
use anyhow::{anyhow, Result};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const RELAY_TIMEOUT: Duration = Duration::from_millis(1500);

/// A media relay instance. Immutable once built and shared by every call
/// pinned to it.
pub struct Backend {
    pub remote: SocketAddr,
    pub relay: Arc<dyn MediaRelay>,
    forwarding: bool,
}

impl Backend {
    pub fn new(remote: SocketAddr, relay: Arc<dyn MediaRelay>, forwarding: bool) -> Self {
        Self {
            remote,
            relay,
            forwarding,
        }
    }

    pub async fn from_config(config: &RtpEngineConfig) -> Result<Self> {
        let remote = tokio::net::lookup_host(config.remote.as_str())
            .await
            .map_err(|e| anyhow!("rtpengine {}: {}", config.remote, e))?
            .next()
            .ok_or_else(|| anyhow!("rtpengine {}: no address", config.remote))?;
        let client = NgClient::bind(config.local_port.unwrap_or(0), RELAY_TIMEOUT).await?;
        Ok(Self::new(
            remote,
            Arc::new(client),
            config.forwarding.unwrap_or(true),
        ))
    }

    /// Resolved once at construction; never probed per call.
    pub fn supports_forwarding(&self) -> bool {
        self.forwarding
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("remote", &self.remote)
            .field("forwarding", &self.forwarding)
            .finish()
    }
}

/// Round-robin selection over a fixed, non-empty set of backends.
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    cursor: AtomicUsize,
}

impl BackendPool {
    pub fn new(backends: Vec<Arc<Backend>>) -> Result<Self> {
        if backends.is_empty() {
            return Err(anyhow!("no rtpengine configured"));
        }
        Ok(Self {
            backends,
            cursor: AtomicUsize::new(0),
        })
    }

    pub async fn from_config(configs: &[RtpEngineConfig]) -> Result<Self> {
        let mut backends = Vec::with_capacity(configs.len());
        for config in configs {
            let backend = Backend::from_config(config).await?;
            info!(remote = %backend.remote, forwarding = backend.forwarding, "rtpengine added");
            backends.push(Arc::new(backend));
        }
        Self::new(backends)
    }

    /// Concurrent callers may occasionally observe a skip or repeat once the
    /// counter wraps; selection only spreads load.
    pub fn next(&self) -> Arc<Backend> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.backends.len();
        self.backends[idx].clone()
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
