use crate::config::Config;
use crate::preflight;
use crate::recorder::{BackendPool, PayloadCodec, SessionPipeline, VerificationGate};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

pub struct AppBuilder {
    pub config: Option<Config>,
    pub codec: Option<Arc<dyn PayloadCodec>>,
    pub cancel_token: Option<CancellationToken>,
}

pub struct App {
    pub config: Arc<Config>,
    pub token: CancellationToken,
    gate: Arc<VerificationGate>,
    codec: Option<Arc<dyn PayloadCodec>>,
    pool: OnceCell<Arc<BackendPool>>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            codec: None,
            cancel_token: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// SIPREC body codec supplied by the hosting SIP stack.
    pub fn codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn build(self) -> Result<App> {
        let config = self.config.unwrap_or_default();
        let gate = VerificationGate::new(config.verification.as_ref())?;
        Ok(App {
            config: Arc::new(config),
            token: self.cancel_token.unwrap_or_default(),
            gate: Arc::new(gate),
            codec: self.codec,
            pool: OnceCell::new(),
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Built on first use, then shared by every call.
    pub async fn pool(&self) -> Result<Arc<BackendPool>> {
        self.pool
            .get_or_try_init(|| async {
                BackendPool::from_config(&self.config.rtpengines())
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    pub async fn pipeline(&self) -> Result<SessionPipeline> {
        let codec = self
            .codec
            .clone()
            .ok_or_else(|| anyhow!("no SIPREC payload codec installed"))?;
        Ok(SessionPipeline::new(
            self.pool().await?,
            self.gate.clone(),
            codec,
        ))
    }

    pub async fn check(&self) -> Result<()> {
        let pool = self.pool().await?;
        preflight::check_backends(&pool).await?;
        Ok(())
    }

    /// Keeps checking rtpengine reachability until cancelled.
    pub async fn run(&self) -> Result<()> {
        let pool = self.pool().await?;
        info!(
            rtpengines = pool.len(),
            record_by_default = self.gate.record_by_default(),
            "recorder ready"
        );
        let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        loop {
            select! {
                biased;
                _ = self.token.cancelled() => {
                    info!("app cancelled");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(e) = preflight::check_backends(&pool).await {
                        warn!("rtpengine health check failed: {}", e);
                    }
                }
            }
        }
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}
