use super::signaling::InboundInvite;
use crate::config::VerificationConfig;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

pub const VERIFICATION_TIMEOUT: Duration = Duration::from_millis(1500);
const DEFAULT_DENY_REASON: &str = "denied by verification service";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationDecision {
    Allow { reason: Option<String> },
    /// The 403 has already been sent.
    Deny { reason: String },
}

impl VerificationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, VerificationDecision::Allow { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            VerificationDecision::Allow { reason } => reason.as_deref(),
            VerificationDecision::Deny { reason } => Some(reason),
        }
    }
}

/// Decides whether a call gets recorded, asking an optional HTTP service and
/// falling back to `record_by_default` whenever that service gives no usable
/// answer.
pub struct VerificationGate {
    endpoint: Option<Url>,
    record_by_default: bool,
    client: reqwest::Client,
}

impl VerificationGate {
    pub fn new(config: Option<&VerificationConfig>) -> Result<Self> {
        let endpoint = match config.and_then(|c| c.endpoint.as_deref()) {
            Some(endpoint) if !endpoint.is_empty() => Some(
                Url::parse(endpoint)
                    .map_err(|e| anyhow!("invalid verification endpoint {}: {}", endpoint, e))?,
            ),
            _ => None,
        };
        let client = reqwest::Client::builder()
            .timeout(VERIFICATION_TIMEOUT)
            .build()?;
        Ok(Self {
            endpoint,
            record_by_default: config.map(|c| c.record_by_default()).unwrap_or(true),
            client,
        })
    }

    pub fn record_by_default(&self) -> bool {
        self.record_by_default
    }

    pub async fn decide(
        &self,
        invite: &dyn InboundInvite,
        caller: &str,
        callee: &str,
    ) -> VerificationDecision {
        let Some(endpoint) = &self.endpoint else {
            if self.record_by_default {
                debug!("verification endpoint not configured; recording by default");
                return VerificationDecision::Allow { reason: None };
            }
            info!("verification endpoint not configured; rejecting due to record_by_default=false");
            return reject(invite, "default deny (no endpoint)").await;
        };

        let start = Instant::now();
        let response = match self.query(endpoint, caller, callee).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    caller,
                    callee,
                    elapsed_ms = start.elapsed().as_millis(),
                    "verification request failed; applying record_by_default: {}",
                    e
                );
                return self.fallback(invite, "verification failure: default deny").await;
            }
        };

        let reason = response
            .get("reason")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        match response.get("record").and_then(Value::as_bool) {
            Some(true) => {
                info!(caller, callee, ?reason, "verification allowed recording");
                VerificationDecision::Allow { reason }
            }
            Some(false) => {
                let reason = reason.unwrap_or_else(|| DEFAULT_DENY_REASON.to_string());
                info!(caller, callee, %reason, "verification denied recording");
                reject(invite, &reason).await
            }
            None => {
                warn!(
                    %response,
                    "verification returned invalid payload; applying record_by_default"
                );
                self.fallback(invite, "verification invalid payload: default deny")
                    .await
            }
        }
    }

    async fn query(&self, endpoint: &Url, caller: &str, callee: &str) -> Result<Value> {
        let mut url = endpoint.clone();
        let retained: Vec<(String, String)> = endpoint
            .query_pairs()
            .filter(|(k, _)| k != "caller" && k != "callee")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair("caller", caller)
            .append_pair("callee", callee);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("http status {}", status));
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn fallback(&self, invite: &dyn InboundInvite, reason: &str) -> VerificationDecision {
        if self.record_by_default {
            return VerificationDecision::Allow { reason: None };
        }
        reject(invite, reason).await
    }
}

async fn reject(invite: &dyn InboundInvite, reason: &str) -> VerificationDecision {
    if let Err(e) = invite.reply(rsip::StatusCode::Forbidden).await {
        debug!("failed to send 403: {}", e);
    }
    VerificationDecision::Deny {
        reason: reason.to_string(),
    }
}
