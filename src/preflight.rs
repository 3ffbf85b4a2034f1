use crate::recorder::BackendPool;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct PreflightIssue {
    pub field: String,
    pub message: String,
}

#[derive(Debug)]
pub struct PreflightError {
    pub issues: Vec<PreflightIssue>,
}

impl PreflightError {
    pub fn new(issues: Vec<PreflightIssue>) -> Self {
        Self { issues }
    }
}

impl fmt::Display for PreflightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self
            .issues
            .iter()
            .map(|i| format!("{}: {}", i.field, i.message))
            .collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for PreflightError {}

/// Pings every rtpengine in the pool; each one must answer `pong`.
pub async fn check_backends(pool: &BackendPool) -> Result<(), PreflightError> {
    let mut issues = Vec::new();
    for (idx, backend) in pool.backends().iter().enumerate() {
        let field = format!("rtpengine[{}]", idx);
        let start = Instant::now();
        match backend.relay.ping(backend.remote).await {
            Ok(response) if response.result == "pong" => {
                info!(
                    remote = %backend.remote,
                    elapsed_ms = start.elapsed().as_millis(),
                    "rtpengine reachable"
                );
            }
            Ok(response) => {
                warn!(remote = %backend.remote, %response, "rtpengine unexpected ping reply");
                issues.push(PreflightIssue {
                    field,
                    message: format!("{} answered ping with {}", backend.remote, response),
                });
            }
            Err(e) => {
                warn!(remote = %backend.remote, "rtpengine unreachable: {}", e);
                issues.push(PreflightIssue {
                    field,
                    message: e.to_string(),
                });
            }
        }
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(PreflightError::new(issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::tests::{backend, NullRelay, RecordingRelay, RelayCall};
    use crate::rtpengine::NgClient;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_backends_pinged() {
        let relay = Arc::new(RecordingRelay::new());
        let pool = BackendPool::new(vec![
            backend(30001, relay.clone(), true),
            backend(30002, relay.clone(), true),
        ])
        .unwrap();
        check_backends(&pool).await.unwrap();
        assert_eq!(
            relay.calls(),
            vec![
                RelayCall::Ping("127.0.0.1:30001".parse().unwrap()),
                RelayCall::Ping("127.0.0.1:30002".parse().unwrap()),
            ]
        );
    }

    #[tokio::test]
    async fn test_silent_backend_reported() {
        // bound but never answers
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let silent_addr = silent.local_addr().unwrap();
        let client = NgClient::with_socket(
            tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            Duration::from_millis(100),
        );
        let pool = BackendPool::new(vec![
            backend(30001, Arc::new(NullRelay), true),
            Arc::new(crate::recorder::Backend::new(
                silent_addr,
                Arc::new(client),
                true,
            )),
        ])
        .unwrap();

        let err = check_backends(&pool).await.unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].field, "rtpengine[1]");
        assert!(err.to_string().starts_with("rtpengine[1]: "));
        drop(silent);
    }
}
