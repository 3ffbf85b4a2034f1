use super::metadata::build_metadata;
use super::session::{CallSession, Leg};
use crate::rtpengine::{CallRef, NegotiateOptions, NegotiateParams};
use anyhow::{anyhow, Result};
use std::time::Instant;
use tracing::debug;

/// rtpengine stops recording a stream whose direction is inactive, leaving a
/// gap instead of silence in the recording; sendonly keeps it flowing.
pub fn rewrite_inactive(sdp: &str) -> String {
    sdp.replace("a=inactive\r\n", "a=sendonly\r\n")
}

/// Negotiates one leg of a call against the backend the call is pinned to.
#[derive(Debug, Clone)]
pub struct EndpointAllocator {
    options: NegotiateOptions,
}

impl Default for EndpointAllocator {
    fn default() -> Self {
        Self {
            options: NegotiateOptions::recording(),
        }
    }
}

impl EndpointAllocator {
    pub fn new(options: NegotiateOptions) -> Self {
        Self { options }
    }

    pub fn negotiate_params(&self, leg: Leg, session: &CallSession) -> NegotiateParams {
        let to_tag = match leg {
            Leg::Caller => None,
            Leg::Callee => Some(session.to_tag.clone()),
        };
        NegotiateParams {
            call: CallRef {
                call_id: session.call_id.clone(),
                from_tag: session.from_tag.clone(),
                to_tag,
            },
            sdp: rewrite_inactive(session.offer(leg)),
            metadata: build_metadata(session, leg),
            options: self.options.clone(),
        }
    }

    /// Sends `offer` for the caller leg or `answer` for the callee leg and
    /// stores the relay's description on the session.
    pub async fn allocate(&self, leg: Leg, session: &mut CallSession) -> Result<()> {
        let params = self.negotiate_params(leg, session);
        let backend = session.backend.clone();
        debug!(
            call_id = %session.call_id,
            %leg,
            remote = %backend.remote,
            metadata = %params.metadata,
            "sending {} to rtpengine",
            if leg == Leg::Caller { "offer" } else { "answer" }
        );

        let start = Instant::now();
        let response = match leg {
            Leg::Caller => backend.relay.offer(backend.remote, &params).await,
            Leg::Callee => backend.relay.answer(backend.remote, &params).await,
        }
        .map_err(|e| anyhow!("rtpengine {} {} leg failed: {}", backend.remote, leg, e))?;

        if !response.is_ok() {
            return Err(anyhow!(
                "error connecting to rtpengine {} for {} leg: {}",
                backend.remote,
                leg,
                response
            ));
        }
        debug!(
            call_id = %session.call_id,
            %leg,
            elapsed_ms = start.elapsed().as_millis(),
            "rtpengine allocated endpoint"
        );
        session.set_answer(leg, response.sdp);
        Ok(())
    }
}
