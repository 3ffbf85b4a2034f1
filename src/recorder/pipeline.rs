use super::allocator::EndpointAllocator;
use super::error::SetupError;
use super::pool::{Backend, BackendPool};
use super::session::{CallSession, Leg, SessionStage};
use super::signaling::{dialog_identifiers, InboundInvite, ModifyRequest, PayloadCodec};
use super::verification::{VerificationDecision, VerificationGate};
use anyhow::Result;
use rsip::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

pub type CallSessionRef = Arc<Mutex<CallSession>>;

/// Per-INVITE call setup: decode, verify, allocate both legs on one backend,
/// answer, then hand the session over to the re-INVITE and BYE handlers.
pub struct SessionPipeline {
    pool: Arc<BackendPool>,
    gate: Arc<VerificationGate>,
    codec: Arc<dyn PayloadCodec>,
    allocator: EndpointAllocator,
}

impl SessionPipeline {
    pub fn new(
        pool: Arc<BackendPool>,
        gate: Arc<VerificationGate>,
        codec: Arc<dyn PayloadCodec>,
    ) -> Self {
        Self {
            pool,
            gate,
            codec,
            allocator: EndpointAllocator::default(),
        }
    }

    pub fn with_allocator(mut self, allocator: EndpointAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Runs setup for one INVITE. Failures are logged here; the returned
    /// error tells the caller whether a response already went out.
    pub async fn initiate(&self, invite: &dyn InboundInvite) -> Result<(), SetupError> {
        let call_id = invite
            .request()
            .call_id_header()
            .map(|h| h.value().to_string())
            .unwrap_or_default();
        let span = info_span!("siprec", %call_id);
        async move {
            info!(uri = %invite.request().uri, "received SIPREC invite");
            let result = self.establish(invite).await;
            match &result {
                Ok(()) => {}
                Err(SetupError::RejectionAlreadySent { reason }) => {
                    info!(%reason, "call not recorded");
                }
                Err(SetupError::Unhandled(e)) => {
                    error!("Error connecting call: {}", e);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn establish(&self, invite: &dyn InboundInvite) -> Result<(), SetupError> {
        let (call_id, from_tag) = dialog_identifiers(invite.request())?;
        let to_tag = Uuid::new_v4().to_string();
        let backend = self.pool.next();
        let mut session = CallSession::new(call_id, from_tag, to_tag, backend);

        let payload = self.codec.decode(&invite.request().body)?;
        session.apply_payload(payload);
        advance(&mut session, SessionStage::Decoded);

        let decision = self
            .gate
            .decide(
                invite,
                session.caller.identifier(),
                session.callee.identifier(),
            )
            .await;
        if let VerificationDecision::Deny { reason } = decision {
            return Err(SetupError::RejectionAlreadySent { reason });
        }
        advance(&mut session, SessionStage::Verified);

        self.allocator.allocate(Leg::Caller, &mut session).await?;
        advance(&mut session, SessionStage::CallerAllocated);
        self.allocator.allocate(Leg::Callee, &mut session).await?;
        advance(&mut session, SessionStage::CalleeAllocated);

        let body = compose(self.codec.as_ref(), &session)?;
        let mut dialog = invite.answer(body).await?;
        advance(&mut session, SessionStage::Answered);
        info!(
            remote = %session.backend.remote,
            dialog_id = %dialog.id(),
            "call connected successfully"
        );

        let backend = session.backend.clone();
        let call_id = session.call_id.clone();
        advance(&mut session, SessionStage::Active);

        let session: CallSessionRef = Arc::new(Mutex::new(session));
        dialog.on_description_changed(ReNegotiationHandler {
            session: session.clone(),
            codec: self.codec.clone(),
            allocator: self.allocator.clone(),
        });
        dialog.on_ended(TeardownHandler { session });

        tokio::spawn(start_forwarding(backend, call_id).instrument(Span::current()));
        Ok(())
    }
}

fn advance(session: &mut CallSession, stage: SessionStage) {
    debug!(from = ?session.stage, to = ?stage, "session stage");
    session.stage = stage;
}

fn compose(codec: &dyn PayloadCodec, session: &CallSession) -> Result<Vec<u8>> {
    codec.encode(
        session.answer(Leg::Caller).unwrap_or_default(),
        session.answer(Leg::Callee).unwrap_or_default(),
        session.offer(Leg::Caller),
        session.offer(Leg::Callee),
    )
}

/// Best effort: the call is already answered, nothing here may undo it.
async fn start_forwarding(backend: Arc<Backend>, call_id: String) {
    if !backend.supports_forwarding() {
        debug!(remote = %backend.remote, "rtpengine has no start forwarding support");
        return;
    }
    match backend.relay.start_forwarding(backend.remote, &call_id).await {
        Ok(response) if response.is_ok() => {
            debug!(remote = %backend.remote, "forwarding started");
        }
        Ok(response) => {
            warn!(remote = %backend.remote, %response, "start forwarding failed (non-fatal)");
        }
        Err(e) => {
            warn!(remote = %backend.remote, "start forwarding failed (non-fatal): {}", e);
        }
    }
}

/// Handles a re-INVITE on an established recording. The call was admitted at
/// setup, so verification is not repeated.
#[derive(Clone)]
pub struct ReNegotiationHandler {
    session: CallSessionRef,
    codec: Arc<dyn PayloadCodec>,
    allocator: EndpointAllocator,
}

impl ReNegotiationHandler {
    pub fn session(&self) -> CallSessionRef {
        self.session.clone()
    }

    pub async fn handle(&self, request: &dyn ModifyRequest) -> Result<()> {
        let mut session = self.session.lock().await;
        let span = info_span!("siprec", call_id = %session.call_id);
        span.in_scope(|| info!(uri = %request.request().uri, "received SIPREC re-invite"));
        let result = self
            .renegotiate(&mut session, request)
            .instrument(span.clone())
            .await;
        if let Err(e) = &result {
            span.in_scope(|| error!("Error connecting call: {}", e));
        }
        result
    }

    async fn renegotiate(
        &self,
        session: &mut CallSession,
        request: &dyn ModifyRequest,
    ) -> Result<()> {
        let payload = self.codec.decode(&request.request().body)?;
        // the stored session only changes once the new answer went out
        let mut next = session.clone();
        next.apply_payload(payload);
        self.allocator.allocate(Leg::Caller, &mut next).await?;
        self.allocator.allocate(Leg::Callee, &mut next).await?;
        let body = compose(self.codec.as_ref(), &next)?;
        request.answer(body).await?;
        *session = next;
        advance(session, SessionStage::Active);
        Ok(())
    }
}

/// Releases the relay resources of a call once its dialog ends.
#[derive(Clone)]
pub struct TeardownHandler {
    session: CallSessionRef,
}

impl TeardownHandler {
    pub fn session(&self) -> CallSessionRef {
        self.session.clone()
    }

    /// Never fails: the call is over whatever the relay answers.
    pub async fn handle(&self) {
        let mut session = self.session.lock().await;
        let span = info_span!("siprec", call_id = %session.call_id);
        let backend = session.backend.clone();
        let call = session.call_ref();
        async {
            info!(
                remote = %backend.remote,
                "call ended - sending delete to rtpengine"
            );
            let start = Instant::now();
            match backend.relay.delete(backend.remote, &call).await {
                Ok(response) if response.is_ok() => {
                    info!(
                        elapsed_ms = start.elapsed().as_millis(),
                        %response,
                        "rtpengine delete completed"
                    );
                }
                Ok(response) => {
                    warn!(
                        elapsed_ms = start.elapsed().as_millis(),
                        %response,
                        "rtpengine delete returned error"
                    );
                }
                Err(e) => {
                    error!(
                        elapsed_ms = start.elapsed().as_millis(),
                        "rtpengine delete failed: {}",
                        e
                    );
                }
            }
        }
        .instrument(span)
        .await;
        advance(&mut session, SessionStage::Ended);
    }
}
