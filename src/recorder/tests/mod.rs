use super::pipeline::{ReNegotiationHandler, TeardownHandler};
use super::pool::Backend;
use super::session::Party;
use super::signaling::{
    ActiveDialog, InboundInvite, MockPayloadCodec, ModifyRequest, RecordingPayload,
};
use crate::rtpengine::{CallRef, MediaRelay, NegotiateParams, NgResponse};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;


/// Relay that accepts everything and returns no description.
pub(crate) struct NullRelay;

#[async_trait]
impl MediaRelay for NullRelay {
    async fn offer(&self, _: SocketAddr, _: &NegotiateParams) -> Result<NgResponse> {
        Ok(NgResponse::ok(None))
    }
    async fn answer(&self, _: SocketAddr, _: &NegotiateParams) -> Result<NgResponse> {
        Ok(NgResponse::ok(None))
    }
    async fn delete(&self, _: SocketAddr, _: &CallRef) -> Result<NgResponse> {
        Ok(NgResponse::ok(None))
    }
    async fn ping(&self, _: SocketAddr) -> Result<NgResponse> {
        Ok(NgResponse {
            result: "pong".to_string(),
            ..Default::default()
        })
    }
    async fn start_forwarding(&self, _: SocketAddr, _: &str) -> Result<NgResponse> {
        Ok(NgResponse::ok(None))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RelayCall {
    Offer(SocketAddr, NegotiateParams),
    Answer(SocketAddr, NegotiateParams),
    Delete(SocketAddr, CallRef),
    Ping(SocketAddr),
    StartForwarding(SocketAddr, String),
}

/// Relay shared by several backends; remembers every command and which
/// backend address it was sent to.
#[derive(Default)]
pub(crate) struct RecordingRelay {
    calls: Mutex<Vec<RelayCall>>,
    answer_result: Mutex<Option<String>>,
    fail_delete: bool,
    fail_forwarding: bool,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer_result(self, result: &str) -> Self {
        self.set_answer_result(result);
        self
    }

    /// Makes every later `answer` return `result` instead of `ok`.
    pub fn set_answer_result(&self, result: &str) {
        *self.answer_result.lock().unwrap() = Some(result.to_string());
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn failing_forwarding(mut self) -> Self {
        self.fail_forwarding = true;
        self
    }

    pub fn calls(&self) -> Vec<RelayCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RelayCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Polls until a forwarding request shows up; it is sent from a
    /// background task after the call is answered.
    pub async fn wait_forwarding(&self) -> Option<RelayCall> {
        for _ in 0..100 {
            let found = self
                .calls()
                .into_iter()
                .find(|c| matches!(c, RelayCall::StartForwarding(..)));
            if found.is_some() {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }
}

pub(crate) fn relay_sdp(remote: SocketAddr, command: &str, params: &NegotiateParams) -> String {
    format!(
        "v=0\r\no=rtpengine {} {} {}\r\n",
        remote.port(),
        command,
        params.call.call_id
    )
}

#[async_trait]
impl MediaRelay for RecordingRelay {
    async fn offer(&self, remote: SocketAddr, params: &NegotiateParams) -> Result<NgResponse> {
        self.record(RelayCall::Offer(remote, params.clone()));
        Ok(NgResponse::ok(Some(relay_sdp(remote, "offer", params))))
    }

    async fn answer(&self, remote: SocketAddr, params: &NegotiateParams) -> Result<NgResponse> {
        self.record(RelayCall::Answer(remote, params.clone()));
        let answer_result = self.answer_result.lock().unwrap().clone();
        match answer_result {
            Some(result) => Ok(NgResponse {
                result,
                error_reason: Some("Unknown call-id".to_string()),
                ..Default::default()
            }),
            None => Ok(NgResponse::ok(Some(relay_sdp(remote, "answer", params)))),
        }
    }

    async fn delete(&self, remote: SocketAddr, call: &CallRef) -> Result<NgResponse> {
        self.record(RelayCall::Delete(remote, call.clone()));
        if self.fail_delete {
            return Err(anyhow!("rtpengine: no reply from {} within 1500ms", remote));
        }
        Ok(NgResponse::ok(None))
    }

    async fn ping(&self, remote: SocketAddr) -> Result<NgResponse> {
        self.record(RelayCall::Ping(remote));
        Ok(NgResponse {
            result: "pong".to_string(),
            ..Default::default()
        })
    }

    async fn start_forwarding(&self, remote: SocketAddr, call_id: &str) -> Result<NgResponse> {
        self.record(RelayCall::StartForwarding(remote, call_id.to_string()));
        if self.fail_forwarding {
            return Err(anyhow!("rtpengine: unknown command"));
        }
        Ok(NgResponse::ok(None))
    }
}

pub(crate) fn backend(port: u16, relay: Arc<dyn MediaRelay>, forwarding: bool) -> Arc<Backend> {
    Arc::new(Backend::new(
        format!("127.0.0.1:{}", port).parse().unwrap(),
        relay,
        forwarding,
    ))
}

pub(crate) fn sip_request(call_id: &str, from_tag: Option<&str>, body: &str) -> rsip::Request {
    let from = match from_tag {
        Some(tag) => format!("<sip:srs@example.com>;tag={}", tag),
        None => "<sip:srs@example.com>".to_string(),
    };
    rsip::Request {
        method: rsip::Method::Invite,
        uri: "sip:recorder@127.0.0.1".try_into().unwrap(),
        headers: vec![
            rsip::Header::From(from.into()),
            rsip::Header::To("<sip:recorder@127.0.0.1>".into()),
            rsip::Header::CallId(call_id.into()),
        ]
        .into(),
        version: rsip::Version::V2,
        body: body.as_bytes().to_vec(),
    }
}

/// Codec double: the body is a short label. Decoding derives both offers
/// from it; encoding joins the four descriptions.
pub(crate) fn codec() -> MockPayloadCodec {
    let mut codec = MockPayloadCodec::new();
    codec.expect_decode().returning(|body| {
        let label = String::from_utf8_lossy(body).to_string();
        if label.is_empty() {
            return Err(anyhow!("missing SIPREC body"));
        }
        let callee_aor = if label.contains("blocked") {
            "blocked@y"
        } else {
            "bob@y"
        };
        Ok(RecordingPayload {
            caller_sdp: format!("v=0\r\ns={} caller\r\na=inactive\r\n", label),
            callee_sdp: format!("v=0\r\ns={} callee\r\na=sendrecv\r\n", label),
            caller: Party {
                aor: Some("alice@x".to_string()),
                name: None,
                number: None,
            },
            callee: Party {
                aor: Some(callee_aor.to_string()),
                name: None,
                number: None,
            },
            original_call_id: None,
            recording_session_id: None,
        })
    });
    codec.expect_encode().returning(|a, b, c, d| {
        Ok(format!("{}--\r\n{}--\r\n{}--\r\n{}", a, b, c, d).into_bytes())
    });
    codec
}

#[derive(Default)]
pub(crate) struct DialogHandlers {
    pub renegotiation: Option<ReNegotiationHandler>,
    pub teardown: Option<TeardownHandler>,
}

pub(crate) struct MockDialog {
    handlers: Arc<Mutex<DialogHandlers>>,
}

impl ActiveDialog for MockDialog {
    fn id(&self) -> String {
        "mock-dialog".to_string()
    }

    fn on_description_changed(&mut self, handler: ReNegotiationHandler) {
        self.handlers.lock().unwrap().renegotiation = Some(handler);
    }

    fn on_ended(&mut self, handler: TeardownHandler) {
        self.handlers.lock().unwrap().teardown = Some(handler);
    }
}

pub(crate) struct MockInvite {
    request: rsip::Request,
    pub replies: Mutex<Vec<rsip::StatusCode>>,
    pub answered: Mutex<Option<String>>,
    pub handlers: Arc<Mutex<DialogHandlers>>,
}

impl MockInvite {
    pub fn new(request: rsip::Request) -> Self {
        Self {
            request,
            replies: Mutex::new(Vec::new()),
            answered: Mutex::new(None),
            handlers: Arc::new(Mutex::new(DialogHandlers::default())),
        }
    }

    pub fn replies(&self) -> Vec<rsip::StatusCode> {
        self.replies.lock().unwrap().clone()
    }

    pub fn answered(&self) -> Option<String> {
        self.answered.lock().unwrap().clone()
    }

    pub fn renegotiation(&self) -> Option<ReNegotiationHandler> {
        self.handlers.lock().unwrap().renegotiation.clone()
    }

    pub fn teardown(&self) -> Option<TeardownHandler> {
        self.handlers.lock().unwrap().teardown.clone()
    }
}

#[async_trait]
impl InboundInvite for MockInvite {
    fn request(&self) -> &rsip::Request {
        &self.request
    }

    async fn reply(&self, status: rsip::StatusCode) -> Result<()> {
        self.replies.lock().unwrap().push(status);
        Ok(())
    }

    async fn answer(&self, body: Vec<u8>) -> Result<Box<dyn ActiveDialog>> {
        *self.answered.lock().unwrap() = Some(String::from_utf8_lossy(&body).to_string());
        Ok(Box::new(MockDialog {
            handlers: self.handlers.clone(),
        }))
    }
}

pub(crate) struct MockModify {
    request: rsip::Request,
    pub answered: Mutex<Option<String>>,
}

impl MockModify {
    pub fn new(request: rsip::Request) -> Self {
        Self {
            request,
            answered: Mutex::new(None),
        }
    }

    pub fn answered(&self) -> Option<String> {
        self.answered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModifyRequest for MockModify {
    fn request(&self) -> &rsip::Request {
        &self.request
    }

    async fn answer(&self, body: Vec<u8>) -> Result<()> {
        *self.answered.lock().unwrap() = Some(String::from_utf8_lossy(&body).to_string());
        Ok(())
    }
}
