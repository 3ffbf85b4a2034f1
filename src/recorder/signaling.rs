//! Boundary with the SIP stack and the SIPREC body codec. The recorder never
//! drives the dialog itself; the hosting stack implements these traits and
//! calls back into the handlers it was given.
use super::pipeline::{ReNegotiationHandler, TeardownHandler};
use super::session::Party;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rsip::prelude::*;

/// Decoded SIPREC request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingPayload {
    pub caller_sdp: String,
    pub callee_sdp: String,
    pub caller: Party,
    pub callee: Party,
    pub original_call_id: Option<String>,
    pub recording_session_id: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
pub trait PayloadCodec: Send + Sync {
    fn decode(&self, body: &[u8]) -> Result<RecordingPayload>;

    /// Combines the relay's answers with the originally offered descriptions
    /// into the body of the 200 OK.
    fn encode(
        &self,
        caller_answer: &str,
        callee_answer: &str,
        caller_offer: &str,
        callee_offer: &str,
    ) -> Result<Vec<u8>>;
}

/// An INVITE that opens a recording session.
#[async_trait]
pub trait InboundInvite: Send + Sync {
    fn request(&self) -> &rsip::Request;
    /// Sends a final non-2xx response.
    async fn reply(&self, status: rsip::StatusCode) -> Result<()>;
    /// Sends the 200 OK with `body` and hands back the established dialog.
    async fn answer(&self, body: Vec<u8>) -> Result<Box<dyn ActiveDialog>>;
}

/// Established dialog. Each event is delivered at most once at a time.
pub trait ActiveDialog: Send {
    fn id(&self) -> String;
    fn on_description_changed(&mut self, handler: ReNegotiationHandler);
    fn on_ended(&mut self, handler: TeardownHandler);
}

/// An in-dialog re-INVITE carrying a new SIPREC body.
#[async_trait]
pub trait ModifyRequest: Send + Sync {
    fn request(&self) -> &rsip::Request;
    async fn answer(&self, body: Vec<u8>) -> Result<()>;
}

/// Call-ID and From tag of a request.
pub fn dialog_identifiers(request: &rsip::Request) -> Result<(String, String)> {
    let call_id = request.call_id_header()?.value().to_string();
    let from_tag = request
        .from_header()?
        .tag()?
        .ok_or_else(|| anyhow!("From header has no tag"))?;
    Ok((call_id, from_tag.value().to_string()))
}
