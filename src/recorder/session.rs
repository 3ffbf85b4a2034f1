use super::pool::Backend;
use super::signaling::RecordingPayload;
use crate::rtpengine::CallRef;
use std::fmt;
use std::sync::Arc;

/// One of the two media directions of a recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    Caller,
    Callee,
}

impl Leg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Leg::Caller => "caller",
            Leg::Callee => "callee",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Received,
    Decoded,
    Verified,
    CallerAllocated,
    CalleeAllocated,
    Answered,
    Active,
    Ended,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Party {
    pub aor: Option<String>,
    pub name: Option<String>,
    pub number: Option<String>,
}

impl Party {
    /// Identifier handed to the verification service.
    pub fn identifier(&self) -> &str {
        non_empty(&self.number)
            .or_else(|| non_empty(&self.aor))
            .unwrap_or("unknown")
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// State of one recorded call, from the INVITE until the relay delete.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_id: String,
    pub from_tag: String,
    pub to_tag: String,
    pub caller: Party,
    pub callee: Party,
    pub original_call_id: Option<String>,
    pub recording_session_id: Option<String>,
    pub caller_offer: String,
    pub callee_offer: String,
    pub caller_answer: Option<String>,
    pub callee_answer: Option<String>,
    pub backend: Arc<Backend>,
    pub stage: SessionStage,
}

impl CallSession {
    pub fn new(call_id: String, from_tag: String, to_tag: String, backend: Arc<Backend>) -> Self {
        Self {
            call_id,
            from_tag,
            to_tag,
            caller: Party::default(),
            callee: Party::default(),
            original_call_id: None,
            recording_session_id: None,
            caller_offer: String::new(),
            callee_offer: String::new(),
            caller_answer: None,
            callee_answer: None,
            backend,
            stage: SessionStage::Received,
        }
    }

    /// Overwrites the decoded fields; identifiers and backend stay untouched.
    pub fn apply_payload(&mut self, payload: RecordingPayload) {
        self.caller = payload.caller;
        self.callee = payload.callee;
        self.original_call_id = payload.original_call_id;
        self.recording_session_id = payload.recording_session_id;
        self.caller_offer = payload.caller_sdp;
        self.callee_offer = payload.callee_sdp;
        self.caller_answer = None;
        self.callee_answer = None;
    }

    pub fn offer(&self, leg: Leg) -> &str {
        match leg {
            Leg::Caller => &self.caller_offer,
            Leg::Callee => &self.callee_offer,
        }
    }

    pub fn answer(&self, leg: Leg) -> Option<&str> {
        match leg {
            Leg::Caller => self.caller_answer.as_deref(),
            Leg::Callee => self.callee_answer.as_deref(),
        }
    }

    pub fn set_answer(&mut self, leg: Leg, sdp: Option<String>) {
        match leg {
            Leg::Caller => self.caller_answer = sdp,
            Leg::Callee => self.callee_answer = sdp,
        }
    }

    /// Identity used for the relay's delete; the to-tag is not part of it.
    pub fn call_ref(&self) -> CallRef {
        CallRef {
            call_id: self.call_id.clone(),
            from_tag: self.from_tag.clone(),
            to_tag: None,
        }
    }
}
