use anyhow::Result;
use async_trait::async_trait;
use bencode::Value;
use std::net::SocketAddr;

pub mod bencode;
pub mod client;

pub use client::NgClient;

/// Dialog identity of a call as the relay knows it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallRef {
    pub call_id: String,
    pub from_tag: String,
    pub to_tag: Option<String>,
}

impl CallRef {
    fn append_to(&self, dict: &mut Value) {
        dict.insert("call-id", self.call_id.as_str());
        dict.insert("from-tag", self.from_tag.as_str());
        if let Some(to_tag) = &self.to_tag {
            dict.insert("to-tag", to_tag.as_str());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceMode {
    Remove,
    Force,
    Default,
}

impl IceMode {
    fn as_str(&self) -> &'static str {
        match self {
            IceMode::Remove => "remove",
            IceMode::Force => "force",
            IceMode::Default => "default",
        }
    }
}

/// Negotiation directives sent alongside every offer/answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiateOptions {
    pub transport_protocol: String,
    pub dtls: bool,
    pub ice: IceMode,
    pub sdes: bool,
    pub record_call: bool,
    pub replace: Vec<String>,
    pub flags: Vec<String>,
    pub rtcp_mux: Vec<String>,
    pub direction: (String, String),
}

impl NegotiateOptions {
    /// Plain RTP on both sides, no ICE/DTLS/SDES, recording on, relay latches
    /// onto whatever address the media actually arrives from.
    pub fn recording() -> Self {
        Self {
            transport_protocol: "RTP/AVP".to_string(),
            dtls: false,
            ice: IceMode::Remove,
            sdes: false,
            record_call: true,
            replace: vec!["origin".to_string(), "session-connection".to_string()],
            flags: vec!["media handover".to_string(), "port latching".to_string()],
            rtcp_mux: vec!["accept".to_string()],
            direction: ("public".to_string(), "public".to_string()),
        }
    }

    fn append_to(&self, dict: &mut Value) {
        let on_off = |b: bool| if b { "on" } else { "off" };
        dict.insert("transport protocol", self.transport_protocol.as_str());
        dict.insert("DTLS", on_off(self.dtls));
        dict.insert("ICE", self.ice.as_str());
        dict.insert("SDES", on_off(self.sdes));
        dict.insert("record call", if self.record_call { "yes" } else { "no" });
        dict.insert("replace", self.replace.clone());
        dict.insert("flags", self.flags.clone());
        dict.insert("rtcp-mux", self.rtcp_mux.clone());
        dict.insert(
            "direction",
            vec![self.direction.0.clone(), self.direction.1.clone()],
        );
    }
}

/// Parameters of an `offer` or `answer` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiateParams {
    pub call: CallRef,
    pub sdp: String,
    pub metadata: String,
    pub options: NegotiateOptions,
}

impl NegotiateParams {
    pub fn to_bencode(&self, command: &str) -> Value {
        let mut dict = Value::dict();
        dict.insert("command", command);
        self.call.append_to(&mut dict);
        dict.insert("sdp", self.sdp.as_str());
        self.options.append_to(&mut dict);
        dict.insert("metadata", self.metadata.as_str());
        dict
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NgResponse {
    pub result: String,
    pub sdp: Option<String>,
    pub error_reason: Option<String>,
    pub warning: Option<String>,
}

impl NgResponse {
    pub fn ok(sdp: Option<String>) -> Self {
        Self {
            result: "ok".to_string(),
            sdp,
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == "ok"
    }

    pub fn from_bencode(value: &Value) -> Result<Self> {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let result = text("result")
            .ok_or_else(|| anyhow::anyhow!("rtpengine: response has no result field"))?;
        Ok(Self {
            result,
            sdp: text("sdp"),
            error_reason: text("error-reason"),
            warning: text("warning"),
        })
    }
}

impl std::fmt::Display for NgResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "result={}", self.result)?;
        if let Some(reason) = &self.error_reason {
            write!(f, " error-reason={}", reason)?;
        }
        if let Some(warning) = &self.warning {
            write!(f, " warning={}", warning)?;
        }
        if let Some(sdp) = &self.sdp {
            write!(f, " sdp={}B", sdp.len())?;
        }
        Ok(())
    }
}

/// Control channel to a media relay instance.
#[async_trait]
pub trait MediaRelay: Send + Sync {
    async fn offer(&self, remote: SocketAddr, params: &NegotiateParams) -> Result<NgResponse>;
    async fn answer(&self, remote: SocketAddr, params: &NegotiateParams) -> Result<NgResponse>;
    async fn delete(&self, remote: SocketAddr, call: &CallRef) -> Result<NgResponse>;
    async fn ping(&self, remote: SocketAddr) -> Result<NgResponse>;
    async fn start_forwarding(&self, remote: SocketAddr, call_id: &str) -> Result<NgResponse>;
}
