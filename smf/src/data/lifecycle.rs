//! lifecycle - requests and notifications exchanged with the access layer
use super::{AnTunnel, SmContextState, SmPolicyDecision, Snssai};
use std::net::Ipv4Addr;

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub supi: String,
    pub pdu_session_id: u8,
    pub snssai: Snssai,
    pub dnn: String,
    // Static address of the subscriber, if any.
    pub requested_address: Option<Ipv4Addr>,
    pub policy: SmPolicyDecision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionResponse {
    pub reference: String,
    pub pdu_address: Ipv4Addr,
    pub anchor: String,
}

/// A change to an established session.
#[derive(Debug, Clone)]
pub enum SessionDelta {
    /// The access network has told us its downlink tunnel endpoint.
    AnTunnelSetup(AnTunnel),
    /// The user plane connection is deactivated; downlink data is buffered.
    Deactivate,
    PolicyUpdate(SmPolicyDecision),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmfNotification {
    DownlinkDataNotification {
        reference: String,
        supi: String,
        pdu_session_id: u8,
    },
    /// The DNAI a PCC rule steers traffic to has changed.  `None` is the session anchor.
    UpPathChange {
        reference: String,
        pcc_rule_id: String,
        source_dnai: Option<String>,
        target_dnai: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub supi: String,
    pub pdu_session_id: u8,
    pub state: SmContextState,
    pub pdu_address: Option<Ipv4Addr>,
    pub anchor: Option<String>,
    pub ulcl: Option<String>,
    pub data_paths: Vec<Vec<String>>,
}
