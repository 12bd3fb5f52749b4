//! messages - PFCP node and session related messages
use crate::ies::*;
use std::time::SystemTime;

/// A PFCP message.  `seid` is present on session related messages and is the SEID allocated by
/// the receiver of the message.
#[derive(Debug, Clone, PartialEq)]
pub struct PfcpMessage {
    pub seid: Option<u64>,
    pub sequence_number: u32,
    pub body: PfcpBody,
}

impl PfcpMessage {
    pub fn node(sequence_number: u32, body: PfcpBody) -> Self {
        PfcpMessage {
            seid: None,
            sequence_number,
            body,
        }
    }

    pub fn session(seid: u64, sequence_number: u32, body: PfcpBody) -> Self {
        PfcpMessage {
            seid: Some(seid),
            sequence_number,
            body,
        }
    }

    pub fn name(&self) -> &'static str {
        self.body.name()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PfcpBody {
    HeartbeatRequest(HeartbeatRequest),
    HeartbeatResponse(HeartbeatResponse),
    AssociationSetupRequest(AssociationSetupRequest),
    AssociationSetupResponse(AssociationSetupResponse),
    AssociationReleaseRequest(AssociationReleaseRequest),
    AssociationReleaseResponse(AssociationReleaseResponse),
    SessionEstablishmentRequest(SessionEstablishmentRequest),
    SessionEstablishmentResponse(SessionEstablishmentResponse),
    SessionModificationRequest(SessionModificationRequest),
    SessionModificationResponse(SessionModificationResponse),
    SessionDeletionRequest(SessionDeletionRequest),
    SessionDeletionResponse(SessionDeletionResponse),
    SessionReportRequest(SessionReportRequest),
    SessionReportResponse(SessionReportResponse),
}

impl PfcpBody {
    pub fn name(&self) -> &'static str {
        match self {
            PfcpBody::HeartbeatRequest(_) => "HeartbeatRequest",
            PfcpBody::HeartbeatResponse(_) => "HeartbeatResponse",
            PfcpBody::AssociationSetupRequest(_) => "AssociationSetupRequest",
            PfcpBody::AssociationSetupResponse(_) => "AssociationSetupResponse",
            PfcpBody::AssociationReleaseRequest(_) => "AssociationReleaseRequest",
            PfcpBody::AssociationReleaseResponse(_) => "AssociationReleaseResponse",
            PfcpBody::SessionEstablishmentRequest(_) => "SessionEstablishmentRequest",
            PfcpBody::SessionEstablishmentResponse(_) => "SessionEstablishmentResponse",
            PfcpBody::SessionModificationRequest(_) => "SessionModificationRequest",
            PfcpBody::SessionModificationResponse(_) => "SessionModificationResponse",
            PfcpBody::SessionDeletionRequest(_) => "SessionDeletionRequest",
            PfcpBody::SessionDeletionResponse(_) => "SessionDeletionResponse",
            PfcpBody::SessionReportRequest(_) => "SessionReportRequest",
            PfcpBody::SessionReportResponse(_) => "SessionReportResponse",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatRequest {
    pub recovery_time_stamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatResponse {
    pub recovery_time_stamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationSetupRequest {
    pub node_id: NodeId,
    pub recovery_time_stamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationSetupResponse {
    pub node_id: NodeId,
    pub cause: Cause,
    pub recovery_time_stamp: SystemTime,
    pub user_plane_ip_resource_information: Vec<UserPlaneIpResourceInformation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationReleaseRequest {
    pub node_id: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationReleaseResponse {
    pub node_id: NodeId,
    pub cause: Cause,
}

/// The rule lists shared by establishment and modification requests.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleChanges {
    pub create_pdrs: Vec<CreatePdr>,
    pub create_fars: Vec<CreateFar>,
    pub create_qers: Vec<CreateQer>,
    pub create_bars: Vec<CreateBar>,
    pub update_pdrs: Vec<UpdatePdr>,
    pub update_fars: Vec<UpdateFar>,
    pub update_qers: Vec<UpdateQer>,
    pub remove_pdrs: Vec<RemovePdr>,
    pub remove_fars: Vec<RemoveFar>,
    pub remove_qers: Vec<RemoveQer>,
    pub remove_bars: Vec<RemoveBar>,
}

impl RuleChanges {
    pub fn is_empty(&self) -> bool {
        self.create_pdrs.is_empty()
            && self.create_fars.is_empty()
            && self.create_qers.is_empty()
            && self.create_bars.is_empty()
            && self.update_pdrs.is_empty()
            && self.update_fars.is_empty()
            && self.update_qers.is_empty()
            && self.remove_pdrs.is_empty()
            && self.remove_fars.is_empty()
            && self.remove_qers.is_empty()
            && self.remove_bars.is_empty()
    }

    /// True if the changes only create rules, and so can be carried by an establishment request.
    pub fn is_create_only(&self) -> bool {
        self.update_pdrs.is_empty()
            && self.update_fars.is_empty()
            && self.update_qers.is_empty()
            && self.remove_pdrs.is_empty()
            && self.remove_fars.is_empty()
            && self.remove_qers.is_empty()
            && self.remove_bars.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEstablishmentRequest {
    pub node_id: NodeId,
    pub cp_f_seid: Fseid,
    pub create_pdrs: Vec<CreatePdr>,
    pub create_fars: Vec<CreateFar>,
    pub create_qers: Vec<CreateQer>,
    pub create_bars: Vec<CreateBar>,
    pub pdn_type_ipv4: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEstablishmentResponse {
    pub node_id: NodeId,
    pub cause: Cause,
    pub up_f_seid: Option<Fseid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionModificationRequest {
    pub cp_f_seid: Option<Fseid>,
    pub changes: RuleChanges,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionModificationResponse {
    pub cause: Cause,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionDeletionRequest {}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionDeletionResponse {
    pub cause: Cause,
    pub usage_reports: Vec<UsageReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReportRequest {
    pub report_type: ReportType,
    // PDR that matched the buffered downlink packet, for downlink data reports.
    pub downlink_data_pdr_id: Option<u16>,
    pub usage_reports: Vec<UsageReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReportResponse {
    pub cause: Cause,
}
