//! build - construction of PFCP messages sent by the SMF
use crate::PfcpSessionContext;
use pfcp::*;
use std::net::IpAddr;
use std::time::SystemTime;

pub fn association_setup_request(
    node_id: &NodeId,
    recovery_time_stamp: SystemTime,
    sequence_number: u32,
) -> PfcpMessage {
    PfcpMessage::node(
        sequence_number,
        PfcpBody::AssociationSetupRequest(AssociationSetupRequest {
            node_id: node_id.clone(),
            recovery_time_stamp,
        }),
    )
}

pub fn association_release_response(node_id: &NodeId, sequence_number: u32) -> PfcpMessage {
    PfcpMessage::node(
        sequence_number,
        PfcpBody::AssociationReleaseResponse(AssociationReleaseResponse {
            node_id: node_id.clone(),
            cause: Cause::RequestAccepted,
        }),
    )
}

pub fn heartbeat_response(recovery_time_stamp: SystemTime, sequence_number: u32) -> PfcpMessage {
    PfcpMessage::node(
        sequence_number,
        PfcpBody::HeartbeatResponse(HeartbeatResponse {
            recovery_time_stamp,
        }),
    )
}

/// Establishes the PFCP session on a UPF we have not yet got a SEID from, otherwise modifies it.
/// An establishment only carries rule creations.
pub fn session_request(
    context: &PfcpSessionContext,
    node_id: &NodeId,
    smf_addr: IpAddr,
    changes: RuleChanges,
    sequence_number: u32,
) -> PfcpMessage {
    let cp_f_seid = Fseid {
        seid: context.local_seid,
        ip_addr: smf_addr,
    };
    match context.remote_seid {
        None => PfcpMessage::session(
            0,
            sequence_number,
            PfcpBody::SessionEstablishmentRequest(SessionEstablishmentRequest {
                node_id: node_id.clone(),
                cp_f_seid,
                create_pdrs: changes.create_pdrs,
                create_fars: changes.create_fars,
                create_qers: changes.create_qers,
                create_bars: changes.create_bars,
                pdn_type_ipv4: true,
            }),
        ),
        Some(remote_seid) => PfcpMessage::session(
            remote_seid,
            sequence_number,
            PfcpBody::SessionModificationRequest(SessionModificationRequest {
                cp_f_seid: None,
                changes,
            }),
        ),
    }
}

pub fn session_deletion_request(remote_seid: u64, sequence_number: u32) -> PfcpMessage {
    PfcpMessage::session(
        remote_seid,
        sequence_number,
        PfcpBody::SessionDeletionRequest(SessionDeletionRequest {}),
    )
}

pub fn session_report_response(remote_seid: u64, cause: Cause, sequence_number: u32) -> PfcpMessage {
    PfcpMessage::session(
        remote_seid,
        sequence_number,
        PfcpBody::SessionReportResponse(SessionReportResponse { cause }),
    )
}
