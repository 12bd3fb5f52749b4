//! pfcp_handler - entry point for PFCP messages received from UPFs
use super::association_release::AssociationReleaseProcedure;
use super::association_setup::AssociationSetupProcedure;
use super::session_report::SessionReportProcedure;
use crate::HandlerApi;
use crate::protocols::n4::build;
use anyhow::{Result, bail};
use derive_deref::Deref;
use pfcp::{NodeId, PfcpBody, PfcpMessage};
use slog::{Logger, debug, info, warn};

#[derive(Clone, Deref)]
pub struct PfcpHandler<A: HandlerApi>(A);

impl<A: HandlerApi> PfcpHandler<A> {
    pub fn new(api: A) -> Self {
        PfcpHandler(api)
    }

    pub async fn handle(&self, peer: &NodeId, message: PfcpMessage, logger: &Logger) {
        let name = message.name();
        if let Err(e) = self.dispatch(peer, message, logger).await {
            warn!(logger, "Failed to handle {} from {} - {}", name, peer, e);
        }
    }

    async fn dispatch(&self, peer: &NodeId, message: PfcpMessage, logger: &Logger) -> Result<()> {
        let local_seid = message.seid.unwrap_or_default();
        let sequence_number = message.sequence_number;
        let name = message.name();
        match message.body {
            PfcpBody::AssociationSetupResponse(r) => {
                AssociationSetupProcedure::new(&self.0, logger).response(peer, r)
            }
            PfcpBody::AssociationReleaseRequest(r) => {
                AssociationReleaseProcedure::new(&self.0, logger)
                    .run(peer, sequence_number, r)
                    .await?
            }
            PfcpBody::HeartbeatRequest(_) => {
                debug!(logger, ">> HeartbeatRequest from {}", peer);
                let response =
                    build::heartbeat_response(self.recovery_time_stamp(), sequence_number);
                self.pfcp_send(peer, response, logger).await?
            }
            PfcpBody::SessionEstablishmentResponse(r) => {
                let remote_seid = r.up_f_seid.map(|f| f.seid);
                self.session_response(local_seid, r.cause.is_accepted(), remote_seid, logger)
            }
            PfcpBody::SessionModificationResponse(r) => {
                self.session_response(local_seid, r.cause.is_accepted(), None, logger)
            }
            PfcpBody::SessionDeletionResponse(r) => {
                for report in r.usage_reports.iter() {
                    info!(
                        logger,
                        "Final usage report URR {} volume {}", report.urr_id, report.total_volume
                    );
                }
                self.session_response(local_seid, r.cause.is_accepted(), None, logger)
            }
            PfcpBody::SessionReportRequest(r) => {
                SessionReportProcedure::new(&self.0, logger)
                    .run(peer, local_seid, sequence_number, r)
                    .await?
            }
            PfcpBody::HeartbeatResponse(_) | PfcpBody::AssociationReleaseResponse(_) => {
                debug!(logger, ">> {} from {}", name, peer)
            }
            _ => bail!("Unexpected {name}"),
        }
        Ok(())
    }

    fn session_response(
        &self,
        local_seid: u64,
        accepted: bool,
        remote_seid: Option<u64>,
        logger: &Logger,
    ) {
        match self.sessions().get_by_local_seid(local_seid) {
            Some(session) => session.response_received(local_seid, accepted, remote_seid),
            None => warn!(logger, "Response for unknown SEID {}", local_seid),
        }
    }
}
