//! session_report - usage and downlink data reports sent by a UPF
use crate::protocols::n4::build;
use crate::{HandlerApi, Procedure, SmfNotification};
use anyhow::{Result, bail};
use derive_deref::{Deref, DerefMut};
use pfcp::{Cause, NodeId, SessionReportRequest};
use slog::{Logger, info, warn};

#[derive(Deref, DerefMut)]
pub struct SessionReportProcedure<'a, A: HandlerApi>(Procedure<'a, A>);

impl<'a, A: HandlerApi> SessionReportProcedure<'a, A> {
    pub fn new(api: &'a A, logger: &'a Logger) -> Self {
        SessionReportProcedure(Procedure::new(api, logger))
    }

    // Session report
    // 1.    >> SessionReportRequest
    // 2.    Notify the access layer of downlink data if the user plane connection is deactivated
    // 3.    << SessionReportResponse
    pub async fn run(
        &self,
        peer: &NodeId,
        local_seid: u64,
        sequence_number: u32,
        r: SessionReportRequest,
    ) -> Result<()> {
        self.log_message(">> SessionReportRequest");
        let Some(upf) = self.upfs().find_by_node_id(peer) else {
            bail!("Session report from unknown node {peer}");
        };
        let Some(session) = self.sessions().get_by_local_seid(local_seid) else {
            warn!(self.logger, "Session report for unknown SEID {local_seid}");
            let response =
                build::session_report_response(0, Cause::SessionContextNotFound, sequence_number);
            return self.send_to_upf(&upf, response).await;
        };

        let remote_seid = session
            .correlations()
            .into_iter()
            .find(|c| c.local_seid == local_seid)
            .and_then(|c| c.remote_seid)
            .unwrap_or_default();

        if r.report_type.dldr {
            let deactivated = session.lock().await.up_cnx_deactivated;
            info!(
                session.logger,
                "Downlink data report for PDR {:?}", r.downlink_data_pdr_id
            );
            if deactivated {
                self.notify(
                    SmfNotification::DownlinkDataNotification {
                        reference: session.reference.clone(),
                        supi: session.supi.clone(),
                        pdu_session_id: session.pdu_session_id,
                    },
                    &session.logger,
                )
                .await;
            }
        }
        for report in r.usage_reports.iter() {
            info!(
                session.logger,
                "Usage report URR {} volume {}", report.urr_id, report.total_volume
            );
        }

        let response =
            build::session_report_response(remote_seid, Cause::RequestAccepted, sequence_number);
        self.send_to_upf(&upf, response).await
    }
}
