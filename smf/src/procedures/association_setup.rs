//! association_setup - the SMF-initiated handshake that brings a UPF under our control
use crate::protocols::n4::build;
use crate::{HandlerApi, Procedure};
use derive_deref::{Deref, DerefMut};
use pfcp::{AssociationSetupResponse, NodeId};
use slog::{Logger, info, warn};

#[derive(Deref, DerefMut)]
pub struct AssociationSetupProcedure<'a, A: HandlerApi>(Procedure<'a, A>);

impl<'a, A: HandlerApi> AssociationSetupProcedure<'a, A> {
    pub fn new(api: &'a A, logger: &'a Logger) -> Self {
        AssociationSetupProcedure(Procedure::new(api, logger))
    }

    // Association setup
    // 1.    << AssociationSetupRequest (each configured UPF)
    // 2.    >> AssociationSetupResponse, handled by `response()` as it arrives
    pub async fn run(&self) {
        for upf in self.upfs().all() {
            upf.association_setup_started();
            let request = build::association_setup_request(
                self.node_id(),
                self.recovery_time_stamp(),
                self.next_sequence_number(),
            );
            if let Err(e) = self.send_to_upf(&upf, request).await {
                warn!(upf.logger, "Failed to send association setup - {e}");
                upf.association_lost();
            }
        }
    }

    pub fn response(&self, peer: &NodeId, r: AssociationSetupResponse) {
        self.log_message(">> AssociationSetupResponse");
        let Some(upf) = self.upfs().find_by_node_id(peer) else {
            warn!(self.logger, "Association setup response from unknown node {}", peer);
            return;
        };
        if r.cause.is_accepted() {
            upf.association_established(r.user_plane_ip_resource_information);
        } else {
            info!(upf.logger, "Association setup rejected with cause {:?}", r.cause);
            upf.association_lost();
        }
    }
}
