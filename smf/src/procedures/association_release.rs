//! association_release - a UPF leaving our control
use crate::protocols::n4::build;
use crate::{HandlerApi, Procedure};
use anyhow::{Result, bail};
use derive_deref::{Deref, DerefMut};
use pfcp::{AssociationReleaseRequest, NodeId};
use slog::{Logger, info};

#[derive(Deref, DerefMut)]
pub struct AssociationReleaseProcedure<'a, A: HandlerApi>(Procedure<'a, A>);

impl<'a, A: HandlerApi> AssociationReleaseProcedure<'a, A> {
    pub fn new(api: &'a A, logger: &'a Logger) -> Self {
        AssociationReleaseProcedure(Procedure::new(api, logger))
    }

    // Association release
    // 1.    >> AssociationReleaseRequest
    // 2.    << AssociationReleaseResponse
    pub async fn run(
        &self,
        peer: &NodeId,
        sequence_number: u32,
        r: AssociationReleaseRequest,
    ) -> Result<()> {
        self.log_message(">> AssociationReleaseRequest");
        let Some(upf) = self.upfs().remove(&r.node_id) else {
            bail!("Association release for unknown node {}", r.node_id);
        };
        self.topology().invalidate_path_cache();
        info!(upf.logger, "Association released by {}", peer);
        let response = build::association_release_response(self.node_id(), sequence_number);
        self.send_to_upf(&upf, response).await
    }
}
