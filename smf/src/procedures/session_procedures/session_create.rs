use super::SessionProcedure;
use crate::{
    CreateSessionRequest, CreateSessionResponse, HandlerApi, SmContext, SmContextState,
    UpfSelectionParams,
};
use anyhow::Result;
use derive_deref::{Deref, DerefMut};
use slog::{info, warn};

#[derive(Deref, DerefMut)]
pub struct SessionCreateProcedure<'a, A: HandlerApi>(SessionProcedure<'a, A>);

impl<'a, A: HandlerApi> SessionCreateProcedure<'a, A> {
    pub fn new(session_procedure: SessionProcedure<'a, A>) -> Self {
        SessionCreateProcedure(session_procedure)
    }

    // Session create
    // 1.    Select the anchor UPF and allocate the UE address from its pools
    // 2.    Build and activate the default and PCC data paths
    // 3, 4. << SessionEstablishmentRequest / >> SessionEstablishmentResponse (each UPF on the paths)
    pub async fn run(
        &self,
        ctx: &mut SmContext,
        request: &CreateSessionRequest,
    ) -> Result<CreateSessionResponse> {
        self.session
            .transition(&[SmContextState::InActive], SmContextState::ActivePending)?;
        match self.establish(ctx, request).await {
            Ok(response) => {
                self.session.set_state(SmContextState::Active);
                Ok(response)
            }
            Err(e) => {
                warn!(self.logger, "Session establishment failed - {e}");
                self.abandon_pfcp_sessions().await;
                ctx.release_all(self.logger);
                self.sessions()
                    .remove_session(self.session, ctx, self.topology());
                self.session.set_state(SmContextState::InActive);
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        ctx: &mut SmContext,
        request: &CreateSessionRequest,
    ) -> Result<CreateSessionResponse> {
        let mut params = UpfSelectionParams::new(request.snssai, &request.dnn);
        if let Some(address) = request.requested_address {
            params = params.with_pdu_address(address);
        }
        let (anchor, pdu_address, is_static) =
            self.topology().select_upf_and_allocate_ue_ip(&params)?;
        ctx.anchor = Some(anchor);
        ctx.pdu_address = Some(pdu_address);
        ctx.static_address = is_static;
        let anchor_name = self.topology().node(anchor).name.clone();
        info!(self.logger, "UE address {} from {}", pdu_address, anchor_name);

        let notifications = self.apply_policy(ctx, &request.policy)?;
        self.install_rules(ctx).await?;
        self.notify_all(notifications).await;

        Ok(CreateSessionResponse {
            reference: self.session.reference.clone(),
            pdu_address,
            anchor: anchor_name,
        })
    }
}
