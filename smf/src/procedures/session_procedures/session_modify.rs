use super::SessionProcedure;
use crate::{HandlerApi, SessionDelta, SmContext, SmContextState};
use anyhow::Result;
use derive_deref::{Deref, DerefMut};
use slog::{info, warn};

#[derive(Deref, DerefMut)]
pub struct SessionModifyProcedure<'a, A: HandlerApi>(SessionProcedure<'a, A>);

impl<'a, A: HandlerApi> SessionModifyProcedure<'a, A> {
    pub fn new(session_procedure: SessionProcedure<'a, A>) -> Self {
        SessionModifyProcedure(session_procedure)
    }

    // Session modify
    // 1.    Apply the change to the data paths
    // 2, 3. << SessionModificationRequest / >> SessionModificationResponse (each UPF with changes)
    pub async fn run(&self, ctx: &mut SmContext, delta: SessionDelta) -> Result<()> {
        self.session.transition(
            &[SmContextState::Active],
            SmContextState::ModificationPending,
        )?;
        let result = self.modify(ctx, delta).await;
        self.session.set_state(SmContextState::Active);
        if let Err(e) = &result {
            warn!(self.logger, "Session modification failed - {e}");
        }
        result
    }

    async fn modify(&self, ctx: &mut SmContext, delta: SessionDelta) -> Result<()> {
        let notifications = match delta {
            SessionDelta::AnTunnelSetup(an_tunnel) => {
                info!(
                    self.logger,
                    "Access tunnel {}/{:#x}", an_tunnel.ipv4_addr, an_tunnel.teid
                );
                ctx.an_tunnel = Some(an_tunnel);
                ctx.up_cnx_deactivated = false;
                for path in ctx.data_paths.values_mut() {
                    path.set_an_tunnel(an_tunnel);
                }
                vec![]
            }
            SessionDelta::Deactivate => {
                info!(self.logger, "User plane connection deactivated");
                ctx.up_cnx_deactivated = true;
                for path in ctx.data_paths.values_mut() {
                    path.buffer_downlink()?;
                }
                vec![]
            }
            SessionDelta::PolicyUpdate(decision) => self.apply_policy(ctx, &decision)?,
        };
        self.session.set_state(SmContextState::PfcpModification);
        self.install_rules(ctx).await?;
        self.notify_all(notifications).await;
        Ok(())
    }
}
