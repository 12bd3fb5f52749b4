use super::SessionProcedure;
use crate::{HandlerApi, SmContext, SmContextState};
use anyhow::Result;
use derive_deref::{Deref, DerefMut};
use slog::warn;

#[derive(Deref, DerefMut)]
pub struct SessionReleaseProcedure<'a, A: HandlerApi>(SessionProcedure<'a, A>);

impl<'a, A: HandlerApi> SessionReleaseProcedure<'a, A> {
    pub fn new(session_procedure: SessionProcedure<'a, A>) -> Self {
        SessionReleaseProcedure(session_procedure)
    }

    // Session release
    // 1, 2. << SessionDeletionRequest / >> SessionDeletionResponse (each UPF with a PFCP session)
    // 3.    Release the rules and the UE address
    pub async fn run(&self, ctx: &mut SmContext) -> Result<()> {
        self.session
            .transition(&[SmContextState::Active], SmContextState::InActivePending)?;
        if let Err(e) = self.delete_pfcp_sessions().await {
            warn!(self.logger, "Session release failed - {e}");
            self.session.set_state(SmContextState::Active);
            return Err(e);
        }
        ctx.release_all(self.logger);
        self.sessions()
            .remove_session(self.session, ctx, self.topology());
        self.session.set_state(SmContextState::InActive);
        Ok(())
    }
}
