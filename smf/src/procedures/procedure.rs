use super::HandlerApi;
use crate::Upf;
use anyhow::Result;
use pfcp::PfcpMessage;
use slog::{Logger, debug};

/// What every procedure has: the SMF services and a logger for the entity it works on.
pub struct Procedure<'a, A: HandlerApi> {
    pub api: &'a A,
    pub logger: &'a Logger,
}

impl<'a, A: HandlerApi> Procedure<'a, A> {
    pub fn new(api: &'a A, logger: &'a Logger) -> Self {
        Procedure { api, logger }
    }

    pub fn log_message(&self, s: &str) {
        debug!(self.logger, "{}", s)
    }

    pub async fn send_to_upf(&self, upf: &Upf, message: PfcpMessage) -> Result<()> {
        debug!(self.logger, "<< {} to {}", message.name(), upf.name);
        self.api.pfcp_send(&upf.node_id, message, self.logger).await
    }
}

impl<A: HandlerApi> std::ops::Deref for Procedure<'_, A> {
    type Target = A;

    fn deref(&self) -> &Self::Target {
        self.api
    }
}
