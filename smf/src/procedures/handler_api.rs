use crate::{Config, SessionRegistry, SmfNotification, UpfRegistry, UserPlaneTopology};
use anyhow::Result;
use async_trait::async_trait;
use pfcp::{NodeId, PfcpMessage};
use slog::Logger;
use std::net::IpAddr;
use std::time::SystemTime;

/// Trait representing the collection of services needed by SMF handlers.
#[async_trait]
pub trait HandlerApi: Send + Sync + Clone + 'static {
    fn config(&self) -> &Config;

    fn node_id(&self) -> &NodeId;
    fn fseid_addr(&self) -> IpAddr;
    fn recovery_time_stamp(&self) -> SystemTime;
    fn next_sequence_number(&self) -> u32;

    fn topology(&self) -> &UserPlaneTopology;
    fn upfs(&self) -> &UpfRegistry;
    fn sessions(&self) -> &SessionRegistry;

    async fn pfcp_send(&self, peer: &NodeId, message: PfcpMessage, logger: &Logger) -> Result<()>;
    async fn notify(&self, notification: SmfNotification, logger: &Logger);
}
