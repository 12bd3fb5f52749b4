use crate::procedures::{
    AssociationSetupProcedure, PfcpHandler, SessionCreateProcedure, SessionModifyProcedure,
    SessionProcedure, SessionReleaseProcedure,
};
use crate::{
    Config, CreateSessionRequest, CreateSessionResponse, HandlerApi, NodeIndex, SessionDelta, SessionInfo,
    SessionRegistry, SmPolicyDecision, SmSession, SmfError, SmfNotification, Upf, UpfRegistry,
    UserPlaneTopology, resolve_fqdn,
};
use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use atomic_counter::{AtomicCounter, RelaxedCounter};
use pfcp::{NodeId, PfcpMessage};
use slog::{Logger, info, warn};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::SystemTime;

/// Outbound PFCP.  The transport owns the wire encoding and the addressing of the UPFs.
#[async_trait]
pub trait PfcpTransport: Send + Sync + 'static {
    async fn send(&self, peer: &NodeId, message: PfcpMessage, logger: &Logger) -> Result<()>;
}

/// Something that happened outside the SMF.  Each event is handled on a task of its own.
#[derive(Debug)]
pub enum SmfEvent {
    Pfcp {
        peer: NodeId,
        message: PfcpMessage,
    },
    PolicyUpdateNotify {
        reference: String,
        decision: SmPolicyDecision,
    },
    SessionInfoQuery {
        reference: String,
        reply: Sender<Option<SessionInfo>>,
    },
}

#[derive(Clone)]
pub struct Smf {
    config: Arc<Config>,
    node_id: NodeId,
    fseid_addr: IpAddr,
    recovery_time_stamp: SystemTime,
    topology: Arc<UserPlaneTopology>,
    upfs: Arc<UpfRegistry>,
    sessions: Arc<SessionRegistry>,
    transport: Arc<dyn PfcpTransport>,
    notification_sender: Sender<SmfNotification>,
    notification_receiver: Receiver<SmfNotification>,
    sequence_numbers: Arc<RelaxedCounter>,
    logger: Logger,
}

impl Smf {
    /// Builds the SMF and starts association setup with every configured UPF.
    pub async fn start(
        config: Config,
        transport: Arc<dyn PfcpTransport>,
        logger: Logger,
    ) -> Result<Self> {
        let smf = Self::new(config, transport, logger)?;
        AssociationSetupProcedure::new(&smf, &smf.logger).run().await;
        Ok(smf)
    }

    fn new(config: Config, transport: Arc<dyn PfcpTransport>, logger: Logger) -> Result<Self> {
        let node_id: NodeId = config
            .smf
            .node_id
            .parse()
            .context("Bad SMF node ID")?;
        let fseid_addr = match &node_id {
            NodeId::Fqdn(fqdn) => resolve_fqdn(fqdn)
                .ok_or_else(|| SmfError::Config(format!("cannot resolve {fqdn}")))?,
            other => other
                .ip_addr()
                .ok_or_else(|| SmfError::Config(format!("no address in {other}")))?,
        };
        let upfs = UpfRegistry::default();
        let topology = UserPlaneTopology::build_from_config(&config.user_plane, &upfs, &logger)?;
        let (notification_sender, notification_receiver) = async_channel::unbounded();
        info!(logger, "SMF {} with {} UPFs", node_id, upfs.len());
        Ok(Smf {
            config: Arc::new(config),
            node_id,
            fseid_addr,
            recovery_time_stamp: SystemTime::now(),
            topology: Arc::new(topology),
            upfs: Arc::new(upfs),
            sessions: Arc::new(SessionRegistry::default()),
            transport,
            notification_sender,
            notification_receiver,
            sequence_numbers: Arc::new(RelaxedCounter::new(1)),
            logger,
        })
    }

    /// Notifications for the access layer, such as downlink data arriving for an idle session.
    pub fn notifications(&self) -> Receiver<SmfNotification> {
        self.notification_receiver.clone()
    }

    pub async fn create_session(&self, request: CreateSessionRequest) -> Result<CreateSessionResponse> {
        let session = self.sessions.new_session(
            &request.supi,
            request.pdu_session_id,
            request.snssai,
            &request.dnn,
            &self.logger,
        )?;
        let mut ctx = session.lock().await;
        SessionCreateProcedure::new(SessionProcedure::new(self, &session))
            .run(&mut ctx, &request)
            .await
    }

    pub async fn modify_session(&self, reference: &str, delta: SessionDelta) -> Result<()> {
        let session = self.session(reference)?;
        let mut ctx = session.lock().await;
        SessionModifyProcedure::new(SessionProcedure::new(self, &session))
            .run(&mut ctx, delta)
            .await
    }

    pub async fn release_session(&self, reference: &str) -> Result<()> {
        let session = self.session(reference)?;
        let mut ctx = session.lock().await;
        SessionReleaseProcedure::new(SessionProcedure::new(self, &session))
            .run(&mut ctx)
            .await
    }

    fn session(&self, reference: &str) -> Result<Arc<SmSession>, SmfError> {
        self.sessions
            .get(reference)
            .ok_or_else(|| SmfError::SessionNotFound(reference.to_string()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Reference of a subscriber's PDU session.
    pub fn find_session(&self, supi: &str, pdu_session_id: u8) -> Option<String> {
        self.sessions
            .get_by_subscriber(supi, pdu_session_id)
            .map(|s| s.reference.clone())
    }

    pub async fn session_info(&self, reference: &str) -> Option<SessionInfo> {
        let session = self.sessions.get(reference)?;
        let ctx = session.lock().await;
        let name = |idx: NodeIndex| self.topology.node(idx).name.clone();
        Some(SessionInfo {
            supi: session.supi.clone(),
            pdu_session_id: session.pdu_session_id,
            state: session.state(),
            pdu_address: ctx.pdu_address,
            anchor: ctx.anchor.map(name),
            ulcl: ctx.bp_manager.ulcl.map(name),
            data_paths: ctx.data_paths.values().map(|p| p.node_names()).collect(),
        })
    }

    pub fn upf(&self, name: &str) -> Option<Arc<Upf>> {
        self.topology
            .find(name)
            .and_then(|idx| self.topology.upf(idx))
            .cloned()
    }

    pub fn handle_event(&self, event: SmfEvent) {
        let smf = self.clone();
        async_std::task::spawn(async move { smf.dispatch_event(event).await });
    }

    async fn dispatch_event(&self, event: SmfEvent) {
        match event {
            SmfEvent::Pfcp { peer, message } => {
                PfcpHandler::new(self.clone())
                    .handle(&peer, message, &self.logger)
                    .await
            }
            SmfEvent::PolicyUpdateNotify {
                reference,
                decision,
            } => {
                let delta = SessionDelta::PolicyUpdate(decision);
                if let Err(e) = self.modify_session(&reference, delta).await {
                    warn!(self.logger, "Policy update of {} failed - {}", reference, e);
                }
            }
            SmfEvent::SessionInfoQuery { reference, reply } => {
                let info = self.session_info(&reference).await;
                if reply.send(info).await.is_err() {
                    warn!(self.logger, "Session query for {} abandoned", reference);
                }
            }
        }
    }
}

#[async_trait]
impl HandlerApi for Smf {
    fn config(&self) -> &Config {
        &self.config
    }

    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn fseid_addr(&self) -> IpAddr {
        self.fseid_addr
    }

    fn recovery_time_stamp(&self) -> SystemTime {
        self.recovery_time_stamp
    }

    // PFCP sequence numbers are 24 bits.
    fn next_sequence_number(&self) -> u32 {
        (self.sequence_numbers.inc() & 0xff_ffff) as u32
    }

    fn topology(&self) -> &UserPlaneTopology {
        &self.topology
    }

    fn upfs(&self) -> &UpfRegistry {
        &self.upfs
    }

    fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    async fn pfcp_send(&self, peer: &NodeId, message: PfcpMessage, logger: &Logger) -> Result<()> {
        self.transport.send(peer, message, logger).await
    }

    async fn notify(&self, notification: SmfNotification, logger: &Logger) {
        info!(logger, "Notify {:?}", notification);
        if let Err(e) = self.notification_sender.send(notification).await {
            warn!(logger, "Failed to deliver notification - {}", e);
        }
    }
}
