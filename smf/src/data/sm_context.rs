//! sm_context - a PDU session: its lifecycle state, its data paths, and the PFCP sessions that
//! install them on the UPFs
use super::{
    AnTunnel, BpManager, DataPath, IdGenerator, NodeIndex, SmPolicyDecision, Snssai,
    TunnelContext, Upf,
};
use crate::SmfError;
use async_channel::{Receiver, Sender};
use async_std::sync::{Mutex, MutexGuard};
use slog::{Logger, info, o, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmContextState {
    InActive,
    ActivePending,
    Active,
    InActivePending,
    ModificationPending,
    PfcpModification,
}

/// Outcome of a PFCP exchange, delivered to the procedure waiting for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolOutcome {
    SessionUpdateSuccess,
    SessionUpdateFailed,
    SessionReleaseSuccess,
    SessionReleaseFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Update,
    Release,
}

impl PendingKind {
    pub fn outcome(self, accepted: bool) -> ProtocolOutcome {
        match (self, accepted) {
            (PendingKind::Update, true) => ProtocolOutcome::SessionUpdateSuccess,
            (PendingKind::Update, false) => ProtocolOutcome::SessionUpdateFailed,
            (PendingKind::Release, true) => ProtocolOutcome::SessionReleaseSuccess,
            (PendingKind::Release, false) => ProtocolOutcome::SessionReleaseFailed,
        }
    }
}

/// The PFCP session of this PDU session on one UPF.
#[derive(Debug, Clone)]
pub struct PfcpSessionContext {
    pub node: NodeIndex,
    pub upf: Arc<Upf>,
    pub local_seid: u64,
    pub remote_seid: Option<u64>,
}

#[derive(Default)]
struct Correlation {
    contexts: BTreeMap<NodeIndex, PfcpSessionContext>,
    pending: BTreeSet<NodeIndex>,
    pending_kind: Option<PendingKind>,
}

/// The mutable part of a session, only touched with the session lock held.
pub struct SmContext {
    pub snssai: Snssai,
    pub dnn: String,
    pub anchor: Option<NodeIndex>,
    pub pdu_address: Option<Ipv4Addr>,
    pub static_address: bool,
    pub an_tunnel: Option<AnTunnel>,
    pub up_cnx_deactivated: bool,
    pub data_paths: BTreeMap<u32, DataPath>,
    // Paths whose rules are marked for removal, kept until the UPFs confirm.
    pub to_be_removed: Vec<DataPath>,
    // Data path of each PCC rule.
    pub pcc_paths: BTreeMap<String, u32>,
    pub policy: SmPolicyDecision,
    pub bp_manager: BpManager,
    path_ids: IdGenerator,
}

impl SmContext {
    pub fn new(snssai: Snssai, dnn: &str) -> Self {
        SmContext {
            snssai,
            dnn: dnn.to_string(),
            anchor: None,
            pdu_address: None,
            static_address: false,
            an_tunnel: None,
            up_cnx_deactivated: false,
            data_paths: BTreeMap::new(),
            to_be_removed: vec![],
            pcc_paths: BTreeMap::new(),
            policy: SmPolicyDecision::default(),
            bp_manager: BpManager::default(),
            path_ids: IdGenerator::new("data path", 1, 2147483647),
        }
    }

    pub fn allocate_path_id(&self) -> Result<u32, SmfError> {
        Ok(self.path_ids.allocate()? as u32)
    }

    pub fn default_path(&self) -> Option<&DataPath> {
        self.data_paths.values().find(|p| p.is_default)
    }

    pub fn default_path_mut(&mut self) -> Option<&mut DataPath> {
        self.data_paths.values_mut().find(|p| p.is_default)
    }

    /// Marks the rules of a data path for removal.  The path is dropped once the UPFs confirm.
    pub fn retire_data_path(&mut self, id: u32) {
        if let Some(mut path) = self.data_paths.remove(&id) {
            path.deactivate();
            self.to_be_removed.push(path);
        }
    }

    /// Everything a data path needs to know about this session to activate.
    pub fn tunnel_context(&self) -> Result<TunnelContext, SmfError> {
        let ue_ip = self
            .pdu_address
            .ok_or_else(|| SmfError::InvalidState("no UE address".to_string()))?;
        Ok(TunnelContext {
            dnn: self.dnn.clone(),
            ue_ip,
            an_tunnel: self.an_tunnel,
            default_qos: self
                .policy
                .selected_session_rule()
                .map(|rule| rule.default_qos),
        })
    }

    /// Anchors of the activated data paths.
    pub fn anchors(&self) -> BTreeSet<NodeIndex> {
        self.data_paths
            .values()
            .filter(|p| p.activated)
            .filter_map(|p| p.anchor_node().map(|n| n.node))
            .collect()
    }

    pub fn all_paths(&self) -> impl Iterator<Item = &DataPath> {
        self.data_paths.values().chain(self.to_be_removed.iter())
    }

    /// Records that the UPFs installed every pending change.
    pub fn commit(&mut self, logger: &Logger) {
        for path in self.data_paths.values_mut() {
            path.commit();
        }
        for mut path in self.to_be_removed.drain(..) {
            path.release_removed_rules(logger);
            self.path_ids.free(path.id as u64);
        }
    }

    /// Gives back the rules of every data path, after the PFCP sessions have been deleted.
    pub fn release_all(&mut self, logger: &Logger) {
        let ids: Vec<u32> = self.data_paths.keys().copied().collect();
        for id in ids {
            self.retire_data_path(id);
        }
        self.pcc_paths.clear();
        self.commit(logger);
    }
}

/// A PDU session.  The lifecycle state and PFCP correlation can be read at any time; the
/// `SmContext` is behind a lock held for the whole of a procedure.
pub struct SmSession {
    pub reference: String,
    pub supi: String,
    pub pdu_session_id: u8,
    pub logger: Logger,
    state: parking_lot::Mutex<SmContextState>,
    context: Mutex<SmContext>,
    correlation: parking_lot::Mutex<Correlation>,
    outcome_sender: Sender<ProtocolOutcome>,
    outcome_receiver: Receiver<ProtocolOutcome>,
}

impl SmSession {
    pub fn new(
        reference: String,
        supi: &str,
        pdu_session_id: u8,
        snssai: Snssai,
        dnn: &str,
        logger: &Logger,
    ) -> Self {
        let (outcome_sender, outcome_receiver) = async_channel::bounded(1);
        SmSession {
            logger: logger.new(o!("supi" => supi.to_string(), "pdu_session_id" => pdu_session_id)),
            reference,
            supi: supi.to_string(),
            pdu_session_id,
            state: parking_lot::Mutex::new(SmContextState::InActive),
            context: Mutex::new(SmContext::new(snssai, dnn)),
            correlation: parking_lot::Mutex::new(Correlation::default()),
            outcome_sender,
            outcome_receiver,
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, SmContext> {
        self.context.lock().await
    }

    pub fn state(&self) -> SmContextState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: SmContextState) {
        let old = std::mem::replace(&mut *self.state.lock(), state);
        if old != state {
            info!(self.logger, "State {:?} -> {:?}", old, state);
        }
    }

    /// Moves to `to` if the current state is one of `from`.
    pub fn transition(&self, from: &[SmContextState], to: SmContextState) -> Result<(), SmfError> {
        let current = self.state();
        if !from.contains(&current) {
            return Err(SmfError::InvalidState(format!("{current:?}")));
        }
        self.set_state(to);
        Ok(())
    }

    pub fn correlation(&self, node: NodeIndex) -> Option<PfcpSessionContext> {
        self.correlation.lock().contexts.get(&node).cloned()
    }

    pub fn correlations(&self) -> Vec<PfcpSessionContext> {
        self.correlation.lock().contexts.values().cloned().collect()
    }

    /// Stores a correlation entry, unless the node already has one.  Returns the local SEID in
    /// use for the node.
    pub fn insert_correlation(&self, context: PfcpSessionContext) -> u64 {
        self.correlation
            .lock()
            .contexts
            .entry(context.node)
            .or_insert(context)
            .local_seid
    }

    /// Forgets every correlation entry, returning their local SEIDs.
    pub fn clear_correlations(&self) -> Vec<u64> {
        let mut correlation = self.correlation.lock();
        correlation.pending.clear();
        correlation.pending_kind = None;
        std::mem::take(&mut correlation.contexts)
            .into_values()
            .map(|c| c.local_seid)
            .collect()
    }

    /// Starts waiting for responses from `nodes`.  Outcomes left over from an earlier exchange are
    /// discarded.
    pub fn start_pending(&self, nodes: BTreeSet<NodeIndex>, kind: PendingKind) {
        self.drain_stale_outcomes();
        let mut correlation = self.correlation.lock();
        correlation.pending = nodes;
        correlation.pending_kind = Some(kind);
    }

    pub fn drain_stale_outcomes(&self) {
        while let Ok(outcome) = self.outcome_receiver.try_recv() {
            warn!(self.logger, "Discarding stale outcome {:?}", outcome);
        }
    }

    /// Processes the response of the UPF with PFCP session `local_seid`.  Signals the outcome once
    /// all UPFs have accepted, or as soon as one rejects.
    pub fn response_received(&self, local_seid: u64, accepted: bool, remote_seid: Option<u64>) {
        let outcome = {
            let mut correlation = self.correlation.lock();
            let Some(context) = correlation
                .contexts
                .values_mut()
                .find(|c| c.local_seid == local_seid)
            else {
                warn!(self.logger, "No PFCP session with local SEID {local_seid}");
                return;
            };
            if let Some(remote_seid) = remote_seid {
                context.remote_seid = Some(remote_seid);
            }
            let node = context.node;
            let upf_name = context.upf.name.clone();
            if !correlation.pending.remove(&node) {
                warn!(self.logger, "Late or unexpected response from {upf_name}");
                return;
            }
            let Some(kind) = correlation.pending_kind else {
                return;
            };
            if !accepted {
                warn!(self.logger, "{upf_name} rejected the request");
                correlation.pending.clear();
                correlation.pending_kind = None;
                Some(kind.outcome(false))
            } else if correlation.pending.is_empty() {
                correlation.pending_kind = None;
                Some(kind.outcome(true))
            } else {
                None
            }
        };
        if let Some(outcome) = outcome {
            self.signal_protocol_outcome(outcome);
        }
    }

    /// Waits for the outcome of the current PFCP exchange.  Gives `SessionUpdateFailed` if none
    /// arrives within `timeout`.
    pub async fn await_protocol_outcome(&self, timeout: Duration) -> ProtocolOutcome {
        match async_std::future::timeout(timeout, self.outcome_receiver.recv()).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => ProtocolOutcome::SessionUpdateFailed,
            Err(_) => {
                warn!(self.logger, "No PFCP outcome within {:?}", timeout);
                let mut correlation = self.correlation.lock();
                correlation.pending.clear();
                correlation.pending_kind = None;
                ProtocolOutcome::SessionUpdateFailed
            }
        }
    }

    pub fn signal_protocol_outcome(&self, outcome: ProtocolOutcome) {
        if let Err(e) = self.outcome_sender.try_send(outcome) {
            warn!(self.logger, "Dropped outcome {:?} - {}", outcome, e);
        }
    }
}
