//! session_registry - finds sessions by reference, by subscriber, and by local SEID
use super::{NodeIndex, PfcpSessionContext, SmContext, SmSession, Snssai, Upf, UserPlaneTopology};
use crate::SmfError;
use atomic_counter::{AtomicCounter, RelaxedCounter};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use slog::{Logger, debug, info};
use std::sync::Arc;
use uuid::Uuid;

pub struct SessionRegistry {
    by_reference: DashMap<String, Arc<SmSession>>,
    by_local_seid: DashMap<u64, Arc<SmSession>>,
    by_subscriber: DashMap<(String, u8), String>,
    seids: RelaxedCounter,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        SessionRegistry {
            by_reference: DashMap::new(),
            by_local_seid: DashMap::new(),
            by_subscriber: DashMap::new(),
            seids: RelaxedCounter::new(1),
        }
    }
}

impl SessionRegistry {
    pub fn new_session(
        &self,
        supi: &str,
        pdu_session_id: u8,
        snssai: Snssai,
        dnn: &str,
        logger: &Logger,
    ) -> Result<Arc<SmSession>, SmfError> {
        let entry = match self.by_subscriber.entry((supi.to_string(), pdu_session_id)) {
            Entry::Occupied(_) => {
                return Err(SmfError::InvalidState(format!(
                    "PDU session {pdu_session_id} of {supi} already exists"
                )));
            }
            Entry::Vacant(entry) => entry,
        };
        let reference = Uuid::new_v4().urn().to_string();
        let session = Arc::new(SmSession::new(
            reference.clone(),
            supi,
            pdu_session_id,
            snssai,
            dnn,
            logger,
        ));
        self.by_reference.insert(reference.clone(), session.clone());
        entry.insert(reference);
        info!(session.logger, "New session {}", session.reference);
        Ok(session)
    }

    pub fn get(&self, reference: &str) -> Option<Arc<SmSession>> {
        self.by_reference.get(reference).map(|s| s.value().clone())
    }

    pub fn get_by_subscriber(&self, supi: &str, pdu_session_id: u8) -> Option<Arc<SmSession>> {
        let reference = self
            .by_subscriber
            .get(&(supi.to_string(), pdu_session_id))?
            .value()
            .clone();
        self.get(&reference)
    }

    pub fn get_by_local_seid(&self, seid: u64) -> Option<Arc<SmSession>> {
        self.by_local_seid.get(&seid).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }

    /// Returns the local SEID of the session's PFCP session on `node`, creating the correlation
    /// entry on first contact.
    pub fn allocate_correlation(
        &self,
        session: &Arc<SmSession>,
        node: NodeIndex,
        upf: &Arc<Upf>,
    ) -> u64 {
        if let Some(existing) = session.correlation(node) {
            return existing.local_seid;
        }
        let local_seid = self.seids.inc() as u64;
        self.by_local_seid.insert(local_seid, session.clone());
        let in_use = session.insert_correlation(PfcpSessionContext {
            node,
            upf: upf.clone(),
            local_seid,
            remote_seid: None,
        });
        if in_use != local_seid {
            self.by_local_seid.remove(&local_seid);
        }
        debug!(session.logger, "Local SEID {} for {}", in_use, upf.name);
        in_use
    }

    /// Forgets the session and gives back its UE address.  Returns false if it was already gone.
    pub fn remove_session(
        &self,
        session: &SmSession,
        context: &mut SmContext,
        topology: &UserPlaneTopology,
    ) -> bool {
        if self.by_reference.remove(&session.reference).is_none() {
            return false;
        }
        self.by_subscriber
            .remove(&(session.supi.clone(), session.pdu_session_id));
        for seid in session.clear_correlations() {
            self.by_local_seid.remove(&seid);
        }
        if let (Some(addr), Some(anchor)) = (context.pdu_address.take(), context.anchor) {
            topology.release_ue_ip(anchor, &addr, context.static_address);
        }
        info!(session.logger, "Removed session {}", session.reference);
        true
    }
}
