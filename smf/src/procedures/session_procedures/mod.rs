mod policy_application;
mod session_create;
mod session_modify;
mod session_release;

pub use session_create::SessionCreateProcedure;
pub use session_modify::SessionModifyProcedure;
pub use session_release::SessionReleaseProcedure;

use super::Procedure;
use crate::protocols::n4::build;
use crate::{
    HandlerApi, NodeIndex, PendingKind, ProtocolOutcome, SmContext, SmSession, SmfError,
    SmfNotification, Upf,
};
use anyhow::Result;
use pfcp::{PfcpMessage, RuleChanges};
use slog::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct SessionProcedure<'a, A: HandlerApi> {
    base: Procedure<'a, A>,
    session: &'a Arc<SmSession>,
}

impl<'a, A: HandlerApi> std::ops::Deref for SessionProcedure<'a, A> {
    type Target = Procedure<'a, A>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<'a, A: HandlerApi> SessionProcedure<'a, A> {
    pub fn new(api: &'a A, session: &'a Arc<SmSession>) -> Self {
        SessionProcedure {
            base: Procedure::new(api, &session.logger),
            session,
        }
    }

    /// Sends the pending rule changes of every data path to the UPFs they concern and waits for
    /// all of them to answer.  The changes are committed once every UPF has accepted.
    async fn install_rules(&self, ctx: &mut SmContext) -> Result<()> {
        let mut per_node: BTreeMap<NodeIndex, RuleChanges> = BTreeMap::new();
        for path in ctx.all_paths() {
            for node in path.iter() {
                node.collect_changes(per_node.entry(node.node).or_default());
            }
        }

        let mut requests = vec![];
        for (node, changes) in per_node {
            if changes.is_empty() {
                continue;
            }
            let Some(upf) = self.topology().upf(node) else {
                continue;
            };
            self.sessions().allocate_correlation(self.session, node, upf);
            let Some(context) = self.session.correlation(node) else {
                continue;
            };
            if context.remote_seid.is_none() && changes.create_pdrs.is_empty() {
                // Rules that never reached this UPF.
                debug!(self.logger, "Nothing to establish on {}", upf.name);
                continue;
            }
            let message = build::session_request(
                &context,
                self.node_id(),
                self.fseid_addr(),
                changes,
                self.next_sequence_number(),
            );
            requests.push((node, upf.clone(), message));
        }

        match self.exchange(requests, PendingKind::Update).await? {
            Exchanged::Outcome(ProtocolOutcome::SessionUpdateSuccess) => {
                ctx.commit(self.logger);
                Ok(())
            }
            other => Err(other.into_error()),
        }
    }

    async fn notify_all(&self, notifications: Vec<SmfNotification>) {
        for notification in notifications {
            self.notify(notification, self.logger).await;
        }
    }

    /// Deletes the PFCP session on every UPF that established one.
    async fn delete_pfcp_sessions(&self) -> Result<()> {
        let requests = self
            .session
            .correlations()
            .into_iter()
            .filter_map(|context| {
                let remote_seid = context.remote_seid?;
                let message =
                    build::session_deletion_request(remote_seid, self.next_sequence_number());
                Some((context.node, context.upf, message))
            })
            .collect();
        match self.exchange(requests, PendingKind::Release).await? {
            Exchanged::Outcome(ProtocolOutcome::SessionReleaseSuccess) => Ok(()),
            other => Err(other.into_error()),
        }
    }

    /// Deletes the PFCP sessions without waiting for the UPFs to answer.
    async fn abandon_pfcp_sessions(&self) {
        for context in self.session.correlations() {
            let Some(remote_seid) = context.remote_seid else {
                continue;
            };
            let message = build::session_deletion_request(remote_seid, self.next_sequence_number());
            if let Err(e) = self.send_to_upf(&context.upf, message).await {
                debug!(self.logger, "Failed to delete PFCP session on {} - {e}", context.upf.name);
            }
        }
    }

    async fn exchange(
        &self,
        requests: Vec<(NodeIndex, Arc<Upf>, PfcpMessage)>,
        kind: PendingKind,
    ) -> Result<Exchanged> {
        if requests.is_empty() {
            return Ok(Exchanged::Outcome(kind.outcome(true)));
        }
        let pending: BTreeSet<NodeIndex> = requests.iter().map(|(node, _, _)| *node).collect();
        self.session.start_pending(pending, kind);
        for (_, upf, message) in requests {
            self.send_to_upf(&upf, message).await?;
        }

        let timeout = self.config().smf.pfcp_response_timeout();
        let started = Instant::now();
        let outcome = self.session.await_protocol_outcome(timeout).await;
        if outcome == kind.outcome(true) {
            return Ok(Exchanged::Outcome(outcome));
        }
        Ok(match started.elapsed() >= timeout {
            true => Exchanged::TimedOut(timeout),
            false => Exchanged::Outcome(outcome),
        })
    }
}

/// How a PFCP exchange ended.
#[derive(Debug, PartialEq, Eq)]
enum Exchanged {
    Outcome(ProtocolOutcome),
    TimedOut(Duration),
}

impl Exchanged {
    fn into_error(self) -> anyhow::Error {
        match self {
            Exchanged::TimedOut(timeout) => SmfError::ProtocolTimeout(timeout).into(),
            Exchanged::Outcome(outcome) => SmfError::Rejected(format!("{outcome:?}")).into(),
        }
    }
}
