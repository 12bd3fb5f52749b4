//! policy_application - turns session and PCC rules into data paths
use super::SessionProcedure;
use crate::{
    DataPath, Destination, HandlerApi, PccRule, SmContext, SmPolicyDecision, SmfError,
    SmfNotification, UpfSelectionParams, resolve_flow_description, uplink_flow_description,
};
use anyhow::Result;
use slog::{info, warn};
use std::collections::BTreeMap;

impl<A: HandlerApi> SessionProcedure<'_, A> {
    /// Merges `decision` into the session policy and brings the data paths in line with it.
    /// The default data path leads to the session anchor.  Each PCC rule gets a data path of its
    /// own, steered to the DNAI of its traffic control data if it has one.  Returns a notification
    /// for every PCC rule whose DNAI changed, to be sent once the UPFs have the new rules.
    pub(super) fn apply_policy(
        &self,
        ctx: &mut SmContext,
        decision: &SmPolicyDecision,
    ) -> Result<Vec<SmfNotification>> {
        let mut policy = ctx.policy.clone();
        policy.merge(decision);

        // PCC rules that need a new data path: those in the decision, and those whose traffic
        // control or QoS data the decision changed.
        let mut rebuilt = BTreeMap::new();
        for (id, rule) in policy.pcc_rules.iter() {
            if decision.pcc_rules.contains_key(id) || ctx.policy.references_changed(&policy, id) {
                let flow = resolve_flow_description(rule, &self.config().pfds)?;
                uplink_flow_description(&flow)?;
                let mut rule = rule.clone();
                rule.flow_description = Some(flow);
                rebuilt.insert(id.clone(), rule);
            }
        }

        let previous = std::mem::replace(&mut ctx.policy, policy);
        let mut dnai_changes = vec![];
        for id in rebuilt.keys() {
            dnai_changes.push((
                id.clone(),
                previous.dnai_of(id).map(str::to_string),
                ctx.policy.dnai_of(id).map(str::to_string),
            ));
        }

        if let Some(qos) = decision.selected_session_rule().map(|r| r.default_qos) {
            if let Some(path) = ctx.default_path_mut() {
                path.update_default_qos(&qos);
            }
        }

        for id in decision.removed_pcc_rules.iter() {
            if rebuilt.contains_key(id) {
                continue;
            }
            if let Some(path_id) = ctx.pcc_paths.remove(id) {
                info!(self.logger, "PCC rule {} removed", id);
                ctx.retire_data_path(path_id);
                dnai_changes.push((id.clone(), previous.dnai_of(id).map(str::to_string), None));
            }
        }
        for id in rebuilt.keys() {
            if let Some(old) = ctx.pcc_paths.remove(id) {
                ctx.retire_data_path(old);
            }
        }
        if ctx.anchors().len() < 2 {
            ctx.bp_manager.ulcl = None;
        }

        if ctx.default_path().is_none() {
            self.build_default_path(ctx)?;
        }
        let mut new_paths = BTreeMap::new();
        for (id, rule) in rebuilt {
            let path_id = self.build_pcc_path(ctx, &rule)?;
            ctx.pcc_paths.insert(id, path_id);
            new_paths.insert(path_id, rule);
        }
        self.activate_data_paths(ctx, &new_paths)?;

        Ok(dnai_changes
            .into_iter()
            .filter(|(_, source, target)| source != target)
            .map(|(pcc_rule_id, source_dnai, target_dnai)| {
                info!(
                    self.logger,
                    "PCC rule {} moves from DNAI {:?} to {:?}", pcc_rule_id, source_dnai, target_dnai
                );
                SmfNotification::UpPathChange {
                    reference: self.session.reference.clone(),
                    pcc_rule_id,
                    source_dnai,
                    target_dnai,
                }
            })
            .collect())
    }

    fn build_default_path(&self, ctx: &mut SmContext) -> Result<()> {
        let anchor = ctx
            .anchor
            .ok_or_else(|| SmfError::InvalidState("no anchor selected".to_string()))?;
        let params = UpfSelectionParams::new(ctx.snssai, &ctx.dnn);
        let nodes = self
            .topology()
            .select_path_to_specific_anchor(&params, anchor)?;
        let mut path = DataPath::build(ctx.allocate_path_id()?, &nodes, self.topology())?;
        path.is_default = true;
        ctx.data_paths.insert(path.id, path);
        Ok(())
    }

    fn build_pcc_path(&self, ctx: &mut SmContext, rule: &PccRule) -> Result<u32> {
        let route = ctx
            .policy
            .traffic_control_of(rule)
            .and_then(|tc| tc.route_to_location.clone());
        let params = UpfSelectionParams::new(ctx.snssai, &ctx.dnn);
        let nodes = match (&route, ctx.anchor) {
            (Some(route), _) => self.topology().select_path(&params.with_dnai(&route.dnai))?,
            (None, Some(anchor)) => self
                .topology()
                .select_path_to_specific_anchor(&params, anchor)?,
            (None, None) => self.topology().select_path(&params)?,
        };
        let mut path = DataPath::build(ctx.allocate_path_id()?, &nodes, self.topology())?;
        path.destination = route.map(|route| Destination {
            dnai: route.dnai,
            pcc_rule_id: rule.id.clone(),
        });
        let id = path.id;
        ctx.data_paths.insert(id, path);
        Ok(id)
    }

    /// Activates the data paths not yet activated, one at a time.  When a path brings in a new
    /// anchor, the branching point with the paths already active becomes the uplink classifier.
    fn activate_data_paths(&self, ctx: &mut SmContext, rules: &BTreeMap<u32, PccRule>) -> Result<()> {
        let tunnel = ctx.tunnel_context()?;
        while let Some(id) = ctx.bp_manager.select_next_anchor_candidate(&ctx.data_paths) {
            let anchor = ctx.data_paths.get(&id).and_then(|p| p.anchor_node()).map(|n| n.node);
            let anchors = ctx.anchors();
            if anchor.is_some_and(|a| !anchors.is_empty() && !anchors.contains(&a)) {
                match ctx.bp_manager.find_branching_point(&ctx.data_paths) {
                    Some(ulcl) => info!(
                        self.logger,
                        "Uplink classifier {}",
                        self.topology().node(ulcl).name
                    ),
                    None => warn!(self.logger, "No branching point for data path {}", id),
                }
            }

            let rule = rules.get(&id);
            let precedence = rule
                .map(|r| r.precedence)
                .unwrap_or(self.config().smf.default_precedence);
            let qos = rule.and_then(|r| ctx.policy.qos_of(r)).map(|q| q.descriptor());
            let route_profile = rule
                .and_then(|r| ctx.policy.traffic_control_of(r))
                .and_then(|tc| tc.route_to_location.as_ref())
                .and_then(|route| route.route_profile.clone());
            let Some(path) = ctx.data_paths.get_mut(&id) else {
                break;
            };

            path.activate(&tunnel, precedence, self.logger)?;
            if let Some(flow) = rule.and_then(|r| r.flow_description.as_deref()) {
                path.update_flow_description(&uplink_flow_description(flow)?, flow);
            }
            if let Some(profile) = route_profile {
                match self.config().route_profiles.get(&profile) {
                    Some(p) => path.add_forwarding_parameters(&p.forwarding_policy_id),
                    None => warn!(self.logger, "Unknown route profile {}", profile),
                }
            }
            if let Some(qos) = qos {
                path.add_qos(&qos)?;
            }
            info!(self.logger, "Data path {} {}", id, path);
            ctx.bp_manager.anchor_added();
        }
        Ok(())
    }
}
