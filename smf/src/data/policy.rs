//! policy - the session management policy decisions that shape a session's data paths
use super::{DefaultQos, PfdConfig, QosDescriptor};
use crate::SmfError;
use pfcp::Bitrate;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRule {
    pub id: String,
    pub default_qos: DefaultQos,
}

/// A policy and charging control rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PccRule {
    pub id: String,
    pub precedence: u32,

    // IPFilterRule describing the downlink traffic, e.g. "permit out ip from 1.2.3.4 to 10.60.0.1".
    pub flow_description: Option<String>,

    // Application whose packet flow descriptions apply when there is no flow description.
    pub app_id: Option<String>,

    // References into the traffic control and QoS data of the decision.
    pub traffic_control: Option<String>,
    pub qos_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteToLocation {
    pub dnai: String,
    pub route_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficControlData {
    pub id: String,
    pub route_to_location: Option<RouteToLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QosData {
    pub id: String,
    pub qfi: u8,
    pub mbr: Option<Bitrate>,
    pub gbr: Option<Bitrate>,
}

impl QosData {
    pub fn descriptor(&self) -> QosDescriptor {
        QosDescriptor {
            qfi: self.qfi,
            mbr: self.mbr,
            gbr: self.gbr,
        }
    }
}

/// A policy decision, either complete (at session creation) or an update to an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmPolicyDecision {
    pub session_rules: BTreeMap<String, SessionRule>,
    pub pcc_rules: BTreeMap<String, PccRule>,
    pub removed_pcc_rules: Vec<String>,
    pub traffic_control: HashMap<String, TrafficControlData>,
    pub qos_data: HashMap<String, QosData>,
}

impl SmPolicyDecision {
    /// The session rule that supplies the default QoS - the first by ID.
    pub fn selected_session_rule(&self) -> Option<&SessionRule> {
        self.session_rules.values().next()
    }

    pub fn traffic_control_of(&self, rule: &PccRule) -> Option<&TrafficControlData> {
        rule.traffic_control
            .as_ref()
            .and_then(|id| self.traffic_control.get(id))
    }

    pub fn qos_of(&self, rule: &PccRule) -> Option<&QosData> {
        rule.qos_data.as_ref().and_then(|id| self.qos_data.get(id))
    }

    /// The DNAI that the PCC rule `id` steers its traffic to, if any.
    pub fn dnai_of(&self, id: &str) -> Option<&str> {
        let rule = self.pcc_rules.get(id)?;
        let route = self.traffic_control_of(rule)?.route_to_location.as_ref()?;
        Some(&route.dnai)
    }

    /// Whether the traffic control or QoS data that the PCC rule `id` refers to differs
    /// between `self` and `other`.
    pub fn references_changed(&self, other: &SmPolicyDecision, id: &str) -> bool {
        match (self.pcc_rules.get(id), other.pcc_rules.get(id)) {
            (Some(a), Some(b)) => {
                self.traffic_control_of(a) != other.traffic_control_of(b)
                    || self.qos_of(a) != other.qos_of(b)
            }
            _ => false,
        }
    }

    /// Folds an update into this decision.
    pub fn merge(&mut self, update: &SmPolicyDecision) {
        self.session_rules.extend(
            update
                .session_rules
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.traffic_control.extend(
            update
                .traffic_control
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.qos_data
            .extend(update.qos_data.iter().map(|(k, v)| (k.clone(), v.clone())));
        for id in update.removed_pcc_rules.iter() {
            self.pcc_rules.remove(id);
        }
        self.pcc_rules.extend(
            update
                .pcc_rules
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }
}

/// The downlink flow description of `rule`: its own, or else the first one configured for its
/// application.
pub fn resolve_flow_description(rule: &PccRule, pfds: &[PfdConfig]) -> Result<String, SmfError> {
    if let Some(flow) = rule.flow_description.as_deref().filter(|f| !f.is_empty()) {
        return Ok(flow.to_string());
    }
    let Some(app_id) = rule.app_id.as_deref() else {
        return Err(SmfError::InvalidPolicy(format!(
            "PCC rule {} has no flow description and no application ID",
            rule.id
        )));
    };
    pfds.iter()
        .find(|pfd| pfd.app_id == app_id)
        .and_then(|pfd| pfd.flow_descriptions.first())
        .cloned()
        .ok_or_else(|| {
            SmfError::InvalidPolicy(format!("no PFD for application {app_id} of PCC rule {}", rule.id))
        })
}

/// Derives the uplink flow description from a downlink one by swapping source and destination.
pub fn uplink_flow_description(downlink: &str) -> Result<String, SmfError> {
    let tokens: Vec<&str> = downlink.split_whitespace().collect();
    let invalid = || SmfError::InvalidPolicy(format!("bad flow description '{downlink}'"));
    let from = tokens.iter().position(|t| *t == "from").ok_or_else(invalid)?;
    let to = tokens.iter().position(|t| *t == "to").ok_or_else(invalid)?;
    if to <= from + 1 || to + 1 >= tokens.len() {
        return Err(invalid());
    }
    let head = &tokens[..=from];
    let source = &tokens[from + 1..to];
    let destination = &tokens[to + 1..];
    let keyword: &[&str] = &["to"];
    Ok([head, destination, keyword, source].concat().join(" "))
}
