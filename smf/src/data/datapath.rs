//! datapath - a session's tunnel through a chain of UPFs, and the rules that realize it
use super::rules::{Pdr, Qer, RuleState, collect_qer_changes};
use super::{InterfaceKind, NodeIndex, RuleKind, Upf, UserPlaneTopology};
use crate::SmfError;
use pfcp::{
    ApplyAction, Bitrate, DestinationInterface, ForwardingParameters, Fteid, OuterHeaderCreation,
    OuterHeaderRemoval, Pdi, RuleChanges, SdfFilter, SourceInterface, UeIpAddress,
};
use slog::{Logger, debug, warn};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// The access side GTP-U endpoint of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnTunnel {
    pub ipv4_addr: Ipv4Addr,
    pub teid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultQos {
    pub qfi: u8,
    pub session_ambr: Bitrate,
}

/// What activation needs to know about the owning session.
#[derive(Debug, Clone)]
pub struct TunnelContext {
    pub dnn: String,
    pub ue_ip: Ipv4Addr,
    pub an_tunnel: Option<AnTunnel>,
    pub default_qos: Option<DefaultQos>,
}

/// QoS to enforce on the traffic of one application data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosDescriptor {
    pub qfi: u8,
    pub mbr: Option<Bitrate>,
    pub gbr: Option<Bitrate>,
}

/// One direction of a node's tunnel: the local TEID, if the node terminates a tunnel in this
/// direction, and the PDR matching the traffic.
#[derive(Debug)]
pub struct Leg {
    pub teid: Option<u32>,
    pub pdr: Pdr,
}

#[derive(Debug)]
pub struct DataPathNode {
    pub node: NodeIndex,
    pub upf: Arc<Upf>,
    prev: Option<usize>,
    next: Option<usize>,
    pub uplink: Option<Leg>,
    pub downlink: Option<Leg>,
    pub qers: Vec<Qer>,
}

impl DataPathNode {
    pub fn prev(&self) -> Option<usize> {
        self.prev
    }

    pub fn next(&self) -> Option<usize> {
        self.next
    }

    pub fn is_anchor(&self) -> bool {
        self.next.is_none()
    }

    fn legs_mut(&mut self) -> impl Iterator<Item = &mut Leg> {
        self.uplink.iter_mut().chain(self.downlink.iter_mut())
    }

    pub fn collect_changes(&self, changes: &mut RuleChanges) {
        for leg in self.uplink.iter().chain(self.downlink.iter()) {
            leg.pdr.collect_changes(changes);
        }
        for qer in self.qers.iter() {
            collect_qer_changes(qer, changes);
        }
    }

    #[cfg(test)]
    pub fn has_rules(&self) -> bool {
        self.uplink.is_some() || self.downlink.is_some() || !self.qers.is_empty()
    }
}

/// Where an application data path leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub dnai: String,
    pub pcc_rule_id: String,
}

#[derive(Debug)]
pub struct DataPath {
    pub id: u32,
    pub is_default: bool,
    pub activated: bool,
    pub destination: Option<Destination>,
    nodes: Vec<DataPathNode>,
}

impl DataPath {
    /// Builds the chain of data path nodes for a topology path, first node on the access side.
    pub fn build(
        id: u32,
        path: &[NodeIndex],
        topology: &UserPlaneTopology,
    ) -> Result<Self, SmfError> {
        if path.is_empty() {
            return Err(SmfError::PathNotFound("empty path".to_string()));
        }
        let last = path.len() - 1;
        let nodes = path
            .iter()
            .enumerate()
            .map(|(i, idx)| {
                let upf = topology.upf(*idx).ok_or_else(|| {
                    SmfError::Config(format!("{} is not a UPF", topology.node(*idx).name))
                })?;
                Ok(DataPathNode {
                    node: *idx,
                    upf: upf.clone(),
                    prev: i.checked_sub(1),
                    next: (i < last).then_some(i + 1),
                    uplink: None,
                    downlink: None,
                    qers: vec![],
                })
            })
            .collect::<Result<Vec<_>, SmfError>>()?;
        Ok(DataPath {
            id,
            is_default: false,
            activated: false,
            destination: None,
            nodes,
        })
    }

    pub fn anchor_node(&self) -> Option<&DataPathNode> {
        self.iter().last()
    }

    /// Walks the chain from the first node to the anchor.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            path: self,
            current: (!self.nodes.is_empty()).then_some(0),
        }
    }

    fn positions(&self) -> Vec<usize> {
        let mut positions = Vec::with_capacity(self.nodes.len());
        let mut current = (!self.nodes.is_empty()).then_some(0);
        while let Some(i) = current {
            positions.push(i);
            current = self.nodes[i].next;
        }
        positions
    }

    fn anchor_position(&self) -> Option<usize> {
        self.positions().last().copied()
    }

    pub fn node_names(&self) -> Vec<String> {
        self.iter().map(|n| n.upf.name.clone()).collect()
    }

    /// Allocates the tunnels and rules of every node and fills them in.
    pub fn activate(
        &mut self,
        ctx: &TunnelContext,
        precedence: u32,
        logger: &Logger,
    ) -> Result<(), SmfError> {
        let positions = self.positions();
        for &i in positions.iter() {
            self.allocate_node(i, ctx, precedence)?;
        }
        for &i in positions.iter() {
            self.fill_uplink(i, ctx)?;
            self.fill_downlink(i, ctx)?;
        }
        self.activated = true;
        debug!(logger, "Activated data path {} {}", self.id, self);
        Ok(())
    }

    fn allocate_node(
        &mut self,
        i: usize,
        ctx: &TunnelContext,
        precedence: u32,
    ) -> Result<(), SmfError> {
        let node = &mut self.nodes[i];
        let upf = node.upf.clone();
        if node.uplink.is_none() {
            node.uplink = Some(new_leg(&upf, true, precedence)?);
        }
        if node.downlink.is_none() {
            // The anchor receives downlink traffic unencapsulated from the data network.
            node.downlink = Some(new_leg(&upf, !node.is_anchor(), precedence)?);
        }
        if let (Some(qos), true) = (&ctx.default_qos, node.qers.is_empty()) {
            let qer_id = upf.allocate_qer_id()?;
            node.qers
                .push(Qer::new(qer_id, qos.qfi, Some(qos.session_ambr), None));
        }
        Ok(())
    }

    fn gtpu_addr(&self, i: usize, kind: InterfaceKind, dnn: &str) -> Result<Ipv4Addr, SmfError> {
        let upf = &self.nodes[i].upf;
        upf.gtpu_addr(kind, dnn)
            .ok_or_else(|| SmfError::Config(format!("no GTP-U address for {}", upf.name)))
    }

    fn fill_uplink(&mut self, i: usize, ctx: &TunnelContext) -> Result<(), SmfError> {
        let kind = match self.nodes[i].prev {
            None => InterfaceKind::N3,
            Some(_) => InterfaceKind::N9,
        };
        let local_addr = self.gtpu_addr(i, kind, &ctx.dnn)?;
        let next_hop = match self.nodes[i].next {
            Some(n) => {
                let addr = self.gtpu_addr(n, InterfaceKind::N9, &ctx.dnn)?;
                let teid = self.nodes[n].uplink.as_ref().and_then(|l| l.teid);
                teid.map(|teid| OuterHeaderCreation::gtpu_ipv4(teid, addr))
            }
            None => None,
        };
        let node = &mut self.nodes[i];
        let qer_ids: Vec<u32> = node.qers.iter().map(Qer::id).collect();
        let Some(leg) = node.uplink.as_mut() else {
            return Ok(());
        };
        let pdr = &mut leg.pdr;
        pdr.ie.pdi = Pdi {
            source_interface: SourceInterface::Access,
            local_fteid: leg.teid.map(|teid| Fteid {
                teid,
                ipv4_addr: local_addr,
            }),
            network_instance: None,
            ue_ip_address: Some(UeIpAddress {
                ipv4_addr: ctx.ue_ip,
                is_destination: false,
            }),
            sdf_filter: pdr.ie.pdi.sdf_filter.take(),
        };
        pdr.ie.outer_header_removal = Some(OuterHeaderRemoval::GtpUUdpIpv4);
        pdr.ie.qer_ids = qer_ids;
        pdr.far.set_forwarding(ForwardingParameters {
            destination_interface: DestinationInterface::Core,
            network_instance: Some(ctx.dnn.clone()),
            outer_header_creation: next_hop,
            forwarding_policy_id: None,
        });
        Ok(())
    }

    fn fill_downlink(&mut self, i: usize, ctx: &TunnelContext) -> Result<(), SmfError> {
        let is_anchor = self.nodes[i].is_anchor();
        let local_addr = match is_anchor {
            true => None,
            false => Some(self.gtpu_addr(i, InterfaceKind::N9, &ctx.dnn)?),
        };
        let next_hop = match self.nodes[i].prev {
            Some(p) => {
                let addr = self.gtpu_addr(p, InterfaceKind::N9, &ctx.dnn)?;
                let teid = self.nodes[p].downlink.as_ref().and_then(|l| l.teid);
                teid.map(|teid| OuterHeaderCreation::gtpu_ipv4(teid, addr))
            }
            None => ctx
                .an_tunnel
                .map(|an| OuterHeaderCreation::gtpu_ipv4(an.teid, an.ipv4_addr)),
        };
        let node = &mut self.nodes[i];
        let qer_ids: Vec<u32> = node.qers.iter().map(Qer::id).collect();
        let Some(leg) = node.downlink.as_mut() else {
            return Ok(());
        };
        let pdr = &mut leg.pdr;
        pdr.ie.pdi = Pdi {
            source_interface: SourceInterface::Core,
            local_fteid: match (leg.teid, local_addr) {
                (Some(teid), Some(ipv4_addr)) => Some(Fteid { teid, ipv4_addr }),
                _ => None,
            },
            network_instance: is_anchor.then(|| ctx.dnn.clone()),
            ue_ip_address: Some(UeIpAddress {
                ipv4_addr: ctx.ue_ip,
                is_destination: true,
            }),
            sdf_filter: pdr.ie.pdi.sdf_filter.take(),
        };
        pdr.ie.outer_header_removal = (!is_anchor).then_some(OuterHeaderRemoval::GtpUUdpIpv4);
        pdr.ie.qer_ids = qer_ids;
        match next_hop {
            Some(ohc) => pdr.far.set_forwarding(ForwardingParameters {
                destination_interface: DestinationInterface::Access,
                network_instance: None,
                outer_header_creation: Some(ohc),
                forwarding_policy_id: None,
            }),
            // Until the access side tunnel is known, buffer and tell us about downlink data.
            None => {
                pdr.far.ie.apply_action = ApplyAction::buffer_and_notify();
                pdr.far.forwarding_parameters_mut().destination_interface =
                    DestinationInterface::Access;
            }
        }
        Ok(())
    }

    /// Points the downlink of the access side node at the access network tunnel.
    pub fn set_an_tunnel(&mut self, an_tunnel: AnTunnel) {
        let Some(leg) = self.nodes.first_mut().and_then(|n| n.downlink.as_mut()) else {
            return;
        };
        let far = &mut leg.pdr.far;
        far.set_forwarding(ForwardingParameters {
            destination_interface: DestinationInterface::Access,
            network_instance: None,
            outer_header_creation: Some(OuterHeaderCreation::gtpu_ipv4(
                an_tunnel.teid,
                an_tunnel.ipv4_addr,
            )),
            forwarding_policy_id: None,
        });
        far.mark_updated();
    }

    /// Makes the access side node buffer downlink data and notify the control plane.  A BAR is
    /// allocated the first time this happens.
    pub fn buffer_downlink(&mut self) -> Result<(), SmfError> {
        let Some(node) = self.nodes.first_mut() else {
            return Ok(());
        };
        let upf = node.upf.clone();
        let Some(leg) = node.downlink.as_mut() else {
            return Ok(());
        };
        let far = &mut leg.pdr.far;
        if far.bar.is_none() {
            far.set_bar(upf.allocate_bar_id()?);
        }
        far.ie.apply_action = ApplyAction::buffer_and_notify();
        far.forwarding_parameters_mut().outer_header_creation = None;
        far.mark_updated();
        Ok(())
    }

    /// Installs the SDF filters of an application data path on every node.
    pub fn update_flow_description(&mut self, uplink: &str, downlink: &str) {
        for node in self.nodes.iter_mut() {
            if let Some(leg) = node.uplink.as_mut() {
                leg.pdr.ie.pdi.sdf_filter = Some(SdfFilter {
                    flow_description: uplink.to_string(),
                });
                leg.pdr.mark_updated();
            }
            if let Some(leg) = node.downlink.as_mut() {
                leg.pdr.ie.pdi.sdf_filter = Some(SdfFilter {
                    flow_description: downlink.to_string(),
                });
                leg.pdr.mark_updated();
            }
        }
    }

    /// Sets the forwarding policy applied by the anchor to uplink traffic towards the data network.
    pub fn add_forwarding_parameters(&mut self, forwarding_policy_id: &str) {
        let Some(anchor) = self.anchor_position() else {
            return;
        };
        if let Some(leg) = self.nodes[anchor].uplink.as_mut() {
            let far = &mut leg.pdr.far;
            far.forwarding_parameters_mut().forwarding_policy_id =
                Some(forwarding_policy_id.to_string());
            far.mark_updated();
        }
    }

    /// Enforces `qos` at the anchor.
    pub fn add_qos(&mut self, qos: &QosDescriptor) -> Result<(), SmfError> {
        let Some(anchor) = self.anchor_position() else {
            return Ok(());
        };
        let node = &mut self.nodes[anchor];
        let qer_id = node.upf.allocate_qer_id()?;
        node.qers.push(Qer::new(qer_id, qos.qfi, qos.mbr, qos.gbr));
        for leg in node.legs_mut() {
            leg.pdr.ie.qer_ids.push(qer_id);
            leg.pdr.mark_updated();
        }
        Ok(())
    }

    /// Applies a changed session AMBR or default QFI to the QER each node got at activation.
    pub fn update_default_qos(&mut self, qos: &DefaultQos) {
        for qer in self.nodes.iter_mut().filter_map(|n| n.qers.first_mut()) {
            if qer.ie.qfi == qos.qfi && qer.ie.mbr == Some(qos.session_ambr) {
                continue;
            }
            qer.ie.qfi = qos.qfi;
            qer.ie.mbr = Some(qos.session_ambr);
            qer.mark_updated();
        }
    }

    /// Marks every rule for removal.  The rules are released by `release_removed_rules()` once the
    /// UPFs have confirmed.
    pub fn deactivate(&mut self) {
        for node in self.nodes.iter_mut() {
            for leg in node.legs_mut() {
                leg.pdr.mark_removed();
            }
            for qer in node.qers.iter_mut() {
                qer.state = RuleState::Remove;
            }
        }
        self.activated = false;
    }

    pub fn collect_changes(&self, node: NodeIndex, changes: &mut RuleChanges) {
        for n in self.nodes.iter().filter(|n| n.node == node) {
            n.collect_changes(changes);
        }
    }

    /// Records that the UPFs have installed the pending rules.
    pub fn commit(&mut self) {
        for node in self.nodes.iter_mut() {
            for leg in node.legs_mut() {
                leg.pdr.commit();
            }
            for qer in node.qers.iter_mut() {
                if qer.state != RuleState::Remove {
                    qer.state = RuleState::Unchanged;
                }
            }
        }
    }

    /// Gives back the identifiers of removed rules to their UPFs.
    pub fn release_removed_rules(&mut self, logger: &Logger) {
        for node in self.nodes.iter_mut() {
            let upf = node.upf.clone();
            let release = |kind: RuleKind, id: u64| {
                if let Err(e) = upf.release_rule(kind, id) {
                    warn!(logger, "Failed to release {:?} {} - {}", kind, id, e);
                }
            };
            for leg in [&mut node.uplink, &mut node.downlink] {
                if !leg
                    .as_ref()
                    .is_some_and(|l| l.pdr.state == RuleState::Remove)
                {
                    continue;
                }
                let Some(removed) = leg.take() else {
                    continue;
                };
                release(RuleKind::Pdr, removed.pdr.id() as u64);
                release(RuleKind::Far, removed.pdr.far.id() as u64);
                if let Some(bar) = &removed.pdr.far.bar {
                    release(RuleKind::Bar, bar.ie.bar_id as u64);
                }
                if let Some(teid) = removed.teid {
                    if let Err(e) = upf.release_teid(teid) {
                        warn!(logger, "Failed to release TEID {:#x} - {}", teid, e);
                    }
                }
            }
            node.qers.retain(|qer| {
                let removed = qer.state == RuleState::Remove;
                if removed {
                    release(RuleKind::Qer, qer.id() as u64);
                }
                !removed
            });
        }
    }
}

/// Allocates the TEID and rule IDs of one leg, or nothing at all.
fn new_leg(upf: &Upf, with_teid: bool, precedence: u32) -> Result<Leg, SmfError> {
    let pdr_id = upf.allocate_pdr_id()?;
    let far_id = match upf.allocate_far_id() {
        Ok(far_id) => far_id,
        Err(e) => {
            let _ = upf.release_rule(RuleKind::Pdr, pdr_id as u64);
            return Err(e);
        }
    };
    let teid = match with_teid {
        true => match upf.allocate_teid() {
            Ok(teid) => Some(teid),
            Err(e) => {
                let _ = upf.release_rule(RuleKind::Pdr, pdr_id as u64);
                let _ = upf.release_rule(RuleKind::Far, far_id as u64);
                return Err(e);
            }
        },
        false => None,
    };
    Ok(Leg {
        teid,
        pdr: Pdr::new(pdr_id, far_id, precedence),
    })
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.node_names().join(" -> "))
    }
}

pub struct Iter<'a> {
    path: &'a DataPath,
    current: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a DataPathNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = &self.path.nodes[self.current?];
        self.current = node.next;
        Some(node)
    }
}
