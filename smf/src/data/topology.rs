//! topology - the user plane graph of access nodes and UPFs, path selection over it, and the
//! selection of an anchor UPF together with a UE address.
use super::{Snssai, UeIpPool, UpNodeKind, Upf, UpfRegistry, UserPlaneConfig};
use crate::SmfError;
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use pfcp::NodeId;
use rand::Rng;
use slog::{Logger, debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Handle of a node in the topology.  Nodes are compared by handle, never by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(usize);

pub struct UpNode {
    pub name: String,
    pub kind: UpNodeKind,
    pub node_id: NodeId,
    pub upf: Option<Arc<Upf>>,
    links: Vec<NodeIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpfSelectionParams {
    pub dnn: String,
    pub snssai: Snssai,
    pub dnai: Option<String>,
    pub pdu_address: Option<Ipv4Addr>,
}

impl UpfSelectionParams {
    pub fn new(snssai: Snssai, dnn: &str) -> Self {
        UpfSelectionParams {
            dnn: dnn.to_string(),
            snssai,
            dnai: None,
            pdu_address: None,
        }
    }

    pub fn with_dnai(mut self, dnai: &str) -> Self {
        self.dnai = Some(dnai.to_string());
        self
    }

    pub fn with_pdu_address(mut self, pdu_address: Ipv4Addr) -> Self {
        self.pdu_address = Some(pdu_address);
        self
    }

    // The requested address does not influence the path.
    fn key(&self) -> SelectionKey {
        (self.snssai, self.dnn.clone(), self.dnai.clone())
    }
}

impl fmt::Display for UpfSelectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snssai {} dnn {}", self.snssai, self.dnn)?;
        if let Some(dnai) = &self.dnai {
            write!(f, " dnai {dnai}")?;
        }
        Ok(())
    }
}

type SelectionKey = (Snssai, String, Option<String>);

/// The user plane topology.  Built once from configuration; only the path cache changes after
/// that.
pub struct UserPlaneTopology {
    nodes: Vec<UpNode>,
    names: HashMap<String, NodeIndex>,
    access_node: NodeIndex,
    path_cache: Mutex<HashMap<(SelectionKey, Option<NodeIndex>), Vec<NodeIndex>>>,
    logger: Logger,
}

impl UserPlaneTopology {
    /// Builds the topology, registering every UPF with the registry.  Fails on any inconsistency,
    /// including overlapping UE address pools.
    pub fn build_from_config(
        config: &UserPlaneConfig,
        registry: &UpfRegistry,
        logger: &Logger,
    ) -> Result<Self, SmfError> {
        check_pools(config)?;

        let mut nodes = Vec::with_capacity(config.nodes.len());
        let mut names = HashMap::new();
        for (i, c) in config.nodes.iter().enumerate() {
            if names.insert(c.name.clone(), NodeIndex(i)).is_some() {
                return Err(SmfError::Config(format!("duplicate node name {}", c.name)));
            }
            let node_id = c
                .node_id
                .parse::<NodeId>()
                .map_err(|e| SmfError::Config(format!("node {} - {e}", c.name)))?;
            let upf = match c.kind {
                UpNodeKind::Upf => Some(registry.register(Upf::new(
                    &c.name,
                    node_id.clone(),
                    &c.interfaces,
                    Upf::snssai_infos_from_config(&c.snssai_infos),
                    logger,
                )?)),
                UpNodeKind::AccessNode => None,
            };
            nodes.push(UpNode {
                name: c.name.clone(),
                kind: c.kind,
                node_id,
                upf,
                links: vec![],
            });
        }

        for link in config.links.iter() {
            let lookup = |name: &str| {
                names
                    .get(name)
                    .copied()
                    .ok_or_else(|| SmfError::Config(format!("link to unknown node {name}")))
            };
            let (a, b) = (lookup(&link.a)?, lookup(&link.b)?);
            if a == b {
                return Err(SmfError::Config(format!("link from {} to itself", link.a)));
            }
            if !nodes[a.0].links.contains(&b) {
                nodes[a.0].links.push(b);
                nodes[b.0].links.push(a);
            }
        }

        let mut access_nodes = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.kind == UpNodeKind::AccessNode)
            .map(|(i, _)| NodeIndex(i));
        let Some(access_node) = access_nodes.next() else {
            return Err(SmfError::Config("no access node".to_string()));
        };
        if access_nodes.next().is_some() {
            return Err(SmfError::Config("more than one access node".to_string()));
        }

        info!(
            logger,
            "User plane topology has {} nodes, access node {}",
            nodes.len(),
            nodes[access_node.0].name
        );
        Ok(UserPlaneTopology {
            nodes,
            names,
            access_node,
            path_cache: Mutex::new(HashMap::new()),
            logger: logger.clone(),
        })
    }

    pub fn node(&self, idx: NodeIndex) -> &UpNode {
        &self.nodes[idx.0]
    }

    pub fn upf(&self, idx: NodeIndex) -> Option<&Arc<Upf>> {
        self.nodes[idx.0].upf.as_ref()
    }

    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.names.get(name).copied()
    }

    pub fn access_node(&self) -> NodeIndex {
        self.access_node
    }

    pub fn upf_nodes(&self) -> impl Iterator<Item = (NodeIndex, &Arc<Upf>)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.upf.as_ref().map(|u| (NodeIndex(i), u)))
    }

    pub fn names(&self, path: &[NodeIndex]) -> Vec<&str> {
        path.iter().map(|i| self.nodes[i.0].name.as_str()).collect()
    }

    /// A path from the access node to a UPF matching `params`.  The access node is not included.
    pub fn select_path(&self, params: &UpfSelectionParams) -> Result<Vec<NodeIndex>, SmfError> {
        self.cached_path(params, None)
    }

    pub fn select_path_to_specific_anchor(
        &self,
        params: &UpfSelectionParams,
        anchor: NodeIndex,
    ) -> Result<Vec<NodeIndex>, SmfError> {
        self.cached_path(params, Some(anchor))
    }

    pub fn invalidate_path_cache(&self) {
        self.path_cache.lock().clear();
        debug!(self.logger, "Path cache invalidated");
    }

    fn cached_path(
        &self,
        params: &UpfSelectionParams,
        anchor: Option<NodeIndex>,
    ) -> Result<Vec<NodeIndex>, SmfError> {
        let key = (params.key(), anchor);
        if let Some(path) = self.path_cache.lock().get(&key) {
            return Ok(path.clone());
        }

        let destinations: Vec<NodeIndex> = match anchor {
            Some(anchor) => vec![anchor],
            None => self
                .upf_nodes()
                .filter(|(i, _)| self.matches(*i, params))
                .map(|(i, _)| i)
                .collect(),
        };
        let path = destinations
            .into_iter()
            .find_map(|dest| self.path_between(self.access_node, dest, &params.snssai))
            .ok_or_else(|| SmfError::PathNotFound(params.to_string()))?;
        let starts_at_access_node = path
            .first()
            .is_some_and(|first| self.nodes[first.0].kind == UpNodeKind::AccessNode);
        let path = match starts_at_access_node {
            true => path[1..].to_vec(),
            false => path,
        };
        if path.is_empty() {
            return Err(SmfError::PathNotFound(params.to_string()));
        }
        debug!(self.logger, "Path for {params}: {:?}", self.names(&path));
        self.path_cache.lock().insert(key, path.clone());
        Ok(path)
    }

    fn path_between(
        &self,
        source: NodeIndex,
        dest: NodeIndex,
        snssai: &Snssai,
    ) -> Option<Vec<NodeIndex>> {
        let mut visited = vec![false; self.nodes.len()];
        let mut reversed = self.depth_first(source, dest, snssai, &mut visited)?;
        reversed.reverse();
        Some(reversed)
    }

    // Returns the path from `current` to `dest` in reverse order.
    fn depth_first(
        &self,
        current: NodeIndex,
        dest: NodeIndex,
        snssai: &Snssai,
        visited: &mut [bool],
    ) -> Option<Vec<NodeIndex>> {
        visited[current.0] = true;
        if current == dest {
            return Some(vec![current]);
        }
        for &next in self.nodes[current.0].links.iter() {
            if visited[next.0] {
                continue;
            }
            if !self.supports_snssai(next, snssai) {
                visited[next.0] = true;
                continue;
            }
            if let Some(mut path) = self.depth_first(next, dest, snssai, visited) {
                path.push(current);
                return Some(path);
            }
        }
        None
    }

    fn supports_snssai(&self, idx: NodeIndex, snssai: &Snssai) -> bool {
        self.upf(idx).is_some_and(|u| u.supports_snssai(snssai))
    }

    fn matches(&self, idx: NodeIndex, params: &UpfSelectionParams) -> bool {
        self.upf(idx).is_some_and(|u| {
            u.snssai_infos
                .iter()
                .filter(|s| s.snssai == params.snssai)
                .flat_map(|s| s.dnn_infos.iter())
                .any(|d| d.dnn == params.dnn && d.contains_dnai(params.dnai.as_deref()))
        })
    }

    /// Breadth first search from `source` through UPFs matching `params`.  UPFs at the edge of the
    /// matching subgraph are the anchor candidates.
    pub fn select_anchor_candidates(
        &self,
        source: NodeIndex,
        params: &UpfSelectionParams,
    ) -> Vec<NodeIndex> {
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([source]);
        let mut candidates = vec![];
        visited[source.0] = true;
        while let Some(current) = queue.pop_front() {
            let mut expanded = false;
            for &next in self.nodes[current.0].links.iter() {
                if !visited[next.0] && self.matches(next, params) {
                    visited[next.0] = true;
                    queue.push_back(next);
                    expanded = true;
                }
            }
            if !expanded && self.matches(current, params) {
                candidates.push(current);
            }
        }
        candidates
    }

    /// Picks an anchor UPF for `params` and allocates a UE address from it.  Returns the anchor,
    /// the address, and whether it came from a static pool.
    pub fn select_upf_and_allocate_ue_ip(
        &self,
        params: &UpfSelectionParams,
    ) -> Result<(NodeIndex, Ipv4Addr, bool), SmfError> {
        let mut candidates = self.select_anchor_candidates(self.access_node, params);
        if candidates.is_empty() {
            return Err(SmfError::PathNotFound(params.to_string()));
        }
        candidates.sort_by(|a, b| self.nodes[a.0].name.cmp(&self.nodes[b.0].name));
        rotate_randomly(&mut candidates);

        for candidate in candidates {
            let Some(upf) = self.upf(candidate) else {
                continue;
            };
            let (pools, is_static) = address_pools(upf, params);
            for pool in pools {
                if let Some(addr) = pool.allocate(params.pdu_address) {
                    info!(
                        self.logger,
                        "Selected {} as anchor for {params}, UE address {addr}", upf.name
                    );
                    return Ok((candidate, addr, is_static));
                }
            }
            warn!(self.logger, "No UE address available from {} for {params}", upf.name);
        }
        Err(SmfError::AddressExhausted(params.to_string()))
    }

    /// Returns a UE address to the pool of `node` that contains it.
    pub fn release_ue_ip(&self, node: NodeIndex, addr: &Ipv4Addr, was_static: bool) -> bool {
        let Some(upf) = self.upf(node) else {
            return false;
        };
        let released = upf
            .snssai_infos
            .iter()
            .flat_map(|s| s.dnn_infos.iter())
            .flat_map(|d| match was_static {
                true => d.static_pools.iter(),
                false => d.pools.iter(),
            })
            .find(|p| p.contains(addr))
            .is_some_and(|p| p.release(addr));
        if !released {
            warn!(self.logger, "Failed to release UE address {addr} to {}", upf.name);
        }
        released
    }
}

fn address_pools<'a>(upf: &'a Upf, params: &UpfSelectionParams) -> (Vec<&'a UeIpPool>, bool) {
    let dnn_infos: Vec<_> = upf
        .snssai_infos
        .iter()
        .filter(|s| s.snssai == params.snssai)
        .flat_map(|s| s.dnn_infos.iter())
        .filter(|d| d.dnn == params.dnn && d.contains_dnai(params.dnai.as_deref()))
        .collect();
    if let Some(requested) = params.pdu_address {
        if let Some(pool) = dnn_infos
            .iter()
            .flat_map(|d| d.static_pools.iter())
            .find(|p| p.contains(&requested))
        {
            return (vec![pool], true);
        }
    }
    let mut pools: Vec<_> = dnn_infos.iter().flat_map(|d| d.pools.iter()).collect();
    rotate_randomly(&mut pools);
    (pools, false)
}

fn rotate_randomly<T>(items: &mut [T]) {
    if items.len() > 1 {
        let offset = rand::rng().random_range(0..items.len());
        items.rotate_left(offset);
    }
}

/// Address pools must not overlap, with the exception of a static pool carved out of a dynamic
/// pool of the same DNN entry.
fn check_pools(config: &UserPlaneConfig) -> Result<(), SmfError> {
    struct Entry<'a> {
        node: &'a str,
        owner: (usize, usize, usize),
        subnet: Ipv4Net,
        is_static: bool,
    }
    let mut entries = vec![];
    for (n, node) in config.nodes.iter().enumerate() {
        for (s, slice) in node.snssai_infos.iter().enumerate() {
            for (d, dnn) in slice.dnn_infos.iter().enumerate() {
                for (subnets, is_static) in [(&dnn.pools, false), (&dnn.static_pools, true)] {
                    entries.extend(subnets.iter().map(|subnet| Entry {
                        node: &node.name,
                        owner: (n, s, d),
                        subnet: subnet.trunc(),
                        is_static,
                    }));
                }
            }
        }
    }

    for (i, a) in entries.iter().enumerate() {
        for b in entries[i + 1..].iter() {
            let overlap =
                a.subnet.contains(&b.subnet.network()) || b.subnet.contains(&a.subnet.network());
            if !overlap {
                continue;
            }
            let carved_out = a.owner == b.owner
                && a.is_static != b.is_static
                && match a.is_static {
                    true => b.subnet.contains(&a.subnet),
                    false => a.subnet.contains(&b.subnet),
                };
            if !carved_out {
                return Err(SmfError::Config(format!(
                    "UE pool {} of {} overlaps {} of {}",
                    a.subnet, a.node, b.subnet, b.node
                )));
            }
        }
    }
    Ok(())
}
