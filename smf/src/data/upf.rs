//! upf - forwarding nodes, their identifier spaces and association state, and the registry of them
use super::{DnnInfoConfig, IdGenerator, InterfaceConfig, InterfaceKind, Snssai, UeIpPool};
use crate::SmfError;
use dashmap::DashMap;
use parking_lot::Mutex;
use pfcp::{NodeId, UserPlaneIpResourceInformation};
use slog::{Logger, debug, info, o};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpfStatus {
    NotAssociated,
    AssociatingSetUp,
    AssociatedSetUpSuccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleKind {
    Pdr,
    Far,
    Bar,
    Urr,
    Qer,
}

impl RuleKind {
    fn name(&self) -> &'static str {
        match self {
            RuleKind::Pdr => "PDR",
            RuleKind::Far => "FAR",
            RuleKind::Bar => "BAR",
            RuleKind::Urr => "URR",
            RuleKind::Qer => "QER",
        }
    }
}

/// Resolves an FQDN to its first address.
pub fn resolve_fqdn(fqdn: &str) -> Option<IpAddr> {
    (fqdn, 0)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|a| a.ip())
}

#[derive(Debug)]
pub struct UpfInterface {
    pub kind: InterfaceKind,
    pub endpoints: Vec<NodeId>,
    pub network_instances: Vec<String>,
}

impl UpfInterface {
    fn from_config(c: &InterfaceConfig) -> Result<Self, SmfError> {
        let endpoints = c
            .endpoints
            .iter()
            .map(|e| {
                e.parse::<NodeId>()
                    .map_err(|err| SmfError::Config(format!("bad endpoint '{e}' - {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(UpfInterface {
            kind: c.kind,
            endpoints,
            network_instances: c.network_instances.clone(),
        })
    }

    /// The first IPv4 endpoint, falling back to resolving the first FQDN endpoint.
    pub fn ipv4_addr(&self) -> Option<Ipv4Addr> {
        let direct = self.endpoints.iter().find_map(|e| match e {
            NodeId::Ipv4(a) => Some(*a),
            _ => None,
        });
        direct.or_else(|| {
            self.endpoints.iter().find_map(|e| match e {
                NodeId::Fqdn(name) => match resolve_fqdn(name) {
                    Some(IpAddr::V4(a)) => Some(a),
                    _ => None,
                },
                _ => None,
            })
        })
    }
}

pub struct DnnUpfInfo {
    pub dnn: String,
    pub dnai_list: Vec<String>,
    pub pools: Vec<UeIpPool>,
    pub static_pools: Vec<UeIpPool>,
}

impl DnnUpfInfo {
    fn from_config(c: &DnnInfoConfig) -> Self {
        let pools: Vec<UeIpPool> = c.pools.iter().map(|p| UeIpPool::new(*p)).collect();
        let static_pools: Vec<UeIpPool> =
            c.static_pools.iter().map(|p| UeIpPool::new(*p)).collect();
        // Static ranges are carved out of the dynamic pools they lie within.
        for s in static_pools.iter() {
            for p in pools.iter().filter(|p| p.contains(&s.subnet().network())) {
                p.exclude(&s.subnet());
            }
        }
        DnnUpfInfo {
            dnn: c.dnn.clone(),
            dnai_list: c.dnai_list.clone(),
            pools,
            static_pools,
        }
    }

    /// With no DNAI, only an entry with an empty DNAI list matches.
    pub fn contains_dnai(&self, dnai: Option<&str>) -> bool {
        match dnai {
            None => self.dnai_list.is_empty(),
            Some(dnai) => self.dnai_list.iter().any(|d| d == dnai),
        }
    }
}

pub struct SnssaiUpfInfo {
    pub snssai: Snssai,
    pub dnn_infos: Vec<DnnUpfInfo>,
}

struct IdGenerators {
    pdr: IdGenerator,
    far: IdGenerator,
    bar: IdGenerator,
    urr: IdGenerator,
    qer: IdGenerator,
    teid: IdGenerator,
}

impl IdGenerators {
    fn new() -> Self {
        IdGenerators {
            pdr: IdGenerator::new("PDR", 1, u16::MAX as u64),
            far: IdGenerator::new("FAR", 1, u32::MAX as u64),
            bar: IdGenerator::new("BAR", 1, u8::MAX as u64),
            urr: IdGenerator::new("URR", 1, u32::MAX as u64),
            qer: IdGenerator::new("QER", 1, u32::MAX as u64),
            teid: IdGenerator::new("TEID", 1, u32::MAX as u64),
        }
    }

    fn get(&self, kind: RuleKind) -> &IdGenerator {
        match kind {
            RuleKind::Pdr => &self.pdr,
            RuleKind::Far => &self.far,
            RuleKind::Bar => &self.bar,
            RuleKind::Urr => &self.urr,
            RuleKind::Qer => &self.qer,
        }
    }
}

/// A UPF under our control.
pub struct Upf {
    pub id: Uuid,
    pub name: String,
    pub node_id: NodeId,
    pub interfaces: Vec<UpfInterface>,
    pub snssai_infos: Vec<SnssaiUpfInfo>,
    resolved_addr: OnceLock<Option<IpAddr>>,
    status: Mutex<UpfStatus>,
    up_ip_info: Mutex<Vec<UserPlaneIpResourceInformation>>,
    generators: IdGenerators,
    rules: Mutex<BTreeSet<(RuleKind, u64)>>,
    pub logger: Logger,
}

impl fmt::Debug for Upf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Upf({} {})", self.name, self.node_id)
    }
}

impl Upf {
    pub fn new(
        name: &str,
        node_id: NodeId,
        interfaces: &[InterfaceConfig],
        snssai_infos: Vec<SnssaiUpfInfo>,
        logger: &Logger,
    ) -> Result<Self, SmfError> {
        let interfaces = interfaces
            .iter()
            .map(UpfInterface::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Upf {
            id: Uuid::new_v4(),
            name: name.to_string(),
            logger: logger.new(o!("upf" => name.to_string())),
            node_id,
            interfaces,
            snssai_infos,
            resolved_addr: OnceLock::new(),
            status: Mutex::new(UpfStatus::NotAssociated),
            up_ip_info: Mutex::new(vec![]),
            generators: IdGenerators::new(),
            rules: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn snssai_infos_from_config(
        snssai_infos: &[super::SnssaiInfoConfig],
    ) -> Vec<SnssaiUpfInfo> {
        snssai_infos
            .iter()
            .map(|s| SnssaiUpfInfo {
                snssai: s.snssai,
                dnn_infos: s.dnn_infos.iter().map(DnnUpfInfo::from_config).collect(),
            })
            .collect()
    }

    /// The node's address, resolving an FQDN node ID the first time it is needed.
    pub fn resolved_addr(&self) -> Option<IpAddr> {
        *self.resolved_addr.get_or_init(|| match &self.node_id {
            NodeId::Fqdn(fqdn) => resolve_fqdn(fqdn),
            other => other.ip_addr(),
        })
    }

    pub fn status(&self) -> UpfStatus {
        *self.status.lock()
    }

    pub fn is_associated(&self) -> bool {
        self.status() == UpfStatus::AssociatedSetUpSuccess
    }

    pub fn association_setup_started(&self) {
        *self.status.lock() = UpfStatus::AssociatingSetUp;
    }

    pub fn association_established(&self, up_ip_info: Vec<UserPlaneIpResourceInformation>) {
        *self.up_ip_info.lock() = up_ip_info;
        *self.status.lock() = UpfStatus::AssociatedSetUpSuccess;
        info!(self.logger, "Association established");
    }

    pub fn association_lost(&self) {
        *self.status.lock() = UpfStatus::NotAssociated;
        self.up_ip_info.lock().clear();
        info!(self.logger, "Not associated");
    }

    fn ensure_associated(&self) -> Result<(), SmfError> {
        if self.is_associated() {
            Ok(())
        } else {
            Err(SmfError::NotAssociated(self.name.clone()))
        }
    }

    pub fn allocate_rule(&self, kind: RuleKind) -> Result<u64, SmfError> {
        self.ensure_associated()?;
        let id = self.generators.get(kind).allocate()?;
        self.rules.lock().insert((kind, id));
        debug!(self.logger, "Allocated {} {}", kind.name(), id);
        Ok(id)
    }

    pub fn release_rule(&self, kind: RuleKind, id: u64) -> Result<(), SmfError> {
        self.ensure_associated()?;
        if self.rules.lock().remove(&(kind, id)) {
            self.generators.get(kind).free(id);
        }
        Ok(())
    }

    pub fn installed_rule_count(&self, kind: RuleKind) -> usize {
        self.rules.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn allocate_pdr_id(&self) -> Result<u16, SmfError> {
        Ok(self.allocate_rule(RuleKind::Pdr)? as u16)
    }

    pub fn allocate_far_id(&self) -> Result<u32, SmfError> {
        Ok(self.allocate_rule(RuleKind::Far)? as u32)
    }

    pub fn allocate_bar_id(&self) -> Result<u8, SmfError> {
        Ok(self.allocate_rule(RuleKind::Bar)? as u8)
    }

    pub fn allocate_qer_id(&self) -> Result<u32, SmfError> {
        Ok(self.allocate_rule(RuleKind::Qer)? as u32)
    }

    pub fn allocate_teid(&self) -> Result<u32, SmfError> {
        self.ensure_associated()?;
        Ok(self.generators.teid.allocate()? as u32)
    }

    pub fn release_teid(&self, teid: u32) -> Result<(), SmfError> {
        self.ensure_associated()?;
        self.generators.teid.free(teid as u64);
        Ok(())
    }

    pub fn supports_snssai(&self, snssai: &Snssai) -> bool {
        self.snssai_infos.iter().any(|s| s.snssai == *snssai)
    }

    pub fn interface(&self, kind: InterfaceKind, dnn: &str) -> Option<&UpfInterface> {
        self.interfaces
            .iter()
            .find(|i| i.kind == kind && i.network_instances.iter().any(|n| n == dnn))
            .or_else(|| self.interfaces.iter().find(|i| i.kind == kind))
    }

    /// The GTP-U address of the given interface type, or the node address if there is no such
    /// interface.
    pub fn gtpu_addr(&self, kind: InterfaceKind, dnn: &str) -> Option<Ipv4Addr> {
        self.interface(kind, dnn)
            .and_then(UpfInterface::ipv4_addr)
            .or_else(|| match self.resolved_addr() {
                Some(IpAddr::V4(a)) => Some(a),
                _ => None,
            })
    }

    pub fn serves_network_instance(&self, name: &str) -> bool {
        self.up_ip_info
            .lock()
            .iter()
            .any(|i| i.network_instance.as_deref() == Some(name))
    }
}

/// The set of UPFs known to this SMF, keyed by their process-local identity.
#[derive(Default)]
pub struct UpfRegistry {
    upfs: DashMap<Uuid, Arc<Upf>>,
}

impl UpfRegistry {
    pub fn register(&self, upf: Upf) -> Arc<Upf> {
        let upf = Arc::new(upf);
        info!(upf.logger, "Registered UPF {}", upf.node_id; "uuid" => %upf.id);
        self.upfs.insert(upf.id, upf.clone());
        upf
    }

    /// Finds a UPF by node ID.  An FQDN and an address name the same node if the FQDN resolves to
    /// that address.  Name resolution happens with no lock on the registry held.
    pub fn find_by_node_id(&self, node_id: &NodeId) -> Option<Arc<Upf>> {
        let exact = self
            .upfs
            .iter()
            .find(|e| e.value().node_id == *node_id)
            .map(|e| e.value().clone());
        if exact.is_some() {
            return exact;
        }

        let addr = match node_id {
            NodeId::Fqdn(fqdn) => resolve_fqdn(fqdn),
            other => other.ip_addr(),
        }?;
        self.all()
            .into_iter()
            .filter(|upf| upf.node_id.is_fqdn() || node_id.is_fqdn())
            .find(|upf| upf.resolved_addr() == Some(addr))
    }

    pub fn remove(&self, node_id: &NodeId) -> Option<Arc<Upf>> {
        let upf = self.find_by_node_id(node_id)?;
        self.upfs.remove(&upf.id);
        upf.association_lost();
        Some(upf)
    }

    pub fn select_by_network_instance(&self, name: &str) -> Option<Arc<Upf>> {
        self.upfs
            .iter()
            .find(|e| e.value().is_associated() && e.value().serves_network_instance(name))
            .map(|e| e.value().clone())
    }

    pub fn all(&self) -> Vec<Arc<Upf>> {
        let mut upfs: Vec<_> = self.upfs.iter().map(|e| e.value().clone()).collect();
        upfs.sort_by(|a, b| a.name.cmp(&b.name));
        upfs
    }

    pub fn len(&self) -> usize {
        self.upfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upfs.is_empty()
    }
}
