//! ies - information elements carried in PFCP messages (TS 29.244 clause 8)
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PfcpError {
    #[error("Empty node identifier")]
    EmptyNodeId,
    #[error("Unknown cause value {0}")]
    UnknownCause(u8),
}

/// Node ID.  A UPF is identified either by an address or by an FQDN that is resolved on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Fqdn(String),
}

impl NodeId {
    /// The address carried directly in the node ID, without any name resolution.
    pub fn ip_addr(&self) -> Option<IpAddr> {
        match self {
            NodeId::Ipv4(a) => Some(IpAddr::V4(*a)),
            NodeId::Ipv6(a) => Some(IpAddr::V6(*a)),
            NodeId::Fqdn(_) => None,
        }
    }

    pub fn is_fqdn(&self) -> bool {
        matches!(self, NodeId::Fqdn(_))
    }
}

impl From<IpAddr> for NodeId {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(a) => NodeId::Ipv4(a),
            IpAddr::V6(a) => NodeId::Ipv6(a),
        }
    }
}

impl FromStr for NodeId {
    type Err = PfcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PfcpError::EmptyNodeId);
        }
        Ok(match s.parse::<IpAddr>() {
            Ok(addr) => addr.into(),
            Err(_) => NodeId::Fqdn(s.to_string()),
        })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Ipv4(a) => write!(f, "{a}"),
            NodeId::Ipv6(a) => write!(f, "{a}"),
            NodeId::Fqdn(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cause {
    RequestAccepted = 1,
    RequestRejected = 64,
    SessionContextNotFound = 65,
    MandatoryIeMissing = 66,
    NoEstablishedPfcpAssociation = 72,
    RuleCreationModificationFailure = 73,
    NoResourcesAvailable = 75,
    SystemFailure = 77,
}

impl Cause {
    pub fn is_accepted(&self) -> bool {
        *self == Cause::RequestAccepted
    }
}

impl TryFrom<u8> for Cause {
    type Error = PfcpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Cause::RequestAccepted),
            64 => Ok(Cause::RequestRejected),
            65 => Ok(Cause::SessionContextNotFound),
            66 => Ok(Cause::MandatoryIeMissing),
            72 => Ok(Cause::NoEstablishedPfcpAssociation),
            73 => Ok(Cause::RuleCreationModificationFailure),
            75 => Ok(Cause::NoResourcesAvailable),
            77 => Ok(Cause::SystemFailure),
            x => Err(PfcpError::UnknownCause(x)),
        }
    }
}

/// F-SEID: a session endpoint identifier together with the address of the node that allocated it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fseid {
    pub seid: u64,
    pub ip_addr: IpAddr,
}

/// F-TEID: a GTP-U tunnel endpoint owned by the node that installs the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fteid {
    pub teid: u32,
    pub ipv4_addr: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeIpAddress {
    pub ipv4_addr: Ipv4Addr,
    // Set on downlink PDRs: the UE address is the destination of the matched packets.
    pub is_destination: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceInterface {
    #[default]
    Access = 0,
    Core = 1,
    SgiLanN6Lan = 2,
    CpFunction = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestinationInterface {
    #[default]
    Access = 0,
    Core = 1,
    SgiLanN6Lan = 2,
    CpFunction = 3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdfFilter {
    pub flow_description: String,
}

/// Packet detection information.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pdi {
    pub source_interface: SourceInterface,
    pub local_fteid: Option<Fteid>,
    pub network_instance: Option<String>,
    pub ue_ip_address: Option<UeIpAddress>,
    pub sdf_filter: Option<SdfFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OuterHeaderRemoval {
    #[default]
    GtpUUdpIpv4,
    GtpUUdpIpv6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OuterHeaderCreation {
    pub teid: u32,
    pub ipv4_addr: Ipv4Addr,
}

impl OuterHeaderCreation {
    pub fn gtpu_ipv4(teid: u32, ipv4_addr: Ipv4Addr) -> Self {
        OuterHeaderCreation { teid, ipv4_addr }
    }
}

/// Apply action flags of a FAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyAction {
    pub drop: bool,
    pub forw: bool,
    pub buff: bool,
    pub nocp: bool,
    pub dupl: bool,
}

impl ApplyAction {
    pub fn forward() -> Self {
        ApplyAction {
            forw: true,
            ..Default::default()
        }
    }

    /// Buffer downlink packets and notify the control plane of their arrival.
    pub fn buffer_and_notify() -> Self {
        ApplyAction {
            buff: true,
            nocp: true,
            ..Default::default()
        }
    }

    pub fn drop() -> Self {
        ApplyAction {
            drop: true,
            ..Default::default()
        }
    }

    pub fn to_bits(&self) -> u8 {
        (self.dupl as u8) << 4
            | (self.nocp as u8) << 3
            | (self.buff as u8) << 2
            | (self.forw as u8) << 1
            | self.drop as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForwardingParameters {
    pub destination_interface: DestinationInterface,
    pub network_instance: Option<String>,
    pub outer_header_creation: Option<OuterHeaderCreation>,
    pub forwarding_policy_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Open,
    Closed,
}

/// Bitrates in kbps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bitrate {
    pub uplink: u64,
    pub downlink: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePdr {
    pub pdr_id: u16,
    pub precedence: u32,
    pub pdi: Pdi,
    pub outer_header_removal: Option<OuterHeaderRemoval>,
    pub far_id: u32,
    pub qer_ids: Vec<u32>,
}

// An update carries the full replacement content of the rule.
pub type UpdatePdr = CreatePdr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovePdr {
    pub pdr_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFar {
    pub far_id: u32,
    pub apply_action: ApplyAction,
    pub forwarding_parameters: Option<ForwardingParameters>,
    pub bar_id: Option<u8>,
}

pub type UpdateFar = CreateFar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveFar {
    pub far_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateQer {
    pub qer_id: u32,
    pub qfi: u8,
    pub gate_status: GateStatus,
    pub mbr: Option<Bitrate>,
    pub gbr: Option<Bitrate>,
}

pub type UpdateQer = CreateQer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveQer {
    pub qer_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateBar {
    pub bar_id: u8,
    pub suggested_buffering_packets_count: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveBar {
    pub bar_id: u8,
}

/// User plane IP resource information advertised by a UPF at association setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPlaneIpResourceInformation {
    pub teid_range: Option<u8>,
    pub ipv4_addr: Option<Ipv4Addr>,
    pub network_instance: Option<String>,
    pub source_interface: Option<SourceInterface>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportType {
    pub dldr: bool,
    pub usar: bool,
    pub erir: bool,
    pub upir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReport {
    pub urr_id: u32,
    pub total_volume: u64,
}
