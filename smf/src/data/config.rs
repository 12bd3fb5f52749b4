use super::Snssai;
use anyhow::Result;
use ipnet::Ipv4Net;
use serde::Deserialize;
use slog::{Logger, error, info};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub smf: SmfConfig,

    pub user_plane: UserPlaneConfig,

    // Traffic steering route profiles, keyed by route profile ID.
    #[serde(default)]
    pub route_profiles: HashMap<String, RouteProfile>,

    // Packet flow descriptions of known applications, used by PCC rules that name an application
    // instead of a flow.
    #[serde(default)]
    pub pfds: Vec<PfdConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SmfConfig {
    // Node ID signaled to the UPFs, and the address of our F-SEIDs.
    pub node_id: String,

    // How long a session procedure waits for the UPFs to answer.
    #[serde(default = "default_pfcp_response_timeout_ms")]
    pub pfcp_response_timeout_ms: u64,

    // Precedence of the PDRs of the default data path.
    #[serde(default = "default_precedence")]
    pub default_precedence: u32,
}

impl SmfConfig {
    pub fn pfcp_response_timeout(&self) -> Duration {
        Duration::from_millis(self.pfcp_response_timeout_ms)
    }
}

fn default_pfcp_response_timeout_ms() -> u64 {
    4000
}

fn default_precedence() -> u32 {
    255
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct UserPlaneConfig {
    #[serde(default)]
    pub nodes: Vec<UpNodeConfig>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpNodeKind {
    #[serde(rename = "AN")]
    AccessNode,
    #[serde(rename = "UPF")]
    Upf,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UpNodeConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: UpNodeKind,

    // IP address or FQDN.
    pub node_id: String,

    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,

    #[serde(default)]
    pub snssai_infos: Vec<SnssaiInfoConfig>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    N3,
    N9,
}

#[derive(Deserialize, Debug, Clone)]
pub struct InterfaceConfig {
    #[serde(rename = "type")]
    pub kind: InterfaceKind,

    // IP addresses or FQDNs of the GTP-U endpoints.
    pub endpoints: Vec<String>,

    // DNNs served over this interface.
    #[serde(default)]
    pub network_instances: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SnssaiInfoConfig {
    pub snssai: Snssai,
    #[serde(default)]
    pub dnn_infos: Vec<DnnInfoConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DnnInfoConfig {
    pub dnn: String,

    // Data network access identifiers of the MEC locations reachable via this UPF.
    #[serde(default)]
    pub dnai_list: Vec<String>,

    #[serde(default)]
    pub pools: Vec<Ipv4Net>,

    // Ranges reserved for subscribers with a static address.
    #[serde(default)]
    pub static_pools: Vec<Ipv4Net>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LinkConfig {
    pub a: String,
    pub b: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RouteProfile {
    pub forwarding_policy_id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PfdConfig {
    pub app_id: String,
    pub flow_descriptions: Vec<String>,
}

pub fn parse_config(contents: &str) -> Result<Config> {
    Ok(toml::from_str(contents)?)
}

/// Load the SMF configuration from a TOML file.
pub fn load_config_file(filename: &str, logger: &Logger) -> Result<Config> {
    let path = std::env::current_dir()?;
    let contents = fs::read_to_string(filename).inspect_err(|e| {
        error!(
            logger,
            "Failed to load config file {filename} (current directory {}) with error code {e}",
            path.display()
        )
    })?;
    let config = parse_config(&contents)?;
    info!(
        logger,
        "Loaded {} user plane nodes and {} links from {filename}",
        config.user_plane.nodes.len(),
        config.user_plane.links.len()
    );
    Ok(config)
}
