use super::MockUpf;
use anyhow::{Result, anyhow};
use async_channel::Sender;
use async_std::task::JoinHandle;
use async_trait::async_trait;
use pfcp::{Bitrate, NodeId, PfcpMessage};
use slog::{Drain, Logger, debug, o};
use smf::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// gNB1 - UPF1 - UPF2 - UPF3 (internet anchor with the address pools, edge site "edge")
//                   \
//                    UPF4 (MEC site "mec")
pub const TEST_CONFIG: &str = r#"
[smf]
node_id = "10.100.200.1"
pfcp_response_timeout_ms = 1000

[route_profiles.mec-profile]
forwarding_policy_id = "fwd-mec"

[[pfds]]
app_id = "video"
flow_descriptions = ["permit out 17 from 198.51.100.0/24 to assigned"]

[[user_plane.nodes]]
name = "gNB1"
type = "AN"
node_id = "192.168.179.100"

[[user_plane.nodes]]
name = "UPF1"
type = "UPF"
node_id = "10.200.200.101"
interfaces = [
    { type = "N3", endpoints = ["192.168.179.1"] },
    { type = "N9", endpoints = ["10.1.0.1"] },
]
snssai_infos = [{ snssai = { sst = 1 }, dnn_infos = [{ dnn = "internet" }] }]

[[user_plane.nodes]]
name = "UPF2"
type = "UPF"
node_id = "10.200.200.102"
interfaces = [{ type = "N9", endpoints = ["10.1.0.2"] }]
snssai_infos = [{ snssai = { sst = 1 }, dnn_infos = [{ dnn = "internet" }] }]

[[user_plane.nodes]]
name = "UPF3"
type = "UPF"
node_id = "10.200.200.103"
interfaces = [{ type = "N9", endpoints = ["10.1.0.3"] }]
snssai_infos = [{ snssai = { sst = 1 }, dnn_infos = [
    { dnn = "internet", pools = ["10.60.0.0/24"], static_pools = ["10.60.0.240/28"] },
    { dnn = "internet", dnai_list = ["edge"] },
] }]

[[user_plane.nodes]]
name = "UPF4"
type = "UPF"
node_id = "10.200.200.104"
interfaces = [{ type = "N9", endpoints = ["10.1.0.4"] }]
snssai_infos = [{ snssai = { sst = 1 }, dnn_infos = [{ dnn = "internet", dnai_list = ["mec"] }] }]

[[user_plane.links]]
a = "gNB1"
b = "UPF1"

[[user_plane.links]]
a = "UPF1"
b = "UPF2"

[[user_plane.links]]
a = "UPF2"
b = "UPF3"

[[user_plane.links]]
a = "UPF2"
b = "UPF4"
"#;

pub const SUPI: &str = "imsi-001010000000001";

/// Delivers the SMF's PFCP messages to the mock UPFs.
struct MockTransport {
    routes: HashMap<NodeId, Sender<PfcpMessage>>,
}

#[async_trait]
impl PfcpTransport for MockTransport {
    async fn send(&self, peer: &NodeId, message: PfcpMessage, logger: &Logger) -> Result<()> {
        let sender = self
            .routes
            .get(peer)
            .ok_or_else(|| anyhow!("No route to {peer}"))?;
        debug!(logger, "{} to {}", message.name(), peer);
        sender.send(message).await?;
        Ok(())
    }
}

/// Starts an SMF controlling four mock UPFs, all of them associated.
pub async fn init() -> Result<(Smf, [MockUpf; 4], Logger)> {
    init_with_config(TEST_CONFIG).await
}

/// As `init()`, but with UPFs that give up on an exchange after 200ms.
pub async fn init_with_short_timeout() -> Result<(Smf, [MockUpf; 4], Logger)> {
    let config = TEST_CONFIG.replace(
        "pfcp_response_timeout_ms = 1000",
        "pfcp_response_timeout_ms = 200",
    );
    init_with_config(&config).await
}

async fn init_with_config(config: &str) -> Result<(Smf, [MockUpf; 4], Logger)> {
    let (smf, upfs, logger) = init_unassociated(config).await?;
    for upf in upfs.iter() {
        upf.handle_association_setup().await?;
    }
    Ok((smf, upfs, logger))
}

/// Starts the SMF, leaving the association setup requests unanswered.
pub async fn init_unassociated(config: &str) -> Result<(Smf, [MockUpf; 4], Logger)> {
    exit_on_panic();
    let logger = init_logging();
    let config = parse_config(config)?;

    let mut routes = HashMap::new();
    let mut channels = vec![];
    for node in config
        .user_plane
        .nodes
        .iter()
        .filter(|n| n.kind == UpNodeKind::Upf)
    {
        let node_id: NodeId = node.node_id.parse()?;
        let (sender, receiver) = async_channel::unbounded();
        routes.insert(node_id.clone(), sender);
        channels.push((node.name.clone(), node_id, receiver));
    }

    let transport = Arc::new(MockTransport { routes });
    let smf = Smf::start(config, transport, logger.new(o!("smf" => 1))).await?;
    let upfs: Vec<MockUpf> = channels
        .into_iter()
        .map(|(name, node_id, receiver)| MockUpf::new(&name, node_id, receiver, smf.clone(), &logger))
        .collect();
    let upfs: [MockUpf; 4] = upfs
        .try_into()
        .map_err(|v: Vec<MockUpf>| anyhow!("Expected 4 UPFs, got {}", v.len()))?;
    Ok((smf, upfs, logger))
}

fn exit_on_panic() {
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        std::process::exit(1);
    }));
}

fn init_logging() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build();
    let drain = std::sync::Mutex::new(drain).fuse();
    let drain = slog_envlogger::new(drain);
    slog::Logger::root(drain, o!())
}

pub fn internet() -> Snssai {
    Snssai::new(1, None)
}

pub const SESSION_AMBR: Bitrate = Bitrate {
    uplink: 100_000,
    downlink: 200_000,
};

/// A decision with just the session rule: default QoS flow 9.
pub fn default_policy() -> SmPolicyDecision {
    let mut decision = SmPolicyDecision::default();
    decision.session_rules.insert(
        "sr-1".to_string(),
        SessionRule {
            id: "sr-1".to_string(),
            default_qos: DefaultQos {
                qfi: 9,
                session_ambr: SESSION_AMBR,
            },
        },
    );
    decision
}

/// The default policy plus a PCC rule steering traffic from the MEC application to DNAI "mec".
pub fn mec_policy() -> SmPolicyDecision {
    let mut decision = default_policy();
    decision.pcc_rules = BTreeMap::from([("pcc-mec".to_string(), mec_pcc_rule())]);
    decision.traffic_control.insert(
        "tc-mec".to_string(),
        TrafficControlData {
            id: "tc-mec".to_string(),
            route_to_location: Some(RouteToLocation {
                dnai: "mec".to_string(),
                route_profile: Some("mec-profile".to_string()),
            }),
        },
    );
    decision.qos_data.insert(
        "qos-mec".to_string(),
        QosData {
            id: "qos-mec".to_string(),
            qfi: 5,
            mbr: Some(Bitrate {
                uplink: 10_000,
                downlink: 10_000,
            }),
            gbr: None,
        },
    );
    decision
}

pub fn mec_pcc_rule() -> PccRule {
    PccRule {
        id: "pcc-mec".to_string(),
        precedence: 100,
        flow_description: Some("permit out ip from 10.100.0.0/16 to assigned".to_string()),
        app_id: None,
        traffic_control: Some("tc-mec".to_string()),
        qos_data: Some("qos-mec".to_string()),
    }
}

pub fn create_request(supi: &str, policy: SmPolicyDecision) -> CreateSessionRequest {
    CreateSessionRequest {
        supi: supi.to_string(),
        pdu_session_id: 1,
        snssai: internet(),
        dnn: "internet".to_string(),
        requested_address: None,
        policy,
    }
}

// The SMF waits on the UPFs, so its procedures run on a task of their own while the test script
// plays the UPFs.

pub fn spawn_create(smf: &Smf, request: CreateSessionRequest) -> JoinHandle<Result<CreateSessionResponse>> {
    let smf = smf.clone();
    async_std::task::spawn(async move { smf.create_session(request).await })
}

pub fn spawn_modify(smf: &Smf, reference: &str, delta: SessionDelta) -> JoinHandle<Result<()>> {
    let smf = smf.clone();
    let reference = reference.to_string();
    async_std::task::spawn(async move { smf.modify_session(&reference, delta).await })
}

pub fn spawn_release(smf: &Smf, reference: &str) -> JoinHandle<Result<()>> {
    let smf = smf.clone();
    let reference = reference.to_string();
    async_std::task::spawn(async move { smf.release_session(&reference).await })
}

/// Creates a session on the default path UPF1 - UPF2 - UPF3.
pub async fn establish_default_session(
    smf: &Smf,
    upfs: &[MockUpf; 4],
) -> Result<CreateSessionResponse> {
    let task = spawn_create(smf, create_request(SUPI, default_policy()));
    for upf in upfs[0..3].iter() {
        upf.handle_session_establishment().await?;
    }
    task.await
}

pub async fn release(smf: &Smf, reference: &str, upfs: &[&MockUpf]) -> Result<()> {
    let task = spawn_release(smf, reference);
    for upf in upfs {
        upf.handle_session_deletion().await?;
    }
    task.await
}
