mod data;
mod error;
mod procedures;
mod protocols;
mod smf;

use data::*;
use procedures::{HandlerApi, Procedure};

pub use data::{
    AnTunnel, Config, CreateSessionRequest, CreateSessionResponse, DefaultQos, PccRule, QosData,
    RouteProfile, RouteToLocation, SessionDelta, SessionInfo, SessionRule, SmContextState,
    SmPolicyDecision, SmfNotification, Snssai, TrafficControlData, Upf, UpfRegistry,
    UpNodeKind, UpfSelectionParams, UpfStatus, UserPlaneTopology, load_config_file, parse_config,
};
pub use error::{Cause5gsm, SmfError, cause_of};
pub use smf::{PfcpTransport, Smf, SmfEvent};
