mod bp_manager;
mod config;
mod datapath;
mod id_generator;
mod lifecycle;
mod policy;
mod rules;
mod session_registry;
mod sm_context;
mod snssai;
mod topology;
mod ue_ip_pool;
mod upf;

pub use bp_manager::*;
pub use config::*;
pub use datapath::*;
pub use id_generator::*;
pub use lifecycle::*;
pub use policy::*;
pub use rules::*;
pub use session_registry::*;
pub use sm_context::*;
pub use snssai::*;
pub use topology::*;
pub use ue_ip_pool::*;
pub use upf::*;
