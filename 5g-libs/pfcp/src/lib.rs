//! pfcp - structured model of the forwarding-control (N4) protocol messages exchanged between
//! the SMF and its UPFs.  There is no codec here: a transport serializes these however it likes.
mod ies;
mod messages;

pub use ies::*;
pub use messages::*;
