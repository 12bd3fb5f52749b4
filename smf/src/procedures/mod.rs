mod association_release;
mod association_setup;
mod handler_api;
mod pfcp_handler;
mod procedure;
mod session_procedures;
mod session_report;

pub use association_setup::AssociationSetupProcedure;
pub use handler_api::HandlerApi;
pub use pfcp_handler::PfcpHandler;
pub use procedure::Procedure;
pub use session_procedures::{
    SessionCreateProcedure, SessionModifyProcedure, SessionProcedure, SessionReleaseProcedure,
};
