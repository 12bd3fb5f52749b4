//! error - failures of the session management core, and their mapping to 5GSM causes
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmfError {
    #[error("{0} identifiers exhausted")]
    Exhausted(&'static str),
    #[error("UPF {0} is not associated")]
    NotAssociated(String),
    #[error("No user plane path for {0}")]
    PathNotFound(String),
    #[error("No UE address available for {0}")]
    AddressExhausted(String),
    #[error("No response from UPF within {0:?}")]
    ProtocolTimeout(Duration),
    #[error("UPF rejected {0}")]
    Rejected(String),
    #[error("Session {0} not found")]
    SessionNotFound(String),
    #[error("Operation not allowed in state {0}")]
    InvalidState(String),
    #[error("Configuration error - {0}")]
    Config(String),
    #[error("Invalid policy - {0}")]
    InvalidPolicy(String),
}

/// 5GSM cause values (TS 24.501, 9.11.4.2) used to reject a session management request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cause5gsm {
    InsufficientResources = 26,
    MissingOrUnknownDnn = 27,
    RequestRejectedUnspecified = 31,
    RegularDeactivation = 36,
    NetworkFailure = 38,
    InsufficientResourcesForSliceAndDnn = 67,
    MissingOrUnknownDnnInSlice = 70,
    MessageNotCompatibleWithProtocolState = 101,
}

impl SmfError {
    pub fn cause(&self) -> Cause5gsm {
        match self {
            SmfError::Exhausted(_) => Cause5gsm::InsufficientResources,
            SmfError::AddressExhausted(_) => Cause5gsm::InsufficientResourcesForSliceAndDnn,
            SmfError::PathNotFound(_) => Cause5gsm::MissingOrUnknownDnnInSlice,
            SmfError::NotAssociated(_)
            | SmfError::ProtocolTimeout(_)
            | SmfError::Rejected(_)
            | SmfError::Config(_) => Cause5gsm::NetworkFailure,
            SmfError::SessionNotFound(_) | SmfError::InvalidPolicy(_) => {
                Cause5gsm::RequestRejectedUnspecified
            }
            SmfError::InvalidState(_) => Cause5gsm::MessageNotCompatibleWithProtocolState,
        }
    }
}

/// The cause to report for a failed procedure.  Anything that is not one of our own errors is
/// reported as a network failure.
pub fn cause_of(e: &anyhow::Error) -> Cause5gsm {
    e.downcast_ref::<SmfError>()
        .map(SmfError::cause)
        .unwrap_or(Cause5gsm::NetworkFailure)
}
