//! Error types for SPC command emulation

use crate::scsi::{asc, sense_key, SenseData};
use thiserror::Error;

/// Reason a command was terminated with CHECK CONDITION
///
/// Every reason is terminal for the command. The transport turns it into
/// sense data with [`SenseReason::sense`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SenseReason {
    #[error("unsupported SCSI operation code")]
    UnsupportedOpcode,

    #[error("invalid field in CDB")]
    InvalidCdbField,

    #[error("invalid field in parameter list")]
    InvalidParameterList,

    #[error("parameter list length error")]
    ParameterListLength,

    #[error("unknown mode page")]
    UnknownModePage,

    #[error("logical unit communication failure")]
    CommunicationFailure,
}

impl SenseReason {
    /// Sense key, ASC and ASCQ reported for this reason
    pub fn sense(&self) -> SenseData {
        match self {
            SenseReason::UnsupportedOpcode => SenseData::new(
                sense_key::ILLEGAL_REQUEST,
                asc::INVALID_COMMAND_OPERATION_CODE,
                0,
            ),
            SenseReason::InvalidCdbField => {
                SenseData::new(sense_key::ILLEGAL_REQUEST, asc::INVALID_FIELD_IN_CDB, 0)
            }
            SenseReason::InvalidParameterList => SenseData::new(
                sense_key::ILLEGAL_REQUEST,
                asc::INVALID_FIELD_IN_PARAMETER_LIST,
                0,
            ),
            SenseReason::ParameterListLength => SenseData::new(
                sense_key::ILLEGAL_REQUEST,
                asc::PARAMETER_LIST_LENGTH_ERROR,
                0,
            ),
            // reported with the same ASC as a bad CDB field
            SenseReason::UnknownModePage => {
                SenseData::new(sense_key::ILLEGAL_REQUEST, asc::INVALID_FIELD_IN_CDB, 0)
            }
            SenseReason::CommunicationFailure => SenseData::new(
                sense_key::NOT_READY,
                asc::LOGICAL_UNIT_COMMUNICATION_FAILURE,
                0,
            ),
        }
    }
}

/// Crate-level errors
#[derive(Debug, Error)]
pub enum SpcError {
    #[error("Command rejected: {0}")]
    Sense(#[from] SenseReason),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for device and port configuration
pub type SpcResult<T> = Result<T, SpcError>;

/// Result type for command emulation
pub type SenseResult<T> = Result<T, SenseReason>;

/// Describe a sense key/ASC pair for diagnostics
///
/// Used when logging completions and by tests to check sense payloads.
pub fn decode_sense(key: u8, code: u8, qualifier: u8) -> String {
    match (key, code, qualifier) {
        (sense_key::NO_SENSE, 0x00, 0x00) => "No sense: command completed without error".to_string(),
        (sense_key::ILLEGAL_REQUEST, asc::INVALID_COMMAND_OPERATION_CODE, 0x00) => {
            "Illegal request: invalid command operation code".to_string()
        }
        (sense_key::ILLEGAL_REQUEST, asc::INVALID_FIELD_IN_CDB, 0x00) => {
            "Illegal request: invalid field in CDB".to_string()
        }
        (sense_key::ILLEGAL_REQUEST, asc::INVALID_FIELD_IN_PARAMETER_LIST, 0x00) => {
            "Illegal request: invalid field in parameter list".to_string()
        }
        (sense_key::ILLEGAL_REQUEST, asc::PARAMETER_LIST_LENGTH_ERROR, 0x00) => {
            "Illegal request: parameter list length error".to_string()
        }
        (sense_key::NOT_READY, asc::LOGICAL_UNIT_COMMUNICATION_FAILURE, 0x00) => {
            "Not ready: logical unit communication failure".to_string()
        }
        (sense_key::UNIT_ATTENTION, code, qualifier) => format!(
            "Unit attention: ASC 0x{:02x} ASCQ 0x{:02x}",
            code, qualifier
        ),
        (key, code, qualifier) => format!(
            "Sense key 0x{:x}: ASC 0x{:02x} ASCQ 0x{:02x}",
            key, code, qualifier
        ),
    }
}
