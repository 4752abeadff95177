use crate::appraisal::Status;
use crate::identity::OracleError;

pub type Result<T> = std::result::Result<T, AppraisalError>;

#[derive(thiserror::Error, Debug)]
pub enum AppraisalError {
    #[error("{party} is not permitted to {action}")]
    PermissionDenied { party: String, action: &'static str },
    #[error("appraisal is {actual}, expected one of {expected:?}")]
    InvalidTransition {
        expected: Vec<Status>,
        actual: Status,
    },
    #[error("{0:?} is not a valid appraisal status")]
    InvalidStatus(String),
    #[error("invalid {field}: {value:?}")]
    InvalidInput { field: &'static str, value: String },
    #[error(
        "content of {appraisal_id} does not match signature {signature_id} (signed {signed}, now {current})"
    )]
    IntegrityMismatch {
        appraisal_id: String,
        signature_id: String,
        signed: String,
        current: String,
    },
    #[error("referenced record {key} is unavailable: {reason}")]
    ReferenceUnavailable { key: String, reason: String },
    #[error("identity of {party} is unavailable")]
    IdentityUnavailable {
        party: String,
        #[source]
        source: OracleError,
    },
    #[error("certificate of {party} is malformed: {reason}")]
    CertificateMalformed { party: String, reason: String },
    #[error("index {index} is unavailable: {reason}")]
    IndexUnavailable { index: String, reason: String },
    #[error("ledger write failed: {0}")]
    WriteFailed(String),
    #[error("record {key} could not be decoded: {reason}")]
    CorruptRecord { key: String, reason: String },
    #[error("failed to generate identifier: {0}")]
    IdGeneration(String),
    #[error("{function} takes {expected} arguments, got {got}")]
    InvalidArguments {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
}

impl AppraisalError {
    pub(crate) fn denied(party: &str, action: &'static str) -> Self {
        Self::PermissionDenied {
            party: party.to_string(),
            action,
        }
    }

    pub(crate) fn unavailable(key: &str, reason: impl ToString) -> Self {
        Self::ReferenceUnavailable {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}
