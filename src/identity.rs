//! Party roles derived from identity certificates.
//!
//! The identity oracle hands out a certificate blob per party: PEM text,
//! optionally percent-encoded the way the certificate authority's registrar
//! returns it. The role lives in a private extension whose value is an ASCII
//! decimal integer.
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::error::{AppraisalError, Result};

/// Extension carrying the enrolment role of the certificate subject.
pub const ROLE_EXTENSION_OID: &str = "2.1.3.4.5.6.7";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// requestor or bank employee
    Requestor,
    Client,
    Appraiser,
    Unrecognised(i64),
    /// the certificate carries no role extension; grants nothing
    Unresolved,
}

impl Role {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Role::Requestor,
            2 => Role::Client,
            3 => Role::Appraiser,
            other => Role::Unrecognised(other),
        }
    }
    pub fn code(&self) -> i64 {
        match self {
            Role::Requestor => 1,
            Role::Client => 2,
            Role::Appraiser => 3,
            Role::Unrecognised(code) => *code,
            Role::Unresolved => -1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Requestor => f.write_str("requestor"),
            Role::Client => f.write_str("client"),
            Role::Appraiser => f.write_str("appraiser"),
            Role::Unrecognised(code) => write!(f, "unrecognised({code})"),
            Role::Unresolved => f.write_str("unresolved"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("identity oracle unreachable: {0}")]
    Unreachable(String),
    #[error("no certificate on file")]
    NoCertificate,
}

pub trait IdentityOracle {
    fn fetch_certificate(&self, party: &str) -> std::result::Result<String, OracleError>;
}

/// Identity oracle backed by certificates known up front.
#[derive(Debug, Default, Clone)]
pub struct CertificateDirectory {
    certificates: HashMap<String, String>,
}

impl CertificateDirectory {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, party: impl Into<String>, certificate: impl Into<String>) {
        self.certificates.insert(party.into(), certificate.into());
    }
    pub fn with(mut self, party: impl Into<String>, certificate: impl Into<String>) -> Self {
        self.insert(party, certificate);
        self
    }
    /// Loads every `<party>.pem` file of `dir`, keyed by file stem.
    pub fn from_dir(dir: &Path) -> std::io::Result<Self> {
        let mut directory = Self::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("pem") {
                continue;
            }
            if let Some(party) = path.file_stem().and_then(|stem| stem.to_str()) {
                let certificate = std::fs::read_to_string(&path)?;
                directory.insert(party, certificate);
            }
        }
        debug!(count = directory.certificates.len(), dir = %dir.display(), "loaded certificates");
        Ok(directory)
    }
    pub fn len(&self) -> usize {
        self.certificates.len()
    }
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

impl IdentityOracle for CertificateDirectory {
    fn fetch_certificate(&self, party: &str) -> std::result::Result<String, OracleError> {
        self.certificates
            .get(party)
            .cloned()
            .ok_or(OracleError::NoCertificate)
    }
}

/// Extracts the role from a certificate blob.
///
/// A certificate without the role extension yields [`Role::Unresolved`]; any
/// decoding failure is reported as the reason string.
pub fn role_from_certificate(blob: &str) -> std::result::Result<Role, String> {
    let pem_text = percent_decode_str(blob.trim())
        .decode_utf8()
        .map_err(|e| format!("certificate is not utf-8: {e}"))?;
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem_text.as_bytes())
        .map_err(|e| format!("invalid pem: {e}"))?;
    let certificate = pem
        .parse_x509()
        .map_err(|e| format!("invalid x509: {e}"))?;

    for extension in certificate.extensions() {
        if extension.oid.to_id_string() != ROLE_EXTENSION_OID {
            continue;
        }
        let text = std::str::from_utf8(extension.value)
            .map_err(|e| format!("role extension is not text: {e}"))?;
        let code = text
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("role extension {text:?} is not an integer: {e}"))?;
        return Ok(Role::from_code(code));
    }
    Ok(Role::Unresolved)
}

/// Resolves party roles against the identity oracle on every call.
pub struct RoleResolver<O> {
    oracle: O,
}

impl<O: IdentityOracle> RoleResolver<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }

    pub fn resolve_role(&self, party: &str) -> Result<Role> {
        let blob = self
            .oracle
            .fetch_certificate(party)
            .map_err(|source| AppraisalError::IdentityUnavailable {
                party: party.to_string(),
                source,
            })?;
        let role = role_from_certificate(&blob).map_err(|reason| {
            AppraisalError::CertificateMalformed {
                party: party.to_string(),
                reason,
            }
        })?;
        debug!(party, %role, "resolved role");
        Ok(role)
    }

    /// Fails with `PermissionDenied` unless `party` resolves to `role`.
    pub fn require(&self, party: &str, role: Role, action: &'static str) -> Result<()> {
        let resolved = self.resolve_role(party)?;
        if resolved != role {
            tracing::warn!(party, %resolved, required = %role, action, "role check failed");
            return Err(AppraisalError::denied(party, action));
        }
        Ok(())
    }
}
