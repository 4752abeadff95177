//! Reference graph records and their write-through registry.
//!
//! None of these records carry workflow logic. They exist so the appraisal
//! workflow can check a caller's client context and so read operations can
//! expand references into full records.
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{AppraisalError, Result};
use crate::ledger::{APPRAISERS_INDEX, CLIENTS_INDEX, Ledger, WriteSet, read_index, read_record};
use crate::types::Amount;
use crate::utils::{APPRAISAL_HRP, SIGNATURE_HRP};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
#[cbor(map)]
pub struct User {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    /// the client this party currently acts for
    #[n(2)]
    pub active_client: Option<String>,
    #[n(3)]
    pub clients: Vec<String>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active_client: None,
            clients: vec![],
        }
    }
    /// Adds `client` to the party's clients and makes it the active one.
    pub fn acting_for(mut self, client: impl Into<String>) -> Self {
        let client = client.into();
        if !self.clients.contains(&client) {
            self.clients.push(client.clone());
        }
        self.active_client = Some(client);
        self
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
#[cbor(map)]
pub struct Client {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub case_file: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
#[cbor(map)]
pub struct CaseFile {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub loan_files: Vec<String>,
    /// progress marker set by requestors, starts at 0
    #[n(2)]
    pub progress: u32,
}

impl CaseFile {
    pub fn new(id: impl Into<String>, loan_files: Vec<String>) -> Self {
        Self {
            id: id.into(),
            loan_files,
            progress: 0,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
#[cbor(map)]
pub struct LoanFile {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub property_id: String,
    #[n(2)]
    pub principal: Amount,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
#[cbor(map)]
pub struct Tenant {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub monthly_rent: Amount,
}

/// Appraisal progress as shown on the property, mirrored from the appraisal.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cbor(index_only)]
pub enum PropertyStatus {
    #[default]
    #[n(0)]
    NotRequested,
    #[n(1)]
    Requested,
    #[n(2)]
    InProgress,
    #[n(3)]
    Signed,
    #[n(4)]
    Finalized,
}

impl fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PropertyStatus::NotRequested => "none",
            PropertyStatus::Requested => "requested",
            PropertyStatus::InProgress => "in progress",
            PropertyStatus::Signed => "signed",
            PropertyStatus::Finalized => "finalized",
        })
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
#[cbor(map)]
pub struct PropertyDocument {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub address: String,
    #[n(2)]
    pub description: String,
    #[n(3)]
    pub tenants: Vec<String>,
    #[n(4)]
    pub appraisal_status: PropertyStatus,
}

impl PropertyDocument {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            description: String::new(),
            tenants: vec![],
            appraisal_status: PropertyStatus::NotRequested,
        }
    }
}

/// Write-through storage for reference graph records.
pub struct Registry<L> {
    ledger: Arc<L>,
}

impl<L: Ledger> Registry<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Stores `record` under `key`, listing the key in `index` when given.
    ///
    /// Index names and the appraisal and signature id spaces belong to the
    /// workflow and are refused with `InvalidInput`.
    fn store<T: minicbor::Encode<()>>(
        &self,
        key: &str,
        record: &T,
        index: Option<&str>,
    ) -> Result<()> {
        check_key(key)?;
        let mut writes = WriteSet::new();
        writes.put_record(key, record)?;
        if let Some(index) = index {
            if !read_index(&*self.ledger, index)?.iter().any(|id| id == key) {
                writes.append_index(index, key);
            }
        }
        self.ledger.commit(&writes)?;
        debug!(key, index = ?index, "stored record");
        Ok(())
    }

    pub fn add_user(&self, user: &User) -> Result<()> {
        self.store(&user.id, user, None)
    }
    /// Stores the user and lists it in the appraisers index.
    pub fn add_appraiser(&self, user: &User) -> Result<()> {
        self.store(&user.id, user, Some(APPRAISERS_INDEX))
    }
    /// Stores the client and lists it in the clients index.
    pub fn add_client(&self, client: &Client) -> Result<()> {
        self.store(&client.id, client, Some(CLIENTS_INDEX))
    }
    pub fn add_case_file(&self, case_file: &CaseFile) -> Result<()> {
        self.store(&case_file.id, case_file, None)
    }
    pub fn add_loan_file(&self, loan_file: &LoanFile) -> Result<()> {
        self.store(&loan_file.id, loan_file, None)
    }
    pub fn add_property(&self, property: &PropertyDocument) -> Result<()> {
        self.store(&property.id, property, None)
    }
    pub fn add_tenant(&self, tenant: &Tenant) -> Result<()> {
        self.store(&tenant.id, tenant, None)
    }

    pub fn user(&self, id: &str) -> Result<User> {
        read_record(&*self.ledger, id)
    }
    pub fn client(&self, id: &str) -> Result<Client> {
        read_record(&*self.ledger, id)
    }
    pub fn case_file(&self, id: &str) -> Result<CaseFile> {
        read_record(&*self.ledger, id)
    }
    pub fn loan_file(&self, id: &str) -> Result<LoanFile> {
        read_record(&*self.ledger, id)
    }
    pub fn property(&self, id: &str) -> Result<PropertyDocument> {
        read_record(&*self.ledger, id)
    }
    pub fn tenant(&self, id: &str) -> Result<Tenant> {
        read_record(&*self.ledger, id)
    }
    pub fn appraisers(&self) -> Result<Vec<User>> {
        read_index(&*self.ledger, APPRAISERS_INDEX)?
            .iter()
            .map(|id| self.user(id))
            .collect()
    }
    pub fn clients(&self) -> Result<Vec<Client>> {
        read_index(&*self.ledger, CLIENTS_INDEX)?
            .iter()
            .map(|id| self.client(id))
            .collect()
    }
}

fn check_key(key: &str) -> Result<()> {
    let workflow_id = [APPRAISAL_HRP, SIGNATURE_HRP]
        .iter()
        .any(|hrp| key.strip_prefix(hrp).is_some_and(|rest| rest.starts_with('1')));
    if key.is_empty() || key.starts_with('_') || workflow_id {
        tracing::warn!(key, "refused reserved key");
        return Err(AppraisalError::InvalidInput {
            field: "id",
            value: key.to_string(),
        });
    }
    Ok(())
}
