//! Read side: expands stored references into embedded records.
//!
//! A view is either complete or not returned at all; the first reference that
//! cannot be fetched aborts the whole expansion with `ReferenceUnavailable`.
use std::sync::Arc;

use crate::appraisal::Appraisal;
use crate::error::Result;
use crate::ledger::{APPRAISALS_INDEX, Ledger, read_index, read_record};
use crate::records::{CaseFile, Client, LoanFile, PropertyDocument, Registry, Tenant, User};
use crate::signature::{Signature, SignatureLedger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyView {
    pub property: PropertyDocument,
    pub tenants: Vec<Tenant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppraisalView {
    pub appraisal: Appraisal,
    pub requestor: User,
    pub appraiser: User,
    pub client: Client,
    pub property: PropertyView,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanFileView {
    pub loan_file: LoanFile,
    pub property: PropertyView,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseFileView {
    pub case_file: CaseFile,
    pub loan_files: Vec<LoanFileView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientView {
    pub client: Client,
    pub case_file: Option<CaseFileView>,
}

pub struct ReferenceResolver<L> {
    ledger: Arc<L>,
    registry: Registry<L>,
    signatures: SignatureLedger<L>,
}

impl<L: Ledger> ReferenceResolver<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            registry: Registry::new(ledger.clone()),
            signatures: SignatureLedger::new(ledger.clone()),
            ledger,
        }
    }

    pub fn property(&self, property_id: &str) -> Result<PropertyView> {
        let property = self.registry.property(property_id)?;
        let tenants = property
            .tenants
            .iter()
            .map(|id| self.registry.tenant(id))
            .collect::<Result<Vec<_>>>()?;
        Ok(PropertyView { property, tenants })
    }

    fn expand_appraisal(&self, appraisal: Appraisal) -> Result<AppraisalView> {
        Ok(AppraisalView {
            requestor: self.registry.user(&appraisal.requestor)?,
            appraiser: self.registry.user(&appraisal.appraiser)?,
            client: self.registry.client(&appraisal.client)?,
            property: self.property(&appraisal.property_id)?,
            appraisal,
        })
    }

    /// An appraisal with its parties and property (and tenants) embedded.
    pub fn appraisal_details(&self, appraisal_id: &str) -> Result<AppraisalView> {
        let appraisal: Appraisal = read_record(&*self.ledger, appraisal_id)?;
        self.expand_appraisal(appraisal)
    }

    /// A client with case file, loan files, their properties and tenants.
    pub fn client_portfolio(&self, client_id: &str) -> Result<ClientView> {
        let client = self.registry.client(client_id)?;
        let case_file = match &client.case_file {
            Some(id) => {
                let case_file = self.registry.case_file(id)?;
                let loan_files = case_file
                    .loan_files
                    .iter()
                    .map(|id| -> Result<LoanFileView> {
                        let loan_file = self.registry.loan_file(id)?;
                        let property = self.property(&loan_file.property_id)?;
                        Ok(LoanFileView {
                            loan_file,
                            property,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(CaseFileView {
                    case_file,
                    loan_files,
                })
            }
            None => None,
        };
        Ok(ClientView { client, case_file })
    }

    /// Every appraisal in creation order, expanded.
    pub fn list_appraisals(&self) -> Result<Vec<AppraisalView>> {
        read_index(&*self.ledger, APPRAISALS_INDEX)?
            .iter()
            .map(|id| self.appraisal_details(id))
            .collect()
    }

    /// Appraisals where `party` is the requestor, the appraiser or the client.
    pub fn appraisals_for(&self, party: &str) -> Result<Vec<AppraisalView>> {
        let mut views = Vec::new();
        for id in read_index(&*self.ledger, APPRAISALS_INDEX)? {
            let appraisal: Appraisal = read_record(&*self.ledger, &id)?;
            if [&appraisal.requestor, &appraisal.appraiser, &appraisal.client]
                .iter()
                .any(|p| p.as_str() == party)
            {
                views.push(self.expand_appraisal(appraisal)?);
            }
        }
        Ok(views)
    }

    pub fn list_appraisers(&self) -> Result<Vec<User>> {
        self.registry.appraisers()
    }

    pub fn list_signatures(&self) -> Result<Vec<Signature>> {
        self.signatures.list()
    }
}
