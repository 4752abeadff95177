//! Service layer API for the appraisal workflow
//!
//! Each operation loads what it needs, runs every permission and status check,
//! stages its writes and commits them in one go. A failed check leaves the
//! ledger untouched.
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::appraisal::{Appraisal, AppraisalRequest, ConceptFields, Status};
use crate::error::{AppraisalError, Result};
use crate::identity::{IdentityOracle, Role, RoleResolver};
use crate::ledger::{APPRAISALS_INDEX, Ledger, WriteSet, read_guarded, read_record};
use crate::records::{CaseFile, PropertyDocument, PropertyStatus, Registry, User};
use crate::resolver::{ClientView, ReferenceResolver};
use crate::signature::{Signature, SignatureLedger};
use crate::types::{Amount, TimeStamp};
use crate::utils::{APPRAISAL_HRP, new_uuid_to_bech32};

/// Which attestation field of an appraisal a signature sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationSlot {
    Appraiser,
    Requestor,
    Client,
    ClientQuote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub slot: AttestationSlot,
    pub signature: Signature,
    /// whether the signature still matches the current content
    pub current: bool,
}

/// Who a party is, as far as the ledger and the identity oracle know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub role: Role,
    pub user: User,
    /// case file of the client a client-role party acts for
    pub case_file: Option<String>,
}

pub struct AppraisalService<L, O> {
    ledger: Arc<L>,
    roles: RoleResolver<O>,
    signatures: SignatureLedger<L>,
    registry: Registry<L>,
    resolver: ReferenceResolver<L>,
}

impl<L: Ledger, O: IdentityOracle> AppraisalService<L, O> {
    pub fn new(ledger: Arc<L>, oracle: O) -> Self {
        Self {
            roles: RoleResolver::new(oracle),
            signatures: SignatureLedger::new(ledger.clone()),
            registry: Registry::new(ledger.clone()),
            resolver: ReferenceResolver::new(ledger.clone()),
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }
    pub fn registry(&self) -> &Registry<L> {
        &self.registry
    }
    pub fn signatures(&self) -> &SignatureLedger<L> {
        &self.signatures
    }
    pub fn roles(&self) -> &RoleResolver<O> {
        &self.roles
    }
    pub fn resolver(&self) -> &ReferenceResolver<L> {
        &self.resolver
    }

    pub fn load_appraisal(&self, appraisal_id: &str) -> Result<Appraisal> {
        read_record(&*self.ledger, appraisal_id)
    }

    fn load_for_update(&self, writes: &mut WriteSet, appraisal_id: &str) -> Result<Appraisal> {
        read_guarded(&*self.ledger, writes, appraisal_id)
    }

    fn stage_property_status(
        &self,
        writes: &mut WriteSet,
        property_id: &str,
        status: PropertyStatus,
    ) -> Result<()> {
        let mut property: PropertyDocument = read_guarded(&*self.ledger, writes, property_id)?;
        property.appraisal_status = status;
        writes.put_record(property_id, &property)
    }

    fn commit(&self, mut writes: WriteSet, appraisal: &Appraisal) -> Result<()> {
        writes.put_record(&appraisal.appraisal_id, appraisal)?;
        self.ledger.commit(&writes)?;
        Ok(())
    }

    /// Fails with `PermissionDenied` unless `party` is the appraiser role and
    /// the appraiser recorded on `appraisal`.
    fn require_assigned_appraiser(
        &self,
        party: &str,
        appraisal: &Appraisal,
        action: &'static str,
    ) -> Result<()> {
        self.roles.require(party, Role::Appraiser, action)?;
        if party != appraisal.appraiser {
            tracing::warn!(party, appraiser = %appraisal.appraiser, action, "not the assigned appraiser");
            return Err(AppraisalError::denied(party, action));
        }
        Ok(())
    }

    /// Fails with `PermissionDenied` unless the party's active client is the
    /// appraisal's client.
    fn require_client_context(
        &self,
        party: &str,
        appraisal: &Appraisal,
        action: &'static str,
    ) -> Result<()> {
        let user = self.registry.user(party)?;
        if user.active_client.as_deref() != Some(appraisal.client.as_str()) {
            tracing::warn!(
                party,
                active_client = ?user.active_client,
                client = %appraisal.client,
                action,
                "client context mismatch"
            );
            return Err(AppraisalError::denied(party, action));
        }
        Ok(())
    }

    /// Request a new appraisal for a property
    pub fn create_appraisal(&self, request: AppraisalRequest) -> Result<Appraisal> {
        self.roles
            .require(&request.requestor, Role::Requestor, "request an appraisal")?;
        let status = match request.status.as_deref() {
            Some(text) => text.parse()?,
            None => Status::Requested,
        };

        let mut writes = WriteSet::new();
        let appraisal = Appraisal::new(new_uuid_to_bech32(APPRAISAL_HRP)?, &request, status);
        self.stage_property_status(&mut writes, &request.property_id, PropertyStatus::Requested)?;
        writes.append_index(APPRAISALS_INDEX, appraisal.appraisal_id.clone());
        self.commit(writes, &appraisal)?;

        info!(
            appraisal = %appraisal.appraisal_id,
            requestor = %appraisal.requestor,
            property = %appraisal.property_id,
            %status,
            "appraisal requested"
        );
        Ok(appraisal)
    }

    /// Quote a price for an appraisal, awaiting the client's answer
    pub fn quote(&self, appraiser: &str, appraisal_id: &str, price: &str) -> Result<Appraisal> {
        let mut writes = WriteSet::new();
        let mut appraisal = self.load_for_update(&mut writes, appraisal_id)?;
        self.require_assigned_appraiser(appraiser, &appraisal, "quote this appraisal")?;

        appraisal.quote_price = Amount::parse("quote price", price)?;
        appraisal.quote_date = Some(TimeStamp::<Utc>::new());
        appraisal.status = Status::QuotePending;
        self.commit(writes, &appraisal)?;

        info!(appraisal = appraisal_id, price = %appraisal.quote_price, "quote submitted");
        Ok(appraisal)
    }

    /// Accept or reject a pending quote on behalf of the appraisal's client
    pub fn respond_to_quote(
        &self,
        client_user: &str,
        appraisal_id: &str,
        response: &str,
    ) -> Result<Appraisal> {
        let mut writes = WriteSet::new();
        let mut appraisal = self.load_for_update(&mut writes, appraisal_id)?;
        self.require_client_context(client_user, &appraisal, "answer this quote")?;
        require_status(&appraisal, &[Status::QuotePending])?;
        appraisal.status = response.parse()?;

        let digest = appraisal.fingerprint();
        let signature =
            self.signatures
                .stage_sign(&mut writes, client_user, appraisal_id, &digest)?;
        appraisal.client_quote_signature = Some(signature.id);
        self.stage_property_status(&mut writes, &appraisal.property_id, PropertyStatus::InProgress)?;
        self.commit(writes, &appraisal)?;

        info!(appraisal = appraisal_id, status = %appraisal.status, "quote answered");
        Ok(appraisal)
    }

    /// Write the appraisal content and sign it as the appraiser
    pub fn create_appraisal_concept(
        &self,
        appraiser: &str,
        appraisal_id: &str,
        fields: ConceptFields,
    ) -> Result<Appraisal> {
        let mut writes = WriteSet::new();
        let mut appraisal = self.load_for_update(&mut writes, appraisal_id)?;
        self.require_assigned_appraiser(appraiser, &appraisal, "write this concept")?;

        appraisal.content = fields.into_content()?;
        // counter-signatures attest the previous content
        appraisal.requestor_signature = None;
        appraisal.client_signature = None;

        let digest = appraisal.fingerprint();
        let signature = self
            .signatures
            .stage_sign(&mut writes, appraiser, appraisal_id, &digest)?;
        appraisal.appraiser_signature = Some(signature.id);
        appraisal.status = Status::ConceptPending;
        self.commit(writes, &appraisal)?;

        info!(
            appraisal = appraisal_id,
            valuation = %appraisal.content.valuation,
            "concept submitted"
        );
        Ok(appraisal)
    }

    /// Counter-sign a pending concept as the requestor or the client.
    ///
    /// The status only moves to `response` once both have signed.
    pub fn respond_to_concept(
        &self,
        party: &str,
        appraisal_id: &str,
        response: &str,
    ) -> Result<Appraisal> {
        let mut writes = WriteSet::new();
        let mut appraisal = self.load_for_update(&mut writes, appraisal_id)?;
        let role = self.roles.resolve_role(party)?;
        match role {
            Role::Requestor => {}
            Role::Client => {
                self.require_client_context(party, &appraisal, "answer this concept")?
            }
            Role::Appraiser | Role::Unrecognised(_) | Role::Unresolved => {
                tracing::warn!(party, %role, "role may not answer a concept");
                return Err(AppraisalError::denied(party, "answer this concept"));
            }
        }
        require_status(&appraisal, &[Status::ConceptPending])?;

        let concept_signature = appraisal.appraiser_signature.clone().ok_or_else(|| {
            AppraisalError::unavailable(appraisal_id, "no signed concept to answer")
        })?;
        let digest = appraisal.fingerprint();
        self.signatures
            .verify(&concept_signature, appraisal_id, &digest)?;

        let signature = self
            .signatures
            .stage_sign(&mut writes, party, appraisal_id, &digest)?;
        if role == Role::Requestor {
            appraisal.requestor_signature = Some(signature.id);
        } else {
            appraisal.client_signature = Some(signature.id);
        }

        if appraisal.has_concept_quorum() {
            appraisal.status = response.parse()?;
            self.stage_property_status(&mut writes, &appraisal.property_id, PropertyStatus::Signed)?;
            info!(appraisal = appraisal_id, status = %appraisal.status, "concept answered");
        } else {
            info!(appraisal = appraisal_id, party, %role, "concept counter-signed, awaiting quorum");
        }
        self.commit(writes, &appraisal)?;
        Ok(appraisal)
    }

    /// Close a signed appraisal once every attestation still holds
    pub fn finalize_appraisal(&self, requestor: &str, appraisal_id: &str) -> Result<Appraisal> {
        let mut writes = WriteSet::new();
        let mut appraisal = self.load_for_update(&mut writes, appraisal_id)?;
        self.roles
            .require(requestor, Role::Requestor, "finalize this appraisal")?;
        if requestor != appraisal.requestor {
            return Err(AppraisalError::denied(requestor, "finalize this appraisal"));
        }
        require_status(&appraisal, &[Status::Signed])?;

        let digest = appraisal.fingerprint();
        for id in [
            &appraisal.appraiser_signature,
            &appraisal.requestor_signature,
            &appraisal.client_signature,
        ] {
            let id = id.as_deref().ok_or_else(|| {
                AppraisalError::unavailable(appraisal_id, "missing concept signature")
            })?;
            self.signatures.verify(id, appraisal_id, &digest)?;
        }

        appraisal.status = Status::Finalized;
        self.stage_property_status(&mut writes, &appraisal.property_id, PropertyStatus::Finalized)?;
        self.commit(writes, &appraisal)?;

        info!(appraisal = appraisal_id, "appraisal finalized");
        Ok(appraisal)
    }

    /// Record how far a case file has come. Reserved for requestors.
    pub fn set_casefile_progress(
        &self,
        party: &str,
        case_file_id: &str,
        progress: &str,
    ) -> Result<CaseFile> {
        self.roles
            .require(party, Role::Requestor, "set case file progress")?;
        let mut writes = WriteSet::new();
        let mut case_file: CaseFile = read_guarded(&*self.ledger, &mut writes, case_file_id)?;
        case_file.progress = progress
            .trim()
            .parse()
            .map_err(|_| AppraisalError::InvalidInput {
                field: "progress",
                value: progress.to_string(),
            })?;
        writes.put_record(case_file_id, &case_file)?;
        self.ledger.commit(&writes)?;

        info!(case_file = case_file_id, progress = case_file.progress, "case file progress set");
        Ok(case_file)
    }

    /// A client portfolio as seen by `caller`.
    ///
    /// Requestors see every client, anyone else only the clients listed on
    /// their own user record.
    pub fn client(&self, caller: &str, client_id: &str) -> Result<ClientView> {
        let user = self.registry.user(caller)?;
        if self.roles.resolve_role(caller)? != Role::Requestor
            && !user.clients.iter().any(|c| c == client_id)
        {
            tracing::warn!(caller, client = client_id, "client outside caller's clients");
            return Err(AppraisalError::denied(caller, "view this client"));
        }
        self.resolver.client_portfolio(client_id)
    }

    /// Portfolios of the clients listed on the caller's user record.
    pub fn assigned_clients(&self, caller: &str) -> Result<Vec<ClientView>> {
        self.registry
            .user(caller)?
            .clients
            .iter()
            .map(|id| self.resolver.client_portfolio(id))
            .collect()
    }

    /// Portfolios of every registered client. Reserved for requestors.
    pub fn all_clients(&self, caller: &str) -> Result<Vec<ClientView>> {
        self.roles.require(caller, Role::Requestor, "list all clients")?;
        self.registry
            .clients()?
            .iter()
            .map(|client| self.resolver.client_portfolio(&client.id))
            .collect()
    }

    /// Looks a party up in both the registry and the identity oracle.
    pub fn authenticate(&self, party: &str) -> Result<Session> {
        let user = self.registry.user(party)?;
        let role = self.roles.resolve_role(party)?;
        let acting_for = user
            .active_client
            .as_deref()
            .or(user.clients.first().map(String::as_str));
        let case_file = match (role, acting_for) {
            (Role::Client, Some(client)) => self.registry.client(client)?.case_file,
            _ => None,
        };
        info!(party, %role, "authenticated");
        Ok(Session {
            role,
            user,
            case_file,
        })
    }

    /// Every signature attached to an appraisal and whether it matches the
    /// content as it is now.
    pub fn verify_attestations(&self, appraisal_id: &str) -> Result<Vec<Attestation>> {
        let appraisal = self.load_appraisal(appraisal_id)?;
        let digest = appraisal.fingerprint();
        let slots = [
            (AttestationSlot::ClientQuote, &appraisal.client_quote_signature),
            (AttestationSlot::Appraiser, &appraisal.appraiser_signature),
            (AttestationSlot::Requestor, &appraisal.requestor_signature),
            (AttestationSlot::Client, &appraisal.client_signature),
        ];

        let mut attestations = Vec::new();
        for (slot, id) in slots {
            let Some(id) = id else { continue };
            let signature = self.signatures.load(id)?;
            attestations.push(Attestation {
                slot,
                current: signature.is_valid(appraisal_id, &digest),
                signature,
            });
        }
        Ok(attestations)
    }
}

fn require_status(appraisal: &Appraisal, expected: &[Status]) -> Result<()> {
    if expected.contains(&appraisal.status) {
        return Ok(());
    }
    Err(AppraisalError::InvalidTransition {
        expected: expected.to_vec(),
        actual: appraisal.status,
    })
}
