//! Positional-argument entry points for named functions.
//!
//! `invoke` runs functions that write to the ledger, `query` the read-only
//! ones. Every function takes a fixed argument list; see [`INVOKE_FUNCTIONS`]
//! and [`QUERY_FUNCTIONS`] for the names and their argument order.
use std::sync::Arc;

use tracing::debug;

use crate::appraisal::{Appraisal, AppraisalRequest, ConceptFields};
use crate::error::{AppraisalError, Result};
use crate::identity::{IdentityOracle, Role};
use crate::ledger::Ledger;
use crate::records::{CaseFile, Client, LoanFile, PropertyDocument, Tenant, User};
use crate::resolver::{AppraisalView, ClientView, PropertyView};
use crate::service::{AppraisalService, Attestation, Session};
use crate::signature::Signature;
use crate::types::Amount;

pub const INVOKE_FUNCTIONS: &[(&str, &str)] = &[
    (
        "create_appraisal",
        "requestor appraiser client property_id [status]",
    ),
    ("quote", "appraiser appraisal_id price"),
    ("respond_to_quote", "client_user appraisal_id response"),
    (
        "create_appraisal_concept",
        "appraiser appraisal_id address description building_plan plot_size floor_area \
         building_volume land_quality building_quality photo_exterior photo_interior \
         photo_surroundings environment_report valuation",
    ),
    ("respond_to_concept", "party appraisal_id response"),
    ("finalize_appraisal", "requestor appraisal_id"),
    ("set_casefile_progress", "requestor case_file_id progress"),
    ("add_user", "id name active_client"),
    ("add_appraiser", "id name"),
    ("add_client", "id name case_file"),
    ("add_case_file", "id loan_files,..."),
    ("add_loan_file", "id property_id principal"),
    ("add_property", "id address description tenants,..."),
    ("add_tenant", "id name monthly_rent"),
];

pub const QUERY_FUNCTIONS: &[(&str, &str)] = &[
    ("get_appraisal", "appraisal_id"),
    ("get_appraisals", "[party]"),
    ("get_appraisers", ""),
    ("get_client", "caller client_id"),
    ("get_assigned_clients", "caller"),
    ("get_all_clients", "requestor"),
    ("get_property", "property_id"),
    ("get_signatures", ""),
    ("verify_appraisal", "appraisal_id"),
    ("get_role", "party"),
    ("authenticate", "party"),
];

#[derive(Debug)]
pub enum Response {
    Appraisal(Box<Appraisal>),
    Stored { key: String },
    Details(Box<AppraisalView>),
    Appraisals(Vec<AppraisalView>),
    Client(Box<ClientView>),
    Clients(Vec<ClientView>),
    CaseFile(CaseFile),
    Property(PropertyView),
    Users(Vec<User>),
    Signatures(Vec<Signature>),
    Attestations(Vec<Attestation>),
    Role(Role),
    Session(Box<Session>),
}

pub struct Dispatcher<L, O> {
    service: AppraisalService<L, O>,
}

fn take<'a, const N: usize>(function: &str, args: &'a [String]) -> Result<&'a [String; N]> {
    args.try_into()
        .map_err(|_| AppraisalError::InvalidArguments {
            function: function.to_string(),
            expected: N,
            got: args.len(),
        })
}

fn optional(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl<L: Ledger, O: IdentityOracle> Dispatcher<L, O> {
    pub fn new(ledger: Arc<L>, oracle: O) -> Self {
        Self {
            service: AppraisalService::new(ledger, oracle),
        }
    }

    pub fn service(&self) -> &AppraisalService<L, O> {
        &self.service
    }

    pub fn invoke(&self, function: &str, args: &[String]) -> Result<Response> {
        debug!(function, args = args.len(), "invoke");
        let registry = self.service.registry();
        let appraisal =
            |result: Result<Appraisal>| result.map(|a| Response::Appraisal(Box::new(a)));

        match function {
            "create_appraisal" => {
                let (fixed, status) = match args.len() {
                    5 => (&args[..4], optional(&args[4])),
                    _ => (args, None),
                };
                let [requestor, appraiser, client, property_id] = take::<4>(function, fixed)?;
                appraisal(self.service.create_appraisal(AppraisalRequest {
                    requestor: requestor.clone(),
                    appraiser: appraiser.clone(),
                    client: client.clone(),
                    property_id: property_id.clone(),
                    status,
                }))
            }
            "quote" => {
                let [appraiser, id, price] = take::<3>(function, args)?;
                appraisal(self.service.quote(appraiser, id, price))
            }
            "respond_to_quote" => {
                let [client_user, id, response] = take::<3>(function, args)?;
                appraisal(self.service.respond_to_quote(client_user, id, response))
            }
            "create_appraisal_concept" => {
                let invalid = || AppraisalError::InvalidArguments {
                    function: function.to_string(),
                    expected: ConceptFields::COUNT + 2,
                    got: args.len(),
                };
                let [appraiser, id, rest @ ..] = args else {
                    return Err(invalid());
                };
                let fields = ConceptFields::from_args(rest).ok_or_else(invalid)?;
                appraisal(self.service.create_appraisal_concept(appraiser, id, fields))
            }
            "respond_to_concept" => {
                let [party, id, response] = take::<3>(function, args)?;
                appraisal(self.service.respond_to_concept(party, id, response))
            }
            "finalize_appraisal" => {
                let [requestor, id] = take::<2>(function, args)?;
                appraisal(self.service.finalize_appraisal(requestor, id))
            }
            "set_casefile_progress" => {
                let [requestor, id, progress] = take::<3>(function, args)?;
                Ok(Response::CaseFile(self.service.set_casefile_progress(
                    requestor, id, progress,
                )?))
            }
            "add_user" => {
                let [id, name, active_client] = take::<3>(function, args)?;
                let mut user = User::new(id.as_str(), name.as_str());
                if let Some(client) = optional(active_client) {
                    user = user.acting_for(client);
                }
                registry.add_user(&user)?;
                Ok(Response::Stored { key: user.id })
            }
            "add_appraiser" => {
                let [id, name] = take::<2>(function, args)?;
                registry.add_appraiser(&User::new(id.as_str(), name.as_str()))?;
                Ok(Response::Stored { key: id.clone() })
            }
            "add_client" => {
                let [id, name, case_file] = take::<3>(function, args)?;
                registry.add_client(&Client {
                    id: id.clone(),
                    name: name.clone(),
                    case_file: optional(case_file),
                })?;
                Ok(Response::Stored { key: id.clone() })
            }
            "add_case_file" => {
                let [id, loan_files] = take::<2>(function, args)?;
                registry.add_case_file(&CaseFile::new(id.as_str(), list(loan_files)))?;
                Ok(Response::Stored { key: id.clone() })
            }
            "add_loan_file" => {
                let [id, property_id, principal] = take::<3>(function, args)?;
                registry.add_loan_file(&LoanFile {
                    id: id.clone(),
                    property_id: property_id.clone(),
                    principal: Amount::parse("principal", principal)?,
                })?;
                Ok(Response::Stored { key: id.clone() })
            }
            "add_property" => {
                let [id, address, description, tenants] = take::<4>(function, args)?;
                let mut property = PropertyDocument::new(id.as_str(), address.as_str());
                property.description = description.clone();
                property.tenants = list(tenants);
                registry.add_property(&property)?;
                Ok(Response::Stored { key: id.clone() })
            }
            "add_tenant" => {
                let [id, name, rent] = take::<3>(function, args)?;
                registry.add_tenant(&Tenant {
                    id: id.clone(),
                    name: name.clone(),
                    monthly_rent: Amount::parse("monthly rent", rent)?,
                })?;
                Ok(Response::Stored { key: id.clone() })
            }
            other => Err(AppraisalError::UnknownFunction(other.to_string())),
        }
    }

    pub fn query(&self, function: &str, args: &[String]) -> Result<Response> {
        debug!(function, args = args.len(), "query");
        let resolver = self.service.resolver();
        match function {
            "get_appraisal" => {
                let [id] = take::<1>(function, args)?;
                Ok(Response::Details(Box::new(
                    resolver.appraisal_details(id)?,
                )))
            }
            "get_appraisals" => match args {
                [] => Ok(Response::Appraisals(resolver.list_appraisals()?)),
                _ => {
                    let [party] = take::<1>(function, args)?;
                    Ok(Response::Appraisals(resolver.appraisals_for(party)?))
                }
            },
            "get_appraisers" => {
                take::<0>(function, args)?;
                Ok(Response::Users(resolver.list_appraisers()?))
            }
            "get_client" => {
                let [caller, id] = take::<2>(function, args)?;
                Ok(Response::Client(Box::new(self.service.client(caller, id)?)))
            }
            "get_assigned_clients" => {
                let [caller] = take::<1>(function, args)?;
                Ok(Response::Clients(self.service.assigned_clients(caller)?))
            }
            "get_all_clients" => {
                let [caller] = take::<1>(function, args)?;
                Ok(Response::Clients(self.service.all_clients(caller)?))
            }
            "get_property" => {
                let [id] = take::<1>(function, args)?;
                Ok(Response::Property(resolver.property(id)?))
            }
            "get_signatures" => {
                take::<0>(function, args)?;
                Ok(Response::Signatures(resolver.list_signatures()?))
            }
            "verify_appraisal" => {
                let [id] = take::<1>(function, args)?;
                Ok(Response::Attestations(
                    self.service.verify_attestations(id)?,
                ))
            }
            "get_role" => {
                let [party] = take::<1>(function, args)?;
                Ok(Response::Role(self.service.roles().resolve_role(party)?))
            }
            "authenticate" => {
                let [party] = take::<1>(function, args)?;
                Ok(Response::Session(Box::new(self.service.authenticate(party)?)))
            }
            other => Err(AppraisalError::UnknownFunction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::CertificateDirectory;
    use crate::ledger::MemoryLedger;

    fn dispatcher() -> Dispatcher<MemoryLedger, CertificateDirectory> {
        Dispatcher::new(Arc::new(MemoryLedger::new()), CertificateDirectory::new())
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn wrong_arity_is_reported() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .invoke("quote", &args(&["app1", "al1"]))
            .unwrap_err();
        assert!(matches!(
            err,
            AppraisalError::InvalidArguments {
                expected: 3,
                got: 2,
                ..
            }
        ));

        let err = dispatcher
            .invoke("create_appraisal_concept", &args(&["app1", "al1", "Dam 1"]))
            .unwrap_err();
        assert!(matches!(
            err,
            AppraisalError::InvalidArguments { expected: 15, .. }
        ));
    }

    #[test]
    fn unknown_functions_are_rejected() {
        let dispatcher = dispatcher();
        assert!(matches!(
            dispatcher.invoke("delete_appraisal", &[]),
            Err(AppraisalError::UnknownFunction(_))
        ));
        assert!(matches!(
            dispatcher.query("quote", &[]),
            Err(AppraisalError::UnknownFunction(_))
        ));
    }

    #[test]
    fn write_through_functions_store_records() {
        let dispatcher = dispatcher();
        dispatcher
            .invoke("add_tenant", &args(&["t1", "Tess", "950"]))
            .unwrap();
        dispatcher
            .invoke("add_property", &args(&["p1", "Dam 1", "canal house", "t1"]))
            .unwrap();
        dispatcher
            .invoke("add_user", &args(&["cli1", "Cleo", "c1"]))
            .unwrap();

        let Response::Property(view) = dispatcher.query("get_property", &args(&["p1"])).unwrap()
        else {
            panic!("expected a property view");
        };
        assert_eq!(view.tenants[0].monthly_rent.to_string(), "950.00");

        let user = dispatcher.service().registry().user("cli1").unwrap();
        assert_eq!(user.active_client.as_deref(), Some("c1"));
    }

    #[test]
    fn listing_helpers() {
        assert_eq!(list(" a, b,,c "), vec!["a", "b", "c"]);
        assert!(list("").is_empty());
        assert_eq!(optional("  "), None);
    }
}
