//! Shared fixtures for the integration tests: role certificates, a seeded
//! reference graph and a service over a throwaway sled database.
#![allow(dead_code)]

use std::sync::Arc;

use appraisal_ledger::{
    appraisal::ConceptFields,
    identity::{CertificateDirectory, ROLE_EXTENSION_OID},
    records::{CaseFile, Client, LoanFile, PropertyDocument, Registry, Tenant, User},
    service::AppraisalService,
    types::Amount,
};
use rcgen::{CertificateParams, CustomExtension, KeyPair};
use tempfile::TempDir;

pub const REQUESTOR: &str = "req1";
pub const APPRAISER: &str = "app1";
pub const OTHER_APPRAISER: &str = "app2";
pub const CLIENT_USER: &str = "cli_user";
/// client-role party acting for a different client
pub const OUTSIDER: &str = "cli_other";
/// certificate with an unassigned role code
pub const INTRUDER: &str = "intruder";
/// certificate without the role extension
pub const NO_ROLE: &str = "no_role";

pub const CLIENT: &str = "c1";
pub const PROPERTY: &str = "p1";

pub type Service = AppraisalService<sled::Db, CertificateDirectory>;

/// Self-signed PEM certificate for `party`, carrying `role` in the role
/// extension when given.
pub fn certificate(party: &str, role: Option<&str>) -> anyhow::Result<String> {
    let mut params = CertificateParams::new(vec![format!("{party}.example")])?;
    if let Some(role) = role {
        let oid: Vec<u64> = ROLE_EXTENSION_OID
            .split('.')
            .map(str::parse::<u64>)
            .collect::<Result<_, _>>()?;
        params
            .custom_extensions
            .push(CustomExtension::from_oid_content(&oid, role.as_bytes().to_vec()));
    }
    let key = KeyPair::generate()?;
    Ok(params.self_signed(&key)?.pem())
}

pub fn identities() -> anyhow::Result<CertificateDirectory> {
    Ok(CertificateDirectory::new()
        .with(REQUESTOR, certificate(REQUESTOR, Some("1"))?)
        .with(APPRAISER, certificate(APPRAISER, Some("3"))?)
        .with(OTHER_APPRAISER, certificate(OTHER_APPRAISER, Some("3"))?)
        .with(CLIENT_USER, certificate(CLIENT_USER, Some("2"))?)
        .with(OUTSIDER, certificate(OUTSIDER, Some("2"))?)
        .with(INTRUDER, certificate(INTRUDER, Some("9"))?)
        .with(NO_ROLE, certificate(NO_ROLE, None)?))
}

/// Users, clients, a property with two tenants and a case file pointing at it.
pub fn seed<L: appraisal_ledger::ledger::Ledger>(registry: &Registry<L>) -> anyhow::Result<()> {
    registry.add_user(&User::new(REQUESTOR, "Rita Requestor"))?;
    registry.add_appraiser(&User::new(APPRAISER, "Arno Appraiser"))?;
    registry.add_appraiser(&User::new(OTHER_APPRAISER, "Anna Appraiser"))?;
    registry.add_user(&User::new(CLIENT_USER, "Cas Client").acting_for(CLIENT))?;
    registry.add_user(&User::new(OUTSIDER, "Olga Other").acting_for("c2"))?;

    for (id, name, rent) in [("t1", "Tim", 95_000), ("t2", "Tess", 120_050)] {
        registry.add_tenant(&Tenant {
            id: id.into(),
            name: name.into(),
            monthly_rent: Amount::from_cents(rent),
        })?;
    }
    let mut property = PropertyDocument::new(PROPERTY, "Herengracht 1, Amsterdam");
    property.description = "canal house".into();
    property.tenants = vec!["t1".into(), "t2".into()];
    registry.add_property(&property)?;

    registry.add_loan_file(&LoanFile {
        id: "lf1".into(),
        property_id: PROPERTY.into(),
        principal: Amount::from_cents(40_000_000),
    })?;
    registry.add_case_file(&CaseFile::new("cf1", vec!["lf1".into()]))?;
    registry.add_client(&Client {
        id: CLIENT.into(),
        name: "Canal Holdings".into(),
        case_file: Some("cf1".into()),
    })?;
    registry.add_client(&Client {
        id: "c2".into(),
        name: "Other Holdings".into(),
        case_file: None,
    })?;
    Ok(())
}

/// A seeded service over a fresh sled database. Keep the `TempDir` alive for
/// the duration of the test.
pub fn service(name: &str) -> anyhow::Result<(TempDir, Arc<sled::Db>, Service)> {
    let temp_dir = tempfile::tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join(name))?);
    let service = AppraisalService::new(db.clone(), identities()?);
    seed(service.registry())?;
    Ok((temp_dir, db, service))
}

pub fn concept(valuation: &str) -> ConceptFields {
    ConceptFields {
        address: "Herengracht 1, Amsterdam".into(),
        description: "canal house, four floors".into(),
        building_plan: "doc://plans/p1".into(),
        plot_size: "180".into(),
        floor_area: "420".into(),
        building_volume: "1400".into(),
        land_quality: "good".into(),
        building_quality: "fair".into(),
        photo_exterior: "img://p1/ext".into(),
        photo_interior: "img://p1/int".into(),
        photo_surroundings: "img://p1/sur".into(),
        environment_report: "doc://env/p1".into(),
        valuation: valuation.into(),
    }
}
