//! Role resolution from real X.509 certificates.

mod common;

use appraisal_ledger::{
    error::AppraisalError,
    identity::{CertificateDirectory, Role, RoleResolver, role_from_certificate},
};
use common::certificate;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

#[test]
fn role_extension_maps_to_roles() -> anyhow::Result<()> {
    for (code, role) in [
        ("1", Role::Requestor),
        ("2", Role::Client),
        ("3", Role::Appraiser),
        ("42", Role::Unrecognised(42)),
    ] {
        let pem = certificate("party", Some(code))?;
        assert_eq!(role_from_certificate(&pem).map_err(anyhow::Error::msg)?, role);
    }
    let pem = certificate("party", None)?;
    assert_eq!(
        role_from_certificate(&pem).map_err(anyhow::Error::msg)?,
        Role::Unresolved
    );
    Ok(())
}

#[test]
fn percent_encoded_certificates_are_accepted() -> anyhow::Result<()> {
    let pem = certificate("req1", Some("1"))?;
    let encoded = utf8_percent_encode(&pem, NON_ALPHANUMERIC).to_string();
    assert!(!encoded.contains('\n'));

    let resolver = RoleResolver::new(CertificateDirectory::new().with("req1", encoded));
    assert_eq!(resolver.resolve_role("req1")?, Role::Requestor);
    Ok(())
}

#[test]
fn non_numeric_role_is_malformed() -> anyhow::Result<()> {
    let pem = certificate("app1", Some("appraiser"))?;
    let resolver = RoleResolver::new(CertificateDirectory::new().with("app1", pem));
    assert!(matches!(
        resolver.resolve_role("app1"),
        Err(AppraisalError::CertificateMalformed { .. })
    ));
    Ok(())
}

#[test]
fn directory_loads_pem_files_by_stem() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("app1.pem"), certificate("app1", Some("3"))?)?;
    std::fs::write(dir.path().join("cli_user.pem"), certificate("cli_user", Some("2"))?)?;
    std::fs::write(dir.path().join("notes.txt"), "not a certificate")?;

    let directory = CertificateDirectory::from_dir(dir.path())?;
    assert_eq!(directory.len(), 2);

    let resolver = RoleResolver::new(directory);
    assert_eq!(resolver.resolve_role("app1")?, Role::Appraiser);
    assert_eq!(resolver.resolve_role("cli_user")?, Role::Client);
    assert!(matches!(
        resolver.require("cli_user", Role::Appraiser, "quote"),
        Err(AppraisalError::PermissionDenied { .. })
    ));
    Ok(())
}
