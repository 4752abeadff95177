//! Content fingerprints binding signatures to exact appraisal content.

/// Concatenates `fields` in order, without delimiter, and returns the
/// lowercase hex SHA-256 digest.
///
/// The field order is part of the contract between signer and verifier; both
/// sides must assemble the same list.
pub fn fingerprint<S: AsRef<str>>(fields: &[S]) -> String {
    let mut content = String::with_capacity(fields.iter().map(|f| f.as_ref().len()).sum());
    for field in fields {
        content.push_str(field.as_ref());
    }
    sha256::digest(content.as_str())
}
