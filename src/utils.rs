//! Identifier generation

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::{AppraisalError, Result};

/// Human readable prefix for appraisal identifiers.
pub const APPRAISAL_HRP: &str = "al";
/// Human readable prefix for signature identifiers.
pub const SIGNATURE_HRP: &str = "sg";

// construct a unique, time ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String> {
    let parsed = bech32::Hrp::parse(hrp)
        .map_err(|e| AppraisalError::IdGeneration(format!("invalid prefix {hrp:?}: {e}")))?;
    let encode = bech32::encode::<Bech32m>(parsed, uuid7().as_bytes())
        .map_err(|e| AppraisalError::IdGeneration(e.to_string()))?;
    Ok(encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let id = new_uuid_to_bech32(SIGNATURE_HRP).unwrap();
        assert!(id.starts_with("sg1"));

        let id = new_uuid_to_bech32(APPRAISAL_HRP).unwrap();
        assert!(id.starts_with("al1"));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(matches!(
            new_uuid_to_bech32(""),
            Err(AppraisalError::IdGeneration(_))
        ));
    }
}
