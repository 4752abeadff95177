//! Write-once signature records and the `_signatures` index.
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{AppraisalError, Result};
use crate::ledger::{Ledger, SIGNATURES_INDEX, WriteSet, read_index, read_record};
use crate::types::TimeStamp;
use crate::utils::{SIGNATURE_HRP, new_uuid_to_bech32};

#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Signature {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub signer: String,
    #[n(2)]
    pub document_id: String, // the appraisal this signature attests
    #[n(3)]
    pub digest: String,
    #[n(4)]
    pub timestamp: TimeStamp<Utc>,
}

impl Signature {
    pub fn new(id: String, signer: String, document_id: String, digest: String) -> Self {
        Self {
            id,
            signer,
            document_id,
            digest,
            timestamp: TimeStamp::new(),
        }
    }
    /// True when this signature attests `document_id` at `current_digest`.
    pub fn is_valid(&self, document_id: &str, current_digest: &str) -> bool {
        self.document_id == document_id && self.digest == current_digest
    }
}

pub struct SignatureLedger<L> {
    ledger: Arc<L>,
}

impl<L: Ledger> SignatureLedger<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Stages a new signature and its index entry into `writes`.
    pub fn stage_sign(
        &self,
        writes: &mut WriteSet,
        signer: &str,
        document_id: &str,
        digest: &str,
    ) -> Result<Signature> {
        // an unreadable index fails the signing here, before anything is staged
        let index = read_index(&*self.ledger, SIGNATURES_INDEX)?;
        let signature = Signature::new(
            new_uuid_to_bech32(SIGNATURE_HRP)?,
            signer.to_string(),
            document_id.to_string(),
            digest.to_string(),
        );
        writes.put_record(&signature.id, &signature)?;
        writes.append_index(SIGNATURES_INDEX, signature.id.clone());

        debug!(
            id = %signature.id,
            signer,
            document_id,
            position = index.len() + writes.appends_to(SIGNATURES_INDEX).len(),
            "staged signature"
        );
        Ok(signature)
    }

    /// Signs `digest` as `signer` and commits immediately.
    pub fn sign(&self, signer: &str, document_id: &str, digest: &str) -> Result<String> {
        let mut writes = WriteSet::new();
        let signature = self.stage_sign(&mut writes, signer, document_id, digest)?;
        self.ledger.commit(&writes)?;
        Ok(signature.id)
    }

    pub fn load(&self, id: &str) -> Result<Signature> {
        read_record(&*self.ledger, id)
    }

    /// Loads signature `id` and checks it attests `document_id` at `digest`.
    pub fn verify(&self, id: &str, document_id: &str, digest: &str) -> Result<Signature> {
        let signature = self.load(id)?;
        if !signature.is_valid(document_id, digest) {
            warn!(
                signature = id,
                document_id,
                signed = %signature.digest,
                current = digest,
                "signature does not match content"
            );
            return Err(AppraisalError::IntegrityMismatch {
                appraisal_id: document_id.to_string(),
                signature_id: id.to_string(),
                signed: signature.digest,
                current: digest.to_string(),
            });
        }
        Ok(signature)
    }

    /// Every signature in creation order.
    pub fn list(&self) -> Result<Vec<Signature>> {
        read_index(&*self.ledger, SIGNATURES_INDEX)?
            .iter()
            .map(|id| self.load(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::ledger::MemoryLedger;

    fn ledger() -> (Arc<MemoryLedger>, SignatureLedger<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        (ledger.clone(), SignatureLedger::new(ledger))
    }

    #[test]
    fn sign_then_verify() {
        let (_, signatures) = ledger();
        let fields = ["al1", "p1", "app1", "1000.00"];
        let id = signatures
            .sign("app1", "al1", &fingerprint(&fields))
            .unwrap();

        let signature = signatures.verify(&id, "al1", &fingerprint(&fields)).unwrap();
        assert_eq!(signature.signer, "app1");

        let tampered = ["al1", "p1", "app1", "9000.00"];
        assert!(matches!(
            signatures.verify(&id, "al1", &fingerprint(&tampered)),
            Err(AppraisalError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn signature_for_another_document_does_not_verify() {
        let (_, signatures) = ledger();
        let digest = fingerprint(&["x"]);
        let id = signatures.sign("app1", "al1", &digest).unwrap();

        assert!(signatures.verify(&id, "al2", &digest).is_err());
    }

    #[test]
    fn each_sign_appends_one_fresh_id() {
        let (ledger, signatures) = ledger();
        let mut seen = std::collections::HashSet::new();
        for n in 1..=5 {
            let id = signatures.sign("req1", "al1", "digest").unwrap();
            assert!(id.starts_with("sg1"));
            assert!(seen.insert(id));
            assert_eq!(read_index(&*ledger, SIGNATURES_INDEX).unwrap().len(), n);
        }

        let listed: Vec<_> = signatures.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(listed, read_index(&*ledger, SIGNATURES_INDEX).unwrap());
    }

    #[test]
    fn failed_commit_leaves_no_orphaned_index_entry() {
        let (ledger, signatures) = ledger();
        ledger.set_write_failure(true);

        assert!(matches!(
            signatures.sign("req1", "al1", "digest"),
            Err(AppraisalError::WriteFailed(_))
        ));
        ledger.set_write_failure(false);
        assert!(read_index(&*ledger, SIGNATURES_INDEX).unwrap().is_empty());
    }

    #[test]
    fn unreadable_index_is_index_unavailable() {
        let (ledger, signatures) = ledger();
        ledger.put(SIGNATURES_INDEX, vec![0xff]).unwrap();

        assert!(matches!(
            signatures.sign("req1", "al1", "digest"),
            Err(AppraisalError::IndexUnavailable { .. })
        ));
    }
}
