//! Building and signing considerations.
//!
//! Signing follows prompt → sign → forget: every call re-derives keys
//! from the passphrase and the keypairs are dropped (and wiped) before
//! the signed record is returned.

use base64::Engine;
use chrono::Utc;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::Rng;

use crate::codec::{consideration_id, id_bytes};
use crate::error::{FocalError, FocalResult};
use crate::identity::{derive, DerivedKeypair};
use crate::types::Consideration;

/// Views in one series.
pub const DEFAULT_VIEWS_PER_SERIES: u64 = 1008;

/// Upper bound (exclusive) of a consideration nonce: 31 bits.
const NONCE_BOUND: u32 = i32::MAX as u32;

/// One-based series number for a tip height.
pub fn series_for_height(tip_height: u64, views_per_series: u64) -> u64 {
    tip_height / views_per_series.max(1) + 1
}

/// Everything needed to sign a consideration except the passphrase.
#[derive(Debug, Clone)]
pub struct ConsiderationDraft<'a> {
    pub recipient: &'a str,
    pub memo: &'a str,
    /// Height of the current tip; `None` until one has been received.
    pub tip_height: Option<u64>,
    /// Position in the derived key list.
    pub key_index: usize,
    pub views_per_series: u64,
    pub addresses_per_account: u8,
}

impl<'a> ConsiderationDraft<'a> {
    pub fn new(recipient: &'a str, memo: &'a str, tip_height: Option<u64>) -> Self {
        Self {
            recipient,
            memo,
            tip_height,
            key_index: 0,
            views_per_series: DEFAULT_VIEWS_PER_SERIES,
            addresses_per_account: crate::identity::DEFAULT_ADDRESSES_PER_ACCOUNT,
        }
    }

    pub fn with_key_index(mut self, key_index: usize) -> Self {
        self.key_index = key_index;
        self
    }

    pub fn with_views_per_series(mut self, views_per_series: u64) -> Self {
        self.views_per_series = views_per_series;
        self
    }

    pub fn with_addresses_per_account(mut self, addresses_per_account: u8) -> Self {
        self.addresses_per_account = addresses_per_account;
        self
    }
}

/// Sign a new consideration with the key at `draft.key_index`.
///
/// Fails with [`FocalError::Precondition`] when the recipient or memo is
/// empty, no tip height is known, or the index is outside what the
/// passphrase can derive.
pub fn sign_consideration(passphrase: &str, draft: &ConsiderationDraft<'_>) -> FocalResult<Consideration> {
    if draft.recipient.is_empty() {
        return Err(FocalError::Precondition("missing recipient".to_string()));
    }
    if draft.memo.is_empty() {
        return Err(FocalError::Precondition("missing memo".to_string()));
    }
    let tip_height = draft
        .tip_height
        .ok_or_else(|| FocalError::Precondition("tip height unknown".to_string()))?;
    if draft.addresses_per_account == 0 {
        return Err(FocalError::Precondition("no addresses per account".to_string()));
    }

    let per_account = usize::from(draft.addresses_per_account);
    let accounts = u8::try_from(draft.key_index / per_account + 1).map_err(|_| {
        FocalError::Precondition(format!("no key at index {}", draft.key_index))
    })?;
    let keypair = derive(passphrase, accounts, draft.addresses_per_account)
        .into_iter()
        .nth(draft.key_index)
        .ok_or_else(|| FocalError::Precondition(format!("no key at index {}", draft.key_index)))?;

    let consideration = Consideration {
        time: Utc::now().timestamp(),
        nonce: Some(rand::thread_rng().gen_range(0..NONCE_BOUND)),
        by: Some(keypair.public_key()),
        recipient: draft.recipient.to_string(),
        memo: draft.memo.to_string(),
        series: Some(series_for_height(tip_height, draft.views_per_series)),
        signature: None,
    };
    sign_with(&keypair, consideration)
}

/// Attach a signature over the record's id.
pub fn sign_with(keypair: &DerivedKeypair, mut consideration: Consideration) -> FocalResult<Consideration> {
    let id = consideration_id(&consideration);
    let signature = keypair.sign(&id_bytes(&id)?);
    consideration.signature =
        Some(base64::engine::general_purpose::STANDARD.encode(signature.to_bytes()));
    Ok(consideration)
}

/// Verify a consideration's signature against its `by` key.
pub fn verify_consideration(consideration: &Consideration) -> FocalResult<()> {
    let engine = base64::engine::general_purpose::STANDARD;

    let by = consideration
        .by
        .as_deref()
        .ok_or_else(|| FocalError::Crypto("record has no sender".to_string()))?;
    let signature_b64 = consideration
        .signature
        .as_deref()
        .ok_or_else(|| FocalError::Crypto("no signature present".to_string()))?;

    let key_bytes: [u8; 32] = engine
        .decode(by)
        .map_err(|e| FocalError::Crypto(format!("invalid base64 key: {e}")))?
        .try_into()
        .map_err(|_| FocalError::Crypto("public key is not 32 bytes".to_string()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| FocalError::Crypto(format!("invalid public key: {e}")))?;

    let signature_bytes = engine
        .decode(signature_b64)
        .map_err(|e| FocalError::Crypto(format!("invalid base64 signature: {e}")))?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|e| FocalError::Crypto(format!("invalid signature format: {e}")))?;

    let id = consideration_id(consideration);
    verifying_key
        .verify(&id_bytes(&id)?, &signature)
        .map_err(|_| FocalError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derive_public_keys;

    const PASSPHRASE: &str = "correct horse battery staple";
    const RECIPIENT: &str = "dxthZbAqWrFFWg7Xe/wsmdNA8cDYwHoG+JU5m/28cAw=";

    fn fixed_record(by: String) -> Consideration {
        Consideration {
            time: 1_700_000_000,
            nonce: Some(42),
            by: Some(by),
            recipient: RECIPIENT.to_string(),
            memo: "thanks ref(1a2b3c)".to_string(),
            series: Some(2),
            signature: None,
        }
    }

    #[test]
    fn series_boundaries() {
        assert_eq!(series_for_height(19, 20), 1);
        assert_eq!(series_for_height(20, 20), 2);
        assert_eq!(series_for_height(0, DEFAULT_VIEWS_PER_SERIES), 1);
        assert_eq!(series_for_height(1008, DEFAULT_VIEWS_PER_SERIES), 2);
    }

    #[test]
    fn known_signature() {
        let keypairs = derive(PASSPHRASE, 1, 7);
        let signed = sign_with(&keypairs[0], fixed_record(keypairs[0].public_key())).unwrap();

        assert_eq!(
            consideration_id(&signed),
            "79efa1d692bfa67c5ac7cfcb9c61c263712ed59a3926fd9d9d89b4e9a61691cf"
        );
        assert_eq!(
            signed.signature.as_deref(),
            Some("vq+ApCnfMZ7Ld/n9FnmVYMAqAflrOo9uGNYxIqNj3ktcdAAkBo10xampd2tcx1hrJ+HET2A9Hbq+cnIqjGX3CQ==")
        );
        verify_consideration(&signed).unwrap();
    }

    #[test]
    fn tampering_breaks_verification() {
        let keypairs = derive(PASSPHRASE, 1, 7);
        let signed = sign_with(&keypairs[0], fixed_record(keypairs[0].public_key())).unwrap();

        let tampers: [fn(&mut Consideration); 6] = [
            |c| c.time += 1,
            |c| c.nonce = Some(43),
            |c| c.by = Some(RECIPIENT.to_string()),
            |c| c.recipient = "B587jwvQsojyJ+C7G0pzVzBntcS0XCGQ7plCcDcns5g=".to_string(),
            |c| c.memo.push('!'),
            |c| c.series = Some(3),
        ];
        for tamper in tampers {
            let mut copy = signed.clone();
            tamper(&mut copy);
            assert!(verify_consideration(&copy).is_err());
        }
    }

    #[test]
    fn sign_consideration_fills_record() {
        let draft = ConsiderationDraft::new(RECIPIENT, "hello", Some(2016)).with_key_index(1);
        let signed = sign_consideration(PASSPHRASE, &draft).unwrap();

        assert_eq!(signed.by.as_deref(), Some(RECIPIENT));
        assert_eq!(signed.recipient, RECIPIENT);
        assert_eq!(signed.memo, "hello");
        assert_eq!(signed.series, Some(3));
        assert!(signed.nonce.unwrap() < NONCE_BOUND);
        assert!(signed.time > 1_600_000_000);
        verify_consideration(&signed).unwrap();
    }

    #[test]
    fn key_index_reaches_later_accounts() {
        let draft = ConsiderationDraft::new(RECIPIENT, "hello", Some(1)).with_key_index(7);
        let signed = sign_consideration(PASSPHRASE, &draft).unwrap();
        let keys = derive_public_keys(PASSPHRASE, 2, 7);
        assert_eq!(signed.by.as_deref(), Some(keys[7].as_str()));
    }

    #[test]
    fn preconditions() {
        let missing_recipient = ConsiderationDraft::new("", "memo", Some(1));
        assert!(sign_consideration(PASSPHRASE, &missing_recipient)
            .unwrap_err()
            .is_precondition());

        let missing_memo = ConsiderationDraft::new(RECIPIENT, "", Some(1));
        assert!(sign_consideration(PASSPHRASE, &missing_memo).unwrap_err().is_precondition());

        let missing_tip = ConsiderationDraft::new(RECIPIENT, "memo", None);
        assert!(sign_consideration(PASSPHRASE, &missing_tip).unwrap_err().is_precondition());

        let out_of_range = ConsiderationDraft::new(RECIPIENT, "memo", Some(1)).with_key_index(7 * 256);
        assert!(sign_consideration(PASSPHRASE, &out_of_range).unwrap_err().is_precondition());
    }

    #[test]
    fn observer_records_cannot_verify() {
        let mut record = fixed_record(String::new());
        record.by = None;
        record.signature = Some("AA==".to_string());
        assert!(matches!(verify_consideration(&record), Err(FocalError::Crypto(_))));
    }
}
