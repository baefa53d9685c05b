// C4: signature and expiry gate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::crypto::SignatureVerifier;
use crate::error::VerifyError;
use crate::model::Layout;

/// Verify every signature on `layout` against `owner_keys`. Fails `Signature`
/// on any missing key or failed verification (§4.4).
pub fn verify_layout_signatures(
    layout: &Layout,
    owner_keys: &HashMap<String, crate::model::PublicKey>,
    verifier: &dyn SignatureVerifier,
) -> Result<(), VerifyError> {
    let message = layout.signable_bytes();
    if layout.signatures.is_empty() {
        return Err(VerifyError::Signature {
            subject: "layout".to_string(),
            reason: "no signatures present".to_string(),
        });
    }
    for sig in &layout.signatures {
        let key = owner_keys.get(&sig.keyid).ok_or_else(|| VerifyError::Signature {
            subject: "layout".to_string(),
            reason: format!("owner key '{}' not provided", sig.keyid),
        })?;
        if !verifier.verify(&message, sig, key) {
            return Err(VerifyError::Signature {
                subject: "layout".to_string(),
                reason: format!("signature by '{}' does not verify", sig.keyid),
            });
        }
    }
    Ok(())
}

/// Fail `Expired` if `layout.expires` is in the past; fail `Io` if it does
/// not parse (§4.4; supplemented feature: the original fails closed on an
/// unparsable timestamp rather than treating it as non-expired).
pub fn verify_layout_expiration(layout: &Layout, now: DateTime<Utc>) -> Result<(), VerifyError> {
    let expires = DateTime::parse_from_rfc3339(&layout.expires)
        .map_err(|e| VerifyError::Io {
            path: "layout.expires".to_string(),
            reason: format!("'{}' is not a valid ISO-8601 timestamp: {e}", layout.expires),
        })?
        .with_timezone(&Utc);

    if expires < now {
        return Err(VerifyError::Expired {
            expires: layout.expires.clone(),
            now: now.to_rfc3339(),
        });
    }
    Ok(())
}

/// Verify every functionary's signature for every step's link(s). For each
/// `(keyid, link)` pair: `keyid` must be in `step.pubkeys`, or the whole
/// verification fails immediately (§4.4; supplemented feature 1 — this is
/// checked eagerly per entry, not filtered silently).
pub fn verify_all_steps_signatures(
    layout: &Layout,
    chain: &HashMap<String, HashMap<String, crate::model::Link>>,
    verifier: &dyn SignatureVerifier,
) -> Result<(), VerifyError> {
    for step in &layout.steps {
        let Some(key_link_dict) = chain.get(&step.name) else {
            continue;
        };
        for (keyid, link) in key_link_dict {
            if !step.pubkeys.contains(keyid) {
                return Err(VerifyError::Authorization {
                    step: step.name.clone(),
                    keyid: keyid.clone(),
                });
            }
            let key = layout.keys.get(keyid).ok_or_else(|| VerifyError::Signature {
                subject: step.name.clone(),
                reason: format!("layout has no key record for '{keyid}'"),
            })?;

            let message = link.signable_bytes();
            let sig = link
                .signatures
                .iter()
                .find(|s| &s.keyid == keyid)
                .ok_or_else(|| VerifyError::Signature {
                    subject: step.name.clone(),
                    reason: format!("link for '{keyid}' carries no matching signature"),
                })?;

            if !verifier.verify(&message, sig, key) {
                return Err(VerifyError::Signature {
                    subject: step.name.clone(),
                    reason: format!("signature by '{keyid}' does not verify"),
                });
            }
        }
    }
    Ok(())
}
