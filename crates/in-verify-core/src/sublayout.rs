// C6: sublayout recursor. Detects a nested layout inside a step slot
// (`link.kind == Layout`), recurses into it, and replaces the chain entry
// with the returned summary link (§4.6).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::config::VerifyConfig;
use crate::crypto::SignatureVerifier;
use crate::error::VerifyError;
use crate::inspection::InspectionRunner;
use crate::loader::LinkLoader;
use crate::model::{Link, PublicKey};
use crate::orchestrator;

/// Recurse into any sublayout entries found in `chain`, replacing each with
/// its summary link. `visited` tracks layout fingerprints seen so far on
/// this recursion path so a cyclic sublayout fails `Recursion` instead of
/// looping forever (§4.6, §9 "Cyclic sublayouts"). `loader`/`base_dir`/
/// `audit_dir` are the *same* ones the outer verification was given: a
/// nested layout's links live alongside the outer chain's, not in a fresh
/// store, matching the original's reliance on a single shared link
/// directory across the whole recursive verification
/// (examples/original_source/in_toto/verifylib.py's `in_toto_verify` call
/// inside `verify_sublayouts`).
#[allow(clippy::too_many_arguments)]
pub fn verify_sublayouts(
    outer_keys: &BTreeMap<String, PublicKey>,
    chain: &mut HashMap<String, HashMap<String, Link>>,
    loader: &dyn LinkLoader,
    base_dir: &Path,
    audit_dir: &Path,
    depth: u32,
    visited: &mut HashSet<[u8; 32]>,
    config: &VerifyConfig,
    verifier: &dyn SignatureVerifier,
    runner: &dyn InspectionRunner,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), VerifyError> {
    for (step_name, key_link_dict) in chain.iter_mut() {
        for (keyid, link) in key_link_dict.iter_mut() {
            if link.kind != crate::model::LinkKind::Layout {
                continue;
            }

            if depth >= config.max_sublayout_depth {
                return Err(VerifyError::Recursion {
                    step: step_name.clone(),
                    max_depth: config.max_sublayout_depth,
                });
            }

            let sublayout = link.sublayout.as_ref().ok_or_else(|| VerifyError::RuleFormat {
                rule: step_name.clone(),
                reason: "link kind is 'layout' but carries no sublayout payload".to_string(),
            })?;

            let fingerprint: [u8; 32] =
                Sha256::digest(sublayout.signable_bytes()).into();
            if !visited.insert(fingerprint) {
                return Err(VerifyError::Recursion {
                    step: step_name.clone(),
                    max_depth: config.max_sublayout_depth,
                });
            }

            // The outer layout's key for this keyid authorizes the inner layout.
            let mut inner_keys = HashMap::new();
            if let Some(key) = outer_keys.get(keyid) {
                inner_keys.insert(keyid.clone(), key.clone());
            }

            let report = orchestrator::verify_inner(
                sublayout,
                &inner_keys,
                loader,
                config,
                verifier,
                runner,
                base_dir,
                audit_dir,
                depth + 1,
                visited,
                now,
            )?;

            *link = report.summary;
            visited.remove(&fingerprint);
        }
    }
    Ok(())
}
