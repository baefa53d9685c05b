// C5: threshold evaluator. Checks quorum and artifact agreement across
// functionaries, then reduces each step's link set to one representative
// (§4.5).

use std::collections::HashMap;

use crate::error::VerifyError;
use crate::model::{Layout, Link};

/// Verify `step.threshold` is met and all functionary links for a
/// thresholded step agree on `materials`/`products`. The REDESIGN FLAG in
/// §9 binds the reference explicitly: the original leaves `reference_key`
/// unbound (`key_link_dict.keys()[0]` vs. the later, undefined
/// `reference_key`); here the reference keyid is chosen deterministically
/// (first in `step.pubkeys` order that has a link) and used by name.
pub fn verify_threshold_constraints(
    layout: &Layout,
    chain: &HashMap<String, HashMap<String, Link>>,
) -> Result<(), VerifyError> {
    for step in &layout.steps {
        if step.threshold <= 1 {
            continue;
        }

        let key_link_dict = chain.get(&step.name).cloned().unwrap_or_default();
        if (key_link_dict.len() as u32) < step.threshold {
            return Err(VerifyError::Threshold {
                step: step.name.clone(),
                reason: format!(
                    "{} functionaries reported, threshold is {}",
                    key_link_dict.len(),
                    step.threshold
                ),
            });
        }

        #[allow(clippy::expect_used)] // key_link_dict.len() >= threshold > 0, checked above.
        let reference_keyid = step
            .pubkeys
            .iter()
            .find(|k| key_link_dict.contains_key(k.as_str()))
            .expect("key_link_dict.len() >= threshold > 0 implies a matching pubkey exists");
        let reference_link = &key_link_dict[reference_keyid];

        for (keyid, link) in &key_link_dict {
            if link.materials != reference_link.materials || link.products != reference_link.products {
                return Err(VerifyError::Threshold {
                    step: step.name.clone(),
                    reason: format!(
                        "link by '{keyid}' disagrees with reference link by '{reference_keyid}'"
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Reduce `step_name -> (keyid -> Link)` to `step_name -> Link`, taking any
/// entry (threshold verification already guaranteed agreement) (§4.5).
pub fn reduce_chain_links(
    chain: &HashMap<String, HashMap<String, Link>>,
) -> HashMap<String, Link> {
    chain
        .iter()
        .filter_map(|(step_name, key_link_dict)| {
            key_link_dict
                .values()
                .next()
                .map(|link| (step_name.clone(), link.clone()))
        })
        .collect()
}
