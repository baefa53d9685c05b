// C9: summary link synthesizer. Produces a link summarizing the chain:
// first-step materials, last-step products (§4.9).

use crate::error::VerifyError;
use crate::model::{Layout, Link};

pub fn build_summary_link(
    layout: &Layout,
    reduced_steps: &std::collections::HashMap<String, Link>,
) -> Result<Link, VerifyError> {
    let first_step = layout.steps.first().ok_or_else(|| VerifyError::RuleFormat {
        rule: "layout".to_string(),
        reason: "layout has no steps to summarize".to_string(),
    })?;
    #[allow(clippy::expect_used)] // steps is non-empty: first_step above already succeeded.
    let last_step = layout.steps.last().expect("first_step existed, so does last");

    let first_link = reduced_steps.get(&first_step.name).ok_or_else(|| VerifyError::RuleVerification {
        item: first_step.name.clone(),
        rule: String::new(),
        reason: "no reduced link for first step".to_string(),
    })?;
    let last_link = reduced_steps.get(&last_step.name).ok_or_else(|| VerifyError::RuleVerification {
        item: last_step.name.clone(),
        rule: String::new(),
        reason: "no reduced link for last step".to_string(),
    })?;

    Ok(Link {
        name: first_link.name.clone(),
        command: last_link.command.clone(),
        materials: first_link.materials.clone(),
        products: last_link.products.clone(),
        byproducts: last_link.byproducts.clone(),
        kind: first_link.kind,
        signatures: Vec::new(),
        sublayout: None,
    })
}
