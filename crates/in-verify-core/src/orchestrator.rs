// C8: top-level orchestrator. Phase sequencer implementing the
// verification pipeline (§4.8). Any phase failure aborts and propagates.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::config::VerifyConfig;
use crate::crypto::SignatureVerifier;
use crate::driver;
use crate::error::VerifyError;
use crate::gate;
use crate::inspection::{self, InspectionRunner};
use crate::loader::{self, LinkLoader};
use crate::model::{Inspection, Layout, Link, PublicKey, Rule};
use crate::rules;
use crate::sublayout;
use crate::summary;
use crate::threshold;

/// A command-alignment mismatch recorded as a warning rather than a hard
/// failure (§4.8 step 6, §9).
#[derive(Debug, Clone)]
pub struct CommandAlignmentWarning {
    pub step: String,
    pub keyid: String,
    pub actual: Vec<String>,
    pub expected: Vec<String>,
}

/// The result of a successful verification: the summary link plus any
/// non-fatal diagnostics collected along the way.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub summary: Link,
    pub command_alignment_warnings: Vec<CommandAlignmentWarning>,
}

fn parse_item_rules(tokenized: &[Vec<String>]) -> Result<Vec<Rule>, VerifyError> {
    tokenized.iter().map(|tokens| rules::parse_rule(tokens)).collect()
}

fn check_command_alignment(
    layout: &Layout,
    chain: &HashMap<String, HashMap<String, Link>>,
    config: &VerifyConfig,
) -> Result<Vec<CommandAlignmentWarning>, VerifyError> {
    let mut warnings = Vec::new();
    for step in &layout.steps {
        let Some(key_link_dict) = chain.get(&step.name) else {
            continue;
        };
        for (keyid, link) in key_link_dict {
            if link.command != step.expected_command {
                let warning = CommandAlignmentWarning {
                    step: step.name.clone(),
                    keyid: keyid.clone(),
                    actual: link.command.clone(),
                    expected: step.expected_command.clone(),
                };
                if config.command_alignment_is_error {
                    return Err(VerifyError::RuleVerification {
                        item: step.name.clone(),
                        rule: String::new(),
                        reason: format!(
                            "command {:?} does not align with expected {:?}",
                            warning.actual, warning.expected
                        ),
                    });
                }
                tracing::warn!(
                    step = step.name,
                    keyid,
                    actual = ?warning.actual,
                    expected = ?warning.expected,
                    "command alignment mismatch"
                );
                warnings.push(warning);
            }
        }
    }
    Ok(warnings)
}

/// Top-level entry point: verify `layout` signed by `owner_keys`, loading
/// its links with `loader`, verifying signatures with `verifier`, and
/// running its inspections with `runner` rooted at `base_dir`.
#[allow(clippy::too_many_arguments)]
pub fn verify(
    layout: &Layout,
    owner_keys: &HashMap<String, PublicKey>,
    loader: &dyn LinkLoader,
    config: &VerifyConfig,
    verifier: &dyn SignatureVerifier,
    runner: &dyn InspectionRunner,
    base_dir: &Path,
    audit_dir: &Path,
    now: DateTime<Utc>,
) -> Result<VerificationReport, VerifyError> {
    let mut visited = HashSet::new();
    verify_inner(
        layout, owner_keys, loader, config, verifier, runner, base_dir, audit_dir, 0, &mut visited,
        now,
    )
}

/// Used both as the top-level entry point's workhorse and, recursively, by
/// the sublayout recursor (C6) — which threads through the *same* `loader`/
/// `base_dir`/`audit_dir` the outer verification was given, since a nested
/// layout's links live alongside the outer chain's, not in an empty store.
#[allow(clippy::too_many_arguments)]
pub(crate) fn verify_inner(
    layout: &Layout,
    owner_keys: &HashMap<String, PublicKey>,
    loader: &dyn LinkLoader,
    config: &VerifyConfig,
    verifier: &dyn SignatureVerifier,
    runner: &dyn InspectionRunner,
    base_dir: &Path,
    audit_dir: &Path,
    depth: u32,
    visited: &mut HashSet<[u8; 32]>,
    now: DateTime<Utc>,
) -> Result<VerificationReport, VerifyError> {
    if let Some(dup) = layout.duplicate_item_name() {
        return Err(VerifyError::RuleFormat {
            rule: dup.to_string(),
            reason: "step/inspection name used more than once in layout".to_string(),
        });
    }

    // 1-2: signatures and expiry.
    gate::verify_layout_signatures(layout, owner_keys, verifier)?;
    gate::verify_layout_expiration(layout, now)?;

    // 3: load the chain-link dictionary.
    let mut chain = loader::load_chain_links(&layout.steps, loader)?;

    // 4: verify link signatures.
    gate::verify_all_steps_signatures(layout, &chain, verifier)?;

    // 5: recurse into sublayouts.
    sublayout::verify_sublayouts(
        &layout.keys,
        &mut chain,
        loader,
        base_dir,
        audit_dir,
        depth,
        visited,
        config,
        verifier,
        runner,
        now,
    )?;

    // 6: command alignment (warning only, unless configured to error).
    let command_alignment_warnings = check_command_alignment(layout, &chain, config)?;

    // 7: thresholds, then reduce to one link per step.
    threshold::verify_threshold_constraints(layout, &chain)?;
    let reduced_steps = threshold::reduce_chain_links(&chain);

    // 8: step rules, over the reduced step link map only (§3 invariant 3).
    let step_rule_items: Vec<(&str, Vec<Rule>, Vec<Rule>)> = layout
        .steps
        .iter()
        .map(|s| {
            Ok((
                s.name.as_str(),
                parse_item_rules(&s.expected_materials)?,
                parse_item_rules(&s.expected_products)?,
            ))
        })
        .collect::<Result<_, VerifyError>>()?;
    let step_rule_items_ref: Vec<(&str, &[Rule], &[Rule])> = step_rule_items
        .iter()
        .map(|(n, m, p)| (*n, m.as_slice(), p.as_slice()))
        .collect();
    driver::verify_all_item_rules(&step_rule_items_ref, &reduced_steps, config)?;

    // 9: run inspections.
    let inspection_links =
        inspection::run_all_inspections(&layout.inspect, runner, base_dir, audit_dir)?;

    // 10: inspection rules, over reduced_steps ∪ inspections.
    let mut combined = reduced_steps.clone();
    combined.extend(inspection_links.clone());
    let inspection_rule_items: Vec<(&str, Vec<Rule>, Vec<Rule>)> = layout
        .inspect
        .iter()
        .map(|i: &Inspection| {
            Ok((
                i.name.as_str(),
                parse_item_rules(&i.expected_materials)?,
                parse_item_rules(&i.expected_products)?,
            ))
        })
        .collect::<Result<_, VerifyError>>()?;
    let inspection_rule_items_ref: Vec<(&str, &[Rule], &[Rule])> = inspection_rule_items
        .iter()
        .map(|(n, m, p)| (*n, m.as_slice(), p.as_slice()))
        .collect();
    driver::verify_all_item_rules(&inspection_rule_items_ref, &combined, config)?;

    // 11: emit the summary link.
    let summary_link = summary::build_summary_link(layout, &reduced_steps)?;

    Ok(VerificationReport {
        summary: summary_link,
        command_alignment_warnings,
    })
}
