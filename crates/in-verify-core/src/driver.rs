// C3: item rule driver. Applies an ordered rule list to a step/inspection,
// maintaining the materials and products queues and the "active queue"
// alias the rule source binds to (§4.3, §9 "Shared state -> explicit
// queues").

use std::collections::HashMap;

use crate::config::VerifyConfig;
use crate::error::VerifyError;
use crate::eval;
use crate::model::{Link, Rule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Materials,
    Products,
}

/// Apply `rules` to `item`'s own link, drawn from `links`. `source`
/// determines which queue `MATCH`/`ALLOW`/`DISALLOW` act on; `CREATE`,
/// `DELETE`, and `MODIFY` always touch products, materials, or both
/// respectively, independent of `source` (§4.3 step 3).
pub fn verify_item_rules(
    item: &str,
    source: RuleSource,
    rules: &[Rule],
    links: &HashMap<String, Link>,
    config: &VerifyConfig,
) -> Result<(), VerifyError> {
    let link = links.get(item).ok_or_else(|| VerifyError::RuleVerification {
        item: item.to_string(),
        rule: String::new(),
        reason: format!("no link found for '{item}'"),
    })?;

    let mut materials_queue: eval::Queue = link.materials.keys().cloned().collect();
    let mut products_queue: eval::Queue = link.products.keys().cloned().collect();

    for rule in rules {
        tracing::debug!(item, rule = ?rule, "applying rule");
        match rule {
            Rule::Match { .. } => {
                let active = match source {
                    RuleSource::Materials => &mut materials_queue,
                    RuleSource::Products => &mut products_queue,
                };
                eval::eval_match(item, rule, active, source_artifacts(link, source), links)?;
            }
            Rule::Allow { pattern } => {
                let active = match source {
                    RuleSource::Materials => &mut materials_queue,
                    RuleSource::Products => &mut products_queue,
                };
                eval::eval_allow(pattern, active)?;
            }
            Rule::Disallow { pattern } => {
                let active = match source {
                    RuleSource::Materials => &materials_queue,
                    RuleSource::Products => &products_queue,
                };
                eval::eval_disallow(item, pattern, active)?;
            }
            Rule::Create { pattern } => {
                eval::eval_create(item, pattern, &materials_queue, &mut products_queue)?;
            }
            Rule::Delete { pattern } => {
                eval::eval_delete(item, pattern, &mut materials_queue, &products_queue)?;
            }
            Rule::Modify { pattern } => {
                eval::eval_modify(
                    item,
                    pattern,
                    &mut materials_queue,
                    &mut products_queue,
                    &link.materials,
                    &link.products,
                )?;
            }
        }
    }

    if config.strict_empty_queue {
        let remaining = match source {
            RuleSource::Materials => &materials_queue,
            RuleSource::Products => &products_queue,
        };
        if !remaining.is_empty() {
            return Err(VerifyError::RuleVerification {
                item: item.to_string(),
                rule: String::new(),
                reason: format!(
                    "artifacts not accounted for after rule evaluation: {}",
                    remaining.join(", ")
                ),
            });
        }
    }

    Ok(())
}

fn source_artifacts(link: &Link, source: RuleSource) -> &crate::model::ArtifactSet {
    match source {
        RuleSource::Materials => &link.materials,
        RuleSource::Products => &link.products,
    }
}

/// Verify both material and product rules for every item in `items`,
/// against the combined `links` map (§4.3, `verify_all_item_rules`).
pub fn verify_all_item_rules(
    items: &[(&str, &[Rule], &[Rule])],
    links: &HashMap<String, Link>,
    config: &VerifyConfig,
) -> Result<(), VerifyError> {
    for (name, material_rules, product_rules) in items {
        verify_item_rules(name, RuleSource::Materials, material_rules, links, config)?;
        verify_item_rules(name, RuleSource::Products, product_rules, links, config)?;
    }
    Ok(())
}
