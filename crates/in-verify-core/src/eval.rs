// C2: artifact rule evaluators. Each evaluator takes the queue(s) it needs
// and the artifact sets it may read, and returns the reduced queue(s) or an
// error (§4.2).

use std::collections::HashMap;

use globset::Glob;

use crate::error::VerifyError;
use crate::model::{ArtifactKind, ArtifactSet, Link, Rule};

/// An ordered set of artifact paths not yet accounted for by prior rules.
pub type Queue = Vec<String>;

fn glob_filter(queue: &[String], pattern: &str) -> Result<Vec<String>, VerifyError> {
    let matcher = Glob::new(pattern)
        .map_err(|e| VerifyError::RuleFormat {
            rule: pattern.to_string(),
            reason: format!("invalid glob pattern: {e}"),
        })?
        .compile_matcher();
    Ok(queue.iter().filter(|p| matcher.is_match(p.as_str())).cloned().collect())
}

fn remove_all(queue: &mut Queue, matched: &[String]) {
    queue.retain(|p| !matched.contains(p));
}

/// MATCH: cross-step artifact-flow identity (§4.2).
pub fn eval_match(
    item: &str,
    rule: &Rule,
    source_queue: &mut Queue,
    source_artifacts: &ArtifactSet,
    links: &HashMap<String, Link>,
) -> Result<(), VerifyError> {
    let Rule::Match {
        pattern,
        source_prefix,
        dest_kind,
        dest_prefix,
        dest_step,
    } = rule
    else {
        unreachable!("eval_match called with non-Match rule")
    };

    let dest_link = links.get(dest_step).ok_or_else(|| VerifyError::RuleVerification {
        item: item.to_string(),
        rule: format!("MATCH ... FROM {dest_step}"),
        reason: format!("destination link '{dest_step}' not found"),
    })?;

    let dest_artifacts = match dest_kind {
        ArtifactKind::Materials => &dest_link.materials,
        ArtifactKind::Products => &dest_link.products,
    };

    // Filter I: keep only queued paths under the source prefix, then strip it.
    let relative: Vec<(String, String)> = match source_prefix {
        Some(prefix) => {
            let with_slash = format!("{prefix}/");
            source_queue
                .iter()
                .filter(|p| p.starts_with(&with_slash))
                .map(|p| (p.clone(), p[with_slash.len()..].to_string()))
                .collect()
        }
        None => source_queue.iter().map(|p| (p.clone(), p.clone())).collect(),
    };

    // Filter II: glob the relative paths.
    let relative_paths: Vec<String> = relative.iter().map(|(_, rel)| rel.clone()).collect();
    let matched_relative = glob_filter(&relative_paths, pattern)?;
    let matched: Vec<(String, String)> = relative
        .into_iter()
        .filter(|(_, rel)| matched_relative.contains(rel))
        .collect();

    let mut consumed = Vec::new();
    for (full_src, rel) in matched {
        let full_dst = match dest_prefix {
            Some(prefix) => format!("{prefix}/{rel}"),
            None => rel.clone(),
        };

        let src_digest = source_artifacts.get(&full_src).ok_or_else(|| {
            VerifyError::RuleVerification {
                item: item.to_string(),
                rule: format!("MATCH {pattern}"),
                reason: format!("queued artifact '{full_src}' missing from source artifact set"),
            }
        })?;

        let dst_digest = dest_artifacts.get(&full_dst).ok_or_else(|| {
            VerifyError::RuleVerification {
                item: item.to_string(),
                rule: format!("MATCH {pattern} ... FROM {dest_step}"),
                reason: format!("destination artifact '{full_dst}' not found in '{dest_step}'"),
            }
        })?;

        if src_digest != dst_digest {
            return Err(VerifyError::RuleVerification {
                item: item.to_string(),
                rule: format!("MATCH {pattern} ... FROM {dest_step}"),
                reason: format!(
                    "'{full_src}' and '{full_dst}' have different digests"
                ),
            });
        }

        consumed.push(full_src);
    }

    remove_all(source_queue, &consumed);
    Ok(())
}

/// CREATE: matched products must not also be queued materials (§4.2).
pub fn eval_create(
    item: &str,
    pattern: &str,
    materials_queue: &Queue,
    products_queue: &mut Queue,
) -> Result<(), VerifyError> {
    let matched = glob_filter(products_queue, pattern)?;
    for path in &matched {
        if materials_queue.contains(path) {
            return Err(VerifyError::RuleVerification {
                item: item.to_string(),
                rule: format!("CREATE {pattern}"),
                reason: format!("'{path}' is a material but should have been newly created"),
            });
        }
    }
    remove_all(products_queue, &matched);
    Ok(())
}

/// DELETE: matched materials must not also be queued products (§4.2).
pub fn eval_delete(
    item: &str,
    pattern: &str,
    materials_queue: &mut Queue,
    products_queue: &Queue,
) -> Result<(), VerifyError> {
    let matched = glob_filter(materials_queue, pattern)?;
    for path in &matched {
        if products_queue.contains(path) {
            return Err(VerifyError::RuleVerification {
                item: item.to_string(),
                rule: format!("DELETE {pattern}"),
                reason: format!("'{path}' is a product but should have been deleted"),
            });
        }
    }
    remove_all(materials_queue, &matched);
    Ok(())
}

/// MODIFY: matched materials and products must be the same set of paths, and
/// every matched path's digest must differ between materials and products
/// (§4.2).
pub fn eval_modify(
    item: &str,
    pattern: &str,
    materials_queue: &mut Queue,
    products_queue: &mut Queue,
    materials: &ArtifactSet,
    products: &ArtifactSet,
) -> Result<(), VerifyError> {
    let matched_materials = glob_filter(materials_queue, pattern)?;
    let matched_products = glob_filter(products_queue, pattern)?;

    let only_materials: Vec<&String> = matched_materials
        .iter()
        .filter(|p| !matched_products.contains(*p))
        .collect();
    if let Some(p) = only_materials.first() {
        return Err(VerifyError::RuleVerification {
            item: item.to_string(),
            rule: format!("MODIFY {pattern}"),
            reason: format!("'{p}' appears as material but not as product"),
        });
    }

    let only_products: Vec<&String> = matched_products
        .iter()
        .filter(|p| !matched_materials.contains(*p))
        .collect();
    if let Some(p) = only_products.first() {
        return Err(VerifyError::RuleVerification {
            item: item.to_string(),
            rule: format!("MODIFY {pattern}"),
            reason: format!("'{p}' appears as product but not as material"),
        });
    }

    for path in &matched_materials {
        if materials.get(path) == products.get(path) {
            return Err(VerifyError::RuleVerification {
                item: item.to_string(),
                rule: format!("MODIFY {pattern}"),
                reason: format!("'{path}' has the same digest in materials and products"),
            });
        }
    }

    remove_all(materials_queue, &matched_materials);
    remove_all(products_queue, &matched_products);
    Ok(())
}

/// ALLOW: authorizes matched artifacts; never fails (§4.2).
pub fn eval_allow(pattern: &str, queue: &mut Queue) -> Result<(), VerifyError> {
    let matched = glob_filter(queue, pattern)?;
    remove_all(queue, &matched);
    Ok(())
}

/// DISALLOW: matched artifacts are forbidden; queue is unchanged (§4.2).
pub fn eval_disallow(item: &str, pattern: &str, queue: &Queue) -> Result<(), VerifyError> {
    let matched = glob_filter(queue, pattern)?;
    if !matched.is_empty() {
        return Err(VerifyError::RuleVerification {
            item: item.to_string(),
            rule: format!("DISALLOW {pattern}"),
            reason: format!("disallowed artifacts matched: {}", matched.join(", ")),
        });
    }
    Ok(())
}


#[cfg(test)]
mod queue_cardinality {
    use super::*;
    use proptest::prelude::*;

    fn arb_queue() -> impl Strategy<Value = Queue> {
        proptest::collection::vec("[a-z]{1,6}\\.(o|bin|txt)", 0..8)
    }

    proptest! {
        // |queue_after| <= |queue_before| for every evaluator that takes a
        // single queue and a glob pattern, regardless of outcome (§8).
        #[test]
        fn allow_never_grows_the_queue(mut queue in arb_queue(), pattern in "\\*|[a-z]+\\.[a-z]+") {
            let before = queue.len();
            let _ = eval_allow(&pattern, &mut queue);
            prop_assert!(queue.len() <= before);
        }

        #[test]
        fn create_never_grows_products_queue(
            materials in arb_queue(),
            mut products in arb_queue(),
            pattern in "\\*|[a-z]+\\.[a-z]+",
        ) {
            let before = products.len();
            let _ = eval_create("item", &pattern, &materials, &mut products);
            prop_assert!(products.len() <= before);
        }

        #[test]
        fn delete_never_grows_materials_queue(
            mut materials in arb_queue(),
            products in arb_queue(),
            pattern in "\\*|[a-z]+\\.[a-z]+",
        ) {
            let before = materials.len();
            let _ = eval_delete("item", &pattern, &mut materials, &products);
            prop_assert!(materials.len() <= before);
        }
    }
}
