// C1: rule parser. Turns a wire-encoded rule (an ordered token list, §6)
// into the typed `Rule` enum (§3). Validated once here so C2's evaluators
// only ever see well-formed variants (§9 "Tagged variants").

use crate::error::VerifyError;
use crate::model::{ArtifactKind, Rule};

const GLOB_META: &[char] = &['*', '?', '[', ']'];

fn fmt_tokens(tokens: &[String]) -> String {
    tokens.join(" ")
}

fn check_prefix(tokens: &[String], prefix: &str) -> Result<(), VerifyError> {
    if prefix.chars().any(|c| GLOB_META.contains(&c)) {
        return Err(VerifyError::RuleFormat {
            rule: fmt_tokens(tokens),
            reason: format!("prefix '{prefix}' must not contain glob metacharacters"),
        });
    }
    Ok(())
}

fn fmt_err(tokens: &[String], reason: impl Into<String>) -> VerifyError {
    VerifyError::RuleFormat {
        rule: fmt_tokens(tokens),
        reason: reason.into(),
    }
}

/// Parse one rule's token list. Keywords are matched case-insensitively;
/// patterns, prefixes, and step names are matched case-sensitively.
pub fn parse_rule(tokens: &[String]) -> Result<Rule, VerifyError> {
    let Some(keyword) = tokens.first() else {
        return Err(fmt_err(tokens, "empty rule"));
    };

    match keyword.to_ascii_uppercase().as_str() {
        "MATCH" => parse_match(tokens),
        "CREATE" => parse_single_pattern(tokens, |pattern| Rule::Create { pattern }),
        "DELETE" => parse_single_pattern(tokens, |pattern| Rule::Delete { pattern }),
        "MODIFY" => parse_single_pattern(tokens, |pattern| Rule::Modify { pattern }),
        "ALLOW" => parse_single_pattern(tokens, |pattern| Rule::Allow { pattern }),
        "DISALLOW" => parse_single_pattern(tokens, |pattern| Rule::Disallow { pattern }),
        other => Err(fmt_err(tokens, format!("unknown rule keyword '{other}'"))),
    }
}

fn parse_single_pattern(
    tokens: &[String],
    make: impl FnOnce(String) -> Rule,
) -> Result<Rule, VerifyError> {
    match tokens {
        [_kw, pattern] => Ok(make(pattern.clone())),
        _ => Err(fmt_err(tokens, "expected exactly one pattern argument")),
    }
}

fn is_kw(tok: &str, kw: &str) -> bool {
    tok.eq_ignore_ascii_case(kw)
}

/// `MATCH <pattern> [IN <prefix>] WITH (MATERIALS|PRODUCTS) [IN <prefix>] FROM <step>`
fn parse_match(tokens: &[String]) -> Result<Rule, VerifyError> {
    let mut it = tokens.iter();
    it.next(); // MATCH

    let pattern = it
        .next()
        .ok_or_else(|| fmt_err(tokens, "missing pattern"))?
        .clone();

    let mut next = it.next().ok_or_else(|| fmt_err(tokens, "missing WITH"))?;

    let mut source_prefix = None;
    if is_kw(next, "IN") {
        let prefix = it
            .next()
            .ok_or_else(|| fmt_err(tokens, "missing source prefix after IN"))?;
        check_prefix(tokens, prefix)?;
        source_prefix = Some(prefix.clone());
        next = it.next().ok_or_else(|| fmt_err(tokens, "missing WITH"))?;
    }

    if !is_kw(next, "WITH") {
        return Err(fmt_err(tokens, format!("expected WITH, got '{next}'")));
    }

    let dest_kind_tok = it
        .next()
        .ok_or_else(|| fmt_err(tokens, "missing MATERIALS/PRODUCTS"))?;
    let dest_kind = if is_kw(dest_kind_tok, "MATERIALS") {
        ArtifactKind::Materials
    } else if is_kw(dest_kind_tok, "PRODUCTS") {
        ArtifactKind::Products
    } else {
        return Err(fmt_err(
            tokens,
            format!("expected MATERIALS or PRODUCTS, got '{dest_kind_tok}'"),
        ));
    };

    let mut next = it.next().ok_or_else(|| fmt_err(tokens, "missing FROM"))?;

    let mut dest_prefix = None;
    if is_kw(next, "IN") {
        let prefix = it
            .next()
            .ok_or_else(|| fmt_err(tokens, "missing destination prefix after IN"))?;
        check_prefix(tokens, prefix)?;
        dest_prefix = Some(prefix.clone());
        next = it.next().ok_or_else(|| fmt_err(tokens, "missing FROM"))?;
    }

    if !is_kw(next, "FROM") {
        return Err(fmt_err(tokens, format!("expected FROM, got '{next}'")));
    }

    let dest_step = it
        .next()
        .ok_or_else(|| fmt_err(tokens, "missing destination step name"))?
        .clone();

    if it.next().is_some() {
        return Err(fmt_err(tokens, "trailing tokens after FROM <step>"));
    }

    Ok(Rule::Match {
        pattern,
        source_prefix,
        dest_kind,
        dest_prefix,
        dest_step,
    })
}

/// Re-emit a rule as its wire token list, the inverse of [`parse_rule`].
/// Used by the round-trip property in §8 and for error messages.
pub fn emit_rule(rule: &Rule) -> Vec<String> {
    match rule {
        Rule::Match {
            pattern,
            source_prefix,
            dest_kind,
            dest_prefix,
            dest_step,
        } => {
            let mut out = vec!["MATCH".to_string(), pattern.clone()];
            if let Some(p) = source_prefix {
                out.push("IN".to_string());
                out.push(p.clone());
            }
            out.push("WITH".to_string());
            out.push(
                match dest_kind {
                    ArtifactKind::Materials => "MATERIALS",
                    ArtifactKind::Products => "PRODUCTS",
                }
                .to_string(),
            );
            if let Some(p) = dest_prefix {
                out.push("IN".to_string());
                out.push(p.clone());
            }
            out.push("FROM".to_string());
            out.push(dest_step.clone());
            out
        }
        Rule::Create { pattern } => vec!["CREATE".to_string(), pattern.clone()],
        Rule::Delete { pattern } => vec!["DELETE".to_string(), pattern.clone()],
        Rule::Modify { pattern } => vec!["MODIFY".to_string(), pattern.clone()],
        Rule::Allow { pattern } => vec!["ALLOW".to_string(), pattern.clone()],
        Rule::Disallow { pattern } => vec!["DISALLOW".to_string(), pattern.clone()],
    }
}
