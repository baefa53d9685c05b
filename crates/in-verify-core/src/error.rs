// Error taxonomy for layout/link verification.

use thiserror::Error;

/// Errors raised while verifying a layout against its chain of links.
///
/// Each variant names the step, inspection, or rule that triggered it so the
/// caller can report a precise failure without re-walking the layout.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifyError {
    #[error("signature verification failed for '{subject}': {reason}")]
    Signature { subject: String, reason: String },

    #[error("link for step '{step}' signed by unauthorized key '{keyid}'")]
    Authorization { step: String, keyid: String },

    #[error("layout expired at {expires} (now is {now})")]
    Expired { expires: String, now: String },

    #[error("threshold not met for step '{step}': {reason}")]
    Threshold { step: String, reason: String },

    #[error("malformed rule '{rule}': {reason}")]
    RuleFormat { rule: String, reason: String },

    #[error("rule '{rule}' failed for '{item}': {reason}")]
    RuleVerification {
        item: String,
        rule: String,
        reason: String,
    },

    #[error("inspection '{inspection}' returned a bad value: {reason}")]
    BadReturn { inspection: String, reason: String },

    #[error("sublayout recursion exceeded depth {max_depth} at '{step}'")]
    Recursion { step: String, max_depth: u32 },

    #[error("I/O error reading '{path}': {reason}")]
    Io { path: String, reason: String },
}

pub type VerifyResult<T> = Result<T, VerifyError>;
