// Signature primitive boundary (§1 "out of scope": cryptographic signature
// primitives; §6 "the core consumes only verify(object, key) -> bool and is
// agnostic to algorithm"). `SignatureVerifier` is that seam; `Ed25519Verifier`
// is the concrete default, grounded on the teacher's use of `ed25519-dalek`
// for receipt/audit signing (knhk-lockchain, knhk-autonomous-loop).

use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};

use crate::model::{PublicKey, Signature};

/// The seam the core depends on. Swappable for another algorithm or a
/// hardware-backed signer without touching C4.
pub trait SignatureVerifier {
    fn verify(&self, message: &[u8], signature: &Signature, key: &PublicKey) -> bool;
}

/// Default implementation: Ed25519 via `ed25519-dalek`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], signature: &Signature, key: &PublicKey) -> bool {
        let Ok(key_bytes) = <[u8; 32]>::try_from(key.key.as_slice()) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.sig.as_slice()) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&sig_bytes);
        verifying_key.verify(message, &sig).is_ok()
    }
}
