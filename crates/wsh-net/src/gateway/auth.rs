//! Gateway authentication transcript binding: derives the digest a session
//! signs to prove control of its key, and verifies it on the other side.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Builds the signing transcript `SHA-256("wsh-v1\0" || session_id || nonce)`.
pub fn transcript(session_id: &[u8], nonce: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"wsh-v1\0");
    hasher.update(session_id);
    hasher.update(nonce);
    hasher.finalize().into()
}

/// Signs the session/nonce transcript with `signing_key`, returning the
/// 64-byte Ed25519 signature.
pub fn sign(signing_key: &SigningKey, session_id: &[u8], nonce: &[u8; 32]) -> [u8; 64] {
    let digest = transcript(session_id, nonce);
    signing_key.sign(&digest).to_bytes()
}

/// Verifies a 64-byte Ed25519 signature against the session/nonce
/// transcript and the peer's 32-byte raw public key.
pub fn verify(public_key: &[u8; 32], session_id: &[u8], nonce: &[u8; 32], signature: &[u8; 64]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let digest = transcript(session_id, nonce);
    let signature = Signature::from_bytes(signature);
    verifying_key.verify(&digest, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn sign_then_verify_round_trips() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let session_id = b"session-42";
        let nonce = [7u8; 32];
        let signature = sign(&signing_key, session_id, &nonce);
        let public_key = signing_key.verifying_key().to_bytes();
        assert!(verify(&public_key, session_id, &nonce, &signature));
    }

    #[test]
    fn tampered_transcript_fails_verification() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let nonce = [1u8; 32];
        let signature = sign(&signing_key, b"session-a", &nonce);
        let public_key = signing_key.verifying_key().to_bytes();
        assert!(!verify(&public_key, b"session-b", &nonce, &signature));
    }
}
