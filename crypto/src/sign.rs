//! Ed25519 message signing and verification.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use obol_types::{PrivateKey, PublicKey, Signature};

/// Sign a message with a private key.
pub fn sign_message(private: &PrivateKey, message: &[u8]) -> Signature {
    let signing_key = SigningKey::from_bytes(&private.0);
    Signature(signing_key.sign(message).to_bytes())
}

/// Verify a signature over a message against a public key. Returns false for
/// malformed public keys as well as for invalid signatures.
pub fn verify_signature(public: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public.0) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;

    #[test]
    fn sign_then_verify() {
        let kp = generate_keypair();
        let sig = sign_message(&kp.private, b"announce");
        assert!(verify_signature(&kp.public, b"announce", &sig));
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let kp = generate_keypair();
        let sig = sign_message(&kp.private, b"announce");
        assert!(!verify_signature(&kp.public, b"heartbeat", &sig));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let kp = generate_keypair();
        let other = generate_keypair();
        let sig = sign_message(&kp.private, b"announce");
        assert!(!verify_signature(&other.public, b"announce", &sig));
    }

    #[test]
    fn signatures_are_deterministic() {
        let kp = generate_keypair();
        let a = sign_message(&kp.private, b"payload");
        let b = sign_message(&kp.private, b"payload");
        assert_eq!(a.0.as_ref(), b.0.as_ref());
    }

    #[test]
    fn verify_rejects_malformed_public_key() {
        let kp = generate_keypair();
        let sig = sign_message(&kp.private, b"data");
        // All-ones is not a valid curve point encoding for most values.
        let bad = PublicKey([0xFF; 32]);
        assert!(!verify_signature(&bad, b"data", &sig));
    }
}
