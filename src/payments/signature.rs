//! HMAC signing primitives used by the webhook verifiers
//!
//! Field selection and ordering are provider-specific and live with each
//! adapter; this module only hashes and compares.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacAlgorithm {
    Sha256,
    Sha512,
}

/// Lower-case hex HMAC of `message`; `None` for an empty secret
pub fn sign_hex(algorithm: HmacAlgorithm, secret: &str, message: &str) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let digest = match algorithm {
        HmacAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
            mac.update(message.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha512 => {
            let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).ok()?;
            mac.update(message.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
    };
    Some(hex::encode(digest))
}

/// Constant-time check of a hex signature (case-insensitive)
///
/// An empty secret or a signature that is not valid hex never verifies.
pub fn verify_hex(algorithm: HmacAlgorithm, secret: &str, message: &str, signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };

    match algorithm {
        HmacAlgorithm::Sha256 => match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mut mac) => {
                mac.update(message.as_bytes());
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
        HmacAlgorithm::Sha512 => match HmacSha512::new_from_slice(secret.as_bytes()) {
            Ok(mut mac) => {
                mac.update(message.as_bytes());
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_sha256_vector() {
        // RFC 4231 test case 2
        let signature = sign_hex(
            HmacAlgorithm::Sha256,
            "Jefe",
            "what do ya want for nothing?",
        )
        .unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_roundtrip_and_tamper() {
        for algorithm in [HmacAlgorithm::Sha256, HmacAlgorithm::Sha512] {
            let signature = sign_hex(algorithm, "secret", "payload").unwrap();
            assert!(verify_hex(algorithm, "secret", "payload", &signature));
            assert!(verify_hex(
                algorithm,
                "secret",
                "payload",
                &signature.to_uppercase()
            ));
            assert!(!verify_hex(algorithm, "secret", "payload!", &signature));
            assert!(!verify_hex(algorithm, "other", "payload", &signature));
        }
    }

    #[test]
    fn test_empty_secret_never_verifies() {
        assert!(sign_hex(HmacAlgorithm::Sha512, "", "payload").is_none());
        assert!(!verify_hex(HmacAlgorithm::Sha512, "", "payload", "00"));
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        assert!(!verify_hex(HmacAlgorithm::Sha256, "secret", "payload", "not-hex"));
        assert!(!verify_hex(HmacAlgorithm::Sha256, "secret", "payload", ""));
    }
}
