use crate::errors::EventError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the `X-Hub-Signature-256` header value for a payload
pub fn sign_payload(secret: &str, payload: &[u8]) -> Result<String, EventError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| EventError::InvalidSignature)?;
    mac.update(payload);
    Ok(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Validate a GitHub webhook delivery
///
/// # Arguments
/// * `secret` - The webhook secret configured on the repository
/// * `payload` - The raw request body bytes
/// * `signature` - The `X-Hub-Signature-256` header (`sha256=<hex>`)
///
/// The digest comparison is constant-time.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> Result<(), EventError> {
    let hex_digest = signature
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(EventError::InvalidSignature)?;
    let expected = hex::decode(hex_digest).map_err(|_| EventError::InvalidSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| EventError::InvalidSignature)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| EventError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // Example delivery from GitHub's webhook documentation
    #[test]
    fn test_known_signature() {
        let signature = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert!(verify_signature("It's a Secret to Everybody", b"Hello, World!", signature).is_ok());
    }

    #[test]
    fn test_signature_round_trip() {
        let payload = br#"{"action":"opened"}"#;
        let signature = sign_payload("s3cret", payload).unwrap();
        assert!(signature.starts_with("sha256="));
        assert!(verify_signature("s3cret", payload, &signature).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"payload";
        let signature = sign_payload("right", payload).unwrap();
        assert!(matches!(
            verify_signature("wrong", payload, &signature),
            Err(EventError::InvalidSignature)
        ));
    }

    #[test]
    fn test_malformed_headers_rejected() {
        assert!(verify_signature("s", b"p", "").is_err());
        assert!(verify_signature("s", b"p", "sha1=abcdef").is_err());
        assert!(verify_signature("s", b"p", "sha256=not-hex").is_err());
        assert!(verify_signature("s", b"p", "sha256=abcd").is_err());
    }

    proptest! {
        #[test]
        fn prop_tampered_payload_rejected(payload in proptest::collection::vec(any::<u8>(), 1..256), flip in any::<usize>()) {
            let signature = sign_payload("secret", &payload).unwrap();
            let mut tampered = payload.clone();
            let index = flip % tampered.len();
            tampered[index] ^= 0x01;
            prop_assert!(verify_signature("secret", &tampered, &signature).is_err());
        }
    }
}
