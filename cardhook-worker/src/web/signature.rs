//! Push webhook signature verification.
//!
//! The sender signs the raw request body with HMAC using the shared webhook
//! secret and sends the hex digest as `sha1=<hex>` in `X-Hub-Signature`
//! (or `sha256=<hex>` in `X-Hub-Signature-256`).

use hmac::digest::{InvalidLength, KeyInit};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Header carrying the HMAC-SHA1 signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Header carrying the HMAC-SHA256 signature.
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";

/// Signature verification failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// The header is empty or not of the form `<algorithm>=<hex>`.
    #[error("signature missing or malformed: {0}")]
    Missing(String),
    /// The digest does not match the body.
    #[error("signature mismatch")]
    Mismatch,
}

/// HMAC digest algorithm named by the header prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    fn prefix(self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1",
            SignatureAlgorithm::Sha256 => "sha256",
        }
    }
}

/// Parse a signature header such as `sha1=0566101a3c64b9aad1f0352f10082df504d0d442`.
///
/// Returns the decoded digest bytes.
pub fn parse_signature(raw: &str, algorithm: SignatureAlgorithm) -> Result<Vec<u8>, SignatureError> {
    if raw.trim().is_empty() {
        return Err(SignatureError::Missing("empty signature".to_string()));
    }

    let parts: Vec<&str> = raw.split('=').collect();
    if parts.len() != 2 {
        return Err(SignatureError::Missing(format!("malformed signature \"{raw}\"")));
    }

    if parts[0] != algorithm.prefix() {
        return Err(SignatureError::Missing(format!(
            "only {} supported, got \"{}\"",
            algorithm.prefix(),
            parts[0]
        )));
    }

    hex::decode(parts[1]).map_err(|e| SignatureError::Missing(format!("invalid hex digest: {e}")))
}

/// Verify `header` against an HMAC of `body` keyed with `secret`.
///
/// The digest comparison is constant-time.
pub fn verify_signature(
    body: &[u8],
    header: &str,
    secret: &[u8],
    algorithm: SignatureAlgorithm,
) -> Result<(), SignatureError> {
    let provided = parse_signature(header, algorithm)?;

    let verified = match algorithm {
        SignatureAlgorithm::Sha1 => {
            keyed::<HmacSha1>(secret, body).map(|mac| mac.verify_slice(&provided).is_ok())
        }
        SignatureAlgorithm::Sha256 => {
            keyed::<HmacSha256>(secret, body).map(|mac| mac.verify_slice(&provided).is_ok())
        }
    };

    match verified {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(
                algorithm = algorithm.prefix(),
                body_length = body.len(),
                "webhook_signature_mismatch"
            );
            Err(SignatureError::Mismatch)
        }
        Err(_) => {
            warn!("webhook_signature_invalid_key");
            Err(SignatureError::Mismatch)
        }
    }
}

/// Compute the header value for `body`, e.g. `sha1=<hex>`.
pub fn sign(body: &[u8], secret: &[u8], algorithm: SignatureAlgorithm) -> String {
    let digest = match algorithm {
        SignatureAlgorithm::Sha1 => {
            keyed::<HmacSha1>(secret, body).map(|mac| mac.finalize().into_bytes().to_vec())
        }
        SignatureAlgorithm::Sha256 => {
            keyed::<HmacSha256>(secret, body).map(|mac| mac.finalize().into_bytes().to_vec())
        }
    };
    // HMAC takes keys of any length, so the error arm is unreachable.
    format!("{}={}", algorithm.prefix(), hex::encode(digest.unwrap_or_default()))
}

fn keyed<M: Mac + KeyInit>(secret: &[u8], body: &[u8]) -> Result<M, InvalidLength> {
    let mut mac = <M as KeyInit>::new_from_slice(secret)?;
    mac.update(body);
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-webhook-secret";

    #[test]
    fn test_parse_signature_empty() {
        assert!(matches!(
            parse_signature("", SignatureAlgorithm::Sha1),
            Err(SignatureError::Missing(_))
        ));
        assert!(matches!(
            parse_signature("   ", SignatureAlgorithm::Sha1),
            Err(SignatureError::Missing(_))
        ));
    }

    #[test]
    fn test_parse_signature_malformed() {
        for raw in ["sha1", "sha1=abc=def", "=", "sha1:0a0b"] {
            assert!(
                matches!(parse_signature(raw, SignatureAlgorithm::Sha1), Err(SignatureError::Missing(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_signature_wrong_algorithm() {
        assert!(matches!(
            parse_signature("md5=0a0b", SignatureAlgorithm::Sha1),
            Err(SignatureError::Missing(_))
        ));
        assert!(matches!(
            parse_signature("sha1=0a0b", SignatureAlgorithm::Sha256),
            Err(SignatureError::Missing(_))
        ));
    }

    #[test]
    fn test_parse_signature_non_hex() {
        assert!(matches!(
            parse_signature("sha1=not-hex", SignatureAlgorithm::Sha1),
            Err(SignatureError::Missing(_))
        ));
    }

    #[test]
    fn test_parse_signature_valid() {
        let bytes = parse_signature("sha1=0566101a", SignatureAlgorithm::Sha1).unwrap();
        assert_eq!(bytes, vec![0x05, 0x66, 0x10, 0x1a]);
    }

    #[test]
    fn test_verify_signature_valid() {
        let body = br#"{"ref":"refs/heads/main","commits":[]}"#;
        let header = sign(body, SECRET, SignatureAlgorithm::Sha1);
        assert!(header.starts_with("sha1="));
        assert_eq!(verify_signature(body, &header, SECRET, SignatureAlgorithm::Sha1), Ok(()));
    }

    #[test]
    fn test_verify_signature_sha256_valid() {
        let body = b"payload";
        let header = sign(body, SECRET, SignatureAlgorithm::Sha256);
        assert_eq!(
            verify_signature(body, &header, SECRET, SignatureAlgorithm::Sha256),
            Ok(())
        );
    }

    #[test]
    fn test_verify_signature_wrong_secret() {
        let body = b"payload";
        let header = sign(body, b"other-secret", SignatureAlgorithm::Sha1);
        assert_eq!(
            verify_signature(body, &header, SECRET, SignatureAlgorithm::Sha1),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_any_flipped_byte_is_detected() {
        let body = br#"{"commits":[{"message":"Fixed it [CARD-1](Done)"}]}"#.to_vec();
        let header = sign(&body, SECRET, SignatureAlgorithm::Sha1);

        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert_eq!(
                verify_signature(&tampered, &header, SECRET, SignatureAlgorithm::Sha1),
                Err(SignatureError::Mismatch),
                "flipping byte {i} went undetected"
            );
        }
    }

    #[test]
    fn test_truncated_digest_is_mismatch() {
        let body = b"payload";
        let header = sign(body, SECRET, SignatureAlgorithm::Sha1);
        let short = &header[..header.len() - 2];
        assert_eq!(
            verify_signature(body, short, SECRET, SignatureAlgorithm::Sha1),
            Err(SignatureError::Mismatch)
        );
    }
}
