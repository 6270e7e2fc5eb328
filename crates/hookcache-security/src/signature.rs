//! HMAC signature extraction and verification.
//!
//! Signatures travel in one of several headers, formatted `algorithm=hexdigest`.
//! The digest is computed over the raw payload bytes and compared in constant
//! time (`Mac::verify_slice`).

use std::collections::HashMap;

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};

/// Accepted signature header names, in lookup order.
pub const SIGNATURE_HEADERS: [&str; 5] = [
    "x-hub-signature-256",
    "x-signature-256",
    "x-hub-signature",
    "x-signature",
    "signature",
];

/// Supported HMAC algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl SignatureAlgorithm {
    /// Parse an algorithm name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a signature was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("malformed signature: {reason}")]
    Malformed { reason: String },

    #[error("signature algorithm not allowed: {algorithm}")]
    AlgorithmNotAllowed { algorithm: String },

    #[error("signature mismatch")]
    Mismatch,

    #[error("invalid HMAC key")]
    InvalidKey,
}

/// A signature header split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    /// Header the signature was read from.
    pub header: &'static str,
    /// Algorithm name as sent (lowercased).
    pub algorithm: String,
    /// Decoded digest bytes.
    pub digest: Vec<u8>,
}

/// Find the first accepted signature header (header names are case-insensitive).
pub fn extract_signature(headers: &HashMap<String, String>) -> Option<(&'static str, &str)> {
    SIGNATURE_HEADERS.iter().find_map(|name| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| (*name, v.as_str()))
    })
}

/// Parse `algorithm=hexdigest`.
pub fn parse_signature(
    header: &'static str,
    value: &str,
) -> Result<ParsedSignature, SignatureError> {
    let (algorithm, hex_digest) =
        value
            .trim()
            .split_once('=')
            .ok_or_else(|| SignatureError::Malformed {
                reason: "expected algorithm=hexdigest".to_string(),
            })?;

    if algorithm.is_empty() || hex_digest.is_empty() {
        return Err(SignatureError::Malformed {
            reason: "empty algorithm or digest".to_string(),
        });
    }

    let digest = hex::decode(hex_digest).map_err(|e| SignatureError::Malformed {
        reason: format!("digest is not hex: {}", e),
    })?;

    Ok(ParsedSignature {
        header,
        algorithm: algorithm.to_ascii_lowercase(),
        digest,
    })
}

/// Verify the signature carried in `headers` against `payload`.
///
/// Returns the algorithm that verified.
pub fn verify_signature(
    secret: &[u8],
    payload: &[u8],
    headers: &HashMap<String, String>,
    allowed: &[SignatureAlgorithm],
) -> Result<SignatureAlgorithm, SignatureError> {
    let (header, value) = extract_signature(headers).ok_or(SignatureError::Missing)?;
    let parsed = parse_signature(header, value)?;

    let algorithm = SignatureAlgorithm::parse(&parsed.algorithm)
        .filter(|a| allowed.contains(a))
        .ok_or_else(|| SignatureError::AlgorithmNotAllowed {
            algorithm: parsed.algorithm.clone(),
        })?;

    let verified = match algorithm {
        SignatureAlgorithm::Sha256 => verify_mac::<Hmac<Sha256>>(secret, payload, &parsed.digest),
        SignatureAlgorithm::Sha384 => verify_mac::<Hmac<Sha384>>(secret, payload, &parsed.digest),
        SignatureAlgorithm::Sha512 => verify_mac::<Hmac<Sha512>>(secret, payload, &parsed.digest),
    }?;

    if verified {
        Ok(algorithm)
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produce the `algorithm=hexdigest` header value for `payload`.
pub fn sign(
    secret: &[u8],
    payload: &[u8],
    algorithm: SignatureAlgorithm,
) -> Result<String, SignatureError> {
    let digest = match algorithm {
        SignatureAlgorithm::Sha256 => compute_mac::<Hmac<Sha256>>(secret, payload)?,
        SignatureAlgorithm::Sha384 => compute_mac::<Hmac<Sha384>>(secret, payload)?,
        SignatureAlgorithm::Sha512 => compute_mac::<Hmac<Sha512>>(secret, payload)?,
    };
    Ok(format!("{}={}", algorithm, hex::encode(digest)))
}

fn keyed<M: Mac + KeyInit>(secret: &[u8], payload: &[u8]) -> Result<M, SignatureError> {
    let mut mac = <M as Mac>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(payload);
    Ok(mac)
}

fn verify_mac<M: Mac + KeyInit>(
    secret: &[u8],
    payload: &[u8],
    expected: &[u8],
) -> Result<bool, SignatureError> {
    Ok(keyed::<M>(secret, payload)?.verify_slice(expected).is_ok())
}

fn compute_mac<M: Mac + KeyInit>(secret: &[u8], payload: &[u8]) -> Result<Vec<u8>, SignatureError> {
    Ok(keyed::<M>(secret, payload)?
        .finalize()
        .into_bytes()
        .to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"webhook-secret";

    fn headers(name: &str, value: &str) -> HashMap<String, String> {
        HashMap::from([(name.to_string(), value.to_string())])
    }

    #[test]
    fn test_sign_then_verify_all_algorithms() {
        let payload = br#"{"event":"workflow.completed"}"#;
        for algorithm in [
            SignatureAlgorithm::Sha256,
            SignatureAlgorithm::Sha384,
            SignatureAlgorithm::Sha512,
        ] {
            let value = sign(SECRET, payload, algorithm).unwrap();
            assert!(value.starts_with(algorithm.as_str()));
            let verified =
                verify_signature(SECRET, payload, &headers("x-signature", &value), &[algorithm]);
            assert_eq!(verified, Ok(algorithm));
        }
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let value = sign(
            b"Jefe",
            b"what do ya want for nothing?",
            SignatureAlgorithm::Sha256,
        )
        .unwrap();
        assert_eq!(
            value,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_header_lookup_order_and_case() {
        let mut map = HashMap::new();
        map.insert("Signature".to_string(), "sha256=00".to_string());
        map.insert("X-Hub-Signature-256".to_string(), "sha256=ff".to_string());
        let (name, value) = extract_signature(&map).unwrap();
        assert_eq!(name, "x-hub-signature-256");
        assert_eq!(value, "sha256=ff");
    }

    #[test]
    fn test_missing_header() {
        let result = verify_signature(
            SECRET,
            b"{}",
            &headers("content-type", "application/json"),
            &[SignatureAlgorithm::Sha256],
        );
        assert_eq!(result, Err(SignatureError::Missing));
    }

    #[test]
    fn test_malformed_values() {
        for value in ["sha256", "=abcd", "sha256=", "sha256=zz-not-hex"] {
            let result = verify_signature(
                SECRET,
                b"{}",
                &headers("signature", value),
                &[SignatureAlgorithm::Sha256],
            );
            assert!(
                matches!(result, Err(SignatureError::Malformed { .. })),
                "{value} should be malformed: {result:?}"
            );
        }
    }

    #[test]
    fn test_disallowed_algorithm() {
        let value = sign(SECRET, b"{}", SignatureAlgorithm::Sha512).unwrap();
        let result = verify_signature(
            SECRET,
            b"{}",
            &headers("signature", &value),
            &[SignatureAlgorithm::Sha256],
        );
        assert_eq!(
            result,
            Err(SignatureError::AlgorithmNotAllowed {
                algorithm: "sha512".to_string()
            })
        );

        let result = verify_signature(
            SECRET,
            b"{}",
            &headers("signature", "sha1=abcdef"),
            &[SignatureAlgorithm::Sha256],
        );
        assert!(matches!(
            result,
            Err(SignatureError::AlgorithmNotAllowed { .. })
        ));
    }

    #[test]
    fn test_single_byte_flip_in_payload_or_signature() {
        let payload = b"{\"page\":\"strategy-plans\"}".to_vec();
        let value = sign(SECRET, &payload, SignatureAlgorithm::Sha256).unwrap();
        let allowed = [SignatureAlgorithm::Sha256];

        for i in 0..payload.len() {
            let mut tampered = payload.clone();
            tampered[i] ^= 0x01;
            assert_eq!(
                verify_signature(SECRET, &tampered, &headers("signature", &value), &allowed),
                Err(SignatureError::Mismatch)
            );
        }

        let (prefix, hex_digest) = value.split_once('=').unwrap();
        let mut digest = hex::decode(hex_digest).unwrap();
        digest[0] ^= 0x80;
        let tampered = format!("{}={}", prefix, hex::encode(digest));
        assert_eq!(
            verify_signature(SECRET, &payload, &headers("signature", &tampered), &allowed),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_truncated_digest_is_mismatch() {
        let value = sign(SECRET, b"{}", SignatureAlgorithm::Sha256).unwrap();
        let truncated = &value[..value.len() - 2];
        assert_eq!(
            verify_signature(
                SECRET,
                b"{}",
                &headers("signature", truncated),
                &[SignatureAlgorithm::Sha256]
            ),
            Err(SignatureError::Mismatch)
        );
    }
}
