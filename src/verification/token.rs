//! Decoding of the compact signed token carried in the `MoneyKit-Signature` header

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{error::TokenError, keys::Algorithm};

/// Claims from the token header that select the verification key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderClaims {
    pub key_id: String,
    pub algorithm: Algorithm,
}

/// Claims from the token payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayloadClaims {
    /// Hex encoded SHA-256 of the webhook request body
    #[serde(rename = "request_body_sha256")]
    pub expected_body_hash_hex: String,
    #[serde(rename = "iat")]
    pub issued_at: Option<i64>,
    #[serde(rename = "exp")]
    pub expires_at: Option<i64>,
    #[serde(rename = "nbf")]
    pub not_before: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    alg: String,
    kid: Option<String>,
}

/// A decoded `header.payload.signature` token. The payload claims are not
/// trustworthy until the signature has been verified.
#[derive(Debug, Clone)]
pub struct SignedToken {
    header: HeaderClaims,
    claims: PayloadClaims,
    signing_input: String,
    signature: Vec<u8>,
}

impl SignedToken {
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let segments: Vec<&str> = token.trim().split('.').collect();
        let [header_segment, payload_segment, signature_segment] = segments[..] else {
            return Err(TokenError::Malformed(format!(
                "expected 3 segments, got {}",
                segments.len()
            )));
        };
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(TokenError::Malformed("token has an empty segment".into()));
        }

        let raw_header: RawHeader = decode_json(header_segment, "header")?;
        let algorithm = raw_header
            .alg
            .parse()
            .map_err(TokenError::UnsupportedAlgorithm)?;
        let key_id = raw_header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| TokenError::Malformed("header has no 'kid'".into()))?;

        let claims: PayloadClaims = decode_json(payload_segment, "payload")?;
        let signature = BASE64_URL_SAFE_NO_PAD
            .decode(signature_segment)
            .map_err(|e| TokenError::Malformed(format!("signature is not base64url: {e}")))?;

        Ok(Self {
            header: HeaderClaims { key_id, algorithm },
            claims,
            signing_input: format!("{header_segment}.{payload_segment}"),
            signature,
        })
    }

    pub fn header(&self) -> &HeaderClaims {
        &self.header
    }

    pub fn key_id(&self) -> &str {
        &self.header.key_id
    }

    /// Payload claims before verification. Use
    /// [verify_signature](super::algorithms::verify_signature) to get trusted claims.
    pub fn unverified_claims(&self) -> &PayloadClaims {
        &self.claims
    }

    /// The exact `header.payload` text that was signed
    pub fn signing_input(&self) -> &[u8] {
        self.signing_input.as_bytes()
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

fn decode_json<T: DeserializeOwned>(segment: &str, name: &str) -> Result<T, TokenError> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("{name} is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::Malformed(format!("{name} is not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn segment(value: serde_json::Value) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(value.to_string())
    }

    fn token(header: serde_json::Value, payload: serde_json::Value) -> String {
        format!("{}.{}.c2ln", segment(header), segment(payload))
    }

    #[test]
    fn decodes_claims_and_keeps_signing_input_verbatim() {
        let header = segment(json!({"alg": "ES256", "kid": "k1", "typ": "JWT"}));
        let payload = segment(json!({"request_body_sha256": "abc", "iat": 1700000000}));
        let raw = format!("{header}.{payload}.c2ln");

        let token = SignedToken::decode(&raw).unwrap();
        assert_eq!(token.key_id(), "k1");
        assert_eq!(token.header().algorithm, Algorithm::Es256);
        assert_eq!(token.unverified_claims().expected_body_hash_hex, "abc");
        assert_eq!(token.unverified_claims().issued_at, Some(1700000000));
        assert_eq!(token.unverified_claims().expires_at, None);
        assert_eq!(
            token.signing_input(),
            format!("{header}.{payload}").as_bytes()
        );
        assert_eq!(token.signature(), b"sig");
    }

    #[test]
    fn wrong_segment_count() {
        for raw in ["", "a", "a.b", "a.b.c.d"] {
            assert!(
                matches!(SignedToken::decode(raw), Err(TokenError::Malformed(_))),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn empty_segment() {
        let valid = token(
            json!({"alg": "ES256", "kid": "k1"}),
            json!({"request_body_sha256": "abc"}),
        );
        let (head, _) = valid.rsplit_once('.').unwrap();
        assert!(matches!(
            SignedToken::decode(&format!("{head}.")),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn header_or_payload_not_json() {
        let payload = segment(json!({"request_body_sha256": "abc"}));
        let not_json = BASE64_URL_SAFE_NO_PAD.encode("not json");
        assert!(matches!(
            SignedToken::decode(&format!("{not_json}.{payload}.c2ln")),
            Err(TokenError::Malformed(_))
        ));

        let header = segment(json!({"alg": "ES256", "kid": "k1"}));
        assert!(matches!(
            SignedToken::decode(&format!("{header}.{not_json}.c2ln")),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            SignedToken::decode(&format!("{header}.!!!.c2ln")),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn missing_key_id() {
        let claims = json!({"request_body_sha256": "abc"});
        let raw = token(json!({"alg": "ES256"}), claims.clone());
        assert!(matches!(
            SignedToken::decode(&raw),
            Err(TokenError::Malformed(_))
        ));

        let raw = token(json!({"alg": "ES256", "kid": ""}), claims);
        assert!(matches!(
            SignedToken::decode(&raw),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn missing_body_hash_claim() {
        let raw = token(json!({"alg": "ES256", "kid": "k1"}), json!({"iat": 1}));
        assert!(matches!(
            SignedToken::decode(&raw),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn unsupported_algorithm() {
        for alg in ["HS256", "RS256", "none", "es256"] {
            let raw = token(
                json!({"alg": alg, "kid": "k1"}),
                json!({"request_body_sha256": "abc"}),
            );
            match SignedToken::decode(&raw) {
                Err(TokenError::UnsupportedAlgorithm(name)) => assert_eq!(name, alg),
                other => panic!("expected unsupported algorithm for {alg}, got {other:?}"),
            }
        }
    }
}
