use thiserror::Error;

use crate::verification::RejectReason;

/// Failure to retrieve the provider's signing keys
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed
    #[error("failed to build key set HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// The request did not complete within the configured timeout
    #[error("key set request timed out")]
    Timeout,
    /// Network or transport failure
    #[error("key set request failed: {0}")]
    Transport(#[source] reqwest::Error),
    /// The endpoint answered with a non-success status
    #[error("key set endpoint returned HTTP {0}")]
    Status(u16),
    /// The response body was not a key set document
    #[error("key set document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err)
        }
    }
}

/// A JWK record that cannot be turned into a trusted signing key
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key record is missing '{0}'")]
    MissingField(&'static str),
    #[error("unsupported key type or curve: kty={kty:?} crv={crv:?}")]
    UnsupportedCurve {
        kty: Option<String>,
        crv: Option<String>,
    },
    #[error("unsupported key algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("key coordinate is invalid: {0}")]
    InvalidCoordinate(String),
    #[error("public key is invalid: {0}")]
    InvalidPoint(String),
}

/// Structurally invalid signature token
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("unsupported token algorithm '{0}'")]
    UnsupportedAlgorithm(String),
}

/// Cryptographic verification of the token failed
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("algorithm is not ES256")]
    AlgorithmMismatch,
    #[error("signature is not a 64 byte ECDSA signature")]
    Encoding,
    #[error("ECDSA P-256 verification failed")]
    Verification,
}

/// The token's registered time claims are outside the accepted window
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token expired at {0}")]
    Expired(i64),
    #[error("token is not valid before {0}")]
    NotYetValid(i64),
}

/// Possible errors when receiving a webhook
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The webhook was rejected by the verifier
    #[error("Webhook verification failed: {0}")]
    Rejected(RejectReason),
    /// The body was larger than the configured maximum
    #[error("Webhook body exceeds {0} bytes")]
    PayloadTooLarge(u64),
    /// Error deserializing webhook payload
    #[error("Failed to deserialize webhook payload: {0}")]
    Deserialize(serde_json::Error),
    /// Error while reading the body of the webhook
    #[error("Failed to read webhook body: {0}")]
    Read(rocket::tokio::io::Error),
    /// The webhook was not setup properly on the Rocket instance
    #[error("MoneyKit webhook is not attached to Rocket")]
    NotAttached,
}
