//! Verification of MoneyKit webhook deliveries

use std::{sync::Arc, time::Duration};

use bon::bon;
use thiserror::Error;

use crate::{
    clock::Clock,
    error::{ClaimsError, FetchError, SignatureError, TokenError},
    keys::{
        cache::KeySetCache,
        fetcher::{HttpKeySetFetcher, KeySetFetcher},
    },
};

pub mod algorithms;
pub mod body_hash;
pub mod token;

use algorithms::verify_signature;
use body_hash::body_hash_matches;
use token::{PayloadClaims, SignedToken};

/// Name of the header carrying the signed token
pub const SIGNATURE_HEADER: &str = "MoneyKit-Signature";

/// Default tolerance applied to the token's time claims
pub const DEFAULT_CLAIMS_LEEWAY: Duration = Duration::from_secs(5 * 60);

/// Why a webhook was not accepted. Every reason means the payload must not be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("signature header is missing")]
    MissingHeader,
    #[error("signature token is malformed")]
    MalformedToken,
    #[error("signing key is unknown")]
    UnknownSigningKey,
    #[error("signature algorithm is not supported")]
    UnsupportedAlgorithm,
    #[error("signature is invalid")]
    InvalidSignature,
    #[error("signature token has expired")]
    ExpiredToken,
    #[error("signature token is not valid yet")]
    TokenNotYetValid,
    #[error("body does not match the signed hash")]
    HashMismatch,
}

impl From<&TokenError> for RejectReason {
    fn from(err: &TokenError) -> Self {
        match err {
            TokenError::Malformed(_) => RejectReason::MalformedToken,
            TokenError::UnsupportedAlgorithm(_) => RejectReason::UnsupportedAlgorithm,
        }
    }
}

impl From<&SignatureError> for RejectReason {
    fn from(err: &SignatureError) -> Self {
        match err {
            SignatureError::AlgorithmMismatch => RejectReason::UnsupportedAlgorithm,
            SignatureError::Encoding | SignatureError::Verification => {
                RejectReason::InvalidSignature
            }
        }
    }
}

impl From<&ClaimsError> for RejectReason {
    fn from(err: &ClaimsError) -> Self {
        match err {
            ClaimsError::Expired(_) => RejectReason::ExpiredToken,
            ClaimsError::NotYetValid(_) => RejectReason::TokenNotYetValid,
        }
    }
}

/// Outcome of verifying one webhook delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationVerdict {
    Authentic,
    Rejected(RejectReason),
}

impl VerificationVerdict {
    pub fn is_authentic(&self) -> bool {
        matches!(self, VerificationVerdict::Authentic)
    }

    pub fn into_result(self) -> Result<(), RejectReason> {
        match self {
            VerificationVerdict::Authentic => Ok(()),
            VerificationVerdict::Rejected(reason) => Err(reason),
        }
    }
}

impl From<Result<(), RejectReason>> for VerificationVerdict {
    fn from(result: Result<(), RejectReason>) -> Self {
        match result {
            Ok(()) => VerificationVerdict::Authentic,
            Err(reason) => VerificationVerdict::Rejected(reason),
        }
    }
}

/**
Verifies MoneyKit webhook deliveries.

The `MoneyKit-Signature` header holds an ES256 token, signed with one of MoneyKit's
published keys, whose `request_body_sha256` claim is the SHA-256 of the body.
A delivery is authentic when the token verifies against the key named by its `kid`
and the claimed hash matches the raw body.

# Example
```
use moneykit_webhook::{
    keys::{cache::KeySetCache, fetcher::HttpKeySetFetcher},
    verification::MoneyKitVerifier,
};

# async fn handle(signature: Option<&str>, body: &[u8]) {
let verifier = MoneyKitVerifier::builder()
    .keys(KeySetCache::builder().fetcher(HttpKeySetFetcher::builder().build().unwrap()).build())
    .build();

if verifier.verify(signature, body).await.is_authentic() {
    // process the webhook
}
# }
```
*/
pub struct MoneyKitVerifier<F = HttpKeySetFetcher> {
    keys: KeySetCache<F>,
    claims_leeway: Duration,
}

#[bon]
impl<F> MoneyKitVerifier<F>
where
    F: KeySetFetcher,
{
    #[builder]
    pub fn new(
        /// Cache of MoneyKit's signing keys
        keys: KeySetCache<F>,
        /// Tolerance for the token's `exp`, `iat` and `nbf` claims (default: 5 minutes)
        #[builder(default = DEFAULT_CLAIMS_LEEWAY)]
        claims_leeway: Duration,
    ) -> Self {
        Self {
            keys,
            claims_leeway,
        }
    }

    pub fn keys(&self) -> &KeySetCache<F> {
        &self.keys
    }

    /// Verify a webhook delivery from the value of its `MoneyKit-Signature` header
    /// and its unmodified body.
    #[tracing::instrument(skip_all, level = "debug")]
    pub async fn verify(
        &self,
        signature_header: Option<&str>,
        raw_body: &[u8],
    ) -> VerificationVerdict {
        let verdict =
            VerificationVerdict::from(self.authenticate(signature_header, raw_body).await);
        if let VerificationVerdict::Rejected(reason) = verdict {
            tracing::warn!(%reason, "MoneyKit webhook rejected");
        }
        verdict
    }

    async fn authenticate(
        &self,
        signature_header: Option<&str>,
        raw_body: &[u8],
    ) -> Result<(), RejectReason> {
        let header = signature_header
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(RejectReason::MissingHeader)?;

        let token = SignedToken::decode(header).map_err(|err| {
            tracing::debug!(error = %err, "could not decode signature token");
            RejectReason::from(&err)
        })?;

        let key = self.keys.resolve_key(token.key_id()).await.ok_or_else(|| {
            tracing::debug!(kid = token.key_id(), "no signing key with this id");
            RejectReason::UnknownSigningKey
        })?;

        let claims = verify_signature(&token, &key).map_err(|err| {
            tracing::debug!(kid = key.key_id(), error = %err, "signature verification failed");
            RejectReason::from(&err)
        })?;

        validate_time_claims(claims, self.keys.clock(), self.claims_leeway).map_err(|err| {
            tracing::debug!(error = %err, "token time claims rejected");
            RejectReason::from(&err)
        })?;

        if !body_hash_matches(raw_body, &claims.expected_body_hash_hex) {
            return Err(RejectReason::HashMismatch);
        }

        tracing::debug!(kid = key.key_id(), "MoneyKit webhook verified");
        Ok(())
    }
}

impl MoneyKitVerifier<HttpKeySetFetcher> {
    /// Verifier fetching keys from `jwks_url` with the default cache settings
    pub fn with_jwks_url(jwks_url: impl Into<String>) -> Result<Self, FetchError> {
        let fetcher = HttpKeySetFetcher::builder().url(jwks_url).build()?;
        Ok(Self::builder()
            .keys(KeySetCache::builder().fetcher(fetcher).build())
            .build())
    }
}

fn validate_time_claims(
    claims: &PayloadClaims,
    clock: &Arc<dyn Clock>,
    leeway: Duration,
) -> Result<(), ClaimsError> {
    let now = i64::try_from(clock.unix_now()).unwrap_or(i64::MAX);
    let leeway = i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX);

    // a token expiring exactly at the edge of the leeway is already expired
    if let Some(expires_at) = claims.expires_at {
        if expires_at <= now.saturating_sub(leeway) {
            return Err(ClaimsError::Expired(expires_at));
        }
    }
    for valid_from in [claims.issued_at, claims.not_before].into_iter().flatten() {
        if valid_from > now.saturating_add(leeway) {
            return Err(ClaimsError::NotYetValid(valid_from));
        }
    }
    Ok(())
}
