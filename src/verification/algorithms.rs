//! Token signature algorithms

use p256::ecdsa::{Signature, VerifyingKey, signature::Verifier};

use crate::{
    error::SignatureError,
    keys::{Algorithm, SigningKey},
    verification::token::{PayloadClaims, SignedToken},
};

/// Trait for algorithms used to verify token signatures
pub trait SignatureAlgorithm {
    const ALGORITHM: Algorithm;

    fn verify(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> Result<(), SignatureError>;
}

/// ECDSA P-256 with SHA-256, signature encoded as fixed-size `r || s`
pub struct Es256;

impl SignatureAlgorithm for Es256 {
    const ALGORITHM: Algorithm = Algorithm::Es256;

    fn verify(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        let signature = Signature::from_slice(signature).map_err(|_| SignatureError::Encoding)?;
        key.verify(message, &signature).map_err(|_| SignatureError::Verification)
    }
}

/// Verify the token's signature with the resolved key and return its claims.
///
/// The algorithm is fixed to ES256 regardless of what the token header claims.
pub fn verify_signature<'t>(
    token: &'t SignedToken,
    key: &SigningKey,
) -> Result<&'t PayloadClaims, SignatureError> {
    if token.header().algorithm != Es256::ALGORITHM || key.algorithm() != Es256::ALGORITHM {
        return Err(SignatureError::AlgorithmMismatch);
    }
    Es256::verify(key.verifying_key(), token.signing_input(), token.signature())?;
    Ok(token.unverified_claims())
}
