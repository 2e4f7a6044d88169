//! Signing keys published by the provider

use std::{collections::BTreeMap, fmt, str::FromStr};

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use p256::ecdsa::VerifyingKey;
use serde::Deserialize;

use crate::error::KeyError;

pub mod cache;
pub mod fetcher;

/// Signature algorithms accepted for webhook tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// ECDSA using P-256 and SHA-256
    Es256,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Es256 => "ES256",
        }
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "ES256" => Ok(Algorithm::Es256),
            other => Err(other.to_owned()),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Intended use of a key, from the JWK `use` member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUse {
    Signing,
    Other,
}

impl KeyUse {
    fn from_member(member: Option<&str>) -> Self {
        match member {
            Some("sig") => KeyUse::Signing,
            _ => KeyUse::Other,
        }
    }
}

/// A single JWK record as published in the key set document. Every member is
/// optional here so one bad record doesn't reject the whole document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kid: Option<String>,
    pub kty: Option<String>,
    pub crv: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

/// The provider's key set document (`{"keys": [...]}`)
#[derive(Debug, Clone, Deserialize)]
pub struct JwkSetDocument {
    pub keys: Vec<Jwk>,
}

/// A public key trusted to verify webhook tokens
#[derive(Debug, Clone)]
pub struct SigningKey {
    key_id: String,
    algorithm: Algorithm,
    usage: KeyUse,
    verifying_key: VerifyingKey,
}

impl SigningKey {
    /// Build a key from a JWK record. Only P-256 EC keys are supported.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyError> {
        let key_id = jwk
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(KeyError::MissingField("kid"))?;

        if jwk.kty.as_deref() != Some("EC") || jwk.crv.as_deref() != Some("P-256") {
            return Err(KeyError::UnsupportedCurve {
                kty: jwk.kty.clone(),
                crv: jwk.crv.clone(),
            });
        }
        let algorithm = match jwk.alg.as_deref() {
            None => Algorithm::Es256,
            Some(name) => name.parse().map_err(KeyError::UnsupportedAlgorithm)?,
        };

        let x = decode_coordinate(jwk.x.as_deref(), "x")?;
        let y = decode_coordinate(jwk.y.as_deref(), "y")?;
        let sec1_point = [&[0x04][..], x.as_slice(), y.as_slice()].concat();
        let verifying_key = VerifyingKey::from_sec1_bytes(&sec1_point)
            .map_err(|e| KeyError::InvalidPoint(e.to_string()))?;

        Ok(Self {
            key_id: key_id.to_owned(),
            algorithm,
            usage: KeyUse::from_member(jwk.key_use.as_deref()),
            verifying_key,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn usage(&self) -> KeyUse {
        self.usage
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

fn decode_coordinate(value: Option<&str>, name: &'static str) -> Result<Vec<u8>, KeyError> {
    let encoded = value.ok_or(KeyError::MissingField(name))?;
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| KeyError::InvalidCoordinate(format!("'{name}' is not base64url: {e}")))?;
    if bytes.len() != 32 {
        return Err(KeyError::InvalidCoordinate(format!(
            "'{name}' must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Signing keys indexed by key id
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: BTreeMap<String, SigningKey>,
}

impl KeySet {
    /// Keep the usable signing keys from a key set document. Records that can't be
    /// converted are skipped, and a repeated key id replaces the earlier record.
    pub fn from_document(document: JwkSetDocument) -> Self {
        let mut key_set = Self::default();
        for jwk in &document.keys {
            match SigningKey::from_jwk(jwk) {
                Ok(key) => {
                    if !key_set.insert(key) {
                        tracing::debug!(kid = ?jwk.kid, "skipping key not meant for signing");
                    }
                }
                Err(err) => tracing::warn!(kid = ?jwk.kid, error = %err, "skipping unusable JWK"),
            }
        }
        key_set
    }

    /// Insert a key, returning `false` (and ignoring it) when it isn't a signing key
    pub fn insert(&mut self, key: SigningKey) -> bool {
        if key.usage != KeyUse::Signing {
            return false;
        }
        self.keys.insert(key.key_id.clone(), key);
        true
    }

    pub fn get(&self, key_id: &str) -> Option<&SigningKey> {
        self.keys.get(key_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}
