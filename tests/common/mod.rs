//! Shared helpers for signing test webhooks

#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use moneykit_webhook::{
    FetchError,
    clock::{Clock, ManualClock, SystemClock},
    keys::{JwkSetDocument, KeySet, cache::KeySetCache, fetcher::KeySetFetcher},
    verification::MoneyKitVerifier,
};
use p256::ecdsa::{Signature, SigningKey, signature::Signer};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// Fixed "current time" used by tests with a manual clock
pub const NOW: u64 = 1_700_000_000;

/// A P-256 key pair standing in for one of MoneyKit's signing keys
pub struct TestKey {
    pub kid: String,
    secret: SigningKey,
}

impl TestKey {
    pub fn new(kid: &str, seed: u8) -> Self {
        Self {
            kid: kid.into(),
            secret: SigningKey::from_slice(&[seed; 32]).unwrap(),
        }
    }

    /// Public JWK as MoneyKit publishes it
    pub fn jwk(&self) -> Value {
        let point = self.secret.verifying_key().to_encoded_point(false);
        json!({
            "kid": self.kid,
            "kty": "EC",
            "crv": "P-256",
            "alg": "ES256",
            "use": "sig",
            "x": BASE64_URL_SAFE_NO_PAD.encode(point.x().unwrap()),
            "y": BASE64_URL_SAFE_NO_PAD.encode(point.y().unwrap()),
        })
    }

    /// Sign arbitrary header and payload claims with this key
    pub fn sign(&self, header: &Value, payload: &Value) -> String {
        let signing_input = format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(header.to_string()),
            BASE64_URL_SAFE_NO_PAD.encode(payload.to_string())
        );
        let signature: Signature = self.secret.sign(signing_input.as_bytes());
        format!(
            "{signing_input}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }

    pub fn header(&self) -> Value {
        json!({"alg": "ES256", "kid": self.kid, "typ": "JWT"})
    }

    /// Token for `body` issued at `issued_at`
    pub fn token_at(&self, body: &[u8], issued_at: u64) -> String {
        self.sign(
            &self.header(),
            &json!({"request_body_sha256": body_hash(body), "iat": issued_at}),
        )
    }

    /// Token for `body` issued at [NOW]
    pub fn token_for(&self, body: &[u8]) -> String {
        self.token_at(body, NOW)
    }
}

/// Wall clock time, for tests going through the system clock
pub fn unix_now() -> u64 {
    SystemClock.unix_now()
}

pub fn body_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

pub fn jwks(keys: &[&TestKey]) -> String {
    json!({ "keys": keys.iter().map(|key| key.jwk()).collect::<Vec<_>>() }).to_string()
}

/// In-memory key set source that counts how often it's asked for keys
#[derive(Clone, Default)]
pub struct StaticFetcher {
    document: Arc<Mutex<String>>,
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl StaticFetcher {
    pub fn new(keys: &[&TestKey]) -> Self {
        let fetcher = Self::default();
        fetcher.publish(keys);
        fetcher
    }

    /// Simulate slow responses so concurrent requests overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the published key set (key rotation)
    pub fn publish(&self, keys: &[&TestKey]) {
        *self.document.lock().unwrap() = jwks(keys);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KeySetFetcher for StaticFetcher {
    async fn fetch(&self) -> Result<KeySet, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            rocket::tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Status(503));
        }
        let document = self.document.lock().unwrap().clone();
        let document: JwkSetDocument = serde_json::from_str(&document)?;
        Ok(KeySet::from_document(document))
    }
}

pub fn cache(fetcher: &StaticFetcher, clock: &ManualClock) -> KeySetCache<StaticFetcher> {
    KeySetCache::builder()
        .fetcher(fetcher.clone())
        .clock(Arc::new(clock.clone()))
        .build()
}

pub fn verifier(fetcher: &StaticFetcher, clock: &ManualClock) -> MoneyKitVerifier<StaticFetcher> {
    MoneyKitVerifier::builder()
        .keys(cache(fetcher, clock))
        .build()
}
