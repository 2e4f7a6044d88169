use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use crate::{
    error::FetchError,
    keys::{
        cache::{DEFAULT_MAX_KEY_AGE, DEFAULT_MIN_INVALIDATION_INTERVAL, KeySetCache},
        fetcher::{DEFAULT_FETCH_TIMEOUT, DEFAULT_JWKS_URL, HttpKeySetFetcher},
    },
    verification::{DEFAULT_CLAIMS_LEEWAY, MoneyKitVerifier},
};

/// Default maximum webhook body size (64 KB)
pub const DEFAULT_MAX_BODY_SIZE: u64 = 64 * 1024;

/**
Settings for verifying MoneyKit webhooks. Read from the `moneykit_webhook` table of
Rocket's configuration by [MoneyKitWebhook::fairing](crate::MoneyKitWebhook::fairing);
every field is optional.

# Example

```toml
[default.moneykit_webhook]
jwks_url = "https://api.moneykit.com/.well-known/jwks.json"
fetch_timeout_secs = 5
min_invalidation_interval_secs = 300
```
*/
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Builder)]
#[serde(default)]
pub struct VerifierConfig {
    /// URL of MoneyKit's key set document
    #[builder(into, default = DEFAULT_JWKS_URL.to_owned())]
    pub jwks_url: String,
    /// Timeout for fetching the key set (default: 5 seconds)
    #[builder(default = DEFAULT_FETCH_TIMEOUT.as_secs())]
    pub fetch_timeout_secs: u64,
    /// Minimum seconds between refreshes triggered by an unknown key id (default: 5 minutes)
    #[builder(default = DEFAULT_MIN_INVALIDATION_INTERVAL.as_secs())]
    pub min_invalidation_interval_secs: u64,
    /// Seconds a fetched key set is trusted before refreshing (default: 12 hours)
    #[builder(default = DEFAULT_MAX_KEY_AGE.as_secs())]
    pub max_key_age_secs: u64,
    /// Tolerance in seconds for the token's time claims (default: 5 minutes)
    #[builder(default = DEFAULT_CLAIMS_LEEWAY.as_secs())]
    pub claims_leeway_secs: u64,
    /// Maximum webhook body size in bytes (default: 64 KB)
    #[builder(default = DEFAULT_MAX_BODY_SIZE)]
    pub max_body_size: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl VerifierConfig {
    /// Build a verifier that fetches keys over HTTPS using these settings
    pub fn verifier(&self) -> Result<MoneyKitVerifier<HttpKeySetFetcher>, FetchError> {
        let fetcher = HttpKeySetFetcher::builder()
            .url(self.jwks_url.clone())
            .timeout(Duration::from_secs(self.fetch_timeout_secs))
            .build()?;
        let keys = KeySetCache::builder()
            .fetcher(fetcher)
            .min_invalidation_interval(Duration::from_secs(self.min_invalidation_interval_secs))
            .max_age(Duration::from_secs(self.max_key_age_secs))
            .build();

        Ok(MoneyKitVerifier::builder()
            .keys(keys)
            .claims_leeway(Duration::from_secs(self.claims_leeway_secs))
            .build())
    }
}
