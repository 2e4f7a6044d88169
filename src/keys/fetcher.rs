//! Retrieval of the provider's key set document

use std::time::Duration;

use bon::bon;
use reqwest::header::ACCEPT;

use crate::{
    error::FetchError,
    keys::{JwkSetDocument, KeySet},
};

/// Default location of MoneyKit's published signing keys
pub const DEFAULT_JWKS_URL: &str = "https://api.moneykit.com/.well-known/jwks.json";

/// Default timeout for a key set request
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of the provider's current signing keys. Each call performs one
/// retrieval; caching is the job of [KeySetCache](crate::keys::cache::KeySetCache).
pub trait KeySetFetcher: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<KeySet, FetchError>> + Send;
}

/// Fetches the key set document over HTTPS
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
    url: String,
}

#[bon]
impl HttpKeySetFetcher {
    /// Build a fetcher for the given key set URL
    #[builder]
    pub fn new(
        /// URL of the key set document (default: MoneyKit production)
        #[builder(into, default = DEFAULT_JWKS_URL.to_owned())]
        url: String,
        /// Timeout for the whole request. A timeout counts as a fetch failure. (default: 5 seconds)
        #[builder(default = DEFAULT_FETCH_TIMEOUT)]
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("moneykit-webhook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self) -> Result<KeySet, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let document: JwkSetDocument = serde_json::from_slice(&body)?;
        let key_set = KeySet::from_document(document);
        tracing::debug!(url = %self.url, keys = key_set.len(), "fetched key set");
        Ok(key_set)
    }
}
