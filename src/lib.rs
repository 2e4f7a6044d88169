use std::marker::PhantomData;

use bon::bon;
use rocket::{Build, Orbit, Rocket, async_trait, fairing};

pub mod clock;
mod config;
mod error;
mod guard;
pub mod keys;
pub mod verification;

pub use config::{DEFAULT_MAX_BODY_SIZE, VerifierConfig};
pub use error::{ClaimsError, FetchError, KeyError, SignatureError, TokenError, WebhookError};
pub use guard::{MoneyKitPayload, MoneyKitPayloadRaw};
pub use verification::{MoneyKitVerifier, RejectReason, VerificationVerdict};

use crate::keys::fetcher::{HttpKeySetFetcher, KeySetFetcher};

/// Table of Rocket's configuration read by [MoneyKitWebhook::fairing]
pub const CONFIG_KEY: &str = "moneykit_webhook";

/**
A MoneyKit webhook managed by Rocket. Once registered, the [MoneyKitPayload] and
[MoneyKitPayloadRaw] data guards verify incoming deliveries before your route runs.

# Example

```
use rocket::{Build, Rocket};
use moneykit_webhook::{MoneyKitVerifier, MoneyKitWebhook};

fn setup_webhook(rocket: Rocket<Build>) -> Rocket<Build> {
    let verifier = MoneyKitVerifier::with_jwks_url("https://api.moneykit.com/.well-known/jwks.json")
        .expect("HTTP client should build");

    MoneyKitWebhook::builder()
        .verifier(verifier)
        .max_body_size(32 * 1024)
        .build()
        .register(rocket)
}
```
*/
pub struct MoneyKitWebhook<F = HttpKeySetFetcher> {
    verifier: MoneyKitVerifier<F>,
    max_body_size: u64,
}

#[bon]
impl<F> MoneyKitWebhook<F>
where
    F: KeySetFetcher + 'static,
{
    /// Build a webhook configuration
    #[builder]
    pub fn new(
        /// The verifier used for every delivery
        verifier: MoneyKitVerifier<F>,
        /// The maximum allowed body size of the webhook request in bytes (default: 64 KB)
        #[builder(default = DEFAULT_MAX_BODY_SIZE)]
        max_body_size: u64,
    ) -> Self {
        Self {
            verifier,
            max_body_size,
        }
    }

    pub fn verifier(&self) -> &MoneyKitVerifier<F> {
        &self.verifier
    }

    /// Register this webhook with the Rocket server. Signing keys are fetched once
    /// the server has launched.
    pub fn register(self, rocket: Rocket<Build>) -> Rocket<Build> {
        rocket
            .attach(WarmKeysFairing::<F>(PhantomData))
            .manage(self)
    }
}

impl MoneyKitWebhook<HttpKeySetFetcher> {
    /// Build a webhook fetching keys over HTTPS with the given settings
    pub fn from_config(config: &VerifierConfig) -> Result<Self, FetchError> {
        Ok(Self::builder()
            .verifier(config.verifier()?)
            .max_body_size(config.max_body_size)
            .build())
    }

    /**
    Fairing that builds and registers the webhook from the `moneykit_webhook` table of
    Rocket's configuration (see [VerifierConfig]). Defaults are used when the table
    is absent; invalid settings abort ignition.

    ```
    use moneykit_webhook::MoneyKitWebhook;

    let rocket = rocket::build().attach(MoneyKitWebhook::fairing());
    ```
    */
    pub fn fairing() -> impl fairing::Fairing {
        ConfiguredWebhookFairing
    }
}

struct WarmKeysFairing<F>(PhantomData<fn() -> F>);

#[async_trait]
impl<F> fairing::Fairing for WarmKeysFairing<F>
where
    F: KeySetFetcher + 'static,
{
    fn info(&self) -> fairing::Info {
        fairing::Info {
            name: "MoneyKit webhook keys",
            kind: fairing::Kind::Liftoff | fairing::Kind::Singleton,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        if let Some(webhook) = rocket.state::<MoneyKitWebhook<F>>() {
            webhook.verifier.keys().warm().await;
        }
    }
}

struct ConfiguredWebhookFairing;

#[async_trait]
impl fairing::Fairing for ConfiguredWebhookFairing {
    fn info(&self) -> fairing::Info {
        fairing::Info {
            name: "MoneyKit webhook",
            kind: fairing::Kind::Ignite | fairing::Kind::Singleton,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        let config = match rocket.figment().extract_inner::<VerifierConfig>(CONFIG_KEY) {
            Ok(config) => config,
            Err(err) if err.missing() => VerifierConfig::default(),
            Err(err) => {
                tracing::error!(error = %err, "invalid '{CONFIG_KEY}' configuration");
                return Err(rocket);
            }
        };

        match MoneyKitWebhook::from_config(&config) {
            Ok(webhook) => {
                tracing::info!(jwks_url = %config.jwks_url, "MoneyKit webhook configured");
                Ok(webhook.register(rocket))
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to set up MoneyKit webhook");
                Err(rocket)
            }
        }
    }
}
