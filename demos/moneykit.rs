//! MoneyKit webhook example - logs verified link events.
//!
//! Signing keys are fetched from the URL in `Rocket.toml` (or MoneyKit production
//! by default):
//!
//! ```toml
//! [default.moneykit_webhook]
//! jwks_url = "https://api.moneykit.com/.well-known/jwks.json"
//! ```
//!
//! ```RUST_LOG=moneykit_webhook=debug cargo run --example moneykit```

use moneykit_webhook::{MoneyKitPayload, MoneyKitWebhook};
use rocket::{http::Status, launch, post, routes};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[launch]
fn rocket() -> _ {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    rocket::build()
        .attach(MoneyKitWebhook::fairing())
        .mount("/api", routes![moneykit_endpoint])
}

#[post("/webhook/moneykit", data = "<payload>")]
async fn moneykit_endpoint(payload: MoneyKitPayload<'_, LinkEvent>) -> Status {
    let LinkEvent {
        webhook_event,
        webhook_major_version,
        link,
    } = payload.data;
    let attempt = payload.headers.get_one("MoneyKit-Delivery-Attempt");

    match link {
        Some(link) => tracing::info!(
            event = %webhook_event,
            version = webhook_major_version,
            link_id = %link.link_id,
            institution = link.institution_name.as_deref(),
            attempt,
            "verified MoneyKit webhook"
        ),
        None => tracing::info!(event = %webhook_event, attempt, "verified MoneyKit webhook"),
    }

    Status::Ok
}

#[derive(Debug, Deserialize)]
struct LinkEvent {
    webhook_event: String,
    webhook_major_version: Option<u32>,
    link: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    link_id: String,
    institution_name: Option<String>,
}
