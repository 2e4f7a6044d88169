use std::marker::PhantomData;

use rocket::{
    Data, Request, async_trait,
    data::{FromData, Outcome, ToByteUnit},
    http::{HeaderMap, Status},
    outcome::try_outcome,
    serde::DeserializeOwned,
};

use crate::{
    MoneyKitWebhook, WebhookError,
    keys::fetcher::{HttpKeySetFetcher, KeySetFetcher},
    verification::{SIGNATURE_HEADER, VerificationVerdict},
};

const DELIVERY_TOKEN_HEADER: &str = "MoneyKit-Delivery-Token";
const DELIVERY_ATTEMPT_HEADER: &str = "MoneyKit-Delivery-Attempt";

/**
 Data guard to verify a MoneyKit webhook and deserialize its JSON body into the `T` type.
 A [MoneyKitWebhook] must be registered with Rocket. Rejected webhooks fail with
 `400 Bad Request`, so MoneyKit will retry the delivery.
```
use rocket::post;
use serde::Deserialize;
use moneykit_webhook::MoneyKitPayload;

/// Payload to deserialize
#[derive(Debug, Deserialize)]
struct LinkEvent {
    webhook_event: String,
    link_id: String,
}

#[post("/webhooks/moneykit", data = "<payload>")]
async fn moneykit_route(payload: MoneyKitPayload<'_, LinkEvent>) -> &'static str {
    payload.data; // access the verified webhook payload
    payload.headers; // access the webhook headers

    "OK"
}
```
*/
pub struct MoneyKitPayload<'r, T, F = HttpKeySetFetcher> {
    /// The deserialized payload data
    pub data: T,
    /// The headers sent with the webhook request
    pub headers: &'r HeaderMap<'r>,
    _fetcher: PhantomData<fn() -> F>,
}

#[async_trait]
impl<'r, T, F> FromData<'r> for MoneyKitPayload<'r, T, F>
where
    T: DeserializeOwned,
    F: KeySetFetcher + 'static,
{
    type Error = WebhookError;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> Outcome<'r, Self, Self::Error> {
        let webhook: &MoneyKitWebhook<F> = try_outcome!(get_webhook_from_state(req));
        let verified_body = try_outcome!(read_and_verify(webhook, req, data).await);

        match serde_json::from_slice(&verified_body) {
            Ok(data) => Outcome::Success(Self {
                data,
                headers: req.headers(),
                _fetcher: PhantomData,
            }),
            Err(e) => Outcome::Error((Status::BadRequest, WebhookError::Deserialize(e))),
        }
    }
}

/**
Data guard to verify a MoneyKit webhook and get the raw body.
A [MoneyKitWebhook] must be registered with Rocket.
```
use rocket::post;
use moneykit_webhook::MoneyKitPayloadRaw;

#[post("/webhooks/moneykit", data = "<payload>")]
async fn moneykit_route(payload: MoneyKitPayloadRaw<'_>) -> &'static str {
    payload.data; // access the raw webhook payload (Vec<u8>)
    payload.headers; // access the webhook headers

    "OK"
}
```
*/
pub struct MoneyKitPayloadRaw<'r, F = HttpKeySetFetcher> {
    /// The raw payload data
    pub data: Vec<u8>,
    /// The headers sent with the webhook request
    pub headers: &'r HeaderMap<'r>,
    _fetcher: PhantomData<fn() -> F>,
}

#[async_trait]
impl<'r, F> FromData<'r> for MoneyKitPayloadRaw<'r, F>
where
    F: KeySetFetcher + 'static,
{
    type Error = WebhookError;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> Outcome<'r, Self, Self::Error> {
        let webhook: &MoneyKitWebhook<F> = try_outcome!(get_webhook_from_state(req));
        let verified_body = try_outcome!(read_and_verify(webhook, req, data).await);

        Outcome::Success(Self {
            data: verified_body,
            headers: req.headers(),
            _fetcher: PhantomData,
        })
    }
}

fn get_webhook_from_state<'r, F>(
    req: &'r Request<'_>,
) -> Outcome<'r, &'r MoneyKitWebhook<F>, WebhookError>
where
    F: KeySetFetcher + 'static,
{
    match req.rocket().state::<MoneyKitWebhook<F>>() {
        Some(webhook) => Outcome::Success(webhook),
        None => Outcome::Error((Status::InternalServerError, WebhookError::NotAttached)),
    }
}

async fn read_and_verify<'r, F>(
    webhook: &MoneyKitWebhook<F>,
    req: &'r Request<'_>,
    data: Data<'r>,
) -> Outcome<'r, Vec<u8>, WebhookError>
where
    F: KeySetFetcher,
{
    let headers = req.headers();
    tracing::info!(
        delivery_token = headers.get_one(DELIVERY_TOKEN_HEADER),
        delivery_attempt = headers.get_one(DELIVERY_ATTEMPT_HEADER),
        "received MoneyKit webhook"
    );

    let raw_body = match data.open(webhook.max_body_size.bytes()).into_bytes().await {
        Ok(body) if body.is_complete() => body.into_inner(),
        Ok(_) => {
            return Outcome::Error((
                Status::PayloadTooLarge,
                WebhookError::PayloadTooLarge(webhook.max_body_size),
            ));
        }
        Err(e) => return Outcome::Error((Status::BadRequest, WebhookError::Read(e))),
    };

    match webhook.verifier.verify(headers.get_one(SIGNATURE_HEADER), &raw_body).await {
        VerificationVerdict::Authentic => Outcome::Success(raw_body),
        VerificationVerdict::Rejected(reason) => {
            Outcome::Error((Status::BadRequest, WebhookError::Rejected(reason)))
        }
    }
}
