//! HTTP client for a Razorpay-style Orders API.
//!
//! `POST {base_url}/v1/orders` with HTTP basic auth (key id, key secret) and a
//! JSON body `{ "amount": <minor units>, "currency": "INR" }`. The gateway
//! answers `{ "id": "...", "amount": <minor units>, "currency": "INR", ... }`.
//!
//! Transport failures, timeouts, 429 and 5xx map to `GatewayUnavailable`; any
//! other non-success status or an undecodable body maps to `GatewayRejected`.

use crate::domain::money::{Amount, Currency};
use crate::domain::payment::OrderId;
use crate::domain::ports::{GatewayOrder, PaymentGateway};
use crate::error::{FeeError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: SecretString,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: SecretString,
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FeeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id,
            key_secret: config.key_secret,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_order(&self, amount: Amount, currency: Currency) -> Result<GatewayOrder> {
        let url = format!("{}/v1/orders", self.base_url);
        let body = CreateOrderRequest {
            amount: amount.to_minor_units()?,
            currency: currency.code(),
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FeeError::GatewayUnavailable(format!("create_order timed out: {}", e))
                } else {
                    FeeError::GatewayUnavailable(format!("create_order: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %text, "Gateway unavailable");
            return Err(FeeError::GatewayUnavailable(format!("HTTP {}: {}", status, text)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %text, "Gateway rejected order");
            return Err(FeeError::GatewayRejected(format!("HTTP {}: {}", status, text)));
        }

        let order: OrderResponse = response.json().await.map_err(|e| {
            FeeError::GatewayRejected(format!("Failed to parse gateway response: {}", e))
        })?;

        let rejected = |e: FeeError| FeeError::GatewayRejected(e.to_string());
        Ok(GatewayOrder {
            order_id: OrderId::new(order.id).map_err(rejected)?,
            amount: Amount::from_minor_units(order.amount).map_err(rejected)?,
            currency: order.currency.parse().map_err(rejected)?,
        })
    }
}
