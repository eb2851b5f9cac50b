use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;

use super::{with_retry, CheckoutSession, PaymentError};

/// Stripe Checkout Sessions client (official REST surface, SDK path only).
pub struct StripeClient {
    api_base: String,
    secret_key: String,
    host: String,
    landing_host: String,
    http: reqwest::Client,
}

impl StripeClient {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            &cfg.stripe_api_base,
            &cfg.stripe_secret_key,
            &cfg.host,
            &cfg.landing_host,
            Duration::from_secs(cfg.provider_timeout_secs),
        )
    }

    pub fn new(
        api_base: &str,
        secret_key: &str,
        host: &str,
        landing_host: &str,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            host: host.to_string(),
            landing_host: landing_host.to_string(),
            http,
        }
    }

    /// Creates a payment-mode Checkout Session with a single line item.
    /// The handle is the `cs_…` session id; the redirect is the hosted URL.
    #[instrument(skip(self, title, description), fields(order_id = %order_id))]
    pub async fn mint_session(
        &self,
        order_id: &str,
        title: &str,
        unit_price: Decimal,
        description: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        let unit_amount_cents = (unit_price * Decimal::from(100))
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or_else(|| PaymentError::Malformed("unit price out of range".into()))?;

        let success_url = format!("{}/api/store/sale-done/{}/", self.host, order_id);
        let cancel_url = format!(
            "{}/?sale-status=error&sale-id={}",
            self.landing_host, order_id
        );

        let params = [
            ("mode", "payment".to_string()),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("client_reference_id", order_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                "usd".to_string(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                unit_amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                title.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][description]",
                description.to_string(),
            ),
        ];

        let session: Value = with_retry("stripe.create_session", || {
            let params = params.clone();
            async move {
                let response = self
                    .http
                    .post(format!("{}/v1/checkout/sessions", self.api_base))
                    .basic_auth(&self.secret_key, None::<&str>)
                    .form(&params)
                    .send()
                    .await?;

                check_status(response).await
            }
        })
        .await?;

        let handle = session["id"]
            .as_str()
            .ok_or_else(|| PaymentError::Malformed("session response missing id".into()))?
            .to_string();
        let redirect_url = session["url"]
            .as_str()
            .ok_or_else(|| PaymentError::Malformed("session response missing url".into()))?
            .to_string();

        info!(order_id = %order_id, session = %handle, "stripe session created");
        Ok(CheckoutSession {
            handle,
            redirect_url,
        })
    }

    /// Retrieves the session and reads it as paid iff `payment_status` is
    /// `"paid"`. Fail-closed on any error.
    #[instrument(skip(self))]
    pub async fn is_paid(&self, session_id: &str) -> bool {
        let result = async {
            let response = self
                .http
                .get(format!(
                    "{}/v1/checkout/sessions/{}",
                    self.api_base, session_id
                ))
                .basic_auth(&self.secret_key, None::<&str>)
                .send()
                .await?;

            check_status(response).await
        }
        .await;

        match result {
            Ok(session) => session["payment_status"].as_str() == Some("paid"),
            Err(e) => {
                warn!(error = %e, "stripe session check failed");
                false
            }
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<Value, PaymentError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(PaymentError::Unauthorized);
    }
    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(PaymentError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    if !status.is_success() {
        return match response.error_for_status() {
            Err(e) => Err(PaymentError::Transport(e)),
            Ok(_) => Err(PaymentError::Malformed(format!(
                "unexpected status {}",
                status
            ))),
        };
    }
    Ok(response.json().await?)
}
