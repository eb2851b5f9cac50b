use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;

use super::{usd, with_retry, CheckoutSession, PaymentError};

/// PayPal Orders v2 client. Holds a cached OAuth2 client-credentials token,
/// refreshed when the API answers 401.
pub struct PaypalClient {
    api_base: String,
    client_id: String,
    client_secret: String,
    host: String,
    landing_host: String,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl PaypalClient {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            &cfg.paypal_api_base,
            &cfg.paypal_client_id,
            &cfg.paypal_client_secret,
            &cfg.host,
            &cfg.landing_host,
            Duration::from_secs(cfg.provider_timeout_secs),
        )
    }

    pub fn new(
        api_base: &str,
        client_id: &str,
        client_secret: &str,
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
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            host: host.to_string(),
            landing_host: landing_host.to_string(),
            http,
            token: RwLock::new(None),
        }
    }

    /// Returns the cached OAuth2 access token, fetching a fresh one if absent.
    async fn access_token(&self) -> Result<String, PaymentError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Accept", "application/json")
            .header("Accept-Language", "en_US")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PaymentError::Unauthorized);
        }

        let body: Value = response.json().await?;
        let token = body["access_token"]
            .as_str()
            .ok_or_else(|| PaymentError::Malformed("token response missing access_token".into()))?
            .to_string();

        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    /// Creates a PayPal order with a single digital-goods purchase unit and
    /// returns the payer-action redirect plus the order's self-link.
    #[instrument(skip(self, title, description), fields(order_id = %order_id))]
    pub async fn mint_session(
        &self,
        order_id: &str,
        title: &str,
        unit_price: Decimal,
        description: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        let error_page = format!(
            "{}/?sale-status=error&sale-id={}",
            self.landing_host, order_id
        );
        let success_page = format!("{}/api/store/sale-done/{}/", self.host, order_id);
        let value = usd(unit_price);

        let order_data = json!({
            "intent": "CAPTURE",
            "purchase_units": [
                {
                    "reference_id": order_id,
                    "description": description,
                    "amount": {
                        "currency_code": "USD",
                        "value": value,
                        "breakdown": {
                            "item_total": {
                                "currency_code": "USD",
                                "value": value,
                            }
                        },
                    },
                    "items": [
                        {
                            "name": title,
                            "description": description,
                            "unit_amount": {
                                "currency_code": "USD",
                                "value": value,
                            },
                            "quantity": "1",
                            "category": "DIGITAL_GOODS",
                        }
                    ],
                }
            ],
            "payment_source": {
                "paypal": {
                    "experience_context": {
                        "payment_method_preference": "IMMEDIATE_PAYMENT_REQUIRED",
                        "locale": "en-US",
                        "shipping_preference": "NO_SHIPPING",
                        "return_url": success_page,
                        "cancel_url": error_page,
                        "landing_page": "GUEST_CHECKOUT",
                    },
                },
            },
        });

        let order: Value = with_retry("paypal.create_order", || {
            let order_data = order_data.clone();
            async move {
                let token = self.access_token().await?;
                let response = self
                    .http
                    .post(format!("{}/v2/checkout/orders", self.api_base))
                    .bearer_auth(token)
                    .json(&order_data)
                    .send()
                    .await?;

                self.check_status(response).await
            }
        })
        .await?;

        let mut redirect_url = None;
        let mut handle = None;
        for link in order["links"].as_array().into_iter().flatten() {
            match link["rel"].as_str() {
                Some("payer-action") => redirect_url = link["href"].as_str().map(String::from),
                Some("self") => handle = link["href"].as_str().map(String::from),
                _ => {}
            }
        }

        match (handle, redirect_url) {
            (Some(handle), Some(redirect_url)) => Ok(CheckoutSession {
                handle,
                redirect_url,
            }),
            _ => Err(PaymentError::Malformed(
                "order response missing payer-action or self link".into(),
            )),
        }
    }

    /// Polls the order behind its self-link. `APPROVED` orders are captured
    /// on the spot; `COMPLETED` reads as paid. Fail-closed on any error.
    #[instrument(skip(self, order_details_link))]
    pub async fn is_paid(&self, order_details_link: &str) -> bool {
        match self.fetch_order_status(order_details_link).await {
            Ok((status, paypal_order_id)) => match status.as_str() {
                "COMPLETED" => true,
                "APPROVED" => match self.capture_payment(&paypal_order_id).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "payment capture failed");
                        false
                    }
                },
                other => {
                    info!(status = %other, "payment not completed");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "payment status check failed");
                false
            }
        }
    }

    async fn fetch_order_status(&self, link: &str) -> Result<(String, String), PaymentError> {
        let token = self.access_token().await?;
        let response = self.http.get(link).bearer_auth(token).send().await?;
        let body = self.check_status(response).await?;

        let status = body["status"]
            .as_str()
            .ok_or_else(|| PaymentError::Malformed("order response missing status".into()))?
            .to_string();
        let id = body["id"]
            .as_str()
            .ok_or_else(|| PaymentError::Malformed("order response missing id".into()))?
            .to_string();
        Ok((status, id))
    }

    /// Captures an approved PayPal order.
    async fn capture_payment(&self, paypal_order_id: &str) -> Result<(), PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.api_base, paypal_order_id
            ))
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        self.check_status(response).await?;
        info!(%paypal_order_id, "payment captured");
        Ok(())
    }

    /// Maps an HTTP response to the payment error taxonomy: 401 invalidates
    /// the cached token and is retryable, other 4xx fail fast.
    async fn check_status(&self, response: reqwest::Response) -> Result<Value, PaymentError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
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
            // 5xx surfaces as transport-level trouble and is retried
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
}
