use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::errors::ServiceError;
use crate::services::{read_status_int, round_usd, write_status_int};

const INVOICE_NUM_KEY: &str = "invoice_num";
/// Invoice numbering starts here when the counter row is first created.
const FIRST_INVOICE_NUM: i64 = 1;

/// Engine-computed overlay handed to the external PDF generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceFields {
    pub invoice_num: i64,
    pub date: String,
    pub name: String,
    pub city: String,
    pub state: String,
    pub street: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    pub email: String,
    pub quantity: String,
    pub base: String,
    pub igi: String,
    pub provider_fee: String,
    pub total: String,
}

impl InvoiceFields {
    /// Filename convention shared with the generator.
    pub fn handle(&self) -> String {
        format!("invoices/{:05}.pdf", self.invoice_num)
    }
}

/// Monetary breakdown printed on the invoice: base + IGI + provider fee
/// reassemble the charged total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceBreakdown {
    pub base: Decimal,
    pub igi: Decimal,
    pub provider_fee: Decimal,
    pub total: Decimal,
}

/// Splits the charged total into base, IGI and provider fee, all 2 dp.
pub fn compute_breakdown(total: Decimal, igi_rate: Decimal, fee_rate: Decimal) -> InvoiceBreakdown {
    let hundred = Decimal::from(100);
    let igi = round_usd(total * igi_rate / hundred);
    let provider_fee = round_usd(total * fee_rate / hundred);
    let base = round_usd(total - igi - provider_fee);

    InvoiceBreakdown {
        base,
        igi,
        provider_fee,
        total: round_usd(total),
    }
}

/// Allocates the next invoice number from the `store_status` counter. Must
/// run inside the paying transaction so the sequence stays strictly
/// increasing.
#[instrument(skip(db))]
pub async fn allocate_invoice_number<C: ConnectionTrait>(db: &C) -> Result<i64, ServiceError> {
    let current = read_status_int(db, INVOICE_NUM_KEY, FIRST_INVOICE_NUM - 1).await?;
    let next = current + 1;
    write_status_int(db, INVOICE_NUM_KEY, next).await?;
    info!(invoice_num = next, "invoice number allocated");
    Ok(next)
}

/// External PDF generator seam: the engine supplies the fields, the
/// generator merges them onto the fixed template and returns the blob handle.
#[async_trait]
pub trait InvoiceRenderer: Send + Sync {
    async fn render(&self, fields: &InvoiceFields) -> Result<String, ServiceError>;
}

/// HTTP client for the external generator service.
pub struct HttpInvoiceRenderer {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpInvoiceRenderer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl InvoiceRenderer for HttpInvoiceRenderer {
    async fn render(&self, fields: &InvoiceFields) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(fields)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("invoice generator: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalService(format!(
                "invoice generator returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("invoice generator: {}", e)))?;

        match body["file"].as_str() {
            Some(handle) => Ok(handle.to_string()),
            None => Ok(fields.handle()),
        }
    }
}

/// Renderer used when no generator endpoint is configured (and by tests):
/// returns the conventional handle without producing bytes.
pub struct StubInvoiceRenderer;

#[async_trait]
impl InvoiceRenderer for StubInvoiceRenderer {
    async fn render(&self, fields: &InvoiceFields) -> Result<String, ServiceError> {
        Ok(fields.handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_fields() -> InvoiceFields {
        InvoiceFields {
            invoice_num: 7,
            date: "07/08/2026".into(),
            name: "Aaron P".into(),
            city: "Billerica".into(),
            state: "Massachusetts".into(),
            street: "19 Greenville Street".into(),
            postal_code: "01821".into(),
            country: "United States".into(),
            phone: "970-988-5711".into(),
            email: "a@b.c".into(),
            quantity: "1".into(),
            base: "290.24".into(),
            igi: "14.40".into(),
            provider_fee: "15.36".into(),
            total: "320.00".into(),
        }
    }

    #[tokio::test]
    async fn http_renderer_returns_the_generator_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("290.24"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "file": "invoices/00007.pdf"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let renderer = HttpInvoiceRenderer::new(server.uri());
        let handle = renderer.render(&sample_fields()).await.unwrap();
        assert_eq!(handle, "invoices/00007.pdf");
    }

    #[tokio::test]
    async fn http_renderer_surfaces_generator_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let renderer = HttpInvoiceRenderer::new(server.uri());
        assert!(renderer.render(&sample_fields()).await.is_err());
    }

    #[test]
    fn breakdown_reassembles_the_total() {
        let b = compute_breakdown(dec!(320.00), dec!(4.5), dec!(4.8));
        assert_eq!(b.igi, dec!(14.40));
        assert_eq!(b.provider_fee, dec!(15.36));
        assert_eq!(b.base, dec!(290.24));
        assert_eq!(b.base + b.igi + b.provider_fee, b.total);
    }

    #[test]
    fn breakdown_rounds_each_component_to_cents() {
        let b = compute_breakdown(dec!(300.60), dec!(4.5), dec!(4.2));
        assert_eq!(b.igi, dec!(13.53));
        assert_eq!(b.provider_fee, dec!(12.63));
        assert_eq!(b.base, dec!(274.44));
    }

    #[test]
    fn handles_are_zero_padded() {
        let fields = InvoiceFields {
            invoice_num: 42,
            date: "07/08/2026".into(),
            name: "x".into(),
            city: "x".into(),
            state: "x".into(),
            street: "x".into(),
            postal_code: "x".into(),
            country: "x".into(),
            phone: "x".into(),
            email: "a@b.c".into(),
            quantity: "1".into(),
            base: "290.24".into(),
            igi: "14.40".into(),
            provider_fee: "15.36".into(),
            total: "320.00".into(),
        };
        assert_eq!(fields.handle(), "invoices/00042.pdf");
    }
}
