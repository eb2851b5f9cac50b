use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Payload handed to the external email renderer. The engine supplies the
/// fields; rendering and transport happen elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailPayload {
    pub subject: String,
    pub to_email: String,
    pub first_name: String,
    pub last_name: String,
    /// Ordered paragraphs displayed above the CTA
    pub texts: Vec<String>,
    pub cta_link: String,
    pub cta_text: String,
    /// Key/value order-details rows, rendered as a table
    #[serde(default)]
    pub key_items: Vec<(String, String)>,
    /// Inline image URL (e.g. the order's logo)
    #[serde(default)]
    pub image_url: Option<String>,
    /// Object-store handle of an attachment (e.g. the invoice PDF)
    #[serde(default)]
    pub attachment: Option<String>,
}

impl EmailPayload {
    pub fn new(subject: impl Into<String>, to_email: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            to_email: to_email.into(),
            first_name: String::new(),
            last_name: String::new(),
            texts: Vec::new(),
            cta_link: String::new(),
            cta_text: String::new(),
            key_items: Vec::new(),
            image_url: None,
            attachment: None,
        }
    }

    pub fn greeting(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    pub fn texts(mut self, texts: Vec<String>) -> Self {
        self.texts = texts;
        self
    }

    pub fn cta(mut self, text: impl Into<String>, link: impl Into<String>) -> Self {
        self.cta_text = text.into();
        self.cta_link = link.into();
        self
    }

    pub fn key_items(mut self, items: Vec<(String, String)>) -> Self {
        self.key_items = items;
        self
    }

    pub fn image_url(mut self, url: Option<String>) -> Self {
        self.image_url = url;
        self
    }

    pub fn attachment(mut self, handle: Option<String>) -> Self {
        self.attachment = handle;
        self
    }
}

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("Renderer error: {0}")]
    Renderer(String),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Trait for outbound email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, payload: EmailPayload) -> Result<(), MailerError>;
}

/// Best-effort delivery handle shared by the services. Email failures are
/// logged and swallowed; the engine never raises for them.
#[derive(Clone)]
pub struct Mailbox {
    mailer: Arc<dyn Mailer>,
}

impl Mailbox {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    pub async fn deliver(&self, payload: EmailPayload) {
        let subject = payload.subject.clone();
        let to_email = payload.to_email.clone();
        match self.mailer.send(payload).await {
            Ok(()) => debug!(%subject, %to_email, "email dispatched"),
            Err(e) => warn!(%subject, %to_email, error = %e, "email delivery failed"),
        }
    }
}

/// Client for the external renderer service: posts the payload as JSON and
/// expects a 2xx.
pub struct RendererClient {
    endpoint: String,
    http: reqwest::Client,
}

impl RendererClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for RendererClient {
    async fn send(&self, payload: EmailPayload) -> Result<(), MailerError> {
        let response = self.http.post(&self.endpoint).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(MailerError::Renderer(format!(
                "renderer returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Mailer that drops everything; used when no renderer endpoint is configured.
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send(&self, payload: EmailPayload) -> Result<(), MailerError> {
        debug!(subject = %payload.subject, to_email = %payload.to_email, "email suppressed (no renderer configured)");
        Ok(())
    }
}

/// Mailer that records every payload; used by tests to assert on emissions.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<EmailPayload>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailPayload> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().expect("mailer mutex poisoned").len()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, payload: EmailPayload) -> Result<(), MailerError> {
        self.sent.lock().expect("mailer mutex poisoned").push(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn renderer_client_posts_the_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_string_contains("New sets available now!"))
            .and(body_string_contains("sub@b.c"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = RendererClient::new(format!("{}/send", server.uri()));
        client
            .send(
                EmailPayload::new("New sets available now!", "sub@b.c")
                    .cta("Buy now", "https://landing.test#buy-form"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn renderer_failures_surface_as_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = RendererClient::new(server.uri());
        let result = client.send(EmailPayload::new("s", "a@b.c")).await;
        assert!(matches!(result, Err(MailerError::Renderer(_))));
    }

    #[tokio::test]
    async fn memory_mailer_records_payloads() {
        let mailer = Arc::new(MemoryMailer::new());
        let mailbox = Mailbox::new(mailer.clone());

        mailbox
            .deliver(
                EmailPayload::new("Don't forget to pay for your order!", "a@b.c")
                    .greeting("Ada", "L")
                    .cta("Pay now", "https://api.test/api/store/payment-link/abc/"),
            )
            .await;

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to_email, "a@b.c");
        assert_eq!(sent[0].cta_text, "Pay now");
    }

    #[tokio::test]
    async fn delivery_failures_are_swallowed() {
        struct FailingMailer;

        #[async_trait]
        impl Mailer for FailingMailer {
            async fn send(&self, _payload: EmailPayload) -> Result<(), MailerError> {
                Err(MailerError::Renderer("boom".into()))
            }
        }

        let mailbox = Mailbox::new(Arc::new(FailingMailer));
        // Must not panic or propagate
        mailbox.deliver(EmailPayload::new("s", "a@b.c")).await;
    }
}
