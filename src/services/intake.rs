use base64::Engine;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::{color, order, order_addon, promo_code};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::mailer::{EmailPayload, Mailbox};
use crate::payments::PaymentLinker;
use crate::services::catalog::CatalogService;
use crate::services::customers::CustomerService;
use crate::services::orders::{mint_order_id, OrderService, OrderStatus};
use crate::services::stock::StockService;
use crate::services::{round_usd, trunc_cents};
use crate::storage::ObjectStore;

/// A structured sale submission from the landing site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeRequest {
    pub email: Option<String>,
    pub set: Option<String>,
    pub colors_num: Option<i32>,
    pub set_color: Option<String>,
    pub logo_color_1: Option<String>,
    pub logo_color_2: Option<String>,
    pub logo_color_3: Option<String>,
    #[serde(default)]
    pub included_extras: Vec<String>,
    pub promo: Option<PromoRef>,
    pub full_name: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub street_address: Option<String>,
    pub phone: Option<String>,
    /// Base64 data URI, `image/png` or `image/svg+xml`
    pub logo: Option<String>,
    pub comments: Option<String>,
}

/// Client-side promo reference. Resolution is lenient: whatever does not
/// resolve against the catalog simply applies no promo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoRef {
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntakeOutcome {
    pub order_id: String,
    pub payment_link: String,
}

/// Uploaded logo format, constrained to the two accepted MIME types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoFormat {
    Png,
    Svg,
}

impl LogoFormat {
    pub fn extension(self) -> &'static str {
        match self {
            LogoFormat::Png => "png",
            LogoFormat::Svg => "svg",
        }
    }
}

#[derive(Debug, Error)]
pub enum LogoDecodeError {
    #[error("Invalid logo: expected a base64 data URI")]
    NotADataUri,
    #[error("Invalid logo MIME type: {0}")]
    UnsupportedMime(String),
    #[error("Invalid logo: payload is not valid base64")]
    InvalidEncoding,
}

/// Decodes a `data:<mime>;base64,<payload>` logo upload. Total function:
/// every malformed input maps to a discriminant, no panics.
pub fn parse_logo(data_uri: &str) -> Result<(LogoFormat, Vec<u8>), LogoDecodeError> {
    let rest = data_uri
        .strip_prefix("data:")
        .ok_or(LogoDecodeError::NotADataUri)?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or(LogoDecodeError::NotADataUri)?;

    let format = match mime {
        "image/png" => LogoFormat::Png,
        "image/svg+xml" => LogoFormat::Svg,
        other => return Err(LogoDecodeError::UnsupportedMime(other.to_string())),
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| LogoDecodeError::InvalidEncoding)?;

    Ok((format, bytes))
}

/// Deterministic pricing: base + tier + add-ons, minus the promo, rounded to
/// 2 dp half away from zero.
pub fn compute_total(
    set_price: Decimal,
    tier_price: Decimal,
    addon_prices: &[Decimal],
    promo: Option<(&str, Decimal)>,
) -> Decimal {
    let mut total = set_price + tier_price + addon_prices.iter().copied().sum::<Decimal>();

    match promo {
        Some(("amount", value)) => total -= value,
        Some(("percentage", value)) => total -= total * value / Decimal::from(100),
        _ => {}
    }

    round_usd(total)
}

/// Intake & Pricing: validates a submission, resolves catalog references,
/// computes the total, deduplicates prior pending orders, attaches the logo
/// and mints the first checkout session.
#[derive(Clone)]
pub struct IntakeService {
    db: Arc<DbPool>,
    config: AppConfig,
    catalog: Arc<CatalogService>,
    customers: Arc<CustomerService>,
    orders: Arc<OrderService>,
    stock: Arc<StockService>,
    linker: Arc<PaymentLinker>,
    store: Arc<dyn ObjectStore>,
    mailbox: Mailbox,
    event_sender: EventSender,
}

impl IntakeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        catalog: Arc<CatalogService>,
        customers: Arc<CustomerService>,
        orders: Arc<OrderService>,
        stock: Arc<StockService>,
        linker: Arc<PaymentLinker>,
        store: Arc<dyn ObjectStore>,
        mailbox: Mailbox,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            config,
            catalog,
            customers,
            orders,
            stock,
            linker,
            store,
            mailbox,
            event_sender,
        }
    }

    /// Runs the full intake pipeline for one submission.
    #[instrument(skip(self, request), fields(email = request.email.as_deref().unwrap_or("")))]
    pub async fn submit(&self, request: IntakeRequest) -> Result<IntakeOutcome, ServiceError> {
        let fields = self.validate_required(&request)?;

        // Catalog resolution: every reference must resolve exactly
        let set = self.catalog.resolve_set(&fields.set).await?;
        let tier = self.catalog.resolve_tier(fields.colors_num).await?;
        let set_color = self.catalog.resolve_color(&fields.set_color).await?;
        let logo_colors = self.resolve_logo_colors(&request, tier.num).await?;
        let addons = self.catalog.resolve_addons(&request.included_extras).await?;

        // Lenient promo resolution: anything unknown applies no promo
        let promo = self.resolve_promo(&request).await?;

        let addon_prices: Vec<Decimal> = addons.iter().map(|a| a.price).collect();
        let total = compute_total(
            set.price,
            tier.price,
            &addon_prices,
            promo
                .as_ref()
                .map(|(code, kind)| (kind.as_str(), code.discount)),
        );

        // Customer resolution, provisioning an implicit account if needed
        let (customer, created) = self.customers.get_or_create(&fields.email).await?;
        if created {
            self.send_invitation_email(&customer.email).await;
        }

        // Pending-order deduplication: prior unpaid orders are deleted and
        // both parties are told about the replacement
        let replaced = self.delete_pending_orders(customer.id).await?;
        if !replaced.is_empty() {
            self.send_replacement_emails(&customer.email, &replaced).await;
        }

        // Persist the order
        let order_id = mint_order_id();
        let now = Utc::now();
        let order_model = order::ActiveModel {
            id: Set(order_id.clone()),
            customer_id: Set(customer.id),
            set_id: Set(set.id),
            colors_num: Set(tier.num),
            set_color_id: Set(set_color.id),
            logo_color_1_id: Set(logo_colors[0].as_ref().map(|c| c.id)),
            logo_color_2_id: Set(logo_colors[1].as_ref().map(|c| c.id)),
            logo_color_3_id: Set(logo_colors[2].as_ref().map(|c| c.id)),
            promo_code_id: Set(promo.as_ref().map(|(code, _)| code.id)),
            logo: Set(None),
            full_name: Set(fields.full_name),
            country: Set(fields.country),
            state: Set(fields.state),
            city: Set(fields.city),
            postal_code: Set(fields.postal_code),
            street_address: Set(fields.street_address),
            phone: Set(fields.phone),
            comments: Set(request.comments.clone()),
            total: Set(total),
            status: Set(OrderStatus::Pending.to_string()),
            reminders_sent: Set(0),
            payment_link: Set(None),
            checkout_handle: Set(None),
            payment_provider: Set(None),
            tracking_number: Set(None),
            invoice_file: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        for picked in &addons {
            order_addon::ActiveModel {
                order_id: Set(order_id.clone()),
                addon_id: Set(picked.id),
                ..Default::default()
            }
            .insert(&*self.db)
            .await?;
        }

        // Logo attachment: a decode or storage failure rolls the whole
        // intake back
        let order_model = match &request.logo {
            Some(data_uri) if !data_uri.is_empty() => {
                match self.attach_logo(order_model, data_uri).await {
                    Ok(updated) => updated,
                    Err(err) => {
                        self.delete_order(&order_id).await?;
                        return Err(err);
                    }
                }
            }
            _ => order_model,
        };

        // First checkout session
        let (title, description) = crate::services::orders::checkout_copy(
            &set.name,
            tier.num,
            &customer.email,
            &order_model.full_name,
        );
        let (kind, session) = self
            .linker
            .mint_session(&order_id, &title, total, &description)
            .await
            .map_err(|e| ServiceError::PaymentProvider(e.to_string()))?;
        self.orders
            .save_payment_session(&*self.db, order_model, kind, &session)
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::OrderCreated {
                order_id: order_id.clone(),
                customer_email: customer.email.clone(),
                total,
            })
            .await
        {
            warn!(%order_id, error = %e, "failed to publish order created event");
        }

        // Stock gate: the order stays persisted either way; an exhausted
        // counter surfaces as an error the admin resolves manually
        if self.stock.current_stock().await? <= 0 {
            warn!(%order_id, "intake accepted with no stock available");
            return Err(ServiceError::OutOfStock);
        }

        info!(%order_id, %total, "order created");
        Ok(IntakeOutcome {
            order_id,
            payment_link: session.redirect_url,
        })
    }

    /// Required-field check. Emits only the first missing field, in the
    /// declared submission order.
    fn validate_required(&self, request: &IntakeRequest) -> Result<RequiredFields, ServiceError> {
        fn required(value: &Option<String>, name: &str) -> Result<String, ServiceError> {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(missing(name)),
            }
        }
        fn missing(name: &str) -> ServiceError {
            ServiceError::ValidationError(format!("Missing required field: {}", name))
        }

        let email = required(&request.email, "email")?;
        let set = required(&request.set, "set")?;
        let colors_num = request.colors_num.ok_or_else(|| missing("colors_num"))?;
        let set_color = required(&request.set_color, "set_color")?;

        // Colour slot K is required iff the tier reaches it
        if colors_num >= 2 {
            required(&request.logo_color_1, "logo_color_1")?;
        }
        if colors_num >= 3 {
            required(&request.logo_color_2, "logo_color_2")?;
        }
        if colors_num >= 4 {
            required(&request.logo_color_3, "logo_color_3")?;
        }

        let full_name = required(&request.full_name, "full_name")?;
        let country = required(&request.country, "country")?;
        let state = required(&request.state, "state")?;
        let city = required(&request.city, "city")?;
        let postal_code = required(&request.postal_code, "postal_code")?;
        let street_address = required(&request.street_address, "street_address")?;
        let phone = required(&request.phone, "phone")?;

        Ok(RequiredFields {
            email,
            set,
            colors_num,
            set_color,
            full_name,
            country,
            state,
            city,
            postal_code,
            street_address,
            phone,
        })
    }

    /// Resolves the logo colour slots the tier requires; slots past the tier
    /// stay empty regardless of what the client sent.
    async fn resolve_logo_colors(
        &self,
        request: &IntakeRequest,
        tier_num: i32,
    ) -> Result<[Option<color::Model>; 3], ServiceError> {
        let slots = [
            (2, &request.logo_color_1),
            (3, &request.logo_color_2),
            (4, &request.logo_color_3),
        ];

        let mut resolved: [Option<color::Model>; 3] = [None, None, None];
        for (i, (slot_tier, name)) in slots.into_iter().enumerate() {
            if tier_num >= slot_tier {
                let name = name.as_deref().unwrap_or_default();
                resolved[i] = Some(self.catalog.resolve_color(name).await?);
            }
        }
        Ok(resolved)
    }

    async fn resolve_promo(
        &self,
        request: &IntakeRequest,
    ) -> Result<Option<(promo_code::Model, String)>, ServiceError> {
        let Some(code) = request
            .promo
            .as_ref()
            .and_then(|p| p.code.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            return Ok(None);
        };

        match self.catalog.resolve_promo(code).await? {
            Some((promo, kind)) => Ok(Some((promo, kind.name))),
            None => {
                info!(%code, "unknown promo code ignored");
                Ok(None)
            }
        }
    }

    /// Deletes this customer's orders still awaiting payment and returns
    /// their ids.
    async fn delete_pending_orders(&self, customer_id: i32) -> Result<Vec<String>, ServiceError> {
        let pending = self.orders.pending_orders_for(customer_id).await?;
        let mut deleted = Vec::with_capacity(pending.len());

        for stale in pending {
            let stale_id = stale.id.clone();
            order_addon::Entity::delete_many()
                .filter(order_addon::Column::OrderId.eq(stale_id.clone()))
                .exec(&*self.db)
                .await?;
            order::Entity::delete_by_id(stale_id.clone())
                .exec(&*self.db)
                .await?;
            info!(order_id = %stale_id, "stale pending order deleted");
            deleted.push(stale_id);
        }
        Ok(deleted)
    }

    async fn delete_order(&self, order_id: &str) -> Result<(), ServiceError> {
        order_addon::Entity::delete_many()
            .filter(order_addon::Column::OrderId.eq(order_id))
            .exec(&*self.db)
            .await?;
        order::Entity::delete_by_id(order_id).exec(&*self.db).await?;
        Ok(())
    }

    async fn attach_logo(
        &self,
        order_model: order::Model,
        data_uri: &str,
    ) -> Result<order::Model, ServiceError> {
        let (format, bytes) =
            parse_logo(data_uri).map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let handle = format!("logos/{}.{}", order_model.id, format.extension());
        self.store
            .put(&handle, bytes)
            .await
            .map_err(|e| ServiceError::ValidationError(format!("Could not store logo: {}", e)))?;

        let mut active: order::ActiveModel = order_model.into();
        active.logo = Set(Some(handle));
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    async fn send_invitation_email(&self, email: &str) {
        self.mailbox
            .deliver(
                EmailPayload::new("Welcome to Nyx Trackers", email)
                    .texts(vec![
                        "An account was created for you with this email address.".to_string(),
                        "You can manage your orders from our store once you set a password."
                            .to_string(),
                    ])
                    .cta("Visit our store", self.config.landing_host.clone()),
            )
            .await;
    }

    async fn send_replacement_emails(&self, email: &str, replaced: &[String]) {
        self.mailbox
            .deliver(
                EmailPayload::new("Your previous order was replaced", email)
                    .texts(vec![
                        "You submitted a new order, so we removed your previous pending order."
                            .to_string(),
                        "Only the newest order remains active.".to_string(),
                    ])
                    .cta("Visit our store", self.config.landing_host.clone()),
            )
            .await;

        self.mailbox
            .deliver(
                EmailPayload::new("Pending order replaced", self.config.admin_email.clone())
                    .greeting("Admin", "")
                    .texts(vec![format!(
                        "Customer {} submitted a new order replacing: {}",
                        email,
                        replaced.join(", ")
                    )])
                    .cta(
                        "Open dashboard",
                        format!("{}/admin/store/order/", self.config.host),
                    ),
            )
            .await;

        for stale_id in replaced {
            if let Err(e) = self
                .event_sender
                .send(Event::OrderReplaced {
                    old_order_id: stale_id.clone(),
                    customer_email: email.to_string(),
                })
                .await
            {
                warn!(order_id = %stale_id, error = %e, "failed to publish order replaced event");
            }
        }
    }
}

struct RequiredFields {
    email: String,
    set: String,
    colors_num: i32,
    set_color: String,
    full_name: String,
    country: String,
    state: String,
    city: String,
    postal_code: String,
    street_address: String,
    phone: String,
}

// Commission amount helper kept next to pricing so the two money paths share
// rounding conventions.
pub fn commission_amount(total: Decimal, rate: Decimal) -> Decimal {
    trunc_cents(total * rate)
}
