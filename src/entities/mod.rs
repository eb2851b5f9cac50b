pub mod addon;
pub mod affiliate;
pub mod affiliate_payment;
pub mod color;
pub mod color_tier;
pub mod customer;
pub mod future_stock;
pub mod order;
pub mod order_addon;
pub mod product_set;
pub mod promo_code;
pub mod promo_code_type;
pub mod stock_subscription;
pub mod store_status;
