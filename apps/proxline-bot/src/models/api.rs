//! Request/response bodies of the backend REST API.
//!
//! Field names follow the backend contract exactly, including the
//! `referal_quantity` spelling in the profile payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct TelegramAuthRequest {
    pub telegram_id: i64,
    pub username: String,
    pub language: String,
    pub referral_code: Option<String>,
}

/// Response of `POST /api/auth/telegram-auth`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_code: String,
    pub is_new_user: bool,
}

/// Response of `POST /api/auth/login`, `POST /api/auth/refresh` and
/// `POST /api/user/link-by-key`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub user_id: i64,
    pub access_code: String,
    pub balance: f64,
    pub language: Option<String>,
    pub referal_quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub formatted_message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkedUsers {
    pub telegram_id_owner: i64,
    pub linked_telegram_ids: Vec<i64>,
    pub total: i64,
}

/// Response of `POST /api/payment/generate-address`.
#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    pub payment_url: String,
    pub payment_uuid: String,
    pub order_id: String,
    pub expired_at: DateTime<Utc>,
    pub amount_usd: f64,
    pub min_amount_usd: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub id: i64,
    pub country: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogsResponse {
    pub catalogs: Vec<Catalog>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateCount {
    pub state: String,
    pub count: i64,
}

/// Response of `POST /api/purchase/socks5`.
#[derive(Debug, Clone, Deserialize)]
pub struct Socks5Purchase {
    pub order_id: i64,
    pub price: f64,
    pub country: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub proxies: Vec<String>,
}

/// Response of `POST /api/purchase/pptp`.
#[derive(Debug, Clone, Deserialize)]
pub struct PptpPurchase {
    pub product_id: i64,
    pub price: f64,
    pub proxies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationResult {
    pub online: bool,
    pub refund_eligible: bool,
    pub minutes_since_purchase: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionResult {
    pub new_balance: f64,
}

/// Response of `POST /api/purchase/validate-pptp`.
#[derive(Debug, Clone, Deserialize)]
pub struct PptpBulkValidation {
    pub validated_count: i64,
    pub valid_count: i64,
    pub invalid_count: i64,
    pub refunded_amount: f64,
}
