//! Dialogue states for the multi-step purchase and account flows.
//!
//! Every flow is a closed enum; a session is always in exactly one named
//! state or `Idle`. The pure helpers below decide transitions that depend
//! on user input or backend outcomes, so they stay unit-testable without
//! Telegram or the backend.

use serde::{Deserialize, Serialize};

use crate::api_client::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyType {
    Socks5,
    Pptp,
}

impl ProxyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Socks5 => "socks5",
            ProxyType::Pptp => "pptp",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProxyType::Socks5 => "SOCKS5",
            ProxyType::Pptp => "PPTP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DialogueState {
    #[default]
    Idle,
    Socks5(Socks5State),
    Pptp(PptpState),
    Account(AccountState),
    ProxyAction(ProxyActionState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Socks5State {
    WaitingFilterChoice,
    WaitingStateSelection,
    WaitingCityInput,
    WaitingZipInput,
    BrowsingProxies,
    ConfirmingPurchase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PptpState {
    WaitingCatalogChoice,
    WaitingFilterChoice,
    BrowsingStates,
    BrowsingPptpList,
    WaitingCityInput,
    WaitingZipInput,
    ConfirmingPurchase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountState {
    WaitingDepositAmount,
    WaitingAccessCode,
    WaitingTelegramIdToAdd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyActionState {
    WaitingProxyIdForValidation,
    WaitingProxyIdForExtension,
}

impl DialogueState {
    /// Proxy family of the active purchase flow, if any.
    pub fn family(&self) -> Option<ProxyType> {
        match self {
            DialogueState::Socks5(_) => Some(ProxyType::Socks5),
            DialogueState::Pptp(_) => Some(ProxyType::Pptp),
            _ => None,
        }
    }
}

/// Filter context of a browse session. Retained after a successful purchase
/// so the "back to filter" button can re-run the same query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterContext {
    pub country: Option<String>,
    pub catalog_id: Option<i64>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
}

impl FilterContext {
    /// Drop the narrowing fields but keep country/catalog; called when the
    /// user picks a new filter type. Resets the page counter implicitly
    /// because every filter change starts a new browse session.
    pub fn clear_narrowing(&mut self) {
        self.state = None;
        self.city = None;
        self.zip_code = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingPurchase {
    Socks5Product(i64),
    PptpProduct(i64),
    /// PPTP purchase by the whole filter bundle instead of a product id.
    PptpFilter,
}

/// Flow-scoped working state, cleared at flow boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogueData {
    pub filter: FilterContext,
    /// Family the retained filter belongs to; a menu entry into the other
    /// family always starts from a clean filter.
    pub filter_family: Option<ProxyType>,
    /// Current page of the browse session, 1-based. Monotonically increasing
    /// until the filter changes.
    pub page: u32,
    pub has_more: bool,
    /// Message ids of every rendered product card plus the pager, so the
    /// whole listing can be cleaned up after a purchase.
    pub list_message_ids: Vec<i32>,
    pub pending_purchase: Option<PendingPurchase>,
    /// Proxy family context for validate/extend id input.
    pub pending_proxy_type: Option<ProxyType>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PageAdvance {
    Advanced(u32),
    NoMore,
}

/// "Show more" advances the page counter only when the backend reported
/// more results on the last fetch; otherwise no backend call is made.
pub fn advance_page(current: u32, has_more: bool) -> PageAdvance {
    if has_more {
        PageAdvance::Advanced(current.max(1) + 1)
    } else {
        PageAdvance::NoMore
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum BrowseFailure {
    /// Stay in the same state, keep dialogue data, offer a retry.
    Retry,
    /// Token expired and the refresh also failed; the flow resets and the
    /// user is asked to restart.
    RestartAuth,
}

pub fn classify_browse_failure(err: &ApiError) -> BrowseFailure {
    if err.is_auth_expired() {
        BrowseFailure::RestartAuth
    } else {
        BrowseFailure::Retry
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PurchaseFailure {
    /// Reset to idle with a deposit call-to-action.
    InsufficientBalance,
    /// Token expired and the refresh also failed; same restart policy as a
    /// browse-call expiry.
    RestartAuth,
    /// Reset to idle with a generic failure message.
    Other,
}

pub fn classify_purchase_failure(err: &ApiError) -> PurchaseFailure {
    if err.is_auth_expired() {
        PurchaseFailure::RestartAuth
    } else if err.is_insufficient_balance() {
        PurchaseFailure::InsufficientBalance
    } else {
        PurchaseFailure::Other
    }
}

// --- Input validators ----------------------------------------------------
//
// Free-text input is validated by these predicates before any backend call;
// invalid input re-prompts in the same state and mutates nothing.

pub fn validate_zip(input: &str) -> Option<String> {
    let zip = input.trim();
    if (3..=10).contains(&zip.len()) && zip.bytes().all(|b| b.is_ascii_digit()) {
        Some(zip.to_string())
    } else {
        None
    }
}

pub fn validate_city(input: &str) -> Option<String> {
    let city = input.trim();
    let ok_len = (2..=50).contains(&city.chars().count());
    let ok_chars = city
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '.' || c == '\'');
    if ok_len && ok_chars {
        Some(city.to_string())
    } else {
        None
    }
}

pub fn validate_deposit_amount(input: &str) -> Option<f64> {
    let raw = input.trim().trim_start_matches('$');
    let amount: f64 = raw.parse().ok()?;
    if amount.is_finite() && (1.0..=10_000.0).contains(&amount) {
        Some(amount)
    } else {
        None
    }
}

pub fn validate_telegram_id(input: &str) -> Option<i64> {
    let id: i64 = input.trim().parse().ok()?;
    (id > 0).then_some(id)
}

pub fn validate_proxy_id(input: &str) -> Option<i64> {
    let id: i64 = input.trim().trim_start_matches('#').parse().ok()?;
    (id > 0).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_advances_only_when_more_available() {
        assert_eq!(advance_page(1, true), PageAdvance::Advanced(2));
        assert_eq!(advance_page(7, true), PageAdvance::Advanced(8));
        assert_eq!(advance_page(1, false), PageAdvance::NoMore);
        // A fresh browse session starts at page 1 even if the counter was
        // never initialised.
        assert_eq!(advance_page(0, true), PageAdvance::Advanced(2));
    }

    #[test]
    fn zip_validation() {
        assert_eq!(validate_zip("90210"), Some("90210".to_string()));
        assert_eq!(validate_zip(" 10001 "), Some("10001".to_string()));
        assert_eq!(validate_zip("!!!"), None);
        assert_eq!(validate_zip("12"), None);
        assert_eq!(validate_zip("12345678901"), None);
        assert_eq!(validate_zip("90-210"), None);
    }

    #[test]
    fn city_validation() {
        assert!(validate_city("Los Angeles").is_some());
        assert!(validate_city("Coeur d'Alene").is_some());
        assert!(validate_city("St. Louis").is_some());
        assert!(validate_city("x").is_none());
        assert!(validate_city("90210").is_none());
        assert!(validate_city("").is_none());
    }

    #[test]
    fn deposit_amount_validation() {
        assert_eq!(validate_deposit_amount("25"), Some(25.0));
        assert_eq!(validate_deposit_amount("$10.50"), Some(10.5));
        assert_eq!(validate_deposit_amount("0.5"), None);
        assert_eq!(validate_deposit_amount("-5"), None);
        assert_eq!(validate_deposit_amount("a lot"), None);
        assert_eq!(validate_deposit_amount("999999"), None);
    }

    #[test]
    fn id_validation() {
        assert_eq!(validate_telegram_id("123456789"), Some(123456789));
        assert_eq!(validate_telegram_id("-3"), None);
        assert_eq!(validate_telegram_id("bob"), None);
        assert_eq!(validate_proxy_id("#42"), Some(42));
        assert_eq!(validate_proxy_id("42"), Some(42));
        assert_eq!(validate_proxy_id("0"), None);
    }

    #[test]
    fn browse_failures_keep_state_except_auth() {
        assert_eq!(classify_browse_failure(&ApiError::Timeout), BrowseFailure::Retry);
        assert_eq!(
            classify_browse_failure(&ApiError::NetworkUnavailable("down".into())),
            BrowseFailure::Retry
        );
        assert_eq!(
            classify_browse_failure(&ApiError::HttpStatus { status: 500, detail: None }),
            BrowseFailure::Retry
        );
        assert_eq!(
            classify_browse_failure(&ApiError::HttpStatus { status: 401, detail: None }),
            BrowseFailure::RestartAuth
        );
    }

    #[test]
    fn purchase_failures_reset_to_idle() {
        let broke = ApiError::HttpStatus {
            status: 402,
            detail: Some("Insufficient balance".into()),
        };
        assert_eq!(classify_purchase_failure(&broke), PurchaseFailure::InsufficientBalance);
        let gone = ApiError::HttpStatus {
            status: 404,
            detail: Some("Product not found".into()),
        };
        assert_eq!(classify_purchase_failure(&gone), PurchaseFailure::Other);
        // Expiry after a failed refresh restarts auth, same as on a browse
        // call.
        let expired = ApiError::HttpStatus { status: 401, detail: None };
        assert_eq!(classify_purchase_failure(&expired), PurchaseFailure::RestartAuth);
    }

    #[test]
    fn filter_narrowing_reset_keeps_scope() {
        let mut f = FilterContext {
            country: Some("US".into()),
            catalog_id: Some(3),
            state: Some("CA".into()),
            city: Some("Fresno".into()),
            zip_code: Some("93650".into()),
        };
        f.clear_narrowing();
        assert_eq!(f.country.as_deref(), Some("US"));
        assert_eq!(f.catalog_id, Some(3));
        assert!(f.state.is_none() && f.city.is_none() && f.zip_code.is_none());
    }
}
