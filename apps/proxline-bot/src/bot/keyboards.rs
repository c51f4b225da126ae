use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::bot::callback_data::{
    AccountAction, CallbackData, FilterKind, MenuTarget, ProxyToolAction,
};
use crate::bot::dialogue::ProxyType;
use crate::models::api::{Catalog, StateCount};

/// Countries the reseller currently stocks.
pub const COUNTRIES: [(&str, &str); 6] = [
    ("US", "🇺🇸 United States"),
    ("CA", "🇨🇦 Canada"),
    ("GB", "🇬🇧 United Kingdom"),
    ("DE", "🇩🇪 Germany"),
    ("FR", "🇫🇷 France"),
    ("NL", "🇳🇱 Netherlands"),
];

fn cb(label: impl Into<String>, data: CallbackData) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label.into(), data.encode())
}

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            cb("🧦 SOCKS5 Proxies", CallbackData::Menu(MenuTarget::Socks5)),
            cb("🔌 PPTP Proxies", CallbackData::Menu(MenuTarget::Pptp)),
        ],
        vec![
            cb("👤 My Account", CallbackData::Menu(MenuTarget::Account)),
            cb("🛠 Proxy Tools", CallbackData::Menu(MenuTarget::ProxyTools)),
        ],
        vec![cb("📜 Purchase History", CallbackData::Menu(MenuTarget::History))],
    ])
}

pub fn back_to_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![cb("🏠 Main Menu", CallbackData::MainMenu)]])
}

/// Retry affordance for transient backend failures; the dialogue state is
/// preserved, so "try again" re-runs the same step.
pub fn retry_keyboard(retry: CallbackData) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        cb("🔄 Try Again", retry),
        cb("🏠 Main Menu", CallbackData::MainMenu),
    ]])
}

pub fn countries_keyboard() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    let mut row = Vec::new();
    for (code, label) in COUNTRIES {
        row.push(cb(label, CallbackData::Country(code.to_string())));
        if row.len() == 2 {
            rows.push(std::mem::take(&mut row));
        }
    }
    if !row.is_empty() {
        rows.push(row);
    }
    rows.push(vec![cb("🏠 Main Menu", CallbackData::MainMenu)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn filter_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            cb("🗺 By State", CallbackData::Filter(FilterKind::ByState)),
            cb("🏙 By City", CallbackData::Filter(FilterKind::ByCity)),
        ],
        vec![
            cb("📮 By ZIP", CallbackData::Filter(FilterKind::ByZip)),
            cb("📋 Show All", CallbackData::Filter(FilterKind::All)),
        ],
        vec![cb("🏠 Main Menu", CallbackData::MainMenu)],
    ])
}

pub fn catalogs_keyboard(catalogs: &[Catalog]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = catalogs
        .iter()
        .map(|c| vec![cb(c.name.clone(), CallbackData::Catalog(c.id))])
        .collect();
    rows.push(vec![cb("🏠 Main Menu", CallbackData::MainMenu)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn states_keyboard(states: &[StateCount]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    let mut row = Vec::new();
    for sc in states {
        row.push(cb(
            format!("{} ({})", sc.state, sc.count),
            CallbackData::StatePick(sc.state.clone()),
        ));
        if row.len() == 2 {
            rows.push(std::mem::take(&mut row));
        }
    }
    if !row.is_empty() {
        rows.push(row);
    }
    rows.push(vec![cb("🏠 Main Menu", CallbackData::MainMenu)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn buy_keyboard(product_id: i64, price: f64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![cb(
        format!("💰 Buy for ${:.2}", price),
        CallbackData::Buy(product_id),
    )]])
}

/// Pager rendered under a product listing. The "buy by filter" shortcut is
/// a PPTP-only affordance.
pub fn pager_keyboard(has_more: bool, family: ProxyType) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if has_more {
        rows.push(vec![cb("⬇️ Show More", CallbackData::ShowMore)]);
    }
    if family == ProxyType::Pptp {
        rows.push(vec![cb("🎲 Buy Any Matching", CallbackData::BuyByFilter)]);
    }
    rows.push(vec![cb("🏠 Main Menu", CallbackData::MainMenu)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn confirm_purchase_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        cb("✅ Confirm", CallbackData::ConfirmPurchase),
        cb("↩️ Back", CallbackData::CancelPurchase),
    ]])
}

/// Rendered after a completed purchase: the filter context is retained so
/// the user can jump straight back into the same listing.
pub fn after_purchase_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        cb("🔙 Back to Filter", CallbackData::BackToFilter),
        cb("🏠 Main Menu", CallbackData::MainMenu),
    ]])
}

pub fn deposit_cta_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        cb("💳 Deposit", CallbackData::Account(AccountAction::Deposit)),
        cb("🏠 Main Menu", CallbackData::MainMenu),
    ]])
}

pub fn account_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![cb("💳 Deposit Balance", CallbackData::Account(AccountAction::Deposit))],
        vec![
            cb("🔗 Link Account", CallbackData::Account(AccountAction::LinkAccount)),
            cb("👥 Linked Users", CallbackData::Account(AccountAction::LinkedUsers)),
        ],
        vec![cb("🏠 Main Menu", CallbackData::MainMenu)],
    ])
}

pub fn linked_users_keyboard(linked: &[i64]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = linked
        .iter()
        .map(|id| vec![cb(format!("❌ Unlink {}", id), CallbackData::RemoveLinked(*id))])
        .collect();
    rows.push(vec![cb(
        "➕ Add User",
        CallbackData::Account(AccountAction::AddLinkedUser),
    )]);
    rows.push(vec![cb("🏠 Main Menu", CallbackData::MainMenu)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn history_keyboard(offset: i64, page_size: i64, page_full: bool) -> InlineKeyboardMarkup {
    let mut nav = Vec::new();
    if offset > 0 {
        nav.push(cb(
            "⬅️ Newer",
            CallbackData::HistoryPage((offset - page_size).max(0)),
        ));
    }
    if page_full {
        nav.push(cb("➡️ Older", CallbackData::HistoryPage(offset + page_size)));
    }
    let mut rows = Vec::new();
    if !nav.is_empty() {
        rows.push(nav);
    }
    rows.push(vec![cb("🏠 Main Menu", CallbackData::MainMenu)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn proxy_tools_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            cb(
                "🔍 Validate SOCKS5",
                CallbackData::ProxyTool(ProxyToolAction::Validate(ProxyType::Socks5)),
            ),
            cb(
                "🔍 Validate PPTP",
                CallbackData::ProxyTool(ProxyToolAction::Validate(ProxyType::Pptp)),
            ),
        ],
        vec![
            cb(
                "⏳ Extend SOCKS5",
                CallbackData::ProxyTool(ProxyToolAction::Extend(ProxyType::Socks5)),
            ),
            cb(
                "⏳ Extend PPTP",
                CallbackData::ProxyTool(ProxyToolAction::Extend(ProxyType::Pptp)),
            ),
        ],
        vec![cb(
            "🧹 Validate All PPTP",
            CallbackData::ProxyTool(ProxyToolAction::ValidateAllPptp),
        )],
        vec![cb("🏠 Main Menu", CallbackData::MainMenu)],
    ])
}

pub fn payment_keyboard(payment_url: &str) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if let Ok(url) = payment_url.parse::<reqwest::Url>() {
        rows.push(vec![InlineKeyboardButton::url("💳 Pay Invoice", url)]);
    }
    rows.push(vec![cb("🏠 Main Menu", CallbackData::MainMenu)]);
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callback_payloads(kb: &InlineKeyboardMarkup) -> Vec<String> {
        kb.inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    // History paging is carried entirely by the button payloads; no other
    // state is involved.
    #[test]
    fn history_paging_derives_from_offset() {
        let first = callback_payloads(&history_keyboard(0, 10, true));
        assert!(first.contains(&"hist:10".to_string()));
        assert!(!first.iter().any(|d| d.starts_with("hist:-")));

        let middle = callback_payloads(&history_keyboard(20, 10, true));
        assert!(middle.contains(&"hist:10".to_string()));
        assert!(middle.contains(&"hist:30".to_string()));

        let last = callback_payloads(&history_keyboard(30, 10, false));
        assert!(last.contains(&"hist:20".to_string()));
        assert!(!last.contains(&"hist:40".to_string()));
    }
}
