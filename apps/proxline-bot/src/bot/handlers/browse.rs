//! Listing and purchase rendering shared by the message and callback
//! handlers.

use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use tracing::error;

use crate::api_client::ApiError;
use crate::bot::callback_data::CallbackData;
use crate::bot::dialogue::{
    classify_browse_failure, classify_purchase_failure, BrowseFailure, DialogueState, ProxyType,
    PptpState, PurchaseFailure, Socks5State,
};
use crate::bot::keyboards;
use crate::bot::utils::{cleanup_messages, escape_html};
use crate::models::api::Product;
use crate::session::{SessionRecord, TokenPair};
use crate::state::AppState;

pub fn format_product(p: &Product, family: ProxyType) -> String {
    let mut lines = vec![format!(
        "🔹 <b>{} #{}</b> — {}",
        family.label(),
        p.id,
        escape_html(&p.country)
    )];
    if let Some(state) = &p.state {
        lines.push(format!("🗺 State: {}", escape_html(state)));
    }
    if let Some(city) = &p.city {
        lines.push(format!("🏙 City: {}", escape_html(city)));
    }
    if let Some(zip) = &p.zip_code {
        lines.push(format!("📮 ZIP: {}", escape_html(zip)));
    }
    lines.push(format!("💵 ${:.2}", p.price));
    lines.join("\n")
}

/// Fetch one page of the current filter and render it as product cards plus
/// a pager message. Every rendered message id is recorded so the listing
/// can be cleaned up when one item is bought. On success the dialogue moves
/// to (or stays in) the family's browsing state.
///
/// Returns Ok(true) when products were rendered, Ok(false) on an empty
/// result (state is left untouched in that case).
pub async fn show_listing(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    record: &mut SessionRecord,
    tokens: &mut TokenPair,
    family: ProxyType,
    page: u32,
) -> Result<bool, ApiError> {
    let page = page.max(1);
    let fetched = state
        .products
        .list(tokens, family, &record.dialogue_data.filter, page)
        .await?;

    if fetched.products.is_empty() {
        if page > 1 {
            // The previous page claimed more results; believe the new answer.
            record.dialogue_data.has_more = false;
            let _ = bot
                .send_message(chat_id, "📭 No more results.")
                .reply_markup(keyboards::back_to_menu())
                .await;
        } else {
            let _ = bot
                .send_message(
                    chat_id,
                    "😕 No proxies match this filter. Try a different one.",
                )
                .reply_markup(keyboards::filter_keyboard())
                .await;
        }
        return Ok(false);
    }

    for p in &fetched.products {
        match bot
            .send_message(chat_id, format_product(p, family))
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::buy_keyboard(p.id, p.price))
            .await
        {
            Ok(m) => record.dialogue_data.list_message_ids.push(m.id.0),
            Err(e) => error!("failed to render product card: {}", e),
        }
    }

    let pager = format!("📄 Page {} · {} matching", page, fetched.total);
    if let Ok(m) = bot
        .send_message(chat_id, pager)
        .reply_markup(keyboards::pager_keyboard(fetched.has_more, family))
        .await
    {
        record.dialogue_data.list_message_ids.push(m.id.0);
    }

    record.dialogue_data.page = page;
    record.dialogue_data.has_more = fetched.has_more;
    record.dialogue_state = match family {
        ProxyType::Socks5 => DialogueState::Socks5(Socks5State::BrowsingProxies),
        ProxyType::Pptp => DialogueState::Pptp(PptpState::BrowsingPptpList),
    };
    Ok(true)
}

/// Failure handling for list/browse calls: transient faults keep the state
/// and offer a retry button; an expired session resets the flow and drops
/// the dead token pair.
pub async fn report_browse_failure(
    bot: &Bot,
    chat_id: ChatId,
    record: &mut SessionRecord,
    err: &ApiError,
    retry: CallbackData,
) {
    match classify_browse_failure(err) {
        BrowseFailure::Retry => {
            let _ = bot
                .send_message(chat_id, "⚠️ The service didn't respond. Try again in a moment.")
                .reply_markup(keyboards::retry_keyboard(retry))
                .await;
        }
        BrowseFailure::RestartAuth => {
            record.access_token = None;
            record.refresh_token = None;
            record.reset_dialogue();
            let _ = bot
                .send_message(chat_id, "🔐 Your session expired. Send /start to sign in again.")
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
    }
}

/// Same policy for fetches triggered by free-text input: there is no
/// button to replay, the user just sends the text again.
pub async fn report_text_fetch_failure(
    bot: &Bot,
    chat_id: ChatId,
    record: &mut SessionRecord,
    err: &ApiError,
) {
    match classify_browse_failure(err) {
        BrowseFailure::Retry => {
            let _ = bot
                .send_message(
                    chat_id,
                    "⚠️ The service didn't respond. Send your input again in a moment.",
                )
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
        BrowseFailure::RestartAuth => {
            record.access_token = None;
            record.refresh_token = None;
            record.reset_dialogue();
            let _ = bot
                .send_message(chat_id, "🔐 Your session expired. Send /start to sign in again.")
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
    }
}

/// Successful purchase: clean up the sibling listing messages, reset to
/// idle keeping the filter context, and show the credentials.
pub async fn finish_purchase_success(
    bot: &Bot,
    chat_id: ChatId,
    record: &mut SessionRecord,
    text: String,
) {
    let siblings = record.dialogue_data.list_message_ids.clone();
    cleanup_messages(bot, chat_id, &siblings).await;
    record.reset_dialogue_keep_filter();
    let _ = bot
        .send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::after_purchase_keyboard())
        .await;
}

/// Failed purchase: always terminal for the attempt, dialogue resets to
/// idle; insufficient balance gets a deposit call-to-action.
pub async fn finish_purchase_failure(
    bot: &Bot,
    chat_id: ChatId,
    record: &mut SessionRecord,
    err: &ApiError,
) {
    record.reset_dialogue();
    match classify_purchase_failure(err) {
        PurchaseFailure::RestartAuth => {
            record.access_token = None;
            record.refresh_token = None;
            let _ = bot
                .send_message(chat_id, "🔐 Your session expired. Send /start to sign in again.")
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
        PurchaseFailure::InsufficientBalance => {
            let _ = bot
                .send_message(
                    chat_id,
                    "💸 <b>Insufficient balance.</b>\nTop up your account and try again.",
                )
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::deposit_cta_keyboard())
                .await;
        }
        PurchaseFailure::Other => {
            let detail = err
                .detail()
                .map(|d| format!("\n{}", escape_html(d)))
                .unwrap_or_default();
            let _ = bot
                .send_message(
                    chat_id,
                    format!("❌ <b>Purchase failed.</b>{}", detail),
                )
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
    }
}

pub fn format_proxies(proxies: &[String]) -> String {
    proxies
        .iter()
        .map(|p| format!("<code>{}</code>", escape_html(p)))
        .collect::<Vec<_>>()
        .join("\n")
}
