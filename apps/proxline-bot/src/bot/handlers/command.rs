use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use tracing::{info, warn};

use crate::bot::dialogue::{
    validate_city, validate_deposit_amount, validate_proxy_id, validate_telegram_id, validate_zip,
    AccountState, DialogueState, PptpState, ProxyActionState, ProxyType, Socks5State,
};
use crate::bot::handlers::browse::{report_text_fetch_failure, show_listing};
use crate::bot::handlers::callback::render_linked_users;
use crate::bot::keyboards;
use crate::bot::utils::escape_html;
use crate::services::auth_service::{parse_access_code, parse_start_payload};
use crate::session::SessionRecord;
use crate::state::AppState;

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let Some(text) = msg.text().map(|t| t.to_owned()) else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let identity = chat_id.0;
    let mut record = state.sessions.get(identity).await;

    if text.starts_with("/start") {
        handle_start(&bot, &msg, &state, &mut record, &text).await;
        state.sessions.put(identity, record).await;
        return Ok(());
    }

    // Credentials are re-resolved on every turn: a valid cached token costs
    // one profile fetch, a wiped session is re-registered by telegram
    // identity instead of dead-ending the conversation.
    let from = msg.from.as_ref();
    let display_name = from
        .map(|u| u.full_name())
        .unwrap_or_else(|| "User".to_string());
    let outcome = state
        .auth
        .ensure_authenticated(
            &mut record,
            identity,
            from.and_then(|u| u.username.as_deref()),
            &display_name,
            from.and_then(|u| u.language_code.as_deref()),
            None,
        )
        .await;
    if !outcome.authenticated {
        let _ = bot
            .send_message(
                chat_id,
                "⚠️ The service is temporarily unavailable. Please try again in a minute.",
            )
            .reply_markup(keyboards::back_to_menu())
            .await;
        state.sessions.put(identity, record).await;
        return Ok(());
    }

    match record.dialogue_state {
        DialogueState::Socks5(Socks5State::WaitingCityInput) => {
            handle_city_input(&bot, chat_id, &state, &mut record, ProxyType::Socks5, &text).await;
        }
        DialogueState::Pptp(PptpState::WaitingCityInput) => {
            handle_city_input(&bot, chat_id, &state, &mut record, ProxyType::Pptp, &text).await;
        }
        DialogueState::Socks5(Socks5State::WaitingZipInput) => {
            handle_zip_input(&bot, chat_id, &state, &mut record, ProxyType::Socks5, &text).await;
        }
        DialogueState::Pptp(PptpState::WaitingZipInput) => {
            handle_zip_input(&bot, chat_id, &state, &mut record, ProxyType::Pptp, &text).await;
        }
        DialogueState::Account(AccountState::WaitingDepositAmount) => {
            handle_deposit_amount(&bot, chat_id, &state, &mut record, &text).await;
        }
        DialogueState::Account(AccountState::WaitingAccessCode) => {
            handle_access_code_input(&bot, &msg, &state, &mut record, &text).await;
        }
        DialogueState::Account(AccountState::WaitingTelegramIdToAdd) => {
            handle_telegram_id_input(&bot, chat_id, &state, &mut record, &text).await;
        }
        DialogueState::ProxyAction(ProxyActionState::WaitingProxyIdForValidation) => {
            handle_proxy_id_input(&bot, chat_id, &state, &mut record, &text, false).await;
        }
        DialogueState::ProxyAction(ProxyActionState::WaitingProxyIdForExtension) => {
            handle_proxy_id_input(&bot, chat_id, &state, &mut record, &text, true).await;
        }
        // Catch-all free text only exists at idle with no pending flow.
        _ => {
            let _ = bot
                .send_message(chat_id, "🏠 Use the menu below to browse proxies:")
                .reply_markup(keyboards::main_menu())
                .await;
        }
    }

    state.sessions.put(identity, record).await;
    Ok(())
}

async fn handle_start(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    record: &mut SessionRecord,
    text: &str,
) {
    let chat_id = msg.chat.id;
    let identity = chat_id.0;
    let payload = text.strip_prefix("/start").unwrap_or("").trim();
    let deep_link = parse_start_payload(payload);
    info!("/start from {} (deep link: {})", identity, deep_link.is_some());

    // A fresh /start always abandons whatever flow was in progress.
    record.reset_dialogue();

    let from = msg.from.as_ref();
    let display_name = from
        .map(|u| u.full_name())
        .unwrap_or_else(|| "User".to_string());
    let username = from.and_then(|u| u.username.as_deref());
    let language_hint = from.and_then(|u| u.language_code.as_deref());

    let outcome = state
        .auth
        .ensure_authenticated(
            record,
            identity,
            username,
            &display_name,
            language_hint,
            deep_link.as_ref(),
        )
        .await;

    if !outcome.authenticated {
        let _ = bot
            .send_message(
                chat_id,
                "⚠️ The service is temporarily unavailable. Please try /start again in a minute.",
            )
            .reply_markup(keyboards::back_to_menu())
            .await;
        return;
    }

    let mut welcome = format!(
        "👋 <b>Hello, {}!</b>\n\nBuy SOCKS5 and PPTP proxies, top up your balance and manage your orders right here.",
        escape_html(&display_name)
    );
    if let Some(profile) = &outcome.profile {
        welcome.push_str(&format!(
            "\n\n💰 Balance: <b>${:.2}</b>\n🔑 Access code: <code>{}</code>",
            profile.balance,
            escape_html(&profile.access_code)
        ));
    }
    let _ = bot
        .send_message(chat_id, welcome)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::main_menu())
        .await;
}

/// Shared guard for mid-flow turns: without a cached token the user has to
/// restart, because free-text states are only reachable after a /start.
macro_rules! require_tokens {
    ($bot:expr, $chat_id:expr, $record:expr) => {
        match $record.tokens() {
            Some(tokens) => tokens,
            None => {
                $record.reset_dialogue();
                let _ = $bot
                    .send_message($chat_id, "🔐 Please send /start first.")
                    .reply_markup(keyboards::back_to_menu())
                    .await;
                return;
            }
        }
    };
}

async fn handle_city_input(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    record: &mut SessionRecord,
    family: ProxyType,
    text: &str,
) {
    let Some(city) = validate_city(text) else {
        let _ = bot
            .send_message(
                chat_id,
                "⚠️ That doesn't look like a city name. Send a city, e.g. <i>Chicago</i>.",
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::back_to_menu())
            .await;
        return;
    };
    let mut tokens = require_tokens!(bot, chat_id, record);

    // New narrowing filter: the browse session restarts at page 1.
    record.dialogue_data.filter.clear_narrowing();
    record.dialogue_data.filter.city = Some(city);
    record.dialogue_data.page = 0;
    record.dialogue_data.list_message_ids.clear();

    let result = show_listing(bot, chat_id, state, record, &mut tokens, family, 1).await;
    record.store_tokens(&tokens);
    if let Err(err) = result {
        warn!("city listing failed for {}: {}", chat_id, err);
        report_text_fetch_failure(bot, chat_id, record, &err).await;
    }
}

async fn handle_zip_input(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    record: &mut SessionRecord,
    family: ProxyType,
    text: &str,
) {
    let Some(zip) = validate_zip(text) else {
        let _ = bot
            .send_message(
                chat_id,
                "⚠️ ZIP codes are 3–10 digits. Send one like <i>90210</i>.",
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::back_to_menu())
            .await;
        return;
    };
    let mut tokens = require_tokens!(bot, chat_id, record);

    record.dialogue_data.filter.clear_narrowing();
    record.dialogue_data.filter.zip_code = Some(zip);
    record.dialogue_data.page = 0;
    record.dialogue_data.list_message_ids.clear();

    let result = show_listing(bot, chat_id, state, record, &mut tokens, family, 1).await;
    record.store_tokens(&tokens);
    if let Err(err) = result {
        warn!("zip listing failed for {}: {}", chat_id, err);
        report_text_fetch_failure(bot, chat_id, record, &err).await;
    }
}

async fn handle_deposit_amount(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    record: &mut SessionRecord,
    text: &str,
) {
    let Some(amount) = validate_deposit_amount(text) else {
        let _ = bot
            .send_message(
                chat_id,
                "⚠️ Send an amount in USD between 1 and 10000, e.g. <i>25</i>.",
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::back_to_menu())
            .await;
        return;
    };
    let mut tokens = require_tokens!(bot, chat_id, record);

    let result = state.account.create_invoice(&mut tokens, amount).await;
    record.store_tokens(&tokens);
    match result {
        Ok(invoice) => {
            record.reset_dialogue();
            let text = format!(
                "🧾 <b>Invoice created</b>\n\nAmount: <b>${:.2}</b>\nMinimum: ${:.2}\nOrder: <code>{}</code>\nExpires: {}",
                invoice.amount_usd,
                invoice.min_amount_usd,
                escape_html(&invoice.order_id),
                invoice.expired_at.format("%Y-%m-%d %H:%M UTC")
            );
            let _ = bot
                .send_message(chat_id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::payment_keyboard(&invoice.payment_url))
                .await;
        }
        Err(err) if err.is_transient() => {
            let _ = bot
                .send_message(
                    chat_id,
                    "⚠️ Could not create the invoice right now. Send the amount again.",
                )
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
        Err(err) => {
            warn!("invoice creation failed for {}: {}", chat_id, err);
            record.reset_dialogue();
            let detail = err
                .detail()
                .map(|d| format!("\n{}", escape_html(d)))
                .unwrap_or_default();
            let _ = bot
                .send_message(chat_id, format!("❌ <b>Deposit failed.</b>{}", detail))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
    }
}

async fn handle_access_code_input(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    record: &mut SessionRecord,
    text: &str,
) {
    let chat_id = msg.chat.id;
    let Some(code) = parse_access_code(text) else {
        let _ = bot
            .send_message(
                chat_id,
                "⚠️ Access codes look like <code>ABC-123-XYZ</code>. Check the code and send it again.",
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::back_to_menu())
            .await;
        return;
    };

    let username = msg
        .from
        .as_ref()
        .and_then(|u| u.username.clone())
        .unwrap_or_else(|| chat_id.0.to_string());

    match state.account.link_by_key(&code, chat_id.0, &username).await {
        Ok(tokens) => {
            // The linked account's credentials replace this session's pair.
            record.access_token = Some(tokens.access_token);
            record.refresh_token = Some(tokens.refresh_token);
            record.access_code = Some(code);
            record.reset_dialogue();
            let _ = bot
                .send_message(chat_id, "✅ <b>Account linked!</b> You now share its balance and proxies.")
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::main_menu())
                .await;
        }
        Err(err) if err.is_transient() => {
            let _ = bot
                .send_message(chat_id, "⚠️ Could not reach the service. Send the code again.")
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
        Err(err) => {
            warn!("link-by-key failed for {}: {}", chat_id, err);
            record.reset_dialogue();
            let _ = bot
                .send_message(chat_id, "❌ That access code was not accepted.")
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
    }
}

async fn handle_telegram_id_input(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    record: &mut SessionRecord,
    text: &str,
) {
    let Some(telegram_id) = validate_telegram_id(text) else {
        let _ = bot
            .send_message(chat_id, "⚠️ Send a numeric Telegram id, e.g. <i>123456789</i>.")
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::back_to_menu())
            .await;
        return;
    };
    let mut tokens = require_tokens!(bot, chat_id, record);

    let result = state.account.add_linked_user(&mut tokens, telegram_id).await;
    record.store_tokens(&tokens);
    match result {
        Ok(linked) => {
            record.reset_dialogue();
            render_linked_users(bot, chat_id, &linked, Some("✅ User linked.")).await;
        }
        Err(err) if err.is_transient() => {
            let _ = bot
                .send_message(chat_id, "⚠️ Could not reach the service. Send the id again.")
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
        Err(err) => {
            warn!("linked-user add failed for {}: {}", chat_id, err);
            record.reset_dialogue();
            let detail = err
                .detail()
                .map(|d| format!("\n{}", escape_html(d)))
                .unwrap_or_default();
            let _ = bot
                .send_message(chat_id, format!("❌ <b>Could not link that user.</b>{}", detail))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
    }
}

/// Validate (and optionally extend) a purchased proxy by id. Extension
/// always validates first: an offline proxy is refunded, not extended.
async fn handle_proxy_id_input(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    record: &mut SessionRecord,
    text: &str,
    extend: bool,
) {
    let Some(proxy_id) = validate_proxy_id(text) else {
        let _ = bot
            .send_message(chat_id, "⚠️ Send the numeric proxy id from your purchase, e.g. <i>42</i>.")
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::back_to_menu())
            .await;
        return;
    };
    let Some(proxy_type) = record.dialogue_data.pending_proxy_type else {
        // Lost context (e.g. store wiped between turns); restart the tool.
        record.reset_dialogue();
        let _ = bot
            .send_message(chat_id, "⚠️ Please pick the proxy type again.")
            .reply_markup(keyboards::proxy_tools_keyboard())
            .await;
        return;
    };
    let mut tokens = require_tokens!(bot, chat_id, record);

    let validation = state.products.validate(&mut tokens, proxy_id, proxy_type).await;
    let validation = match validation {
        Ok(v) => v,
        Err(err) if err.is_transient() => {
            record.store_tokens(&tokens);
            let _ = bot
                .send_message(chat_id, "⚠️ Could not check the proxy right now. Send the id again.")
                .reply_markup(keyboards::back_to_menu())
                .await;
            return;
        }
        Err(err) => {
            warn!("proxy validation failed for {}: {}", chat_id, err);
            record.store_tokens(&tokens);
            record.reset_dialogue();
            let _ = bot
                .send_message(chat_id, "❌ Proxy not found or not yours.")
                .reply_markup(keyboards::back_to_menu())
                .await;
            return;
        }
    };

    if !extend {
        record.store_tokens(&tokens);
        record.reset_dialogue();
        let status = if validation.online { "🟢 online" } else { "🔴 offline" };
        let refund = if validation.refund_eligible {
            "eligible for a refund"
        } else {
            "not eligible for a refund"
        };
        let _ = bot
            .send_message(
                chat_id,
                format!(
                    "🔍 <b>{} #{}</b> is {}.\nPurchased {} minutes ago, {}.",
                    proxy_type.label(),
                    proxy_id,
                    status,
                    validation.minutes_since_purchase,
                    refund
                ),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::back_to_menu())
            .await;
        return;
    }

    if !validation.online {
        record.store_tokens(&tokens);
        record.reset_dialogue();
        let _ = bot
            .send_message(
                chat_id,
                format!(
                    "🔴 <b>{} #{}</b> is offline, so it cannot be extended.",
                    proxy_type.label(),
                    proxy_id
                ),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::back_to_menu())
            .await;
        return;
    }

    let extension = state.products.extend(&mut tokens, proxy_id, proxy_type).await;
    record.store_tokens(&tokens);
    match extension {
        Ok(ext) => {
            record.reset_dialogue();
            let _ = bot
                .send_message(
                    chat_id,
                    format!(
                        "⏳ <b>{} #{}</b> extended.\n💰 New balance: <b>${:.2}</b>",
                        proxy_type.label(),
                        proxy_id,
                        ext.new_balance
                    ),
                )
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
        Err(err) if err.is_transient() => {
            let _ = bot
                .send_message(chat_id, "⚠️ Could not extend right now. Send the id again.")
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
        Err(err) => {
            warn!("proxy extension failed for {}: {}", chat_id, err);
            record.reset_dialogue();
            if err.is_insufficient_balance() {
                let _ = bot
                    .send_message(chat_id, "💸 <b>Insufficient balance</b> to extend this proxy.")
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::deposit_cta_keyboard())
                    .await;
            } else {
                let _ = bot
                    .send_message(chat_id, "❌ Extension failed.")
                    .reply_markup(keyboards::back_to_menu())
                    .await;
            }
        }
    }
}

