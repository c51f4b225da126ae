use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardMarkup, MessageId, ParseMode};
use tracing::{info, warn};

use crate::bot::callback_data::{
    AccountAction, CallbackData, FilterKind, MenuTarget, ProxyToolAction,
};
use crate::bot::dialogue::{
    advance_page, DialogueData, DialogueState, AccountState, PageAdvance, PendingPurchase,
    PptpState, ProxyActionState, ProxyType, Socks5State,
};
use crate::bot::handlers::browse::{
    finish_purchase_failure, finish_purchase_success, format_proxies, report_browse_failure,
    show_listing,
};
use crate::bot::keyboards;
use crate::bot::utils::escape_html;
use crate::models::api::LinkedUsers;
use crate::services::account_service::HISTORY_PAGE_SIZE;
use crate::session::SessionRecord;
use crate::state::AppState;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    info!("Received callback: {:?}", q.data);
    let callback_id = q.id.clone();

    let Some(msg) = q.message else {
        let _ = bot.answer_callback_query(callback_id).await;
        return Ok(());
    };
    let chat_id = msg.chat().id;
    let message_id = msg.id();
    let identity = chat_id.0;

    let Some(parsed) = q.data.as_deref().and_then(CallbackData::parse) else {
        warn!("unparseable callback payload: {:?}", q.data);
        let _ = bot.answer_callback_query(callback_id).await;
        return Ok(());
    };

    let mut record = state.sessions.get(identity).await;

    // Same credential resolution as the message path: one profile fetch on
    // a valid cached token, transparent re-registration on a wiped session.
    let outcome = state
        .auth
        .ensure_authenticated(
            &mut record,
            identity,
            q.from.username.as_deref(),
            &q.from.full_name(),
            q.from.language_code.as_deref(),
            None,
        )
        .await;
    if !outcome.authenticated {
        let _ = bot.answer_callback_query(callback_id).await;
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

    // "Show more" answers with inline feedback when the listing is
    // exhausted; everything else acks silently up front.
    if let CallbackData::ShowMore = parsed {
        handle_show_more(&bot, callback_id, chat_id, &state, &mut record).await;
        state.sessions.put(identity, record).await;
        return Ok(());
    }
    let _ = bot.answer_callback_query(callback_id).await;

    match parsed {
        CallbackData::ShowMore => unreachable!("handled above"),

        CallbackData::MainMenu => {
            record.reset_dialogue();
            edit_or_send(
                &bot,
                chat_id,
                message_id,
                "🏠 <b>Main Menu</b>\n\nChoose a service:".to_string(),
                keyboards::main_menu(),
            )
            .await;
        }

        CallbackData::Menu(MenuTarget::Socks5) => {
            enter_family(&mut record, ProxyType::Socks5);
            record.dialogue_state = DialogueState::Socks5(Socks5State::WaitingFilterChoice);
            edit_or_send(
                &bot,
                chat_id,
                message_id,
                "🧦 <b>SOCKS5 Proxies</b>\n\nPick a country:".to_string(),
                keyboards::countries_keyboard(),
            )
            .await;
        }

        CallbackData::Menu(MenuTarget::Pptp) => {
            enter_pptp_flow(&bot, chat_id, message_id, &state, &mut record).await;
        }

        CallbackData::Menu(MenuTarget::Account) => {
            record.reset_dialogue();
            show_account(&bot, chat_id, message_id, &state, &mut record).await;
        }

        CallbackData::Menu(MenuTarget::ProxyTools) => {
            record.reset_dialogue();
            edit_or_send(
                &bot,
                chat_id,
                message_id,
                "🛠 <b>Proxy Tools</b>\n\nCheck a proxy or extend its lifetime:".to_string(),
                keyboards::proxy_tools_keyboard(),
            )
            .await;
        }

        CallbackData::Menu(MenuTarget::History) => {
            record.reset_dialogue();
            show_history(&bot, chat_id, message_id, &state, &mut record, 0).await;
        }

        CallbackData::HistoryPage(offset) => {
            show_history(&bot, chat_id, message_id, &state, &mut record, offset.max(0)).await;
        }

        CallbackData::Country(code) => {
            let at_filter_stage = matches!(
                record.dialogue_state,
                DialogueState::Socks5(Socks5State::WaitingFilterChoice)
                    | DialogueState::Pptp(PptpState::WaitingFilterChoice)
            );
            if !at_filter_stage {
                stale_button(&bot, chat_id).await;
            } else {
                // Country change starts the filter stage over.
                record.dialogue_data.filter.clear_narrowing();
                record.dialogue_data.filter.country = Some(code.clone());
                record.dialogue_data.page = 0;
                record.dialogue_data.has_more = false;
                edit_or_send(
                    &bot,
                    chat_id,
                    message_id,
                    format!(
                        "🌍 Country: <b>{}</b>\n\nHow do you want to filter?",
                        escape_html(&code)
                    ),
                    keyboards::filter_keyboard(),
                )
                .await;
            }
        }

        CallbackData::Catalog(catalog_id) => {
            if record.dialogue_state != DialogueState::Pptp(PptpState::WaitingCatalogChoice) {
                stale_button(&bot, chat_id).await;
            } else {
                record.dialogue_data.filter.catalog_id = Some(catalog_id);
                record.dialogue_state = DialogueState::Pptp(PptpState::WaitingFilterChoice);
                edit_or_send(
                    &bot,
                    chat_id,
                    message_id,
                    "🔌 <b>PPTP Proxies</b>\n\nPick a region:".to_string(),
                    keyboards::countries_keyboard(),
                )
                .await;
            }
        }

        CallbackData::Filter(kind) => {
            handle_filter_choice(&bot, chat_id, message_id, &state, &mut record, kind).await;
        }

        CallbackData::StatePick(picked) => {
            let family = match record.dialogue_state {
                DialogueState::Socks5(Socks5State::WaitingStateSelection) => {
                    Some(ProxyType::Socks5)
                }
                DialogueState::Pptp(PptpState::BrowsingStates) => Some(ProxyType::Pptp),
                _ => None,
            };
            let Some(family) = family else {
                stale_button(&bot, chat_id).await;
                state.sessions.put(identity, record).await;
                return Ok(());
            };
            let Some(mut tokens) = record.tokens() else {
                restart_prompt(&bot, chat_id, &mut record).await;
                state.sessions.put(identity, record).await;
                return Ok(());
            };
            record.dialogue_data.filter.clear_narrowing();
            record.dialogue_data.filter.state = Some(picked);
            record.dialogue_data.page = 0;
            record.dialogue_data.list_message_ids.clear();
            let result = show_listing(&bot, chat_id, &state, &mut record, &mut tokens, family, 1).await;
            record.store_tokens(&tokens);
            if let Err(err) = result {
                warn!("state listing failed for {}: {}", chat_id, err);
                let retry = record
                    .dialogue_data
                    .filter
                    .state
                    .clone()
                    .map(CallbackData::StatePick)
                    .unwrap_or(CallbackData::MainMenu);
                report_browse_failure(&bot, chat_id, &mut record, &err, retry).await;
            }
        }

        CallbackData::Buy(product_id) => {
            let family = match record.dialogue_state {
                DialogueState::Socks5(Socks5State::BrowsingProxies) => Some(ProxyType::Socks5),
                DialogueState::Pptp(PptpState::BrowsingPptpList) => Some(ProxyType::Pptp),
                _ => None,
            };
            match family {
                None => stale_button(&bot, chat_id).await,
                Some(ProxyType::Socks5) => {
                    record.dialogue_data.pending_purchase =
                        Some(PendingPurchase::Socks5Product(product_id));
                    record.dialogue_state =
                        DialogueState::Socks5(Socks5State::ConfirmingPurchase);
                    confirm_prompt(&bot, chat_id, format!("SOCKS5 proxy #{}", product_id)).await;
                }
                Some(ProxyType::Pptp) => {
                    record.dialogue_data.pending_purchase =
                        Some(PendingPurchase::PptpProduct(product_id));
                    record.dialogue_state = DialogueState::Pptp(PptpState::ConfirmingPurchase);
                    confirm_prompt(&bot, chat_id, format!("PPTP proxy #{}", product_id)).await;
                }
            }
        }

        CallbackData::BuyByFilter => {
            if record.dialogue_state != DialogueState::Pptp(PptpState::BrowsingPptpList) {
                stale_button(&bot, chat_id).await;
            } else {
                record.dialogue_data.pending_purchase = Some(PendingPurchase::PptpFilter);
                record.dialogue_state = DialogueState::Pptp(PptpState::ConfirmingPurchase);
                confirm_prompt(&bot, chat_id, "any PPTP proxy matching your filter".to_string())
                    .await;
            }
        }

        CallbackData::ConfirmPurchase => {
            handle_confirm_purchase(&bot, chat_id, &state, &mut record).await;
        }

        CallbackData::CancelPurchase => {
            let family = record.dialogue_state.family();
            let confirming = matches!(
                record.dialogue_state,
                DialogueState::Socks5(Socks5State::ConfirmingPurchase)
                    | DialogueState::Pptp(PptpState::ConfirmingPurchase)
            );
            if !confirming {
                stale_button(&bot, chat_id).await;
            } else {
                record.dialogue_data.pending_purchase = None;
                let family = family.unwrap_or(ProxyType::Socks5);
                record.dialogue_state = match family {
                    ProxyType::Socks5 => DialogueState::Socks5(Socks5State::BrowsingProxies),
                    ProxyType::Pptp => DialogueState::Pptp(PptpState::BrowsingPptpList),
                };
                edit_or_send(
                    &bot,
                    chat_id,
                    message_id,
                    "↩️ Purchase cancelled.".to_string(),
                    keyboards::pager_keyboard(record.dialogue_data.has_more, family),
                )
                .await;
            }
        }

        CallbackData::BackToFilter => {
            let family = record.dialogue_data.filter_family;
            let has_country = record.dialogue_data.filter.country.is_some();
            match family {
                Some(ProxyType::Socks5) if has_country => {
                    record.dialogue_state =
                        DialogueState::Socks5(Socks5State::WaitingFilterChoice);
                    edit_or_send(
                        &bot,
                        chat_id,
                        message_id,
                        "🧦 <b>SOCKS5 Proxies</b>\n\nHow do you want to filter?".to_string(),
                        keyboards::filter_keyboard(),
                    )
                    .await;
                }
                Some(ProxyType::Pptp) if has_country => {
                    if record.dialogue_data.filter.catalog_id.is_some() {
                        record.dialogue_state =
                            DialogueState::Pptp(PptpState::WaitingFilterChoice);
                        edit_or_send(
                            &bot,
                            chat_id,
                            message_id,
                            "🔌 <b>PPTP Proxies</b>\n\nHow do you want to filter?".to_string(),
                            keyboards::filter_keyboard(),
                        )
                        .await;
                    } else {
                        enter_pptp_flow(&bot, chat_id, message_id, &state, &mut record).await;
                    }
                }
                _ => {
                    // Nothing to come back to; offer the menu instead.
                    edit_or_send(
                        &bot,
                        chat_id,
                        message_id,
                        "🏠 <b>Main Menu</b>\n\nChoose a service:".to_string(),
                        keyboards::main_menu(),
                    )
                    .await;
                }
            }
        }

        CallbackData::Account(AccountAction::Deposit) => {
            record.reset_dialogue();
            record.dialogue_state = DialogueState::Account(AccountState::WaitingDepositAmount);
            edit_or_send(
                &bot,
                chat_id,
                message_id,
                "💳 Send the amount to deposit in USD (1–10000), e.g. <i>25</i>:".to_string(),
                keyboards::back_to_menu(),
            )
            .await;
        }

        CallbackData::Account(AccountAction::LinkAccount) => {
            record.reset_dialogue();
            record.dialogue_state = DialogueState::Account(AccountState::WaitingAccessCode);
            edit_or_send(
                &bot,
                chat_id,
                message_id,
                "🔗 Send the access code of the account to link, like <code>ABC-123-XYZ</code>:"
                    .to_string(),
                keyboards::back_to_menu(),
            )
            .await;
        }

        CallbackData::Account(AccountAction::AddLinkedUser) => {
            record.reset_dialogue();
            record.dialogue_state =
                DialogueState::Account(AccountState::WaitingTelegramIdToAdd);
            edit_or_send(
                &bot,
                chat_id,
                message_id,
                "➕ Send the numeric Telegram id to link:".to_string(),
                keyboards::back_to_menu(),
            )
            .await;
        }

        CallbackData::Account(AccountAction::LinkedUsers) => {
            let Some(mut tokens) = record.tokens() else {
                restart_prompt(&bot, chat_id, &mut record).await;
                state.sessions.put(identity, record).await;
                return Ok(());
            };
            let result = state.account.linked_users(&mut tokens).await;
            record.store_tokens(&tokens);
            match result {
                Ok(linked) => render_linked_users(&bot, chat_id, &linked, None).await,
                Err(err) => {
                    warn!("linked-users fetch failed for {}: {}", chat_id, err);
                    report_browse_failure(
                        &bot,
                        chat_id,
                        &mut record,
                        &err,
                        CallbackData::Account(AccountAction::LinkedUsers),
                    )
                    .await;
                }
            }
        }

        CallbackData::RemoveLinked(telegram_id) => {
            let Some(mut tokens) = record.tokens() else {
                restart_prompt(&bot, chat_id, &mut record).await;
                state.sessions.put(identity, record).await;
                return Ok(());
            };
            let result = state.account.remove_linked_user(&mut tokens, telegram_id).await;
            record.store_tokens(&tokens);
            match result {
                Ok(linked) => {
                    render_linked_users(&bot, chat_id, &linked, Some("✅ User unlinked.")).await
                }
                Err(err) => {
                    warn!("linked-user removal failed for {}: {}", chat_id, err);
                    report_browse_failure(
                        &bot,
                        chat_id,
                        &mut record,
                        &err,
                        CallbackData::Account(AccountAction::LinkedUsers),
                    )
                    .await;
                }
            }
        }

        CallbackData::ProxyTool(ProxyToolAction::Validate(proxy_type)) => {
            record.reset_dialogue();
            record.dialogue_state =
                DialogueState::ProxyAction(ProxyActionState::WaitingProxyIdForValidation);
            record.dialogue_data.pending_proxy_type = Some(proxy_type);
            edit_or_send(
                &bot,
                chat_id,
                message_id,
                format!(
                    "🔍 Send the id of the {} proxy to validate:",
                    proxy_type.label()
                ),
                keyboards::back_to_menu(),
            )
            .await;
        }

        CallbackData::ProxyTool(ProxyToolAction::Extend(proxy_type)) => {
            record.reset_dialogue();
            record.dialogue_state =
                DialogueState::ProxyAction(ProxyActionState::WaitingProxyIdForExtension);
            record.dialogue_data.pending_proxy_type = Some(proxy_type);
            edit_or_send(
                &bot,
                chat_id,
                message_id,
                format!(
                    "⏳ Send the id of the {} proxy to extend (it will be checked first):",
                    proxy_type.label()
                ),
                keyboards::back_to_menu(),
            )
            .await;
        }

        CallbackData::ProxyTool(ProxyToolAction::ValidateAllPptp) => {
            let Some(mut tokens) = record.tokens() else {
                restart_prompt(&bot, chat_id, &mut record).await;
                state.sessions.put(identity, record).await;
                return Ok(());
            };
            let result = state.products.validate_all_pptp(&mut tokens).await;
            record.store_tokens(&tokens);
            match result {
                Ok(r) => {
                    let text = format!(
                        "🧹 <b>PPTP bulk validation</b>\n\nChecked: {}\n🟢 Online: {}\n🔴 Offline: {}\n💵 Refunded: ${:.2}",
                        r.validated_count, r.valid_count, r.invalid_count, r.refunded_amount
                    );
                    let _ = bot
                        .send_message(chat_id, text)
                        .parse_mode(ParseMode::Html)
                        .reply_markup(keyboards::back_to_menu())
                        .await;
                }
                Err(err) => {
                    warn!("bulk validation failed for {}: {}", chat_id, err);
                    report_browse_failure(
                        &bot,
                        chat_id,
                        &mut record,
                        &err,
                        CallbackData::ProxyTool(ProxyToolAction::ValidateAllPptp),
                    )
                    .await;
                }
            }
        }
    }

    state.sessions.put(identity, record).await;
    Ok(())
}

/// Entering a purchase flow keeps the retained filter only when it belongs
/// to the same proxy family.
fn enter_family(record: &mut SessionRecord, family: ProxyType) {
    if record.dialogue_data.filter_family == Some(family) {
        let filter = record.dialogue_data.filter.clone();
        record.dialogue_data = DialogueData::default();
        record.dialogue_data.filter = filter;
    } else {
        record.dialogue_data = DialogueData::default();
    }
    record.dialogue_data.filter_family = Some(family);
}

async fn enter_pptp_flow(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    state: &AppState,
    record: &mut SessionRecord,
) {
    let Some(mut tokens) = record.tokens() else {
        restart_prompt(bot, chat_id, record).await;
        return;
    };
    let result = state.products.catalogs(&mut tokens, ProxyType::Pptp).await;
    record.store_tokens(&tokens);
    match result {
        Ok(catalogs) if catalogs.is_empty() => {
            let _ = bot
                .send_message(chat_id, "😕 No PPTP catalogs are available right now.")
                .reply_markup(keyboards::back_to_menu())
                .await;
        }
        Ok(catalogs) => {
            enter_family(record, ProxyType::Pptp);
            record.dialogue_state = DialogueState::Pptp(PptpState::WaitingCatalogChoice);
            edit_or_send(
                bot,
                chat_id,
                message_id,
                "🔌 <b>PPTP Proxies</b>\n\nChoose a catalog:".to_string(),
                keyboards::catalogs_keyboard(&catalogs),
            )
            .await;
        }
        Err(err) => {
            warn!("catalog fetch failed for {}: {}", chat_id, err);
            report_browse_failure(bot, chat_id, record, &err, CallbackData::Menu(MenuTarget::Pptp))
                .await;
        }
    }
}

async fn handle_filter_choice(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    state: &AppState,
    record: &mut SessionRecord,
    kind: FilterKind,
) {
    let family = match record.dialogue_state {
        DialogueState::Socks5(_) => ProxyType::Socks5,
        DialogueState::Pptp(_) => ProxyType::Pptp,
        _ => {
            stale_button(bot, chat_id).await;
            return;
        }
    };
    if record.dialogue_data.filter.country.is_none() {
        edit_or_send(
            bot,
            chat_id,
            message_id,
            "🌍 Pick a country first:".to_string(),
            keyboards::countries_keyboard(),
        )
        .await;
        return;
    }

    match kind {
        FilterKind::ByCity => {
            record.dialogue_state = match family {
                ProxyType::Socks5 => DialogueState::Socks5(Socks5State::WaitingCityInput),
                ProxyType::Pptp => DialogueState::Pptp(PptpState::WaitingCityInput),
            };
            edit_or_send(
                bot,
                chat_id,
                message_id,
                "🏙 Send the city name:".to_string(),
                keyboards::back_to_menu(),
            )
            .await;
        }
        FilterKind::ByZip => {
            record.dialogue_state = match family {
                ProxyType::Socks5 => DialogueState::Socks5(Socks5State::WaitingZipInput),
                ProxyType::Pptp => DialogueState::Pptp(PptpState::WaitingZipInput),
            };
            edit_or_send(
                bot,
                chat_id,
                message_id,
                "📮 Send the ZIP code:".to_string(),
                keyboards::back_to_menu(),
            )
            .await;
        }
        FilterKind::ByState => {
            let Some(mut tokens) = record.tokens() else {
                restart_prompt(bot, chat_id, record).await;
                return;
            };
            let country = record
                .dialogue_data
                .filter
                .country
                .clone()
                .unwrap_or_default();
            let catalog_id = record.dialogue_data.filter.catalog_id;
            let result = state
                .products
                .states(&mut tokens, &country, family, catalog_id)
                .await;
            record.store_tokens(&tokens);
            match result {
                Ok(states) if states.is_empty() => {
                    let _ = bot
                        .send_message(
                            chat_id,
                            "😕 No states with stock for this selection. Try another filter.",
                        )
                        .reply_markup(keyboards::filter_keyboard())
                        .await;
                }
                Ok(states) => {
                    record.dialogue_state = match family {
                        ProxyType::Socks5 => {
                            DialogueState::Socks5(Socks5State::WaitingStateSelection)
                        }
                        ProxyType::Pptp => DialogueState::Pptp(PptpState::BrowsingStates),
                    };
                    edit_or_send(
                        bot,
                        chat_id,
                        message_id,
                        "🗺 Pick a state:".to_string(),
                        keyboards::states_keyboard(&states),
                    )
                    .await;
                }
                Err(err) => {
                    warn!("states fetch failed for {}: {}", chat_id, err);
                    report_browse_failure(
                        bot,
                        chat_id,
                        record,
                        &err,
                        CallbackData::Filter(FilterKind::ByState),
                    )
                    .await;
                }
            }
        }
        FilterKind::All => {
            let Some(mut tokens) = record.tokens() else {
                restart_prompt(bot, chat_id, record).await;
                return;
            };
            record.dialogue_data.filter.clear_narrowing();
            record.dialogue_data.page = 0;
            record.dialogue_data.list_message_ids.clear();
            let result =
                show_listing(bot, chat_id, state, record, &mut tokens, family, 1).await;
            record.store_tokens(&tokens);
            if let Err(err) = result {
                warn!("unfiltered listing failed for {}: {}", chat_id, err);
                report_browse_failure(
                    bot,
                    chat_id,
                    record,
                    &err,
                    CallbackData::Filter(FilterKind::All),
                )
                .await;
            }
        }
    }
}

async fn handle_show_more(
    bot: &Bot,
    callback_id: teloxide::types::CallbackQueryId,
    chat_id: ChatId,
    state: &AppState,
    record: &mut SessionRecord,
) {
    let family = match record.dialogue_state {
        DialogueState::Socks5(Socks5State::BrowsingProxies) => Some(ProxyType::Socks5),
        DialogueState::Pptp(PptpState::BrowsingPptpList) => Some(ProxyType::Pptp),
        _ => None,
    };
    let Some(family) = family else {
        let _ = bot.answer_callback_query(callback_id).await;
        stale_button(bot, chat_id).await;
        return;
    };

    match advance_page(record.dialogue_data.page, record.dialogue_data.has_more) {
        PageAdvance::NoMore => {
            // No backend call; the page counter stays put.
            let _ = bot
                .answer_callback_query(callback_id)
                .text("📭 No more results.")
                .await;
        }
        PageAdvance::Advanced(next) => {
            let _ = bot.answer_callback_query(callback_id).await;
            let Some(mut tokens) = record.tokens() else {
                restart_prompt(bot, chat_id, record).await;
                return;
            };
            let result =
                show_listing(bot, chat_id, state, record, &mut tokens, family, next).await;
            record.store_tokens(&tokens);
            if let Err(err) = result {
                warn!("show-more listing failed for {}: {}", chat_id, err);
                report_browse_failure(bot, chat_id, record, &err, CallbackData::ShowMore).await;
            }
        }
    }
}

async fn handle_confirm_purchase(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    record: &mut SessionRecord,
) {
    let confirming = matches!(
        record.dialogue_state,
        DialogueState::Socks5(Socks5State::ConfirmingPurchase)
            | DialogueState::Pptp(PptpState::ConfirmingPurchase)
    );
    let Some(pending) = record.dialogue_data.pending_purchase else {
        stale_button(bot, chat_id).await;
        return;
    };
    if !confirming {
        stale_button(bot, chat_id).await;
        return;
    }
    let Some(mut tokens) = record.tokens() else {
        restart_prompt(bot, chat_id, record).await;
        return;
    };

    match pending {
        PendingPurchase::Socks5Product(product_id) => {
            let result = state.products.purchase_socks5(&mut tokens, product_id).await;
            record.store_tokens(&tokens);
            match result {
                Ok(p) => {
                    info!("socks5 purchase by {}: order {}", chat_id, p.order_id);
                    let location = [
                        Some(p.country.as_str()),
                        p.state.as_deref(),
                        p.city.as_deref(),
                        p.zip.as_deref(),
                    ]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(", ");
                    let text = format!(
                        "✅ <b>Purchase complete!</b>\n\nOrder: <code>#{}</code>\nPrice: ${:.2}\nLocation: {}\n\n{}",
                        p.order_id,
                        p.price,
                        escape_html(&location),
                        format_proxies(&p.proxies)
                    );
                    finish_purchase_success(bot, chat_id, record, text).await;
                }
                Err(err) => {
                    warn!("socks5 purchase failed for {}: {}", chat_id, err);
                    finish_purchase_failure(bot, chat_id, record, &err).await;
                }
            }
        }
        PendingPurchase::PptpProduct(product_id) => {
            let result = state
                .products
                .purchase_pptp_product(&mut tokens, product_id)
                .await;
            record.store_tokens(&tokens);
            finish_pptp_purchase(bot, chat_id, record, result).await;
        }
        PendingPurchase::PptpFilter => {
            let filter = record.dialogue_data.filter.clone();
            let result = state
                .products
                .purchase_pptp_by_filter(&mut tokens, &filter)
                .await;
            record.store_tokens(&tokens);
            finish_pptp_purchase(bot, chat_id, record, result).await;
        }
    }
}

async fn finish_pptp_purchase(
    bot: &Bot,
    chat_id: ChatId,
    record: &mut SessionRecord,
    result: Result<crate::models::api::PptpPurchase, crate::api_client::ApiError>,
) {
    match result {
        Ok(p) => {
            info!("pptp purchase by {}: product {}", chat_id, p.product_id);
            let text = format!(
                "✅ <b>Purchase complete!</b>\n\nProduct: <code>#{}</code>\nPrice: ${:.2}\n\n{}",
                p.product_id,
                p.price,
                format_proxies(&p.proxies)
            );
            finish_purchase_success(bot, chat_id, record, text).await;
        }
        Err(err) => {
            warn!("pptp purchase failed for {}: {}", chat_id, err);
            finish_purchase_failure(bot, chat_id, record, &err).await;
        }
    }
}

async fn show_account(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    state: &AppState,
    record: &mut SessionRecord,
) {
    let Some(mut tokens) = record.tokens() else {
        restart_prompt(bot, chat_id, record).await;
        return;
    };
    let result = state.account.profile(&mut tokens).await;
    record.store_tokens(&tokens);
    match result {
        Ok(profile) => {
            if record.access_code.is_none() {
                record.access_code = Some(profile.access_code.clone());
            }
            let text = format!(
                "👤 <b>My Account</b>\n\n💰 Balance: <b>${:.2}</b>\n🔑 Access code: <code>{}</code>\n🤝 Referrals: {}",
                profile.balance,
                escape_html(&profile.access_code),
                profile.referal_quantity
            );
            edit_or_send(bot, chat_id, message_id, text, keyboards::account_keyboard()).await;
        }
        Err(err) => {
            warn!("profile fetch failed for {}: {}", chat_id, err);
            report_browse_failure(
                bot,
                chat_id,
                record,
                &err,
                CallbackData::Menu(MenuTarget::Account),
            )
            .await;
        }
    }
}

async fn show_history(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    state: &AppState,
    record: &mut SessionRecord,
    offset: i64,
) {
    let Some(mut tokens) = record.tokens() else {
        restart_prompt(bot, chat_id, record).await;
        return;
    };
    let result = state
        .account
        .history(&mut tokens, HISTORY_PAGE_SIZE, offset)
        .await;
    record.store_tokens(&tokens);
    match result {
        Ok(resp) => {
            let text = if resp.history.is_empty() {
                if offset == 0 {
                    "📜 <b>Purchase History</b>\n\nNothing here yet.".to_string()
                } else {
                    "📜 <b>Purchase History</b>\n\nNo older purchases.".to_string()
                }
            } else {
                let entries = resp
                    .history
                    .iter()
                    .map(|e| escape_html(&e.formatted_message))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                format!("📜 <b>Purchase History</b>\n\n{}", entries)
            };
            let page_full = resp.history.len() as i64 == HISTORY_PAGE_SIZE;
            edit_or_send(
                bot,
                chat_id,
                message_id,
                text,
                keyboards::history_keyboard(offset, HISTORY_PAGE_SIZE, page_full),
            )
            .await;
        }
        Err(err) => {
            warn!("history fetch failed for {}: {}", chat_id, err);
            report_browse_failure(bot, chat_id, record, &err, CallbackData::HistoryPage(offset))
                .await;
        }
    }
}

pub async fn render_linked_users(
    bot: &Bot,
    chat_id: ChatId,
    linked: &LinkedUsers,
    note: Option<&str>,
) {
    let mut text = String::new();
    if let Some(note) = note {
        text.push_str(note);
        text.push_str("\n\n");
    }
    text.push_str(&format!(
        "👥 <b>Linked Users</b> ({} total)\nOwner: <code>{}</code>",
        linked.total, linked.telegram_id_owner
    ));
    if linked.linked_telegram_ids.is_empty() {
        text.push_str("\n\nNo linked users yet.");
    }
    let _ = bot
        .send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::linked_users_keyboard(&linked.linked_telegram_ids))
        .await;
}

async fn confirm_prompt(bot: &Bot, chat_id: ChatId, what: String) {
    let _ = bot
        .send_message(
            chat_id,
            format!("🛒 Buy <b>{}</b>?\nThe price is charged from your balance.", what),
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::confirm_purchase_keyboard())
        .await;
}

async fn stale_button(bot: &Bot, chat_id: ChatId) {
    let _ = bot
        .send_message(chat_id, "⌛ That menu is no longer active.")
        .reply_markup(keyboards::back_to_menu())
        .await;
}

async fn restart_prompt(bot: &Bot, chat_id: ChatId, record: &mut SessionRecord) {
    record.reset_dialogue();
    let _ = bot
        .send_message(chat_id, "🔐 Please send /start first.")
        .reply_markup(keyboards::back_to_menu())
        .await;
}

async fn edit_or_send(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    text: String,
    keyboard: InlineKeyboardMarkup,
) {
    let edited = bot
        .edit_message_text(chat_id, message_id, text.clone())
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard.clone())
        .await;
    if edited.is_err() {
        let _ = bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await;
    }
}
