use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use teloxide::prelude::*;

mod api_client;
mod bot;
pub mod models;
mod services;
mod session;
mod state;

use crate::api_client::ApiClient;
use crate::services::account_service::AccountService;
use crate::services::auth_service::{ApiAuthGateway, AuthService};
use crate::services::product_service::ProductService;
use crate::session::{InMemorySessionStore, SessionStore};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    log::info!("Starting Proxline Bot...");

    let token = env::var("BOT_TOKEN").expect("BOT_TOKEN is not set");
    let backend_url =
        env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

    let api_client = ApiClient::new(backend_url);

    let auth = AuthService::new(Arc::new(ApiAuthGateway::new(api_client.clone())));
    let products = ProductService::new(api_client.clone());
    let account = AccountService::new(api_client.clone());
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());

    let state = AppState {
        sessions,
        auth,
        products,
        account,
    };

    let bot = Bot::new(token);

    // Create a dummy shutdown signal for now
    let (_tx, rx) = tokio::sync::broadcast::channel(1);

    bot::run_bot(bot, rx, state).await;
}
