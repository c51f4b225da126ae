use std::sync::Arc;

use crate::services::account_service::AccountService;
use crate::services::auth_service::AuthService;
use crate::services::product_service::ProductService;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub auth: AuthService,
    pub products: ProductService,
    pub account: AccountService,
}
