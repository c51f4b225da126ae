use crate::api_client::{ApiClient, ApiError};
use crate::models::api::{HistoryResponse, Invoice, LinkedUsers, LoginTokens, Profile};
use crate::session::TokenPair;

pub const HISTORY_PAGE_SIZE: i64 = 10;

#[derive(Clone)]
pub struct AccountService {
    api: ApiClient,
}

impl AccountService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn profile(&self, tokens: &mut TokenPair) -> Result<Profile, ApiError> {
        self.api.get_authed("/api/user/profile", tokens).await
    }

    pub async fn history(
        &self,
        tokens: &mut TokenPair,
        limit: i64,
        offset: i64,
    ) -> Result<HistoryResponse, ApiError> {
        let path = format!("/api/user/history?limit={}&offset={}", limit, offset);
        self.api.get_authed(&path, tokens).await
    }

    pub async fn linked_users(&self, tokens: &mut TokenPair) -> Result<LinkedUsers, ApiError> {
        self.api.get_authed("/api/user/linked-users", tokens).await
    }

    pub async fn add_linked_user(
        &self,
        tokens: &mut TokenPair,
        telegram_id: i64,
    ) -> Result<LinkedUsers, ApiError> {
        #[derive(serde::Serialize)]
        struct LinkReq {
            telegram_id: i64,
        }
        self.api
            .post_authed("/api/user/linked-users/add", &LinkReq { telegram_id }, tokens)
            .await
    }

    pub async fn remove_linked_user(
        &self,
        tokens: &mut TokenPair,
        telegram_id: i64,
    ) -> Result<LinkedUsers, ApiError> {
        #[derive(serde::Serialize)]
        struct LinkReq {
            telegram_id: i64,
        }
        self.api
            .post_authed("/api/user/linked-users/remove", &LinkReq { telegram_id }, tokens)
            .await
    }

    /// Re-key this telegram identity onto an existing account. Returns a
    /// fresh token pair for the linked account.
    pub async fn link_by_key(
        &self,
        access_code: &str,
        telegram_id: i64,
        username: &str,
    ) -> Result<LoginTokens, ApiError> {
        #[derive(serde::Serialize)]
        struct LinkReq<'a> {
            access_code: &'a str,
            telegram_id: i64,
            username: &'a str,
        }
        self.api
            .post(
                "/api/user/link-by-key",
                &LinkReq {
                    access_code,
                    telegram_id,
                    username,
                },
            )
            .await
    }

    pub async fn create_invoice(
        &self,
        tokens: &mut TokenPair,
        amount_usd: f64,
    ) -> Result<Invoice, ApiError> {
        #[derive(serde::Serialize)]
        struct InvoiceReq {
            amount_usd: f64,
        }
        self.api
            .post_authed(
                "/api/payment/generate-address",
                &InvoiceReq { amount_usd },
                tokens,
            )
            .await
    }
}
