use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::session::TokenPair;

/// Error taxonomy at the gateway boundary. Downstream code branches on
/// these three kinds only, never on raw transport errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("backend request timed out")]
    Timeout,
    #[error("backend unreachable: {0}")]
    NetworkUnavailable(String),
    #[error("backend returned status {status}")]
    HttpStatus { status: u16, detail: Option<String> },
}

impl ApiError {
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::HttpStatus { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// Authorization-expired response, the trigger for the one-shot
    /// refresh-and-replay policy.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::HttpStatus { status: 401, .. })
    }

    pub fn is_insufficient_balance(&self) -> bool {
        self.detail()
            .map(|d| d.to_lowercase().contains("insufficient balance"))
            .unwrap_or(false)
    }

    /// Transient transport faults; the dialogue stays in place and the
    /// user gets a retry prompt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Timeout | ApiError::NetworkUnavailable(_))
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::NetworkUnavailable(e.to_string())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    message: Option<String>,
}

/// Thin mapper between logical operations and the backend REST API.
///
/// Authenticated requests carry the session's bearer token; on a 401 the
/// client refreshes the token pair once via `/api/auth/refresh`, replays the
/// original request once, and surfaces the original error if the replay
/// fails too. The token pair is owned by the caller's session record; any
/// rotation is written back into it.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self { client, base_url }
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.detail.or(b.message))
                .or_else(|| (!text.is_empty()).then(|| text));
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                detail,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::NetworkUnavailable(e.to_string()))
    }

    /// POST without authentication (login, refresh, link-by-key).
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read(resp).await
    }

    async fn send_get<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read(resp).await
    }

    async fn send_post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        access_token: &str,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read(resp).await
    }

    /// Exchange the refresh token for a new pair. Returns false when no
    /// refresh token is cached or the exchange fails.
    async fn try_refresh(&self, tokens: &mut TokenPair) -> bool {
        let Some(refresh) = tokens.refresh_token.clone() else {
            return false;
        };
        #[derive(Serialize)]
        struct RefreshReq<'a> {
            refresh_token: &'a str,
        }
        #[derive(Deserialize)]
        struct RefreshResp {
            access_token: String,
            refresh_token: String,
        }
        match self
            .post::<RefreshResp, _>("/api/auth/refresh", &RefreshReq { refresh_token: &refresh })
            .await
        {
            Ok(resp) => {
                tokens.access_token = resp.access_token;
                tokens.refresh_token = Some(resp.refresh_token);
                true
            }
            Err(e) => {
                tracing::debug!("token refresh failed: {}", e);
                false
            }
        }
    }

    pub async fn get_authed<T: DeserializeOwned>(
        &self,
        path: &str,
        tokens: &mut TokenPair,
    ) -> Result<T, ApiError> {
        match self.send_get(path, &tokens.access_token).await {
            Err(err) if err.is_auth_expired() => {
                if !self.try_refresh(tokens).await {
                    return Err(err);
                }
                match self.send_get(path, &tokens.access_token).await {
                    Ok(v) => Ok(v),
                    // The replay failed: surface the original error.
                    Err(_) => Err(err),
                }
            }
            other => other,
        }
    }

    pub async fn post_authed<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        tokens: &mut TokenPair,
    ) -> Result<T, ApiError> {
        match self.send_post(path, body, &tokens.access_token).await {
            Err(err) if err.is_auth_expired() => {
                if !self.try_refresh(tokens).await {
                    return Err(err);
                }
                match self.send_post(path, body, &tokens.access_token).await {
                    Ok(v) => Ok(v),
                    Err(_) => Err(err),
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_is_detected_in_detail() {
        let err = ApiError::HttpStatus {
            status: 402,
            detail: Some("Insufficient balance: need $4.00 more".into()),
        };
        assert!(err.is_insufficient_balance());

        let other = ApiError::HttpStatus {
            status: 404,
            detail: Some("Product not found".into()),
        };
        assert!(!other.is_insufficient_balance());
        assert!(!ApiError::Timeout.is_insufficient_balance());
    }

    #[test]
    fn transient_kinds() {
        assert!(ApiError::Timeout.is_transient());
        assert!(ApiError::NetworkUnavailable("dns".into()).is_transient());
        assert!(!ApiError::HttpStatus { status: 500, detail: None }.is_transient());
    }

    #[test]
    fn auth_expiry_is_401_only() {
        assert!(ApiError::HttpStatus { status: 401, detail: None }.is_auth_expired());
        assert!(!ApiError::HttpStatus { status: 403, detail: None }.is_auth_expired());
    }
}
