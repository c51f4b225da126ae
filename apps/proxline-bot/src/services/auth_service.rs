//! Credential bootstrap: by the time a dialogue handler runs, the session
//! either holds a token pair that has been presented to the backend this
//! turn, or the turn proceeds explicitly unauthenticated. No error from
//! this module reaches the conversation handler.

use std::sync::Arc;

use async_trait::async_trait;

use crate::api_client::{ApiClient, ApiError};
use crate::models::api::{AuthTokens, LoginTokens, Profile, TelegramAuthRequest};
use crate::session::{SessionRecord, TokenPair};

pub const SUPPORTED_LANGUAGES: [&str; 4] = ["en", "ru", "zh", "es"];
pub const DEFAULT_LANGUAGE: &str = "en";

/// First-contact `/start` payload. A payload is an access code iff it
/// contains a hyphen and is exactly 11 characters long; everything else is
/// a referral code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLink {
    AccessCode(String),
    Referral(String),
}

pub fn parse_start_payload(payload: &str) -> Option<DeepLink> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }
    if payload.len() == 11 && payload.contains('-') {
        Some(DeepLink::AccessCode(payload.to_ascii_uppercase()))
    } else {
        Some(DeepLink::Referral(payload.to_string()))
    }
}

/// Strict access-code check: `XXX-XXX-XXX`, 11 characters, hyphens at
/// positions 3 and 7, alphanumeric segments. Input is normalized to
/// uppercase.
pub fn parse_access_code(input: &str) -> Option<String> {
    let code = input.trim().to_ascii_uppercase();
    if code.len() != 11 {
        return None;
    }
    let bytes = code.as_bytes();
    if bytes[3] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let segments_ok = bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 3 || i == 7 || b.is_ascii_alphanumeric());
    segments_ok.then_some(code)
}

/// Map a Telegram language hint onto the backend's supported set.
pub fn normalize_language(hint: Option<&str>) -> &'static str {
    let Some(hint) = hint else {
        return DEFAULT_LANGUAGE;
    };
    let base = hint.split(['-', '_']).next().unwrap_or("").to_ascii_lowercase();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|l| **l == base)
        .copied()
        .unwrap_or(DEFAULT_LANGUAGE)
}

/// Auth endpoints the credential manager drives. A trait so tests can
/// script outcomes without a live backend.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn login_by_access_code(&self, access_code: &str) -> Result<LoginTokens, ApiError>;
    async fn telegram_auth(&self, req: &TelegramAuthRequest) -> Result<AuthTokens, ApiError>;
    /// Profile fetch with the gateway's usual refresh-and-replay policy;
    /// a rotated pair is written back into `tokens`.
    async fn fetch_profile(&self, tokens: &mut TokenPair) -> Result<Profile, ApiError>;
}

pub struct ApiAuthGateway {
    api: ApiClient,
}

impl ApiAuthGateway {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl AuthGateway for ApiAuthGateway {
    async fn login_by_access_code(&self, access_code: &str) -> Result<LoginTokens, ApiError> {
        #[derive(serde::Serialize)]
        struct LoginReq<'a> {
            access_code: &'a str,
        }
        self.api.post("/api/auth/login", &LoginReq { access_code }).await
    }

    async fn telegram_auth(&self, req: &TelegramAuthRequest) -> Result<AuthTokens, ApiError> {
        self.api.post("/api/auth/telegram-auth", req).await
    }

    async fn fetch_profile(&self, tokens: &mut TokenPair) -> Result<Profile, ApiError> {
        self.api.get_authed("/api/user/profile", tokens).await
    }
}

pub struct AuthOutcome {
    pub profile: Option<Profile>,
    pub authenticated: bool,
}

impl AuthOutcome {
    fn unauthenticated() -> Self {
        Self {
            profile: None,
            authenticated: false,
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    gateway: Arc<dyn AuthGateway>,
}

impl AuthService {
    pub fn new(gateway: Arc<dyn AuthGateway>) -> Self {
        Self { gateway }
    }

    /// Resolve authentication for one turn, in strict priority order:
    /// deep-link access-code login, cached-token validation, registration
    /// by telegram identity. Mutates the session record; the caller
    /// persists it once at the end of the turn.
    pub async fn ensure_authenticated(
        &self,
        record: &mut SessionRecord,
        identity: i64,
        username: Option<&str>,
        display_name: &str,
        language_hint: Option<&str>,
        deep_link: Option<&DeepLink>,
    ) -> AuthOutcome {
        // A referral deep link is captured exactly once and persisted
        // before any network call, so a failed registration retry keeps it.
        if let Some(DeepLink::Referral(code)) = deep_link {
            if record.referral_code.is_none() {
                record.referral_code = Some(code.clone());
            }
        }

        // 1. Deep-link access-code login.
        if record.access_token.is_none() {
            if let Some(DeepLink::AccessCode(code)) = deep_link {
                match self.gateway.login_by_access_code(code).await {
                    Ok(t) => {
                        record.access_token = Some(t.access_token);
                        record.refresh_token = Some(t.refresh_token);
                        record.access_code = Some(code.clone());
                    }
                    Err(e) => {
                        tracing::info!("access-code login failed for {}: {}", identity, e);
                    }
                }
            }
        }

        // 2. Cached-token validation via the profile endpoint.
        if let Some(mut tokens) = record.tokens() {
            match self.gateway.fetch_profile(&mut tokens).await {
                Ok(profile) => {
                    record.store_tokens(&tokens);
                    if record.access_code.is_none() {
                        record.access_code = Some(profile.access_code.clone());
                    }
                    return AuthOutcome {
                        profile: Some(profile),
                        authenticated: true,
                    };
                }
                Err(e) => {
                    tracing::info!("cached token rejected for {}: {}", identity, e);
                    record.access_token = None;
                    record.refresh_token = None;
                }
            }
        }

        // 3. Registration/login by telegram identity. Stale tokens are
        // already gone at this point.
        let req = TelegramAuthRequest {
            telegram_id: identity,
            username: username.unwrap_or(display_name).to_string(),
            language: normalize_language(language_hint).to_string(),
            referral_code: record.referral_code.clone(),
        };
        match self.gateway.telegram_auth(&req).await {
            Ok(t) => {
                let mut tokens = TokenPair {
                    access_token: t.access_token,
                    refresh_token: Some(t.refresh_token),
                };
                record.store_tokens(&tokens);
                record.access_code = Some(t.access_code);
                if t.is_new_user {
                    tracing::info!("registered new account for {}", identity);
                }
                let profile = match self.gateway.fetch_profile(&mut tokens).await {
                    Ok(p) => Some(p),
                    Err(e) => {
                        tracing::warn!("profile fetch after registration failed: {}", e);
                        None
                    }
                };
                record.store_tokens(&tokens);
                AuthOutcome {
                    profile,
                    authenticated: true,
                }
            }
            Err(e) => {
                tracing::warn!("telegram auth failed for {}: {}", identity, e);
                record.clear_auth();
                AuthOutcome::unauthenticated()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CallLog {
        logins: Vec<String>,
        auths: Vec<TelegramAuthRequest>,
        profile_fetches: usize,
    }

    /// Scripted gateway: decides outcomes per call kind and records the
    /// calls made.
    struct FakeGateway {
        log: Mutex<CallLog>,
        login_ok: bool,
        auth_ok: bool,
        profile_ok_for: Option<&'static str>,
    }

    impl FakeGateway {
        fn new() -> Self {
            Self {
                log: Mutex::new(CallLog::default()),
                login_ok: true,
                auth_ok: true,
                profile_ok_for: None,
            }
        }

        fn profile(code: &str) -> Profile {
            Profile {
                user_id: 1,
                access_code: code.to_string(),
                balance: 12.5,
                language: Some("en".into()),
                referal_quantity: 0,
            }
        }
    }

    #[async_trait]
    impl AuthGateway for FakeGateway {
        async fn login_by_access_code(&self, access_code: &str) -> Result<LoginTokens, ApiError> {
            self.log.lock().unwrap().logins.push(access_code.to_string());
            if self.login_ok {
                Ok(LoginTokens {
                    access_token: "login-at".into(),
                    refresh_token: "login-rt".into(),
                })
            } else {
                Err(ApiError::HttpStatus { status: 404, detail: Some("code not found".into()) })
            }
        }

        async fn telegram_auth(&self, req: &TelegramAuthRequest) -> Result<AuthTokens, ApiError> {
            self.log.lock().unwrap().auths.push(req.clone());
            if self.auth_ok {
                Ok(AuthTokens {
                    access_token: "reg-at".into(),
                    refresh_token: "reg-rt".into(),
                    access_code: "NEW-ACC-123".into(),
                    is_new_user: true,
                })
            } else {
                Err(ApiError::HttpStatus { status: 500, detail: None })
            }
        }

        async fn fetch_profile(&self, tokens: &mut TokenPair) -> Result<Profile, ApiError> {
            self.log.lock().unwrap().profile_fetches += 1;
            match self.profile_ok_for {
                Some(expected) if tokens.access_token == expected => {
                    Ok(Self::profile("ABC-123-XYZ"))
                }
                Some(_) => Err(ApiError::HttpStatus { status: 401, detail: None }),
                None => Ok(Self::profile("ABC-123-XYZ")),
            }
        }
    }

    fn service(gw: FakeGateway) -> (AuthService, Arc<FakeGateway>) {
        let gw = Arc::new(gw);
        (AuthService::new(gw.clone()), gw)
    }

    #[test]
    fn start_payload_classification() {
        assert_eq!(
            parse_start_payload("abc-123-xyz"),
            Some(DeepLink::AccessCode("ABC-123-XYZ".into()))
        );
        assert_eq!(
            parse_start_payload("ref2024"),
            Some(DeepLink::Referral("ref2024".into()))
        );
        // 10 chars with a hyphen is a referral, not an access code.
        assert_eq!(
            parse_start_payload("abc-123-xy"),
            Some(DeepLink::Referral("abc-123-xy".into()))
        );
        assert_eq!(parse_start_payload("   "), None);
    }

    #[test]
    fn access_code_format() {
        assert_eq!(parse_access_code("ABC-123-XYZ"), Some("ABC-123-XYZ".into()));
        assert_eq!(parse_access_code("abc-123-xyz"), Some("ABC-123-XYZ".into()));
        assert_eq!(parse_access_code("abc-123-xy"), None);
        assert_eq!(parse_access_code("abcd123-xyz"), None);
        assert_eq!(parse_access_code("ab!-123-xyz"), None);
        assert_eq!(parse_access_code("abc-123-xy-"), None);
    }

    #[test]
    fn language_normalization() {
        assert_eq!(normalize_language(Some("en")), "en");
        assert_eq!(normalize_language(Some("ru-RU")), "ru");
        assert_eq!(normalize_language(Some("pt-BR")), "en");
        assert_eq!(normalize_language(None), "en");
    }

    #[tokio::test]
    async fn first_contact_with_referral_registers() {
        let (svc, gw) = service(FakeGateway::new());
        let mut rec = SessionRecord::default();
        let link = DeepLink::Referral("ref2024".into());
        let out = svc
            .ensure_authenticated(&mut rec, 42, Some("bob"), "Bob", Some("en"), Some(&link))
            .await;

        assert!(out.authenticated);
        assert_eq!(rec.access_code.as_deref(), Some("NEW-ACC-123"));
        assert_eq!(rec.referral_code.as_deref(), Some("ref2024"));
        let log = gw.log.lock().unwrap();
        assert!(log.logins.is_empty());
        assert_eq!(log.auths.len(), 1);
        assert_eq!(log.auths[0].referral_code.as_deref(), Some("ref2024"));
    }

    #[tokio::test]
    async fn first_contact_with_access_code_logs_in_not_registers() {
        let mut gw = FakeGateway::new();
        gw.profile_ok_for = Some("login-at");
        let (svc, gw) = service(gw);
        let mut rec = SessionRecord::default();
        let link = DeepLink::AccessCode("ABC-123-XYZ".into());
        let out = svc
            .ensure_authenticated(&mut rec, 42, None, "Bob", None, Some(&link))
            .await;

        assert!(out.authenticated);
        assert_eq!(rec.access_token.as_deref(), Some("login-at"));
        assert_eq!(rec.access_code.as_deref(), Some("ABC-123-XYZ"));
        let log = gw.log.lock().unwrap();
        assert_eq!(log.logins, vec!["ABC-123-XYZ".to_string()]);
        assert!(log.auths.is_empty());
    }

    #[tokio::test]
    async fn cached_token_never_triggers_registration() {
        let mut gw = FakeGateway::new();
        gw.profile_ok_for = Some("cached-at");
        let (svc, gw) = service(gw);
        let mut rec = SessionRecord {
            access_token: Some("cached-at".into()),
            refresh_token: Some("cached-rt".into()),
            ..Default::default()
        };
        let out = svc
            .ensure_authenticated(&mut rec, 42, None, "Bob", None, None)
            .await;

        assert!(out.authenticated);
        assert!(out.profile.is_some());
        let log = gw.log.lock().unwrap();
        assert!(log.auths.is_empty());
        assert!(log.logins.is_empty());
        assert_eq!(log.profile_fetches, 1);
    }

    #[tokio::test]
    async fn wiped_session_reregisters_without_deep_link() {
        // Mid-conversation turn after the store lost the record: no /start
        // payload, no cached token. Registration by identity must kick in.
        let (svc, gw) = service(FakeGateway::new());
        let mut rec = SessionRecord::default();
        let out = svc
            .ensure_authenticated(&mut rec, 42, Some("bob"), "Bob", None, None)
            .await;

        assert!(out.authenticated);
        assert!(rec.access_token.is_some());
        assert_eq!(rec.access_code.as_deref(), Some("NEW-ACC-123"));
        let log = gw.log.lock().unwrap();
        assert_eq!(log.auths.len(), 1);
        assert!(log.logins.is_empty());
    }

    #[tokio::test]
    async fn ensure_twice_performs_no_extra_auth_calls() {
        let (svc, gw) = service(FakeGateway::new());
        let mut rec = SessionRecord {
            access_token: Some("cached-at".into()),
            ..Default::default()
        };
        svc.ensure_authenticated(&mut rec, 42, None, "Bob", None, None).await;
        svc.ensure_authenticated(&mut rec, 42, None, "Bob", None, None).await;
        let log = gw.log.lock().unwrap();
        assert_eq!(log.profile_fetches, 2);
        assert!(log.auths.is_empty());
        assert!(log.logins.is_empty());
    }

    #[tokio::test]
    async fn failed_registration_clears_all_auth_fields_together() {
        let mut gw = FakeGateway::new();
        gw.auth_ok = false;
        // Stale token so validation fails too.
        gw.profile_ok_for = Some("something-else");
        let (svc, _) = service(gw);
        let mut rec = SessionRecord {
            access_token: Some("stale-at".into()),
            refresh_token: Some("stale-rt".into()),
            access_code: Some("OLD-ACC-111".into()),
            ..Default::default()
        };
        let out = svc
            .ensure_authenticated(&mut rec, 42, None, "Bob", None, None)
            .await;

        assert!(!out.authenticated);
        assert!(out.profile.is_none());
        assert!(rec.access_token.is_none());
        assert!(rec.refresh_token.is_none());
        assert!(rec.access_code.is_none());
    }

    #[tokio::test]
    async fn referral_code_survives_failed_registration() {
        let mut gw = FakeGateway::new();
        gw.auth_ok = false;
        let (svc, _) = service(gw);
        let mut rec = SessionRecord::default();
        let link = DeepLink::Referral("keepme".into());
        let out = svc
            .ensure_authenticated(&mut rec, 42, None, "Bob", None, Some(&link))
            .await;
        assert!(!out.authenticated);
        assert_eq!(rec.referral_code.as_deref(), Some("keepme"));
    }

    #[tokio::test]
    async fn failed_access_code_login_falls_through_to_registration() {
        let mut gw = FakeGateway::new();
        gw.login_ok = false;
        let (svc, gw) = service(gw);
        let mut rec = SessionRecord::default();
        let link = DeepLink::AccessCode("BAD-COD-E11".into());
        let out = svc
            .ensure_authenticated(&mut rec, 42, None, "Bob", None, Some(&link))
            .await;

        assert!(out.authenticated);
        let log = gw.log.lock().unwrap();
        assert_eq!(log.logins.len(), 1);
        assert_eq!(log.auths.len(), 1);
    }
}
