//! Per-identity session records and the keyed store behind them.
//!
//! The store contract assumes the dispatcher delivers updates for one
//! identity sequentially; handlers do a single `get` at the start of a turn
//! and a single `put` at the end, so auth-field clears are atomic with
//! respect to dialogue updates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::bot::dialogue::{DialogueData, DialogueState};

/// Bearer credentials for one turn. Owned by the session record; the
/// gateway mutates it in place when a transparent refresh rotates the pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Backend-issued account key (`XXX-XXX-XXX`), cached for display.
    pub access_code: Option<String>,
    /// Captured once from a first-contact deep link; persisted so a failed
    /// registration retry does not lose it.
    pub referral_code: Option<String>,
    pub dialogue_state: DialogueState,
    pub dialogue_data: DialogueData,
}

impl SessionRecord {
    pub fn tokens(&self) -> Option<TokenPair> {
        self.access_token.as_ref().map(|access| TokenPair {
            access_token: access.clone(),
            refresh_token: self.refresh_token.clone(),
        })
    }

    pub fn store_tokens(&mut self, tokens: &TokenPair) {
        self.access_token = Some(tokens.access_token.clone());
        self.refresh_token = tokens.refresh_token.clone();
    }

    /// Clears the whole auth bundle together; a half-cleared session must
    /// never be observable.
    pub fn clear_auth(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.access_code = None;
    }

    /// Back to idle, dropping all flow-scoped data including filters.
    pub fn reset_dialogue(&mut self) {
        self.dialogue_state = DialogueState::Idle;
        self.dialogue_data = DialogueData::default();
    }

    /// Back to idle after a successful purchase: transient list bookkeeping
    /// goes away, the filter context stays for the "back to filter" button.
    pub fn reset_dialogue_keep_filter(&mut self) {
        let filter = self.dialogue_data.filter.clone();
        let family = self.dialogue_data.filter_family;
        self.dialogue_data = DialogueData::default();
        self.dialogue_data.filter = filter;
        self.dialogue_data.filter_family = family;
        self.dialogue_state = DialogueState::Idle;
    }
}

/// Keyed session store. Implementations must behave as a single record per
/// identity; `get` of an unknown identity yields a default record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, identity: i64) -> SessionRecord;
    async fn put(&self, identity: i64, record: SessionRecord);
}

/// Process-local store. The production deployment points this trait at a
/// durable keyed-value service; the record is serde-serializable for that
/// reason.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    inner: Arc<RwLock<HashMap<i64, SessionRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, identity: i64) -> SessionRecord {
        self.inner
            .read()
            .await
            .get(&identity)
            .cloned()
            .unwrap_or_default()
    }

    async fn put(&self, identity: i64, record: SessionRecord) {
        self.inner.write().await.insert(identity, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::dialogue::ProxyType;

    #[tokio::test]
    async fn unknown_identity_yields_default_record() {
        let store = InMemorySessionStore::new();
        let rec = store.get(1).await;
        assert_eq!(rec, SessionRecord::default());
        assert_eq!(rec.dialogue_state, DialogueState::Idle);
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemorySessionStore::new();
        let mut rec = SessionRecord::default();
        rec.access_token = Some("at".into());
        rec.referral_code = Some("ref123".into());
        store.put(7, rec.clone()).await;
        assert_eq!(store.get(7).await, rec);
        // Other identities are unaffected.
        assert_eq!(store.get(8).await, SessionRecord::default());
    }

    #[test]
    fn clear_auth_clears_all_three_fields_together() {
        let mut rec = SessionRecord {
            access_token: Some("at".into()),
            refresh_token: Some("rt".into()),
            access_code: Some("ABC-123-XYZ".into()),
            ..Default::default()
        };
        rec.clear_auth();
        assert!(rec.access_token.is_none());
        assert!(rec.refresh_token.is_none());
        assert!(rec.access_code.is_none());
    }

    #[test]
    fn reset_keep_filter_retains_context_and_family() {
        let mut rec = SessionRecord::default();
        rec.dialogue_data.filter.country = Some("US".into());
        rec.dialogue_data.filter_family = Some(ProxyType::Socks5);
        rec.dialogue_data.page = 3;
        rec.dialogue_data.list_message_ids = vec![10, 11, 12];
        rec.dialogue_state =
            DialogueState::Socks5(crate::bot::dialogue::Socks5State::ConfirmingPurchase);

        rec.reset_dialogue_keep_filter();
        assert_eq!(rec.dialogue_state, DialogueState::Idle);
        assert_eq!(rec.dialogue_data.filter.country.as_deref(), Some("US"));
        assert_eq!(rec.dialogue_data.filter_family, Some(ProxyType::Socks5));
        assert_eq!(rec.dialogue_data.page, 0);
        assert!(rec.dialogue_data.list_message_ids.is_empty());
    }
}
