//! Session token persistence and identity side-reads.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kv::KeyValueStore;
use crate::store::IdentitySource;

const TOKENS_KEY: &str = "session:tokens";
const USER_KEY: &str = "session:user";

/// The persisted access/refresh token pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// The logged-in user, as reported by the auth endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Key-value-backed persistence for the session token pair and user
#[derive(Clone)]
pub struct TokenStore {
    kv: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn load(&self) -> Result<Option<TokenPair>> {
        match self.kv.get(TOKENS_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, tokens: &TokenPair) -> Result<()> {
        self.kv.set(TOKENS_KEY, &serde_json::to_string(tokens)?)
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        Ok(self.load()?.map(|pair| pair.access_token))
    }

    pub fn save_user(&self, user: &UserProfile) -> Result<()> {
        self.kv.set(USER_KEY, &serde_json::to_string(user)?)
    }

    pub fn current_user(&self) -> Result<Option<UserProfile>> {
        match self.kv.get(USER_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Drop both tokens and the stored user (logout / irrecoverable refresh)
    pub fn clear(&self) -> Result<()> {
        self.kv.remove(TOKENS_KEY)?;
        self.kv.remove(USER_KEY)
    }
}

/// [`IdentitySource`] over the token store, for organizer attribution
#[derive(Clone)]
pub struct SessionIdentity {
    tokens: TokenStore,
}

impl SessionIdentity {
    #[must_use]
    pub fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }
}

impl IdentitySource for SessionIdentity {
    fn current_user_id(&self) -> Option<String> {
        // Best-effort: storage errors read as "no session"
        self.tokens
            .current_user()
            .ok()
            .flatten()
            .map(|user| user.id)
    }
}

#[cfg(test)]
mod tests {
    use crate::kv::MemoryKeyValueStore;

    use super::*;

    fn setup() -> TokenStore {
        TokenStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    #[test]
    fn token_pair_debug_redacts_tokens() {
        let pair = TokenPair {
            access_token: "secret-access-token".to_string(),
            refresh_token: "secret-refresh-token".to_string(),
        };
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains("secret-access-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn save_load_clear_roundtrip() {
        let store = setup();
        assert!(store.load().unwrap().is_none());

        let pair = TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        };
        store.save(&pair).unwrap();
        assert_eq!(store.load().unwrap(), Some(pair));
        assert_eq!(store.access_token().unwrap().as_deref(), Some("a"));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn identity_reads_stored_user() {
        let store = setup();
        let identity = SessionIdentity::new(store.clone());
        assert_eq!(identity.current_user_id(), None);

        store
            .save_user(&UserProfile {
                id: "user-1".to_string(),
                email: Some("u@example.com".to_string()),
                name: None,
            })
            .unwrap();
        assert_eq!(identity.current_user_id(), Some("user-1".to_string()));

        store.clear().unwrap();
        assert_eq!(identity.current_user_id(), None);
    }
}
