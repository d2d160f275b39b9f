//! Token state and storage
//!
//! Tokens progress `Unauthorized -> Authorized -> AccessGranted`; the
//! store enforces the transitions atomically so an authorized token can
//! be exchanged exactly once. Two implementations: an in-memory map and
//! a JSON file store with restrictive permissions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{AuthWireError, Result};
use crate::types::{ConsumerKey, TokenIdentifier};

/// Lifecycle state of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// Issued but not yet approved by the resource owner
    Unauthorized,
    /// Approved by the resource owner, ready for exchange
    Authorized,
    /// Terminal: an access token, or a request token already consumed by
    /// a successful exchange
    AccessGranted,
}

/// A token with its secret and lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Provider-issued opaque identifier
    pub token: TokenIdentifier,
    /// Secret paired with the identifier
    pub secret: String,
    /// Current lifecycle state
    pub state: TokenState,
    /// The consumer this token belongs to
    pub consumer_key: ConsumerKey,
    /// Verifier captured at authorization time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,
}

impl IssuedToken {
    /// Create a freshly issued, unauthorized token
    #[must_use]
    pub fn unauthorized(
        token: TokenIdentifier,
        secret: String,
        consumer_key: ConsumerKey,
    ) -> Self {
        Self {
            token,
            secret,
            state: TokenState::Unauthorized,
            consumer_key,
            verifier: None,
        }
    }
}

/// Storage and state-machine enforcement for tokens.
///
/// `authorize` and `exchange` are atomic check-and-transition
/// operations; concurrent callers racing on the same token see exactly
/// one winner.
pub trait TokenStore: Send + Sync {
    /// Store a newly issued token
    ///
    /// # Errors
    /// Returns a token state error when the identifier is already
    /// present.
    fn insert(&self, token: IssuedToken) -> Result<()>;

    /// Look up a token by identifier
    ///
    /// # Errors
    /// Returns storage errors from the backing medium.
    fn get(&self, id: &str) -> Result<Option<IssuedToken>>;

    /// Transition a token from `Unauthorized` to `Authorized`, recording
    /// the verifier
    ///
    /// # Errors
    /// Returns a token state error when the token is unknown or not in
    /// the `Unauthorized` state.
    fn authorize(&self, id: &str, verifier: Option<String>) -> Result<()>;

    /// Consume an `Authorized` request token and store its access token.
    ///
    /// The request token becomes `AccessGranted` as a tombstone, so a
    /// second exchange attempt fails rather than re-entering the
    /// transition.
    ///
    /// # Errors
    /// Returns a token state error when the request token is unknown,
    /// not authorized, or already exchanged.
    fn exchange(&self, request_id: &str, access: IssuedToken) -> Result<()>;
}

fn apply_authorize(
    tokens: &mut HashMap<String, IssuedToken>,
    id: &str,
    verifier: Option<String>,
) -> Result<()> {
    let token = tokens
        .get_mut(id)
        .ok_or_else(|| AuthWireError::token_state(format!("unknown token {id:?}")))?;
    match token.state {
        TokenState::Unauthorized => {
            token.state = TokenState::Authorized;
            token.verifier = verifier;
            Ok(())
        }
        TokenState::Authorized => Err(AuthWireError::token_state(format!(
            "token {id:?} is already authorized"
        ))),
        TokenState::AccessGranted => Err(AuthWireError::token_state(format!(
            "token {id:?} has already been exchanged"
        ))),
    }
}

fn apply_exchange(
    tokens: &mut HashMap<String, IssuedToken>,
    request_id: &str,
    access: IssuedToken,
) -> Result<()> {
    let request = tokens
        .get_mut(request_id)
        .ok_or_else(|| AuthWireError::token_state(format!("unknown token {request_id:?}")))?;
    match request.state {
        TokenState::Authorized => {
            request.state = TokenState::AccessGranted;
            let access_id = access.token.as_str().to_string();
            tokens.insert(access_id, access);
            Ok(())
        }
        TokenState::Unauthorized => Err(AuthWireError::token_state(format!(
            "token {request_id:?} has not been authorized by the resource owner"
        ))),
        TokenState::AccessGranted => Err(AuthWireError::token_state(format!(
            "token {request_id:?} has already been exchanged"
        ))),
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory token store
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<String, IssuedToken>>,
}

impl InMemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn insert(&self, token: IssuedToken) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        let id = token.token.as_str().to_string();
        if tokens.contains_key(&id) {
            return Err(AuthWireError::token_state(format!(
                "token {id:?} is already stored"
            )));
        }
        tokens.insert(id, token);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<IssuedToken>> {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tokens.get(id).cloned())
    }

    fn authorize(&self, id: &str, verifier: Option<String>) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        apply_authorize(&mut tokens, id, verifier)
    }

    fn exchange(&self, request_id: &str, access: IssuedToken) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        apply_exchange(&mut tokens, request_id, access)
    }
}

// ============================================================================
// File-Backed Store
// ============================================================================

/// Token store persisting to a JSON file
///
/// Every successful mutation is flushed before returning, and the file
/// is created with owner-only permissions on Unix.
pub struct FileTokenStore {
    path: PathBuf,
    tokens: Mutex<HashMap<String, IssuedToken>>,
}

impl FileTokenStore {
    /// The default storage path (platform-specific config directory)
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("authwire")
            .join("tokens.json")
    }

    /// Open a store at the given path, loading existing state.
    ///
    /// A missing file yields an empty store; a corrupt file is an error.
    ///
    /// # Errors
    /// Returns I/O errors from reading and JSON errors from a corrupt
    /// file.
    pub fn open(path: PathBuf) -> Result<Self> {
        let tokens = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            tokens: Mutex::new(tokens),
        })
    }

    /// The storage path
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn persist(&self, tokens: &HashMap<String, IssuedToken>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(tokens)?;
        std::fs::write(&self.path, &content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn insert(&self, token: IssuedToken) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        let id = token.token.as_str().to_string();
        if tokens.contains_key(&id) {
            return Err(AuthWireError::token_state(format!(
                "token {id:?} is already stored"
            )));
        }
        tokens.insert(id, token);
        self.persist(&tokens)
    }

    fn get(&self, id: &str) -> Result<Option<IssuedToken>> {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tokens.get(id).cloned())
    }

    fn authorize(&self, id: &str, verifier: Option<String>) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        apply_authorize(&mut tokens, id, verifier)?;
        self.persist(&tokens)
    }

    fn exchange(&self, request_id: &str, access: IssuedToken) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        apply_exchange(&mut tokens, request_id, access)?;
        self.persist(&tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn issued(id: &str) -> IssuedToken {
        IssuedToken::unauthorized(
            TokenIdentifier::new(id),
            "secret".to_string(),
            ConsumerKey::new("consumer1"),
        )
    }

    #[test]
    fn test_state_machine_happy_path() {
        let store = InMemoryTokenStore::new();
        store.insert(issued("abc")).unwrap();
        store.authorize("abc", Some("verifier1".to_string())).unwrap();

        let authorized = store.get("abc").unwrap().unwrap();
        assert_eq!(authorized.state, TokenState::Authorized);
        assert_eq!(authorized.verifier.as_deref(), Some("verifier1"));

        let access = IssuedToken {
            token: TokenIdentifier::new("access1"),
            secret: "access-secret".to_string(),
            state: TokenState::AccessGranted,
            consumer_key: ConsumerKey::new("consumer1"),
            verifier: None,
        };
        store.exchange("abc", access).unwrap();

        assert_eq!(
            store.get("abc").unwrap().unwrap().state,
            TokenState::AccessGranted
        );
        assert_eq!(
            store.get("access1").unwrap().unwrap().state,
            TokenState::AccessGranted
        );
    }

    #[test]
    fn test_exchange_is_exactly_once() {
        let store = InMemoryTokenStore::new();
        store.insert(issued("abc")).unwrap();
        store.authorize("abc", None).unwrap();

        let access = IssuedToken {
            token: TokenIdentifier::new("access1"),
            secret: String::new(),
            state: TokenState::AccessGranted,
            consumer_key: ConsumerKey::new("consumer1"),
            verifier: None,
        };
        store.exchange("abc", access.clone()).unwrap();
        let err = store.exchange("abc", access).unwrap_err();
        assert!(matches!(err, AuthWireError::TokenState(_)));
    }

    #[test]
    fn test_exchange_requires_authorization() {
        let store = InMemoryTokenStore::new();
        store.insert(issued("abc")).unwrap();
        let access = IssuedToken {
            token: TokenIdentifier::new("access1"),
            secret: String::new(),
            state: TokenState::AccessGranted,
            consumer_key: ConsumerKey::new("consumer1"),
            verifier: None,
        };
        assert!(store.exchange("abc", access).is_err());
    }

    #[test]
    fn test_file_store_round_trip_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileTokenStore::open(path.clone()).unwrap();
        store.insert(issued("abc")).unwrap();
        store.authorize("abc", Some("v".to_string())).unwrap();
        drop(store);

        let reopened = FileTokenStore::open(path).unwrap();
        let token = reopened.get("abc").unwrap().unwrap();
        assert_eq!(token.state, TokenState::Authorized);
        assert_eq!(token.verifier.as_deref(), Some("v"));
    }

    #[test]
    fn test_file_store_missing_vs_corrupt() {
        let dir = TempDir::new().unwrap();
        // Missing file: empty store.
        let store = FileTokenStore::open(dir.path().join("absent.json")).unwrap();
        assert!(store.get("abc").unwrap().is_none());

        // Corrupt file: a typed error, not silent data loss.
        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{not json").unwrap();
        assert!(FileTokenStore::open(corrupt).is_err());
    }
}
