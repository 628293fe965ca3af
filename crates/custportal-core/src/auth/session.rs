//! Session manager: the Anonymous / Authenticated state machine.
//!
//! Expiry is checked lazily, whenever [`SessionManager::is_authenticated`] or
//! [`SessionManager::restore_from_storage`] runs. Between checks the
//! in-memory session can be stale-valid, so callers re-check liveness before
//! making authorization decisions.
//!
//! Sign-ins and sign-outs move a generation counter forward. A sign-in records
//! the generation it started at and only commits if nothing else changed the
//! state while its request was in flight.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{CustomerRegistrationRequest, UsernamePassword};

use super::store::TokenStore;
use super::token::{self, Session, TokenError};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    MalformedToken(#[from] TokenError),

    #[error("Failed to persist token: {0:#}")]
    Storage(anyhow::Error),

    #[error("Sign-in was superseded by a later session change")]
    Superseded,
}

impl AuthError {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Api(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

pub struct SessionManager {
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    state: watch::Sender<Option<Session>>,
    generation: Mutex<u64>,
}

impl SessionManager {
    /// Create a manager in the Anonymous state, sharing the client's token store.
    ///
    /// Call [`restore_from_storage`](Self::restore_from_storage) once on start.
    pub fn new(api: ApiClient) -> Self {
        let store = Arc::clone(api.token_store());
        let (state, _) = watch::channel(None);
        Self {
            api,
            store,
            state,
            generation: Mutex::new(0),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        self.generation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new generation, invalidating any sign-in still in flight
    fn advance(&self) -> u64 {
        let mut generation = self.lock_generation();
        *generation += 1;
        *generation
    }

    /// The in-memory session, without re-checking expiry
    pub fn current(&self) -> Option<Session> {
        self.state.borrow().clone()
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.state.subscribe()
    }

    fn set_state(&self, session: Option<Session>) {
        self.state.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session;
                true
            }
        });
    }

    // =========================================================================
    // Sign-in / sign-out
    // =========================================================================

    /// Sign in with credentials, persisting the issued token.
    ///
    /// Network and rejection errors are returned unchanged and leave the state
    /// as it was.
    pub async fn sign_in(&self, credentials: &UsernamePassword) -> Result<Session, AuthError> {
        let generation = self.advance();
        debug!(username = %credentials.username, generation, "Signing in");

        let token = self.api.login(credentials).await?;
        let session = self.commit(generation, &token)?;
        info!(subject = %session.subject, "Signed in");
        Ok(session)
    }

    /// Register a new customer and sign in with the token issued for it.
    pub async fn sign_up(
        &self,
        registration: &CustomerRegistrationRequest,
    ) -> Result<Session, AuthError> {
        let generation = self.advance();
        debug!(email = %registration.email, generation, "Signing up");

        let token = self
            .api
            .create_customer(registration)
            .await?
            .ok_or(ApiError::MissingAuthorizationHeader)?;
        let session = self.commit(generation, &token)?;
        info!(subject = %session.subject, "Signed up");
        Ok(session)
    }

    fn commit(&self, started_at: u64, token: &str) -> Result<Session, AuthError> {
        let session = token::decode(token)?;

        let generation = self.lock_generation();
        if *generation != started_at {
            warn!(
                started_at,
                current = *generation,
                "Discarding sign-in result after a later session change"
            );
            return Err(AuthError::Superseded);
        }

        self.store.save(token).map_err(AuthError::Storage)?;
        self.set_state(Some(session.clone()));
        Ok(session)
    }

    /// Forget the token and return to Anonymous. Never fails.
    pub fn sign_out(&self) {
        {
            let mut generation = self.lock_generation();
            *generation += 1;

            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to clear stored token");
            }
            self.set_state(None);
        }
        info!("Signed out");
    }

    // =========================================================================
    // Liveness
    // =========================================================================

    /// Re-read the stored token and bring the in-memory state in line with it.
    fn check(&self) -> Option<Session> {
        loop {
            let token = match self.store.load() {
                Ok(Some(token)) => token,
                Ok(None) => {
                    self.set_state(None);
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stored token");
                    self.set_state(None);
                    return None;
                }
            };

            let session = match token::decode(&token) {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "Stored token is unreadable, treating as signed out");
                    self.set_state(None);
                    return None;
                }
            };

            if !session.is_expired() {
                self.set_state(Some(session.clone()));
                return Some(session);
            }

            debug!(subject = %session.subject, expired_at = %session.expires_at, "Session expired");
            if self.clear_expired(&token) {
                return None;
            }
            debug!("Stored token changed during expiry check, checking again");
        }
    }

    /// Clear `expired` from the store, unless a sign-in has replaced it since it
    /// was read. Returns false when the stored token changed.
    ///
    /// Runs under the generation lock so it cannot interleave with a commit.
    /// The generation is left alone: an in-flight sign-in stays valid.
    fn clear_expired(&self, expired: &str) -> bool {
        let _generation = self.lock_generation();
        match self.store.load() {
            Ok(Some(current)) if current != expired => return false,
            Ok(Some(_)) => {
                if let Err(e) = self.store.clear() {
                    warn!(error = %e, "Failed to clear expired token");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to re-read stored token"),
        }
        self.set_state(None);
        info!("Expired session cleared");
        true
    }

    /// True only if a stored token decodes and has not expired.
    ///
    /// An expired token is cleared as a side effect. Unreadable tokens count as
    /// signed out and are never reported as errors.
    pub fn is_authenticated(&self) -> bool {
        self.check().is_some()
    }

    /// Rebuild the session from a persisted token, if it is still usable.
    pub fn restore_from_storage(&self) -> Option<Session> {
        let session = self.check();
        match session {
            Some(ref s) => debug!(
                subject = %s.subject,
                minutes_left = s.minutes_until_expiry(),
                "Session restored"
            ),
            None => debug!("No session to restore"),
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::auth::token::tests::make_token;
    use crate::auth::MemoryTokenStore;

    fn manager_with(store: Arc<MemoryTokenStore>) -> SessionManager {
        let api = ApiClient::new("http://127.0.0.1:9", store).unwrap();
        SessionManager::new(api)
    }

    fn live_token(sub: &str) -> String {
        make_token(sub, &["ROLE_USER"], Utc::now().timestamp() + 3600)
    }

    #[test]
    fn test_restore_valid_token() {
        let store = Arc::new(MemoryTokenStore::with_token(live_token("jane@x.com")));
        let manager = manager_with(store);
        assert_eq!(manager.current(), None);

        let session = manager.restore_from_storage().unwrap();
        assert_eq!(session.subject, "jane@x.com");
        assert!(session.has_scope("ROLE_USER"));
        assert_eq!(manager.current(), Some(session));
        assert!(manager.is_authenticated());
    }

    #[test]
    fn test_expired_token_is_cleared() {
        let expired = make_token("jane@x.com", &["ROLE_USER"], Utc::now().timestamp() - 60);
        let store = Arc::new(MemoryTokenStore::with_token(expired));
        let manager = manager_with(Arc::clone(&store));

        assert!(!manager.is_authenticated());
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(manager.current(), None);
    }

    #[test]
    fn test_malformed_token_is_not_authenticated() {
        let store = Arc::new(MemoryTokenStore::with_token("only.two"));
        let manager = manager_with(store);

        assert!(!manager.is_authenticated());
        assert_eq!(manager.restore_from_storage(), None);
    }

    #[test]
    fn test_empty_store_is_anonymous() {
        let manager = manager_with(Arc::new(MemoryTokenStore::new()));
        assert!(!manager.is_authenticated());
        assert_eq!(manager.restore_from_storage(), None);
    }

    #[test]
    fn test_sign_out_is_idempotent() {
        let store = Arc::new(MemoryTokenStore::with_token(live_token("jane@x.com")));
        let manager = manager_with(Arc::clone(&store));
        assert!(manager.is_authenticated());

        manager.sign_out();
        assert!(!manager.is_authenticated());
        manager.sign_out();
        assert!(!manager.is_authenticated());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_check_picks_up_token_written_elsewhere() {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_with(Arc::clone(&store));
        assert!(!manager.is_authenticated());

        store.save(&live_token("bob@x.com")).unwrap();
        assert!(manager.is_authenticated());
        assert_eq!(manager.current().unwrap().subject, "bob@x.com");
    }

    #[test]
    fn test_subscribers_see_transitions() {
        let store = Arc::new(MemoryTokenStore::with_token(live_token("jane@x.com")));
        let manager = manager_with(store);
        let mut rx = manager.subscribe();

        manager.restore_from_storage();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_some());

        // Re-checking an unchanged session is not a transition
        manager.is_authenticated();
        assert!(!rx.has_changed().unwrap());

        manager.sign_out();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
    }

    #[test]
    fn test_commit_rejects_stale_generation() {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_with(Arc::clone(&store));

        let started_at = manager.advance();
        manager.sign_out();

        let result = manager.commit(started_at, &live_token("jane@x.com"));
        assert!(matches!(result, Err(AuthError::Superseded)));
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(manager.current(), None);
    }

    /// Store whose first `load` hands back `initial` and then swaps in
    /// `replacement`, as if a sign-in committed right after the read.
    struct SwappingStore {
        inner: MemoryTokenStore,
        replacement: Mutex<Option<String>>,
    }

    impl SwappingStore {
        fn new(initial: String, replacement: String) -> Self {
            Self {
                inner: MemoryTokenStore::with_token(initial),
                replacement: Mutex::new(Some(replacement)),
            }
        }
    }

    impl TokenStore for SwappingStore {
        fn save(&self, token: &str) -> anyhow::Result<()> {
            self.inner.save(token)
        }

        fn load(&self) -> anyhow::Result<Option<String>> {
            let token = self.inner.load()?;
            if let Some(replacement) = self.replacement.lock().unwrap().take() {
                self.inner.save(&replacement)?;
            }
            Ok(token)
        }

        fn clear(&self) -> anyhow::Result<()> {
            self.inner.clear()
        }
    }

    #[test]
    fn test_expiry_check_keeps_token_saved_meanwhile() {
        let expired = make_token("jane@x.com", &["ROLE_USER"], Utc::now().timestamp() - 60);
        let fresh = live_token("bob@x.com");
        let store = Arc::new(SwappingStore::new(expired, fresh.clone()));
        let api = ApiClient::new("http://127.0.0.1:9", store.clone()).unwrap();
        let manager = SessionManager::new(api);

        assert!(manager.is_authenticated());
        assert_eq!(store.load().unwrap(), Some(fresh));
        assert_eq!(manager.current().unwrap().subject, "bob@x.com");
    }

    #[test]
    fn test_expiry_check_does_not_supersede_sign_in() {
        let expired = make_token("jane@x.com", &["ROLE_USER"], Utc::now().timestamp() - 60);
        let store = Arc::new(MemoryTokenStore::with_token(expired));
        let manager = manager_with(Arc::clone(&store));

        let started_at = manager.advance();
        assert!(!manager.is_authenticated());
        assert_eq!(store.load().unwrap(), None);

        let session = manager.commit(started_at, &live_token("bob@x.com")).unwrap();
        assert_eq!(session.subject, "bob@x.com");
        assert!(manager.is_authenticated());
    }

    #[test]
    fn test_commit_rejects_malformed_token() {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_with(Arc::clone(&store));

        let started_at = manager.advance();
        let result = manager.commit(started_at, "not-a-token");
        assert!(matches!(result, Err(AuthError::MalformedToken(_))));
        assert_eq!(store.load().unwrap(), None);
    }
}
