//! In-memory implementations of [`IdentityProvider`] and [`ProfileStore`].

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, RwLock};

use crate::provider::{
    AuthEvent, AuthEventKind, AuthEventStream, AuthResponse, Credentials, IdentityProvider,
    Profile, ProfileStore, Session, SessionUser, UserId,
};

const EVENT_CAPACITY: usize = 32;

/// Errors returned by [`MemoryIdentityProvider`].
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Unknown email or wrong password.
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// Sign-up for an email that already has an account.
    #[error("an account for {0} already exists")]
    AccountExists(String),
}

#[derive(Debug, Clone)]
struct Account {
    id: UserId,
    password: SecretString,
}

/// An ephemeral identity provider, useful for testing and demonstration
/// purposes.
///
/// Sessions are published to subscribers on sign-in, sign-up and sign-out,
/// like a remote provider would.
#[derive(Clone, Debug)]
pub struct MemoryIdentityProvider {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    current: Arc<RwLock<Option<Session>>>,
    events: broadcast::Sender<AuthEvent>,
    tokens: Arc<AtomicU64>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    /// Creates a provider with no accounts and no session.
    ///
    /// ```rust
    /// use bbs_session::memory_store::MemoryIdentityProvider;
    ///
    /// let provider = MemoryIdentityProvider::new();
    /// ```
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            accounts: Arc::default(),
            current: Arc::default(),
            events,
            tokens: Arc::default(),
        }
    }

    /// Adds an account without signing it in.
    pub async fn add_account(
        &self,
        id: impl Into<UserId>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) {
        let creds = Credentials::new(email, password);
        self.accounts.write().await.insert(
            creds.email,
            Account {
                id: id.into(),
                password: creds.password,
            },
        );
    }

    /// Makes `session` the current session without publishing anything, as if
    /// it had been persisted by an earlier visit.
    pub async fn restore(&self, session: Session) {
        *self.current.write().await = Some(session);
    }

    /// Publishes an event to every subscriber.
    pub fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn start_session(&self, user: SessionUser) -> Session {
        let token = self.tokens.fetch_add(1, Ordering::Relaxed);
        let session = Session::new(format!("{}.{}", user.id, token), user);

        *self.current.write().await = Some(session.clone());
        self.emit(AuthEvent::new(AuthEventKind::SignedIn, Some(session.clone())));

        session
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    type Error = MemoryError;

    async fn get_current_session(&self) -> Result<Option<Session>, Self::Error> {
        Ok(self.current.read().await.clone())
    }

    fn subscribe(&self) -> AuthEventStream {
        futures::stream::unfold(self.events.subscribe(), |mut events| async move {
            loop {
                match events.recv().await {
                    Ok(event) => return Some((event, events)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "auth event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    async fn sign_in(&self, creds: Credentials) -> Result<AuthResponse, Self::Error> {
        let account = self
            .accounts
            .read()
            .await
            .get(&creds.email)
            .cloned()
            .ok_or(MemoryError::InvalidCredentials)?;

        if account.password.expose_secret() != creds.password.expose_secret() {
            return Err(MemoryError::InvalidCredentials);
        }

        let user = SessionUser::new(account.id, creds.email);
        let session = self.start_session(user.clone()).await;

        Ok(AuthResponse {
            user: Some(user),
            session: Some(session),
        })
    }

    async fn sign_up(&self, creds: Credentials) -> Result<AuthResponse, Self::Error> {
        let user = {
            let mut accounts = self.accounts.write().await;
            if accounts.contains_key(&creds.email) {
                return Err(MemoryError::AccountExists(creds.email));
            }

            let id = UserId::new(format!("user-{}", accounts.len() + 1));
            accounts.insert(
                creds.email.clone(),
                Account {
                    id: id.clone(),
                    password: creds.password,
                },
            );

            SessionUser::new(id, creds.email)
        };

        let session = self.start_session(user.clone()).await;

        Ok(AuthResponse {
            user: Some(user),
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<(), Self::Error> {
        *self.current.write().await = None;
        self.emit(AuthEvent::new(AuthEventKind::SignedOut, None));

        Ok(())
    }
}

/// An ephemeral profile store.
#[derive(Clone, Debug, Default)]
pub struct MemoryProfileStore {
    inner: Arc<RwLock<HashMap<UserId, Profile>>>,
}

impl MemoryProfileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a profile.
    pub async fn insert(&self, profile: Profile) {
        self.inner.write().await.insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    type Error = Infallible;

    async fn get_by_id(&self, id: &UserId) -> Result<Option<Profile>, Self::Error> {
        Ok(self.inner.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Role;

    #[tokio::test]
    async fn test_sign_in() {
        let provider = MemoryIdentityProvider::new();
        provider
            .add_account("u1", "ferris@example.com", "hunter42")
            .await;

        let mut events = provider.subscribe();
        let response = provider
            .sign_in(Credentials::new("ferris@example.com", "hunter42"))
            .await
            .unwrap();

        assert_eq!(response.user, Some(SessionUser::new("u1", "ferris@example.com")));
        assert!(provider.get_current_session().await.unwrap().is_some());

        let event = events.next().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedIn);
        assert_eq!(
            event.session.as_ref().and_then(Session::user_id),
            Some(&UserId::from("u1"))
        );
    }

    #[tokio::test]
    async fn test_sign_in_failure() {
        let provider = MemoryIdentityProvider::new();
        provider
            .add_account("u1", "ferris@example.com", "hunter42")
            .await;

        let err = provider
            .sign_in(Credentials::new("ferris@example.com", "bogus"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidCredentials));

        let err = provider
            .sign_in(Credentials::new("nobody@example.com", "hunter42"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidCredentials));
        assert!(provider.get_current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_up() {
        let provider = MemoryIdentityProvider::new();

        let response = provider
            .sign_up(Credentials::new("ferris@example.com", "hunter42"))
            .await
            .unwrap();
        assert_eq!(
            response.user.map(|user| user.id),
            Some(UserId::from("user-1"))
        );

        let err = provider
            .sign_up(Credentials::new("ferris@example.com", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::AccountExists(email) if email == "ferris@example.com"));
    }

    #[tokio::test]
    async fn test_sign_out() {
        let provider = MemoryIdentityProvider::new();
        provider
            .restore(Session::new("t", SessionUser::new("u1", "ferris@example.com")))
            .await;

        let mut events = provider.subscribe();
        provider.sign_out().await.unwrap();

        assert!(provider.get_current_session().await.unwrap().is_none());
        let event = events.next().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedOut);
        assert!(event.session.is_none());
    }

    #[tokio::test]
    async fn test_profile_store() {
        let store = MemoryProfileStore::new();
        store.insert(Profile::new("u1", Role::Admin)).await;

        assert_eq!(
            store.get_by_id(&UserId::from("u1")).await.unwrap(),
            Some(Profile::new("u1", Role::Admin))
        );
        assert_eq!(store.get_by_id(&UserId::from("u2")).await.unwrap(), None);
    }
}
