use std::{
    fmt::{self, Debug},
    future::Future,
    sync::{Arc, Mutex, OnceLock, PoisonError, Weak},
};

use futures::{
    channel::oneshot,
    future::{FutureExt, Shared},
    StreamExt,
};
use tokio::{
    sync::{watch, OnceCell},
    task::AbortHandle,
};

use crate::provider::{
    AuthEventStream, AuthResponse, Credentials, IdentityProvider, Profile, ProfileStore, Session,
    UserId,
};

/// An error type which maps identity provider errors.
#[derive(thiserror::Error)]
pub enum Error<Provider: IdentityProvider> {
    /// Sign-in, sign-up or sign-out was rejected by the provider.
    #[error(transparent)]
    Authentication(Provider::Error),
}

impl<Provider: IdentityProvider> Debug for Error<Provider> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Authentication(err) => write!(f, "{:?}", err)?,
        };

        Ok(())
    }
}

/// Why a profile couldn't be loaded. These are logged, never returned.
#[derive(thiserror::Error)]
pub enum ProfileLookupError<Store: ProfileStore> {
    /// The store has no profile for the user.
    #[error("no profile for user {0}")]
    NotFound(UserId),

    /// A mapping to `Store::Error`.
    #[error(transparent)]
    Store(Store::Error),
}

impl<Store: ProfileStore> Debug for ProfileLookupError<Store> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileLookupError::NotFound(id) => write!(f, "NotFound({:?})", id)?,
            ProfileLookupError::Store(err) => write!(f, "{:?}", err)?,
        };

        Ok(())
    }
}

/// A snapshot of the session store.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// The current session. `None` when signed out.
    pub session: Option<Session>,

    /// The profile of the session user. Always `None` when `session` is.
    pub profile: Option<Profile>,

    /// `true` until initialization completes; never set again afterwards.
    pub loading: bool,

    generation: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session: None,
            profile: None,
            loading: true,
            generation: 0,
        }
    }
}

impl SessionState {
    /// Derives the authorization facts for this snapshot.
    pub fn facts(&self) -> AuthFacts {
        let user_email = self
            .session
            .as_ref()
            .and_then(Session::email)
            .unwrap_or_default()
            .to_owned();

        let display_name = self
            .profile
            .as_ref()
            .and_then(|profile| profile.nickname.as_deref())
            .filter(|nickname| !nickname.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| user_email.split('@').next().unwrap_or_default().to_owned());

        AuthFacts {
            is_logged_in: self.session.is_some(),
            is_admin: self.profile.as_ref().is_some_and(Profile::is_admin),
            user_email,
            display_name,
        }
    }
}

/// Authorization facts derived from a [`SessionState`]. Never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthFacts {
    /// A session is present.
    pub is_logged_in: bool,

    /// The profile role is admin.
    pub is_admin: bool,

    /// Email of the session user, or empty.
    pub user_email: String,

    /// Nickname, else the local part of the email, else empty.
    pub display_name: String,
}

/// The client-side session store.
///
/// The store owns the current session, the matching profile and the loading
/// flag, and keeps them in sync with the identity provider. It is created
/// once at application start and shared by cloning: every clone refers to the
/// same state.
///
/// Call [`init`](Self::init) before routing anything. Until it completes the
/// store reports [`is_loading`](Self::is_loading) and
/// [`ready`](Self::ready) stays pending.
///
/// Profile fetches are tagged with the session generation they were issued
/// for. A fetch that completes after the session was replaced is discarded,
/// so a slow lookup for a previous user can never land on the current one.
/// Provider events replace the session as soon as they arrive; the lookups
/// they trigger run on their own tasks and never hold back later events.
///
/// Initialization has no timeout: a provider which never answers keeps the
/// store loading forever, and anything waiting on `ready` with it.
pub struct SessionStore<Provider: IdentityProvider, Profiles: ProfileStore> {
    inner: Arc<Inner<Provider, Profiles>>,
}

struct Inner<Provider: IdentityProvider, Profiles: ProfileStore> {
    provider: Provider,
    profiles: Profiles,
    state: watch::Sender<SessionState>,
    init: OnceCell<()>,
    ready_tx: Mutex<Option<oneshot::Sender<()>>>,
    ready: Shared<oneshot::Receiver<()>>,
    subscription: OnceLock<AbortHandle>,
}

impl<Provider: IdentityProvider, Profiles: ProfileStore> Clone for SessionStore<Provider, Profiles> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Provider: IdentityProvider, Profiles: ProfileStore> Debug for SessionStore<Provider, Profiles> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<Provider: IdentityProvider, Profiles: ProfileStore> SessionStore<Provider, Profiles> {
    /// Creates a store in the loading state.
    pub fn new(provider: Provider, profiles: Profiles) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (ready_tx, ready_rx) = oneshot::channel();

        Self {
            inner: Arc::new(Inner {
                provider,
                profiles,
                state,
                init: OnceCell::new(),
                ready_tx: Mutex::new(Some(ready_tx)),
                ready: ready_rx.shared(),
                subscription: OnceLock::new(),
            }),
        }
    }

    /// Loads the current session and its profile, subscribes to provider
    /// changes and clears the loading flag.
    ///
    /// Only the first call does any work; concurrent and later callers wait
    /// for that one run to finish. Returns without waiting for future
    /// provider events. Must be called from within a tokio runtime.
    pub async fn init(&self) {
        self.inner.init.get_or_init(|| self.inner.bootstrap()).await;
    }

    /// Loads the profile for `user_id` into the store.
    ///
    /// Failures leave the store authenticated but profile-less and are only
    /// logged. The result is dropped if the session no longer belongs to
    /// `user_id` by the time the lookup completes.
    pub async fn fetch_profile(&self, user_id: &UserId) {
        let generation = self.inner.state.borrow().generation;
        self.inner.fetch_profile(user_id, generation).await;
    }

    /// Signs in with the provider.
    ///
    /// The store itself is updated once the provider publishes the change.
    #[tracing::instrument(level = "debug", skip_all, fields(user.id), err)]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, Error<Provider>> {
        let response = self
            .inner
            .provider
            .sign_in(Credentials::new(email, password))
            .await
            .map_err(Error::Authentication)?;

        if let Some(ref user) = response.user {
            tracing::Span::current().record("user.id", user.id.to_string());
        }

        Ok(response)
    }

    /// Creates an account with the provider. Same contract as
    /// [`login`](Self::login).
    #[tracing::instrument(level = "debug", skip_all, fields(user.id), err)]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, Error<Provider>> {
        let response = self
            .inner
            .provider
            .sign_up(Credentials::new(email, password))
            .await
            .map_err(Error::Authentication)?;

        if let Some(ref user) = response.user {
            tracing::Span::current().record("user.id", user.id.to_string());
        }

        Ok(response)
    }

    /// Signs out with the provider and clears the session and profile right
    /// away, without waiting for the provider's notification.
    ///
    /// On failure the store is left untouched.
    #[tracing::instrument(level = "debug", skip_all, fields(user.id), err)]
    pub async fn logout(&self) -> Result<(), Error<Provider>> {
        let user_id = self
            .inner
            .state
            .borrow()
            .session
            .as_ref()
            .and_then(Session::user_id)
            .cloned();
        if let Some(user_id) = user_id {
            tracing::Span::current().record("user.id", user_id.to_string());
        }

        self.inner
            .provider
            .sign_out()
            .await
            .map_err(Error::Authentication)?;

        self.inner.replace_session(None);

        Ok(())
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Returns the authorization facts for the current state.
    pub fn facts(&self) -> AuthFacts {
        self.inner.state.borrow().facts()
    }

    /// Returns `true` until initialization has completed.
    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    /// Resolves once initialization has completed. Resolves immediately
    /// afterwards.
    pub fn ready(&self) -> impl Future<Output = ()> + Send + 'static {
        let ready = self.inner.ready.clone();
        async move {
            if ready.await.is_err() {
                tracing::warn!("initialization was abandoned before it completed");
            }
        }
    }

    /// Returns a receiver which observes every state change.
    pub fn changes(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Stops listening to provider changes. The state is kept as is.
    pub fn shutdown(&self) {
        if let Some(subscription) = self.inner.subscription.get() {
            subscription.abort();
        }
    }

    /// Returns the identity provider.
    pub fn provider(&self) -> &Provider {
        &self.inner.provider
    }
}

impl<Provider: IdentityProvider, Profiles: ProfileStore> Inner<Provider, Profiles> {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn bootstrap(self: &Arc<Self>) {
        let session = match self.provider.get_current_session().await {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(err = %err, "could not get the current session");
                None
            }
        };

        self.apply_session(session).await;

        let events = self.provider.subscribe();
        let task = tokio::spawn(watch_auth_changes(Arc::downgrade(self), events));
        let _ = self.subscription.set(task.abort_handle());

        self.state.send_modify(|state| state.loading = false);

        let ready_tx = self
            .ready_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(ready_tx) = ready_tx {
            let _ = ready_tx.send(());
        }

        tracing::debug!("session store initialized");
    }

    async fn apply_session(&self, session: Option<Session>) {
        let user_id = session.as_ref().and_then(Session::user_id).cloned();
        let generation = self.replace_session(session);

        if let Some(ref user_id) = user_id {
            self.fetch_profile(user_id, generation).await;
        }
    }

    /// Swaps in a new session and returns its generation. The profile is kept
    /// only if it still belongs to the new session's user.
    fn replace_session(&self, session: Option<Session>) -> u64 {
        let mut generation = 0;

        self.state.send_modify(|state| {
            state.generation += 1;
            generation = state.generation;

            let user_id = session.as_ref().and_then(Session::user_id);
            if state.profile.as_ref().map(|profile| &profile.id) != user_id {
                state.profile = None;
            }

            state.session = session;
        });

        generation
    }

    async fn fetch_profile(&self, user_id: &UserId, generation: u64) {
        let profile = lookup_profile(&self.profiles, user_id).await;
        self.apply_profile(user_id, generation, profile);
    }

    fn apply_profile(&self, user_id: &UserId, generation: u64, profile: Option<Profile>) {
        let applied = self.state.send_if_modified(|state| {
            let current = state.session.as_ref().and_then(Session::user_id);
            if state.generation != generation || current != Some(user_id) {
                return false;
            }

            state.profile = profile;
            true
        });

        if !applied {
            tracing::debug!(user.id = %user_id, "discarding profile fetched for a replaced session");
        }
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(user.id = %user_id))]
async fn lookup_profile<Profiles: ProfileStore>(
    profiles: &Profiles,
    user_id: &UserId,
) -> Option<Profile> {
    match profiles.get_by_id(user_id).await {
        Ok(Some(profile)) => Some(profile),
        Ok(None) => {
            let err = ProfileLookupError::<Profiles>::NotFound(user_id.clone());
            tracing::warn!(err = %err, "failed to fetch profile");
            None
        }
        Err(err) => {
            let err = ProfileLookupError::<Profiles>::Store(err);
            tracing::warn!(err = %err, "failed to fetch profile");
            None
        }
    }
}

impl<Provider: IdentityProvider, Profiles: ProfileStore> Drop for Inner<Provider, Profiles> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get() {
            subscription.abort();
        }
    }
}

async fn watch_auth_changes<Provider, Profiles>(
    inner: Weak<Inner<Provider, Profiles>>,
    mut events: AuthEventStream,
) where
    Provider: IdentityProvider,
    Profiles: ProfileStore,
{
    while let Some(event) = events.next().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };

        tracing::debug!(kind = ?event.kind, "auth state changed");

        // The session is replaced right away; the profile follows on its own
        // task so a slow lookup never holds back later events.
        let user_id = event.session.as_ref().and_then(Session::user_id).cloned();
        let generation = inner.replace_session(event.session);

        if let Some(user_id) = user_id {
            let profiles = inner.profiles.clone();
            let weak = Arc::downgrade(&inner);
            tokio::spawn(async move {
                let profile = lookup_profile(&profiles, &user_id).await;
                if let Some(inner) = weak.upgrade() {
                    inner.apply_profile(&user_id, generation, profile);
                }
            });
        }
    }

    tracing::debug!("auth change subscription ended");
}
