use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bbs_session::{
    memory_store::{MemoryError, MemoryIdentityProvider, MemoryProfileStore},
    AuthEvent, AuthEventKind, AuthEventStream, AuthResponse, Credentials, Decision,
    IdentityProvider, NavigationGuard, Profile, Redirect, Role, RouteTable, Session, SessionStore,
    SessionUser, UserId,
};
use tokio::sync::Semaphore;

/// Holds `get_current_session` until the gate is opened.
#[derive(Debug, Clone)]
struct GatedProvider {
    inner: MemoryIdentityProvider,
    gate: Arc<Semaphore>,
}

impl GatedProvider {
    fn new(inner: MemoryIdentityProvider) -> Self {
        Self {
            inner,
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    fn open(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl IdentityProvider for GatedProvider {
    type Error = MemoryError;

    async fn get_current_session(&self) -> Result<Option<Session>, Self::Error> {
        let _permit = self.gate.acquire().await.unwrap();
        self.inner.get_current_session().await
    }

    fn subscribe(&self) -> AuthEventStream {
        self.inner.subscribe()
    }

    async fn sign_in(&self, creds: Credentials) -> Result<AuthResponse, Self::Error> {
        self.inner.sign_in(creds).await
    }

    async fn sign_up(&self, creds: Credentials) -> Result<AuthResponse, Self::Error> {
        self.inner.sign_up(creds).await
    }

    async fn sign_out(&self) -> Result<(), Self::Error> {
        self.inner.sign_out().await
    }
}

fn ferris() -> Session {
    Session::new("ferris-token", SessionUser::new("ferris", "ferris@example.com"))
}

fn corro() -> Session {
    Session::new("corro-token", SessionUser::new("corro", "corro@example.com"))
}

async fn profiles() -> MemoryProfileStore {
    let profiles = MemoryProfileStore::new();
    profiles
        .insert(Profile::new("ferris", Role::Admin).with_nickname("Ferris"))
        .await;
    profiles
}

#[tokio::test]
async fn navigation_waits_for_initialization() {
    let memory = MemoryIdentityProvider::new();
    memory.restore(ferris()).await;
    let provider = GatedProvider::new(memory);

    let titles = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let titles = titles.clone();
        move |title: &str| titles.lock().unwrap().push(title.to_owned())
    };

    let store = SessionStore::new(provider.clone(), profiles().await);
    let guard = NavigationGuard::new(store.clone(), RouteTable::blog()).with_title_sink(sink);

    let init = tokio::spawn({
        let store = store.clone();
        async move { store.init().await }
    });
    let navigation = tokio::spawn({
        let guard = guard.clone();
        async move { guard.navigate("/admin").await }
    });

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(store.is_loading());
    assert!(!navigation.is_finished());
    assert!(titles.lock().unwrap().is_empty());

    provider.open();
    init.await.unwrap();

    // Deciding early would have sent an anonymous visitor to the login page.
    assert_eq!(navigation.await.unwrap(), Decision::Proceed);
    assert_eq!(*titles.lock().unwrap(), vec!["Dashboard - My Blog".to_string()]);
}

#[tokio::test]
async fn profile_follows_session_through_events() {
    let provider = MemoryIdentityProvider::new();
    let store = SessionStore::new(provider.clone(), profiles().await);
    store.init().await;

    let mut observer = store.changes();
    let watcher = tokio::spawn(async move {
        let mut observed = 0;
        while observer.changed().await.is_ok() {
            let state = observer.borrow_and_update().clone();
            assert!(state.session.is_some() || state.profile.is_none());
            if let Some(ref profile) = state.profile {
                assert_eq!(
                    state.session.as_ref().and_then(Session::user_id),
                    Some(&profile.id)
                );
            }
            observed += 1;
        }
        observed
    });

    let mut changes = store.changes();

    provider.emit(AuthEvent::new(AuthEventKind::SignedIn, Some(ferris())));
    changes
        .wait_for(|state| state.facts().is_admin)
        .await
        .unwrap();
    assert_eq!(store.facts().display_name, "Ferris");

    provider.emit(AuthEvent::new(AuthEventKind::SignedIn, Some(corro())));
    changes
        .wait_for(|state| state.facts().user_email == "corro@example.com")
        .await
        .unwrap();
    assert!(!store.facts().is_admin);
    assert_eq!(store.facts().display_name, "corro");

    provider.emit(AuthEvent::new(AuthEventKind::SignedOut, None));
    changes
        .wait_for(|state| !state.facts().is_logged_in)
        .await
        .unwrap();
    assert!(store.snapshot().profile.is_none());

    provider.emit(AuthEvent::new(AuthEventKind::TokenRefreshed, Some(ferris())));
    changes
        .wait_for(|state| state.facts().is_admin)
        .await
        .unwrap();

    store.logout().await.unwrap();
    let state = store.snapshot();
    assert!(state.session.is_none());
    assert!(state.profile.is_none());

    store.shutdown();
    drop(changes);
    drop(store);

    assert!(watcher.await.unwrap() > 0);
}

#[tokio::test]
async fn login_and_logout_change_decisions() {
    let provider = MemoryIdentityProvider::new();
    provider
        .add_account("ferris", "ferris@example.com", "hunter42")
        .await;

    let store = SessionStore::new(provider, profiles().await);
    let guard = NavigationGuard::new(store.clone(), RouteTable::blog());
    store.init().await;

    let decision = guard.navigate("/admin/editor/5").await;
    let Decision::Redirect(ref redirect) = decision else {
        panic!("expected a redirect, got {decision:?}");
    };
    assert_eq!(
        redirect,
        &Redirect::to("Login").with_query("redirect", "/admin/editor/5")
    );
    assert_eq!(
        redirect.location(guard.routes()).as_deref(),
        Some("/login?redirect=%2Fadmin%2Feditor%2F5")
    );

    let err = store
        .login("ferris@example.com", "bogus")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        bbs_session::Error::Authentication(MemoryError::InvalidCredentials)
    ));
    assert!(!store.facts().is_logged_in);

    let response = store
        .login("ferris@example.com", "hunter42")
        .await
        .unwrap();
    assert_eq!(
        response.user.map(|user| user.id),
        Some(UserId::from("ferris"))
    );

    store
        .changes()
        .wait_for(|state| state.facts().is_admin)
        .await
        .unwrap();
    assert_eq!(guard.navigate("/admin/editor/5").await, Decision::Proceed);
    assert_eq!(
        guard.navigate("/login").await,
        Decision::Redirect(Redirect::to("Home"))
    );

    store.logout().await.unwrap();
    assert_eq!(
        guard.navigate("/admin").await,
        Decision::Redirect(Redirect::to("Login").with_query("redirect", "/admin"))
    );
    assert_eq!(guard.navigate("/login").await, Decision::Proceed);
}

#[tokio::test]
async fn registered_users_without_profile_are_not_admins() {
    let store = SessionStore::new(MemoryIdentityProvider::new(), MemoryProfileStore::new());
    let guard = NavigationGuard::new(store.clone(), RouteTable::blog());
    store.init().await;

    store
        .register("newbie@example.com", "hunter42")
        .await
        .unwrap();

    store
        .changes()
        .wait_for(|state| state.facts().is_logged_in)
        .await
        .unwrap();

    let facts = store.facts();
    assert!(!facts.is_admin);
    assert_eq!(facts.display_name, "newbie");
    assert!(store.snapshot().profile.is_none());

    assert_eq!(
        guard.navigate("/admin").await,
        Decision::Redirect(Redirect::to("Home"))
    );
    assert!(store
        .register("newbie@example.com", "other")
        .await
        .is_err());
}
