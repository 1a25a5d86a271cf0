//! The pre-navigation guard.

mod config;
mod decision;

use std::{fmt, sync::Arc};

pub use config::GuardConfig;
pub use decision::{decide, page_title, Decision, Redirect};

use crate::{
    provider::{IdentityProvider, ProfileStore},
    route::{RouteTable, Target},
    store::SessionStore,
};

/// Receives the page title computed for every navigation.
pub trait TitleSink: Send + Sync {
    /// Applies the title, e.g. to the document.
    fn set_title(&self, title: &str);
}

impl<F> TitleSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn set_title(&self, title: &str) {
        (self)(title)
    }
}

/// A [`TitleSink`] that drops every title.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardTitle;

impl TitleSink for DiscardTitle {
    fn set_title(&self, _title: &str) {}
}

/// Intercepts route transitions and decides whether they may proceed.
///
/// Each navigation first waits for the [`SessionStore`] to finish
/// initializing, then applies the page title, then runs [`decide`] against
/// the store's current facts. Navigations are independent of each other and
/// nothing about a decision is kept.
///
/// # Examples
///
/// ```rust
/// use bbs_session::{
///     memory_store::{MemoryIdentityProvider, MemoryProfileStore},
///     Decision, NavigationGuard, Redirect, RouteTable, SessionStore,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = SessionStore::new(MemoryIdentityProvider::new(), MemoryProfileStore::new());
/// let guard = NavigationGuard::new(store.clone(), RouteTable::blog());
///
/// store.init().await;
///
/// assert_eq!(
///     guard.navigate("/admin").await,
///     Decision::Redirect(Redirect::to("Login").with_query("redirect", "/admin"))
/// );
/// assert_eq!(guard.navigate("/post/my-slug").await, Decision::Proceed);
/// # }
/// ```
pub struct NavigationGuard<Provider: IdentityProvider, Profiles: ProfileStore> {
    store: SessionStore<Provider, Profiles>,
    routes: Arc<RouteTable>,
    config: GuardConfig,
    title: Arc<dyn TitleSink>,
}

impl<Provider: IdentityProvider, Profiles: ProfileStore> Clone for NavigationGuard<Provider, Profiles> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            routes: self.routes.clone(),
            config: self.config.clone(),
            title: self.title.clone(),
        }
    }
}

impl<Provider: IdentityProvider, Profiles: ProfileStore> fmt::Debug
    for NavigationGuard<Provider, Profiles>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationGuard")
            .field("store", &self.store)
            .field("routes", &self.routes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<Provider: IdentityProvider, Profiles: ProfileStore> NavigationGuard<Provider, Profiles> {
    /// Creates a guard with the default configuration that discards titles.
    pub fn new(store: SessionStore<Provider, Profiles>, routes: RouteTable) -> Self {
        Self {
            store,
            routes: Arc::new(routes),
            config: GuardConfig::default(),
            title: Arc::new(DiscardTitle),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets where page titles go.
    pub fn with_title_sink(mut self, title: impl TitleSink + 'static) -> Self {
        self.title = Arc::new(title);
        self
    }

    /// Returns the route table.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Returns the configuration.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Decides a navigation to `to`.
    ///
    /// While the store is loading this waits for initialization to finish; it
    /// never decides on a partially initialized store.
    #[tracing::instrument(level = "debug", skip_all, fields(to = %to.full_path), ret)]
    pub async fn before_each(&self, to: &Target) -> Decision {
        if self.store.is_loading() {
            tracing::debug!("waiting for session initialization");
            self.store.ready().await;
        }

        // `ready` only resolves early if initialization was abandoned.
        debug_assert!(!self.store.is_loading(), "deciding on a loading store");

        self.title
            .set_title(&page_title(&to.meta, &self.config.site_name));

        decide(to, &self.store.facts(), &self.config)
    }

    /// Resolves `full_path` against the route table and decides it.
    ///
    /// Paths matching no route carry no restrictions and proceed.
    pub async fn navigate(&self, full_path: &str) -> Decision {
        let to = self
            .routes
            .resolve(full_path)
            .unwrap_or_else(|| Target::unmatched(full_path));

        self.before_each(&to).await
    }
}
