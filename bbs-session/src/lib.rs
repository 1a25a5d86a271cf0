//! Client-side session state and route guarding for a blog/forum frontend.
//!
//! This crate keeps track of who is signed in, derives what they are allowed
//! to see, and decides route transitions accordingly. It is made of two
//! cooperating parts:
//!
//! 1. [`SessionStore`] owns the current session, the matching profile and a
//!    loading flag, and keeps them in sync with an identity provider,
//! 2. [`NavigationGuard`] runs before every route transition, waits for the
//!    store to finish loading and then proceeds or redirects.
//!
//! Identity and profile data come from collaborators: any service for which
//! [`IdentityProvider`] is implemented can hand out sessions, and any lookup
//! implementing [`ProfileStore`] can supply profiles. In-memory versions of
//! both live in [`memory_store`].
//!
//! # Profiles and roles
//!
//! A session only says that somebody is signed in. Whether they are an
//! administrator comes from their [`Profile`], which is fetched whenever the
//! session changes. When the profile can't be loaded the store stays signed
//! in without one; such users are never admins.
//!
//! # Routes
//!
//! Routes carry [`RouteMeta`]: a title and the `guest_only` and
//! `requires_admin` flags. The guard sends anonymous visitors of admin pages
//! to the login route (remembering where they wanted to go), non-admins to
//! the home route, and signed-in visitors of guest-only pages home as well.
//!
//! # Example
//!
//! ```rust
//! use bbs_session::{
//!     memory_store::{MemoryIdentityProvider, MemoryProfileStore},
//!     Decision, NavigationGuard, Profile, Redirect, Role, RouteTable, SessionStore,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let provider = MemoryIdentityProvider::new();
//! provider
//!     .add_account("ferris", "ferris@example.com", "hunter42")
//!     .await;
//!
//! let profiles = MemoryProfileStore::new();
//! profiles.insert(Profile::new("ferris", Role::Admin)).await;
//!
//! let store = SessionStore::new(provider, profiles);
//! let guard = NavigationGuard::new(store.clone(), RouteTable::blog());
//!
//! store.init().await;
//! assert_eq!(
//!     guard.navigate("/admin").await,
//!     Decision::Redirect(Redirect::to("Login").with_query("redirect", "/admin"))
//! );
//!
//! store.login("ferris@example.com", "hunter42").await.unwrap();
//!
//! // The store catches up once the provider publishes the new session.
//! let mut changes = store.changes();
//! changes
//!     .wait_for(|state| state.facts().is_admin)
//!     .await
//!     .unwrap();
//!
//! assert_eq!(guard.navigate("/admin").await, Decision::Proceed);
//! # }
//! ```

#![warn(
    clippy::all,
    nonstandard_style,
    future_incompatible,
    missing_debug_implementations
)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use guard::{
    decide, page_title, Decision, DiscardTitle, GuardConfig, NavigationGuard, Redirect, TitleSink,
};
pub use provider::{
    AuthEvent, AuthEventKind, AuthEventStream, AuthResponse, Credentials, IdentityProvider,
    Profile, ProfileStore, Role, Session, SessionUser, UserId,
};
pub use route::{Route, RouteMeta, RouteTable, Target};
pub use store::{AuthFacts, Error, ProfileLookupError, SessionState, SessionStore};

mod guard;
pub mod memory_store;
mod provider;
mod route;
mod store;
