use std::fmt::{self, Display};

use async_trait::async_trait;
use futures::stream::BoxStream;
use secrecy::{Secret, SecretString};
use serde::{Deserialize, Serialize};

/// A stream of identity provider change notifications.
pub type AuthEventStream = BoxStream<'static, AuthEvent>;

/// The identity provider's stable identifier for a user.
///
/// Profiles are keyed by this same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a new identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The user embedded in a provider session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Identifier of the user.
    pub id: UserId,

    /// Email the user signed up with, if the provider exposes it.
    pub email: Option<String>,
}

impl SessionUser {
    /// Creates a user with the given id and email.
    pub fn new(id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
        }
    }
}

/// Provider-issued proof of authentication.
///
/// The access token is opaque to this crate and is never printed.
#[derive(Debug, Clone)]
pub struct Session {
    /// The provider's access token.
    pub access_token: SecretString,

    /// The authenticated user. Providers may hand out sessions before a user
    /// record is attached, in which case this is `None`.
    pub user: Option<SessionUser>,
}

impl Session {
    /// Creates a session for the given user.
    pub fn new(access_token: impl Into<String>, user: SessionUser) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            user: Some(user),
        }
    }

    /// Returns the id of the embedded user, if any.
    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|user| &user.id)
    }

    /// Returns the email of the embedded user, if any.
    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().and_then(|user| user.email.as_deref())
    }
}

/// Authorization role attached to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A regular member.
    User,

    /// A site administrator.
    Admin,

    /// Any role this crate doesn't know about. Never grants admin access.
    #[serde(other)]
    Unknown,
}

/// Application-level record for an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Identifier shared with the session user.
    pub id: UserId,

    /// Optional display name.
    #[serde(default)]
    pub nickname: Option<String>,

    /// Role of the user; absent roles are treated as non-admin.
    #[serde(default)]
    pub role: Option<Role>,
}

impl Profile {
    /// Creates a profile with the given role and no nickname.
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            nickname: None,
            role: Some(role),
        }
    }

    /// Sets the nickname.
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Returns `true` when the role is [`Role::Admin`].
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

/// Email and password credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Account email.
    pub email: String,

    /// Account password.
    pub password: SecretString,
}

impl Credentials {
    /// Creates credentials from an email and a plaintext password.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Secret::new(password.into()),
        }
    }
}

/// What a successful sign-in or sign-up hands back.
#[derive(Debug, Clone, Default)]
pub struct AuthResponse {
    /// The user that was signed in or created.
    pub user: Option<SessionUser>,

    /// The new session. Sign-ups that await confirmation carry none.
    pub session: Option<Session>,
}

/// Kind of an identity provider change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    /// The session present when the subscription started.
    InitialSession,
    /// A user signed in.
    SignedIn,
    /// The user signed out.
    SignedOut,
    /// The access token was refreshed.
    TokenRefreshed,
    /// The user record changed.
    UserUpdated,
}

/// A change notification from the identity provider.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    /// What happened.
    pub kind: AuthEventKind,

    /// The session after the change, `None` when signed out.
    pub session: Option<Session>,
}

impl AuthEvent {
    /// Creates a new event.
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }
}

/// A remote service which authenticates users and owns their sessions.
///
/// The provider is treated as opaque: how it persists tokens or talks to its
/// backend is its own business. Sign-in and sign-up don't need to return
/// before the corresponding [`AuthEvent`] is published, but every session
/// change must eventually be published to all subscribers.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use bbs_session::{AuthEventStream, AuthResponse, Credentials, IdentityProvider, Session};
/// use futures::StreamExt;
///
/// #[derive(Debug, Clone)]
/// struct Anonymous;
///
/// #[async_trait]
/// impl IdentityProvider for Anonymous {
///     type Error = std::convert::Infallible;
///
///     async fn get_current_session(&self) -> Result<Option<Session>, Self::Error> {
///         Ok(None)
///     }
///
///     fn subscribe(&self) -> AuthEventStream {
///         futures::stream::empty().boxed()
///     }
///
///     async fn sign_in(&self, _creds: Credentials) -> Result<AuthResponse, Self::Error> {
///         Ok(AuthResponse::default())
///     }
///
///     async fn sign_up(&self, _creds: Credentials) -> Result<AuthResponse, Self::Error> {
///         Ok(AuthResponse::default())
///     }
///
///     async fn sign_out(&self) -> Result<(), Self::Error> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait IdentityProvider: Clone + Send + Sync + 'static {
    /// An error which can occur while talking to the provider.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the session the provider currently holds, if any.
    async fn get_current_session(&self) -> Result<Option<Session>, Self::Error>;

    /// Subscribes to session changes. The stream ends when the provider goes
    /// away.
    fn subscribe(&self) -> AuthEventStream;

    /// Signs in with an email and password.
    async fn sign_in(&self, creds: Credentials) -> Result<AuthResponse, Self::Error>;

    /// Creates an account with an email and password.
    async fn sign_up(&self, creds: Credentials) -> Result<AuthResponse, Self::Error>;

    /// Ends the current session.
    async fn sign_out(&self) -> Result<(), Self::Error>;
}

/// A lookup of profiles by user id.
///
/// `Ok(None)` means the user has no profile row.
#[async_trait]
pub trait ProfileStore: Clone + Send + Sync + 'static {
    /// An error which can occur during the lookup.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Gets the profile for the provided user.
    async fn get_by_id(&self, id: &UserId) -> Result<Option<Profile>, Self::Error>;
}
