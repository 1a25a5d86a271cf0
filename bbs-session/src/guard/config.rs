use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_SITE_NAME: &str = "My Blog";
pub(crate) const DEFAULT_LOGIN_ROUTE: &str = "Login";
pub(crate) const DEFAULT_HOME_ROUTE: &str = "Home";
pub(crate) const DEFAULT_REDIRECT_FIELD: &str = "redirect";

/// Settings for [`NavigationGuard`](super::NavigationGuard).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use bbs_session::GuardConfig;
///
/// let config = GuardConfig::from_json(r#"{ "siteName": "Ferris' Blog" }"#).unwrap();
/// assert_eq!(config.site_name, "Ferris' Blog");
/// assert_eq!(config.redirect_field, "redirect");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GuardConfig {
    /// Appended to every page title.
    pub site_name: String,

    /// Route anonymous visitors are sent to from admin pages.
    pub login_route: String,

    /// Route signed-in visitors are sent to when turned away.
    pub home_route: String,

    /// Query parameter carrying the originally requested path.
    pub redirect_field: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            site_name: DEFAULT_SITE_NAME.to_string(),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            home_route: DEFAULT_HOME_ROUTE.to_string(),
            redirect_field: DEFAULT_REDIRECT_FIELD.to_string(),
        }
    }
}

impl GuardConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the site name.
    pub fn site_name(mut self, site_name: impl Into<String>) -> Self {
        self.site_name = site_name.into();
        self
    }

    /// Sets the login route name.
    pub fn login_route(mut self, name: impl Into<String>) -> Self {
        self.login_route = name.into();
        self
    }

    /// Sets the home route name.
    pub fn home_route(mut self, name: impl Into<String>) -> Self {
        self.home_route = name.into();
        self
    }

    /// Sets the redirect query parameter.
    pub fn redirect_field(mut self, field: impl Into<String>) -> Self {
        self.redirect_field = field.into();
        self
    }
}
