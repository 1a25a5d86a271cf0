use std::collections::BTreeMap;

use crate::{
    guard::GuardConfig,
    route::{RouteMeta, RouteTable, Target},
    store::AuthFacts,
};

/// What the router should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Continue to the requested target unchanged.
    Proceed,

    /// Go somewhere else instead.
    Redirect(Redirect),
}

impl Decision {
    /// Returns `true` for [`Decision::Proceed`].
    pub fn is_proceed(&self) -> bool {
        matches!(self, Decision::Proceed)
    }
}

/// A redirect to a named route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Name of the route to go to.
    pub name: String,

    /// Query parameters to attach.
    pub query: BTreeMap<String, String>,
}

impl Redirect {
    /// Creates a redirect without query parameters.
    pub fn to(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: BTreeMap::new(),
        }
    }

    /// Adds a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Renders the redirect as a URL, e.g. `/login?redirect=%2Fadmin`.
    ///
    /// Returns `None` when the route is unknown or has path parameters.
    pub fn location(&self, routes: &RouteTable) -> Option<String> {
        let route = routes.get(&self.name).filter(|route| route.is_static())?;

        if self.query.is_empty() {
            return Some(route.path.clone());
        }

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.query)
            .finish();

        Some(format!("{}?{}", route.path, query))
    }
}

/// Formats the page title for a route.
pub fn page_title(meta: &RouteMeta, site_name: &str) -> String {
    match meta.title.as_deref() {
        Some(title) => format!("{} - {}", title, site_name),
        None => site_name.to_owned(),
    }
}

/// Decides a navigation from the target's metadata and the current facts.
///
/// Rules are checked in order and the first match wins:
///
/// 1. admin-only target, no session: redirect to login, remembering the
///    target in the redirect query parameter;
/// 2. admin-only target, session without admin role: redirect home;
/// 3. guest-only target, session present: redirect home;
/// 4. otherwise proceed.
pub fn decide(to: &Target, facts: &AuthFacts, config: &GuardConfig) -> Decision {
    if to.meta.requires_admin {
        if !facts.is_logged_in {
            return Decision::Redirect(
                Redirect::to(&config.login_route)
                    .with_query(&config.redirect_field, &to.full_path),
            );
        }

        if !facts.is_admin {
            return Decision::Redirect(Redirect::to(&config.home_route));
        }
    }

    if to.meta.guest_only && facts.is_logged_in {
        return Decision::Redirect(Redirect::to(&config.home_route));
    }

    Decision::Proceed
}
