//! Route definitions and path resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Static tags attached to a route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteMeta {
    /// Page title, combined with the site name by the guard.
    pub title: Option<String>,

    /// Only visitors without a session may enter.
    pub guest_only: bool,

    /// Only admins may enter.
    pub requires_admin: bool,
}

impl RouteMeta {
    /// Creates metadata with a title and no restrictions.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Marks the route guest-only.
    pub fn guest_only(mut self) -> Self {
        self.guest_only = true;
        self
    }

    /// Marks the route admin-only.
    pub fn requires_admin(mut self) -> Self {
        self.requires_admin = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

/// A named route with a path pattern such as `/post/:slug`.
#[derive(Debug, Clone)]
pub struct Route {
    /// The path pattern.
    pub path: String,

    /// Unique route name, used as a redirect target.
    pub name: String,

    /// Route metadata.
    pub meta: RouteMeta,

    segments: Vec<Segment>,
}

impl Route {
    /// Creates a route.
    pub fn new(path: impl Into<String>, name: impl Into<String>, meta: RouteMeta) -> Self {
        let path = path.into();
        let segments = split_path(&path)
            .map(|segment| match segment.strip_prefix(':') {
                Some(param) => Segment::Param(param.to_owned()),
                None => Segment::Static(segment.to_owned()),
            })
            .collect();

        Self {
            path,
            name: name.into(),
            meta,
            segments,
        }
    }

    /// Returns `true` when the pattern has no parameters.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Static(_)))
    }

    fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        let mut parts = split_path(path);

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Static(expected) if expected == part => {}
                Segment::Static(_) => return None,
                Segment::Param(name) => {
                    let value = urlencoding::decode(part)
                        .map(|value| value.into_owned())
                        .unwrap_or_else(|_| part.to_owned());
                    params.insert(name.clone(), value);
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }

        Some(params)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// The destination of a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Name of the matched route, `None` when nothing matched.
    pub name: Option<String>,

    /// The path without query or fragment.
    pub path: String,

    /// The path as requested, including query and fragment.
    pub full_path: String,

    /// Values of the route's `:param` segments.
    pub params: BTreeMap<String, String>,

    /// Decoded query parameters.
    pub query: BTreeMap<String, String>,

    /// Metadata of the matched route.
    pub meta: RouteMeta,
}

impl Target {
    /// Creates a target for a path that matched no route.
    pub fn unmatched(full_path: &str) -> Self {
        let (path, query) = split_full_path(full_path);

        Self {
            name: None,
            path: path.to_owned(),
            full_path: full_path.to_owned(),
            params: BTreeMap::new(),
            query,
            meta: RouteMeta::default(),
        }
    }
}

fn split_full_path(full_path: &str) -> (&str, BTreeMap<String, String>) {
    let without_fragment = full_path.split('#').next().unwrap_or_default();
    let (path, query) = without_fragment
        .split_once('?')
        .unwrap_or((without_fragment, ""));

    let query = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    (path, query)
}

/// An ordered table of routes. The first matching route wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The blog's routes.
    pub fn blog() -> Self {
        Self::new()
            .route("/", "Home", RouteMeta::titled("Home"))
            .route("/post/:slug", "Post", RouteMeta::titled("Post"))
            .route("/login", "Login", RouteMeta::titled("Login").guest_only())
            .route(
                "/admin",
                "AdminDashboard",
                RouteMeta::titled("Dashboard").requires_admin(),
            )
            .route(
                "/admin/editor",
                "AdminEditorNew",
                RouteMeta::titled("New Post").requires_admin(),
            )
            .route(
                "/admin/editor/:id",
                "AdminEditorEdit",
                RouteMeta::titled("Edit Post").requires_admin(),
            )
    }

    /// Appends a route.
    pub fn route(mut self, path: impl Into<String>, name: impl Into<String>, meta: RouteMeta) -> Self {
        self.routes.push(Route::new(path, name, meta));
        self
    }

    /// Returns the routes in matching order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Looks up a route by name.
    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.name == name)
    }

    /// Resolves a full path (with optional query and fragment) to a target.
    pub fn resolve(&self, full_path: &str) -> Option<Target> {
        let (path, query) = split_full_path(full_path);

        self.routes.iter().find_map(|route| {
            let params = route.matches(path)?;
            Some(Target {
                name: Some(route.name.clone()),
                path: path.to_owned(),
                full_path: full_path.to_owned(),
                params,
                query: query.clone(),
                meta: route.meta.clone(),
            })
        })
    }
}
