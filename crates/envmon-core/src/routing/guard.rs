use std::sync::Arc;

use tracing::debug;

use crate::auth::{AuthHandle, AuthPhase, AuthSnapshot};
use crate::models::Role;

use super::Navigator;

/// Where unauthenticated or under-privileged navigation ends up
pub const PUBLIC_ENTRY: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRequirement {
    Public,
    Authenticated,
    Role(Role),
}

impl RouteRequirement {
    fn strictness(self) -> u8 {
        match self {
            RouteRequirement::Public => 0,
            RouteRequirement::Authenticated => 1,
            RouteRequirement::Role(Role::Manager) => 2,
            RouteRequirement::Role(Role::Admin) => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still being resolved; show a loading state, decide nothing
    Loading,
    Allow,
    Redirect(String),
}

/// Decide whether a route with `requirement` may render for `snapshot`.
pub fn evaluate(snapshot: &AuthSnapshot, requirement: RouteRequirement) -> GuardDecision {
    if requirement == RouteRequirement::Public {
        return GuardDecision::Allow;
    }

    match snapshot.phase {
        AuthPhase::Initializing => GuardDecision::Loading,
        AuthPhase::Unauthenticated => GuardDecision::Redirect(PUBLIC_ENTRY.to_string()),
        AuthPhase::Authenticated => {
            let allowed = match (requirement, snapshot.role()) {
                (_, None) => false,
                (RouteRequirement::Public, Some(_)) => true,
                (RouteRequirement::Authenticated, Some(_)) => true,
                (RouteRequirement::Role(required), Some(role)) => role.grants(required),
            };
            if allowed {
                GuardDecision::Allow
            } else {
                GuardDecision::Redirect(PUBLIC_ENTRY.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

#[derive(Debug, Clone)]
struct RouteEntry {
    segments: Vec<Segment>,
    requirement: RouteRequirement,
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.split('/').filter(|s| !s.is_empty())
}

/// Declared routes and their requirements.
///
/// Requirements nest like layouts do: a route also covers every path below
/// it, and a path gets the strictest requirement of all routes that cover
/// it. Paths no route covers are public.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes of the admin console.
    pub fn admin_console() -> Self {
        Self::new()
            .route("/", RouteRequirement::Public)
            .route("/admin", RouteRequirement::Authenticated)
            .route("/admin/account", RouteRequirement::Authenticated)
            .route("/admin/rooms", RouteRequirement::Authenticated)
            .route("/admin/rooms/:id", RouteRequirement::Authenticated)
            .route("/admin/devices", RouteRequirement::Authenticated)
            .route("/admin/users", RouteRequirement::Role(Role::Admin))
    }

    /// Add a route. Segments starting with `:` match any value.
    pub fn route(mut self, pattern: &str, requirement: RouteRequirement) -> Self {
        let segments = path_segments(pattern)
            .map(|s| {
                if s.starts_with(':') {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        self.routes.push(RouteEntry {
            segments,
            requirement,
        });
        self
    }

    pub fn requirement_for(&self, path: &str) -> RouteRequirement {
        let parts: Vec<&str> = path_segments(path).collect();

        self.routes
            .iter()
            .filter(|route| {
                route.segments.len() <= parts.len()
                    && route.segments.iter().zip(&parts).all(|(seg, part)| match seg {
                        Segment::Literal(lit) => lit == *part,
                        Segment::Param => true,
                    })
            })
            .map(|route| route.requirement)
            .max_by_key(|req| req.strictness())
            .unwrap_or(RouteRequirement::Public)
    }
}

/// Applies the route table to navigation and to every session change,
/// sending redirects to the `Navigator`.
pub struct RouteGuard {
    auth: AuthHandle,
    table: RouteTable,
    navigator: Arc<dyn Navigator>,
    current: String,
}

impl RouteGuard {
    pub fn new(auth: AuthHandle, table: RouteTable, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            auth,
            table,
            navigator,
            current: PUBLIC_ENTRY.to_string(),
        }
    }

    /// Path currently shown (after any redirect)
    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn navigate(&mut self, path: &str) -> GuardDecision {
        self.current = path.to_string();
        self.reevaluate()
    }

    /// Decide again for the current path against the latest session state.
    pub fn reevaluate(&mut self) -> GuardDecision {
        let requirement = self.table.requirement_for(&self.current);
        let decision = evaluate(&self.auth.snapshot(), requirement);

        if let GuardDecision::Redirect(ref target) = decision {
            if *target != self.current {
                debug!(from = %self.current, to = %target, "Route guard redirect");
                self.navigator.redirect(target);
                self.current = target.clone();
            }
        }
        decision
    }

    /// Wait for the next session change and re-decide. `None` once the
    /// session state is gone.
    pub async fn next_decision(&mut self) -> Option<GuardDecision> {
        self.auth.changed().await?;
        Some(self.reevaluate())
    }
}
