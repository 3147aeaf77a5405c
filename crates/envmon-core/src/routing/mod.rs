//! Auth-gated navigation.
//!
//! - `RouteTable`: the admin console's routes and what each requires
//! - `evaluate` / `RouteGuard`: allow, hold (while the session is still
//!   being resolved) or redirect to the public entry point
//! - `Navigator`: where redirects are sent

pub mod guard;
pub mod navigator;

pub use guard::{evaluate, GuardDecision, RouteGuard, RouteRequirement, RouteTable, PUBLIC_ENTRY};
pub use navigator::{NavigationChannel, Navigator};
