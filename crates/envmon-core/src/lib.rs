//! Session and authentication core for the envmon admin client.
//!
//! The admin client of the environmental monitoring backend (rooms,
//! devices, measurements, users) keeps one bearer-token session:
//!
//! - [`auth`]: token persistence, the identity endpoints, and the session
//!   state machine with its global authorization interceptor
//! - [`routing`]: route requirements and the guard that gates views on
//!   the session
//! - [`api`]: the shared HTTP transport every request goes through
//! - [`app`]: application-root wiring of all of the above
//! - [`config`]: on-disk configuration with environment overrides

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod models;
pub mod routing;

pub use app::App;
pub use config::Config;
