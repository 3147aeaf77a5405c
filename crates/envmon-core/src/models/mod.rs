//! Domain types shared by the session core.
//!
//! - `Credential`: the opaque bearer token issued by the backend
//! - `Identity` / `Role`: the server-confirmed user behind a credential

pub mod identity;

pub use identity::{Credential, Identity, Role};
