//! Session and authentication core.
//!
//! This module provides:
//! - `TokenStore`: persistence for the bearer credential (file, OS keychain
//!   or memory)
//! - `SessionClient`: login, "who am I" validation and password change
//! - `AuthState`: the session state machine, read through `AuthHandle`s
//! - `AuthorizationInterceptor`: ends the session when the server rejects
//!   the credential on any request

pub mod credentials;
pub mod failure;
pub mod interceptor;
pub mod session;
pub mod state;

pub use credentials::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};
pub use failure::{AuthFailure, AuthFailureReason};
pub use interceptor::AuthorizationInterceptor;
pub use session::{check_password_policy, SessionClient};
pub use state::{AuthHandle, AuthPhase, AuthSnapshot, AuthState, SessionTeardown, TeardownHandle};
