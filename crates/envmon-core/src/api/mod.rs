//! HTTP transport shared by the session client and every other caller.
//!
//! All requests go through a single `Transport`: it attaches the active
//! bearer credential and hands every completed request to the registered
//! `ResponseInterceptor`s. That is the seam the global authorization
//! interceptor plugs into.

pub mod client;
pub mod error;

pub use client::{RequestAuth, RequestOutcome, ResponseInterceptor, Transport};
pub use error::ApiError;
