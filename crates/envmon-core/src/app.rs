//! Application root wiring.
//!
//! `App` builds the shared transport, owns the single `AuthState`, and
//! registers the authorization interceptor on the transport exactly once.
//! Views get read-only `AuthHandle`s and `RouteGuard`s from it.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::api::Transport;
use crate::auth::{AuthHandle, AuthState, AuthorizationInterceptor, SessionClient, TokenStore};
use crate::config::Config;
use crate::routing::{NavigationChannel, RouteGuard, RouteTable};

pub struct App {
    config: Config,
    transport: Transport,
    auth: AuthState,
    navigator: NavigationChannel,
    redirects: mpsc::UnboundedReceiver<String>,
}

impl App {
    /// Build with the token store selected in `config`.
    pub fn new(config: Config) -> Result<Self> {
        let store = config.token_store()?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Arc<dyn TokenStore>) -> Result<Self> {
        let transport = Transport::new(&config.base_url, config.request_timeout())?;
        let auth = AuthState::new(SessionClient::new(transport.clone()), store);
        let (navigator, redirects) = NavigationChannel::new();

        transport.register_interceptor(Arc::new(AuthorizationInterceptor::new(
            Arc::new(auth.teardown_handle()),
            Arc::new(navigator.clone()),
        )));

        info!(base_url = %config.base_url, phase = ?auth.phase(), "Client initialized");

        Ok(Self {
            config,
            transport,
            auth,
            navigator,
            redirects,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn handle(&self) -> AuthHandle {
        self.auth.handle()
    }

    /// Transport for requests to other backend resources. Every request
    /// made through it is watched by the authorization interceptor.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn route_guard(&self) -> RouteGuard {
        RouteGuard::new(
            self.auth.handle(),
            RouteTable::admin_console(),
            Arc::new(self.navigator.clone()),
        )
    }

    /// Redirects requested since the last call, oldest first.
    pub fn take_redirects(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(path) = self.redirects.try_recv() {
            out.push(path);
        }
        out
    }
}
