use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{RequestOutcome, ResponseInterceptor};
use crate::routing::{Navigator, PUBLIC_ENTRY};

use super::SessionTeardown;

/// Ends the session whenever a request carrying the active credential
/// comes back unauthorized, wherever in the client it was issued.
///
/// Register it once on the shared `Transport`. Other failures are left to
/// the caller.
pub struct AuthorizationInterceptor {
    teardown: Arc<dyn SessionTeardown>,
    navigator: Arc<dyn Navigator>,
}

impl AuthorizationInterceptor {
    pub fn new(teardown: Arc<dyn SessionTeardown>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            teardown,
            navigator,
        }
    }
}

impl ResponseInterceptor for AuthorizationInterceptor {
    fn on_complete(&self, outcome: &RequestOutcome<'_>) {
        // A 401 on an anonymous request (a failed login) says nothing
        // about the current session.
        let Some(credential) = outcome.credential else {
            return;
        };
        if !outcome.is_authorization_rejection() {
            return;
        }

        if !self.teardown.force_teardown(credential, "authorization rejected") {
            debug!(
                method = %outcome.method,
                path = outcome.path,
                "Rejected credential is no longer active"
            );
            return;
        }

        warn!(
            method = %outcome.method,
            path = outcome.path,
            "Credential rejected by server, session ended"
        );
        self.navigator.redirect(PUBLIC_ENTRY);
    }
}
