//! Process-wide session state machine.
//!
//! ```text
//!   Initializing ──validate ok──▶ Authenticated ──logout / rejection──▶ Unauthenticated
//!        │                             ▲                                     │
//!        └──────validate failed────────┼──────────────▶ Unauthenticated      │
//!                                      └────────────login + validate─────────┘
//! ```
//!
//! The application root owns the `AuthState`; everything else reads it
//! through `AuthHandle`s. Every transition that replaces or drops the
//! credential bumps a private sequence number. A validate result is only
//! committed if the number it captured is still current, so a teardown
//! that lands while a validate is in flight always wins.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::Transport;
use crate::models::{Credential, Identity, Role};

use super::{AuthFailure, SessionClient, TokenStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum AuthPhase {
    Initializing,
    Authenticated,
    Unauthenticated,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub phase: AuthPhase,
    /// Present iff `phase == Authenticated`
    pub identity: Option<Identity>,
    pub credential: Option<Credential>,
    /// When the current identity was confirmed by the server
    pub authenticated_at: Option<DateTime<Utc>>,
    sequence: u64,
}

impl AuthSnapshot {
    fn initial(credential: Option<Credential>) -> Self {
        let phase = if credential.is_some() {
            AuthPhase::Initializing
        } else {
            AuthPhase::Unauthenticated
        };
        Self {
            phase,
            identity: None,
            credential,
            authenticated_at: None,
            sequence: 0,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == AuthPhase::Authenticated
    }

    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(|i| i.role)
    }

    /// Nothing left to tear down
    fn is_signed_out(&self) -> bool {
        self.phase == AuthPhase::Unauthenticated
            && self.identity.is_none()
            && self.credential.is_none()
    }
}

/// Capability to force the session closed, handed to components that
/// must not own the `AuthState` itself.
pub trait SessionTeardown: Send + Sync {
    /// End the session because the server rejected `rejected`. Returns
    /// false, leaving the session alone, when a different credential is
    /// active by now.
    fn force_teardown(&self, rejected: &Credential, cause: &str) -> bool;
}

struct AuthCore {
    state: watch::Sender<AuthSnapshot>,
    store: Arc<dyn TokenStore>,
    transport: Transport,
    /// Held for the duration of each (synchronous) transition
    transition: Mutex<()>,
}

impl AuthCore {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `credential` the active one. Any previous identity is dropped.
    fn install_credential(&self, credential: Credential) -> u64 {
        let _guard = self.lock();
        self.store.save(&credential);
        self.transport.set_credential(Some(credential.clone()));

        let mut sequence = 0;
        self.state.send_modify(|s| {
            s.sequence += 1;
            sequence = s.sequence;
            if s.phase == AuthPhase::Authenticated {
                s.phase = AuthPhase::Unauthenticated;
            }
            s.identity = None;
            s.authenticated_at = None;
            s.credential = Some(credential);
        });
        sequence
    }

    /// Commit a validate result. Returns false when a newer transition has
    /// happened since `sequence` was captured.
    fn commit_identity(&self, sequence: u64, identity: Identity) -> bool {
        let _guard = self.lock();
        let username = identity.username.clone();
        let role = identity.role;
        let committed = self.state.send_if_modified(|s| {
            if s.sequence != sequence || s.credential.is_none() {
                return false;
            }
            s.phase = AuthPhase::Authenticated;
            s.identity = Some(identity);
            s.authenticated_at = Some(Utc::now());
            true
        });

        if committed {
            info!(username = %username, role = %role, "Session authenticated");
        } else {
            debug!(sequence, username = %username, "Discarding stale validate result");
        }
        committed
    }

    /// Tear down only if no newer transition has happened since `sequence`.
    fn teardown_if_current(&self, sequence: u64, cause: &str) {
        let _guard = self.lock();
        if self.state.borrow().sequence == sequence {
            self.teardown_locked(cause);
        } else {
            debug!(sequence, cause, "Skipping stale teardown");
        }
    }

    fn teardown(&self, cause: &str) {
        let _guard = self.lock();
        self.teardown_locked(cause);
    }

    /// Tear down unless a credential other than `rejected` is active.
    fn teardown_if_credential(&self, rejected: &Credential, cause: &str) -> bool {
        let _guard = self.lock();
        let superseded = matches!(
            self.state.borrow().credential,
            Some(ref active) if active != rejected
        );
        if superseded {
            debug!(cause, "Ignoring rejection of a superseded credential");
            return false;
        }
        self.teardown_locked(cause);
        true
    }

    fn teardown_locked(&self, cause: &str) {
        self.store.clear();
        self.transport.set_credential(None);

        let changed = self.state.send_if_modified(|s| {
            if s.is_signed_out() {
                return false;
            }
            s.sequence += 1;
            s.phase = AuthPhase::Unauthenticated;
            s.identity = None;
            s.credential = None;
            s.authenticated_at = None;
            true
        });

        if changed {
            info!(cause, "Session torn down");
        }
    }
}

/// Weak teardown capability; does nothing once the `AuthState` is gone.
#[derive(Clone)]
pub struct TeardownHandle {
    core: Weak<AuthCore>,
}

impl SessionTeardown for TeardownHandle {
    fn force_teardown(&self, rejected: &Credential, cause: &str) -> bool {
        match self.core.upgrade() {
            Some(core) => core.teardown_if_credential(rejected, cause),
            None => {
                debug!(cause, "Teardown requested after auth state was dropped");
                false
            }
        }
    }
}

/// Read-only view of the session for consumers.
#[derive(Clone)]
pub struct AuthHandle {
    rx: watch::Receiver<AuthSnapshot>,
}

impl AuthHandle {
    #[cfg(test)]
    pub(crate) fn from_receiver(rx: watch::Receiver<AuthSnapshot>) -> Self {
        Self { rx }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.rx.borrow().clone()
    }

    pub fn phase(&self) -> AuthPhase {
        self.rx.borrow().phase
    }

    pub fn identity(&self) -> Option<Identity> {
        self.rx.borrow().identity.clone()
    }

    pub fn role(&self) -> Option<Role> {
        self.rx.borrow().role()
    }

    pub fn is_authenticated(&self) -> bool {
        self.rx.borrow().is_authenticated()
    }

    /// Whether the state changed since this handle last looked
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Wait for the next state change. Returns `None` once the owning
    /// `AuthState` has been dropped.
    pub async fn changed(&mut self) -> Option<AuthSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// The session state machine. Only its own methods write the state.
pub struct AuthState {
    core: Arc<AuthCore>,
    session: SessionClient,
}

impl AuthState {
    /// Build the state from whatever the store holds: `Initializing` when a
    /// credential was persisted, `Unauthenticated` otherwise. Call
    /// [`initialize`](Self::initialize) to resolve the first case.
    pub fn new(session: SessionClient, store: Arc<dyn TokenStore>) -> Self {
        let persisted = store.load();
        let transport = session.transport().clone();
        transport.set_credential(persisted.clone());

        let (state, _) = watch::channel(AuthSnapshot::initial(persisted));

        Self {
            core: Arc::new(AuthCore {
                state,
                store,
                transport,
                transition: Mutex::new(()),
            }),
            session,
        }
    }

    pub fn handle(&self) -> AuthHandle {
        AuthHandle {
            rx: self.core.state.subscribe(),
        }
    }

    pub fn teardown_handle(&self) -> TeardownHandle {
        TeardownHandle {
            core: Arc::downgrade(&self.core),
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.core.state.borrow().clone()
    }

    pub fn phase(&self) -> AuthPhase {
        self.core.state.borrow().phase
    }

    pub fn session(&self) -> &SessionClient {
        &self.session
    }

    /// Resolve the startup state: validate a persisted credential, or settle
    /// on `Unauthenticated` without touching the network.
    pub async fn initialize(&self) -> AuthPhase {
        let (credential, sequence) = {
            let s = self.core.state.borrow();
            (s.credential.clone(), s.sequence)
        };

        let credential = match credential {
            Some(c) if self.phase() == AuthPhase::Initializing => c,
            _ => {
                debug!("No persisted credential to validate");
                return self.phase();
            }
        };

        info!("Validating persisted session");
        if let Err(e) = self.validate_and_commit(&credential, sequence).await {
            warn!(error = %e, "Persisted session rejected");
        }
        self.phase()
    }

    async fn validate_and_commit(
        &self,
        credential: &Credential,
        sequence: u64,
    ) -> Result<Option<Identity>, AuthFailure> {
        match self.session.validate(credential).await {
            Ok(identity) => {
                if self.core.commit_identity(sequence, identity.clone()) {
                    Ok(Some(identity))
                } else {
                    Ok(None)
                }
            }
            Err(e) => {
                self.core.teardown_if_current(sequence, "session validation failed");
                Err(e)
            }
        }
    }

    /// Sign in. On success the new credential is persisted and the
    /// identity is fetched from the server before returning.
    ///
    /// A failed login leaves the state untouched.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, AuthFailure> {
        let credential = self.session.login(username, password).await?;
        let sequence = self.core.install_credential(credential.clone());

        match self.validate_and_commit(&credential, sequence).await? {
            Some(identity) => Ok(identity),
            None => Err(AuthFailure::new(
                super::AuthFailureReason::NotAuthenticated,
                "Session ended before sign-in completed",
            )),
        }
    }

    /// Sign out. A no-op when already signed out.
    pub fn logout(&self) {
        self.core.teardown("logout");
    }

    /// Change the signed-in user's password.
    pub async fn change_password(
        &self,
        new_password: &str,
        old_password: Option<&str>,
    ) -> Result<Option<String>, AuthFailure> {
        if !self.snapshot().is_authenticated() {
            return Err(AuthFailure::not_authenticated());
        }
        self.session.change_password(new_password, old_password).await
    }
}
