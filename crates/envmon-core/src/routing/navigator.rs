use tokio::sync::mpsc;
use tracing::debug;

/// Receives redirect requests from the guard and the interceptor.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Forwards redirects to whoever holds the receiving end, typically the
/// application root's event loop.
#[derive(Clone)]
pub struct NavigationChannel {
    tx: mpsc::UnboundedSender<String>,
}

impl NavigationChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for NavigationChannel {
    fn redirect(&self, path: &str) {
        debug!(path, "Redirect requested");
        if self.tx.send(path.to_string()).is_err() {
            debug!(path, "Navigation receiver dropped; redirect ignored");
        }
    }
}
