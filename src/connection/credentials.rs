//! Credential provider contract.
//!
//! The auth layer publishes [`Credentials`] on a watch channel; the manager
//! re-evaluates its connection each time the value changes.

use tokio::sync::watch;

/// Current authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Auth token, if signed in.
    pub token: Option<String>,
    /// Whether the auth bootstrap has finished. Until it has, `token` is not
    /// trustworthy and no connection is opened.
    pub auth_ready: bool,
}

impl Credentials {
    pub fn signed_in(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            auth_ready: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            token: None,
            auth_ready: true,
        }
    }

    pub fn pending() -> Self {
        Self::default()
    }
}

/// Read side of the credential channel, handed to the manager.
pub type CredentialProvider = watch::Receiver<Credentials>;

/// Write side of the credential channel, owned by the auth layer.
pub struct CredentialSource {
    tx: watch::Sender<Credentials>,
}

impl CredentialSource {
    pub fn new(initial: Credentials) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn provider(&self) -> CredentialProvider {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Credentials {
        self.tx.borrow().clone()
    }

    /// Replace the credentials. Subscribers are only woken on an actual change.
    pub fn set(&self, credentials: Credentials) {
        self.tx.send_if_modified(|current| {
            if *current == credentials {
                false
            } else {
                *current = credentials;
                true
            }
        });
    }

    pub fn set_token(&self, token: Option<String>) {
        let mut next = self.current();
        next.token = token;
        self.set(next);
    }

    /// Mark the auth bootstrap finished.
    pub fn mark_ready(&self) {
        let mut next = self.current();
        next.auth_ready = true;
        self.set(next);
    }
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self::new(Credentials::pending())
    }
}
