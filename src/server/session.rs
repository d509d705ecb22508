use std::collections::HashMap;
use std::sync::RwLock;

use rand::distr::Alphanumeric;
use rand::Rng;

use crate::Principal;

/// Session-token registry standing in for the host framework's session
/// mechanism.
///
/// Sessions are established and torn down outside the gateway; the gateway
/// only ever resolves a presented token to a [`Principal`]. Credential
/// checking is deliberately not implemented here.
#[derive(Default)]
pub struct SessionMap {
    sessions: RwLock<HashMap<String, Principal>>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a principal under an explicit token.
    pub fn issue(&self, token: &str, principal: Principal) {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(token.to_string(), principal);
    }

    /// Registers a principal under a fresh random token and returns it.
    pub fn issue_random(&self, principal: Principal) -> String {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        self.issue(&token, principal);
        token
    }

    /// Resolves a token to its principal, if the session is active.
    pub fn resolve(&self, token: &str) -> Option<Principal> {
        let sessions = self.sessions.read().unwrap();
        sessions.get(token).cloned()
    }

    /// Ends a session.
    pub fn revoke(&self, token: &str) {
        let mut sessions = self.sessions.write().unwrap();
        sessions.remove(token);
    }
}
