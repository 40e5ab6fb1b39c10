// SPDX-License-Identifier: MPL-2.0

//! Session collaborator boundary.
//!
//! Credential persistence (keyring, OAuth refresh, multi-account switching)
//! lives outside this crate; the data layer only ever asks "is someone
//! signed in right now, and with what authorization".

use crate::store::identifier;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Point-in-time authorization context for one signed-in account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    /// Instance domain, e.g. `mastodon.social`.
    pub domain: String,
    pub access_token: String,
    /// Remote id of the signed-in account on its instance.
    pub account_id: String,
}

impl AuthContext {
    /// Store identifier of the signed-in account (`id@domain`).
    pub fn account_identifier(&self) -> String {
        identifier(&self.account_id, &self.domain)
    }
}

/// Point-in-time session check plus the current authorization context.
pub trait SessionProvider: Send + Sync {
    fn active(&self) -> Option<AuthContext>;
}

/// In-memory session holder for hosts and tests. The host sets the context
/// after login and clears it on logout; readers always see the latest value.
#[derive(Default)]
pub struct SessionBox {
    current: RwLock<Option<AuthContext>>,
}

impl SessionBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(auth: AuthContext) -> Self {
        Self {
            current: RwLock::new(Some(auth)),
        }
    }

    pub fn set(&self, auth: Option<AuthContext>) {
        *self.current.write().expect("session lock poisoned") = auth;
    }
}

impl SessionProvider for SessionBox {
    fn active(&self) -> Option<AuthContext> {
        self.current.read().expect("session lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_box_set_and_clear() {
        let sessions = SessionBox::new();
        assert!(sessions.active().is_none());

        sessions.set(Some(AuthContext {
            domain: "example.social".to_string(),
            access_token: "token".to_string(),
            account_id: "7".to_string(),
        }));
        let auth = sessions.active().expect("active");
        assert_eq!(auth.account_identifier(), "7@example.social");

        sessions.set(None);
        assert!(sessions.active().is_none());
    }
}
