//! The credential challenge handler.
//!
//! Thin glue between the state machine and the external Credential
//! Directory: mints challenge nonces, runs the right ceremony for the
//! session mode, and maps platform-reported failures onto
//! [`CredentialError`]. The directory itself (key storage, signature
//! verification, device binding) is an external collaborator behind the
//! [`CredentialDirectory`] trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use labgate_core::{CredentialError, SessionMode};

/// Seam to the external credential store and platform authenticator.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialDirectory: Send + Sync {
    /// Runs the authentication ceremony for an existing credential and
    /// returns the opaque assertion payload.
    fn verify_assertion(
        &self,
        user_identifier: &str,
        challenge: &str,
    ) -> Result<serde_json::Value, CredentialError>;

    /// Runs the enrollment ceremony for a new credential and returns the
    /// opaque attestation payload.
    fn register_credential(
        &self,
        user_identifier: &str,
        challenge: &str,
    ) -> Result<serde_json::Value, CredentialError>;
}

/// Mints challenges and dispatches ceremonies by session mode.
pub struct ChallengeHandler {
    directory: Arc<dyn CredentialDirectory>,
}

impl ChallengeHandler {
    pub fn new(directory: Arc<dyn CredentialDirectory>) -> Self {
        Self { directory }
    }

    /// A fresh challenge nonce (32 hex chars).
    pub fn issue_challenge() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Runs the ceremony matching the session mode.
    ///
    /// # Errors
    ///
    /// [`CredentialError`] from the directory, or
    /// [`CredentialError::Directory`] for an empty challenge (a deep link
    /// that lost its nonce must not silently authenticate).
    pub fn run_ceremony(
        &self,
        mode: SessionMode,
        user_identifier: &str,
        challenge: &str,
    ) -> Result<serde_json::Value, CredentialError> {
        if challenge.is_empty() {
            return Err(CredentialError::Directory(
                "empty challenge in pairing link".to_string(),
            ));
        }
        debug!(user_identifier, %mode, "starting credential ceremony");
        match mode {
            SessionMode::Login => self.directory.verify_assertion(user_identifier, challenge),
            SessionMode::Registration => {
                self.directory.register_credential(user_identifier, challenge)
            }
        }
    }
}

/// In-memory credential directory for tests and headless demo runs.
///
/// Tracks one credential binding per user identity. Verification fails with
/// [`CredentialError::InvalidState`] when no credential exists; enrollment
/// fails the same way when one already does.
#[derive(Default)]
pub struct InMemoryCredentialDirectory {
    bindings: Mutex<HashMap<String, String>>,
}

impl InMemoryCredentialDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-binds a credential, as if the user had enrolled earlier.
    pub fn bind(&self, user_identifier: impl Into<String>) {
        let credential_id = uuid::Uuid::new_v4().to_string();
        self.bindings
            .lock()
            .unwrap()
            .insert(user_identifier.into(), credential_id);
    }

    fn payload(credential_id: &str, user_identifier: &str, kind: &str) -> serde_json::Value {
        serde_json::json!({
            "credential": credential_id,
            "userIdentifier": user_identifier,
            "type": kind,
        })
    }
}

impl CredentialDirectory for InMemoryCredentialDirectory {
    fn verify_assertion(
        &self,
        user_identifier: &str,
        _challenge: &str,
    ) -> Result<serde_json::Value, CredentialError> {
        let bindings = self.bindings.lock().unwrap();
        match bindings.get(user_identifier) {
            Some(credential_id) => Ok(Self::payload(
                credential_id,
                user_identifier,
                "authentication",
            )),
            None => Err(CredentialError::InvalidState),
        }
    }

    fn register_credential(
        &self,
        user_identifier: &str,
        _challenge: &str,
    ) -> Result<serde_json::Value, CredentialError> {
        let mut bindings = self.bindings.lock().unwrap();
        if bindings.contains_key(user_identifier) {
            return Err(CredentialError::InvalidState);
        }
        let credential_id = uuid::Uuid::new_v4().to_string();
        let payload = Self::payload(&credential_id, user_identifier, "registration");
        bindings.insert(user_identifier.to_string(), credential_id);
        Ok(payload)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
