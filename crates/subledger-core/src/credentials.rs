//! Bearer token storage.
//!
//! The access token is opaque to this crate. Acquiring and refreshing it is
//! the caller's concern; this module only stores and hands it out.
//! [`KeyringTokenStore`] uses the platform's native credential storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use std::sync::{PoisonError, RwLock};

use keyring::Entry;
use tracing::debug;

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "subledger";

/// Credential type identifier for the Gmail access token.
const ACCESS_TOKEN_CREDENTIAL: &str = "gmail_access_token";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// No token has been stored.
    #[error("No access token available")]
    MissingToken,
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Opaque get/set store for the bearer token.
pub trait TokenStore: Send + Sync {
    /// Returns the stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get_token(&self) -> CredentialResult<Option<String>>;

    /// Replaces the stored token.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set_token(&self, token: &str) -> CredentialResult<()>;

    /// Removes the stored token. Missing entries are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn clear_token(&self) -> CredentialResult<()>;

    /// Returns the stored token or [`CredentialError::MissingToken`].
    ///
    /// # Errors
    ///
    /// Returns an error if no token is stored or the store cannot be read.
    fn require_token(&self) -> CredentialResult<String> {
        self.get_token()?.ok_or(CredentialError::MissingToken)
    }
}

/// Token store backed by the system keyring.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    account: String,
}

impl KeyringTokenStore {
    /// Creates a store for the given mailbox address.
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    /// Generates the keyring entry key.
    fn credential_key(&self) -> String {
        format!("{SERVICE_NAME}_{ACCESS_TOKEN_CREDENTIAL}_{}", self.account)
    }

    fn entry(&self) -> CredentialResult<Entry> {
        Ok(Entry::new(SERVICE_NAME, &self.credential_key())?)
    }
}

impl TokenStore for KeyringTokenStore {
    fn get_token(&self) -> CredentialResult<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => {
                debug!("No access token found for {}", self.account);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_token(&self, token: &str) -> CredentialResult<()> {
        self.entry()?.set_password(token)?;
        debug!("Stored access token for {}", self.account);
        Ok(())
    }

    fn clear_token(&self) -> CredentialResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process token store (environment-provided tokens, tests).
#[derive(Debug, Default)]
pub struct StaticTokenStore {
    token: RwLock<Option<String>>,
}

impl StaticTokenStore {
    /// Creates a store holding `token`.
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }
}

impl TokenStore for StaticTokenStore {
    fn get_token(&self) -> CredentialResult<Option<String>> {
        Ok(self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set_token(&self, token: &str) -> CredentialResult<()> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&self) -> CredentialResult<()> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
