use tokio::sync::watch;

use crate::common::{ConnectionState, UserId};
use crate::error::{ClientError, Result};
use crate::storage::{CredentialDatabase, Credentials};

/// Who is logged in and whether the channel is up.
pub struct Session {
    user_id: UserId,
    token: String,
    connection: watch::Sender<ConnectionState>,
}

impl Session {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            user_id: credentials.user_id,
            token: credentials.token,
            connection: watch::Sender::new(ConnectionState::Disconnected),
        }
    }

    /// Builds the session from the persisted login.
    pub fn restore(store: &CredentialDatabase) -> Result<Self> {
        let credentials = store.load()?.ok_or(ClientError::NotLoggedIn)?;
        log::info!("Restored session for user {}", credentials.user_id);
        Ok(Self::new(credentials))
    }

    pub fn login(store: &CredentialDatabase, credentials: Credentials) -> Result<Self> {
        store.save(&credentials)?;
        Ok(Self::new(credentials))
    }

    /// Forgets the persisted token. The session is consumed.
    pub fn logout(self, store: &CredentialDatabase) -> Result<()> {
        store.clear()?;
        log::info!("Logged out user {}", self.user_id);
        Ok(())
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Returns true when the state actually changed.
    pub fn set_connection_state(&self, state: ConnectionState) -> bool {
        self.connection.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        })
    }
}
