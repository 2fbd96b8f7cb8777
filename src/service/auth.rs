//! Credential lookup performed at logon.
//!
//! The server does not define an authentication scheme. A
//! [`CredentialStore`] decides whether a user may enter a movie and with
//! which privilege level.

use crate::error::{CommandError, CommandResult};
use std::collections::HashMap;
use std::sync::RwLock;

pub trait CredentialStore: Send + Sync {
    /// Returns the privilege level for `user` entering `movie`, or the
    /// refusal to send back.
    fn user_level(&self, movie: &str, user: &str, password: &str) -> CommandResult<i32>;
}

/// Admits everyone at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct OpenCredentials {
    level: i32,
}

impl OpenCredentials {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl CredentialStore for OpenCredentials {
    fn user_level(&self, _movie: &str, _user: &str, _password: &str) -> CommandResult<i32> {
        Ok(self.level)
    }
}

/// In-memory accounts; users without an account get the fallback level.
#[derive(Debug)]
pub struct StaticCredentials {
    accounts: RwLock<HashMap<String, (String, i32)>>,
    fallback: Option<i32>,
}

impl StaticCredentials {
    /// `fallback` is the level of unknown users; `None` refuses them.
    pub fn new(fallback: Option<i32>) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            fallback,
        }
    }

    pub fn add_account(&self, user: &str, password: &str, level: i32) {
        self.accounts
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(user.to_ascii_uppercase(), (password.to_string(), level));
    }

    pub fn remove_account(&self, user: &str) -> bool {
        self.accounts
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&user.to_ascii_uppercase())
            .is_some()
    }
}

impl CredentialStore for StaticCredentials {
    fn user_level(&self, _movie: &str, user: &str, password: &str) -> CommandResult<i32> {
        let accounts = self.accounts.read().unwrap_or_else(|p| p.into_inner());
        match accounts.get(&user.to_ascii_uppercase()) {
            Some((expected, level)) if expected == password => Ok(*level),
            Some(_) => Err(CommandError::InvalidPassword),
            None => self.fallback.ok_or(CommandError::InvalidUserId),
        }
    }
}
