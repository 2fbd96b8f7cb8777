//! # Server Directory
//!
//! Owns the movie directory and the collaborators shared by every movie:
//! the credential store, the mailer, the extension registry and the
//! command dispatcher.
//!
//! ## Concurrency
//! - Movies live in a sharded concurrent map; creation is insert-if-absent
//!   and removal is conditional on the movie being empty, so two movies
//!   never contend on a global lock.
//! - A logon that races the destruction of its movie retries against a
//!   freshly created instance.
//! - Disconnection is idempotent per user.

use crate::config::ServerSettings;
use crate::core::proplist::PropList;
use crate::core::value::Value;
use crate::directory::movie::{Admission, Movie};
use crate::directory::user::{Outbox, User};
use crate::error::{CommandError, CommandResult, Result};
use crate::extension::ExtensionRegistry;
use crate::protocol::commands;
use crate::protocol::dispatcher::Dispatcher;
use crate::service::auth::{CredentialStore, OpenCredentials};
use crate::service::mail::{LogMailer, Mailer};
use crate::utils::crypto::FrameCipher;
use crate::utils::metrics::global_metrics;
use crate::utils::time::Clock;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Attempts at entering a movie that keeps being destroyed under us.
const MAX_ADMIT_ATTEMPTS: usize = 8;

/// Notifications for the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// Stop accepting and close every connection once `grace` has passed.
    Shutdown { restart: bool, grace: Duration },
}

pub struct Server {
    settings: ServerSettings,
    movies: DashMap<String, Arc<Movie>>,
    enabled: AtomicBool,
    disabled_movies: RwLock<Vec<String>>,
    extensions: ExtensionRegistry,
    credentials: Box<dyn CredentialStore>,
    mailer: Box<dyn Mailer>,
    clock: Clock,
    events: broadcast::Sender<ServerEvent>,
    dispatcher: Dispatcher,
    cipher: Option<FrameCipher>,
}

pub struct ServerBuilder {
    settings: ServerSettings,
    extensions: ExtensionRegistry,
    credentials: Option<Box<dyn CredentialStore>>,
    mailer: Option<Box<dyn Mailer>>,
}

impl ServerBuilder {
    pub fn new(settings: ServerSettings) -> Self {
        Self {
            settings,
            extensions: ExtensionRegistry::new(),
            credentials: None,
            mailer: None,
        }
    }

    pub fn credentials(mut self, store: impl CredentialStore + 'static) -> Self {
        self.credentials = Some(Box::new(store));
        self
    }

    pub fn mailer(mut self, mailer: impl Mailer + 'static) -> Self {
        self.mailer = Some(Box::new(mailer));
        self
    }

    pub fn extensions(mut self, registry: ExtensionRegistry) -> Self {
        self.extensions = registry;
        self
    }

    pub fn build(self) -> Result<Arc<Server>> {
        let cipher = self
            .settings
            .transport
            .encryption_key
            .as_deref()
            .map(|key| FrameCipher::new(key.as_bytes()))
            .transpose()?;

        let dispatcher = Dispatcher::new();
        commands::register_all(&dispatcher)?;

        let (events, _) = broadcast::channel(8);
        let credentials = self.credentials.unwrap_or_else(|| {
            Box::new(OpenCredentials::new(self.settings.server.default_user_level))
        });

        Ok(Arc::new(Server {
            movies: DashMap::new(),
            enabled: AtomicBool::new(true),
            disabled_movies: RwLock::new(Vec::new()),
            extensions: self.extensions,
            credentials,
            mailer: self.mailer.unwrap_or_else(|| Box::new(LogMailer)),
            clock: Clock::new(),
            events,
            dispatcher,
            cipher,
            settings: self.settings,
        }))
    }
}

impl Server {
    pub fn new(settings: ServerSettings) -> Result<Arc<Self>> {
        ServerBuilder::new(settings).build()
    }

    pub fn builder(settings: ServerSettings) -> ServerBuilder {
        ServerBuilder::new(settings)
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn timestamp(&self) -> i32 {
        self.clock.timestamp()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    /// Per-connection cipher, when encrypted framing is configured.
    pub fn connection_cipher(&self) -> Option<FrameCipher> {
        self.cipher.as_ref().map(FrameCipher::fork)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// `#vendor #version #platform`
    pub fn version(&self) -> PropList {
        PropList::new()
            .with("vendor", self.settings.server.server_name.as_str())
            .with("version", env!("CARGO_PKG_VERSION"))
            .with("platform", std::env::consts::OS)
    }

    // ------------------------------------------------------------------
    // Movies
    // ------------------------------------------------------------------

    /// Returns the live movie named `name`, creating it if absent.
    pub fn get_or_create_movie(&self, name: &str) -> Arc<Movie> {
        match self.movies.entry(Movie::key_of(name)) {
            Entry::Occupied(existing) => Arc::clone(existing.get()),
            Entry::Vacant(slot) => {
                let movie = Movie::new(name, self.settings.movie_config(name), self.clock);
                movie.attach_extensions(&self.extensions);
                slot.insert(Arc::clone(&movie));
                info!(movie = %name, "Movie created");
                movie
            }
        }
    }

    pub fn find_movie(&self, name: &str) -> CommandResult<Arc<Movie>> {
        self.movies
            .get(&Movie::key_of(name))
            .map(|m| Arc::clone(m.value()))
            .ok_or(CommandError::MovieNotFound)
    }

    pub fn movies(&self) -> Vec<Arc<Movie>> {
        self.movies.iter().map(|m| Arc::clone(m.value())).collect()
    }

    pub fn movie_names(&self) -> Vec<String> {
        self.movies.iter().map(|m| m.value().name().to_string()).collect()
    }

    pub fn movie_count(&self) -> usize {
        self.movies.len()
    }

    /// Live users across every movie.
    pub fn user_count(&self) -> usize {
        self.movies.iter().map(|m| m.value().user_count()).sum()
    }

    /// Deregisters `movie` if it is empty and transient.
    pub(crate) fn maybe_remove_movie(&self, movie: &Arc<Movie>) {
        if movie.is_persistent() || movie.user_count() > 0 {
            return;
        }
        let removed = self
            .movies
            .remove_if(&Movie::key_of(movie.name()), |_, m| {
                Arc::ptr_eq(m, movie) && !m.is_persistent() && m.try_close()
            })
            .is_some();
        if removed {
            movie.detach_all_extensions();
            info!(movie = %movie.name(), "Movie destroyed");
        }
    }

    /// Disconnects every user of the movie and deregisters it, persistent
    /// or not.
    pub fn delete_movie(&self, name: &str) -> CommandResult<()> {
        let movie = self.find_movie(name)?;
        for user in movie.users() {
            self.disconnect_user(&user);
        }
        movie.set_persistent(false);
        self.maybe_remove_movie(&movie);
        Ok(())
    }

    pub fn is_movie_allowed(&self, name: &str) -> bool {
        self.disabled_movies
            .read()
            .map(|d| !d.iter().any(|m| m.eq_ignore_ascii_case(name)))
            .unwrap_or(true)
    }

    pub fn disable_movie(&self, name: &str) {
        let mut disabled = self
            .disabled_movies
            .write()
            .unwrap_or_else(|p| p.into_inner());
        if !disabled.iter().any(|m| m.eq_ignore_ascii_case(name)) {
            disabled.push(name.to_string());
        }
    }

    pub fn enable_movie(&self, name: &str) {
        self.disabled_movies
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|m| !m.eq_ignore_ascii_case(name));
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Admits a new user, or returns the refusal to report to the client.
    pub fn logon(
        &self,
        movie: &str,
        user: &str,
        password: &str,
        ip: &str,
        outbox: Outbox,
    ) -> CommandResult<(Arc<User>, Arc<Movie>)> {
        let outcome = self.try_logon(movie, user, password, ip, outbox);
        match &outcome {
            Ok(_) => global_metrics().logon_success(),
            Err(e) => {
                global_metrics().logon_refused();
                info!(movie = %movie, user = %user, reason = %e, "Logon refused");
            }
        }
        outcome
    }

    fn try_logon(
        &self,
        movie: &str,
        name: &str,
        password: &str,
        ip: &str,
        outbox: Outbox,
    ) -> CommandResult<(Arc<User>, Arc<Movie>)> {
        if !self.is_enabled() {
            return Err(CommandError::ConnectionRefused);
        }
        if movie.is_empty() || !self.is_movie_allowed(movie) {
            return Err(CommandError::InvalidMovieId);
        }
        if !is_valid_user_name(name) {
            return Err(CommandError::InvalidUserId);
        }

        let level = self.credentials.user_level(movie, name, password)?;
        let user = User::new(name, movie, ip, level, outbox);
        let movie = self.admit(&user, movie)?;
        Ok((user, movie))
    }

    /// Enters `user` into the movie named `name`.
    fn admit(&self, user: &Arc<User>, name: &str) -> CommandResult<Arc<Movie>> {
        for _ in 0..MAX_ADMIT_ATTEMPTS {
            let movie = self.get_or_create_movie(name);
            match movie.add_user(user) {
                Ok(Admission::Admitted) => return Ok(movie),
                Ok(Admission::Closed) => {
                    debug!(movie = %name, "Movie closed during admission, retrying");
                }
                Err(e) => {
                    self.maybe_remove_movie(&movie);
                    return Err(e);
                }
            }
        }
        warn!(movie = %name, "Gave up entering a movie that kept closing");
        Err(CommandError::NoConnectionsAvailable)
    }

    /// Removes the user from its movie and closes its connection. Repeat
    /// calls do nothing.
    pub fn disconnect_user(&self, user: &Arc<User>) {
        if !user.mark_disconnected() {
            return;
        }
        if let Ok(movie) = self.find_movie(&user.movie_name()) {
            if movie.remove_user(user) {
                self.maybe_remove_movie(&movie);
            }
        }
        user.request_disconnect();
    }

    /// Moves a connected user into another movie. When the target refuses,
    /// the user is put back into its previous movie.
    pub fn change_user_movie(&self, user: &Arc<User>, target: &str) -> CommandResult<()> {
        if target.is_empty() || !self.is_movie_allowed(target) {
            return Err(CommandError::InvalidMovieId);
        }
        let previous = user.movie_name();
        if previous.eq_ignore_ascii_case(target) {
            return Ok(());
        }

        if let Ok(movie) = self.find_movie(&previous) {
            if movie.remove_user(user) {
                self.maybe_remove_movie(&movie);
            }
        }

        match self.admit(user, target) {
            Ok(_) => {
                info!(user = %user.name(), from = %previous, to = %target, "User changed movie");
                Ok(())
            }
            Err(e) => {
                if self.admit(user, &previous).is_err() {
                    warn!(user = %user.name(), movie = %previous, "Could not restore user after failed move");
                    self.disconnect_user(user);
                }
                Err(e)
            }
        }
    }

    pub fn disconnect_all(&self) {
        let users: Vec<Arc<User>> = self.movies().iter().flat_map(|m| m.users()).collect();
        info!(count = users.len(), "Disconnecting all users");
        for user in users {
            self.disconnect_user(&user);
        }
    }

    // ------------------------------------------------------------------
    // Server state
    // ------------------------------------------------------------------

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// While disabled, new logons are refused; connected users stay.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "Server logons toggled");
    }

    /// Announces a shutdown (or restart) after the configured grace.
    pub fn schedule_shutdown(&self, restart: bool) {
        let grace = if restart {
            self.settings.server.restart_grace
        } else {
            self.settings.server.shutdown_grace
        };
        info!(restart, grace_secs = grace.as_secs(), "Shutdown scheduled");
        if self.events.send(ServerEvent::Shutdown { restart, grace }).is_err() {
            debug!("No listener subscribed to server events");
        }
    }

    pub(crate) fn version_value(&self) -> Value {
        Value::PropList(self.version())
    }
}

/// User names may not be empty, contain `@`, or impersonate the system.
fn is_valid_user_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('@')
        && !name
            .get(..6)
            .is_some_and(|p| p.eq_ignore_ascii_case("system"))
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("movies", &self.movies.len())
            .field("enabled", &self.is_enabled())
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::directory::user::Outbound;
    use tokio::sync::mpsc;

    fn server() -> Arc<Server> {
        Server::new(ServerSettings::default()).unwrap()
    }

    #[test]
    fn test_logon_creates_and_removes_movie() {
        let server = server();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (user, movie) = server.logon("Chat", "ann", "", "1.2.3.4", tx).unwrap();
        assert_eq!(server.movie_count(), 1);
        assert_eq!(user.level(), 20);
        assert_eq!(movie.user_count(), 1);

        server.disconnect_user(&user);
        server.disconnect_user(&user);
        assert_eq!(server.movie_count(), 0);
        assert!(movie.is_destroyed());
    }

    #[test]
    fn test_logon_refusals() {
        let server = server();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(
            server.logon("Chat", "", "", "", tx.clone()).err(),
            Some(CommandError::InvalidUserId)
        );
        assert_eq!(
            server.logon("Chat", "a@b", "", "", tx.clone()).err(),
            Some(CommandError::InvalidUserId)
        );
        assert_eq!(
            server.logon("Chat", "SystemUser", "", "", tx.clone()).err(),
            Some(CommandError::InvalidUserId)
        );
        server.disable_movie("chat");
        assert_eq!(
            server.logon("Chat", "ann", "", "", tx.clone()).err(),
            Some(CommandError::InvalidMovieId)
        );
        server.set_enabled(false);
        assert_eq!(
            server.logon("Other", "ann", "", "", tx).err(),
            Some(CommandError::ConnectionRefused)
        );
        assert_eq!(server.movie_count(), 0);
    }

    #[test]
    fn test_duplicate_does_not_leave_empty_movie_behind() {
        let server = server();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (first, _) = server.logon("Chat", "ann", "", "", tx.clone()).unwrap();
        assert_eq!(
            server.logon("chat", "ANN", "", "", tx).err(),
            Some(CommandError::ConnectionDuplicate)
        );
        assert_eq!(server.user_count(), 1);
        server.disconnect_user(&first);
        assert_eq!(server.movie_count(), 0);
    }

    #[test]
    fn test_change_movie() {
        let server = server();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (user, _) = server.logon("A", "ann", "", "", tx).unwrap();
        server.change_user_movie(&user, "B").unwrap();
        assert_eq!(user.movie_name(), "B");
        assert!(server.find_movie("A").is_err());
        assert_eq!(server.find_movie("b").unwrap().user_count(), 1);
        assert!(user.is_member("@AllUsers"));
    }

    #[test]
    fn test_disconnect_requests_close() {
        let server = server();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (user, _) = server.logon("A", "ann", "", "", tx).unwrap();
        server.disconnect_user(&user);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Disconnect);
    }

    #[tokio::test]
    async fn test_shutdown_event() {
        let server = server();
        let mut events = server.subscribe();
        server.schedule_shutdown(true);
        assert_eq!(
            events.recv().await.unwrap(),
            ServerEvent::Shutdown {
                restart: true,
                grace: server.settings().server.restart_grace
            }
        );
    }
}
