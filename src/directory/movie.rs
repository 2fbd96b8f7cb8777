//! # Movie
//!
//! An isolated application namespace: its own users, groups and extension
//! handlers.
//!
//! ## Lifecycle
//! ```text
//! Created ──(handlers attached)──▶ Active ──(last user gone, transient)──▶ EmptyAndTransient ──▶ Destroyed
//! ```
//! Admission and destruction race through one atomic counter: the user
//! population. A movie is closed by swapping a population of zero for a
//! sentinel, after which no admission can succeed and callers retry against
//! a freshly registered instance.

use crate::config::{MovieConfig, ALL_USERS_GROUP};
use crate::core::value::Value;
use crate::directory::group::Group;
use crate::directory::user::User;
use crate::error::{CommandError, CommandResult};
use crate::extension::{ExtensionHandler, ExtensionRegistry, DEFAULT_HANDLER};
use crate::protocol::message::Message;
use crate::utils::time::Clock;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Population value of a closed movie.
const CLOSED: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovieState {
    Created,
    Active,
    EmptyAndTransient,
    Destroyed,
}

/// Outcome of trying to admit a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Admitted,
    /// The movie was destroyed concurrently; retry with a new instance.
    Closed,
}

pub struct Movie {
    name: String,
    config: MovieConfig,
    command_levels: HashMap<String, i32>,
    clock: Clock,
    users: DashMap<String, Arc<User>>,
    population: AtomicUsize,
    groups: DashMap<String, Arc<Group>>,
    all_users: Arc<Group>,
    disabled_groups: RwLock<Vec<String>>,
    unique_counter: AtomicU64,
    extensions: RwLock<Vec<Box<dyn ExtensionHandler>>>,
    command_gate: Mutex<()>,
    persistent: AtomicBool,
}

impl Movie {
    pub fn new(name: &str, config: MovieConfig, clock: Clock) -> Arc<Self> {
        let all_users = Group::new(ALL_USERS_GROUP, None);
        let groups = DashMap::new();
        groups.insert(ALL_USERS_GROUP.to_ascii_uppercase(), Arc::clone(&all_users));

        Arc::new(Self {
            name: name.to_string(),
            command_levels: config.command_levels(),
            disabled_groups: RwLock::new(config.disabled_groups.clone()),
            persistent: AtomicBool::new(config.persistent),
            config,
            clock,
            users: DashMap::new(),
            population: AtomicUsize::new(0),
            groups,
            all_users,
            unique_counter: AtomicU64::new(0),
            extensions: RwLock::new(Vec::new()),
            command_gate: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory key of a movie name.
    pub fn key_of(name: &str) -> String {
        name.to_ascii_uppercase()
    }

    pub fn config(&self) -> &MovieConfig {
        &self.config
    }

    pub fn state(&self) -> MovieState {
        if self.is_destroyed() {
            MovieState::Destroyed
        } else if self.extension_count() == 0 {
            MovieState::Created
        } else if self.user_count() == 0 && !self.is_persistent() {
            MovieState::EmptyAndTransient
        } else {
            MovieState::Active
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::SeqCst)
    }

    pub fn set_persistent(&self, persistent: bool) {
        self.persistent.store(persistent, Ordering::SeqCst);
    }

    pub fn is_destroyed(&self) -> bool {
        self.population.load(Ordering::SeqCst) == CLOSED
    }

    /// Closes an empty movie. Only succeeds once, and only with no users.
    pub(crate) fn try_close(&self) -> bool {
        self.population
            .compare_exchange(0, CLOSED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Serializes system command execution within this movie.
    pub fn command_gate(&self) -> MutexGuard<'_, ()> {
        self.command_gate.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn messaging_level(&self) -> i32 {
        self.config.messaging_user_level
    }

    pub fn messaging_all_level(&self) -> i32 {
        self.config.messaging_all_user_level
    }

    /// Level required for `system.<namespace>.<command>`; zero when unset.
    pub fn required_level(&self, namespace: &str, command: &str) -> i32 {
        let key = format!("{namespace}.{command}").to_ascii_uppercase();
        self.command_levels.get(&key).copied().unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn users(&self) -> Vec<Arc<User>> {
        self.users.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn find_user(&self, name: &str) -> CommandResult<Arc<User>> {
        self.users
            .get(&name.to_ascii_uppercase())
            .map(|u| Arc::clone(u.value()))
            .ok_or(CommandError::UserNotFound)
    }

    /// Admits a user: reserves a connection slot, inserts the name if absent
    /// and joins the all-users group.
    pub(crate) fn add_user(&self, user: &Arc<User>) -> CommandResult<Admission> {
        let limit = self.config.connection_limit;
        let reserved = self
            .population
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n != CLOSED && n < limit).then_some(n + 1)
            });
        match reserved {
            Ok(_) => {}
            Err(CLOSED) => return Ok(Admission::Closed),
            Err(_) => return Err(CommandError::NoConnectionsAvailable),
        }

        match self.users.entry(user.key()) {
            Entry::Occupied(_) => {
                self.population.fetch_sub(1, Ordering::SeqCst);
                return Err(CommandError::ConnectionDuplicate);
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(user));
            }
        }

        user.set_movie(&self.name);
        // The all-users group is unbounded.
        let _ = self.all_users.add_user(user);
        self.each_extension("on_user_login", |h| h.on_user_login(self, user));
        info!(movie = %self.name, user = %user.name(), "User joined movie");
        Ok(Admission::Admitted)
    }

    /// Removes the user from the directory and every group, then notifies.
    /// Returns `false` when the user was not (or no longer) present.
    pub(crate) fn remove_user(&self, user: &Arc<User>) -> bool {
        let removed = self
            .users
            .remove_if(&user.key(), |_, u| Arc::ptr_eq(u, user))
            .is_some();
        if !removed {
            return false;
        }
        self.population.fetch_sub(1, Ordering::SeqCst);

        for name in user.group_names() {
            if let Some(group) = self.groups.get(&name.to_ascii_uppercase()) {
                group.remove_user(user);
            }
        }
        self.all_users.remove_user(user);
        user.clear_groups();

        self.each_extension("on_user_logout", |h| h.on_user_logout(self, user));
        self.notify_disconnection(user.name());
        info!(
            movie = %self.name,
            user = %user.name(),
            online_secs = user.created_at().elapsed().as_secs(),
            "User left movie"
        );
        true
    }

    /// Tells each configured notify group that `user_name` left.
    fn notify_disconnection(&self, user_name: &str) {
        if self.config.notify_disconnect.is_empty() {
            return;
        }
        let notice = Message::new(
            "Disconnected",
            crate::protocol::message::SYSTEM_SENDER,
            Vec::new(),
            Value::from(user_name),
        )
        .with_timestamp(self.clock.timestamp());

        for name in &self.config.notify_disconnect {
            if let Some(group) = self.groups.get(&name.to_ascii_uppercase()) {
                group.broadcast(&notice.readdressed(group.name()));
            }
        }
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    pub fn all_users(&self) -> &Arc<Group> {
        &self.all_users
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups
            .iter()
            .map(|e| e.value().name().to_string())
            .collect()
    }

    pub fn find_group(&self, name: &str) -> CommandResult<Arc<Group>> {
        if !name.starts_with('@') {
            return Err(CommandError::InvalidGroupName);
        }
        self.groups
            .get(&name.to_ascii_uppercase())
            .map(|g| Arc::clone(g.value()))
            .ok_or(CommandError::GroupNotFound)
    }

    pub fn is_group_allowed(&self, name: &str) -> bool {
        self.disabled_groups
            .read()
            .map(|d| !d.iter().any(|g| g.eq_ignore_ascii_case(name)))
            .unwrap_or(true)
    }

    fn group_limit(&self, name: &str) -> Option<usize> {
        self.config
            .group_size_limits
            .iter()
            .find(|(g, _)| g.eq_ignore_ascii_case(name))
            .map(|(_, limit)| *limit)
    }

    /// Joins `name`, creating the group if it does not exist yet.
    pub fn join_group(&self, user: &Arc<User>, name: &str) -> CommandResult<Arc<Group>> {
        if !name.starts_with('@') || name.eq_ignore_ascii_case(ALL_USERS_GROUP) {
            return Err(CommandError::InvalidGroupName);
        }
        if !self.is_group_allowed(name) || !self.holds(user) {
            return Err(CommandError::ErrorJoiningGroup);
        }

        let (group, created) = match self.groups.entry(name.to_ascii_uppercase()) {
            Entry::Occupied(existing) => {
                let group = Arc::clone(existing.get());
                group.add_user(user)?;
                (group, false)
            }
            Entry::Vacant(slot) => {
                let group = Group::new(name, self.group_limit(name));
                group.add_user(user)?;
                slot.insert(Arc::clone(&group));
                (group, true)
            }
        };

        if created {
            debug!(movie = %self.name, group = %name, "Group created");
            self.each_extension("on_group_create", |h| h.on_group_create(self, &group));
        }

        // Checked again after the membership is recorded: a concurrent
        // `remove_user` either sees the new group in its snapshot or its
        // removal is visible here.
        if !self.holds(user) {
            group.remove_user(user);
            debug!(movie = %self.name, group = %name, user = %user.name(), "Join raced removal");
            return Err(CommandError::ErrorJoiningGroup);
        }
        Ok(group)
    }

    /// Whether `user` is this exact logged-on user, not just a namesake.
    fn holds(&self, user: &Arc<User>) -> bool {
        self.users
            .get(&user.key())
            .is_some_and(|u| Arc::ptr_eq(u.value(), user))
    }

    pub fn leave_group(&self, user: &Arc<User>, name: &str) -> CommandResult<()> {
        if !name.starts_with('@') || name.eq_ignore_ascii_case(ALL_USERS_GROUP) {
            return Err(CommandError::ErrorLeavingGroup);
        }
        let group = self
            .find_group(name)
            .map_err(|_| CommandError::ErrorLeavingGroup)?;
        if !user.is_member(name) || !group.remove_user(user) {
            return Err(CommandError::ErrorLeavingGroup);
        }
        Ok(())
    }

    /// Deletes a group and drops its memberships. The all-users group is
    /// never deleted.
    pub fn delete_group(&self, name: &str) -> bool {
        if name.eq_ignore_ascii_case(ALL_USERS_GROUP) {
            return false;
        }
        let Some((_, group)) = self.groups.remove(&name.to_ascii_uppercase()) else {
            return false;
        };
        group.remove_all();
        self.each_extension("on_group_delete", |h| h.on_group_delete(self, &group));
        debug!(movie = %self.name, group = %name, "Group deleted");
        true
    }

    pub fn disable_group(&self, name: &str) {
        {
            let mut disabled = self
                .disabled_groups
                .write()
                .unwrap_or_else(|p| p.into_inner());
            if !disabled.iter().any(|g| g.eq_ignore_ascii_case(name)) {
                disabled.push(name.to_string());
            }
        }
        if let Ok(group) = self.find_group(name) {
            group.set_enabled(false);
        }
    }

    pub fn enable_group(&self, name: &str) {
        self.disabled_groups
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|g| !g.eq_ignore_ascii_case(name));
        if let Ok(group) = self.find_group(name) {
            group.set_enabled(true);
        }
    }

    pub fn create_unique_name(&self) -> String {
        let n = self.unique_counter.fetch_add(1, Ordering::Relaxed);
        format!("@RndGroup{n}")
    }

    // ------------------------------------------------------------------
    // Extension handlers
    // ------------------------------------------------------------------

    /// Attaches the configured handlers, or the default one when none of
    /// them can be built.
    pub fn attach_extensions(&self, registry: &ExtensionRegistry) {
        for name in &self.config.extensions {
            if !self.create_extension(name, registry) {
                warn!(movie = %self.name, handler = %name, "Unknown extension handler");
            }
        }
        self.ensure_default(registry);
    }

    fn ensure_default(&self, registry: &ExtensionRegistry) {
        if self.extension_count() == 0 {
            self.create_extension(DEFAULT_HANDLER, registry);
        }
    }

    fn create_extension(&self, name: &str, registry: &ExtensionRegistry) -> bool {
        let Some(handler) = registry.create(name) else {
            return false;
        };
        guarded(&self.name, "on_register", || handler.on_register(self));
        self.extensions
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(handler);
        debug!(movie = %self.name, handler = %name, "Extension attached");
        true
    }

    pub fn extension_count(&self) -> usize {
        self.extensions.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn extension_names(&self) -> Vec<String> {
        self.extensions
            .read()
            .map(|e| e.iter().map(|h| h.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Unregisters the named handler. The default handler takes over when
    /// the last one goes.
    pub fn delete_extension(&self, name: &str, registry: &ExtensionRegistry) -> bool {
        if !self.detach_extension(name) {
            return false;
        }
        self.ensure_default(registry);
        true
    }

    fn detach_extension(&self, name: &str) -> bool {
        let handler = {
            let mut handlers = self.extensions.write().unwrap_or_else(|p| p.into_inner());
            match handlers.iter().position(|h| h.name().eq_ignore_ascii_case(name)) {
                Some(i) => handlers.remove(i),
                None => return false,
            }
        };
        guarded(&self.name, "on_unregister", || handler.on_unregister(self));
        true
    }

    /// Replaces the named handler with a fresh instance.
    pub fn reload_extension(&self, name: &str, registry: &ExtensionRegistry) -> bool {
        self.detach_extension(name);
        let created = self.create_extension(name, registry);
        self.ensure_default(registry);
        created
    }

    /// Unregisters every handler and attaches the configured set again.
    pub fn reload_all_extensions(&self, registry: &ExtensionRegistry) {
        self.detach_all_extensions();
        self.attach_extensions(registry);
    }

    pub(crate) fn detach_all_extensions(&self) {
        let handlers: Vec<Box<dyn ExtensionHandler>> = self
            .extensions
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        for handler in handlers {
            guarded(&self.name, "on_unregister", || handler.on_unregister(self));
        }
    }

    /// Hands a script-addressed message to every handler.
    pub fn forward_to_extensions(&self, user: &Arc<User>, msg: &Message) {
        self.each_extension("on_message", |h| h.on_message(self, user, msg));
    }

    fn each_extension<F>(&self, hook: &'static str, f: F)
    where
        F: Fn(&dyn ExtensionHandler),
    {
        let handlers = self.extensions.read().unwrap_or_else(|p| p.into_inner());
        for handler in handlers.iter() {
            guarded(&self.name, hook, || f(handler.as_ref()));
        }
    }
}

/// Runs a handler hook, absorbing panics so one handler cannot take the
/// movie down.
fn guarded<F: FnOnce()>(movie: &str, hook: &'static str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(movie = %movie, hook, "Extension handler panicked");
    }
}

impl std::fmt::Debug for Movie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Movie")
            .field("name", &self.name)
            .field("users", &self.users.len())
            .field("groups", &self.groups.len())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn movie(config: MovieConfig) -> Arc<Movie> {
        let m = Movie::new("Test", config, Clock::new());
        m.attach_extensions(&ExtensionRegistry::new());
        m
    }

    #[test]
    fn test_admission_and_duplicate() {
        let m = movie(MovieConfig::default());
        let (a, _ra) = User::with_channel("ann", "Test", 0);
        let (a2, _ra2) = User::with_channel("ANN", "Test", 0);
        assert_eq!(m.add_user(&a), Ok(Admission::Admitted));
        assert_eq!(m.add_user(&a2), Err(CommandError::ConnectionDuplicate));
        assert_eq!(m.user_count(), 1);
        assert_eq!(m.all_users().member_count(), 1);
        assert_eq!(m.state(), MovieState::Active);
    }

    #[test]
    fn test_connection_limit() {
        let m = movie(MovieConfig {
            connection_limit: 1,
            ..MovieConfig::default()
        });
        let (a, _ra) = User::with_channel("a", "Test", 0);
        let (b, _rb) = User::with_channel("b", "Test", 0);
        assert!(m.add_user(&a).is_ok());
        assert_eq!(m.add_user(&b), Err(CommandError::NoConnectionsAvailable));
        assert!(m.remove_user(&a));
        assert!(m.add_user(&b).is_ok());
    }

    #[test]
    fn test_closed_movie_refuses() {
        let m = movie(MovieConfig::default());
        assert!(m.try_close());
        assert!(!m.try_close());
        let (a, _ra) = User::with_channel("a", "Test", 0);
        assert_eq!(m.add_user(&a), Ok(Admission::Closed));
        assert_eq!(m.state(), MovieState::Destroyed);
    }

    #[test]
    fn test_join_rules() {
        let m = movie(MovieConfig {
            disabled_groups: vec!["@Closed".into()],
            ..MovieConfig::default()
        });
        let (a, _ra) = User::with_channel("a", "Test", 0);
        m.add_user(&a).unwrap();
        assert_eq!(m.join_group(&a, "Lobby").err(), Some(CommandError::InvalidGroupName));
        assert_eq!(m.join_group(&a, "@allusers").err(), Some(CommandError::InvalidGroupName));
        assert_eq!(m.join_group(&a, "@closed").err(), Some(CommandError::ErrorJoiningGroup));
        assert!(m.join_group(&a, "@Lobby").is_ok());
        assert_eq!(m.find_group("@LOBBY").unwrap().member_count(), 1);
    }

    #[test]
    fn test_leave_rules() {
        let m = movie(MovieConfig::default());
        let (a, _ra) = User::with_channel("a", "Test", 0);
        let (b, _rb) = User::with_channel("b", "Test", 0);
        m.add_user(&a).unwrap();
        m.add_user(&b).unwrap();
        m.join_group(&a, "@g").unwrap();
        assert_eq!(m.leave_group(&b, "@g"), Err(CommandError::ErrorLeavingGroup));
        assert_eq!(m.leave_group(&a, "@nope"), Err(CommandError::ErrorLeavingGroup));
        assert_eq!(m.leave_group(&a, "@AllUsers"), Err(CommandError::ErrorLeavingGroup));
        assert_eq!(m.leave_group(&a, "@g"), Ok(()));
        // Emptied groups stay until deleted.
        assert!(m.find_group("@g").is_ok());
        assert!(m.delete_group("@g"));
        assert!(!m.delete_group("@AllUsers"));
    }

    #[test]
    fn test_join_refused_for_absent_user() {
        let m = movie(MovieConfig::default());
        let (a, _ra) = User::with_channel("a", "Test", 0);
        let (stranger, _rs) = User::with_channel("A", "Test", 0);
        m.add_user(&a).unwrap();

        assert_eq!(m.join_group(&stranger, "@g").err(), Some(CommandError::ErrorJoiningGroup));
        assert!(m.remove_user(&a));
        assert_eq!(m.join_group(&a, "@g").err(), Some(CommandError::ErrorJoiningGroup));
        assert_eq!(a.group_count(), 0);
        assert!(m.find_group("@g").is_err());
    }

    #[test]
    fn test_remove_user_leaves_all_groups_and_notifies() {
        let m = movie(MovieConfig {
            notify_disconnect: vec!["@Watch".into()],
            ..MovieConfig::default()
        });
        let (a, _ra) = User::with_channel("a", "Test", 0);
        let (w, mut rw) = User::with_channel("w", "Test", 0);
        m.add_user(&a).unwrap();
        m.add_user(&w).unwrap();
        m.join_group(&a, "@x").unwrap();
        m.join_group(&w, "@Watch").unwrap();

        assert!(m.remove_user(&a));
        assert!(!m.remove_user(&a));
        assert_eq!(m.find_group("@x").unwrap().member_count(), 0);
        assert_eq!(a.group_count(), 0);

        match rw.try_recv().unwrap() {
            crate::directory::user::Outbound::Message(msg) => {
                assert_eq!(msg.subject, "Disconnected");
                assert_eq!(msg.recipients, vec!["@Watch".to_string()]);
                assert_eq!(msg.content, Value::from("a"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unique_names_increment() {
        let m = movie(MovieConfig::default());
        assert_eq!(m.create_unique_name(), "@RndGroup0");
        assert_eq!(m.create_unique_name(), "@RndGroup1");
    }

    #[test]
    fn test_required_level() {
        let m = movie(MovieConfig::default());
        assert_eq!(m.required_level("server", "shutdown"), 80);
        assert_eq!(m.required_level("Server", "getTime"), 0);
    }
}
