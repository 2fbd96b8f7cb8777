//! # Extension Handlers
//!
//! Server-side logic attached to a movie. A handler observes the movie's
//! lifecycle (users logging on and off, groups created and deleted) and
//! receives every message addressed to `system.script.*`.
//!
//! Handlers are built by named factories held in an [`ExtensionRegistry`].
//! Reloading a handler means unregistering the running instance and
//! registering a freshly constructed one; there is no code reloading.
//!
//! Hooks run while the movie holds a read lock on its handler list, so a
//! hook must not reload or delete handlers of the same movie.

use crate::directory::group::Group;
use crate::directory::movie::Movie;
use crate::directory::user::User;
use crate::protocol::message::Message;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Name of the built-in handler every movie falls back to.
pub const DEFAULT_HANDLER: &str = "default";

pub trait ExtensionHandler: Send + Sync {
    fn name(&self) -> &str;

    fn on_register(&self, _movie: &Movie) {}

    fn on_unregister(&self, _movie: &Movie) {}

    fn on_user_login(&self, _movie: &Movie, _user: &Arc<User>) {}

    fn on_user_logout(&self, _movie: &Movie, _user: &Arc<User>) {}

    fn on_group_create(&self, _movie: &Movie, _group: &Arc<Group>) {}

    fn on_group_delete(&self, _movie: &Movie, _group: &Arc<Group>) {}

    fn on_message(&self, _movie: &Movie, _user: &Arc<User>, _msg: &Message) {}
}

/// No-op handler attached when a movie configures none.
#[derive(Debug, Default)]
pub struct DefaultHandler;

impl ExtensionHandler for DefaultHandler {
    fn name(&self) -> &str {
        DEFAULT_HANDLER
    }
}

type Factory = dyn Fn() -> Box<dyn ExtensionHandler> + Send + Sync;

/// Name → factory table. Names are case-insensitive.
pub struct ExtensionRegistry {
    factories: RwLock<HashMap<String, Arc<Factory>>>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionRegistry {
    /// Registry holding only the default handler.
    pub fn new() -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::new()),
        };
        registry.register(DEFAULT_HANDLER, || Box::new(DefaultHandler));
        registry
    }

    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn ExtensionHandler> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().unwrap_or_else(|p| p.into_inner());
        factories.insert(name.to_ascii_lowercase(), Arc::new(factory));
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut factories = self.factories.write().unwrap_or_else(|p| p.into_inner());
        factories.remove(&name.to_ascii_lowercase()).is_some()
    }

    /// Builds a new handler instance, or `None` for an unknown name.
    pub fn create(&self, name: &str) -> Option<Box<dyn ExtensionHandler>> {
        let factory = {
            let factories = self.factories.read().unwrap_or_else(|p| p.into_inner());
            factories.get(&name.to_ascii_lowercase()).cloned()
        };
        factory.map(|f| f())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .map(|f| f.contains_key(&name.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<String> {
        self.factories
            .read()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("names", &self.names())
            .finish()
    }
}
