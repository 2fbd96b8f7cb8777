//! Named broadcast channel scoped to a movie.

use crate::core::proplist::PropList;
use crate::core::value::Value;
use crate::directory::user::User;
use crate::error::{CommandError, CommandResult};
use crate::protocol::message::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug)]
pub struct Group {
    name: String,
    members: RwLock<Vec<Arc<User>>>,
    size_limit: Option<usize>,
    enabled: AtomicBool,
    attributes: RwLock<PropList>,
}

impl Group {
    pub fn new(name: &str, size_limit: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            members: RwLock::new(Vec::new()),
            size_limit,
            enabled: AtomicBool::new(true),
            attributes: RwLock::new(PropList::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size_limit(&self) -> Option<usize> {
        self.size_limit
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Adds a member. Joining twice is a no-op; a full group refuses.
    pub fn add_user(&self, user: &Arc<User>) -> CommandResult<()> {
        let mut members = self.members.write().unwrap_or_else(|p| p.into_inner());
        if members.iter().any(|m| Arc::ptr_eq(m, user)) {
            return Ok(());
        }
        if self.size_limit.is_some_and(|limit| members.len() >= limit) {
            return Err(CommandError::ErrorJoiningGroup);
        }
        members.push(Arc::clone(user));
        user.record_join(&self.name);
        Ok(())
    }

    /// Removes a member; returns whether it was one.
    pub fn remove_user(&self, user: &User) -> bool {
        let mut members = self.members.write().unwrap_or_else(|p| p.into_inner());
        let before = members.len();
        members.retain(|m| !std::ptr::eq(Arc::as_ptr(m), user));
        let removed = members.len() != before;
        if removed {
            user.record_leave(&self.name);
        }
        removed
    }

    /// Empties the group, returning the former members.
    pub fn remove_all(&self) -> Vec<Arc<User>> {
        let drained: Vec<Arc<User>> = {
            let mut members = self.members.write().unwrap_or_else(|p| p.into_inner());
            members.drain(..).collect()
        };
        for user in &drained {
            user.record_leave(&self.name);
        }
        drained
    }

    pub fn members(&self) -> Vec<Arc<User>> {
        self.members
            .read()
            .map(|m| m.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }

    pub fn member_count(&self) -> usize {
        self.members.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members()
            .iter()
            .map(|u| u.name().to_string())
            .collect()
    }

    /// Delivers a copy of `msg` to every current member. The read lock is
    /// held for the whole fan-out so the recipient set is exactly the
    /// membership at send time. Returns the number of successful queues.
    pub fn broadcast(&self, msg: &Message) -> usize {
        let members = self.members.read().unwrap_or_else(|p| p.into_inner());
        members.iter().filter(|m| m.send(msg.clone())).count()
    }

    /// Sets each `name: value` pair of `attrs`.
    pub fn set_attributes(&self, attrs: &PropList) -> CommandResult<()> {
        let mut stored = self.attributes.write().unwrap_or_else(|p| p.into_inner());
        for (key, value) in attrs.iter() {
            let name = key.as_str().ok_or(CommandError::BadParameter)?;
            stored.set(name, value.clone());
        }
        Ok(())
    }

    /// Found attributes only; unknown names are skipped.
    pub fn get_attributes(&self, names: &[String]) -> PropList {
        let stored = self.attributes.read().unwrap_or_else(|p| p.into_inner());
        names
            .iter()
            .filter_map(|n| stored.find(n).map(|v| (Value::symbol(n), v.clone())))
            .collect()
    }

    pub fn attribute_names(&self) -> Vec<Value> {
        let stored = self.attributes.read().unwrap_or_else(|p| p.into_inner());
        stored
            .keys()
            .iter()
            .filter_map(|k| k.as_str().map(Value::symbol))
            .collect()
    }

    pub fn delete_attributes(&self, names: &[String]) {
        let mut stored = self.attributes.write().unwrap_or_else(|p| p.into_inner());
        for name in names {
            stored.remove(name);
        }
    }
}
