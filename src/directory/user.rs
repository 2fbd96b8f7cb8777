//! A logged-on user and its outbound path.
//!
//! Each user owns an unbounded outbox drained by its session's writer, so a
//! delivery is a non-blocking push that never waits on the recipient's
//! socket. A closed outbox (session gone) turns deliveries into drops.

use crate::protocol::message::Message;
use crate::utils::metrics::global_metrics;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

/// Items queued for a session's writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(Message),
    /// Flush what is queued, then close the connection.
    Disconnect,
}

pub type Outbox = mpsc::UnboundedSender<Outbound>;
pub type OutboxReceiver = mpsc::UnboundedReceiver<Outbound>;

#[derive(Debug)]
pub struct User {
    name: String,
    movie: RwLock<String>,
    level: AtomicI32,
    /// Names of joined groups, as spelled when joined.
    groups: RwLock<Vec<String>>,
    created_at: Instant,
    ip: String,
    outbox: Outbox,
    connected: AtomicBool,
}

impl User {
    pub fn new(name: &str, movie: &str, ip: &str, level: i32, outbox: Outbox) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            movie: RwLock::new(movie.to_string()),
            level: AtomicI32::new(level),
            groups: RwLock::new(Vec::new()),
            created_at: Instant::now(),
            ip: ip.to_string(),
            outbox,
            connected: AtomicBool::new(true),
        })
    }

    /// User with a fresh outbox; returns the receiving end too.
    pub fn with_channel(name: &str, movie: &str, level: i32) -> (Arc<Self>, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(name, movie, "127.0.0.1", level, tx), rx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory key: names compare case-insensitively.
    pub fn key(&self) -> String {
        self.name.to_ascii_uppercase()
    }

    pub fn movie_name(&self) -> String {
        self.movie
            .read()
            .map(|m| m.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub(crate) fn set_movie(&self, movie: &str) {
        let mut guard = self.movie.write().unwrap_or_else(|p| p.into_inner());
        *guard = movie.to_string();
    }

    pub fn level(&self) -> i32 {
        self.level.load(Ordering::Relaxed)
    }

    pub fn set_level(&self, level: i32) {
        self.level.store(level, Ordering::Relaxed);
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups
            .read()
            .map(|g| g.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }

    pub fn group_count(&self) -> usize {
        self.groups.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_member(&self, group: &str) -> bool {
        self.groups
            .read()
            .map(|g| g.iter().any(|n| n.eq_ignore_ascii_case(group)))
            .unwrap_or(false)
    }

    pub(crate) fn record_join(&self, group: &str) {
        let mut groups = self.groups.write().unwrap_or_else(|p| p.into_inner());
        if !groups.iter().any(|n| n.eq_ignore_ascii_case(group)) {
            groups.push(group.to_string());
        }
    }

    pub(crate) fn record_leave(&self, group: &str) {
        let mut groups = self.groups.write().unwrap_or_else(|p| p.into_inner());
        groups.retain(|n| !n.eq_ignore_ascii_case(group));
    }

    pub(crate) fn clear_groups(&self) {
        self.groups
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    /// Queues a message. Returns `false` when the session is gone.
    pub fn send(&self, msg: Message) -> bool {
        if self.outbox.send(Outbound::Message(msg)).is_err() {
            global_metrics().delivery_dropped();
            debug!(user = %self.name, "Delivery dropped, outbox closed");
            return false;
        }
        true
    }

    /// Asks the session to close after flushing queued messages.
    pub fn request_disconnect(&self) {
        let _ = self.outbox.send(Outbound::Disconnect);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Marks the user disconnected. Only the first call returns `true`.
    pub(crate) fn mark_disconnected(&self) -> bool {
        self.connected.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;

    #[test]
    fn test_groups_case_insensitive() {
        let (user, _rx) = User::with_channel("Ann", "M", 0);
        user.record_join("@Lobby");
        user.record_join("@LOBBY");
        assert_eq!(user.group_count(), 1);
        assert!(user.is_member("@lobby"));
        user.record_leave("@lobby");
        assert_eq!(user.group_count(), 0);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (user, rx) = User::with_channel("Ann", "M", 0);
        assert!(user.send(Message::from_system("s", "Ann", Value::Void)));
        drop(rx);
        assert!(!user.send(Message::from_system("s", "Ann", Value::Void)));
    }

    #[test]
    fn test_disconnect_flag_once() {
        let (user, _rx) = User::with_channel("Ann", "M", 0);
        assert!(user.mark_disconnected());
        assert!(!user.mark_disconnected());
        assert!(!user.is_connected());
    }
}
