//! # Message Routing
//!
//! Resolves each recipient of an inbound message and delivers a copy:
//!
//! 1. `Local@Movie` and `Local@AllMovies` are re-resolved inside every
//!    target movie, with the sender rewritten to `user@origin` when the
//!    target differs from the origin.
//! 2. `system.<ns>.<cmd>` runs a command after the privilege check.
//! 3. Below the movie's messaging level, the sender gets a denial and
//!    nothing is delivered.
//! 4. `@Group` fans out to the current members; `Name` goes to one user.
//!
//! Missing groups and users are silent drops.

use crate::core::value::Value;
use crate::directory::movie::Movie;
use crate::directory::server::Server;
use crate::directory::user::User;
use crate::protocol::address::{is_all_movies, split_cross_movie, Address};
use crate::protocol::dispatcher::CommandContext;
use crate::protocol::error_code::ErrorCode;
use crate::protocol::message::Message;
use crate::utils::metrics::global_metrics;
use std::sync::Arc;
use tracing::{debug, warn};

impl Server {
    /// Routes `msg` from `user`, who is logged on to `movie`, to each of
    /// its recipients in order.
    /// Messages from a user whose disconnect has started are dropped.
    pub fn handle_message(&self, movie: &Arc<Movie>, user: &Arc<User>, msg: &Message) {
        if !user.is_connected() {
            global_metrics().delivery_dropped();
            debug!(user = %user.name(), "Sender already disconnected");
            return;
        }
        for recipient in &msg.recipients {
            match split_cross_movie(recipient) {
                Some((local, target)) => self.deliver_cross_movie(movie, user, msg, local, target),
                None => self.deliver_local(movie, user, recipient, msg),
            }
        }
    }

    fn deliver_cross_movie(
        &self,
        origin: &Arc<Movie>,
        user: &Arc<User>,
        msg: &Message,
        local: &str,
        target: &str,
    ) {
        let targets = if is_all_movies(target) {
            self.movies()
        } else {
            match self.find_movie(target) {
                Ok(movie) => vec![movie],
                Err(_) => {
                    debug!(recipient = %local, movie = %target, "Target movie not found");
                    return;
                }
            }
        };

        for movie in targets {
            if Arc::ptr_eq(&movie, origin) {
                self.deliver_local(&movie, user, local, msg);
            } else {
                let mut forwarded = msg.clone();
                forwarded.sender = format!("{}@{}", msg.sender, origin.name());
                self.deliver_local(&movie, user, local, &forwarded);
            }
        }
    }

    /// Delivers `msg` to one recipient address inside `movie`.
    pub fn deliver_local(&self, movie: &Arc<Movie>, user: &Arc<User>, recipient: &str, msg: &Message) {
        match Address::parse(recipient) {
            Address::System { namespace, command } => {
                self.run_command(movie, user, recipient, namespace, command, msg)
            }
            Address::MalformedSystem => {
                debug!(recipient = %recipient, "Malformed system address ignored");
            }
            _ if user.level() < movie.messaging_level() => self.deny(user, msg),
            Address::Group(name) => self.deliver_to_group(movie, user, name, msg),
            Address::User(name) => match movie.find_user(name) {
                Ok(target) => {
                    let copy = msg
                        .readdressed(target.name())
                        .with_timestamp(self.timestamp());
                    target.send(copy);
                }
                Err(_) => debug!(recipient = %name, movie = %movie.name(), "User not found, dropped"),
            },
        }
    }

    fn deliver_to_group(&self, movie: &Arc<Movie>, user: &Arc<User>, name: &str, msg: &Message) {
        let Ok(group) = movie.find_group(name) else {
            debug!(recipient = %name, movie = %movie.name(), "Group not found, dropped");
            return;
        };
        if Arc::ptr_eq(&group, movie.all_users()) && user.level() < movie.messaging_all_level() {
            debug!(user = %user.name(), "Below all-users messaging level, dropped");
            return;
        }
        let copy = msg.readdressed(group.name()).with_timestamp(self.timestamp());
        let delivered = group.broadcast(&copy);
        debug!(group = %group.name(), delivered, "Group broadcast");
    }

    fn run_command(
        &self,
        movie: &Arc<Movie>,
        user: &Arc<User>,
        address: &str,
        namespace: &str,
        command: &str,
        msg: &Message,
    ) {
        if user.level() < movie.required_level(namespace, command) {
            self.deny(user, msg);
            return;
        }

        let ctx = CommandContext {
            server: self,
            movie,
            user,
            address,
            namespace,
            command,
        };
        let replies = {
            let _gate = movie.command_gate();
            self.dispatcher().dispatch(&ctx, msg)
        };
        global_metrics().command_executed();

        match replies {
            Ok(replies) => {
                for reply in replies {
                    user.send(reply);
                }
            }
            Err(e) => warn!(error = %e, command = %address, "Command dispatch failed"),
        }
    }

    /// Sends the message back with its content cleared and the
    /// permission error set.
    fn deny(&self, user: &Arc<User>, msg: &Message) {
        global_metrics().permission_denied();
        debug!(user = %user.name(), subject = %msg.subject, "Not permitted with user level");
        let mut reply = msg
            .clone()
            .with_timestamp(self.timestamp())
            .with_error(ErrorCode::NotPermittedWithUserLevel);
        reply.content = Value::Void;
        user.send(reply);
    }
}
