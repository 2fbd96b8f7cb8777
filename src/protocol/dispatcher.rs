//! # System Command Dispatcher
//!
//! Maps `system.<namespace>.<command>` addresses to handlers. Keys are
//! case-insensitive and stored as `NAMESPACE.COMMAND`. A namespace may also
//! carry a catch-all handler that receives every command in it.
//!
//! Handler failures never escape: a [`CommandError`] becomes a reply to the
//! caller carrying the error's wire code and an `Integer(0)` placeholder.

use crate::core::value::Value;
use crate::directory::movie::Movie;
use crate::directory::server::Server;
use crate::directory::user::User;
use crate::error::{constants, CommandResult, ProtocolError, Result};
use crate::protocol::error_code::ErrorCode;
use crate::protocol::message::Message;
use crate::utils::metrics::Timer;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, instrument};

/// Everything a command handler may touch.
pub struct CommandContext<'a> {
    pub server: &'a Server,
    pub movie: &'a Arc<Movie>,
    pub user: &'a Arc<User>,
    /// Full recipient address, e.g. `system.group.join`.
    pub address: &'a str,
    pub namespace: &'a str,
    pub command: &'a str,
}

impl CommandContext<'_> {
    /// Fresh reply to the caller: same subject and reliability, sent from
    /// the command address with a new timestamp, empty content.
    pub fn reply(&self, msg: &Message) -> Message {
        Message {
            error_code: 0,
            timestamp: self.server.timestamp(),
            subject: msg.subject.clone(),
            sender: self.address.to_string(),
            recipients: vec![self.user.name().to_string()],
            content: Value::Void,
            reliable: msg.reliable,
        }
    }

    pub fn reply_with(&self, msg: &Message, content: Value) -> Message {
        Message {
            content,
            ..self.reply(msg)
        }
    }

    /// The caller's own message sent back with a new timestamp.
    pub fn echo(&self, msg: &Message) -> Message {
        msg.clone().with_timestamp(self.server.timestamp())
    }

    /// Error reply carrying `Integer(0)`.
    pub fn failure(&self, msg: &Message, code: ErrorCode) -> Message {
        self.reply_with(msg, Value::Integer(0)).with_error(code)
    }
}

type HandlerFn =
    dyn Fn(&CommandContext<'_>, &Message) -> CommandResult<Vec<Message>> + Send + Sync + 'static;

pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<Cow<'static, str>, Box<HandlerFn>>>>,
    namespaces: Arc<RwLock<HashMap<Cow<'static, str>, Option<Box<HandlerFn>>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            namespaces: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers `namespace.command`, e.g. `"group.join"`.
    pub fn register<F>(&self, key: &str, handler: F) -> Result<()>
    where
        F: Fn(&CommandContext<'_>, &Message) -> CommandResult<Vec<Message>>
            + Send
            + Sync
            + 'static,
    {
        let key = key.to_ascii_uppercase();
        let namespace = key.split('.').next().unwrap_or_default().to_string();

        let mut handlers = self.handlers.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;
        handlers.insert(Cow::Owned(key), Box::new(handler));
        drop(handlers);

        let mut namespaces = self.namespaces.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;
        namespaces.entry(Cow::Owned(namespace)).or_insert(None);
        Ok(())
    }

    /// Registers a handler for every command of `namespace` that has no
    /// handler of its own.
    pub fn register_namespace<F>(&self, namespace: &str, handler: F) -> Result<()>
    where
        F: Fn(&CommandContext<'_>, &Message) -> CommandResult<Vec<Message>>
            + Send
            + Sync
            + 'static,
    {
        let mut namespaces = self.namespaces.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;
        namespaces.insert(
            Cow::Owned(namespace.to_ascii_uppercase()),
            Some(Box::new(handler)),
        );
        Ok(())
    }

    /// Runs the command and returns the replies for the caller.
    ///
    /// A known namespace with an unknown command yields an
    /// `InvalidServerCommand` reply; an unknown namespace yields nothing.
    #[instrument(skip(self, ctx, msg), fields(user = %ctx.user.name(), command = %ctx.address))]
    pub fn dispatch(&self, ctx: &CommandContext<'_>, msg: &Message) -> Result<Vec<Message>> {
        let _timer = Timer::start("command_dispatch");
        let key = command_key(ctx.namespace, ctx.command);

        let outcome = {
            let handlers = self.handlers.read().map_err(|_| {
                ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string())
            })?;
            handlers.get(key.as_str()).map(|handler| handler(ctx, msg))
        };

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => {
                let namespaces = self.namespaces.read().map_err(|_| {
                    ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string())
                })?;
                match namespaces.get(ctx.namespace.to_ascii_uppercase().as_str()) {
                    Some(Some(fallback)) => fallback(ctx, msg),
                    Some(None) => {
                        debug!("Unknown command in known namespace");
                        return Ok(vec![ctx.reply(msg).with_error(ErrorCode::InvalidServerCommand)]);
                    }
                    None => {
                        debug!("Unknown command namespace ignored");
                        return Ok(Vec::new());
                    }
                }
            }
        };

        Ok(outcome.unwrap_or_else(|e| {
            debug!(error = %e, "Command failed");
            vec![ctx.failure(msg, e.code())]
        }))
    }
}

fn command_key(namespace: &str, command: &str) -> String {
    format!("{namespace}.{command}").to_ascii_uppercase()
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.handlers.read().map(|h| h.len()).unwrap_or(0);
        f.debug_struct("Dispatcher").field("commands", &count).finish()
    }
}
