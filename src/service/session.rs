//! # Client Session
//!
//! Drives one connection from logon to disconnect.
//!
//! ## Flow
//! ```text
//! connect ─▶ logon (bounded by logon_timeout) ─▶ loop {
//!     inbound frame  ─▶ sender overwritten ─▶ router
//!     outbox item    ─▶ encoded and written
//!     idle deadline  ─▶ IdleDisconnect, close
//!     shutdown       ─▶ close
//! } ─▶ directory removal
//! ```
//! Frames of one connection are decoded strictly in arrival order on this
//! task; deliveries from other users arrive through the outbox and never
//! block their senders.

use crate::core::codec::{FrameCodec, MessageCodec};
use crate::core::value::Value;
use crate::directory::server::Server;
use crate::directory::user::{Outbound, User};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::error_code::ErrorCode;
use crate::protocol::message::Message;
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::with_timeout;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Subject of logon requests and their replies.
pub const LOGON_SUBJECT: &str = "Logon";

/// Subject of the notice sent before an idle connection is closed.
pub const IDLE_SUBJECT: &str = "IdleDisconnect";

/// Envelope codec configured for `server`'s transport settings.
pub fn message_codec(server: &Server) -> MessageCodec {
    let frames = match server.connection_cipher() {
        Some(cipher) => FrameCodec::with_cipher(cipher),
        None => FrameCodec::new(),
    };
    MessageCodec::new(frames.max_payload(server.settings().transport.max_payload_size))
}

/// Credentials carried by a logon message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogonRequest {
    pub movie: String,
    pub user: String,
    pub password: String,
}

impl LogonRequest {
    /// Content `[movie, user, password]`; otherwise the first recipient
    /// names the movie and the sender names the user.
    pub fn from_message(msg: &Message) -> Self {
        if let Some(items) = msg.content.as_list() {
            let text: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if text.len() >= 2 && text.len() == items.len() {
                return Self {
                    movie: text[0].to_string(),
                    user: text[1].to_string(),
                    password: text.get(2).map(|p| p.to_string()).unwrap_or_default(),
                };
            }
        }
        Self {
            movie: msg.recipients.first().cloned().unwrap_or_default(),
            user: msg.sender.clone(),
            password: String::new(),
        }
    }
}

/// Runs a connection to completion. Returns `Ok` for orderly closes.
#[instrument(skip(server, stream, shutdown), fields(peer = %peer))]
pub async fn run_session<S>(
    server: Arc<Server>,
    stream: S,
    peer: String,
    shutdown: CancellationToken,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, message_codec(&server));

    let first = with_timeout(server.settings().server.logon_timeout, async {
        match framed.next().await {
            Some(result) => result,
            None => Err(ProtocolError::ConnectionClosed),
        }
    })
    .await?;

    let request = LogonRequest::from_message(&first);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ip = peer
        .parse::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| peer.clone());

    let user = match server.logon(&request.movie, &request.user, &request.password, &ip, tx) {
        Ok((user, movie)) => {
            let reply = Message::from_system(LOGON_SUBJECT, user.name(), Value::from(movie.name()))
                .with_timestamp(server.timestamp());
            framed.send(reply).await?;
            info!(user = %user.name(), movie = %movie.name(), level = user.level(), "Logon accepted");
            user
        }
        Err(e) => {
            let reply =
                Message::from_system(LOGON_SUBJECT, &request.user, Value::from(request.movie.as_str()))
                    .with_timestamp(server.timestamp())
                    .with_error(e.code());
            // The refusal is best effort; the connection closes either way.
            let _ = framed.send(reply).await;
            return Err(ProtocolError::Logon(e.code()));
        }
    };

    let outcome = serve_user(&server, &user, &mut framed, &mut rx, &shutdown).await;
    server.disconnect_user(&user);
    let _ = framed.close().await;

    match &outcome {
        Ok(()) => debug!(user = %user.name(), "Session closed"),
        Err(e) => warn!(user = %user.name(), error = %e, "Session ended with error"),
    }
    outcome
}

async fn serve_user<S>(
    server: &Server,
    user: &Arc<User>,
    framed: &mut Framed<S, MessageCodec>,
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
    shutdown: &CancellationToken,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let idle = server.settings().server.idle_timeout;
    let idle_sleep = tokio::time::sleep(idle);
    tokio::pin!(idle_sleep);

    loop {
        tokio::select! {
            inbound = framed.next() => match inbound {
                Some(Ok(mut msg)) => {
                    if !user.is_connected() {
                        debug!(user = %user.name(), "Inbound message after disconnect dropped");
                        continue;
                    }
                    idle_sleep.as_mut().reset(Instant::now() + idle);
                    msg.sender = user.name().to_string();
                    match server.find_movie(&user.movie_name()) {
                        Ok(movie) => server.handle_message(&movie, user, &msg),
                        Err(_) => warn!(user = %user.name(), "Sender's movie is gone"),
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    debug!(reason = constants::ERR_CONNECTION_CLOSED, "Peer closed");
                    return Ok(());
                }
            },

            outbound = rx.recv() => match outbound {
                Some(Outbound::Message(msg)) => framed.send(msg).await?,
                Some(Outbound::Disconnect) | None => return Ok(()),
            },

            _ = &mut idle_sleep, if !idle.is_zero() => {
                global_metrics().idle_disconnect();
                info!(user = %user.name(), idle_secs = idle.as_secs(), "Idle timeout");
                let notice = Message::from_system(IDLE_SUBJECT, user.name(), Value::Void)
                    .with_timestamp(server.timestamp())
                    .with_error(ErrorCode::MessageContainsErrorInfo);
                let _ = framed.send(notice).await;
                return Err(ProtocolError::ConnectionTimeout);
            }

            _ = shutdown.cancelled() => {
                debug!(user = %user.name(), "Shutdown closes session");
                return Ok(());
            }
        }
    }
}
