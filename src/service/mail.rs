//! Outbound notification hand-off for `system.server.sendEmail`.
//!
//! Delivery itself happens outside the server; a [`Mailer`] only accepts
//! the request.

use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub relay_host: String,
    pub body: Vec<String>,
}

pub trait Mailer: Send + Sync {
    fn submit(&self, mail: OutboundMail);
}

impl<M: Mailer + ?Sized> Mailer for Arc<M> {
    fn submit(&self, mail: OutboundMail) {
        (**self).submit(mail);
    }
}

/// Logs each request and drops it.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn submit(&self, mail: OutboundMail) {
        info!(
            sender = %mail.sender,
            recipient = %mail.recipient,
            subject = %mail.subject,
            relay = %mail.relay_host,
            lines = mail.body.len(),
            "Email accepted"
        );
    }
}

/// Keeps every request; useful for inspecting what commands produced.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<OutboundMail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<OutboundMail> {
        std::mem::take(&mut *self.outbox.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

impl Mailer for MemoryMailer {
    fn submit(&self, mail: OutboundMail) {
        self.outbox
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(mail);
    }
}
