//! Timeout defaults and an async wrapper that maps elapsed deadlines onto
//! [`ProtocolError::Timeout`].

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Idle time after which a silent connection is dropped.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Time a new connection has to send its logon message.
pub const LOGON_TIMEOUT: Duration = Duration::from_secs(30);

/// Time the listener waits for sessions to finish during shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between a `restart` command and the restart itself.
pub const RESTART_GRACE: Duration = Duration::from_secs(15);

/// Delay between a `shutdown` command and the shutdown itself.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}
