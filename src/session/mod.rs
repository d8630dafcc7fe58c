// Keygate — Session Module
//
// Session lifecycle for the key storage access layer: configuration, the
// session handler owning the transport channel and provider registry, and a
// thin process-wide accessor shim for callers that expect a singleton.

mod handler;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use handler::{SessionAccess, SessionHandler};
pub use transport::{Transporter, UdsTransporter};

use crate::error::{KeygateError, Result};

/// Session configuration, fixed at init time.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The daemon's IPC endpoint address.
    pub socket_path: PathBuf,
    /// How long to wait for the channel to come up.
    pub connect_timeout: Duration,
    /// How long one blocking round trip may take before it is reported as a
    /// runtime fault instead of hanging the caller.
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Default socket path: `$XDG_RUNTIME_DIR/keygate/keygate.sock`
/// Falls back to `/tmp/keygate/keygate.sock`.
pub fn default_socket_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"));
    runtime_dir.join("keygate").join("keygate.sock")
}

// ─── Process-wide Accessor Shim ──────────────────────────────────────────────

static GLOBAL: Mutex<Option<Arc<SessionHandler>>> = Mutex::new(None);

/// Create the process-wide session handler. Must be called exactly once
/// before `instance()`; the returned handle can also be passed around
/// explicitly instead of going through the global accessor.
pub fn init(config: SessionConfig) -> Result<Arc<SessionHandler>> {
    let mut guard = GLOBAL.lock().expect("session registry poisoned");
    if guard.is_some() {
        return Err(KeygateError::InvalidUsageOrder(
            "session already initialized for this process".to_string(),
        ));
    }
    let handler = Arc::new(SessionHandler::new(config));
    *guard = Some(handler.clone());
    Ok(handler)
}

/// Access the process-wide session handler.
///
/// Calling this before `init()` is a local contract violation and
/// terminates the process after a fatal log entry.
pub fn instance() -> Arc<SessionHandler> {
    let guard = GLOBAL.lock().expect("session registry poisoned");
    match guard.as_ref() {
        Some(handler) => handler.clone(),
        None => {
            tracing::error!("fatal: session accessed before init()");
            panic!("session::instance() called before session::init()");
        }
    }
}

/// Tear the process-wide session down (tests and shutdown paths only).
pub fn reset() {
    let handler = GLOBAL.lock().expect("session registry poisoned").take();
    if let Some(handler) = handler {
        if let Err(e) = handler.shutdown() {
            tracing::error!("session shutdown during reset failed: {}", e);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_path_shape() {
        let path = default_socket_path();
        assert!(path.to_string_lossy().contains("keygate"));
        assert!(path.to_string_lossy().ends_with("keygate.sock"));
    }

    // The global shim is process-wide state, so its whole lifecycle lives in
    // one test to keep parallel test threads out of each other's way.
    #[test]
    fn test_global_shim_lifecycle() {
        let handler = init(SessionConfig::default()).expect("first init must succeed");
        assert!(
            Arc::ptr_eq(&handler, &instance()),
            "instance() must hand back the handler created by init()"
        );

        let err = init(SessionConfig::default()).unwrap_err();
        assert!(
            matches!(err, KeygateError::InvalidUsageOrder(_)),
            "a second init is a usage-order violation"
        );

        reset();

        // After reset the process may initialize a fresh session.
        let again = init(SessionConfig::default()).expect("init after reset must succeed");
        assert!(Arc::ptr_eq(&again, &instance()));
        reset();
    }
}
