// Keygate — Session Handler
//
// Owns the channel to the key storage daemon and the per-session provider
// registry. The channel is established lazily: the dispatch thread spawns
// on the first proxy call, not at initialize(). Public operations are not
// thread-safe at the session level; callers serialize access.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::{KeygateError, Result};
use crate::proxy::observer::ObserverCell;
use crate::proxy::{KeyStorageProxy, X509Proxy};

use super::transport::{Transporter, UdsTransporter};
use super::SessionConfig;

/// What a provider proxy needs from its session: the live channel and the
/// process-wide observer registration cell.
pub trait SessionAccess: Send + Sync {
    /// The live channel, connecting or reconnecting as needed.
    fn transporter(&self) -> Result<Arc<dyn Transporter>>;

    /// The observer registration cell shared with the dispatch loop.
    fn observer_cell(&self) -> ObserverCell;
}

/// Provider instance cache: one proxy of each kind per session, created on
/// first access and reused, never re-created per call.
#[derive(Debug, Default)]
struct ProviderRegistry {
    key_storage: OnceLock<Arc<KeyStorageProxy>>,
    x509: OnceLock<Arc<X509Proxy>>,
}

/// One session to the key storage daemon.
#[derive(Debug)]
pub struct SessionHandler {
    config: SessionConfig,
    initialized: AtomicBool,
    transport: Mutex<Option<Arc<UdsTransporter>>>,
    observer: ObserverCell,
    providers: ProviderRegistry,
}

impl SessionHandler {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            initialized: AtomicBool::new(false),
            transport: Mutex::new(None),
            observer: ObserverCell::new(),
            providers: ProviderRegistry::default(),
        }
    }

    /// Bind the endpoint configuration. Exactly once per session; the
    /// actual connect happens lazily on the first proxy call.
    pub fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(KeygateError::InvalidUsageOrder(
                "session is already initialized".to_string(),
            ));
        }
        tracing::info!(
            socket = %self.config.socket_path.display(),
            "session endpoint bound"
        );
        Ok(())
    }

    /// The key storage provider for this session, created on first access.
    pub fn key_storage_provider(self: &Arc<Self>) -> Arc<KeyStorageProxy> {
        self.providers
            .key_storage
            .get_or_init(|| {
                let session: Arc<dyn SessionAccess> = self.clone();
                Arc::new(KeyStorageProxy::new(Arc::downgrade(&session)))
            })
            .clone()
    }

    /// The X.509 provider for this session, created on first access.
    pub fn x509_provider(self: &Arc<Self>) -> Arc<X509Proxy> {
        self.providers
            .x509
            .get_or_init(|| {
                let session: Arc<dyn SessionAccess> = self.clone();
                Arc::new(X509Proxy::new(Arc::downgrade(&session)))
            })
            .clone()
    }

    /// Stop the dispatch thread and join it. Safe to call when no channel
    /// was ever established.
    pub fn shutdown(&self) -> Result<()> {
        let transport = self.transport.lock().expect("transport lock poisoned").take();
        if let Some(transporter) = transport {
            transporter.shutdown()?;
            tracing::info!("session channel shut down");
        }
        Ok(())
    }
}

impl SessionAccess for SessionHandler {
    fn transporter(&self) -> Result<Arc<dyn Transporter>> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(KeygateError::InvalidUsageOrder(
                "session is not initialized — call initialize() first".to_string(),
            ));
        }

        let mut guard = self.transport.lock().expect("transport lock poisoned");
        if let Some(transporter) = guard.as_ref() {
            if transporter.is_connected() {
                return Ok(transporter.clone());
            }
            tracing::warn!("key store channel is down, attempting reconnect");
        }

        let transporter = UdsTransporter::connect(&self.config, self.observer.clone())?;
        *guard = Some(transporter.clone());
        Ok(transporter)
    }

    fn observer_cell(&self) -> ObserverCell {
        self.observer.clone()
    }
}

impl Drop for SessionHandler {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("session shutdown on drop failed: {}", e);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
