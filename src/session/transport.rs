// Keygate — Transport channel
//
// The byte-oriented, message-framed channel to the key storage daemon. One
// background dispatch thread per session runs a single-threaded tokio
// runtime driving the Unix domain socket: it writes queued request lines,
// reads newline-framed inbound messages, routes correlated responses to
// blocked callers, and fires the registered observer for server-pushed
// notifications. Proxy calls block on the caller's thread until their
// response arrives, the channel dies, or the request timeout converts a
// stall into a reported runtime fault.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use zeroize::Zeroizing;

use crate::error::{KeygateError, Result};
use crate::model::SlotNumber;
use crate::proxy::codec::{self, Inbound, RpcCall, RpcRequest, RpcResponse};
use crate::proxy::observer::ObserverCell;

use super::SessionConfig;

type PendingMap = Arc<Mutex<HashMap<u64, std::sync::mpsc::Sender<RpcResponse>>>>;

/// Synchronous request/response access to a correlated message channel.
///
/// The seam between proxies and the wire: production code talks to the
/// daemon through `UdsTransporter`, tests substitute an in-memory channel.
pub trait Transporter: Send + Sync {
    /// Send one request and block until its correlated response arrives.
    fn round_trip(&self, call: RpcCall) -> Result<RpcResponse>;

    /// Whether the channel is currently believed usable.
    fn is_connected(&self) -> bool;
}

/// Production transporter over a Unix domain socket.
#[derive(Debug)]
pub struct UdsTransporter {
    submit_tx: tokio::sync::mpsc::UnboundedSender<Zeroizing<String>>,
    pending: PendingMap,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
    request_timeout: Duration,
    shutdown_tx: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl UdsTransporter {
    /// Connect to the daemon socket and start the dispatch thread. Blocks
    /// until the connection is up or fails.
    pub fn connect(config: &SessionConfig, observer: ObserverCell) -> Result<Arc<Self>> {
        let (submit_tx, submit_rx) = tokio::sync::mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(false));

        let socket_path = config.socket_path.clone();
        let dispatch_pending = pending.clone();
        let dispatch_connected = connected.clone();

        let worker = std::thread::Builder::new()
            .name("keygate-dispatch".to_string())
            .spawn(move || {
                dispatch_main(
                    socket_path,
                    submit_rx,
                    shutdown_rx,
                    dispatch_pending,
                    dispatch_connected,
                    observer,
                    ready_tx,
                );
            })
            .map_err(|e| {
                KeygateError::RuntimeFault(format!("failed to spawn dispatch thread: {}", e))
            })?;

        match ready_rx.recv_timeout(config.connect_timeout) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                return Err(KeygateError::RuntimeFault(format!(
                    "no connection to the key store within {:?}",
                    config.connect_timeout
                )));
            }
        }

        Ok(Arc::new(Self {
            submit_tx,
            pending,
            next_id: AtomicU64::new(1),
            connected,
            request_timeout: config.request_timeout,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// Stop the dispatch thread and join it. A failed join is a reported
    /// runtime fault, not a crash: the process must stay able to tell its
    /// own caller about the failure.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.lock().expect("shutdown lock poisoned").take() {
            // The dispatch loop may already be gone; that is fine.
            let _ = tx.send(());
        }
        let worker = self.worker.lock().expect("worker lock poisoned").take();
        if let Some(handle) = worker {
            handle.join().map_err(|_| {
                KeygateError::RuntimeFault("dispatch thread panicked before join".to_string())
            })?;
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Transporter for UdsTransporter {
    fn round_trip(&self, call: RpcCall) -> Result<RpcResponse> {
        if !self.is_connected() {
            return Err(KeygateError::RuntimeFault(
                "channel to the key store is disconnected".to_string(),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, call.method, call.params);
        let line = Zeroizing::new(request.to_line()?);

        let (reply_tx, reply_rx) = std::sync::mpsc::channel();
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(id, reply_tx);

        if self.submit_tx.send(line).is_err() {
            self.pending.lock().expect("pending map poisoned").remove(&id);
            return Err(KeygateError::RuntimeFault(
                "dispatch thread is no longer running".to_string(),
            ));
        }

        match reply_rx.recv_timeout(self.request_timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => {
                self.pending.lock().expect("pending map poisoned").remove(&id);
                Err(KeygateError::RuntimeFault(format!(
                    "no response to '{}' within {:?}",
                    call.method, self.request_timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(KeygateError::RuntimeFault(
                "channel closed while awaiting the response".to_string(),
            )),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for UdsTransporter {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("transport shutdown on drop failed: {}", e);
        }
    }
}

// ─── Dispatch Loop ───────────────────────────────────────────────────────────

/// Body of the dispatch thread: the event-reactor loop of the session.
#[allow(clippy::too_many_arguments)]
fn dispatch_main(
    socket_path: PathBuf,
    mut submit_rx: tokio::sync::mpsc::UnboundedReceiver<Zeroizing<String>>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    observer: ObserverCell,
    ready_tx: std::sync::mpsc::Sender<Result<()>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready_tx.send(Err(KeygateError::RuntimeFault(format!(
                "failed to build dispatch reactor: {}",
                e
            ))));
            return;
        }
    };

    runtime.block_on(async move {
        let stream = match UnixStream::connect(&socket_path).await {
            Ok(s) => s,
            Err(e) => {
                let _ = ready_tx.send(Err(KeygateError::RuntimeFault(format!(
                    "cannot connect to key store at {}: {}",
                    socket_path.display(),
                    e
                ))));
                return;
            }
        };
        connected.store(true, Ordering::SeqCst);
        let _ = ready_tx.send(Ok(()));
        tracing::debug!(socket = %socket_path.display(), "key store channel connected");

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            tokio::select! {
                outbound = submit_rx.recv() => {
                    match outbound {
                        Some(line) => {
                            let mut framed = Zeroizing::new(String::with_capacity(line.len() + 1));
                            framed.push_str(&line);
                            framed.push('\n');
                            if let Err(e) = write_half.write_all(framed.as_bytes()).await {
                                tracing::error!("channel write failed: {}", e);
                                break;
                            }
                        }
                        // Every sender is gone: the transporter was dropped.
                        None => break,
                    }
                }
                inbound = lines.next_line() => {
                    match inbound {
                        Ok(Some(line)) => route_inbound(&line, &pending, &observer),
                        Ok(None) => {
                            tracing::warn!("key store closed the channel");
                            break;
                        }
                        Err(e) => {
                            tracing::error!("channel read failed: {}", e);
                            break;
                        }
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }

        connected.store(false, Ordering::SeqCst);
        // Dropping the reply senders fails every caller still blocked on a
        // response with a channel-closed runtime fault.
        pending.lock().expect("pending map poisoned").clear();
        tracing::debug!("dispatch loop stopped");
    });
}

/// Route one inbound wire line: a correlated response to its blocked
/// caller, a slot-change notification to the registered observer.
fn route_inbound(line: &str, pending: &PendingMap, observer: &ObserverCell) {
    match codec::parse_inbound(line) {
        Ok(Inbound::Response(response)) => {
            let sender = pending
                .lock()
                .expect("pending map poisoned")
                .remove(&response.id);
            match sender {
                // The caller may have timed out meanwhile; dropping the
                // response is the correct outcome then.
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => tracing::warn!(id = response.id, "response with unknown correlation id"),
            }
        }
        Ok(Inbound::Notification(n)) if n.method == codec::op::SLOT_UPDATED => {
            match n.params.get("slot").and_then(Value::as_u64) {
                Some(slot) => observer.notify(SlotNumber::new(slot)),
                None => tracing::warn!("slot_updated notification without a slot number"),
            }
        }
        Ok(Inbound::Notification(n)) => {
            tracing::debug!(method = %n.method, "ignoring unknown notification");
        }
        Err(e) => tracing::warn!("dropping malformed inbound message: {}", e),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
