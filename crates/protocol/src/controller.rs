//! Connection controller: framed, handler-dispatched I/O over one TCP
//! peer.
//!
//! The controller is symmetric. A server wraps an accepted socket with
//! [`ConnectionController::set_connection`]; a client dials out with
//! [`ConnectionController::connect`]. Either way it owns the only read
//! and write paths for that peer:
//!
//! - [`send`](ConnectionController::send) enqueues a frame into a bounded
//!   queue and never blocks; a single write loop drains the queue, so
//!   frames leave in enqueue order.
//! - The read loop decodes one frame at a time and dispatches it to the
//!   handler registered for its type. Handlers run on the read path and
//!   must not block; sending to the same controller from a handler is
//!   fine because `send` is non-blocking.
//! - With `attempt_reconnect` set, a lost connection is redialed with a
//!   fixed 2-second backoff for up to 100 attempts.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{ControllerError, ProtocolError, SendError};
use crate::frame::{MessageType, HEADER_LEN, MAX_FRAME_PAYLOAD};

/// Capacity of the bounded send queue.
pub const SEND_QUEUE_CAPACITY: usize = 64;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const MAX_RECONNECT_ATTEMPTS: u32 = 100;

/// A message handler: receives the complete raw frame (header included).
pub type Handler = Arc<dyn Fn(&[u8]) -> Result<(), ProtocolError> + Send + Sync>;

type DisconnectHook = Arc<dyn Fn() + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ConnectionController {
    handlers: Mutex<HashMap<MessageType, Handler>>,
    outgoing_tx: mpsc::Sender<Bytes>,
    outgoing_rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
    stream: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
    attempt_reconnect: AtomicBool,
    closed: AtomicBool,
    dial_target: Mutex<Option<(String, u16)>>,
    peer_addr: Mutex<Option<SocketAddr>>,
    disconnect_hook: Mutex<Option<DisconnectHook>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ConnectionController {
    pub fn new() -> Arc<ConnectionController> {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(ConnectionController {
            handlers: Mutex::new(HashMap::new()),
            outgoing_tx,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
            attempt_reconnect: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            dial_target: Mutex::new(None),
            peer_addr: Mutex::new(None),
            disconnect_hook: Mutex::new(None),
            shutdown_tx,
        })
    }

    pub fn register_handler(&self, msg_type: MessageType, handler: Handler) {
        lock(&self.handlers).insert(msg_type, handler);
    }

    pub fn delete_handler(&self, msg_type: MessageType) {
        lock(&self.handlers).remove(&msg_type);
    }

    /// Drops every registered handler. Handlers close over session state
    /// that in turn holds this controller; clearing the table on final
    /// disconnect breaks that cycle so both sides can be freed.
    pub fn clear_handlers(&self) {
        lock(&self.handlers).clear();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_attempt_reconnect(&self, enabled: bool) {
        self.attempt_reconnect.store(enabled, Ordering::SeqCst);
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *lock(&self.peer_addr)
    }

    /// Runs `hook` every time the connection drops, before any reconnect
    /// attempt. Owners use this to prune per-peer state.
    pub fn set_disconnect_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *lock(&self.disconnect_hook) = Some(Arc::new(hook));
    }

    /// Adopts an already-established socket (the accepting side).
    pub fn set_connection(&self, stream: TcpStream) -> Result<(), ControllerError> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(ControllerError::AlreadyConnected);
        }
        *lock(&self.peer_addr) = stream.peer_addr().ok();
        *lock(&self.stream) = Some(stream);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Dials `host:port` (the connecting side), retrying on the fixed
    /// backoff schedule until it connects or gives up.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), ControllerError> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(ControllerError::AlreadyConnected);
        }
        *lock(&self.dial_target) = Some((host.to_owned(), port));
        self.dial_with_retry(host, port).await
    }

    async fn dial_with_retry(&self, host: &str, port: u16) -> Result<(), ControllerError> {
        let mut attempts = 0;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(ControllerError::NotConnected);
            }
            match TcpStream::connect((host, port)).await {
                Ok(stream) => {
                    *lock(&self.peer_addr) = stream.peer_addr().ok();
                    *lock(&self.stream) = Some(stream);
                    self.connected.store(true, Ordering::SeqCst);
                    tracing::info!(host, port, "connected");
                    return Ok(());
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= MAX_RECONNECT_ATTEMPTS {
                        return Err(ControllerError::ReconnectFailed { attempts });
                    }
                    tracing::debug!(host, port, attempts, error = %err, "connect failed, retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Enqueues a frame for the write loop. Non-blocking: a full queue or
    /// a downed peer comes back as an error for the caller to handle.
    pub fn send(&self, frame: Bytes) -> Result<(), SendError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SendError::NotConnected);
        }
        self.outgoing_tx.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::NotConnected,
        })
    }

    /// Drives the connection until it is closed or fails terminally.
    ///
    /// Runs the read and write loops over the current socket. On
    /// disconnect the `connected` flag drops first, the disconnect hook
    /// fires, and then - if `attempt_reconnect` is set and the controller
    /// dialed out originally - the dial loop runs before pumping resumes.
    pub async fn run(self: Arc<Self>) -> Result<(), ControllerError> {
        let mut outgoing_rx = lock(&self.outgoing_rx)
            .take()
            .ok_or(ControllerError::AlreadyRunning)?;
        loop {
            let stream = lock(&self.stream)
                .take()
                .ok_or(ControllerError::NotConnected)?;
            let result = self.pump(stream, &mut outgoing_rx).await;
            self.connected.store(false, Ordering::SeqCst);
            let hook = lock(&self.disconnect_hook).clone();
            if let Some(hook) = hook {
                hook();
            }
            if self.closed.load(Ordering::SeqCst) {
                return Ok(());
            }
            let err = match result {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            if !self.attempt_reconnect.load(Ordering::SeqCst) {
                return Err(err);
            }
            let target = lock(&self.dial_target).clone();
            let Some((host, port)) = target else {
                return Err(err);
            };
            tracing::warn!(error = %err, host, port, "connection lost, reconnecting");
            self.dial_with_retry(&host, port).await?;
        }
    }

    /// Spawns [`run`](ConnectionController::run) on the runtime.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<Result<(), ControllerError>> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let result = controller.run().await;
            if let Err(ref err) = result {
                tracing::debug!(error = %err, "connection controller terminated");
            }
            result
        })
    }

    /// Tears the connection down for good: no reconnect, run loop exits.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }

    async fn pump(
        &self,
        stream: TcpStream,
        outgoing_rx: &mut mpsc::Receiver<Bytes>,
    ) -> Result<(), ControllerError> {
        let (mut reader, mut writer) = stream.into_split();
        let mut read_shutdown = self.shutdown_tx.subscribe();
        let mut write_shutdown = self.shutdown_tx.subscribe();

        // One loop per direction so a slow handler can never corrupt a
        // partially-written frame and vice versa. `select!` between the
        // two: whichever side finishes (error or shutdown) ends the pump.
        let read_loop = self.drive_reader(&mut reader, &mut read_shutdown);
        let write_loop = drive_writer(&mut writer, outgoing_rx, &mut write_shutdown);
        tokio::pin!(read_loop, write_loop);
        tokio::select! {
            result = &mut read_loop => result,
            result = &mut write_loop => result,
        }
    }

    async fn drive_reader(
        &self,
        reader: &mut OwnedReadHalf,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ControllerError> {
        loop {
            tokio::select! {
                frame = read_frame(reader) => {
                    let frame = frame?;
                    self.dispatch(&frame)?;
                }
                // wait_for_stop observes an already-set flag, so a close()
                // racing the subscription is not lost
                _ = wait_for_stop(shutdown) => return Ok(()),
            }
        }
    }

    fn dispatch(&self, frame: &[u8]) -> Result<(), ProtocolError> {
        let msg_type = MessageType::try_from(frame[0])?;
        let handler = lock(&self.handlers)
            .get(&msg_type)
            .cloned()
            .ok_or(ProtocolError::NoHandler(msg_type))?;
        handler(frame)
    }
}

async fn drive_writer(
    writer: &mut OwnedWriteHalf,
    outgoing_rx: &mut mpsc::Receiver<Bytes>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), ControllerError> {
    loop {
        tokio::select! {
            message = outgoing_rx.recv() => {
                match message {
                    Some(message) => writer.write_all(&message).await?,
                    None => return Ok(()),
                }
            }
            _ = wait_for_stop(shutdown) => return Ok(()),
        }
    }
}

// Awaits the watch channel reaching `true` without holding the non-Send
// `watch::Ref` guard across an `.await` point, so this can be used inside
// `tokio::select!` in futures that must remain `Send`.
async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Bytes, ControllerError> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let payload_len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]);
    if payload_len > MAX_FRAME_PAYLOAD {
        return Err(ControllerError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame payload of {payload_len} bytes exceeds limit"),
        )));
    }
    let mut frame = vec![0u8; HEADER_LEN + payload_len as usize];
    frame[..HEADER_LEN].copy_from_slice(&header);
    reader.read_exact(&mut frame[HEADER_LEN..]).await?;
    Ok(Bytes::from(frame))
}
