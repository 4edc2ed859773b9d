//! The session supervisor and the public client API.
//!
//! A [`Client`] is one logical session to a broker, materialized as two TCP
//! connections sharing one authenticated identity. The handle is a cheap
//! clone over shared state; hooks receive the same handle, which keeps the
//! back-channels reachable from hook code without reference cycles.

use crate::command;
use crate::data;
use crate::error::SessionError;
use crate::hooks::{BackMessage, HookReq, Hooks};
use crate::instr::{BindReq, Instr, StatusCallback, UnbindReq};
use fq_wire::{Message, Rk, MAX_SHORT_BLOCK};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::error;
use uuid::Uuid;

/// Default publish-queue and back-channel bound.
const DEFAULT_QMAXLEN: usize = 10_000;

/// Queue type used when the sender string does not name one.
const DEFAULT_QUEUE_TYPE: &str = "mem";

/// Command-queue depth between callers and the command worker.
const CMDQ_DEPTH: usize = 1_000;

/// Opaque per-session application data.
pub type Userdata = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct Creds {
    host: String,
    port: u16,
    user: String,
    pass: String,
    queue: String,
    queue_type: String,
}

struct WorkerChannels {
    cmdq_rx: mpsc::Receiver<Instr>,
    q_rx: mpsc::Receiver<Message>,
    signal_rx: mpsc::Receiver<bool>,
}

pub(crate) struct Shared {
    peer_mode: bool,

    creds: Mutex<Creds>,
    key: Mutex<Option<Rk>>,
    hooks: Mutex<Option<Arc<dyn Hooks>>>,
    userdata: Mutex<Option<Userdata>>,
    error: Mutex<Option<String>>,

    qmaxlen: AtomicUsize,
    non_blocking: AtomicBool,
    sync_hooks: AtomicBool,
    connected: AtomicBool,
    data_ready: AtomicBool,
    stop: AtomicBool,

    hb_interval_ms: AtomicU64,
    hb_max_age_ms: AtomicU64,
    hb_max_age_custom: AtomicBool,
    hb_last: Mutex<Instant>,
    hb_needed: AtomicBool,

    cmdq_tx: Mutex<Option<mpsc::Sender<Instr>>>,
    q_tx: Mutex<Option<mpsc::Sender<Message>>>,
    backq_tx: Mutex<Option<mpsc::Sender<BackMessage>>>,
    signal_tx: Mutex<Option<mpsc::Sender<bool>>>,
    workers: Mutex<Option<WorkerChannels>>,
    backq_rx: AsyncMutex<Option<mpsc::Receiver<BackMessage>>>,
}

/// A client session handle.
#[derive(Clone)]
pub struct Client {
    pub(crate) shared: Arc<Shared>,
}

impl Client {
    fn internal(peer_mode: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                peer_mode,
                creds: Mutex::new(Creds::default()),
                key: Mutex::new(None),
                hooks: Mutex::new(None),
                userdata: Mutex::new(None),
                error: Mutex::new(None),
                qmaxlen: AtomicUsize::new(DEFAULT_QMAXLEN),
                non_blocking: AtomicBool::new(false),
                sync_hooks: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                data_ready: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                hb_interval_ms: AtomicU64::new(1_000),
                hb_max_age_ms: AtomicU64::new(3_000),
                hb_max_age_custom: AtomicBool::new(false),
                hb_last: Mutex::new(Instant::now()),
                hb_needed: AtomicBool::new(false),
                cmdq_tx: Mutex::new(None),
                q_tx: Mutex::new(None),
                backq_tx: Mutex::new(None),
                signal_tx: Mutex::new(None),
                workers: Mutex::new(None),
                backq_rx: AsyncMutex::new(None),
            }),
        }
    }

    /// Create a client session.
    pub fn new() -> Self {
        Self::internal(false)
    }

    /// Create a peering session: the data channel uses the peer mode word
    /// and the peer message frame layout.
    pub fn new_peer() -> Self {
        Self::internal(true)
    }

    /// Supply the connection target and credentials.
    ///
    /// `sender` parses as `user[/queue[/queue_type]]`; a missing queue is
    /// generated as `q-<uuid>`, a missing type defaults to `"mem"`. Allocates
    /// the session channels. Fails if called twice.
    pub fn creds(&self, host: &str, port: u16, sender: &str, pass: &str) -> Result<(), SessionError> {
        let mut creds = self.shared.creds.lock().unwrap();
        if !creds.user.is_empty() {
            return Err(SessionError::Usage("credentials already supplied".into()));
        }
        let mut parts = sender.splitn(3, '/');
        let user = parts.next().unwrap_or_default();
        if user.is_empty() {
            return Err(SessionError::Usage("empty user".into()));
        }
        creds.user = user.to_string();
        match parts.next() {
            Some(queue) => {
                creds.queue = queue.to_string();
                if let Some(queue_type) = parts.next() {
                    creds.queue_type = queue_type.to_string();
                }
            }
            None => creds.queue = format!("q-{}", Uuid::new_v4()),
        }
        if creds.queue_type.is_empty() {
            creds.queue_type = DEFAULT_QUEUE_TYPE.to_string();
        }
        creds.pass = pass.to_string();
        creds.host = host.to_string();
        creds.port = port;

        // A bounded channel needs capacity for at least one message.
        let qmaxlen = self.shared.qmaxlen.load(Ordering::SeqCst).max(1);
        let (cmdq_tx, cmdq_rx) = mpsc::channel(CMDQ_DEPTH);
        let (q_tx, q_rx) = mpsc::channel(qmaxlen);
        let (backq_tx, backq_rx) = mpsc::channel(qmaxlen);
        let (signal_tx, signal_rx) = mpsc::channel(1);

        *self.shared.cmdq_tx.lock().unwrap() = Some(cmdq_tx);
        *self.shared.q_tx.lock().unwrap() = Some(q_tx);
        *self.shared.backq_tx.lock().unwrap() = Some(backq_tx);
        *self.shared.signal_tx.lock().unwrap() = Some(signal_tx);
        *self.shared.workers.lock().unwrap() = Some(WorkerChannels {
            cmdq_rx,
            q_rx,
            signal_rx,
        });
        match self.shared.backq_rx.try_lock() {
            Ok(mut guard) => *guard = Some(backq_rx),
            Err(_) => return Err(SessionError::Usage("receive in progress".into())),
        }
        Ok(())
    }

    /// Set the heartbeat interval, clamped to at most one second. A zero
    /// interval is floored to one millisecond, the wire resolution.
    ///
    /// Also tracks the maximum heartbeat age at three intervals unless
    /// [`Client::set_heartbeat_max_age`] was used. When the session is
    /// already authenticated the new interval is re-negotiated immediately.
    pub fn set_heartbeat(&self, interval: Duration) {
        let interval = interval.clamp(Duration::from_millis(1), Duration::from_secs(1));
        self.shared
            .hb_interval_ms
            .store(interval.as_millis() as u64, Ordering::SeqCst);
        if !self.shared.hb_max_age_custom.load(Ordering::SeqCst) {
            self.shared
                .hb_max_age_ms
                .store(3 * interval.as_millis() as u64, Ordering::SeqCst);
        }
        if self.shared.data_ready.load(Ordering::SeqCst) {
            self.heartbeat();
        }
    }

    /// Override the maximum heartbeat age; from now on it no longer tracks
    /// the interval.
    pub fn set_heartbeat_max_age(&self, max_age: Duration) {
        self.shared.hb_max_age_custom.store(true, Ordering::SeqCst);
        self.shared
            .hb_max_age_ms
            .store(max_age.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the publish-queue bound. Only effective before
    /// [`Client::creds`] allocates the queues; returns the effective value.
    pub fn set_backlog(&self, qmaxlen: usize) -> usize {
        if self.shared.q_tx.lock().unwrap().is_none() {
            self.shared.qmaxlen.store(qmaxlen, Ordering::SeqCst);
        }
        self.shared.qmaxlen.load(Ordering::SeqCst)
    }

    /// In non-blocking mode [`Client::publish`] fails fast instead of
    /// waiting for queue space.
    pub fn set_non_blocking(&self, non_blocking: bool) {
        self.shared.non_blocking.store(non_blocking, Ordering::SeqCst);
    }

    /// In sync-hook mode auth and command feedback is queued on the
    /// back-channel and dispatched from [`Client::receive`] instead of
    /// running on the protocol tasks.
    pub fn set_sync_hooks(&self, sync_hooks: bool) {
        self.shared.sync_hooks.store(sync_hooks, Ordering::SeqCst);
    }

    /// Install the hook set.
    pub fn set_hooks(&self, hooks: Arc<dyn Hooks>) {
        *self.shared.hooks.lock().unwrap() = Some(hooks);
    }

    /// Attach opaque application data to the session.
    pub fn set_userdata(&self, userdata: Userdata) {
        *self.shared.userdata.lock().unwrap() = Some(userdata);
    }

    /// The application data attached with [`Client::set_userdata`].
    pub fn userdata(&self) -> Option<Userdata> {
        self.shared.userdata.lock().unwrap().clone()
    }

    /// Number of messages waiting in the publish queue.
    pub fn data_backlog(&self) -> usize {
        match &*self.shared.q_tx.lock().unwrap() {
            Some(tx) => tx.max_capacity() - tx.capacity(),
            None => 0,
        }
    }

    /// True once authentication succeeded on the current connection.
    pub fn data_ready(&self) -> bool {
        self.shared.data_ready.load(Ordering::SeqCst)
    }

    /// The most recent fatal error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.shared.error.lock().unwrap().clone()
    }

    /// Request a heartbeat renegotiation at the configured interval.
    /// Silently dropped when unconnected.
    pub fn heartbeat(&self) {
        let Some(tx) = self.cmdq_tx() else { return };
        let interval = Duration::from_millis(self.shared.hb_interval_ms.load(Ordering::SeqCst));
        let _ = tx.try_send(Instr::Heartbeat { interval });
    }

    /// Enqueue a bind request. The bind hook fires when the reply arrives.
    /// Silently dropped when unconnected.
    pub fn bind(&self, req: BindReq) -> Result<(), SessionError> {
        if req.program.len() > MAX_SHORT_BLOCK {
            return Err(SessionError::Usage("program too long".into()));
        }
        if let Some(tx) = self.cmdq_tx() {
            let _ = tx.try_send(Instr::Bind(req));
        }
        Ok(())
    }

    /// Enqueue an unbind request. The unbind hook fires when the reply
    /// arrives. Silently dropped when unconnected.
    pub fn unbind(&self, req: UnbindReq) {
        if let Some(tx) = self.cmdq_tx() {
            let _ = tx.try_send(Instr::Unbind(req));
        }
    }

    /// Request broker status; `callback` runs once per returned pair.
    /// Silently dropped when unconnected.
    pub fn status<F>(&self, callback: F)
    where
        F: Fn(&str, u32) + Send + 'static,
    {
        if let Some(tx) = self.cmdq_tx() {
            let _ = tx.try_send(Instr::Status {
                callback: Box::new(callback) as StatusCallback,
                vals: Vec::new(),
            });
        }
    }

    /// Queue a message for the data channel.
    ///
    /// Blocks while the publish queue is full unless non-blocking mode is
    /// set, in which case a full queue returns `false`.
    pub async fn publish(&self, msg: Message) -> bool {
        let Some(tx) = ({ self.shared.q_tx.lock().unwrap().clone() }) else {
            return false;
        };
        if self.shared.non_blocking.load(Ordering::SeqCst) {
            tx.try_send(msg).is_ok()
        } else {
            tx.send(msg).await.is_ok()
        }
    }

    /// Take the next message from the back-channel, dispatching any queued
    /// hook feedback on the way.
    ///
    /// With `block = false` this never waits; with `block = true` it returns
    /// only a real message.
    pub async fn receive(&self, block: bool) -> Option<Message> {
        let mut guard = self.shared.backq_rx.lock().await;
        let rx = guard.as_mut()?;
        if block {
            loop {
                let bm = rx.recv().await?;
                if let Some(msg) = self.process_back_message(bm) {
                    return Some(msg);
                }
            }
        } else {
            loop {
                match rx.try_recv() {
                    Ok(bm) => {
                        if let Some(msg) = self.process_back_message(bm) {
                            return Some(msg);
                        }
                    }
                    Err(_) => return None,
                }
            }
        }
    }

    /// Spawn the command and data workers. Fails if already connected or if
    /// credentials were never supplied.
    pub fn connect(&self) -> Result<(), SessionError> {
        let workers = {
            let mut guard = self.shared.workers.lock().unwrap();
            if self.shared.connected.swap(true, Ordering::SeqCst) {
                return Err(SessionError::Usage("already connected".into()));
            }
            match guard.take() {
                Some(workers) => workers,
                None => {
                    self.shared.connected.store(false, Ordering::SeqCst);
                    return Err(SessionError::Usage("credentials not supplied".into()));
                }
            }
        };
        tokio::spawn(command::command_worker(self.clone(), workers.cmdq_rx));
        tokio::spawn(data::data_worker(
            self.clone(),
            workers.signal_rx,
            workers.q_rx,
        ));
        Ok(())
    }

    /// Request shutdown. Workers exit after their next iteration.
    pub fn destroy(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    // ---- engine-side helpers ----

    fn cmdq_tx(&self) -> Option<mpsc::Sender<Instr>> {
        self.shared.cmdq_tx.lock().unwrap().clone()
    }

    pub(crate) fn stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    pub(crate) fn peer_mode(&self) -> bool {
        self.shared.peer_mode
    }

    pub(crate) fn broker_addr(&self) -> Result<String, SessionError> {
        let creds = self.shared.creds.lock().unwrap();
        if creds.host.is_empty() {
            return Err(SessionError::Usage("credentials not supplied".into()));
        }
        Ok(format!("{}:{}", creds.host, creds.port))
    }

    /// The user, composed queue blob parts, and password for the auth
    /// sequence.
    pub(crate) fn auth_blobs(&self) -> (Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>) {
        let creds = self.shared.creds.lock().unwrap();
        (
            creds.user.clone().into_bytes(),
            creds.queue.clone().into_bytes(),
            creds.queue_type.clone().into_bytes(),
            creds.pass.clone().into_bytes(),
        )
    }

    pub(crate) fn install_session_key(&self, key: &[u8]) {
        *self.shared.key.lock().unwrap() = Some(Rk::from_bytes(key));
        self.shared.data_ready.store(true, Ordering::SeqCst);
    }

    pub(crate) fn session_key(&self) -> Option<Rk> {
        *self.shared.key.lock().unwrap()
    }

    pub(crate) fn clear_data_ready(&self) {
        self.shared.data_ready.store(false, Ordering::SeqCst);
    }

    pub(crate) fn hb_interval(&self) -> Duration {
        Duration::from_millis(self.shared.hb_interval_ms.load(Ordering::SeqCst))
    }

    pub(crate) fn hb_max_age(&self) -> Duration {
        Duration::from_millis(self.shared.hb_max_age_ms.load(Ordering::SeqCst))
    }

    pub(crate) fn set_hb_interval(&self, interval: Duration) {
        self.shared
            .hb_interval_ms
            .store(interval.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn touch_hb_last(&self) {
        *self.shared.hb_last.lock().unwrap() = Instant::now();
    }

    pub(crate) fn hb_age(&self) -> Duration {
        self.shared.hb_last.lock().unwrap().elapsed()
    }

    pub(crate) fn hb_needed(&self) -> bool {
        self.shared.hb_needed.load(Ordering::SeqCst)
    }

    /// The reader saw an inbound heartbeat: refresh liveness and start
    /// mirroring ticks.
    pub(crate) fn note_heartbeat(&self) {
        self.touch_hb_last();
        self.shared.hb_needed.store(true, Ordering::SeqCst);
    }

    /// Store a fatal error and run the error-log hook.
    pub(crate) fn record_error(&self, err: &SessionError) {
        let text = err.to_string();
        error!("session error: {text}");
        *self.shared.error.lock().unwrap() = Some(text.clone());
        self.run_hook(|hooks, client| hooks.error_log(client, &text));
    }

    /// Run a hook, isolating panics from the protocol tasks.
    pub(crate) fn run_hook<F>(&self, f: F)
    where
        F: FnOnce(&dyn Hooks, &Client),
    {
        let hooks = self.shared.hooks.lock().unwrap().clone();
        if let Some(hooks) = hooks {
            if catch_unwind(AssertUnwindSafe(|| f(hooks.as_ref(), self))).is_err() {
                error!("hook panicked; continuing");
            }
        }
    }

    /// Run the message hook; `true` means the message was consumed.
    pub(crate) fn run_message_hook(&self, msg: &Message) -> bool {
        let hooks = self.shared.hooks.lock().unwrap().clone();
        match hooks {
            Some(hooks) => catch_unwind(AssertUnwindSafe(|| hooks.message(self, msg)))
                .unwrap_or(false),
            None => false,
        }
    }

    /// Dispatch completed command feedback: directly in async-hook mode, via
    /// the back-channel in sync mode.
    pub(crate) async fn dispatch_cmd_feedback(&self, instr: Instr) {
        if self.shared.sync_hooks.load(Ordering::SeqCst) {
            self.push_back_message(BackMessage::hook(HookReq::Cmd(instr)))
                .await;
        } else {
            self.handle_hook(instr);
        }
    }

    pub(crate) fn handle_hook(&self, instr: Instr) {
        match instr {
            Instr::Bind(req) => self.run_hook(|hooks, client| hooks.bind(client, &req)),
            Instr::Unbind(req) => self.run_hook(|hooks, client| hooks.unbind(client, &req)),
            Instr::Status { callback, vals } => {
                for (key, value) in &vals {
                    callback(key, *value);
                }
            }
            other => self.run_hook(|hooks, client| {
                hooks.error_log(client, &format!("sync cmd feedback unknown: {other:?}"))
            }),
        }
    }

    /// Deliver the auth result: directly in async-hook mode, via the
    /// back-channel in sync mode. The sync-mode entry is always allocated.
    pub(crate) async fn deliver_auth_hook(&self, err: Option<String>) {
        if self.shared.sync_hooks.load(Ordering::SeqCst) {
            self.push_back_message(BackMessage::hook(HookReq::Auth(Instr::Auth { err })))
                .await;
        } else {
            self.run_hook(|hooks, client| hooks.auth(client, err.as_deref()));
        }
    }

    /// Wake the data worker; sent exactly once per command session attempt.
    pub(crate) async fn send_signal(&self) {
        let tx = self.shared.signal_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(true).await;
        }
    }

    /// Enqueue on the back-channel; `false` when the session is gone.
    pub(crate) async fn push_back_message(&self, bm: BackMessage) -> bool {
        let tx = self.shared.backq_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(bm).await.is_ok(),
            None => false,
        }
    }

    fn process_back_message(&self, bm: BackMessage) -> Option<Message> {
        if let Some(hreq) = bm.hreq {
            match hreq {
                HookReq::Auth(Instr::Auth { err }) => {
                    if self.shared.sync_hooks.load(Ordering::SeqCst) {
                        self.run_hook(|hooks, client| hooks.auth(client, err.as_deref()));
                    }
                }
                HookReq::Auth(other) => self.run_hook(|hooks, client| {
                    hooks.error_log(client, &format!("sync auth feedback unknown: {other:?}"))
                }),
                HookReq::Cmd(instr) => self.handle_hook(instr),
            }
        }
        bm.msg
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("peer_mode", &self.shared.peer_mode)
            .field("connected", &self.shared.connected.load(Ordering::SeqCst))
            .field("data_ready", &self.shared.data_ready.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_creds_parses_sender_parts() {
        let client = Client::new();
        client.creds("broker", 8765, "alice/jobs/disk", "pw").unwrap();
        let creds = client.shared.creds.lock().unwrap();
        assert_eq!(creds.user, "alice");
        assert_eq!(creds.queue, "jobs");
        assert_eq!(creds.queue_type, "disk");
    }

    #[test]
    fn test_creds_defaults_queue_and_type() {
        let client = Client::new();
        client.creds("broker", 8765, "alice", "pw").unwrap();
        let creds = client.shared.creds.lock().unwrap();
        assert!(creds.queue.starts_with("q-"));
        // the generated queue name embeds a uuid
        assert_eq!(creds.queue.len(), 2 + 36);
        assert_eq!(creds.queue_type, "mem");
    }

    #[test]
    fn test_creds_defaults_type_only() {
        let client = Client::new();
        client.creds("broker", 8765, "alice/jobs", "pw").unwrap();
        let creds = client.shared.creds.lock().unwrap();
        assert_eq!(creds.queue, "jobs");
        assert_eq!(creds.queue_type, "mem");
    }

    #[test]
    fn test_creds_twice_fails() {
        let client = Client::new();
        client.creds("broker", 8765, "alice", "pw").unwrap();
        assert!(matches!(
            client.creds("broker", 8765, "alice", "pw"),
            Err(SessionError::Usage(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_requires_creds_and_rejects_double() {
        let client = Client::new();
        assert!(matches!(client.connect(), Err(SessionError::Usage(_))));

        client.creds("127.0.0.1", 1, "alice", "pw").unwrap();
        client.connect().unwrap();
        assert!(matches!(client.connect(), Err(SessionError::Usage(_))));
        client.destroy();
    }

    #[test]
    fn test_set_backlog_only_before_creds() {
        let client = Client::new();
        assert_eq!(client.set_backlog(5), 5);
        client.creds("broker", 8765, "alice", "pw").unwrap();
        assert_eq!(client.set_backlog(50), 5);
    }

    #[test]
    fn test_set_heartbeat_clamps_to_one_second() {
        let client = Client::new();
        client.set_heartbeat(Duration::from_secs(5));
        assert_eq!(client.hb_interval(), Duration::from_secs(1));
        assert_eq!(client.hb_max_age(), Duration::from_secs(3));

        client.set_heartbeat(Duration::from_millis(250));
        assert_eq!(client.hb_interval(), Duration::from_millis(250));
        assert_eq!(client.hb_max_age(), Duration::from_millis(750));
    }

    #[test]
    fn test_set_heartbeat_floors_zero_interval() {
        let client = Client::new();
        client.set_heartbeat(Duration::ZERO);
        assert_eq!(client.hb_interval(), Duration::from_millis(1));
        assert_eq!(client.hb_max_age(), Duration::from_millis(3));
    }

    #[test]
    fn test_heartbeat_max_age_override_sticks() {
        let client = Client::new();
        client.set_heartbeat_max_age(Duration::from_secs(9));
        client.set_heartbeat(Duration::from_millis(100));
        assert_eq!(client.hb_interval(), Duration::from_millis(100));
        assert_eq!(client.hb_max_age(), Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_publish_backpressure_non_blocking() {
        let client = Client::new();
        client.set_backlog(2);
        client.set_non_blocking(true);
        client.creds("broker", 8765, "alice", "pw").unwrap();

        // No data sender is draining the queue, so the third publish must
        // fail fast.
        assert!(client.publish(Message::new("e", "r", Bytes::from_static(b"1"))).await);
        assert!(client.publish(Message::new("e", "r", Bytes::from_static(b"2"))).await);
        assert!(!client.publish(Message::new("e", "r", Bytes::from_static(b"3"))).await);
        assert_eq!(client.data_backlog(), 2);
    }

    #[tokio::test]
    async fn test_zero_backlog_still_queues_one() {
        let client = Client::new();
        client.set_backlog(0);
        client.set_non_blocking(true);
        client.creds("broker", 8765, "alice", "pw").unwrap();

        assert!(client.publish(Message::new("e", "r", Bytes::from_static(b"1"))).await);
        assert!(!client.publish(Message::new("e", "r", Bytes::from_static(b"2"))).await);
        assert_eq!(client.data_backlog(), 1);
    }

    #[tokio::test]
    async fn test_publish_before_creds_is_dropped() {
        let client = Client::new();
        assert!(!client.publish(Message::new("e", "r", Bytes::new())).await);
    }

    #[tokio::test]
    async fn test_receive_nonblocking_on_empty_backq() {
        let client = Client::new();
        assert!(client.receive(false).await.is_none());
        client.creds("broker", 8765, "alice", "pw").unwrap();
        assert!(client.receive(false).await.is_none());
    }

    #[test]
    fn test_request_api_silently_dropped_when_unconnected() {
        let client = Client::new();
        client.heartbeat();
        client
            .bind(BindReq::new("e", fq_wire::BindFlags::TRANS, "p"))
            .unwrap();
        client.unbind(UnbindReq::new("e", 1));
        client.status(|_, _| {});
    }

    #[test]
    fn test_bind_program_too_long_is_synchronous() {
        let client = Client::new();
        let program = "x".repeat(MAX_SHORT_BLOCK + 1);
        assert!(matches!(
            client.bind(BindReq::new("e", fq_wire::BindFlags::TRANS, &program)),
            Err(SessionError::Usage(_))
        ));
    }

    #[test]
    fn test_userdata_roundtrip() {
        let client = Client::new();
        assert!(client.userdata().is_none());
        client.set_userdata(Arc::new(42u32));
        let ud = client.userdata().unwrap();
        assert_eq!(*ud.downcast_ref::<u32>().unwrap(), 42);
    }
}
