//! Application-visible callbacks and the back-channel they ride on.

use crate::client::Client;
use crate::instr::{BindReq, Instr, UnbindReq};
use fq_wire::{BindFlags, Message, ROUTE_REFUSED};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Application callbacks delivered by the session engines.
///
/// In the default (async) delivery mode hooks run directly on the protocol
/// tasks; in sync mode auth and command feedback is queued on the
/// back-channel and dispatched from [`Client::receive`]. Hooks receive the
/// client handle and may call back into the request API; they must not rely
/// on blocking the engines.
pub trait Hooks: Send + Sync {
    /// Authentication finished; `err` is `None` on success.
    fn auth(&self, _client: &Client, _err: Option<&str>) {}

    /// A bind reply arrived; `req.out_route_id` is filled in.
    fn bind(&self, _client: &Client, _req: &BindReq) {}

    /// An unbind reply arrived; `req.out_success` is filled in.
    fn unbind(&self, _client: &Client, _req: &UnbindReq) {}

    /// A message arrived on the data channel. Return `true` to consume it;
    /// `false` leaves it for [`Client::receive`].
    fn message(&self, _client: &Client, _msg: &Message) -> bool {
        false
    }

    /// The session is shutting down for good.
    fn cleanup(&self, _client: &Client) {}

    /// The current connection ended; the supervisor will reconnect.
    fn disconnect(&self, _client: &Client) {}

    /// A fatal error was recorded.
    fn error_log(&self, _client: &Client, _error: &str) {}
}

/// Hook feedback packaged for sync-mode delivery.
pub(crate) enum HookReq {
    Auth(Instr),
    Cmd(Instr),
}

/// One entry on the back-channel: a real message, a hook request, or both
/// slots empty (never constructed).
pub(crate) struct BackMessage {
    pub msg: Option<Message>,
    pub hreq: Option<HookReq>,
}

impl BackMessage {
    pub fn msg(msg: Message) -> Self {
        Self {
            msg: Some(msg),
            hreq: None,
        }
    }

    pub fn hook(hreq: HookReq) -> Self {
        Self {
            msg: None,
            hreq: Some(hreq),
        }
    }
}

/// A convenience hook set for simple transient subscriptions.
///
/// Registered bindings are (re-)issued on every successful authentication,
/// so subscriptions survive reconnects. Messages are consumed into a bounded
/// channel; bind refusals and fatal errors are reported on a second channel.
pub struct TransientSubHooks {
    msgs: mpsc::Sender<Message>,
    errors: mpsc::Sender<String>,
    bindings: Mutex<Vec<(String, String)>>,
}

impl TransientSubHooks {
    /// Create the hook set plus its message and error receivers.
    pub fn new() -> (
        Arc<Self>,
        mpsc::Receiver<Message>,
        mpsc::Receiver<String>,
    ) {
        let (msgs, msgs_rx) = mpsc::channel(10_000);
        let (errors, errors_rx) = mpsc::channel(1_000);
        (
            Arc::new(Self {
                msgs,
                errors,
                bindings: Mutex::new(Vec::new()),
            }),
            msgs_rx,
            errors_rx,
        )
    }

    /// Register a transient binding to issue after each successful auth.
    pub fn add_binding(&self, exchange: &str, program: &str) {
        self.bindings
            .lock()
            .unwrap()
            .push((exchange.to_string(), program.to_string()));
    }
}

impl Hooks for TransientSubHooks {
    fn auth(&self, client: &Client, err: Option<&str>) {
        if let Some(err) = err {
            let _ = self.errors.try_send(err.to_string());
            return;
        }
        for (exchange, program) in self.bindings.lock().unwrap().iter() {
            let _ = client.bind(BindReq::new(exchange, BindFlags::TRANS, program));
        }
    }

    fn bind(&self, _client: &Client, req: &BindReq) {
        if req.out_route_id == ROUTE_REFUSED {
            let _ = self
                .errors
                .try_send(format!("binding failure: {}, {}", req.exchange, req.program));
        }
    }

    fn message(&self, _client: &Client, msg: &Message) -> bool {
        self.msgs.try_send(msg.clone()).is_ok()
    }

    fn error_log(&self, _client: &Client, error: &str) {
        let _ = self.errors.try_send(error.to_string());
    }
}
